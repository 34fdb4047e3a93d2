//! Page and referrer URL helpers: normalization, host extraction, UTM
//! extraction and domain-list matching.

use touchpoint_core::{AttributionError, AttributionResult, UtmParams};
use url::Url;

/// Parse an absolute URL.
pub fn parse(raw: &str) -> AttributionResult<Url> {
    let url = Url::parse(raw.trim()).map_err(|e| AttributionError::UrlParse(format!("{raw}: {e}")))?;
    if url.host_str().is_none() {
        return Err(AttributionError::UrlParse(format!("{raw}: missing host")));
    }
    Ok(url)
}

/// `scheme://host[:port]/path` with query and fragment stripped. The port is
/// kept only when it is not the scheme's default.
pub fn normalize(raw: &str) -> AttributionResult<String> {
    parse(raw).map(|url| normalized(&url))
}

pub(crate) fn normalized(url: &Url) -> String {
    let host = url.host_str().unwrap_or_default();
    match url.port() {
        Some(port) => format!("{}://{}:{}{}", url.scheme(), host, port, url.path()),
        None => format!("{}://{}{}", url.scheme(), host, url.path()),
    }
}

/// Lower-cased host of a URL.
pub fn host_of(raw: &str) -> AttributionResult<String> {
    parse(raw).map(|url| url.host_str().unwrap_or_default().to_ascii_lowercase())
}

/// Read the configured UTM parameters from the query string. Values are
/// percent-decoded; empty values count as absent.
pub fn utm_params(url: &Url, names: &[String]) -> UtmParams {
    let mut utms = UtmParams::default();
    for (key, value) in url.query_pairs() {
        if names.iter().any(|n| n.as_str() == key) {
            utms.insert(&key, &value);
        }
    }
    utms
}

/// True when `host` is `domain` or one of its subdomains.
pub fn domain_matches(host: &str, domain: &str) -> bool {
    let host = host.trim_end_matches('.').to_ascii_lowercase();
    let domain = domain.to_ascii_lowercase();
    if domain.is_empty() {
        return false;
    }
    host == domain
        || host
            .strip_suffix(domain.as_str())
            .is_some_and(|prefix| prefix.ends_with('.'))
}

/// The longest listed domain matching `host`.
pub fn best_match<'a>(host: &str, domains: &'a [String]) -> Option<&'a str> {
    domains
        .iter()
        .filter(|d| domain_matches(host, d))
        .max_by_key(|d| d.len())
        .map(String::as_str)
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;

    fn names() -> Vec<String> {
        ["utm_source", "utm_medium", "utm_campaign", "utm_term", "utm_content"]
            .iter()
            .map(|s| s.to_string())
            .collect()
    }

    #[test]
    fn test_normalize_strips_query_and_fragment() {
        assert_eq!(
            normalize("https://Example.com/pricing?utm_source=x#plans").unwrap(),
            "https://example.com/pricing"
        );
        assert_eq!(normalize("https://example.com").unwrap(), "https://example.com/");
    }

    #[test]
    fn test_normalize_keeps_non_default_port() {
        assert_eq!(
            normalize("http://localhost:8080/a/b?c=d").unwrap(),
            "http://localhost:8080/a/b"
        );
        assert_eq!(normalize("https://example.com:443/x").unwrap(), "https://example.com/x");
    }

    #[test]
    fn test_normalize_rejects_garbage() {
        assert!(matches!(normalize("not a url"), Err(AttributionError::UrlParse(_))));
        assert!(normalize("").is_err());
        assert!(normalize("mailto:someone@example.com").is_err());
    }

    #[test]
    fn test_host_of() {
        assert_eq!(host_of("https://WWW.Google.com/search?q=x").unwrap(), "www.google.com");
    }

    #[test]
    fn test_utm_params_decoded() {
        let url = parse("https://example.com/?utm_source=news+letter&utm_campaign=spring%20sale&utm_medium=&foo=bar").unwrap();
        let utms = utm_params(&url, &names());
        assert_eq!(utms.utm_source.as_deref(), Some("news letter"));
        assert_eq!(utms.utm_campaign.as_deref(), Some("spring sale"));
        assert_eq!(utms.utm_medium, None);
        assert_eq!(utms.values().count(), 2);
    }

    #[test]
    fn test_utm_params_respects_configured_names() {
        let url = parse("https://example.com/?utm_source=a&utm_term=b").unwrap();
        let utms = utm_params(&url, &["utm_source".to_string()]);
        assert_eq!(utms.utm_source.as_deref(), Some("a"));
        assert_eq!(utms.utm_term, None);
    }

    #[test]
    fn test_domain_matching_is_suffix_on_label_boundary() {
        assert!(domain_matches("google.com", "google.com"));
        assert!(domain_matches("www.google.com", "google.com"));
        assert!(domain_matches("WWW.GOOGLE.COM.", "google.com"));
        assert!(!domain_matches("notgoogle.com", "google.com"));
        assert!(!domain_matches("google.com.evil.net", "google.com"));
        assert!(!domain_matches("google.com", ""));
    }

    #[test]
    fn test_best_match_prefers_most_specific() {
        let domains = vec!["google.com".to_string(), "gemini.google.com".to_string()];
        assert_eq!(best_match("gemini.google.com", &domains), Some("gemini.google.com"));
        assert_eq!(best_match("www.google.com", &domains), Some("google.com"));
        assert_eq!(best_match("bing.com", &domains), None);
    }
}
