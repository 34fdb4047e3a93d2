//! Cookie-like key-value storage — the only state shared between page loads.
//!
//! Values are strings (JSON for records), percent-encoded inside the jar.
//! Nothing here is atomic across keys; concurrent tabs simply overwrite each
//! other.

use std::collections::BTreeMap;

use chrono::{DateTime, Duration, Utc};
use dashmap::DashMap;
use parking_lot::Mutex;
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use tracing::debug;

use touchpoint_core::{AttributionError, AttributionResult};

/// Cookie lifetime.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Expiry {
    /// Dropped when the browser session ends.
    Session,
    After(Duration),
}

impl Expiry {
    pub fn days(days: u32) -> Self {
        Expiry::After(Duration::days(i64::from(days)))
    }

    /// `None` means a session cookie.
    pub fn from_ttl_days(days: Option<u32>) -> Self {
        days.map_or(Expiry::Session, Expiry::days)
    }
}

/// Get/set/delete by key with expiry.
pub trait KeyValueStore: Send + Sync {
    fn get(&self, key: &str) -> AttributionResult<Option<String>>;

    fn set(&self, key: &str, value: &str, expiry: Expiry) -> AttributionResult<()>;

    fn delete(&self, key: &str) -> AttributionResult<()>;
}

/// Read and decode a JSON value. Undecodable payloads are `Serialization`
/// errors; callers treat them as absent.
pub fn load_json<T: DeserializeOwned>(
    store: &dyn KeyValueStore,
    key: &str,
) -> AttributionResult<Option<T>> {
    match store.get(key)? {
        Some(raw) => Ok(Some(serde_json::from_str(&raw)?)),
        None => Ok(None),
    }
}

pub fn save_json<T: Serialize>(
    store: &dyn KeyValueStore,
    key: &str,
    value: &T,
    expiry: Expiry,
) -> AttributionResult<()> {
    let raw = serde_json::to_string(value)?;
    store.set(key, &raw, expiry)
}

/// A stored cookie value and its absolute expiry.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StoredCookie {
    /// Percent-encoded, as `encodeURIComponent` writes it.
    pub value: String,
    /// `None` for session cookies.
    pub expires_at: Option<DateTime<Utc>>,
}

/// In-process cookie jar.
///
/// Stands in for `document.cookie`: it parses and renders cookie header
/// strings, honors expiry against its own (shiftable) clock, and can be
/// snapshotted to JSON so a jar survives between CLI invocations.
pub struct MemoryCookieJar {
    cookies: DashMap<String, StoredCookie>,
    clock_offset: Mutex<Duration>,
    path: String,
}

impl Default for MemoryCookieJar {
    fn default() -> Self {
        Self::new()
    }
}

impl MemoryCookieJar {
    pub fn new() -> Self {
        Self {
            cookies: DashMap::new(),
            clock_offset: Mutex::new(Duration::zero()),
            path: "/".to_string(),
        }
    }

    pub fn with_path(mut self, path: impl Into<String>) -> Self {
        self.path = path.into();
        self
    }

    /// Build a jar from a `document.cookie` style header (`a=1; b=2`). Every
    /// cookie is treated as a session cookie.
    pub fn from_cookie_header(header: &str) -> Self {
        let jar = Self::new();
        for (name, value) in parse_cookie_header(header) {
            jar.cookies.insert(
                name,
                StoredCookie {
                    value,
                    expires_at: None,
                },
            );
        }
        jar
    }

    /// Restore a jar from a snapshot. Already-expired entries are dropped.
    pub fn restore(snapshot: BTreeMap<String, StoredCookie>) -> Self {
        let jar = Self::new();
        let now = jar.now();
        for (name, cookie) in snapshot {
            if cookie.expires_at.map_or(true, |at| at > now) {
                jar.cookies.insert(name, cookie);
            }
        }
        jar
    }

    /// Live cookies keyed by name.
    pub fn snapshot(&self) -> BTreeMap<String, StoredCookie> {
        self.purge_expired();
        self.cookies
            .iter()
            .map(|entry| (entry.key().clone(), entry.value().clone()))
            .collect()
    }

    /// Current time as seen by the jar.
    pub fn now(&self) -> DateTime<Utc> {
        Utc::now() + *self.clock_offset.lock()
    }

    /// Move the jar's clock forward.
    pub fn advance(&self, by: Duration) {
        let mut offset = self.clock_offset.lock();
        *offset = *offset + by;
    }

    /// Simulate the browser closing: session cookies disappear.
    pub fn end_session(&self) {
        self.cookies.retain(|_, cookie| cookie.expires_at.is_some());
        debug!(remaining = self.cookies.len(), "browser session ended");
    }

    pub fn len(&self) -> usize {
        self.purge_expired();
        self.cookies.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// `name=value; name2=value2` for all live cookies, as `document.cookie`
    /// reads.
    pub fn cookie_header(&self) -> String {
        self.snapshot()
            .into_iter()
            .map(|(name, cookie)| format!("{name}={}", cookie.value))
            .collect::<Vec<_>>()
            .join("; ")
    }

    /// The assignment string a browser script would write for `key`.
    pub fn set_cookie_header(&self, key: &str) -> Option<String> {
        let cookie = self.cookies.get(key)?;
        let expires = cookie
            .expires_at
            .map(|at| format!("; expires={}", at.format("%a, %d %b %Y %H:%M:%S GMT")))
            .unwrap_or_default();
        Some(format!("{key}={}{expires}; path={}", cookie.value, self.path))
    }

    fn purge_expired(&self) {
        let now = self.now();
        self.cookies
            .retain(|_, cookie| cookie.expires_at.map_or(true, |at| at > now));
    }
}

impl KeyValueStore for MemoryCookieJar {
    fn get(&self, key: &str) -> AttributionResult<Option<String>> {
        let now = self.now();
        let expired = match self.cookies.get(key) {
            Some(cookie) if cookie.expires_at.map_or(true, |at| at > now) => {
                let value = urlencoding::decode(&cookie.value).map_err(|e| {
                    AttributionError::StorageRead(format!("cookie {key} is not valid UTF-8: {e}"))
                })?;
                return Ok(Some(value.into_owned()));
            }
            Some(_) => true,
            None => false,
        };
        if expired {
            self.cookies.remove(key);
        }
        Ok(None)
    }

    fn set(&self, key: &str, value: &str, expiry: Expiry) -> AttributionResult<()> {
        if key.is_empty() || key.contains(['=', ';']) {
            return Err(AttributionError::StorageWrite(format!(
                "invalid cookie name {key:?}"
            )));
        }
        let expires_at = match expiry {
            Expiry::Session => None,
            Expiry::After(ttl) => Some(self.now() + ttl),
        };
        self.cookies.insert(
            key.to_string(),
            StoredCookie {
                value: urlencoding::encode(value).into_owned(),
                expires_at,
            },
        );
        Ok(())
    }

    fn delete(&self, key: &str) -> AttributionResult<()> {
        self.cookies.remove(key);
        Ok(())
    }
}

/// Split a cookie header into name/value pairs. Pairs without `=` are
/// skipped; the first occurrence of a name wins, as browsers order them.
pub fn parse_cookie_header(header: &str) -> Vec<(String, String)> {
    let mut seen = std::collections::HashSet::new();
    header
        .split(';')
        .map(str::trim)
        .filter_map(|pair| pair.split_once('='))
        .filter(|(name, _)| !name.is_empty() && seen.insert(name.to_string()))
        .map(|(name, value)| (name.to_string(), value.to_string()))
        .collect()
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;

    #[test]
    fn test_set_get_delete() {
        let jar = MemoryCookieJar::new();
        jar.set("m8l-urls-temp", "\"1\"", Expiry::Session).unwrap();
        assert_eq!(jar.get("m8l-urls-temp").unwrap().as_deref(), Some("\"1\""));
        jar.delete("m8l-urls-temp").unwrap();
        assert_eq!(jar.get("m8l-urls-temp").unwrap(), None);
    }

    #[test]
    fn test_expiry() {
        let jar = MemoryCookieJar::new();
        jar.set("short", "a", Expiry::days(1)).unwrap();
        jar.set("long", "b", Expiry::days(365)).unwrap();
        jar.advance(Duration::days(2));
        assert_eq!(jar.get("short").unwrap(), None);
        assert_eq!(jar.get("long").unwrap().as_deref(), Some("b"));
        assert_eq!(jar.len(), 1);
    }

    #[test]
    fn test_end_session_drops_session_cookies() {
        let jar = MemoryCookieJar::new();
        jar.set("marker", "1", Expiry::Session).unwrap();
        jar.set("first", "x", Expiry::days(365)).unwrap();
        jar.end_session();
        assert_eq!(jar.get("marker").unwrap(), None);
        assert!(jar.get("first").unwrap().is_some());
    }

    #[test]
    fn test_rejects_invalid_cookie_names() {
        let jar = MemoryCookieJar::new();
        assert!(matches!(
            jar.set("a;b", "1", Expiry::Session),
            Err(AttributionError::StorageWrite(_))
        ));
        assert!(jar.set("", "1", Expiry::Session).is_err());
    }

    #[test]
    fn test_values_are_percent_encoded() {
        let jar = MemoryCookieJar::new();
        jar.set("a", r#"{"c":"x;y z"}"#, Expiry::Session).unwrap();
        assert_eq!(jar.get("a").unwrap().as_deref(), Some(r#"{"c":"x;y z"}"#));
        assert_eq!(jar.cookie_header(), "a=%7B%22c%22%3A%22x%3By%20z%22%7D");
        assert_eq!(parse_cookie_header(&jar.cookie_header()).len(), 1);
    }

    #[test]
    fn test_undecodable_value_is_read_error() {
        let jar = MemoryCookieJar::from_cookie_header("a=%FF");
        assert!(matches!(jar.get("a"), Err(AttributionError::StorageRead(_))));
    }

    #[test]
    fn test_parse_cookie_header() {
        let pairs = parse_cookie_header(" a=1;b={\"k\":\"v=w\"} ; junk; a=2; =x");
        assert_eq!(
            pairs,
            vec![
                ("a".to_string(), "1".to_string()),
                ("b".to_string(), "{\"k\":\"v=w\"}".to_string()),
            ]
        );
    }

    #[test]
    fn test_cookie_header_round_trip_through_jar() {
        let jar = MemoryCookieJar::from_cookie_header("m8l-urls-temp=\"1\"; other=abc");
        assert_eq!(jar.get("other").unwrap().as_deref(), Some("abc"));
        assert_eq!(jar.cookie_header(), "m8l-urls-temp=\"1\"; other=abc");
    }

    #[test]
    fn test_set_cookie_header_format() {
        let jar = MemoryCookieJar::new();
        jar.set("session", "1", Expiry::Session).unwrap();
        jar.set("ft", "{}", Expiry::days(365)).unwrap();
        assert_eq!(jar.set_cookie_header("session").unwrap(), "session=1; path=/");
        let persistent = jar.set_cookie_header("ft").unwrap();
        assert!(persistent.starts_with("ft=%7B%7D; expires="));
        assert!(persistent.ends_with(" GMT; path=/"));
        assert_eq!(jar.set_cookie_header("missing"), None);

        let scoped = MemoryCookieJar::new().with_path("/shop");
        scoped.set("session", "1", Expiry::Session).unwrap();
        assert_eq!(scoped.set_cookie_header("session").unwrap(), "session=1; path=/shop");
    }

    #[test]
    fn test_snapshot_restore() {
        let jar = MemoryCookieJar::new();
        jar.set("a", "1", Expiry::days(30)).unwrap();
        jar.set("b", "2", Expiry::Session).unwrap();
        let restored = MemoryCookieJar::restore(jar.snapshot());
        assert_eq!(restored.get("a").unwrap().as_deref(), Some("1"));
        assert_eq!(restored.get("b").unwrap().as_deref(), Some("2"));
    }

    #[test]
    fn test_json_helpers() {
        let jar = MemoryCookieJar::new();
        save_json(&jar, "k", &vec![1, 2, 3], Expiry::Session).unwrap();
        let back: Option<Vec<u32>> = load_json(&jar, "k").unwrap();
        assert_eq!(back, Some(vec![1, 2, 3]));

        jar.set("broken", "{not json", Expiry::Session).unwrap();
        let broken: AttributionResult<Option<Vec<u32>>> = load_json(&jar, "broken");
        assert!(matches!(broken, Err(AttributionError::Serialization(_))));
        assert_eq!(load_json::<Vec<u32>>(&jar, "absent").unwrap(), None);
    }
}
