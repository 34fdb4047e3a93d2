use std::collections::HashMap;

use serde::Deserialize;

/// Root configuration. Loaded from an optional config file and environment
/// variables with the prefix `TOUCHPOINT__`.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct AppConfig {
    #[serde(default)]
    pub classifier: ClassifierConfig,
    #[serde(default)]
    pub storage: StorageConfig,
    #[serde(default)]
    pub form: FormConfig,
    #[serde(default)]
    pub dashboard: DashboardConfig,
}

/// Lookup lists used by the traffic classifier. All matching is
/// case-insensitive.
#[derive(Debug, Clone, Deserialize)]
pub struct ClassifierConfig {
    #[serde(default = "default_utm_params")]
    pub utm_params: Vec<String>,
    #[serde(default = "default_search_engines")]
    pub search_engines: Vec<String>,
    #[serde(default = "default_llm_domains")]
    pub llm_domains: Vec<String>,
    /// Substrings that mark any UTM value as paid.
    #[serde(default = "default_paid_indicators")]
    pub paid_indicators: Vec<String>,
    /// Substrings of `utm_medium` that mark a visit as paid.
    #[serde(default = "default_paid_mediums")]
    pub paid_mediums: Vec<String>,
    /// Substrings of `utm_source` naming ad platforms.
    #[serde(default = "default_paid_sources")]
    pub paid_sources: Vec<String>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct StorageConfig {
    #[serde(default = "default_first_touch_key")]
    pub first_touch_key: String,
    #[serde(default = "default_last_touch_key")]
    pub last_touch_key: String,
    #[serde(default = "default_session_key")]
    pub session_key: String,
    #[serde(default = "default_urls_key")]
    pub urls_key: String,
    #[serde(default = "default_first_touch_ttl_days")]
    pub first_touch_ttl_days: u32,
    /// `None` stores last touch as a session cookie.
    #[serde(default = "default_last_touch_ttl_days")]
    pub last_touch_ttl_days: Option<u32>,
    #[serde(default = "default_urls_ttl_days")]
    pub urls_ttl_days: u32,
    #[serde(default = "default_cookie_path")]
    pub cookie_path: String,
}

#[derive(Debug, Clone, Deserialize)]
pub struct FormConfig {
    /// Field ids that receive `FT:<first>||LT:<last>` values.
    #[serde(default = "default_form_fields")]
    pub fields: Vec<String>,
    /// Field whose presence means the form has rendered.
    #[serde(default = "default_key_field")]
    pub key_field: String,
    /// Field receiving both records as one JSON blob.
    #[serde(default = "default_json_field")]
    pub json_field: String,
    #[serde(default = "default_poll_interval_ms")]
    pub poll_interval_ms: u64,
    #[serde(default = "default_poll_timeout_ms")]
    pub poll_timeout_ms: u64,
}

#[derive(Debug, Clone, Deserialize)]
pub struct DashboardConfig {
    #[serde(default = "default_template_id")]
    pub default_template_id: String,
    /// Template report id -> table type -> data source alias.
    #[serde(default = "default_known_aliases")]
    pub known_aliases: HashMap<String, HashMap<String, String>>,
}

fn strings(values: &[&str]) -> Vec<String> {
    values.iter().map(|v| v.to_string()).collect()
}

// Default functions
fn default_utm_params() -> Vec<String> {
    strings(&["utm_source", "utm_medium", "utm_campaign", "utm_term", "utm_content"])
}
fn default_search_engines() -> Vec<String> {
    strings(&[
        "google.com",
        "bing.com",
        "yahoo.com",
        "duckduckgo.com",
        "ask.com",
        "yandex.com",
        "baidu.com",
    ])
}
fn default_llm_domains() -> Vec<String> {
    strings(&[
        "chatgpt.com",
        "perplexity.ai",
        "claude.ai",
        "grok.com",
        "gemini.google.com",
        "deepseek.com",
    ])
}
fn default_paid_indicators() -> Vec<String> {
    strings(&[
        "cpc",
        "paid",
        "ppc",
        "ads",
        "adwords",
        "display",
        "banner",
        "sponsored",
        "social-paid",
        "fb-paid",
        "linkedin-ads",
        "twitter-ads",
        "tiktok-ads",
        "meta",
    ])
}
fn default_paid_mediums() -> Vec<String> {
    strings(&[
        "cpc",
        "ppc",
        "paidsearch",
        "paid-social",
        "paid_social",
        "display",
        "cpm",
        "banner",
        "paid",
        "social-paid",
    ])
}
fn default_paid_sources() -> Vec<String> {
    strings(&[
        "google_ads",
        "googleads",
        "bing_ads",
        "facebook_ads",
        "linkedin_ads",
        "twitter_ads",
        "tiktok_ads",
        "meta_ads",
    ])
}
fn default_first_touch_key() -> String {
    "m8l-first-touch".to_string()
}
fn default_last_touch_key() -> String {
    "m8l-last-touch".to_string()
}
fn default_session_key() -> String {
    "m8l-urls-temp".to_string()
}
fn default_urls_key() -> String {
    "m8l-urls".to_string()
}
fn default_first_touch_ttl_days() -> u32 {
    365
}
fn default_last_touch_ttl_days() -> Option<u32> {
    Some(30)
}
fn default_urls_ttl_days() -> u32 {
    30
}
fn default_cookie_path() -> String {
    "/".to_string()
}
fn default_form_fields() -> Vec<String> {
    strings(&[
        "utm_source",
        "utm_medium",
        "utm_campaign",
        "utm_content",
        "utm_term",
        "traffic_type",
        "landing_page",
        "referrer",
        "timestamp",
    ])
}
fn default_key_field() -> String {
    "utm_source".to_string()
}
fn default_json_field() -> String {
    "attribution_data".to_string()
}
fn default_poll_interval_ms() -> u64 {
    500
}
fn default_poll_timeout_ms() -> u64 {
    10_000
}
fn default_template_id() -> String {
    "d29cdb49-1055-460b-882c-9a8630051579".to_string()
}
fn default_known_aliases() -> HashMap<String, HashMap<String, String>> {
    HashMap::from([(
        default_template_id(),
        HashMap::from([
            ("SITE_IMPRESSION".to_string(), "0".to_string()),
            ("URL_IMPRESSION".to_string(), "269".to_string()),
        ]),
    )])
}

impl Default for ClassifierConfig {
    fn default() -> Self {
        Self {
            utm_params: default_utm_params(),
            search_engines: default_search_engines(),
            llm_domains: default_llm_domains(),
            paid_indicators: default_paid_indicators(),
            paid_mediums: default_paid_mediums(),
            paid_sources: default_paid_sources(),
        }
    }
}

impl Default for StorageConfig {
    fn default() -> Self {
        Self {
            first_touch_key: default_first_touch_key(),
            last_touch_key: default_last_touch_key(),
            session_key: default_session_key(),
            urls_key: default_urls_key(),
            first_touch_ttl_days: default_first_touch_ttl_days(),
            last_touch_ttl_days: default_last_touch_ttl_days(),
            urls_ttl_days: default_urls_ttl_days(),
            cookie_path: default_cookie_path(),
        }
    }
}

impl Default for FormConfig {
    fn default() -> Self {
        Self {
            fields: default_form_fields(),
            key_field: default_key_field(),
            json_field: default_json_field(),
            poll_interval_ms: default_poll_interval_ms(),
            poll_timeout_ms: default_poll_timeout_ms(),
        }
    }
}

impl Default for DashboardConfig {
    fn default() -> Self {
        Self {
            default_template_id: default_template_id(),
            known_aliases: default_known_aliases(),
        }
    }
}

const LIST_KEYS: &[&str] = &[
    "classifier.utm_params",
    "classifier.search_engines",
    "classifier.llm_domains",
    "classifier.paid_indicators",
    "classifier.paid_mediums",
    "classifier.paid_sources",
    "form.fields",
];

impl AppConfig {
    /// Load configuration from an optional file and environment variables.
    pub fn load(path: Option<&str>) -> Result<Self, config::ConfigError> {
        let mut builder = config::Config::builder();
        if let Some(path) = path {
            builder = builder.add_source(config::File::with_name(path).required(false));
        }

        let mut env = config::Environment::with_prefix("TOUCHPOINT")
            .prefix_separator("__")
            .separator("__")
            .try_parsing(true)
            .list_separator(",");
        for key in LIST_KEYS {
            env = env.with_list_parse_key(key);
        }

        builder.add_source(env).build()?.try_deserialize()
    }
}
