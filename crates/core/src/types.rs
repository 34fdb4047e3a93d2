use chrono::{DateTime, SecondsFormat, Utc};
use serde::{Deserialize, Serialize};

/// Placeholder for a UTM field the visitor's URL did not carry.
pub const NOT_SET: &str = "(not-set)";
/// Placeholder for an absent referrer, and the medium of direct traffic.
pub const NONE: &str = "(none)";

/// Mutually exclusive classification tag assigned to a visit.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "snake_case")]
pub enum TrafficType {
    UrlUtm,
    Paid,
    Organic,
    Llm,
    Direct,
    Referral,
}

impl TrafficType {
    pub fn as_str(&self) -> &'static str {
        match self {
            TrafficType::UrlUtm => "url_utm",
            TrafficType::Paid => "paid",
            TrafficType::Organic => "organic",
            TrafficType::Llm => "llm",
            TrafficType::Direct => "direct",
            TrafficType::Referral => "referral",
        }
    }
}

impl std::fmt::Display for TrafficType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Which stored slot a record was persisted into.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum TouchType {
    FirstTouch,
    LastTouch,
}

/// Browser environment snapshot. Carried through, never used for decisions.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct DeviceInfo {
    pub language: String,
    pub platform: String,
}

impl Default for DeviceInfo {
    fn default() -> Self {
        Self {
            language: String::new(),
            platform: "unknown".to_string(),
        }
    }
}

/// UTM values read from the query string. Only non-empty values are kept.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq, Eq)]
pub struct UtmParams {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub utm_source: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub utm_medium: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub utm_campaign: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub utm_term: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub utm_content: Option<String>,
}

impl UtmParams {
    /// Store `value` under a UTM parameter name. Unknown names and empty
    /// values are ignored; the first value seen for a name wins.
    pub fn insert(&mut self, name: &str, value: &str) {
        if value.is_empty() {
            return;
        }
        let slot = match name {
            "utm_source" => &mut self.utm_source,
            "utm_medium" => &mut self.utm_medium,
            "utm_campaign" => &mut self.utm_campaign,
            "utm_term" => &mut self.utm_term,
            "utm_content" => &mut self.utm_content,
            _ => return,
        };
        if slot.is_none() {
            *slot = Some(value.to_string());
        }
    }

    pub fn is_empty(&self) -> bool {
        self.values().next().is_none()
    }

    /// Iterate over the values that are present.
    pub fn values(&self) -> impl Iterator<Item = &str> {
        [
            &self.utm_source,
            &self.utm_medium,
            &self.utm_campaign,
            &self.utm_term,
            &self.utm_content,
        ]
        .into_iter()
        .filter_map(|v| v.as_deref())
    }
}

/// The outcome of classifying one page load.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct AttributionRecord {
    pub timestamp: DateTime<Utc>,
    pub landing_page: String,
    pub referrer: String,
    pub utm_source: String,
    pub utm_medium: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub utm_campaign: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub utm_term: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub utm_content: Option<String>,
    pub traffic_type: TrafficType,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub touch_type: Option<TouchType>,
    #[serde(default)]
    pub device: DeviceInfo,
}

impl AttributionRecord {
    /// Copy of this record tagged for the given storage slot.
    pub fn tagged(&self, touch_type: TouchType) -> Self {
        Self {
            touch_type: Some(touch_type),
            ..self.clone()
        }
    }

    /// String value of a record field by its serialized name, as written
    /// into lead forms.
    pub fn field(&self, name: &str) -> Option<String> {
        match name {
            "timestamp" => Some(self.timestamp.to_rfc3339_opts(SecondsFormat::Millis, true)),
            "landing_page" => Some(self.landing_page.clone()),
            "referrer" => Some(self.referrer.clone()),
            "utm_source" => Some(self.utm_source.clone()),
            "utm_medium" => Some(self.utm_medium.clone()),
            "utm_campaign" => self.utm_campaign.clone(),
            "utm_term" => self.utm_term.clone(),
            "utm_content" => self.utm_content.clone(),
            "traffic_type" => Some(self.traffic_type.to_string()),
            _ => None,
        }
    }
}

/// Page pointers kept alongside the attribution records.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq, Eq)]
pub struct UrlTouchPoints {
    /// First page ever seen for this visitor.
    pub first_url: String,
    /// Entry page of the most recent session.
    pub last_url: String,
    /// Page of the latest evaluation.
    #[serde(default)]
    pub current_url: String,
}
