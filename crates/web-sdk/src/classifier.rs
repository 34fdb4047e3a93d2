//! Traffic attribution classifier — turns a page URL and its referrer into an
//! [`AttributionRecord`].
//!
//! Classification is an ordered rule table; the first rule that matches wins:
//!
//! 1. explicit UTMs that look paid → `paid`
//! 2. any other explicit UTMs → `url_utm`
//! 3. referrer is a search engine → `organic`
//! 4. referrer is an LLM assistant → `llm`
//! 5. no usable referrer → `direct`
//! 6. anything else → `referral`

use chrono::{DateTime, Utc};
use tracing::{debug, warn};

use touchpoint_core::config::ClassifierConfig;
use touchpoint_core::types::{NONE, NOT_SET};
use touchpoint_core::{AttributionRecord, DeviceInfo, TrafficType, UtmParams};

use crate::page_url;

/// Inputs observed on a single page load.
#[derive(Debug, Clone, Default)]
pub struct PageContext {
    pub url: String,
    /// Document referrer; empty when the browser reports none.
    pub referrer: String,
    pub device: DeviceInfo,
}

impl PageContext {
    pub fn new(url: impl Into<String>, referrer: impl Into<String>) -> Self {
        Self {
            url: url.into(),
            referrer: referrer.into(),
            device: DeviceInfo::default(),
        }
    }

    pub fn with_device(mut self, device: DeviceInfo) -> Self {
        self.device = device;
        self
    }
}

/// Parsed facts the rules decide on.
#[derive(Debug, Clone, Default)]
pub struct Signals {
    pub utms: UtmParams,
    /// Lower-cased referrer host; `None` when absent or unparseable.
    pub referrer_host: Option<String>,
}

/// Source, medium and campaign fields chosen by a rule.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Classification {
    pub traffic_type: TrafficType,
    pub utm_source: String,
    pub utm_medium: String,
    pub utm_campaign: Option<String>,
    pub utm_term: Option<String>,
    pub utm_content: Option<String>,
}

impl Classification {
    fn sourced(traffic_type: TrafficType, source: impl Into<String>, medium: &str) -> Self {
        Self {
            traffic_type,
            utm_source: source.into(),
            utm_medium: medium.to_string(),
            utm_campaign: None,
            utm_term: None,
            utm_content: None,
        }
    }
}

type RuleFn = fn(&Classifier, &Signals) -> Option<Classification>;

/// One entry of the precedence table.
pub struct Rule {
    pub traffic_type: TrafficType,
    apply: RuleFn,
}

static RULES: [Rule; 6] = [
    Rule { traffic_type: TrafficType::Paid, apply: Classifier::paid_rule },
    Rule { traffic_type: TrafficType::UrlUtm, apply: Classifier::url_utm_rule },
    Rule { traffic_type: TrafficType::Organic, apply: Classifier::organic_rule },
    Rule { traffic_type: TrafficType::Llm, apply: Classifier::llm_rule },
    Rule { traffic_type: TrafficType::Direct, apply: Classifier::direct_rule },
    Rule { traffic_type: TrafficType::Referral, apply: Classifier::referral_rule },
];

/// Stateless traffic classifier over a configured set of lookup lists.
#[derive(Debug, Clone)]
pub struct Classifier {
    config: ClassifierConfig,
}

impl Default for Classifier {
    fn default() -> Self {
        Self::new(ClassifierConfig::default())
    }
}

impl Classifier {
    pub fn new(config: ClassifierConfig) -> Self {
        let lower = |v: Vec<String>| -> Vec<String> {
            v.into_iter().map(|s| s.to_ascii_lowercase()).collect()
        };
        Self {
            config: ClassifierConfig {
                utm_params: config.utm_params,
                search_engines: lower(config.search_engines),
                llm_domains: lower(config.llm_domains),
                paid_indicators: lower(config.paid_indicators),
                paid_mediums: lower(config.paid_mediums),
                paid_sources: lower(config.paid_sources),
            },
        }
    }

    pub fn config(&self) -> &ClassifierConfig {
        &self.config
    }

    /// The rule table in evaluation order.
    pub fn rules() -> &'static [Rule] {
        &RULES
    }

    /// Classify a page load, stamping the record with the current time.
    pub fn classify(&self, ctx: &PageContext) -> AttributionRecord {
        self.classify_at(ctx, Utc::now())
    }

    /// Classify a page load with an explicit creation instant.
    pub fn classify_at(&self, ctx: &PageContext, now: DateTime<Utc>) -> AttributionRecord {
        let page = page_url::parse(&ctx.url)
            .map_err(|e| warn!(error = %e, "unparseable page URL, classifying without it"))
            .ok();
        let referrer = if ctx.referrer.trim().is_empty() {
            None
        } else {
            page_url::parse(&ctx.referrer)
                .map_err(|e| warn!(error = %e, "unparseable referrer, treating as direct"))
                .ok()
        };

        let signals = Signals {
            utms: page
                .as_ref()
                .map(|url| page_url::utm_params(url, &self.config.utm_params))
                .unwrap_or_default(),
            referrer_host: referrer
                .as_ref()
                .and_then(|url| url.host_str())
                .map(str::to_ascii_lowercase),
        };
        let classification = self.evaluate(&signals);

        debug!(
            traffic_type = %classification.traffic_type,
            utm_source = %classification.utm_source,
            utm_medium = %classification.utm_medium,
            "classified page load"
        );

        AttributionRecord {
            timestamp: now,
            landing_page: page.as_ref().map(page_url::normalized).unwrap_or_default(),
            referrer: referrer
                .as_ref()
                .map(page_url::normalized)
                .unwrap_or_else(|| NONE.to_string()),
            utm_source: classification.utm_source,
            utm_medium: classification.utm_medium,
            utm_campaign: classification.utm_campaign,
            utm_term: classification.utm_term,
            utm_content: classification.utm_content,
            traffic_type: classification.traffic_type,
            touch_type: None,
            device: ctx.device.clone(),
        }
    }

    /// Run the rule table and return the first match.
    pub fn evaluate(&self, signals: &Signals) -> Classification {
        RULES
            .iter()
            .find_map(|rule| (rule.apply)(self, signals))
            .unwrap_or_else(|| Classification::sourced(TrafficType::Direct, "direct", NONE))
    }

    /// Whether explicit UTM values carry any paid-traffic marker.
    pub fn is_paid(&self, utms: &UtmParams) -> bool {
        let contains_any = |value: &str, needles: &[String]| {
            let value = value.to_ascii_lowercase();
            needles.iter().any(|n| value.contains(n.as_str()))
        };

        utms.values().any(|v| contains_any(v, &self.config.paid_indicators))
            || utms
                .utm_medium
                .as_deref()
                .is_some_and(|m| contains_any(m, &self.config.paid_mediums))
            || utms
                .utm_source
                .as_deref()
                .is_some_and(|s| contains_any(s, &self.config.paid_sources))
    }

    fn paid_rule(&self, signals: &Signals) -> Option<Classification> {
        let utms = &signals.utms;
        if utms.is_empty() || !self.is_paid(utms) {
            return None;
        }
        Some(Classification {
            traffic_type: TrafficType::Paid,
            utm_source: utms.utm_source.clone().unwrap_or_else(|| "paid_traffic".to_string()),
            utm_medium: paid_medium(utms.utm_medium.as_deref()).to_string(),
            utm_campaign: Some(
                utms.utm_campaign
                    .clone()
                    .unwrap_or_else(|| "undefined_campaign".to_string()),
            ),
            utm_term: utms.utm_term.clone(),
            utm_content: utms.utm_content.clone(),
        })
    }

    fn url_utm_rule(&self, signals: &Signals) -> Option<Classification> {
        let utms = &signals.utms;
        if utms.is_empty() {
            return None;
        }
        let or_not_set = |v: &Option<String>| v.clone().unwrap_or_else(|| NOT_SET.to_string());
        Some(Classification {
            traffic_type: TrafficType::UrlUtm,
            utm_source: or_not_set(&utms.utm_source),
            utm_medium: or_not_set(&utms.utm_medium),
            utm_campaign: Some(or_not_set(&utms.utm_campaign)),
            utm_term: Some(or_not_set(&utms.utm_term)),
            utm_content: Some(or_not_set(&utms.utm_content)),
        })
    }

    fn organic_rule(&self, signals: &Signals) -> Option<Classification> {
        let host = signals.referrer_host.as_deref()?;
        let engine = page_url::best_match(host, &self.config.search_engines)?;
        // A more specific LLM domain (gemini.google.com) outranks its parent engine.
        if page_url::best_match(host, &self.config.llm_domains).is_some_and(|llm| llm.len() > engine.len()) {
            return None;
        }
        Some(Classification::sourced(TrafficType::Organic, engine, "organic"))
    }

    fn llm_rule(&self, signals: &Signals) -> Option<Classification> {
        let host = signals.referrer_host.as_deref()?;
        let llm = page_url::best_match(host, &self.config.llm_domains)?;
        Some(Classification::sourced(TrafficType::Llm, llm, "llm"))
    }

    fn direct_rule(&self, signals: &Signals) -> Option<Classification> {
        match signals.referrer_host {
            None => Some(Classification::sourced(TrafficType::Direct, "direct", NONE)),
            Some(_) => None,
        }
    }

    fn referral_rule(&self, signals: &Signals) -> Option<Classification> {
        let host = signals.referrer_host.as_deref()?;
        Some(Classification::sourced(TrafficType::Referral, host, "referral"))
    }
}

/// Collapse a paid `utm_medium` into `cpc`, `display` or `paid`.
fn paid_medium(original: Option<&str>) -> &'static str {
    let Some(medium) = original.map(str::to_ascii_lowercase) else {
        return "paid";
    };
    if medium.contains("cpc") || medium.contains("ppc") {
        "cpc"
    } else if medium.contains("display") {
        "display"
    } else {
        "paid"
    }
}
