//! Lead-form population — copies the stored first-touch and last-touch
//! records into hidden form fields before submission.
//!
//! Each configured field receives `FT:<first value>||LT:<last value>`; an
//! optional JSON field receives both records verbatim.

use std::collections::BTreeMap;
use std::sync::Arc;
use std::time::Duration;

use serde_json::{json, Value};
use tracing::{debug, info, warn};

use touchpoint_core::config::{FormConfig, StorageConfig};
use touchpoint_core::AttributionRecord;

use crate::retry::{RetryOutcome, RetryPolicy};
use crate::store::{load_json, KeyValueStore};

/// Something that holds named input fields, like a rendered form.
pub trait FormFieldWriter {
    fn has_field(&self, id: &str) -> bool;

    /// Set a field's value. Returns false when the field does not exist.
    fn set_value(&mut self, id: &str, value: &str) -> bool;
}

/// In-memory form: a fixed set of field ids and their values.
#[derive(Debug, Clone, Default)]
pub struct FormFields {
    values: BTreeMap<String, String>,
}

impl FormFields {
    pub fn with_fields<I, S>(ids: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            values: ids.into_iter().map(|id| (id.into(), String::new())).collect(),
        }
    }

    pub fn add_field(&mut self, id: impl Into<String>) {
        self.values.entry(id.into()).or_default();
    }

    pub fn value(&self, id: &str) -> Option<&str> {
        self.values.get(id).map(String::as_str)
    }

    pub fn values(&self) -> &BTreeMap<String, String> {
        &self.values
    }
}

impl FormFieldWriter for FormFields {
    fn has_field(&self, id: &str) -> bool {
        self.values.contains_key(id)
    }

    fn set_value(&mut self, id: &str, value: &str) -> bool {
        match self.values.get_mut(id) {
            Some(slot) => {
                *slot = value.to_string();
                true
            }
            None => false,
        }
    }
}

/// Result of one population pass.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct PopulateReport {
    pub fields_written: Vec<String>,
    pub missing_fields: Vec<String>,
    pub json_written: bool,
}

/// `FT:<first>||LT:<last>` for one field; absent values render empty.
pub fn combined_value(
    first_touch: Option<&AttributionRecord>,
    last_touch: Option<&AttributionRecord>,
    field: &str,
) -> String {
    let value = |record: Option<&AttributionRecord>| {
        record.and_then(|r| r.field(field)).unwrap_or_default()
    };
    format!("FT:{}||LT:{}", value(first_touch), value(last_touch))
}

/// `{"first_touch": {...}, "last_touch": {...}}`; absent records are `{}`.
pub fn attribution_json(
    first_touch: Option<&AttributionRecord>,
    last_touch: Option<&AttributionRecord>,
) -> Value {
    let as_value = |record: Option<&AttributionRecord>| {
        record
            .and_then(|r| serde_json::to_value(r).ok())
            .unwrap_or_else(|| json!({}))
    };
    json!({
        "first_touch": as_value(first_touch),
        "last_touch": as_value(last_touch),
    })
}

/// Reads both touch records from storage and writes them into a form.
pub struct FormPopulator {
    form: FormConfig,
    storage: StorageConfig,
    store: Arc<dyn KeyValueStore>,
}

impl FormPopulator {
    pub fn new(form: FormConfig, storage: StorageConfig, store: Arc<dyn KeyValueStore>) -> Self {
        Self { form, storage, store }
    }

    /// Polling schedule derived from the form config.
    pub fn retry_policy(&self) -> RetryPolicy {
        RetryPolicy::from_timeout(
            Duration::from_millis(self.form.poll_interval_ms),
            Duration::from_millis(self.form.poll_timeout_ms),
        )
    }

    fn load(&self, key: &str) -> Option<AttributionRecord> {
        load_json(self.store.as_ref(), key).unwrap_or_else(|e| {
            warn!(key = %key, error = %e, "stored touch record unreadable, using empty values");
            None
        })
    }

    /// Write every configured field that exists in the form.
    pub fn populate(&self, writer: &mut dyn FormFieldWriter) -> PopulateReport {
        let first_touch = self.load(&self.storage.first_touch_key);
        let last_touch = self.load(&self.storage.last_touch_key);
        let mut report = PopulateReport::default();

        for field in &self.form.fields {
            let value = combined_value(first_touch.as_ref(), last_touch.as_ref(), field);
            if writer.set_value(field, &value) {
                report.fields_written.push(field.clone());
            } else {
                debug!(field = %field, "form field not present");
                report.missing_fields.push(field.clone());
            }
        }

        if writer.has_field(&self.form.json_field) {
            let blob = attribution_json(first_touch.as_ref(), last_touch.as_ref()).to_string();
            report.json_written = writer.set_value(&self.form.json_field, &blob);
        }

        report
    }

    /// Wait for the key field to render, then populate. Gives up silently
    /// once the polling window is exhausted.
    pub async fn populate_when_ready<W: FormFieldWriter>(&self, writer: &mut W) -> RetryOutcome {
        let key_field = self.form.key_field.clone();
        let policy = self.retry_policy();
        let outcome = policy
            .run(|| {
                if !writer.has_field(&key_field) {
                    debug!(field = %key_field, "key form field not rendered yet");
                    return false;
                }
                let report = self.populate(&mut *writer);
                debug!(
                    written = report.fields_written.len(),
                    missing = report.missing_fields.len(),
                    json = report.json_written,
                    "form fields populated"
                );
                true
            })
            .await;

        match outcome {
            RetryOutcome::Succeeded { attempts } => info!(attempts, "form fields populated"),
            RetryOutcome::GaveUp { attempts } => {
                warn!(attempts, window_ms = policy.window().as_millis() as u64, "form fields never appeared")
            }
        }
        outcome
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;
    use std::cell::Cell;

    use crate::classifier::{Classifier, PageContext};
    use crate::store::{save_json, Expiry, MemoryCookieJar};
    use touchpoint_core::TouchType;

    fn seeded_jar() -> Arc<MemoryCookieJar> {
        let jar = Arc::new(MemoryCookieJar::new());
        let c = Classifier::default();
        let first = c
            .classify(&PageContext::new("https://example.com/?utm_source=newsletter&utm_medium=email", ""))
            .tagged(TouchType::FirstTouch);
        let last = c
            .classify(&PageContext::new("https://example.com/blog", "https://www.google.com/"))
            .tagged(TouchType::LastTouch);
        save_json(jar.as_ref(), "m8l-first-touch", &first, Expiry::days(365)).unwrap();
        save_json(jar.as_ref(), "m8l-last-touch", &last, Expiry::days(30)).unwrap();
        jar
    }

    fn populator(jar: Arc<MemoryCookieJar>) -> FormPopulator {
        FormPopulator::new(FormConfig::default(), StorageConfig::default(), jar)
    }

    #[test]
    fn test_combined_values() {
        let mut form = FormFields::with_fields(["utm_source", "utm_medium", "utm_campaign", "traffic_type"]);
        let report = populator(seeded_jar()).populate(&mut form);

        assert_eq!(form.value("utm_source"), Some("FT:newsletter||LT:google.com"));
        assert_eq!(form.value("utm_medium"), Some("FT:email||LT:organic"));
        assert_eq!(form.value("utm_campaign"), Some("FT:(not-set)||LT:"));
        assert_eq!(form.value("traffic_type"), Some("FT:url_utm||LT:organic"));
        assert_eq!(report.fields_written.len(), 4);
        assert!(report.missing_fields.contains(&"landing_page".to_string()));
        assert!(!report.json_written);
    }

    #[test]
    fn test_json_blob_field() {
        let mut form = FormFields::with_fields(["attribution_data"]);
        let report = populator(seeded_jar()).populate(&mut form);
        assert!(report.json_written);

        let blob: Value = serde_json::from_str(form.value("attribution_data").unwrap()).unwrap();
        assert_eq!(blob["first_touch"]["utm_source"], "newsletter");
        assert_eq!(blob["last_touch"]["touch_type"], "last_touch");
    }

    #[test]
    fn test_no_stored_records_yields_empty_values() {
        let jar = Arc::new(MemoryCookieJar::new());
        let mut form = FormFields::with_fields(["utm_source", "attribution_data"]);
        populator(jar).populate(&mut form);
        assert_eq!(form.value("utm_source"), Some("FT:||LT:"));
        assert_eq!(
            form.value("attribution_data"),
            Some(r#"{"first_touch":{},"last_touch":{}}"#)
        );
    }

    #[tokio::test(start_paused = true)]
    async fn test_populate_when_ready_gives_up() {
        let mut form = FormFields::with_fields(["email"]);
        let outcome = populator(seeded_jar()).populate_when_ready(&mut form).await;
        assert_eq!(outcome, RetryOutcome::GaveUp { attempts: 20 });
        assert_eq!(form.value("email"), Some(""));
    }

    /// Form whose fields render after a number of checks.
    struct LateForm {
        checks_until_ready: Cell<u32>,
        fields: FormFields,
    }

    impl FormFieldWriter for LateForm {
        fn has_field(&self, id: &str) -> bool {
            let remaining = self.checks_until_ready.get();
            if remaining > 0 {
                self.checks_until_ready.set(remaining - 1);
                return false;
            }
            self.fields.has_field(id)
        }

        fn set_value(&mut self, id: &str, value: &str) -> bool {
            self.fields.set_value(id, value)
        }
    }

    #[tokio::test(start_paused = true)]
    async fn test_populate_when_ready_waits_for_render() {
        let mut form = LateForm {
            checks_until_ready: Cell::new(3),
            fields: FormFields::with_fields(["utm_source"]),
        };
        let outcome = populator(seeded_jar()).populate_when_ready(&mut form).await;
        assert_eq!(outcome, RetryOutcome::Succeeded { attempts: 4 });
        assert_eq!(form.fields.value("utm_source"), Some("FT:newsletter||LT:google.com"));
    }
}
