//! First-touch / last-touch reconciliation under session semantics.
//!
//! [`reconcile`] is the pure decision: given what is stored and whether the
//! session is new, which records should be written. [`TouchPointTracker`]
//! applies that decision to a [`KeyValueStore`] once per page load and never
//! surfaces an error to the page.

use std::sync::Arc;

use chrono::{DateTime, Utc};
use tracing::{debug, info, warn};

use touchpoint_core::config::StorageConfig;
use touchpoint_core::{AttributionRecord, TouchType, UrlTouchPoints};

use crate::classifier::{Classifier, PageContext};
use crate::page_url;
use crate::store::{load_json, save_json, Expiry, KeyValueStore};

const SESSION_MARKER: &str = "1";

/// Writes decided for one page load.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TouchPlan {
    /// Referrer host equals the page host.
    pub internal_navigation: bool,
    /// New first-touch record to persist; `None` keeps what is stored.
    pub first_touch: Option<AttributionRecord>,
    /// New last-touch record to persist; `None` keeps what is stored.
    pub last_touch: Option<AttributionRecord>,
}

/// Decide which touch records a page load creates.
///
/// - a missing first touch is created once and never replaced
/// - a new session replaces the last touch unless the visitor arrived from
///   another page of the same site; a missing last touch is always created
pub fn reconcile(
    classifier: &Classifier,
    ctx: &PageContext,
    first_touch: Option<&AttributionRecord>,
    last_touch: Option<&AttributionRecord>,
    is_new_session: bool,
    now: DateTime<Utc>,
) -> TouchPlan {
    let internal_navigation = is_internal_navigation(ctx);
    let needs_first = first_touch.is_none();
    let needs_last = last_touch.is_none() || (is_new_session && !internal_navigation);

    if !(needs_first || needs_last) {
        return TouchPlan {
            internal_navigation,
            first_touch: None,
            last_touch: None,
        };
    }

    let record = classifier.classify_at(ctx, now);
    TouchPlan {
        internal_navigation,
        first_touch: needs_first.then(|| record.tagged(TouchType::FirstTouch)),
        last_touch: needs_last.then(|| record.tagged(TouchType::LastTouch)),
    }
}

/// True when the referrer is another page of the same host.
pub fn is_internal_navigation(ctx: &PageContext) -> bool {
    if ctx.referrer.trim().is_empty() {
        return false;
    }
    match (page_url::host_of(&ctx.url), page_url::host_of(&ctx.referrer)) {
        (Ok(page), Ok(referrer)) => !page.is_empty() && page == referrer,
        _ => false,
    }
}

/// What a page load observed and persisted.
#[derive(Debug, Clone, Default)]
pub struct VisitOutcome {
    pub is_new_session: bool,
    pub internal_navigation: bool,
    pub first_touch_written: bool,
    pub last_touch_written: bool,
    /// Effective first touch after this load.
    pub first_touch: Option<AttributionRecord>,
    /// Effective last touch after this load.
    pub last_touch: Option<AttributionRecord>,
    pub url_touch_points: Option<UrlTouchPoints>,
}

/// Applies touch-point reconciliation against a key-value store.
pub struct TouchPointTracker {
    classifier: Classifier,
    storage: StorageConfig,
    store: Arc<dyn KeyValueStore>,
}

impl TouchPointTracker {
    pub fn new(classifier: Classifier, storage: StorageConfig, store: Arc<dyn KeyValueStore>) -> Self {
        Self {
            classifier,
            storage,
            store,
        }
    }

    pub fn store(&self) -> &Arc<dyn KeyValueStore> {
        &self.store
    }

    /// Evaluate one page load ("content ready").
    pub fn on_page_load(&self, ctx: &PageContext) -> VisitOutcome {
        self.on_page_load_at(ctx, Utc::now())
    }

    pub fn on_page_load_at(&self, ctx: &PageContext, now: DateTime<Utc>) -> VisitOutcome {
        let is_new_session = self.begin_session();
        let stored_first = self.load_record(&self.storage.first_touch_key);
        let stored_last = self.load_record(&self.storage.last_touch_key);

        let plan = reconcile(
            &self.classifier,
            ctx,
            stored_first.as_ref(),
            stored_last.as_ref(),
            is_new_session,
            now,
        );

        let mut outcome = VisitOutcome {
            is_new_session,
            internal_navigation: plan.internal_navigation,
            first_touch: stored_first,
            last_touch: stored_last,
            ..Default::default()
        };

        if let Some(record) = plan.first_touch {
            let expiry = Expiry::days(self.storage.first_touch_ttl_days);
            outcome.first_touch_written = self.write_record(&self.storage.first_touch_key, &record, expiry);
            outcome.first_touch = Some(record);
        }
        if let Some(record) = plan.last_touch {
            let expiry = Expiry::from_ttl_days(self.storage.last_touch_ttl_days);
            outcome.last_touch_written = self.write_record(&self.storage.last_touch_key, &record, expiry);
            outcome.last_touch = Some(record);
        }

        outcome.url_touch_points = self.update_url_touch_points(ctx, is_new_session, plan.internal_navigation);

        debug!(
            is_new_session,
            internal_navigation = outcome.internal_navigation,
            first_touch_written = outcome.first_touch_written,
            last_touch_written = outcome.last_touch_written,
            "page load evaluated"
        );
        outcome
    }

    /// Returns true when no session marker exists yet, creating it.
    fn begin_session(&self) -> bool {
        let key = &self.storage.session_key;
        match self.store.get(key) {
            Ok(Some(_)) => false,
            Ok(None) => {
                self.mark_session(key);
                true
            }
            Err(e) => {
                warn!(key = %key, error = %e, "session marker unreadable, assuming new session");
                self.mark_session(key);
                true
            }
        }
    }

    fn mark_session(&self, key: &str) {
        if let Err(e) = save_json(self.store.as_ref(), key, &SESSION_MARKER, Expiry::Session) {
            warn!(key = %key, error = %e, "failed to set session marker");
        }
    }

    fn load_record(&self, key: &str) -> Option<AttributionRecord> {
        load_json(self.store.as_ref(), key).unwrap_or_else(|e| {
            warn!(key = %key, error = %e, "stored touch record unreadable, treating as absent");
            None
        })
    }

    fn write_record(&self, key: &str, record: &AttributionRecord, expiry: Expiry) -> bool {
        match save_json(self.store.as_ref(), key, record, expiry) {
            Ok(()) => {
                info!(
                    key = %key,
                    touch_type = ?record.touch_type,
                    traffic_type = %record.traffic_type,
                    utm_source = %record.utm_source,
                    "touch record persisted"
                );
                true
            }
            Err(e) => {
                warn!(key = %key, error = %e, "failed to persist touch record, skipping");
                false
            }
        }
    }

    fn update_url_touch_points(
        &self,
        ctx: &PageContext,
        is_new_session: bool,
        internal_navigation: bool,
    ) -> Option<UrlTouchPoints> {
        let current = match page_url::normalize(&ctx.url) {
            Ok(current) => current,
            Err(e) => {
                warn!(error = %e, "page URL unparseable, URL touch points unchanged");
                return None;
            }
        };

        let key = &self.storage.urls_key;
        let saved: UrlTouchPoints = load_json(self.store.as_ref(), key)
            .unwrap_or_else(|e| {
                warn!(key = %key, error = %e, "stored URL touch points unreadable");
                None
            })
            .unwrap_or_default();

        let first_url = if saved.first_url.is_empty() {
            current.clone()
        } else {
            saved.first_url
        };
        let last_url = if saved.last_url.is_empty() || (is_new_session && !internal_navigation) {
            current.clone()
        } else {
            saved.last_url
        };
        let points = UrlTouchPoints {
            first_url,
            last_url,
            current_url: current,
        };

        let expiry = Expiry::days(self.storage.urls_ttl_days);
        if let Err(e) = save_json(self.store.as_ref(), key, &points, expiry) {
            warn!(key = %key, error = %e, "failed to persist URL touch points");
        }
        Some(points)
    }
}
