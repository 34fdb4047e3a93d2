//! Browser-side marketing attribution — traffic classification, first/last
//! touch persistence in cookie-like storage, and lead-form population.
//!
//! # Modules
//!
//! - [`classifier`] — Ordered rule table assigning source/medium/campaign and traffic type
//! - [`page_url`] — URL normalization, UTM extraction and domain-list matching
//! - [`store`] — Key-value store trait and the in-memory cookie jar
//! - [`touchpoints`] — First-touch / last-touch reconciliation under session semantics
//! - [`form`] — Copies stored touch records into lead-form fields
//! - [`retry`] — Bounded fixed-interval polling

pub mod classifier;
pub mod form;
pub mod page_url;
pub mod retry;
pub mod store;
pub mod touchpoints;

pub use classifier::{Classifier, PageContext};
pub use form::{FormFieldWriter, FormFields, FormPopulator};
pub use retry::{RetryOutcome, RetryPolicy};
pub use store::{Expiry, KeyValueStore, MemoryCookieJar};
pub use touchpoints::{reconcile, TouchPlan, TouchPointTracker, VisitOutcome};
