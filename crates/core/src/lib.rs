//! Shared building blocks for touchpoint attribution: the attribution record
//! value types, the error taxonomy and layered configuration.

pub mod config;
pub mod error;
pub mod types;

pub use config::AppConfig;
pub use error::{AttributionError, AttributionResult};
pub use types::{AttributionRecord, DeviceInfo, TouchType, TrafficType, UrlTouchPoints, UtmParams};
