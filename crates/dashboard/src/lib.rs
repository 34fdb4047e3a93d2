//! Looker Studio deep links that clone a template report onto the caller's
//! own data sources.

pub mod builder;
pub mod datasource;

pub use builder::{extract_dashboard_id, sanitize_alias, DashboardLinkBuilder};
pub use datasource::{suggest_aggregation, Connector, DataSource, TableType};
