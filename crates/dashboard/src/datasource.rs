//! Data source definitions attached to a dashboard link.

use serde::{Deserialize, Serialize};

/// Search Console table a data source reads from.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum TableType {
    /// Property-level impressions.
    #[default]
    SiteImpression,
    /// Page-level impressions.
    UrlImpression,
}

impl TableType {
    pub fn as_str(&self) -> &'static str {
        match self {
            TableType::SiteImpression => "SITE_IMPRESSION",
            TableType::UrlImpression => "URL_IMPRESSION",
        }
    }

    /// Alias used when neither a known nor a user alias exists.
    pub fn fallback_alias(&self) -> &'static str {
        match self {
            TableType::SiteImpression => "0",
            TableType::UrlImpression => "1",
        }
    }
}

/// Connector-specific settings. Empty strings count as unset.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "connector", rename_all = "camelCase")]
pub enum Connector {
    SearchConsole {
        #[serde(default)]
        table_type: TableType,
        #[serde(default)]
        property_url: Option<String>,
        #[serde(default)]
        search_type: Option<String>,
        #[serde(default)]
        aggregation_type: Option<String>,
    },
    GoogleAnalytics4 {
        #[serde(default)]
        property_id: Option<String>,
    },
    BigQuery {
        #[serde(default)]
        project_id: Option<String>,
        #[serde(default)]
        dataset_id: Option<String>,
        #[serde(default)]
        table_id: Option<String>,
        #[serde(default, rename = "type")]
        kind: Option<String>,
    },
    GoogleSheets {
        #[serde(default)]
        spreadsheet_id: Option<String>,
    },
    Mysql {
        #[serde(default)]
        sql: Option<String>,
    },
    Postgresql {
        #[serde(default)]
        sql: Option<String>,
    },
}

impl Connector {
    /// Connector id as it appears in the link.
    pub fn id(&self) -> &'static str {
        match self {
            Connector::SearchConsole { .. } => "searchConsole",
            Connector::GoogleAnalytics4 { .. } => "googleAnalytics4",
            Connector::BigQuery { .. } => "bigQuery",
            Connector::GoogleSheets { .. } => "googleSheets",
            Connector::Mysql { .. } => "mysql",
            Connector::Postgresql { .. } => "postgresql",
        }
    }

    pub fn is_search_console(&self) -> bool {
        matches!(self, Connector::SearchConsole { .. })
    }
}

/// One data source slot of the template report.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DataSource {
    #[serde(default)]
    pub name: String,
    #[serde(default)]
    pub alias: Option<String>,
    #[serde(flatten)]
    pub connector: Connector,
}

impl DataSource {
    pub fn new(name: impl Into<String>, connector: Connector) -> Self {
        Self {
            name: name.into(),
            alias: None,
            connector,
        }
    }

    pub fn with_alias(mut self, alias: impl Into<String>) -> Self {
        self.alias = Some(alias.into());
        self
    }
}

/// Aggregation that fits the chosen table: property-level tables aggregate
/// by property, page-level tables by page.
pub fn suggest_aggregation(table_type: TableType, current: &str) -> &str {
    match table_type {
        TableType::SiteImpression if matches!(current, "byPage" | "byQuery") => "byProperty",
        TableType::UrlImpression if matches!(current, "byProperty" | "byCountry" | "byDevice") => "byPage",
        _ => current,
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;

    #[test]
    fn test_suggest_aggregation() {
        assert_eq!(suggest_aggregation(TableType::SiteImpression, "byPage"), "byProperty");
        assert_eq!(suggest_aggregation(TableType::SiteImpression, "byCountry"), "byCountry");
        assert_eq!(suggest_aggregation(TableType::UrlImpression, "byDevice"), "byPage");
        assert_eq!(suggest_aggregation(TableType::UrlImpression, "byQuery"), "byQuery");
    }

    #[test]
    fn test_data_source_from_json() {
        let ds: DataSource = serde_json::from_str(
            r#"{"name": "Main site", "connector": "searchConsole", "table_type": "URL_IMPRESSION", "property_url": "example.com"}"#,
        )
        .unwrap();
        assert_eq!(ds.name, "Main site");
        assert!(ds.connector.is_search_console());
        assert_eq!(
            ds.connector,
            Connector::SearchConsole {
                table_type: TableType::UrlImpression,
                property_url: Some("example.com".into()),
                search_type: None,
                aggregation_type: None,
            }
        );

        let bq: DataSource = serde_json::from_str(
            r#"{"name": "Warehouse", "alias": "wh", "connector": "bigQuery", "project_id": "p", "type": "TABLE"}"#,
        )
        .unwrap();
        assert_eq!(bq.connector.id(), "bigQuery");
        assert_eq!(bq.alias.as_deref(), Some("wh"));
    }
}
