//! Looker Studio "create report" link builder.
//!
//! A link copies a template report and rebinds its data sources:
//!
//! ```text
//! https://lookerstudio.google.com/reporting/create?c.reportId=<id>&r.reportName=<name>
//!     &ds.<alias>.datasourceName=<name>&ds.<alias>.connector=<connector>&...
//! ```
//!
//! Search Console sources are emitted first and bind to the template's known
//! aliases; other connectors follow with numbered aliases starting at 300.

use std::collections::HashMap;

use tracing::debug;
use uuid::Uuid;

use touchpoint_core::config::DashboardConfig;
use touchpoint_core::{AttributionError, AttributionResult};

use crate::datasource::{Connector, DataSource, TableType};

const CREATE_URL: &str = "https://lookerstudio.google.com/reporting/create?";
const EMBED_CREATE_URL: &str = "https://lookerstudio.google.com/embed/reporting/create?";
const FIRST_NUMBERED_ALIAS: u32 = 300;
const UUID_LEN: usize = 36;

/// First UUID (`8-4-4-4-12` hex, any case) inside a URL or string.
pub fn extract_dashboard_id(input: &str) -> Option<&str> {
    (0..input.len().saturating_sub(UUID_LEN - 1))
        .filter_map(|start| input.get(start..start + UUID_LEN))
        .find(|candidate| Uuid::try_parse(candidate).is_ok())
}

/// Keep only ASCII letters and digits.
pub fn sanitize_alias(alias: &str) -> String {
    alias.chars().filter(char::is_ascii_alphanumeric).collect()
}

fn present(value: &Option<String>) -> Option<&str> {
    value.as_deref().filter(|v| !v.is_empty())
}

fn encode(value: &str) -> String {
    urlencoding::encode(value).into_owned()
}

#[derive(Debug, Clone, Default)]
pub struct DashboardLinkBuilder {
    template_id: String,
    embed: bool,
    report_name: Option<String>,
    data_sources: Vec<DataSource>,
    /// Template id -> table type -> alias.
    known_aliases: HashMap<String, HashMap<String, String>>,
}

impl DashboardLinkBuilder {
    /// `template` may be a bare report id or any URL containing one.
    pub fn new(template: &str) -> Self {
        Self::default().with_template(template)
    }

    /// Builder on the configured default template and alias table.
    pub fn from_config(config: &DashboardConfig) -> Self {
        Self {
            known_aliases: config.known_aliases.clone(),
            ..Self::default()
        }
        .with_template(&config.default_template_id)
    }

    pub fn with_template(mut self, template: &str) -> Self {
        let template = template.trim();
        self.template_id = extract_dashboard_id(template)
            .unwrap_or(template)
            .to_string();
        self
    }

    pub fn embed(mut self, embed: bool) -> Self {
        self.embed = embed;
        self
    }

    pub fn report_name(mut self, name: impl Into<String>) -> Self {
        let name = name.into();
        self.report_name = (!name.is_empty()).then_some(name);
        self
    }

    pub fn data_source(mut self, source: DataSource) -> Self {
        self.data_sources.push(source);
        self
    }

    pub fn known_aliases(mut self, aliases: HashMap<String, HashMap<String, String>>) -> Self {
        self.known_aliases = aliases;
        self
    }

    pub fn template_id(&self) -> &str {
        &self.template_id
    }

    /// Known alias of the template's table, for UI hints.
    pub fn known_alias(&self, table_type: TableType) -> Option<&str> {
        self.known_aliases
            .get(&self.template_id)
            .and_then(|aliases| aliases.get(table_type.as_str()))
            .map(String::as_str)
    }

    /// Alias of a Search Console source: the template's known alias, else the
    /// sanitized user alias, else the table's fallback. `None` when the user
    /// alias sanitizes to nothing.
    pub fn resolve_alias(&self, table_type: TableType, user_alias: Option<&str>) -> Option<String> {
        if let Some(known) = self.known_alias(table_type) {
            return Some(known.to_string());
        }
        match user_alias.filter(|a| !a.is_empty()) {
            Some(alias) => Some(sanitize_alias(alias)).filter(|a| !a.is_empty()),
            None => Some(table_type.fallback_alias().to_string()),
        }
    }

    /// Query parameters in link order.
    pub fn params(&self) -> AttributionResult<Vec<String>> {
        if self.template_id.is_empty() {
            return Err(AttributionError::Config("template report id is required".into()));
        }

        let mut params = vec![format!("c.reportId={}", self.template_id)];
        if let Some(name) = &self.report_name {
            params.push(format!("r.reportName={}", encode(name)));
        }

        for source in self.data_sources.iter().filter(|s| s.connector.is_search_console()) {
            self.push_search_console(source, &mut params);
        }

        let mut next_alias = FIRST_NUMBERED_ALIAS;
        for source in self.data_sources.iter().filter(|s| !s.connector.is_search_console()) {
            if source.name.is_empty() {
                debug!(connector = source.connector.id(), "skipping unnamed data source");
                continue;
            }
            let alias = match present(&source.alias) {
                Some(user) => sanitize_alias(user),
                None => next_alias.to_string(),
            };
            if alias.is_empty() {
                debug!(name = %source.name, "skipping data source with unusable alias");
                continue;
            }
            push_common(&mut params, &alias, source);
            push_connector_params(&mut params, &alias, &source.connector);
            next_alias += 1;
        }

        Ok(params)
    }

    /// The complete link.
    pub fn build(&self) -> AttributionResult<String> {
        let base = if self.embed { EMBED_CREATE_URL } else { CREATE_URL };
        let url = format!("{base}{}", self.params()?.join("&"));
        debug!(template_id = %self.template_id, sources = self.data_sources.len(), "dashboard link built");
        Ok(url)
    }

    fn push_search_console(&self, source: &DataSource, params: &mut Vec<String>) {
        let Connector::SearchConsole {
            table_type,
            property_url,
            search_type,
            aggregation_type,
        } = &source.connector
        else {
            return;
        };
        if source.name.is_empty() {
            debug!("skipping unnamed Search Console data source");
            return;
        }
        let Some(alias) = self.resolve_alias(*table_type, source.alias.as_deref()) else {
            debug!(name = %source.name, "skipping data source with unusable alias");
            return;
        };

        push_common(params, &alias, source);
        if let Some(url) = present(property_url) {
            let site_url = if !url.contains("://") && !url.starts_with("sc-domain:") {
                format!("sc-domain:{url}")
            } else {
                url.to_string()
            };
            params.push(format!("ds.{alias}.siteUrl={}", encode(&site_url)));
        }
        if let Some(search_type) = present(search_type) {
            params.push(format!("ds.{alias}.searchType={}", search_type.to_uppercase()));
        }
        params.push(format!("ds.{alias}.tableType={}", table_type.as_str()));
        if let Some(aggregation) = present(aggregation_type) {
            params.push(format!("ds.{alias}.dimensionFilterExp={aggregation}"));
        }
    }
}

fn push_common(params: &mut Vec<String>, alias: &str, source: &DataSource) {
    params.push(format!("ds.{alias}.datasourceName={}", encode(&source.name)));
    params.push(format!("ds.{alias}.connector={}", source.connector.id()));
}

fn push_connector_params(params: &mut Vec<String>, alias: &str, connector: &Connector) {
    let mut push = |key: &str, value: &Option<String>, encoded: bool| {
        if let Some(v) = present(value) {
            let v = if encoded { encode(v) } else { v.to_string() };
            params.push(format!("ds.{alias}.{key}={v}"));
        }
    };
    match connector {
        Connector::GoogleAnalytics4 { property_id } => push("propertyId", property_id, true),
        Connector::BigQuery {
            project_id,
            dataset_id,
            table_id,
            kind,
        } => {
            push("projectId", project_id, true);
            push("datasetId", dataset_id, true);
            push("tableId", table_id, true);
            push("type", kind, false);
        }
        Connector::GoogleSheets { spreadsheet_id } => push("spreadsheetId", spreadsheet_id, true),
        Connector::Mysql { sql } | Connector::Postgresql { sql } => push("sql", sql, true),
        Connector::SearchConsole { .. } => {}
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;

    const TEMPLATE: &str = "d29cdb49-1055-460b-882c-9a8630051579";

    fn search_console(name: &str, table_type: TableType) -> DataSource {
        DataSource::new(
            name,
            Connector::SearchConsole {
                table_type,
                property_url: Some("example.com".into()),
                search_type: Some("web".into()),
                aggregation_type: Some("byProperty".into()),
            },
        )
    }

    #[test]
    fn test_extract_dashboard_id() {
        assert_eq!(
            extract_dashboard_id(&format!("https://lookerstudio.google.com/reporting/{TEMPLATE}/page/abc")),
            Some(TEMPLATE)
        );
        assert_eq!(
            extract_dashboard_id("id=D29CDB49-1055-460B-882C-9A8630051579"),
            Some("D29CDB49-1055-460B-882C-9A8630051579")
        );
        assert_eq!(extract_dashboard_id("x9d29cdb49-1055-460b-882c-9a8630051579"), Some(TEMPLATE));
        assert_eq!(extract_dashboard_id("no id here"), None);
        assert_eq!(extract_dashboard_id(""), None);
        assert_eq!(extract_dashboard_id("é"), None);
    }

    #[test]
    fn test_sanitize_alias() {
        assert_eq!(sanitize_alias("my alias: 1"), "myalias1");
        assert_eq!(sanitize_alias(" :: "), "");
    }

    #[test]
    fn test_template_from_url() {
        let b = DashboardLinkBuilder::new(&format!("https://lookerstudio.google.com/u/0/reporting/{TEMPLATE}"));
        assert_eq!(b.template_id(), TEMPLATE);
        assert_eq!(DashboardLinkBuilder::new("custom-report").template_id(), "custom-report");
    }

    #[test]
    fn test_missing_template_is_config_error() {
        assert!(matches!(DashboardLinkBuilder::new("  ").build(), Err(AttributionError::Config(_))));
    }

    #[test]
    fn test_resolve_alias_precedence() {
        let known = DashboardLinkBuilder::from_config(&DashboardConfig::default());
        assert_eq!(known.resolve_alias(TableType::UrlImpression, Some("mine")).as_deref(), Some("269"));

        let unknown = DashboardLinkBuilder::new("other-template");
        assert_eq!(unknown.resolve_alias(TableType::UrlImpression, Some("my-ds")).as_deref(), Some("myds"));
        assert_eq!(unknown.resolve_alias(TableType::UrlImpression, Some("--")), None);
        assert_eq!(unknown.resolve_alias(TableType::UrlImpression, None).as_deref(), Some("1"));
        assert_eq!(unknown.resolve_alias(TableType::SiteImpression, Some("")).as_deref(), Some("0"));
    }

    #[test]
    fn test_search_console_link_with_known_aliases() {
        let url = DashboardLinkBuilder::from_config(&DashboardConfig::default())
            .report_name("Q3 report")
            .data_source(search_console("Site data", TableType::SiteImpression))
            .data_source(search_console("", TableType::UrlImpression))
            .build()
            .unwrap();

        assert_eq!(
            url,
            format!(
                "https://lookerstudio.google.com/reporting/create?c.reportId={TEMPLATE}\
                 &r.reportName=Q3%20report\
                 &ds.0.datasourceName=Site%20data&ds.0.connector=searchConsole\
                 &ds.0.siteUrl=sc-domain%3Aexample.com&ds.0.searchType=WEB\
                 &ds.0.tableType=SITE_IMPRESSION&ds.0.dimensionFilterExp=byProperty"
            )
        );
    }

    #[test]
    fn test_full_property_url_is_not_prefixed() {
        let source = DataSource::new(
            "Pages",
            Connector::SearchConsole {
                table_type: TableType::UrlImpression,
                property_url: Some("https://example.com/".into()),
                search_type: None,
                aggregation_type: None,
            },
        );
        let params = DashboardLinkBuilder::new("other").data_source(source).params().unwrap();
        assert!(params.contains(&"ds.1.siteUrl=https%3A%2F%2Fexample.com%2F".to_string()));
        assert!(params.contains(&"ds.1.tableType=URL_IMPRESSION".to_string()));
        assert!(!params.iter().any(|p| p.contains("searchType")));
    }

    #[test]
    fn test_other_connectors_follow_search_console_with_numbered_aliases() {
        let params = DashboardLinkBuilder::new(TEMPLATE)
            .embed(true)
            .data_source(DataSource::new(
                "GA",
                Connector::GoogleAnalytics4 {
                    property_id: Some("123".into()),
                },
            ))
            .data_source(search_console("SC", TableType::SiteImpression))
            .data_source(DataSource::new("", Connector::GoogleSheets { spreadsheet_id: None }))
            .data_source(
                DataSource::new(
                    "Warehouse",
                    Connector::BigQuery {
                        project_id: Some("proj".into()),
                        dataset_id: Some("ds".into()),
                        table_id: Some("events".into()),
                        kind: Some("TABLE".into()),
                    },
                )
                .with_alias("wh_1"),
            )
            .data_source(DataSource::new(
                "Orders",
                Connector::Postgresql {
                    sql: Some("select * from orders".into()),
                },
            ))
            .params()
            .unwrap();

        assert_eq!(
            params,
            vec![
                format!("c.reportId={TEMPLATE}"),
                "ds.0.datasourceName=SC".to_string(),
                "ds.0.connector=searchConsole".to_string(),
                "ds.0.siteUrl=sc-domain%3Aexample.com".to_string(),
                "ds.0.searchType=WEB".to_string(),
                "ds.0.tableType=SITE_IMPRESSION".to_string(),
                "ds.0.dimensionFilterExp=byProperty".to_string(),
                "ds.300.datasourceName=GA".to_string(),
                "ds.300.connector=googleAnalytics4".to_string(),
                "ds.300.propertyId=123".to_string(),
                "ds.wh1.datasourceName=Warehouse".to_string(),
                "ds.wh1.connector=bigQuery".to_string(),
                "ds.wh1.projectId=proj".to_string(),
                "ds.wh1.datasetId=ds".to_string(),
                "ds.wh1.tableId=events".to_string(),
                "ds.wh1.type=TABLE".to_string(),
                "ds.302.datasourceName=Orders".to_string(),
                "ds.302.connector=postgresql".to_string(),
                "ds.302.sql=select%20%2A%20from%20orders".to_string(),
            ]
        );
    }

    #[test]
    fn test_embed_base_url() {
        let url = DashboardLinkBuilder::new(TEMPLATE).embed(true).build().unwrap();
        assert_eq!(url, format!("https://lookerstudio.google.com/embed/reporting/create?c.reportId={TEMPLATE}"));
    }
}
