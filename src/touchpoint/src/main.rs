//! Touchpoint — marketing attribution from the command line.
//!
//! Classifies a page visit, replays visits against a persisted cookie jar,
//! renders the lead-form values a visitor would submit, and builds dashboard
//! links.

use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use anyhow::Context;
use clap::{Parser, Subcommand};
use tracing::{info, warn};

use touchpoint_core::config::AppConfig;
use touchpoint_core::DeviceInfo;
use touchpoint_dashboard::{DashboardLinkBuilder, DataSource};
use touchpoint_web_sdk::store::StoredCookie;
use touchpoint_web_sdk::{
    Classifier, FormFields, FormPopulator, KeyValueStore, MemoryCookieJar, PageContext, TouchPointTracker,
};

#[derive(Parser, Debug)]
#[command(name = "touchpoint")]
#[command(about = "Marketing attribution: traffic classification and first/last touch tracking")]
#[command(version)]
struct Cli {
    /// Config file (TOML, YAML or JSON); environment variables override it
    #[arg(long, global = true, env = "TOUCHPOINT_CONFIG")]
    config: Option<String>,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Classify a single page view and print the record
    Classify {
        #[arg(long)]
        url: String,
        #[arg(long, default_value = "")]
        referrer: String,
        #[arg(long)]
        language: Option<String>,
        #[arg(long)]
        platform: Option<String>,
    },
    /// Record a page view against a cookie jar file
    Visit {
        #[arg(long)]
        jar: PathBuf,
        #[arg(long)]
        url: String,
        #[arg(long, default_value = "")]
        referrer: String,
        /// Close the browser session before the visit
        #[arg(long, default_value_t = false)]
        end_session: bool,
    },
    /// Print the form values populated from a cookie jar file
    Form {
        #[arg(long)]
        jar: PathBuf,
    },
    /// Build a Looker Studio link that copies a template report
    DashboardLink {
        /// Template report id or URL (defaults to the configured template)
        #[arg(long)]
        template: Option<String>,
        #[arg(long, default_value_t = false)]
        embed: bool,
        #[arg(long)]
        name: Option<String>,
        /// Data source as JSON; repeat for several
        #[arg(long = "source")]
        sources: Vec<String>,
    },
}

fn load_jar(path: &Path, cookie_path: &str) -> anyhow::Result<MemoryCookieJar> {
    if !path.exists() {
        info!(jar = %path.display(), "starting with an empty cookie jar");
        return Ok(MemoryCookieJar::new().with_path(cookie_path));
    }
    let raw = std::fs::read_to_string(path).with_context(|| format!("reading {}", path.display()))?;
    let snapshot: BTreeMap<String, StoredCookie> =
        serde_json::from_str(&raw).with_context(|| format!("parsing {}", path.display()))?;
    Ok(MemoryCookieJar::restore(snapshot).with_path(cookie_path))
}

fn save_jar(path: &Path, jar: &MemoryCookieJar) -> anyhow::Result<()> {
    let raw = serde_json::to_string_pretty(&jar.snapshot())?;
    std::fs::write(path, raw).with_context(|| format!("writing {}", path.display()))
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "touchpoint=info,touchpoint_web_sdk=info".into()),
        )
        .json()
        .with_writer(std::io::stderr)
        .init();

    let cli = Cli::parse();

    let config = AppConfig::load(cli.config.as_deref()).unwrap_or_else(|e| {
        warn!(error = %e, "Failed to load config, using defaults");
        AppConfig::default()
    });

    match cli.command {
        Command::Classify {
            url,
            referrer,
            language,
            platform,
        } => {
            let mut device = DeviceInfo::default();
            if let Some(language) = language {
                device.language = language;
            }
            if let Some(platform) = platform {
                device.platform = platform;
            }
            let record = Classifier::new(config.classifier).classify(&PageContext::new(url, referrer).with_device(device));
            println!("{}", serde_json::to_string_pretty(&record)?);
        }
        Command::Visit {
            jar: jar_path,
            url,
            referrer,
            end_session,
        } => {
            let jar = Arc::new(load_jar(&jar_path, &config.storage.cookie_path)?);
            if end_session {
                jar.end_session();
            }
            let keys = [
                config.storage.session_key.clone(),
                config.storage.first_touch_key.clone(),
                config.storage.last_touch_key.clone(),
                config.storage.urls_key.clone(),
            ];
            let store: Arc<dyn KeyValueStore> = jar.clone();
            let tracker = TouchPointTracker::new(Classifier::new(config.classifier), config.storage, store);
            let outcome = tracker.on_page_load(&PageContext::new(url, referrer));
            save_jar(&jar_path, &jar)?;

            info!(
                new_session = outcome.is_new_session,
                internal = outcome.internal_navigation,
                first_touch_written = outcome.first_touch_written,
                last_touch_written = outcome.last_touch_written,
                "visit recorded"
            );
            let summary = serde_json::json!({
                "is_new_session": outcome.is_new_session,
                "internal_navigation": outcome.internal_navigation,
                "first_touch_written": outcome.first_touch_written,
                "last_touch_written": outcome.last_touch_written,
                "first_touch": outcome.first_touch,
                "last_touch": outcome.last_touch,
                "url_touch_points": outcome.url_touch_points,
                "set_cookie": keys.iter().filter_map(|key| jar.set_cookie_header(key)).collect::<Vec<_>>(),
            });
            println!("{}", serde_json::to_string_pretty(&summary)?);
        }
        Command::Form { jar: jar_path } => {
            let jar: Arc<dyn KeyValueStore> = Arc::new(load_jar(&jar_path, &config.storage.cookie_path)?);
            let mut form = FormFields::with_fields(config.form.fields.iter().cloned());
            form.add_field(config.form.json_field.clone());
            form.add_field(config.form.key_field.clone());

            let populator = FormPopulator::new(config.form, config.storage, jar);
            let outcome = populator.populate_when_ready(&mut form).await;
            if !outcome.succeeded() {
                anyhow::bail!("form fields were not populated");
            }
            println!("{}", serde_json::to_string_pretty(form.values())?);
        }
        Command::DashboardLink {
            template,
            embed,
            name,
            sources,
        } => {
            let mut builder = DashboardLinkBuilder::from_config(&config.dashboard).embed(embed);
            if let Some(template) = template {
                builder = builder.with_template(&template);
            }
            if let Some(name) = name {
                builder = builder.report_name(name);
            }
            for raw in &sources {
                let source: DataSource =
                    serde_json::from_str(raw).with_context(|| format!("invalid data source: {raw}"))?;
                builder = builder.data_source(source);
            }
            println!("{}", builder.build()?);
        }
    }

    Ok(())
}
