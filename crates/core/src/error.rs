use thiserror::Error;

pub type AttributionResult<T> = Result<T, AttributionError>;

/// Failures inside the attribution pipeline.
///
/// None of these reach the page: the tracker and the form writer log them and
/// fall back to "no attribution recorded this load".
#[derive(Error, Debug)]
pub enum AttributionError {
    #[error("URL parse error: {0}")]
    UrlParse(String),

    #[error("Storage read error: {0}")]
    StorageRead(String),

    #[error("Storage write error: {0}")]
    StorageWrite(String),

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("Configuration error: {0}")]
    Config(String),
}

impl From<config::ConfigError> for AttributionError {
    fn from(err: config::ConfigError) -> Self {
        AttributionError::Config(err.to_string())
    }
}
