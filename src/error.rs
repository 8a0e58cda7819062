use thiserror::Error;

pub type Result<T> = std::result::Result<T, AppError>;

#[derive(Debug, Error)]
pub enum AppError {
    #[error("HTTP error: {0}")]
    Http(String),
    #[error("MQTT error: {0}")]
    Mqtt(String),
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
    #[error("No keys found in response.")]
    MissingKeys,
    #[error("No values found in response.")]
    EmptyWindow,
    #[error("incomplete phase data: {0}")]
    IncompleteData(String),
    #[error(transparent)]
    Other(#[from] anyhow::Error),
}
