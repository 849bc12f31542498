#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("validation error: {0}")]
    Validation(String),
    #[error(transparent)]
    Json(#[from] serde_json::Error),
}
