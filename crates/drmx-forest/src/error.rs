use thiserror::Error;

pub type Result<T> = std::result::Result<T, ForestError>;

#[derive(Debug, Error)]
pub enum ForestError {
    #[error("io: {0}")]
    Io(#[from] std::io::Error),

    #[error("side file: {0}")]
    Json(#[from] serde_json::Error),

    #[error("invalid: {0}")]
    Invalid(String),
}
