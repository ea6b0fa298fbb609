use thiserror::Error;

/// Canonical result for the workspace.
pub type Result<T> = std::result::Result<T, Error>;

#[derive(Debug, Error)]
pub enum Error {
    #[error("Invalid configuration: {0}")]
    Config(String),

    /// An operator shape no rewrite rule or lowering handles. Always a
    /// planner gap, never bad data.
    #[error("Planner defect: {0}")]
    Plan(String),

    #[error("unsupported operator in physical lowering: {op}")]
    Unsupported { op: String },

    #[error("Internal invariant failed: {0}")]
    Invariant(String),

    #[error("Shape mismatch: {0}")]
    Shape(String),

    // The substrate is external; its failures are mapped here.
    #[error("Physical execution error: {0}")]
    Exec(String),

    #[error("Hashing error: {0}")]
    Hash(String),
}

impl From<serde_json::Error> for Error {
    fn from(e: serde_json::Error) -> Self {
        Error::Hash(e.to_string())
    }
}
