//! Error handling

use thiserror::Error;

pub type EngineResult<T> = Result<T, EngineError>;

/// Engine error taxonomy.
///
/// Insufficient data is deliberately *not* an error: the drift and fairness
/// evaluators return explicit outcome variants so callers can distinguish
/// "no drift" from "couldn't measure drift".
#[derive(Debug, Error)]
pub enum EngineError {
    // Input errors - reported immediately, no partial writes
    #[error("Model {0} not found")]
    ModelNotFound(i64),

    #[error("Invalid input: {0}")]
    Input(String),

    #[error("{0} already exists")]
    AlreadyExists(String),

    #[error("Validation failed: {0}")]
    Validation(String),

    // Policy errors - governance evaluation refuses rather than defaulting
    #[error("No active governance policy")]
    NoActivePolicy,

    #[error("Invalid governance policy: {0}")]
    InvalidPolicy(String),

    // Storage errors - in-flight batches are rolled back by the transaction
    #[error("Database error: {0}")]
    Database(#[from] sqlx::Error),
}

impl From<validator::ValidationErrors> for EngineError {
    fn from(err: validator::ValidationErrors) -> Self {
        EngineError::Validation(err.to_string())
    }
}
