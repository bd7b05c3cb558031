use thiserror::Error;

use crate::store::StorageError;

pub type Result<T> = std::result::Result<T, PipelineError>;

#[derive(Error, Debug)]
pub enum PipelineError {
    #[error("Could not retrieve weather data: {0}")]
    Fetch(String),

    #[error("Could not decode weather data: {0}")]
    Decode(String),

    #[error("Storage error: {0}")]
    Storage(#[from] StorageError),

    #[error("Auxiliary reference data unusable: {0}")]
    JoinInput(String),

    #[error("Required column '{0}' is missing")]
    MissingColumn(String),

    #[error("Compute error: {0}")]
    Compute(#[from] arrow::error::ArrowError),

    #[error("Configuration error: {0}")]
    Config(String),

    #[error("Settings error: {0}")]
    Settings(#[from] config::ConfigError),

    #[error("Validation error: {0}")]
    Validation(#[from] validator::ValidationErrors),

    #[error("Processing cancelled by user")]
    Cancelled,

    #[error("Async task error: {0}")]
    TaskJoin(#[from] tokio::task::JoinError),
}

impl PipelineError {
    /// Cancellation is terminal; everything else may succeed on a later attempt.
    pub fn is_retryable(&self) -> bool {
        !matches!(self, PipelineError::Cancelled)
    }
}
