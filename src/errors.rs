use thiserror::Error;

#[derive(Error, Debug)]
pub enum AppError {
    #[error("Data error: {0}")]
    DataError(String),

    #[error("Not found: {0}")]
    NotFound(String),

    #[error("Serialization error: {0}")]
    SerializationError(#[from] serde_json::Error),
}

impl AppError {
    /// Lookup failures are recoverable; everything else means the loaded data is unusable.
    pub fn is_not_found(&self) -> bool {
        matches!(self, AppError::NotFound(_))
    }

    pub fn data(msg: impl Into<String>) -> Self {
        AppError::DataError(msg.into())
    }

    pub fn not_found(msg: impl Into<String>) -> Self {
        AppError::NotFound(msg.into())
    }
}
