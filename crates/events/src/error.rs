use thiserror::Error;

/// Errors that can occur when publishing an event.
#[derive(Debug, Error)]
pub enum PublishError {
    /// The bus is not accepting messages.
    #[error("Event bus unavailable: {0}")]
    Unavailable(String),

    /// The payload could not be serialized.
    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
}

/// Result type for publish operations.
pub type Result<T> = std::result::Result<T, PublishError>;
