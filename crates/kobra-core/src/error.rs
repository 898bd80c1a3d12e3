use thiserror::Error;

/// Canonical error type for core load-generator operations.
#[derive(Debug, Error)]
pub enum CoreError {
    /// Configuration could not be assembled from its sources.
    #[error("configuration error: {0}")]
    Config(#[from] config::ConfigError),

    /// A configuration value or constructor argument is out of range.
    #[error("validation error: {0}")]
    ValidationError(String),

    /// The action registry cannot be used for weighted selection.
    #[error("invalid action registry: {message}")]
    InvalidRegistry {
        /// Human-readable explanation of the problem.
        message: String,
    },

    /// I/O error while writing reports or metric dumps.
    #[error("I/O error: {0}")]
    IoError(#[from] std::io::Error),

    /// Serialization error occurred.
    #[error("serialization error: {0}")]
    SerializationError(String),
}

impl CoreError {
    /// Creates a `ValidationError` variant.
    #[must_use]
    pub fn validation(message: impl Into<String>) -> Self {
        Self::ValidationError(message.into())
    }

    /// Creates an `InvalidRegistry` variant.
    #[must_use]
    pub fn invalid_registry(message: impl Into<String>) -> Self {
        Self::InvalidRegistry {
            message: message.into(),
        }
    }
}

impl From<serde_json::Error> for CoreError {
    fn from(err: serde_json::Error) -> Self {
        Self::SerializationError(err.to_string())
    }
}

/// Convenient result alias for core operations.
pub type CoreResult<T> = Result<T, CoreError>;
