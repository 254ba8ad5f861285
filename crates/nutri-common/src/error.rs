//! Error types shared across the Nutri workspace

use thiserror::Error;

/// Result type alias for Nutri operations
pub type Result<T> = std::result::Result<T, NutriError>;

/// Main error type for Nutri
#[derive(Error, Debug)]
pub enum NutriError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("Configuration error: {0}")]
    Config(String),
}

impl NutriError {
    /// Create a configuration error
    pub fn config(message: impl Into<String>) -> Self {
        Self::Config(message.into())
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used)]
mod tests {
    use super::*;

    #[test]
    fn test_error_display() {
        let err = NutriError::config("limit must be positive");
        assert_eq!(err.to_string(), "Configuration error: limit must be positive");
    }

    #[test]
    fn test_io_conversion() {
        let io = std::io::Error::new(std::io::ErrorKind::NotFound, "gone");
        let err: NutriError = io.into();
        assert!(matches!(err, NutriError::Io(_)));
    }
}
