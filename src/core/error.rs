use thiserror::Error;

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum KeyError {
    /// Malformed strategy, missing accessor or property-name count mismatch.
    #[error("Configuration error: {0}")]
    ConfigurationError(String),

    /// A deterministic-only operation was invoked on a non-deterministic strategy.
    #[error("Illegal use: {0}")]
    IllegalUse(String),

    #[error("Lock error: {0}")]
    LockError(String),

    #[error("I/O error: {0}")]
    IoError(String),

    #[error("Parse error: {0}")]
    ParseError(String),
}

pub type Result<T> = std::result::Result<T, KeyError>;

impl<T> From<std::sync::PoisonError<T>> for KeyError {
    fn from(err: std::sync::PoisonError<T>) -> Self {
        Self::LockError(err.to_string())
    }
}

impl From<std::io::Error> for KeyError {
    fn from(err: std::io::Error) -> Self {
        Self::IoError(err.to_string())
    }
}

impl From<serde_json::Error> for KeyError {
    fn from(err: serde_json::Error) -> Self {
        Self::ParseError(err.to_string())
    }
}
