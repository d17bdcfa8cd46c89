//! Error types for dynip.

use crate::protocol::UpdateResult;
use thiserror::Error;

/// Result type alias for dynip.
pub type Result<T> = std::result::Result<T, DynipError>;

/// dynip error types.
#[derive(Error, Debug)]
pub enum DynipError {
    /// Configuration error.
    #[error("Configuration error: {0}")]
    Config(String),

    /// Network/HTTP error before a response body was obtained.
    #[error("Network error: {0}")]
    Network(String),

    /// The provider answered with a failure code.
    #[error("Provider returned {0}")]
    Provider(UpdateResult),

    /// Log sink setup error.
    #[error("Logging error: {0}")]
    Logging(String),

    /// Service install/uninstall error.
    #[error("Service error: {0}")]
    Service(String),

    /// An update attempt panicked.
    #[error("Update attempt panicked: {0}")]
    Panic(String),

    /// IO error.
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

impl DynipError {
    /// The classified outcome this error stands for.
    ///
    /// Only provider failures carry their own code; anything that happened on
    /// this side of the wire is a `LOCAL_ERROR`.
    pub fn update_result(&self) -> UpdateResult {
        match self {
            DynipError::Provider(result) => *result,
            _ => UpdateResult::LocalError,
        }
    }
}

impl From<reqwest::Error> for DynipError {
    fn from(e: reqwest::Error) -> Self {
        DynipError::Network(e.to_string())
    }
}

impl From<toml::de::Error> for DynipError {
    fn from(e: toml::de::Error) -> Self {
        DynipError::Config(e.to_string())
    }
}
