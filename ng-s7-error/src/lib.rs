//! Error type for the ng-s7 binaries and settings loading.
//!
//! The protocol engine keeps its own fine-grained `Error`; it is folded into
//! [`NGError::DriverError`] at the binary boundary.
use anyhow::Error as AnyhowError;
use config::ConfigError;
use serde_json::Error as SerdeJsonError;
use std::io::Error as IoError;
use thiserror::Error;

pub type NGResult<T, E = NGError> = anyhow::Result<T, E>;

#[derive(Error, Debug)]
pub enum NGError {
    #[error("{0}")]
    IoError(#[from] IoError),
    #[error("{0}")]
    Msg(String),
    #[error("{0}")]
    Anyhow(#[from] AnyhowError),
    #[error("{0}")]
    Json(#[from] SerdeJsonError),
    /// Settings file or environment could not be loaded
    #[error("{0}")]
    ConfigError(#[from] ConfigError),
    #[error("Driver error: {0}")]
    DriverError(String),
    /// Settings loaded but rejected by validation
    #[error("Configuration error: {0}")]
    ConfigurationError(String),
    #[error("Initialization error: {0}")]
    InitializationError(String),
}

impl From<String> for NGError {
    #[inline]
    fn from(e: String) -> Self {
        NGError::Msg(e)
    }
}

impl From<&str> for NGError {
    #[inline]
    fn from(e: &str) -> Self {
        NGError::Msg(e.to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_from_str_and_string() {
        assert_eq!(NGError::from("boom").to_string(), "boom");
        assert_eq!(NGError::from(String::from("boom")).to_string(), "boom");
    }

    #[test]
    fn test_wrapped_display() {
        let e = NGError::ConfigurationError("missing host".into());
        assert_eq!(e.to_string(), "Configuration error: missing host");
        let e = NGError::DriverError("connect timeout".into());
        assert_eq!(e.to_string(), "Driver error: connect timeout");
    }

    #[test]
    fn test_json_error_converts() {
        let err = serde_json::from_str::<u8>("x").unwrap_err();
        assert!(matches!(NGError::from(err), NGError::Json(_)));
    }
}
