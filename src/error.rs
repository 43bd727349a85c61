//! Error types for the resilience subsystem
//!
//! These are the subsystem's own failures (an open breaker, bad configuration,
//! a strategy that could not run). Application faults that the subsystem
//! classifies and tracks are modelled by [`crate::record::ErrorRecord`].

use thiserror::Error;

/// Result type alias for resilience operations
pub type Result<T> = std::result::Result<T, ResilienceError>;

/// Errors raised by the resilience subsystem itself
#[derive(Error, Debug)]
pub enum ResilienceError {
    /// Circuit breaker rejected the call without running it
    #[error("Circuit breaker '{name}' is open - retry in {retry_in_ms}ms")]
    CircuitOpen { name: String, retry_in_ms: u64 },

    /// Configuration errors
    #[error("Configuration error: {0}")]
    Config(String),

    /// A recovery strategy failed while remediating
    #[error("Recovery failed: {0}")]
    Recovery(String),

    /// Timeout errors
    #[error("Operation timed out: {0}")]
    Timeout(String),

    /// Generic I/O errors
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// JSON serialization errors
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    /// TOML configuration parsing errors
    #[error("TOML parsing error: {0}")]
    Toml(#[from] toml::de::Error),

    /// Generic errors
    #[error("Generic error: {0}")]
    Generic(#[from] anyhow::Error),
}

impl ResilienceError {
    /// Create a circuit-open error
    pub fn circuit_open<S: Into<String>>(name: S, retry_in: std::time::Duration) -> Self {
        Self::CircuitOpen {
            name: name.into(),
            retry_in_ms: retry_in.as_millis() as u64,
        }
    }

    /// Create a configuration error
    pub fn config<S: Into<String>>(msg: S) -> Self {
        Self::Config(msg.into())
    }

    /// Create a recovery error
    pub fn recovery<S: Into<String>>(msg: S) -> Self {
        Self::Recovery(msg.into())
    }

    /// Create a timeout error
    pub fn timeout<S: Into<String>>(msg: S) -> Self {
        Self::Timeout(msg.into())
    }

    /// Create an internal error
    pub fn internal<S: Into<String>>(msg: S) -> Self {
        Self::Generic(anyhow::anyhow!(msg.into()))
    }

    /// Check if the failed call may succeed when attempted again later
    pub fn is_retryable(&self) -> bool {
        matches!(
            self,
            ResilienceError::CircuitOpen { .. }
                | ResilienceError::Timeout(_)
                | ResilienceError::Recovery(_)
        )
    }

    /// Short machine-readable error type
    pub fn error_type(&self) -> &'static str {
        match self {
            ResilienceError::CircuitOpen { .. } => "circuit_open",
            ResilienceError::Config(_) => "config_error",
            ResilienceError::Recovery(_) => "recovery_error",
            ResilienceError::Timeout(_) => "timeout_error",
            ResilienceError::Io(_) => "io_error",
            ResilienceError::Json(_) => "json_error",
            ResilienceError::Toml(_) => "toml_error",
            ResilienceError::Generic(_) => "generic_error",
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    #[test]
    fn test_circuit_open_message() {
        let err = ResilienceError::circuit_open("db", Duration::from_millis(1500));
        assert_eq!(
            err.to_string(),
            "Circuit breaker 'db' is open - retry in 1500ms"
        );
        assert!(err.is_retryable());
        assert_eq!(err.error_type(), "circuit_open");
    }

    #[test]
    fn test_config_not_retryable() {
        let err = ResilienceError::config("bad interval");
        assert!(!err.is_retryable());
        assert_eq!(err.to_string(), "Configuration error: bad interval");
    }
}
