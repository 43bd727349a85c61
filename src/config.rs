//! Configuration for the resilience subsystem
//!
//! Defaults match the production thresholds. Values can be overridden from a
//! TOML document or from `RESILIENCE_*` environment variables.

use crate::error::{ResilienceError, Result};
use serde::{Deserialize, Serialize};
use std::env;
use std::time::Duration;

/// Top-level configuration
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct ResilienceConfig {
    /// Classifier/handler pattern thresholds
    pub handler: HandlerConfig,
    /// Monitor intervals and retention
    pub monitor: MonitorConfig,
    /// Recovery engine pacing
    pub recovery: RecoveryConfig,
    /// Defaults for named circuit breakers
    pub circuit_breaker: CircuitBreakerConfig,
}

/// Pattern detection thresholds for the handler
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct HandlerConfig {
    /// Count above which a burst inside `spike_window` is reported
    pub spike_threshold: u64,
    #[serde(with = "humantime_serde")]
    pub spike_window: Duration,
    /// Count above which a repeat inside `repeat_window` is reported
    pub repeat_threshold: u64,
    #[serde(with = "humantime_serde")]
    pub repeat_window: Duration,
}

impl Default for HandlerConfig {
    fn default() -> Self {
        Self {
            spike_threshold: 10,
            spike_window: Duration::from_secs(60),
            repeat_threshold: 5,
            repeat_window: Duration::from_secs(30),
        }
    }
}

/// Monitor configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct MonitorConfig {
    /// Metrics/alert evaluation interval used by `start_monitoring` callers
    #[serde(with = "humantime_serde")]
    pub check_interval: Duration,
    /// Window metrics are computed over
    #[serde(with = "humantime_serde")]
    pub metrics_window: Duration,
    /// How long records stay in history
    #[serde(with = "humantime_serde")]
    pub history_retention: Duration,
    /// How often history is pruned
    #[serde(with = "humantime_serde")]
    pub cleanup_interval: Duration,
    /// Number of records shown in the text report
    pub report_recent_errors: usize,
    /// Number of fired alerts kept for inspection
    pub max_fired_alerts: usize,
}

impl Default for MonitorConfig {
    fn default() -> Self {
        Self {
            check_interval: Duration::from_secs(60),
            metrics_window: Duration::from_secs(60 * 60),
            history_retention: Duration::from_secs(24 * 60 * 60),
            cleanup_interval: Duration::from_secs(60 * 60),
            report_recent_errors: 10,
            max_fired_alerts: 100,
        }
    }
}

/// Recovery engine configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct RecoveryConfig {
    /// Pause between queue iterations
    #[serde(with = "humantime_serde")]
    pub inter_attempt_pause: Duration,
}

impl Default for RecoveryConfig {
    fn default() -> Self {
        Self {
            inter_attempt_pause: Duration::from_secs(1),
        }
    }
}

/// Circuit breaker configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct CircuitBreakerConfig {
    /// Consecutive failures before the circuit opens
    pub failure_threshold: u32,
    /// Time after the last failure before a trial call is let through
    #[serde(with = "humantime_serde")]
    pub reset_timeout: Duration,
}

impl Default for CircuitBreakerConfig {
    fn default() -> Self {
        Self {
            failure_threshold: 5,
            reset_timeout: Duration::from_secs(60),
        }
    }
}

impl CircuitBreakerConfig {
    /// Configuration for dependencies whose outage blocks the gate
    pub fn critical_service() -> Self {
        Self {
            failure_threshold: 3,
            reset_timeout: Duration::from_secs(10),
        }
    }

    /// Configuration for best-effort dependencies
    pub fn non_critical_service() -> Self {
        Self {
            failure_threshold: 10,
            reset_timeout: Duration::from_secs(120),
        }
    }
}

impl ResilienceConfig {
    /// Parse a TOML document; missing keys fall back to defaults
    pub fn from_toml_str(input: &str) -> Result<Self> {
        let config: Self = toml::from_str(input)?;
        config.validate()?;
        Ok(config)
    }

    /// Load configuration from environment variables
    pub fn from_env() -> Result<Self> {
        let mut config = Self::default();

        if let Some(v) = env_duration("RESILIENCE_CHECK_INTERVAL")? {
            config.monitor.check_interval = v;
        }
        if let Some(v) = env_duration("RESILIENCE_HISTORY_RETENTION")? {
            config.monitor.history_retention = v;
        }
        if let Some(v) = env_duration("RESILIENCE_CLEANUP_INTERVAL")? {
            config.monitor.cleanup_interval = v;
        }
        if let Ok(v) = env::var("RESILIENCE_REPORT_RECENT_ERRORS") {
            config.monitor.report_recent_errors = v.parse().map_err(|e| {
                ResilienceError::config(format!("Invalid RESILIENCE_REPORT_RECENT_ERRORS: {e}"))
            })?;
        }
        if let Some(v) = env_duration("RESILIENCE_RECOVERY_PAUSE")? {
            config.recovery.inter_attempt_pause = v;
        }
        if let Ok(v) = env::var("RESILIENCE_BREAKER_THRESHOLD") {
            config.circuit_breaker.failure_threshold = v.parse().map_err(|e| {
                ResilienceError::config(format!("Invalid RESILIENCE_BREAKER_THRESHOLD: {e}"))
            })?;
        }
        if let Some(v) = env_duration("RESILIENCE_BREAKER_RESET_TIMEOUT")? {
            config.circuit_breaker.reset_timeout = v;
        }

        config.validate()?;
        Ok(config)
    }

    /// Reject values that would make the subsystem spin or never trip
    pub fn validate(&self) -> Result<()> {
        if self.monitor.check_interval.is_zero() {
            return Err(ResilienceError::config("monitor.check_interval must be > 0"));
        }
        if self.monitor.cleanup_interval.is_zero() {
            return Err(ResilienceError::config(
                "monitor.cleanup_interval must be > 0",
            ));
        }
        if self.monitor.metrics_window.is_zero() {
            return Err(ResilienceError::config("monitor.metrics_window must be > 0"));
        }
        if self.circuit_breaker.failure_threshold == 0 {
            return Err(ResilienceError::config(
                "circuit_breaker.failure_threshold must be > 0",
            ));
        }
        Ok(())
    }
}

fn env_duration(name: &str) -> Result<Option<Duration>> {
    match env::var(name) {
        Ok(raw) => humantime_serde::re::humantime::parse_duration(&raw)
            .map(Some)
            .map_err(|e| ResilienceError::config(format!("Invalid {name}: {e}"))),
        Err(_) => Ok(None),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serial_test::serial;

    #[test]
    fn test_defaults() {
        let config = ResilienceConfig::default();
        assert_eq!(config.handler.spike_threshold, 10);
        assert_eq!(config.handler.repeat_window, Duration::from_secs(30));
        assert_eq!(config.monitor.history_retention, Duration::from_secs(86_400));
        assert_eq!(config.recovery.inter_attempt_pause, Duration::from_secs(1));
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_from_toml_partial() {
        let config = ResilienceConfig::from_toml_str(
            r#"
            [monitor]
            check_interval = "15s"

            [circuit_breaker]
            failure_threshold = 3
            reset_timeout = "1s"
            "#,
        )
        .unwrap();

        assert_eq!(config.monitor.check_interval, Duration::from_secs(15));
        assert_eq!(config.monitor.cleanup_interval, Duration::from_secs(3600));
        assert_eq!(config.circuit_breaker.failure_threshold, 3);
        assert_eq!(config.circuit_breaker.reset_timeout, Duration::from_secs(1));
    }

    #[test]
    fn test_from_toml_rejects_zero_threshold() {
        let err = ResilienceConfig::from_toml_str(
            r#"
            [circuit_breaker]
            failure_threshold = 0
            "#,
        )
        .unwrap_err();
        assert!(matches!(err, ResilienceError::Config(_)));
    }

    #[test]
    #[serial]
    fn test_from_env() {
        temp_env::with_vars(
            [
                ("RESILIENCE_CHECK_INTERVAL", Some("5s")),
                ("RESILIENCE_RECOVERY_PAUSE", Some("250ms")),
                ("RESILIENCE_BREAKER_THRESHOLD", Some("7")),
            ],
            || {
                let config = ResilienceConfig::from_env().unwrap();
                assert_eq!(config.monitor.check_interval, Duration::from_secs(5));
                assert_eq!(
                    config.recovery.inter_attempt_pause,
                    Duration::from_millis(250)
                );
                assert_eq!(config.circuit_breaker.failure_threshold, 7);
            },
        );
    }

    #[test]
    #[serial]
    fn test_from_env_invalid_duration() {
        temp_env::with_var("RESILIENCE_CLEANUP_INTERVAL", Some("soon"), || {
            let err = ResilienceConfig::from_env().unwrap_err();
            assert!(err.to_string().contains("RESILIENCE_CLEANUP_INTERVAL"));
        });
    }
}
