//! Resilience subsystem for gated-community visitor management services
//!
//! Every failure in the application (realtime transport, outbound
//! messaging, database access, notifications, validation, authentication,
//! rate limiting) is funnelled through one [`ResilienceContext`]:
//!
//! - [`record`] gives failures a uniform shape: category, severity, context
//!   and retryability
//! - [`handler`] counts them per category, detects spikes and repetition,
//!   and logs at a level matching severity
//! - [`monitoring`] keeps an hourly view, evaluates alert rules and
//!   produces a health verdict and a text report
//! - [`error_recovery`] retries retryable faults in the background and
//!   protects risky calls with circuit breakers
//!
//! ```no_run
//! use gate_resilience::{ErrorContext, ErrorRecord, ResilienceConfig, ResilienceContext};
//!
//! # async fn example() -> gate_resilience::Result<()> {
//! let ctx = ResilienceContext::new(ResilienceConfig::from_env()?);
//! ctx.start_monitoring(None).await?;
//!
//! ctx.report_error(
//!     ErrorRecord::transport("socket closed by peer"),
//!     Some(ErrorContext::new().with_component_id("gate-7")),
//! )
//! .await;
//!
//! println!("{}", ctx.report().await);
//! # Ok(())
//! # }
//! ```

pub mod config;
pub mod context;
pub mod error;
pub mod error_recovery;
pub mod handler;
pub mod logging;
pub mod monitoring;
pub mod record;

// Re-export main types for convenience
pub use config::ResilienceConfig;
pub use context::{ResilienceContext, ResilienceContextBuilder};
pub use error::{ResilienceError, Result};
pub use error_recovery::{CircuitBreaker, CircuitState, RecoveryEngine, RecoveryStrategy, Remediation};
pub use handler::ErrorHandler;
pub use monitoring::{ErrorMonitor, HealthReport, HealthStatus, MetricsSnapshot};
pub use record::{ErrorCategory, ErrorContext, ErrorRecord, ErrorSeverity, SerializedRecord};
