//! Error monitoring: rolling metrics, alert rules, health and reporting
//!
//! Records fed to the [`ErrorMonitor`] are kept in an in-memory history.
//! Metrics are recomputed over the trailing hour on every read and every
//! monitor tick, then checked against the installed [`AlertRule`]s.

pub mod alerts;
pub mod metrics;
pub mod monitor;
pub mod report;

pub use alerts::{default_rules, AlertRule, FiredAlert};
pub use metrics::MetricsSnapshot;
pub use monitor::{ErrorMonitor, HealthReport, HealthStatus};
