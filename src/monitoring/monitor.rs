//! Error monitor: history, rolling metrics, alert rules and health verdict
//!
//! The monitor keeps an in-memory history of records. While started, two
//! background tasks run: one recomputes metrics and evaluates alert rules at
//! the requested interval, the other prunes history past its retention.

use crate::config::MonitorConfig;
use crate::error::{ResilienceError, Result};
use crate::monitoring::alerts::{default_rules, AlertRule, FiredAlert};
use crate::monitoring::metrics::MetricsSnapshot;
use crate::monitoring::report;
use crate::record::{ErrorRecord, ErrorSeverity, SerializedRecord};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::VecDeque;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{broadcast, Mutex, RwLock};
use tokio::task::JoinHandle;
use tokio::time::{interval_at, Instant, MissedTickBehavior};
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

/// Overall health verdict
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum HealthStatus {
    Healthy,
    Warning,
    Critical,
}

impl HealthStatus {
    /// Verdict for a snapshot: any critical error in the window is critical,
    /// more than 5 errors/min is a warning
    pub fn from_metrics(metrics: &MetricsSnapshot) -> Self {
        if metrics.critical_error_count > 0 {
            HealthStatus::Critical
        } else if metrics.average_error_rate > 5.0 {
            HealthStatus::Warning
        } else {
            HealthStatus::Healthy
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            HealthStatus::Healthy => "healthy",
            HealthStatus::Warning => "warning",
            HealthStatus::Critical => "critical",
        }
    }
}

/// Health verdict with explanation and the metrics it was derived from
#[derive(Debug, Clone, Serialize)]
pub struct HealthReport {
    pub status: HealthStatus,
    pub message: String,
    pub metrics: MetricsSnapshot,
}

impl HealthReport {
    fn from_metrics(metrics: MetricsSnapshot) -> Self {
        let status = HealthStatus::from_metrics(&metrics);
        let message = match status {
            HealthStatus::Critical => format!(
                "{} critical errors in the last hour",
                metrics.critical_error_count
            ),
            HealthStatus::Warning => format!(
                "Elevated error rate: {:.2} errors/min",
                metrics.average_error_rate
            ),
            HealthStatus::Healthy => "All systems operational".to_string(),
        };
        Self {
            status,
            message,
            metrics,
        }
    }
}

/// State shared with the background tasks
struct MonitorState {
    config: MonitorConfig,
    history: RwLock<VecDeque<ErrorRecord>>,
    current: RwLock<MetricsSnapshot>,
    rules: RwLock<Vec<AlertRule>>,
    fired: RwLock<VecDeque<FiredAlert>>,
    alert_sender: broadcast::Sender<FiredAlert>,
}

impl MonitorState {
    fn window(&self) -> chrono::Duration {
        chrono::Duration::from_std(self.config.metrics_window)
            .unwrap_or_else(|_| chrono::Duration::hours(1))
    }

    async fn metrics_at(&self, now: DateTime<Utc>) -> MetricsSnapshot {
        let snapshot = {
            let history = self.history.read().await;
            MetricsSnapshot::compute(history.iter(), self.window(), now)
        };
        *self.current.write().await = snapshot.clone();
        snapshot
    }

    async fn evaluate_alerts_at(&self, now: DateTime<Utc>) -> Vec<FiredAlert> {
        let snapshot = self.metrics_at(now).await;

        let fired: Vec<FiredAlert> = {
            let mut rules = self.rules.write().await;
            rules
                .iter_mut()
                .filter_map(|rule| rule.evaluate(&snapshot, now))
                .collect()
        };

        for alert in &fired {
            Self::emit(alert);
            // No subscribers is fine
            let _ = self.alert_sender.send(alert.clone());
        }

        if !fired.is_empty() {
            let mut log = self.fired.write().await;
            log.extend(fired.iter().cloned());
            while log.len() > self.config.max_fired_alerts {
                log.pop_front();
            }
        }

        fired
    }

    async fn prune_at(&self, now: DateTime<Utc>) -> usize {
        let retention = chrono::Duration::from_std(self.config.history_retention)
            .unwrap_or_else(|_| chrono::Duration::hours(24));
        let mut history = self.history.write().await;
        let before = history.len();
        history.retain(|r| now - r.timestamp() < retention);
        before - history.len()
    }

    fn emit(alert: &FiredAlert) {
        match alert.severity {
            ErrorSeverity::Critical | ErrorSeverity::High => error!(
                rule_id = %alert.rule_id,
                severity = %alert.severity,
                total_errors = alert.metrics.total_errors,
                critical_errors = alert.metrics.critical_error_count,
                error_rate = alert.metrics.average_error_rate,
                "ALERT {}: {}",
                alert.rule_name,
                alert.message
            ),
            ErrorSeverity::Medium | ErrorSeverity::Low => warn!(
                rule_id = %alert.rule_id,
                severity = %alert.severity,
                total_errors = alert.metrics.total_errors,
                error_rate = alert.metrics.average_error_rate,
                "ALERT {}: {}",
                alert.rule_name,
                alert.message
            ),
        }
    }
}

struct MonitorTasks {
    shutdown: CancellationToken,
    handles: Vec<JoinHandle<()>>,
}

/// Aggregates error records into metrics, alerts and health
pub struct ErrorMonitor {
    state: Arc<MonitorState>,
    tasks: Mutex<Option<MonitorTasks>>,
}

impl ErrorMonitor {
    /// Create new monitor with the default alert rules
    pub fn new(config: MonitorConfig) -> Self {
        Self::with_rules(config, Vec::new())
    }

    /// Default rules plus `extra`; an extra rule replaces a default with the same id
    pub fn with_rules(config: MonitorConfig, extra: Vec<AlertRule>) -> Self {
        let mut rules = default_rules();
        for rule in extra {
            rules.retain(|r| r.id != rule.id);
            rules.push(rule);
        }

        let (alert_sender, _) = broadcast::channel(256);
        Self {
            state: Arc::new(MonitorState {
                config,
                history: RwLock::new(VecDeque::new()),
                current: RwLock::new(MetricsSnapshot::empty(Utc::now())),
                rules: RwLock::new(rules),
                fired: RwLock::new(VecDeque::new()),
                alert_sender,
            }),
            tasks: Mutex::new(None),
        }
    }

    /// Append a record to history and refresh the current snapshot
    pub async fn record(&self, record: ErrorRecord) {
        debug!(record_id = %record.id(), category = %record.category(), "Recording error");
        self.state.history.write().await.push_back(record);
        self.state.metrics_at(Utc::now()).await;
    }

    /// Start the metrics/alert task and the housekeeping task.
    ///
    /// Calling this while already running logs a warning and does nothing.
    pub async fn start(&self, interval: Duration) -> Result<()> {
        if interval.is_zero() {
            return Err(ResilienceError::config("monitor interval must be > 0"));
        }

        let mut tasks = self.tasks.lock().await;
        if tasks.is_some() {
            warn!("Error monitor already running");
            return Ok(());
        }

        info!(interval_ms = interval.as_millis() as u64, "Starting error monitoring");

        // Tick schedules are anchored here, not when the tasks are first polled
        let started = Instant::now();
        let cleanup_interval = self.state.config.cleanup_interval;
        let shutdown = CancellationToken::new();
        let check = tokio::spawn(Self::check_loop(
            self.state.clone(),
            started + interval,
            interval,
            shutdown.clone(),
        ));
        let cleanup = tokio::spawn(Self::cleanup_loop(
            self.state.clone(),
            started + cleanup_interval,
            cleanup_interval,
            shutdown.clone(),
        ));

        *tasks = Some(MonitorTasks {
            shutdown,
            handles: vec![check, cleanup],
        });
        Ok(())
    }

    /// Stop both background tasks
    pub async fn stop(&self) {
        let Some(tasks) = self.tasks.lock().await.take() else {
            debug!("Error monitor not running");
            return;
        };

        info!("Stopping error monitoring");
        tasks.shutdown.cancel();
        for handle in tasks.handles {
            if let Err(e) = handle.await {
                error!("Monitor task ended abnormally: {}", e);
            }
        }
    }

    /// Whether the background tasks are running
    pub async fn is_running(&self) -> bool {
        self.tasks.lock().await.is_some()
    }

    async fn check_loop(
        state: Arc<MonitorState>,
        first: Instant,
        period: Duration,
        shutdown: CancellationToken,
    ) {
        let mut ticker = interval_at(first, period);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

        loop {
            tokio::select! {
                _ = shutdown.cancelled() => break,
                _ = ticker.tick() => {
                    let fired = state.evaluate_alerts_at(Utc::now()).await;
                    debug!(alerts = fired.len(), "Metrics check completed");
                }
            }
        }

        debug!("Metrics check loop stopped");
    }

    async fn cleanup_loop(
        state: Arc<MonitorState>,
        first: Instant,
        period: Duration,
        shutdown: CancellationToken,
    ) {
        let mut ticker = interval_at(first, period);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

        loop {
            tokio::select! {
                _ = shutdown.cancelled() => break,
                _ = ticker.tick() => {
                    let removed = state.prune_at(Utc::now()).await;
                    if removed > 0 {
                        info!(removed, "Pruned expired error history");
                    }
                }
            }
        }

        debug!("History cleanup loop stopped");
    }

    /// Fresh snapshot over the trailing window
    pub async fn metrics(&self) -> MetricsSnapshot {
        self.state.metrics_at(Utc::now()).await
    }

    /// Snapshot as of `now`
    pub async fn metrics_at(&self, now: DateTime<Utc>) -> MetricsSnapshot {
        self.state.metrics_at(now).await
    }

    /// Snapshot stored by the last recomputation
    pub async fn last_metrics(&self) -> MetricsSnapshot {
        self.state.current.read().await.clone()
    }

    /// Recompute metrics and evaluate every rule now
    pub async fn evaluate_alerts(&self) -> Vec<FiredAlert> {
        self.state.evaluate_alerts_at(Utc::now()).await
    }

    /// Recompute metrics and evaluate every rule as of `now`
    pub async fn evaluate_alerts_at(&self, now: DateTime<Utc>) -> Vec<FiredAlert> {
        self.state.evaluate_alerts_at(now).await
    }

    /// Drop history older than the retention period; returns the number removed
    pub async fn prune_history_at(&self, now: DateTime<Utc>) -> usize {
        self.state.prune_at(now).await
    }

    /// Health verdict of the current window
    pub async fn health_status(&self) -> HealthStatus {
        HealthStatus::from_metrics(&self.metrics().await)
    }

    /// Health verdict with message and metrics
    pub async fn health(&self) -> HealthReport {
        HealthReport::from_metrics(self.metrics().await)
    }

    /// Up to `limit` most recent records, oldest first
    pub async fn error_history(&self, limit: usize) -> Vec<SerializedRecord> {
        let history = self.state.history.read().await;
        let skip = history.len().saturating_sub(limit);
        history.iter().skip(skip).map(|r| r.serialize()).collect()
    }

    /// Number of records currently retained
    pub async fn history_len(&self) -> usize {
        self.state.history.read().await.len()
    }

    /// Fixed-layout text summary
    pub async fn report(&self) -> String {
        let health = self.health().await;
        let recent = self
            .error_history(self.state.config.report_recent_errors)
            .await;
        report::render(&health, &recent, Utc::now())
    }

    /// Install an additional rule (replaces a rule with the same id)
    pub async fn add_rule(&self, rule: AlertRule) {
        let mut rules = self.state.rules.write().await;
        rules.retain(|r| r.id != rule.id);
        info!(rule_id = %rule.id, "Alert rule added");
        rules.push(rule);
    }

    /// Remove a rule by id; returns whether one was removed
    pub async fn remove_rule(&self, id: &str) -> bool {
        let mut rules = self.state.rules.write().await;
        let before = rules.len();
        rules.retain(|r| r.id != id);
        let removed = rules.len() != before;
        if removed {
            info!(rule_id = id, "Alert rule removed");
        }
        removed
    }

    /// Currently installed rules
    pub async fn rules(&self) -> Vec<AlertRule> {
        self.state.rules.read().await.clone()
    }

    /// Subscribe to fired alerts
    pub fn subscribe_alerts(&self) -> broadcast::Receiver<FiredAlert> {
        self.state.alert_sender.subscribe()
    }

    /// Recently fired alerts, oldest first
    pub async fn fired_alerts(&self) -> Vec<FiredAlert> {
        self.state.fired.read().await.iter().cloned().collect()
    }
}

impl Default for ErrorMonitor {
    fn default() -> Self {
        Self::new(MonitorConfig::default())
    }
}
