//! Single resilience context shared by the whole application
//!
//! Every failure is reported once through [`ResilienceContext::report_error`].
//! The handler classifies and counts it, the monitor keeps it in history
//! while monitoring runs, and retryable records are handed to the recovery
//! engine.

use crate::config::{CircuitBreakerConfig, ResilienceConfig};
use crate::error::Result;
use crate::error_recovery::circuit_breaker::{
    CircuitBreaker, CircuitBreakerManager, CircuitBreakerStats,
};
use crate::error_recovery::recovery_engine::{RecoveryEngine, RecoveryStats};
use crate::error_recovery::strategies::{
    NotificationRecovery, PersistenceRecovery, RecoveryStrategy, Remediation, TransportRecovery,
};
use crate::handler::{CategoryStats, ErrorHandler};
use crate::monitoring::{AlertRule, ErrorMonitor, FiredAlert, HealthReport, MetricsSnapshot};
use crate::record::{ErrorCategory, ErrorContext, ErrorRecord, SerializedRecord};
use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::broadcast;
use tracing::{debug, info};

/// Owns the handler, monitor, recovery engine and circuit breakers
pub struct ResilienceContext {
    config: ResilienceConfig,
    handler: Arc<ErrorHandler>,
    monitor: Arc<ErrorMonitor>,
    recovery: Arc<RecoveryEngine>,
    breakers: CircuitBreakerManager,
}

impl ResilienceContext {
    /// Context with the built-in strategies and no remediation hooks
    pub fn new(config: ResilienceConfig) -> Self {
        Self::builder(config).build()
    }

    pub fn builder(config: ResilienceConfig) -> ResilienceContextBuilder {
        ResilienceContextBuilder::new(config)
    }

    pub fn config(&self) -> &ResilienceConfig {
        &self.config
    }

    pub fn handler(&self) -> &Arc<ErrorHandler> {
        &self.handler
    }

    pub fn monitor(&self) -> &Arc<ErrorMonitor> {
        &self.monitor
    }

    pub fn recovery(&self) -> &Arc<RecoveryEngine> {
        &self.recovery
    }

    /// Report a failure; returns the classified record
    pub async fn report_error<E>(&self, error: E, extra: Option<ErrorContext>) -> ErrorRecord
    where
        E: Into<ErrorRecord>,
    {
        let record = self.handler.handle(error, extra).await;

        if self.monitor.is_running().await {
            self.monitor.record(record.clone()).await;
        }

        if record.is_retryable() {
            let queued = self.recovery.handle(record.clone()).await;
            debug!(record_id = %record.id(), queued, "Handed record to recovery");
        }

        record
    }

    /// Start monitoring; `None` uses the configured check interval
    pub async fn start_monitoring(&self, interval: Option<Duration>) -> Result<()> {
        self.monitor
            .start(interval.unwrap_or(self.config.monitor.check_interval))
            .await
    }

    pub async fn stop_monitoring(&self) {
        self.monitor.stop().await;
    }

    pub async fn health(&self) -> HealthReport {
        self.monitor.health().await
    }

    pub async fn metrics(&self) -> MetricsSnapshot {
        self.monitor.metrics().await
    }

    /// Most recent records, oldest first
    pub async fn error_history(&self, limit: usize) -> Vec<SerializedRecord> {
        self.monitor.error_history(limit).await
    }

    pub async fn report(&self) -> String {
        self.monitor.report().await
    }

    pub async fn add_alert_rule(&self, rule: AlertRule) {
        self.monitor.add_rule(rule).await;
    }

    pub async fn remove_alert_rule(&self, id: &str) -> bool {
        self.monitor.remove_rule(id).await
    }

    pub fn subscribe_alerts(&self) -> broadcast::Receiver<FiredAlert> {
        self.monitor.subscribe_alerts()
    }

    pub async fn error_stats(&self) -> HashMap<ErrorCategory, CategoryStats> {
        self.handler.stats().await
    }

    pub async fn recovery_stats(&self) -> RecoveryStats {
        self.recovery.recovery_stats().await
    }

    /// Clear the handler's per-category counters
    pub async fn reset_counts(&self) {
        self.handler.reset().await;
    }

    /// Named breaker, created with the configured defaults on first use
    pub async fn breaker(&self, name: &str) -> Arc<CircuitBreaker> {
        self.breakers.get_breaker(name).await
    }

    pub async fn register_breaker(
        &self,
        name: &str,
        config: CircuitBreakerConfig,
    ) -> Arc<CircuitBreaker> {
        self.breakers.register(name, config).await
    }

    pub async fn breaker_stats(&self) -> HashMap<String, CircuitBreakerStats> {
        self.breakers.get_all_stats().await
    }

    /// Stop monitoring and stop the recovery loop from taking new work
    pub async fn shutdown(&self) {
        info!("Shutting down resilience context");
        self.monitor.stop().await;
        self.recovery.cancellation_token().cancel();
    }
}

impl Default for ResilienceContext {
    fn default() -> Self {
        Self::new(ResilienceConfig::default())
    }
}

/// Builder wiring host remediation hooks into the built-in strategies
pub struct ResilienceContextBuilder {
    config: ResilienceConfig,
    transport: Option<Arc<dyn Remediation>>,
    persistence: Option<Arc<dyn Remediation>>,
    notification: Option<Arc<dyn Remediation>>,
    extra_strategies: Vec<Arc<dyn RecoveryStrategy>>,
    alert_rules: Vec<AlertRule>,
}

impl ResilienceContextBuilder {
    fn new(config: ResilienceConfig) -> Self {
        Self {
            config,
            transport: None,
            persistence: None,
            notification: None,
            extra_strategies: Vec::new(),
            alert_rules: Vec::new(),
        }
    }

    /// Reconnect hook for transport and message-send failures
    pub fn transport_remediation(mut self, remediation: Arc<dyn Remediation>) -> Self {
        self.transport = Some(remediation);
        self
    }

    /// Reprobe hook for database failures
    pub fn persistence_remediation(mut self, remediation: Arc<dyn Remediation>) -> Self {
        self.persistence = Some(remediation);
        self
    }

    /// Re-send hook for notification failures
    pub fn notification_remediation(mut self, remediation: Arc<dyn Remediation>) -> Self {
        self.notification = Some(remediation);
        self
    }

    /// Extra strategy, consulted after the built-in ones
    pub fn strategy(mut self, strategy: Arc<dyn RecoveryStrategy>) -> Self {
        self.extra_strategies.push(strategy);
        self
    }

    /// Extra alert rule, replacing a default rule with the same id
    pub fn alert_rule(mut self, rule: AlertRule) -> Self {
        self.alert_rules.push(rule);
        self
    }

    pub fn build(self) -> ResilienceContext {
        let transport = match self.transport {
            Some(r) => TransportRecovery::new(r),
            None => TransportRecovery::default(),
        };
        let persistence = match self.persistence {
            Some(r) => PersistenceRecovery::new(r),
            None => PersistenceRecovery::default(),
        };
        let notification = match self.notification {
            Some(r) => NotificationRecovery::new(r),
            None => NotificationRecovery::default(),
        };

        let mut strategies: Vec<Arc<dyn RecoveryStrategy>> = vec![
            Arc::new(transport),
            Arc::new(persistence),
            Arc::new(notification),
        ];
        strategies.extend(self.extra_strategies);

        ResilienceContext {
            handler: Arc::new(ErrorHandler::new(self.config.handler.clone())),
            monitor: Arc::new(ErrorMonitor::with_rules(
                self.config.monitor.clone(),
                self.alert_rules,
            )),
            recovery: Arc::new(RecoveryEngine::with_strategies(
                self.config.recovery.clone(),
                strategies,
            )),
            breakers: CircuitBreakerManager::new(self.config.circuit_breaker.clone()),
            config: self.config,
        }
    }
}
