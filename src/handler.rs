//! Error classification and counting
//!
//! The handler is the entry point for every failure: it turns raw faults into
//! [`ErrorRecord`]s, keeps per-category counters, flags bursts and repeats,
//! and raises an immediate alert for critical records. It never fails.

use crate::config::HandlerConfig;
use crate::record::{ErrorCategory, ErrorContext, ErrorRecord, ErrorSeverity};
use chrono::{DateTime, Utc};
use serde::Serialize;
use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;
use tokio::sync::RwLock;
use tracing::{debug, error, info, warn};

/// Per-category counter state
#[derive(Debug, Clone)]
struct CategoryCounter {
    count: u64,
    last_error: DateTime<Utc>,
}

/// Snapshot of one category's counter
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct CategoryStats {
    /// Records handled since the last reset
    pub count: u64,
    /// Wall-clock time of the most recent record
    pub last_error: DateTime<Utc>,
    /// Time elapsed since `last_error`
    #[serde(with = "humantime_serde")]
    pub since_last: Duration,
}

/// Advisory pattern detected while handling a record
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorPattern {
    /// Many errors of one category inside the spike window
    Spike,
    /// Several errors of one category inside the repeat window
    Repetition,
}

/// Classifier and running counters
pub struct ErrorHandler {
    config: HandlerConfig,
    counters: RwLock<HashMap<ErrorCategory, CategoryCounter>>,
    critical_alerts_sent: AtomicU64,
}

impl ErrorHandler {
    /// Create new handler
    pub fn new(config: HandlerConfig) -> Self {
        Self {
            config,
            counters: RwLock::new(HashMap::new()),
            critical_alerts_sent: AtomicU64::new(0),
        }
    }

    /// Classify, count and log a failure.
    ///
    /// Records pass through with `extra` merged into their context; anything
    /// else is wrapped as an unknown, medium, non-retryable record.
    pub async fn handle<E>(&self, error: E, extra: Option<ErrorContext>) -> ErrorRecord
    where
        E: Into<ErrorRecord>,
    {
        let mut record = error.into();
        if let Some(extra) = extra {
            record.merge_context(extra);
        }

        let now = Utc::now();
        let (count, gap) = {
            let mut counters = self.counters.write().await;
            let counter = counters
                .entry(record.category())
                .or_insert(CategoryCounter {
                    count: 0,
                    last_error: now,
                });
            let gap = (now - counter.last_error).to_std().unwrap_or(Duration::ZERO);
            counter.count += 1;
            counter.last_error = now;
            (counter.count, gap)
        };

        Self::log_record(&record);

        for pattern in self.detect_patterns(count, gap) {
            match pattern {
                ErrorPattern::Spike => warn!(
                    category = %record.category(),
                    count,
                    gap_ms = gap.as_millis() as u64,
                    "Error spike detected"
                ),
                ErrorPattern::Repetition => warn!(
                    category = %record.category(),
                    count,
                    gap_ms = gap.as_millis() as u64,
                    "Repeated errors detected"
                ),
            }
        }

        if record.severity() == ErrorSeverity::Critical {
            self.send_critical_alert(&record);
        }

        record
    }

    /// Patterns implied by a category's running count and the gap since its
    /// previous error
    pub fn detect_patterns(&self, count: u64, gap: Duration) -> Vec<ErrorPattern> {
        let mut patterns = Vec::new();
        if count > self.config.spike_threshold && gap < self.config.spike_window {
            patterns.push(ErrorPattern::Spike);
        }
        if count > self.config.repeat_threshold && gap < self.config.repeat_window {
            patterns.push(ErrorPattern::Repetition);
        }
        patterns
    }

    /// Current counters per category
    pub async fn stats(&self) -> HashMap<ErrorCategory, CategoryStats> {
        let now = Utc::now();
        self.counters
            .read()
            .await
            .iter()
            .map(|(category, counter)| {
                (
                    *category,
                    CategoryStats {
                        count: counter.count,
                        last_error: counter.last_error,
                        since_last: (now - counter.last_error)
                            .to_std()
                            .unwrap_or(Duration::ZERO),
                    },
                )
            })
            .collect()
    }

    /// Count for a single category
    pub async fn count(&self, category: ErrorCategory) -> u64 {
        self.counters
            .read()
            .await
            .get(&category)
            .map(|c| c.count)
            .unwrap_or(0)
    }

    /// Clear all counters
    pub async fn reset(&self) {
        self.counters.write().await.clear();
        info!("Error counters reset");
    }

    /// Number of immediate critical alerts emitted
    pub fn critical_alerts_sent(&self) -> u64 {
        self.critical_alerts_sent.load(Ordering::Relaxed)
    }

    fn send_critical_alert(&self, record: &ErrorRecord) {
        self.critical_alerts_sent.fetch_add(1, Ordering::Relaxed);
        error!(
            alert_sent = true,
            record_id = %record.id(),
            category = %record.category(),
            scope_key = record.context().scope_key.as_deref(),
            "CRITICAL ALERT: {}",
            record.message()
        );
    }

    fn log_record(record: &ErrorRecord) {
        let ctx = record.context();
        match record.severity() {
            ErrorSeverity::Critical => error!(
                record_id = %record.id(),
                category = %record.category(),
                retryable = record.is_retryable(),
                subject_id = ctx.subject_id.as_deref(),
                scope_key = ctx.scope_key.as_deref(),
                correlation_id = ctx.correlation_id.as_deref(),
                component_id = ctx.component_id.as_deref(),
                request_id = ctx.request_id.as_deref(),
                "Critical error occurred: {}",
                record.message()
            ),
            ErrorSeverity::High => warn!(
                record_id = %record.id(),
                category = %record.category(),
                retryable = record.is_retryable(),
                subject_id = ctx.subject_id.as_deref(),
                scope_key = ctx.scope_key.as_deref(),
                correlation_id = ctx.correlation_id.as_deref(),
                component_id = ctx.component_id.as_deref(),
                "Error occurred: {}",
                record.message()
            ),
            ErrorSeverity::Medium => info!(
                record_id = %record.id(),
                category = %record.category(),
                retryable = record.is_retryable(),
                correlation_id = ctx.correlation_id.as_deref(),
                "Error: {}",
                record.message()
            ),
            ErrorSeverity::Low => debug!(
                record_id = %record.id(),
                category = %record.category(),
                "Minor error: {}",
                record.message()
            ),
        }
    }
}

impl Default for ErrorHandler {
    fn default() -> Self {
        Self::new(HandlerConfig::default())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rstest::rstest;

    #[tokio::test]
    async fn test_counter_equals_calls() {
        let handler = ErrorHandler::default();
        for _ in 0..7 {
            handler.handle(ErrorRecord::transport("socket closed"), None).await;
        }
        handler.handle(ErrorRecord::validation("bad plate"), None).await;

        assert_eq!(handler.count(ErrorCategory::ConnectionTransport).await, 7);
        assert_eq!(handler.count(ErrorCategory::Validation).await, 1);
        assert_eq!(handler.count(ErrorCategory::PersistenceQuery).await, 0);
    }

    #[tokio::test]
    async fn test_reset_clears_stats() {
        let handler = ErrorHandler::default();
        handler.handle(ErrorRecord::transport("x"), None).await;
        handler.handle(ErrorRecord::message_send("y"), None).await;
        assert_eq!(handler.stats().await.len(), 2);

        handler.reset().await;
        assert!(handler.stats().await.is_empty());
        assert_eq!(handler.count(ErrorCategory::ConnectionTransport).await, 0);
    }

    #[tokio::test]
    async fn test_raw_error_wrapped_as_unknown() {
        let handler = ErrorHandler::default();
        let record = handler
            .handle(
                anyhow::anyhow!("OCR vendor returned garbage"),
                Some(ErrorContext::new().with_request_id("req-1")),
            )
            .await;

        assert_eq!(record.category(), ErrorCategory::Unknown);
        assert_eq!(record.severity(), ErrorSeverity::Medium);
        assert!(!record.is_retryable());
        assert_eq!(record.context().request_id.as_deref(), Some("req-1"));
        assert_eq!(handler.count(ErrorCategory::Unknown).await, 1);
    }

    #[tokio::test]
    async fn test_extra_context_merged_into_record() {
        let handler = ErrorHandler::default();
        let record = ErrorRecord::persistence_query("timeout")
            .with_context(ErrorContext::new().with_scope_key("village-a"));
        let record = handler
            .handle(
                record,
                Some(ErrorContext::new().with_subject_id("guard-7")),
            )
            .await;

        assert_eq!(record.context().scope_key.as_deref(), Some("village-a"));
        assert_eq!(record.context().subject_id.as_deref(), Some("guard-7"));
    }

    #[tokio::test]
    async fn test_critical_alert_sent() {
        let handler = ErrorHandler::default();
        handler
            .handle(ErrorRecord::persistence_connection("pool exhausted"), None)
            .await;
        handler.handle(ErrorRecord::transport("closed"), None).await;
        assert_eq!(handler.critical_alerts_sent(), 1);
    }

    #[rstest]
    #[case(11, 59, vec![ErrorPattern::Spike])]
    #[case(11, 10, vec![ErrorPattern::Spike, ErrorPattern::Repetition])]
    #[case(6, 29, vec![ErrorPattern::Repetition])]
    #[case(6, 30, vec![])]
    #[case(10, 1, vec![ErrorPattern::Repetition])]
    #[case(5, 1, vec![])]
    #[case(20, 60, vec![])]
    fn test_detect_patterns(
        #[case] count: u64,
        #[case] gap_secs: u64,
        #[case] expected: Vec<ErrorPattern>,
    ) {
        let handler = ErrorHandler::default();
        assert_eq!(
            handler.detect_patterns(count, Duration::from_secs(gap_secs)),
            expected
        );
    }
}
