//! Alert rules evaluated against metrics snapshots

use crate::monitoring::metrics::MetricsSnapshot;
use crate::record::{ErrorCategory, ErrorSeverity};
use chrono::{DateTime, Duration, Utc};
use serde::Serialize;
use std::fmt;
use std::sync::Arc;

type Predicate = Arc<dyn Fn(&MetricsSnapshot) -> bool + Send + Sync>;
type MessageFn = Arc<dyn Fn(&MetricsSnapshot) -> String + Send + Sync>;

/// A named condition over a snapshot with a cooldown between firings
#[derive(Clone)]
pub struct AlertRule {
    pub id: String,
    pub name: String,
    pub severity: ErrorSeverity,
    pub cooldown: Duration,
    last_fired: Option<DateTime<Utc>>,
    predicate: Predicate,
    message: MessageFn,
}

impl fmt::Debug for AlertRule {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("AlertRule")
            .field("id", &self.id)
            .field("name", &self.name)
            .field("severity", &self.severity)
            .field("cooldown", &self.cooldown)
            .field("last_fired", &self.last_fired)
            .finish()
    }
}

/// An alert emitted by a rule
#[derive(Debug, Clone, Serialize)]
pub struct FiredAlert {
    pub rule_id: String,
    pub rule_name: String,
    pub severity: ErrorSeverity,
    pub message: String,
    pub fired_at: DateTime<Utc>,
    pub metrics: MetricsSnapshot,
}

impl AlertRule {
    /// Create a rule; the message defaults to the rule name
    pub fn new<I, N, P>(id: I, name: N, severity: ErrorSeverity, cooldown: Duration, predicate: P) -> Self
    where
        I: Into<String>,
        N: Into<String>,
        P: Fn(&MetricsSnapshot) -> bool + Send + Sync + 'static,
    {
        let name = name.into();
        let default_message = name.clone();
        Self {
            id: id.into(),
            name,
            severity,
            cooldown,
            last_fired: None,
            predicate: Arc::new(predicate),
            message: Arc::new(move |_| default_message.clone()),
        }
    }

    /// Set the message generator
    pub fn with_message<M>(mut self, message: M) -> Self
    where
        M: Fn(&MetricsSnapshot) -> String + Send + Sync + 'static,
    {
        self.message = Arc::new(message);
        self
    }

    pub fn last_fired(&self) -> Option<DateTime<Utc>> {
        self.last_fired
    }

    /// Whether the rule is still cooling down at `now`
    pub fn in_cooldown(&self, now: DateTime<Utc>) -> bool {
        self.last_fired
            .map_or(false, |fired| now - fired < self.cooldown)
    }

    /// Evaluate against `snapshot`; fires at most once per cooldown
    pub fn evaluate(&mut self, snapshot: &MetricsSnapshot, now: DateTime<Utc>) -> Option<FiredAlert> {
        if !(self.predicate)(snapshot) || self.in_cooldown(now) {
            return None;
        }

        self.last_fired = Some(now);
        Some(FiredAlert {
            rule_id: self.id.clone(),
            rule_name: self.name.clone(),
            severity: self.severity,
            message: (self.message)(snapshot),
            fired_at: now,
            metrics: snapshot.clone(),
        })
    }
}

/// Rules installed on a fresh monitor
pub fn default_rules() -> Vec<AlertRule> {
    vec![
        AlertRule::new(
            "critical-error-spike",
            "Critical Error Spike",
            ErrorSeverity::Critical,
            Duration::minutes(5),
            |m| m.critical_error_count > 5,
        )
        .with_message(|m| {
            format!(
                "{} critical errors in the last hour",
                m.critical_error_count
            )
        }),
        AlertRule::new(
            "high-error-rate",
            "High Error Rate",
            ErrorSeverity::High,
            Duration::minutes(10),
            |m| m.average_error_rate > 10.0,
        )
        .with_message(|m| format!("Error rate is {:.2} errors/min", m.average_error_rate)),
        AlertRule::new(
            "transport-error-spike",
            "Transport Error Spike",
            ErrorSeverity::High,
            Duration::minutes(5),
            |m| m.category_count(ErrorCategory::ConnectionTransport) > 10,
        )
        .with_message(|m| {
            format!(
                "{} transport connection errors in the last hour",
                m.category_count(ErrorCategory::ConnectionTransport)
            )
        }),
        AlertRule::new(
            "persistence-error-spike",
            "Persistence Error Spike",
            ErrorSeverity::High,
            Duration::minutes(10),
            |m| m.category_count(ErrorCategory::PersistenceQuery) > 5,
        )
        .with_message(|m| {
            format!(
                "{} database query errors in the last hour",
                m.category_count(ErrorCategory::PersistenceQuery)
            )
        }),
    ]
}
