//! Rolling error metrics
//!
//! Snapshots are always derived from the retained history filtered to the
//! trailing window, never updated incrementally.

use crate::record::{ErrorCategory, ErrorRecord, ErrorSeverity};
use chrono::{DateTime, Duration, Timelike, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// Aggregated view of the trailing window
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MetricsSnapshot {
    /// Records inside the window
    pub total_errors: u64,
    pub errors_by_category: BTreeMap<ErrorCategory, u64>,
    pub errors_by_severity: BTreeMap<ErrorSeverity, u64>,
    /// Records bucketed by UTC hour of day (0-23)
    pub errors_by_hour: BTreeMap<u32, u64>,
    /// Errors per minute over the window
    pub average_error_rate: f64,
    pub critical_error_count: u64,
    pub last_error_time: Option<DateTime<Utc>>,
    /// When this snapshot was computed
    pub computed_at: DateTime<Utc>,
}

impl MetricsSnapshot {
    /// Snapshot with no errors
    pub fn empty(now: DateTime<Utc>) -> Self {
        Self {
            total_errors: 0,
            errors_by_category: BTreeMap::new(),
            errors_by_severity: BTreeMap::new(),
            errors_by_hour: BTreeMap::new(),
            average_error_rate: 0.0,
            critical_error_count: 0,
            last_error_time: None,
            computed_at: now,
        }
    }

    /// Compute a snapshot over records younger than `window` at `now`.
    ///
    /// A record exactly `window` old is outside the window.
    pub fn compute<'a, I>(records: I, window: Duration, now: DateTime<Utc>) -> Self
    where
        I: IntoIterator<Item = &'a ErrorRecord>,
    {
        let mut snapshot = Self::empty(now);

        for record in records
            .into_iter()
            .filter(|r| now - r.timestamp() < window)
        {
            snapshot.total_errors += 1;
            *snapshot
                .errors_by_category
                .entry(record.category())
                .or_insert(0) += 1;
            *snapshot
                .errors_by_severity
                .entry(record.severity())
                .or_insert(0) += 1;
            *snapshot
                .errors_by_hour
                .entry(record.timestamp().hour())
                .or_insert(0) += 1;
            if record.severity() == ErrorSeverity::Critical {
                snapshot.critical_error_count += 1;
            }
            if snapshot
                .last_error_time
                .map_or(true, |last| record.timestamp() > last)
            {
                snapshot.last_error_time = Some(record.timestamp());
            }
        }

        let window_minutes = window.num_milliseconds() as f64 / 60_000.0;
        if window_minutes > 0.0 {
            snapshot.average_error_rate = snapshot.total_errors as f64 / window_minutes;
        }

        snapshot
    }

    /// Count for one category (0 when absent)
    pub fn category_count(&self, category: ErrorCategory) -> u64 {
        self.errors_by_category.get(&category).copied().unwrap_or(0)
    }

    /// Count for one severity (0 when absent)
    pub fn severity_count(&self, severity: ErrorSeverity) -> u64 {
        self.errors_by_severity.get(&severity).copied().unwrap_or(0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    fn hour() -> Duration {
        Duration::hours(1)
    }

    #[test]
    fn test_empty_history() {
        let now = Utc::now();
        let snapshot = MetricsSnapshot::compute(std::iter::empty(), hour(), now);
        assert_eq!(snapshot, MetricsSnapshot::empty(now));
    }

    #[test]
    fn test_buckets() {
        let now = Utc::now();
        let records = vec![
            ErrorRecord::transport("a").at(now - Duration::minutes(1)),
            ErrorRecord::transport("b").at(now - Duration::minutes(2)),
            ErrorRecord::persistence_connection("c").at(now - Duration::minutes(3)),
        ];

        let snapshot = MetricsSnapshot::compute(&records, hour(), now);
        assert_eq!(snapshot.total_errors, 3);
        assert_eq!(snapshot.category_count(ErrorCategory::ConnectionTransport), 2);
        assert_eq!(snapshot.category_count(ErrorCategory::PersistenceConnection), 1);
        assert_eq!(snapshot.severity_count(ErrorSeverity::High), 2);
        assert_eq!(snapshot.critical_error_count, 1);
        assert_eq!(snapshot.errors_by_hour.values().sum::<u64>(), 3);
        assert_eq!(snapshot.last_error_time, Some(now - Duration::minutes(1)));
        assert!((snapshot.average_error_rate - 3.0 / 60.0).abs() < 1e-9);
    }

    #[test]
    fn test_window_boundary() {
        let now = Utc::now();
        let inside = ErrorRecord::validation("inside").at(now - Duration::seconds(59 * 60 + 59));
        let edge = ErrorRecord::validation("edge").at(now - Duration::minutes(60));

        let snapshot = MetricsSnapshot::compute([&inside, &edge], hour(), now);
        assert_eq!(snapshot.total_errors, 1);
        assert_eq!(snapshot.last_error_time, Some(inside.timestamp()));
    }

    #[test]
    fn test_hour_bucket_uses_record_time() {
        let now = Utc::now();
        let record = ErrorRecord::message_parse("bad frame").at(now - Duration::minutes(5));
        let snapshot = MetricsSnapshot::compute([&record], hour(), now);
        assert_eq!(
            snapshot.errors_by_hour.get(&record.timestamp().hour()),
            Some(&1)
        );
    }
}
