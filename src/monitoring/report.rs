//! Plain-text error report

use crate::monitoring::monitor::HealthReport;
use crate::record::SerializedRecord;
use chrono::{DateTime, Utc};
use std::fmt::Write;

const RULE: &str = "==================================================";

/// Render the fixed-layout report
pub fn render(health: &HealthReport, recent: &[SerializedRecord], now: DateTime<Utc>) -> String {
    let metrics = &health.metrics;
    let mut out = String::new();

    // Writing into a String cannot fail
    let _ = writeln!(out, "{RULE}");
    let _ = writeln!(out, "ERROR MONITORING REPORT");
    let _ = writeln!(out, "Generated: {}", now.to_rfc3339());
    let _ = writeln!(out, "{RULE}");
    let _ = writeln!(out);

    let _ = writeln!(
        out,
        "Health: {} - {}",
        health.status.as_str().to_uppercase(),
        health.message
    );
    let _ = writeln!(out);

    let _ = writeln!(out, "Metrics (last hour)");
    let _ = writeln!(out, "  Total errors:     {}", metrics.total_errors);
    let _ = writeln!(out, "  Critical errors:  {}", metrics.critical_error_count);
    let _ = writeln!(
        out,
        "  Error rate:       {:.2} errors/min",
        metrics.average_error_rate
    );
    let _ = writeln!(
        out,
        "  Last error:       {}",
        metrics
            .last_error_time
            .map(|t| t.to_rfc3339())
            .unwrap_or_else(|| "never".to_string())
    );
    let _ = writeln!(out);

    let _ = writeln!(out, "Errors by category");
    if metrics.errors_by_category.is_empty() {
        let _ = writeln!(out, "  (none)");
    } else {
        let mut categories: Vec<_> = metrics.errors_by_category.iter().collect();
        categories.sort_by(|a, b| b.1.cmp(a.1).then(a.0.cmp(b.0)));
        for (category, count) in categories {
            let _ = writeln!(out, "  {:<24} {}", category.as_str(), count);
        }
    }
    let _ = writeln!(out);

    let _ = writeln!(out, "Errors by severity");
    for (severity, count) in metrics.errors_by_severity.iter().rev() {
        let _ = writeln!(out, "  {:<24} {}", severity.as_str(), count);
    }
    let _ = writeln!(out);

    let _ = writeln!(out, "Recent errors ({})", recent.len());
    if recent.is_empty() {
        let _ = writeln!(out, "  (none)");
    }
    for record in recent {
        let _ = writeln!(
            out,
            "  {} [{}/{}] {}",
            record.recorded_at.format("%Y-%m-%d %H:%M:%S"),
            record.category,
            record.severity,
            record.message
        );
    }
    let _ = writeln!(out, "{RULE}");

    out
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::monitoring::metrics::MetricsSnapshot;
    use crate::record::ErrorRecord;

    #[test]
    fn test_render_sections() {
        let now = Utc::now();
        let records = vec![
            ErrorRecord::transport("socket reset"),
            ErrorRecord::transport("socket reset"),
            ErrorRecord::persistence_connection("db down"),
        ];
        let metrics = MetricsSnapshot::compute(&records, chrono::Duration::hours(1), now);
        let health = HealthReport {
            status: crate::monitoring::HealthStatus::Critical,
            message: "1 critical errors in the last hour".to_string(),
            metrics,
        };
        let recent: Vec<_> = records.iter().map(|r| r.serialize()).collect();

        let text = render(&health, &recent, now);
        assert!(text.contains("ERROR MONITORING REPORT"));
        assert!(text.contains("Health: CRITICAL - 1 critical errors in the last hour"));
        assert!(text.contains("Total errors:     3"));
        assert!(text.contains("Recent errors (3)"));
        assert!(text.contains("[persistence_connection/critical] db down"));

        let transport = text.find("connection_transport").unwrap();
        let persistence = text.find("persistence_connection").unwrap();
        assert!(transport < persistence, "categories sorted by count");
    }

    #[test]
    fn test_render_empty() {
        let now = Utc::now();
        let health = HealthReport {
            status: crate::monitoring::HealthStatus::Healthy,
            message: "All systems operational".to_string(),
            metrics: MetricsSnapshot::empty(now),
        };
        let text = render(&health, &[], now);
        assert!(text.contains("Last error:       never"));
        assert!(text.contains("(none)"));
    }
}
