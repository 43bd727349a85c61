//! End-to-end scenarios through a single resilience context

mod common;

use common::{wait_for_recovery_idle, FlakyRemediation};
use gate_resilience::error_recovery::PersistenceRecovery;
use gate_resilience::monitoring::AlertRule;
use gate_resilience::record::ErrorSeverity;
use gate_resilience::{
    CircuitState, ErrorCategory, ErrorContext, ErrorRecord, HealthStatus, ResilienceConfig,
    ResilienceContext, ResilienceError,
};
use pretty_assertions::assert_eq;
use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::time::{advance, timeout};

#[tokio::test(start_paused = true)]
async fn test_transport_spike_fires_once_per_cooldown() {
    let ctx = ResilienceContext::default();
    let mut alerts = ctx.subscribe_alerts();
    ctx.start_monitoring(Some(Duration::from_secs(10)))
        .await
        .unwrap();

    for i in 0..11 {
        ctx.report_error(
            ErrorRecord::transport(format!("socket {i} closed")),
            Some(ErrorContext::new().with_component_id(format!("gate-{i}"))),
        )
        .await;
    }

    advance(Duration::from_secs(10)).await;
    let alert = timeout(Duration::from_secs(1), alerts.recv())
        .await
        .expect("alert on first tick")
        .unwrap();
    assert_eq!(alert.rule_id, "transport-error-spike");
    assert_eq!(alert.metrics.category_count(ErrorCategory::ConnectionTransport), 11);

    // Predicate still holds on the next tick, but the rule is cooling down
    advance(Duration::from_secs(10)).await;
    assert!(timeout(Duration::from_secs(1), alerts.recv()).await.is_err());

    let fired = ctx.monitor().fired_alerts().await;
    assert_eq!(fired.len(), 1);

    ctx.shutdown().await;
}

#[tokio::test]
async fn test_non_retryable_validation_never_queued() {
    let ctx = ResilienceContext::default();
    ctx.start_monitoring(None).await.unwrap();

    let record = ctx
        .report_error(ErrorRecord::validation("visitor plate is empty"), None)
        .await;

    assert!(!record.is_retryable());
    assert_eq!(ctx.recovery_stats().await.queue_length, 0);
    assert_eq!(ctx.error_history(10).await.len(), 1);

    ctx.shutdown().await;
}

#[tokio::test(start_paused = true)]
async fn test_breaker_open_half_open_closed() {
    let ctx = ResilienceContext::default();
    let breaker = ctx
        .register_breaker(
            "plate-ocr",
            gate_resilience::config::CircuitBreakerConfig {
                failure_threshold: 3,
                reset_timeout: Duration::from_millis(1000),
            },
        )
        .await;

    for _ in 0..3 {
        let result = breaker
            .execute(|| async { Err::<(), _>(ResilienceError::timeout("ocr service")) })
            .await;
        assert!(matches!(result, Err(ResilienceError::Timeout(_))));
    }
    assert_eq!(breaker.state().await, CircuitState::Open);

    let invocations = AtomicU32::new(0);

    advance(Duration::from_millis(500)).await;
    let result = breaker
        .execute(|| async {
            invocations.fetch_add(1, Ordering::SeqCst);
            Ok("ABC-1234")
        })
        .await;
    assert!(matches!(result, Err(ResilienceError::CircuitOpen { .. })));
    assert_eq!(invocations.load(Ordering::SeqCst), 0);

    advance(Duration::from_millis(1000)).await;
    let plate = breaker
        .execute(|| async {
            invocations.fetch_add(1, Ordering::SeqCst);
            Ok("ABC-1234")
        })
        .await
        .unwrap();
    assert_eq!(plate, "ABC-1234");
    assert_eq!(invocations.load(Ordering::SeqCst), 1);
    assert_eq!(breaker.state().await, CircuitState::Closed);
    assert_eq!(breaker.failure_count().await, 0);

    let stats = ctx.breaker_stats().await;
    assert_eq!(stats["plate-ocr"].blocked_requests, 1);
}

#[tokio::test]
async fn test_counters_and_reset() {
    let ctx = ResilienceContext::default();

    for _ in 0..7 {
        ctx.report_error(ErrorRecord::rate_limit("too many visitor passes"), None)
            .await;
    }
    ctx.report_error(anyhow::anyhow!("unexpected panic in handler"), None)
        .await;

    let stats = ctx.error_stats().await;
    assert_eq!(stats[&ErrorCategory::RateLimit].count, 7);
    assert_eq!(stats[&ErrorCategory::Unknown].count, 1);

    ctx.reset_counts().await;
    assert!(ctx.error_stats().await.is_empty());
    for category in ErrorCategory::ALL {
        assert_eq!(ctx.handler().count(category).await, 0);
    }
}

#[tokio::test]
async fn test_critical_record_drives_health() {
    let ctx = ResilienceContext::default();
    ctx.start_monitoring(None).await.unwrap();

    for _ in 0..3 {
        ctx.report_error(ErrorRecord::message_parse("bad frame"), None)
            .await;
    }
    assert_eq!(ctx.health().await.status, HealthStatus::Healthy);

    let record = ctx
        .report_error(
            ErrorRecord::persistence_connection("connection refused")
                .retryable(false),
            Some(ErrorContext::new().with_scope_key("village-a")),
        )
        .await;
    assert_eq!(record.severity(), ErrorSeverity::Critical);
    assert_eq!(ctx.handler().critical_alerts_sent(), 1);

    let health = ctx.health().await;
    assert_eq!(health.status, HealthStatus::Critical);
    assert_eq!(health.message, "1 critical errors in the last hour");

    let report = ctx.report().await;
    assert!(report.contains("Health: CRITICAL"));
    assert!(report.contains("connection refused"));

    ctx.shutdown().await;
}

#[tokio::test(start_paused = true)]
async fn test_persistence_recovery_with_remediation_hook() {
    let remediation = Arc::new(FlakyRemediation::new(2));
    let ctx = ResilienceContext::builder(ResilienceConfig::default())
        .persistence_remediation(remediation.clone())
        .build();

    let record = ctx
        .report_error(
            ErrorRecord::persistence_query("statement timeout"),
            Some(ErrorContext::new().with_scope_key("village-a")),
        )
        .await;
    assert!(record.is_retryable());
    assert!(ctx.recovery_stats().await.is_processing);

    wait_for_recovery_idle(&ctx).await;
    assert_eq!(remediation.calls(), 3);
}

#[tokio::test(start_paused = true)]
async fn test_recovery_gives_up_at_ceiling() {
    let remediation = Arc::new(FlakyRemediation::new(u32::MAX));
    let ctx = ResilienceContext::builder(ResilienceConfig::default())
        .persistence_remediation(remediation.clone())
        .build();

    ctx.report_error(ErrorRecord::persistence_query("statement timeout"), None)
        .await;
    wait_for_recovery_idle(&ctx).await;

    assert_eq!(remediation.calls(), 3);
    let stats = ctx.recovery_stats().await;
    assert_eq!(
        stats.strategies,
        vec![
            "transport-recovery".to_string(),
            PersistenceRecovery::NAME.to_string(),
            "notification-recovery".to_string(),
        ]
    );
}

#[tokio::test]
async fn test_custom_alert_rule_via_builder() {
    let ctx = ResilienceContext::builder(ResilienceConfig::default())
        .alert_rule(AlertRule::new(
            "auth-failures",
            "Authentication failures",
            ErrorSeverity::High,
            chrono::Duration::minutes(5),
            |m| m.category_count(ErrorCategory::Authentication) > 1,
        ))
        .build();
    ctx.start_monitoring(None).await.unwrap();

    ctx.report_error(ErrorRecord::authentication("expired token"), None)
        .await;
    assert!(ctx.monitor().evaluate_alerts().await.is_empty());

    ctx.report_error(ErrorRecord::authentication("expired token"), None)
        .await;
    let fired = ctx.monitor().evaluate_alerts().await;
    assert_eq!(fired.len(), 1);
    assert_eq!(fired[0].rule_id, "auth-failures");

    assert!(ctx.remove_alert_rule("auth-failures").await);
    ctx.shutdown().await;
}
