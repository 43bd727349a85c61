//! Category-specific recovery strategies
//!
//! A strategy decides which records it owns, how long to wait between
//! attempts and how many attempts it allows. The actual remediation
//! (reconnect a socket, reprobe the database, re-send a notification) is
//! supplied by the host application through [`Remediation`].

use crate::error::Result;
use crate::error_recovery::backoff::Backoff;
use crate::record::{ErrorCategory, ErrorRecord};
use async_trait::async_trait;
use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::RwLock;
use tokio::time::sleep;
use tracing::{debug, info, warn};

/// Remediation routine for one category family
#[async_trait]
pub trait RecoveryStrategy: Send + Sync {
    /// Identifier shown in recovery stats
    fn name(&self) -> &str;

    /// Whether this strategy owns the record
    fn can_handle(&self, record: &ErrorRecord) -> bool;

    /// Attempt recovery; `Ok(true)` means the fault is resolved
    async fn recover(&self, record: &ErrorRecord) -> Result<bool>;

    /// Delay before the given attempt (0-based)
    fn retry_delay(&self, attempt: u32) -> Duration;

    /// Attempts allowed before the record is dropped
    fn max_retries(&self) -> u32;
}

/// Host-supplied action performed once the backoff has elapsed
#[async_trait]
pub trait Remediation: Send + Sync {
    async fn remediate(&self, record: &ErrorRecord) -> Result<()>;
}

/// Remediation that treats the backoff itself as the fix
#[derive(Debug, Default, Clone, Copy)]
pub struct AssumeRecovered;

#[async_trait]
impl Remediation for AssumeRecovered {
    async fn remediate(&self, record: &ErrorRecord) -> Result<()> {
        debug!(record_id = %record.id(), "No remediation hook installed, assuming recovered");
        Ok(())
    }
}

/// Shared machinery of the built-in strategies: a backoff curve, a retry
/// ceiling and per-key attempt counters
struct KeyedRetry {
    backoff: Backoff,
    max_retries: u32,
    attempts: RwLock<HashMap<String, u32>>,
    remediation: Arc<dyn Remediation>,
}

impl KeyedRetry {
    fn new(backoff: Backoff, max_retries: u32, remediation: Arc<dyn Remediation>) -> Self {
        Self {
            backoff,
            max_retries,
            attempts: RwLock::new(HashMap::new()),
            remediation,
        }
    }

    async fn run(&self, strategy: &str, key: String, record: &ErrorRecord) -> Result<bool> {
        let attempt = self.attempts.read().await.get(&key).copied().unwrap_or(0);
        if attempt >= self.max_retries {
            warn!(strategy, key = %key, attempt, "Retry ceiling reached for key");
            self.attempts.write().await.remove(&key);
            return Ok(false);
        }

        let delay = self.backoff.delay(attempt);
        debug!(
            strategy,
            key = %key,
            attempt,
            delay_ms = delay.as_millis() as u64,
            "Waiting before recovery attempt"
        );
        sleep(delay).await;

        match self.remediation.remediate(record).await {
            Ok(()) => {
                self.attempts.write().await.remove(&key);
                info!(strategy, key = %key, "Recovery succeeded");
                Ok(true)
            }
            Err(e) => {
                let mut attempts = self.attempts.write().await;
                let failed = attempts.entry(key.clone()).or_insert(0);
                *failed += 1;
                // Last allowed attempt spent: the next outage on this key starts fresh
                if *failed >= self.max_retries {
                    attempts.remove(&key);
                }
                warn!(strategy, key = %key, attempt, "Recovery attempt failed: {}", e);
                Ok(false)
            }
        }
    }

    async fn pending(&self, key: &str) -> u32 {
        self.attempts.read().await.get(key).copied().unwrap_or(0)
    }
}

/// Reconnects dropped realtime connections
pub struct TransportRecovery {
    inner: KeyedRetry,
}

impl TransportRecovery {
    pub const NAME: &'static str = "transport-recovery";

    pub fn new(remediation: Arc<dyn Remediation>) -> Self {
        Self {
            inner: KeyedRetry::new(Backoff::transport(), 5, remediation),
        }
    }

    /// Counter key: the socket id
    fn key(record: &ErrorRecord) -> String {
        record
            .context()
            .component_id
            .clone()
            .unwrap_or_else(|| "default".to_string())
    }

    /// Failed attempts recorded for a socket
    pub async fn attempts_for(&self, socket_id: &str) -> u32 {
        self.inner.pending(socket_id).await
    }
}

impl Default for TransportRecovery {
    fn default() -> Self {
        Self::new(Arc::new(AssumeRecovered))
    }
}

#[async_trait]
impl RecoveryStrategy for TransportRecovery {
    fn name(&self) -> &str {
        Self::NAME
    }

    fn can_handle(&self, record: &ErrorRecord) -> bool {
        matches!(
            record.category(),
            ErrorCategory::ConnectionTransport | ErrorCategory::MessageSend
        )
    }

    async fn recover(&self, record: &ErrorRecord) -> Result<bool> {
        self.inner.run(Self::NAME, Self::key(record), record).await
    }

    fn retry_delay(&self, attempt: u32) -> Duration {
        self.inner.backoff.delay(attempt)
    }

    fn max_retries(&self) -> u32 {
        self.inner.max_retries
    }
}

/// Reprobes the database after connection or query failures
pub struct PersistenceRecovery {
    inner: KeyedRetry,
}

impl PersistenceRecovery {
    pub const NAME: &'static str = "persistence-recovery";

    pub fn new(remediation: Arc<dyn Remediation>) -> Self {
        Self {
            inner: KeyedRetry::new(Backoff::persistence(), 3, remediation),
        }
    }

    /// Counter key: the tenant scope
    fn key(record: &ErrorRecord) -> String {
        record
            .context()
            .scope_key
            .clone()
            .unwrap_or_else(|| "default".to_string())
    }

    /// Failed attempts recorded for a tenant
    pub async fn attempts_for(&self, scope_key: &str) -> u32 {
        self.inner.pending(scope_key).await
    }
}

impl Default for PersistenceRecovery {
    fn default() -> Self {
        Self::new(Arc::new(AssumeRecovered))
    }
}

#[async_trait]
impl RecoveryStrategy for PersistenceRecovery {
    fn name(&self) -> &str {
        Self::NAME
    }

    fn can_handle(&self, record: &ErrorRecord) -> bool {
        matches!(
            record.category(),
            ErrorCategory::PersistenceConnection | ErrorCategory::PersistenceQuery
        )
    }

    async fn recover(&self, record: &ErrorRecord) -> Result<bool> {
        self.inner.run(Self::NAME, Self::key(record), record).await
    }

    fn retry_delay(&self, attempt: u32) -> Duration {
        self.inner.backoff.delay(attempt)
    }

    fn max_retries(&self) -> u32 {
        self.inner.max_retries
    }
}

/// Re-sends notifications that failed to be created or broadcast
pub struct NotificationRecovery {
    inner: KeyedRetry,
}

impl NotificationRecovery {
    pub const NAME: &'static str = "notification-recovery";

    pub fn new(remediation: Arc<dyn Remediation>) -> Self {
        Self {
            inner: KeyedRetry::new(Backoff::notification(), 3, remediation),
        }
    }

    /// Counter key: `notification_id` metadata, else the correlation id
    fn key(record: &ErrorRecord) -> String {
        let ctx = record.context();
        ctx.metadata_str("notification_id")
            .map(str::to_string)
            .or_else(|| ctx.correlation_id.clone())
            .unwrap_or_else(|| "default".to_string())
    }

    /// Failed attempts recorded for a notification
    pub async fn attempts_for(&self, notification_id: &str) -> u32 {
        self.inner.pending(notification_id).await
    }
}

impl Default for NotificationRecovery {
    fn default() -> Self {
        Self::new(Arc::new(AssumeRecovered))
    }
}

#[async_trait]
impl RecoveryStrategy for NotificationRecovery {
    fn name(&self) -> &str {
        Self::NAME
    }

    fn can_handle(&self, record: &ErrorRecord) -> bool {
        matches!(
            record.category(),
            ErrorCategory::NotificationCreate | ErrorCategory::NotificationBroadcast
        )
    }

    async fn recover(&self, record: &ErrorRecord) -> Result<bool> {
        self.inner.run(Self::NAME, Self::key(record), record).await
    }

    fn retry_delay(&self, attempt: u32) -> Duration {
        self.inner.backoff.delay(attempt)
    }

    fn max_retries(&self) -> u32 {
        self.inner.max_retries
    }
}
