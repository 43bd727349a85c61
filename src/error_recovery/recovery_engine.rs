//! Queue-driven recovery of retryable error records
//!
//! Records accepted by [`RecoveryEngine::handle`] go to the back of a FIFO
//! queue. A single background loop drains it, running the matching strategy
//! for the head entry and re-queueing failures to the back until the
//! strategy's ceiling is hit. Recovery is fire-and-forget: outcomes are only
//! logged.

use crate::config::RecoveryConfig;
use crate::error_recovery::strategies::{
    NotificationRecovery, PersistenceRecovery, RecoveryStrategy, TransportRecovery,
};
use crate::record::ErrorRecord;
use serde::Serialize;
use std::collections::VecDeque;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::Mutex;
use tokio::time::sleep;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

/// A record waiting for recovery
#[derive(Debug, Clone)]
pub struct RecoveryQueueEntry {
    pub record: ErrorRecord,
    /// Failed recovery attempts so far
    pub attempts: u32,
}

/// Introspection view of the engine
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct RecoveryStats {
    pub queue_length: usize,
    pub is_processing: bool,
    pub strategies: Vec<String>,
}

struct EngineState {
    strategies: Vec<Arc<dyn RecoveryStrategy>>,
    queue: Mutex<VecDeque<RecoveryQueueEntry>>,
    processing: AtomicBool,
    pause: Duration,
    shutdown: CancellationToken,
}

impl EngineState {
    fn strategy_for(&self, record: &ErrorRecord) -> Option<Arc<dyn RecoveryStrategy>> {
        self.strategies
            .iter()
            .find(|s| s.can_handle(record))
            .cloned()
    }

    /// Pop the head entry, or clear the processing flag if the queue is empty.
    ///
    /// The flag is cleared while the queue lock is held so a concurrent
    /// `handle` either sees the entry consumed or starts a new loop.
    async fn next_entry(&self) -> Option<RecoveryQueueEntry> {
        let mut queue = self.queue.lock().await;
        let entry = queue.pop_front();
        if entry.is_none() {
            self.processing.store(false, Ordering::SeqCst);
        }
        entry
    }

    async fn process_queue(self: Arc<Self>) {
        debug!("Recovery loop started");

        loop {
            if self.shutdown.is_cancelled() {
                self.processing.store(false, Ordering::SeqCst);
                info!("Recovery loop cancelled");
                break;
            }

            let Some(entry) = self.next_entry().await else {
                break;
            };
            self.process_entry(entry).await;

            tokio::select! {
                _ = self.shutdown.cancelled() => {}
                _ = sleep(self.pause) => {}
            }
        }

        debug!("Recovery loop drained");
    }

    async fn process_entry(&self, entry: RecoveryQueueEntry) {
        let record = &entry.record;
        let Some(strategy) = self.strategy_for(record) else {
            warn!(record_id = %record.id(), category = %record.category(), "No recovery strategy, dropping");
            return;
        };

        if entry.attempts >= strategy.max_retries() {
            error!(
                record_id = %record.id(),
                strategy = strategy.name(),
                attempts = entry.attempts,
                "Max recovery attempts reached, giving up: {}",
                record.message()
            );
            return;
        }

        match strategy.recover(record).await {
            Ok(true) => {
                info!(
                    record_id = %record.id(),
                    strategy = strategy.name(),
                    attempts = entry.attempts + 1,
                    "Recovered from error: {}",
                    record.message()
                );
            }
            outcome => {
                if let Err(e) = outcome {
                    warn!(record_id = %record.id(), strategy = strategy.name(), "Recovery strategy failed: {}", e);
                }
                debug!(
                    record_id = %record.id(),
                    attempts = entry.attempts + 1,
                    "Recovery attempt unsuccessful, re-queueing"
                );
                self.queue.lock().await.push_back(RecoveryQueueEntry {
                    record: entry.record,
                    attempts: entry.attempts + 1,
                });
            }
        }
    }
}

/// Owns the recovery queue and the registered strategies
pub struct RecoveryEngine {
    state: Arc<EngineState>,
}

impl RecoveryEngine {
    /// Engine with the built-in transport, persistence and notification strategies
    pub fn new(config: RecoveryConfig) -> Self {
        Self::with_strategies(
            config,
            vec![
                Arc::new(TransportRecovery::default()),
                Arc::new(PersistenceRecovery::default()),
                Arc::new(NotificationRecovery::default()),
            ],
        )
    }

    /// Engine with an explicit strategy list; earlier strategies win
    pub fn with_strategies(config: RecoveryConfig, strategies: Vec<Arc<dyn RecoveryStrategy>>) -> Self {
        Self {
            state: Arc::new(EngineState {
                strategies,
                queue: Mutex::new(VecDeque::new()),
                processing: AtomicBool::new(false),
                pause: config.inter_attempt_pause,
                shutdown: CancellationToken::new(),
            }),
        }
    }

    /// Queue a record for recovery; returns whether it was accepted
    pub async fn handle(&self, record: ErrorRecord) -> bool {
        if self.state.strategy_for(&record).is_none() {
            debug!(
                record_id = %record.id(),
                category = %record.category(),
                "No recovery strategy for category"
            );
            return false;
        }

        if !record.is_retryable() {
            debug!(record_id = %record.id(), "Record not retryable, skipping recovery");
            return false;
        }

        if self.state.shutdown.is_cancelled() {
            warn!(record_id = %record.id(), "Recovery engine cancelled, rejecting record");
            return false;
        }

        debug!(record_id = %record.id(), category = %record.category(), "Queued for recovery");
        self.state
            .queue
            .lock()
            .await
            .push_back(RecoveryQueueEntry {
                record,
                attempts: 0,
            });

        if self
            .state
            .processing
            .compare_exchange(false, true, Ordering::SeqCst, Ordering::SeqCst)
            .is_ok()
        {
            tokio::spawn(self.state.clone().process_queue());
        }

        true
    }

    /// Queue length, processing flag and strategy names
    pub async fn recovery_stats(&self) -> RecoveryStats {
        RecoveryStats {
            queue_length: self.state.queue.lock().await.len(),
            is_processing: self.state.processing.load(Ordering::SeqCst),
            strategies: self
                .state
                .strategies
                .iter()
                .map(|s| s.name().to_string())
                .collect(),
        }
    }

    /// Token that stops the loop from picking up further entries when cancelled
    pub fn cancellation_token(&self) -> CancellationToken {
        self.state.shutdown.clone()
    }
}

impl Default for RecoveryEngine {
    fn default() -> Self {
        Self::new(RecoveryConfig::default())
    }
}
