//! Shared fixtures for integration tests

#![allow(dead_code)]

use async_trait::async_trait;
use gate_resilience::{ErrorRecord, ResilienceContext, ResilienceError, Remediation, Result};
use std::sync::atomic::{AtomicU32, Ordering};
use std::time::Duration;

/// Remediation that fails a fixed number of times, then succeeds
pub struct FlakyRemediation {
    failures_left: AtomicU32,
    calls: AtomicU32,
}

impl FlakyRemediation {
    pub fn new(failures: u32) -> Self {
        Self {
            failures_left: AtomicU32::new(failures),
            calls: AtomicU32::new(0),
        }
    }

    pub fn calls(&self) -> u32 {
        self.calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl Remediation for FlakyRemediation {
    async fn remediate(&self, _record: &ErrorRecord) -> Result<()> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        let left = self.failures_left.load(Ordering::SeqCst);
        if left > 0 {
            self.failures_left.store(left - 1, Ordering::SeqCst);
            return Err(ResilienceError::recovery("still unreachable"));
        }
        Ok(())
    }
}

/// Poll until the recovery queue is empty and the loop has exited
pub async fn wait_for_recovery_idle(ctx: &ResilienceContext) {
    loop {
        let stats = ctx.recovery_stats().await;
        if !stats.is_processing && stats.queue_length == 0 {
            return;
        }
        tokio::time::sleep(Duration::from_millis(100)).await;
    }
}
