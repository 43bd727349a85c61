//! Error recovery: backoff curves, category strategies, the recovery
//! queue and circuit breakers.

pub mod backoff;
pub mod circuit_breaker;
pub mod recovery_engine;
pub mod strategies;

// Re-export commonly used types
pub use backoff::Backoff;
pub use circuit_breaker::{
    CircuitBreaker, CircuitBreakerManager, CircuitBreakerStats, CircuitState,
};
pub use recovery_engine::{RecoveryEngine, RecoveryQueueEntry, RecoveryStats};
pub use strategies::{
    AssumeRecovered, NotificationRecovery, PersistenceRecovery, RecoveryStrategy, Remediation,
    TransportRecovery,
};
