//! Circuit breaker for risky calls
//!
//! A breaker wraps calls to one protected resource. After
//! `failure_threshold` consecutive failures it opens and rejects calls
//! without running them. The first call after `reset_timeout` has elapsed
//! since the last failure is let through in the half-open state: success
//! closes the circuit, failure opens it again. State only changes inside
//! [`CircuitBreaker::execute`]; there is no timer.

use crate::config::CircuitBreakerConfig;
use crate::error::{ResilienceError, Result};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::future::Future;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::RwLock;
use tokio::time::Instant;
use tracing::{debug, error, info, warn};

/// Circuit breaker states
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CircuitState {
    /// Circuit is closed - normal operation
    Closed,
    /// Circuit is open - operations blocked
    Open,
    /// Circuit is half-open - testing if service recovered
    HalfOpen,
}

/// Circuit breaker statistics
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct CircuitBreakerStats {
    /// Current state
    pub state: CircuitState,
    /// Consecutive failures since the last success
    pub failure_count: u32,
    /// Total calls made through the breaker, blocked ones included
    pub total_requests: u64,
    /// Failed requests
    pub failed_requests: u64,
    /// Successful requests
    pub successful_requests: u64,
    /// Requests rejected while open
    pub blocked_requests: u64,
    /// Times the circuit has opened
    pub circuit_open_count: u64,
    /// Time until a trial call is allowed, when open
    #[serde(with = "humantime_serde")]
    pub time_until_half_open: Option<Duration>,
}

/// Internal circuit breaker state
struct BreakerState {
    current_state: CircuitState,
    failure_count: u32,
    last_failure: Option<Instant>,
    total_requests: u64,
    failed_requests: u64,
    successful_requests: u64,
    blocked_requests: u64,
    circuit_open_count: u64,
}

impl BreakerState {
    fn new() -> Self {
        Self {
            current_state: CircuitState::Closed,
            failure_count: 0,
            last_failure: None,
            total_requests: 0,
            failed_requests: 0,
            successful_requests: 0,
            blocked_requests: 0,
            circuit_open_count: 0,
        }
    }

    fn remaining_timeout(&self, reset_timeout: Duration, now: Instant) -> Duration {
        self.last_failure
            .map(|at| reset_timeout.saturating_sub(now.saturating_duration_since(at)))
            .unwrap_or(Duration::ZERO)
    }
}

/// Circuit breaker implementation
pub struct CircuitBreaker {
    name: String,
    config: CircuitBreakerConfig,
    state: RwLock<BreakerState>,
}

impl CircuitBreaker {
    /// Create new circuit breaker
    pub fn new<S: Into<String>>(name: S, config: CircuitBreakerConfig) -> Self {
        Self {
            name: name.into(),
            config,
            state: RwLock::new(BreakerState::new()),
        }
    }

    /// Breaker protecting `name` with the given threshold and timeout
    pub fn with_threshold<S: Into<String>>(
        name: S,
        failure_threshold: u32,
        reset_timeout: Duration,
    ) -> Self {
        Self::new(
            name,
            CircuitBreakerConfig {
                failure_threshold,
                reset_timeout,
            },
        )
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    /// Run `operation` through the breaker.
    ///
    /// Fails fast with [`ResilienceError::CircuitOpen`] while open. Errors
    /// from the operation are always returned to the caller.
    pub async fn execute<F, Fut, T>(&self, operation: F) -> Result<T>
    where
        F: FnOnce() -> Fut,
        Fut: Future<Output = Result<T>>,
    {
        self.before_call().await?;

        match operation().await {
            Ok(value) => {
                self.on_success().await;
                Ok(value)
            }
            Err(e) => {
                self.on_failure(&e).await;
                Err(e)
            }
        }
    }

    async fn before_call(&self) -> Result<()> {
        let mut state = self.state.write().await;
        state.total_requests += 1;

        if state.current_state != CircuitState::Open {
            return Ok(());
        }

        let remaining = state.remaining_timeout(self.config.reset_timeout, Instant::now());
        if remaining.is_zero() {
            state.current_state = CircuitState::HalfOpen;
            info!(breaker = %self.name, "Circuit breaker transitioning to half-open");
            Ok(())
        } else {
            state.blocked_requests += 1;
            debug!(
                breaker = %self.name,
                retry_in_ms = remaining.as_millis() as u64,
                "Circuit breaker open, blocking request"
            );
            Err(ResilienceError::circuit_open(self.name.clone(), remaining))
        }
    }

    async fn on_success(&self) {
        let mut state = self.state.write().await;
        state.successful_requests += 1;
        state.failure_count = 0;
        if state.current_state != CircuitState::Closed {
            info!(breaker = %self.name, "Circuit breaker closed after successful recovery");
        }
        state.current_state = CircuitState::Closed;
    }

    async fn on_failure(&self, err: &ResilienceError) {
        let mut state = self.state.write().await;
        state.failed_requests += 1;
        state.failure_count += 1;
        state.last_failure = Some(Instant::now());

        let should_open = state.current_state == CircuitState::HalfOpen
            || state.failure_count >= self.config.failure_threshold;

        if should_open {
            if state.current_state != CircuitState::Open {
                state.circuit_open_count += 1;
            }
            state.current_state = CircuitState::Open;
            error!(
                breaker = %self.name,
                failures = state.failure_count,
                "Circuit breaker opened: {}",
                err
            );
        } else {
            warn!(
                breaker = %self.name,
                failures = state.failure_count,
                threshold = self.config.failure_threshold,
                "Call failed through circuit breaker: {}",
                err
            );
        }
    }

    /// Current state
    pub async fn state(&self) -> CircuitState {
        self.state.read().await.current_state
    }

    /// Consecutive failure count
    pub async fn failure_count(&self) -> u32 {
        self.state.read().await.failure_count
    }

    /// Get current statistics
    pub async fn stats(&self) -> CircuitBreakerStats {
        let state = self.state.read().await;
        let time_until_half_open = (state.current_state == CircuitState::Open)
            .then(|| state.remaining_timeout(self.config.reset_timeout, Instant::now()));

        CircuitBreakerStats {
            state: state.current_state,
            failure_count: state.failure_count,
            total_requests: state.total_requests,
            failed_requests: state.failed_requests,
            successful_requests: state.successful_requests,
            blocked_requests: state.blocked_requests,
            circuit_open_count: state.circuit_open_count,
            time_until_half_open,
        }
    }

    /// Reset circuit breaker to closed
    pub async fn reset(&self) {
        let mut state = self.state.write().await;
        state.current_state = CircuitState::Closed;
        state.failure_count = 0;
        state.last_failure = None;
        info!(breaker = %self.name, "Circuit breaker reset to closed state");
    }
}

/// Named circuit breakers, one per protected resource
pub struct CircuitBreakerManager {
    breakers: RwLock<HashMap<String, Arc<CircuitBreaker>>>,
    default_config: CircuitBreakerConfig,
}

impl CircuitBreakerManager {
    /// Create new circuit breaker manager
    pub fn new(default_config: CircuitBreakerConfig) -> Self {
        Self {
            breakers: RwLock::new(HashMap::new()),
            default_config,
        }
    }

    /// Get or create the breaker for a resource
    pub async fn get_breaker(&self, name: &str) -> Arc<CircuitBreaker> {
        if let Some(breaker) = self.breakers.read().await.get(name) {
            return breaker.clone();
        }

        let mut breakers = self.breakers.write().await;
        breakers
            .entry(name.to_string())
            .or_insert_with(|| {
                info!("Created new circuit breaker for resource: {}", name);
                Arc::new(CircuitBreaker::new(name, self.default_config.clone()))
            })
            .clone()
    }

    /// Register a breaker with its own configuration, replacing any existing one
    pub async fn register(&self, name: &str, config: CircuitBreakerConfig) -> Arc<CircuitBreaker> {
        let breaker = Arc::new(CircuitBreaker::new(name, config));
        self.breakers
            .write()
            .await
            .insert(name.to_string(), breaker.clone());
        breaker
    }

    /// Get all circuit breaker statistics
    pub async fn get_all_stats(&self) -> HashMap<String, CircuitBreakerStats> {
        let breakers: Vec<_> = self
            .breakers
            .read()
            .await
            .iter()
            .map(|(name, breaker)| (name.clone(), breaker.clone()))
            .collect();

        let mut stats = HashMap::new();
        for (name, breaker) in breakers {
            stats.insert(name, breaker.stats().await);
        }
        stats
    }

    /// Reset all circuit breakers
    pub async fn reset_all(&self) {
        let breakers = self.breakers.read().await;
        for breaker in breakers.values() {
            breaker.reset().await;
        }
    }
}
