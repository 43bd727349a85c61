//! Backoff curves used by the recovery strategies

use rand::Rng;
use serde::{Deserialize, Serialize};
use std::time::Duration;

/// Delay curve for successive recovery attempts (attempt index starts at 0)
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum Backoff {
    /// `base * 2^attempt`, capped, plus random jitter in `[0, jitter)`
    Exponential {
        #[serde(with = "humantime_serde")]
        base: Duration,
        #[serde(with = "humantime_serde")]
        cap: Duration,
        #[serde(with = "humantime_serde")]
        jitter: Duration,
    },
    /// `step * (attempt + 1)`, capped
    Linear {
        #[serde(with = "humantime_serde")]
        step: Duration,
        #[serde(with = "humantime_serde")]
        cap: Duration,
    },
    /// `base * factor^attempt`, capped
    Geometric {
        #[serde(with = "humantime_serde")]
        base: Duration,
        factor: f64,
        #[serde(with = "humantime_serde")]
        cap: Duration,
    },
}

impl Backoff {
    /// Transport reconnects: 1s doubling to 30s, up to 1s jitter
    pub fn transport() -> Self {
        Backoff::Exponential {
            base: Duration::from_millis(1000),
            cap: Duration::from_millis(30_000),
            jitter: Duration::from_millis(1000),
        }
    }

    /// Database reprobes: 2s steps to 10s
    pub fn persistence() -> Self {
        Backoff::Linear {
            step: Duration::from_millis(2000),
            cap: Duration::from_millis(10_000),
        }
    }

    /// Notification re-sends: 500ms growing x1.5 to 5s
    pub fn notification() -> Self {
        Backoff::Geometric {
            base: Duration::from_millis(500),
            factor: 1.5,
            cap: Duration::from_millis(5000),
        }
    }

    /// Delay before the given attempt
    pub fn delay(&self, attempt: u32) -> Duration {
        match self {
            Backoff::Exponential { jitter, .. } => {
                let jitter_ms = jitter.as_millis() as u64;
                let extra = if jitter_ms == 0 {
                    0
                } else {
                    rand::thread_rng().gen_range(0..jitter_ms)
                };
                self.base_delay(attempt) + Duration::from_millis(extra)
            }
            _ => self.base_delay(attempt),
        }
    }

    /// Delay before the given attempt without jitter
    pub fn base_delay(&self, attempt: u32) -> Duration {
        match self {
            Backoff::Exponential { base, cap, .. } => {
                let ms = base.as_millis() as f64 * 2f64.powi(attempt.min(62) as i32);
                capped(ms, *cap)
            }
            Backoff::Linear { step, cap } => {
                let ms = step.as_millis() as f64 * (attempt as f64 + 1.0);
                capped(ms, *cap)
            }
            Backoff::Geometric { base, factor, cap } => {
                let ms = base.as_millis() as f64 * factor.powi(attempt.min(i32::MAX as u32) as i32);
                capped(ms, *cap)
            }
        }
    }
}

fn capped(ms: f64, cap: Duration) -> Duration {
    let cap_ms = cap.as_millis() as f64;
    if !ms.is_finite() || ms > cap_ms {
        cap
    } else {
        Duration::from_millis(ms as u64)
    }
}
