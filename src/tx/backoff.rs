//! Retry delays for sequence conflicts, throttling, and timeouts

use crate::config::SubmitterConfig;

use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use std::sync::Mutex;
use std::time::Duration;

/// Source of the delays the submitter sleeps between attempts
pub trait BackoffPolicy: Send + Sync {
    /// Delay before retrying a sequence conflict after `tries_so_far` retries
    fn conflict_delay(&self, tries_so_far: u32) -> Duration;

    /// Cooldown after the ledger throttled a submission
    fn rate_limit_cooldown(&self) -> Duration;

    /// Wait before re-reading the account after a timed out submission
    fn timeout_settle_delay(&self) -> Duration;
}

/// Conflict delays drawn uniformly from `[floor, step * (tries + 1))`.
///
/// The randomness spreads out concurrent writers to the same account so they
/// stop colliding on the same sequence number.
pub struct RandomizedBackoff<R = StdRng> {
    rng: Mutex<R>,
    floor_ms: u64,
    step_ms: u64,
    cooldown: Duration,
    settle: Duration,
}

impl RandomizedBackoff<StdRng> {
    /// Backoff seeded from OS entropy
    pub fn from_config(config: &SubmitterConfig) -> Self {
        Self::with_rng(StdRng::from_entropy(), config)
    }

    /// Deterministic backoff for tests and simulations
    pub fn seeded(seed: u64, config: &SubmitterConfig) -> Self {
        Self::with_rng(StdRng::seed_from_u64(seed), config)
    }
}

impl<R: Rng + Send> RandomizedBackoff<R> {
    pub fn with_rng(rng: R, config: &SubmitterConfig) -> Self {
        Self {
            rng: Mutex::new(rng),
            floor_ms: config.backoff_floor_ms,
            step_ms: config.backoff_step_ms,
            cooldown: Duration::from_millis(config.rate_limit_cooldown_ms),
            settle: Duration::from_millis(config.timeout_settle_ms),
        }
    }

    /// Exclusive upper bound of the conflict delay after `tries_so_far` retries
    pub fn ceiling_ms(&self, tries_so_far: u32) -> u64 {
        self.step_ms.saturating_mul(tries_so_far as u64 + 1)
    }
}

impl<R: Rng + Send> BackoffPolicy for RandomizedBackoff<R> {
    fn conflict_delay(&self, tries_so_far: u32) -> Duration {
        let ceiling = self.ceiling_ms(tries_so_far);
        if ceiling <= self.floor_ms {
            return Duration::from_millis(self.floor_ms);
        }

        let mut rng = self.rng.lock().unwrap_or_else(|poisoned| poisoned.into_inner());
        Duration::from_millis(rng.gen_range(self.floor_ms..ceiling))
    }

    fn rate_limit_cooldown(&self) -> Duration {
        self.cooldown
    }

    fn timeout_settle_delay(&self) -> Duration {
        self.settle
    }
}

/// Fixed delays; `none()` never sleeps
#[derive(Debug, Clone, Default)]
pub struct FixedBackoff {
    pub conflict: Duration,
    pub cooldown: Duration,
    pub settle: Duration,
}

impl FixedBackoff {
    pub fn none() -> Self {
        Self::default()
    }
}

impl BackoffPolicy for FixedBackoff {
    fn conflict_delay(&self, _tries_so_far: u32) -> Duration {
        self.conflict
    }

    fn rate_limit_cooldown(&self) -> Duration {
        self.cooldown
    }

    fn timeout_settle_delay(&self) -> Duration {
        self.settle
    }
}
