//! Engine configuration.
//!
//! Explicit, serializable configuration objects that control how a plan is
//! applied: worker pool size, per-call timeout and the retry policy.
//!
//! The core crate does not read environment variables. All configuration
//! must be provided explicitly by the caller (the CLI maps its flags here).

use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::errors::{TenantOpsError, TenantOpsResult};

/// Upper bound for the worker pool.
pub const MAX_CONCURRENCY: usize = 64;

/// Global engine configuration container.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct EngineConfig {
    /// Maximum number of plan steps in flight at once.
    pub max_concurrency: usize,

    /// Timeout applied to every single control-plane call.
    #[serde(with = "duration_ms")]
    pub call_timeout: Duration,

    pub retry: RetryPolicy,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            max_concurrency: 4,
            call_timeout: Duration::from_secs(120),
            retry: RetryPolicy::default(),
        }
    }
}

impl EngineConfig {
    pub fn with_max_concurrency(mut self, max: usize) -> Self {
        self.max_concurrency = max;
        self
    }

    pub fn with_retry(mut self, retry: RetryPolicy) -> Self {
        self.retry = retry;
        self
    }

    pub fn with_call_timeout(mut self, timeout: Duration) -> Self {
        self.call_timeout = timeout;
        self
    }
}

/// Bounded exponential backoff.
///
/// `max_attempts` counts the initial attempt, so `5` means one try plus four
/// retries. The same policy bounds readiness polling after a create.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RetryPolicy {
    #[serde(with = "duration_ms")]
    pub base_delay: Duration,

    #[serde(with = "duration_ms")]
    pub max_delay: Duration,

    pub max_attempts: u32,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            base_delay: Duration::from_secs(2),
            max_delay: Duration::from_secs(60),
            max_attempts: 5,
        }
    }
}

impl RetryPolicy {
    /// A policy without delays, for tests and local backends.
    pub fn immediate(max_attempts: u32) -> Self {
        Self {
            base_delay: Duration::ZERO,
            max_delay: Duration::ZERO,
            max_attempts,
        }
    }

    /// Delay before the retry following `retries_used` earlier retries.
    ///
    /// base * 2^retries_used, clamped to `max_delay`.
    pub fn delay_for(&self, retries_used: u32) -> Duration {
        let base_ms = self.base_delay.as_millis();
        if base_ms == 0 {
            return Duration::ZERO;
        }
        let max_ms = self.max_delay.as_millis().max(base_ms);
        let shift = retries_used.min(20);
        let backoff_ms = base_ms.saturating_mul(1u128 << shift).min(max_ms);
        Duration::from_millis(u64::try_from(backoff_ms).unwrap_or(u64::MAX))
    }
}

/// Validate a full configuration object.
pub fn validate_config(cfg: &EngineConfig) -> TenantOpsResult<()> {
    if cfg.max_concurrency == 0 || cfg.max_concurrency > MAX_CONCURRENCY {
        return Err(TenantOpsError::invalid_argument(format!(
            "max_concurrency must be within 1..={MAX_CONCURRENCY}"
        )));
    }

    if cfg.call_timeout.is_zero() {
        return Err(TenantOpsError::invalid_argument(
            "call_timeout must be greater than zero",
        ));
    }

    if cfg.retry.max_attempts == 0 {
        return Err(TenantOpsError::invalid_argument(
            "retry.max_attempts must be at least 1",
        ));
    }

    if cfg.retry.max_delay < cfg.retry.base_delay {
        return Err(TenantOpsError::invalid_argument(
            "retry.max_delay must not be below retry.base_delay",
        ));
    }

    Ok(())
}

mod duration_ms {
    use std::time::Duration;

    use serde::{Deserialize, Deserializer, Serializer};

    pub fn serialize<S: Serializer>(d: &Duration, s: S) -> Result<S::Ok, S::Error> {
        s.serialize_u64(u64::try_from(d.as_millis()).unwrap_or(u64::MAX))
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(d: D) -> Result<Duration, D::Error> {
        Ok(Duration::from_millis(u64::deserialize(d)?))
    }
}
