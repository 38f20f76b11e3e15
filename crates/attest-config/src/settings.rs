//! Configuration schema.
//!
//! Every section and field has a default, so an empty document is a valid
//! configuration.
//!
//! Example:
//! ```toml
//! [rate_limit]
//! rate = 120
//! window_secs = 60
//!
//! [retention]
//! days = 30
//!
//! [service]
//! storage_timeout_ms = 2000
//! ```

use std::time::Duration;

use serde::{Deserialize, Serialize};

use attest_core::ServiceOptions;
use attest_ratelimit::DEFAULT_MAX_TRACKED_KEYS;

/// Top-level configuration document.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct AttestConfig {
    pub rate_limit: RateLimitConfig,
    pub retention: RetentionConfig,
    pub service: ServiceConfig,
}

/// Per-client admission control.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct RateLimitConfig {
    /// Requests admitted per window per client.
    pub rate: u32,
    /// Window length in seconds.
    pub window_secs: u64,
    /// Soft bound on tracked clients before lapsed entries are evicted.
    pub max_tracked_keys: usize,
    /// How often the background sweeper drops lapsed entries. 0 disables it.
    pub sweep_interval_secs: u64,
}

impl Default for RateLimitConfig {
    fn default() -> Self {
        Self {
            rate: 60,
            window_secs: 60,
            max_tracked_keys: DEFAULT_MAX_TRACKED_KEYS,
            sweep_interval_secs: 60,
        }
    }
}

impl RateLimitConfig {
    pub fn window(&self) -> Duration {
        Duration::from_secs(self.window_secs)
    }

    pub fn sweep_interval(&self) -> Option<Duration> {
        (self.sweep_interval_secs > 0).then(|| Duration::from_secs(self.sweep_interval_secs))
    }
}

/// How long records stay reachable.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct RetentionConfig {
    pub days: u32,
}

impl Default for RetentionConfig {
    fn default() -> Self {
        Self { days: 90 }
    }
}

/// Ingestion service tunables.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ServiceConfig {
    /// Deadline for each storage call, in milliseconds. Absent means none.
    pub storage_timeout_ms: Option<u64>,
    /// Delay before re-reading a conflicting idempotency fingerprint.
    pub idempotency_retry_delay_ms: u64,
}

impl Default for ServiceConfig {
    fn default() -> Self {
        Self {
            storage_timeout_ms: None,
            idempotency_retry_delay_ms: 25,
        }
    }
}

impl ServiceConfig {
    pub fn options(&self) -> ServiceOptions {
        ServiceOptions {
            storage_timeout: self.storage_timeout_ms.map(Duration::from_millis),
            idempotency_retry_delay: Duration::from_millis(self.idempotency_retry_delay_ms),
        }
    }
}
