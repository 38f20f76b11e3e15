//! Loading configuration from TOML and the environment.

use std::path::Path;

use tracing::debug;

use attest_contracts::{AttestError, AttestResult};

use crate::settings::AttestConfig;

/// Requests per window per client.
pub const ENV_RATE: &str = "ATTEST_RATE";
/// Rate window in seconds.
pub const ENV_RATE_WINDOW_SECS: &str = "ATTEST_RATE_WINDOW_SECS";
/// Retention horizon in days.
pub const ENV_RETENTION_DAYS: &str = "ATTEST_RETENTION_DAYS";
/// Per-call storage deadline in milliseconds.
pub const ENV_STORAGE_TIMEOUT_MS: &str = "ATTEST_STORAGE_TIMEOUT_MS";

impl AttestConfig {
    /// Parse `s` as a TOML configuration document.
    ///
    /// Returns `AttestError::Config` if the TOML is malformed or does not
    /// match the schema.
    pub fn from_toml_str(s: &str) -> AttestResult<Self> {
        toml::from_str(s).map_err(|e| AttestError::Config {
            reason: format!("failed to parse config TOML: {}", e),
        })
    }

    /// Read and parse the TOML file at `path`.
    pub fn from_file(path: &Path) -> AttestResult<Self> {
        let contents = std::fs::read_to_string(path).map_err(|e| AttestError::Config {
            reason: format!("failed to read config file '{}': {}", path.display(), e),
        })?;
        Self::from_toml_str(&contents)
    }

    /// Apply `ATTEST_*` overrides from the process environment.
    pub fn apply_env_overrides(self) -> AttestResult<Self> {
        self.apply_overrides(|key| std::env::var(key).ok())
    }

    /// Apply overrides from an arbitrary lookup. Unset or empty values leave
    /// the field unchanged; unparseable values are a `Config` error.
    pub fn apply_overrides<F>(mut self, lookup: F) -> AttestResult<Self>
    where
        F: Fn(&str) -> Option<String>,
    {
        if let Some(rate) = parse_var(&lookup, ENV_RATE)? {
            self.rate_limit.rate = rate;
        }
        if let Some(secs) = parse_var(&lookup, ENV_RATE_WINDOW_SECS)? {
            self.rate_limit.window_secs = secs;
        }
        if let Some(days) = parse_var(&lookup, ENV_RETENTION_DAYS)? {
            self.retention.days = days;
        }
        if let Some(ms) = parse_var(&lookup, ENV_STORAGE_TIMEOUT_MS)? {
            self.service.storage_timeout_ms = Some(ms);
        }
        Ok(self)
    }

    /// Load from an optional file, then apply environment overrides.
    pub fn load(path: Option<&Path>) -> AttestResult<Self> {
        let base = match path {
            Some(path) => Self::from_file(path)?,
            None => Self::default(),
        };
        let config = base.apply_env_overrides()?;
        debug!(
            rate = config.rate_limit.rate,
            window_secs = config.rate_limit.window_secs,
            retention_days = config.retention.days,
            "configuration loaded"
        );
        Ok(config)
    }
}

fn parse_var<F, T>(lookup: &F, key: &str) -> AttestResult<Option<T>>
where
    F: Fn(&str) -> Option<String>,
    T: std::str::FromStr,
    T::Err: std::fmt::Display,
{
    match lookup(key) {
        Some(raw) if !raw.trim().is_empty() => raw.trim().parse().map(Some).map_err(|e: T::Err| {
            AttestError::Config {
                reason: format!("invalid value '{}' for {}: {}", raw, key, e),
            }
        }),
        _ => Ok(None),
    }
}
