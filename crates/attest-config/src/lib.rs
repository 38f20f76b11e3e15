//! # attest-config
//!
//! Configuration for the attest pipeline: a TOML document with defaults for
//! every field, overridable from `ATTEST_*` environment variables.
//!
//! ```rust,ignore
//! use attest_config::AttestConfig;
//!
//! let config = AttestConfig::load(Some(Path::new("attest.toml")))?;
//! let limiter = config.rate_limiter();
//! ```

pub mod loader;
pub mod settings;

use std::sync::Arc;

use attest_ratelimit::RateLimiter;

pub use loader::{ENV_RATE, ENV_RATE_WINDOW_SECS, ENV_RETENTION_DAYS, ENV_STORAGE_TIMEOUT_MS};
pub use settings::{AttestConfig, RateLimitConfig, RetentionConfig, ServiceConfig};

impl AttestConfig {
    /// Build the rate limiter this configuration describes.
    pub fn rate_limiter(&self) -> Arc<RateLimiter> {
        Arc::new(RateLimiter::with_capacity(
            self.rate_limit.rate,
            self.rate_limit.window(),
            self.rate_limit.max_tracked_keys,
        ))
    }
}

// ── Tests ─────────────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use std::collections::HashMap;
    use std::time::Duration;

    use attest_contracts::ErrorKind;

    use super::*;

    fn env(pairs: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
        let map: HashMap<String, String> =
            pairs.iter().map(|(k, v)| (k.to_string(), v.to_string())).collect();
        move |key: &str| map.get(key).cloned()
    }

    #[test]
    fn empty_document_gives_defaults() {
        let config = AttestConfig::from_toml_str("").unwrap();
        assert_eq!(config, AttestConfig::default());
        assert_eq!(config.rate_limit.rate, 60);
        assert_eq!(config.rate_limit.window(), Duration::from_secs(60));
        assert_eq!(config.retention.days, 90);
        assert_eq!(config.service.storage_timeout_ms, None);
    }

    #[test]
    fn partial_sections_keep_other_defaults() {
        let config = AttestConfig::from_toml_str(
            r#"
            [rate_limit]
            rate = 3
            window_secs = 1

            [service]
            storage_timeout_ms = 1500
            "#,
        )
        .unwrap();

        assert_eq!(config.rate_limit.rate, 3);
        assert_eq!(config.rate_limit.window(), Duration::from_secs(1));
        assert_eq!(config.rate_limit.sweep_interval(), Some(Duration::from_secs(60)));
        assert_eq!(config.retention.days, 90);

        let options = config.service.options();
        assert_eq!(options.storage_timeout, Some(Duration::from_millis(1500)));
        assert_eq!(options.idempotency_retry_delay, Duration::from_millis(25));
    }

    #[test]
    fn malformed_toml_is_a_config_error() {
        let err = AttestConfig::from_toml_str("[rate_limit\nrate = ").unwrap_err();
        assert_eq!(err.kind(), ErrorKind::Config);
        assert!(err.to_string().contains("failed to parse config TOML"));
    }

    #[test]
    fn wrong_type_is_a_config_error() {
        let err = AttestConfig::from_toml_str("[retention]\ndays = \"ninety\"").unwrap_err();
        assert_eq!(err.kind(), ErrorKind::Config);
    }

    #[test]
    fn missing_file_is_a_config_error() {
        let err = AttestConfig::from_file(std::path::Path::new("/nonexistent/attest.toml"))
            .unwrap_err();
        assert!(err.to_string().contains("/nonexistent/attest.toml"));
    }

    #[test]
    fn env_overrides_replace_values() {
        let config = AttestConfig::default()
            .apply_overrides(env(&[
                (ENV_RATE, "5"),
                (ENV_RATE_WINDOW_SECS, " 2 "),
                (ENV_RETENTION_DAYS, "7"),
                (ENV_STORAGE_TIMEOUT_MS, "250"),
            ]))
            .unwrap();

        assert_eq!(config.rate_limit.rate, 5);
        assert_eq!(config.rate_limit.window_secs, 2);
        assert_eq!(config.retention.days, 7);
        assert_eq!(config.service.storage_timeout_ms, Some(250));
    }

    #[test]
    fn empty_env_values_are_ignored() {
        let config = AttestConfig::default()
            .apply_overrides(env(&[(ENV_RATE, "")]))
            .unwrap();
        assert_eq!(config.rate_limit.rate, 60);
    }

    #[test]
    fn unparseable_env_value_is_a_config_error() {
        let err = AttestConfig::default()
            .apply_overrides(env(&[(ENV_RATE, "lots")]))
            .unwrap_err();
        assert_eq!(err.kind(), ErrorKind::Config);
        assert!(err.to_string().contains(ENV_RATE));
    }

    #[test]
    fn zero_sweep_interval_disables_sweeper() {
        let config = AttestConfig::from_toml_str("[rate_limit]\nsweep_interval_secs = 0").unwrap();
        assert_eq!(config.rate_limit.sweep_interval(), None);
    }

    #[test]
    fn rate_limiter_uses_configured_rate() {
        let config = AttestConfig::from_toml_str("[rate_limit]\nrate = 1").unwrap();
        let limiter = config.rate_limiter();
        assert_eq!(limiter.rate(), 1);
        assert!(limiter.allow("k"));
        assert!(!limiter.allow("k"));
    }
}
