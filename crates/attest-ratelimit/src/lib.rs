//! # attest-ratelimit
//!
//! Per-client admission control for the ingestion path.
//!
//! [`RateLimiter`] is an owned component: build one at startup, share it
//! with `Arc`, and ask [`RateLimiter::allow`] once per request with the key
//! from [`client_key`].

pub mod limiter;

pub use limiter::{client_key, RateLimiter, DEFAULT_MAX_TRACKED_KEYS};

// ── Tests ─────────────────────────────────────────────────────────────────────
