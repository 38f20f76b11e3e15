//! Fixed-window token buckets keyed by client.
//!
//! Per call, for the caller's bucket:
//!
//! - no bucket, or more than `window` elapsed since `window_start`:
//!   reset to `rate - 1` tokens at `now`, allow;
//! - no tokens left: deny (the bucket is not touched);
//! - otherwise: take one token, move `window_start` to `now`, allow.
//!
//! A client can therefore get up to `2 * rate` calls through around a window
//! boundary. Callers and tests rely on these exact thresholds.

use std::collections::HashMap;
use std::net::SocketAddr;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::{Duration, Instant};

use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

/// Tracked keys above which lapsed buckets are evicted on insert.
pub const DEFAULT_MAX_TRACKED_KEYS: usize = 10_000;

#[derive(Debug, Clone, Copy)]
struct Bucket {
    tokens: i64,
    window_start: Instant,
}

impl Bucket {
    fn lapsed(&self, now: Instant, window: Duration) -> bool {
        now.saturating_duration_since(self.window_start) > window
    }
}

#[derive(Debug, Default)]
struct Buckets {
    by_key: HashMap<String, Bucket>,
    /// Set when a capacity scan freed nothing: the oldest `window_start` plus
    /// `window`. No bucket can lapse at or before this instant, so capacity
    /// scans are skipped until it has passed.
    scan_deferred_until: Option<Instant>,
}

impl Buckets {
    fn len(&self) -> usize {
        self.by_key.len()
    }

    /// Remove lapsed buckets and recompute the scan deferral.
    fn evict_lapsed(&mut self, now: Instant, window: Duration) -> usize {
        let before = self.by_key.len();
        self.by_key.retain(|_, bucket| !bucket.lapsed(now, window));
        let evicted = before - self.by_key.len();

        self.scan_deferred_until = if evicted == 0 {
            self.by_key
                .values()
                .map(|bucket| bucket.window_start)
                .min()
                .and_then(|oldest| oldest.checked_add(window))
        } else {
            None
        };
        evicted
    }

    fn scan_deferred(&self, now: Instant) -> bool {
        self.scan_deferred_until.is_some_and(|until| now <= until)
    }
}

/// Per-key admission control.
///
/// One mutex guards the whole key map; it is held only for the map update,
/// never across I/O. Share between request handlers with `Arc`.
#[derive(Debug)]
pub struct RateLimiter {
    rate: u32,
    window: Duration,
    max_tracked_keys: usize,
    buckets: Mutex<Buckets>,
}

impl RateLimiter {
    /// Allow `rate` calls per `window` for each key.
    pub fn new(rate: u32, window: Duration) -> Self {
        Self::with_capacity(rate, window, DEFAULT_MAX_TRACKED_KEYS)
    }

    /// Like `new`, with an explicit soft bound on tracked keys.
    ///
    /// Past the bound, inserting a new key first evicts buckets whose window
    /// has lapsed. Live buckets are never evicted, so the bound can be
    /// exceeded while that many clients are active at once.
    pub fn with_capacity(rate: u32, window: Duration, max_tracked_keys: usize) -> Self {
        Self {
            rate,
            window,
            max_tracked_keys: max_tracked_keys.max(1),
            buckets: Mutex::new(Buckets::default()),
        }
    }

    pub fn rate(&self) -> u32 {
        self.rate
    }

    pub fn window(&self) -> Duration {
        self.window
    }

    /// Decide whether `key` may proceed now.
    pub fn allow(&self, key: &str) -> bool {
        self.allow_at(key, Instant::now())
    }

    /// `allow` against an explicit clock reading.
    pub fn allow_at(&self, key: &str, now: Instant) -> bool {
        let mut buckets = self.lock();

        if let Some(bucket) = buckets.by_key.get_mut(key) {
            if !bucket.lapsed(now, self.window) {
                if bucket.tokens <= 0 {
                    debug!(key = %key, "rate limit exhausted");
                    return false;
                }
                bucket.tokens -= 1;
                bucket.window_start = now;
                return true;
            }
        } else if buckets.len() >= self.max_tracked_keys && !buckets.scan_deferred(now) {
            let evicted = buckets.evict_lapsed(now, self.window);
            if buckets.len() >= self.max_tracked_keys {
                warn!(
                    tracked = buckets.len(),
                    max_tracked_keys = self.max_tracked_keys,
                    "rate limiter tracking more live clients than its bound"
                );
            } else {
                debug!(evicted, "evicted lapsed rate limit buckets");
            }
        }

        buckets.by_key.insert(
            key.to_string(),
            Bucket {
                tokens: i64::from(self.rate) - 1,
                window_start: now,
            },
        );
        true
    }

    /// Drop every bucket whose window has lapsed. Returns how many were
    /// removed.
    ///
    /// A lapsed bucket would be reset on its next use anyway, so sweeping
    /// never changes an `allow` answer.
    pub fn sweep(&self) -> usize {
        self.sweep_at(Instant::now())
    }

    pub fn sweep_at(&self, now: Instant) -> usize {
        self.lock().evict_lapsed(now, self.window)
    }

    /// Number of keys currently tracked.
    pub fn tracked_keys(&self) -> usize {
        self.lock().len()
    }

    /// Run `sweep` every `interval` until `cancel` fires.
    pub fn spawn_sweeper(
        self: &Arc<Self>,
        interval: Duration,
        cancel: CancellationToken,
    ) -> JoinHandle<()> {
        let limiter = Arc::clone(self);
        tokio::spawn(async move {
            let mut ticker = tokio::time::interval(interval);
            ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);
            loop {
                tokio::select! {
                    biased;
                    () = cancel.cancelled() => break,
                    _ = ticker.tick() => {
                        let removed = limiter.sweep();
                        if removed > 0 {
                            debug!(removed, remaining = limiter.tracked_keys(), "rate limit sweep");
                        }
                    }
                }
            }
            info!("rate limit sweeper stopped");
        })
    }

    #[cfg(test)]
    pub(crate) fn scan_deferred_until(&self) -> Option<Instant> {
        self.lock().scan_deferred_until
    }

    fn lock(&self) -> MutexGuard<'_, Buckets> {
        // The map is always left consistent, so a panic elsewhere while the
        // lock was held does not invalidate it.
        self.buckets.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

/// Derive the rate-limit key from a remote address: the host without its
/// port.
///
/// Accepts `host:port` and `[host]:port`; the port is not validated, so
/// `gateway:http` keys as `gateway`. Anything else (a bare IPv6 address, no
/// port, stray brackets) is used as-is.
pub fn client_key(remote_addr: &str) -> String {
    if let Ok(addr) = remote_addr.parse::<SocketAddr>() {
        return addr.ip().to_string();
    }
    split_host(remote_addr).unwrap_or(remote_addr).to_string()
}

fn split_host(remote_addr: &str) -> Option<&str> {
    if let Some(rest) = remote_addr.strip_prefix('[') {
        let (host, tail) = rest.split_once(']')?;
        tail.strip_prefix(':')?;
        return Some(host);
    }
    let (host, _port) = remote_addr.rsplit_once(':')?;
    if host.contains(':') || host.contains('[') || host.contains(']') {
        return None;
    }
    Some(host)
}
