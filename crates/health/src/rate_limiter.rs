//! Token-bucket rate limiter (C14, §4.14): `maxTokens`, `refillRatePerSec`,
//! a hard-capped bucket table with LRU-style eviction when full. `allow(key)`
//! is constant-time amortized — one bucket lookup, one refill computation.
//!
//! Used both by the JSON-RPC HTTP server (per-IP 200/60s) and the P2P fabric
//! (per-peer discovery/gossip rate limiting), each with its own instance.

use std::collections::HashMap;
use std::hash::Hash;
use std::time::{Duration, Instant};

use parking_lot::Mutex;

struct Bucket {
    tokens: f64,
    last_refill: Instant,
    last_used: Instant,
}

pub struct TokenBucketLimiter<K> {
    max_tokens: f64,
    refill_rate_per_sec: f64,
    max_buckets: usize,
    buckets: Mutex<HashMap<K, Bucket>>,
}

impl<K: Eq + Hash + Clone> TokenBucketLimiter<K> {
    pub fn new(max_tokens: u32, refill_rate_per_sec: u32, max_buckets: usize) -> Self {
        Self {
            max_tokens: max_tokens as f64,
            refill_rate_per_sec: refill_rate_per_sec as f64,
            max_buckets,
            buckets: Mutex::new(HashMap::new()),
        }
    }

    /// Consumes one token for `key`, refilling first. Returns `false` when
    /// the bucket is empty (caller should return 429 / drop the request).
    pub fn allow(&self, key: K) -> bool {
        self.allow_at(key, Instant::now())
    }

    fn allow_at(&self, key: K, now: Instant) -> bool {
        let mut buckets = self.buckets.lock();

        if !buckets.contains_key(&key) && buckets.len() >= self.max_buckets {
            evict_least_recently_used(&mut buckets);
        }

        let bucket = buckets.entry(key).or_insert_with(|| Bucket {
            tokens: self.max_tokens,
            last_refill: now,
            last_used: now,
        });

        let elapsed = now.saturating_duration_since(bucket.last_refill).as_secs_f64();
        bucket.tokens = (bucket.tokens + elapsed * self.refill_rate_per_sec).min(self.max_tokens);
        bucket.last_refill = now;
        bucket.last_used = now;

        if bucket.tokens >= 1.0 {
            bucket.tokens -= 1.0;
            true
        } else {
            false
        }
    }

    pub fn bucket_count(&self) -> usize {
        self.buckets.lock().len()
    }
}

fn evict_least_recently_used<K: Eq + Hash + Clone>(buckets: &mut HashMap<K, Bucket>) {
    if let Some(oldest_key) = buckets
        .iter()
        .min_by_key(|(_, b)| b.last_used)
        .map(|(k, _)| k.clone())
    {
        buckets.remove(&oldest_key);
    }
}

/// A sliding-window counter, used where the spec calls for a literal
/// "N requests per window" limit (§4.10 `200/60s`, §4.11 `60 req/min`)
/// rather than a token bucket's smoothed rate.
pub struct SlidingWindowLimiter<K> {
    window: Duration,
    max_requests: u32,
    windows: Mutex<HashMap<K, (Instant, u32)>>,
}

impl<K: Eq + Hash + Clone> SlidingWindowLimiter<K> {
    pub fn new(window: Duration, max_requests: u32) -> Self {
        Self {
            window,
            max_requests,
            windows: Mutex::new(HashMap::new()),
        }
    }

    pub fn allow(&self, key: K) -> bool {
        self.allow_at(key, Instant::now())
    }

    fn allow_at(&self, key: K, now: Instant) -> bool {
        let mut windows = self.windows.lock();
        let entry = windows.entry(key).or_insert((now, 0));
        if now.saturating_duration_since(entry.0) >= self.window {
            *entry = (now, 0);
        }
        if entry.1 >= self.max_requests {
            return false;
        }
        entry.1 += 1;
        true
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn allows_up_to_max_tokens_then_blocks() {
        let limiter = TokenBucketLimiter::new(2, 1, 100);
        assert!(limiter.allow("a"));
        assert!(limiter.allow("a"));
        assert!(!limiter.allow("a"));
    }

    #[test]
    fn refills_over_time() {
        let limiter = TokenBucketLimiter::new(1, 10, 100);
        let t0 = Instant::now();
        assert!(limiter.allow_at("a", t0));
        assert!(!limiter.allow_at("a", t0));
        assert!(limiter.allow_at("a", t0 + Duration::from_millis(200)));
    }

    #[test]
    fn evicts_least_recently_used_when_full() {
        let limiter = TokenBucketLimiter::new(5, 1, 2);
        limiter.allow("a");
        limiter.allow("b");
        limiter.allow("c");
        assert_eq!(limiter.bucket_count(), 2);
    }

    #[test]
    fn sliding_window_resets_after_window_elapses() {
        let limiter = SlidingWindowLimiter::new(Duration::from_millis(100), 2);
        let t0 = Instant::now();
        assert!(limiter.allow_at("a", t0));
        assert!(limiter.allow_at("a", t0));
        assert!(!limiter.allow_at("a", t0));
        assert!(limiter.allow_at("a", t0 + Duration::from_millis(150)));
    }
}
