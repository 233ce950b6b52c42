use std::time::Duration;

use serde_json::Value;
use tokio::time::Instant;

/// A cached query payload with its freshness bookkeeping.
#[derive(Debug, Clone, PartialEq)]
pub struct CacheEntry {
    pub data: Value,
    pub fetched_at: Instant,
    pub expires_at: Instant,
    /// Set by invalidation; a stale entry is refetched regardless of its age.
    pub is_stale: bool,
}

impl CacheEntry {
    /// Creates an entry fetched now that lives for `ttl`.
    pub fn new(data: Value, ttl: Duration) -> Self {
        Self::fetched_at(data, Instant::now(), ttl)
    }

    /// Creates an entry with an explicit fetch time, used when rehydrating.
    pub fn fetched_at(data: Value, fetched_at: Instant, ttl: Duration) -> Self {
        Self {
            data,
            fetched_at,
            expires_at: fetched_at + ttl,
            is_stale: false,
        }
    }

    /// Time elapsed since the data was fetched.
    pub fn age(&self) -> Duration {
        self.fetched_at.elapsed()
    }

    /// Data younger than `stale_time` is served without refetching.
    pub fn is_fresh(&self, stale_time: Duration) -> bool {
        !self.is_stale && self.age() < stale_time
    }

    pub fn is_expired(&self) -> bool {
        Instant::now() >= self.expires_at
    }

    /// Time left before the entry expires.
    pub fn ttl_remaining(&self) -> Duration {
        self.expires_at.saturating_duration_since(Instant::now())
    }

    pub const fn mark_stale(&mut self) {
        self.is_stale = true;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use tokio::time::advance;

    #[tokio::test(start_paused = true)]
    async fn test_fresh_until_stale_time() {
        let entry = CacheEntry::new(json!({"noi": 1_250_000}), Duration::from_secs(300));
        assert!(entry.is_fresh(Duration::from_secs(30)));

        advance(Duration::from_secs(29)).await;
        assert!(entry.is_fresh(Duration::from_secs(30)));

        advance(Duration::from_secs(1)).await;
        assert!(!entry.is_fresh(Duration::from_secs(30)));
    }

    #[tokio::test(start_paused = true)]
    async fn test_zero_stale_time_is_never_fresh() {
        let entry = CacheEntry::new(json!(1), Duration::from_secs(300));
        assert!(!entry.is_fresh(Duration::ZERO));
    }

    #[tokio::test(start_paused = true)]
    async fn test_mark_stale_overrides_age() {
        let mut entry = CacheEntry::new(json!(1), Duration::from_secs(300));
        entry.mark_stale();
        assert!(!entry.is_fresh(Duration::from_secs(60)));
    }

    #[tokio::test(start_paused = true)]
    async fn test_expiry() {
        let entry = CacheEntry::new(json!([]), Duration::from_secs(60));
        assert!(!entry.is_expired());
        assert_eq!(entry.ttl_remaining(), Duration::from_secs(60));

        advance(Duration::from_secs(60)).await;
        assert!(entry.is_expired());
        assert_eq!(entry.ttl_remaining(), Duration::ZERO);
    }
}
