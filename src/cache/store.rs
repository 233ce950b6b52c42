use std::sync::Arc;
use std::time::Duration;

use chrono::Utc;
use dashmap::DashMap;
use serde_json::Value;
use tokio::task::JoinHandle;
use tokio::time::{Instant, MissedTickBehavior};
use tokio_util::sync::CancellationToken;

use super::{CacheEntry, CacheError, PersistedEntry, Persister};

/// In-memory query cache with TTL expiry and optional persistence.
///
/// Each key is owned independently: writers for one key never block readers of
/// another. Expired entries are dropped lazily on read and eagerly by
/// [`sweep`](Self::sweep).
#[derive(Debug)]
pub struct QueryCache {
    entries: DashMap<String, CacheEntry>,
    ttl: Duration,
    persister: Option<Arc<dyn Persister>>,
}

impl QueryCache {
    /// Creates a memory-only cache whose entries live for `ttl`.
    #[must_use]
    pub fn new(ttl: Duration) -> Self {
        Self {
            entries: DashMap::new(),
            ttl,
            persister: None,
        }
    }

    /// Creates a cache that mirrors every change into `persister`.
    ///
    /// Call [`hydrate`](Self::hydrate) to load what the persister already holds.
    #[must_use]
    pub fn with_persister(ttl: Duration, persister: Arc<dyn Persister>) -> Self {
        Self {
            entries: DashMap::new(),
            ttl,
            persister: Some(persister),
        }
    }

    pub const fn ttl(&self) -> Duration {
        self.ttl
    }

    /// Returns the live entry for `key`, dropping it if it has expired.
    pub fn get(&self, key: &str) -> Option<CacheEntry> {
        let entry = self.entries.get(key)?;
        if entry.is_expired() {
            drop(entry);
            self.entries.remove_if(key, |_, e| e.is_expired());
            return None;
        }
        Some(entry.clone())
    }

    /// Stores a freshly fetched payload, replacing any previous entry.
    pub async fn set(&self, key: &str, data: Value) {
        let entry = CacheEntry::new(data, self.ttl);
        let persisted = self.persister.as_ref().map(|_| to_persisted(&entry));
        self.entries.insert(key.to_owned(), entry);

        if let (Some(persister), Some(persisted)) = (&self.persister, persisted) {
            if let Err(err) = persister.store(key, &persisted).await {
                tracing::warn!(key, error = %err, "failed to persist cache entry");
            }
        }
    }

    /// Marks an entry stale so the next read refetches it. Returns `false` if absent.
    pub fn mark_stale(&self, key: &str) -> bool {
        match self.entries.get_mut(key) {
            Some(mut entry) => {
                entry.mark_stale();
                true
            }
            None => false,
        }
    }

    /// Removes one entry. Returns `true` if it was present.
    pub async fn evict(&self, key: &str) -> bool {
        let removed = self.entries.remove(key).is_some();
        if let Some(persister) = &self.persister {
            if let Err(err) = persister.remove(key).await {
                tracing::warn!(key, error = %err, "failed to remove persisted cache entry");
            }
        }
        removed
    }

    /// Removes every entry.
    pub async fn clear(&self) {
        self.entries.clear();
        if let Some(persister) = &self.persister {
            if let Err(err) = persister.clear().await {
                tracing::warn!(error = %err, "failed to clear persisted cache");
            }
        }
    }

    /// Drops every expired entry and returns how many were removed.
    pub async fn sweep(&self) -> usize {
        let expired: Vec<String> = self
            .entries
            .iter()
            .filter(|entry| entry.is_expired())
            .map(|entry| entry.key().clone())
            .collect();

        let mut removed = 0;
        for key in &expired {
            if self.entries.remove_if(key, |_, e| e.is_expired()).is_some() {
                removed += 1;
                if let Some(persister) = &self.persister {
                    if let Err(err) = persister.remove(key).await {
                        tracing::warn!(key = %key, error = %err, "failed to remove expired cache entry");
                    }
                }
            }
        }

        if removed > 0 {
            tracing::debug!(removed, "swept expired cache entries");
        }
        removed
    }

    /// Loads persisted entries into memory, skipping expired ones.
    ///
    /// Returns the number of entries loaded. A memory-only cache loads nothing.
    pub async fn hydrate(&self) -> Result<usize, CacheError> {
        let Some(persister) = &self.persister else {
            return Ok(0);
        };

        let now = Utc::now();
        let mut loaded = 0;
        for (key, persisted) in persister.load().await? {
            if persisted.is_expired_at(now) {
                continue;
            }
            self.entries.insert(key, from_persisted(persisted, now));
            loaded += 1;
        }

        tracing::debug!(loaded, "hydrated query cache");
        Ok(loaded)
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn contains_key(&self, key: &str) -> bool {
        self.get(key).is_some()
    }

    /// Runs [`sweep`](Self::sweep) every `period` until the returned handle is stopped or dropped.
    pub fn spawn_sweeper(self: &Arc<Self>, period: Duration) -> Sweeper {
        let token = CancellationToken::new();
        let cancelled = token.clone();
        let cache = Arc::clone(self);

        let join = tokio::spawn(async move {
            let period = period.max(Duration::from_millis(1));
            let mut ticks = tokio::time::interval_at(Instant::now() + period, period);
            ticks.set_missed_tick_behavior(MissedTickBehavior::Skip);

            loop {
                tokio::select! {
                    () = cancelled.cancelled() => break,
                    _ = ticks.tick() => {
                        cache.sweep().await;
                    }
                }
            }
        });

        Sweeper { token, join }
    }
}

/// Handle to a background sweep task. Dropping it stops the task.
#[derive(Debug)]
pub struct Sweeper {
    token: CancellationToken,
    join: JoinHandle<()>,
}

impl Sweeper {
    /// Stops the sweep task and waits for it to exit.
    pub async fn stop(mut self) {
        self.token.cancel();
        let _ = (&mut self.join).await;
    }
}

impl Drop for Sweeper {
    fn drop(&mut self) {
        self.token.cancel();
    }
}

fn to_persisted(entry: &CacheEntry) -> PersistedEntry {
    let now = Utc::now();
    let age = chrono::Duration::from_std(entry.age()).unwrap_or_default();
    let remaining = chrono::Duration::from_std(entry.ttl_remaining()).unwrap_or_default();
    PersistedEntry {
        data: entry.data.clone(),
        fetched_at: now - age,
        expires_at: now + remaining,
    }
}

fn from_persisted(persisted: PersistedEntry, now: chrono::DateTime<Utc>) -> CacheEntry {
    let age = (now - persisted.fetched_at).to_std().unwrap_or_default();
    let remaining = (persisted.expires_at - now).to_std().unwrap_or_default();
    let instant_now = Instant::now();
    let fetched_at = instant_now.checked_sub(age).unwrap_or(instant_now);

    CacheEntry {
        data: persisted.data,
        fetched_at,
        expires_at: instant_now + remaining,
        is_stale: false,
    }
}
