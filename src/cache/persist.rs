//! Durable storage for cached query payloads.
//!
//! A [`Persister`] mirrors the in-memory [`QueryCache`](super::QueryCache) so a
//! restarted client can serve its last known data immediately. Timestamps are
//! stored as wall-clock UTC since monotonic instants do not survive a restart.

use std::collections::BTreeMap;
use std::fmt::Debug;
use std::path::{Path, PathBuf};

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use tokio::sync::Mutex;

use super::CacheError;

/// A cache entry as written to durable storage.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PersistedEntry {
    pub data: Value,
    pub fetched_at: DateTime<Utc>,
    pub expires_at: DateTime<Utc>,
}

impl PersistedEntry {
    pub fn is_expired_at(&self, now: DateTime<Utc>) -> bool {
        now >= self.expires_at
    }
}

/// Durable backing store for the query cache.
#[async_trait]
pub trait Persister: Send + Sync + Debug {
    /// Loads every persisted entry.
    async fn load(&self) -> Result<Vec<(String, PersistedEntry)>, CacheError>;

    /// Writes or replaces one entry.
    async fn store(&self, key: &str, entry: &PersistedEntry) -> Result<(), CacheError>;

    /// Removes one entry. Returns `true` if it existed.
    async fn remove(&self, key: &str) -> Result<bool, CacheError>;

    /// Removes every entry.
    async fn clear(&self) -> Result<(), CacheError>;
}

/// Stores all entries in a single JSON document on disk.
///
/// The document is rewritten on every change through a temporary file and a
/// rename, so a crash never leaves a half-written cache behind.
#[derive(Debug)]
pub struct FilePersister {
    path: PathBuf,
    entries: Mutex<Option<BTreeMap<String, PersistedEntry>>>,
}

impl FilePersister {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self {
            path: path.into(),
            entries: Mutex::new(None),
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    async fn read_document(&self) -> Result<BTreeMap<String, PersistedEntry>, CacheError> {
        match tokio::fs::read(&self.path).await {
            Ok(bytes) if bytes.is_empty() => Ok(BTreeMap::new()),
            Ok(bytes) => Ok(serde_json::from_slice(&bytes)?),
            Err(err) if err.kind() == std::io::ErrorKind::NotFound => Ok(BTreeMap::new()),
            Err(err) => Err(err.into()),
        }
    }

    async fn write_document(&self, entries: &BTreeMap<String, PersistedEntry>) -> Result<(), CacheError> {
        if let Some(parent) = self.path.parent().filter(|p| !p.as_os_str().is_empty()) {
            tokio::fs::create_dir_all(parent).await?;
        }

        let tmp = self.path.with_extension("tmp");
        tokio::fs::write(&tmp, serde_json::to_vec_pretty(entries)?).await?;
        tokio::fs::rename(&tmp, &self.path).await?;
        Ok(())
    }

    /// Runs `f` against the loaded document and writes it back if `f` reports a change.
    async fn modify<R>(
        &self,
        f: impl FnOnce(&mut BTreeMap<String, PersistedEntry>) -> (R, bool),
    ) -> Result<R, CacheError> {
        let mut guard = self.entries.lock().await;
        if guard.is_none() {
            *guard = Some(self.read_document().await?);
        }
        let entries = guard.get_or_insert_with(BTreeMap::new);

        let (result, changed) = f(entries);
        if changed {
            self.write_document(entries).await?;
        }
        Ok(result)
    }
}

#[async_trait]
impl Persister for FilePersister {
    async fn load(&self) -> Result<Vec<(String, PersistedEntry)>, CacheError> {
        let entries = self.read_document().await?;
        let loaded = entries
            .iter()
            .map(|(key, entry)| (key.clone(), entry.clone()))
            .collect();
        *self.entries.lock().await = Some(entries);
        Ok(loaded)
    }

    async fn store(&self, key: &str, entry: &PersistedEntry) -> Result<(), CacheError> {
        self.modify(|entries| {
            entries.insert(key.to_owned(), entry.clone());
            ((), true)
        })
        .await
    }

    async fn remove(&self, key: &str) -> Result<bool, CacheError> {
        self.modify(|entries| {
            let removed = entries.remove(key).is_some();
            (removed, removed)
        })
        .await
    }

    async fn clear(&self) -> Result<(), CacheError> {
        self.modify(|entries| {
            let changed = !entries.is_empty();
            entries.clear();
            ((), changed)
        })
        .await
    }
}
