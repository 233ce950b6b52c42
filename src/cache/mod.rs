//! The shared query cache.
//!
//! [`QueryCache`] is the process-wide mapping from query key to the last
//! successful payload. It is an explicit service: build one, optionally back it
//! with a [`Persister`], and hand it to every
//! [`QueryClient`](crate::query::QueryClient) that should share data.

mod entry;
mod persist;
mod store;

use thiserror::Error;

pub use entry::CacheEntry;
pub use persist::{FilePersister, PersistedEntry, Persister};
pub use store::{QueryCache, Sweeper};

/// Errors raised by cache persistence.
#[derive(Error, Debug)]
pub enum CacheError {
    #[error("cache storage I/O failed: {0}")]
    Io(#[from] std::io::Error),

    #[error("cache document is not valid JSON: {0}")]
    Serde(#[from] serde_json::Error),
}
