use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};

use dashmap::DashMap;
use futures::FutureExt;
use futures::StreamExt;
use futures::future::{self, BoxFuture, Shared};
use serde::Serialize;
use serde::de::DeserializeOwned;
use serde_json::Value;
use tokio::sync::broadcast;
use tokio::time::Instant;

use crate::cache::QueryCache;
use crate::command::Command;

use super::config::{QueryConfig, QueryOptions};
use super::error::QueryError;
use super::state::{QueryEvent, QuerySnapshot, QueryStatus, Refetch};

/// A type-erased fetch function producing opaque JSON.
pub(crate) type RawFetcher = Arc<dyn Fn() -> BoxFuture<'static, Result<Value, QueryError>> + Send + Sync>;

type SharedOutcome = Shared<BoxFuture<'static, Result<Value, QueryError>>>;

const EVENT_CAPACITY: usize = 256;

/// Wraps a typed fetcher so its output is stored as JSON.
pub(crate) fn erase<T, F>(fetcher: F) -> RawFetcher
where
    T: Serialize + Send + 'static,
    F: Fn() -> BoxFuture<'static, Result<T, QueryError>> + Send + Sync + 'static,
{
    Arc::new(move || {
        let fut = fetcher();
        async move { serde_json::to_value(fut.await?).map_err(QueryError::from) }.boxed()
    })
}

/// How a fetch treats one already in flight for the same key.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum FetchMode {
    /// Join the in-flight fetch, if any.
    Join,
    /// Supersede the in-flight fetch.
    Force,
    /// Reuse a fetch numbered above the mark, in flight or settled; otherwise supersede.
    After(u64),
}

/// Fetch bookkeeping for one key.
#[derive(Default)]
struct Slot {
    status: QueryStatus,
    error: Option<QueryError>,
    /// Sequence number of the most recently started fetch.
    latest_seq: u64,
    /// Sequence number of the most recently applied fetch.
    settled_seq: u64,
    in_flight: Option<InFlight>,
    last_fetched_at: Option<Instant>,
    stale_time: std::time::Duration,
}

struct InFlight {
    seq: u64,
    outcome: SharedOutcome,
}

/// Central state manager for queries.
///
/// The `QueryClient` owns:
/// - the shared [`QueryCache`] (injected, so several clients can share one),
/// - per-key fetch state: status, last error, the in-flight request,
/// - the event channel that keeps every mounted [`Query`](super::Query) in sync.
///
/// Cloning is cheap; clones share all state.
///
/// # Example
///
/// ```rust
/// use reims_query::query::{QueryClient, QueryConfig};
/// use std::sync::Arc;
/// use std::time::Duration;
///
/// let config = QueryConfig::new(
///     Duration::from_secs(30),  // stale_time
///     Duration::from_secs(300), // cache_time
/// );
///
/// let client = Arc::new(QueryClient::with_config(config));
/// ```
#[derive(Clone)]
pub struct QueryClient {
    cache: Arc<QueryCache>,
    slots: Arc<DashMap<String, Slot>>,
    seq: Arc<AtomicU64>,
    events: broadcast::Sender<QueryEvent>,
    config: QueryConfig,
}

impl std::fmt::Debug for QueryClient {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("QueryClient")
            .field("cache_entries", &self.cache.len())
            .field("keys", &self.slots.len())
            .field("config", &self.config)
            .finish_non_exhaustive()
    }
}

impl QueryClient {
    /// Creates a client with default configuration and a private memory cache.
    #[must_use]
    pub fn new() -> Self {
        Self::with_config(QueryConfig::default())
    }

    /// Creates a client with a private memory cache.
    #[must_use]
    pub fn with_config(config: QueryConfig) -> Self {
        let cache = Arc::new(QueryCache::new(config.cache_time));
        Self::with_cache(config, cache)
    }

    /// Creates a client backed by an existing cache.
    #[must_use]
    pub fn with_cache(config: QueryConfig, cache: Arc<QueryCache>) -> Self {
        let (events, _) = broadcast::channel(EVENT_CAPACITY);
        Self {
            cache,
            slots: Arc::new(DashMap::new()),
            seq: Arc::new(AtomicU64::new(0)),
            events,
            config,
        }
    }

    pub const fn config(&self) -> &QueryConfig {
        &self.config
    }

    pub fn cache(&self) -> &Arc<QueryCache> {
        &self.cache
    }

    /// Returns fresh cached data for `key`, or fetches it.
    ///
    /// Concurrent calls for the same key share a single fetch. A disabled query
    /// returns [`QueryError::Disabled`] without calling `fetcher`.
    pub async fn fetch_query<T, F>(&self, key: &str, fetcher: F, options: &QueryOptions) -> Result<T, QueryError>
    where
        T: Serialize + DeserializeOwned + Send + 'static,
        F: Fn() -> BoxFuture<'static, Result<T, QueryError>> + Send + Sync + 'static,
    {
        if !options.enabled {
            return Err(QueryError::Disabled(key.to_owned()));
        }

        if options.cache_enabled {
            if let Some((value, true)) = self.cached(key, options) {
                match serde_json::from_value(value) {
                    Ok(data) => return Ok(data),
                    Err(err) => tracing::warn!(key, error = %err, "cached payload no longer decodes"),
                }
            }
        }

        let value = self.fetch_raw(key, &erase(fetcher), options, FetchMode::Join).await?;
        Ok(serde_json::from_value(value)?)
    }

    /// Fetches `key` unconditionally, superseding any fetch already in flight.
    pub async fn refetch_query<T, F>(&self, key: &str, fetcher: F, options: &QueryOptions) -> Result<T, QueryError>
    where
        T: Serialize + DeserializeOwned + Send + 'static,
        F: Fn() -> BoxFuture<'static, Result<T, QueryError>> + Send + Sync + 'static,
    {
        if !options.enabled {
            return Err(QueryError::Disabled(key.to_owned()));
        }

        let value = self.fetch_raw(key, &erase(fetcher), options, FetchMode::Force).await?;
        Ok(serde_json::from_value(value)?)
    }

    /// Reads cached data for `key` regardless of staleness.
    pub fn get_query_data<T: DeserializeOwned>(&self, key: &str) -> Option<T> {
        let entry = self.cache.get(key)?;
        serde_json::from_value(entry.data).ok()
    }

    /// Writes data for `key` directly, as if a fetch had just succeeded.
    ///
    /// Useful for optimistic updates after a mutation.
    pub async fn set_query_data<T: Serialize>(&self, key: &str, data: &T) -> Result<(), QueryError> {
        let value = serde_json::to_value(data)?;
        self.cache.set(key, value).await;
        {
            // Counts as the newest fetch: anything still in flight is superseded.
            let seq = self.seq.fetch_add(1, Ordering::Relaxed) + 1;
            let mut slot = self.slots.entry(key.to_owned()).or_default();
            slot.latest_seq = seq;
            slot.settled_seq = seq;
            slot.in_flight = None;
            slot.status = QueryStatus::Success;
            slot.error = None;
            slot.last_fetched_at = Some(Instant::now());
        }
        self.emit(QueryEvent::Settled(key.to_owned()));
        Ok(())
    }

    /// Marks `key` stale and makes mounted queries refetch it.
    ///
    /// This returns a `Command` that performs the invalidation as a side effect.
    ///
    /// # Example
    ///
    /// ```rust,ignore
    /// fn update(&mut self, msg: Message) -> Command<Message> {
    ///     match msg {
    ///         Message::AlertAcknowledged(_) => self.query_client.invalidate(&"alerts"),
    ///     }
    /// }
    /// ```
    pub fn invalidate<Msg>(&self, key: &impl ToString) -> Command<Msg>
    where
        Msg: Send + 'static,
    {
        let client = self.clone();
        let key = key.to_string();

        Command {
            stream: Some(
                futures::stream::once(async move { client.invalidate_now(&key) })
                    .filter_map(|()| async { None })
                    .boxed(),
            ),
        }
    }

    /// Immediate form of [`invalidate`](Self::invalidate).
    pub fn invalidate_now(&self, key: &str) {
        self.cache.mark_stale(key);
        self.emit(QueryEvent::Invalidated(key.to_owned(), self.current_seq()));
    }

    /// Makes mounted queries for `key` refetch, bypassing staleness.
    pub fn refetch<Msg>(&self, key: &impl ToString) -> Command<Msg>
    where
        Msg: Send + 'static,
    {
        self.refetcher(key.to_string()).command()
    }

    /// Removes one key (or every key, with `None`) from the cache.
    ///
    /// The next fetch for a removed key goes to the network. Fetches still in
    /// flight for a removed key are discarded: their callers get
    /// [`QueryError::Cleared`] unless a newer fetch has settled meanwhile.
    pub async fn clear_query_cache(&self, key: Option<&str>) {
        match key {
            Some(key) => {
                self.slots.remove(key);
                self.cache.evict(key).await;
            }
            None => {
                self.slots.clear();
                self.cache.clear().await;
            }
        }
        tracing::debug!(key, "cleared query cache");
        self.emit(QueryEvent::Removed(key.map(str::to_owned)));
    }

    /// Current state of `key`, or `None` if the key has never been used.
    pub fn snapshot(&self, key: &str) -> Option<QuerySnapshot> {
        let data = self.cache.get(key).map(|entry| entry.data);
        let slot = self.slots.get(key);
        if slot.is_none() && data.is_none() {
            return None;
        }

        let snapshot = match slot {
            Some(slot) => QuerySnapshot {
                key: key.to_owned(),
                status: slot.status,
                data,
                error: slot.error.clone(),
                is_fetching: slot.in_flight.is_some(),
                last_fetched_at: slot.last_fetched_at,
                stale_time: slot.stale_time,
            },
            // Hydrated from persistence but never fetched in this process.
            None => QuerySnapshot {
                key: key.to_owned(),
                status: QueryStatus::Success,
                data,
                error: None,
                is_fetching: false,
                last_fetched_at: None,
                stale_time: self.config.stale_time,
            },
        };
        Some(snapshot)
    }

    /// Subscribes to query events from every observer of this client.
    pub fn subscribe(&self) -> broadcast::Receiver<QueryEvent> {
        self.events.subscribe()
    }

    pub(crate) fn refetcher(&self, key: String) -> Refetch {
        Refetch::new(key, self.events.clone(), Arc::clone(&self.seq))
    }

    /// Cached value for `key` and whether it is still fresh under `options`.
    pub(crate) fn cached(&self, key: &str, options: &QueryOptions) -> Option<(Value, bool)> {
        let entry = self.cache.get(key)?;
        let fresh = entry.is_fresh(options.effective_stale_time(&self.config));
        Some((entry.data, fresh))
    }

    fn current_seq(&self) -> u64 {
        self.seq.load(Ordering::Relaxed)
    }

    pub(crate) fn settled_seq(&self, key: &str) -> u64 {
        self.slots.get(key).map_or(0, |slot| slot.settled_seq)
    }

    pub(crate) fn last_error(&self, key: &str) -> Option<QueryError> {
        self.slots.get(key).and_then(|slot| slot.error.clone())
    }

    pub(crate) fn is_fetching(&self, key: &str) -> bool {
        self.slots.get(key).is_some_and(|slot| slot.in_flight.is_some())
    }

    /// Runs or joins a fetch for `key` and returns the freshest outcome.
    ///
    /// A fetch that supersedes another is followed by callers still waiting on
    /// the superseded one, so they receive the newer outcome.
    pub(crate) async fn fetch_raw(
        &self,
        key: &str,
        fetcher: &RawFetcher,
        options: &QueryOptions,
        mode: FetchMode,
    ) -> Result<Value, QueryError> {
        let (mut seq, mut outcome) = self.begin_fetch(key, fetcher, options, mode);

        loop {
            let result = outcome.await;

            let newer = self.slots.get(key).and_then(|slot| {
                slot.in_flight
                    .as_ref()
                    .filter(|in_flight| in_flight.seq > seq)
                    .map(|in_flight| (in_flight.seq, in_flight.outcome.clone()))
            });

            match newer {
                Some((next_seq, next)) => {
                    tracing::trace!(key, seq, next_seq, "following superseding fetch");
                    seq = next_seq;
                    outcome = next;
                }
                None => return self.freshest(key, seq, result, options),
            }
        }
    }

    fn begin_fetch(
        &self,
        key: &str,
        fetcher: &RawFetcher,
        options: &QueryOptions,
        mode: FetchMode,
    ) -> (u64, SharedOutcome) {
        let mut slot = self.slots.entry(key.to_owned()).or_default();
        slot.stale_time = options.effective_stale_time(&self.config);

        let mark = match mode {
            FetchMode::Join => Some(0),
            FetchMode::Force => None,
            FetchMode::After(mark) => Some(mark),
        };

        if let Some(mark) = mark {
            if let Some(in_flight) = slot.in_flight.as_ref().filter(|in_flight| in_flight.seq > mark) {
                tracing::debug!(key, seq = in_flight.seq, "joining in-flight fetch");
                return (in_flight.seq, in_flight.outcome.clone());
            }
        }

        if let FetchMode::After(mark) = mode {
            if slot.in_flight.is_none() && slot.settled_seq > mark {
                if let Some(outcome) = self.settled_outcome(&slot, key, options) {
                    tracing::debug!(key, mark, seq = slot.settled_seq, "reusing fetch settled after request");
                    return (slot.settled_seq, future::ready(outcome).boxed().shared());
                }
            }
        }

        let seq = self.seq.fetch_add(1, Ordering::Relaxed) + 1;
        tracing::debug!(key, seq, ?mode, "starting fetch");

        let task = {
            let client = self.clone();
            let key = key.to_owned();
            let fetcher = Arc::clone(fetcher);
            let retry = options.effective_retry(&self.config);
            let retry_delay = self.config.retry_delay;
            let cache_enabled = options.cache_enabled;

            async move {
                let mut result = fetcher().await;
                if retry {
                    if let Err(err) = &result {
                        tracing::debug!(key = %key, seq, error = %err, "retrying failed fetch");
                        tokio::time::sleep(retry_delay).await;
                        result = fetcher().await;
                    }
                }
                client.settle(&key, seq, cache_enabled, &result).await;
                result
            }
        };

        let outcome = tokio::spawn(task)
            .map(|joined| joined.unwrap_or_else(|err| Err(QueryError::Aborted(err.to_string()))))
            .boxed()
            .shared();

        slot.latest_seq = seq;
        slot.status = QueryStatus::Loading;
        slot.in_flight = Some(InFlight {
            seq,
            outcome: outcome.clone(),
        });

        (seq, outcome)
    }

    /// Applies a fetch outcome unless a newer fetch has started since.
    async fn settle(&self, key: &str, seq: u64, cache_enabled: bool, result: &Result<Value, QueryError>) {
        if !self.is_latest(key, seq) {
            tracing::debug!(key, seq, "discarding superseded response");
            return;
        }

        if cache_enabled {
            if let Ok(value) = result {
                self.cache.set(key, value.clone()).await;
            }
        }

        {
            let Some(mut slot) = self.slots.get_mut(key) else {
                return;
            };
            if slot.latest_seq != seq {
                return;
            }

            slot.in_flight = None;
            slot.settled_seq = seq;
            match result {
                Ok(_) => {
                    slot.status = QueryStatus::Success;
                    slot.error = None;
                    slot.last_fetched_at = Some(Instant::now());
                }
                Err(err) => {
                    tracing::debug!(key, seq, error = %err, "fetch failed");
                    slot.status = QueryStatus::Error;
                    slot.error = Some(err.clone());
                }
            }
        }

        self.emit(QueryEvent::Settled(key.to_owned()));
    }

    /// Outcome of the last applied fetch, if this caller may read it.
    fn settled_outcome(&self, slot: &Slot, key: &str, options: &QueryOptions) -> Option<Result<Value, QueryError>> {
        if let Some(err) = &slot.error {
            return Some(Err(err.clone()));
        }
        if !options.cache_enabled {
            return None;
        }
        self.cache.get(key).map(|entry| Ok(entry.data))
    }

    fn is_latest(&self, key: &str, seq: u64) -> bool {
        self.slots.get(key).is_some_and(|slot| slot.latest_seq == seq)
    }

    /// The outcome a caller of fetch `seq` should see once nothing newer is in flight.
    fn freshest(
        &self,
        key: &str,
        seq: u64,
        result: Result<Value, QueryError>,
        options: &QueryOptions,
    ) -> Result<Value, QueryError> {
        let settled_seq = self.settled_seq(key);
        if settled_seq < seq {
            // Never applied and nothing newer landed: the key was cleared meanwhile.
            tracing::debug!(key, seq, "fetch outlived a cache clear");
            return result.and_then(|_| Err(QueryError::Cleared(key.to_owned())));
        }
        if settled_seq == seq || !options.cache_enabled {
            return result;
        }

        // A newer fetch already landed; report its outcome instead of ours.
        match self.last_error(key) {
            Some(err) => Err(err),
            None => self.cache.get(key).map(|entry| entry.data).map_or(result, Ok),
        }
    }

    fn emit(&self, event: QueryEvent) {
        // No receivers means no query is mounted.
        let _ = self.events.send(event);
    }
}

impl Default for QueryClient {
    fn default() -> Self {
        Self::new()
    }
}
