//! The [`Query`] subscription: a mounted, self-refreshing view of one query key.
//!
//! # Design Pattern: Subscription-based State Management
//!
//! A query is a **subscription** that a component declares while it wants the
//! data. When the runtime starts it:
//!
//! 1. Fresh cached data is emitted immediately and no fetch happens
//! 2. Stale cached data is emitted, then refetched in the background
//! 3. Without cached data, `Loading` is emitted and the data is fetched
//! 4. Invalidations, refetch requests and interval ticks trigger refetches while
//!    the last data stays visible. Observers of one key answer an invalidation or
//!    refetch request with a single shared fetch
//!
//! When the component stops declaring the query (or is unmounted) the stream is
//! dropped, which also drops its refetch timer.
//!
//! # Example
//!
//! ```rust,ignore
//! use reims_query::prelude::*;
//! use reims_query::query::{Query, QueryClient, QueryOptions, QueryResult};
//! use std::sync::Arc;
//! use std::time::Duration;
//!
//! struct Dashboard {
//!     query_client: Arc<QueryClient>,
//!     kpis: Option<QueryResult<KpiSummary>>,
//! }
//!
//! impl Component for Dashboard {
//!     fn subscriptions(&self) -> Vec<Subscription<Message>> {
//!         vec![
//!             Subscription::new(
//!                 Query::new(&"kpis", || Box::pin(fetch_kpis()), self.query_client.clone())
//!                     .with_options(QueryOptions::default().refetch_interval(Duration::from_secs(30))),
//!             )
//!             .map(Message::Kpis),
//!         ]
//!     }
//!
//!     fn update(&mut self, msg: Message) -> Command<Message> {
//!         match msg {
//!             Message::Kpis(result) => {
//!                 self.kpis = Some(result);
//!                 Command::none()
//!             }
//!             Message::Retry => match &self.kpis {
//!                 Some(result) => result.refetch(),
//!                 None => Command::none(),
//!             },
//!         }
//!     }
//! }
//! ```

use std::hash::{DefaultHasher, Hash, Hasher};
use std::marker::PhantomData;
use std::sync::Arc;

use futures::StreamExt;
use futures::future::{self, BoxFuture};
use futures::stream::{self, BoxStream};
use serde::Serialize;
use serde::de::DeserializeOwned;
use tokio::sync::broadcast;
use tokio::sync::broadcast::error::RecvError;

use crate::subscription::time::{self, Timer};
use crate::subscription::{SubscriptionId, SubscriptionSource};

use super::client::{FetchMode, QueryClient, RawFetcher, erase};
use super::config::QueryOptions;
use super::error::QueryError;
use super::state::{QueryEvent, QueryResult, QueryState};

/// A query subscription that fetches, caches and refreshes one key.
///
/// Two queries with the same key share cache entries and in-flight fetches
/// through their [`QueryClient`], whatever component declared them.
pub struct Query<T> {
    key: String,
    fetcher: RawFetcher,
    client: Arc<QueryClient>,
    options: QueryOptions,
    _marker: PhantomData<fn() -> T>,
}

impl<T> Query<T>
where
    T: Serialize + DeserializeOwned + Clone + Send + Sync + 'static,
{
    /// Creates a query with default options.
    ///
    /// # Arguments
    ///
    /// * `key` - Identifies the cached data; equal keys share it
    /// * `fetcher` - An async function producing the data
    /// * `client` - The query client that owns the cache
    pub fn new<F>(key: &impl ToString, fetcher: F, client: Arc<QueryClient>) -> Self
    where
        F: Fn() -> BoxFuture<'static, Result<T, QueryError>> + Send + Sync + 'static,
    {
        Self {
            key: key.to_string(),
            fetcher: erase(fetcher),
            client,
            options: QueryOptions::default(),
            _marker: PhantomData,
        }
    }

    #[must_use]
    pub fn with_options(mut self, options: QueryOptions) -> Self {
        self.options = options;
        self
    }

    pub fn key(&self) -> &str {
        &self.key
    }

    pub const fn options(&self) -> &QueryOptions {
        &self.options
    }
}

impl<T> SubscriptionSource for Query<T>
where
    T: Serialize + DeserializeOwned + Clone + Send + Sync + 'static,
{
    type Output = QueryResult<T>;

    fn stream(&self) -> BoxStream<'static, Self::Output> {
        let refetch = self.client.refetcher(self.key.clone());

        if !self.options.enabled {
            return stream::once(future::ready(QueryResult::new(QueryState::Idle, false, refetch))).boxed();
        }

        let observer = Observer {
            key: self.key.clone(),
            fetcher: Arc::clone(&self.fetcher),
            client: Arc::clone(&self.client),
            options: self.options.clone(),
            events: self.client.subscribe(),
            ticks: self.options.refetch_interval.map(|period| Timer::new(period).stream()),
            data: None,
            seen: 0,
        };

        stream::unfold((Step::Start, observer), |(step, mut observer)| async move {
            let (result, next) = match step {
                Step::Start => observer.start(),
                Step::Fetch(mode) => match observer.fetch(mode).await {
                    Some(emission) => emission,
                    // cleared mid-fetch; the removal event resets this observer
                    None => observer.watch().await?,
                },
                Step::Watch => observer.watch().await?,
            };
            Some((result, (next, observer)))
        })
        .boxed()
    }

    fn id(&self) -> SubscriptionId {
        let mut hasher = DefaultHasher::new();
        self.hash(&mut hasher);
        SubscriptionId::of::<Self>(hasher.finish())
    }
}

impl<T> Hash for Query<T> {
    fn hash<H>(&self, hasher: &mut H)
    where
        H: std::hash::Hasher,
    {
        self.key.hash(hasher);
        self.options.hash(hasher);
    }
}

/// Internal state machine for the Query subscription.
enum Step {
    Start,
    Fetch(FetchMode),
    Watch,
}

enum Wake {
    Event(Result<QueryEvent, RecvError>),
    Tick,
}

struct Observer<T> {
    key: String,
    fetcher: RawFetcher,
    client: Arc<QueryClient>,
    options: QueryOptions,
    events: broadcast::Receiver<QueryEvent>,
    ticks: Option<BoxStream<'static, time::Message>>,
    /// Last successful data seen by this observer.
    data: Option<T>,
    /// Settled sequence number already reflected in `data`.
    seen: u64,
}

impl<T> Observer<T>
where
    T: Serialize + DeserializeOwned + Clone + Send + Sync + 'static,
{
    fn result(&self, state: QueryState<T>, is_fetching: bool) -> QueryResult<T> {
        QueryResult::new(state, is_fetching, self.client.refetcher(self.key.clone()))
    }

    fn cached(&self) -> Option<(T, bool)> {
        if !self.options.cache_enabled {
            return None;
        }
        let (value, fresh) = self.client.cached(&self.key, &self.options)?;
        match serde_json::from_value(value) {
            Ok(data) => Some((data, fresh)),
            Err(err) => {
                tracing::warn!(key = %self.key, error = %err, "ignoring cached payload that no longer decodes");
                None
            }
        }
    }

    fn start(&mut self) -> (QueryResult<T>, Step) {
        match self.cached() {
            Some((data, true)) => {
                self.data = Some(data.clone());
                self.seen = self.client.settled_seq(&self.key);
                let state = QueryState::Success { data, is_stale: false };
                (self.result(state, false), Step::Watch)
            }
            Some((data, false)) => {
                self.data = Some(data.clone());
                let state = QueryState::Success { data, is_stale: true };
                (self.result(state, true), Step::Fetch(FetchMode::Join))
            }
            None => (self.result(QueryState::Loading { data: None }, true), Step::Fetch(FetchMode::Join)),
        }
    }

    /// Runs the fetch and reports its outcome. `None` means the key was cleared
    /// before the fetch settled.
    async fn fetch(&mut self, mode: FetchMode) -> Option<(QueryResult<T>, Step)> {
        let outcome = self
            .client
            .fetch_raw(&self.key, &self.fetcher, &self.options, mode)
            .await
            .and_then(|value| serde_json::from_value::<T>(value).map_err(QueryError::from));
        self.seen = self.client.settled_seq(&self.key);

        let state = match outcome {
            Ok(data) => {
                self.data = Some(data.clone());
                QueryState::Success { data, is_stale: false }
            }
            Err(QueryError::Cleared(_)) => return None,
            Err(error) => QueryState::Error {
                error,
                data: self.data.clone(),
            },
        };
        Some((self.result(state, self.client.is_fetching(&self.key)), Step::Watch))
    }

    /// Waits until something requires a new emission. `None` ends the stream.
    async fn watch(&mut self) -> Option<(QueryResult<T>, Step)> {
        loop {
            let wake = tokio::select! {
                event = self.events.recv() => Wake::Event(event),
                () = next_tick(&mut self.ticks) => Wake::Tick,
            };

            match wake {
                Wake::Tick => {
                    tracing::trace!(key = %self.key, "refetch interval elapsed");
                    return Some(self.refreshing(FetchMode::Force));
                }
                Wake::Event(Ok(event)) if event.affects(&self.key) => match event {
                    QueryEvent::Settled(_) => {
                        if let Some(result) = self.catch_up() {
                            return Some((result, Step::Watch));
                        }
                    }
                    QueryEvent::Invalidated(_, mark) | QueryEvent::Refetch(_, mark) => {
                        return Some(self.refreshing(FetchMode::After(mark)));
                    }
                    QueryEvent::Removed(_) => {
                        self.data = None;
                        self.seen = 0;
                        let result = self.result(QueryState::Loading { data: None }, true);
                        return Some((result, Step::Fetch(FetchMode::Join)));
                    }
                },
                Wake::Event(Ok(_)) => {}
                Wake::Event(Err(RecvError::Lagged(skipped))) => {
                    tracing::warn!(key = %self.key, skipped, "query observer lagged behind events");
                    if let Some(result) = self.catch_up() {
                        return Some((result, Step::Watch));
                    }
                }
                Wake::Event(Err(RecvError::Closed)) => return None,
            }
        }
    }

    /// Loading with the current data kept visible, followed by a refetch.
    fn refreshing(&self, mode: FetchMode) -> (QueryResult<T>, Step) {
        let state = QueryState::Loading {
            data: self.data.clone(),
        };
        (self.result(state, true), Step::Fetch(mode))
    }

    /// Picks up a result that another observer's fetch applied.
    fn catch_up(&mut self) -> Option<QueryResult<T>> {
        let settled = self.client.settled_seq(&self.key);
        if settled <= self.seen {
            return None;
        }

        let state = match self.client.last_error(&self.key) {
            Some(error) => QueryState::Error {
                error,
                data: self.data.clone(),
            },
            None => {
                let (data, _) = self.cached()?;
                self.data = Some(data.clone());
                QueryState::Success { data, is_stale: false }
            }
        };
        self.seen = settled;
        Some(self.result(state, self.client.is_fetching(&self.key)))
    }
}

async fn next_tick(ticks: &mut Option<BoxStream<'static, time::Message>>) {
    match ticks {
        Some(stream) => {
            if stream.next().await.is_none() {
                future::pending::<()>().await;
            }
        }
        None => future::pending::<()>().await,
    }
}
