use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;

use futures::StreamExt;
use serde_json::Value;
use tokio::sync::broadcast;
use tokio::time::Instant;

use crate::command::Command;

use super::error::QueryError;

/// Lifecycle status of a query key.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum QueryStatus {
    /// Nothing has been requested yet, or the query is disabled.
    #[default]
    Idle,
    /// A fetch is in flight.
    Loading,
    Success,
    Error,
}

/// The state of a query as seen by one observer.
#[derive(Debug, Clone, PartialEq)]
pub enum QueryState<T> {
    /// The query is disabled or has not started.
    Idle,
    /// A fetch is in flight. `data` holds the previous result, if any.
    Loading { data: Option<T> },
    Success {
        data: T,
        /// Whether the data is older than the stale time.
        is_stale: bool,
    },
    /// The last fetch failed. `data` holds the last successful result, if any.
    Error { error: QueryError, data: Option<T> },
}

/// Broadcast to every observer sharing a [`QueryClient`](super::QueryClient).
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum QueryEvent {
    /// A fetch for the key applied its result.
    Settled(String),
    /// The key was marked stale; mounted queries refetch.
    ///
    /// Carries the last sequence number issued before the event. Any fetch
    /// numbered above it already satisfies the request.
    Invalidated(String, u64),
    /// Mounted queries for the key must refetch, bypassing staleness.
    Refetch(String, u64),
    /// The key (or every key, when `None`) was removed from the cache.
    Removed(Option<String>),
}

impl QueryEvent {
    /// Returns `true` if this event concerns `key`.
    pub fn affects(&self, key: &str) -> bool {
        match self {
            Self::Settled(k) | Self::Invalidated(k, _) | Self::Refetch(k, _) => k == key,
            Self::Removed(k) => k.as_deref().is_none_or(|k| k == key),
        }
    }
}

/// Triggers a forced refetch of every mounted query for one key.
#[derive(Debug, Clone)]
pub struct Refetch {
    key: String,
    events: broadcast::Sender<QueryEvent>,
    seq: Arc<AtomicU64>,
}

impl Refetch {
    pub(crate) fn new(key: String, events: broadcast::Sender<QueryEvent>, seq: Arc<AtomicU64>) -> Self {
        Self { key, events, seq }
    }

    pub fn key(&self) -> &str {
        &self.key
    }

    /// Requests the refetch immediately.
    pub fn trigger(&self) {
        // No receivers means nothing is mounted for this key.
        let mark = self.seq.load(Ordering::Relaxed);
        let _ = self.events.send(QueryEvent::Refetch(self.key.clone(), mark));
    }

    /// Requests the refetch as a side effect of `update`.
    pub fn command<Msg: Send + 'static>(&self) -> Command<Msg> {
        let this = self.clone();
        Command {
            stream: Some(
                futures::stream::once(async move { this.trigger() })
                    .filter_map(|()| async { None })
                    .boxed(),
            ),
        }
    }
}

/// A query result emitted by a mounted [`Query`](super::Query).
#[derive(Debug, Clone)]
pub struct QueryResult<T> {
    pub state: QueryState<T>,
    /// A fetch for this key is in flight, including background refetches.
    pub is_fetching: bool,
    refetch: Refetch,
}

impl<T> QueryResult<T> {
    pub(crate) const fn new(state: QueryState<T>, is_fetching: bool, refetch: Refetch) -> Self {
        Self {
            state,
            is_fetching,
            refetch,
        }
    }

    /// The latest successful data, including data retained across a refetch or failure.
    pub const fn data(&self) -> Option<&T> {
        match &self.state {
            QueryState::Success { data, .. } => Some(data),
            QueryState::Loading { data } | QueryState::Error { data, .. } => data.as_ref(),
            QueryState::Idle => None,
        }
    }

    pub const fn error(&self) -> Option<&QueryError> {
        match &self.state {
            QueryState::Error { error, .. } => Some(error),
            _ => None,
        }
    }

    /// Returns `true` during the initial load, when there is no data to show yet.
    pub const fn is_loading(&self) -> bool {
        matches!(self.state, QueryState::Loading { data: None })
    }

    pub const fn is_idle(&self) -> bool {
        matches!(self.state, QueryState::Idle)
    }

    pub const fn is_success(&self) -> bool {
        matches!(self.state, QueryState::Success { .. })
    }

    pub const fn is_error(&self) -> bool {
        matches!(self.state, QueryState::Error { .. })
    }

    pub const fn is_stale(&self) -> bool {
        matches!(self.state, QueryState::Success { is_stale: true, .. })
    }

    pub const fn status(&self) -> QueryStatus {
        match self.state {
            QueryState::Idle => QueryStatus::Idle,
            QueryState::Loading { .. } => QueryStatus::Loading,
            QueryState::Success { .. } => QueryStatus::Success,
            QueryState::Error { .. } => QueryStatus::Error,
        }
    }

    /// Forces a refetch of this key, keeping the current data visible meanwhile.
    pub fn refetch<Msg: Send + 'static>(&self) -> Command<Msg> {
        self.refetch.command()
    }

    /// Handle that can trigger refetches after the result itself is gone.
    pub fn refetcher(&self) -> Refetch {
        self.refetch.clone()
    }
}

/// Point-in-time view of one query key held by a [`QueryClient`](super::QueryClient).
#[derive(Debug, Clone, PartialEq)]
pub struct QuerySnapshot {
    pub key: String,
    pub status: QueryStatus,
    pub data: Option<Value>,
    pub error: Option<QueryError>,
    pub is_fetching: bool,
    pub last_fetched_at: Option<Instant>,
    pub stale_time: Duration,
}
