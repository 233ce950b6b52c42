//! One-shot operations that change backend state.
//!
//! # Design Pattern: Transaction-based Operations
//!
//! A mutation is a discrete side effect with a clear start and end, so it is
//! run as a [`Command`] rather than a subscription. Mutations never write to the
//! query cache; after a successful mutation, invalidate or refetch the queries
//! it affects, or write the new data with
//! [`QueryClient::set_query_data`](super::QueryClient::set_query_data).
//!
//! # Example
//!
//! ```rust,ignore
//! use reims_query::prelude::*;
//! use reims_query::query::{Mutation, MutationResult};
//!
//! enum Message {
//!     Acknowledge(u64),
//!     Acknowledged(MutationResult<Alert>),
//! }
//!
//! fn update(&mut self, msg: Message) -> Command<Message> {
//!     match msg {
//!         Message::Acknowledge(id) => self.acknowledge.mutate(id).map(Message::Acknowledged),
//!         Message::Acknowledged(result) if result.is_success() => {
//!             self.query_client.invalidate(&"alerts")
//!         }
//!         Message::Acknowledged(_) => Command::none(),
//!     }
//! }
//! ```

use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};

use futures::future::BoxFuture;

use crate::command::Command;

use super::error::QueryError;

/// The state of a mutation result.
#[derive(Debug, Clone, PartialEq)]
pub enum MutationState<T> {
    /// Mutation is idle (not yet started).
    Idle,
    /// Mutation is in progress.
    Loading,
    /// Mutation succeeded with a result.
    Success(T),
    /// Mutation failed with an error.
    Error(QueryError),
}

/// A mutation result containing the current state.
#[derive(Debug, Clone, PartialEq)]
pub struct MutationResult<T> {
    pub state: MutationState<T>,
}

impl<T> MutationResult<T> {
    pub const fn data(&self) -> Option<&T> {
        match &self.state {
            MutationState::Success(data) => Some(data),
            _ => None,
        }
    }

    pub const fn error(&self) -> Option<&QueryError> {
        match &self.state {
            MutationState::Error(err) => Some(err),
            _ => None,
        }
    }

    pub const fn is_loading(&self) -> bool {
        matches!(self.state, MutationState::Loading)
    }

    pub const fn is_success(&self) -> bool {
        matches!(self.state, MutationState::Success(_))
    }

    pub const fn is_error(&self) -> bool {
        matches!(self.state, MutationState::Error(_))
    }
}

impl<T> From<Result<T, QueryError>> for MutationResult<T> {
    fn from(result: Result<T, QueryError>) -> Self {
        let state = match result {
            Ok(data) => MutationState::Success(data),
            Err(err) => MutationState::Error(err),
        };
        Self { state }
    }
}

type Mutator<I, O> = Arc<dyn Fn(I) -> BoxFuture<'static, Result<O, QueryError>> + Send + Sync>;
type Callback<T> = Arc<dyn Fn(&T) + Send + Sync>;

/// A reusable mutation with success and error callbacks.
///
/// Cloning is cheap and clones share the loading counter, so a component can
/// keep one mutation and ask [`is_loading`](Self::is_loading) while calls run.
pub struct Mutation<I, O> {
    mutator: Mutator<I, O>,
    on_success: Option<Callback<O>>,
    on_error: Option<Callback<QueryError>>,
    pending: Arc<AtomicUsize>,
}

impl<I, O> Clone for Mutation<I, O> {
    fn clone(&self) -> Self {
        Self {
            mutator: Arc::clone(&self.mutator),
            on_success: self.on_success.clone(),
            on_error: self.on_error.clone(),
            pending: Arc::clone(&self.pending),
        }
    }
}

impl<I, O> Mutation<I, O>
where
    I: Send + 'static,
    O: Send + 'static,
{
    /// Creates a mutation from an async function.
    pub fn new<F>(mutator: F) -> Self
    where
        F: Fn(I) -> BoxFuture<'static, Result<O, QueryError>> + Send + Sync + 'static,
    {
        Self {
            mutator: Arc::new(mutator),
            on_success: None,
            on_error: None,
            pending: Arc::new(AtomicUsize::new(0)),
        }
    }

    /// Called with the output of every successful call.
    #[must_use]
    pub fn on_success(mut self, f: impl Fn(&O) + Send + Sync + 'static) -> Self {
        self.on_success = Some(Arc::new(f));
        self
    }

    /// Called with the error of every failed call.
    #[must_use]
    pub fn on_error(mut self, f: impl Fn(&QueryError) + Send + Sync + 'static) -> Self {
        self.on_error = Some(Arc::new(f));
        self
    }

    /// Returns `true` while at least one call is running.
    pub fn is_loading(&self) -> bool {
        self.pending.load(Ordering::SeqCst) > 0
    }

    /// Runs the mutation and resolves its callbacks.
    pub async fn run(&self, input: I) -> Result<O, QueryError> {
        let _guard = PendingGuard::enter(&self.pending);
        let result = (self.mutator)(input).await;

        match &result {
            Ok(output) => {
                if let Some(f) = &self.on_success {
                    f(output);
                }
            }
            Err(err) => {
                tracing::debug!(error = %err, "mutation failed");
                if let Some(f) = &self.on_error {
                    f(err);
                }
            }
        }
        result
    }

    /// Runs the mutation as a command producing its [`MutationResult`].
    ///
    /// The loading counter is raised immediately, before the command is executed.
    pub fn mutate(&self, input: I) -> Command<MutationResult<O>> {
        let this = self.clone();
        let guard = PendingGuard::enter(&self.pending);
        Command::future(async move {
            let result = this.run(input).await;
            drop(guard);
            MutationResult::from(result)
        })
    }
}

/// Keeps the pending counter raised for as long as it lives.
struct PendingGuard(Arc<AtomicUsize>);

impl PendingGuard {
    fn enter(pending: &Arc<AtomicUsize>) -> Self {
        pending.fetch_add(1, Ordering::SeqCst);
        Self(Arc::clone(pending))
    }
}

impl Drop for PendingGuard {
    fn drop(&mut self) {
        self.0.fetch_sub(1, Ordering::SeqCst);
    }
}
