//! Cached queries and mutations, similar to SWR or TanStack Query.
//!
//! # Features
//!
//! - **Queries**: subscription-based fetching that serves cached data while it
//!   revalidates in the background
//! - **Mutations**: command-based one-shot changes with success and error callbacks
//! - **Cache management**: invalidation, forced refetch, manual updates and removal
//!
//! Every [`Query`] shares a [`QueryClient`]. The client holds the per-key fetch
//! state and a [`QueryCache`](crate::cache::QueryCache) of raw JSON entries, so
//! two observers of the same key never start two fetches at once.
//!
//! # Example
//!
//! ```rust,ignore
//! use reims_query::prelude::*;
//! use std::sync::Arc;
//!
//! struct Dashboard {
//!     query_client: Arc<QueryClient>,
//!     kpis: Option<KpiSummary>,
//! }
//!
//! impl Component for Dashboard {
//!     fn subscriptions(&self) -> Vec<Subscription<Message>> {
//!         vec![
//!             Subscription::new(
//!                 Query::new(&"kpis", move || api.kpis(), self.query_client.clone())
//!                     .with_options(QueryOptions::default().refetch_interval(Duration::from_secs(30))),
//!             )
//!             .map(Message::Kpis),
//!         ]
//!     }
//!
//!     fn update(&mut self, msg: Message) -> Command<Message> {
//!         match msg {
//!             Message::Kpis(result) => {
//!                 self.kpis = result.data().cloned();
//!                 Command::none()
//!             }
//!             Message::AlertAcknowledged => self.query_client.invalidate(&"alerts"),
//!         }
//!     }
//! }
//! ```

mod client;
mod config;
mod error;
mod mutation;
mod observer;
mod state;

pub use client::QueryClient;
pub use config::{QueryConfig, QueryOptions};
pub use error::QueryError;
pub use mutation::{Mutation, MutationResult, MutationState};
pub use observer::Query;
pub use state::{QueryEvent, QueryResult, QuerySnapshot, QueryState, QueryStatus, Refetch};
