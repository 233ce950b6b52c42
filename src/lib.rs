//! # reims-query - data fetching and caching for REIMS dashboards
//!
//! A stale-while-revalidate query cache for the REIMS (real-estate investment
//! management) backend, driven by a headless Elm Architecture runtime.
//!
//! ## Architecture
//!
//! 1. **Component**: your state, an `update` function and the subscriptions it declares
//! 2. **Message**: events that change the state
//! 3. **Commands**: asynchronous operations that produce messages (mutations among them)
//! 4. **Subscriptions**: long-lived sources such as timers and queries
//!
//! A component is *mounted* while the [`Runtime`](runtime::Runtime) runs it.
//! Declaring a [`Query`](query::Query) in `subscriptions()` fetches its data
//! (or serves it from the cache), keeps it fresh on an interval and stops
//! refreshing it once the query is no longer declared or the component quits.
//!
//! ## Core Components
//!
//! - [`QueryClient`](query::QueryClient): per-key fetch state, deduplication and ordering
//! - [`QueryCache`](cache::QueryCache): TTL store of raw JSON entries, optionally persisted
//! - [`Query`](query::Query) / [`Mutation`](query::Mutation): the hook equivalents
//! - [`ApiClient`](api::ApiClient): typed REST client for the backend
//! - [`Component`](component::Component) and [`Runtime`](runtime::Runtime): mount and unmount
//!
//! ## Example
//!
//! ```rust,no_run
//! use std::sync::Arc;
//! use reims_query::prelude::*;
//! use reims_query::api::{ApiClient, models::KpiSummary};
//!
//! #[derive(Debug)]
//! enum Message {
//!     Kpis(QueryResult<KpiSummary>),
//! }
//!
//! struct Dashboard {
//!     api: ApiClient,
//!     client: Arc<QueryClient>,
//! }
//!
//! impl Component for Dashboard {
//!     type Message = Message;
//!     type Flags = (ApiClient, Arc<QueryClient>);
//!
//!     fn new((api, client): Self::Flags) -> (Self, Command<Message>) {
//!         (Dashboard { api, client }, Command::none())
//!     }
//!
//!     fn update(&mut self, msg: Message) -> Command<Message> {
//!         match msg {
//!             Message::Kpis(result) => {
//!                 if let Some(kpis) = result.data() {
//!                     println!("occupancy {:.1}%", kpis.occupancy_rate * 100.0);
//!                 }
//!                 Command::none()
//!             }
//!         }
//!     }
//!
//!     fn subscriptions(&self) -> Vec<Subscription<Message>> {
//!         vec![Subscription::new(self.api.kpis_query(self.client.clone())).map(Message::Kpis)]
//!     }
//! }
//! ```

pub mod api;
pub mod cache;
pub mod command;
pub mod component;
pub mod config;
pub mod logging;
pub mod prelude;
pub mod query;
pub mod runtime;
pub mod subscription;
