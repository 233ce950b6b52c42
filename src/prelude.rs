//! Prelude module for convenient imports.
//!
//! ```
//! use reims_query::prelude::*;
//! ```
//!
//! # What's included
//!
//! - [`Component`] - The component trait
//! - [`Command`] and [`Action`] - For performing side effects
//! - [`Subscription`] - For handling event sources
//! - [`Runtime`] - Mounts and runs a component
//! - [`QueryClient`], [`Query`], [`QueryOptions`], [`QueryResult`], [`QueryState`],
//!   [`QueryError`], [`Mutation`] and [`MutationResult`] - The query cache

pub use crate::command::{Action, Command};
pub use crate::component::Component;
pub use crate::query::{
    Mutation, MutationResult, Query, QueryClient, QueryError, QueryOptions, QueryResult, QueryState,
};
pub use crate::runtime::Runtime;
pub use crate::subscription::Subscription;
