//! Data subsystem: loaders, actions, middleware, and their context.
//!
//! # Data Flow
//! ```text
//! RequestInfo + body
//!     → context.rs (LoadContext: legacy map or typed provider)
//!     → static_handler.rs (StaticHandler contract)
//!     → query.rs (DataStaticHandler)
//!         → middleware (root → leaf, may short-circuit)
//!         → action (target route, mutations only)
//!         → loaders (concurrently, above any action-error boundary)
//!     → QueryResult: Response (redirect / short-circuit)
//!                  | StaticHandlerContext (data, errors, status, headers)
//! ```
//!
//! # Design Decisions
//! - The dispatcher only sees the `StaticHandler` trait
//! - Errors are captured per route id, never propagated out of `query`
//! - `query_route` propagates thrown values; resource routes decide how
//!   to present them

pub mod context;
pub mod query;
pub mod static_handler;

pub use context::{
    create_context, create_load_context, AppLoadContext, ContextError, ContextKey, InitialContext,
    LoadContext, RouterContextProvider,
};
pub use query::{error_response_from, is_mutation_method, DataStaticHandler};
pub use static_handler::{
    BoundaryTracker, QueryOptions, QueryResult, RouteQueryOptions, StaticHandler,
    StaticHandlerContext,
};
