//! Server-side request dispatcher for a nested-route web framework.
//!
//! Classifies each request as a manifest patch, a single-fetch data request,
//! a resource route, or a document render, and produces exactly one response.

pub mod build;
pub mod config;
pub mod data;
pub mod errors;
pub mod handler;
pub mod handoff;
pub mod http;
pub mod lifecycle;
pub mod observability;
pub mod routing;

pub use build::{BuildSource, EntryModule, RouteManifest, RouteModule, ServerBuild, ServerMode, ServerRoute};
pub use config::ServerConfig;
pub use handler::RequestHandler;
pub use http::HttpServer;
pub use lifecycle::Shutdown;
