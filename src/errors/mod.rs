//! Error taxonomy and normalization.
//!
//! # Data Flow
//! ```text
//! loader / action / middleware / render / dispatcher
//!     → Thrown (Response | Route | Error | MissingRouteResponse)
//!     → reported once through the build's error handler
//!     → sanitize (non-development modes) → client-facing payload
//! ```
//!
//! # Design Decisions
//! - Thrown values are a tagged union, inspected with predicates
//!   (`as_response`, `is_route_error_response`) rather than downcasts
//! - `RouteError` is the clonable form stored in handler contexts
//! - Production never leaks messages or stacks to the client

pub mod normalize;
pub mod types;

pub use normalize::{
    error_response_to_json, last_resort_response, route_error_to_json, sanitize_error,
    sanitize_errors, sanitize_route_error, serialize_error, serialize_errors,
    UNEXPECTED_SERVER_ERROR, X_REMIX_ERROR,
};
pub use types::{DispatchError, ErrorResponse, RouteError, SerializedError, Thrown};
