//! HTTP protocol handling subsystem.
//!
//! # Data Flow
//! ```text
//! TCP connection
//!     → server.rs (Axum setup, request ID, trace span, timeout)
//!     → request.rs (RequestInfo: head + cancellation token)
//!     → handler::RequestHandler (dispatch)
//!     → response.rs (construct, strip for HEAD)
//!     → Send to client
//! ```

pub mod request;
pub mod response;
pub mod server;

pub use request::{read_body, BodyError, MakeRequestUuid, RequestInfo, DEFAULT_MAX_BODY_BYTES, X_REQUEST_ID};
pub use server::{AppState, ContextFactory, HttpServer};
