//! Observability subsystem.
//!
//! # Data Flow
//! ```text
//! HTTP layer and default error handler produce:
//!     → logging.rs (structured log events, request ID in the trace span)
//!     → metrics.rs (request counter, latency histogram)
//!
//! Consumers:
//!     → Log aggregation (stdout, pretty or JSON)
//!     → Metrics endpoint (Prometheus scrape)
//! ```
//!
//! # Design Decisions
//! - The dispatcher core never logs; errors reach logs through the error handler
//! - Metrics are cheap (atomic increments)
//! - JSON logs are opt-in from config

pub mod logging;
pub mod metrics;
