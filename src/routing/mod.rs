//! Routing subsystem.
//!
//! # Data Flow
//! ```text
//! RouteManifest (flat, id → route)
//!     → matcher.rs (build tree, flatten branches, rank)
//!     → RouteTree (immutable, shared via Arc)
//!
//! Per request:
//!     pathname
//!     → path.rs (strip basename, percent-decode)
//!     → matcher.rs (first ranked branch that matches)
//!     → Vec<RouteMatch> (root → leaf) or None
//! ```
//!
//! # Design Decisions
//! - Routes compiled once per build, immutable at runtime
//! - No regex in hot path
//! - Deterministic: same input always matches same branch

pub mod matcher;
pub mod path;

pub use matcher::{match_routes, RouteMatch, RouteNode, RouteTree};
pub use path::{decode_path, manifest_url, normalize_basename, strip_basename};
