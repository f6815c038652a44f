//! Hand-off subsystem: server state delivered to the client for hydration.
//!
//! # Data Flow
//! ```text
//! StaticHandlerContext (loader data, action data, errors)
//!     → value.rs (HandoffValue tree, some entries still pending)
//!     → encode.rs (NDJSON stream: root line, then one line per settlement)
//!     → response body / EntryContext.server_handoff_stream
//!
//! Build-level settings (basename, future flags, discovery, SPA mode)
//!     → server_handoff_string (HTML-safe JSON, inlined into the document)
//! ```
//!
//! # Design Decisions
//! - Pending values never hold the first line back
//! - A slow value is rejected at the deadline; the response still completes
//! - Client disconnect cancels the stream via the request's token

pub mod encode;
pub mod value;

use serde::Serialize;

use crate::build::{CriticalCss, FutureConfig, RouteDiscovery};

pub use encode::{encode, DEFAULT_STREAM_TIMEOUT, SERVER_TIMEOUT_MESSAGE};
pub use value::{DeferredFuture, DeferredResult, HandoffValue};

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ServerHandoff<'a> {
    pub basename: &'a str,
    pub future: &'a FutureConfig,
    pub route_discovery: &'a RouteDiscovery,
    pub ssr: bool,
    pub is_spa_mode: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub critical_css: Option<&'a CriticalCss>,
}

/// JSON safe to inline inside a `<script>` tag.
pub fn server_handoff_string(handoff: &ServerHandoff<'_>) -> String {
    let json = serde_json::to_string(handoff).unwrap_or_else(|_| "{}".to_string());
    escape_html(&json)
}

pub fn escape_html(input: &str) -> String {
    let mut out = String::with_capacity(input.len());
    for c in input.chars() {
        match c {
            '&' => out.push_str("\\u0026"),
            '>' => out.push_str("\\u003e"),
            '<' => out.push_str("\\u003c"),
            '\u{2028}' => out.push_str("\\u2028"),
            '\u{2029}' => out.push_str("\\u2029"),
            _ => out.push(c),
        }
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_handoff_string_is_script_safe() {
        let css = CriticalCss::Inline("</style><script>alert(1)</script>".into());
        let handoff = ServerHandoff {
            basename: "/",
            future: &FutureConfig::default(),
            route_discovery: &RouteDiscovery::default(),
            ssr: true,
            is_spa_mode: false,
            critical_css: Some(&css),
        };
        let out = server_handoff_string(&handoff);
        assert!(!out.contains('<'));
        assert!(out.contains("\\u003c/style\\u003e"));

        let parsed: serde_json::Value = serde_json::from_str(&out).unwrap();
        assert_eq!(parsed["isSpaMode"], false);
        assert_eq!(parsed["routeDiscovery"]["manifestPath"], "/__manifest");
        assert_eq!(parsed["future"]["v8_middleware"], false);
    }
}
