//! Configuration schema definitions.
//!
//! This module defines the complete configuration structure for the server.
//! All types derive Serde traits for deserialization from config files.

use serde::{Deserialize, Serialize};

use crate::build::{ServerMode, DEFAULT_MANIFEST_PATH};
use crate::http::DEFAULT_MAX_BODY_BYTES;

/// Root configuration for the SSR server.
#[derive(Debug, Clone, Deserialize, Serialize, Default)]
#[serde(default)]
pub struct ServerConfig {
    /// Listener configuration (bind address).
    pub listener: ListenerConfig,

    /// How the application build is served.
    pub app: AppConfig,

    /// Client asset manifest settings.
    pub assets: AssetsConfig,

    /// Timeout configuration.
    pub timeouts: TimeoutConfig,

    /// Observability settings.
    pub observability: ObservabilityConfig,
}

/// Listener configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct ListenerConfig {
    /// Bind address (e.g., "0.0.0.0:3000").
    pub bind_address: String,
}

impl Default for ListenerConfig {
    fn default() -> Self {
        Self {
            bind_address: "0.0.0.0:3000".to_string(),
        }
    }
}

/// Application build settings.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct AppConfig {
    /// development, production, or test.
    pub mode: ServerMode,

    /// Path prefix every route lives under.
    pub basename: String,

    /// Server rendering on; `false` serves SPA shells except for `prerender` paths.
    pub ssr: bool,

    /// Paths rendered at build time.
    pub prerender: Vec<String>,

    /// Lazy route discovery through the manifest endpoint.
    pub lazy_discovery: bool,

    /// Manifest endpoint, relative to the basename.
    pub manifest_path: String,

    /// Deadline for pending values in streamed hand-off data.
    pub stream_timeout_ms: u64,

    /// Run route middleware and use a context provider as load context.
    pub middleware: bool,

    /// Accept the SPA-mode header sent by build-time prerendering.
    pub build_time_requests: bool,

    /// Largest action or resource request body buffered before answering 413.
    pub max_body_bytes: usize,
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            mode: ServerMode::Production,
            basename: "/".to_string(),
            ssr: true,
            prerender: Vec::new(),
            lazy_discovery: true,
            manifest_path: DEFAULT_MANIFEST_PATH.to_string(),
            stream_timeout_ms: 4950,
            middleware: false,
            build_time_requests: false,
            max_body_bytes: DEFAULT_MAX_BODY_BYTES,
        }
    }
}

/// Client asset manifest.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct AssetsConfig {
    /// Version clients must present to the manifest endpoint.
    pub version: String,

    /// URL of the client manifest module.
    pub url: String,
}

impl Default for AssetsConfig {
    fn default() -> Self {
        Self {
            version: "1".to_string(),
            url: "/assets/manifest-1.js".to_string(),
        }
    }
}

/// Timeout configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct TimeoutConfig {
    /// Request timeout (total time for request/response) in seconds.
    pub request_secs: u64,

    /// How long in-flight requests may drain on shutdown, in seconds.
    pub shutdown_secs: u64,
}

impl Default for TimeoutConfig {
    fn default() -> Self {
        Self {
            request_secs: 30,
            shutdown_secs: 10,
        }
    }
}

/// Observability configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct ObservabilityConfig {
    /// Log level (trace, debug, info, warn, error).
    pub log_level: String,

    /// Emit JSON log lines instead of human-readable ones.
    pub json_logs: bool,

    /// Enable metrics endpoint.
    pub metrics_enabled: bool,

    /// Metrics endpoint bind address.
    pub metrics_address: String,
}

impl Default for ObservabilityConfig {
    fn default() -> Self {
        Self {
            log_level: "info".to_string(),
            json_logs: false,
            metrics_enabled: false,
            metrics_address: "0.0.0.0:9090".to_string(),
        }
    }
}
