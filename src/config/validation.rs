//! Configuration validation.
//!
//! # Responsibilities
//! - Semantic validation (serde handles syntactic)
//! - Validate value ranges (timeouts > 0, addresses parse)
//! - Check path settings the dispatcher relies on
//!
//! # Design Decisions
//! - Returns all validation errors, not just first
//! - Validation is pure function: ServerConfig → Result<(), Vec<ValidationError>>
//! - Runs before config is accepted into the system

use std::net::SocketAddr;

use thiserror::Error;

use crate::config::schema::ServerConfig;

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ValidationError {
    #[error("listener.bind_address `{0}` is not a socket address")]
    BindAddress(String),
    #[error("observability.metrics_address `{0}` is not a socket address")]
    MetricsAddress(String),
    #[error("app.basename `{0}` must start with `/`")]
    Basename(String),
    #[error("app.manifest_path `{0}` must start with `/`")]
    ManifestPath(String),
    #[error("app.prerender path `{0}` must start with `/`")]
    PrerenderPath(String),
    #[error("assets.version must not be empty")]
    EmptyAssetsVersion,
    #[error("{0} must be greater than zero")]
    ZeroTimeout(&'static str),
    #[error("app.max_body_bytes must be greater than zero")]
    ZeroBodyLimit,
}

pub fn validate_config(config: &ServerConfig) -> Result<(), Vec<ValidationError>> {
    let mut errors = Vec::new();

    if config.listener.bind_address.parse::<SocketAddr>().is_err() {
        errors.push(ValidationError::BindAddress(config.listener.bind_address.clone()));
    }
    if config.observability.metrics_enabled
        && config.observability.metrics_address.parse::<SocketAddr>().is_err()
    {
        errors.push(ValidationError::MetricsAddress(
            config.observability.metrics_address.clone(),
        ));
    }

    let app = &config.app;
    if !app.basename.starts_with('/') {
        errors.push(ValidationError::Basename(app.basename.clone()));
    }
    if app.lazy_discovery && !app.manifest_path.starts_with('/') {
        errors.push(ValidationError::ManifestPath(app.manifest_path.clone()));
    }
    for path in app.prerender.iter().filter(|p| !p.starts_with('/')) {
        errors.push(ValidationError::PrerenderPath(path.clone()));
    }
    if app.stream_timeout_ms == 0 {
        errors.push(ValidationError::ZeroTimeout("app.stream_timeout_ms"));
    }
    if app.max_body_bytes == 0 {
        errors.push(ValidationError::ZeroBodyLimit);
    }

    if config.assets.version.trim().is_empty() {
        errors.push(ValidationError::EmptyAssetsVersion);
    }
    if config.timeouts.request_secs == 0 {
        errors.push(ValidationError::ZeroTimeout("timeouts.request_secs"));
    }

    if errors.is_empty() {
        Ok(())
    } else {
        Err(errors)
    }
}
