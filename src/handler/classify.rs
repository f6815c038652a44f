//! Request classification: which of the four strategies answers a request.
//!
//! # Responsibilities
//! - Normalize the pathname (`.data` suffix, `/_root.data`, trailing slash)
//! - Decide SPA mode from the build-time header and `ssr`/`prerender`
//! - Select manifest, single-fetch, resource, or document handling

use crate::build::ServerBuild;
use crate::errors::DispatchError;
use crate::http::request::RequestInfo;
use crate::routing::{decode_path, manifest_url, match_routes, strip_basename, RouteMatch, RouteTree};

pub const DATA_SUFFIX: &str = ".data";
pub const ROOT_DATA_PATH: &str = "/_root.data";
pub const SPA_MODE_HEADER: &str = "x-remix-spa-mode";

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Strategy {
    Manifest,
    SingleFetch,
    Resource { route_id: String },
    Document,
}

#[derive(Debug, Clone)]
pub struct Classification {
    pub normalized_path: String,
    pub is_spa_mode: bool,
    pub strategy: Strategy,
    /// Matches for the normalized path; `None` when nothing matched or the
    /// request is for the manifest.
    pub matches: Option<Vec<RouteMatch>>,
}

pub fn is_data_request(pathname: &str) -> bool {
    pathname.ends_with(DATA_SUFFIX)
}

fn basename_or_root(build: &ServerBuild) -> &str {
    if build.basename.is_empty() {
        "/"
    } else {
        &build.basename
    }
}

/// The pathname a request is routed by.
pub fn normalize_path(pathname: &str, basename: &str) -> String {
    let mut normalized = if strip_basename(pathname, basename) == Some(ROOT_DATA_PATH) {
        basename.to_string()
    } else if let Some(stripped) = pathname.strip_suffix(DATA_SUFFIX) {
        stripped.to_string()
    } else {
        pathname.to_string()
    };

    if strip_basename(&normalized, basename) != Some("/") && normalized.ends_with('/') {
        normalized.pop();
    }
    normalized
}

/// SPA mode for this request, or a refusal when `ssr` is off and the path
/// can never be served.
pub fn spa_mode(
    build: &ServerBuild,
    pathname: &str,
    normalized: &str,
    build_time_spa: bool,
) -> Result<bool, DispatchError> {
    if build.ssr {
        return Ok(build_time_spa);
    }

    let basename = basename_or_root(build);
    let mut decoded = decode_path(normalized);
    if basename != "/" {
        match strip_basename(&decoded, basename) {
            Some(stripped) => decoded = stripped.to_string(),
            None => {
                return Err(DispatchError::OutsideBasename {
                    path: decoded,
                    basename: basename.to_string(),
                })
            }
        }
    }

    if build.prerender.is_empty() {
        return Ok(true);
    }

    let with_slash = format!("{decoded}/");
    let prerendered = build.prerender.iter().any(|p| *p == decoded || *p == with_slash);
    if prerendered {
        Ok(build_time_spa)
    } else if is_data_request(pathname) {
        Err(DispatchError::NotPrerendered(decoded))
    } else {
        Ok(true)
    }
}

pub fn classify(
    build: &ServerBuild,
    routes: &RouteTree,
    request: &RequestInfo,
    build_time_spa: bool,
) -> Result<Classification, DispatchError> {
    let pathname = request.path();
    let basename = basename_or_root(build);
    let normalized_path = normalize_path(pathname, basename);
    let is_spa_mode = spa_mode(build, pathname, &normalized_path, build_time_spa)?;

    let is_manifest = build
        .route_discovery
        .manifest_path()
        .map(|path| manifest_url(path, basename) == pathname)
        .unwrap_or(false);
    if is_manifest {
        return Ok(Classification {
            normalized_path,
            is_spa_mode,
            strategy: Strategy::Manifest,
            matches: None,
        });
    }

    let matches = match_routes(routes, &normalized_path, basename).filter(|m| !m.is_empty());

    let strategy = if is_data_request(pathname) {
        Strategy::SingleFetch
    } else {
        match matches.as_ref().and_then(|m| m.last()) {
            Some(leaf) if !is_spa_mode && leaf.route.module.is_resource() => Strategy::Resource {
                route_id: leaf.route.id.clone(),
            },
            _ => Strategy::Document,
        }
    };

    Ok(Classification {
        normalized_path,
        is_spa_mode,
        strategy,
        matches,
    })
}
