//! The single-fetch data protocol: loader and action results for
//! client-side navigations, without HTML.
//!
//! # Responsibilities
//! - GET runs the matched loaders (optionally only those in `_routes`)
//! - Anything else runs exactly one action, without revalidating
//! - Redirects are re-encoded as a 202 payload so nothing in between follows them
//!
//! # Design Decisions
//! - Loader errors stay at the route that threw; the client bubbles them
//! - Every payload is a streamed hand-off value, even redirects

use std::collections::{BTreeMap, HashSet};

use axum::body::{Body, Bytes};
use axum::http::header::{HeaderMap, HeaderValue, CONTENT_LENGTH, CONTENT_TYPE, LOCATION, SET_COOKIE};
use axum::http::{Method, Response, StatusCode};
use serde::Serialize;

use crate::build::{ServerBuild, ServerMode};
use crate::data::{QueryOptions, QueryResult, StaticHandlerContext};
use crate::errors::{sanitize_route_error, RouteError, Thrown};
use crate::handoff::{encode, HandoffValue, DEFAULT_STREAM_TIMEOUT};
use crate::http::request::RequestInfo;
use crate::http::response::{self, is_bodyless_status, is_redirect_status};
use crate::routing::strip_basename;

use super::headers::document_headers;
use super::manifest::RELOAD_DOCUMENT_HEADER;
use super::Scope;

/// Status of a redirect carried in a single-fetch payload.
pub const SINGLE_FETCH_REDIRECT_STATUS: StatusCode = StatusCode::ACCEPTED;
/// Key wrapping a redirect that came out of loaders.
pub const REDIRECT_KEY: &str = "__redirect";
pub const X_REMIX_RESPONSE: &str = "x-remix-response";
pub const X_REMIX_REVALIDATE: &str = "x-remix-revalidate";
pub const X_REMIX_REPLACE: &str = "x-remix-replace";
pub const TEXT_X_SCRIPT: &str = "text/x-script";
/// Query parameter naming the routes whose loaders should run.
pub const ROUTES_PARAM: &str = "_routes";

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct SingleFetchRedirect {
    pub redirect: String,
    pub status: u16,
    pub revalidate: bool,
    pub reload: bool,
    pub replace: bool,
}

impl SingleFetchRedirect {
    pub fn from_parts(status: StatusCode, headers: &HeaderMap, basename: &str) -> Self {
        let location = headers
            .get(LOCATION)
            .and_then(|v| v.to_str().ok())
            .unwrap_or_default();
        let redirect = if basename.is_empty() || basename == "/" {
            location.to_string()
        } else {
            strip_basename(location, basename).unwrap_or(location).to_string()
        };
        Self {
            redirect,
            status: status.as_u16(),
            revalidate: headers.contains_key(X_REMIX_REVALIDATE) || headers.contains_key(SET_COOKIE),
            reload: headers.contains_key(RELOAD_DOCUMENT_HEADER),
            replace: headers.contains_key(X_REMIX_REPLACE),
        }
    }

    fn to_handoff(&self) -> HandoffValue {
        HandoffValue::Json(serde_json::to_value(self).unwrap_or_default())
    }
}

/// Wrap a result as a streamed single-fetch response.
pub fn generate_single_fetch_response(
    request: &RequestInfo,
    build: &ServerBuild,
    mode: ServerMode,
    result: HandoffValue,
    mut headers: HeaderMap,
    status: StatusCode,
) -> Response<Body> {
    headers.insert(X_REMIX_RESPONSE, HeaderValue::from_static("yes"));
    if is_bodyless_status(status) {
        return response::empty(status, headers);
    }
    headers.insert(CONTENT_TYPE, HeaderValue::from_static(TEXT_X_SCRIPT));
    headers.remove(CONTENT_LENGTH);

    let timeout = build.entry.stream_timeout.unwrap_or(DEFAULT_STREAM_TIMEOUT);
    let body = encode(result, request.signal.clone(), timeout, mode);
    response::with_parts(status, headers, body)
}

/// Re-encode a redirect so the client performs it. Redirects out of loaders
/// are wrapped under [`REDIRECT_KEY`]; action redirects are not.
pub fn redirect_response(
    redirect: Response<Body>,
    request: &RequestInfo,
    build: &ServerBuild,
    mode: ServerMode,
) -> Response<Body> {
    let descriptor = SingleFetchRedirect::from_parts(redirect.status(), redirect.headers(), &build.basename);
    let mut headers = redirect.headers().clone();
    headers.remove(LOCATION);

    let result = if request.method == Method::GET {
        HandoffValue::map([(REDIRECT_KEY, descriptor.to_handoff())])
    } else {
        descriptor.to_handoff()
    };
    generate_single_fetch_response(request, build, mode, result, headers, SINGLE_FETCH_REDIRECT_STATUS)
}

/// Redirect status with a target: hand back an empty redirect for the
/// dispatcher to re-encode.
fn context_redirect(ctx: &StaticHandlerContext, headers: &HeaderMap) -> Option<Response<Body>> {
    (is_redirect_status(ctx.status_code) && headers.contains_key(LOCATION))
        .then(|| response::empty(ctx.status_code, headers.clone()))
}

/// Run the matched loaders. `handler_request` points at the path without
/// its `.data` suffix.
pub async fn single_fetch_loaders(
    scope: &Scope<'_>,
    handler_request: &RequestInfo,
    body: Bytes,
    options: QueryOptions,
) -> Response<Body> {
    let Scope { build, mode, request, .. } = *scope;
    let load_ids: Option<HashSet<String>> = request
        .query_param(ROUTES_PARAM)
        .map(|ids| ids.split(',').map(str::to_string).collect());
    let options = QueryOptions {
        filter_route_ids: load_ids.clone(),
        skip_loader_error_bubbling: true,
        ..options
    };

    let mut ctx = match scope.static_handler.query(handler_request, body, options).await {
        Ok(QueryResult::Response(res)) => return res,
        Ok(QueryResult::Context(ctx)) => ctx,
        Err(thrown) => return query_error(scope, thrown),
    };

    let headers = document_headers(&ctx);
    if let Some(res) = context_redirect(&ctx, &headers) {
        return res;
    }
    scope.reporter.report_and_sanitize(&mut ctx, mode);

    let loaded: HashSet<&str> = ctx
        .matches
        .iter()
        .filter(|m| match &load_ids {
            Some(ids) => ids.contains(&m.route.id),
            None => m.route.module.loader.is_some(),
        })
        .map(|m| m.route.id.as_str())
        .collect();

    let mut results: BTreeMap<String, HandoffValue> = BTreeMap::new();
    for (id, error) in ctx.errors.iter().flatten() {
        results.insert(id.clone(), HandoffValue::map([("error", HandoffValue::Error(error.clone()))]));
    }
    for (id, data) in &ctx.loader_data {
        if !results.contains_key(id) && loaded.contains(id.as_str()) {
            results.insert(id.clone(), HandoffValue::map([("data", data.clone())]));
        }
    }

    generate_single_fetch_response(request, build, mode, HandoffValue::Map(results), headers, ctx.status_code)
}

/// Run the one action a submission targets; loaders do not revalidate.
pub async fn single_fetch_action(
    scope: &Scope<'_>,
    handler_request: &RequestInfo,
    body: Bytes,
    options: QueryOptions,
) -> Response<Body> {
    let Scope { build, mode, request, .. } = *scope;
    let options = QueryOptions {
        skip_loader_error_bubbling: true,
        skip_revalidation: true,
        ..options
    };

    let mut ctx = match scope.static_handler.query(handler_request, body, options).await {
        Ok(QueryResult::Response(res)) => return res,
        Ok(QueryResult::Context(ctx)) => ctx,
        Err(thrown) => return query_error(scope, thrown),
    };

    let headers = document_headers(&ctx);
    if let Some(res) = context_redirect(&ctx, &headers) {
        return res;
    }
    scope.reporter.report_and_sanitize(&mut ctx, mode);

    let first_error = ctx.ordered_errors().first().map(|(_, e)| (*e).clone());
    let result = match first_error {
        Some(error) => HandoffValue::map([("error", HandoffValue::Error(error))]),
        None => {
            let data = ctx
                .action_data
                .as_ref()
                .and_then(|data| data.values().next().cloned())
                .unwrap_or_else(HandoffValue::null);
            HandoffValue::map([("data", data)])
        }
    };

    generate_single_fetch_response(request, build, mode, result, headers, ctx.status_code)
}

/// The pipeline itself failed: report it and send the error as the payload.
fn query_error(scope: &Scope<'_>, thrown: Thrown) -> Response<Body> {
    scope.reporter.report_thrown(&thrown);
    let error: RouteError = sanitize_route_error(thrown.into_route_error(), scope.mode);
    generate_single_fetch_response(
        scope.request,
        scope.build,
        scope.mode,
        HandoffValue::map([("error", HandoffValue::Error(error))]),
        HeaderMap::new(),
        StatusCode::INTERNAL_SERVER_ERROR,
    )
}
