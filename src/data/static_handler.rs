//! The data-pipeline contract the dispatcher drives.

use std::collections::{BTreeMap, HashMap, HashSet};
use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use axum::body::{Body, Bytes};
use axum::http::{HeaderMap, Response, StatusCode};

use crate::build::DataValue;
use crate::errors::{RouteError, Thrown};
use crate::handoff::HandoffValue;
use crate::http::request::RequestInfo;
use crate::routing::RouteMatch;

use super::context::LoadContext;

/// Remembers the deepest error boundary a render reached.
#[derive(Debug, Clone, Default)]
pub struct BoundaryTracker(Arc<Mutex<Option<String>>>);

impl BoundaryTracker {
    pub fn record(&self, route_id: &str) {
        let mut slot = self.0.lock().unwrap_or_else(|e| e.into_inner());
        *slot = Some(route_id.to_string());
    }

    pub fn get(&self) -> Option<String> {
        self.0.lock().unwrap_or_else(|e| e.into_inner()).clone()
    }
}

/// Result of running the data pipeline for one request.
#[derive(Debug, Clone)]
pub struct StaticHandlerContext {
    pub location: String,
    pub matches: Vec<RouteMatch>,
    pub loader_data: BTreeMap<String, HandoffValue>,
    pub action_data: Option<BTreeMap<String, HandoffValue>>,
    pub errors: Option<BTreeMap<String, RouteError>>,
    pub status_code: StatusCode,
    pub loader_headers: HashMap<String, HeaderMap>,
    pub action_headers: HashMap<String, HeaderMap>,
    pub rendered_boundary: BoundaryTracker,
}

impl StaticHandlerContext {
    pub fn new(location: impl Into<String>, matches: Vec<RouteMatch>) -> Self {
        Self {
            location: location.into(),
            matches,
            loader_data: BTreeMap::new(),
            action_data: None,
            errors: None,
            status_code: StatusCode::OK,
            loader_headers: HashMap::new(),
            action_headers: HashMap::new(),
            rendered_boundary: BoundaryTracker::default(),
        }
    }

    /// Errors in match order (root first).
    pub fn ordered_errors(&self) -> Vec<(&str, &RouteError)> {
        let Some(errors) = &self.errors else {
            return Vec::new();
        };
        let mut out: Vec<(&str, &RouteError)> = self
            .matches
            .iter()
            .filter_map(|m| errors.get_key_value(m.route.id.as_str()))
            .map(|(k, v)| (k.as_str(), v))
            .collect();
        for (id, err) in errors {
            if !out.iter().any(|(seen, _)| *seen == id.as_str()) {
                out.push((id.as_str(), err));
            }
        }
        out
    }
}

#[derive(Debug, Clone)]
pub struct QueryOptions {
    pub load_context: LoadContext,
    /// Only run loaders of these routes.
    pub filter_route_ids: Option<HashSet<String>>,
    /// Keep errors at the route that threw instead of its boundary.
    pub skip_loader_error_bubbling: bool,
    /// After an action, do not run loaders.
    pub skip_revalidation: bool,
    /// `false` runs no loaders at all (SPA shells).
    pub load_data: bool,
}

impl QueryOptions {
    pub fn new(load_context: LoadContext) -> Self {
        Self {
            load_context,
            filter_route_ids: None,
            skip_loader_error_bubbling: false,
            skip_revalidation: false,
            load_data: true,
        }
    }
}

#[derive(Debug, Clone)]
pub struct RouteQueryOptions {
    pub route_id: String,
    pub load_context: LoadContext,
}

pub enum QueryResult {
    /// A redirect or middleware short-circuit.
    Response(Response<Body>),
    Context(StaticHandlerContext),
}

/// Runs loaders, actions, and middleware for matched routes.
#[async_trait]
pub trait StaticHandler: Send + Sync {
    async fn query(
        &self,
        request: &RequestInfo,
        body: Bytes,
        options: QueryOptions,
    ) -> Result<QueryResult, Thrown>;

    /// Run exactly one route's loader or action.
    async fn query_route(
        &self,
        request: &RequestInfo,
        body: Bytes,
        options: RouteQueryOptions,
    ) -> Result<DataValue, Thrown>;

    /// Re-target a context at the boundary that should render `error`.
    fn static_context_from_error(
        &self,
        context: StaticHandlerContext,
        error: RouteError,
    ) -> StaticHandlerContext;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_boundary_tracker_is_shared() {
        let ctx = StaticHandlerContext::new("/", Vec::new());
        let copy = ctx.clone();
        assert_eq!(ctx.rendered_boundary.get(), None);
        copy.rendered_boundary.record("routes/a");
        assert_eq!(ctx.rendered_boundary.get().as_deref(), Some("routes/a"));
    }
}
