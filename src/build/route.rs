//! Route definitions: the flat manifest and each route's module.

use std::collections::{BTreeMap, HashMap};
use std::fmt;
use std::future::Future;
use std::sync::Arc;

use axum::body::{Body, Bytes};
use axum::http::{HeaderMap, Response};
use futures_util::future::BoxFuture;
use futures_util::FutureExt;

use crate::data::LoadContext;
use crate::errors::Thrown;
use crate::handoff::HandoffValue;
use crate::http::request::RequestInfo;

/// Decoded path params, merged along the matched branch.
pub type Params = BTreeMap<String, String>;

/// Arguments to loaders, actions, and middleware.
#[derive(Clone)]
pub struct DataFunctionArgs {
    pub request: RequestInfo,
    pub params: Params,
    pub context: LoadContext,
    pub body: Bytes,
}

/// What a loader or action produced.
pub enum DataValue {
    Data(HandoffValue),
    Text(String),
    Response(Response<Body>),
    /// The function ran but returned nothing.
    Empty,
}

impl fmt::Debug for DataValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            DataValue::Data(v) => f.debug_tuple("Data").field(v).finish(),
            DataValue::Text(s) => f.debug_tuple("Text").field(s).finish(),
            DataValue::Response(r) => f.debug_tuple("Response").field(&r.status()).finish(),
            DataValue::Empty => f.write_str("Empty"),
        }
    }
}

impl From<serde_json::Value> for DataValue {
    fn from(value: serde_json::Value) -> Self {
        DataValue::Data(HandoffValue::Json(value))
    }
}

impl From<HandoffValue> for DataValue {
    fn from(value: HandoffValue) -> Self {
        DataValue::Data(value)
    }
}

impl From<Response<Body>> for DataValue {
    fn from(res: Response<Body>) -> Self {
        DataValue::Response(res)
    }
}

pub type DataFuture = BoxFuture<'static, Result<DataValue, Thrown>>;
pub type DataFunction = Arc<dyn Fn(DataFunctionArgs) -> DataFuture + Send + Sync>;

/// Inputs to a route's `headers` function.
pub struct HeadersArgs<'a> {
    pub loader_headers: &'a HeaderMap,
    pub parent_headers: &'a HeaderMap,
    pub action_headers: &'a HeaderMap,
    pub error_headers: Option<&'a HeaderMap>,
}

pub type HeadersFunction = Arc<dyn Fn(&HeadersArgs<'_>) -> HeaderMap + Send + Sync>;

/// Runs before loaders and actions; `Some(response)` ends the request there.
pub type MiddlewareFunction =
    Arc<dyn Fn(DataFunctionArgs) -> BoxFuture<'static, Result<Option<Response<Body>>, Thrown>> + Send + Sync>;

#[derive(Clone, Default)]
pub struct RouteModule {
    pub has_component: bool,
    pub has_error_boundary: bool,
    pub loader: Option<DataFunction>,
    pub action: Option<DataFunction>,
    pub headers: Option<HeadersFunction>,
    pub middleware: Vec<MiddlewareFunction>,
}

impl RouteModule {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn component(mut self) -> Self {
        self.has_component = true;
        self
    }

    pub fn error_boundary(mut self) -> Self {
        self.has_error_boundary = true;
        self
    }

    pub fn loader<F, Fut>(mut self, f: F) -> Self
    where
        F: Fn(DataFunctionArgs) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = Result<DataValue, Thrown>> + Send + 'static,
    {
        self.loader = Some(Arc::new(move |args| f(args).boxed()));
        self
    }

    pub fn action<F, Fut>(mut self, f: F) -> Self
    where
        F: Fn(DataFunctionArgs) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = Result<DataValue, Thrown>> + Send + 'static,
    {
        self.action = Some(Arc::new(move |args| f(args).boxed()));
        self
    }

    pub fn headers<F>(mut self, f: F) -> Self
    where
        F: Fn(&HeadersArgs<'_>) -> HeaderMap + Send + Sync + 'static,
    {
        self.headers = Some(Arc::new(f));
        self
    }

    pub fn middleware<F, Fut>(mut self, f: F) -> Self
    where
        F: Fn(DataFunctionArgs) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = Result<Option<Response<Body>>, Thrown>> + Send + 'static,
    {
        self.middleware.push(Arc::new(move |args| f(args).boxed()));
        self
    }

    /// Neither UI nor error UI: a resource route.
    pub fn is_resource(&self) -> bool {
        !self.has_component && !self.has_error_boundary
    }
}

#[derive(Clone)]
pub struct ServerRoute {
    pub id: String,
    pub parent_id: Option<String>,
    pub path: Option<String>,
    pub index: bool,
    pub case_sensitive: bool,
    pub module: RouteModule,
}

impl ServerRoute {
    pub fn new(id: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            parent_id: None,
            path: None,
            index: false,
            case_sensitive: false,
            module: RouteModule::default(),
        }
    }

    pub fn parent(mut self, parent_id: impl Into<String>) -> Self {
        self.parent_id = Some(parent_id.into());
        self
    }

    pub fn path(mut self, path: impl Into<String>) -> Self {
        self.path = Some(path.into());
        self
    }

    pub fn index(mut self) -> Self {
        self.index = true;
        self
    }

    pub fn case_sensitive(mut self) -> Self {
        self.case_sensitive = true;
        self
    }

    pub fn module(mut self, module: RouteModule) -> Self {
        self.module = module;
        self
    }
}

impl fmt::Debug for ServerRoute {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ServerRoute")
            .field("id", &self.id)
            .field("parent_id", &self.parent_id)
            .field("path", &self.path)
            .field("index", &self.index)
            .finish_non_exhaustive()
    }
}

/// Routes keyed by id, in insertion order.
#[derive(Clone, Default)]
pub struct RouteManifest {
    routes: Vec<Arc<ServerRoute>>,
    by_id: HashMap<String, usize>,
}

impl RouteManifest {
    pub fn new() -> Self {
        Self::default()
    }

    /// Insert or replace by id; a replaced route keeps its original position.
    pub fn insert(&mut self, route: ServerRoute) {
        match self.by_id.get(&route.id) {
            Some(&idx) => self.routes[idx] = Arc::new(route),
            None => {
                self.by_id.insert(route.id.clone(), self.routes.len());
                self.routes.push(Arc::new(route));
            }
        }
    }

    pub fn with(mut self, route: ServerRoute) -> Self {
        self.insert(route);
        self
    }

    pub fn get(&self, id: &str) -> Option<&Arc<ServerRoute>> {
        self.by_id.get(id).map(|&idx| &self.routes[idx])
    }

    pub fn iter(&self) -> impl Iterator<Item = &Arc<ServerRoute>> {
        self.routes.iter()
    }

    pub fn len(&self) -> usize {
        self.routes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.routes.is_empty()
    }
}

impl FromIterator<ServerRoute> for RouteManifest {
    fn from_iter<I: IntoIterator<Item = ServerRoute>>(iter: I) -> Self {
        let mut manifest = RouteManifest::new();
        for route in iter {
            manifest.insert(route);
        }
        manifest
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_manifest_keeps_insertion_order() {
        let manifest: RouteManifest = vec![
            ServerRoute::new("root").path(""),
            ServerRoute::new("routes/b").parent("root").path("b"),
            ServerRoute::new("routes/a").parent("root").path("a"),
        ]
        .into_iter()
        .collect();

        let ids: Vec<_> = manifest.iter().map(|r| r.id.as_str()).collect();
        assert_eq!(ids, vec!["root", "routes/b", "routes/a"]);

        let manifest = manifest.with(ServerRoute::new("routes/b").parent("root").path("bee"));
        assert_eq!(manifest.len(), 3);
        assert_eq!(manifest.get("routes/b").and_then(|r| r.path.as_deref()), Some("bee"));
        assert_eq!(manifest.iter().nth(1).map(|r| r.id.as_str()), Some("routes/b"));
    }

    #[test]
    fn test_resource_detection() {
        assert!(RouteModule::new().is_resource());
        assert!(!RouteModule::new().component().is_resource());
        assert!(!RouteModule::new().error_boundary().is_resource());
    }
}
