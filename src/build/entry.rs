//! The embedding application's entry module and the context it renders with.
//!
//! # Responsibilities
//! - Define the document render seam (`HandleDocumentRequest`)
//! - Define the optional hooks: error reporting, data-response rewriting,
//!   critical CSS
//! - Carry everything a render needs in one owned `EntryContext`

use std::future::Future;
use std::sync::Arc;
use std::time::{Duration, SystemTime};

use async_trait::async_trait;
use axum::body::Body;
use axum::http::{HeaderMap, Response, StatusCode};
use futures_util::future::BoxFuture;
use futures_util::FutureExt;
use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::data::{LoadContext, StaticHandlerContext};
use crate::errors::{serialize_error, RouteError, SerializedError, Thrown};
use crate::http::request::RequestInfo;

use super::assets::AssetsManifest;
use super::route::{Params, RouteManifest};
use super::{FutureConfig, RouteDiscovery, ServerMode};

pub struct RenderArgs {
    pub request: RequestInfo,
    pub status: StatusCode,
    pub headers: HeaderMap,
    pub context: EntryContext,
    pub load_context: LoadContext,
}

/// Turns an entry context into the HTML document response.
#[async_trait]
pub trait HandleDocumentRequest: Send + Sync {
    async fn render(&self, args: RenderArgs) -> Result<Response<Body>, Thrown>;
}

#[async_trait]
impl<F, Fut> HandleDocumentRequest for F
where
    F: Fn(RenderArgs) -> Fut + Send + Sync,
    Fut: Future<Output = Result<Response<Body>, Thrown>> + Send + 'static,
{
    async fn render(&self, args: RenderArgs) -> Result<Response<Body>, Thrown> {
        (self)(args).await
    }
}

/// What an error handler gets to see besides the error.
#[derive(Clone)]
pub struct ErrorContext {
    pub request: RequestInfo,
    pub params: Params,
    pub context: LoadContext,
}

pub type HandleErrorFunction = Arc<dyn Fn(&RouteError, &ErrorContext) + Send + Sync>;

pub struct DataRequestArgs {
    pub request: RequestInfo,
    pub params: Params,
    pub context: LoadContext,
}

pub type HandleDataRequest =
    Arc<dyn Fn(Response<Body>, DataRequestArgs) -> BoxFuture<'static, Response<Body>> + Send + Sync>;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CriticalCssLink {
    pub rel: String,
    pub href: String,
}

/// Inline styles or stylesheet links rendered ahead of the app.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum CriticalCss {
    Inline(String),
    Links(Vec<CriticalCssLink>),
}

/// Called with the request pathname.
pub type GetCriticalCss = Arc<dyn Fn(String) -> BoxFuture<'static, Option<CriticalCss>> + Send + Sync>;

#[derive(Clone)]
pub struct EntryModule {
    pub render: Arc<dyn HandleDocumentRequest>,
    pub handle_error: Option<HandleErrorFunction>,
    pub handle_data_request: Option<HandleDataRequest>,
    pub stream_timeout: Option<Duration>,
    pub get_critical_css: Option<GetCriticalCss>,
}

impl EntryModule {
    pub fn new(render: impl HandleDocumentRequest + 'static) -> Self {
        Self {
            render: Arc::new(render),
            handle_error: None,
            handle_data_request: None,
            stream_timeout: None,
            get_critical_css: None,
        }
    }

    /// Renders an empty document with whatever status and headers it is given.
    pub fn empty() -> Self {
        Self::new(|args: RenderArgs| async move {
            let mut res = Response::new(Body::empty());
            *res.status_mut() = args.status;
            *res.headers_mut() = args.headers;
            Ok::<_, Thrown>(res)
        })
    }

    pub fn with_error_handler<F>(mut self, f: F) -> Self
    where
        F: Fn(&RouteError, &ErrorContext) + Send + Sync + 'static,
    {
        self.handle_error = Some(Arc::new(f));
        self
    }

    pub fn with_data_request_handler<F, Fut>(mut self, f: F) -> Self
    where
        F: Fn(Response<Body>, DataRequestArgs) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = Response<Body>> + Send + 'static,
    {
        self.handle_data_request = Some(Arc::new(move |res, args| f(res, args).boxed()));
        self
    }

    pub fn with_stream_timeout(mut self, timeout: Duration) -> Self {
        self.stream_timeout = Some(timeout);
        self
    }

    pub fn with_critical_css<F, Fut>(mut self, f: F) -> Self
    where
        F: Fn(String) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = Option<CriticalCss>> + Send + 'static,
    {
        self.get_critical_css = Some(Arc::new(move |path| f(path).boxed()));
        self
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RenderPass {
    First,
    /// Re-render after the first pass threw, with the error at a boundary.
    Recovery,
}

#[derive(Debug, Clone, Copy)]
pub struct RenderMeta {
    pub pass: RenderPass,
    pub created_at: SystemTime,
}

impl RenderMeta {
    pub fn new(pass: RenderPass) -> Self {
        Self {
            pass,
            created_at: SystemTime::now(),
        }
    }
}

/// Everything handed to the render function; built fresh for each pass.
pub struct EntryContext {
    pub manifest: Arc<AssetsManifest>,
    pub route_modules: RouteManifest,
    pub static_handler_context: StaticHandlerContext,
    pub critical_css: Option<CriticalCss>,
    pub server_handoff_string: String,
    pub server_handoff_stream: Option<Body>,
    pub render_meta: RenderMeta,
    pub future: FutureConfig,
    pub ssr: bool,
    pub route_discovery: RouteDiscovery,
    pub is_spa_mode: bool,
    pub server_mode: ServerMode,
}

impl EntryContext {
    /// The NDJSON hand-off stream; can only be taken once.
    pub fn take_handoff_stream(&mut self) -> Option<Body> {
        self.server_handoff_stream.take()
    }

    /// Called while rendering an error boundary so a recovery pass can target it.
    pub fn record_rendered_boundary(&self, route_id: &str) {
        self.static_handler_context.rendered_boundary.record(route_id);
    }

    pub fn serialize_error(&self, err: &SerializedError) -> Value {
        serialize_error(err, self.server_mode)
    }
}

/// Development-only hooks installed by a dev server.
#[derive(Clone, Default)]
pub struct DevServerHooks {
    pub process_request_error: Option<Arc<dyn Fn(&RouteError) + Send + Sync>>,
    pub get_critical_css: Option<GetCriticalCss>,
}

impl DevServerHooks {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_request_error_hook<F>(mut self, f: F) -> Self
    where
        F: Fn(&RouteError) + Send + Sync + 'static,
    {
        self.process_request_error = Some(Arc::new(f));
        self
    }

    pub fn with_critical_css<F, Fut>(mut self, f: F) -> Self
    where
        F: Fn(String) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = Option<CriticalCss>> + Send + 'static,
    {
        self.get_critical_css = Some(Arc::new(move |path| f(path).boxed()));
        self
    }
}
