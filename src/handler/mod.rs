//! Request dispatcher.
//!
//! # Data Flow
//! ```text
//! Request<Body> + InitialContext
//!     → BuildSource::load (static Arc or factory)
//!     → derive.rs (route tree, static handler, error handler; cached per build)
//!     → classify.rs (normalized path, SPA mode, strategy)
//!     → one of:
//!         manifest.rs      route manifest patches
//!         single_fetch.rs  loader/action data, redirects as 202 payloads
//!         resource.rs      one route's raw response
//!         document.rs      data pipeline + two-pass render
//!     → HEAD: same status and headers, empty body
//! ```
//!
//! # Design Decisions
//! - The handler never panics on a request path; every failure becomes a response
//! - Every reportable error goes through one `ErrorReporter`
//! - Derived state is replaced wholesale, never mutated in place

pub mod classify;
pub mod derive;
pub mod document;
pub mod headers;
pub mod manifest;
pub mod report;
pub mod resource;
pub mod single_fetch;

use axum::body::{Body, Bytes};
use axum::http::{Method, Request, Response, StatusCode};

use crate::build::{
    BuildSource, CriticalCss, DataRequestArgs, DevServerHooks, Params, ServerBuild, ServerMode,
};
use crate::data::{
    create_load_context, is_mutation_method, InitialContext, LoadContext, QueryOptions, StaticHandler,
};
use crate::errors::{last_resort_response, DispatchError, ErrorResponse, RouteError, SerializedError};
use crate::http::request::{read_body, BodyError, RequestInfo, DEFAULT_MAX_BODY_BYTES};
use crate::http::response::{self, is_redirect_response, strip_body};

pub use classify::{classify, Classification, Strategy, SPA_MODE_HEADER};
pub use derive::{resolve_derived_state, DerivedState, DerivedStateCache};
pub use report::{default_error_handler, ErrorReporter};
pub use single_fetch::SINGLE_FETCH_REDIRECT_STATUS;

/// What every strategy needs to know about the request being handled.
#[derive(Clone, Copy)]
pub struct Scope<'a> {
    pub build: &'a ServerBuild,
    pub mode: ServerMode,
    pub static_handler: &'a dyn StaticHandler,
    pub reporter: &'a ErrorReporter,
    pub request: &'a RequestInfo,
}

/// Dispatches requests against a server build.
pub struct RequestHandler {
    source: BuildSource,
    mode: ServerMode,
    cache: DerivedStateCache,
    dev_hooks: Option<DevServerHooks>,
    build_time_requests: bool,
    body_limit: usize,
}

impl RequestHandler {
    pub fn new(source: impl Into<BuildSource>, mode: ServerMode) -> Self {
        Self {
            source: source.into(),
            mode,
            cache: DerivedStateCache::new(),
            dev_hooks: None,
            build_time_requests: false,
            body_limit: DEFAULT_MAX_BODY_BYTES,
        }
    }

    pub fn with_dev_hooks(mut self, hooks: DevServerHooks) -> Self {
        self.dev_hooks = Some(hooks);
        self
    }

    /// Honor the SPA-mode header sent by build-time prerendering.
    pub fn with_build_time_requests(mut self, enabled: bool) -> Self {
        self.build_time_requests = enabled;
        self
    }

    /// Cap on buffered action and resource bodies; larger ones get a 413.
    pub fn with_body_limit(mut self, limit: usize) -> Self {
        self.body_limit = limit;
        self
    }

    pub fn mode(&self) -> ServerMode {
        self.mode
    }

    pub async fn handle(&self, request: Request<Body>, initial: InitialContext) -> Response<Body> {
        let is_head = request.method() == Method::HEAD;
        let res = self.dispatch(request, initial).await;
        if is_head {
            strip_body(res)
        } else {
            res
        }
    }

    async fn dispatch(&self, request: Request<Body>, initial: InitialContext) -> Response<Body> {
        let info = RequestInfo::from_request(&request);

        let build = match self.source.load().await {
            Ok(build) => build,
            Err(err) => {
                ErrorReporter::new(default_error_handler(self.mode), self.mode, self.dev_hooks.as_ref(), info)
                    .report_dispatch(&err);
                return last_resort_response(&err, self.mode);
            }
        };
        let derived = self.cache.resolve(build, self.mode, self.source.is_dynamic());
        let mut reporter = ErrorReporter::new(
            derived.error_handler.clone(),
            self.mode,
            self.dev_hooks.as_ref(),
            info.clone(),
        );

        let load_context = match create_load_context(initial, derived.build.future.v8_middleware) {
            Ok(ctx) => ctx,
            Err(err) => {
                reporter.report_dispatch(&err);
                return last_resort_response(&err, self.mode);
            }
        };
        reporter.set_load_context(load_context.clone());

        let build_time_spa = self.build_time_requests
            && info
                .headers
                .get(SPA_MODE_HEADER)
                .map(|v| v.as_bytes() == b"yes")
                .unwrap_or(false);

        let classification = match classify(&derived.build, &derived.routes, &info, build_time_spa) {
            Ok(c) => c,
            Err(err) => {
                let refusal = ErrorResponse::with_status_text(404, "Not Found", err.to_string());
                reporter.notify(&RouteError::Response(refusal));
                return response::text(StatusCode::NOT_FOUND, "Not Found");
            }
        };

        // Loaders and the manifest never see a body.
        let body = if !matches!(classification.strategy, Strategy::Manifest)
            && is_mutation_method(&info.method)
        {
            match read_body(&info.headers, request.into_body(), self.body_limit).await {
                Ok(body) => body,
                Err(BodyError::TooLarge { limit }) => {
                    tracing::debug!(path = %info.path(), limit, "Request body too large");
                    return response::text(StatusCode::PAYLOAD_TOO_LARGE, "Payload Too Large");
                }
                Err(err) => {
                    let err = DispatchError::Body(err.to_string());
                    reporter.report_dispatch(&err);
                    return last_resort_response(&err, self.mode);
                }
            }
        } else {
            Bytes::new()
        };

        let params = classification
            .matches
            .as_ref()
            .and_then(|m| m.last())
            .map(|m| m.params.clone())
            .unwrap_or_default();
        reporter.set_params(params.clone());

        let scope = Scope {
            build: &derived.build,
            mode: self.mode,
            static_handler: derived.static_handler.as_ref(),
            reporter: &reporter,
            request: &info,
        };

        match classification.strategy {
            Strategy::Manifest => {
                match manifest::handle_manifest_request(&derived.build, &derived.routes, &info) {
                    Ok(res) => res,
                    Err(err) => {
                        reporter.report(&RouteError::Error(SerializedError::from_error(&err)));
                        response::text(StatusCode::INTERNAL_SERVER_ERROR, "Unknown Server Error")
                    }
                }
            }
            Strategy::SingleFetch => {
                self.single_fetch(&scope, &classification.normalized_path, body, load_context, params)
                    .await
            }
            Strategy::Resource { route_id } => {
                resource::handle_resource_request(&scope, route_id, body, load_context).await
            }
            Strategy::Document => {
                let critical_css = self.critical_css(&derived.build, info.path()).await;
                document::handle_document_request(
                    &scope,
                    body,
                    load_context,
                    classification.is_spa_mode,
                    critical_css,
                )
                .await
            }
        }
    }

    async fn single_fetch(
        &self,
        scope: &Scope<'_>,
        normalized_path: &str,
        body: Bytes,
        load_context: LoadContext,
        params: Params,
    ) -> Response<Body> {
        let handler_request = scope.request.with_path(normalized_path);
        let options = QueryOptions::new(load_context.clone());
        let mut res = if scope.request.method == Method::GET {
            single_fetch::single_fetch_loaders(scope, &handler_request, body, options).await
        } else {
            single_fetch::single_fetch_action(scope, &handler_request, body, options).await
        };
        if is_redirect_response(&res) {
            res = single_fetch::redirect_response(res, scope.request, scope.build, scope.mode);
        }

        if let Some(hook) = &scope.build.entry.handle_data_request {
            let args = DataRequestArgs {
                request: scope.request.clone(),
                params,
                context: load_context,
            };
            res = hook(res, args).await;
            if is_redirect_response(&res) {
                res = single_fetch::redirect_response(res, scope.request, scope.build, scope.mode);
            }
        }
        res
    }

    /// Build hook first, then the entry module's, then the dev server's.
    async fn critical_css(&self, build: &ServerBuild, pathname: &str) -> Option<CriticalCss> {
        let dev_hook = self
            .dev_hooks
            .as_ref()
            .filter(|_| self.mode == ServerMode::Development)
            .and_then(|hooks| hooks.get_critical_css.as_ref());
        let hook = build
            .get_critical_css
            .as_ref()
            .or(build.entry.get_critical_css.as_ref())
            .or(dev_hook)?;
        hook(pathname.to_string()).await
    }
}
