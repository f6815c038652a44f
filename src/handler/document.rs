//! Document requests: run the data pipeline, then render HTML, re-rendering
//! once at an error boundary if the first render throws.
//!
//! # Responsibilities
//! - Merge route headers and skip the body for bodyless statuses
//! - Report captured errors, then sanitize them before they reach the page
//! - Build a fresh `EntryContext` per pass with its own hand-off stream
//!
//! # Design Decisions
//! - The render function runs at most twice; the states are explicit
//! - A failure inside the data pipeline is an empty 500 with no render

use axum::body::{Body, Bytes};
use axum::http::{HeaderMap, Response, StatusCode};

use crate::build::{CriticalCss, EntryContext, RenderArgs, RenderMeta, RenderPass};
use crate::data::{error_response_from, LoadContext, QueryOptions, QueryResult, StaticHandlerContext};
use crate::errors::{last_resort_response, sanitize_errors, serialize_errors, RouteError, Thrown};
use crate::handoff::{encode, server_handoff_string, HandoffValue, ServerHandoff, DEFAULT_STREAM_TIMEOUT};
use crate::http::response::{self, is_bodyless_status};

use super::headers::document_headers;
use super::Scope;

enum RenderState {
    First(StaticHandlerContext),
    /// The first render threw; attribute the error to a boundary.
    Recover {
        context: StaticHandlerContext,
        thrown: Thrown,
    },
    Second(StaticHandlerContext),
    Failed(Thrown),
}

struct DocumentRender<'a> {
    scope: &'a Scope<'a>,
    headers: HeaderMap,
    load_context: LoadContext,
    is_spa_mode: bool,
    critical_css: Option<CriticalCss>,
}

impl DocumentRender<'_> {
    fn handoff_state(&self, ctx: &StaticHandlerContext) -> HandoffValue {
        let action_data = ctx
            .action_data
            .clone()
            .map(HandoffValue::Map)
            .unwrap_or_else(HandoffValue::null);
        HandoffValue::map([
            ("loaderData", HandoffValue::Map(ctx.loader_data.clone())),
            ("actionData", action_data),
            (
                "errors",
                HandoffValue::Json(serialize_errors(ctx.errors.as_ref(), self.scope.mode)),
            ),
        ])
    }

    fn entry_context(&self, ctx: StaticHandlerContext, pass: RenderPass) -> EntryContext {
        let build = self.scope.build;
        // Critical CSS is inlined on the first pass only.
        let critical_css = self.critical_css.as_ref().filter(|_| pass == RenderPass::First);
        let handoff = ServerHandoff {
            basename: &build.basename,
            future: &build.future,
            route_discovery: &build.route_discovery,
            ssr: build.ssr,
            is_spa_mode: self.is_spa_mode,
            critical_css,
        };
        let stream = encode(
            self.handoff_state(&ctx),
            self.scope.request.signal.clone(),
            build.entry.stream_timeout.unwrap_or(DEFAULT_STREAM_TIMEOUT),
            self.scope.mode,
        );

        EntryContext {
            manifest: build.assets.clone(),
            route_modules: build.routes.clone(),
            static_handler_context: ctx,
            critical_css: self.critical_css.clone(),
            server_handoff_string: server_handoff_string(&handoff),
            server_handoff_stream: Some(stream),
            render_meta: RenderMeta::new(pass),
            future: build.future,
            ssr: build.ssr,
            route_discovery: build.route_discovery.clone(),
            is_spa_mode: self.is_spa_mode,
            server_mode: self.scope.mode,
        }
    }

    async fn render(&self, ctx: StaticHandlerContext, pass: RenderPass) -> Result<Response<Body>, Thrown> {
        let status = ctx.status_code;
        let args = RenderArgs {
            request: self.scope.request.clone(),
            status,
            headers: self.headers.clone(),
            context: self.entry_context(ctx, pass),
            load_context: self.load_context.clone(),
        };
        self.scope.build.entry.render.render(args).await
    }

    async fn run(&self, ctx: StaticHandlerContext) -> Response<Body> {
        let mode = self.scope.mode;
        let mut state = RenderState::First(ctx);
        loop {
            state = match state {
                RenderState::First(ctx) => match self.render(ctx.clone(), RenderPass::First).await {
                    Ok(res) => return res,
                    Err(thrown) => {
                        self.scope.reporter.report_thrown(&thrown);
                        RenderState::Recover { context: ctx, thrown }
                    }
                },
                RenderState::Recover { context, thrown } => {
                    let error = match thrown {
                        Thrown::Response(res) => RouteError::Response(error_response_from(res).await),
                        other => other.into_route_error(),
                    };
                    let mut context = self.scope.static_handler.static_context_from_error(context, error);
                    if let Some(errors) = context.errors.take() {
                        context.errors = Some(sanitize_errors(errors, mode));
                    }
                    RenderState::Second(context)
                }
                RenderState::Second(ctx) => match self.render(ctx, RenderPass::Recovery).await {
                    Ok(res) => return res,
                    Err(thrown) => {
                        self.scope.reporter.report_thrown(&thrown);
                        RenderState::Failed(thrown)
                    }
                },
                RenderState::Failed(thrown) => return last_resort_response(&thrown, mode),
            };
        }
    }
}

pub async fn handle_document_request(
    scope: &Scope<'_>,
    body: Bytes,
    load_context: LoadContext,
    is_spa_mode: bool,
    critical_css: Option<CriticalCss>,
) -> Response<Body> {
    let options = QueryOptions {
        load_data: !is_spa_mode,
        ..QueryOptions::new(load_context.clone())
    };
    let mut ctx = match scope.static_handler.query(scope.request, body, options).await {
        Ok(QueryResult::Response(res)) => return res,
        Ok(QueryResult::Context(ctx)) => ctx,
        Err(thrown) => {
            scope.reporter.report_thrown(&thrown);
            return response::empty(StatusCode::INTERNAL_SERVER_ERROR, HeaderMap::new());
        }
    };

    let headers = document_headers(&ctx);
    if is_bodyless_status(ctx.status_code) {
        return response::empty(ctx.status_code, headers);
    }
    scope.reporter.report_and_sanitize(&mut ctx, scope.mode);

    DocumentRender {
        scope,
        headers,
        load_context,
        is_spa_mode,
        critical_css,
    }
    .run(ctx)
    .await
}
