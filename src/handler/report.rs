//! The single reporting path for errors raised while handling a request.

use std::sync::Arc;

use crate::build::{DevServerHooks, ErrorContext, HandleErrorFunction, Params, ServerMode};
use crate::data::{LoadContext, StaticHandlerContext};
use crate::errors::{sanitize_errors, DispatchError, RouteError, SerializedError, Thrown};
use crate::http::request::RequestInfo;

/// Logs through `tracing`; silent in test mode and for aborted requests.
pub fn default_error_handler(mode: ServerMode) -> HandleErrorFunction {
    Arc::new(move |error: &RouteError, ctx: &ErrorContext| {
        if mode == ServerMode::Test || ctx.request.is_aborted() {
            return;
        }
        let path = ctx.request.path();
        match error {
            RouteError::Response(e) => match &e.error {
                Some(cause) => tracing::error!(
                    path = %path,
                    status = e.status,
                    error = %cause.message,
                    stack = cause.stack.as_deref().unwrap_or_default(),
                    "Route error"
                ),
                None => tracing::error!(
                    path = %path,
                    status = e.status,
                    status_text = %e.status_text,
                    "Route error response"
                ),
            },
            RouteError::Error(e) => tracing::error!(
                path = %path,
                error = %e.message,
                stack = e.stack.as_deref().unwrap_or_default(),
                "Unhandled server error"
            ),
        }
    })
}

/// Routes every reportable error of one request to the configured handler,
/// and in development to the dev server first.
#[derive(Clone)]
pub struct ErrorReporter {
    handler: HandleErrorFunction,
    process_request_error: Option<Arc<dyn Fn(&RouteError) + Send + Sync>>,
    context: ErrorContext,
}

impl ErrorReporter {
    pub fn new(
        handler: HandleErrorFunction,
        mode: ServerMode,
        dev_hooks: Option<&DevServerHooks>,
        request: RequestInfo,
    ) -> Self {
        let process_request_error = dev_hooks
            .filter(|_| mode == ServerMode::Development)
            .and_then(|hooks| hooks.process_request_error.clone());
        Self {
            handler,
            process_request_error,
            context: ErrorContext {
                request,
                params: Params::new(),
                context: LoadContext::default(),
            },
        }
    }

    pub fn set_params(&mut self, params: Params) {
        self.context.params = params;
    }

    pub fn set_load_context(&mut self, context: LoadContext) {
        self.context.context = context;
    }

    pub fn report(&self, error: &RouteError) {
        if let Some(hook) = &self.process_request_error {
            hook(error);
        }
        (self.handler)(error, &self.context);
    }

    /// Bypass the dev hook; used for refusals that are not request failures.
    pub fn notify(&self, error: &RouteError) {
        (self.handler)(error, &self.context);
    }

    pub fn report_thrown(&self, thrown: &Thrown) {
        self.report(&thrown.to_route_error());
    }

    pub fn report_dispatch(&self, error: &DispatchError) {
        self.report(&RouteError::Error(SerializedError::from_error(error)));
    }

    /// Report what the pipeline captured, then strip it for the client.
    pub fn report_and_sanitize(&self, ctx: &mut StaticHandlerContext, mode: ServerMode) {
        if let Some(errors) = ctx.errors.take() {
            for error in errors.values().filter(|e| e.is_reportable()) {
                self.report(error);
            }
            ctx.errors = Some(sanitize_errors(errors, mode));
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::body::Body;
    use axum::http::Request;
    use std::sync::Mutex;

    fn request() -> RequestInfo {
        RequestInfo::from_request(&Request::builder().uri("/x").body(Body::empty()).unwrap())
    }

    #[test]
    fn test_dev_hook_only_in_development() {
        let seen = Arc::new(Mutex::new(Vec::new()));
        let dev_seen = Arc::new(Mutex::new(0usize));

        let s = seen.clone();
        let handler: HandleErrorFunction = Arc::new(move |err: &RouteError, ctx: &ErrorContext| {
            s.lock().unwrap().push((err.clone(), ctx.params.clone()));
        });
        let d = dev_seen.clone();
        let hooks = DevServerHooks::new().with_request_error_hook(move |_| *d.lock().unwrap() += 1);

        let mut reporter = ErrorReporter::new(handler.clone(), ServerMode::Development, Some(&hooks), request());
        reporter.set_params(Params::from([("id".to_string(), "7".to_string())]));
        reporter.report_thrown(&Thrown::message("boom"));
        assert_eq!(*dev_seen.lock().unwrap(), 1);
        assert_eq!(seen.lock().unwrap()[0].1["id"], "7");

        let reporter = ErrorReporter::new(handler, ServerMode::Production, Some(&hooks), request());
        reporter.report_dispatch(&DispatchError::MissingResourceResponse);
        assert_eq!(*dev_seen.lock().unwrap(), 1);
        assert_eq!(seen.lock().unwrap().len(), 2);
    }
}
