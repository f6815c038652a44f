//! HTTP server setup and configuration.
//!
//! # Responsibilities
//! - Mount the request dispatcher as the fallback for every path
//! - Wire up middleware (tracing, timeout, request ID)
//! - Tie each request to a cancellation token that fires on disconnect
//! - Record request metrics
//! - Serve with graceful shutdown and a drain deadline

use std::future::IntoFuture;
use std::sync::Arc;
use std::time::{Duration, Instant};

use axum::body::{Body, HttpBody};
use axum::extract::State;
use axum::http::{Request, Response};
use axum::Router;
use futures_util::StreamExt;
use tokio::net::TcpListener;
use tokio_util::sync::{CancellationToken, DropGuard};
use tower_http::request_id::{PropagateRequestIdLayer, SetRequestIdLayer};
use tower_http::timeout::TimeoutLayer;
use tower_http::trace::TraceLayer;

use crate::config::ServerConfig;
use crate::data::InitialContext;
use crate::handler::RequestHandler;
use crate::http::request::{MakeRequestUuid, X_REQUEST_ID};
use crate::lifecycle::Shutdown;
use crate::observability::metrics;

/// Builds the initial load context for a request.
pub type ContextFactory = Arc<dyn Fn(&Request<Body>) -> InitialContext + Send + Sync>;

/// Application state injected into the dispatch handler.
#[derive(Clone)]
pub struct AppState {
    pub handler: Arc<RequestHandler>,
    pub context: ContextFactory,
}

/// HTTP server for the SSR dispatcher.
pub struct HttpServer {
    state: AppState,
    request_timeout: Duration,
    shutdown_timeout: Duration,
}

impl HttpServer {
    pub fn new(config: &ServerConfig, handler: RequestHandler) -> Self {
        Self {
            state: AppState {
                handler: Arc::new(handler),
                context: Arc::new(|_| InitialContext::None),
            },
            request_timeout: Duration::from_secs(config.timeouts.request_secs),
            shutdown_timeout: Duration::from_secs(config.timeouts.shutdown_secs),
        }
    }

    /// Supply a per-request load context (e.g. values from the host app).
    pub fn with_context<F>(mut self, f: F) -> Self
    where
        F: Fn(&Request<Body>) -> InitialContext + Send + Sync + 'static,
    {
        self.state.context = Arc::new(f);
        self
    }

    /// Build the Axum router with all middleware layers.
    #[allow(deprecated)]
    pub fn router(&self) -> Router {
        Router::new()
            .fallback(dispatch)
            .with_state(self.state.clone())
            .layer(TimeoutLayer::new(self.request_timeout))
            .layer(PropagateRequestIdLayer::x_request_id())
            .layer(TraceLayer::new_for_http().make_span_with(|request: &Request<Body>| {
                let request_id = request
                    .headers()
                    .get(X_REQUEST_ID)
                    .and_then(|v| v.to_str().ok())
                    .unwrap_or("unknown");
                tracing::info_span!(
                    "request",
                    method = %request.method(),
                    path = %request.uri().path(),
                    request_id = %request_id,
                )
            }))
            .layer(SetRequestIdLayer::x_request_id(MakeRequestUuid))
    }

    /// Run the server until `shutdown` fires, then drain for at most the
    /// configured deadline.
    pub async fn run(self, listener: TcpListener, shutdown: Shutdown) -> Result<(), std::io::Error> {
        let addr = listener.local_addr()?;
        tracing::info!(
            address = %addr,
            mode = %self.state.handler.mode(),
            "HTTP server starting"
        );

        let drain_started = shutdown.wait();
        let server = axum::serve(listener, self.router())
            .with_graceful_shutdown(shutdown.wait())
            .into_future();
        let deadline = async {
            drain_started.await;
            tokio::time::sleep(self.shutdown_timeout).await;
        };

        tokio::select! {
            res = server => res?,
            _ = deadline => tracing::warn!(
                timeout = ?self.shutdown_timeout,
                "Drain deadline passed, dropping in-flight requests"
            ),
        }

        tracing::info!("HTTP server stopped");
        Ok(())
    }
}

/// Keep the token alive until a streaming body is finished or dropped.
fn guard_body(body: Body, guard: DropGuard) -> Body {
    if body.size_hint().exact().is_some() {
        return body;
    }
    let mut stream = body.into_data_stream();
    Body::from_stream(async_stream::stream! {
        let _guard = guard;
        while let Some(chunk) = stream.next().await {
            yield chunk;
        }
    })
}

async fn dispatch(State(state): State<AppState>, mut request: Request<Body>) -> Response<Body> {
    let start = Instant::now();
    let method = request.method().to_string();

    let token = CancellationToken::new();
    let guard = token.clone().drop_guard();
    request.extensions_mut().insert(token);

    let initial = (state.context)(&request);
    let res = state.handler.handle(request, initial).await;
    metrics::record_request(&method, res.status().as_u16(), start);

    let (parts, body) = res.into_parts();
    Response::from_parts(parts, guard_body(body, guard))
}
