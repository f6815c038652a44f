//! A small route tree served by the binary: a blog with a JSON API.

use std::convert::Infallible;
use std::time::{Duration, SystemTime, UNIX_EPOCH};

use axum::body::Body;
use axum::http::header::{self, HeaderMap, HeaderValue};
use axum::http::{Response, StatusCode};
use futures_util::StreamExt;
use serde_json::json;

use ssr_dispatch::build::{DataValue, EntryModule, RenderArgs, RouteManifest, RouteModule, ServerRoute};
use ssr_dispatch::errors::{ErrorResponse, SerializedError, Thrown};
use ssr_dispatch::handoff::{escape_html, HandoffValue};
use ssr_dispatch::http::response;

const POSTS: [(&str, &str); 3] = [
    ("hello-world", "Hello, world"),
    ("nested-routes", "Nested routes, explained"),
    ("streaming", "Streaming hand-off data"),
];

fn data(value: serde_json::Value) -> Result<DataValue, Thrown> {
    Ok(value.into())
}

fn redirect(location: &'static str) -> Response<Body> {
    let mut headers = HeaderMap::new();
    headers.insert(header::LOCATION, HeaderValue::from_static(location));
    response::empty(StatusCode::SEE_OTHER, headers)
}

pub fn routes() -> RouteManifest {
    RouteManifest::new()
        .with(
            ServerRoute::new("root").path("").module(
                RouteModule::new()
                    .component()
                    .error_boundary()
                    .loader(|_| async { data(json!({ "site": "ssr-dispatch demo" })) }),
            ),
        )
        .with(
            ServerRoute::new("routes/_index")
                .parent("root")
                .index()
                .module(RouteModule::new().component()),
        )
        .with(
            ServerRoute::new("routes/posts").parent("root").path("posts").module(
                RouteModule::new()
                    .component()
                    .loader(|_| async {
                        let posts: Vec<_> = POSTS
                            .iter()
                            .map(|(slug, title)| json!({ "slug": slug, "title": title }))
                            .collect();
                        // Comment counts arrive after the first byte.
                        let comments = HandoffValue::deferred(async {
                            tokio::time::sleep(Duration::from_millis(200)).await;
                            Ok::<_, SerializedError>(json!({ "hello-world": 3, "streaming": 1 }).into())
                        });
                        Ok::<_, Thrown>(
                            HandoffValue::map([
                                ("posts", HandoffValue::Json(posts.into())),
                                ("comments", comments),
                            ])
                            .into(),
                        )
                    })
                    .action(|_| async { Ok::<_, Thrown>(redirect("/posts/hello-world").into()) }),
            ),
        )
        .with(
            ServerRoute::new("routes/posts.$slug")
                .parent("routes/posts")
                .path(":slug")
                .module(RouteModule::new().component().loader(|args| async move {
                    let slug = args.params.get("slug").cloned().unwrap_or_default();
                    match POSTS.iter().find(|(s, _)| *s == slug) {
                        Some((slug, title)) => data(json!({ "slug": slug, "title": title })),
                        None => Err(Thrown::Route(ErrorResponse::new(
                            StatusCode::NOT_FOUND,
                            format!("No post named {slug}"),
                        ))),
                    }
                })),
        )
        .with(
            ServerRoute::new("routes/healthz")
                .parent("root")
                .path("healthz")
                .module(RouteModule::new().loader(|_| async { Ok::<_, Thrown>(DataValue::Text("ok".into())) })),
        )
        .with(
            ServerRoute::new("routes/api.time")
                .parent("root")
                .path("api/time")
                .module(RouteModule::new().loader(|_| async {
                    let now = SystemTime::now()
                        .duration_since(UNIX_EPOCH)
                        .map(|d| d.as_secs())
                        .unwrap_or_default();
                    data(json!({ "now": now }))
                })),
        )
}

/// Renders a bare HTML shell, then streams hand-off lines as script tags.
async fn render(mut args: RenderArgs) -> Result<Response<Body>, Thrown> {
    let context = &mut args.context;
    if let Some(errors) = &context.static_handler_context.errors {
        if let Some(id) = errors.keys().next() {
            context.record_rendered_boundary(id);
        }
    }

    let head = format!(
        "<!DOCTYPE html><html><head><meta charset=\"utf-8\"><title>ssr-dispatch</title>\
         <script>window.__context = {};window.__stream = [];</script>\
         <script type=\"module\" src=\"{}\"></script></head><body><div id=\"root\"></div>",
        context.server_handoff_string, context.manifest.entry.module,
    );
    let handoff = context.take_handoff_stream();

    let body = async_stream::stream! {
        yield Ok::<_, Infallible>(head);
        if let Some(handoff) = handoff {
            let mut chunks = handoff.into_data_stream();
            while let Some(Ok(chunk)) = chunks.next().await {
                for line in String::from_utf8_lossy(&chunk).lines().filter(|l| !l.is_empty()) {
                    yield Ok(format!("<script>window.__stream.push({});</script>", escape_html(line)));
                }
            }
        }
        yield Ok("</body></html>".to_string());
    };

    let mut headers = args.headers;
    headers.insert(header::CONTENT_TYPE, HeaderValue::from_static("text/html; charset=utf-8"));
    Ok(response::with_parts(args.status, headers, Body::from_stream(body)))
}

pub fn entry() -> EntryModule {
    EntryModule::new(render)
}
