//! Shared fixtures for the integration tests.

#![allow(dead_code)]

use std::sync::{Arc, Mutex};

use axum::body::Body;
use axum::http::header::{HeaderMap, HeaderValue, CONTENT_TYPE, LOCATION, SET_COOKIE};
use axum::http::{Method, Request, Response, StatusCode};
use serde_json::{json, Value};

use ssr_dispatch::build::{
    DataValue, EntryModule, RenderArgs, RenderPass, RouteManifest, RouteModule, ServerBuild,
    ServerRoute,
};
use ssr_dispatch::errors::{ErrorResponse, RouteError, SerializedError, Thrown};
use ssr_dispatch::handoff::HandoffValue;
use ssr_dispatch::http::response;

/// Errors seen by the build's error handler.
#[derive(Clone, Default)]
pub struct Reported(Arc<Mutex<Vec<RouteError>>>);

impl Reported {
    pub fn len(&self) -> usize {
        self.0.lock().unwrap().len()
    }

    pub fn messages(&self) -> Vec<String> {
        self.0
            .lock()
            .unwrap()
            .iter()
            .map(|e| match e {
                RouteError::Error(e) => e.message.clone(),
                RouteError::Response(r) => format!("{} {}", r.status, r.status_text),
            })
            .collect()
    }
}

fn data(value: Value) -> Result<DataValue, Thrown> {
    Ok(value.into())
}

fn found(location: &'static str) -> Response<Body> {
    let mut headers = HeaderMap::new();
    headers.insert(LOCATION, HeaderValue::from_static(location));
    headers.insert(SET_COOKIE, HeaderValue::from_static("session=1"));
    response::empty(StatusCode::FOUND, headers)
}

/// A root layout, nested pages, and a few resource routes.
pub fn routes() -> RouteManifest {
    RouteManifest::new()
        .with(
            ServerRoute::new("root").path("").module(
                RouteModule::new()
                    .component()
                    .error_boundary()
                    .loader(|_| async { data(json!({ "user": "ada" })) }),
            ),
        )
        .with(ServerRoute::new("routes/_index").parent("root").index().module(RouteModule::new().component()))
        .with(
            ServerRoute::new("routes/page").parent("root").path("page").module(
                RouteModule::new()
                    .component()
                    .loader(|_| async { data(json!({ "title": "Page" })) })
                    .action(|args| async move {
                        let body = String::from_utf8_lossy(&args.body).to_string();
                        data(json!({ "echo": body }))
                    }),
            ),
        )
        .with(
            ServerRoute::new("routes/old").parent("root").path("old").module(
                RouteModule::new()
                    .component()
                    .loader(|_| async { Ok::<_, Thrown>(DataValue::Response(found("/page"))) }),
            ),
        )
        .with(
            ServerRoute::new("routes/missing").parent("root").path("missing").module(
                RouteModule::new().component().loader(|_| async {
                    Err::<DataValue, _>(Thrown::Route(ErrorResponse::new(StatusCode::NOT_FOUND, "nope")))
                }),
            ),
        )
        .with(
            ServerRoute::new("routes/boom").parent("root").path("boom").module(
                RouteModule::new()
                    .component()
                    .loader(|_| async { Err::<DataValue, _>(Thrown::message("db down")) }),
            ),
        )
        .with(
            ServerRoute::new("routes/text").parent("root").path("text").module(
                RouteModule::new().loader(|_| async { Ok::<_, Thrown>(DataValue::Text("ok".into())) }),
            ),
        )
        .with(
            ServerRoute::new("routes/json").parent("root").path("json").module(
                RouteModule::new().loader(|_| async { data(json!({ "a": 1 })) }),
            ),
        )
        .with(
            ServerRoute::new("routes/empty").parent("root").path("empty").module(
                RouteModule::new().loader(|_| async { Ok::<_, Thrown>(DataValue::Empty) }),
            ),
        )
        .with(
            ServerRoute::new("routes/teapot").parent("root").path("teapot").module(
                RouteModule::new().loader(|_| async {
                    Err::<DataValue, _>(Thrown::Route(ErrorResponse::new(StatusCode::IM_A_TEAPOT, "short and stout")))
                }),
            ),
        )
        .with(
            ServerRoute::new("routes/deferred").parent("root").path("deferred").module(
                RouteModule::new().component().loader(|_| async {
                    let later = HandoffValue::deferred(async { Ok::<_, SerializedError>(json!("later").into()) });
                    Ok::<_, Thrown>(HandoffValue::map([("now", HandoffValue::Json(json!(1))), ("later", later)]).into())
                }),
            ),
        )
}

/// How the fixture render behaves.
#[derive(Clone, Copy, PartialEq, Eq)]
pub enum RenderBehavior {
    /// Echo the pass, status, and error keys as JSON.
    Echo,
    /// Throw on the first pass only.
    ThrowOnce,
    /// Throw on every pass.
    ThrowAlways,
}

pub fn entry(behavior: RenderBehavior, reported: &Reported) -> EntryModule {
    let sink = reported.0.clone();
    EntryModule::new(move |args: RenderArgs| async move {
        let pass = args.context.render_meta.pass;
        let throw = match behavior {
            RenderBehavior::Echo => false,
            RenderBehavior::ThrowOnce => pass == RenderPass::First,
            RenderBehavior::ThrowAlways => true,
        };
        if throw {
            return Err(Thrown::message(format!("render failed on {pass:?}")));
        }

        let ctx = &args.context.static_handler_context;
        let errors: Vec<String> = ctx.errors.iter().flatten().map(|(id, _)| id.clone()).collect();
        let loader_data: Value = ctx
            .loader_data
            .iter()
            .map(|(id, v)| (id.clone(), v.to_json_lossy(args.context.server_mode)))
            .collect::<serde_json::Map<_, _>>()
            .into();
        let body = json!({
            "pass": format!("{pass:?}"),
            "status": args.status.as_u16(),
            "errors": errors,
            "loaderData": loader_data,
            "spa": args.context.is_spa_mode,
            "handoff": args.context.server_handoff_string,
        });
        let mut headers = args.headers;
        headers.insert(CONTENT_TYPE, HeaderValue::from_static("application/json"));
        Ok(response::with_parts(args.status, headers, Body::from(body.to_string())))
    })
    .with_error_handler(move |err, _| sink.lock().unwrap().push(err.clone()))
}

pub fn build(behavior: RenderBehavior, reported: &Reported) -> ServerBuild {
    ServerBuild::new(routes(), entry(behavior, reported))
}

pub fn request(method: Method, uri: &str) -> Request<Body> {
    Request::builder().method(method).uri(uri).body(Body::empty()).unwrap()
}

pub fn get(uri: &str) -> Request<Body> {
    request(Method::GET, uri)
}

pub async fn body_text(res: Response<Body>) -> String {
    let bytes = axum::body::to_bytes(res.into_body(), usize::MAX).await.unwrap();
    String::from_utf8(bytes.to_vec()).unwrap()
}

pub async fn body_json(res: Response<Body>) -> Value {
    serde_json::from_str(&body_text(res).await).unwrap()
}

/// Every NDJSON line of a single-fetch body.
pub async fn body_lines(res: Response<Body>) -> Vec<Value> {
    body_text(res)
        .await
        .lines()
        .map(|l| serde_json::from_str(l).unwrap())
        .collect()
}
