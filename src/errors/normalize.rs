//! Sanitization and serialization of errors for the client.
//!
//! # Responsibilities
//! - Strip internals from errors outside development mode
//! - Shape errors for hand-off payloads and JSON error responses
//! - Produce the last-resort plain-text 500

use std::collections::BTreeMap;
use std::fmt::Display;

use axum::body::Body;
use axum::http::{HeaderMap, HeaderValue, Response, StatusCode};
use serde_json::{json, Map, Value};

use crate::build::ServerMode;
use crate::http::response;

use super::types::{ErrorResponse, RouteError, SerializedError};

pub const UNEXPECTED_SERVER_ERROR: &str = "Unexpected Server Error";

/// Diagnostic header set on JSON error responses from resource routes.
pub const X_REMIX_ERROR: &str = "x-remix-error";

pub fn sanitize_error(err: &SerializedError, mode: ServerMode) -> SerializedError {
    if mode == ServerMode::Development {
        err.clone()
    } else {
        SerializedError::new(UNEXPECTED_SERVER_ERROR)
    }
}

/// Route errors keep status, status text, and data; only the private cause goes.
pub fn sanitize_route_error(err: RouteError, mode: ServerMode) -> RouteError {
    match err {
        RouteError::Error(e) => RouteError::Error(sanitize_error(&e, mode)),
        RouteError::Response(mut e) => {
            if mode != ServerMode::Development {
                e.error = None;
            }
            RouteError::Response(e)
        }
    }
}

pub fn sanitize_errors(
    errors: BTreeMap<String, RouteError>,
    mode: ServerMode,
) -> BTreeMap<String, RouteError> {
    errors
        .into_iter()
        .map(|(id, err)| (id, sanitize_route_error(err, mode)))
        .collect()
}

pub fn serialize_error(err: &SerializedError, mode: ServerMode) -> Value {
    let sanitized = sanitize_error(err, mode);
    let mut out = Map::new();
    out.insert("message".into(), Value::String(sanitized.message));
    if let Some(stack) = sanitized.stack {
        out.insert("stack".into(), Value::String(stack));
    }
    Value::Object(out)
}

/// Tagged JSON form of a captured error, as the client router revives it.
pub fn route_error_to_json(err: &RouteError, mode: ServerMode) -> Value {
    match err {
        RouteError::Response(e) => {
            let mut out = json!({
                "__type": "RouteErrorResponse",
                "status": e.status,
                "statusText": e.status_text,
                "data": e.data,
                "internal": e.internal,
            });
            if let (Some(cause), ServerMode::Development, Value::Object(map)) =
                (&e.error, mode, &mut out)
            {
                map.insert("error".into(), serialize_error(cause, mode));
            }
            out
        }
        RouteError::Error(e) => {
            let mut out = serialize_error(e, mode);
            if let Value::Object(map) = &mut out {
                map.insert("__type".into(), Value::String("Error".into()));
            }
            out
        }
    }
}

pub fn serialize_errors(errors: Option<&BTreeMap<String, RouteError>>, mode: ServerMode) -> Value {
    match errors {
        None => Value::Null,
        Some(errors) => Value::Object(
            errors
                .iter()
                .map(|(id, err)| (id.clone(), route_error_to_json(err, mode)))
                .collect(),
        ),
    }
}

/// JSON body for a route error thrown out of a resource route.
pub fn error_response_to_json(err: &ErrorResponse, mode: ServerMode) -> Response<Body> {
    let cause = err
        .error
        .clone()
        .unwrap_or_else(|| SerializedError::new(UNEXPECTED_SERVER_ERROR));
    let mut headers = HeaderMap::new();
    headers.insert(X_REMIX_ERROR, HeaderValue::from_static("yes"));
    response::json_with_headers(err.status_code(), &serialize_error(&cause, mode), headers)
}

/// Plain-text 500; error detail only outside production.
pub fn last_resort_response(err: &dyn Display, mode: ServerMode) -> Response<Body> {
    let mut message = UNEXPECTED_SERVER_ERROR.to_string();
    if mode != ServerMode::Production {
        message.push_str(&format!("\n\n{err}"));
    }
    response::text(StatusCode::INTERNAL_SERVER_ERROR, message)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn boom() -> SerializedError {
        SerializedError::new("db password is hunter2").with_stack("at connect()")
    }

    #[test]
    fn test_production_hides_messages() {
        let err = sanitize_error(&boom(), ServerMode::Production);
        assert_eq!(err.message, UNEXPECTED_SERVER_ERROR);
        assert!(err.stack.is_none());

        let err = sanitize_error(&boom(), ServerMode::Development);
        assert_eq!(err.message, "db password is hunter2");
    }

    #[test]
    fn test_route_error_keeps_status_but_loses_cause() {
        let route_err = RouteError::Response(ErrorResponse::not_found("/nope"));
        match sanitize_route_error(route_err, ServerMode::Production) {
            RouteError::Response(e) => {
                assert_eq!(e.status, 404);
                assert_eq!(e.status_text, "Not Found");
                assert!(e.error.is_none());
            }
            other => panic!("unexpected {other:?}"),
        }
    }

    #[test]
    fn test_serialized_shapes() {
        let errors = BTreeMap::from([
            ("root".to_string(), RouteError::Error(boom())),
            (
                "routes/a".to_string(),
                RouteError::Response(ErrorResponse::new(StatusCode::UNAUTHORIZED, "sign in")),
            ),
        ]);
        let value = serialize_errors(Some(&errors), ServerMode::Test);
        assert_eq!(value["root"]["__type"], "Error");
        assert_eq!(value["root"]["message"], UNEXPECTED_SERVER_ERROR);
        assert_eq!(value["routes/a"]["__type"], "RouteErrorResponse");
        assert_eq!(value["routes/a"]["status"], 401);
        assert_eq!(value["routes/a"]["data"], "sign in");
        assert_eq!(serialize_errors(None, ServerMode::Test), Value::Null);
    }

    #[tokio::test]
    async fn test_last_resort_detail_by_mode() {
        let res = last_resort_response(&"it broke", ServerMode::Development);
        assert_eq!(res.status(), StatusCode::INTERNAL_SERVER_ERROR);
        let body = axum::body::to_bytes(res.into_body(), 1024).await.unwrap();
        assert_eq!(&body[..], b"Unexpected Server Error\n\nit broke");

        let res = last_resort_response(&"it broke", ServerMode::Production);
        let body = axum::body::to_bytes(res.into_body(), 1024).await.unwrap();
        assert_eq!(&body[..], b"Unexpected Server Error");
    }

    #[tokio::test]
    async fn test_error_response_json_has_diagnostic_header() {
        let err = ErrorResponse::internal(StatusCode::METHOD_NOT_ALLOWED, boom());
        let res = error_response_to_json(&err, ServerMode::Production);
        assert_eq!(res.status(), StatusCode::METHOD_NOT_ALLOWED);
        assert_eq!(res.headers()[X_REMIX_ERROR], "yes");
        let body = axum::body::to_bytes(res.into_body(), 1024).await.unwrap();
        let value: Value = serde_json::from_slice(&body).unwrap();
        assert_eq!(value, json!({"message": UNEXPECTED_SERVER_ERROR}));
    }
}
