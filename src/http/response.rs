//! Response construction and transformation.
//!
//! # Responsibilities
//! - Build plain, JSON, and empty responses without fallible builders
//! - Classify redirect and bodyless status codes
//! - Strip bodies for HEAD requests while keeping status and headers
//! - Unwrap a response body into structured data (JSON or text)
//!
//! # Design Decisions
//! - Constructors never panic: headers are inserted from constants
//! - Bodies are read with a hard size cap

use axum::body::Body;
use axum::http::header::{self, HeaderMap, HeaderValue};
use axum::http::{Response, StatusCode};
use serde_json::Value;

use crate::errors::SerializedError;

/// Status codes that must never carry a body.
pub const SERVER_NO_BODY_STATUS_CODES: [u16; 5] = [100, 101, 204, 205, 304];

/// Status codes treated as redirects.
pub const REDIRECT_STATUS_CODES: [u16; 5] = [301, 302, 303, 307, 308];

/// Upper bound when buffering a response body into memory.
pub const MAX_UNWRAP_BODY_BYTES: usize = 16 * 1024 * 1024;

const TEXT_PLAIN: &str = "text/plain;charset=UTF-8";
const APPLICATION_JSON: &str = "application/json";

pub fn is_redirect_status(status: StatusCode) -> bool {
    REDIRECT_STATUS_CODES.contains(&status.as_u16())
}

pub fn is_bodyless_status(status: StatusCode) -> bool {
    SERVER_NO_BODY_STATUS_CODES.contains(&status.as_u16())
}

/// A redirect status with a `Location` to go to.
pub fn is_redirect_response(res: &Response<Body>) -> bool {
    is_redirect_status(res.status()) && res.headers().contains_key(header::LOCATION)
}

pub fn with_parts(status: StatusCode, headers: HeaderMap, body: Body) -> Response<Body> {
    let mut res = Response::new(body);
    *res.status_mut() = status;
    *res.headers_mut() = headers;
    res
}

pub fn empty(status: StatusCode, headers: HeaderMap) -> Response<Body> {
    with_parts(status, headers, Body::empty())
}

pub fn text(status: StatusCode, body: impl Into<String>) -> Response<Body> {
    let mut headers = HeaderMap::new();
    headers.insert(header::CONTENT_TYPE, HeaderValue::from_static(TEXT_PLAIN));
    with_parts(status, headers, Body::from(body.into()))
}

pub fn json(status: StatusCode, value: &Value) -> Response<Body> {
    json_with_headers(status, value, HeaderMap::new())
}

pub fn json_with_headers(status: StatusCode, value: &Value, mut headers: HeaderMap) -> Response<Body> {
    headers.insert(header::CONTENT_TYPE, HeaderValue::from_static(APPLICATION_JSON));
    with_parts(status, headers, Body::from(value.to_string()))
}

/// Same status and headers, no body.
pub fn strip_body(res: Response<Body>) -> Response<Body> {
    let (parts, _) = res.into_parts();
    Response::from_parts(parts, Body::empty())
}

/// Read a response body as JSON when it declares itself JSON, else as text.
pub async fn unwrap_response(res: Response<Body>) -> Result<Value, SerializedError> {
    let (parts, body) = res.into_parts();
    let is_json = parts
        .headers
        .get(header::CONTENT_TYPE)
        .and_then(|v| v.to_str().ok())
        .map(|ct| ct.contains("application/json"))
        .unwrap_or(false);

    let bytes = axum::body::to_bytes(body, MAX_UNWRAP_BODY_BYTES)
        .await
        .map_err(|e| SerializedError::from_error(&e))?;

    if is_json {
        serde_json::from_slice(&bytes).map_err(|e| SerializedError::from_error(&e))
    } else {
        Ok(Value::String(String::from_utf8_lossy(&bytes).into_owned()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_status_classes() {
        assert!(is_redirect_status(StatusCode::SEE_OTHER));
        assert!(!is_redirect_status(StatusCode::NOT_MODIFIED));
        assert!(is_bodyless_status(StatusCode::NO_CONTENT));
        assert!(is_bodyless_status(StatusCode::NOT_MODIFIED));
        assert!(!is_bodyless_status(StatusCode::OK));
    }

    #[test]
    fn test_redirect_requires_location() {
        let res = empty(StatusCode::FOUND, HeaderMap::new());
        assert!(!is_redirect_response(&res));

        let mut headers = HeaderMap::new();
        headers.insert(header::LOCATION, HeaderValue::from_static("/login"));
        let res = empty(StatusCode::FOUND, headers);
        assert!(is_redirect_response(&res));
    }

    #[tokio::test]
    async fn test_strip_body_keeps_headers() {
        let res = strip_body(text(StatusCode::CREATED, "hello"));
        assert_eq!(res.status(), StatusCode::CREATED);
        assert!(res.headers().contains_key(header::CONTENT_TYPE));
        let bytes = axum::body::to_bytes(res.into_body(), 1024).await.unwrap();
        assert!(bytes.is_empty());
    }

    #[tokio::test]
    async fn test_unwrap_json_and_text() {
        let value = unwrap_response(json(StatusCode::OK, &json!({"a": 1}))).await.unwrap();
        assert_eq!(value, json!({"a": 1}));

        let value = unwrap_response(text(StatusCode::OK, "plain")).await.unwrap();
        assert_eq!(value, json!("plain"));
    }
}
