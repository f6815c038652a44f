//! Request handling and transformation.
//!
//! # Responsibilities
//! - Generate unique request IDs (UUID v4) and propagate them
//! - Capture the parts of a request the dispatcher keeps after the body is consumed
//! - Carry the request's cancellation signal
//! - Buffer request bodies up to a configured cap
//!
//! # Design Decisions
//! - `RequestInfo` is cheap to clone and owns everything it needs, so it can be
//!   handed to loaders, hooks, and the render function
//! - The cancellation token travels in request extensions; requests without one
//!   get a fresh token that never fires

use axum::body::{Body, Bytes, HttpBody};
use axum::http::header::CONTENT_LENGTH;
use axum::http::uri::PathAndQuery;
use axum::http::{HeaderMap, HeaderValue, Method, Request, Uri};
use futures_util::StreamExt;
use thiserror::Error;
use tokio_util::sync::CancellationToken;
use tower_http::request_id::{MakeRequestId, RequestId};
use uuid::Uuid;

pub const X_REQUEST_ID: &str = "x-request-id";

/// Default cap on a buffered request body.
pub const DEFAULT_MAX_BODY_BYTES: usize = 16 * 1024 * 1024;

#[derive(Debug, Error)]
pub enum BodyError {
    #[error("Request body exceeds the {limit} byte limit")]
    TooLarge { limit: usize },

    #[error("Failed to read request body: {0}")]
    Read(#[from] axum::Error),
}

/// Buffer a request body, failing fast once it grows past `limit`.
/// A declared `Content-Length` over the limit is refused before reading.
pub async fn read_body(headers: &HeaderMap, body: Body, limit: usize) -> Result<Bytes, BodyError> {
    let declared = headers
        .get(CONTENT_LENGTH)
        .and_then(|v| v.to_str().ok())
        .and_then(|v| v.parse::<u64>().ok())
        .or_else(|| body.size_hint().exact());
    if declared.is_some_and(|len| len > limit as u64) {
        return Err(BodyError::TooLarge { limit });
    }

    let mut buf = Vec::new();
    let mut chunks = body.into_data_stream();
    while let Some(chunk) = chunks.next().await {
        let chunk = chunk?;
        if buf.len() + chunk.len() > limit {
            return Err(BodyError::TooLarge { limit });
        }
        buf.extend_from_slice(&chunk);
    }
    Ok(Bytes::from(buf))
}

/// Issues a UUID v4 for each request lacking an `x-request-id`.
#[derive(Debug, Clone, Copy, Default)]
pub struct MakeRequestUuid;

impl MakeRequestId for MakeRequestUuid {
    fn make_request_id<B>(&mut self, _request: &Request<B>) -> Option<RequestId> {
        let id = Uuid::new_v4().to_string();
        HeaderValue::from_str(&id).ok().map(RequestId::new)
    }
}

/// The head of a request plus its cancellation signal.
#[derive(Debug, Clone)]
pub struct RequestInfo {
    pub method: Method,
    pub uri: Uri,
    pub headers: HeaderMap,
    pub signal: CancellationToken,
}

impl RequestInfo {
    pub fn from_request<B>(request: &Request<B>) -> Self {
        Self {
            method: request.method().clone(),
            uri: request.uri().clone(),
            headers: request.headers().clone(),
            signal: request
                .extensions()
                .get::<CancellationToken>()
                .cloned()
                .unwrap_or_default(),
        }
    }

    pub fn path(&self) -> &str {
        self.uri.path()
    }

    /// Path plus query string, as a router location.
    pub fn location(&self) -> String {
        match self.uri.query() {
            Some(q) => format!("{}?{}", self.uri.path(), q),
            None => self.uri.path().to_string(),
        }
    }

    pub fn query_pairs(&self) -> Vec<(String, String)> {
        self.uri
            .query()
            .map(|q| {
                url::form_urlencoded::parse(q.as_bytes())
                    .map(|(k, v)| (k.into_owned(), v.into_owned()))
                    .collect()
            })
            .unwrap_or_default()
    }

    /// First value of a query parameter.
    pub fn query_param(&self, name: &str) -> Option<String> {
        self.query_pairs()
            .into_iter()
            .find(|(k, _)| k == name)
            .map(|(_, v)| v)
    }

    /// Every value of a repeated query parameter, in order.
    pub fn query_params_all(&self, name: &str) -> Vec<String> {
        self.query_pairs()
            .into_iter()
            .filter(|(k, _)| k == name)
            .map(|(_, v)| v)
            .collect()
    }

    pub fn has_query_param(&self, name: &str) -> bool {
        self.query_pairs().iter().any(|(k, _)| k == name)
    }

    pub fn is_aborted(&self) -> bool {
        self.signal.is_cancelled()
    }

    /// Same request with its path replaced; the query string is kept.
    pub fn with_path(&self, path: &str) -> Self {
        let path_and_query = match self.uri.query() {
            Some(q) => format!("{path}?{q}"),
            None => path.to_string(),
        };
        let mut parts = self.uri.clone().into_parts();
        if let Ok(pq) = PathAndQuery::try_from(path_and_query) {
            parts.path_and_query = Some(pq);
        }
        let uri = Uri::from_parts(parts).unwrap_or_else(|_| self.uri.clone());
        Self {
            uri,
            ..self.clone()
        }
    }

    /// Rebuild a full request around a body.
    pub fn to_request(&self, body: Body) -> Request<Body> {
        let mut request = Request::new(body);
        *request.method_mut() = self.method.clone();
        *request.uri_mut() = self.uri.clone();
        *request.headers_mut() = self.headers.clone();
        request.extensions_mut().insert(self.signal.clone());
        request
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn info(uri: &str) -> RequestInfo {
        let req = Request::builder().uri(uri).body(Body::empty()).unwrap();
        RequestInfo::from_request(&req)
    }

    #[test]
    fn test_query_params() {
        let info = info("/__manifest?version=abc&p=%2Fa&p=/b");
        assert_eq!(info.query_param("version").as_deref(), Some("abc"));
        assert_eq!(info.query_params_all("p"), vec!["/a".to_string(), "/b".to_string()]);
        assert!(info.has_query_param("p"));
        assert!(!info.has_query_param("index"));
    }

    #[test]
    fn test_with_path_keeps_query() {
        let info = info("http://example.com/parent/child.data?_routes=root");
        let rewritten = info.with_path("/parent/child");
        assert_eq!(rewritten.uri.to_string(), "http://example.com/parent/child?_routes=root");
        assert_eq!(rewritten.location(), "/parent/child?_routes=root");
    }

    #[tokio::test]
    async fn test_read_body_under_limit() {
        let bytes = read_body(&HeaderMap::new(), Body::from("hello"), 5).await.unwrap();
        assert_eq!(&bytes[..], b"hello");
    }

    #[tokio::test]
    async fn test_read_body_over_limit() {
        let err = read_body(&HeaderMap::new(), Body::from("hello!"), 5).await.unwrap_err();
        assert!(matches!(err, BodyError::TooLarge { limit: 5 }));

        // Streamed bodies have no declared length and are cut off while reading.
        let stream = futures_util::stream::iter(vec![
            Ok::<_, std::io::Error>(Bytes::from_static(b"abc")),
            Ok(Bytes::from_static(b"def")),
        ]);
        let err = read_body(&HeaderMap::new(), Body::from_stream(stream), 5).await.unwrap_err();
        assert!(matches!(err, BodyError::TooLarge { .. }));
    }

    #[test]
    fn test_signal_travels_in_extensions() {
        let token = CancellationToken::new();
        let mut req = Request::builder().uri("/").body(Body::empty()).unwrap();
        req.extensions_mut().insert(token.clone());
        let info = RequestInfo::from_request(&req);
        assert!(!info.is_aborted());
        token.cancel();
        assert!(info.is_aborted());

        let rebuilt = info.to_request(Body::empty());
        assert!(rebuilt
            .extensions()
            .get::<CancellationToken>()
            .map(|t| t.is_cancelled())
            .unwrap_or(false));
    }
}
