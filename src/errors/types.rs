//! Thrown values and captured route errors.

use axum::body::Body;
use axum::http::{Response, StatusCode};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use thiserror::Error;

/// A plain error as it travels towards the client: message plus optional stack.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, Error)]
#[error("{message}")]
pub struct SerializedError {
    pub message: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub stack: Option<String>,
}

impl SerializedError {
    pub fn new(message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
            stack: None,
        }
    }

    pub fn with_stack(mut self, stack: impl Into<String>) -> Self {
        self.stack = Some(stack.into());
        self
    }

    /// Capture any std error. The source chain stands in for a stack trace.
    pub fn from_error<E: std::error::Error + ?Sized>(err: &E) -> Self {
        let mut stack = format!("Error: {err}");
        let mut source = err.source();
        while let Some(cause) = source {
            stack.push_str("\n    caused by: ");
            stack.push_str(&cause.to_string());
            source = cause.source();
        }
        Self {
            message: err.to_string(),
            stack: Some(stack),
        }
    }
}

/// A structured route error: an HTTP status a route deliberately failed with.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ErrorResponse {
    pub status: u16,
    pub status_text: String,
    pub data: Value,
    #[serde(default)]
    pub internal: bool,
    /// Private cause; stripped before reaching the client outside development.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<SerializedError>,
}

impl ErrorResponse {
    pub fn new(status: StatusCode, data: impl Into<Value>) -> Self {
        Self {
            status: status.as_u16(),
            status_text: status.canonical_reason().unwrap_or_default().to_string(),
            data: data.into(),
            internal: false,
            error: None,
        }
    }

    pub fn with_status_text(status: u16, status_text: impl Into<String>, data: impl Into<Value>) -> Self {
        Self {
            status,
            status_text: status_text.into(),
            data: data.into(),
            internal: false,
            error: None,
        }
    }

    /// An error the framework raised on the route's behalf, keeping the cause private.
    pub fn internal(status: StatusCode, cause: SerializedError) -> Self {
        Self {
            status: status.as_u16(),
            status_text: status.canonical_reason().unwrap_or_default().to_string(),
            data: Value::String(format!("Error: {}", cause.message)),
            internal: true,
            error: Some(cause),
        }
    }

    pub fn not_found(pathname: &str) -> Self {
        Self::internal(
            StatusCode::NOT_FOUND,
            SerializedError::new(format!("No route matches URL \"{pathname}\"")),
        )
    }

    pub fn status_code(&self) -> StatusCode {
        StatusCode::from_u16(self.status).unwrap_or(StatusCode::INTERNAL_SERVER_ERROR)
    }
}

/// An error captured in a handler context, keyed by route id.
#[derive(Debug, Clone, PartialEq)]
pub enum RouteError {
    Response(ErrorResponse),
    Error(SerializedError),
}

impl RouteError {
    pub fn status(&self) -> StatusCode {
        match self {
            RouteError::Response(e) => e.status_code(),
            RouteError::Error(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }

    pub fn is_route_error_response(&self) -> bool {
        matches!(self, RouteError::Response(_))
    }

    /// Route errors without a private cause were thrown on purpose and are not reported.
    pub fn is_reportable(&self) -> bool {
        match self {
            RouteError::Response(e) => e.error.is_some(),
            RouteError::Error(_) => true,
        }
    }
}

impl From<RouteError> for Thrown {
    fn from(err: RouteError) -> Self {
        match err {
            RouteError::Response(e) => Thrown::Route(e),
            RouteError::Error(e) => Thrown::Error(e),
        }
    }
}

/// A value thrown out of user code or the static handler.
#[derive(Debug, Error)]
pub enum Thrown {
    /// A raw response, passed through for compatibility.
    #[error("thrown response with status {}", .0.status())]
    Response(Response<Body>),

    #[error("{} {}", .0.status, .0.status_text)]
    Route(ErrorResponse),

    #[error(transparent)]
    Error(SerializedError),

    /// The route query produced no value at all.
    #[error("Expected a response from queryRoute")]
    MissingRouteResponse,
}

impl Thrown {
    pub fn message(message: impl Into<String>) -> Self {
        Thrown::Error(SerializedError::new(message))
    }

    pub fn as_response(&self) -> Option<&Response<Body>> {
        match self {
            Thrown::Response(res) => Some(res),
            _ => None,
        }
    }

    pub fn is_route_error_response(&self) -> bool {
        matches!(self, Thrown::Route(_))
    }

    /// Clonable view for reporting; responses keep only their status.
    pub fn to_route_error(&self) -> RouteError {
        match self {
            Thrown::Route(e) => RouteError::Response(e.clone()),
            Thrown::Error(e) => RouteError::Error(e.clone()),
            Thrown::Response(res) => {
                RouteError::Response(ErrorResponse::new(res.status(), Value::Null))
            }
            Thrown::MissingRouteResponse => RouteError::Error(SerializedError::new(
                "Expected a response from queryRoute",
            )),
        }
    }

    /// Convert into the clonable form stored in contexts. Responses must be
    /// unwrapped by the caller first, so here they only keep their status.
    pub fn into_route_error(self) -> RouteError {
        match self {
            Thrown::Route(e) => RouteError::Response(e),
            Thrown::Error(e) => RouteError::Error(e),
            other => other.to_route_error(),
        }
    }
}

impl From<DispatchError> for Thrown {
    fn from(err: DispatchError) -> Self {
        Thrown::Error(SerializedError::from_error(&err))
    }
}

/// Errors raised by the dispatcher itself.
#[derive(Debug, Error)]
pub enum DispatchError {
    #[error(
        "Invalid `context` value provided to `handle`. When middleware is enabled you must \
         pass a `RouterContextProvider`; otherwise pass a plain load context map."
    )]
    InvalidLoadContext,

    #[error("Expected a Response to be returned from resource route handler")]
    MissingResourceResponse,

    #[error("Refusing to prerender the `{path}` path because it does not start with the basename `{basename}`")]
    OutsideBasename { path: String, basename: String },

    #[error(
        "Refusing to SSR the path `{0}` because `ssr:false` is set and the path is not included \
         in the `prerender` config, so in production the path will be a 404."
    )]
    NotPrerendered(String),

    #[error("Failed to load server build: {0}")]
    Build(String),
    #[error("Failed to read request body: {0}")]
    Body(String),
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_reportable_route_errors() {
        let thrown_on_purpose = RouteError::Response(ErrorResponse::new(StatusCode::NOT_FOUND, "nope"));
        assert!(!thrown_on_purpose.is_reportable());

        let internal = RouteError::Response(ErrorResponse::not_found("/missing"));
        assert!(internal.is_reportable());
        assert_eq!(internal.status(), StatusCode::NOT_FOUND);

        let generic = RouteError::Error(SerializedError::new("boom"));
        assert!(generic.is_reportable());
        assert_eq!(generic.status(), StatusCode::INTERNAL_SERVER_ERROR);
    }

    #[test]
    fn test_error_display() {
        let err = Thrown::Route(ErrorResponse::new(StatusCode::FORBIDDEN, "no"));
        assert_eq!(err.to_string(), "403 Forbidden");

        let err = Thrown::message("kaboom");
        assert_eq!(err.to_string(), "kaboom");

        let err = Thrown::from(DispatchError::MissingResourceResponse);
        assert!(err.to_string().contains("resource route handler"));
    }

    #[test]
    fn test_from_error_keeps_source_chain() {
        let io = std::io::Error::new(std::io::ErrorKind::Other, "disk on fire");
        let err = SerializedError::from_error(&io);
        assert_eq!(err.message, "disk on fire");
        assert!(err.stack.as_deref().unwrap_or_default().contains("disk on fire"));
    }
}
