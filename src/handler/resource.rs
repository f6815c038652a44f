//! Resource routes: one route's loader or action, no document.

use axum::body::{Body, Bytes};
use axum::http::header::HeaderValue;
use axum::http::{Response, StatusCode};

use crate::build::DataValue;
use crate::data::{LoadContext, RouteQueryOptions};
use crate::errors::{error_response_to_json, last_resort_response, DispatchError, RouteError, Thrown};
use crate::http::response;

use super::Scope;

/// Marks a response a resource route threw rather than returned.
pub const X_REMIX_CATCH: &str = "x-remix-catch";

pub async fn handle_resource_request(
    scope: &Scope<'_>,
    route_id: String,
    body: Bytes,
    load_context: LoadContext,
) -> Response<Body> {
    let options = RouteQueryOptions {
        route_id,
        load_context,
    };
    let result = scope
        .static_handler
        .query_route(scope.request, body, options)
        .await;

    match result {
        Ok(DataValue::Response(res)) => res,
        Ok(DataValue::Text(text)) => response::text(StatusCode::OK, text),
        Ok(DataValue::Data(value)) => response::json(StatusCode::OK, &value.resolve(scope.mode).await),
        Ok(DataValue::Empty) | Err(Thrown::MissingRouteResponse) => {
            let error = DispatchError::MissingResourceResponse;
            scope.reporter.report_dispatch(&error);
            last_resort_response(&error, scope.mode)
        }
        Err(Thrown::Response(mut res)) => {
            res.headers_mut().insert(X_REMIX_CATCH, HeaderValue::from_static("yes"));
            res
        }
        Err(Thrown::Route(error)) => {
            scope.reporter.report(&RouteError::Response(error.clone()));
            error_response_to_json(&error, scope.mode)
        }
        Err(thrown) => {
            scope.reporter.report_thrown(&thrown);
            last_resort_response(&thrown, scope.mode)
        }
    }
}
