//! The in-crate static handler: runs middleware, actions, and loaders for
//! the routes a request matches.
//!
//! # Responsibilities
//! - Pick the action target (leaf, or its parent unless `?index` is given)
//! - Run loaders of the matched chain concurrently
//! - Short-circuit on redirects and middleware responses
//! - Capture errors at the nearest boundary and derive the status code

use std::collections::BTreeMap;
use std::sync::Arc;

use async_trait::async_trait;
use axum::body::{Body, Bytes};
use axum::http::{HeaderMap, Method, Response, StatusCode};
use futures_util::future::join_all;

use crate::build::{DataFunction, DataFunctionArgs, DataValue, ServerBuild};
use crate::errors::{ErrorResponse, RouteError, SerializedError, Thrown};
use crate::handoff::HandoffValue;
use crate::http::request::RequestInfo;
use crate::http::response::{is_redirect_response, unwrap_response};
use crate::routing::{match_routes, RouteMatch, RouteTree};

use super::context::LoadContext;
use super::static_handler::{
    QueryOptions, QueryResult, RouteQueryOptions, StaticHandler, StaticHandlerContext,
};

const FALLBACK_ROOT_ID: &str = "root";

pub fn is_mutation_method(method: &Method) -> bool {
    matches!(*method, Method::POST | Method::PUT | Method::PATCH | Method::DELETE)
}

fn is_valid_method(method: &Method) -> bool {
    *method == Method::GET || *method == Method::HEAD || is_mutation_method(method)
}

/// Turn a thrown, non-redirect response into a route error, keeping its
/// status and whatever body could be read.
pub async fn error_response_from(res: Response<Body>) -> ErrorResponse {
    let status = res.status();
    let data = unwrap_response(res).await.unwrap_or_default();
    ErrorResponse::new(status, data)
}

enum Outcome {
    Data {
        value: HandoffValue,
        status: Option<StatusCode>,
        headers: Option<HeaderMap>,
    },
    Redirect(Response<Body>),
    Error {
        error: RouteError,
        headers: Option<HeaderMap>,
    },
}

async fn settle(result: Result<DataValue, Thrown>) -> Outcome {
    match result {
        Ok(DataValue::Data(value)) => Outcome::Data {
            value,
            status: None,
            headers: None,
        },
        Ok(DataValue::Text(text)) => Outcome::Data {
            value: HandoffValue::Json(text.into()),
            status: None,
            headers: None,
        },
        Ok(DataValue::Empty) => Outcome::Data {
            value: HandoffValue::null(),
            status: None,
            headers: None,
        },
        Ok(DataValue::Response(res)) if is_redirect_response(&res) => Outcome::Redirect(res),
        Ok(DataValue::Response(res)) => {
            let status = res.status();
            let headers = res.headers().clone();
            match unwrap_response(res).await {
                Ok(value) => Outcome::Data {
                    value: HandoffValue::Json(value),
                    status: Some(status),
                    headers: Some(headers),
                },
                Err(err) => Outcome::Error {
                    error: RouteError::Error(err),
                    headers: Some(headers),
                },
            }
        }
        Err(thrown) => settle_thrown(thrown).await,
    }
}

async fn settle_thrown(thrown: Thrown) -> Outcome {
    match thrown {
        Thrown::Response(res) if is_redirect_response(&res) => Outcome::Redirect(res),
        Thrown::Response(res) => {
            let headers = res.headers().clone();
            Outcome::Error {
                error: RouteError::Response(error_response_from(res).await),
                headers: Some(headers),
            }
        }
        other => Outcome::Error {
            error: other.into_route_error(),
            headers: None,
        },
    }
}

/// Nearest route at or above `idx` that renders errors; the root otherwise.
fn find_boundary_index(matches: &[RouteMatch], idx: usize) -> usize {
    matches[..=idx.min(matches.len().saturating_sub(1))]
        .iter()
        .rposition(|m| m.route.module.has_error_boundary)
        .unwrap_or(0)
}

/// The route whose action a submission targets.
fn target_match_index(matches: &[RouteMatch], request: &RequestInfo) -> usize {
    let leaf = matches.len() - 1;
    let naked_index = request.query_params_all("index").iter().any(|v| v.is_empty());
    if matches[leaf].route.index && naked_index {
        return leaf;
    }
    matches
        .iter()
        .rposition(|m| m.route.path.as_deref().map(|p| !p.is_empty()).unwrap_or(false))
        .unwrap_or(0)
}

pub struct DataStaticHandler {
    tree: Arc<RouteTree>,
    basename: String,
    middleware: bool,
}

impl DataStaticHandler {
    pub fn new(tree: Arc<RouteTree>, build: &ServerBuild) -> Self {
        Self {
            tree,
            basename: build.basename.clone(),
            middleware: build.future.v8_middleware,
        }
    }

    fn root_id(&self) -> String {
        self.tree
            .root_id()
            .unwrap_or(FALLBACK_ROOT_ID)
            .to_string()
    }

    fn args(request: &RequestInfo, m: &RouteMatch, context: &LoadContext, body: &Bytes) -> DataFunctionArgs {
        DataFunctionArgs {
            request: request.clone(),
            params: m.params.clone(),
            context: context.clone(),
            body: body.clone(),
        }
    }

    /// Context for a request nothing could handle: the error sits at the root.
    fn error_context(&self, request: &RequestInfo, error: ErrorResponse) -> StaticHandlerContext {
        let root = self.tree.roots().first().map(|node| RouteMatch {
            route: node.route.clone(),
            params: Default::default(),
            pathname: String::new(),
            pathname_base: String::new(),
        });
        let mut ctx = StaticHandlerContext::new(request.location(), root.into_iter().collect());
        ctx.status_code = error.status_code();
        ctx.errors = Some(BTreeMap::from([(self.root_id(), RouteError::Response(error))]));
        ctx
    }

    /// Run middleware root to leaf. `Err` carries the index of the route
    /// whose middleware threw.
    async fn run_middleware(
        &self,
        request: &RequestInfo,
        body: &Bytes,
        matches: &[RouteMatch],
        context: &LoadContext,
    ) -> Result<Option<Response<Body>>, (usize, Thrown)> {
        if !self.middleware {
            return Ok(None);
        }
        for (idx, m) in matches.iter().enumerate() {
            for middleware in &m.route.module.middleware {
                match middleware(Self::args(request, m, context, body)).await {
                    Ok(Some(res)) => return Ok(Some(res)),
                    Ok(None) => {}
                    Err(thrown) => return Err((idx, thrown)),
                }
            }
        }
        Ok(None)
    }
}

#[async_trait]
impl StaticHandler for DataStaticHandler {
    async fn query(
        &self,
        request: &RequestInfo,
        body: Bytes,
        options: QueryOptions,
    ) -> Result<QueryResult, Thrown> {
        let path = request.path().to_string();
        if !is_valid_method(&request.method) {
            let error = ErrorResponse::internal(
                StatusCode::METHOD_NOT_ALLOWED,
                SerializedError::new(format!("Invalid request method \"{}\"", request.method)),
            );
            return Ok(QueryResult::Context(self.error_context(request, error)));
        }
        let Some(matches) = match_routes(&self.tree, &path, &self.basename) else {
            let error = ErrorResponse::not_found(&path);
            return Ok(QueryResult::Context(self.error_context(request, error)));
        };
        let context = &options.load_context;

        let mut ctx = StaticHandlerContext::new(request.location(), matches.clone());

        match self.run_middleware(request, &body, &matches, context).await {
            Ok(Some(res)) => return Ok(QueryResult::Response(res)),
            Ok(None) => {}
            Err((idx, thrown)) => match settle_thrown(thrown).await {
                Outcome::Redirect(res) => return Ok(QueryResult::Response(res)),
                Outcome::Error { error, headers } => {
                    if let Some(headers) = headers {
                        ctx.loader_headers.insert(matches[idx].route.id.clone(), headers);
                    }
                    let boundary = find_boundary_index(&matches, idx);
                    ctx.status_code = error.status();
                    ctx.errors = Some(BTreeMap::from([(matches[boundary].route.id.clone(), error)]));
                    return Ok(QueryResult::Context(ctx));
                }
                Outcome::Data { .. } => {}
            },
        }

        let mut action_status = None;
        let mut loader_limit = matches.len();

        if is_mutation_method(&request.method) {
            let target_idx = target_match_index(&matches, request);
            let target = &matches[target_idx];
            let id = target.route.id.clone();
            let result = match &target.route.module.action {
                Some(action) => action(Self::args(request, target, context, &body)).await,
                None => Err(Thrown::Route(ErrorResponse::internal(
                    StatusCode::METHOD_NOT_ALLOWED,
                    SerializedError::new(format!(
                        "You made a {} request to \"{}\" but did not provide an `action` for route \"{}\", so there is no way to handle the request.",
                        request.method, path, id
                    )),
                ))),
            };

            match settle(result).await {
                Outcome::Redirect(res) => return Ok(QueryResult::Response(res)),
                Outcome::Data { value, status, headers } => {
                    if let Some(headers) = headers {
                        ctx.action_headers.insert(id.clone(), headers);
                    }
                    ctx.action_data = Some(BTreeMap::from([(id, value)]));
                    action_status = status;
                }
                Outcome::Error { error, headers } => {
                    if let Some(headers) = headers {
                        ctx.action_headers.insert(id.clone(), headers);
                    }
                    let boundary = if options.skip_loader_error_bubbling {
                        target_idx
                    } else {
                        find_boundary_index(&matches, target_idx)
                    };
                    action_status = Some(error.status());
                    ctx.errors = Some(BTreeMap::from([(matches[boundary].route.id.clone(), error)]));
                    // Only loaders above the boundary still make sense.
                    loader_limit = boundary;
                }
            }

            if options.skip_revalidation {
                ctx.status_code = action_status.unwrap_or(StatusCode::OK);
                return Ok(QueryResult::Context(ctx));
            }
        }

        let to_load: Vec<(usize, DataFunction)> = if options.load_data {
            matches[..loader_limit]
                .iter()
                .enumerate()
                .filter(|(_, m)| {
                    options
                        .filter_route_ids
                        .as_ref()
                        .map(|ids| ids.contains(&m.route.id))
                        .unwrap_or(true)
                })
                .filter_map(|(idx, m)| m.route.module.loader.clone().map(|loader| (idx, loader)))
                .collect()
        } else {
            Vec::new()
        };

        let runs = to_load.into_iter().map(|(idx, loader)| {
            let args = Self::args(request, &matches[idx], context, &body);
            async move { (idx, settle(loader(args).await).await) }
        });
        let results = join_all(runs).await;

        let mut found_error = false;
        let mut loader_status = None;
        for (idx, outcome) in results {
            let id = matches[idx].route.id.clone();
            match outcome {
                Outcome::Redirect(res) => return Ok(QueryResult::Response(res)),
                Outcome::Data { value, status, headers } => {
                    ctx.loader_data.insert(id.clone(), value);
                    if let Some(headers) = headers {
                        ctx.loader_headers.insert(id, headers);
                    }
                    if let Some(status) = status.filter(|s| *s != StatusCode::OK) {
                        if !found_error {
                            loader_status = Some(status);
                        }
                    }
                }
                Outcome::Error { error, headers } => {
                    if let Some(headers) = headers {
                        ctx.loader_headers.insert(id, headers);
                    }
                    let boundary = if options.skip_loader_error_bubbling {
                        idx
                    } else {
                        find_boundary_index(&matches, idx)
                    };
                    if !found_error {
                        found_error = true;
                        loader_status = Some(error.status());
                    }
                    ctx.errors
                        .get_or_insert_with(BTreeMap::new)
                        .entry(matches[boundary].route.id.clone())
                        .or_insert(error);
                }
            }
        }

        ctx.status_code = action_status.or(loader_status).unwrap_or(StatusCode::OK);
        Ok(QueryResult::Context(ctx))
    }

    async fn query_route(
        &self,
        request: &RequestInfo,
        body: Bytes,
        options: RouteQueryOptions,
    ) -> Result<DataValue, Thrown> {
        let path = request.path().to_string();
        if !is_valid_method(&request.method) {
            return Err(Thrown::Route(ErrorResponse::internal(
                StatusCode::METHOD_NOT_ALLOWED,
                SerializedError::new(format!("Invalid request method \"{}\"", request.method)),
            )));
        }
        let Some(matches) = match_routes(&self.tree, &path, &self.basename) else {
            return Err(Thrown::Route(ErrorResponse::not_found(&path)));
        };
        let Some(idx) = matches.iter().position(|m| m.route.id == options.route_id) else {
            return Err(Thrown::Route(ErrorResponse::internal(
                StatusCode::FORBIDDEN,
                SerializedError::new(format!(
                    "Route \"{}\" does not match URL \"{}\"",
                    options.route_id, path
                )),
            )));
        };
        let context = &options.load_context;

        match self.run_middleware(request, &body, &matches[..=idx], context).await {
            Ok(Some(res)) => return Ok(DataValue::Response(res)),
            Ok(None) => {}
            Err((_, thrown)) => return Err(thrown),
        }

        let m = &matches[idx];
        let handler: Result<DataFunction, ErrorResponse> = if is_mutation_method(&request.method) {
            m.route.module.action.clone().ok_or_else(|| {
                ErrorResponse::internal(
                    StatusCode::METHOD_NOT_ALLOWED,
                    SerializedError::new(format!(
                        "You made a {} request to \"{}\" but did not provide an `action` for route \"{}\", so there is no way to handle the request.",
                        request.method, path, m.route.id
                    )),
                )
            })
        } else {
            m.route.module.loader.clone().ok_or_else(|| {
                ErrorResponse::internal(
                    StatusCode::BAD_REQUEST,
                    SerializedError::new(format!(
                        "You made a {} request to \"{}\" but did not provide a `loader` for route \"{}\", so there is no way to handle the request.",
                        request.method, path, m.route.id
                    )),
                )
            })
        };
        let handler = handler.map_err(Thrown::Route)?;

        match handler(Self::args(request, m, context, &body)).await? {
            DataValue::Empty => Err(Thrown::MissingRouteResponse),
            value => Ok(value),
        }
    }

    fn static_context_from_error(
        &self,
        mut context: StaticHandlerContext,
        error: RouteError,
    ) -> StaticHandlerContext {
        let boundary = context
            .rendered_boundary
            .get()
            .unwrap_or_else(|| self.root_id());
        context.status_code = error.status();
        context.errors = Some(BTreeMap::from([(boundary, error)]));
        context
    }
}
