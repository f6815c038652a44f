//! Route manifest patches for lazy route discovery.

use std::collections::{BTreeMap, BTreeSet};

use axum::body::Body;
use axum::http::header::{HeaderMap, HeaderValue, CACHE_CONTROL};
use axum::http::{Response, StatusCode};

use crate::build::{EntryRoute, ServerBuild};
use crate::http::request::RequestInfo;
use crate::http::response;
use crate::routing::{match_routes, RouteTree};

pub const RELOAD_DOCUMENT_HEADER: &str = "x-remix-reload-document";

/// Entries are addressed by version, so they never change.
const IMMUTABLE: &str = "public, max-age=31536000, immutable";

/// Every ancestor of each requested path, shortest first.
fn candidate_paths(paths: &[String]) -> BTreeSet<String> {
    let mut out = BTreeSet::new();
    for path in paths {
        let segments: Vec<&str> = path.trim_start_matches('/').split('/').collect();
        for end in 1..=segments.len() {
            out.insert(format!("/{}", segments[..end].join("/")));
        }
    }
    out
}

pub fn handle_manifest_request(
    build: &ServerBuild,
    routes: &RouteTree,
    request: &RequestInfo,
) -> Result<Response<Body>, serde_json::Error> {
    if request.query_param("version").as_deref() != Some(build.assets.version.as_str()) {
        let mut headers = HeaderMap::new();
        headers.insert(RELOAD_DOCUMENT_HEADER, HeaderValue::from_static("true"));
        return Ok(response::empty(StatusCode::NO_CONTENT, headers));
    }

    let requested = request.query_params_all("p");
    if requested.is_empty() {
        return Ok(response::text(StatusCode::BAD_REQUEST, "Invalid Request"));
    }

    let mut patches: BTreeMap<&str, &EntryRoute> = BTreeMap::new();
    for path in candidate_paths(&requested) {
        let Some(matches) = match_routes(routes, &path, &build.basename) else {
            continue;
        };
        for m in matches {
            if let Some((id, entry)) = build.assets.routes.get_key_value(&m.route.id) {
                patches.insert(id, entry);
            }
        }
    }

    let body = serde_json::to_value(&patches)?;
    let mut headers = HeaderMap::new();
    headers.insert(CACHE_CONTROL, HeaderValue::from_static(IMMUTABLE));
    Ok(response::json_with_headers(StatusCode::OK, &body, headers))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::build::{EntryModule, RouteManifest, RouteModule, ServerRoute};
    use axum::http::Request;
    use serde_json::Value;

    fn build() -> ServerBuild {
        let routes = RouteManifest::new()
            .with(ServerRoute::new("root").path("").module(RouteModule::new().component()))
            .with(ServerRoute::new("routes/parent").parent("root").path("parent"))
            .with(ServerRoute::new("routes/parent/index").parent("routes/parent").index())
            .with(ServerRoute::new("routes/parent/child").parent("routes/parent").path("child"))
            .with(ServerRoute::new("routes/other").parent("root").path("other"));
        ServerBuild::new(routes, EntryModule::empty())
    }

    fn request(uri: &str) -> RequestInfo {
        RequestInfo::from_request(&Request::builder().uri(uri).body(()).unwrap())
    }

    async fn body_json(res: Response<Body>) -> Value {
        let bytes = axum::body::to_bytes(res.into_body(), usize::MAX).await.unwrap();
        serde_json::from_slice(&bytes).unwrap()
    }

    #[test]
    fn test_candidate_paths() {
        let paths = candidate_paths(&["/a/b/c".to_string(), "x".to_string()]);
        let paths: Vec<_> = paths.into_iter().collect();
        assert_eq!(paths, vec!["/a", "/a/b", "/a/b/c", "/x"]);
    }

    #[tokio::test]
    async fn test_stale_version_asks_for_reload() {
        let build = build();
        let tree = RouteTree::from_manifest(&build.routes);
        let res = handle_manifest_request(&build, &tree, &request("/__manifest?version=0&p=/parent")).unwrap();
        assert_eq!(res.status(), StatusCode::NO_CONTENT);
        assert_eq!(res.headers()[RELOAD_DOCUMENT_HEADER], "true");
    }

    #[tokio::test]
    async fn test_missing_paths_is_bad_request() {
        let build = build();
        let tree = RouteTree::from_manifest(&build.routes);
        let res = handle_manifest_request(&build, &tree, &request("/__manifest?version=1")).unwrap();
        assert_eq!(res.status(), StatusCode::BAD_REQUEST);
    }

    #[tokio::test]
    async fn test_patches_include_ancestors() {
        let build = build();
        let tree = RouteTree::from_manifest(&build.routes);
        let res =
            handle_manifest_request(&build, &tree, &request("/__manifest?version=1&p=/parent/child")).unwrap();
        assert_eq!(res.status(), StatusCode::OK);
        assert_eq!(res.headers()[CACHE_CONTROL], IMMUTABLE);

        let body = body_json(res).await;
        let ids: Vec<_> = body.as_object().unwrap().keys().cloned().collect();
        assert_eq!(
            ids,
            vec!["root", "routes/parent", "routes/parent/child", "routes/parent/index"]
        );
        assert_eq!(body["routes/parent/child"]["parentId"], "routes/parent");
        assert!(body.get("routes/other").is_none());
    }
}
