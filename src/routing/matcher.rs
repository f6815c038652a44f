//! Nested route matching.
//!
//! # Responsibilities
//! - Build the route tree from the flat manifest
//! - Flatten it into ranked branches (one per reachable leaf)
//! - Match a pathname against branches, segment by segment
//!
//! # Design Decisions
//! - Branches are flattened and ranked once, when the tree is built
//! - Optional segments (`:lang?`) are exploded into separate branches
//! - Ranking is by score; ties fall back to sibling order, so the
//!   manifest's insertion order is the final tie-breaker
//! - No regex: patterns are compared segment by segment

use std::collections::HashMap;
use std::sync::Arc;

use crate::build::route::{Params, RouteManifest, ServerRoute};

use super::path::{decode_path, join_paths, normalize_pathname, strip_basename};

const STATIC_SEGMENT_VALUE: i32 = 10;
const DYNAMIC_SEGMENT_VALUE: i32 = 3;
const EMPTY_SEGMENT_VALUE: i32 = 1;
const INDEX_ROUTE_VALUE: i32 = 2;
const SPLAT_PENALTY: i32 = -2;

#[derive(Debug, Clone)]
pub struct RouteNode {
    pub route: Arc<ServerRoute>,
    pub children: Vec<RouteNode>,
}

#[derive(Debug, Clone)]
struct RouteMeta {
    relative_path: String,
    case_sensitive: bool,
    child_index: usize,
    route: Arc<ServerRoute>,
}

#[derive(Debug, Clone)]
struct Branch {
    path: String,
    score: i32,
    routes: Vec<RouteMeta>,
}

/// One route along a matched branch.
#[derive(Debug, Clone)]
pub struct RouteMatch {
    pub route: Arc<ServerRoute>,
    /// Params of the whole branch, not just this route's segments.
    pub params: Params,
    pub pathname: String,
    pub pathname_base: String,
}

/// Immutable, ranked view of a route manifest.
#[derive(Debug, Clone, Default)]
pub struct RouteTree {
    roots: Vec<RouteNode>,
    branches: Vec<Branch>,
}

impl RouteTree {
    pub fn from_manifest(manifest: &RouteManifest) -> Self {
        let mut children: HashMap<Option<&str>, Vec<&Arc<ServerRoute>>> = HashMap::new();
        for route in manifest.iter() {
            // Orphans whose parent is missing are treated as roots.
            let parent = route
                .parent_id
                .as_deref()
                .filter(|id| manifest.get(id).is_some());
            children.entry(parent).or_default().push(route);
        }

        fn build<'a>(
            parent: Option<&'a str>,
            children: &HashMap<Option<&'a str>, Vec<&'a Arc<ServerRoute>>>,
        ) -> Vec<RouteNode> {
            children
                .get(&parent)
                .map(|routes| {
                    routes
                        .iter()
                        .map(|route| RouteNode {
                            route: Arc::clone(route),
                            children: build(Some(route.id.as_str()), children),
                        })
                        .collect()
                })
                .unwrap_or_default()
        }

        let roots = build(None, &children);
        let mut branches = Vec::new();
        flatten(&roots, &mut branches, &[], "");
        rank(&mut branches);

        Self { roots, branches }
    }

    pub fn roots(&self) -> &[RouteNode] {
        &self.roots
    }

    /// The first top-level route; where unattributed errors land.
    pub fn root_id(&self) -> Option<&str> {
        self.roots.first().map(|node| node.route.id.as_str())
    }

    pub fn is_empty(&self) -> bool {
        self.roots.is_empty()
    }
}

fn flatten(nodes: &[RouteNode], branches: &mut Vec<Branch>, parents: &[RouteMeta], parent_path: &str) {
    for (index, node) in nodes.iter().enumerate() {
        match node.route.path.as_deref() {
            Some(path) if !path.is_empty() && path.contains('?') => {
                for exploded in explode_optional_segments(path) {
                    flatten_route(node, index, Some(exploded), branches, parents, parent_path);
                }
            }
            _ => flatten_route(node, index, None, branches, parents, parent_path),
        }
    }
}

fn flatten_route(
    node: &RouteNode,
    index: usize,
    relative_path: Option<String>,
    branches: &mut Vec<Branch>,
    parents: &[RouteMeta],
    parent_path: &str,
) {
    let route = &node.route;
    let mut relative_path = relative_path
        .or_else(|| route.path.clone())
        .unwrap_or_default();

    if relative_path.starts_with('/') {
        // Absolute child paths must extend their parent's path.
        match relative_path.strip_prefix(parent_path) {
            Some(rest) => relative_path = rest.to_string(),
            None => return,
        }
    }

    let path = join_paths(&[parent_path, &relative_path]);
    let mut routes = parents.to_vec();
    routes.push(RouteMeta {
        relative_path,
        case_sensitive: route.case_sensitive,
        child_index: index,
        route: Arc::clone(route),
    });

    if !node.children.is_empty() && !route.index {
        flatten(&node.children, branches, &routes, &path);
    }

    // Pathless layouts only match through their children.
    if route.path.is_none() && !route.index {
        return;
    }

    branches.push(Branch {
        score: compute_score(&path, route.index),
        path,
        routes,
    });
}

/// `/:lang?/about` becomes `/:lang/about` and `/about`.
fn explode_optional_segments(path: &str) -> Vec<String> {
    let segments: Vec<&str> = path.split('/').collect();
    let Some((first, rest)) = segments.split_first() else {
        return Vec::new();
    };
    let is_optional = first.ends_with('?');
    let required = first.trim_end_matches('?');

    let exploded = if rest.is_empty() {
        if is_optional {
            vec![required.to_string(), String::new()]
        } else {
            vec![required.to_string()]
        }
    } else {
        let rest_exploded = explode_optional_segments(&rest.join("/"));
        let mut result: Vec<String> = rest_exploded
            .iter()
            .map(|sub| {
                if sub.is_empty() {
                    required.to_string()
                } else {
                    format!("{required}/{sub}")
                }
            })
            .collect();
        if is_optional {
            result.extend(rest_exploded);
        }
        result
    };

    exploded
        .into_iter()
        .map(|p| {
            if path.starts_with('/') && p.is_empty() {
                "/".to_string()
            } else {
                p
            }
        })
        .collect()
}

fn is_param_segment(segment: &str) -> bool {
    segment
        .strip_prefix(':')
        .map(|name| !name.is_empty() && name.chars().all(|c| c.is_alphanumeric() || c == '_' || c == '-'))
        .unwrap_or(false)
}

fn compute_score(path: &str, index: bool) -> i32 {
    let segments: Vec<&str> = path.split('/').collect();
    let mut score = segments.len() as i32;
    if segments.iter().any(|s| *s == "*") {
        score += SPLAT_PENALTY;
    }
    if index {
        score += INDEX_ROUTE_VALUE;
    }
    segments
        .iter()
        .filter(|s| **s != "*")
        .fold(score, |acc, segment| {
            acc + if is_param_segment(segment) {
                DYNAMIC_SEGMENT_VALUE
            } else if segment.is_empty() {
                EMPTY_SEGMENT_VALUE
            } else {
                STATIC_SEGMENT_VALUE
            }
        })
}

fn rank(branches: &mut [Branch]) {
    branches.sort_by(|a, b| {
        b.score.cmp(&a.score).then_with(|| {
            let a_idx: Vec<usize> = a.routes.iter().map(|m| m.child_index).collect();
            let b_idx: Vec<usize> = b.routes.iter().map(|m| m.child_index).collect();
            compare_indexes(&a_idx, &b_idx)
        })
    });
}

/// Only siblings are ordered by position; anything else is a tie.
fn compare_indexes(a: &[usize], b: &[usize]) -> std::cmp::Ordering {
    let siblings = a.len() == b.len()
        && !a.is_empty()
        && a[..a.len() - 1].iter().zip(b.iter()).all(|(x, y)| x == y);
    if siblings {
        a[a.len() - 1].cmp(&b[b.len() - 1])
    } else {
        std::cmp::Ordering::Equal
    }
}

/// Match `pathname` (which still carries the basename) against the tree.
pub fn match_routes(tree: &RouteTree, pathname: &str, basename: &str) -> Option<Vec<RouteMatch>> {
    let pathname = strip_basename(pathname, basename)?;
    let decoded = decode_path(pathname);
    tree.branches
        .iter()
        .find_map(|branch| match_branch(branch, &decoded))
}

fn match_branch(branch: &Branch, pathname: &str) -> Option<Vec<RouteMatch>> {
    let mut params = Params::new();
    let mut matched_pathname = "/".to_string();
    let mut matches = Vec::with_capacity(branch.routes.len());

    for (i, meta) in branch.routes.iter().enumerate() {
        let end = i == branch.routes.len() - 1;
        let remaining = if matched_pathname == "/" {
            pathname
        } else {
            match pathname.get(matched_pathname.len()..) {
                Some(rest) if !rest.is_empty() => rest,
                _ => "/",
            }
        };

        let m = match_path(&meta.relative_path, meta.case_sensitive, end, remaining)?;
        params.extend(m.params);
        matches.push(RouteMatch {
            route: Arc::clone(&meta.route),
            params: Params::new(),
            pathname: join_paths(&[&matched_pathname, &m.pathname]),
            pathname_base: normalize_pathname(&join_paths(&[&matched_pathname, &m.pathname_base])),
        });
        if m.pathname_base != "/" {
            matched_pathname = join_paths(&[&matched_pathname, &m.pathname_base]);
        }
    }

    for m in &mut matches {
        m.params = params.clone();
    }
    Some(matches)
}

struct PathMatch {
    params: Params,
    pathname: String,
    pathname_base: String,
}

enum Segment<'a> {
    Static(&'a str),
    Param(&'a str),
}

/// Match one route pattern against the front of `pathname`.
fn match_path(pattern: &str, case_sensitive: bool, end: bool, pathname: &str) -> Option<PathMatch> {
    let is_splat = pattern.ends_with('*');
    let body = pattern.trim_end_matches('*').trim_end_matches('/');
    let segments: Vec<Segment<'_>> = body
        .split('/')
        .filter(|s| !s.is_empty())
        .map(|s| match s.strip_prefix(':') {
            Some(name) if is_param_segment(s) => Segment::Param(name),
            _ => Segment::Static(s),
        })
        .collect();

    if !pathname.starts_with('/') {
        return None;
    }

    let mut params = Params::new();
    let mut pos = if segments.is_empty() { 1 } else { 0 };

    for segment in &segments {
        if !pathname[pos..].starts_with('/') {
            return None;
        }
        pos += 1;
        let rest = &pathname[pos..];
        let len = rest.find('/').unwrap_or(rest.len());
        let value = &rest[..len];
        match segment {
            Segment::Static(expected) => {
                let same = if case_sensitive {
                    value == *expected
                } else {
                    value.eq_ignore_ascii_case(expected) || value.to_lowercase() == expected.to_lowercase()
                };
                if !same {
                    return None;
                }
            }
            Segment::Param(name) => {
                if value.is_empty() {
                    return None;
                }
                params.insert((*name).to_string(), value.replace("%2F", "/"));
            }
        }
        pos += len;
    }

    let rest = &pathname[pos..];
    let (matched, splat) = if is_splat {
        if segments.is_empty() && (pattern == "*" || pattern == "/*") {
            (pathname, Some(rest))
        } else if rest.len() >= 2 && rest.starts_with('/') {
            (pathname, Some(&rest[1..]))
        } else if rest.chars().all(|c| c == '/') {
            (pathname, Some(""))
        } else {
            return None;
        }
    } else if end {
        if !rest.chars().all(|c| c == '/') {
            return None;
        }
        (pathname, None)
    } else {
        if !body.is_empty() && !rest.is_empty() && !rest.starts_with('/') {
            return None;
        }
        (&pathname[..pos], None)
    };

    let base = match splat {
        Some(value) => {
            params.insert("*".to_string(), value.replace("%2F", "/"));
            &matched[..matched.len() - value.len()]
        }
        None => matched,
    };

    Some(PathMatch {
        params,
        pathname: matched.to_string(),
        pathname_base: trim_trailing_slashes(base),
    })
}

/// `/a/b//` → `/a/b`, but a lone `/` stays.
fn trim_trailing_slashes(path: &str) -> String {
    let trimmed = path.trim_end_matches('/');
    if trimmed.is_empty() {
        path.get(..1).unwrap_or_default().to_string()
    } else {
        trimmed.to_string()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::build::route::ServerRoute;

    fn tree() -> RouteTree {
        let manifest = RouteManifest::new()
            .with(ServerRoute::new("root").path(""))
            .with(ServerRoute::new("routes/_index").parent("root").index())
            .with(ServerRoute::new("routes/parent").parent("root").path("parent"))
            .with(ServerRoute::new("routes/parent.child").parent("routes/parent").path("child"))
            .with(ServerRoute::new("routes/parent._index").parent("routes/parent").index())
            .with(ServerRoute::new("routes/users.$id").parent("root").path("users/:id"))
            .with(ServerRoute::new("routes/users.new").parent("root").path("users/new"))
            .with(ServerRoute::new("routes/$lang.about").parent("root").path(":lang?/about"))
            .with(ServerRoute::new("routes/_layout").parent("root"))
            .with(ServerRoute::new("routes/_layout.settings").parent("routes/_layout").path("settings"))
            .with(ServerRoute::new("routes/files.$").parent("root").path("files/*"))
            .with(ServerRoute::new("routes/$").parent("root").path("*"));
        RouteTree::from_manifest(&manifest)
    }

    fn ids(matches: &[RouteMatch]) -> Vec<&str> {
        matches.iter().map(|m| m.route.id.as_str()).collect()
    }

    #[test]
    fn test_index_and_nested_matches() {
        let tree = tree();
        let m = match_routes(&tree, "/", "/").unwrap();
        assert_eq!(ids(&m), vec!["root", "routes/_index"]);

        let m = match_routes(&tree, "/parent", "/").unwrap();
        assert_eq!(ids(&m), vec!["root", "routes/parent", "routes/parent._index"]);

        let m = match_routes(&tree, "/parent/child", "/").unwrap();
        assert_eq!(ids(&m), vec!["root", "routes/parent", "routes/parent.child"]);
        assert_eq!(m[2].pathname, "/parent/child");
        assert_eq!(m[1].pathname_base, "/parent");
    }

    #[test]
    fn test_static_beats_dynamic() {
        let tree = tree();
        let m = match_routes(&tree, "/users/new", "/").unwrap();
        assert_eq!(ids(&m).last(), Some(&"routes/users.new"));

        let m = match_routes(&tree, "/users/42", "/").unwrap();
        assert_eq!(ids(&m).last(), Some(&"routes/users.$id"));
        assert_eq!(m[0].params.get("id").map(String::as_str), Some("42"));
        assert_eq!(m[1].params.get("id").map(String::as_str), Some("42"));
    }

    #[test]
    fn test_optional_segments_and_layouts() {
        let tree = tree();
        let m = match_routes(&tree, "/en/about", "/").unwrap();
        assert_eq!(ids(&m).last(), Some(&"routes/$lang.about"));
        assert_eq!(m[1].params.get("lang").map(String::as_str), Some("en"));

        let m = match_routes(&tree, "/about", "/").unwrap();
        assert_eq!(ids(&m).last(), Some(&"routes/$lang.about"));
        assert!(m[1].params.get("lang").is_none());

        let m = match_routes(&tree, "/settings", "/").unwrap();
        assert_eq!(ids(&m), vec!["root", "routes/_layout", "routes/_layout.settings"]);
    }

    #[test]
    fn test_splats() {
        let tree = tree();
        let m = match_routes(&tree, "/files/a/b%20c.txt", "/").unwrap();
        assert_eq!(ids(&m).last(), Some(&"routes/files.$"));
        assert_eq!(m[1].params.get("*").map(String::as_str), Some("a/b c.txt"));

        let m = match_routes(&tree, "/no/such/page", "/").unwrap();
        assert_eq!(ids(&m).last(), Some(&"routes/$"));
        assert_eq!(m[1].params.get("*").map(String::as_str), Some("no/such/page"));
    }

    #[test]
    fn test_basename_and_case() {
        let tree = tree();
        let m = match_routes(&tree, "/app/Parent/Child", "/app").unwrap();
        assert_eq!(ids(&m).last(), Some(&"routes/parent.child"));
        assert!(match_routes(&tree, "/elsewhere/parent", "/app").is_none());

        let manifest = RouteManifest::new()
            .with(ServerRoute::new("root").path(""))
            .with(ServerRoute::new("routes/Exact").parent("root").path("Exact").case_sensitive());
        let strict = RouteTree::from_manifest(&manifest);
        assert!(match_routes(&strict, "/Exact", "/").is_some());
        let m = match_routes(&strict, "/exact", "/");
        assert!(m.map(|m| ids(&m).last() != Some(&"routes/Exact")).unwrap_or(true));
    }

    #[test]
    fn test_scores() {
        assert!(compute_score("/users/new", false) > compute_score("/users/:id", false));
        assert!(compute_score("/users/:id", false) > compute_score("/users/*", false));
        assert_eq!(
            explode_optional_segments("/:lang?/about"),
            vec!["/:lang/about".to_string(), "/about".to_string()]
        );
    }

    #[test]
    fn test_no_match_without_catch_all() {
        let manifest = RouteManifest::new()
            .with(ServerRoute::new("root").path(""))
            .with(ServerRoute::new("routes/a").parent("root").path("a"));
        let tree = RouteTree::from_manifest(&manifest);
        assert!(match_routes(&tree, "/b", "/").is_none());
        assert_eq!(tree.root_id(), Some("root"));
    }
}
