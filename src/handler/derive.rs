//! Per-build derived state and its cache.

use std::sync::Arc;

use arc_swap::ArcSwapOption;

use crate::build::{HandleErrorFunction, ServerBuild, ServerMode};
use crate::data::{DataStaticHandler, StaticHandler};
use crate::routing::RouteTree;

use super::report::default_error_handler;

/// Everything computed from a build before it can serve requests.
pub struct DerivedState {
    pub build: Arc<ServerBuild>,
    pub routes: Arc<RouteTree>,
    pub mode: ServerMode,
    pub static_handler: Arc<dyn StaticHandler>,
    pub error_handler: HandleErrorFunction,
}

pub fn resolve_derived_state(build: Arc<ServerBuild>, mode: ServerMode) -> DerivedState {
    let routes = Arc::new(RouteTree::from_manifest(&build.routes));
    let static_handler: Arc<dyn StaticHandler> =
        Arc::new(DataStaticHandler::new(routes.clone(), &build));
    let error_handler = build
        .entry
        .handle_error
        .clone()
        .unwrap_or_else(|| default_error_handler(mode));
    DerivedState {
        build,
        routes,
        mode,
        static_handler,
        error_handler,
    }
}

/// Holds the state derived from the most recent build. Readers get an
/// `Arc` snapshot; a rebuild swaps in a whole new state.
pub struct DerivedStateCache {
    current: ArcSwapOption<DerivedState>,
}

impl DerivedStateCache {
    pub fn new() -> Self {
        Self {
            current: ArcSwapOption::empty(),
        }
    }

    /// Static builds derive once per build identity; dynamic ones every call.
    pub fn resolve(&self, build: Arc<ServerBuild>, mode: ServerMode, dynamic: bool) -> Arc<DerivedState> {
        if !dynamic {
            if let Some(state) = self.current.load_full() {
                if Arc::ptr_eq(&state.build, &build) && state.mode == mode {
                    return state;
                }
            }
        }
        let state = Arc::new(resolve_derived_state(build, mode));
        self.current.store(Some(state.clone()));
        state
    }

    pub fn current(&self) -> Option<Arc<DerivedState>> {
        self.current.load_full()
    }
}

impl Default for DerivedStateCache {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::build::{EntryModule, RouteManifest, ServerRoute};
    use crate::routing::match_routes;

    fn build() -> Arc<ServerBuild> {
        let routes = RouteManifest::new()
            .with(ServerRoute::new("root").path(""))
            .with(ServerRoute::new("routes/a").parent("root").path("a"));
        Arc::new(ServerBuild::new(routes, EntryModule::empty()))
    }

    #[test]
    fn test_static_build_is_memoized() {
        let cache = DerivedStateCache::new();
        let build = build();
        let first = cache.resolve(build.clone(), ServerMode::Test, false);
        let second = cache.resolve(build.clone(), ServerMode::Test, false);
        assert!(Arc::ptr_eq(&first, &second));

        let a = match_routes(&first.routes, "/a", "/").unwrap();
        let b = match_routes(&second.routes, "/a", "/").unwrap();
        assert_eq!(a.last().map(|m| &m.route.id), b.last().map(|m| &m.route.id));
    }

    #[test]
    fn test_dynamic_build_rederives() {
        let cache = DerivedStateCache::new();
        let build = build();
        let first = cache.resolve(build.clone(), ServerMode::Test, true);
        let second = cache.resolve(build, ServerMode::Test, true);
        assert!(!Arc::ptr_eq(&first, &second));
        assert!(cache.current().map(|c| Arc::ptr_eq(&c, &second)).unwrap_or(false));
    }

    #[test]
    fn test_new_build_replaces_cached_state() {
        let cache = DerivedStateCache::new();
        let first = cache.resolve(build(), ServerMode::Test, false);
        let second = cache.resolve(build(), ServerMode::Test, false);
        assert!(!Arc::ptr_eq(&first, &second));
    }
}
