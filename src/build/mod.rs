//! Server build subsystem.
//!
//! # Data Flow
//! ```text
//! embedding application
//!     → route.rs (route tree, modules, data functions)
//!     → assets.rs (client manifest, one entry per route)
//!     → entry.rs (render function + optional hooks)
//!     → ServerBuild (immutable, shared via Arc)
//!
//! Per request:
//!     BuildSource::load()
//!     → Static: the same Arc every time
//!     → Factory: whatever the closure returns (e.g. a hot-reloaded ArcSwap)
//! ```
//!
//! # Design Decisions
//! - A build is never mutated after construction; reloads produce a new Arc
//! - Build identity (`Arc::ptr_eq`) keys the derived-state cache
//! - User code enters only through boxed closures and the render trait

pub mod assets;
pub mod entry;
pub mod route;

use std::fmt;
use std::future::Future;
use std::sync::Arc;

use arc_swap::ArcSwap;
use futures_util::future::BoxFuture;
use futures_util::FutureExt;
use serde::{Deserialize, Serialize};

use crate::config::ServerConfig;
use crate::errors::DispatchError;

pub use assets::{AssetsManifest, EntryAssets, EntryRoute};
pub use entry::{
    CriticalCss, DataRequestArgs, DevServerHooks, EntryContext, EntryModule, ErrorContext,
    GetCriticalCss, HandleDataRequest, HandleDocumentRequest, HandleErrorFunction, RenderArgs, RenderMeta,
    RenderPass,
};
pub use route::{
    DataFunction, DataFunctionArgs, DataValue, HeadersArgs, HeadersFunction, MiddlewareFunction,
    Params, RouteManifest, RouteModule, ServerRoute,
};

pub const DEFAULT_MANIFEST_PATH: &str = "/__manifest";

/// How much diagnostic detail leaves the server.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ServerMode {
    Development,
    #[default]
    Production,
    Test,
}

impl ServerMode {
    /// Unknown values fall back to production.
    pub fn parse(value: &str) -> Self {
        match value.trim().to_ascii_lowercase().as_str() {
            "development" => ServerMode::Development,
            "test" => ServerMode::Test,
            _ => ServerMode::Production,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            ServerMode::Development => "development",
            ServerMode::Production => "production",
            ServerMode::Test => "test",
        }
    }
}

impl fmt::Display for ServerMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Route discovery strategy advertised to the client.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "mode", rename_all = "lowercase")]
pub enum RouteDiscovery {
    Lazy {
        #[serde(rename = "manifestPath")]
        manifest_path: String,
    },
    Initial,
}

impl Default for RouteDiscovery {
    fn default() -> Self {
        RouteDiscovery::Lazy {
            manifest_path: DEFAULT_MANIFEST_PATH.to_string(),
        }
    }
}

impl RouteDiscovery {
    pub fn manifest_path(&self) -> Option<&str> {
        match self {
            RouteDiscovery::Lazy { manifest_path } => Some(manifest_path),
            RouteDiscovery::Initial => None,
        }
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct FutureConfig {
    pub v8_middleware: bool,
}

/// Everything the dispatcher knows about the application.
#[derive(Clone)]
pub struct ServerBuild {
    pub routes: RouteManifest,
    pub basename: String,
    pub ssr: bool,
    pub prerender: Vec<String>,
    pub route_discovery: RouteDiscovery,
    pub assets: Arc<AssetsManifest>,
    pub entry: EntryModule,
    pub future: FutureConfig,
    pub get_critical_css: Option<GetCriticalCss>,
}

impl ServerBuild {
    /// A build with SSR on, root basename, lazy discovery, and a manifest
    /// generated from the routes.
    pub fn new(routes: RouteManifest, entry: EntryModule) -> Self {
        let assets = Arc::new(AssetsManifest::from_routes("1", "/assets/manifest-1.js", &routes));
        Self {
            routes,
            basename: "/".to_string(),
            ssr: true,
            prerender: Vec::new(),
            route_discovery: RouteDiscovery::default(),
            assets,
            entry,
            future: FutureConfig::default(),
            get_critical_css: None,
        }
    }

    /// Apply the `[app]` and `[assets]` sections of a server config.
    pub fn from_config(config: &ServerConfig, routes: RouteManifest, entry: EntryModule) -> Self {
        let app = &config.app;
        let assets = Arc::new(AssetsManifest::from_routes(
            &config.assets.version,
            &config.assets.url,
            &routes,
        ));
        let route_discovery = if app.lazy_discovery {
            RouteDiscovery::Lazy {
                manifest_path: app.manifest_path.clone(),
            }
        } else {
            RouteDiscovery::Initial
        };
        let mut entry = entry;
        if entry.stream_timeout.is_none() {
            entry.stream_timeout = Some(std::time::Duration::from_millis(app.stream_timeout_ms));
        }
        Self {
            routes,
            basename: app.basename.clone(),
            ssr: app.ssr,
            prerender: app.prerender.clone(),
            route_discovery,
            assets,
            entry,
            future: FutureConfig {
                v8_middleware: app.middleware,
            },
            get_critical_css: None,
        }
    }

    pub fn with_assets(mut self, assets: AssetsManifest) -> Self {
        self.assets = Arc::new(assets);
        self
    }

    pub fn with_basename(mut self, basename: impl Into<String>) -> Self {
        self.basename = basename.into();
        self
    }

    pub fn with_ssr(mut self, ssr: bool, prerender: Vec<String>) -> Self {
        self.ssr = ssr;
        self.prerender = prerender;
        self
    }

    pub fn with_middleware(mut self, enabled: bool) -> Self {
        self.future.v8_middleware = enabled;
        self
    }

    pub fn with_critical_css(mut self, hook: GetCriticalCss) -> Self {
        self.get_critical_css = Some(hook);
        self
    }
}

pub type BuildFuture = BoxFuture<'static, Result<Arc<ServerBuild>, DispatchError>>;

/// Where the dispatcher gets its build from on each request.
#[derive(Clone)]
pub enum BuildSource {
    Static(Arc<ServerBuild>),
    Factory(Arc<dyn Fn() -> BuildFuture + Send + Sync>),
}

impl BuildSource {
    pub fn factory<F, Fut>(f: F) -> Self
    where
        F: Fn() -> Fut + Send + Sync + 'static,
        Fut: Future<Output = Result<Arc<ServerBuild>, DispatchError>> + Send + 'static,
    {
        BuildSource::Factory(Arc::new(move || f().boxed()))
    }

    /// A factory that always hands out the most recently stored build.
    pub fn from_swap(swap: Arc<ArcSwap<ServerBuild>>) -> Self {
        Self::factory(move || {
            let build = swap.load_full();
            async move { Ok(build) }
        })
    }

    pub fn is_dynamic(&self) -> bool {
        matches!(self, BuildSource::Factory(_))
    }

    pub async fn load(&self) -> Result<Arc<ServerBuild>, DispatchError> {
        match self {
            BuildSource::Static(build) => Ok(build.clone()),
            BuildSource::Factory(f) => f().await,
        }
    }
}

impl From<ServerBuild> for BuildSource {
    fn from(build: ServerBuild) -> Self {
        BuildSource::Static(Arc::new(build))
    }
}
