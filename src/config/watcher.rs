//! Hot reload: rebuild the server build when the config file changes.

use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

use arc_swap::ArcSwap;
use notify::{Config, Event, RecommendedWatcher, RecursiveMode, Watcher};

use crate::build::ServerBuild;
use crate::config::loader::{load_config, ConfigError};
use crate::config::schema::ServerConfig;

pub type Rebuild = Arc<dyn Fn(&ServerConfig) -> ServerBuild + Send + Sync>;

/// Swaps a freshly built `ServerBuild` into place whenever the config file
/// changes and still validates. In-flight requests keep the build they
/// started with.
pub struct BuildReloader {
    path: PathBuf,
    builds: Arc<ArcSwap<ServerBuild>>,
    rebuild: Rebuild,
}

impl BuildReloader {
    pub fn new(path: &Path, builds: Arc<ArcSwap<ServerBuild>>, rebuild: Rebuild) -> Self {
        Self {
            path: path.to_path_buf(),
            builds,
            rebuild,
        }
    }

    /// Load, validate, and store. A bad file leaves the current build alone.
    pub fn reload(&self) -> Result<(), ConfigError> {
        let config = load_config(&self.path)?;
        self.builds.store(Arc::new((self.rebuild)(&config)));
        tracing::info!(
            path = ?self.path,
            assets_version = %config.assets.version,
            "Server build reloaded"
        );
        Ok(())
    }

    /// Start watching the file in a background thread.
    pub fn watch(self) -> Result<RecommendedWatcher, notify::Error> {
        let path = self.path.clone();
        let mut watcher = RecommendedWatcher::new(
            move |res: notify::Result<Event>| match res {
                Ok(event) if event.kind.is_modify() || event.kind.is_create() => {
                    if let Err(e) = self.reload() {
                        tracing::error!(error = %e, "Failed to reload config, keeping current build");
                    }
                }
                Ok(_) => {}
                Err(e) => tracing::error!(error = ?e, "Config watch error"),
            },
            Config::default().with_poll_interval(Duration::from_secs(2)),
        )?;

        watcher.watch(&path, RecursiveMode::NonRecursive)?;

        tracing::info!(path = ?path, "Config watcher started");
        Ok(watcher)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::build::{EntryModule, RouteManifest};
    use std::io::Write;

    fn rebuild() -> Rebuild {
        Arc::new(|config: &ServerConfig| {
            ServerBuild::from_config(config, RouteManifest::new(), EntryModule::empty())
        })
    }

    #[test]
    fn test_reload_swaps_build() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        writeln!(file, "[assets]\nversion = \"2\"").unwrap();

        let builds = Arc::new(ArcSwap::from_pointee(ServerBuild::from_config(
            &ServerConfig::default(),
            RouteManifest::new(),
            EntryModule::empty(),
        )));
        let reloader = BuildReloader::new(file.path(), builds.clone(), rebuild());
        reloader.reload().unwrap();
        assert_eq!(builds.load().assets.version, "2");
    }

    #[test]
    fn test_bad_file_keeps_current_build() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        writeln!(file, "[app]\nbasename = \"nope\"").unwrap();

        let builds = Arc::new(ArcSwap::from_pointee(ServerBuild::from_config(
            &ServerConfig::default(),
            RouteManifest::new(),
            EntryModule::empty(),
        )));
        let before = builds.load_full();
        let reloader = BuildReloader::new(file.path(), builds.clone(), rebuild());
        assert!(reloader.reload().is_err());
        assert!(Arc::ptr_eq(&before, &builds.load_full()));
    }
}
