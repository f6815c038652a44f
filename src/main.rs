//! SSR dispatch server.
//!
//! Serves the demo route tree through the request dispatcher.
//!
//! # Architecture Overview
//!
//! ```text
//!     Client Request
//!     ──────────────▶ http::server (request ID, trace, timeout, cancellation)
//!                         │
//!                         ▼
//!                     handler::RequestHandler
//!                         │  build (static or hot-reloaded ArcSwap)
//!                         │  classify → manifest | single fetch | resource | document
//!                         ▼
//!                     data::StaticHandler (middleware, actions, loaders)
//!                         │
//!                         ▼
//!                     entry render (HTML + streamed hand-off)
//!     ◀────────────── Response (HEAD: body stripped)
//! ```

mod demo;

use std::path::PathBuf;
use std::sync::Arc;

use arc_swap::ArcSwap;
use clap::Parser;
use tokio::net::TcpListener;

use ssr_dispatch::build::{BuildSource, ServerBuild, ServerMode};
use ssr_dispatch::config::{load_config, validate_config, BuildReloader, ServerConfig};
use ssr_dispatch::handler::RequestHandler;
use ssr_dispatch::http::HttpServer;
use ssr_dispatch::lifecycle::{wait_for_signal, Shutdown};
use ssr_dispatch::observability::{logging, metrics};

#[derive(Parser)]
#[command(name = "ssr-server")]
#[command(about = "Serve a route tree through the SSR request dispatcher", long_about = None)]
struct Cli {
    /// TOML config file; defaults apply when omitted.
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// Override `listener.bind_address`.
    #[arg(short, long)]
    bind: Option<String>,

    /// Override `app.mode` (development, production, test).
    #[arg(short, long)]
    mode: Option<String>,

    /// Rebuild when the config file changes.
    #[arg(short, long)]
    watch: bool,
}

fn rebuild(config: &ServerConfig) -> ServerBuild {
    ServerBuild::from_config(config, demo::routes(), demo::entry())
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let cli = Cli::parse();

    let mut config = match &cli.config {
        Some(path) => load_config(path)?,
        None => ServerConfig::default(),
    };
    if let Some(bind) = cli.bind {
        config.listener.bind_address = bind;
    }
    if let Some(mode) = cli.mode.as_deref() {
        config.app.mode = ServerMode::parse(mode);
    }
    validate_config(&config).map_err(|errors| {
        let messages: Vec<_> = errors.iter().map(ToString::to_string).collect();
        messages.join(", ")
    })?;

    logging::init(&config.observability);
    tracing::info!(
        bind_address = %config.listener.bind_address,
        mode = %config.app.mode,
        basename = %config.app.basename,
        ssr = config.app.ssr,
        "ssr-server v0.1.0 starting"
    );

    if config.observability.metrics_enabled {
        match config.observability.metrics_address.parse() {
            Ok(addr) => metrics::init_metrics(addr),
            Err(_) => tracing::error!(
                metrics_address = %config.observability.metrics_address,
                "Failed to parse metrics address"
            ),
        }
    }

    let builds = Arc::new(ArcSwap::from_pointee(rebuild(&config)));
    let mut _watcher = None;
    let source = match (&cli.config, cli.watch) {
        (Some(path), true) => {
            let reloader = BuildReloader::new(path, builds.clone(), Arc::new(rebuild));
            _watcher = Some(reloader.watch()?);
            BuildSource::from_swap(builds)
        }
        _ => BuildSource::Static(builds.load_full()),
    };

    let handler = RequestHandler::new(source, config.app.mode)
        .with_build_time_requests(config.app.build_time_requests)
        .with_body_limit(config.app.max_body_bytes);

    let listener = TcpListener::bind(&config.listener.bind_address).await?;
    let shutdown = Shutdown::new();
    tokio::spawn(wait_for_signal(shutdown.clone()));

    HttpServer::new(&config, handler).run(listener, shutdown).await?;

    tracing::info!("Shutdown complete");
    Ok(())
}
