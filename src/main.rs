// Parts of the pkt-line and classifier APIs (decoding, the extension field)
// are exercised only by the test suite.  Allow dead_code rather than
// cfg-gating them out of the binary.
#![allow(dead_code)]

mod config;
mod content;
mod git;
mod http;
mod server;
mod watch;

use std::path::{Path, PathBuf};
use std::sync::Arc;

use anyhow::{Context, Result};
use arc_swap::ArcSwap;
use clap::Parser;
use tokio::signal;
use tokio::sync::mpsc;
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;
use tracing_subscriber::EnvFilter;

use crate::config::Config;
use crate::content::site::SiteSnapshot;
use crate::watch::ChangeWatcher;

// ---------------------------------------------------------------------------
// CLI
// ---------------------------------------------------------------------------

#[derive(Parser, Debug)]
#[command(name = "hearth", about = "Self-updating static site host with Git smart HTTP serving")]
struct Cli {
    /// Path to the YAML configuration file.  Built-in defaults are used if
    /// the file does not exist.
    #[arg(short, long, default_value = "hearth.yaml")]
    config: String,
}

// ---------------------------------------------------------------------------
// Shared application state
// ---------------------------------------------------------------------------

/// Global state shared across all request handlers and the rebuild loop.
pub struct AppState {
    pub config: Arc<Config>,
    /// Canonicalized content root.
    pub root: PathBuf,
    /// The currently served site.  Replaced wholesale, never mutated.
    pub site: ArcSwap<SiteSnapshot>,
}

// ---------------------------------------------------------------------------
// HTTP server (axum)
// ---------------------------------------------------------------------------

async fn run_http_server(state: Arc<AppState>) -> Result<()> {
    let app = http::handler::create_router(Arc::clone(&state));

    let listen_addr: std::net::SocketAddr = state
        .config
        .server
        .http_listen
        .parse()
        .context("invalid http_listen address")?;

    let listener = tokio::net::TcpListener::bind(listen_addr)
        .await
        .with_context(|| format!("failed to bind HTTP listener on {listen_addr}"))?;

    tracing::info!(%listen_addr, "HTTP server listening");

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await
        .context("HTTP server error")?;

    Ok(())
}

// ---------------------------------------------------------------------------
// Graceful shutdown
// ---------------------------------------------------------------------------

async fn shutdown_signal() {
    let ctrl_c = async {
        signal::ctrl_c()
            .await
            .expect("failed to install Ctrl+C handler");
    };

    #[cfg(unix)]
    let terminate = async {
        signal::unix::signal(signal::unix::SignalKind::terminate())
            .expect("failed to install SIGTERM handler")
            .recv()
            .await;
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        () = ctrl_c => tracing::info!("received SIGINT"),
        () = terminate => tracing::info!("received SIGTERM"),
    }
}

// ---------------------------------------------------------------------------
// Main
// ---------------------------------------------------------------------------

#[tokio::main]
async fn main() -> Result<()> {
    // ---- CLI ----
    let cli = Cli::parse();

    // ---- Config ----
    let config = if Path::new(&cli.config).exists() {
        config::load_config(&cli.config)?
    } else {
        Config::default()
    };
    let config = Arc::new(config);

    // ---- Tracing ----
    tracing_subscriber::registry()
        .with(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .with(tracing_subscriber::fmt::layer())
        .init();

    tracing::info!(config_path = %cli.config, "starting hearth");

    // ---- Initial site build ----
    let root = std::fs::canonicalize(&config.content.root)
        .with_context(|| format!("failed to resolve content root: {}", config.content.root))?;

    let snapshot = server::build_site(&root, &config.content)
        .with_context(|| format!("initial site build failed for {}", root.display()))?;

    tracing::info!(
        root = %root.display(),
        routes = snapshot.route_count(),
        git_prefixes = snapshot.passthrough_count(),
        "initial site built"
    );

    let state = Arc::new(AppState {
        config: Arc::clone(&config),
        root: root.clone(),
        site: ArcSwap::from_pointee(snapshot),
    });

    // ---- Live reload ----
    let watcher =
        ChangeWatcher::install(&root, &config.content.git_dirs).context("initial watch setup failed")?;

    let (err_tx, mut err_rx) = mpsc::unbounded_channel();
    tokio::spawn(server::run_rebuild_loop(Arc::clone(&state), watcher, err_tx));

    // The rebuild error channel is the operator surface: entries are logged
    // as they arrive, and a closed channel means the site will no longer
    // update until the process is restarted.
    tokio::spawn(async move {
        while let Some(e) = err_rx.recv().await {
            tracing::error!(error = %e, "live reload failed");
        }
        tracing::error!("live reload stopped; served content is stale until restart");
    });

    // ---- Serve ----
    run_http_server(state).await
}
