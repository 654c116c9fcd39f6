use std::net::SocketAddr;
use std::path::PathBuf;
use std::sync::Arc;

use anyhow::{Context, Result};
use clap::Parser;
use tokio::net::TcpListener;
use tracing::{info, warn};
use tracing_subscriber::{EnvFilter, layer::SubscriberExt, util::SubscriberInitExt};

use taixiu_feed::api::{self, AppState};
use taixiu_feed::upstream::UpstreamClient;
use taixiu_feed::{Config, HistoryStore, Poller, SharedPollStatus};

#[derive(Parser, Debug)]
#[command(name = "taixiu-feed")]
#[command(about = "Polls a TaiXiu round-result feed and serves the recent history")]
#[command(version)]
struct Cli {
    /// Port to listen on
    #[arg(short, long, env = "PORT", default_value = "8000")]
    port: u16,

    /// Address to bind to
    #[arg(short, long, env = "TAIXIU_FEED_BIND", default_value = "0.0.0.0")]
    bind: String,

    /// Config file path (optional)
    #[arg(short, long, env = "TAIXIU_FEED_CONFIG")]
    config: Option<PathBuf>,

    /// Enable verbose logging
    #[arg(short, long, env = "TAIXIU_FEED_VERBOSE")]
    verbose: bool,

    /// Emit logs as JSON lines
    #[arg(long, env = "TAIXIU_FEED_LOG_JSON")]
    json: bool,
}

fn init_logging(cli: &Cli) {
    let level = if cli.verbose { "debug" } else { "info" };
    let env_filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(format!("taixiu_feed={level},tower_http={level}")));

    if cli.json {
        tracing_subscriber::registry()
            .with(env_filter)
            .with(tracing_subscriber::fmt::layer().json())
            .try_init()
            .ok();
    } else {
        tracing_subscriber::registry()
            .with(env_filter)
            .with(tracing_subscriber::fmt::layer())
            .try_init()
            .ok();
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();
    init_logging(&cli);

    // Load config from file if provided, otherwise use defaults
    let config = match &cli.config {
        Some(path) => Config::from_file(path)
            .with_context(|| format!("loading config from {}", path.display()))?,
        None => Config::default(),
    };

    let history = Arc::new(HistoryStore::new(config.history_capacity));
    let poll_status = SharedPollStatus::default();

    let client = UpstreamClient::from_config(&config).context("creating upstream client")?;
    let _poller = Poller::new(client, history.clone(), poll_status.clone(), &config).spawn();
    info!(
        capacity = history.capacity(),
        "started background polling of round results"
    );

    let state = AppState::new(history, poll_status, config.history_path.clone());
    let app = api::create_router(state);

    let addr: SocketAddr = format!("{}:{}", cli.bind, cli.port)
        .parse()
        .context("invalid address")?;
    let listener = TcpListener::bind(addr)
        .await
        .with_context(|| format!("binding to {addr}"))?;
    info!("Listening on http://{} (history at {})", addr, config.history_path);

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await
        .context("running server")?;

    info!("Shutdown complete");
    Ok(())
}

async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(err) = tokio::signal::ctrl_c().await {
            warn!("failed to listen for Ctrl+C: {}", err);
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate()) {
            Ok(mut signal) => {
                signal.recv().await;
            }
            Err(err) => {
                warn!("failed to install SIGTERM handler: {}", err);
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {},
        _ = terminate => {},
    }

    info!("Shutdown signal received");
}
