use anyhow::Context;
use badges::config::{DEFAULT_CONFIG_PATH, Settings};
use badges::{AppState, RelayRegistry, app_router};
use clap::Parser;
use nostr_client::{RelayPool, WsConnector};
use std::path::PathBuf;
use tracing::{info, warn};
use tracing_subscriber::prelude::*;

#[derive(Debug, Parser)]
#[command(name = "badges", about = "NIP-58 badge service over Nostr relays")]
struct Args {
    /// Settings file; missing files are ignored
    #[arg(long, env = "BADGES_CONFIG", default_value = DEFAULT_CONFIG_PATH)]
    config: PathBuf,

    /// Overrides `server.host`
    #[arg(long)]
    host: Option<String>,

    /// Overrides `server.port`
    #[arg(long)]
    port: Option<u16>,
}

fn init_tracing() {
    use tracing_subscriber::{EnvFilter, fmt};
    let _ = tracing_subscriber::registry()
        .with(EnvFilter::try_from_default_env().unwrap_or_else(|_| "info".into()))
        .with(fmt::layer().with_writer(std::io::stderr))
        .try_init();
}

async fn shutdown_signal() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        warn!("Failed to listen for shutdown signal: {}", e);
        std::future::pending::<()>().await;
    }
    info!("Shutting down");
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    dotenvy::dotenv().ok();
    init_tracing();
    let args = Args::parse();

    if rustls::crypto::ring::default_provider()
        .install_default()
        .is_err()
    {
        warn!("TLS crypto provider was already installed");
    }

    let mut settings = Settings::load(&args.config)
        .with_context(|| format!("loading settings from {}", args.config.display()))?;
    if let Some(host) = args.host {
        settings.server.host = host;
    }
    if let Some(port) = args.port {
        settings.server.port = port;
    }

    let pool = RelayPool::new(WsConnector::new(settings.relays.relay_config()));
    let relays = RelayRegistry::with_relays(settings.relays.urls.clone())
        .context("invalid relay list in settings")?;
    if !relays.is_configured() {
        warn!("No relays configured; badge routes stay disabled until POST /relay-config");
    }
    let state = AppState::new(pool, relays, settings.cache.response_cache());

    let addr = format!("{}:{}", settings.server.host, settings.server.port);
    let listener = tokio::net::TcpListener::bind(&addr)
        .await
        .with_context(|| format!("binding {}", addr))?;
    info!("Server listening on {}", addr);

    axum::serve(listener, app_router(state))
        .with_graceful_shutdown(shutdown_signal())
        .await?;
    Ok(())
}
