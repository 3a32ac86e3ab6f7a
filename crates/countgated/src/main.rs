//! countgated: the countgate daemon.
//!
//! Loads configuration, connects to the backing store, and serves the
//! counter API until interrupted.
//!
//! # Usage
//!
//! ```text
//! countgated serve --config countgate.toml --port 5000
//! COUNTAPI_REDIS_URL=rediss://:secret@cache:6380 countgated serve
//! countgated config --store-url memory://
//! ```

use std::net::{IpAddr, SocketAddr};
use std::path::PathBuf;
use std::sync::Arc;

use anyhow::Context;
use clap::{Args, Parser, Subcommand};
use countgate_api::Gateway;
use countgate_core::GatewayConfig;
use countgate_core::config::STORE_URL_ENV;
use countgate_store::ClientOptions;
use tracing::{error, info};

const DEFAULT_LOG_FILTER: &str = "info,countgated=debug,countgate_api=debug";

#[derive(Parser)]
#[command(name = "countgated", about = "countgate HTTP counter gateway")]
struct Cli {
    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Serve the counter API.
    Serve(Overrides),
    /// Print the effective configuration and exit.
    Config(Overrides),
}

#[derive(Args)]
struct Overrides {
    /// Path to a countgate.toml file.
    #[arg(long)]
    config: Option<PathBuf>,

    /// Address to bind.
    #[arg(long)]
    bind: Option<String>,

    /// Port to listen on.
    #[arg(long)]
    port: Option<u16>,

    /// Store URL (redis://, rediss://, memory://, file://). Overrides the
    /// environment.
    #[arg(long)]
    store_url: Option<String>,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new(DEFAULT_LOG_FILTER)),
        )
        .init();

    let cli = Cli::parse();

    match cli.command {
        Command::Serve(overrides) => {
            let config = load_config(overrides)?;
            serve(config).await
        }
        Command::Config(overrides) => {
            let mut config = load_config(overrides)?;
            // Never echo credentials.
            config.store.url = config.store.parsed_url()?.to_string();
            print!("{}", config.to_toml_string()?);
            Ok(())
        }
    }
}

/// Defaults, then the file, then the environment, then flags.
fn load_config(overrides: Overrides) -> anyhow::Result<GatewayConfig> {
    let mut config = match &overrides.config {
        Some(path) => GatewayConfig::from_file(path)
            .with_context(|| format!("failed to load config from {}", path.display()))?,
        None => GatewayConfig::default(),
    };

    config = config.with_store_url_override(std::env::var(STORE_URL_ENV).ok());

    if let Some(bind) = overrides.bind {
        config.server.bind = bind;
    }
    if let Some(port) = overrides.port {
        config.server.port = port;
    }
    if let Some(url) = overrides.store_url {
        config.store.url = url;
    }

    config.validate().context("invalid configuration")?;
    Ok(config)
}

async fn serve(config: GatewayConfig) -> anyhow::Result<()> {
    info!("countgate daemon starting");

    // ── Connect to the store ───────────────────────────────────

    let url = config.store.parsed_url()?;
    let opts = ClientOptions {
        connect_timeout: config.store.connect_timeout()?,
        response_timeout: config.store.response_timeout()?,
        retries: config.store.retries,
    };
    let store = countgate_store::connect(&url, &opts)
        .await
        .with_context(|| format!("failed to connect to store at {url}"))?;

    let gateway = Arc::new(Gateway::new(store, config.store.health_timeout()?));

    // ── Start API server ───────────────────────────────────────

    let router = countgate_api::build_router(gateway, config.rate_limit.as_ref());
    let ip: IpAddr = config
        .server
        .bind
        .parse()
        .with_context(|| format!("invalid bind address {}", config.server.bind))?;
    let addr = SocketAddr::new(ip, config.server.port);

    info!(%addr, "API server starting");

    let listener = tokio::net::TcpListener::bind(addr)
        .await
        .with_context(|| format!("failed to bind {addr}"))?;

    axum::serve(listener, router)
        .with_graceful_shutdown(shutdown_signal())
        .await?;

    info!("countgate daemon stopped");
    Ok(())
}

async fn shutdown_signal() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        error!(error = %e, "failed to install CTRL+C handler");
        std::future::pending::<()>().await;
    }
    info!("shutdown signal received");
}
