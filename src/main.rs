use std::net::SocketAddr;
use std::path::PathBuf;

use anyhow::anyhow;
use clap::Parser;
use tokio::net::TcpListener;
use tracing::{info, warn};
use tracing_subscriber::EnvFilter;

use v2v_gateway::{ServerConfig, core::get_supported_backends, global_registry, routes, state::AppState};

/// V2V Gateway - Real-time voice-to-voice relay between devices and agent backends
#[derive(Parser, Debug)]
#[command(name = "v2v-gateway")]
#[command(version, about, long_about = None)]
struct Cli {
    /// Path to configuration file (YAML)
    #[arg(short = 'c', long = "config", value_name = "FILE")]
    config: Option<PathBuf>,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Load .env file if it exists (must be done before config loading)
    let _ = dotenvy::dotenv();

    // Initialize tracing
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .init();

    // Initialize crypto provider for TLS connections
    // This must be done before any TLS connections are attempted
    rustls::crypto::ring::default_provider()
        .install_default()
        .map_err(|_| anyhow!("Failed to install default crypto provider"))?;

    let cli = Cli::parse();

    // Load configuration from file or environment
    let config = if let Some(config_path) = cli.config {
        info!("Loading configuration from {}", config_path.display());
        ServerConfig::from_file(&config_path)?
    } else {
        ServerConfig::from_env()?
    };

    // Initialize the plugin registry (including built-in providers)
    let registry = global_registry();
    if !registry.has_backend_provider(&config.v2v.provider) {
        anyhow::bail!(
            "Unknown backend provider '{}'. Available providers: {:?}",
            config.v2v.provider,
            get_supported_backends()
        );
    }
    if config.v2v.enabled && !config.v2v.has_credentials() {
        warn!("No backend credentials configured; conversations will fail to start");
    }
    info!(
        provider = %config.v2v.provider,
        v2v_enabled = config.v2v.enabled,
        "Voice-to-voice backend configured"
    );

    let address = config.address();
    let socket_addr: SocketAddr = address
        .parse()
        .map_err(|e| anyhow!("Invalid server address '{}': {}", address, e))?;

    let app_state = AppState::new(config);
    let app = routes::create_app(app_state.clone());

    let listener = TcpListener::bind(socket_addr)
        .await
        .map_err(|e| anyhow!("Failed to bind {}: {}", socket_addr, e))?;
    info!("Server listening on http://{}", socket_addr);

    axum::serve(
        listener,
        app.into_make_service_with_connect_info::<SocketAddr>(),
    )
    .with_graceful_shutdown(shutdown_signal())
    .await
    .map_err(|e| anyhow!("Server error: {}", e))?;

    app_state.shutdown_sessions().await;
    info!("Server stopped");

    Ok(())
}

async fn shutdown_signal() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        warn!("Failed to listen for shutdown signal: {}", e);
        std::future::pending::<()>().await;
    }
    info!("Shutdown signal received");
}
