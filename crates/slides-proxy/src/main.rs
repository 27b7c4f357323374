//! Standalone video proxy binary.

use tracing::{error, info};
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

use slides_proxy::{ProxyConfig, ProxyServer};

#[tokio::main]
async fn main() {
    // Load environment variables
    dotenvy::dotenv().ok();

    // Install rustls crypto provider (required for rustls 0.23+)
    rustls::crypto::ring::default_provider()
        .install_default()
        .expect("Failed to install rustls crypto provider");

    let use_json = std::env::var("LOG_FORMAT")
        .map(|v| v.to_lowercase() == "json")
        .unwrap_or(false);

    let env_filter = EnvFilter::from_default_env()
        .add_directive("slides=info".parse().unwrap());

    if use_json {
        tracing_subscriber::registry()
            .with(fmt::layer().json())
            .with(env_filter)
            .init();
    } else {
        tracing_subscriber::registry()
            .with(
                fmt::layer()
                    .with_ansi(true)
                    .with_target(true)
                    .with_thread_ids(false)
                    .with_file(false)
                    .with_line_number(false),
            )
            .with(env_filter)
            .init();
    }

    info!("Starting slides-proxy");

    let config = ProxyConfig::from_env();
    let server = match ProxyServer::start(config).await {
        Ok(server) => server,
        Err(e) => {
            error!("Failed to start proxy: {}", e);
            std::process::exit(1);
        }
    };

    let status = server.network_status();
    info!(
        port = server.port(),
        mode = ?status.mode,
        mappings = status.mapping_count,
        "Proxy ready"
    );

    shutdown_signal().await;
    server.stop().await;

    info!("Proxy shutdown complete");
}

async fn shutdown_signal() {
    tokio::signal::ctrl_c()
        .await
        .expect("Failed to install CTRL+C handler");
    info!("Received shutdown signal");
}
