// Copyright 2026 The Inference Relay Project
// SPDX-License-Identifier: Apache-2.0

use std::path::PathBuf;
use std::sync::Arc;

use clap::Parser;
use inference_relay::config::{self, Config};
use inference_relay::proxy::{self, Dispatcher};
use inference_relay::upstream::{ReqwestUpstreamClient, UpstreamClient};
use tracing_subscriber::EnvFilter;

#[derive(Parser)]
#[command(
    name = "inference-relay",
    about = "Streaming relay between a chat UI and a local inference backend"
)]
struct Cli {
    /// Path to the relay YAML config file. Built-in defaults when omitted.
    #[arg(long, env = "RELAY_CONFIG")]
    config: Option<PathBuf>,

    /// Port to listen on
    #[arg(long, default_value_t = proxy::DEFAULT_PORT, env = "RELAY_PORT")]
    port: u16,
}

#[tokio::main]
async fn main() {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    tracing_subscriber::fmt()
        .json()
        .with_env_filter(filter)
        .with_target(false)
        .with_writer(std::io::stderr)
        .init();

    let cli = Cli::parse();
    let addr = proxy::bind_addr(cli.port);
    tracing::info!(%addr, "inference-relay starting");

    let config = match cli.config {
        Some(path) => match config::load_config(&config::FileSource { path }) {
            Ok(c) => c,
            Err(e) => {
                tracing::error!("failed to load config: {e}");
                std::process::exit(1);
            }
        },
        None => Config::default(),
    };
    let config = Arc::new(config);

    tracing::info!(
        upstream = %config.upstream.base_url,
        generate_path = %config.routes.generate_path,
        idle_timeout_ms = config.stream.idle_timeout.map(|d| d.as_millis() as u64),
        max_record_bytes = config.stream.max_record_bytes,
        config_hash = %config.config_hash,
        "config loaded"
    );

    let client = match ReqwestUpstreamClient::from_config(&config.upstream) {
        Ok(client) => client,
        Err(e) => {
            tracing::error!("failed to build upstream client: {e}");
            std::process::exit(1);
        }
    };
    let upstream: Arc<dyn UpstreamClient> = Arc::new(client);

    let app = proxy::build_router(Dispatcher::new(upstream, config));

    let listener = match tokio::net::TcpListener::bind(addr).await {
        Ok(listener) => listener,
        Err(e) => {
            tracing::error!(%addr, "failed to bind: {e}");
            std::process::exit(1);
        }
    };
    tracing::info!(%addr, "inference-relay listening");

    if let Err(e) = axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await
    {
        tracing::error!("server error: {e}");
        std::process::exit(1);
    }
    tracing::info!("inference-relay stopped");
}

async fn shutdown_signal() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        tracing::error!("failed to listen for shutdown signal: {e}");
        std::future::pending::<()>().await;
    }
    tracing::info!("shutdown signal received");
}
