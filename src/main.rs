// Copyright 2026 The Parapet Project
// SPDX-License-Identifier: Apache-2.0

use clap::Parser;
use gemini_relay::config;
use gemini_relay::engine;
use gemini_relay::proxy;

use std::net::{IpAddr, SocketAddr};
use std::path::PathBuf;
use std::sync::Arc;
use tracing_subscriber::EnvFilter;

const DEFAULT_CONFIG_PATH: &str = "relay.yaml";

#[derive(Parser)]
#[command(name = "gemini-relay", about = "Streaming relay for the Gemini API")]
struct Cli {
    /// Path to the relay.yaml config file (defaults apply when omitted and absent)
    #[arg(long, env = "RELAY_CONFIG")]
    config: Option<PathBuf>,

    /// Port to listen on
    #[arg(long, default_value_t = 3000, env = "RELAY_PORT")]
    port: u16,

    /// Address to bind
    #[arg(long, default_value = "127.0.0.1", env = "RELAY_BIND")]
    bind: IpAddr,
}

#[tokio::main]
async fn main() {
    tracing_subscriber::fmt()
        .json()
        .with_target(false)
        .with_writer(std::io::stderr)
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .init();

    let cli = Cli::parse();

    let addr = SocketAddr::new(cli.bind, cli.port);
    tracing::info!(%addr, "gemini-relay starting");

    let config = match load(cli.config) {
        Ok(c) => Arc::new(c),
        Err(e) => {
            tracing::error!("failed to load config: {e}");
            std::process::exit(1);
        }
    };

    tracing::info!(
        environment = %config.environment,
        upstream = %config.upstream.base_url,
        idle_timeout_ms = config.stream.idle_timeout.map(|d| d.as_millis() as u64),
        selection = ?config.credentials.selection,
        configured_keys = config.credentials.keys.len(),
        "config loaded"
    );

    let upstream: Arc<dyn proxy::UpstreamClient> = Arc::new(engine::build_engine_client(config));

    let app = proxy::build_router(upstream);

    let listener = tokio::net::TcpListener::bind(addr)
        .await
        .expect("failed to bind to address");

    tracing::info!(%addr, "gemini-relay listening");

    axum::serve(listener, app)
        .await
        .expect("server error");
}

/// An explicit path must load; the default path is optional.
fn load(path: Option<PathBuf>) -> Result<config::Config, config::ConfigError> {
    let path = match path {
        Some(p) => p,
        None => {
            let default = PathBuf::from(DEFAULT_CONFIG_PATH);
            if !default.exists() {
                tracing::info!("no {DEFAULT_CONFIG_PATH} found, using defaults");
                return Ok(config::Config::default());
            }
            default
        }
    };
    config::load_config(&config::FileSource::new(path))
}
