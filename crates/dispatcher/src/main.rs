//! `dispatcher`: encrypting forward-proxy entry point.
//!
//! Startup sequence:
//! 1. Load and validate [`Settings`] and the protocol configuration.
//! 2. Initialise JSON logging.
//! 3. Build the [`DispatchLayer`] for the target solution and serve the relay.

use std::sync::Arc;

use anyhow::{Context, Result};
use common::ProtocolConfig;
use tracing::info;

use dispatcher::{
    server::{self, state::AppState},
    settings::Settings,
    telemetry, DispatchLayer,
};

#[tokio::main]
async fn main() -> Result<()> {
    // -----------------------------------------------------------------------
    // 1. Configuration
    // -----------------------------------------------------------------------
    let settings = Settings::from_env().map_err(|e| {
        eprintln!("ERROR: dispatcher configuration invalid: {e:#}");
        e
    })?;
    let protocol = ProtocolConfig::from_env()
        .context("protocol configuration invalid")
        .map_err(|e| {
            eprintln!("ERROR: {e:#}");
            e
        })?;

    // -----------------------------------------------------------------------
    // 2. Telemetry
    // -----------------------------------------------------------------------
    telemetry::init(&settings.log_level)?;

    // -----------------------------------------------------------------------
    // 3. Relay server
    // -----------------------------------------------------------------------
    let layer = DispatchLayer::new(
        Arc::new(protocol),
        &settings.target_solution_id,
        settings.key_id.as_deref(),
    )
    .context("invalid dispatch route")?;
    let router = server::router::build(AppState::new(&layer, &settings.remote_addr));

    let addr: std::net::SocketAddr = ([0, 0, 0, 0], settings.listen_port).into();
    info!(
        version = env!("CARGO_PKG_VERSION"),
        addr = %addr,
        remote = %settings.remote_addr,
        target_solution = %settings.target_solution_id,
        "dispatcher listening"
    );

    let listener = tokio::net::TcpListener::bind(addr).await?;
    axum::serve(listener, router).await?;

    Ok(())
}
