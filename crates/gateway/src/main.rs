//! `gateway`: decrypting sidecar entry point.
//!
//! Startup sequence:
//! 1. Load and validate [`Settings`] and the protocol configuration from
//!    environment variables.
//! 2. Initialise the telemetry pipeline (JSON logs, optional OTLP spans).
//! 3. Build the Axum router around the upstream forwarder and serve it.

use std::sync::Arc;

use anyhow::{Context, Result};
use common::ProtocolConfig;
use tracing::info;

use gateway::{
    server::{self, state::AppState},
    settings::Settings,
    telemetry,
};

#[tokio::main]
async fn main() -> Result<()> {
    // -----------------------------------------------------------------------
    // 1. Configuration
    // -----------------------------------------------------------------------
    let settings = Settings::from_env().map_err(|e| {
        // Telemetry is not yet up; write to stderr directly.
        eprintln!("ERROR: gateway configuration invalid: {e:#}");
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
    telemetry::init_telemetry(
        settings.otel_exporter_otlp_endpoint.as_deref(),
        &settings.log_level,
    )?;
    info!(
        version = env!("CARGO_PKG_VERSION"),
        solution_id = %protocol.this_solution_id,
        keys = protocol.keys().len(),
        mirror = protocol.mirror_encrypt_response,
        "gateway starting"
    );

    // -----------------------------------------------------------------------
    // 3. HTTP server
    // -----------------------------------------------------------------------
    let state = AppState::new(Arc::new(protocol), &settings.upstream_addr);
    let router = server::router::build(state);

    let addr: std::net::SocketAddr = ([0, 0, 0, 0], settings.listen_port).into();
    info!(addr = %addr, upstream = %settings.upstream_addr, "listening");

    let listener = tokio::net::TcpListener::bind(addr).await?;
    axum::serve(listener, router).await?;

    Ok(())
}
