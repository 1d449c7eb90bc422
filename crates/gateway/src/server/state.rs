//! Shared application state injected into every Axum handler.

use std::sync::Arc;

use axum::body::Body;
use common::ProtocolConfig;
use hyper_util::{
    client::legacy::{connect::HttpConnector, Client},
    rt::TokioExecutor,
};

/// HTTP/1 client used to reach the upstream application.
pub type UpstreamClient = Client<HttpConnector, Body>;

/// Application state shared across all request handlers.
///
/// All fields are cheaply cloneable so Axum can clone the state per request.
#[derive(Clone)]
pub struct AppState {
    /// Immutable protocol configuration.
    pub config: Arc<ProtocolConfig>,
    /// Pooled client for the upstream application.
    pub client: UpstreamClient,
    /// `host:port` of the upstream application.
    pub upstream_addr: Arc<str>,
}

impl AppState {
    /// Create a new [`AppState`] with a fresh connection pool.
    pub fn new(config: Arc<ProtocolConfig>, upstream_addr: &str) -> Self {
        Self {
            config,
            client: Client::builder(TokioExecutor::new()).build_http(),
            upstream_addr: Arc::from(upstream_addr),
        }
    }
}
