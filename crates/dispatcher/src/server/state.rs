//! Shared state for the dispatcher sidecar.

use std::sync::Arc;

use axum::body::Body;
use hyper_util::{
    client::legacy::{connect::HttpConnector, Client},
    rt::TokioExecutor,
};
use tower::Layer;

use crate::{DispatchLayer, DispatchService};

/// Plain HTTP/1 client to the remote gateway.
pub type RemoteClient = Client<HttpConnector, Body>;

#[derive(Clone)]
pub struct AppState {
    /// Remote client wrapped in the encrypting layer.
    pub dispatch: DispatchService<RemoteClient>,
    /// `host:port` of the remote gateway.
    pub remote_addr: Arc<str>,
}

impl AppState {
    pub fn new(layer: &DispatchLayer, remote_addr: &str) -> Self {
        let client = Client::builder(TokioExecutor::new()).build_http();
        Self {
            dispatch: layer.layer(client),
            remote_addr: Arc::from(remote_addr),
        }
    }
}
