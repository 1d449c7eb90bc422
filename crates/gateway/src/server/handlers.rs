//! Axum request handlers for the gateway sidecar.

use axum::{
    body::Body,
    extract::{Request, State},
    http::{header, uri::PathAndQuery, StatusCode, Uri, Version},
    response::{IntoResponse, Response},
    Json,
};
use common::headers::remove_hop_by_hop;
use serde::Serialize;
use tracing::warn;

use super::state::AppState;

const UPSTREAM_UNAVAILABLE: &str = "Upstream unavailable.";

/// Response body for `GET /health`.
#[derive(Debug, Serialize)]
pub struct HealthResponse {
    pub status: &'static str,
    pub solution_id: String,
    pub keys_loaded: usize,
}

/// `GET /health`: liveness check; never forwarded upstream.
pub async fn health(State(state): State<AppState>) -> Json<HealthResponse> {
    Json(HealthResponse {
        status: "ok",
        solution_id: state.config.this_solution_id.clone(),
        keys_loaded: state.config.keys().len(),
    })
}

/// Fallback handler: relay the (already decrypted) request to the upstream
/// application and return its response unchanged.
pub async fn forward(State(state): State<AppState>, req: Request) -> Response {
    let (mut parts, body) = req.into_parts();

    let path = parts
        .uri
        .path_and_query()
        .map(PathAndQuery::as_str)
        .unwrap_or("/");
    parts.uri = match Uri::try_from(format!("http://{}{}", state.upstream_addr, path)) {
        Ok(uri) => uri,
        Err(e) => {
            warn!(error = %e, "invalid upstream uri");
            return (StatusCode::BAD_GATEWAY, UPSTREAM_UNAVAILABLE).into_response();
        }
    };
    remove_hop_by_hop(&mut parts.headers);
    parts.headers.remove(header::HOST);
    // The client pool speaks HTTP/1 only, whatever the inbound version.
    parts.version = Version::HTTP_11;

    match state.client.request(Request::from_parts(parts, body)).await {
        Ok(resp) => {
            let (mut parts, body) = resp.into_parts();
            remove_hop_by_hop(&mut parts.headers);
            Response::from_parts(parts, Body::new(body))
        }
        Err(e) => {
            warn!(error = %e, upstream = %state.upstream_addr, "upstream request failed");
            (StatusCode::BAD_GATEWAY, UPSTREAM_UNAVAILABLE).into_response()
        }
    }
}

