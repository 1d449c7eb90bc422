//! Relay handler for the dispatcher sidecar.

use axum::{
    extract::{Request, State},
    http::{header, uri::PathAndQuery, StatusCode, Uri, Version},
    response::{IntoResponse, Response},
};
use common::headers::remove_hop_by_hop;
use tower::ServiceExt;
use tracing::warn;

use super::state::AppState;

/// Encrypt the local request, send it to the remote gateway and hand back the
/// decrypted response. Failures become a short plain-text status.
pub async fn relay(State(state): State<AppState>, req: Request) -> Response {
    let (mut parts, body) = req.into_parts();

    let path = parts
        .uri
        .path_and_query()
        .map(PathAndQuery::as_str)
        .unwrap_or("/");
    parts.uri = match Uri::try_from(format!("http://{}{}", state.remote_addr, path)) {
        Ok(uri) => uri,
        Err(e) => {
            warn!(error = %e, "invalid remote uri");
            return (StatusCode::BAD_GATEWAY, "Remote unavailable.").into_response();
        }
    };
    remove_hop_by_hop(&mut parts.headers);
    parts.headers.remove(header::HOST);
    // The client pool speaks HTTP/1 only, whatever the inbound version.
    parts.version = Version::HTTP_11;

    match state.dispatch.oneshot(Request::from_parts(parts, body)).await {
        Ok(mut resp) => {
            remove_hop_by_hop(resp.headers_mut());
            resp
        }
        Err(e) => {
            let status = e.http_status();
            warn!(
                error = %e,
                status = status.as_u16(),
                remote = %state.remote_addr,
                "dispatch failed"
            );
            (status, status.canonical_reason().unwrap_or("Dispatch failed.")).into_response()
        }
    }
}
