//! Axum router construction.

use axum::{routing::get, Router};
use tower_http::trace::TraceLayer;

use super::{handlers, state::AppState};
use crate::GatewayLayer;

/// Build the gateway [`Router`]: `/health` plus a forwarding fallback, all
/// behind the decrypting [`GatewayLayer`].
pub fn build(state: AppState) -> Router {
    let gateway = GatewayLayer::new(state.config.clone());
    Router::new()
        .route("/health", get(handlers::health))
        .fallback(handlers::forward)
        .layer(gateway)
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;

    use axum::{
        body::Body,
        http::{Request, StatusCode, Version},
        routing::get,
    };
    use base64::{engine::general_purpose::STANDARD, Engine as _};
    use common::{ProtocolConfig, ProtocolSettings};
    use tower::ServiceExt;

    fn config() -> Arc<ProtocolConfig> {
        let settings = ProtocolSettings {
            keys: format!("default:{}", STANDARD.encode([1u8; 32])),
            this_solution_id: "B".into(),
            ..ProtocolSettings::default()
        };
        Arc::new(ProtocolConfig::from_settings(settings).unwrap())
    }

    /// Serve a one-route application on an ephemeral local port.
    async fn local_upstream() -> String {
        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        let app = Router::new().route("/x", get(|| async { "upstream ok" }));
        tokio::spawn(async move { axum::serve(listener, app).await.unwrap() });
        addr.to_string()
    }

    fn state() -> AppState {
        // Nothing listens on port 9 (discard); forwarding must fail cleanly.
        AppState::new(config(), "127.0.0.1:9")
    }

    #[tokio::test]
    async fn health_route_is_answered_locally() {
        let app = build(state());
        let req = Request::builder()
            .uri("/health")
            .body(Body::empty())
            .unwrap();
        let resp = app.oneshot(req).await.unwrap();
        assert_eq!(resp.status(), StatusCode::OK);
    }

    #[tokio::test]
    async fn encrypted_request_without_key_id_is_rejected_before_forwarding() {
        let app = build(state());
        let req = Request::builder()
            .uri("/orders")
            .header("x-encrypted", "1")
            .body(Body::empty())
            .unwrap();
        let resp = app.oneshot(req).await.unwrap();
        assert_eq!(resp.status(), StatusCode::BAD_REQUEST);
    }

    #[tokio::test]
    async fn unreachable_upstream_returns_502() {
        let app = build(state());
        let req = Request::builder()
            .uri("/orders")
            .body(Body::from("plain"))
            .unwrap();
        let resp = app.oneshot(req).await.unwrap();
        assert_eq!(resp.status(), StatusCode::BAD_GATEWAY);
    }

    #[tokio::test]
    async fn forwards_any_inbound_http_version_over_http1() {
        let upstream = local_upstream().await;

        for version in [Version::HTTP_11, Version::HTTP_2] {
            let app = build(AppState::new(config(), &upstream));
            let req = Request::builder()
                .version(version)
                .uri("/x")
                .body(Body::empty())
                .unwrap();
            let resp = app.oneshot(req).await.unwrap();
            assert_eq!(resp.status(), StatusCode::OK, "inbound {version:?}");
            let body = axum::body::to_bytes(resp.into_body(), usize::MAX).await.unwrap();
            assert_eq!(&body[..], b"upstream ok");
        }
    }
}
