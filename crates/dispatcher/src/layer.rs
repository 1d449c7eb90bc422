//! [`DispatchLayer`]: encrypts outgoing request bodies for one target solution
//! and decrypts the encrypted responses that come back.
//!
//! The outbound leg is bound to `keyId|thisSolutionId|targetSolutionId`; the
//! return leg flips sender and receiver, `keyId|targetSolutionId|thisSolutionId`.

use std::{
    future::Future,
    pin::Pin,
    sync::Arc,
    task::{Context, Poll},
};

use axum::{
    body::Body,
    http::{HeaderValue, Request, Response},
    BoxError,
};
use bytes::Bytes;
use common::{
    body::{collect_limited, BodyError},
    crypto::{self, EncryptedPayload},
    headers::{associated_data, content_type_or_default},
    Envelope, ProtocolConfig, ProtocolError,
};
use tokio::time::{self, Instant};
use tower::{Layer, Service};
use tracing::{debug, warn};

use crate::error::DispatchError;

/// Fixed routing for one dispatcher: who we are, who we call, which key.
#[derive(Debug)]
struct Route {
    config: Arc<ProtocolConfig>,
    key_id: String,
    key_id_value: HeaderValue,
    this_solution: HeaderValue,
    target_solution: HeaderValue,
}

/// Applies the encrypting dispatcher to an HTTP client service.
#[derive(Clone, Debug)]
pub struct DispatchLayer {
    route: Arc<Route>,
}

impl DispatchLayer {
    /// Dispatch to `target_solution_id` using `key_id`, or the configured
    /// default key-id when `None`.
    ///
    /// The key-id is resolved per request, so an unknown id surfaces as
    /// [`ProtocolError::UnknownKeyId`] on the first call.
    ///
    /// # Errors
    ///
    /// Returns [`ProtocolError::InvalidHeaderValue`] if an identifier cannot be
    /// carried in a header.
    pub fn new(
        config: Arc<ProtocolConfig>,
        target_solution_id: &str,
        key_id: Option<&str>,
    ) -> Result<Self, ProtocolError> {
        let key_id = key_id.unwrap_or(&config.default_key_id).to_owned();
        let route = Route {
            key_id_value: header_value(&key_id, "key id")?,
            this_solution: header_value(&config.this_solution_id, "this solution id")?,
            target_solution: header_value(target_solution_id, "target solution id")?,
            key_id,
            config,
        };
        Ok(Self {
            route: Arc::new(route),
        })
    }
}

impl<S> Layer<S> for DispatchLayer {
    type Service = DispatchService<S>;

    fn layer(&self, inner: S) -> Self::Service {
        DispatchService {
            inner,
            route: self.route.clone(),
        }
    }
}

/// Service produced by [`DispatchLayer`].
#[derive(Clone, Debug)]
pub struct DispatchService<S> {
    inner: S,
    route: Arc<Route>,
}

impl<S, ReqBody, ResBody> Service<Request<ReqBody>> for DispatchService<S>
where
    S: Service<Request<Body>, Response = Response<ResBody>> + Clone + Send + 'static,
    S::Future: Send + 'static,
    S::Error: Into<BoxError>,
    ReqBody: http_body::Body<Data = Bytes> + Send + 'static,
    ReqBody::Error: Into<BoxError>,
    ResBody: http_body::Body<Data = Bytes> + Send + 'static,
    ResBody::Error: Into<BoxError>,
{
    type Response = Response<Body>;
    type Error = DispatchError;
    type Future = Pin<Box<dyn Future<Output = Result<Self::Response, Self::Error>> + Send>>;

    fn poll_ready(&mut self, cx: &mut Context<'_>) -> Poll<Result<(), Self::Error>> {
        self.inner
            .poll_ready(cx)
            .map_err(|e| DispatchError::Transport(e.into()))
    }

    fn call(&mut self, req: Request<ReqBody>) -> Self::Future {
        let clone = self.inner.clone();
        let inner = std::mem::replace(&mut self.inner, clone);
        let route = self.route.clone();
        Box::pin(dispatch(route, inner, req.map(Body::new)))
    }
}

async fn dispatch<S, ResBody>(
    route: Arc<Route>,
    mut inner: S,
    req: Request<Body>,
) -> Result<Response<Body>, DispatchError>
where
    S: Service<Request<Body>, Response = Response<ResBody>>,
    S::Error: Into<BoxError>,
    ResBody: http_body::Body<Data = Bytes> + Send + 'static,
    ResBody::Error: Into<BoxError>,
{
    let config = &route.config;
    let key = config.keys().get(&route.key_id)?.as_bytes();

    let (mut parts, body) = req.into_parts();
    let original_content_type = content_type_or_default(&parts.headers);
    let plaintext = collect_limited(body, config.max_body_bytes)
        .await
        .map_err(|e| match e {
            BodyError::TooLarge(limit) => ProtocolError::PayloadTooLarge(limit).into(),
            BodyError::Read(e) => DispatchError::Body(e),
        })?;

    let aad = associated_data(
        route.key_id.as_bytes(),
        route.this_solution.as_bytes(),
        route.target_solution.as_bytes(),
    );
    let packed = crypto::encrypt(&plaintext, &aad, key, config.nonce_len, config.tag_len)?.pack();

    let envelope = Envelope {
        key_id: route.key_id_value.clone(),
        from: route.this_solution.clone(),
        to: route.target_solution.clone(),
        original_content_type,
    };
    config.headers.seal(&mut parts.headers, envelope, packed.len());
    let req = Request::from_parts(parts, Body::from(packed));

    let started = Instant::now();
    match time::timeout(config.request_timeout, exchange(&route, inner.call(req))).await {
        Ok(result) => result,
        Err(_) => {
            let elapsed = started.elapsed();
            warn!(
                target_solution = ?route.target_solution,
                elapsed_secs = elapsed.as_secs_f64(),
                "dispatch timed out"
            );
            Err(DispatchError::Timeout(elapsed))
        }
    }
}

/// Await the transport and open the response if it is flagged encrypted.
async fn exchange<F, E, ResBody>(route: &Route, call: F) -> Result<Response<Body>, DispatchError>
where
    F: Future<Output = Result<Response<ResBody>, E>>,
    E: Into<BoxError>,
    ResBody: http_body::Body<Data = Bytes> + Send + 'static,
    ResBody::Error: Into<BoxError>,
{
    let response = call
        .await
        .map_err(|e| DispatchError::Transport(e.into()))?
        .map(Body::new);

    let names = &route.config.headers;
    if !names.has_flag(response.headers()) {
        debug!(status = %response.status(), "response not encrypted; passing through");
        return Ok(response);
    }

    let key_id = response
        .headers()
        .get(&names.key_id)
        .ok_or(ProtocolError::MissingKeyIdHeader)?;
    let key_id = key_id.to_str().map_err(|_| {
        ProtocolError::UnknownKeyId(String::from_utf8_lossy(key_id.as_bytes()).into_owned())
    })?;
    let key = route.config.keys().get(key_id)?.as_bytes();
    let aad = associated_data(
        key_id.as_bytes(),
        route.target_solution.as_bytes(),
        route.this_solution.as_bytes(),
    );

    let (mut parts, body) = response.into_parts();
    // Oversized replies surface as a body error (502), not 413.
    let packed = collect_limited(body, route.config.max_body_bytes)
        .await
        .map_err(|e| DispatchError::Body(e.into()))?;
    let payload =
        EncryptedPayload::unpack(&packed, route.config.nonce_len, route.config.tag_len)?;
    let plaintext = crypto::decrypt(&payload, &aad, key)?;

    names.unseal(&mut parts.headers, plaintext.len());
    Ok(Response::from_parts(parts, Body::from(plaintext)))
}

fn header_value(value: &str, what: &str) -> Result<HeaderValue, ProtocolError> {
    HeaderValue::from_str(value).map_err(|_| ProtocolError::InvalidHeaderValue(what.to_owned()))
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::{convert::Infallible, time::Duration};

    use http_body::Frame;

    use axum::http::{header, StatusCode};
    use base64::{engine::general_purpose::STANDARD, Engine as _};
    use common::ProtocolSettings;
    use tower::{service_fn, ServiceExt};

    const KEY: [u8; 16] = [9; 16];

    fn config() -> Arc<ProtocolConfig> {
        limited_config(ProtocolSettings::default().max_body_bytes)
    }

    fn limited_config(max_body_bytes: usize) -> Arc<ProtocolConfig> {
        let settings = ProtocolSettings {
            keys: format!("k1:{}", STANDARD.encode(KEY)),
            default_key_id: "k1".into(),
            this_solution_id: "A".into(),
            request_timeout_secs: 2,
            max_body_bytes,
            ..ProtocolSettings::default()
        };
        Arc::new(ProtocolConfig::from_settings(settings).unwrap())
    }

    /// Sends a few bytes of a reply, then never finishes.
    struct StalledReply {
        sent: bool,
    }

    impl http_body::Body for StalledReply {
        type Data = Bytes;
        type Error = Infallible;

        fn poll_frame(
            self: Pin<&mut Self>,
            _cx: &mut Context<'_>,
        ) -> Poll<Option<Result<Frame<Bytes>, Infallible>>> {
            let this = self.get_mut();
            if this.sent {
                Poll::Pending
            } else {
                this.sent = true;
                Poll::Ready(Some(Ok(Frame::data(Bytes::from_static(&[0u8; 8])))))
            }
        }
    }

    fn text_request(body: &'static str) -> Request<Body> {
        Request::builder()
            .method("POST")
            .uri("http://b.internal/orders")
            .header(header::CONTENT_TYPE, "text/plain")
            .body(Body::from(body))
            .unwrap()
    }

    #[tokio::test]
    async fn outgoing_request_is_sealed_for_the_target() {
        let transport = service_fn(|req: Request<Body>| async move {
            let headers = req.headers().clone();
            assert_eq!(headers["x-encrypted"], "1");
            assert_eq!(headers["x-key-id"], "k1");
            assert_eq!(headers["x-solution-from"], "A");
            assert_eq!(headers["x-solution-to"], "B");
            assert_eq!(headers["x-original-content-type"], "text/plain");
            assert_eq!(headers[header::CONTENT_TYPE], "application/octet-stream");
            assert_eq!(headers[header::CONTENT_LENGTH], "33");

            let packed = axum::body::to_bytes(req.into_body(), usize::MAX).await.unwrap();
            assert_eq!(packed.len(), 12 + 5 + 16);
            let payload = EncryptedPayload::unpack(&packed, 12, 16).unwrap();
            let plaintext = crypto::decrypt(&payload, b"k1|A|B", &KEY).unwrap();
            assert_eq!(plaintext, b"hello");
            Ok::<_, Infallible>(Response::new(Body::from("plain reply")))
        });
        let svc = DispatchLayer::new(config(), "B", None).unwrap().layer(transport);

        let resp = svc.oneshot(text_request("hello")).await.unwrap();
        let body = axum::body::to_bytes(resp.into_body(), usize::MAX).await.unwrap();
        assert_eq!(&body[..], b"plain reply");
    }

    #[tokio::test]
    async fn missing_content_type_defaults_to_octet_stream() {
        let transport = service_fn(|req: Request<Body>| async move {
            assert_eq!(
                req.headers()["x-original-content-type"],
                "application/octet-stream"
            );
            Ok::<_, Infallible>(Response::new(Body::empty()))
        });
        let svc = DispatchLayer::new(config(), "B", None).unwrap().layer(transport);
        svc.oneshot(Request::new(Body::from("raw"))).await.unwrap();
    }

    #[tokio::test]
    async fn unknown_key_id_fails_before_sending() {
        let transport = service_fn(|_req: Request<Body>| async move {
            panic!("transport must not be called");
            #[allow(unreachable_code)]
            Ok::<Response<Body>, Infallible>(Response::new(Body::empty()))
        });
        let svc = DispatchLayer::new(config(), "B", Some("k9"))
            .unwrap()
            .layer(transport);

        let err = svc.oneshot(text_request("hello")).await.unwrap_err();
        assert!(matches!(
            err,
            DispatchError::Protocol(ProtocolError::UnknownKeyId(ref id)) if id == "k9"
        ));
    }

    #[test]
    fn rejects_target_that_cannot_be_a_header() {
        assert!(matches!(
            DispatchLayer::new(config(), "bad\nid", None),
            Err(ProtocolError::InvalidHeaderValue(_))
        ));
    }

    #[tokio::test]
    async fn encrypted_response_is_opened_with_reversed_roles() {
        let transport = service_fn(|_req: Request<Body>| async move {
            let sealed = crypto::encrypt(b"{\"ok\":true}", b"k1|B|A", &KEY, 12, 16)
                .unwrap()
                .pack();
            let resp = Response::builder()
                .status(StatusCode::ACCEPTED)
                .header("x-encrypted", "1")
                .header("x-key-id", "k1")
                .header("x-original-content-type", "application/json")
                .header(header::CONTENT_TYPE, "application/octet-stream")
                .body(Body::from(sealed))
                .unwrap();
            Ok::<_, Infallible>(resp)
        });
        let svc = DispatchLayer::new(config(), "B", None).unwrap().layer(transport);

        let resp = svc.oneshot(text_request("hello")).await.unwrap();
        assert_eq!(resp.status(), StatusCode::ACCEPTED);
        assert_eq!(resp.headers()[header::CONTENT_TYPE], "application/json");
        assert!(!resp.headers().contains_key("x-encrypted"));
        let body = axum::body::to_bytes(resp.into_body(), usize::MAX).await.unwrap();
        assert_eq!(&body[..], b"{\"ok\":true}");
    }

    #[tokio::test]
    async fn encrypted_response_without_key_id_is_an_error() {
        let transport = service_fn(|_req: Request<Body>| async move {
            let resp = Response::builder()
                .header("x-encrypted", "1")
                .body(Body::from(vec![0u8; 40]))
                .unwrap();
            Ok::<_, Infallible>(resp)
        });
        let svc = DispatchLayer::new(config(), "B", None).unwrap().layer(transport);

        let err = svc.oneshot(text_request("hello")).await.unwrap_err();
        assert!(matches!(
            err,
            DispatchError::Protocol(ProtocolError::MissingKeyIdHeader)
        ));
    }

    #[tokio::test]
    async fn response_sealed_for_another_channel_fails_authentication() {
        let transport = service_fn(|_req: Request<Body>| async move {
            // Sealed for the outbound direction instead of the return leg.
            let sealed = crypto::encrypt(b"replayed", b"k1|A|B", &KEY, 12, 16)
                .unwrap()
                .pack();
            let resp = Response::builder()
                .header("x-encrypted", "1")
                .header("x-key-id", "k1")
                .body(Body::from(sealed))
                .unwrap();
            Ok::<_, Infallible>(resp)
        });
        let svc = DispatchLayer::new(config(), "B", None).unwrap().layer(transport);

        let err = svc.oneshot(text_request("hello")).await.unwrap_err();
        assert!(matches!(
            err,
            DispatchError::Protocol(ProtocolError::Authentication)
        ));
    }

    #[tokio::test(start_paused = true)]
    async fn slow_transport_yields_timeout_with_elapsed() {
        let transport = service_fn(|_req: Request<Body>| async move {
            time::sleep(Duration::from_secs(60)).await;
            Ok::<_, Infallible>(Response::new(Body::empty()))
        });
        let svc = DispatchLayer::new(config(), "B", None).unwrap().layer(transport);

        let err = svc.oneshot(text_request("hello")).await.unwrap_err();
        match err {
            DispatchError::Timeout(elapsed) => assert!(elapsed >= Duration::from_secs(2)),
            other => panic!("expected timeout, got {other:?}"),
        }
    }

    #[tokio::test]
    async fn transport_errors_are_wrapped() {
        let transport = service_fn(|_req: Request<Body>| async move {
            Err::<Response<Body>, _>(std::io::Error::other("connection refused"))
        });
        let svc = DispatchLayer::new(config(), "B", None).unwrap().layer(transport);

        let err = svc.oneshot(text_request("hello")).await.unwrap_err();
        assert!(matches!(err, DispatchError::Transport(_)));
        assert!(err.to_string().contains("connection refused"));
    }

    #[tokio::test(start_paused = true)]
    async fn stalled_encrypted_reply_body_yields_timeout() {
        let transport = service_fn(|_req: Request<Body>| async move {
            let resp = Response::builder()
                .header("x-encrypted", "1")
                .header("x-key-id", "k1")
                .body(Body::new(StalledReply { sent: false }))
                .unwrap();
            Ok::<_, Infallible>(resp)
        });
        let svc = DispatchLayer::new(config(), "B", None).unwrap().layer(transport);

        let err = svc.oneshot(text_request("hello")).await.unwrap_err();
        assert!(matches!(err, DispatchError::Timeout(_)));
        assert_eq!(err.http_status(), StatusCode::GATEWAY_TIMEOUT);
    }

    #[tokio::test]
    async fn oversized_request_body_is_refused_before_sending() {
        let transport = service_fn(|_req: Request<Body>| async move {
            panic!("transport must not be called");
            #[allow(unreachable_code)]
            Ok::<Response<Body>, Infallible>(Response::new(Body::empty()))
        });
        let svc = DispatchLayer::new(limited_config(4), "B", None)
            .unwrap()
            .layer(transport);

        let err = svc.oneshot(text_request("hello")).await.unwrap_err();
        assert!(matches!(
            err,
            DispatchError::Protocol(ProtocolError::PayloadTooLarge(4))
        ));
        assert_eq!(err.http_status(), StatusCode::PAYLOAD_TOO_LARGE);
    }

    #[tokio::test]
    async fn oversized_encrypted_reply_is_a_body_error() {
        let transport = service_fn(|_req: Request<Body>| async move {
            let resp = Response::builder()
                .header("x-encrypted", "1")
                .header("x-key-id", "k1")
                .body(Body::from(vec![0u8; 64]))
                .unwrap();
            Ok::<_, Infallible>(resp)
        });
        let svc = DispatchLayer::new(limited_config(32), "B", None)
            .unwrap()
            .layer(transport);

        let err = svc.oneshot(text_request("hello")).await.unwrap_err();
        assert!(matches!(err, DispatchError::Body(_)));
        assert_eq!(err.http_status(), StatusCode::BAD_GATEWAY);
    }
}
