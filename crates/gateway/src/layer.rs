//! [`GatewayLayer`]: decrypts flagged requests before the downstream stage and
//! mirror-encrypts its response.
//!
//! # Request flow
//!
//! ```text
//! Received ─┬─ no flag ──────────────────────────┐
//!           ├─ bad key-id / payload → 400         │
//!           └─ decrypt ──────────────────────────►├─ downstream ─┬─ done → [re-encrypt] → sent
//!                                                 │              └─ deadline → 504
//! ```
//!
//! Every flow carries its own deadline of `request_timeout`, covering request
//! body buffering, the downstream call and, when mirroring, response body
//! buffering. A response that is streamed unbuffered keeps the deadline and is
//! aborted if it expires mid-body.
//!
//! Buffered bodies are capped at `max_body_bytes`: an oversized encrypted
//! request is refused with 413, an oversized response to mirror with 500.

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
    headers::{self, associated_data},
    Envelope, ProtocolConfig, ProtocolError,
};
use http_body::Body as HttpBody;
use tokio::time::{self, Instant};
use tower::{Layer, Service};
use tracing::{debug, warn};

use crate::body::{DeadlineBody, FailedBody};
use crate::rejection;

/// Applies the decrypting gateway to an inner service.
#[derive(Clone, Debug)]
pub struct GatewayLayer {
    config: Arc<ProtocolConfig>,
}

impl GatewayLayer {
    pub fn new(config: Arc<ProtocolConfig>) -> Self {
        Self { config }
    }
}

impl<S> Layer<S> for GatewayLayer {
    type Service = GatewayService<S>;

    fn layer(&self, inner: S) -> Self::Service {
        GatewayService {
            inner,
            config: self.config.clone(),
        }
    }
}

/// Service produced by [`GatewayLayer`].
#[derive(Clone, Debug)]
pub struct GatewayService<S> {
    inner: S,
    config: Arc<ProtocolConfig>,
}

impl<S, ReqBody, ResBody> Service<Request<ReqBody>> for GatewayService<S>
where
    S: Service<Request<Body>, Response = Response<ResBody>> + Clone + Send + 'static,
    S::Future: Send + 'static,
    S::Error: Send + 'static,
    ReqBody: HttpBody<Data = Bytes> + Send + 'static,
    ReqBody::Error: Into<BoxError>,
    ResBody: HttpBody<Data = Bytes> + Send + 'static,
    ResBody::Error: Into<BoxError>,
{
    type Response = Response<Body>;
    type Error = S::Error;
    type Future = Pin<Box<dyn Future<Output = Result<Self::Response, Self::Error>> + Send>>;

    fn poll_ready(&mut self, cx: &mut Context<'_>) -> Poll<Result<(), Self::Error>> {
        self.inner.poll_ready(cx)
    }

    fn call(&mut self, req: Request<ReqBody>) -> Self::Future {
        // Use the instance that was driven to readiness; leave a fresh clone behind.
        let clone = self.inner.clone();
        let inner = std::mem::replace(&mut self.inner, clone);
        let config = self.config.clone();
        Box::pin(handle(config, inner, req.map(Body::new)))
    }
}

/// Request-side values needed again when sealing the response.
struct Exchange {
    key_id: HeaderValue,
    from: HeaderValue,
    to: HeaderValue,
}

async fn handle<S, ResBody>(
    config: Arc<ProtocolConfig>,
    mut inner: S,
    req: Request<Body>,
) -> Result<Response<Body>, S::Error>
where
    S: Service<Request<Body>, Response = Response<ResBody>>,
    ResBody: HttpBody<Data = Bytes> + Send + 'static,
    ResBody::Error: Into<BoxError>,
{
    let timeout = config.request_timeout;
    let deadline = Instant::now() + timeout;

    let (req, exchange) = if config.headers.is_flagged(req.headers()) {
        match open_request(&config, req, deadline).await {
            Ok((req, exchange)) => (req, Some(exchange)),
            Err(rejection) => return Ok(rejection),
        }
    } else {
        (req, None)
    };

    let response = match time::timeout_at(deadline, inner.call(req)).await {
        Ok(result) => result?,
        Err(_) => {
            warn!(timeout_secs = timeout.as_secs_f64(), "downstream timed out");
            return Ok(rejection::from_protocol_error(&ProtocolError::Timeout(timeout)));
        }
    };

    let exchange = match exchange {
        Some(exchange) if config.mirror_encrypt_response => exchange,
        _ => {
            return Ok(response
                .map(|b| Body::new(DeadlineBody::new(Body::new(b), deadline, timeout))));
        }
    };

    let (parts, body) = response.into_parts();
    let read = collect_limited(body, config.max_body_bytes);
    let buffered = match time::timeout_at(deadline, read).await {
        Ok(Ok(bytes)) => bytes,
        Ok(Err(BodyError::TooLarge(limit))) => {
            warn!(limit, "downstream response too large to encrypt");
            return Ok(rejection::plain_text(
                axum::http::StatusCode::INTERNAL_SERVER_ERROR,
                rejection::INTERNAL,
            ));
        }
        Ok(Err(BodyError::Read(e))) => {
            warn!(error = %e, "downstream response body failed");
            return Ok(Response::from_parts(parts, Body::new(FailedBody::new(e))));
        }
        Err(_) => {
            warn!(timeout_secs = timeout.as_secs_f64(), "downstream response timed out");
            return Ok(rejection::from_protocol_error(&ProtocolError::Timeout(timeout)));
        }
    };

    Ok(seal_response(&config, &exchange, parts, buffered))
}

/// Validate and decrypt a flagged request.
///
/// On failure the returned response is the rejection to send; downstream is
/// never invoked.
async fn open_request(
    config: &ProtocolConfig,
    req: Request<Body>,
    deadline: Instant,
) -> Result<(Request<Body>, Exchange), Response<Body>> {
    let names = &config.headers;
    let (mut parts, body) = req.into_parts();

    let exchange = {
        let key_id = parts.headers.get(&names.key_id).cloned().ok_or_else(|| {
            debug!("encrypted request without key id header");
            rejection::from_protocol_error(&ProtocolError::MissingKeyIdHeader)
        })?;
        let empty = || HeaderValue::from_static("");
        Exchange {
            key_id,
            from: parts.headers.get(&names.from_solution).cloned().unwrap_or_else(empty),
            to: parts.headers.get(&names.to_solution).cloned().unwrap_or_else(empty),
        }
    };

    let key = resolve_key(config, &exchange.key_id).map_err(|e| {
        debug!(error = %e, "encrypted request with unknown key id");
        rejection::from_protocol_error(&e)
    })?;

    let read = collect_limited(body, config.max_body_bytes);
    let packed = match time::timeout_at(deadline, read).await {
        Ok(Ok(bytes)) => bytes,
        Ok(Err(BodyError::TooLarge(limit))) => {
            debug!(limit, "encrypted request body too large");
            return Err(rejection::from_protocol_error(&ProtocolError::PayloadTooLarge(limit)));
        }
        Ok(Err(BodyError::Read(e))) => {
            warn!(error = %e, "failed to read encrypted request body");
            return Err(rejection::plain_text(
                axum::http::StatusCode::BAD_REQUEST,
                rejection::UNREADABLE_BODY,
            ));
        }
        Err(_) => {
            return Err(rejection::from_protocol_error(&ProtocolError::Timeout(
                config.request_timeout,
            )));
        }
    };

    let aad = associated_data(
        exchange.key_id.as_bytes(),
        exchange.from.as_bytes(),
        exchange.to.as_bytes(),
    );
    let plaintext = EncryptedPayload::unpack(&packed, config.nonce_len, config.tag_len)
        .and_then(|payload| crypto::decrypt(&payload, &aad, key))
        .map_err(|e| {
            warn!(
                error = %e,
                key_id = ?exchange.key_id,
                from = ?exchange.from,
                to = ?exchange.to,
                "rejected encrypted request"
            );
            rejection::from_protocol_error(&e)
        })?;

    names.unseal(&mut parts.headers, plaintext.len());
    debug!(key_id = ?exchange.key_id, from = ?exchange.from, "decrypted request");
    Ok((Request::from_parts(parts, Body::from(plaintext)), exchange))
}

/// Encrypt a buffered downstream response for the return leg.
///
/// The return leg's sender is the request's receiver, so the associated data
/// is `keyId|to|from` of the request, matching what the dispatcher expects.
fn seal_response(
    config: &ProtocolConfig,
    exchange: &Exchange,
    mut parts: axum::http::response::Parts,
    buffered: Bytes,
) -> Response<Body> {
    let key = match resolve_key(config, &exchange.key_id) {
        Ok(key) => key,
        Err(e) => {
            debug!(error = %e, "response left unencrypted");
            return Response::from_parts(parts, Body::from(buffered));
        }
    };

    let aad = associated_data(
        exchange.key_id.as_bytes(),
        exchange.to.as_bytes(),
        exchange.from.as_bytes(),
    );
    let payload = match crypto::encrypt(&buffered, &aad, key, config.nonce_len, config.tag_len) {
        Ok(payload) => payload,
        Err(e) => {
            warn!(error = %e, "response encryption failed");
            return rejection::from_protocol_error(&e);
        }
    };
    let packed = payload.pack();

    let envelope = Envelope {
        key_id: exchange.key_id.clone(),
        from: exchange.to.clone(),
        to: exchange.from.clone(),
        original_content_type: headers::content_type_or_default(&parts.headers),
    };
    config.headers.seal(&mut parts.headers, envelope, packed.len());
    Response::from_parts(parts, Body::from(packed))
}

fn resolve_key<'a>(
    config: &'a ProtocolConfig,
    key_id: &HeaderValue,
) -> Result<&'a [u8], ProtocolError> {
    let id = key_id.to_str().map_err(|_| {
        ProtocolError::UnknownKeyId(String::from_utf8_lossy(key_id.as_bytes()).into_owned())
    })?;
    Ok(config.keys().get(id)?.as_bytes())
}
