//! Plain-text responses the gateway produces without invoking downstream.

use axum::{
    body::Body,
    http::{header, HeaderValue, Response, StatusCode},
};
use common::ProtocolError;

pub const MISSING_KEY_ID: &str = "Missing key id header.";
pub const UNKNOWN_KEY_ID: &str = "Unknown key id.";
pub const MALFORMED_PAYLOAD: &str = "Malformed encrypted payload.";
pub const DECRYPTION_FAILED: &str = "Decryption failed.";
pub const UNREADABLE_BODY: &str = "Unreadable request body.";
pub const PAYLOAD_TOO_LARGE: &str = "Payload too large.";
pub const TIMED_OUT: &str = "Request timed out.";
pub const INTERNAL: &str = "Internal server error.";

/// Map a protocol error to the gateway's status code and message.
pub fn from_protocol_error(err: &ProtocolError) -> Response<Body> {
    let message = match err {
        ProtocolError::MissingKeyIdHeader => MISSING_KEY_ID,
        ProtocolError::UnknownKeyId(_) => UNKNOWN_KEY_ID,
        ProtocolError::Format { .. } => MALFORMED_PAYLOAD,
        ProtocolError::Authentication => DECRYPTION_FAILED,
        ProtocolError::PayloadTooLarge(_) => PAYLOAD_TOO_LARGE,
        ProtocolError::Timeout(_) => TIMED_OUT,
        ProtocolError::InvalidKeyLength(_)
        | ProtocolError::InvalidParameters(_)
        | ProtocolError::InvalidHeaderValue(_)
        | ProtocolError::Encryption => INTERNAL,
    };
    let status =
        StatusCode::from_u16(err.http_status()).unwrap_or(StatusCode::INTERNAL_SERVER_ERROR);
    plain_text(status, message)
}

pub fn plain_text(status: StatusCode, message: &'static str) -> Response<Body> {
    let mut response = Response::new(Body::from(message));
    *response.status_mut() = status;
    response.headers_mut().insert(
        header::CONTENT_TYPE,
        HeaderValue::from_static("text/plain; charset=utf-8"),
    );
    response
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    #[test]
    fn maps_protocol_errors_to_statuses() {
        let r = from_protocol_error(&ProtocolError::MissingKeyIdHeader);
        assert_eq!(r.status(), StatusCode::BAD_REQUEST);
        let r = from_protocol_error(&ProtocolError::Format { len: 1, min: 28 });
        assert_eq!(r.status(), StatusCode::BAD_REQUEST);
        let r = from_protocol_error(&ProtocolError::Timeout(Duration::from_secs(1)));
        assert_eq!(r.status(), StatusCode::GATEWAY_TIMEOUT);
        let r = from_protocol_error(&ProtocolError::PayloadTooLarge(64));
        assert_eq!(r.status(), StatusCode::PAYLOAD_TOO_LARGE);
        let r = from_protocol_error(&ProtocolError::Encryption);
        assert_eq!(r.status(), StatusCode::INTERNAL_SERVER_ERROR);
    }

    #[tokio::test]
    async fn body_is_plain_text_message() {
        let r = from_protocol_error(&ProtocolError::UnknownKeyId("k9".into()));
        assert_eq!(r.headers()[header::CONTENT_TYPE], "text/plain; charset=utf-8");
        let body = axum::body::to_bytes(r.into_body(), usize::MAX).await.unwrap();
        assert_eq!(&body[..], UNKNOWN_KEY_ID.as_bytes());
    }
}
