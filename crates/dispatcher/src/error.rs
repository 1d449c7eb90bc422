//! Errors raised by the dispatcher to its caller.

use std::time::Duration;

use axum::{http::StatusCode, BoxError};
use common::ProtocolError;
use thiserror::Error;

/// Failure of one dispatched exchange.
#[derive(Debug, Error)]
pub enum DispatchError {
    /// Key resolution, packing or AEAD failure on either leg.
    #[error(transparent)]
    Protocol(#[from] ProtocolError),

    /// The outgoing or incoming body could not be read.
    #[error("failed to read message body: {0}")]
    Body(#[source] BoxError),

    /// The inner transport failed.
    #[error("transport error: {0}")]
    Transport(#[source] BoxError),

    /// The configured timeout elapsed before the exchange completed.
    #[error("request timed out after {0:?}")]
    Timeout(Duration),
}

impl DispatchError {
    /// Status the forward-proxy sidecar answers the local application with.
    pub fn http_status(&self) -> StatusCode {
        match self {
            DispatchError::Timeout(_) => StatusCode::GATEWAY_TIMEOUT,
            DispatchError::Protocol(ProtocolError::PayloadTooLarge(_)) => {
                StatusCode::PAYLOAD_TOO_LARGE
            }
            DispatchError::Protocol(
                ProtocolError::UnknownKeyId(_)
                | ProtocolError::InvalidKeyLength(_)
                | ProtocolError::InvalidParameters(_)
                | ProtocolError::InvalidHeaderValue(_)
                | ProtocolError::Encryption,
            ) => StatusCode::INTERNAL_SERVER_ERROR,
            DispatchError::Protocol(_) | DispatchError::Body(_) | DispatchError::Transport(_) => {
                StatusCode::BAD_GATEWAY
            }
        }
    }
}
