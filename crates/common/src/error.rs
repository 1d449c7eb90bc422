//! Protocol error taxonomy shared by the gateway and the dispatcher.

use std::time::Duration;

use thiserror::Error;

/// Errors raised by the transport protocol.
///
/// Variants map to HTTP status codes when the gateway rejects a request:
/// - [`ProtocolError::MissingKeyIdHeader`], [`ProtocolError::UnknownKeyId`],
///   [`ProtocolError::Format`], [`ProtocolError::Authentication`] → 400
/// - [`ProtocolError::PayloadTooLarge`] → 413
/// - [`ProtocolError::Timeout`] → 504
/// - everything else → 500
#[derive(Debug, Error)]
pub enum ProtocolError {
    /// The key-id does not resolve in the key registry.
    #[error("unknown key id: {0:?}")]
    UnknownKeyId(String),

    /// A payload was flagged as encrypted but carries no key-id header.
    #[error("missing key id header")]
    MissingKeyIdHeader,

    /// The packed buffer is shorter than `nonce_len + tag_len`.
    #[error("packed payload too short: got {len} bytes, need at least {min}")]
    Format { len: usize, min: usize },

    /// Tag verification failed: wrong key, wrong associated data, or tampering.
    #[error("authentication failed")]
    Authentication,

    /// The key is not 16, 24 or 32 bytes long.
    #[error("invalid key length: {0} bytes (expected 16, 24 or 32)")]
    InvalidKeyLength(usize),

    /// Nonce or tag length outside what the cipher supports.
    #[error("invalid aead parameters: {0}")]
    InvalidParameters(String),

    /// A value cannot be carried in an HTTP header.
    #[error("invalid header value for {0}")]
    InvalidHeaderValue(String),

    /// The cipher refused to seal the plaintext.
    #[error("aead encryption failed")]
    Encryption,

    /// A body exceeded the configured buffering limit.
    #[error("payload exceeds the {0} byte limit")]
    PayloadTooLarge(usize),

    /// The exchange exceeded the configured request timeout.
    #[error("request timed out after {0:?}")]
    Timeout(Duration),
}

impl ProtocolError {
    /// Returns the HTTP status code the gateway sends for this error.
    pub fn http_status(&self) -> u16 {
        match self {
            ProtocolError::UnknownKeyId(_)
            | ProtocolError::MissingKeyIdHeader
            | ProtocolError::Format { .. }
            | ProtocolError::Authentication => 400,
            ProtocolError::PayloadTooLarge(_) => 413,
            ProtocolError::Timeout(_) => 504,
            ProtocolError::InvalidKeyLength(_)
            | ProtocolError::InvalidParameters(_)
            | ProtocolError::InvalidHeaderValue(_)
            | ProtocolError::Encryption => 500,
        }
    }
}
