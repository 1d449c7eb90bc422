//! Authenticated-encryption transport protocol shared by the gateway and the
//! dispatcher: AES-GCM engine, packed wire codec, key registry and the
//! header signaling convention.

pub mod body;
pub mod config;
pub mod crypto;
pub mod error;
pub mod headers;

pub use self::config::{ConfigError, KeyRegistry, ProtocolConfig, ProtocolSettings};
pub use crypto::EncryptedPayload;
pub use error::ProtocolError;
pub use headers::{Envelope, HeaderNames};
