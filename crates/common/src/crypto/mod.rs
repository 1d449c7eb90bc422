//! AES-GCM primitives and the packed payload format.
//!
//! This module is free of HTTP dependencies.
//!
//! # Wire format
//!
//! ```text
//! nonce (N bytes) || ciphertext (len(plaintext) bytes) || tag (T bytes)
//! ```
//!
//! `N` and `T` come from configuration on both peers; they are not encoded in
//! the buffer. A mismatch surfaces as a format or authentication error.

pub mod aead;
pub mod payload;

pub use aead::{decrypt, encrypt};
pub use payload::EncryptedPayload;
