//! Header signaling convention and associated-data binding.
//!
//! | Header (default)          | Meaning                                   |
//! |---------------------------|-------------------------------------------|
//! | `X-Encrypted`             | `"1"` marks the body as a packed payload  |
//! | `X-Key-Id`                | key-id of the shared key used             |
//! | `X-Solution-From`         | sender identity, bound into the AAD       |
//! | `X-Solution-To`           | receiver identity, bound into the AAD     |
//! | `X-Original-Content-Type` | content type of the plaintext body        |

use http::{
    header::{self, HeaderName},
    HeaderMap, HeaderValue,
};

/// Content type of every packed body on the wire.
pub const OCTET_STREAM: &str = "application/octet-stream";

/// Value of the encrypted-flag header on a packed message.
pub const ENCRYPTED_FLAG_VALUE: &str = "1";

/// Separator between the fields of the associated data.
const AAD_SEPARATOR: u8 = b'|';

/// Hop-by-hop headers a proxy must not forward (RFC 9110 §7.6.1).
const HOP_BY_HOP: [HeaderName; 7] = [
    header::CONNECTION,
    HeaderName::from_static("keep-alive"),
    HeaderName::from_static("proxy-connection"),
    header::TE,
    header::TRAILER,
    header::TRANSFER_ENCODING,
    header::UPGRADE,
];

/// The five configurable protocol header names.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HeaderNames {
    pub encrypted_flag: HeaderName,
    pub key_id: HeaderName,
    pub from_solution: HeaderName,
    pub to_solution: HeaderName,
    pub original_content_type: HeaderName,
}

impl Default for HeaderNames {
    fn default() -> Self {
        Self {
            encrypted_flag: HeaderName::from_static("x-encrypted"),
            key_id: HeaderName::from_static("x-key-id"),
            from_solution: HeaderName::from_static("x-solution-from"),
            to_solution: HeaderName::from_static("x-solution-to"),
            original_content_type: HeaderName::from_static("x-original-content-type"),
        }
    }
}

/// Header values describing one sealed message.
#[derive(Debug, Clone)]
pub struct Envelope {
    pub key_id: HeaderValue,
    pub from: HeaderValue,
    pub to: HeaderValue,
    pub original_content_type: HeaderValue,
}

impl HeaderNames {
    /// `true` if the encrypted-flag header is present with value `"1"`.
    pub fn is_flagged(&self, headers: &HeaderMap) -> bool {
        headers
            .get(&self.encrypted_flag)
            .is_some_and(|v| v.as_bytes() == ENCRYPTED_FLAG_VALUE.as_bytes())
    }

    /// `true` if the encrypted-flag header is present at all.
    pub fn has_flag(&self, headers: &HeaderMap) -> bool {
        headers.contains_key(&self.encrypted_flag)
    }

    /// Replace the five protocol headers and the body framing headers for a
    /// packed body of `packed_len` bytes.
    pub fn seal(&self, headers: &mut HeaderMap, envelope: Envelope, packed_len: usize) {
        headers.insert(
            &self.encrypted_flag,
            HeaderValue::from_static(ENCRYPTED_FLAG_VALUE),
        );
        headers.insert(&self.key_id, envelope.key_id);
        headers.insert(&self.from_solution, envelope.from);
        headers.insert(&self.to_solution, envelope.to);
        headers.insert(&self.original_content_type, envelope.original_content_type);
        headers.insert(header::CONTENT_TYPE, HeaderValue::from_static(OCTET_STREAM));
        set_content_length(headers, packed_len);
    }

    /// Restore the plaintext framing after decryption: `Content-Type` from the
    /// original-content-type header (default [`OCTET_STREAM`]) and the new
    /// `Content-Length`. The flag and original-content-type headers are removed.
    pub fn unseal(&self, headers: &mut HeaderMap, plaintext_len: usize) {
        let content_type = headers
            .remove(&self.original_content_type)
            .unwrap_or_else(|| HeaderValue::from_static(OCTET_STREAM));
        headers.remove(&self.encrypted_flag);
        headers.insert(header::CONTENT_TYPE, content_type);
        set_content_length(headers, plaintext_len);
    }
}

/// Content type of a message, defaulting to [`OCTET_STREAM`].
pub fn content_type_or_default(headers: &HeaderMap) -> HeaderValue {
    headers
        .get(header::CONTENT_TYPE)
        .cloned()
        .unwrap_or_else(|| HeaderValue::from_static(OCTET_STREAM))
}

/// Associated data for one direction of an exchange: `keyId|sender|receiver`.
pub fn associated_data(key_id: &[u8], sender: &[u8], receiver: &[u8]) -> Vec<u8> {
    let mut aad = Vec::with_capacity(key_id.len() + sender.len() + receiver.len() + 2);
    aad.extend_from_slice(key_id);
    aad.push(AAD_SEPARATOR);
    aad.extend_from_slice(sender);
    aad.push(AAD_SEPARATOR);
    aad.extend_from_slice(receiver);
    aad
}

/// Strip hop-by-hop headers before relaying a message to another hop.
pub fn remove_hop_by_hop(headers: &mut HeaderMap) {
    for name in &HOP_BY_HOP {
        headers.remove(name);
    }
}

fn set_content_length(headers: &mut HeaderMap, len: usize) {
    headers.remove(header::TRANSFER_ENCODING);
    headers.insert(header::CONTENT_LENGTH, HeaderValue::from(len));
}
