//! [`EncryptedPayload`] and its packed wire form.

use bytes::{BufMut, Bytes, BytesMut};

use crate::error::ProtocolError;

/// Output of one AEAD seal operation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EncryptedPayload {
    /// Random per-message nonce.
    pub nonce: Vec<u8>,
    /// Ciphertext, same length as the plaintext.
    pub ciphertext: Vec<u8>,
    /// Detached authentication tag.
    pub tag: Vec<u8>,
}

impl EncryptedPayload {
    /// Concatenate `nonce || ciphertext || tag`.
    pub fn pack(&self) -> Bytes {
        let mut buf =
            BytesMut::with_capacity(self.nonce.len() + self.ciphertext.len() + self.tag.len());
        buf.put_slice(&self.nonce);
        buf.put_slice(&self.ciphertext);
        buf.put_slice(&self.tag);
        buf.freeze()
    }

    /// Split a packed buffer by position.
    ///
    /// The lengths are not carried on the wire; both peers must agree on them.
    ///
    /// # Errors
    ///
    /// Returns [`ProtocolError::Format`] if `packed` is shorter than
    /// `nonce_len + tag_len`.
    pub fn unpack(packed: &[u8], nonce_len: usize, tag_len: usize) -> Result<Self, ProtocolError> {
        let min = nonce_len + tag_len;
        if packed.len() < min {
            return Err(ProtocolError::Format {
                len: packed.len(),
                min,
            });
        }
        let (nonce, rest) = packed.split_at(nonce_len);
        let (ciphertext, tag) = rest.split_at(rest.len() - tag_len);
        Ok(Self {
            nonce: nonce.to_vec(),
            ciphertext: ciphertext.to_vec(),
            tag: tag.to_vec(),
        })
    }
}
