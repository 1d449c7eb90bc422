//! AES-GCM authenticated encryption over raw byte buffers.
//!
//! The key size selects AES-128, AES-192 or AES-256. The tag length is a
//! deployment-wide setting between [`MIN_TAG_LEN`] and [`MAX_TAG_LEN`] bytes;
//! the nonce is always [`NONCE_LEN`] bytes. Ciphertext has the same length as
//! the plaintext, the tag is returned detached.
//!
//! **Never reuse a nonce under the same key.** Every call to [`encrypt`] draws
//! a fresh nonce from the OS CSPRNG.

use std::ops::RangeInclusive;

use aes_gcm::{
    aead::{
        consts::{U12, U13, U14, U15, U16},
        generic_array::{typenum::Unsigned, GenericArray},
        rand_core::RngCore,
        AeadCore, AeadInPlace, KeyInit, OsRng,
    },
    aes::{Aes128, Aes192, Aes256},
    AesGcm,
};

use zeroize::Zeroize;

use super::payload::EncryptedPayload;
use crate::error::ProtocolError;

/// Supported nonce length in bytes (96 bits).
pub const NONCE_LEN: usize = 12;

/// Shortest authentication tag accepted.
pub const MIN_TAG_LEN: usize = 12;

/// Longest authentication tag accepted.
pub const MAX_TAG_LEN: usize = 16;

/// Key sizes accepted for AES-128/192/256.
pub const KEY_LENS: [usize; 3] = [16, 24, 32];

const TAG_LENS: RangeInclusive<usize> = MIN_TAG_LEN..=MAX_TAG_LEN;

/// Selects the concrete `AesGcm` instantiation for a key size and tag length
/// and calls `$op::<Cipher>(key, args...)`.
macro_rules! with_cipher {
    ($key:expr, $tag_len:expr, $op:ident ( $($arg:expr),* $(,)? )) => {
        match ($key.len(), $tag_len) {
            (16, 12) => $op::<AesGcm<Aes128, U12, U12>>($key, $($arg),*),
            (16, 13) => $op::<AesGcm<Aes128, U12, U13>>($key, $($arg),*),
            (16, 14) => $op::<AesGcm<Aes128, U12, U14>>($key, $($arg),*),
            (16, 15) => $op::<AesGcm<Aes128, U12, U15>>($key, $($arg),*),
            (16, 16) => $op::<AesGcm<Aes128, U12, U16>>($key, $($arg),*),
            (24, 12) => $op::<AesGcm<Aes192, U12, U12>>($key, $($arg),*),
            (24, 13) => $op::<AesGcm<Aes192, U12, U13>>($key, $($arg),*),
            (24, 14) => $op::<AesGcm<Aes192, U12, U14>>($key, $($arg),*),
            (24, 15) => $op::<AesGcm<Aes192, U12, U15>>($key, $($arg),*),
            (24, 16) => $op::<AesGcm<Aes192, U12, U16>>($key, $($arg),*),
            (32, 12) => $op::<AesGcm<Aes256, U12, U12>>($key, $($arg),*),
            (32, 13) => $op::<AesGcm<Aes256, U12, U13>>($key, $($arg),*),
            (32, 14) => $op::<AesGcm<Aes256, U12, U14>>($key, $($arg),*),
            (32, 15) => $op::<AesGcm<Aes256, U12, U15>>($key, $($arg),*),
            (32, 16) => $op::<AesGcm<Aes256, U12, U16>>($key, $($arg),*),
            (16 | 24 | 32, tag_len) => Err(unsupported_tag_len(tag_len)),
            (key_len, _) => Err(ProtocolError::InvalidKeyLength(key_len)),
        }
    };
}

/// Check that `nonce_len` and `tag_len` are within what AES-GCM supports here.
///
/// # Errors
///
/// Returns [`ProtocolError::InvalidParameters`] otherwise.
pub fn validate_lengths(nonce_len: usize, tag_len: usize) -> Result<(), ProtocolError> {
    if nonce_len != NONCE_LEN {
        return Err(ProtocolError::InvalidParameters(format!(
            "unsupported nonce length {nonce_len}: expected {NONCE_LEN}"
        )));
    }
    if !TAG_LENS.contains(&tag_len) {
        return Err(unsupported_tag_len(tag_len));
    }
    Ok(())
}

/// Check that `key` has a supported AES key size.
///
/// # Errors
///
/// Returns [`ProtocolError::InvalidKeyLength`] otherwise.
pub fn validate_key(key: &[u8]) -> Result<(), ProtocolError> {
    if KEY_LENS.contains(&key.len()) {
        Ok(())
    } else {
        Err(ProtocolError::InvalidKeyLength(key.len()))
    }
}

/// Encrypt `plaintext` and bind it to `associated_data`.
///
/// # Errors
///
/// Returns [`ProtocolError::InvalidKeyLength`] for an unsupported key size and
/// [`ProtocolError::InvalidParameters`] for an unsupported nonce or tag length.
pub fn encrypt(
    plaintext: &[u8],
    associated_data: &[u8],
    key: &[u8],
    nonce_len: usize,
    tag_len: usize,
) -> Result<EncryptedPayload, ProtocolError> {
    validate_key(key)?;
    validate_lengths(nonce_len, tag_len)?;

    let mut nonce = vec![0u8; nonce_len];
    OsRng.fill_bytes(&mut nonce);

    let mut ciphertext = plaintext.to_vec();
    let tag = with_cipher!(key, tag_len, seal(&nonce, associated_data, &mut ciphertext))?;

    Ok(EncryptedPayload {
        nonce,
        ciphertext,
        tag,
    })
}

/// Verify and decrypt `payload` with the same associated data used to seal it.
///
/// Tag comparison is constant-time. On failure no plaintext is returned.
///
/// # Errors
///
/// Returns [`ProtocolError::Authentication`] when the tag does not verify,
/// [`ProtocolError::InvalidKeyLength`] or [`ProtocolError::InvalidParameters`]
/// when the key or the payload's nonce/tag lengths are unsupported.
pub fn decrypt(
    payload: &EncryptedPayload,
    associated_data: &[u8],
    key: &[u8],
) -> Result<Vec<u8>, ProtocolError> {
    validate_key(key)?;
    validate_lengths(payload.nonce.len(), payload.tag.len())?;

    let mut buffer = payload.ciphertext.clone();
    let opened = with_cipher!(
        key,
        payload.tag.len(),
        open(&payload.nonce, associated_data, &mut buffer, &payload.tag)
    );
    match opened {
        Ok(()) => Ok(buffer),
        Err(e) => {
            buffer.zeroize();
            Err(e)
        }
    }
}

fn seal<C>(
    key: &[u8],
    nonce: &[u8],
    associated_data: &[u8],
    buffer: &mut [u8],
) -> Result<Vec<u8>, ProtocolError>
where
    C: KeyInit + AeadInPlace,
{
    let cipher = build_cipher::<C>(key, nonce)?;
    let tag = cipher
        .encrypt_in_place_detached(GenericArray::from_slice(nonce), associated_data, buffer)
        .map_err(|_| ProtocolError::Encryption)?;
    Ok(tag.to_vec())
}

fn open<C>(
    key: &[u8],
    nonce: &[u8],
    associated_data: &[u8],
    buffer: &mut [u8],
    tag: &[u8],
) -> Result<(), ProtocolError>
where
    C: KeyInit + AeadInPlace,
{
    let cipher = build_cipher::<C>(key, nonce)?;
    if tag.len() != <C as AeadCore>::TagSize::USIZE {
        return Err(unsupported_tag_len(tag.len()));
    }
    cipher
        .decrypt_in_place_detached(
            GenericArray::from_slice(nonce),
            associated_data,
            buffer,
            GenericArray::from_slice(tag),
        )
        .map_err(|_| ProtocolError::Authentication)
}

fn build_cipher<C>(key: &[u8], nonce: &[u8]) -> Result<C, ProtocolError>
where
    C: KeyInit + AeadCore,
{
    // `GenericArray::from_slice` panics on a length mismatch.
    if nonce.len() != <C as AeadCore>::NonceSize::USIZE {
        return Err(ProtocolError::InvalidParameters(format!(
            "unsupported nonce length {}",
            nonce.len()
        )));
    }
    C::new_from_slice(key).map_err(|_| ProtocolError::InvalidKeyLength(key.len()))
}

fn unsupported_tag_len(tag_len: usize) -> ProtocolError {
    ProtocolError::InvalidParameters(format!(
        "unsupported tag length {tag_len}: expected {MIN_TAG_LEN}..={MAX_TAG_LEN}"
    ))
}
