//! Protocol configuration and the key registry.
//!
//! Values are read from environment variables once at startup, validated, and
//! turned into an immutable [`ProtocolConfig`] shared by reference.
//!
//! Keys are supplied as `KEYS=<key-id>:<base64>[,<key-id>:<base64>...]`.

use std::collections::HashMap;
use std::time::Duration;

use base64::{engine::general_purpose::STANDARD, Engine as _};
use http::{header::HeaderName, HeaderValue};
use serde::Deserialize;
use thiserror::Error;
use zeroize::Zeroize;

use crate::crypto::aead;
use crate::error::ProtocolError;
use crate::headers::HeaderNames;

/// Errors produced while building a [`ProtocolConfig`].
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("failed to load protocol configuration: {0}")]
    Load(#[from] ::config::ConfigError),

    #[error("{0} is required and must not be empty")]
    Missing(&'static str),

    #[error("invalid KEYS entry {0:?}: expected <key-id>:<base64>")]
    KeyEntry(String),

    #[error("key {0:?} is not valid base64")]
    KeyEncoding(String),

    #[error("key {id:?} has invalid length {len}: expected 16, 24 or 32 bytes")]
    KeyLength { id: String, len: usize },

    #[error("duplicate key id {0:?}")]
    DuplicateKeyId(String),

    #[error("DEFAULT_KEY_ID {0:?} is not present in KEYS")]
    UnknownDefaultKeyId(String),

    #[error("{name} is not a valid HTTP header name: {value:?}")]
    HeaderName { name: &'static str, value: String },

    #[error("{name} cannot be sent as an HTTP header value: {value:?}")]
    HeaderValue { name: &'static str, value: String },

    #[error("invalid aead settings: {0}")]
    Aead(#[from] ProtocolError),

    #[error("REQUEST_TIMEOUT_SECS must be > 0")]
    ZeroTimeout,

    #[error("MAX_BODY_BYTES must be > 0")]
    ZeroBodyLimit,
}

/// Raw protocol settings as read from the environment.
#[derive(Debug, Clone, Deserialize)]
pub struct ProtocolSettings {
    /// `<key-id>:<base64>` pairs separated by commas. **Required.**
    #[serde(default)]
    pub keys: String,

    /// Key-id used when a caller does not name one.
    #[serde(default = "default_key_id")]
    pub default_key_id: String,

    /// Identity of this solution, bound into the associated data.
    #[serde(default = "default_this_solution_id")]
    pub this_solution_id: String,

    #[serde(default = "default_encrypted_flag_header")]
    pub encrypted_flag_header: String,

    #[serde(default = "default_key_id_header")]
    pub key_id_header: String,

    #[serde(default = "default_from_solution_header")]
    pub from_solution_header: String,

    #[serde(default = "default_to_solution_header")]
    pub to_solution_header: String,

    #[serde(default = "default_original_content_type_header")]
    pub original_content_type_header: String,

    /// Encrypt responses to encrypted requests.
    #[serde(default = "default_mirror_encrypt_response")]
    pub mirror_encrypt_response: bool,

    #[serde(default = "default_nonce_length_bytes")]
    pub nonce_length_bytes: usize,

    #[serde(default = "default_tag_length_bytes")]
    pub tag_length_bytes: usize,

    /// Upper bound on one exchange, in seconds.
    #[serde(default = "default_request_timeout_secs")]
    pub request_timeout_secs: u64,

    /// Largest body either side buffers, packed or plaintext.
    #[serde(default = "default_max_body_bytes")]
    pub max_body_bytes: usize,
}

fn default_key_id() -> String {
    "default".into()
}
fn default_this_solution_id() -> String {
    "unknown".into()
}
fn default_encrypted_flag_header() -> String {
    "X-Encrypted".into()
}
fn default_key_id_header() -> String {
    "X-Key-Id".into()
}
fn default_from_solution_header() -> String {
    "X-Solution-From".into()
}
fn default_to_solution_header() -> String {
    "X-Solution-To".into()
}
fn default_original_content_type_header() -> String {
    "X-Original-Content-Type".into()
}
fn default_mirror_encrypt_response() -> bool {
    true
}
fn default_nonce_length_bytes() -> usize {
    12
}
fn default_tag_length_bytes() -> usize {
    16
}
fn default_request_timeout_secs() -> u64 {
    30
}
fn default_max_body_bytes() -> usize {
    8 * 1024 * 1024
}

impl Default for ProtocolSettings {
    fn default() -> Self {
        Self {
            keys: String::new(),
            default_key_id: default_key_id(),
            this_solution_id: default_this_solution_id(),
            encrypted_flag_header: default_encrypted_flag_header(),
            key_id_header: default_key_id_header(),
            from_solution_header: default_from_solution_header(),
            to_solution_header: default_to_solution_header(),
            original_content_type_header: default_original_content_type_header(),
            mirror_encrypt_response: default_mirror_encrypt_response(),
            nonce_length_bytes: default_nonce_length_bytes(),
            tag_length_bytes: default_tag_length_bytes(),
            request_timeout_secs: default_request_timeout_secs(),
            max_body_bytes: default_max_body_bytes(),
        }
    }
}

impl ProtocolSettings {
    /// Load protocol settings from environment variables.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError::Load`] if a variable cannot be parsed.
    pub fn from_env() -> Result<Self, ConfigError> {
        let cfg = ::config::Config::builder()
            .add_source(::config::Environment::default())
            .build()?;
        Ok(cfg.try_deserialize()?)
    }
}

/// Raw key material. Redacted in `Debug`, zeroed on drop.
pub struct KeyBytes(Box<[u8]>);

impl KeyBytes {
    pub fn as_bytes(&self) -> &[u8] {
        &self.0
    }
}

impl Drop for KeyBytes {
    fn drop(&mut self) {
        self.0.zeroize();
    }
}

impl std::fmt::Debug for KeyBytes {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str("KeyBytes([REDACTED])")
    }
}

/// Immutable key-id → key mapping.
#[derive(Debug, Default)]
pub struct KeyRegistry {
    keys: HashMap<String, KeyBytes>,
}

impl KeyRegistry {
    /// Parse `<key-id>:<base64>[,...]`. Blank entries are skipped.
    ///
    /// # Errors
    ///
    /// Returns a [`ConfigError`] for a malformed entry, bad base64, an
    /// unsupported key size or a repeated key-id.
    pub fn parse(raw: &str) -> Result<Self, ConfigError> {
        let mut keys = HashMap::new();
        for entry in raw.split(',').map(str::trim).filter(|e| !e.is_empty()) {
            let (id, encoded) = entry
                .split_once(':')
                .ok_or_else(|| ConfigError::KeyEntry(redact_entry(entry)))?;
            let id = id.trim();
            if id.is_empty() {
                return Err(ConfigError::KeyEntry(redact_entry(entry)));
            }
            let key = STANDARD
                .decode(encoded.trim())
                .map_err(|_| ConfigError::KeyEncoding(id.to_owned()))?;
            if aead::validate_key(&key).is_err() {
                return Err(ConfigError::KeyLength {
                    id: id.to_owned(),
                    len: key.len(),
                });
            }
            if keys
                .insert(id.to_owned(), KeyBytes(key.into_boxed_slice()))
                .is_some()
            {
                return Err(ConfigError::DuplicateKeyId(id.to_owned()));
            }
        }
        Ok(Self { keys })
    }

    /// Resolve a key-id.
    ///
    /// # Errors
    ///
    /// Returns [`ProtocolError::UnknownKeyId`] if the id is not registered.
    pub fn get(&self, key_id: &str) -> Result<&KeyBytes, ProtocolError> {
        self.keys
            .get(key_id)
            .ok_or_else(|| ProtocolError::UnknownKeyId(key_id.to_owned()))
    }

    pub fn len(&self) -> usize {
        self.keys.len()
    }

    pub fn is_empty(&self) -> bool {
        self.keys.is_empty()
    }
}

/// Immutable protocol configuration shared by every request flow.
#[derive(Debug)]
pub struct ProtocolConfig {
    keys: KeyRegistry,
    pub default_key_id: String,
    pub this_solution_id: String,
    pub headers: HeaderNames,
    pub mirror_encrypt_response: bool,
    pub nonce_len: usize,
    pub tag_len: usize,
    pub request_timeout: Duration,
    pub max_body_bytes: usize,
}

impl ProtocolConfig {
    /// Load and validate the protocol configuration from the environment.
    ///
    /// # Errors
    ///
    /// Returns a [`ConfigError`] describing the first invalid setting.
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_settings(ProtocolSettings::from_env()?)
    }

    /// Validate `settings` and build the immutable configuration.
    ///
    /// # Errors
    ///
    /// Returns a [`ConfigError`] describing the first invalid setting.
    pub fn from_settings(settings: ProtocolSettings) -> Result<Self, ConfigError> {
        let keys = KeyRegistry::parse(&settings.keys)?;
        if keys.is_empty() {
            return Err(ConfigError::Missing("KEYS"));
        }
        if keys.get(&settings.default_key_id).is_err() {
            return Err(ConfigError::UnknownDefaultKeyId(settings.default_key_id));
        }
        for id in keys.keys.keys() {
            ensure_header_value(id, "KEYS")?;
        }
        ensure_header_value(&settings.this_solution_id, "THIS_SOLUTION_ID")?;
        aead::validate_lengths(settings.nonce_length_bytes, settings.tag_length_bytes)?;
        if settings.request_timeout_secs == 0 {
            return Err(ConfigError::ZeroTimeout);
        }
        if settings.max_body_bytes == 0 {
            return Err(ConfigError::ZeroBodyLimit);
        }

        let headers = HeaderNames {
            encrypted_flag: header_name(&settings.encrypted_flag_header, "ENCRYPTED_FLAG_HEADER")?,
            key_id: header_name(&settings.key_id_header, "KEY_ID_HEADER")?,
            from_solution: header_name(&settings.from_solution_header, "FROM_SOLUTION_HEADER")?,
            to_solution: header_name(&settings.to_solution_header, "TO_SOLUTION_HEADER")?,
            original_content_type: header_name(
                &settings.original_content_type_header,
                "ORIGINAL_CONTENT_TYPE_HEADER",
            )?,
        };

        Ok(Self {
            keys,
            default_key_id: settings.default_key_id,
            this_solution_id: settings.this_solution_id,
            headers,
            mirror_encrypt_response: settings.mirror_encrypt_response,
            nonce_len: settings.nonce_length_bytes,
            tag_len: settings.tag_length_bytes,
            request_timeout: Duration::from_secs(settings.request_timeout_secs),
            max_body_bytes: settings.max_body_bytes,
        })
    }

    /// The key registry.
    pub fn keys(&self) -> &KeyRegistry {
        &self.keys
    }

    /// Replace the request timeout. Intended for tests and embedding callers
    /// that want sub-second limits.
    pub fn with_request_timeout(mut self, timeout: Duration) -> Self {
        self.request_timeout = timeout;
        self
    }
}

fn header_name(value: &str, name: &'static str) -> Result<HeaderName, ConfigError> {
    HeaderName::from_bytes(value.trim().as_bytes()).map_err(|_| ConfigError::HeaderName {
        name,
        value: value.to_owned(),
    })
}

fn ensure_header_value(value: &str, name: &'static str) -> Result<(), ConfigError> {
    HeaderValue::from_str(value)
        .map(|_| ())
        .map_err(|_| ConfigError::HeaderValue {
            name,
            value: value.to_owned(),
        })
}

// Keep the key material out of error messages.
fn redact_entry(entry: &str) -> String {
    match entry.split_once(':') {
        Some((id, _)) => format!("{id}:<redacted>"),
        None => "<redacted>".into(),
    }
}
