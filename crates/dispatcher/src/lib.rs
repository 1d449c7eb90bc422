//! Client side of the encrypted inter-solution protocol.
//!
//! [`DispatchLayer`] wraps an HTTP client service: every outgoing request body
//! is encrypted for one target solution, and a response carrying the
//! encrypted flag is decrypted before the caller sees it. The [`server`]
//! module exposes the layer as a forward-proxy sidecar.

pub mod error;
pub mod layer;
pub mod server;
pub mod settings;
pub mod telemetry;

pub use error::DispatchError;
pub use layer::{DispatchLayer, DispatchService};
