//! Server side of the encrypted inter-solution protocol.
//!
//! [`GatewayLayer`] wraps any downstream `tower` service: flagged requests are
//! authenticated and decrypted before the downstream stage sees them, and the
//! response is encrypted back under the same key when mirroring is enabled.
//! The [`server`] module wires the layer into a reverse-proxy sidecar.

pub mod body;
pub mod layer;
pub mod rejection;
pub mod server;
pub mod settings;
pub mod telemetry;

pub use layer::{GatewayLayer, GatewayService};
