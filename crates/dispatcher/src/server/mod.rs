//! Forward-proxy sidecar: the local application sends plaintext requests here
//! and they leave encrypted for the configured remote solution.

pub mod handlers;
pub mod router;
pub mod state;
