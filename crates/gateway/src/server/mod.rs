//! Axum server for the gateway sidecar.
//!
//! # Responsibilities
//! - Define the router: a local `/health` route and a fallback that relays
//!   every other request to the upstream application.
//! - Wrap the router in [`crate::GatewayLayer`] so flagged requests are
//!   decrypted before relaying and responses are mirror-encrypted.

pub mod handlers;
pub mod router;
pub mod state;
