//! HTTP surface of the wabridge gateway.
//!
//! Request lifecycle for client-scoped routes:
//! 1. Resolve the client (`?client=`, else the default client) and check its token
//! 2. Take the client's driver lock (bounded wait, 503 when busy)
//! 3. Health-check the driver, recreating it when its status is unknown
//! 4. Arm the client's unread-message poller
//! 5. Run the route, then release the lock

pub mod auth;
pub mod error;
pub mod media;
pub mod routes;
pub mod server;
pub mod session;
pub mod state;

pub use {
    error::ApiError,
    server::{build_app, seed_default_client, start_gateway},
    state::{AppState, GatewaySettings},
};
