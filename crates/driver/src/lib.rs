//! Driver capability for wabridge client sessions.
//!
//! A [`Driver`] is one automated WhatsApp Web browser session. The gateway
//! treats it as a black box that may fail or disconnect at any time; the only
//! health signal it relies on is [`Driver::status`] reporting
//! [`DriverStatus::Unknown`].
//!
//! The production implementation talks to a browser-automation sidecar over
//! WebSocket, one connection per client:
//!
//! ```text
//! ┌──────────────────────┐  launch/status/send_text/...  ┌─────────────────┐
//! │  SidecarDriver        │ ─────────────────────────────▶│  sidecar        │
//! │  (one per client)     │ ◀─────────────────────────────│  (Chromium)     │
//! └──────────────────────┘      result / event frames     └─────────────────┘
//! ```

pub mod client;
pub mod config;
pub mod driver;
pub mod error;
#[cfg(any(test, feature = "test-support"))]
pub mod fake;
pub mod message;
pub mod sidecar;
pub mod types;

pub use {
    client::{SidecarDriver, SidecarDriverFactory},
    config::LaunchOptions,
    driver::{Driver, DriverFactory, DriverStatus},
    error::{DriverError, Result},
    message::{Message, MessageGroup},
};
