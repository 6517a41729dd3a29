//! The driver capability the session manager orchestrates.

use std::{path::Path, sync::Arc};

use {
    async_trait::async_trait,
    serde::{Deserialize, Serialize},
};

use crate::{config::LaunchOptions, error::Result, message::MessageGroup};

/// Login state reported by a driver.
///
/// Anything the driver cannot classify (a crashed browser, a closed sidecar
/// connection, an unrecognized state string) is `Unknown`, which the session
/// manager treats as "session presumed dead".
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum DriverStatus {
    #[default]
    Unknown,
    NotLoggedIn,
    LoggedIn,
}

impl DriverStatus {
    /// Parse a status string as reported by the sidecar.
    pub fn parse(raw: &str) -> Self {
        match raw {
            "LoggedIn" | "logged_in" => Self::LoggedIn,
            "NotLoggedIn" | "not_logged_in" => Self::NotLoggedIn,
            _ => Self::Unknown,
        }
    }

    /// The browser is up and answering, logged in or not.
    pub fn is_alive(self) -> bool {
        matches!(self, Self::NotLoggedIn | Self::LoggedIn)
    }

    pub fn is_logged_in(self) -> bool {
        self == Self::LoggedIn
    }
}

/// One automated browser session for one client.
#[async_trait]
pub trait Driver: Send + Sync {
    /// Current login state. Never fails: errors map to [`DriverStatus::Unknown`].
    async fn status(&self) -> DriverStatus;

    /// Render the login QR code as a PNG at `path`.
    async fn get_qr(&self, path: &Path) -> Result<()>;

    /// Capture the current page as a PNG at `path`.
    async fn screenshot(&self, path: &Path) -> Result<()>;

    async fn send_text(&self, recipient: &str, content: &str) -> Result<()>;

    async fn send_media(&self, path: &Path, recipient: &str, caption: Option<&str>) -> Result<()>;

    /// Fetch every chat with unread messages.
    async fn get_unread(&self) -> Result<Vec<MessageGroup>>;

    /// Mark a chat's messages as seen.
    async fn mark_seen(&self, group: &MessageGroup) -> Result<()>;

    async fn is_logged_in(&self) -> bool {
        self.status().await.is_logged_in()
    }

    /// Terminate the browser session. Best effort; errors are logged.
    async fn close(&self);
}

/// Constructs driver handles for clients.
#[async_trait]
pub trait DriverFactory: Send + Sync {
    async fn create(
        &self,
        client_id: &str,
        cache_path: &Path,
        options: &LaunchOptions,
    ) -> Result<Arc<dyn Driver>>;
}
