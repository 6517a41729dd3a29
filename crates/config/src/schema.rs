//! Gateway configuration schema.

use std::{path::PathBuf, time::Duration};

use {
    secrecy::Secret,
    serde::{Deserialize, Serialize},
    wabridge_driver::{LaunchOptions, sidecar::DEFAULT_SIDECAR_URL},
};

use crate::loader::data_dir;

/// Root configuration.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct GatewayConfig {
    pub server: ServerConfig,
    pub sessions: SessionsConfig,
    pub browser: LaunchOptions,
    pub sidecar: SidecarConfig,
    pub storage: StorageConfig,
    pub auth: AuthConfig,
}

/// HTTP listener.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ServerConfig {
    pub bind: String,
    pub port: u16,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            bind: "0.0.0.0".into(),
            port: 5000,
        }
    }
}

/// Per-client session lifecycle tuning.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct SessionsConfig {
    /// Delay between unread-message polls, in milliseconds.
    pub poll_interval_ms: u64,

    /// How long a request waits for a client's driver lock, in milliseconds.
    pub semaphore_timeout_ms: u64,

    /// Upper bound on one webhook delivery, in seconds.
    pub webhook_timeout_secs: u64,

    /// Root of the per-client browser profile directories.
    pub cache_dir: PathBuf,
}

impl SessionsConfig {
    pub fn poll_interval(&self) -> Duration {
        Duration::from_millis(self.poll_interval_ms)
    }

    pub fn semaphore_timeout(&self) -> Duration {
        Duration::from_millis(self.semaphore_timeout_ms)
    }

    pub fn webhook_timeout(&self) -> Duration {
        Duration::from_secs(self.webhook_timeout_secs)
    }
}

impl Default for SessionsConfig {
    fn default() -> Self {
        Self {
            poll_interval_ms: 2_000,
            semaphore_timeout_ms: 10_000,
            webhook_timeout_secs: 10,
            cache_dir: data_dir().join("chrome_cache"),
        }
    }
}

/// Browser-automation sidecar endpoint.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct SidecarConfig {
    pub url: String,
    pub request_timeout_secs: u64,
    /// Browser startup can take much longer than a regular command.
    pub launch_timeout_secs: u64,
    pub connect_retries: u32,
}

impl Default for SidecarConfig {
    fn default() -> Self {
        Self {
            url: DEFAULT_SIDECAR_URL.into(),
            request_timeout_secs: 30,
            launch_timeout_secs: 90,
            connect_retries: 3,
        }
    }
}

/// Database and file locations.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct StorageConfig {
    /// SQLite URL of the client config database.
    pub database_url: String,

    /// Where QR codes and screenshots are rendered.
    pub static_dir: PathBuf,

    /// Where uploaded media is saved before sending.
    pub media_dir: PathBuf,
}

impl Default for StorageConfig {
    fn default() -> Self {
        let dir = data_dir();
        Self {
            database_url: format!("sqlite://{}", dir.join("wabridge.db").display()),
            static_dir: dir.join("static"),
            media_dir: dir.join("media"),
        }
    }
}

/// Client bootstrap.
#[derive(Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct AuthConfig {
    /// Client used when a request names none.
    pub default_client: String,

    /// Token seeded for the default client when the database is created.
    /// A random token is generated when unset.
    #[serde(skip_serializing)]
    pub bootstrap_token: Option<Secret<String>>,
}

impl std::fmt::Debug for AuthConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AuthConfig")
            .field("default_client", &self.default_client)
            .field(
                "bootstrap_token",
                &self.bootstrap_token.as_ref().map(|_| "[REDACTED]"),
            )
            .finish()
    }
}

impl Default for AuthConfig {
    fn default() -> Self {
        Self {
            default_client: "admin".into(),
            bootstrap_token: None,
        }
    }
}
