use std::{path::PathBuf, sync::Arc};

use {
    wabridge_config::{ConfigStore, GatewayConfig},
    wabridge_sessions::SessionManager,
};

/// Settings handlers need beyond the session layer.
#[derive(Debug, Clone)]
pub struct GatewaySettings {
    /// Client used when a request names none.
    pub default_client: String,
    /// Where QR codes and screenshots are rendered.
    pub static_dir: PathBuf,
    /// Where uploaded media is saved.
    pub media_dir: PathBuf,
}

impl GatewaySettings {
    pub fn from_config(config: &GatewayConfig) -> Self {
        Self {
            default_client: config.auth.default_client.clone(),
            static_dir: config.storage.static_dir.clone(),
            media_dir: config.storage.media_dir.clone(),
        }
    }
}

/// Shared handler state.
#[derive(Clone)]
pub struct AppState {
    pub sessions: Arc<SessionManager>,
    pub store: Arc<dyn ConfigStore>,
    pub settings: Arc<GatewaySettings>,
    pub version: &'static str,
}

impl AppState {
    pub fn new(sessions: Arc<SessionManager>, settings: GatewaySettings) -> Self {
        Self {
            store: Arc::clone(sessions.store()),
            sessions,
            settings: Arc::new(settings),
            version: env!("CARGO_PKG_VERSION"),
        }
    }
}
