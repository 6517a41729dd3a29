//! Per-client API configuration record.

use {
    secrecy::{ExposeSecret, Secret},
    serde::{Deserialize, Serialize},
};

/// Token and webhook settings of one client.
#[derive(Clone, Serialize, Deserialize)]
pub struct ApiConfig {
    pub client: String,

    /// API token. An empty token disables authentication for the client.
    #[serde(serialize_with = "serialize_secret")]
    pub token: Secret<String>,

    #[serde(default)]
    pub webhook_enabled: bool,

    #[serde(default)]
    pub webhook_url: Option<String>,
}

impl ApiConfig {
    pub fn new(client: impl Into<String>, token: impl Into<String>) -> Self {
        Self {
            client: client.into(),
            token: Secret::new(token.into()),
            webhook_enabled: false,
            webhook_url: None,
        }
    }

    pub fn with_webhook(mut self, url: impl Into<String>) -> Self {
        self.webhook_enabled = true;
        self.webhook_url = Some(url.into());
        self
    }

    /// Whether requests for this client must present a token.
    pub fn requires_token(&self) -> bool {
        !self.token.expose_secret().is_empty()
    }

    /// URL inbound messages are forwarded to, when forwarding is enabled.
    pub fn webhook_target(&self) -> Option<&str> {
        if !self.webhook_enabled {
            return None;
        }
        self.webhook_url.as_deref().filter(|url| !url.trim().is_empty())
    }
}

impl std::fmt::Debug for ApiConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ApiConfig")
            .field("client", &self.client)
            .field("token", &"[REDACTED]")
            .field("webhook_enabled", &self.webhook_enabled)
            .field("webhook_url", &self.webhook_url)
            .finish()
    }
}

fn serialize_secret<S: serde::Serializer>(
    secret: &Secret<String>,
    serializer: S,
) -> Result<S::Ok, S::Error> {
    serializer.serialize_str(secret.expose_secret())
}
