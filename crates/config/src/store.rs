//! Persistence seam for per-client API configuration.

use std::collections::HashMap;

use {async_trait::async_trait, tokio::sync::RwLock};

use crate::{api::ApiConfig, error::ConfigError};

/// Storage for [`ApiConfig`] records, keyed by client id.
#[async_trait]
pub trait ConfigStore: Send + Sync {
    async fn get(&self, client: &str) -> Result<Option<ApiConfig>, ConfigError>;

    /// Insert or replace a client's record.
    async fn upsert(&self, config: ApiConfig) -> Result<(), ConfigError>;

    /// Update the webhook settings of an existing client.
    async fn update_webhook(
        &self,
        client: &str,
        enabled: bool,
        url: Option<String>,
    ) -> Result<ApiConfig, ConfigError>;

    async fn list(&self) -> Result<Vec<ApiConfig>, ConfigError>;

    /// Remove a client's record. Returns whether it existed.
    async fn delete(&self, client: &str) -> Result<bool, ConfigError>;
}

/// In-memory store, used by tests and ephemeral deployments.
#[derive(Default)]
pub struct MemoryConfigStore {
    records: RwLock<HashMap<String, ApiConfig>>,
}

impl MemoryConfigStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_records(records: impl IntoIterator<Item = ApiConfig>) -> Self {
        Self {
            records: RwLock::new(
                records
                    .into_iter()
                    .map(|r| (r.client.clone(), r))
                    .collect(),
            ),
        }
    }
}

#[async_trait]
impl ConfigStore for MemoryConfigStore {
    async fn get(&self, client: &str) -> Result<Option<ApiConfig>, ConfigError> {
        Ok(self.records.read().await.get(client).cloned())
    }

    async fn upsert(&self, config: ApiConfig) -> Result<(), ConfigError> {
        self.records
            .write()
            .await
            .insert(config.client.clone(), config);
        Ok(())
    }

    async fn update_webhook(
        &self,
        client: &str,
        enabled: bool,
        url: Option<String>,
    ) -> Result<ApiConfig, ConfigError> {
        let mut records = self.records.write().await;
        let record = records
            .get_mut(client)
            .ok_or_else(|| ConfigError::ClientNotFound(client.to_string()))?;
        record.webhook_enabled = enabled;
        record.webhook_url = url;
        Ok(record.clone())
    }

    async fn list(&self) -> Result<Vec<ApiConfig>, ConfigError> {
        let mut all: Vec<ApiConfig> = self.records.read().await.values().cloned().collect();
        all.sort_by(|a, b| a.client.cmp(&b.client));
        Ok(all)
    }

    async fn delete(&self, client: &str) -> Result<bool, ConfigError> {
        Ok(self.records.write().await.remove(client).is_some())
    }
}
