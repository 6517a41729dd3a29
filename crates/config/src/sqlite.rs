//! SQLite-backed [`ConfigStore`], the `apiconfig` table.

use std::str::FromStr;

use {
    async_trait::async_trait,
    secrecy::{ExposeSecret, Secret},
    sqlx::sqlite::{SqliteConnectOptions, SqlitePool, SqlitePoolOptions},
    tracing::{debug, info},
};

use crate::{api::ApiConfig, error::ConfigError, store::ConfigStore};

pub struct SqliteConfigStore {
    pool: SqlitePool,
}

#[derive(sqlx::FromRow)]
struct ApiConfigRow {
    client: String,
    key: String,
    webhook: i64,
    webhook_url: Option<String>,
}

impl From<ApiConfigRow> for ApiConfig {
    fn from(r: ApiConfigRow) -> Self {
        Self {
            client: r.client,
            token: Secret::new(r.key),
            webhook_enabled: r.webhook != 0,
            webhook_url: r.webhook_url,
        }
    }
}

impl SqliteConfigStore {
    pub fn new(pool: SqlitePool) -> Self {
        Self { pool }
    }

    /// Open (creating if needed) the database at `url` and ensure the schema.
    pub async fn connect(url: &str) -> Result<Self, ConfigError> {
        let options = SqliteConnectOptions::from_str(url)?.create_if_missing(true);
        if let Some(parent) = options.get_filename().parent()
            && !parent.as_os_str().is_empty()
        {
            tokio::fs::create_dir_all(parent)
                .await
                .map_err(|e| ConfigError::Database(sqlx::Error::Io(e)))?;
        }
        let pool = SqlitePoolOptions::new()
            .max_connections(4)
            .connect_with(options)
            .await?;
        Self::init(&pool).await?;
        debug!(url, "opened config database");
        Ok(Self::new(pool))
    }

    /// Create the `apiconfig` table if it doesn't exist.
    pub async fn init(pool: &SqlitePool) -> Result<(), ConfigError> {
        sqlx::query(
            r#"CREATE TABLE IF NOT EXISTS apiconfig (
                id          INTEGER PRIMARY KEY AUTOINCREMENT,
                client      TEXT NOT NULL UNIQUE,
                key         TEXT NOT NULL DEFAULT '',
                webhook     INTEGER NOT NULL DEFAULT 0,
                webhook_url TEXT
            )"#,
        )
        .execute(pool)
        .await?;
        Ok(())
    }

    /// Seed `client` with `token` unless a record already exists.
    /// Returns whether a record was created.
    pub async fn bootstrap(&self, client: &str, token: &str) -> Result<bool, ConfigError> {
        let result = sqlx::query(
            "INSERT INTO apiconfig (client, key, webhook, webhook_url) VALUES (?, ?, 0, '')
             ON CONFLICT(client) DO NOTHING",
        )
        .bind(client)
        .bind(token)
        .execute(&self.pool)
        .await?;
        let created = result.rows_affected() > 0;
        if created {
            info!(client, "seeded API config");
        }
        Ok(created)
    }
}

#[async_trait]
impl ConfigStore for SqliteConfigStore {
    async fn get(&self, client: &str) -> Result<Option<ApiConfig>, ConfigError> {
        let row = sqlx::query_as::<_, ApiConfigRow>(
            "SELECT client, key, webhook, webhook_url FROM apiconfig WHERE client = ?",
        )
        .bind(client)
        .fetch_optional(&self.pool)
        .await?;
        Ok(row.map(Into::into))
    }

    async fn upsert(&self, config: ApiConfig) -> Result<(), ConfigError> {
        sqlx::query(
            r#"INSERT INTO apiconfig (client, key, webhook, webhook_url)
               VALUES (?, ?, ?, ?)
               ON CONFLICT(client) DO UPDATE SET
                 key = excluded.key,
                 webhook = excluded.webhook,
                 webhook_url = excluded.webhook_url"#,
        )
        .bind(&config.client)
        .bind(config.token.expose_secret())
        .bind(config.webhook_enabled as i64)
        .bind(&config.webhook_url)
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    async fn update_webhook(
        &self,
        client: &str,
        enabled: bool,
        url: Option<String>,
    ) -> Result<ApiConfig, ConfigError> {
        let result = sqlx::query("UPDATE apiconfig SET webhook = ?, webhook_url = ? WHERE client = ?")
            .bind(enabled as i64)
            .bind(&url)
            .bind(client)
            .execute(&self.pool)
            .await?;
        if result.rows_affected() == 0 {
            return Err(ConfigError::ClientNotFound(client.to_string()));
        }
        self.get(client)
            .await?
            .ok_or_else(|| ConfigError::ClientNotFound(client.to_string()))
    }

    async fn list(&self) -> Result<Vec<ApiConfig>, ConfigError> {
        let rows = sqlx::query_as::<_, ApiConfigRow>(
            "SELECT client, key, webhook, webhook_url FROM apiconfig ORDER BY client ASC",
        )
        .fetch_all(&self.pool)
        .await?;
        Ok(rows.into_iter().map(Into::into).collect())
    }

    async fn delete(&self, client: &str) -> Result<bool, ConfigError> {
        let result = sqlx::query("DELETE FROM apiconfig WHERE client = ?")
            .bind(client)
            .execute(&self.pool)
            .await?;
        Ok(result.rows_affected() > 0)
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;

    async fn store() -> (SqliteConfigStore, tempfile::TempDir) {
        let dir = tempfile::tempdir().unwrap();
        let url = format!("sqlite://{}", dir.path().join("test.db").display());
        (SqliteConfigStore::connect(&url).await.unwrap(), dir)
    }

    #[tokio::test]
    async fn bootstrap_is_idempotent() {
        let (store, _dir) = store().await;
        assert!(store.bootstrap("admin", "first").await.unwrap());
        assert!(!store.bootstrap("admin", "second").await.unwrap());

        let cfg = store.get("admin").await.unwrap().unwrap();
        assert_eq!(cfg.token.expose_secret(), "first");
        assert!(!cfg.webhook_enabled);
        assert!(cfg.webhook_target().is_none());
    }

    #[tokio::test]
    async fn webhook_update_persists() {
        let (store, _dir) = store().await;
        store.bootstrap("admin", "tok").await.unwrap();

        let cfg = store
            .update_webhook("admin", true, Some("http://x/hook".into()))
            .await
            .unwrap();
        assert_eq!(cfg.webhook_target(), Some("http://x/hook"));

        let reloaded = store.get("admin").await.unwrap().unwrap();
        assert!(reloaded.webhook_enabled);
        assert_eq!(reloaded.webhook_url.as_deref(), Some("http://x/hook"));

        let err = store.update_webhook("ghost", true, None).await.unwrap_err();
        assert!(matches!(err, ConfigError::ClientNotFound(_)));
    }

    #[tokio::test]
    async fn upsert_list_delete() {
        let (store, _dir) = store().await;
        store.upsert(ApiConfig::new("beta", "b")).await.unwrap();
        store
            .upsert(ApiConfig::new("alpha", "a").with_webhook("http://a/hook"))
            .await
            .unwrap();
        store.upsert(ApiConfig::new("beta", "b2")).await.unwrap();

        let all = store.list().await.unwrap();
        assert_eq!(all.len(), 2);
        assert_eq!(all[0].client, "alpha");
        assert_eq!(all[1].token.expose_secret(), "b2");

        assert!(store.delete("beta").await.unwrap());
        assert!(store.get("beta").await.unwrap().is_none());
    }
}
