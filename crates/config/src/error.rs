use thiserror::Error;

/// Errors from a [`ConfigStore`](crate::ConfigStore).
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("no API config for client '{0}'")]
    ClientNotFound(String),

    #[error("database error: {0}")]
    Database(#[from] sqlx::Error),
}
