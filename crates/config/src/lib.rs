//! Configuration for the wabridge gateway.
//!
//! Two kinds of configuration live here: the process-wide [`GatewayConfig`]
//! loaded from `wabridge.{toml,yaml,yml,json}`, and the per-client
//! [`ApiConfig`] records (token and webhook settings) kept in a
//! [`ConfigStore`].

pub mod api;
pub mod env_subst;
pub mod error;
pub mod loader;
pub mod schema;
pub mod sqlite;
pub mod store;

pub use {
    api::ApiConfig,
    error::ConfigError,
    loader::{data_dir, discover_and_load, load_config},
    schema::{AuthConfig, GatewayConfig, SessionsConfig, SidecarConfig},
    sqlite::SqliteConfigStore,
    store::{ConfigStore, MemoryConfigStore},
};
