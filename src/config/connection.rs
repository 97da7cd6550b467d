//! ClickHouse connection configuration.
//!
//! Values come from the `[clickhouse]` section of the config file and can be
//! overridden with environment variables:
//! - `CLICKHOUSE_HOST`: Server hostname
//! - `CLICKHOUSE_PORT`: HTTP port (default 8123)
//! - `CLICKHOUSE_USER`: Username
//! - `CLICKHOUSE_PASSWORD`: Password
//! - `CLICKHOUSE_DATABASE`: Database name

use std::env;

use serde::{Deserialize, Serialize};

use super::settings::{expand_env_vars, SettingsError};

/// Default ClickHouse HTTP port.
pub const DEFAULT_HTTP_PORT: u16 = 8123;

/// Connection settings for the ClickHouse HTTP interface.
#[derive(Debug, Clone, PartialEq, Deserialize, Serialize)]
#[serde(default)]
pub struct ClickHouseSettings {
    /// Server hostname.
    pub host: String,

    /// HTTP port.
    pub port: u16,

    /// Username (empty for the server default user).
    pub user: String,

    /// Password (supports ${ENV_VAR} expansion).
    pub password: String,

    /// Database queried by default.
    pub database: String,

    /// Use HTTPS instead of HTTP.
    pub secure: bool,

    /// Request timeout in seconds.
    pub timeout_secs: u64,
}

impl Default for ClickHouseSettings {
    fn default() -> Self {
        Self {
            host: "localhost".to_string(),
            port: DEFAULT_HTTP_PORT,
            user: String::new(),
            password: String::new(),
            database: "default".to_string(),
            secure: false,
            timeout_secs: 30,
        }
    }
}

impl ClickHouseSettings {
    /// Apply `CLICKHOUSE_*` environment overrides on top of these settings.
    pub fn with_env_overrides(mut self) -> Self {
        if let Ok(host) = env::var("CLICKHOUSE_HOST") {
            self.host = host;
        }
        if let Some(port) = env::var("CLICKHOUSE_PORT").ok().and_then(|p| p.parse().ok()) {
            self.port = port;
        }
        if let Ok(user) = env::var("CLICKHOUSE_USER") {
            self.user = user;
        }
        if let Ok(password) = env::var("CLICKHOUSE_PASSWORD") {
            self.password = password;
        }
        if let Ok(database) = env::var("CLICKHOUSE_DATABASE") {
            self.database = database;
        }
        self
    }

    /// Base URL of the HTTP interface.
    pub fn base_url(&self) -> String {
        let scheme = if self.secure { "https" } else { "http" };
        format!("{}://{}:{}/", scheme, self.host, self.port)
    }

    /// Get the password with environment variables expanded.
    pub fn resolved_password(&self) -> Result<String, SettingsError> {
        expand_env_vars(&self.password)
    }
}
