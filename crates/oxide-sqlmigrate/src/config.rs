//! PostgreSQL connection configuration.
//!
//! The configuration can be built in code or loaded from a JSON file:
//!
//! ```json
//! {
//!   "host": "localhost",
//!   "port": 5432,
//!   "user": "root",
//!   "dbname": "test",
//!   "password": "root",
//!   "sslmode": "disable",
//!   "runtime_params": { "search_path": "test", "application_name": "test" }
//! }
//! ```

use std::collections::BTreeMap;
use std::path::Path;
use std::str::FromStr;

use serde::Deserialize;
use sqlx::postgres::{PgConnectOptions, PgSslMode};

use crate::error::{MigrateError, Result};

/// Connection parameters for a PostgreSQL server.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct ConnectionConfig {
    /// Server host.
    pub host: String,
    /// Server port.
    #[serde(default = "default_port")]
    pub port: u16,
    /// Login role.
    pub user: String,
    /// Database name.
    pub dbname: String,
    /// Password, if any.
    #[serde(default)]
    pub password: Option<String>,
    /// libpq-style SSL mode (`disable`, `prefer`, `require`, ...).
    #[serde(default = "default_sslmode")]
    pub sslmode: String,
    /// Session parameters such as `search_path` or `application_name`.
    /// Entries with an empty value are ignored.
    #[serde(default)]
    pub runtime_params: BTreeMap<String, String>,
}

fn default_port() -> u16 {
    5432
}

fn default_sslmode() -> String {
    "prefer".to_string()
}

impl ConnectionConfig {
    /// Creates a configuration with default port and SSL mode.
    pub fn new(host: impl Into<String>, user: impl Into<String>, dbname: impl Into<String>) -> Self {
        Self {
            host: host.into(),
            port: default_port(),
            user: user.into(),
            dbname: dbname.into(),
            password: None,
            sslmode: default_sslmode(),
            runtime_params: BTreeMap::new(),
        }
    }

    /// Sets the password.
    #[must_use]
    pub fn password(mut self, password: impl Into<String>) -> Self {
        self.password = Some(password.into());
        self
    }

    /// Sets the SSL mode.
    #[must_use]
    pub fn sslmode(mut self, sslmode: impl Into<String>) -> Self {
        self.sslmode = sslmode.into();
        self
    }

    /// Adds a session parameter.
    #[must_use]
    pub fn runtime_param(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.runtime_params.insert(key.into(), value.into());
        self
    }

    /// Loads a configuration from a JSON file.
    pub fn from_json_file(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let content = std::fs::read_to_string(path).map_err(|e| MigrateError::io(path, e))?;
        Self::from_json(&content)
    }

    /// Parses a configuration from JSON text.
    pub fn from_json(content: &str) -> Result<Self> {
        serde_json::from_str(content).map_err(|e| MigrateError::Config(e.to_string()))
    }

    /// Builds sqlx connect options from this configuration.
    pub fn connect_options(&self) -> Result<PgConnectOptions> {
        let ssl_mode = PgSslMode::from_str(&self.sslmode)
            .map_err(|e| MigrateError::Config(format!("sslmode '{}': {e}", self.sslmode)))?;

        let mut options = PgConnectOptions::new()
            .host(&self.host)
            .port(self.port)
            .username(&self.user)
            .database(&self.dbname)
            .ssl_mode(ssl_mode);
        if let Some(password) = &self.password {
            options = options.password(password);
        }

        let mut session = Vec::new();
        for (key, value) in &self.runtime_params {
            if value.is_empty() {
                continue;
            }
            if key == "application_name" {
                options = options.application_name(value);
            } else {
                session.push((key.as_str(), value.as_str()));
            }
        }
        if !session.is_empty() {
            options = options.options(session);
        }

        Ok(options)
    }
}
