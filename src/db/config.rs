//! Database connection configuration.
//!
//! A connection is resolved from `.schema_delta.json` first, then from the
//! `DATABASE_URL` environment variable.

use std::error::Error;

use serde::{Deserialize, Serialize};

use super::postgres::PostgresSession;
use super::session::Session;

/// PostgreSQL connection settings as written in the config file.
///
/// Either `connection_string` or the individual fields are used; the
/// connection string wins when both are present.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct PostgresConfig {
    #[serde(default)]
    pub connection_string: Option<String>,
    #[serde(default)]
    pub host: Option<String>,
    #[serde(default)]
    pub port: Option<u16>,
    #[serde(default)]
    pub user: Option<String>,
    #[serde(default)]
    pub password: Option<String>,
    #[serde(default)]
    pub database: Option<String>,
    #[serde(default)]
    pub ssl: bool,
}

impl PostgresConfig {
    /// Build a `postgres://` URL from the configured fields.
    pub fn to_url(&self) -> Result<String, Box<dyn Error>> {
        if let Some(url) = &self.connection_string {
            return Ok(url.clone());
        }
        let host = self
            .host
            .as_deref()
            .ok_or("PostgreSQL config needs either 'connection_string' or 'host'")?;
        let mut url = String::from("postgres://");
        if let Some(user) = &self.user {
            url.push_str(user);
            if let Some(password) = &self.password {
                url.push(':');
                url.push_str(password);
            }
            url.push('@');
        }
        url.push_str(host);
        url.push(':');
        url.push_str(&self.port.unwrap_or(5432).to_string());
        if let Some(database) = &self.database {
            url.push('/');
            url.push_str(database);
        }
        if self.ssl {
            url.push_str("?sslmode=require");
        }
        Ok(url)
    }
}

/// Resolved backend connection target.
#[derive(Debug, Clone, PartialEq)]
pub enum DatabaseConfig {
    Postgres { url: String },
}

impl DatabaseConfig {
    /// Open a session for this configuration.
    pub fn connect(&self) -> Result<Box<dyn Session>, Box<dyn Error>> {
        match self {
            Self::Postgres { url } => Ok(Box::new(PostgresSession::connect(url)?)),
        }
    }

    /// Parse a connection URL.
    pub fn from_url(url: &str) -> Result<Self, Box<dyn Error>> {
        if url.starts_with("postgres://") || url.starts_with("postgresql://") {
            return Ok(Self::Postgres {
                url: url.to_string(),
            });
        }
        Err(format!("Unsupported database URL '{}': expected postgres://", url).into())
    }

    /// Load from the `DATABASE_URL` environment variable.
    pub fn from_env() -> Result<Option<Self>, Box<dyn Error>> {
        match std::env::var("DATABASE_URL") {
            Ok(url) => Ok(Some(Self::from_url(&url)?)),
            Err(_) => Ok(None),
        }
    }

    /// Resolve configuration from the config file, then the environment.
    pub fn resolve() -> Result<Self, Box<dyn Error>> {
        if let Ok(config_file) = crate::config::ConfigFile::load() {
            return config_file.database.to_database_config();
        }
        if let Some(config) = Self::from_env()? {
            return Ok(config);
        }
        Err("No database configured: create .schema_delta.json or set DATABASE_URL".into())
    }
}
