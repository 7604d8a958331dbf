//! Process configuration read from the environment.

use std::net::SocketAddr;

use thiserror::Error;

const DEFAULT_BIND_ADDR: &str = "0.0.0.0:8080";
const DEV_JWT_SECRET: &str = "dev-secret";

#[derive(Debug, Error, PartialEq, Eq)]
pub enum ConfigError {
    #[error("invalid BIND_ADDR '{0}'")]
    InvalidBindAddr(String),

    #[error("DATABASE_URL must be set when USE_PERSISTENT_STORES=true")]
    MissingDatabaseUrl,
}

/// Where items, environments and the ledger live.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum StorageConfig {
    InMemory,
    Postgres { database_url: String },
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ApiConfig {
    pub bind_addr: SocketAddr,
    pub jwt_secret: String,
    pub storage: StorageConfig,
}

impl ApiConfig {
    /// Read `BIND_ADDR`, `JWT_SECRET`, `USE_PERSISTENT_STORES` and `DATABASE_URL`.
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Same as [`ApiConfig::from_env`] with an injectable variable source.
    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Result<Self, ConfigError> {
        let raw_addr = lookup("BIND_ADDR").unwrap_or_else(|| DEFAULT_BIND_ADDR.to_string());
        let bind_addr = raw_addr
            .parse()
            .map_err(|_| ConfigError::InvalidBindAddr(raw_addr.clone()))?;

        let jwt_secret = lookup("JWT_SECRET").unwrap_or_else(|| {
            tracing::warn!("JWT_SECRET not set; using insecure dev default");
            DEV_JWT_SECRET.to_string()
        });

        let use_persistent = lookup("USE_PERSISTENT_STORES")
            .unwrap_or_else(|| "false".to_string())
            .parse::<bool>()
            .unwrap_or(false);

        let storage = if use_persistent {
            let database_url = lookup("DATABASE_URL").ok_or(ConfigError::MissingDatabaseUrl)?;
            StorageConfig::Postgres { database_url }
        } else {
            StorageConfig::InMemory
        };

        Ok(Self {
            bind_addr,
            jwt_secret,
            storage,
        })
    }
}
