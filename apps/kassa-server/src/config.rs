//! Server configuration module.
//!
//! Configuration is layered: built-in defaults, then an optional TOML file,
//! then `KASSA__SECTION__KEY` environment variables.
//!
//! ```text
//! KASSA__DATABASE__PATH=/var/lib/kassa/ledger.db
//! KASSA__LEDGER__PRODUCTION_DISPATCH=true
//! KASSA__AUTH__JWT_SECRET=...
//! ```

use std::path::{Path, PathBuf};
use std::time::Duration;

use config::{Config, Environment, File};
use kassa_db::{DbConfig, Deadlines};
use serde::{Deserialize, Serialize};

/// Server configuration.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct ServerConfig {
    pub server: ServerSection,
    pub database: DatabaseSection,
    pub ledger: LedgerSection,
    pub remote: RemoteSection,
    pub cache: CacheSection,
    pub auth: AuthSection,
}

/// TLS identity this server presents to the remote services.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct ServerSection {
    /// Enable mutual TLS on the gRPC channels
    pub tls_enabled: bool,

    /// TLS certificate path
    pub tls_cert_path: Option<PathBuf>,

    /// TLS key path
    pub tls_key_path: Option<PathBuf>,

    /// CA bundle used to verify the remote services
    pub tls_ca_path: Option<PathBuf>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct DatabaseSection {
    /// SQLite database file
    pub path: PathBuf,
    pub max_connections: u32,
    pub min_connections: u32,

    /// Budget for single-row reads and writes
    pub short_deadline_secs: u64,

    /// Budget for multi-step operations (merge, close bill, payment)
    pub long_deadline_secs: u64,
    pub run_migrations: bool,
}

impl Default for DatabaseSection {
    fn default() -> Self {
        DatabaseSection {
            path: PathBuf::from("kassa.db"),
            max_connections: 5,
            min_connections: 1,
            short_deadline_secs: 15,
            long_deadline_secs: 30,
            run_migrations: true,
        }
    }
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct LedgerSection {
    /// Completed orders wait in `ordered` until production dispatches them
    pub production_dispatch: bool,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct RemoteSection {
    /// User service (users and till assignment)
    pub directory_url: String,

    /// Inventory service (catalog lookups)
    pub inventory_url: String,
    pub request_timeout_secs: u64,
}

impl Default for RemoteSection {
    fn default() -> Self {
        RemoteSection {
            directory_url: "http://127.0.0.1:50061".to_string(),
            inventory_url: "http://127.0.0.1:50062".to_string(),
            request_timeout_secs: 10,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct CacheSection {
    /// Redis connection string (optional)
    pub redis_url: Option<String>,
    pub settings_ttl_secs: u64,
}

impl Default for CacheSection {
    fn default() -> Self {
        CacheSection {
            redis_url: None,
            settings_ttl_secs: 300,
        }
    }
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct AuthSection {
    /// Secret the identity tokens are signed with
    pub jwt_secret: String,
}

impl ServerConfig {
    /// Loads `path` (when given) and applies environment overrides.
    pub fn load(path: Option<&Path>) -> Result<Self, ConfigError> {
        let mut builder = Config::builder();
        if let Some(path) = path {
            builder = builder.add_source(File::from(path).required(true));
        }
        builder = builder.add_source(
            Environment::with_prefix("KASSA")
                .separator("__")
                .try_parsing(true),
        );

        let config: ServerConfig = builder.build()?.try_deserialize()?;
        config.validate()?;
        Ok(config)
    }

    /// Rejects combinations the server cannot start with.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.server.tls_enabled
            && (self.server.tls_cert_path.is_none() || self.server.tls_key_path.is_none())
        {
            return Err(ConfigError::MissingTlsConfig);
        }

        if self.auth.jwt_secret.trim().is_empty() {
            return Err(ConfigError::MissingRequired("auth.jwt_secret".to_string()));
        }

        if self.database.max_connections == 0 {
            return Err(ConfigError::InvalidValue("database.max_connections".to_string()));
        }
        if self.database.short_deadline_secs == 0 || self.database.long_deadline_secs == 0 {
            return Err(ConfigError::InvalidValue("database deadlines".to_string()));
        }

        Ok(())
    }

    /// Store configuration derived from the `database` and `ledger` sections.
    pub fn db_config(&self) -> DbConfig {
        DbConfig::new(&self.database.path)
            .max_connections(self.database.max_connections)
            .min_connections(self.database.min_connections)
            .run_migrations(self.database.run_migrations)
            .deadlines(Deadlines {
                short: Duration::from_secs(self.database.short_deadline_secs),
                long: Duration::from_secs(self.database.long_deadline_secs),
            })
            .production_dispatch(self.ledger.production_dispatch)
    }

    pub fn request_timeout(&self) -> Duration {
        Duration::from_secs(self.remote.request_timeout_secs)
    }
}

/// Configuration error types.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("Failed to load configuration: {0}")]
    Load(#[from] config::ConfigError),

    #[error("Invalid value for {0}")]
    InvalidValue(String),

    #[error("TLS enabled but certificate or key path not provided")]
    MissingTlsConfig,

    #[error("Missing required configuration: {0}")]
    MissingRequired(String),
}
