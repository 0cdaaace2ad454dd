//! Configuration schema for the token store.
//!
//! ```toml
//! prefix = "_wc"
//! gateway_id = "test_gateway"
//! environment = "test"        # omit for production
//!
//! [storage]
//! type = "file"
//! path = "/var/lib/paytokens"
//! ```

use std::path::{Path, PathBuf};

use paytokens_common::{Environment, GatewayId};
use serde::{Deserialize, Serialize};

use crate::errors::ConfigError;
use crate::keys::KeyResolver;

/// Root configuration for one gateway's token store.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TokenStoreConfig {
    /// Storage key prefix.
    #[serde(default = "default_prefix")]
    pub prefix: String,

    /// Gateway the tokens belong to.
    pub gateway_id: String,

    /// Environment the gateway runs in (`None` = production).
    #[serde(default)]
    pub environment: Option<String>,

    /// Attribute store backend.
    #[serde(default)]
    pub storage: StorageConfig,
}

fn default_prefix() -> String {
    "_wc".to_string()
}

/// Attribute store backend configuration.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum StorageConfig {
    /// In-memory store (single process, non-persistent).
    #[default]
    Memory,
    /// One JSON document per customer under `path`.
    File { path: PathBuf },
}

impl TokenStoreConfig {
    /// Minimal in-memory configuration for `gateway_id`.
    pub fn new(gateway_id: impl Into<String>) -> Self {
        Self {
            prefix: default_prefix(),
            gateway_id: gateway_id.into(),
            environment: None,
            storage: StorageConfig::default(),
        }
    }

    /// Load and validate a TOML configuration file.
    pub fn from_file(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let content = std::fs::read_to_string(path)?;
        Self::from_toml(&content)
    }

    /// Parse and validate TOML configuration text.
    pub fn from_toml(content: &str) -> Result<Self, ConfigError> {
        let config: Self = toml::from_str(content)?;
        config.validate()?;
        Ok(config)
    }

    /// Validate configuration.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.prefix.is_empty() {
            return Err(ConfigError::Invalid("prefix cannot be empty".to_string()));
        }
        if self.gateway_id.is_empty() {
            return Err(ConfigError::Invalid("gateway_id cannot be empty".to_string()));
        }
        self.environment()?;

        if let StorageConfig::File { path } = &self.storage {
            if path.as_os_str().is_empty() {
                return Err(ConfigError::Invalid("storage path cannot be empty".to_string()));
            }
        }

        Ok(())
    }

    /// The configured environment.
    pub fn environment(&self) -> Result<Environment, ConfigError> {
        Environment::from_optional(self.environment.as_deref())
            .map_err(|e| ConfigError::Invalid(e.to_string()))
    }

    pub fn key_resolver(&self) -> KeyResolver {
        KeyResolver::new(self.prefix.clone(), GatewayId::new(self.gateway_id.clone()))
    }
}
