//! Payment token storage with transparent legacy-format migration.
//!
//! Tokens are persisted per customer, per gateway and per environment in an
//! external [`AttributeStore`]. The [`TokenStore`] reads and writes whole
//! collections, migrates old flat-format records on first read, and exposes
//! single-token read-modify-write helpers on top.
//!
//! ```ignore
//! let store = TokenStore::from_config(&config, MemoryAttributeStore::new())?;
//! let customer = CustomerId::from(1);
//!
//! store.add_token(&customer, token, &Environment::Production)?;
//! let tokens = store.get_tokens(&customer, &Environment::Production);
//! ```

pub mod attribute;
pub mod config;
pub mod errors;
pub mod gateway;
pub mod keys;
pub mod legacy;
pub mod store;
pub mod token;

pub use attribute::{AttributeStore, FileAttributeStore, MemoryAttributeStore};
pub use config::{StorageConfig, TokenStoreConfig};
pub use errors::{AttributeStoreError, ConfigError, TokenStoreError, TokenStoreResult};
pub use gateway::GatewayTokens;
pub use keys::KeyResolver;
pub use store::{MigrationReport, MigrationStatus, StoredShape, TokenStore};
pub use token::{MetaValue, Token, TokenCollection, TokenType};

pub use paytokens_common::{CustomerId, Environment, EnvironmentId, GatewayId, TokenId};
