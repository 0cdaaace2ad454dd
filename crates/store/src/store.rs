//! Token store: per-customer token collections over an attribute store.
//!
//! Reads detect the stored shape. Current-format data is returned as is;
//! when the current key is absent, the legacy key is decoded record by
//! record and the result is written back under the current key. The legacy
//! source is never modified by migration.
//!
//! A current key holding data that does not parse is never migrated over.
//! Plain reads return whatever records can still be recovered; mutations
//! refuse to run.
//!
//! Single-token operations are read-modify-write sequences over the whole
//! collection. They are not atomic across concurrent callers: the last write
//! wins.

use paytokens_common::{CustomerId, Environment, TokenId};
use serde_json::{Map, Value};
use tracing::{debug, info, trace, warn};

use crate::attribute::AttributeStore;
use crate::config::TokenStoreConfig;
use crate::errors::{ConfigError, TokenStoreError, TokenStoreResult};
use crate::keys::KeyResolver;
use crate::legacy;
use crate::token::{Token, TokenCollection};

/// Shape of the raw value found under a current-format key.
#[derive(Debug, Clone, PartialEq)]
pub enum StoredShape {
    /// A valid `id -> record` mapping (possibly empty).
    Current(TokenCollection),
    /// Nothing stored: fall through to the legacy key.
    Legacy,
    /// Something is stored but it does not parse as current-format data.
    Unreadable {
        /// Records that still parse on their own.
        recovered: TokenCollection,
        reason: String,
    },
}

impl StoredShape {
    /// Classify a raw attribute value.
    pub fn classify(raw: Option<Value>) -> Self {
        let value = match raw {
            None | Some(Value::Null) => return Self::Legacy,
            Some(value) => value,
        };

        let records = match &value {
            Value::Object(records) => records.clone(),
            other => {
                return Self::Unreadable {
                    recovered: TokenCollection::new(),
                    reason: format!(
                        "expected a mapping, found {}",
                        legacy::kind_of(other)
                    ),
                };
            }
        };

        match TokenCollection::from_value(value) {
            Ok(tokens) => Self::Current(tokens),
            Err(e) => {
                let (recovered, unreadable) = TokenCollection::recover(&records);
                Self::Unreadable {
                    recovered,
                    reason: format!("{} unreadable record(s): {}", unreadable, e),
                }
            }
        }
    }
}

/// Outcome of a legacy migration attempt.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MigrationStatus {
    /// Current-format data already exists; legacy data was not consulted.
    AlreadyCurrent,
    /// No decodable legacy records were found.
    NothingToMigrate,
    /// Legacy records were decoded and written under the current key.
    Migrated,
}

/// Summary returned by [`TokenStore::migrate`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct MigrationReport {
    pub status: MigrationStatus,
    /// Legacy records decoded into tokens
    pub decoded: usize,
    /// Malformed legacy records skipped
    pub skipped: usize,
}

/// How a read treats failures.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum ReadMode {
    /// Log and carry on with what could be read.
    Lenient,
    /// Fail, so a following write cannot clobber data that was not seen.
    Strict,
}

/// Token store for one gateway.
pub struct TokenStore<S> {
    keys: KeyResolver,
    attributes: S,
}

impl<S: AttributeStore> TokenStore<S> {
    /// Create a token store over `attributes`.
    pub fn new(keys: KeyResolver, attributes: S) -> Self {
        debug!(
            gateway = %keys.gateway_id(),
            key = %keys.resolve(&Environment::Production),
            "Creating token store"
        );
        Self { keys, attributes }
    }

    /// Create a token store from validated configuration.
    pub fn from_config(config: &TokenStoreConfig, attributes: S) -> Result<Self, ConfigError> {
        config.validate()?;
        Ok(Self::new(config.key_resolver(), attributes))
    }

    pub fn keys(&self) -> &KeyResolver {
        &self.keys
    }

    pub fn attributes(&self) -> &S {
        &self.attributes
    }

    // =========================================================================
    // Current-format operations
    // =========================================================================

    /// Get a customer's tokens, migrating legacy data on first read.
    ///
    /// Never fails: read errors are logged and yield an empty collection,
    /// and unreadable current data yields the records that still parse.
    pub fn get_tokens(&self, customer: &CustomerId, environment: &Environment) -> TokenCollection {
        match self.load_tokens(customer, environment, ReadMode::Lenient) {
            Ok(tokens) => tokens,
            Err(e) => {
                warn!(customer = %customer, error = %e, "Failed to load tokens");
                TokenCollection::new()
            }
        }
    }

    /// Replace the customer's persisted collection with `tokens`.
    ///
    /// Fails with [`TokenStoreError::Serialization`] without writing when a
    /// token carries a non-finite float in its metadata.
    pub fn update_tokens(
        &self,
        customer: &CustomerId,
        tokens: &TokenCollection,
        environment: &Environment,
    ) -> TokenStoreResult<()> {
        let key = self.keys.resolve(environment);
        self.write_collection(customer, &key, tokens)?;

        debug!(customer = %customer, key = %key, count = tokens.len(), "Updated tokens");
        Ok(())
    }

    /// Add a token, replacing any existing token with the same id.
    pub fn add_token(
        &self,
        customer: &CustomerId,
        token: Token,
        environment: &Environment,
    ) -> TokenStoreResult<()> {
        let mut tokens = self.load_tokens(customer, environment, ReadMode::Strict)?;
        let token_id = token.id().clone();
        let replaced = tokens.upsert(token).is_some();

        self.update_tokens(customer, &tokens, environment)?;

        debug!(customer = %customer, token_id = %token_id, replaced = replaced, "Added token");
        Ok(())
    }

    /// Remove a token by id.
    ///
    /// Returns `Ok(false)` without writing when no such token exists.
    pub fn remove_token(
        &self,
        customer: &CustomerId,
        token_id: &TokenId,
        environment: &Environment,
    ) -> TokenStoreResult<bool> {
        let mut tokens = self.load_tokens(customer, environment, ReadMode::Strict)?;
        if tokens.remove(token_id).is_none() {
            trace!(
                customer = %customer,
                token_id = %token_id,
                "Token not found, nothing to remove"
            );
            return Ok(false);
        }

        self.update_tokens(customer, &tokens, environment)?;

        debug!(customer = %customer, token_id = %token_id, "Removed token");
        Ok(true)
    }

    /// Get a single token by id.
    pub fn get_token(
        &self,
        customer: &CustomerId,
        token_id: &TokenId,
        environment: &Environment,
    ) -> Option<Token> {
        self.get_tokens(customer, environment).remove(token_id)
    }

    /// Whether the customer holds a token with this id.
    pub fn has_token(
        &self,
        customer: &CustomerId,
        token_id: &TokenId,
        environment: &Environment,
    ) -> bool {
        self.get_tokens(customer, environment).contains(token_id)
    }

    /// Replace an existing token.
    ///
    /// Returns `Ok(false)` without writing when the token does not exist.
    pub fn update_token(
        &self,
        customer: &CustomerId,
        token: Token,
        environment: &Environment,
    ) -> TokenStoreResult<bool> {
        let mut tokens = self.load_tokens(customer, environment, ReadMode::Strict)?;
        if !tokens.contains(token.id()) {
            return Ok(false);
        }

        let token_id = token.id().clone();
        tokens.upsert(token);
        self.update_tokens(customer, &tokens, environment)?;

        debug!(customer = %customer, token_id = %token_id, "Updated token");
        Ok(true)
    }

    /// Make `token_id` the customer's default token.
    ///
    /// Returns `Ok(false)` without writing when the token does not exist.
    pub fn set_default_token(
        &self,
        customer: &CustomerId,
        token_id: &TokenId,
        environment: &Environment,
    ) -> TokenStoreResult<bool> {
        let mut tokens = self.load_tokens(customer, environment, ReadMode::Strict)?;
        if !tokens.set_default(token_id) {
            return Ok(false);
        }

        self.update_tokens(customer, &tokens, environment)?;

        debug!(customer = %customer, token_id = %token_id, "Set default token");
        Ok(true)
    }

    /// Run legacy migration explicitly and report what happened.
    ///
    /// Unlike [`get_tokens`](Self::get_tokens), failed reads and writes are
    /// returned to the caller, and unreadable current data is an error.
    pub fn migrate(
        &self,
        customer: &CustomerId,
        environment: &Environment,
    ) -> TokenStoreResult<MigrationReport> {
        let key = self.keys.resolve(environment);

        match StoredShape::classify(self.read(customer, &key, ReadMode::Strict)?) {
            StoredShape::Current(_) => {
                return Ok(MigrationReport {
                    status: MigrationStatus::AlreadyCurrent,
                    decoded: 0,
                    skipped: 0,
                });
            }
            StoredShape::Unreadable { reason, .. } => {
                return Err(TokenStoreError::UnreadableCollection { key, reason });
            }
            StoredShape::Legacy => {}
        }

        let (tokens, skipped) = self.decode_legacy(customer, environment, ReadMode::Strict)?;
        if tokens.is_empty() {
            return Ok(MigrationReport {
                status: MigrationStatus::NothingToMigrate,
                decoded: 0,
                skipped,
            });
        }

        self.write_collection(customer, &key, &tokens)?;
        info!(
            customer = %customer,
            key = %key,
            migrated = tokens.len(),
            skipped = skipped,
            "Migrated legacy tokens"
        );

        Ok(MigrationReport {
            status: MigrationStatus::Migrated,
            decoded: tokens.len(),
            skipped,
        })
    }

    // =========================================================================
    // Legacy-format operations
    // =========================================================================

    /// Decode the customer's legacy tokens without writing anything.
    pub fn get_legacy_tokens(
        &self,
        customer: &CustomerId,
        environment: &Environment,
    ) -> TokenCollection {
        match self.decode_legacy(customer, environment, ReadMode::Lenient) {
            Ok((tokens, _)) => tokens,
            Err(e) => {
                warn!(customer = %customer, error = %e, "Failed to load legacy tokens");
                TokenCollection::new()
            }
        }
    }

    /// Write one token into the legacy record mapping.
    ///
    /// Other legacy records are left exactly as stored. Returns `Ok(false)`
    /// when the stored legacy value is not a mapping.
    pub fn update_legacy_token(
        &self,
        customer: &CustomerId,
        token: &Token,
        environment: &Environment,
    ) -> TokenStoreResult<bool> {
        let Some(mut records) = self.load_legacy_for_update(customer, environment)? else {
            return Ok(false);
        };

        records.insert(token.id().to_string(), legacy::encode(token)?);
        self.write_legacy(customer, environment, records)?;

        debug!(customer = %customer, token_id = %token.id(), "Updated legacy token");
        Ok(true)
    }

    /// Delete one record from the legacy mapping.
    ///
    /// Returns `Ok(false)` without writing when there is nothing to delete.
    pub fn delete_legacy_token(
        &self,
        customer: &CustomerId,
        token_id: &TokenId,
        environment: &Environment,
    ) -> TokenStoreResult<bool> {
        let Some(mut records) = self.load_legacy_for_update(customer, environment)? else {
            return Ok(false);
        };
        if records.shift_remove(token_id.as_str()).is_none() {
            return Ok(false);
        }

        self.write_legacy(customer, environment, records)?;

        debug!(customer = %customer, token_id = %token_id, "Deleted legacy token");
        Ok(true)
    }

    // =========================================================================
    // Internals
    // =========================================================================

    fn read(
        &self,
        customer: &CustomerId,
        key: &str,
        mode: ReadMode,
    ) -> TokenStoreResult<Option<Value>> {
        match self.attributes.read(customer, key) {
            Ok(raw) => Ok(raw),
            Err(source) if mode == ReadMode::Strict => {
                Err(TokenStoreError::PersistenceReadFailed {
                    key: key.to_string(),
                    source,
                })
            }
            Err(e) => {
                warn!(
                    customer = %customer,
                    key = key,
                    error = %e,
                    "Attribute read failed, treating as absent"
                );
                Ok(None)
            }
        }
    }

    /// Load the current collection, migrating legacy data when the current
    /// key is absent.
    fn load_tokens(
        &self,
        customer: &CustomerId,
        environment: &Environment,
        mode: ReadMode,
    ) -> TokenStoreResult<TokenCollection> {
        let key = self.keys.resolve(environment);

        match StoredShape::classify(self.read(customer, &key, mode)?) {
            StoredShape::Current(tokens) => {
                trace!(customer = %customer, key = %key, count = tokens.len(), "Loaded tokens");
                Ok(tokens)
            }
            StoredShape::Unreadable { recovered, reason } => match mode {
                ReadMode::Lenient => {
                    warn!(
                        customer = %customer,
                        key = %key,
                        recovered = recovered.len(),
                        reason = %reason,
                        "Stored tokens are not in current format, returning readable records"
                    );
                    Ok(recovered)
                }
                ReadMode::Strict => Err(TokenStoreError::UnreadableCollection { key, reason }),
            },
            StoredShape::Legacy => {
                let (tokens, skipped) = self.decode_legacy(customer, environment, mode)?;
                if tokens.is_empty() {
                    return Ok(tokens);
                }

                match self.write_collection(customer, &key, &tokens) {
                    Ok(()) => info!(
                        customer = %customer,
                        key = %key,
                        migrated = tokens.len(),
                        skipped = skipped,
                        "Migrated legacy tokens"
                    ),
                    Err(e) => warn!(
                        customer = %customer,
                        key = %key,
                        error = %e,
                        "Failed to persist migrated tokens, will retry on next read"
                    ),
                }
                Ok(tokens)
            }
        }
    }

    fn write_collection(
        &self,
        customer: &CustomerId,
        key: &str,
        tokens: &TokenCollection,
    ) -> TokenStoreResult<()> {
        let value = tokens.to_value()?;
        self.attributes
            .write(customer, key, value)
            .map_err(|source| TokenStoreError::PersistenceWriteFailed {
                key: key.to_string(),
                source,
            })
    }

    /// Decode every legacy record, skipping malformed ones.
    ///
    /// Returns the decoded tokens and the number of skipped records.
    fn decode_legacy(
        &self,
        customer: &CustomerId,
        environment: &Environment,
        mode: ReadMode,
    ) -> TokenStoreResult<(TokenCollection, usize)> {
        let key = self.keys.legacy_key(environment);
        let records = match self.read(customer, &key, mode)? {
            None | Some(Value::Null) => return Ok((TokenCollection::new(), 0)),
            Some(Value::Object(records)) => records,
            Some(other) => {
                warn!(
                    customer = %customer,
                    key = %key,
                    found = legacy::kind_of(&other),
                    "Legacy token data is not a mapping, ignoring"
                );
                return Ok((TokenCollection::new(), 0));
            }
        };

        let mut skipped = 0;
        let tokens: TokenCollection = records
            .iter()
            .filter_map(|(id, record)| match legacy::decode(id, record) {
                Ok(token) => Some(token),
                Err(e) => {
                    warn!(customer = %customer, key = %key, error = %e, "Skipping legacy token");
                    skipped += 1;
                    None
                }
            })
            .collect();

        Ok((tokens, skipped))
    }

    /// Load the raw legacy mapping for a read-modify-write.
    ///
    /// A failed read is an error here: writing back a fresh mapping would
    /// clobber records we could not see.
    fn load_legacy_for_update(
        &self,
        customer: &CustomerId,
        environment: &Environment,
    ) -> TokenStoreResult<Option<Map<String, Value>>> {
        let key = self.keys.legacy_key(environment);

        match self.read(customer, &key, ReadMode::Strict)? {
            None | Some(Value::Null) => Ok(Some(Map::new())),
            Some(Value::Object(records)) => Ok(Some(records)),
            Some(_) => {
                warn!(
                    customer = %customer,
                    key = %key,
                    "Legacy token data is not a mapping, refusing to modify"
                );
                Ok(None)
            }
        }
    }

    fn write_legacy(
        &self,
        customer: &CustomerId,
        environment: &Environment,
        records: Map<String, Value>,
    ) -> TokenStoreResult<()> {
        let key = self.keys.legacy_key(environment);
        self.attributes
            .write(customer, &key, Value::Object(records))
            .map_err(|source| TokenStoreError::PersistenceWriteFailed { key, source })
    }
}
