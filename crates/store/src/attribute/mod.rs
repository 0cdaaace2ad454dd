//! Attribute store implementations.
//!
//! An attribute store is a per-customer key/value mapping holding raw JSON
//! values. It offers no transactions or locking; the token store layers
//! whole-collection replace semantics on top.

mod file;
mod memory;

pub use file::FileAttributeStore;
pub use memory::MemoryAttributeStore;

use crate::errors::AttributeStoreError;
use paytokens_common::CustomerId;
use serde_json::Value;
use std::sync::Arc;

/// Attribute store trait consumed by the token store.
pub trait AttributeStore: Send + Sync {
    /// Read a raw value. `Ok(None)` when the key was never written.
    fn read(&self, customer: &CustomerId, key: &str) -> Result<Option<Value>, AttributeStoreError>;

    /// Replace the raw value stored under `key`.
    fn write(
        &self,
        customer: &CustomerId,
        key: &str,
        value: Value,
    ) -> Result<(), AttributeStoreError>;
}

impl<S: AttributeStore + ?Sized> AttributeStore for Arc<S> {
    fn read(&self, customer: &CustomerId, key: &str) -> Result<Option<Value>, AttributeStoreError> {
        (**self).read(customer, key)
    }

    fn write(
        &self,
        customer: &CustomerId,
        key: &str,
        value: Value,
    ) -> Result<(), AttributeStoreError> {
        (**self).write(customer, key, value)
    }
}
