//! In-memory attribute store.

use crate::attribute::AttributeStore;
use crate::errors::AttributeStoreError;
use dashmap::DashMap;
use paytokens_common::CustomerId;
use serde_json::Value;

/// In-memory attribute store, indexed by customer then key.
///
/// Suitable for tests and single-process deployments; nothing survives a
/// restart.
#[derive(Debug, Default)]
pub struct MemoryAttributeStore {
    by_customer: DashMap<CustomerId, DashMap<String, Value>>,
}

impl MemoryAttributeStore {
    /// Create an empty memory attribute store.
    pub fn new() -> Self {
        Self::default()
    }

    /// Delete a single attribute, returning the previous value.
    pub fn remove(&self, customer: &CustomerId, key: &str) -> Option<Value> {
        let inner = self.by_customer.get(customer)?;
        let removed = inner.remove(key).map(|(_, value)| value);
        let now_empty = inner.is_empty();
        drop(inner);

        if now_empty {
            self.by_customer.remove_if(customer, |_, inner| inner.is_empty());
        }
        removed
    }

    /// Number of attributes stored for `customer`.
    pub fn len(&self, customer: &CustomerId) -> usize {
        self.by_customer
            .get(customer)
            .map(|inner| inner.len())
            .unwrap_or(0)
    }

    /// Keys stored for `customer`, unordered.
    pub fn keys(&self, customer: &CustomerId) -> Vec<String> {
        self.by_customer
            .get(customer)
            .map(|inner| inner.iter().map(|entry| entry.key().clone()).collect())
            .unwrap_or_default()
    }
}

impl AttributeStore for MemoryAttributeStore {
    fn read(&self, customer: &CustomerId, key: &str) -> Result<Option<Value>, AttributeStoreError> {
        Ok(self
            .by_customer
            .get(customer)
            .and_then(|inner| inner.get(key).map(|value| value.clone())))
    }

    fn write(
        &self,
        customer: &CustomerId,
        key: &str,
        value: Value,
    ) -> Result<(), AttributeStoreError> {
        self.by_customer
            .entry(customer.clone())
            .or_default()
            .insert(key.to_string(), value);

        tracing::trace!(customer = %customer, key = key, "Stored attribute");
        Ok(())
    }
}
