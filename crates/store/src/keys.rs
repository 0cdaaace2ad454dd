//! Storage key naming.
//!
//! Current-format tokens live under `{prefix}_{gateway}_payment_tokens` and
//! legacy tokens under `{prefix}_{gateway}_legacy_tokens`. Both are suffixed
//! with `_{environment}` outside production. Environment ids cannot contain
//! `_`, so two distinct environments never share a key.

use paytokens_common::{Environment, GatewayId};

const CURRENT_SUFFIX: &str = "payment_tokens";
const LEGACY_SUFFIX: &str = "legacy_tokens";

/// Computes attribute keys for one gateway.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct KeyResolver {
    prefix: String,
    gateway_id: GatewayId,
}

impl KeyResolver {
    pub fn new(prefix: impl Into<String>, gateway_id: GatewayId) -> Self {
        Self {
            prefix: prefix.into(),
            gateway_id,
        }
    }

    pub fn gateway_id(&self) -> &GatewayId {
        &self.gateway_id
    }

    /// Current-format key for `environment`.
    pub fn resolve(&self, environment: &Environment) -> String {
        self.scoped(CURRENT_SUFFIX, environment)
    }

    /// Legacy-format key for `environment`.
    pub fn legacy_key(&self, environment: &Environment) -> String {
        self.scoped(LEGACY_SUFFIX, environment)
    }

    fn scoped(&self, suffix: &str, environment: &Environment) -> String {
        let base = format!("{}_{}_{}", self.prefix, self.gateway_id, suffix);
        match environment.id() {
            None => base,
            Some(env) => format!("{}_{}", base, env),
        }
    }
}
