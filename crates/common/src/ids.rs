//! Identifiers that scope stored payment tokens.
//!
//! Tokens are stored per customer and per gateway, and optionally per named
//! environment. `TokenId` and `EnvironmentId` are checked when built, so an
//! empty token id or an environment containing the key delimiter `_` cannot
//! reach key construction.

use serde::{Deserialize, Serialize};
use std::fmt;
use thiserror::Error;

/// Errors raised when an identifier fails validation.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum IdError {
    #[error("token id cannot be empty")]
    EmptyTokenId,

    #[error("invalid environment id '{0}': only ASCII letters, digits and '-' are allowed")]
    InvalidEnvironment(String),
}

/// Customer (subject) identifier.
///
/// Every persisted token collection belongs to exactly one customer.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct CustomerId(String);

impl CustomerId {
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for CustomerId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl From<&str> for CustomerId {
    fn from(s: &str) -> Self {
        Self(s.to_string())
    }
}

impl From<u64> for CustomerId {
    fn from(id: u64) -> Self {
        Self(id.to_string())
    }
}

/// Payment gateway identifier.
///
/// Scopes storage keys so that two gateways never share a token set.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct GatewayId(String);

impl GatewayId {
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for GatewayId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Processor-issued token identifier.
///
/// Never empty: the only constructor is [`TokenId::parse`], and
/// deserialization goes through the same check.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct TokenId(String);

impl TokenId {
    /// Validate and wrap a processor token identifier.
    pub fn parse(id: impl Into<String>) -> Result<Self, IdError> {
        let id = id.into();
        if id.is_empty() {
            return Err(IdError::EmptyTokenId);
        }
        Ok(Self(id))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    pub fn into_string(self) -> String {
        self.0
    }
}

impl fmt::Display for TokenId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl TryFrom<String> for TokenId {
    type Error = IdError;

    fn try_from(s: String) -> Result<Self, Self::Error> {
        Self::parse(s)
    }
}

impl From<TokenId> for String {
    fn from(id: TokenId) -> Self {
        id.0
    }
}

/// Non-default environment identifier (e.g. `test`, `sandbox`).
///
/// Restricted to ASCII letters, digits and `-`. The underscore is the
/// storage-key delimiter, so it can never appear here.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct EnvironmentId(String);

impl EnvironmentId {
    pub fn parse(id: impl Into<String>) -> Result<Self, IdError> {
        let id = id.into();
        let valid = !id.is_empty()
            && id
                .chars()
                .all(|c| c.is_ascii_alphanumeric() || c == '-');
        if !valid {
            return Err(IdError::InvalidEnvironment(id));
        }
        Ok(Self(id))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for EnvironmentId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl TryFrom<String> for EnvironmentId {
    type Error = IdError;

    fn try_from(s: String) -> Result<Self, Self::Error> {
        Self::parse(s)
    }
}

impl From<EnvironmentId> for String {
    fn from(id: EnvironmentId) -> Self {
        id.0
    }
}

/// Operating environment a token set belongs to.
#[derive(Debug, Clone, Default, PartialEq, Eq, Hash)]
pub enum Environment {
    /// The default namespace, used when no environment is given.
    #[default]
    Production,
    /// A named, non-default namespace.
    Named(EnvironmentId),
}

impl Environment {
    /// Build an environment from an optional identifier.
    ///
    /// `None` and the empty string both denote production.
    pub fn from_optional(id: Option<&str>) -> Result<Self, IdError> {
        match id {
            None | Some("") => Ok(Self::Production),
            Some(id) => EnvironmentId::parse(id).map(Self::Named),
        }
    }

    pub fn named(id: &str) -> Result<Self, IdError> {
        EnvironmentId::parse(id).map(Self::Named)
    }

    pub fn is_production(&self) -> bool {
        matches!(self, Self::Production)
    }

    /// The environment identifier, or `None` for production.
    pub fn id(&self) -> Option<&str> {
        match self {
            Self::Production => None,
            Self::Named(id) => Some(id.as_str()),
        }
    }
}

impl fmt::Display for Environment {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Production => write!(f, "production"),
            Self::Named(id) => write!(f, "{}", id),
        }
    }
}
