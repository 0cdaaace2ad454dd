//! Shared types for the paytokens workspace.

pub mod ids;

pub use ids::{CustomerId, Environment, EnvironmentId, GatewayId, IdError, TokenId};
