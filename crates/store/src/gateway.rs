//! Gateway-facing facade.
//!
//! Payment flows hold a [`GatewayTokens`] bound to the environment their
//! gateway runs in, so they never pass environment ids around.

use std::sync::Arc;

use paytokens_common::{CustomerId, Environment, TokenId};

use crate::attribute::AttributeStore;
use crate::errors::TokenStoreResult;
use crate::store::TokenStore;
use crate::token::{Token, TokenCollection};

/// A token store bound to one environment.
pub struct GatewayTokens<S> {
    store: Arc<TokenStore<S>>,
    environment: Environment,
}

impl<S> Clone for GatewayTokens<S> {
    fn clone(&self) -> Self {
        Self {
            store: Arc::clone(&self.store),
            environment: self.environment.clone(),
        }
    }
}

impl<S: AttributeStore> GatewayTokens<S> {
    pub fn new(store: Arc<TokenStore<S>>, environment: Environment) -> Self {
        Self { store, environment }
    }

    pub fn environment(&self) -> &Environment {
        &self.environment
    }

    pub fn store(&self) -> &TokenStore<S> {
        &self.store
    }

    pub fn get_tokens(&self, customer: &CustomerId) -> TokenCollection {
        self.store.get_tokens(customer, &self.environment)
    }

    pub fn get_token(&self, customer: &CustomerId, token_id: &TokenId) -> Option<Token> {
        self.store.get_token(customer, token_id, &self.environment)
    }

    pub fn has_token(&self, customer: &CustomerId, token_id: &TokenId) -> bool {
        self.store.has_token(customer, token_id, &self.environment)
    }

    pub fn update_tokens(
        &self,
        customer: &CustomerId,
        tokens: &TokenCollection,
    ) -> TokenStoreResult<()> {
        self.store.update_tokens(customer, tokens, &self.environment)
    }

    pub fn add_token(&self, customer: &CustomerId, token: Token) -> TokenStoreResult<()> {
        self.store.add_token(customer, token, &self.environment)
    }

    pub fn update_token(&self, customer: &CustomerId, token: Token) -> TokenStoreResult<bool> {
        self.store.update_token(customer, token, &self.environment)
    }

    pub fn remove_token(
        &self,
        customer: &CustomerId,
        token_id: &TokenId,
    ) -> TokenStoreResult<bool> {
        self.store.remove_token(customer, token_id, &self.environment)
    }

    pub fn set_default_token(
        &self,
        customer: &CustomerId,
        token_id: &TokenId,
    ) -> TokenStoreResult<bool> {
        self.store.set_default_token(customer, token_id, &self.environment)
    }
}
