//! End-to-end behaviour of the token store over real attribute stores.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use paytokens_store::{
    AttributeStore, AttributeStoreError, CustomerId, Environment, FileAttributeStore, GatewayId,
    KeyResolver, MemoryAttributeStore, MetaValue, Token, TokenCollection, TokenId, TokenStore,
    TokenStoreConfig, TokenStoreError,
};
use proptest::prelude::*;
use serde_json::{json, Value};

fn id(s: &str) -> TokenId {
    TokenId::parse(s).unwrap()
}

fn keys() -> KeyResolver {
    KeyResolver::new("_wc", GatewayId::new("test_gateway"))
}

fn memory_store() -> TokenStore<Arc<MemoryAttributeStore>> {
    TokenStore::new(keys(), Arc::new(MemoryAttributeStore::new()))
}

/// Gets legacy token data, as it would exist in the attribute store.
fn legacy_token_data() -> Value {
    json!({
        "type": "credit_card",
        "last_four": "1111",
        "exp_month": "01",
        "exp_year": "20",
        "card_type": "visa",
        "custom": "custom_value",
    })
}

fn seed_legacy(
    store: &TokenStore<Arc<MemoryAttributeStore>>,
    customer: &CustomerId,
    environment: &Environment,
) {
    store
        .attributes()
        .write(
            customer,
            &store.keys().legacy_key(environment),
            json!({ "12345": legacy_token_data() }),
        )
        .unwrap();
}

/// The environments every legacy operation is exercised in.
fn environments() -> Vec<Environment> {
    vec![Environment::Production, Environment::named("test").unwrap()]
}

fn visa(token_id: &str) -> Token {
    Token::credit_card(id(token_id), "visa", "1111", "01", "2030")
}

// ============================================================================
// Key naming
// ============================================================================

#[test]
fn test_key_naming() {
    let keys = keys();
    assert_eq!(
        keys.resolve(&Environment::from_optional(None).unwrap()),
        "_wc_test_gateway_payment_tokens"
    );
    assert_eq!(
        keys.resolve(&Environment::from_optional(Some("test")).unwrap()),
        "_wc_test_gateway_payment_tokens_test"
    );
    assert_eq!(
        keys.legacy_key(&Environment::from_optional(Some("test")).unwrap()),
        "_wc_test_gateway_legacy_tokens_test"
    );
}

// ============================================================================
// Reads and migration
// ============================================================================

#[test]
fn test_idempotent_read() {
    for env in environments() {
        let store = memory_store();
        let customer = CustomerId::from(1);
        seed_legacy(&store, &customer, &env);

        let first = store.get_tokens(&customer, &env);
        let second = store.get_tokens(&customer, &env);
        assert_eq!(first.len(), 1);
        assert_eq!(first, second);
    }
}

#[test]
fn test_migration_correctness() {
    let store = memory_store();
    let customer = CustomerId::from(1);
    seed_legacy(&store, &customer, &Environment::Production);

    let tokens = store.get_tokens(&customer, &Environment::Production);
    assert_eq!(tokens.len(), 1);
    let token = tokens.get(&id("12345")).unwrap();
    assert!(token.is_credit_card());
    assert_eq!(token.last_four(), Some("1111"));
    assert_eq!(token.exp_month(), Some("01"));
    assert_eq!(token.exp_year(), Some("20"));
    assert_eq!(token.card_type(), Some("visa"));
    assert_eq!(token.meta("custom"), Some(&MetaValue::from("custom_value")));

    // Legacy source is untouched by migration...
    let legacy_key = store.keys().legacy_key(&Environment::Production);
    assert_eq!(
        store.attributes().read(&customer, &legacy_key).unwrap(),
        Some(json!({ "12345": legacy_token_data() }))
    );

    // ...and no longer needed for the next read.
    store.attributes().remove(&customer, &legacy_key);
    let again = store.get_tokens(&customer, &Environment::Production);
    assert_eq!(again, tokens);
}

#[test]
fn test_malformed_legacy_record_is_skipped() {
    let store = memory_store();
    let customer = CustomerId::from(1);
    store
        .attributes()
        .write(
            &customer,
            &store.keys().legacy_key(&Environment::Production),
            json!({
                "12345": legacy_token_data(),
                "67890": "migrated",
                "24680": { "type": "echeck", "last_four": "6789" },
            }),
        )
        .unwrap();

    let tokens = store.get_tokens(&customer, &Environment::Production);
    let ids: Vec<&str> = tokens.iter().map(|t| t.id().as_str()).collect();
    assert_eq!(ids, vec!["12345", "24680"]);
}

#[test]
fn test_legacy_tokens_are_environment_scoped() {
    let store = memory_store();
    let customer = CustomerId::from(1);
    let test_env = Environment::named("test").unwrap();
    seed_legacy(&store, &customer, &Environment::Production);

    assert!(store.get_tokens(&customer, &test_env).is_empty());
    assert!(store.get_legacy_tokens(&customer, &test_env).is_empty());

    seed_legacy(&store, &customer, &test_env);
    assert!(store.get_tokens(&customer, &test_env).contains(&id("12345")));
    assert_eq!(
        store
            .attributes()
            .read(&customer, "_wc_test_gateway_payment_tokens_test")
            .unwrap()
            .map(|raw| raw["12345"]["display"]["last_four"].clone()),
        Some(json!("1111"))
    );
}

#[test]
fn test_unreadable_current_data_is_not_replaced_by_legacy() {
    let store = memory_store();
    let customer = CustomerId::from(1);
    let env = Environment::Production;
    seed_legacy(&store, &customer, &env);

    assert_eq!(store.get_tokens(&customer, &env).len(), 1);
    store.add_token(&customer, visa("new"), &env).unwrap();

    // A non-finite float is refused before anything is written.
    let mut bad = visa("f");
    bad.set_meta("ratio", f64::INFINITY);
    assert!(matches!(
        store.add_token(&customer, bad, &env),
        Err(TokenStoreError::Serialization(_))
    ));
    let ids: Vec<String> = store
        .get_tokens(&customer, &env)
        .iter()
        .map(|t| t.id().to_string())
        .collect();
    assert_eq!(ids, vec!["12345".to_string(), "new".to_string()]);

    // A record that no longer parses leaves the others readable, and the
    // stored value is never overwritten.
    let key = store.keys().resolve(&env);
    let mut raw = store.attributes().read(&customer, &key).unwrap().unwrap();
    raw["f"] = json!({ "type": "credit_card", "display": {}, "metadata": { "ratio": null } });
    store.attributes().write(&customer, &key, raw.clone()).unwrap();

    let ids: Vec<String> = store
        .get_tokens(&customer, &env)
        .iter()
        .map(|t| t.id().to_string())
        .collect();
    assert_eq!(ids, vec!["12345".to_string(), "new".to_string()]);
    assert!(matches!(
        store.add_token(&customer, visa("other"), &env),
        Err(TokenStoreError::UnreadableCollection { .. })
    ));
    assert!(matches!(
        store.remove_token(&customer, &id("new"), &env),
        Err(TokenStoreError::UnreadableCollection { .. })
    ));
    assert!(store.migrate(&customer, &env).is_err());
    assert_eq!(store.attributes().read(&customer, &key).unwrap(), Some(raw));
}

#[test]
fn test_environment_isolation() {
    let store = memory_store();
    let customer = CustomerId::from(1);
    let tokens: TokenCollection = vec![visa("T")].into_iter().collect();

    store
        .update_tokens(&customer, &tokens, &Environment::from_optional(None).unwrap())
        .unwrap();

    let test_tokens = store.get_tokens(&customer, &Environment::named("test").unwrap());
    assert!(!test_tokens.contains(&id("T")));
    assert!(store.get_tokens(&customer, &Environment::Production).contains(&id("T")));
}

// ============================================================================
// Single-token operations
// ============================================================================

#[test]
fn test_replace_on_duplicate() {
    let store = memory_store();
    let customer = CustomerId::from(1);
    let env = Environment::Production;

    let mut first = Token::new(id("X"), "credit_card".into());
    first.set_card_type("visa");
    let mut second = Token::new(id("X"), "credit_card".into());
    second.set_card_type("mastercard");

    store.add_token(&customer, first, &env).unwrap();
    store.add_token(&customer, second, &env).unwrap();

    let tokens = store.get_tokens(&customer, &env);
    assert_eq!(tokens.len(), 1);
    assert_eq!(tokens.get(&id("X")).unwrap().card_type(), Some("mastercard"));
}

#[test]
fn test_idempotent_delete() {
    let store = memory_store();
    let customer = CustomerId::from(1);
    let env = Environment::Production;
    store.add_token(&customer, visa("a"), &env).unwrap();
    let before = store.get_tokens(&customer, &env);

    assert!(!store.remove_token(&customer, &id("nonexistent"), &env).unwrap());
    assert_eq!(store.get_tokens(&customer, &env), before);

    assert!(store.remove_token(&customer, &id("a"), &env).unwrap());
    assert!(store.get_tokens(&customer, &env).is_empty());
}

#[test]
fn test_add_token_keeps_migrated_tokens() {
    let store = memory_store();
    let customer = CustomerId::from(1);
    seed_legacy(&store, &customer, &Environment::Production);

    store.add_token(&customer, visa("new"), &Environment::Production).unwrap();

    let ids: Vec<String> = store
        .get_tokens(&customer, &Environment::Production)
        .iter()
        .map(|t| t.id().to_string())
        .collect();
    assert_eq!(ids, vec!["12345".to_string(), "new".to_string()]);
}

// ============================================================================
// Legacy mutations
// ============================================================================

#[test]
fn test_get_legacy_tokens_does_not_write() {
    for env in environments() {
        let store = memory_store();
        let customer = CustomerId::from(1);
        seed_legacy(&store, &customer, &env);

        let tokens = store.get_legacy_tokens(&customer, &env);
        assert!(tokens.contains(&id("12345")));
        assert_eq!(
            store.attributes().read(&customer, &store.keys().resolve(&env)).unwrap(),
            None
        );
    }
}

#[test]
fn test_update_legacy_token() {
    for env in environments() {
        let store = memory_store();
        let customer = CustomerId::from(1);
        seed_legacy(&store, &customer, &env);

        let mut token = store
            .get_legacy_tokens(&customer, &env)
            .get(&id("12345"))
            .cloned()
            .unwrap();
        token.set_card_type("mastercard");

        assert!(store.update_legacy_token(&customer, &token, &env).unwrap());

        let tokens = store.get_legacy_tokens(&customer, &env);
        let token = tokens.iter().next().unwrap();
        assert_eq!(token.card_type(), Some("mastercard"));
        assert_eq!(token.meta("custom"), Some(&MetaValue::from("custom_value")));
    }
}

#[test]
fn test_update_legacy_token_preserves_other_records() {
    let store = memory_store();
    let customer = CustomerId::from(1);
    let env = Environment::Production;
    let untouched = json!({ "type": "credit_card", "last_four": 4242, "odd": [1, 2] });
    store
        .attributes()
        .write(
            &customer,
            &store.keys().legacy_key(&env),
            json!({ "12345": legacy_token_data(), "other": untouched.clone() }),
        )
        .unwrap();

    let mut token = visa("12345");
    token.set_last_four("9999");
    store.update_legacy_token(&customer, &token, &env).unwrap();

    let raw = store
        .attributes()
        .read(&customer, &store.keys().legacy_key(&env))
        .unwrap()
        .unwrap();
    assert_eq!(raw["other"], untouched);
    assert_eq!(raw["12345"]["last_four"], "9999");
}

#[test]
fn test_delete_legacy_token() {
    for env in environments() {
        let store = memory_store();
        let customer = CustomerId::from(1);
        seed_legacy(&store, &customer, &env);

        let token = store
            .get_legacy_tokens(&customer, &env)
            .iter()
            .next()
            .cloned()
            .unwrap();

        assert!(store.delete_legacy_token(&customer, token.id(), &env).unwrap());
        assert!(!store.get_legacy_tokens(&customer, &env).contains(&id("12345")));
        assert!(!store.delete_legacy_token(&customer, token.id(), &env).unwrap());
    }
}

#[test]
fn test_legacy_large_unsigned_survives_migration() {
    let store = memory_store();
    let customer = CustomerId::from(1);
    let env = Environment::Production;
    store
        .attributes()
        .write(
            &customer,
            &store.keys().legacy_key(&env),
            json!({
                "12345": { "type": "credit_card", "processor_ref": 18446744073709551615u64 }
            }),
        )
        .unwrap();

    let token = store.get_token(&customer, &id("12345"), &env).unwrap();
    assert_eq!(token.meta("processor_ref"), Some(&MetaValue::Unsigned(u64::MAX)));

    let raw = store
        .attributes()
        .read(&customer, &store.keys().resolve(&env))
        .unwrap()
        .unwrap();
    assert_eq!(raw["12345"]["metadata"]["processor_ref"], json!(u64::MAX));
}

// ============================================================================
// Persistence failures
// ============================================================================

/// Memory store that can be switched into failing reads and writes.
#[derive(Default)]
struct FlakyStore {
    inner: MemoryAttributeStore,
    fail_reads: AtomicBool,
    fail_writes: AtomicBool,
}

impl AttributeStore for FlakyStore {
    fn read(
        &self,
        customer: &CustomerId,
        key: &str,
    ) -> Result<Option<Value>, AttributeStoreError> {
        if self.fail_reads.load(Ordering::SeqCst) {
            return Err(AttributeStoreError::Unavailable("read refused".into()));
        }
        self.inner.read(customer, key)
    }

    fn write(
        &self,
        customer: &CustomerId,
        key: &str,
        value: Value,
    ) -> Result<(), AttributeStoreError> {
        if self.fail_writes.load(Ordering::SeqCst) {
            return Err(AttributeStoreError::Unavailable("write refused".into()));
        }
        self.inner.write(customer, key, value)
    }
}

#[test]
fn test_write_failure_is_surfaced() {
    let store = TokenStore::new(keys(), FlakyStore::default());
    let customer = CustomerId::from(1);
    store.attributes().fail_writes.store(true, Ordering::SeqCst);

    let err = store
        .add_token(&customer, visa("a"), &Environment::Production)
        .unwrap_err();
    match err {
        TokenStoreError::PersistenceWriteFailed { key, .. } => {
            assert_eq!(key, "_wc_test_gateway_payment_tokens");
        }
        other => panic!("unexpected error: {other}"),
    }
}

#[test]
fn test_read_failure_yields_empty_collection() {
    let store = TokenStore::new(keys(), FlakyStore::default());
    let customer = CustomerId::from(1);
    store.add_token(&customer, visa("a"), &Environment::Production).unwrap();

    store.attributes().fail_reads.store(true, Ordering::SeqCst);
    assert!(store.get_tokens(&customer, &Environment::Production).is_empty());

    let err = store
        .update_legacy_token(&customer, &visa("a"), &Environment::Production)
        .unwrap_err();
    assert!(matches!(err, TokenStoreError::PersistenceReadFailed { .. }));
}

#[test]
fn test_read_failure_blocks_mutations() {
    let store = TokenStore::new(keys(), FlakyStore::default());
    let customer = CustomerId::from(1);
    let env = Environment::Production;
    store.add_token(&customer, visa("a"), &env).unwrap();

    store.attributes().fail_reads.store(true, Ordering::SeqCst);
    for result in [
        store.add_token(&customer, visa("b"), &env).map(|_| true),
        store.remove_token(&customer, &id("a"), &env),
        store.set_default_token(&customer, &id("a"), &env),
        store.migrate(&customer, &env).map(|_| true),
    ] {
        assert!(matches!(
            result,
            Err(TokenStoreError::PersistenceReadFailed { .. })
        ));
    }

    store.attributes().fail_reads.store(false, Ordering::SeqCst);
    let ids: Vec<String> = store
        .get_tokens(&customer, &env)
        .iter()
        .map(|t| t.id().to_string())
        .collect();
    assert_eq!(ids, vec!["a".to_string()]);
}

#[test]
fn test_failed_migration_write_still_returns_tokens() {
    let store = TokenStore::new(keys(), FlakyStore::default());
    let customer = CustomerId::from(1);
    store
        .attributes()
        .write(
            &customer,
            &store.keys().legacy_key(&Environment::Production),
            json!({ "12345": legacy_token_data() }),
        )
        .unwrap();
    store.attributes().fail_writes.store(true, Ordering::SeqCst);

    let tokens = store.get_tokens(&customer, &Environment::Production);
    assert!(tokens.contains(&id("12345")));
    assert!(store.migrate(&customer, &Environment::Production).is_err());
}

// ============================================================================
// File-backed store
// ============================================================================

#[test]
fn test_file_store_survives_reopen() {
    let dir = tempfile::TempDir::new().unwrap();
    let config = TokenStoreConfig::new("test_gateway");
    let customer = CustomerId::from(3);
    let env = Environment::named("sandbox").unwrap();

    {
        let attributes = FileAttributeStore::open(dir.path()).unwrap();
        let store = TokenStore::from_config(&config, attributes).unwrap();
        store.add_token(&customer, visa("a"), &env).unwrap();
        store.add_token(&customer, visa("b"), &env).unwrap();
        store.set_default_token(&customer, &id("b"), &env).unwrap();
    }

    let attributes = FileAttributeStore::open(dir.path()).unwrap();
    let store = TokenStore::from_config(&config, attributes).unwrap();
    let tokens = store.get_tokens(&customer, &env);
    assert_eq!(tokens.len(), 2);
    assert_eq!(tokens.default_token().unwrap().id().as_str(), "b");
    assert!(store.get_tokens(&customer, &Environment::Production).is_empty());
}

// ============================================================================
// Round trip
// ============================================================================

fn arb_meta_value() -> impl Strategy<Value = MetaValue> {
    prop_oneof![
        any::<bool>().prop_map(MetaValue::Bool),
        any::<i64>().prop_map(MetaValue::Integer),
        (i64::MAX as u64 + 1..=u64::MAX).prop_map(MetaValue::Unsigned),
        // Quarters are exact in binary, so they survive the JSON text form.
        (-1_000_000i64..1_000_000).prop_map(|n| MetaValue::Float(n as f64 / 4.0)),
        "[ -~]{0,12}".prop_map(MetaValue::String),
    ]
}

fn arb_token() -> impl Strategy<Value = Token> {
    (
        "[a-z0-9]{1,8}",
        prop_oneof![Just("credit_card"), Just("echeck"), Just("paypal")],
        (
            proptest::option::of("[0-9]{4}"),
            proptest::option::of("(0[1-9]|1[0-2])"),
            proptest::option::of("20[0-9]{2}"),
            proptest::option::of("[a-z]{3,10}"),
        ),
        any::<bool>(),
        proptest::collection::vec(("[a-z_]{1,8}", arb_meta_value()), 0..4),
    )
        .prop_map(|(token_id, kind, display, default, meta)| {
            let (last_four, exp_month, exp_year, card_type) = display;
            let mut token = Token::new(TokenId::parse(token_id).unwrap(), kind.into());
            if let Some(last_four) = last_four {
                token.set_last_four(last_four);
            }
            if let Some(exp_month) = exp_month {
                token.set_exp_month(exp_month);
            }
            if let Some(exp_year) = exp_year {
                token.set_exp_year(exp_year);
            }
            if let Some(card_type) = card_type {
                token.set_card_type(card_type);
            }
            token.set_default(default);
            for (key, value) in meta {
                token.set_meta(key, value);
            }
            token
        })
}

proptest! {
    #[test]
    fn prop_update_then_get_round_trips(tokens in proptest::collection::vec(arb_token(), 0..6)) {
        let store = memory_store();
        let customer = CustomerId::from(1);
        let collection: TokenCollection = tokens.into_iter().collect();

        store.update_tokens(&customer, &collection, &Environment::Production).unwrap();
        prop_assert_eq!(store.get_tokens(&customer, &Environment::Production), collection);
    }
}
