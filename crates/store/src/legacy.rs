//! Legacy token format decoding.
//!
//! Older installs persisted tokens as a mapping from token id to a flat
//! record:
//!
//! ```text
//! { "12345": { "type": "credit_card", "last_four": "1111",
//!              "exp_month": "01", "exp_year": "20", "card_type": "visa" } }
//! ```
//!
//! Any key outside the known set is folded into token metadata so nothing
//! is dropped on migration.

use paytokens_common::TokenId;
use serde_json::{Map, Value};

use crate::errors::{TokenStoreError, TokenStoreResult};
use crate::token::{MetaValue, Token, TokenType};

const FIELD_TYPE: &str = "type";
const FIELD_LAST_FOUR: &str = "last_four";
const FIELD_EXP_MONTH: &str = "exp_month";
const FIELD_EXP_YEAR: &str = "exp_year";
const FIELD_CARD_TYPE: &str = "card_type";
const FIELD_DEFAULT: &str = "default";

/// Decode one legacy record into a [`Token`].
///
/// Fails with [`TokenStoreError::MalformedLegacyRecord`] when the record is
/// not a mapping (e.g. a scalar placeholder).
pub fn decode(id: &str, record: &Value) -> TokenStoreResult<Token> {
    let malformed = |reason: String| TokenStoreError::MalformedLegacyRecord {
        id: id.to_string(),
        reason,
    };

    let fields = record
        .as_object()
        .ok_or_else(|| malformed(format!("expected a mapping, found {}", kind_of(record))))?;
    let token_id = TokenId::parse(id).map_err(|e| malformed(e.to_string()))?;

    // Records without a type predate eChecks and were always cards.
    let token_type = match fields.get(FIELD_TYPE) {
        Some(Value::String(kind)) if !kind.is_empty() => TokenType::from(kind.as_str()),
        _ => TokenType::CreditCard,
    };

    let mut token = Token::new(token_id, token_type);

    // A known field whose value cannot be mapped is kept in metadata under
    // its own key, so the raw value survives migration.
    for (key, value) in fields {
        match key.as_str() {
            FIELD_TYPE => {
                if !matches!(value, Value::String(kind) if !kind.is_empty()) {
                    token.set_meta(key.clone(), to_meta(value));
                }
            }
            FIELD_LAST_FOUR | FIELD_EXP_MONTH | FIELD_EXP_YEAR | FIELD_CARD_TYPE => {
                match scalar_text(value) {
                    Some(text) => set_display(&mut token, key, text),
                    None => token.set_meta(key.clone(), to_meta(value)),
                }
            }
            FIELD_DEFAULT => match parse_flag(value) {
                Some(flag) => token.set_default(flag),
                None => token.set_meta(key.clone(), to_meta(value)),
            },
            _ => token.set_meta(key.clone(), to_meta(value)),
        }
    }

    Ok(token)
}

/// Encode a token back into the flat legacy record shape.
///
/// Metadata is flattened next to the known fields, mirroring [`decode`]. A
/// metadata entry never overrides the token's own type or a display field
/// the token has set. Fails if a metadata float is not finite.
pub fn encode(token: &Token) -> serde_json::Result<Value> {
    let mut fields = Map::new();
    fields.insert(FIELD_TYPE.into(), Value::from(token.token_type().as_str()));

    let display = [
        (FIELD_LAST_FOUR, token.last_four()),
        (FIELD_EXP_MONTH, token.exp_month()),
        (FIELD_EXP_YEAR, token.exp_year()),
        (FIELD_CARD_TYPE, token.card_type()),
    ];
    for (key, value) in display {
        if let Some(value) = value {
            fields.insert(key.into(), Value::from(value));
        }
    }
    if token.is_default() {
        fields.insert(FIELD_DEFAULT.into(), Value::Bool(true));
    }

    for (key, value) in token.metadata() {
        if fields.contains_key(key) {
            continue;
        }
        fields.insert(key.clone(), value.to_json()?);
    }

    Ok(Value::Object(fields))
}

fn set_display(token: &mut Token, field: &str, text: String) {
    match field {
        FIELD_LAST_FOUR => token.set_last_four(text),
        FIELD_EXP_MONTH => token.set_exp_month(text),
        FIELD_EXP_YEAR => token.set_exp_year(text),
        _ => token.set_card_type(text),
    }
}

/// Strings pass through; numbers are stringified (`"01"` and `1` both
/// appear in old data).
fn scalar_text(value: &Value) -> Option<String> {
    match value {
        Value::String(s) if !s.is_empty() => Some(s.clone()),
        Value::Number(n) => Some(n.to_string()),
        _ => None,
    }
}

fn parse_flag(value: &Value) -> Option<bool> {
    match value {
        Value::Bool(b) => Some(*b),
        Value::Number(n) => n.as_i64().map(|n| n != 0),
        Value::String(s) => match s.as_str() {
            "1" | "yes" | "true" => Some(true),
            "" | "0" | "no" | "false" => Some(false),
            _ => None,
        },
        _ => None,
    }
}

fn to_meta(value: &Value) -> MetaValue {
    match value {
        Value::Bool(b) => MetaValue::Bool(*b),
        Value::Number(n) => {
            if let Some(i) = n.as_i64() {
                MetaValue::Integer(i)
            } else if let Some(u) = n.as_u64() {
                MetaValue::Unsigned(u)
            } else {
                MetaValue::Float(n.as_f64().unwrap_or_default())
            }
        }
        Value::String(s) => MetaValue::String(s.clone()),
        // Null, arrays and nested maps keep their JSON text.
        other => MetaValue::String(other.to_string()),
    }
}

pub(crate) fn kind_of(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "a boolean",
        Value::Number(_) => "a number",
        Value::String(_) => "a string",
        Value::Array(_) => "an array",
        Value::Object(_) => "a mapping",
    }
}
