//! Payment token value object and ordered token collections.
//!
//! A [`Token`] is one stored payment instrument. Its identifier is fixed at
//! construction; display fields and metadata may be edited freely.

use indexmap::IndexMap;
use paytokens_common::TokenId;
use serde::ser::Error as _;
use serde::{Deserialize, Serialize, Serializer};
use std::fmt;

/// Instrument kind.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(from = "String", into = "String")]
pub enum TokenType {
    CreditCard,
    /// Bank account (eCheck).
    ECheck,
    /// Any other processor-specific kind, preserved verbatim.
    Other(String),
}

impl TokenType {
    pub fn as_str(&self) -> &str {
        match self {
            Self::CreditCard => "credit_card",
            Self::ECheck => "echeck",
            Self::Other(kind) => kind,
        }
    }
}

impl From<&str> for TokenType {
    fn from(s: &str) -> Self {
        match s {
            "credit_card" => Self::CreditCard,
            "echeck" => Self::ECheck,
            other => Self::Other(other.to_string()),
        }
    }
}

impl From<String> for TokenType {
    fn from(s: String) -> Self {
        match s.as_str() {
            "credit_card" => Self::CreditCard,
            "echeck" => Self::ECheck,
            _ => Self::Other(s),
        }
    }
}

impl From<TokenType> for String {
    fn from(kind: TokenType) -> Self {
        match kind {
            TokenType::Other(kind) => kind,
            known => known.as_str().to_string(),
        }
    }
}

impl fmt::Display for TokenType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Scalar value stored in token metadata.
///
/// Integers above `i64::MAX` keep their exact value as `Unsigned`. Floats
/// must be finite: serializing NaN or an infinity is an error, since JSON
/// has no representation for them.
#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(untagged)]
pub enum MetaValue {
    Bool(bool),
    Integer(i64),
    Unsigned(u64),
    Float(f64),
    String(String),
}

impl MetaValue {
    /// Raw JSON form of this value.
    pub fn to_json(&self) -> serde_json::Result<serde_json::Value> {
        serde_json::to_value(self)
    }
}

impl Serialize for MetaValue {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        match self {
            Self::Bool(b) => serializer.serialize_bool(*b),
            Self::Integer(n) => serializer.serialize_i64(*n),
            Self::Unsigned(n) => serializer.serialize_u64(*n),
            Self::Float(f) if f.is_finite() => serializer.serialize_f64(*f),
            Self::Float(f) => Err(S::Error::custom(format!(
                "metadata float {} is not finite",
                f
            ))),
            Self::String(s) => serializer.serialize_str(s),
        }
    }
}

impl From<&str> for MetaValue {
    fn from(s: &str) -> Self {
        Self::String(s.to_string())
    }
}

impl From<String> for MetaValue {
    fn from(s: String) -> Self {
        Self::String(s)
    }
}

impl From<i64> for MetaValue {
    fn from(n: i64) -> Self {
        Self::Integer(n)
    }
}

impl From<u64> for MetaValue {
    fn from(n: u64) -> Self {
        match i64::try_from(n) {
            Ok(n) => Self::Integer(n),
            Err(_) => Self::Unsigned(n),
        }
    }
}

impl From<f64> for MetaValue {
    fn from(f: f64) -> Self {
        Self::Float(f)
    }
}

impl From<bool> for MetaValue {
    fn from(b: bool) -> Self {
        Self::Bool(b)
    }
}

/// A stored payment instrument.
#[derive(Debug, Clone, PartialEq)]
pub struct Token {
    id: TokenId,
    token_type: TokenType,
    last_four: Option<String>,
    exp_month: Option<String>,
    exp_year: Option<String>,
    card_type: Option<String>,
    default: bool,
    metadata: IndexMap<String, MetaValue>,
}

impl Token {
    /// Create a token with no display fields or metadata.
    pub fn new(id: TokenId, token_type: TokenType) -> Self {
        Self {
            id,
            token_type,
            last_four: None,
            exp_month: None,
            exp_year: None,
            card_type: None,
            default: false,
            metadata: IndexMap::new(),
        }
    }

    /// Create a credit card token with the usual display fields.
    pub fn credit_card(
        id: TokenId,
        card_type: impl Into<String>,
        last_four: impl Into<String>,
        exp_month: impl Into<String>,
        exp_year: impl Into<String>,
    ) -> Self {
        let mut token = Self::new(id, TokenType::CreditCard);
        token.card_type = Some(card_type.into());
        token.last_four = Some(last_four.into());
        token.exp_month = Some(exp_month.into());
        token.exp_year = Some(exp_year.into());
        token
    }

    pub fn id(&self) -> &TokenId {
        &self.id
    }

    pub fn token_type(&self) -> &TokenType {
        &self.token_type
    }

    pub fn set_token_type(&mut self, token_type: TokenType) {
        self.token_type = token_type;
    }

    pub fn is_credit_card(&self) -> bool {
        self.token_type == TokenType::CreditCard
    }

    pub fn is_echeck(&self) -> bool {
        self.token_type == TokenType::ECheck
    }

    pub fn last_four(&self) -> Option<&str> {
        self.last_four.as_deref()
    }

    pub fn set_last_four(&mut self, last_four: impl Into<String>) {
        self.last_four = Some(last_four.into());
    }

    pub fn exp_month(&self) -> Option<&str> {
        self.exp_month.as_deref()
    }

    pub fn set_exp_month(&mut self, month: impl Into<String>) {
        self.exp_month = Some(month.into());
    }

    pub fn exp_year(&self) -> Option<&str> {
        self.exp_year.as_deref()
    }

    pub fn set_exp_year(&mut self, year: impl Into<String>) {
        self.exp_year = Some(year.into());
    }

    /// Expiration date as `MM/YY`, if both parts are known.
    pub fn exp_date(&self) -> Option<String> {
        let month = self.exp_month.as_deref()?;
        let year = self.exp_year.as_deref()?;
        let year = year.get(year.len().saturating_sub(2)..).unwrap_or(year);
        Some(format!("{:0>2}/{:0>2}", month, year))
    }

    /// Card brand (visa, mastercard, ...).
    pub fn card_type(&self) -> Option<&str> {
        self.card_type.as_deref()
    }

    pub fn set_card_type(&mut self, card_type: impl Into<String>) {
        self.card_type = Some(card_type.into());
    }

    pub fn is_default(&self) -> bool {
        self.default
    }

    pub fn set_default(&mut self, default: bool) {
        self.default = default;
    }

    pub fn metadata(&self) -> &IndexMap<String, MetaValue> {
        &self.metadata
    }

    pub fn meta(&self, key: &str) -> Option<&MetaValue> {
        self.metadata.get(key)
    }

    pub fn set_meta(&mut self, key: impl Into<String>, value: impl Into<MetaValue>) {
        self.metadata.insert(key.into(), value.into());
    }

    pub fn remove_meta(&mut self, key: &str) -> Option<MetaValue> {
        self.metadata.shift_remove(key)
    }

    pub(crate) fn into_record(self) -> (TokenId, TokenRecord) {
        let record = TokenRecord {
            token_type: self.token_type,
            display: DisplayFields {
                last_four: self.last_four,
                exp_month: self.exp_month,
                exp_year: self.exp_year,
                card_type: self.card_type,
            },
            default: self.default,
            metadata: self.metadata,
        };
        (self.id, record)
    }

    pub(crate) fn from_record(id: TokenId, record: TokenRecord) -> Self {
        Self {
            id,
            token_type: record.token_type,
            last_four: record.display.last_four,
            exp_month: record.display.exp_month,
            exp_year: record.display.exp_year,
            card_type: record.display.card_type,
            default: record.default,
            metadata: record.metadata,
        }
    }
}

/// Current-format persisted record, keyed externally by token id.
///
/// Unknown fields are rejected so a flat legacy record never parses as a
/// current one.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub(crate) struct TokenRecord {
    #[serde(rename = "type")]
    token_type: TokenType,
    display: DisplayFields,
    #[serde(default, skip_serializing_if = "is_false")]
    default: bool,
    #[serde(default, skip_serializing_if = "IndexMap::is_empty")]
    metadata: IndexMap<String, MetaValue>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
struct DisplayFields {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    last_four: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    exp_month: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    exp_year: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    card_type: Option<String>,
}

fn is_false(b: &bool) -> bool {
    !*b
}

/// Ordered, id-unique sequence of tokens.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct TokenCollection {
    tokens: Vec<Token>,
}

impl TokenCollection {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.tokens.len()
    }

    pub fn is_empty(&self) -> bool {
        self.tokens.is_empty()
    }

    pub fn iter(&self) -> std::slice::Iter<'_, Token> {
        self.tokens.iter()
    }

    pub fn get(&self, id: &TokenId) -> Option<&Token> {
        self.tokens.iter().find(|t| t.id() == id)
    }

    pub fn contains(&self, id: &TokenId) -> bool {
        self.get(id).is_some()
    }

    /// Insert a token, replacing in place any token with the same id.
    ///
    /// Returns the replaced token, if any.
    pub fn upsert(&mut self, token: Token) -> Option<Token> {
        match self.tokens.iter_mut().find(|t| t.id() == token.id()) {
            Some(existing) => Some(std::mem::replace(existing, token)),
            None => {
                self.tokens.push(token);
                None
            }
        }
    }

    pub fn remove(&mut self, id: &TokenId) -> Option<Token> {
        let index = self.tokens.iter().position(|t| t.id() == id)?;
        Some(self.tokens.remove(index))
    }

    /// Mark one token as the default and clear the flag on every other.
    ///
    /// Returns `false` (leaving the collection untouched) when `id` is absent.
    pub fn set_default(&mut self, id: &TokenId) -> bool {
        if !self.contains(id) {
            return false;
        }
        for token in &mut self.tokens {
            token.default = token.id() == id;
        }
        true
    }

    /// The token flagged as default, if any.
    pub fn default_token(&self) -> Option<&Token> {
        self.tokens.iter().find(|t| t.default)
    }

    /// Serialize into the current-format raw shape (`id -> record`).
    pub(crate) fn to_value(&self) -> serde_json::Result<serde_json::Value> {
        let records: IndexMap<TokenId, TokenRecord> = self
            .tokens
            .iter()
            .cloned()
            .map(Token::into_record)
            .collect();
        serde_json::to_value(records)
    }

    /// Parse the current-format raw shape.
    pub(crate) fn from_value(value: serde_json::Value) -> serde_json::Result<Self> {
        let records: IndexMap<TokenId, TokenRecord> = serde_json::from_value(value)?;
        Ok(records
            .into_iter()
            .map(|(id, record)| Token::from_record(id, record))
            .collect())
    }
}

impl TokenCollection {
    /// Recover the records of a current-format mapping that parse one by one.
    ///
    /// Returns the recovered tokens and the number of records left behind.
    pub(crate) fn recover(records: &serde_json::Map<String, serde_json::Value>) -> (Self, usize) {
        let mut unreadable = 0;
        let tokens = records
            .iter()
            .filter_map(|(id, record)| {
                let parsed = TokenId::parse(id)
                    .ok()
                    .zip(serde_json::from_value::<TokenRecord>(record.clone()).ok());
                if parsed.is_none() {
                    unreadable += 1;
                }
                parsed.map(|(id, record)| Token::from_record(id, record))
            })
            .collect();
        (tokens, unreadable)
    }
}

impl FromIterator<Token> for TokenCollection {
    /// A repeated id keeps the last token at the position of the first.
    fn from_iter<I: IntoIterator<Item = Token>>(iter: I) -> Self {
        let mut collection = Self::new();
        for token in iter {
            collection.upsert(token);
        }
        collection
    }
}

impl IntoIterator for TokenCollection {
    type Item = Token;
    type IntoIter = std::vec::IntoIter<Token>;

    fn into_iter(self) -> Self::IntoIter {
        self.tokens.into_iter()
    }
}

impl<'a> IntoIterator for &'a TokenCollection {
    type Item = &'a Token;
    type IntoIter = std::slice::Iter<'a, Token>;

    fn into_iter(self) -> Self::IntoIter {
        self.tokens.iter()
    }
}
