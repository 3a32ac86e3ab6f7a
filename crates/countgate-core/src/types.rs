//! Shared types used across countgate crates.
//!
//! Every keyed operation goes through [`Key::parse`], and every caller-supplied
//! number goes through [`Amount::parse`] or [`parse_counter`]. These run
//! before any store access so a bad request never mutates anything.

use std::fmt;

use serde::Serialize;
use thiserror::Error;

/// Well-known key bumped on every qualifying API request.
pub const PAGE_HITS_KEY: &str = "count.api.page.hits";

/// Maximum key length, in characters.
pub const MAX_KEY_LEN: usize = 200;

/// Characters that may never appear in a key.
pub const FORBIDDEN_KEY_CHARS: [char; 7] = ['/', '\\', '\0', ' ', '\n', '\r', '\t'];

/// Inclusive bounds for a caller-supplied increment/decrement amount.
pub const MIN_AMOUNT: i64 = 1;
pub const MAX_AMOUNT: i64 = 100;

/// Client input errors. These never reach the store.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ValidationError {
    #[error("key must not be empty")]
    EmptyKey,

    #[error("key is too long ({len} characters, max {max})", max = MAX_KEY_LEN)]
    KeyTooLong { len: usize },

    #[error("key contains forbidden character {ch:?}")]
    ForbiddenChar { ch: char },

    /// The key path segment could not be decoded.
    #[error("malformed key: {0}")]
    MalformedKey(String),

    #[error("no {0} provided")]
    Missing(&'static str),

    #[error("{field} must be an integer (got {raw:?})")]
    NotAnInteger { field: &'static str, raw: String },

    #[error("amount must be between {min} and {max} (got {0})", min = MIN_AMOUNT, max = MAX_AMOUNT)]
    AmountOutOfRange(i64),
}

/// A validated store key.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize)]
#[serde(transparent)]
pub struct Key(String);

impl Key {
    pub fn parse(raw: &str) -> Result<Self, ValidationError> {
        if raw.is_empty() {
            return Err(ValidationError::EmptyKey);
        }
        let len = raw.chars().count();
        if len > MAX_KEY_LEN {
            return Err(ValidationError::KeyTooLong { len });
        }
        if let Some(ch) = raw.chars().find(|c| FORBIDDEN_KEY_CHARS.contains(c)) {
            return Err(ValidationError::ForbiddenChar { ch });
        }
        Ok(Self(raw.to_string()))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for Key {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl AsRef<str> for Key {
    fn as_ref(&self) -> &str {
        &self.0
    }
}

/// Increment/decrement delta, always within [`MIN_AMOUNT`, `MAX_AMOUNT`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Amount(i64);

impl Amount {
    /// Parse an optional caller-supplied amount. Absent means 1.
    pub fn parse(raw: Option<&str>) -> Result<Self, ValidationError> {
        let Some(raw) = raw else {
            return Ok(Self::default());
        };
        let amount = raw
            .trim()
            .parse::<i64>()
            .map_err(|_| ValidationError::NotAnInteger {
                field: "amount",
                raw: raw.to_string(),
            })?;
        if !(MIN_AMOUNT..=MAX_AMOUNT).contains(&amount) {
            return Err(ValidationError::AmountOutOfRange(amount));
        }
        Ok(Self(amount))
    }

    pub fn get(self) -> i64 {
        self.0
    }
}

impl Default for Amount {
    fn default() -> Self {
        Self(1)
    }
}

/// Parse the `value` parameter of a set request. Negative values are allowed.
pub fn parse_counter(raw: Option<&str>) -> Result<i64, ValidationError> {
    let raw = raw.ok_or(ValidationError::Missing("value"))?;
    raw.trim()
        .parse::<i64>()
        .map_err(|_| ValidationError::NotAnInteger {
            field: "value",
            raw: raw.to_string(),
        })
}

/// A value read back from the store.
///
/// Counters are stored as strings; anything that parses as an `i64` is
/// rendered as a JSON number and everything else is passed through verbatim.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(untagged)]
pub enum StoredValue {
    Integer(i64),
    Raw(String),
}

impl StoredValue {
    pub fn from_raw(raw: String) -> Self {
        match raw.parse::<i64>() {
            Ok(n) => StoredValue::Integer(n),
            Err(_) => StoredValue::Raw(raw),
        }
    }

    pub fn as_integer(&self) -> Option<i64> {
        match self {
            StoredValue::Integer(n) => Some(*n),
            StoredValue::Raw(_) => None,
        }
    }
}

impl From<i64> for StoredValue {
    fn from(n: i64) -> Self {
        StoredValue::Integer(n)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn key_accepts_ordinary_names() {
        assert_eq!(Key::parse("visits").unwrap().as_str(), "visits");
        assert!(Key::parse("count.api.page.hits").is_ok());
        assert!(Key::parse("émoji-✓").is_ok());
    }

    #[test]
    fn key_rejects_empty() {
        assert_eq!(Key::parse(""), Err(ValidationError::EmptyKey));
    }

    #[test]
    fn key_length_limit_is_inclusive() {
        assert!(Key::parse(&"a".repeat(MAX_KEY_LEN)).is_ok());
        assert_eq!(
            Key::parse(&"a".repeat(MAX_KEY_LEN + 1)),
            Err(ValidationError::KeyTooLong { len: MAX_KEY_LEN + 1 })
        );
    }

    #[test]
    fn key_length_counts_characters() {
        // 200 two-byte characters is still a valid key.
        assert!(Key::parse(&"é".repeat(MAX_KEY_LEN)).is_ok());
    }

    #[test]
    fn key_rejects_every_forbidden_char() {
        for ch in FORBIDDEN_KEY_CHARS {
            let raw = format!("a{ch}b");
            assert_eq!(
                Key::parse(&raw),
                Err(ValidationError::ForbiddenChar { ch }),
                "{raw:?} should be rejected"
            );
        }
    }

    #[test]
    fn amount_defaults_to_one() {
        assert_eq!(Amount::parse(None).unwrap().get(), 1);
    }

    #[test]
    fn amount_bounds() {
        assert_eq!(Amount::parse(Some("1")).unwrap().get(), 1);
        assert_eq!(Amount::parse(Some("100")).unwrap().get(), 100);
        assert_eq!(
            Amount::parse(Some("0")),
            Err(ValidationError::AmountOutOfRange(0))
        );
        assert_eq!(
            Amount::parse(Some("101")),
            Err(ValidationError::AmountOutOfRange(101))
        );
        assert_eq!(
            Amount::parse(Some("-5")),
            Err(ValidationError::AmountOutOfRange(-5))
        );
    }

    #[test]
    fn amount_rejects_non_integers() {
        for raw in ["", "abc", "1.5", "ten"] {
            assert!(
                matches!(
                    Amount::parse(Some(raw)),
                    Err(ValidationError::NotAnInteger { field: "amount", .. })
                ),
                "{raw:?} should be rejected"
            );
        }
    }

    #[test]
    fn counter_parses_negative_values() {
        assert_eq!(parse_counter(Some("-42")), Ok(-42));
        assert_eq!(parse_counter(Some("7")), Ok(7));
    }

    #[test]
    fn counter_requires_a_value() {
        assert_eq!(parse_counter(None), Err(ValidationError::Missing("value")));
        assert!(matches!(
            parse_counter(Some("4x")),
            Err(ValidationError::NotAnInteger { field: "value", .. })
        ));
    }

    #[test]
    fn stored_value_renders_integers_as_numbers() {
        let v = StoredValue::from_raw("42".to_string());
        assert_eq!(v, StoredValue::Integer(42));
        assert_eq!(serde_json::to_value(&v).unwrap(), serde_json::json!(42));
    }

    #[test]
    fn stored_value_passes_through_raw_strings() {
        let v = StoredValue::from_raw("abc".to_string());
        assert_eq!(v, StoredValue::Raw("abc".to_string()));
        assert_eq!(serde_json::to_value(&v).unwrap(), serde_json::json!("abc"));
        assert_eq!(v.as_integer(), None);
    }
}
