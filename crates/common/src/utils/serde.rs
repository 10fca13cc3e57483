//! Serialization utilities for common data types
//!
//! This module provides reusable serde helpers shared by configuration types
//! and vendor wire formats.

use std::time::Duration;

use serde::{Deserialize, Deserializer, Serializer};

/// Custom serialization module for Duration as whole seconds
pub mod duration_secs {
    use super::*;

    /// Serde serialization result type
    type SerializeResult<S> = Result<<S as Serializer>::Ok, <S as Serializer>::Error>;

    /// Serialize a Duration as seconds (u64)
    pub fn serialize<S>(duration: &Duration, serializer: S) -> SerializeResult<S>
    where
        S: Serializer,
    {
        serializer.serialize_u64(duration.as_secs())
    }

    /// Deserialize seconds (u64) into a Duration
    pub fn deserialize<'de, D>(deserializer: D) -> Result<Duration, D::Error>
    where
        D: Deserializer<'de>,
    {
        let secs = u64::deserialize(deserializer)?;
        Ok(Duration::from_secs(secs))
    }
}

/// Defensive deserializers for vendor payloads.
///
/// Practice-management APIs are inconsistent about numeric and boolean
/// encoding: the same field may arrive as `0.3`, `"0.3"`, `"0.30 "` or
/// `null` depending on vendor and endpoint. These helpers accept any of them.
/// Unparsable numerics become zero instead of failing the whole payload.
pub mod lenient {
    use std::str::FromStr;

    use rust_decimal::Decimal;
    use serde_json::Value;

    use super::*;

    fn parse_decimal(raw: &str) -> Option<Decimal> {
        let trimmed = raw.trim();
        if trimmed.is_empty() {
            return None;
        }
        Decimal::from_str(trimmed).or_else(|_| Decimal::from_scientific(trimmed)).ok()
    }

    fn decimal_from_value(value: &Value) -> Option<Decimal> {
        match value {
            Value::Number(number) => Some(parse_decimal(&number.to_string()).unwrap_or_default()),
            Value::String(raw) if raw.trim().is_empty() => None,
            Value::String(raw) => Some(parse_decimal(raw).unwrap_or_default()),
            Value::Bool(_) | Value::Array(_) | Value::Object(_) => Some(Decimal::ZERO),
            Value::Null => None,
        }
    }

    /// Number or numeric string; anything else becomes zero.
    pub fn decimal<'de, D>(deserializer: D) -> Result<Decimal, D::Error>
    where
        D: Deserializer<'de>,
    {
        let value = Value::deserialize(deserializer)?;
        Ok(decimal_from_value(&value).unwrap_or_default())
    }

    /// Like [`decimal`], but `null` and blank strings become `None`.
    pub fn opt_decimal<'de, D>(deserializer: D) -> Result<Option<Decimal>, D::Error>
    where
        D: Deserializer<'de>,
    {
        let value = Value::deserialize(deserializer)?;
        Ok(decimal_from_value(&value))
    }

    /// Booleans encoded as `true`, `"true"`, `"1"`, `"yes"` or non-zero
    /// numbers.
    pub fn flag<'de, D>(deserializer: D) -> Result<bool, D::Error>
    where
        D: Deserializer<'de>,
    {
        let value = Value::deserialize(deserializer)?;
        Ok(match value {
            Value::Bool(flag) => flag,
            Value::Number(number) => number.as_f64().is_some_and(|n| n != 0.0),
            Value::String(raw) => {
                matches!(raw.trim().to_ascii_lowercase().as_str(), "true" | "1" | "yes" | "y")
            }
            _ => false,
        })
    }

    /// Identifiers that some vendors emit as integers and others as strings.
    pub fn opt_id<'de, D>(deserializer: D) -> Result<Option<String>, D::Error>
    where
        D: Deserializer<'de>,
    {
        let value = Value::deserialize(deserializer)?;
        Ok(match value {
            Value::String(raw) if raw.trim().is_empty() => None,
            Value::String(raw) => Some(raw),
            Value::Number(number) => Some(number.to_string()),
            _ => None,
        })
    }

    /// Identifier that must be present; missing or null becomes empty.
    pub fn id<'de, D>(deserializer: D) -> Result<String, D::Error>
    where
        D: Deserializer<'de>,
    {
        Ok(opt_id(deserializer)?.unwrap_or_default())
    }

    /// Strings where vendors send `null` instead of omitting the field.
    pub fn string<'de, D>(deserializer: D) -> Result<String, D::Error>
    where
        D: Deserializer<'de>,
    {
        let value = Option::<String>::deserialize(deserializer)?;
        Ok(value.unwrap_or_default())
    }
}
