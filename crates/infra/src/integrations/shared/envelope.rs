//! Response shape normalization
//!
//! The same vendor may answer with `{"data": [...]}`, `{"items": [...]}` or a
//! bare array depending on endpoint and API version. Payloads are unwrapped
//! here, once, before any entity mapping runs.

use billsync_domain::PlatformError;
use serde::de::DeserializeOwned;
use serde_json::Value;

const ENVELOPE_KEYS: [&str; 4] = ["data", "items", "results", "item"];

/// A page of raw records plus the vendor-reported total, when present
#[derive(Debug, Clone, PartialEq)]
pub struct RawPage {
    pub records: Vec<Value>,
    pub total: Option<u64>,
}

/// Unwrap a list response.
pub fn list_payload(body: Value) -> Result<RawPage, PlatformError> {
    match body {
        Value::Array(records) => Ok(RawPage { records, total: None }),
        Value::Object(mut map) => {
            let total = ["total", "count", "total_count"]
                .iter()
                .find_map(|key| map.get(*key).and_then(Value::as_u64))
                .or_else(|| map.get("meta").and_then(|m| m.pointer("/records")).and_then(Value::as_u64));

            let inner = ENVELOPE_KEYS.iter().find_map(|key| map.remove(*key));
            match inner {
                Some(Value::Array(records)) => Ok(RawPage { records, total }),
                Some(Value::Null) => Ok(RawPage { records: Vec::new(), total }),
                Some(other) => Err(PlatformError::unexpected(format!(
                    "expected a list inside the envelope, got {}",
                    kind_of(&other)
                ))),
                None => Err(PlatformError::unexpected("list response without records")),
            }
        }
        Value::Null => Ok(RawPage { records: Vec::new(), total: None }),
        other => Err(PlatformError::unexpected(format!(
            "expected a list response, got {}",
            kind_of(&other)
        ))),
    }
}

/// Unwrap a single-record response.
pub fn single_payload(body: Value) -> Result<Value, PlatformError> {
    match body {
        Value::Object(mut map) => {
            let wrapped = ENVELOPE_KEYS
                .iter()
                .find(|key| map.get(**key).is_some_and(Value::is_object))
                .copied();
            match wrapped {
                Some(key) if map.len() <= 2 => Ok(map.remove(key).unwrap_or(Value::Null)),
                _ => Ok(Value::Object(map)),
            }
        }
        Value::Array(mut records) if records.len() == 1 => Ok(records.remove(0)),
        other => Err(PlatformError::unexpected(format!(
            "expected a single record, got {}",
            kind_of(&other)
        ))),
    }
}

/// Deserialize one normalized record.
pub fn decode<T: DeserializeOwned>(record: Value, what: &str) -> Result<T, PlatformError> {
    serde_json::from_value(record)
        .map_err(|err| PlatformError::unexpected(format!("undecodable {what}: {err}")))
}

/// Deserialize every record of a page.
pub fn decode_all<T: DeserializeOwned>(records: Vec<Value>, what: &str) -> Result<Vec<T>, PlatformError> {
    records.into_iter().map(|record| decode(record, what)).collect()
}

fn kind_of(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "a boolean",
        Value::Number(_) => "a number",
        Value::String(_) => "a string",
        Value::Array(_) => "an array",
        Value::Object(_) => "an object",
    }
}

#[cfg(test)]
mod tests {
    use billsync_domain::PlatformErrorKind;
    use serde_json::json;

    use super::*;

    #[test]
    fn bare_arrays_pass_through() {
        let page = list_payload(json!([{ "id": 1 }, { "id": 2 }])).unwrap();
        assert_eq!(page.records.len(), 2);
        assert_eq!(page.total, None);
    }

    #[test]
    fn data_envelopes_report_meta_records() {
        let page = list_payload(json!({ "data": [{ "id": 1 }], "meta": { "records": 31 } })).unwrap();
        assert_eq!(page.records.len(), 1);
        assert_eq!(page.total, Some(31));
    }

    #[test]
    fn items_envelopes_report_total() {
        let page = list_payload(json!({ "items": [], "total": 0 })).unwrap();
        assert!(page.records.is_empty());
        assert_eq!(page.total, Some(0));
    }

    #[test]
    fn single_records_unwrap_either_shape() {
        assert_eq!(single_payload(json!({ "data": { "id": 7 } })).unwrap(), json!({ "id": 7 }));
        assert_eq!(single_payload(json!({ "id": 7, "note": "x" })).unwrap()["id"], 7);
        assert_eq!(single_payload(json!([{ "id": 7 }])).unwrap()["id"], 7);
    }

    #[test]
    fn records_with_a_data_field_are_not_unwrapped() {
        let record = json!({ "id": 7, "note": "x", "data": { "custom": true } });
        assert_eq!(single_payload(record.clone()).unwrap(), record);
    }

    #[test]
    fn scalars_are_unexpected() {
        let err = list_payload(json!("nope")).unwrap_err();
        assert_eq!(err.kind, PlatformErrorKind::Unexpected);
        assert!(single_payload(json!(42)).is_err());
    }
}
