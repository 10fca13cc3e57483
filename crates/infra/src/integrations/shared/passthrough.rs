//! Metadata passthrough
//!
//! Vendor fields without a canonical counterpart land in the entity's
//! metadata map. Canonical fields a vendor cannot store travel the other way,
//! tucked under one reserved key on the vendor record, so a round trip
//! through any vendor drops nothing.

use billsync_domain::Metadata;
use serde::de::DeserializeOwned;
use serde::Serialize;
use serde_json::{Map, Value};

/// Reserved vendor-record key holding canonical fields the vendor lacks
pub const PASSTHROUGH_KEY: &str = "_billsync";

/// Canonical fields parked on a vendor record
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Passthrough {
    fields: Map<String, Value>,
}

impl Passthrough {
    pub fn new() -> Self {
        Self::default()
    }

    /// Park a value. `None` and unserializable values are skipped.
    pub fn put<T: Serialize>(&mut self, name: &str, value: Option<&T>) {
        if let Some(value) = value.and_then(|v| serde_json::to_value(v).ok()) {
            if !value.is_null() {
                self.fields.insert(name.to_string(), value);
            }
        }
    }

    /// Take a parked value back out
    pub fn take<T: DeserializeOwned>(&mut self, name: &str) -> Option<T> {
        self.fields.remove(name).and_then(|v| serde_json::from_value(v).ok())
    }

    pub fn is_empty(&self) -> bool {
        self.fields.is_empty()
    }
}

/// Vendor-bound extra fields: entity metadata plus any parked fields.
/// Metadata keys that collide with a field the vendor models (`modeled`) are
/// dropped so the record never carries a key twice.
pub fn emit_extra(metadata: &Metadata, parked: Passthrough, modeled: &[&str]) -> Map<String, Value> {
    let mut extra: Map<String, Value> = metadata
        .iter()
        .filter(|(key, _)| key.as_str() != PASSTHROUGH_KEY && !modeled.contains(&key.as_str()))
        .map(|(key, value)| (key.clone(), value.clone()))
        .collect();
    if !parked.is_empty() {
        extra.insert(PASSTHROUGH_KEY.to_string(), Value::Object(parked.fields));
    }
    extra
}

/// Split vendor extras into entity metadata and parked canonical fields.
pub fn absorb_extra(mut extra: Map<String, Value>) -> (Metadata, Passthrough) {
    let parked = match extra.remove(PASSTHROUGH_KEY) {
        Some(Value::Object(fields)) => Passthrough { fields },
        _ => Passthrough::default(),
    };
    (extra.into_iter().collect(), parked)
}
