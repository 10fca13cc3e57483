//! Vendor date formats
//!
//! Vendors disagree on how a calendar date travels: Clio sends `2024-07-01`,
//! PracticePanther a midnight date-time and Rocket Matter `07/01/2024`.
//! Parsing accepts all of them regardless of vendor.

use chrono::{DateTime, NaiveDate, NaiveDateTime, Utc};
use serde::{Deserialize, Deserializer, Serializer};
use serde_json::Value;

/// How a vendor writes calendar dates
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DateStyle {
    /// `2024-07-01`
    Iso,
    /// `2024-07-01T00:00:00`
    IsoMidnight,
    /// `07/01/2024`
    MonthDayYear,
}

impl DateStyle {
    pub fn format(self, date: NaiveDate) -> String {
        match self {
            Self::Iso => date.format("%Y-%m-%d").to_string(),
            Self::IsoMidnight => date.format("%Y-%m-%dT00:00:00").to_string(),
            Self::MonthDayYear => date.format("%m/%d/%Y").to_string(),
        }
    }
}

/// Parse a date in any vendor format, ignoring a time component.
pub fn parse_date(raw: &str) -> Option<NaiveDate> {
    let raw = raw.trim();
    if let Ok(date) = NaiveDate::parse_from_str(raw, "%Y-%m-%d") {
        return Some(date);
    }
    if let Ok(date) = NaiveDate::parse_from_str(raw, "%m/%d/%Y") {
        return Some(date);
    }
    if let Ok(at) = DateTime::parse_from_rfc3339(raw) {
        return Some(at.date_naive());
    }
    ["%Y-%m-%dT%H:%M:%S%.f", "%Y-%m-%dT%H:%M:%S", "%m/%d/%Y %H:%M:%S"]
        .into_iter()
        .find_map(|fmt| NaiveDateTime::parse_from_str(raw, fmt).ok())
        .map(|at| at.date())
}

/// Parse a server timestamp. Zone-less values are taken as UTC.
pub fn parse_timestamp(raw: &str) -> Option<DateTime<Utc>> {
    let raw = raw.trim();
    if let Ok(at) = DateTime::parse_from_rfc3339(raw) {
        return Some(at.with_timezone(&Utc));
    }
    ["%Y-%m-%dT%H:%M:%S%.f", "%Y-%m-%dT%H:%M:%S", "%m/%d/%Y %H:%M:%S"]
        .into_iter()
        .find_map(|fmt| NaiveDateTime::parse_from_str(raw, fmt).ok())
        .map(|at| at.and_utc())
}

fn date_from_value<E: serde::de::Error>(value: Value) -> Result<Option<NaiveDate>, E> {
    match value {
        Value::Null => Ok(None),
        Value::String(raw) if raw.trim().is_empty() => Ok(None),
        Value::String(raw) => parse_date(&raw)
            .map(Some)
            .ok_or_else(|| E::custom(format!("unrecognised date `{raw}`"))),
        other => Err(E::custom(format!("expected a date string, got {other}"))),
    }
}

/// Required date in any vendor format
pub fn any_date<'de, D>(deserializer: D) -> Result<NaiveDate, D::Error>
where
    D: Deserializer<'de>,
{
    let value = Value::deserialize(deserializer)?;
    date_from_value(value)?.ok_or_else(|| serde::de::Error::custom("missing date"))
}

/// Optional date in any vendor format
pub fn opt_any_date<'de, D>(deserializer: D) -> Result<Option<NaiveDate>, D::Error>
where
    D: Deserializer<'de>,
{
    date_from_value(Value::deserialize(deserializer)?)
}

/// Optional timestamp; unparsable values are dropped rather than failing the
/// whole record.
pub fn opt_timestamp<'de, D>(deserializer: D) -> Result<Option<DateTime<Utc>>, D::Error>
where
    D: Deserializer<'de>,
{
    let value = Option::<String>::deserialize(deserializer)?;
    Ok(value.as_deref().and_then(parse_timestamp))
}

/// Serde adapter for `MM/DD/YYYY` dates
pub mod month_day_year {
    use super::*;

    pub fn serialize<S: Serializer>(date: &NaiveDate, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(&DateStyle::MonthDayYear.format(*date))
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(deserializer: D) -> Result<NaiveDate, D::Error> {
        any_date(deserializer)
    }
}

/// Serde adapter for midnight date-times
pub mod iso_midnight {
    use super::*;

    pub fn serialize<S: Serializer>(date: &NaiveDate, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(&DateStyle::IsoMidnight.format(*date))
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(deserializer: D) -> Result<NaiveDate, D::Error> {
        any_date(deserializer)
    }
}
