//! Rocket Matter wire format and canonical mappings
//!
//! Flat snake_case records with `*_id` links, `MM/DD/YYYY` dates and list
//! responses wrapped in `{"items": [...], "total": n}`. The person who did the
//! work is the *timekeeper*.

use billsync_common::lenient;
use billsync_domain::{Client, Matter, TimeEntry, User};
use chrono::{DateTime, NaiveDate, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use crate::integrations::shared::dates;
use crate::integrations::shared::{absorb_extra, emit_extra, Passthrough};

const fn default_true() -> bool {
    true
}

fn opt_month_day_year<S: serde::Serializer>(
    date: &Option<NaiveDate>,
    serializer: S,
) -> Result<S::Ok, S::Error> {
    match date {
        Some(date) => dates::month_day_year::serialize(date, serializer),
        None => serializer.serialize_none(),
    }
}

/// `time_entries` record
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RocketTimeEntry {
    #[serde(default, skip_serializing_if = "Option::is_none", deserialize_with = "lenient::opt_id")]
    pub id: Option<String>,
    #[serde(default, deserialize_with = "lenient::id")]
    pub client_id: String,
    #[serde(default, skip_serializing_if = "Option::is_none", deserialize_with = "lenient::opt_id")]
    pub matter_id: Option<String>,
    #[serde(with = "dates::month_day_year")]
    pub date: NaiveDate,
    #[serde(
        serialize_with = "rust_decimal::serde::float::serialize",
        deserialize_with = "lenient::decimal"
    )]
    pub hours: Decimal,
    #[serde(default, deserialize_with = "lenient::string")]
    pub narrative: String,
    #[serde(
        default,
        skip_serializing_if = "Option::is_none",
        serialize_with = "rust_decimal::serde::float_option::serialize",
        deserialize_with = "lenient::opt_decimal"
    )]
    pub rate: Option<Decimal>,
    #[serde(default = "default_true", deserialize_with = "lenient::flag")]
    pub billable: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub activity_code: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub task_code: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none", deserialize_with = "lenient::opt_id")]
    pub timekeeper_id: Option<String>,
    #[serde(default, deserialize_with = "lenient::string")]
    pub status: String,
    #[serde(default, skip_serializing, deserialize_with = "dates::opt_timestamp")]
    pub last_modified: Option<DateTime<Utc>>,
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

const TIME_ENTRY_FIELDS: &[&str] = &[
    "id",
    "client_id",
    "matter_id",
    "date",
    "hours",
    "narrative",
    "rate",
    "billable",
    "activity_code",
    "task_code",
    "timekeeper_id",
    "status",
    "last_modified",
];

pub fn rocket_entry_from_entry(entry: &TimeEntry) -> RocketTimeEntry {
    RocketTimeEntry {
        id: entry.id.clone(),
        client_id: entry.client_id.clone(),
        matter_id: entry.matter_id.clone(),
        date: entry.date,
        hours: entry.hours,
        narrative: entry.description.clone(),
        rate: entry.rate,
        billable: entry.billable,
        activity_code: entry.activity_code.clone(),
        task_code: entry.task_code.clone(),
        timekeeper_id: entry.user_id.clone(),
        status: entry.status.to_string(),
        last_modified: entry.last_modified,
        extra: emit_extra(&entry.metadata, Passthrough::new(), TIME_ENTRY_FIELDS),
    }
}

pub fn entry_from_rocket(record: RocketTimeEntry) -> TimeEntry {
    let (metadata, _) = absorb_extra(record.extra);
    TimeEntry {
        id: record.id,
        client_id: record.client_id,
        matter_id: record.matter_id,
        date: record.date,
        hours: record.hours,
        description: record.narrative,
        rate: record.rate,
        billable: record.billable,
        activity_code: record.activity_code.filter(|code| !code.trim().is_empty()),
        task_code: record.task_code.filter(|code| !code.trim().is_empty()),
        user_id: record.timekeeper_id,
        status: record.status.parse().unwrap_or_default(),
        metadata,
        last_modified: record.last_modified,
    }
}

/// `clients` record
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RocketClient {
    #[serde(default, skip_serializing_if = "Option::is_none", deserialize_with = "lenient::opt_id")]
    pub id: Option<String>,
    #[serde(default, deserialize_with = "lenient::string")]
    pub name: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub email: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub phone: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub address: Option<String>,
    #[serde(default, deserialize_with = "lenient::string")]
    pub status: String,
    #[serde(
        default,
        skip_serializing_if = "Option::is_none",
        serialize_with = "rust_decimal::serde::float_option::serialize",
        deserialize_with = "lenient::opt_decimal"
    )]
    pub billing_rate: Option<Decimal>,
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

const CLIENT_FIELDS: &[&str] =
    &["id", "name", "email", "phone", "address", "status", "billing_rate"];

pub fn rocket_client_from_client(client: &Client) -> RocketClient {
    RocketClient {
        id: client.id.clone(),
        name: client.name.clone(),
        email: client.email.clone(),
        phone: client.phone.clone(),
        address: client.address.clone(),
        status: client.status.to_string(),
        billing_rate: client.default_rate,
        extra: emit_extra(&client.metadata, Passthrough::new(), CLIENT_FIELDS),
    }
}

pub fn client_from_rocket(client: RocketClient) -> Client {
    let (metadata, _) = absorb_extra(client.extra);
    Client {
        id: client.id,
        name: client.name,
        email: client.email,
        phone: client.phone,
        address: client.address,
        status: client.status.parse().unwrap_or_default(),
        default_rate: client.billing_rate,
        metadata,
    }
}

/// `matters` record
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RocketMatterRecord {
    #[serde(default, skip_serializing_if = "Option::is_none", deserialize_with = "lenient::opt_id")]
    pub id: Option<String>,
    #[serde(default, deserialize_with = "lenient::id")]
    pub client_id: String,
    #[serde(default, deserialize_with = "lenient::string")]
    pub name: String,
    #[serde(default, deserialize_with = "lenient::string")]
    pub status: String,
    #[serde(with = "dates::month_day_year")]
    pub open_date: NaiveDate,
    #[serde(
        default,
        skip_serializing_if = "Option::is_none",
        serialize_with = "opt_month_day_year",
        deserialize_with = "dates::opt_any_date"
    )]
    pub close_date: Option<NaiveDate>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub practice_area: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none", deserialize_with = "lenient::opt_id")]
    pub responsible_attorney_id: Option<String>,
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

const MATTER_FIELDS: &[&str] = &[
    "id",
    "client_id",
    "name",
    "status",
    "open_date",
    "close_date",
    "practice_area",
    "responsible_attorney_id",
];

pub fn rocket_matter_from_matter(matter: &Matter) -> RocketMatterRecord {
    RocketMatterRecord {
        id: matter.id.clone(),
        client_id: matter.client_id.clone(),
        name: matter.name.clone(),
        status: matter.status.to_string(),
        open_date: matter.open_date,
        close_date: matter.close_date,
        practice_area: matter.practice_area.clone(),
        responsible_attorney_id: matter.responsible_attorney.clone(),
        extra: emit_extra(&matter.metadata, Passthrough::new(), MATTER_FIELDS),
    }
}

pub fn matter_from_rocket(matter: RocketMatterRecord) -> Matter {
    let (metadata, _) = absorb_extra(matter.extra);
    Matter {
        id: matter.id,
        client_id: matter.client_id,
        name: matter.name,
        status: matter.status.parse().unwrap_or_default(),
        open_date: matter.open_date,
        close_date: matter.close_date,
        practice_area: matter.practice_area,
        responsible_attorney: matter.responsible_attorney_id,
        metadata,
    }
}

/// `users` record (timekeepers)
#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct RocketUser {
    #[serde(deserialize_with = "lenient::id")]
    pub id: String,
    #[serde(default, deserialize_with = "lenient::string")]
    pub name: String,
    #[serde(default, deserialize_with = "lenient::string")]
    pub email: String,
    #[serde(default, deserialize_with = "lenient::string")]
    pub role: String,
    #[serde(default = "default_true", deserialize_with = "lenient::flag")]
    pub active: bool,
    #[serde(default, deserialize_with = "lenient::opt_decimal")]
    pub billing_rate: Option<Decimal>,
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

pub fn user_from_rocket(user: RocketUser) -> User {
    User {
        id: user.id,
        name: user.name,
        email: user.email,
        role: user.role,
        active: user.active,
        default_rate: user.billing_rate,
        metadata: user.extra.into_iter().collect(),
    }
}
