//! PracticePanther wire format and canonical mappings
//!
//! Clients are *accounts*; links use `*_ref` objects. Time entries carry no
//! modification timestamp, so conflict detection for this vendor falls back
//! to content hashes.

use billsync_common::lenient;
use billsync_domain::{
    Client, ClientStatus, Matter, MatterStatus, TimeEntry, TimeEntryStatus, User,
};
use chrono::{DateTime, NaiveDate, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use crate::integrations::shared::dates;
use crate::integrations::shared::{absorb_extra, emit_extra, IdRef, Passthrough};

/// `timeentries` record
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PantherTimeEntry {
    #[serde(default, skip_serializing_if = "Option::is_none", deserialize_with = "lenient::opt_id")]
    pub id: Option<String>,
    #[serde(with = "dates::iso_midnight")]
    pub date: NaiveDate,
    #[serde(
        serialize_with = "rust_decimal::serde::float::serialize",
        deserialize_with = "lenient::decimal"
    )]
    pub hours: Decimal,
    #[serde(default, deserialize_with = "lenient::string")]
    pub description: String,
    #[serde(
        default,
        skip_serializing_if = "Option::is_none",
        serialize_with = "rust_decimal::serde::float_option::serialize",
        deserialize_with = "lenient::opt_decimal"
    )]
    pub rate: Option<Decimal>,
    #[serde(default = "default_true", deserialize_with = "lenient::flag")]
    pub is_billable: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub account_ref: Option<IdRef>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub matter_ref: Option<IdRef>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub user_ref: Option<IdRef>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub billing_code: Option<String>,
    #[serde(default, deserialize_with = "lenient::string")]
    pub status: String,
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

const fn default_true() -> bool {
    true
}

const TIME_ENTRY_FIELDS: &[&str] = &[
    "id",
    "date",
    "hours",
    "description",
    "rate",
    "is_billable",
    "account_ref",
    "matter_ref",
    "user_ref",
    "billing_code",
    "status",
];

pub fn panther_entry_from_entry(entry: &TimeEntry) -> PantherTimeEntry {
    let mut parked = Passthrough::new();
    parked.put("task_code", entry.task_code.as_ref());
    parked.put("last_modified", entry.last_modified.as_ref());

    PantherTimeEntry {
        id: entry.id.clone(),
        date: entry.date,
        hours: entry.hours,
        description: entry.description.clone(),
        rate: entry.rate,
        is_billable: entry.billable,
        account_ref: IdRef::to(Some(entry.client_id.as_str())),
        matter_ref: IdRef::to(entry.matter_id.as_deref()),
        user_ref: IdRef::to(entry.user_id.as_deref()),
        billing_code: entry.activity_code.clone(),
        status: entry.status.to_string(),
        extra: emit_extra(&entry.metadata, parked, TIME_ENTRY_FIELDS),
    }
}

pub fn entry_from_panther(record: PantherTimeEntry) -> TimeEntry {
    let (metadata, mut parked) = absorb_extra(record.extra);
    TimeEntry {
        id: record.id,
        client_id: IdRef::id(record.account_ref.as_ref()).unwrap_or_default(),
        matter_id: IdRef::id(record.matter_ref.as_ref()),
        date: record.date,
        hours: record.hours,
        description: record.description,
        rate: record.rate,
        billable: record.is_billable,
        activity_code: record.billing_code.filter(|code| !code.trim().is_empty()),
        task_code: parked.take("task_code"),
        user_id: IdRef::id(record.user_ref.as_ref()),
        status: record.status.parse().unwrap_or_default(),
        metadata,
        last_modified: parked.take::<DateTime<Utc>>("last_modified"),
    }
}

/// `accounts` record
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PantherAccount {
    #[serde(default, skip_serializing_if = "Option::is_none", deserialize_with = "lenient::opt_id")]
    pub id: Option<String>,
    #[serde(default, deserialize_with = "lenient::string")]
    pub display_name: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub email: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub phone: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub address: Option<String>,
    #[serde(default = "default_true", deserialize_with = "lenient::flag")]
    pub is_active: bool,
    #[serde(
        default,
        skip_serializing_if = "Option::is_none",
        serialize_with = "rust_decimal::serde::float_option::serialize",
        deserialize_with = "lenient::opt_decimal"
    )]
    pub hourly_rate: Option<Decimal>,
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

const ACCOUNT_FIELDS: &[&str] =
    &["id", "display_name", "email", "phone", "address", "is_active", "hourly_rate"];

pub fn account_from_client(client: &Client) -> PantherAccount {
    PantherAccount {
        id: client.id.clone(),
        display_name: client.name.clone(),
        email: client.email.clone(),
        phone: client.phone.clone(),
        address: client.address.clone(),
        is_active: client.status == ClientStatus::Active,
        hourly_rate: client.default_rate,
        extra: emit_extra(&client.metadata, Passthrough::new(), ACCOUNT_FIELDS),
    }
}

pub fn client_from_account(account: PantherAccount) -> Client {
    let (metadata, _) = absorb_extra(account.extra);
    Client {
        id: account.id,
        name: account.display_name,
        email: account.email,
        phone: account.phone,
        address: account.address,
        status: if account.is_active { ClientStatus::Active } else { ClientStatus::Inactive },
        default_rate: account.hourly_rate,
        metadata,
    }
}

/// `matters` record
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PantherMatter {
    #[serde(default, skip_serializing_if = "Option::is_none", deserialize_with = "lenient::opt_id")]
    pub id: Option<String>,
    #[serde(default, deserialize_with = "lenient::string")]
    pub name: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub account_ref: Option<IdRef>,
    #[serde(default, deserialize_with = "lenient::string")]
    pub status: String,
    #[serde(with = "dates::iso_midnight")]
    pub open_date: NaiveDate,
    #[serde(
        default,
        skip_serializing_if = "Option::is_none",
        serialize_with = "serialize_opt_midnight",
        deserialize_with = "dates::opt_any_date"
    )]
    pub close_date: Option<NaiveDate>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub practice_area: Option<String>,
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

fn serialize_opt_midnight<S: serde::Serializer>(
    date: &Option<NaiveDate>,
    serializer: S,
) -> Result<S::Ok, S::Error> {
    match date {
        Some(date) => dates::iso_midnight::serialize(date, serializer),
        None => serializer.serialize_none(),
    }
}

const MATTER_FIELDS: &[&str] =
    &["id", "name", "account_ref", "status", "open_date", "close_date", "practice_area"];

pub fn panther_matter_from_matter(matter: &Matter) -> PantherMatter {
    let mut parked = Passthrough::new();
    parked.put("responsible_attorney", matter.responsible_attorney.as_ref());

    PantherMatter {
        id: matter.id.clone(),
        name: matter.name.clone(),
        account_ref: IdRef::to(Some(matter.client_id.as_str())),
        status: matter.status.to_string(),
        open_date: matter.open_date,
        close_date: matter.close_date,
        practice_area: matter.practice_area.clone(),
        extra: emit_extra(&matter.metadata, parked, MATTER_FIELDS),
    }
}

pub fn matter_from_panther(matter: PantherMatter) -> Matter {
    let (metadata, mut parked) = absorb_extra(matter.extra);
    Matter {
        id: matter.id,
        client_id: IdRef::id(matter.account_ref.as_ref()).unwrap_or_default(),
        name: matter.name,
        status: matter.status.parse::<MatterStatus>().unwrap_or_default(),
        open_date: matter.open_date,
        close_date: matter.close_date,
        practice_area: matter.practice_area,
        responsible_attorney: parked.take("responsible_attorney"),
        metadata,
    }
}

/// `users` record
#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct PantherUser {
    #[serde(deserialize_with = "lenient::id")]
    pub id: String,
    #[serde(default, deserialize_with = "lenient::string")]
    pub display_name: String,
    #[serde(default, deserialize_with = "lenient::string")]
    pub email: String,
    #[serde(default, deserialize_with = "lenient::string")]
    pub role: String,
    #[serde(default = "default_true", deserialize_with = "lenient::flag")]
    pub is_active: bool,
    #[serde(default, deserialize_with = "lenient::opt_decimal")]
    pub hourly_rate: Option<Decimal>,
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

pub fn user_from_panther(user: PantherUser) -> User {
    User {
        id: user.id,
        name: user.display_name,
        email: user.email,
        role: user.role,
        active: user.is_active,
        default_rate: user.hourly_rate,
        metadata: user.extra.into_iter().collect(),
    }
}
