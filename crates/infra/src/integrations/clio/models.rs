//! Clio wire format and canonical mappings
//!
//! Clio calls time entries *activities* and clients *contacts*. Records link
//! to each other through nested `{"id": ...}` objects. Activities only know
//! whether they were billed; the finer canonical status is parked in the
//! passthrough block.

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

const TIME_ENTRY_KIND: &str = "TimeEntry";

fn time_entry_kind() -> String {
    TIME_ENTRY_KIND.to_string()
}

/// `activities` record
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ClioActivity {
    #[serde(default, skip_serializing_if = "Option::is_none", deserialize_with = "lenient::opt_id")]
    pub id: Option<String>,
    #[serde(rename = "type", default = "time_entry_kind")]
    pub kind: String,
    #[serde(deserialize_with = "dates::any_date")]
    pub date: NaiveDate,
    #[serde(
        serialize_with = "rust_decimal::serde::float::serialize",
        deserialize_with = "lenient::decimal"
    )]
    pub quantity_in_hours: Decimal,
    #[serde(
        default,
        skip_serializing_if = "Option::is_none",
        serialize_with = "rust_decimal::serde::float_option::serialize",
        deserialize_with = "lenient::opt_decimal"
    )]
    pub price: Option<Decimal>,
    #[serde(default, deserialize_with = "lenient::string")]
    pub note: String,
    #[serde(default, deserialize_with = "lenient::flag")]
    pub non_billable: bool,
    #[serde(default, deserialize_with = "lenient::flag")]
    pub billed: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub client: Option<IdRef>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub matter: Option<IdRef>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub user: Option<IdRef>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub activity_description: Option<IdRef>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub utbms_task: Option<IdRef>,
    /// Server-assigned; never written
    #[serde(default, skip_serializing, deserialize_with = "dates::opt_timestamp")]
    pub updated_at: Option<DateTime<Utc>>,
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

const ACTIVITY_FIELDS: &[&str] = &[
    "id",
    "type",
    "date",
    "quantity_in_hours",
    "price",
    "note",
    "non_billable",
    "billed",
    "client",
    "matter",
    "user",
    "activity_description",
    "utbms_task",
    "updated_at",
];

pub fn activity_from_entry(entry: &TimeEntry) -> ClioActivity {
    let mut parked = Passthrough::new();
    parked.put("status", Some(&entry.status));

    ClioActivity {
        id: entry.id.clone(),
        kind: time_entry_kind(),
        date: entry.date,
        quantity_in_hours: entry.hours,
        price: entry.rate,
        note: entry.description.clone(),
        non_billable: !entry.billable,
        billed: entry.status == TimeEntryStatus::Billed,
        client: IdRef::to(Some(entry.client_id.as_str())),
        matter: IdRef::to(entry.matter_id.as_deref()),
        user: IdRef::to(entry.user_id.as_deref()),
        activity_description: IdRef::to(entry.activity_code.as_deref()),
        utbms_task: IdRef::to(entry.task_code.as_deref()),
        updated_at: entry.last_modified,
        extra: emit_extra(&entry.metadata, parked, ACTIVITY_FIELDS),
    }
}

pub fn entry_from_activity(activity: ClioActivity) -> TimeEntry {
    let (metadata, mut parked) = absorb_extra(activity.extra);
    let parked_status = parked.take::<TimeEntryStatus>("status").unwrap_or_default();
    let status = if activity.billed { TimeEntryStatus::Billed } else { parked_status };

    TimeEntry {
        id: activity.id,
        client_id: IdRef::id(activity.client.as_ref()).unwrap_or_default(),
        matter_id: IdRef::id(activity.matter.as_ref()),
        date: activity.date,
        hours: activity.quantity_in_hours,
        description: activity.note,
        rate: activity.price,
        billable: !activity.non_billable,
        activity_code: IdRef::id(activity.activity_description.as_ref()),
        task_code: IdRef::id(activity.utbms_task.as_ref()),
        user_id: IdRef::id(activity.user.as_ref()),
        status,
        metadata,
        last_modified: activity.updated_at,
    }
}

/// `contacts` record. Clio has no contact status or default rate; both are
/// parked.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ClioContact {
    #[serde(default, skip_serializing_if = "Option::is_none", deserialize_with = "lenient::opt_id")]
    pub id: Option<String>,
    #[serde(default, deserialize_with = "lenient::string")]
    pub name: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub primary_email_address: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub primary_phone_number: Option<String>,
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

const CONTACT_FIELDS: &[&str] = &["id", "name", "primary_email_address", "primary_phone_number"];

pub fn contact_from_client(client: &Client) -> ClioContact {
    let mut parked = Passthrough::new();
    parked.put("address", client.address.as_ref());
    if client.status != ClientStatus::Active {
        parked.put("status", Some(&client.status));
    }
    parked.put("default_rate", client.default_rate.as_ref());

    ClioContact {
        id: client.id.clone(),
        name: client.name.clone(),
        primary_email_address: client.email.clone(),
        primary_phone_number: client.phone.clone(),
        extra: emit_extra(&client.metadata, parked, CONTACT_FIELDS),
    }
}

pub fn client_from_contact(contact: ClioContact) -> Client {
    let (metadata, mut parked) = absorb_extra(contact.extra);
    Client {
        id: contact.id,
        name: contact.name,
        email: contact.primary_email_address,
        phone: contact.primary_phone_number,
        address: parked.take("address"),
        status: parked.take("status").unwrap_or_default(),
        default_rate: parked.take("default_rate"),
        metadata,
    }
}

/// `matters` record. Clio matters are `Open`, `Pending` or `Closed`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ClioMatter {
    #[serde(default, skip_serializing_if = "Option::is_none", deserialize_with = "lenient::opt_id")]
    pub id: Option<String>,
    #[serde(default, deserialize_with = "lenient::string")]
    pub description: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub client: Option<IdRef>,
    #[serde(default, deserialize_with = "lenient::string")]
    pub status: String,
    #[serde(deserialize_with = "dates::any_date")]
    pub open_date: NaiveDate,
    #[serde(default, skip_serializing_if = "Option::is_none", deserialize_with = "dates::opt_any_date")]
    pub close_date: Option<NaiveDate>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub responsible_attorney: Option<IdRef>,
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

const MATTER_FIELDS: &[&str] =
    &["id", "description", "client", "status", "open_date", "close_date", "responsible_attorney"];

fn clio_matter_status(status: MatterStatus) -> &'static str {
    match status {
        MatterStatus::Active => "Open",
        MatterStatus::Inactive => "Pending",
        MatterStatus::Closed => "Closed",
    }
}

fn matter_status_from_clio(raw: &str) -> MatterStatus {
    match raw.trim().to_ascii_lowercase().as_str() {
        "pending" | "inactive" => MatterStatus::Inactive,
        "closed" => MatterStatus::Closed,
        _ => MatterStatus::Active,
    }
}

pub fn clio_matter_from_matter(matter: &Matter) -> ClioMatter {
    let mut parked = Passthrough::new();
    parked.put("practice_area", matter.practice_area.as_ref());

    ClioMatter {
        id: matter.id.clone(),
        description: matter.name.clone(),
        client: IdRef::to(Some(matter.client_id.as_str())),
        status: clio_matter_status(matter.status).to_string(),
        open_date: matter.open_date,
        close_date: matter.close_date,
        responsible_attorney: IdRef::to(matter.responsible_attorney.as_deref()),
        extra: emit_extra(&matter.metadata, parked, MATTER_FIELDS),
    }
}

pub fn matter_from_clio(matter: ClioMatter) -> Matter {
    let (metadata, mut parked) = absorb_extra(matter.extra);
    Matter {
        id: matter.id,
        client_id: IdRef::id(matter.client.as_ref()).unwrap_or_default(),
        name: matter.description,
        status: matter_status_from_clio(&matter.status),
        open_date: matter.open_date,
        close_date: matter.close_date,
        practice_area: parked.take("practice_area"),
        responsible_attorney: IdRef::id(matter.responsible_attorney.as_ref()),
        metadata,
    }
}

/// `users` record
#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct ClioUser {
    #[serde(deserialize_with = "lenient::id")]
    pub id: String,
    #[serde(default, deserialize_with = "lenient::string")]
    pub name: String,
    #[serde(default, deserialize_with = "lenient::string")]
    pub email: String,
    #[serde(default, deserialize_with = "lenient::string")]
    pub subscription_type: String,
    #[serde(default = "enabled_by_default", deserialize_with = "lenient::flag")]
    pub enabled: bool,
    #[serde(default, deserialize_with = "lenient::opt_decimal")]
    pub rate: Option<Decimal>,
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

const fn enabled_by_default() -> bool {
    true
}

pub fn user_from_clio(user: ClioUser) -> User {
    User {
        id: user.id,
        name: user.name,
        email: user.email,
        role: user.subscription_type,
        active: user.enabled,
        default_rate: user.rate,
        metadata: user.extra.into_iter().collect(),
    }
}

#[cfg(test)]
mod tests {
    use billsync_domain::constants::BILLING_ENTRY_STAMP_KEY;
    use rust_decimal_macros::dec;
    use serde_json::json;

    use super::*;

    fn entry() -> TimeEntry {
        let mut entry = TimeEntry::new(
            "client-42",
            NaiveDate::from_ymd_opt(2024, 7, 1).unwrap(),
            dec!(1.3),
            "Reviewed lease amendments",
        );
        entry.matter_id = Some("matter-7".into());
        entry.rate = Some(dec!(350));
        entry.user_id = Some("user-1".into());
        entry.activity_code = Some("A103".into());
        entry.task_code = Some("L110".into());
        entry.status = TimeEntryStatus::Approved;
        entry.metadata.insert(BILLING_ENTRY_STAMP_KEY.into(), json!("be-1"));
        entry
    }

    fn through_the_wire(entry: &TimeEntry) -> TimeEntry {
        let json = serde_json::to_value(activity_from_entry(entry)).unwrap();
        entry_from_activity(serde_json::from_value(json).unwrap())
    }

    #[test]
    fn time_entries_round_trip() {
        let original = entry();
        assert_eq!(through_the_wire(&original), original);

        let mut draft = TimeEntry::new("c", original.date, dec!(0.3), "Call");
        draft.billable = false;
        assert_eq!(through_the_wire(&draft), draft);
    }

    #[test]
    fn wire_shape_uses_clio_names() {
        let json = serde_json::to_value(activity_from_entry(&entry())).unwrap();
        assert_eq!(json["type"], "TimeEntry");
        assert_eq!(json["quantity_in_hours"], json!(1.3));
        assert_eq!(json["matter"], json!({ "id": "matter-7" }));
        assert_eq!(json["non_billable"], json!(false));
        assert_eq!(json["_billsync"], json!({ "status": "approved" }));
        assert_eq!(json[BILLING_ENTRY_STAMP_KEY], "be-1");
    }

    #[test]
    fn vendor_payloads_are_read_leniently() {
        let activity: ClioActivity = serde_json::from_value(json!({
            "id": 991,
            "type": "TimeEntry",
            "date": "2024-07-01",
            "quantity_in_hours": "0.50",
            "price": null,
            "note": null,
            "billed": true,
            "client": { "id": 42 },
            "updated_at": "2024-07-02T10:00:00-04:00",
            "etag": "abc"
        }))
        .unwrap();

        let entry = entry_from_activity(activity);
        assert_eq!(entry.id.as_deref(), Some("991"));
        assert_eq!(entry.hours, dec!(0.5));
        assert_eq!(entry.client_id, "42");
        assert_eq!(entry.status, TimeEntryStatus::Billed);
        assert_eq!(entry.metadata.get("etag"), Some(&json!("abc")));
        assert_eq!(entry.last_modified.unwrap().to_rfc3339(), "2024-07-02T14:00:00+00:00");
    }

    #[test]
    fn clients_and_matters_round_trip() {
        let mut client = Client::new("client-42", "Smith Holdings");
        client.email = Some("ap@smith.test".into());
        client.address = Some("1 Main St".into());
        client.status = ClientStatus::Inactive;
        client.default_rate = Some(dec!(275));
        let json = serde_json::to_value(contact_from_client(&client)).unwrap();
        assert_eq!(client_from_contact(serde_json::from_value(json).unwrap()), client);

        let matter = Matter {
            id: Some("matter-7".into()),
            client_id: "client-42".into(),
            name: "Lease dispute".into(),
            status: MatterStatus::Inactive,
            open_date: NaiveDate::from_ymd_opt(2024, 1, 5).unwrap(),
            close_date: None,
            practice_area: Some("Real estate".into()),
            responsible_attorney: Some("user-1".into()),
            metadata: Default::default(),
        };
        let json = serde_json::to_value(clio_matter_from_matter(&matter)).unwrap();
        assert_eq!(json["status"], "Pending");
        assert_eq!(matter_from_clio(serde_json::from_value(json).unwrap()), matter);
    }

    #[test]
    fn users_map_subscription_type_to_role() {
        let user: ClioUser = serde_json::from_value(json!({
            "id": 5, "name": "Ada Price", "email": "ada@firm.test",
            "subscription_type": "Attorney", "rate": "400.00"
        }))
        .unwrap();
        let user = user_from_clio(user);
        assert_eq!(user.role, "Attorney");
        assert!(user.active);
        assert_eq!(user.default_rate, Some(dec!(400)));
    }
}
