//! Canonical practice-management records
//!
//! Every vendor adapter maps its wire format to and from these types. Fields a
//! vendor models that have no canonical counterpart travel in `metadata`.

use std::collections::BTreeMap;

use chrono::{DateTime, NaiveDate, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

use crate::errors::{BillSyncError, Result};
use crate::impl_domain_status_conversions;

/// Vendor-opaque key/value data. Ordered so content hashes are stable.
pub type Metadata = BTreeMap<String, serde_json::Value>;

/// Lifecycle of a time entry as the vendor sees it
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TimeEntryStatus {
    #[default]
    Draft,
    Pending,
    Approved,
    Billed,
}

impl_domain_status_conversions!(TimeEntryStatus {
    Draft => "draft",
    Pending => "pending",
    Approved => "approved",
    Billed => "billed",
});

impl TimeEntryStatus {
    const fn rank(self) -> u8 {
        match self {
            Self::Draft => 0,
            Self::Pending => 1,
            Self::Approved => 2,
            Self::Billed => 3,
        }
    }
}

/// A unit of billable work
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct TimeEntry {
    /// Vendor id; `None` until the entry exists remotely
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub id: Option<String>,
    pub client_id: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub matter_id: Option<String>,
    pub date: NaiveDate,
    pub hours: Decimal,
    pub description: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub rate: Option<Decimal>,
    #[serde(default = "default_true")]
    pub billable: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub activity_code: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub task_code: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub user_id: Option<String>,
    #[serde(default)]
    pub status: TimeEntryStatus,
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub metadata: Metadata,
    /// Server-assigned modification time, when the vendor reports one
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub last_modified: Option<DateTime<Utc>>,
}

const fn default_true() -> bool {
    true
}

impl TimeEntry {
    pub fn new(
        client_id: impl Into<String>,
        date: NaiveDate,
        hours: Decimal,
        description: impl Into<String>,
    ) -> Self {
        Self {
            client_id: client_id.into(),
            date,
            hours,
            description: description.into(),
            billable: true,
            ..Self::default()
        }
    }

    /// Move the status forward. Backward moves are refused; use
    /// [`TimeEntry::roll_back_status`] for an explicit rejection.
    pub fn advance_status(&mut self, next: TimeEntryStatus) -> Result<()> {
        if next.rank() < self.status.rank() {
            return Err(BillSyncError::InvalidState(format!(
                "time entry status cannot move from {} back to {next}",
                self.status
            )));
        }
        self.status = next;
        Ok(())
    }

    /// Explicit rejection: the only way a status may move backwards.
    /// Billed work cannot be rolled back.
    pub fn roll_back_status(&mut self, to: TimeEntryStatus) -> Result<()> {
        if self.status == TimeEntryStatus::Billed {
            return Err(BillSyncError::InvalidState(
                "billed time entries cannot be rolled back".to_string(),
            ));
        }
        if to.rank() > self.status.rank() {
            return Err(BillSyncError::InvalidState(format!(
                "rollback from {} to {to} is a forward move",
                self.status
            )));
        }
        self.status = to;
        Ok(())
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ClientStatus {
    #[default]
    Active,
    Inactive,
}

impl_domain_status_conversions!(ClientStatus {
    Active => "active",
    Inactive => "inactive",
});

/// A billed party
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Client {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub id: Option<String>,
    pub name: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub email: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub phone: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub address: Option<String>,
    #[serde(default)]
    pub status: ClientStatus,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub default_rate: Option<Decimal>,
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub metadata: Metadata,
}

impl Client {
    pub fn new(id: impl Into<String>, name: impl Into<String>) -> Self {
        Self { id: Some(id.into()), name: name.into(), ..Self::default() }
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum MatterStatus {
    #[default]
    Active,
    Inactive,
    Closed,
}

impl_domain_status_conversions!(MatterStatus {
    Active => "active",
    Inactive => "inactive",
    Closed => "closed",
});

/// A case or engagement; always owned by a client
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Matter {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub id: Option<String>,
    pub client_id: String,
    pub name: String,
    #[serde(default)]
    pub status: MatterStatus,
    pub open_date: NaiveDate,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub close_date: Option<NaiveDate>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub practice_area: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub responsible_attorney: Option<String>,
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub metadata: Metadata,
}

/// A timekeeper on the platform. Read-only.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct User {
    pub id: String,
    pub name: String,
    pub email: String,
    #[serde(default)]
    pub role: String,
    #[serde(default = "default_true")]
    pub active: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub default_rate: Option<Decimal>,
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub metadata: Metadata,
}
