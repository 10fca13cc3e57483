//! Domain constants
//!
//! Centralized location for limits and reserved keys shared by the engine and
//! the vendor adapters.

/// Smallest billable increment, in hours (six minutes)
pub const HOURS_INCREMENT: &str = "0.1";

/// Expiry horizon reported for key-based credentials, which never expire
pub const API_KEY_VALIDITY_DAYS: i64 = 365 * 100;

/// Page size used when a caller does not pick one
pub const DEFAULT_PAGE_LIMIT: u32 = 50;

/// Largest page size any adapter will request
pub const MAX_PAGE_LIMIT: u32 = 200;

/// Error messages stored on entries are truncated to this many characters
pub const MAX_ERROR_MESSAGE_LEN: usize = 500;

/// Metadata key stamped on outgoing time entries with the billing entry id,
/// used to find an entry created by a call whose response was lost
pub const BILLING_ENTRY_STAMP_KEY: &str = "billsync_entry_id";
