//! Entity validation shared by every adapter
//!
//! Adapters call [`Validate::validate`] before issuing a create or update so
//! malformed requests never spend vendor rate-limit budget.

use rust_decimal::{Decimal, RoundingStrategy};
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::types::entities::{Client, Matter, TimeEntry, User};

/// A field that failed validation and why
#[derive(Debug, Clone, PartialEq, Eq, Error, Serialize, Deserialize)]
#[error("{field}: {reason}")]
pub struct ValidationError {
    pub field: String,
    pub reason: String,
}

impl ValidationError {
    pub fn new(field: impl Into<String>, reason: impl Into<String>) -> Self {
        Self { field: field.into(), reason: reason.into() }
    }
}

pub trait Validate {
    fn validate(&self) -> Result<(), ValidationError>;
}

fn require(field: &str, value: &str) -> Result<(), ValidationError> {
    if value.trim().is_empty() {
        return Err(ValidationError::new(field, "is required"));
    }
    Ok(())
}

fn require_if_present(field: &str, value: Option<&str>) -> Result<(), ValidationError> {
    match value {
        Some(value) if value.trim().is_empty() => {
            Err(ValidationError::new(field, "must not be blank when present"))
        }
        _ => Ok(()),
    }
}

fn non_negative(field: &str, value: Option<Decimal>) -> Result<(), ValidationError> {
    match value {
        Some(value) if value.is_sign_negative() && !value.is_zero() => {
            Err(ValidationError::new(field, "must not be negative"))
        }
        _ => Ok(()),
    }
}

fn email_shape(field: &str, value: Option<&str>) -> Result<(), ValidationError> {
    match value {
        Some(email) if !email.contains('@') => {
            Err(ValidationError::new(field, format!("'{email}' is not an email address")))
        }
        _ => Ok(()),
    }
}

/// Hours must be positive and a whole number of tenths.
pub fn validate_hours(hours: Decimal) -> Result<(), ValidationError> {
    if hours <= Decimal::ZERO {
        return Err(ValidationError::new("hours", format!("must be greater than zero, got {hours}")));
    }
    if !(hours * Decimal::TEN).fract().is_zero() {
        return Err(ValidationError::new("hours", format!("must be a multiple of 0.1, got {hours}")));
    }
    Ok(())
}

/// Round positive hours up to the next tenth. Non-positive values are
/// returned unchanged so validation can still reject them.
pub fn round_up_to_increment(hours: Decimal) -> Decimal {
    if hours <= Decimal::ZERO {
        return hours;
    }
    hours.round_dp_with_strategy(1, RoundingStrategy::AwayFromZero).normalize()
}

impl Validate for TimeEntry {
    fn validate(&self) -> Result<(), ValidationError> {
        require("client_id", &self.client_id)?;
        require("description", &self.description)?;
        validate_hours(self.hours)?;
        non_negative("rate", self.rate)?;
        require_if_present("matter_id", self.matter_id.as_deref())?;
        require_if_present("activity_code", self.activity_code.as_deref())?;
        require_if_present("task_code", self.task_code.as_deref())?;
        require_if_present("user_id", self.user_id.as_deref())?;
        Ok(())
    }
}

impl Validate for Client {
    fn validate(&self) -> Result<(), ValidationError> {
        require("name", &self.name)?;
        email_shape("email", self.email.as_deref())?;
        non_negative("default_rate", self.default_rate)
    }
}

impl Validate for Matter {
    fn validate(&self) -> Result<(), ValidationError> {
        require("client_id", &self.client_id)?;
        require("name", &self.name)?;
        if let Some(close_date) = self.close_date {
            if close_date < self.open_date {
                return Err(ValidationError::new(
                    "close_date",
                    format!("{close_date} is before open date {}", self.open_date),
                ));
            }
        }
        Ok(())
    }
}

impl Validate for User {
    fn validate(&self) -> Result<(), ValidationError> {
        require("id", &self.id)?;
        require("name", &self.name)?;
        email_shape("email", Some(self.email.as_str()))?;
        non_negative("default_rate", self.default_rate)
    }
}
