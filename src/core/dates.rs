//! Calendar helpers shared by the lifecycle engine, storage and web layer.
//!
//! Dates are persisted and displayed as `DD.MM.YYYY`. An absent date is
//! stored as an empty string so the on-disk shape matches the historic
//! tables.

use crate::core::error::{Result, TerritoryError};
use chrono::{Days, NaiveDate};

pub const DISPLAY_FORMAT: &str = "%d.%m.%Y";
pub const FORM_FORMAT: &str = "%Y-%m-%d";

/// Days between taking a territory and its planned return.
pub const LOAN_PERIOD_DAYS: u64 = 120;

/// A taken territory is flagged once this many days or fewer remain.
pub const DUE_SOON_THRESHOLD_DAYS: i64 = 10;

pub fn format_date(date: NaiveDate) -> String {
    date.format(DISPLAY_FORMAT).to_string()
}

pub fn format_optional(date: Option<NaiveDate>) -> String {
    date.map(format_date).unwrap_or_default()
}

/// Parses `DD.MM.YYYY`.
pub fn parse_date(raw: &str) -> Result<NaiveDate> {
    NaiveDate::parse_from_str(raw.trim(), DISPLAY_FORMAT)
        .map_err(|_| TerritoryError::invalid(format!("'{}' is not a DD.MM.YYYY date", raw)))
}

/// Parses either the HTML date input format (`YYYY-MM-DD`) or `DD.MM.YYYY`.
/// Blank input means "not given".
pub fn parse_form_date(raw: &str) -> Result<Option<NaiveDate>> {
    let raw = raw.trim();
    if raw.is_empty() {
        return Ok(None);
    }

    NaiveDate::parse_from_str(raw, FORM_FORMAT)
        .or_else(|_| NaiveDate::parse_from_str(raw, DISPLAY_FORMAT))
        .map(Some)
        .map_err(|_| TerritoryError::invalid(format!("'{}' is not a valid date", raw)))
}

pub fn due_date(taken: NaiveDate) -> Result<NaiveDate> {
    taken
        .checked_add_days(Days::new(LOAN_PERIOD_DAYS))
        .ok_or_else(|| TerritoryError::invalid(format!("due date overflows for {}", taken)))
}

pub fn is_due_soon(due: NaiveDate, today: NaiveDate) -> bool {
    (due - today).num_days() <= DUE_SOON_THRESHOLD_DAYS
}

/// Serde adapter for `Option<NaiveDate>` stored as `DD.MM.YYYY` or `""`.
pub mod display_date {
    use super::{DISPLAY_FORMAT, format_optional};
    use chrono::NaiveDate;
    use serde::{Deserialize, Deserializer, Serializer, de};

    pub fn serialize<S>(date: &Option<NaiveDate>, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        serializer.serialize_str(&format_optional(*date))
    }

    pub fn deserialize<'de, D>(deserializer: D) -> Result<Option<NaiveDate>, D::Error>
    where
        D: Deserializer<'de>,
    {
        let raw = String::deserialize(deserializer)?;
        let raw = raw.trim();
        if raw.is_empty() {
            return Ok(None);
        }
        NaiveDate::parse_from_str(raw, DISPLAY_FORMAT)
            .map(Some)
            .map_err(de::Error::custom)
    }
}

/// Serde adapter for a mandatory `NaiveDate` stored as `DD.MM.YYYY`.
pub mod display_date_required {
    use super::{DISPLAY_FORMAT, format_date};
    use chrono::NaiveDate;
    use serde::{Deserialize, Deserializer, Serializer, de};

    pub fn serialize<S>(date: &NaiveDate, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        serializer.serialize_str(&format_date(*date))
    }

    pub fn deserialize<'de, D>(deserializer: D) -> Result<NaiveDate, D::Error>
    where
        D: Deserializer<'de>,
    {
        let raw = String::deserialize(deserializer)?;
        NaiveDate::parse_from_str(raw.trim(), DISPLAY_FORMAT).map_err(de::Error::custom)
    }
}
