use crate::core::dates::{display_date, display_date_required};
use crate::core::error::{Result, TerritoryError};
use chrono::NaiveDate;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// Stable, externally assigned territory number (always >= 1).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(try_from = "u32", into = "u32")]
pub struct TerritoryId(u32);

impl TerritoryId {
    pub fn new(value: u32) -> Result<Self> {
        if value == 0 {
            return Err(TerritoryError::invalid("territory id must be a positive integer"));
        }
        Ok(Self(value))
    }

    pub fn get(self) -> u32 {
        self.0
    }
}

impl TryFrom<u32> for TerritoryId {
    type Error = TerritoryError;

    fn try_from(value: u32) -> Result<Self> {
        Self::new(value)
    }
}

impl From<TerritoryId> for u32 {
    fn from(id: TerritoryId) -> Self {
        id.0
    }
}

impl fmt::Display for TerritoryId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl FromStr for TerritoryId {
    type Err = TerritoryError;

    /// Accepts plain integers and integral decimals such as `"12.0"`, which
    /// older spreadsheet exports produce.
    fn from_str(raw: &str) -> Result<Self> {
        let raw = raw.trim();
        let invalid = || TerritoryError::invalid(format!("'{}' is not a valid territory id", raw));

        if let Ok(value) = raw.parse::<u32>() {
            return Self::new(value).map_err(|_| invalid());
        }

        let value = raw.parse::<f64>().map_err(|_| invalid())?;
        if !value.is_finite() || value.fract() != 0.0 || value < 1.0 || value > f64::from(u32::MAX) {
            return Err(invalid());
        }
        Self::new(value as u32)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TerritoryStatus {
    Free,
    Assigned,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Territory {
    pub id: TerritoryId,
    pub name: String,
    pub custom_name: String,
    pub status: TerritoryStatus,
    #[serde(rename = "taken_by")]
    pub assignee: String,
    #[serde(with = "display_date")]
    pub date_taken: Option<NaiveDate>,
    #[serde(with = "display_date")]
    pub date_due: Option<NaiveDate>,
    pub notes: String,
    #[serde(default)]
    pub image_url: Option<String>,
}

impl Territory {
    /// A freshly seeded, free territory.
    pub fn new(id: TerritoryId) -> Self {
        let name = format!("Territory {}", id);
        Self {
            id,
            custom_name: name.clone(),
            name,
            status: TerritoryStatus::Free,
            assignee: String::new(),
            date_taken: None,
            date_due: None,
            notes: String::new(),
            image_url: None,
        }
    }

    pub fn display_name(&self) -> &str {
        if self.custom_name.trim().is_empty() {
            &self.name
        } else {
            &self.custom_name
        }
    }

    #[inline]
    pub fn is_assigned(&self) -> bool {
        self.status == TerritoryStatus::Assigned
    }

    /// Checks the status/assignee/date coupling.
    pub fn is_consistent(&self) -> bool {
        match self.status {
            TerritoryStatus::Assigned => {
                !self.assignee.is_empty() && self.date_taken.is_some() && self.date_due.is_some()
            }
            TerritoryStatus::Free => {
                self.assignee.is_empty() && self.date_taken.is_none() && self.date_due.is_none()
            }
        }
    }

    pub(crate) fn mark_free(&mut self) {
        self.status = TerritoryStatus::Free;
        self.assignee.clear();
        self.date_taken = None;
        self.date_due = None;
    }
}

pub type HistoryId = u64;

/// One assignment of a territory to a holder.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct HistoryEntry {
    pub id: HistoryId,
    pub territory_id: TerritoryId,
    #[serde(rename = "taken_by")]
    pub assignee: String,
    #[serde(with = "display_date_required")]
    pub date_taken: NaiveDate,
    #[serde(with = "display_date")]
    pub date_returned: Option<NaiveDate>,
}

impl HistoryEntry {
    pub fn is_open(&self) -> bool {
        self.date_returned.is_none()
    }
}

/// History row before the store assigns its id.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NewHistoryEntry {
    pub territory_id: TerritoryId,
    pub assignee: String,
    pub date_taken: NaiveDate,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn territory_id_parses_integers_and_integral_decimals() {
        assert_eq!("12".parse::<TerritoryId>().unwrap().get(), 12);
        assert_eq!(" 12.0 ".parse::<TerritoryId>().unwrap().get(), 12);
    }

    #[test]
    fn territory_id_rejects_malformed_values() {
        for raw in ["0", "-3", "12.5", "abc", "", "NaN", "1e20"] {
            assert!(
                matches!(raw.parse::<TerritoryId>(), Err(TerritoryError::InvalidArgument(_))),
                "{raw} should be rejected"
            );
        }
    }

    #[test]
    fn seeded_territory_is_free_and_consistent() {
        let territory = Territory::new(TerritoryId::new(7).unwrap());
        assert_eq!(territory.display_name(), "Territory 7");
        assert!(!territory.is_assigned());
        assert!(territory.is_consistent());
    }

    #[test]
    fn territory_serializes_with_legacy_column_names() {
        let mut territory = Territory::new(TerritoryId::new(3).unwrap());
        territory.status = TerritoryStatus::Assigned;
        territory.assignee = "Alice".to_string();
        territory.date_taken = NaiveDate::from_ymd_opt(2025, 1, 1);
        territory.date_due = NaiveDate::from_ymd_opt(2025, 5, 1);

        let json = serde_json::to_value(&territory).unwrap();
        assert_eq!(json["id"], 3);
        assert_eq!(json["taken_by"], "Alice");
        assert_eq!(json["date_taken"], "01.01.2025");
        assert_eq!(json["date_due"], "01.05.2025");
        assert_eq!(json["status"], "assigned");

        let back: Territory = serde_json::from_value(json).unwrap();
        assert_eq!(back, territory);
    }
}
