pub mod dates;
pub mod error;
pub mod types;

pub use error::{Result, TerritoryError};
pub use types::{HistoryEntry, HistoryId, NewHistoryEntry, Territory, TerritoryId, TerritoryStatus};
