use crate::core::types::TerritoryId;
use thiserror::Error;

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum TerritoryError {
    #[error("Territory {0} not found")]
    NotFound(TerritoryId),

    #[error("Invalid argument: {0}")]
    InvalidArgument(String),

    #[error("Conflict: {0}")]
    Conflict(String),

    #[error("Storage error: {0}")]
    Storage(String),
}

impl TerritoryError {
    pub fn invalid(message: impl Into<String>) -> Self {
        Self::InvalidArgument(message.into())
    }

    pub fn conflict(message: impl Into<String>) -> Self {
        Self::Conflict(message.into())
    }

    pub fn storage(message: impl Into<String>) -> Self {
        Self::Storage(message.into())
    }
}

pub type Result<T> = std::result::Result<T, TerritoryError>;

impl From<std::io::Error> for TerritoryError {
    fn from(err: std::io::Error) -> Self {
        Self::Storage(err.to_string())
    }
}

impl From<serde_json::Error> for TerritoryError {
    fn from(err: serde_json::Error) -> Self {
        Self::Storage(format!("Snapshot encoding failed: {}", err))
    }
}
