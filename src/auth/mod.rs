//! Role login and cookie sessions.
//!
//! There are no user accounts: each role has one shared password, stored
//! only as a bcrypt hash.

pub mod passwords;
pub mod session;

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use thiserror::Error;

pub use passwords::AuthManager;
pub use session::{Session, SessionStore};

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum AuthError {
    #[error("Invalid role or password")]
    InvalidCredentials,

    #[error("Unknown role '{0}'")]
    UnknownRole(String),

    #[error("Password hashing failed: {0}")]
    Hash(String),
}

impl From<bcrypt::BcryptError> for AuthError {
    fn from(err: bcrypt::BcryptError) -> Self {
        Self::Hash(err.to_string())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    /// Full access, including every mutation.
    Admin,
    /// Read-only access to everything.
    Viewer,
    /// Read-only access to free territories.
    Courier,
}

impl Role {
    pub const ALL: [Role; 3] = [Role::Admin, Role::Viewer, Role::Courier];

    pub fn as_str(self) -> &'static str {
        match self {
            Role::Admin => "admin",
            Role::Viewer => "viewer",
            Role::Courier => "courier",
        }
    }

    #[inline]
    pub fn can_mutate(self) -> bool {
        self == Role::Admin
    }

    /// Whether holders, notes and history are visible.
    #[inline]
    pub fn sees_assignments(self) -> bool {
        self != Role::Courier
    }
}

impl fmt::Display for Role {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Role {
    type Err = AuthError;

    fn from_str(raw: &str) -> Result<Self, Self::Err> {
        match raw.trim().to_ascii_lowercase().as_str() {
            "admin" => Ok(Role::Admin),
            "viewer" => Ok(Role::Viewer),
            "courier" => Ok(Role::Courier),
            _ => Err(AuthError::UnknownRole(raw.to_string())),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn roles_parse_case_insensitively() {
        assert_eq!("Admin".parse::<Role>().unwrap(), Role::Admin);
        assert_eq!(" courier ".parse::<Role>().unwrap(), Role::Courier);
        assert_eq!(
            "root".parse::<Role>().unwrap_err(),
            AuthError::UnknownRole("root".to_string())
        );
    }

    #[test]
    fn only_admin_mutates() {
        assert!(Role::Admin.can_mutate());
        assert!(!Role::Viewer.can_mutate());
        assert!(!Role::Courier.sees_assignments());
    }
}
