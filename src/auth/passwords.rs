use crate::auth::{AuthError, Role};
use std::collections::HashMap;
use tracing::debug;

/// Checks role passwords against bcrypt hashes.
pub struct AuthManager {
    hashes: HashMap<Role, String>,
}

impl AuthManager {
    /// Hashes every configured role password with the default bcrypt cost.
    /// Roles left out cannot log in.
    pub fn new<I>(passwords: I) -> Result<Self, AuthError>
    where
        I: IntoIterator<Item = (Role, String)>,
    {
        Self::with_cost(passwords, bcrypt::DEFAULT_COST)
    }

    pub fn with_cost<I>(passwords: I, cost: u32) -> Result<Self, AuthError>
    where
        I: IntoIterator<Item = (Role, String)>,
    {
        let mut hashes = HashMap::new();
        for (role, password) in passwords {
            if password.is_empty() {
                continue;
            }
            hashes.insert(role, bcrypt::hash(password, cost)?);
        }
        Ok(Self { hashes })
    }

    pub fn enabled_roles(&self) -> Vec<Role> {
        Role::ALL
            .into_iter()
            .filter(|role| self.hashes.contains_key(role))
            .collect()
    }

    /// Verifies `password` for `role`. The bcrypt check runs on the
    /// blocking pool.
    pub async fn authenticate(&self, role: &str, password: &str) -> Result<Role, AuthError> {
        let role: Role = role.parse()?;
        let hash = self
            .hashes
            .get(&role)
            .cloned()
            .ok_or(AuthError::InvalidCredentials)?;

        let password = password.to_string();
        let matches = tokio::task::spawn_blocking(move || bcrypt::verify(password, &hash))
            .await
            .map_err(|e| AuthError::Hash(e.to_string()))?
            .unwrap_or(false);

        if !matches {
            debug!(role = %role, "login rejected");
            return Err(AuthError::InvalidCredentials);
        }
        Ok(role)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn manager() -> AuthManager {
        AuthManager::with_cost(
            [
                (Role::Admin, "Pass123".to_string()),
                (Role::Viewer, "View123".to_string()),
                (Role::Courier, String::new()),
            ],
            4,
        )
        .unwrap()
    }

    #[tokio::test]
    async fn correct_password_yields_role() {
        let auth = manager();
        assert_eq!(auth.authenticate("admin", "Pass123").await.unwrap(), Role::Admin);
        assert_eq!(auth.authenticate("viewer", "View123").await.unwrap(), Role::Viewer);
    }

    #[tokio::test]
    async fn wrong_password_or_role_is_rejected() {
        let auth = manager();
        assert_eq!(
            auth.authenticate("admin", "View123").await.unwrap_err(),
            AuthError::InvalidCredentials
        );
        assert!(matches!(
            auth.authenticate("owner", "Pass123").await,
            Err(AuthError::UnknownRole(_))
        ));
    }

    #[tokio::test]
    async fn role_without_password_is_disabled() {
        let auth = manager();
        assert_eq!(auth.enabled_roles(), vec![Role::Admin, Role::Viewer]);
        assert_eq!(
            auth.authenticate("courier", "").await.unwrap_err(),
            AuthError::InvalidCredentials
        );
    }
}
