use anyhow::Result;
use async_trait::async_trait;
use serde::Serialize;
use uuid::Uuid;

use crate::domain::{
    errors::MedicationError,
    medication::{User, UserId},
    repository::MedicationRepository,
};

/// The caller a bearer credential belongs to.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct AuthUser {
    pub id: UserId,
    pub email: String,
    pub name: String,
}

impl From<User> for AuthUser {
    fn from(user: User) -> Self {
        Self { id: user.id, email: user.email, name: user.name }
    }
}

#[async_trait]
pub trait Authenticator: Send + Sync + 'static {
    /// Resolves an `Authorization` header value to a user.
    async fn authenticate(&self, header: Option<&str>) -> Result<AuthUser>;
    /// Registers an account and returns it with its freshly issued token.
    async fn signup(&self, email: &str, name: Option<&str>) -> Result<(AuthUser, String)>;
}

/// Opaque bearer tokens stored next to the account rows.
#[derive(Clone)]
pub struct TokenAuthenticator<R: MedicationRepository> {
    repo: R,
}

impl<R: MedicationRepository> TokenAuthenticator<R> {
    pub fn new(repo: R) -> Self { Self { repo } }

    /// Returns the account for `email`, creating it on first use.
    pub async fn ensure_account(&self, email: &str, name: &str) -> Result<AuthUser> {
        if let Some(user) = self.repo.find_user_by_email(email).await? {
            return Ok(user.into());
        }
        let (user, _) = self.signup(email, Some(name)).await?;
        Ok(user)
    }
}

pub fn bearer_token(header: Option<&str>) -> Result<&str, MedicationError> {
    let header = header.ok_or_else(|| MedicationError::Unauthorized("missing Authorization header".into()))?;
    match header.strip_prefix("Bearer ").map(str::trim) {
        Some(token) if !token.is_empty() => Ok(token),
        _ => Err(MedicationError::Unauthorized("invalid Authorization header".into())),
    }
}

#[async_trait]
impl<R: MedicationRepository> Authenticator for TokenAuthenticator<R> {
    async fn authenticate(&self, header: Option<&str>) -> Result<AuthUser> {
        let token = bearer_token(header)?;
        match self.repo.find_user_by_token(token).await? {
            Some(user) => Ok(user.into()),
            None => {
                tracing::warn!("rejected unknown bearer token");
                Err(MedicationError::Unauthorized("unknown token".into()).into())
            }
        }
    }

    async fn signup(&self, email: &str, name: Option<&str>) -> Result<(AuthUser, String)> {
        let email = email.trim().to_lowercase();
        if email.is_empty() || !email.contains('@') {
            return Err(MedicationError::Validation("a valid email is required".into()).into());
        }
        let name = match name.map(str::trim).filter(|n| !n.is_empty()) {
            Some(name) => name.to_string(),
            None => email.split('@').next().unwrap_or_default().to_string(),
        };
        let user = User {
            id: UserId::default(),
            email,
            name,
            token: Uuid::new_v4().simple().to_string(),
        };
        self.repo.create_user(&user).await?;
        tracing::info!(user_id = %user.id.0, "account created");
        let token = user.token.clone();
        Ok((user.into(), token))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn bearer_header_parsing() {
        assert_eq!(bearer_token(Some("Bearer abc123")).unwrap(), "abc123");
        assert!(bearer_token(None).is_err());
        assert!(bearer_token(Some("Basic abc")).is_err());
        assert!(bearer_token(Some("Bearer ")).is_err());
    }
}
