use chrono::Utc;
use log::info;
use std::sync::Arc;
use uuid::Uuid;

use super::error::LearnError;
use super::store::{LearnStore, USER_EMAIL_UNIQUE};
use super::types::*;
use crate::core::shared::utils::is_valid_email;

pub struct UserDirectory<S> {
    store: Arc<S>,
}

impl<S> Clone for UserDirectory<S> {
    fn clone(&self) -> Self {
        Self {
            store: Arc::clone(&self.store),
        }
    }
}

impl<S: LearnStore> UserDirectory<S> {
    pub fn new(store: Arc<S>) -> Self {
        Self { store }
    }

    pub async fn register(&self, req: RegisterUserRequest) -> Result<User, LearnError> {
        let name = req.name.trim();
        if name.is_empty() {
            return Err(LearnError::Validation("name is required".to_string()));
        }
        let email = req.email.trim().to_lowercase();
        if !is_valid_email(&email) {
            return Err(LearnError::Validation(format!("invalid email address: {email}")));
        }

        let now = Utc::now();
        let user = User {
            id: Uuid::new_v4(),
            name: name.to_string(),
            email,
            role: req.role,
            created_at: now,
        };

        let user = match self.store.insert_user(user).await {
            Ok(user) => user,
            Err(e) if e.violates(USER_EMAIL_UNIQUE) => {
                return Err(LearnError::Validation(
                    "a user with this email already exists".to_string(),
                ))
            }
            Err(e) => return Err(e.into()),
        };
        self.store.ensure_profile(user.id, now).await?;

        info!("Registered {} {}", user.role, user.id);
        Ok(user)
    }

    pub async fn get(&self, id: Uuid) -> Result<User, LearnError> {
        self.store
            .get_user(id)
            .await?
            .ok_or_else(|| LearnError::not_found("user", id))
    }

    /// Resolves the caller named by the identity header.
    pub async fn authenticate(&self, id: Option<Uuid>) -> Result<User, LearnError> {
        let id = id.ok_or_else(|| LearnError::Unauthorized("missing user id".to_string()))?;
        self.store
            .get_user(id)
            .await?
            .ok_or_else(|| LearnError::Unauthorized(format!("unknown user {id}")))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::shared::test_utils::TestPlatform;

    fn request(email: &str) -> RegisterUserRequest {
        RegisterUserRequest {
            name: "Ada Lovelace".to_string(),
            email: email.to_string(),
            role: Role::Student,
        }
    }

    #[tokio::test]
    async fn test_register_creates_profile() {
        let platform = TestPlatform::new();
        let user = platform
            .learn
            .users
            .register(request("  Ada@Example.COM "))
            .await
            .unwrap();
        assert_eq!(user.email, "ada@example.com");

        let profile = platform.store.get_profile(user.id).await.unwrap().unwrap();
        assert_eq!(profile.points, 0);
        assert_eq!(profile.total_courses_completed, 0);
    }

    #[tokio::test]
    async fn test_register_rejects_bad_input() {
        let platform = TestPlatform::new();
        platform.learn.users.register(request("ada@example.com")).await.unwrap();

        for email in ["ada@example.com", "ADA@example.com", "not-an-email"] {
            let err = platform.learn.users.register(request(email)).await.unwrap_err();
            assert!(matches!(err, LearnError::Validation(_)), "{email}");
        }

        let mut nameless = request("nameless@example.com");
        nameless.name = "   ".to_string();
        let err = platform.learn.users.register(nameless).await.unwrap_err();
        assert!(matches!(err, LearnError::Validation(_)));
    }

    #[tokio::test]
    async fn test_authenticate() {
        let platform = TestPlatform::new();
        let student = platform.student().await;

        let user = platform.learn.users.authenticate(Some(student.id)).await.unwrap();
        assert_eq!(user.id, student.id);

        let err = platform.learn.users.authenticate(None).await.unwrap_err();
        assert!(matches!(err, LearnError::Unauthorized(_)));
        let err = platform
            .learn
            .users
            .authenticate(Some(Uuid::new_v4()))
            .await
            .unwrap_err();
        assert!(matches!(err, LearnError::Unauthorized(_)));
    }
}
