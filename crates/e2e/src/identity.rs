//! Throwaway user identities for scenario runs

use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Password accepted by the application's complexity policy
pub const VALID_PASSWORD: &str = "ValidPass123!";

/// Password rejected by the minimum-length policy
pub const SHORT_PASSWORD: &str = "short";

/// Well-formed password that does not belong to the registered user
pub const WRONG_PASSWORD: &str = "WrongPass1!";

/// A freshly generated user. Nothing here is cleaned up afterwards; the
/// application under test owns persistence.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TestUser {
    pub username: String,
    pub email: String,
    pub first_name: String,
    pub last_name: String,
    pub password: String,
}

impl TestUser {
    /// Generate a user with a unique username and the valid password
    pub fn generate() -> Self {
        let username = unique_username();
        Self {
            email: format!("{}@example.com", username),
            username,
            first_name: "Test".to_string(),
            last_name: "User".to_string(),
            password: VALID_PASSWORD.to_string(),
        }
    }

    pub fn with_password(mut self, password: impl Into<String>) -> Self {
        self.password = password.into();
        self
    }

    /// Registration payload with the password confirmed
    pub fn registration(&self) -> RegistrationRequest {
        RegistrationRequest {
            first_name: self.first_name.clone(),
            last_name: self.last_name.clone(),
            email: self.email.clone(),
            username: self.username.clone(),
            password: self.password.clone(),
            confirm_password: self.password.clone(),
        }
    }
}

/// Body of `POST /auth/register`, also the set of fields on the register form
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RegistrationRequest {
    pub first_name: String,
    pub last_name: String,
    pub email: String,
    pub username: String,
    pub password: String,
    pub confirm_password: String,
}

/// `user_` followed by 8 lowercase hex characters of a v4 UUID
pub fn unique_username() -> String {
    let id = Uuid::new_v4().simple().to_string();
    format!("user_{}", &id[..8])
}
