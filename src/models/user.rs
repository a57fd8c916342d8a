// src/models/user.rs

use serde::{Deserialize, Serialize};
use sqlx::FromRow;
use utoipa::ToSchema;
use validator::{Validate, ValidationError};

/// Row type for the `users` table.
#[derive(Debug, Clone, FromRow, Serialize, Deserialize)]
pub struct User {
    pub id: i64,

    /// Unique, stored lowercased.
    pub email: String,

    /// Argon2 PHC string. Never serialized.
    #[serde(skip)]
    pub password_hash: String,

    /// Display name shown in the client header.
    pub name: String,

    pub school: Option<String>,
    pub phone: Option<String>,

    /// Avatar image as a `data:image/...` URI, if the user uploaded one.
    pub avatar_data: Option<String>,

    pub created_at: Option<chrono::DateTime<chrono::Utc>>,
    pub updated_at: Option<chrono::DateTime<chrono::Utc>>,
}

/// Public view of a user, returned by auth and profile endpoints.
#[derive(Debug, Serialize, ToSchema)]
pub struct UserPublic {
    pub id: i64,
    pub email: String,
    pub name: String,
}

impl From<&User> for UserPublic {
    fn from(user: &User) -> Self {
        UserPublic {
            id: user.id,
            email: user.email.clone(),
            name: user.name.clone(),
        }
    }
}

/// Full profile for the settings page.
#[derive(Debug, Serialize, FromRow, ToSchema)]
pub struct ProfileResponse {
    pub id: i64,
    pub email: String,
    pub name: String,
    pub school: Option<String>,
    pub phone: Option<String>,
    pub avatar_data: Option<String>,
    pub created_at: Option<chrono::DateTime<chrono::Utc>>,
}

/// DTO for creating a new account.
#[derive(Debug, Deserialize, Validate, ToSchema)]
pub struct SignupRequest {
    #[validate(email(message = "A valid email address is required."))]
    pub email: String,
    #[validate(length(
        min = 6,
        max = 128,
        message = "Password length must be between 6 and 128 characters."
    ))]
    pub password: String,
    /// Optional; defaults to the part of the email before '@'.
    #[validate(length(max = 100))]
    pub name: Option<String>,
}

/// DTO for login. Only length-checked: a malformed email should fail
/// authentication (401), not validation (400).
#[derive(Debug, Deserialize, Validate, ToSchema)]
pub struct LoginRequest {
    #[validate(length(min = 1, max = 254))]
    pub email: String,
    #[validate(length(min = 1, max = 128))]
    pub password: String,
}

/// DTO for partial profile updates. Absent fields are left untouched.
#[derive(Debug, Deserialize, Validate, ToSchema)]
pub struct UpdateProfileRequest {
    #[validate(length(min = 1, max = 100))]
    pub name: Option<String>,
    #[validate(length(max = 200))]
    pub school: Option<String>,
    #[validate(length(max = 40))]
    pub phone: Option<String>,
    #[validate(custom(function = validate_avatar_data))]
    pub avatar_data: Option<String>,
}

/// Avatars arrive inline as data URIs; cap the size so a pathological client
/// cannot bloat the row.
fn validate_avatar_data(value: &str) -> Result<(), ValidationError> {
    if !value.starts_with("data:image/") {
        return Err(ValidationError::new("avatar_must_be_data_image_uri"));
    }
    if value.len() > 2_000_000 {
        return Err(ValidationError::new("avatar_too_large"));
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_signup_rejects_bad_email() {
        let req = SignupRequest {
            email: "not-an-email".to_string(),
            password: "password123".to_string(),
            name: None,
        };
        assert!(req.validate().is_err());
    }

    #[test]
    fn test_signup_rejects_short_password() {
        let req = SignupRequest {
            email: "student@example.com".to_string(),
            password: "12345".to_string(),
            name: None,
        };
        assert!(req.validate().is_err());
    }

    #[test]
    fn test_login_accepts_malformed_email() {
        // Login never validates email shape; auth decides.
        let req = LoginRequest {
            email: "whatever".to_string(),
            password: "pw".to_string(),
        };
        assert!(req.validate().is_ok());
    }

    #[test]
    fn test_avatar_data_must_be_image_uri() {
        let req = UpdateProfileRequest {
            name: None,
            school: None,
            phone: None,
            avatar_data: Some("http://evil.example/x.png".to_string()),
        };
        assert!(req.validate().is_err());

        let ok = UpdateProfileRequest {
            name: None,
            school: None,
            phone: None,
            avatar_data: Some("data:image/png;base64,iVBORw0KGgo=".to_string()),
        };
        assert!(ok.validate().is_ok());
    }

    #[test]
    fn test_user_serialization_skips_hash() {
        let user = User {
            id: 1,
            email: "a@b.c".to_string(),
            password_hash: "secret".to_string(),
            name: "A".to_string(),
            school: None,
            phone: None,
            avatar_data: None,
            created_at: None,
            updated_at: None,
        };
        let json = serde_json::to_string(&user).unwrap();
        assert!(!json.contains("secret"));
    }
}
