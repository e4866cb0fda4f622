//! User data models and onboarding request/response types.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::{error::AppError, models::wallet::WalletResponse};

/// Highest KYC tier a user can reach.
pub const MAX_KYC_LEVEL: i16 = 3;

text_enum! {
    pub enum Role {
        User => "user",
        Admin => "admin",
    }
}

text_enum! {
    pub enum UserStatus {
        Active => "active",
        Suspended => "suspended",
        Closed => "closed",
    }
}

/// Represents a user record from the database.
///
/// # Database Table
///
/// Maps to the `users` table. Each user belongs to exactly one tenant and owns
/// exactly one wallet.
#[derive(Debug, Clone, sqlx::FromRow, Serialize)]
pub struct User {
    pub id: Uuid,

    pub tenant_id: Uuid,

    /// Unique across the platform
    pub email: String,

    pub full_name: String,

    #[sqlx(try_from = "String")]
    pub role: Role,

    #[sqlx(try_from = "String")]
    pub status: UserStatus,

    /// Verified KYC tier, 0 (unverified) to 3
    pub kyc_level: i16,

    pub created_at: DateTime<Utc>,

    pub updated_at: DateTime<Utc>,
}

impl User {
    pub fn is_active(&self) -> bool {
        self.status == UserStatus::Active
    }

    /// Fails with `KycLevelTooLow` unless the user has reached `required`.
    pub fn require_kyc_level(&self, required: i16) -> Result<(), AppError> {
        if self.kyc_level < required {
            return Err(AppError::KycLevelTooLow {
                required,
                current: self.kyc_level,
            });
        }
        Ok(())
    }
}

/// Request body for the public signup endpoint.
///
/// # JSON Example
///
/// ```json
/// {
///   "tenant_id": "550e8400-e29b-41d4-a716-446655440000",
///   "email": "ada@example.com",
///   "full_name": "Ada Obi"
/// }
/// ```
#[derive(Debug, Deserialize)]
pub struct SignupRequest {
    pub tenant_id: Uuid,
    pub email: String,
    pub full_name: String,
}

impl SignupRequest {
    /// Trim inputs and check them; emails are lower-cased.
    pub fn normalized(self) -> Result<Self, AppError> {
        let email = self.email.trim().to_lowercase();
        let full_name = self.full_name.trim().to_string();

        if !is_plausible_email(&email) {
            return Err(AppError::InvalidRequest("Invalid email address".to_string()));
        }
        if full_name.is_empty() || full_name.len() > 200 {
            return Err(AppError::InvalidRequest(
                "Full name must be between 1 and 200 characters".to_string(),
            ));
        }

        Ok(Self {
            tenant_id: self.tenant_id,
            email,
            full_name,
        })
    }
}

fn is_plausible_email(email: &str) -> bool {
    if email.len() > 254 || email.chars().any(char::is_whitespace) {
        return false;
    }
    match email.split_once('@') {
        Some((local, domain)) => {
            !local.is_empty() && domain.contains('.') && !domain.starts_with('.') && !domain.ends_with('.')
        }
        None => false,
    }
}

/// Response body for signup.
///
/// The `api_key` is returned only here; it cannot be recovered later.
#[derive(Debug, Serialize)]
pub struct SignupResponse {
    pub user: User,
    pub wallet: WalletResponse,
    pub api_key: String,
}

/// Request body for `PATCH /admin/users/{id}/status`.
#[derive(Debug, Deserialize)]
pub struct UpdateUserStatusRequest {
    pub status: UserStatus,
}

/// Query string for `GET /admin/users`.
#[derive(Debug, Deserialize)]
pub struct ListUsersQuery {
    pub tenant_id: Option<Uuid>,
    pub status: Option<UserStatus>,
    pub limit: Option<i64>,
    pub offset: Option<i64>,
}

#[cfg(test)]
mod tests {
    use super::*;

    fn user(kyc_level: i16) -> User {
        User {
            id: Uuid::new_v4(),
            tenant_id: Uuid::new_v4(),
            email: "ada@example.com".into(),
            full_name: "Ada Obi".into(),
            role: Role::User,
            status: UserStatus::Active,
            kyc_level,
            created_at: Utc::now(),
            updated_at: Utc::now(),
        }
    }

    #[test]
    fn signup_normalizes_email_and_name() {
        let req = SignupRequest {
            tenant_id: Uuid::new_v4(),
            email: "  Ada@Example.COM ".into(),
            full_name: " Ada Obi ".into(),
        }
        .normalized()
        .unwrap();

        assert_eq!(req.email, "ada@example.com");
        assert_eq!(req.full_name, "Ada Obi");
    }

    #[test]
    fn signup_rejects_bad_emails() {
        for email in ["", "ada", "ada@", "@example.com", "ada@example", "a da@example.com"] {
            let req = SignupRequest {
                tenant_id: Uuid::new_v4(),
                email: email.into(),
                full_name: "Ada".into(),
            };
            assert!(req.normalized().is_err(), "{email} should be rejected");
        }
    }

    #[test]
    fn kyc_requirement_compares_levels() {
        assert!(user(2).require_kyc_level(2).is_ok());
        assert!(matches!(
            user(0).require_kyc_level(1),
            Err(AppError::KycLevelTooLow { required: 1, current: 0 })
        ));
    }
}
