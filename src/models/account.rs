// src/models/account.rs

use serde::{Deserialize, Serialize};
use sqlx::FromRow;
use validator::Validate;

/// Represents the 'accounts' table in the database.
///
/// An account is created either through direct registration
/// (username + password) or through federated-identity reconciliation
/// (external_subject, no password).
#[derive(Debug, Clone, FromRow, Serialize, Deserialize)]
pub struct Account {
    pub id: i64,

    /// Unique username. Rewritten to a subject-derived form when a
    /// locally-registered account is merged with a federated identity.
    pub username: String,

    /// Argon2 password hash. NULL for accounts that only ever
    /// authenticated through the identity provider.
    /// Skipped during serialization to prevent leaking sensitive data.
    #[serde(skip)]
    pub password: Option<String>,

    /// Unique when present.
    pub email: Option<String>,

    /// Subject identifier from the external identity provider.
    /// Unique when present; at most one account per subject.
    pub external_subject: Option<String>,

    pub display_name: Option<String>,

    /// Account role: 'student' or 'admin'.
    pub role: String,

    /// Whether an admin has verified this account. Unverified accounts
    /// can be reconciled but cannot complete a login session.
    pub is_verified: bool,

    pub verified_at: Option<chrono::DateTime<chrono::Utc>>,

    /// False for accounts created by reconciliation until the student
    /// completes their profile.
    pub profile_complete: bool,

    pub created_at: Option<chrono::DateTime<chrono::Utc>>,
}

/// DTO for creating a new account (direct registration).
#[derive(Debug, Deserialize, Validate)]
pub struct RegisterRequest {
    #[validate(length(
        min = 3,
        max = 50,
        message = "Username length must be between 3 and 50 characters."
    ))]
    pub username: String,
    #[validate(length(
        min = 4,
        max = 128,
        message = "Password length must be between 4 and 128 characters."
    ))]
    pub password: String,
    #[validate(email(message = "Invalid email address."))]
    pub email: Option<String>,
}

/// DTO for password login.
#[derive(Debug, Deserialize, Validate)]
pub struct LoginRequest {
    #[validate(length(min = 1, max = 50))]
    pub username: String,
    #[validate(length(min = 1, max = 128))]
    pub password: String,
}

/// DTO for completing a reconciled account's profile. Keyed by the
/// verified external subject: the account may not be able to log in
/// yet, so there is no token to key on.
#[derive(Debug, Deserialize, Validate)]
pub struct CompleteProfileRequest {
    #[validate(length(min = 1, max = 255))]
    pub external_subject: String,
    #[validate(length(min = 1, max = 100))]
    pub display_name: String,
}

/// Result of reconciling a verified federated claim.
///
/// Reconciliation success is not login success: only a verified account
/// with a complete profile receives a token.
#[derive(Debug, Serialize)]
#[serde(tag = "outcome", rename_all = "snake_case")]
pub enum ReconcileResponse {
    LoggedIn { token: String, account: Account },
    PendingVerification { account: Account },
    NeedsProfile { account: Account },
}
