// src/handlers/auth.rs

use axum::{Json, extract::State, http::StatusCode, response::IntoResponse};
use serde_json::json;
use sqlx::SqlitePool;
use validator::Validate;

use crate::{
    config::Config,
    error::{AppError, is_unique_violation},
    models::account::{
        Account, CompleteProfileRequest, LoginRequest, ReconcileResponse, RegisterRequest,
    },
    services::reconcile::{self, ReconcileAction, VerifiedClaim},
    utils::{
        hash::{hash_password, verify_password},
        html::clean_text,
        jwt::sign_jwt,
    },
};

const ACCOUNT_RETURNING: &str = r#"
    RETURNING id, username, password, email, external_subject, display_name,
              role, is_verified, verified_at, profile_complete, created_at
"#;

async fn fetch_by_id(pool: &SqlitePool, id: i64) -> Result<Option<Account>, AppError> {
    let account = sqlx::query_as::<_, Account>(
        r#"
        SELECT id, username, password, email, external_subject, display_name,
               role, is_verified, verified_at, profile_complete, created_at
        FROM accounts
        WHERE id = $1
        "#,
    )
    .bind(id)
    .fetch_optional(pool)
    .await?;
    Ok(account)
}

async fn fetch_by_subject(pool: &SqlitePool, subject: &str) -> Result<Option<Account>, AppError> {
    let account = sqlx::query_as::<_, Account>(
        r#"
        SELECT id, username, password, email, external_subject, display_name,
               role, is_verified, verified_at, profile_complete, created_at
        FROM accounts
        WHERE external_subject = $1
        "#,
    )
    .bind(subject)
    .fetch_optional(pool)
    .await?;
    Ok(account)
}

async fn fetch_by_email(pool: &SqlitePool, email: &str) -> Result<Option<Account>, AppError> {
    let account = sqlx::query_as::<_, Account>(
        r#"
        SELECT id, username, password, email, external_subject, display_name,
               role, is_verified, verified_at, profile_complete, created_at
        FROM accounts
        WHERE email = $1
        "#,
    )
    .bind(email)
    .fetch_optional(pool)
    .await?;
    Ok(account)
}

/// Registers a new account.
///
/// Hashes the password using Argon2 before storing it. The account
/// starts unverified; an admin must approve it before login succeeds.
/// Returns 201 Created and the account object (excluding the hash).
pub async fn register(
    State(pool): State<SqlitePool>,
    Json(payload): Json<RegisterRequest>,
) -> Result<impl IntoResponse, AppError> {
    if let Err(validation_errors) = payload.validate() {
        return Err(AppError::BadRequest(validation_errors.to_string()));
    }

    let hashed_password = hash_password(&payload.password)?;

    let account = sqlx::query_as::<_, Account>(&format!(
        r#"
        INSERT INTO accounts (username, password, email)
        VALUES ($1, $2, $3)
        {ACCOUNT_RETURNING}
        "#
    ))
    .bind(&payload.username)
    .bind(&hashed_password)
    .bind(&payload.email)
    .fetch_one(&pool)
    .await
    .map_err(|e| {
        if is_unique_violation(&e) {
            AppError::Conflict(format!("Username '{}' or email already exists", payload.username))
        } else {
            tracing::error!("Failed to register account: {:?}", e);
            AppError::from(e)
        }
    })?;

    Ok((StatusCode::CREATED, Json(account)))
}

/// Authenticates an account by password and returns a JWT token.
///
/// Unverified accounts are refused with a pending-verification outcome;
/// federated-only accounts (no stored password) cannot log in here.
pub async fn login(
    State(pool): State<SqlitePool>,
    State(config): State<Config>,
    Json(payload): Json<LoginRequest>,
) -> Result<impl IntoResponse, AppError> {
    if let Err(validation_errors) = payload.validate() {
        return Err(AppError::BadRequest(validation_errors.to_string()));
    }

    let account = sqlx::query_as::<_, Account>(
        r#"
        SELECT id, username, password, email, external_subject, display_name,
               role, is_verified, verified_at, profile_complete, created_at
        FROM accounts
        WHERE username = $1
        "#,
    )
    .bind(&payload.username)
    .fetch_optional(&pool)
    .await
    .map_err(|e| {
        tracing::error!("Login DB error: {:?}", e);
        AppError::InternalServerError(e.to_string())
    })?;

    let account = account.ok_or(AppError::AuthError("Account not found".to_string()))?;

    let stored_hash = account.password.as_deref().ok_or(AppError::AuthError(
        "This account signs in through its identity provider".to_string(),
    ))?;

    let is_valid = verify_password(&payload.password, stored_hash)?;

    if !is_valid {
        return Err(AppError::AuthError("Invalid password".to_string()));
    }

    if !account.is_verified {
        return Err(AppError::PendingVerification(
            "Account is pending verification by the administrator".to_string(),
        ));
    }

    let token = sign_jwt(
        account.id,
        &account.role,
        &config.jwt_secret,
        config.jwt_expiration,
    )?;

    Ok(Json(json!({
        "token": token,
        "type": "Bearer",
        "account": account,
    })))
}

/// Maps a resolved account to the reconciliation surface outcome.
/// Only a verified account with a complete profile receives a token.
fn reconcile_outcome(account: Account, config: &Config) -> Result<ReconcileResponse, AppError> {
    if !account.profile_complete {
        return Ok(ReconcileResponse::NeedsProfile { account });
    }
    if !account.is_verified {
        return Ok(ReconcileResponse::PendingVerification { account });
    }
    let token = sign_jwt(
        account.id,
        &account.role,
        &config.jwt_secret,
        config.jwt_expiration,
    )?;
    Ok(ReconcileResponse::LoggedIn { token, account })
}

/// Reconciles a verified federated identity claim to a local account.
///
/// The decision (login / merge-by-email / create) is a pure function in
/// `services::reconcile`; this handler executes it with check-then-act
/// guarded by the uniqueness constraints on external_subject and email.
/// A lost race (concurrent reconciliation of the same claim) re-reads
/// and re-decides instead of creating a duplicate account.
pub async fn federated_login(
    State(pool): State<SqlitePool>,
    State(config): State<Config>,
    Json(payload): Json<VerifiedClaim>,
) -> Result<impl IntoResponse, AppError> {
    if let Err(validation_errors) = payload.validate() {
        return Err(AppError::BadRequest(validation_errors.to_string()));
    }

    let display_name = payload.display_name.as_deref().map(clean_text);

    for _ in 0..2 {
        let by_subject = fetch_by_subject(&pool, &payload.external_subject).await?;
        let by_email = fetch_by_email(&pool, &payload.email).await?;

        let action = reconcile::decide(&payload, by_subject.as_ref(), by_email.as_ref())?;

        match action {
            ReconcileAction::Login { account_id } => {
                let account = fetch_by_id(&pool, account_id)
                    .await?
                    .ok_or(AppError::NotFound("Account not found".to_string()))?;
                return Ok(Json(reconcile_outcome(account, &config)?));
            }

            ReconcileAction::BindEmailMatch {
                account_id,
                username,
            } => {
                // One-time merge: the guard on external_subject IS NULL makes
                // the bind a compare-and-set, and the unique index on
                // external_subject rejects a concurrent bind elsewhere.
                let result = sqlx::query(
                    r#"
                    UPDATE accounts
                    SET external_subject = $1, username = $2
                    WHERE id = $3 AND external_subject IS NULL
                    "#,
                )
                .bind(&payload.external_subject)
                .bind(&username)
                .bind(account_id)
                .execute(&pool)
                .await;

                match result {
                    Ok(done) if done.rows_affected() == 1 => {
                        tracing::info!(
                            "Bound federated subject to account {} (username rewritten)",
                            account_id
                        );
                        let account = fetch_by_id(&pool, account_id)
                            .await?
                            .ok_or(AppError::NotFound("Account not found".to_string()))?;
                        return Ok(Json(reconcile_outcome(account, &config)?));
                    }
                    // Someone else bound a subject to this account first:
                    // re-read and re-decide (may now be Login or a conflict).
                    Ok(_) => continue,
                    Err(e) if is_unique_violation(&e) => continue,
                    Err(e) => {
                        tracing::error!("Failed to bind federated subject: {:?}", e);
                        return Err(AppError::from(e));
                    }
                }
            }

            ReconcileAction::CreateAccount { username } => {
                let result = sqlx::query_as::<_, Account>(&format!(
                    r#"
                    INSERT INTO accounts
                        (username, email, external_subject, display_name, profile_complete)
                    VALUES ($1, $2, $3, $4, FALSE)
                    {ACCOUNT_RETURNING}
                    "#
                ))
                .bind(&username)
                .bind(&payload.email)
                .bind(&payload.external_subject)
                .bind(&display_name)
                .fetch_one(&pool)
                .await;

                match result {
                    Ok(account) => {
                        return Ok(Json(ReconcileResponse::NeedsProfile { account }));
                    }
                    // A concurrent reconciliation of the same claim created
                    // the account first: re-read and resolve as a login.
                    Err(e) if is_unique_violation(&e) => continue,
                    Err(e) => {
                        tracing::error!("Failed to create federated account: {:?}", e);
                        return Err(AppError::from(e));
                    }
                }
            }
        }
    }

    Err(AppError::Conflict(
        "Reconciliation raced a concurrent update; please retry".to_string(),
    ))
}

/// Completes the profile of a reconciled account and reports where the
/// login flow stands afterwards (usually pending verification).
pub async fn complete_profile(
    State(pool): State<SqlitePool>,
    State(config): State<Config>,
    Json(payload): Json<CompleteProfileRequest>,
) -> Result<impl IntoResponse, AppError> {
    if let Err(validation_errors) = payload.validate() {
        return Err(AppError::BadRequest(validation_errors.to_string()));
    }

    let display_name = clean_text(&payload.display_name);

    let account = sqlx::query_as::<_, Account>(&format!(
        r#"
        UPDATE accounts
        SET display_name = $1, profile_complete = TRUE
        WHERE external_subject = $2
        {ACCOUNT_RETURNING}
        "#
    ))
    .bind(&display_name)
    .bind(&payload.external_subject)
    .fetch_optional(&pool)
    .await?
    .ok_or(AppError::NotFound("Account not found".to_string()))?;

    Ok(Json(reconcile_outcome(account, &config)?))
}
