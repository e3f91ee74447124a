// src/handlers/admin.rs

use axum::{
    Json,
    extract::{Path, State},
    response::IntoResponse,
};
use sqlx::SqlitePool;

use crate::{error::AppError, models::account::Account};

/// Lists all accounts in the system.
/// Admin only.
pub async fn list_accounts(State(pool): State<SqlitePool>) -> Result<impl IntoResponse, AppError> {
    let accounts = sqlx::query_as::<_, Account>(
        r#"
        SELECT id, username, password, email, external_subject, display_name,
               role, is_verified, verified_at, profile_complete, created_at
        FROM accounts
        ORDER BY id DESC
        "#,
    )
    .fetch_all(&pool)
    .await
    .map_err(|e| {
        tracing::error!("Failed to list accounts: {:?}", e);
        AppError::InternalServerError(e.to_string())
    })?;

    Ok(Json(accounts))
}

/// Marks an account as verified so it can complete logins.
/// Idempotent: the original verification timestamp is kept on repeats.
/// Admin only.
pub async fn verify_account(
    State(pool): State<SqlitePool>,
    Path(account_id): Path<i64>,
) -> Result<impl IntoResponse, AppError> {
    let account = sqlx::query_as::<_, Account>(
        r#"
        UPDATE accounts
        SET is_verified = TRUE, verified_at = COALESCE(verified_at, $1)
        WHERE id = $2
        RETURNING id, username, password, email, external_subject, display_name,
                  role, is_verified, verified_at, profile_complete, created_at
        "#,
    )
    .bind(chrono::Utc::now())
    .bind(account_id)
    .fetch_optional(&pool)
    .await?
    .ok_or(AppError::NotFound("Account not found".to_string()))?;

    tracing::info!("Account {} verified by admin", account.id);

    Ok(Json(account))
}
