// src/handlers/exam.rs

use axum::{
    Extension, Json,
    extract::{Path, State},
    http::StatusCode,
    response::IntoResponse,
};
use chrono::{DateTime, Utc};
use sqlx::SqlitePool;

use crate::{
    error::{AppError, is_unique_violation},
    models::{
        attempt::{Attempt, AttemptStatus, SubmitAttemptRequest, SubmitAttemptResponse},
        exam::{Exam, ExamPaper, PublicQuestion, Question},
    },
    services::grading::{self, KeyEntry},
    utils::jwt::Claims,
};

/// Helper struct for fetching answer keys from the database.
#[derive(sqlx::FromRow)]
struct AnswerKeyRow {
    id: i64,
    correct: sqlx::types::Json<Vec<i64>>,
    weight: i64,
    explanation: Option<String>,
}

const ATTEMPT_COLUMNS: &str = r#"
    id, account_id, exam_id, started_at, deadline, status,
    submitted_at, answers, score_percent, passed, breakdown
"#;

async fn fetch_exam(pool: &SqlitePool, exam_id: i64) -> Result<Exam, AppError> {
    sqlx::query_as::<_, Exam>(
        r#"
        SELECT id, course_id, title, duration_minutes, passing_percent, created_at
        FROM exams
        WHERE id = $1
        "#,
    )
    .bind(exam_id)
    .fetch_optional(pool)
    .await?
    .ok_or(AppError::NotFound("Exam not found".to_string()))
}

async fn fetch_attempt(pool: &SqlitePool, attempt_id: i64) -> Result<Option<Attempt>, AppError> {
    let attempt = sqlx::query_as::<_, Attempt>(&format!(
        r#"
        SELECT {ATTEMPT_COLUMNS}
        FROM attempts
        WHERE id = $1
        "#
    ))
    .bind(attempt_id)
    .fetch_optional(pool)
    .await?;
    Ok(attempt)
}

/// Loads an exam's answer key in question order.
async fn load_answer_key(pool: &SqlitePool, exam_id: i64) -> Result<Vec<KeyEntry>, AppError> {
    let rows = sqlx::query_as::<_, AnswerKeyRow>(
        r#"
        SELECT q.id, q.correct, q.weight, q.explanation
        FROM questions q
        JOIN exam_questions eq ON eq.question_id = q.id
        WHERE eq.exam_id = $1
        ORDER BY eq.position
        "#,
    )
    .bind(exam_id)
    .fetch_all(pool)
    .await?;

    Ok(rows
        .into_iter()
        .map(|r| KeyEntry {
            question_id: r.id,
            correct: r.correct.0,
            weight: r.weight,
            explanation: r.explanation,
        })
        .collect())
}

/// Transitions one overdue in_progress attempt to expired.
///
/// Idempotent housekeeping: a single compare-and-set on status, safe to
/// call concurrently from the periodic sweep and from on-read checks
/// without double-transitioning. Returns whether a transition happened.
pub async fn reap_attempt(
    pool: &SqlitePool,
    attempt_id: i64,
    now: DateTime<Utc>,
) -> Result<bool, AppError> {
    let done = sqlx::query(
        r#"
        UPDATE attempts
        SET status = 'expired'
        WHERE id = $1 AND status = 'in_progress' AND deadline < $2
        "#,
    )
    .bind(attempt_id)
    .bind(now)
    .execute(pool)
    .await?;

    Ok(done.rows_affected() > 0)
}

/// Expires every overdue in_progress attempt. Run periodically from the
/// background sweeper; correctness never depends on it actually running
/// because readers reap defensively first.
pub async fn sweep_expired(pool: &SqlitePool, now: DateTime<Utc>) -> Result<u64, AppError> {
    let done = sqlx::query(
        r#"
        UPDATE attempts
        SET status = 'expired'
        WHERE status = 'in_progress' AND deadline < $1
        "#,
    )
    .bind(now)
    .execute(pool)
    .await?;

    Ok(done.rows_affected())
}

/// Expires overdue in_progress attempts of one (account, exam) pair.
async fn reap_pair(
    pool: &SqlitePool,
    account_id: i64,
    exam_id: i64,
    now: DateTime<Utc>,
) -> Result<(), AppError> {
    sqlx::query(
        r#"
        UPDATE attempts
        SET status = 'expired'
        WHERE account_id = $1 AND exam_id = $2
          AND status = 'in_progress' AND deadline < $3
        "#,
    )
    .bind(account_id)
    .bind(exam_id)
    .bind(now)
    .execute(pool)
    .await?;
    Ok(())
}

/// Returns the exam paper: metadata plus questions with the answer key
/// and explanations withheld.
pub async fn get_exam(
    State(pool): State<SqlitePool>,
    Path(exam_id): Path<i64>,
) -> Result<impl IntoResponse, AppError> {
    let exam = fetch_exam(&pool, exam_id).await?;

    let questions = sqlx::query_as::<_, Question>(
        r#"
        SELECT q.id, q.prompt, q.options, q.correct, q.explanation, q.weight, q.created_at
        FROM questions q
        JOIN exam_questions eq ON eq.question_id = q.id
        WHERE eq.exam_id = $1
        ORDER BY eq.position
        "#,
    )
    .bind(exam_id)
    .fetch_all(&pool)
    .await
    .map_err(|e| {
        tracing::error!("Failed to fetch exam questions: {:?}", e);
        AppError::InternalServerError(e.to_string())
    })?;

    let paper = ExamPaper {
        exam,
        questions: questions.into_iter().map(PublicQuestion::from).collect(),
    };

    Ok(Json(paper))
}

/// Starts a timed attempt for the calling student.
///
/// The deadline is fixed now and stored; expiry is always recomputed
/// from it. The partial unique index on (account, exam, in_progress)
/// makes the insert an atomic "at most one open attempt" check.
pub async fn start_attempt(
    State(pool): State<SqlitePool>,
    Extension(claims): Extension<Claims>,
    Path(exam_id): Path<i64>,
) -> Result<impl IntoResponse, AppError> {
    let exam = fetch_exam(&pool, exam_id).await?;
    let account_id = claims.account_id();

    let total_weight: i64 = sqlx::query_scalar(
        r#"
        SELECT COALESCE(SUM(q.weight), 0)
        FROM questions q
        JOIN exam_questions eq ON eq.question_id = q.id
        WHERE eq.exam_id = $1
        "#,
    )
    .bind(exam_id)
    .fetch_one(&pool)
    .await?;

    if total_weight <= 0 {
        return Err(AppError::InvalidExam(
            "Exam has no gradable questions".to_string(),
        ));
    }

    let now = Utc::now();

    // A stale open attempt whose deadline already passed must not block
    // a new start; expire it first.
    reap_pair(&pool, account_id, exam_id, now).await?;

    let deadline = now + chrono::Duration::minutes(exam.duration_minutes);

    let attempt = sqlx::query_as::<_, Attempt>(&format!(
        r#"
        INSERT INTO attempts (account_id, exam_id, started_at, deadline, status)
        VALUES ($1, $2, $3, $4, 'in_progress')
        RETURNING {ATTEMPT_COLUMNS}
        "#
    ))
    .bind(account_id)
    .bind(exam_id)
    .bind(now)
    .bind(deadline)
    .fetch_one(&pool)
    .await
    .map_err(|e| {
        if is_unique_violation(&e) {
            AppError::AlreadyInProgress(
                "An attempt for this exam is already in progress".to_string(),
            )
        } else {
            tracing::error!("Failed to start attempt: {:?}", e);
            AppError::from(e)
        }
    })?;

    Ok((StatusCode::CREATED, Json(attempt)))
}

/// Submits a student's answers and grades them synchronously.
///
/// A submission after the deadline never grades: the attempt is
/// expired, the answers are discarded, and the caller is told so.
pub async fn submit_attempt(
    State(pool): State<SqlitePool>,
    Extension(claims): Extension<Claims>,
    Path(attempt_id): Path<i64>,
    Json(req): Json<SubmitAttemptRequest>,
) -> Result<impl IntoResponse, AppError> {
    let attempt = fetch_attempt(&pool, attempt_id)
        .await?
        .ok_or(AppError::NotFound("Attempt not found".to_string()))?;

    if attempt.account_id != claims.account_id() {
        return Err(AppError::NotFound("Attempt not found".to_string()));
    }

    match attempt.status {
        AttemptStatus::InProgress => {}
        AttemptStatus::Submitted => {
            return Err(AppError::WrongState(
                "Attempt has already been submitted".to_string(),
            ));
        }
        AttemptStatus::Expired => {
            return Err(AppError::WrongState("Attempt has expired".to_string()));
        }
    }

    let now = Utc::now();

    if now > attempt.deadline {
        reap_attempt(&pool, attempt.id, now).await?;
        return Err(AppError::Expired(
            "Attempt deadline has passed; answers were not graded".to_string(),
        ));
    }

    let passing_percent: i64 =
        sqlx::query_scalar("SELECT passing_percent FROM exams WHERE id = $1")
            .bind(attempt.exam_id)
            .fetch_one(&pool)
            .await?;

    let key = load_answer_key(&pool, attempt.exam_id).await?;
    let outcome = grading::grade(&key, &req.answers, passing_percent)?;

    // Compare-and-set on status: only one transition out of in_progress
    // can win, whether racing a duplicate submit or the expiry sweep.
    let done = sqlx::query(
        r#"
        UPDATE attempts
        SET status = 'submitted', submitted_at = $1, answers = $2,
            score_percent = $3, passed = $4, breakdown = $5
        WHERE id = $6 AND status = 'in_progress'
        "#,
    )
    .bind(now)
    .bind(sqlx::types::Json(&req.answers))
    .bind(outcome.score_percent)
    .bind(outcome.passed)
    .bind(sqlx::types::Json(&outcome.breakdown))
    .bind(attempt.id)
    .execute(&pool)
    .await?;

    if done.rows_affected() == 0 {
        let current = fetch_attempt(&pool, attempt.id)
            .await?
            .ok_or(AppError::NotFound("Attempt not found".to_string()))?;
        return Err(match current.status {
            AttemptStatus::Expired => {
                AppError::Expired("Attempt deadline has passed; answers were not graded".to_string())
            }
            _ => AppError::WrongState("Attempt has already been submitted".to_string()),
        });
    }

    tracing::info!(
        "Attempt {} submitted: {}% ({})",
        attempt.id,
        outcome.score_percent,
        if outcome.passed { "passed" } else { "failed" }
    );

    Ok(Json(SubmitAttemptResponse {
        attempt_id: attempt.id,
        status: AttemptStatus::Submitted,
        score_percent: outcome.score_percent,
        passed: outcome.passed,
        breakdown: outcome.breakdown,
    }))
}

/// Returns one attempt, including the graded review once submitted.
/// The expiry check runs defensively before the read so a stale
/// in_progress row is never reported as still open.
pub async fn get_attempt(
    State(pool): State<SqlitePool>,
    Extension(claims): Extension<Claims>,
    Path(attempt_id): Path<i64>,
) -> Result<impl IntoResponse, AppError> {
    let mut attempt = fetch_attempt(&pool, attempt_id)
        .await?
        .ok_or(AppError::NotFound("Attempt not found".to_string()))?;

    if attempt.account_id != claims.account_id() {
        return Err(AppError::NotFound("Attempt not found".to_string()));
    }

    let now = Utc::now();
    if attempt.status == AttemptStatus::InProgress && now > attempt.deadline {
        reap_attempt(&pool, attempt.id, now).await?;
        attempt = fetch_attempt(&pool, attempt.id)
            .await?
            .ok_or(AppError::NotFound("Attempt not found".to_string()))?;
    }

    Ok(Json(attempt))
}

/// Lists the calling student's attempts against one exam, newest first.
pub async fn list_my_attempts(
    State(pool): State<SqlitePool>,
    Extension(claims): Extension<Claims>,
    Path(exam_id): Path<i64>,
) -> Result<impl IntoResponse, AppError> {
    let account_id = claims.account_id();
    reap_pair(&pool, account_id, exam_id, Utc::now()).await?;

    let attempts = sqlx::query_as::<_, Attempt>(&format!(
        r#"
        SELECT {ATTEMPT_COLUMNS}
        FROM attempts
        WHERE account_id = $1 AND exam_id = $2
        ORDER BY started_at DESC, id DESC
        "#
    ))
    .bind(account_id)
    .bind(exam_id)
    .fetch_all(&pool)
    .await?;

    Ok(Json(attempts))
}
