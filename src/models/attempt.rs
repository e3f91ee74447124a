// src/models/attempt.rs

use serde::{Deserialize, Serialize};
use sqlx::{prelude::FromRow, types::Json};
use std::collections::HashMap;

/// Lifecycle state of an attempt: in_progress is the only non-terminal
/// state; submitted and expired are terminal.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, sqlx::Type)]
#[serde(rename_all = "snake_case")]
#[sqlx(rename_all = "snake_case")]
pub enum AttemptStatus {
    InProgress,
    Submitted,
    Expired,
}

/// Represents the 'attempts' table in the database.
///
/// One timed instance of a student taking an exam. Never deleted;
/// finished attempts are the audit trail behind eligibility.
#[derive(Debug, Clone, FromRow, Serialize, Deserialize)]
pub struct Attempt {
    pub id: i64,

    pub account_id: i64,

    pub exam_id: i64,

    pub started_at: chrono::DateTime<chrono::Utc>,

    /// started_at + exam duration. The server deadline alone governs
    /// expiry; client-reported elapsed time is never trusted.
    pub deadline: chrono::DateTime<chrono::Utc>,

    pub status: AttemptStatus,

    pub submitted_at: Option<chrono::DateTime<chrono::Utc>>,

    /// Submitted answers: question id -> selected option index(es).
    /// NULL until submitted; stays NULL on expiry (answers discarded).
    pub answers: Option<Json<HashMap<i64, Vec<i64>>>>,

    /// Rounded integer percentage. NULL until graded; an expired
    /// attempt has no score, which is distinct from scoring zero.
    pub score_percent: Option<i64>,

    pub passed: Option<bool>,

    /// Ordered graded review, snapshotted at grading time so later
    /// question edits cannot rewrite the history of this attempt.
    pub breakdown: Option<Json<Vec<QuestionResult>>>,
}

/// One row of the graded review.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct QuestionResult {
    pub question_id: i64,
    /// What the student picked; None if unanswered.
    pub selected: Option<Vec<i64>>,
    pub correct: Vec<i64>,
    pub was_correct: bool,
    pub weight: i64,
    pub explanation: Option<String>,
}

/// DTO for submitting an attempt.
#[derive(Debug, Deserialize)]
pub struct SubmitAttemptRequest {
    /// Question ID -> selected option index(es).
    pub answers: HashMap<i64, Vec<i64>>,
}

/// DTO returned from a successful submission.
#[derive(Debug, Serialize)]
pub struct SubmitAttemptResponse {
    pub attempt_id: i64,
    pub status: AttemptStatus,
    pub score_percent: i64,
    pub passed: bool,
    pub breakdown: Vec<QuestionResult>,
}
