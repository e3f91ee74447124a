// src/models/exam.rs

use serde::{Deserialize, Serialize};
use sqlx::{prelude::FromRow, types::Json};

/// Represents the 'exams' table in the database.
///
/// An exam is immutable once attempts exist against it, except for
/// question additions that do not affect already-finished attempts.
#[derive(Debug, Clone, FromRow, Serialize, Deserialize)]
pub struct Exam {
    pub id: i64,

    pub course_id: i64,

    pub title: String,

    /// Attempt time limit. The deadline of an attempt is always
    /// `started_at + duration_minutes`, recomputed from storage.
    pub duration_minutes: i64,

    /// Passing threshold as an integer percentage (0-100).
    pub passing_percent: i64,

    pub created_at: Option<chrono::DateTime<chrono::Utc>>,
}

/// Represents the 'questions' table in the database.
#[derive(Debug, Clone, FromRow, Serialize, Deserialize)]
pub struct Question {
    pub id: i64,

    pub prompt: String,

    /// List of options (e.g., ["Option A", "Option B"]).
    /// Stored as a JSON array in the database.
    pub options: Json<Vec<String>>,

    /// Indexes of the correct option(s). A single-choice question has
    /// one entry, a multiple-choice question has several.
    pub correct: Json<Vec<i64>>,

    /// Explanation shown in the post-submission review.
    pub explanation: Option<String>,

    /// Point weight used in percentage scoring.
    pub weight: i64,

    pub created_at: Option<chrono::DateTime<chrono::Utc>>,
}

/// DTO for sending a question to the client while taking an exam
/// (excludes the answer key and explanation).
#[derive(Debug, Serialize)]
pub struct PublicQuestion {
    pub id: i64,
    pub prompt: String,
    pub options: Json<Vec<String>>,
    pub weight: i64,
}

impl From<Question> for PublicQuestion {
    fn from(q: Question) -> Self {
        PublicQuestion {
            id: q.id,
            prompt: q.prompt,
            options: q.options,
            weight: q.weight,
        }
    }
}

/// DTO for returning an exam paper.
#[derive(Debug, Serialize)]
pub struct ExamPaper {
    pub exam: Exam,
    pub questions: Vec<PublicQuestion>,
}
