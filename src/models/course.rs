// src/models/course.rs

use serde::{Deserialize, Serialize};
use sqlx::FromRow;

/// Represents the 'courses' table in the database.
#[derive(Debug, Clone, FromRow, Serialize, Deserialize)]
pub struct Course {
    pub id: i64,

    pub title: String,

    pub is_active: bool,

    /// The designated final exam gating certification. A course without
    /// one can never become certificate-eligible.
    pub final_exam_id: Option<i64>,

    pub created_at: Option<chrono::DateTime<chrono::Utc>>,
}

/// Represents the 'modules' table in the database.
/// Module content itself is managed outside this core; only identity,
/// ordering and publication state matter here.
#[derive(Debug, Clone, FromRow, Serialize, Deserialize)]
pub struct Module {
    pub id: i64,
    pub course_id: i64,
    pub title: String,
    pub position: i64,
    pub is_published: bool,
}

/// Represents the 'module_completions' table in the database.
/// Written by the module-viewing flow, consumed read-only by
/// certificate eligibility.
#[derive(Debug, Clone, FromRow, Serialize, Deserialize)]
pub struct ModuleCompletion {
    pub id: i64,
    pub account_id: i64,
    pub module_id: i64,
    pub completed_at: chrono::DateTime<chrono::Utc>,
}

/// Aggregated progress of one student in one course.
#[derive(Debug, Serialize)]
pub struct CourseProgress {
    pub course_id: i64,
    pub total_modules: i64,
    pub completed_modules: i64,
    pub has_passed_final_exam: bool,
    pub eligible_for_certificate: bool,
}
