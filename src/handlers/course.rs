// src/handlers/course.rs

use std::collections::HashSet;

use axum::{
    Extension, Json,
    extract::{Path, State},
    response::IntoResponse,
};
use sqlx::SqlitePool;

use crate::{
    error::AppError,
    models::course::{Course, CourseProgress, Module},
    services::eligibility::{self, FinalExamAttempt},
    utils::jwt::Claims,
};

pub(crate) async fn fetch_course(pool: &SqlitePool, course_id: i64) -> Result<Course, AppError> {
    sqlx::query_as::<_, Course>(
        r#"
        SELECT id, title, is_active, final_exam_id, created_at
        FROM courses
        WHERE id = $1
        "#,
    )
    .bind(course_id)
    .fetch_optional(pool)
    .await?
    .ok_or(AppError::NotFound("Course not found".to_string()))
}

/// Everything eligibility needs for one (account, course) pair, read
/// fresh from storage on every evaluation.
pub(crate) struct ProgressSnapshot {
    pub required: HashSet<i64>,
    pub completed: HashSet<i64>,
    pub final_attempts: Vec<FinalExamAttempt>,
}

pub(crate) async fn snapshot_progress(
    pool: &SqlitePool,
    account_id: i64,
    course: &Course,
) -> Result<ProgressSnapshot, AppError> {
    let required: Vec<i64> = sqlx::query_scalar(
        r#"
        SELECT id FROM modules
        WHERE course_id = $1 AND is_published = TRUE
        "#,
    )
    .bind(course.id)
    .fetch_all(pool)
    .await?;

    let completed: Vec<i64> = sqlx::query_scalar(
        r#"
        SELECT mc.module_id
        FROM module_completions mc
        JOIN modules m ON m.id = mc.module_id
        WHERE mc.account_id = $1 AND m.course_id = $2
        "#,
    )
    .bind(account_id)
    .bind(course.id)
    .fetch_all(pool)
    .await?;

    let final_attempts = match course.final_exam_id {
        Some(exam_id) => sqlx::query_as::<_, (crate::models::attempt::AttemptStatus, Option<bool>)>(
            r#"
            SELECT status, passed FROM attempts
            WHERE account_id = $1 AND exam_id = $2
            "#,
        )
        .bind(account_id)
        .bind(exam_id)
        .fetch_all(pool)
        .await?
        .into_iter()
        .map(|(status, passed)| FinalExamAttempt { status, passed })
        .collect(),
        // No designated final exam: nothing can ever satisfy the exam
        // condition, so the course is not certifiable.
        None => Vec::new(),
    };

    Ok(ProgressSnapshot {
        required: required.into_iter().collect(),
        completed: completed.into_iter().collect(),
        final_attempts,
    })
}

/// Records that the calling student finished a module. Idempotent: the
/// (account, module) pair is unique and repeats are ignored.
pub async fn complete_module(
    State(pool): State<SqlitePool>,
    Extension(claims): Extension<Claims>,
    Path(module_id): Path<i64>,
) -> Result<impl IntoResponse, AppError> {
    let module = sqlx::query_as::<_, Module>(
        r#"
        SELECT id, course_id, title, position, is_published
        FROM modules
        WHERE id = $1 AND is_published = TRUE
        "#,
    )
    .bind(module_id)
    .fetch_optional(&pool)
    .await?
    .ok_or(AppError::NotFound("Module not found".to_string()))?;

    sqlx::query(
        r#"
        INSERT INTO module_completions (account_id, module_id, completed_at)
        VALUES ($1, $2, $3)
        ON CONFLICT (account_id, module_id) DO NOTHING
        "#,
    )
    .bind(claims.account_id())
    .bind(module.id)
    .bind(chrono::Utc::now())
    .execute(&pool)
    .await
    .map_err(|e| {
        tracing::error!("Failed to record module completion: {:?}", e);
        AppError::InternalServerError(e.to_string())
    })?;

    Ok(Json(serde_json::json!({
        "module_id": module.id,
        "completed": true,
    })))
}

/// Reports module progress, final-exam state and the derived
/// certificate eligibility for the calling student.
pub async fn course_progress(
    State(pool): State<SqlitePool>,
    Extension(claims): Extension<Claims>,
    Path(course_id): Path<i64>,
) -> Result<impl IntoResponse, AppError> {
    let course = fetch_course(&pool, course_id).await?;
    let snapshot = snapshot_progress(&pool, claims.account_id(), &course).await?;

    let has_passed_final_exam = snapshot.final_attempts.iter().any(|a| {
        a.status == crate::models::attempt::AttemptStatus::Submitted && a.passed == Some(true)
    });

    let eligible = eligibility::is_eligible(
        &snapshot.required,
        &snapshot.completed,
        &snapshot.final_attempts,
    );

    Ok(Json(CourseProgress {
        course_id: course.id,
        total_modules: snapshot.required.len() as i64,
        completed_modules: snapshot.required.intersection(&snapshot.completed).count() as i64,
        has_passed_final_exam,
        eligible_for_certificate: eligible,
    }))
}
