// src/services/eligibility.rs

use std::collections::HashSet;

use crate::models::attempt::AttemptStatus;

/// Status and outcome of one attempt against a course's final exam.
#[derive(Debug, Clone, Copy)]
pub struct FinalExamAttempt {
    pub status: AttemptStatus,
    pub passed: Option<bool>,
}

/// Decides certificate eligibility for one (student, course) pair.
///
/// Eligible iff every published module of the course has a completion
/// record AND at least one final-exam attempt was submitted and passed.
/// Expired attempts never qualify: they carry no score at all.
///
/// Evaluated on demand from current records, never cached, so it is
/// monotonic by construction: later records can only add qualifying
/// evidence, and nothing here is invalidated by additional failing
/// attempts.
pub fn is_eligible(
    required_modules: &HashSet<i64>,
    completed_modules: &HashSet<i64>,
    final_exam_attempts: &[FinalExamAttempt],
) -> bool {
    let modules_done = required_modules.is_subset(completed_modules);

    let exam_passed = final_exam_attempts
        .iter()
        .any(|a| a.status == AttemptStatus::Submitted && a.passed == Some(true));

    modules_done && exam_passed
}
