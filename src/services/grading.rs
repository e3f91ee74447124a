// src/services/grading.rs

use std::collections::HashMap;

use crate::error::AppError;
use crate::models::attempt::QuestionResult;

/// One entry of an exam's answer key, in exam question order.
#[derive(Debug, Clone)]
pub struct KeyEntry {
    pub question_id: i64,
    pub correct: Vec<i64>,
    pub weight: i64,
    pub explanation: Option<String>,
}

/// Result of grading one attempt.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct GradeOutcome {
    pub score_percent: i64,
    pub passed: bool,
    pub breakdown: Vec<QuestionResult>,
}

/// Grades a set of submitted answers against an exam's answer key.
///
/// Pure and deterministic: the same (key, answers, threshold) always
/// produces the same score, pass flag and breakdown, in key order.
/// An unanswered question counts as incorrect. A question is correct
/// iff the selected option set equals the key's set, regardless of the
/// order options were picked in.
///
/// The score is `100 * awarded / total` rounded half-up to the nearest
/// integer. A key with zero total weight cannot be graded.
pub fn grade(
    key: &[KeyEntry],
    answers: &HashMap<i64, Vec<i64>>,
    passing_percent: i64,
) -> Result<GradeOutcome, AppError> {
    let total_weight: i64 = key.iter().map(|k| k.weight).sum();
    if total_weight <= 0 {
        return Err(AppError::InvalidExam(
            "Exam has zero total weight and cannot be graded".to_string(),
        ));
    }

    let mut awarded: i64 = 0;
    let mut breakdown = Vec::with_capacity(key.len());

    for entry in key {
        let selected = answers.get(&entry.question_id);
        let was_correct = match selected {
            Some(picked) if !picked.is_empty() => {
                let mut picked = picked.clone();
                picked.sort_unstable();
                picked.dedup();
                let mut correct = entry.correct.clone();
                correct.sort_unstable();
                picked == correct
            }
            _ => false,
        };

        if was_correct {
            awarded += entry.weight;
        }

        breakdown.push(QuestionResult {
            question_id: entry.question_id,
            selected: selected.cloned(),
            correct: entry.correct.clone(),
            was_correct,
            weight: entry.weight,
            explanation: entry.explanation.clone(),
        });
    }

    // round-half-up of 100*a/t in integer arithmetic
    let score_percent = (200 * awarded + total_weight) / (2 * total_weight);
    let passed = score_percent >= passing_percent;

    Ok(GradeOutcome {
        score_percent,
        passed,
        breakdown,
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    fn key(entries: &[(i64, &[i64], i64)]) -> Vec<KeyEntry> {
        entries
            .iter()
            .map(|(id, correct, weight)| KeyEntry {
                question_id: *id,
                correct: correct.to_vec(),
                weight: *weight,
                explanation: None,
            })
            .collect()
    }

    #[test]
    fn three_of_four_scores_75_and_passes_at_70() {
        let key = key(&[(1, &[0], 1), (2, &[1], 1), (3, &[2], 1), (4, &[3], 1)]);
        let mut answers = HashMap::new();
        answers.insert(1, vec![0]);
        answers.insert(2, vec![1]);
        answers.insert(3, vec![2]);
        answers.insert(4, vec![0]); // wrong

        let outcome = grade(&key, &answers, 70).unwrap();
        assert_eq!(outcome.score_percent, 75);
        assert!(outcome.passed);
    }

    #[test]
    fn unanswered_counts_as_incorrect() {
        let key = key(&[(1, &[0], 1), (2, &[1], 1)]);
        let mut answers = HashMap::new();
        answers.insert(1, vec![0]);

        let outcome = grade(&key, &answers, 60).unwrap();
        assert_eq!(outcome.score_percent, 50);
        assert!(!outcome.passed);
        assert!(!outcome.breakdown[1].was_correct);
        assert_eq!(outcome.breakdown[1].selected, None);
    }

    #[test]
    fn empty_selection_counts_as_incorrect() {
        let key = key(&[(1, &[0], 1)]);
        let mut answers = HashMap::new();
        answers.insert(1, vec![]);

        let outcome = grade(&key, &answers, 60).unwrap();
        assert_eq!(outcome.score_percent, 0);
    }

    #[test]
    fn multiple_answer_requires_exact_set() {
        let key = key(&[(1, &[0, 2], 1), (2, &[1, 3], 1)]);
        let mut answers = HashMap::new();
        // order of picks must not matter
        answers.insert(1, vec![2, 0]);
        // subset is not enough
        answers.insert(2, vec![1]);

        let outcome = grade(&key, &answers, 50).unwrap();
        assert!(outcome.breakdown[0].was_correct);
        assert!(!outcome.breakdown[1].was_correct);
        assert_eq!(outcome.score_percent, 50);
    }

    #[test]
    fn weights_skew_the_percentage() {
        let key = key(&[(1, &[0], 3), (2, &[0], 1)]);
        let mut answers = HashMap::new();
        answers.insert(1, vec![0]);

        let outcome = grade(&key, &answers, 70).unwrap();
        assert_eq!(outcome.score_percent, 75);
        assert!(outcome.passed);
    }

    #[test]
    fn score_rounds_half_up() {
        // 1/8 = 12.5% -> 13
        let key8 = key(&[
            (1, &[0], 1),
            (2, &[0], 1),
            (3, &[0], 1),
            (4, &[0], 1),
            (5, &[0], 1),
            (6, &[0], 1),
            (7, &[0], 1),
            (8, &[0], 1),
        ]);
        let mut answers = HashMap::new();
        answers.insert(1, vec![0]);
        assert_eq!(grade(&key8, &answers, 60).unwrap().score_percent, 13);

        // 1/3 = 33.33% -> 33
        let key3 = key(&[(1, &[0], 1), (2, &[0], 1), (3, &[0], 1)]);
        assert_eq!(grade(&key3, &answers, 60).unwrap().score_percent, 33);

        // 2/3 = 66.67% -> 67
        answers.insert(2, vec![0]);
        assert_eq!(grade(&key3, &answers, 60).unwrap().score_percent, 67);
    }

    #[test]
    fn threshold_is_inclusive() {
        let key = key(&[(1, &[0], 1), (2, &[0], 1)]);
        let mut answers = HashMap::new();
        answers.insert(1, vec![0]);

        let outcome = grade(&key, &answers, 50).unwrap();
        assert_eq!(outcome.score_percent, 50);
        assert!(outcome.passed);
    }

    #[test]
    fn zero_weight_exam_is_rejected() {
        let result = grade(&[], &HashMap::new(), 60);
        assert!(matches!(result, Err(AppError::InvalidExam(_))));
    }

    #[test]
    fn grading_is_deterministic() {
        let key = key(&[(1, &[0], 2), (2, &[1, 2], 1), (3, &[3], 1)]);
        let mut answers = HashMap::new();
        answers.insert(1, vec![0]);
        answers.insert(2, vec![2, 1]);

        let first = grade(&key, &answers, 70).unwrap();
        let second = grade(&key, &answers, 70).unwrap();
        assert_eq!(first, second);
        // breakdown follows key order, not answer-map order
        let ids: Vec<i64> = first.breakdown.iter().map(|r| r.question_id).collect();
        assert_eq!(ids, vec![1, 2, 3]);
    }

    #[test]
    fn answers_to_unknown_questions_are_ignored() {
        let key = key(&[(1, &[0], 1)]);
        let mut answers = HashMap::new();
        answers.insert(1, vec![0]);
        answers.insert(99, vec![0]);

        let outcome = grade(&key, &answers, 60).unwrap();
        assert_eq!(outcome.score_percent, 100);
        assert_eq!(outcome.breakdown.len(), 1);
    }
}
