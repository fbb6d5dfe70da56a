// src/models/score.rs

use serde::{Deserialize, Serialize};

use crate::models::{assignment::Assignment, submission::Submission};

/// Aggregated, derived result of a submission. Never stored on its own;
/// recomputed from the current answers.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Score {
    pub total_score: f64,
    /// Sum of weighted per-question max scores.
    pub max_possible_score: f64,
    /// In `[0, 100]`; `0` when `max_possible_score` is `0`.
    pub percentage: f64,
    /// `None` when the test defines no passing threshold.
    pub is_passing: Option<bool>,
    pub needs_manual_review: bool,
    pub question_count: usize,
    pub answered_count: usize,
    pub correct_count: usize,
    pub pending_review_count: usize,
}

/// One attempt inside a student overview.
#[derive(Debug, Clone, Serialize)]
pub struct AttemptSummary {
    #[serde(flatten)]
    pub submission: Submission,
    /// Present once the attempt has been graded.
    pub score: Option<Score>,
}

/// Per-assignment progress for one student.
#[derive(Debug, Clone, Serialize)]
pub struct AssignmentOverview {
    #[serde(flatten)]
    pub assignment: Assignment,
    pub test_title: String,
    pub attempts_remaining: i32,
    pub submissions: Vec<AttemptSummary>,
    pub best_percentage: Option<f64>,
    pub has_passed: bool,
}
