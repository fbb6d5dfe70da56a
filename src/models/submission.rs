// src/models/submission.rs

use std::{fmt, str::FromStr};

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use validator::Validate;

use crate::models::{exercise::validate_response_size, score::Score};

/// Lifecycle state of a test attempt.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SubmissionStatus {
    InProgress,
    Submitted,
    Graded,
}

impl SubmissionStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            SubmissionStatus::InProgress => "in_progress",
            SubmissionStatus::Submitted => "submitted",
            SubmissionStatus::Graded => "graded",
        }
    }
}

impl fmt::Display for SubmissionStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for SubmissionStatus {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "in_progress" => Ok(SubmissionStatus::InProgress),
            "submitted" => Ok(SubmissionStatus::Submitted),
            "graded" => Ok(SubmissionStatus::Graded),
            other => Err(format!("unknown submission status '{}'", other)),
        }
    }
}

/// Who produced an answer's verdict.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum GradedBy {
    #[default]
    Unset,
    Auto,
    Manual,
}

impl GradedBy {
    pub fn as_str(&self) -> &'static str {
        match self {
            GradedBy::Unset => "unset",
            GradedBy::Auto => "auto",
            GradedBy::Manual => "manual",
        }
    }
}

impl FromStr for GradedBy {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "unset" | "" => Ok(GradedBy::Unset),
            "auto" => Ok(GradedBy::Auto),
            "manual" => Ok(GradedBy::Manual),
            other => Err(format!("unknown grader '{}'", other)),
        }
    }
}

/// Represents the 'submission_answers' table.
/// One learner response to one question within a submission.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Answer {
    pub id: i64,
    pub submission_id: i64,
    pub question_id: i64,

    /// Opaque response whose shape depends on the exercise type.
    pub response_data: serde_json::Value,

    /// `None` until graded.
    pub is_correct: Option<bool>,
    pub score: Option<f64>,
    pub feedback: Option<String>,
    /// Evaluator breakdown (per blank, per pair, matched keywords, ...).
    pub detail: Option<serde_json::Value>,
    pub graded_by: GradedBy,
    pub grading_notes: Option<String>,
    pub answered_at: DateTime<Utc>,
    pub graded_at: Option<DateTime<Utc>>,
}

/// Represents the 'submissions' table: one attempt by one student at one test.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Submission {
    pub id: i64,
    pub student_id: i64,
    pub test_id: i64,
    pub status: SubmissionStatus,
    pub attempt_number: i32,
    pub started_at: DateTime<Utc>,
    pub submitted_at: Option<DateTime<Utc>>,
    pub answers: Vec<Answer>,
}

impl Submission {
    pub fn answer_for(&self, question_id: i64) -> Option<&Answer> {
        self.answers.iter().find(|a| a.question_id == question_id)
    }
}

/// Verdict produced for one answer while completing a submission.
#[derive(Debug, Clone, PartialEq)]
pub struct AnswerVerdict {
    pub answer_id: i64,
    pub is_correct: bool,
    pub score: f64,
    pub feedback: String,
    pub detail: serde_json::Value,
}

/// Instructor's verdict for a single answer.
#[derive(Debug, Clone, Deserialize, Validate)]
pub struct ManualGradeRequest {
    pub is_correct: bool,
    #[validate(range(min = 0.0))]
    pub score: f64,
    #[validate(length(max = 2000))]
    pub feedback: Option<String>,
    #[validate(length(max = 4000))]
    pub notes: Option<String>,
}

/// DTO for starting an attempt.
#[derive(Debug, Clone, Deserialize)]
pub struct StartSubmissionRequest {
    pub student_id: i64,
    pub test_id: i64,
}

/// DTO for recording an answer.
#[derive(Debug, Clone, Deserialize, Validate)]
pub struct RecordAnswerRequest {
    #[validate(custom(function = validate_response_size))]
    pub response_data: serde_json::Value,
}

/// A submission together with its derived score.
#[derive(Debug, Clone, Serialize)]
pub struct SubmissionResult {
    pub submission: Submission,
    pub score: Score,
}

/// Result of a manual grading call.
#[derive(Debug, Clone, Serialize)]
pub struct ManualGradeResult {
    pub answer: Answer,
    pub score: Score,
}
