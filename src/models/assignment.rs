// src/models/assignment.rs

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use validator::Validate;

/// Represents the 'student_tests' table: a test assigned to one student.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Assignment {
    pub id: i64,
    pub student_id: i64,
    pub test_id: i64,
    pub assigned_at: DateTime<Utc>,
    pub due_at: Option<DateTime<Utc>>,
    pub max_attempts: i32,
    pub attempts_used: i32,
    /// Joined from the test for convenience.
    pub passing_score: Option<f64>,
}

impl Assignment {
    pub fn attempts_remaining(&self) -> i32 {
        (self.max_attempts - self.attempts_used).max(0)
    }
}

/// DTO for assigning (or re-assigning) a test to a student.
#[derive(Debug, Clone, Deserialize, Validate)]
pub struct AssignTestRequest {
    pub student_id: i64,
    pub test_id: i64,
    pub due_at: Option<DateTime<Utc>>,
    #[validate(range(min = 1, max = 100))]
    #[serde(default = "default_max_attempts")]
    pub max_attempts: i32,
}

fn default_max_attempts() -> i32 {
    1
}
