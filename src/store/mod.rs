// src/store/mod.rs

//! Persistence boundary for the grading core.
//!
//! Operations that must be atomic (attempt consumption, answer upserts,
//! completion, manual grading) are single trait methods so that each
//! implementation can run them under one lock or transaction.

pub mod memory;
pub mod postgres;

use async_trait::async_trait;
use chrono::{DateTime, Utc};

use crate::{
    error::GradingError,
    models::{
        assignment::{AssignTestRequest, Assignment},
        exercise::{CreateExerciseRequest, Exercise},
        submission::{Answer, AnswerVerdict, ManualGradeRequest, Submission},
        test::{AddQuestionRequest, CreateTestRequest, Test, TestQuestion},
    },
};

pub use memory::MemoryStore;
pub use postgres::PgStore;

/// Pure grading step run by `complete_submission` while the submission is locked.
pub type AutoGrader = dyn Fn(&[TestQuestion], &[Answer]) -> Vec<AnswerVerdict> + Send + Sync;

#[async_trait]
pub trait GradingStore: Send + Sync {
    async fn create_exercise(&self, req: CreateExerciseRequest) -> Result<Exercise, GradingError>;

    async fn get_exercise(&self, id: i64) -> Result<Option<Exercise>, GradingError>;

    async fn create_test(&self, req: CreateTestRequest) -> Result<Test, GradingError>;

    async fn get_test(&self, id: i64) -> Result<Option<Test>, GradingError>;

    /// Fails with `NotFound` for a missing test or exercise and `Conflict`
    /// when `order` is already taken in the test.
    async fn add_question(
        &self,
        test_id: i64,
        req: AddQuestionRequest,
    ) -> Result<TestQuestion, GradingError>;

    /// Questions of a test joined with their exercises, in `order`.
    async fn get_questions(&self, test_id: i64) -> Result<Vec<TestQuestion>, GradingError>;

    /// Creates or updates an assignment; `attempts_used` survives re-assignment.
    async fn assign_test(
        &self,
        req: AssignTestRequest,
        now: DateTime<Utc>,
    ) -> Result<Assignment, GradingError>;

    async fn get_assignment(
        &self,
        student_id: i64,
        test_id: i64,
    ) -> Result<Option<Assignment>, GradingError>;

    async fn list_assignments(&self, student_id: i64) -> Result<Vec<Assignment>, GradingError>;

    /// Atomically applies `AttemptPolicy`, consumes an attempt and creates an
    /// `in_progress` submission. Nothing is written when the policy rejects.
    async fn start_attempt(
        &self,
        student_id: i64,
        test_id: i64,
        now: DateTime<Utc>,
    ) -> Result<Submission, GradingError>;

    async fn get_submission(&self, id: i64) -> Result<Option<Submission>, GradingError>;

    /// Attempts of one student at one test, oldest first.
    async fn list_submissions(
        &self,
        student_id: i64,
        test_id: i64,
    ) -> Result<Vec<Submission>, GradingError>;

    /// Upserts the answer for a question; requires the submission to be
    /// `in_progress` at write time. Clears any previous verdict.
    async fn record_answer(
        &self,
        submission_id: i64,
        question_id: i64,
        response: serde_json::Value,
        now: DateTime<Utc>,
    ) -> Result<Answer, GradingError>;

    /// Requires `in_progress`; runs `grader`, stores its verdicts as
    /// auto-graded, stamps `submitted_at` and leaves the submission `graded`.
    async fn complete_submission(
        &self,
        submission_id: i64,
        now: DateTime<Utc>,
        grader: &AutoGrader,
    ) -> Result<Submission, GradingError>;

    /// Requires the parent submission to be `graded`. The score is clamped
    /// to the exercise's max.
    async fn manually_grade(
        &self,
        answer_id: i64,
        grade: &ManualGradeRequest,
        now: DateTime<Utc>,
    ) -> Result<Answer, GradingError>;
}
