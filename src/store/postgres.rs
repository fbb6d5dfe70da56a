// src/store/postgres.rs

use std::collections::HashMap;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde_json::Value;
use sqlx::{FromRow, PgExecutor, PgPool, types::Json};

use crate::{
    error::GradingError,
    grading::dispatcher::clamp_score,
    models::{
        assignment::{AssignTestRequest, Assignment},
        exercise::{
            AlternateAnswers, CreateExerciseRequest, Exercise, GradingMode, ScoringMechanism,
            ValidationRules,
        },
        submission::{Answer, GradedBy, ManualGradeRequest, Submission, SubmissionStatus},
        test::{AddQuestionRequest, CreateTestRequest, Test, TestQuestion},
    },
    services::{attempt_policy::AttemptPolicy, lifecycle::ensure_status},
    store::{AutoGrader, GradingStore},
};

macro_rules! exercise_select {
    ($tail:literal) => {
        concat!(
            "SELECT id, title, question, instructions, options, exercise_type, \
             correct_answers, alternate_answers, validation_rules, scoring_mechanism, \
             max_score, grading_mode, created_at \
             FROM exercises ",
            $tail
        )
    };
}

macro_rules! question_select {
    ($tail:literal) => {
        concat!(
            "SELECT q.id AS question_id, q.test_id, q.question_order, q.weight, q.is_required, \
             e.id, e.title, e.question, e.instructions, e.options, e.exercise_type, \
             e.correct_answers, e.alternate_answers, e.validation_rules, e.scoring_mechanism, \
             e.max_score, e.grading_mode, e.created_at \
             FROM test_questions q JOIN exercises e ON e.id = q.exercise_id ",
            $tail
        )
    };
}

macro_rules! assignment_select {
    ($tail:literal) => {
        concat!(
            "SELECT st.id, st.student_id, st.test_id, st.assigned_at, st.due_at, \
             st.max_attempts, st.attempts_used, t.passing_score \
             FROM student_tests st JOIN tests t ON t.id = st.test_id ",
            $tail
        )
    };
}

const SUBMISSION_COLUMNS: &str =
    "id, student_id, test_id, status, attempt_number, started_at, submitted_at";

macro_rules! answer_returning {
    () => {
        " RETURNING id, submission_id, question_id, response_data, is_correct, score, feedback, \
         detail, graded_by, grading_notes, answered_at, graded_at"
    };
}

#[derive(FromRow)]
struct ExerciseRow {
    id: i64,
    title: String,
    question: String,
    instructions: Option<String>,
    options: Option<Value>,
    exercise_type: String,
    correct_answers: Value,
    alternate_answers: Option<Json<AlternateAnswers>>,
    validation_rules: Json<ValidationRules>,
    scoring_mechanism: Json<ScoringMechanism>,
    max_score: i32,
    grading_mode: String,
    created_at: Option<DateTime<Utc>>,
}

impl TryFrom<ExerciseRow> for Exercise {
    type Error = GradingError;

    fn try_from(row: ExerciseRow) -> Result<Self, Self::Error> {
        Ok(Exercise {
            id: row.id,
            title: row.title,
            question: row.question,
            instructions: row.instructions,
            options: row.options,
            exercise_type: row.exercise_type,
            correct_answers: row.correct_answers,
            alternate_answers: row.alternate_answers.map(|Json(a)| a),
            validation_rules: row.validation_rules.0,
            scoring_mechanism: row.scoring_mechanism.0,
            max_score: u32::try_from(row.max_score).map_err(|_| {
                GradingError::Storage(format!("exercise {} has a negative max_score", row.id))
            })?,
            grading_mode: row.grading_mode.parse::<GradingMode>().map_err(GradingError::Storage)?,
            created_at: row.created_at,
        })
    }
}

#[derive(FromRow)]
struct QuestionRow {
    question_id: i64,
    test_id: i64,
    question_order: i32,
    weight: f64,
    is_required: bool,
    #[sqlx(flatten)]
    exercise: ExerciseRow,
}

impl TryFrom<QuestionRow> for TestQuestion {
    type Error = GradingError;

    fn try_from(row: QuestionRow) -> Result<Self, Self::Error> {
        Ok(TestQuestion {
            id: row.question_id,
            test_id: row.test_id,
            order: row.question_order,
            weight: row.weight,
            is_required: row.is_required,
            exercise: Exercise::try_from(row.exercise)?,
        })
    }
}

#[derive(FromRow)]
struct SubmissionRow {
    id: i64,
    student_id: i64,
    test_id: i64,
    status: String,
    attempt_number: i32,
    started_at: DateTime<Utc>,
    submitted_at: Option<DateTime<Utc>>,
}

impl SubmissionRow {
    fn status(&self) -> Result<SubmissionStatus, GradingError> {
        self.status.parse().map_err(GradingError::Storage)
    }

    fn into_submission(self, answers: Vec<Answer>) -> Result<Submission, GradingError> {
        Ok(Submission {
            status: self.status()?,
            id: self.id,
            student_id: self.student_id,
            test_id: self.test_id,
            attempt_number: self.attempt_number,
            started_at: self.started_at,
            submitted_at: self.submitted_at,
            answers,
        })
    }
}

#[derive(FromRow)]
struct AnswerRow {
    id: i64,
    submission_id: i64,
    question_id: i64,
    response_data: Value,
    is_correct: Option<bool>,
    score: Option<f64>,
    feedback: Option<String>,
    detail: Option<Value>,
    graded_by: String,
    grading_notes: Option<String>,
    answered_at: DateTime<Utc>,
    graded_at: Option<DateTime<Utc>>,
}

impl TryFrom<AnswerRow> for Answer {
    type Error = GradingError;

    fn try_from(row: AnswerRow) -> Result<Self, Self::Error> {
        Ok(Answer {
            graded_by: row.graded_by.parse::<GradedBy>().map_err(GradingError::Storage)?,
            id: row.id,
            submission_id: row.submission_id,
            question_id: row.question_id,
            response_data: row.response_data,
            is_correct: row.is_correct,
            score: row.score,
            feedback: row.feedback,
            detail: row.detail,
            grading_notes: row.grading_notes,
            answered_at: row.answered_at,
            graded_at: row.graded_at,
        })
    }
}

#[derive(FromRow)]
struct AssignmentRow {
    id: i64,
    student_id: i64,
    test_id: i64,
    assigned_at: DateTime<Utc>,
    due_at: Option<DateTime<Utc>>,
    max_attempts: i32,
    attempts_used: i32,
    passing_score: Option<f64>,
}

impl From<AssignmentRow> for Assignment {
    fn from(row: AssignmentRow) -> Self {
        Assignment {
            id: row.id,
            student_id: row.student_id,
            test_id: row.test_id,
            assigned_at: row.assigned_at,
            due_at: row.due_at,
            max_attempts: row.max_attempts,
            attempts_used: row.attempts_used,
            passing_score: row.passing_score,
        }
    }
}

#[derive(FromRow)]
struct TestRow {
    id: i64,
    title: String,
    description: Option<String>,
    duration_minutes: Option<i32>,
    passing_score: Option<f64>,
    created_at: Option<DateTime<Utc>>,
}

impl From<TestRow> for Test {
    fn from(row: TestRow) -> Self {
        Test {
            id: row.id,
            title: row.title,
            description: row.description,
            duration_minutes: row.duration_minutes,
            passing_score: row.passing_score,
            created_at: row.created_at,
        }
    }
}

async fn fetch_questions<'e, E: PgExecutor<'e>>(
    executor: E,
    test_id: i64,
) -> Result<Vec<TestQuestion>, GradingError> {
    let rows: Vec<QuestionRow> =
        sqlx::query_as(question_select!("WHERE q.test_id = $1 ORDER BY q.question_order, q.id"))
            .bind(test_id)
            .fetch_all(executor)
            .await?;
    rows.into_iter().map(TestQuestion::try_from).collect()
}

/// Answers of the given submissions, grouped by submission id.
async fn fetch_answers<'e, E: PgExecutor<'e>>(
    executor: E,
    submission_ids: &[i64],
) -> Result<HashMap<i64, Vec<Answer>>, GradingError> {
    let rows: Vec<AnswerRow> = sqlx::query_as(
        "SELECT id, submission_id, question_id, response_data, is_correct, score, feedback, \
         detail, graded_by, grading_notes, answered_at, graded_at \
         FROM submission_answers WHERE submission_id = ANY($1) ORDER BY id",
    )
    .bind(submission_ids)
    .fetch_all(executor)
    .await?;

    let mut grouped: HashMap<i64, Vec<Answer>> = HashMap::new();
    for row in rows {
        let answer = Answer::try_from(row)?;
        grouped.entry(answer.submission_id).or_default().push(answer);
    }
    Ok(grouped)
}

fn is_unique_violation(err: &sqlx::Error) -> bool {
    matches!(err, sqlx::Error::Database(db) if db.is_unique_violation())
}

/// PostgreSQL-backed store. Atomic operations run in one transaction and
/// lock the rows they check with `SELECT ... FOR UPDATE`.
#[derive(Clone)]
pub struct PgStore {
    pool: PgPool,
}

impl PgStore {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl GradingStore for PgStore {
    async fn create_exercise(&self, req: CreateExerciseRequest) -> Result<Exercise, GradingError> {
        let max_score = i32::try_from(req.max_score)
            .map_err(|_| GradingError::Validation("max_score is too large".to_string()))?;

        let row: ExerciseRow = sqlx::query_as(
            "INSERT INTO exercises (title, question, instructions, options, exercise_type, \
             correct_answers, alternate_answers, validation_rules, scoring_mechanism, \
             max_score, grading_mode) \
             VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11) \
             RETURNING id, title, question, instructions, options, exercise_type, \
             correct_answers, alternate_answers, validation_rules, scoring_mechanism, \
             max_score, grading_mode, created_at",
        )
        .bind(&req.title)
        .bind(&req.question)
        .bind(&req.instructions)
        .bind(&req.options)
        .bind(&req.exercise_type)
        .bind(&req.correct_answers)
        .bind(req.alternate_answers.as_ref().map(Json))
        .bind(Json(&req.validation_rules))
        .bind(Json(&req.scoring_mechanism))
        .bind(max_score)
        .bind(req.grading_mode.as_str())
        .fetch_one(&self.pool)
        .await
        .map_err(|e| {
            tracing::error!("Failed to create exercise: {:?}", e);
            GradingError::from(e)
        })?;

        Exercise::try_from(row)
    }

    async fn get_exercise(&self, id: i64) -> Result<Option<Exercise>, GradingError> {
        let row: Option<ExerciseRow> = sqlx::query_as(exercise_select!("WHERE id = $1"))
            .bind(id)
            .fetch_optional(&self.pool)
            .await?;
        row.map(Exercise::try_from).transpose()
    }

    async fn create_test(&self, req: CreateTestRequest) -> Result<Test, GradingError> {
        let row: TestRow = sqlx::query_as(
            "INSERT INTO tests (title, description, duration_minutes, passing_score) \
             VALUES ($1, $2, $3, $4) \
             RETURNING id, title, description, duration_minutes, passing_score, created_at",
        )
        .bind(&req.title)
        .bind(&req.description)
        .bind(req.duration_minutes)
        .bind(req.passing_score)
        .fetch_one(&self.pool)
        .await?;
        Ok(row.into())
    }

    async fn get_test(&self, id: i64) -> Result<Option<Test>, GradingError> {
        let row: Option<TestRow> = sqlx::query_as(
            "SELECT id, title, description, duration_minutes, passing_score, created_at \
             FROM tests WHERE id = $1",
        )
        .bind(id)
        .fetch_optional(&self.pool)
        .await?;
        Ok(row.map(Test::from))
    }

    async fn add_question(
        &self,
        test_id: i64,
        req: AddQuestionRequest,
    ) -> Result<TestQuestion, GradingError> {
        let mut tx = self.pool.begin().await?;

        let test_exists: Option<(i64,)> = sqlx::query_as("SELECT id FROM tests WHERE id = $1")
            .bind(test_id)
            .fetch_optional(&mut *tx)
            .await?;
        if test_exists.is_none() {
            return Err(GradingError::not_found("test", test_id));
        }
        let exercise_exists: Option<(i64,)> =
            sqlx::query_as("SELECT id FROM exercises WHERE id = $1")
                .bind(req.exercise_id)
                .fetch_optional(&mut *tx)
                .await?;
        if exercise_exists.is_none() {
            return Err(GradingError::not_found("exercise", req.exercise_id));
        }

        let (question_id,): (i64,) = sqlx::query_as(
            "INSERT INTO test_questions \
             (test_id, exercise_id, question_order, weight, is_required) \
             VALUES ($1, $2, $3, $4, $5) RETURNING id",
        )
        .bind(test_id)
        .bind(req.exercise_id)
        .bind(req.order)
        .bind(req.weight)
        .bind(req.is_required)
        .fetch_one(&mut *tx)
        .await
        .map_err(|e| {
            if is_unique_violation(&e) {
                GradingError::Conflict(format!(
                    "question order {} is already used in test {}",
                    req.order, test_id
                ))
            } else {
                GradingError::from(e)
            }
        })?;

        let row: QuestionRow = sqlx::query_as(question_select!("WHERE q.id = $1"))
            .bind(question_id)
            .fetch_one(&mut *tx)
            .await?;

        tx.commit().await?;
        TestQuestion::try_from(row)
    }

    async fn get_questions(&self, test_id: i64) -> Result<Vec<TestQuestion>, GradingError> {
        fetch_questions(&self.pool, test_id).await
    }

    async fn assign_test(
        &self,
        req: AssignTestRequest,
        now: DateTime<Utc>,
    ) -> Result<Assignment, GradingError> {
        let mut tx = self.pool.begin().await?;

        let test_exists: Option<(i64,)> = sqlx::query_as("SELECT id FROM tests WHERE id = $1")
            .bind(req.test_id)
            .fetch_optional(&mut *tx)
            .await?;
        if test_exists.is_none() {
            return Err(GradingError::not_found("test", req.test_id));
        }

        // Re-assigning keeps attempts_used.
        let (id,): (i64,) = sqlx::query_as(
            "INSERT INTO student_tests (student_id, test_id, assigned_at, due_at, max_attempts) \
             VALUES ($1, $2, $3, $4, $5) \
             ON CONFLICT (student_id, test_id) DO UPDATE \
             SET due_at = EXCLUDED.due_at, max_attempts = EXCLUDED.max_attempts \
             RETURNING id",
        )
        .bind(req.student_id)
        .bind(req.test_id)
        .bind(now)
        .bind(req.due_at)
        .bind(req.max_attempts)
        .fetch_one(&mut *tx)
        .await?;

        let row: AssignmentRow = sqlx::query_as(assignment_select!("WHERE st.id = $1"))
            .bind(id)
            .fetch_one(&mut *tx)
            .await?;

        tx.commit().await?;
        Ok(row.into())
    }

    async fn get_assignment(
        &self,
        student_id: i64,
        test_id: i64,
    ) -> Result<Option<Assignment>, GradingError> {
        let row: Option<AssignmentRow> =
            sqlx::query_as(assignment_select!("WHERE st.student_id = $1 AND st.test_id = $2"))
                .bind(student_id)
                .bind(test_id)
                .fetch_optional(&self.pool)
                .await?;
        Ok(row.map(Assignment::from))
    }

    async fn list_assignments(&self, student_id: i64) -> Result<Vec<Assignment>, GradingError> {
        let rows: Vec<AssignmentRow> = sqlx::query_as(assignment_select!(
            "WHERE st.student_id = $1 ORDER BY st.assigned_at, st.id"
        ))
        .bind(student_id)
        .fetch_all(&self.pool)
        .await?;
        Ok(rows.into_iter().map(Assignment::from).collect())
    }

    async fn start_attempt(
        &self,
        student_id: i64,
        test_id: i64,
        now: DateTime<Utc>,
    ) -> Result<Submission, GradingError> {
        let mut tx = self.pool.begin().await?;

        // The row lock serializes concurrent starts for the same assignment.
        let row: Option<AssignmentRow> = sqlx::query_as(assignment_select!(
            "WHERE st.student_id = $1 AND st.test_id = $2 FOR UPDATE OF st"
        ))
        .bind(student_id)
        .bind(test_id)
        .fetch_optional(&mut *tx)
        .await?;
        let mut assignment: Assignment = row
            .ok_or(GradingError::NotAssigned {
                student_id,
                test_id,
            })?
            .into();

        let attempt_number = AttemptPolicy::record_attempt_start(&mut assignment, now)?;

        sqlx::query("UPDATE student_tests SET attempts_used = $1 WHERE id = $2")
            .bind(assignment.attempts_used)
            .bind(assignment.id)
            .execute(&mut *tx)
            .await?;

        let sql = format!(
            "INSERT INTO submissions (student_id, test_id, status, attempt_number, started_at) \
             VALUES ($1, $2, $3, $4, $5) RETURNING {}",
            SUBMISSION_COLUMNS
        );
        let row: SubmissionRow = sqlx::query_as(&sql)
            .bind(student_id)
            .bind(test_id)
            .bind(SubmissionStatus::InProgress.as_str())
            .bind(attempt_number)
            .bind(now)
            .fetch_one(&mut *tx)
            .await?;

        tx.commit().await?;
        row.into_submission(Vec::new())
    }

    async fn get_submission(&self, id: i64) -> Result<Option<Submission>, GradingError> {
        let sql = format!("SELECT {} FROM submissions WHERE id = $1", SUBMISSION_COLUMNS);
        let row: Option<SubmissionRow> = sqlx::query_as(&sql)
            .bind(id)
            .fetch_optional(&self.pool)
            .await?;

        let Some(row) = row else {
            return Ok(None);
        };
        let mut answers = fetch_answers(&self.pool, &[row.id]).await?;
        let own = answers.remove(&row.id).unwrap_or_default();
        row.into_submission(own).map(Some)
    }

    async fn list_submissions(
        &self,
        student_id: i64,
        test_id: i64,
    ) -> Result<Vec<Submission>, GradingError> {
        let sql = format!(
            "SELECT {} FROM submissions WHERE student_id = $1 AND test_id = $2 \
             ORDER BY attempt_number, id",
            SUBMISSION_COLUMNS
        );
        let rows: Vec<SubmissionRow> = sqlx::query_as(&sql)
            .bind(student_id)
            .bind(test_id)
            .fetch_all(&self.pool)
            .await?;

        let ids: Vec<i64> = rows.iter().map(|r| r.id).collect();
        let mut answers = fetch_answers(&self.pool, &ids).await?;
        rows.into_iter()
            .map(|row| {
                let own = answers.remove(&row.id).unwrap_or_default();
                row.into_submission(own)
            })
            .collect()
    }

    async fn record_answer(
        &self,
        submission_id: i64,
        question_id: i64,
        response: Value,
        now: DateTime<Utc>,
    ) -> Result<Answer, GradingError> {
        let mut tx = self.pool.begin().await?;

        let sql = format!(
            "SELECT {} FROM submissions WHERE id = $1 FOR UPDATE",
            SUBMISSION_COLUMNS
        );
        let submission: SubmissionRow = sqlx::query_as(&sql)
            .bind(submission_id)
            .fetch_optional(&mut *tx)
            .await?
            .ok_or(GradingError::not_found("submission", submission_id))?;
        ensure_status(submission_id, submission.status()?, SubmissionStatus::InProgress)?;

        let belongs: Option<(i64,)> =
            sqlx::query_as("SELECT id FROM test_questions WHERE id = $1 AND test_id = $2")
                .bind(question_id)
                .bind(submission.test_id)
                .fetch_optional(&mut *tx)
                .await?;
        if belongs.is_none() {
            return Err(GradingError::not_found("question", question_id));
        }

        let row: AnswerRow = sqlx::query_as(concat!(
            "INSERT INTO submission_answers \
             (submission_id, question_id, response_data, answered_at) \
             VALUES ($1, $2, $3, $4) \
             ON CONFLICT (submission_id, question_id) DO UPDATE \
             SET response_data = EXCLUDED.response_data, answered_at = EXCLUDED.answered_at, \
             is_correct = NULL, score = NULL, feedback = NULL, detail = NULL, \
             graded_by = 'unset', grading_notes = NULL, graded_at = NULL",
            answer_returning!()
        ))
        .bind(submission_id)
        .bind(question_id)
        .bind(&response)
        .bind(now)
        .fetch_one(&mut *tx)
        .await?;

        tx.commit().await?;
        Answer::try_from(row)
    }

    async fn complete_submission(
        &self,
        submission_id: i64,
        now: DateTime<Utc>,
        grader: &AutoGrader,
    ) -> Result<Submission, GradingError> {
        let mut tx = self.pool.begin().await?;

        let sql = format!(
            "SELECT {} FROM submissions WHERE id = $1 FOR UPDATE",
            SUBMISSION_COLUMNS
        );
        let submission: SubmissionRow = sqlx::query_as(&sql)
            .bind(submission_id)
            .fetch_optional(&mut *tx)
            .await?
            .ok_or(GradingError::not_found("submission", submission_id))?;
        ensure_status(submission_id, submission.status()?, SubmissionStatus::InProgress)?;

        sqlx::query("UPDATE submissions SET status = $1, submitted_at = $2 WHERE id = $3")
            .bind(SubmissionStatus::Submitted.as_str())
            .bind(now)
            .bind(submission_id)
            .execute(&mut *tx)
            .await?;

        let questions = fetch_questions(&mut *tx, submission.test_id).await?;
        let answers = fetch_answers(&mut *tx, &[submission_id])
            .await?
            .remove(&submission_id)
            .unwrap_or_default();

        for verdict in grader(&questions, &answers) {
            sqlx::query(
                "UPDATE submission_answers SET is_correct = $1, score = $2, feedback = $3, \
                 detail = $4, graded_by = $5, graded_at = $6 WHERE id = $7",
            )
            .bind(verdict.is_correct)
            .bind(verdict.score)
            .bind(&verdict.feedback)
            .bind(&verdict.detail)
            .bind(GradedBy::Auto.as_str())
            .bind(now)
            .bind(verdict.answer_id)
            .execute(&mut *tx)
            .await?;
        }

        sqlx::query("UPDATE submissions SET status = $1 WHERE id = $2")
            .bind(SubmissionStatus::Graded.as_str())
            .bind(submission_id)
            .execute(&mut *tx)
            .await?;

        let sql = format!("SELECT {} FROM submissions WHERE id = $1", SUBMISSION_COLUMNS);
        let row: SubmissionRow = sqlx::query_as(&sql)
            .bind(submission_id)
            .fetch_one(&mut *tx)
            .await?;
        let answers = fetch_answers(&mut *tx, &[submission_id])
            .await?
            .remove(&submission_id)
            .unwrap_or_default();

        tx.commit().await.map_err(|e| {
            tracing::error!("Failed to commit grading of submission {}: {:?}", submission_id, e);
            GradingError::from(e)
        })?;

        row.into_submission(answers)
    }

    async fn manually_grade(
        &self,
        answer_id: i64,
        grade: &ManualGradeRequest,
        now: DateTime<Utc>,
    ) -> Result<Answer, GradingError> {
        let mut tx = self.pool.begin().await?;

        let found: Option<(i64, String, i32)> = sqlx::query_as(
            "SELECT s.id, s.status, e.max_score \
             FROM submission_answers a \
             JOIN submissions s ON s.id = a.submission_id \
             JOIN test_questions q ON q.id = a.question_id \
             JOIN exercises e ON e.id = q.exercise_id \
             WHERE a.id = $1 FOR UPDATE OF a, s",
        )
        .bind(answer_id)
        .fetch_optional(&mut *tx)
        .await?;
        let (submission_id, status, max_score) =
            found.ok_or(GradingError::not_found("answer", answer_id))?;

        let status: SubmissionStatus = status.parse().map_err(GradingError::Storage)?;
        ensure_status(submission_id, status, SubmissionStatus::Graded)?;

        let max_score = u32::try_from(max_score).unwrap_or(0);
        let row: AnswerRow = sqlx::query_as(concat!(
            "UPDATE submission_answers SET is_correct = $1, score = $2, feedback = $3, \
             grading_notes = $4, graded_by = $5, graded_at = $6 WHERE id = $7",
            answer_returning!()
        ))
        .bind(grade.is_correct)
        .bind(clamp_score(grade.score, max_score))
        .bind(&grade.feedback)
        .bind(&grade.notes)
        .bind(GradedBy::Manual.as_str())
        .bind(now)
        .bind(answer_id)
        .fetch_one(&mut *tx)
        .await?;

        tx.commit().await?;
        Answer::try_from(row)
    }
}
