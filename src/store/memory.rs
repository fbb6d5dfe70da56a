// src/store/memory.rs

use std::collections::BTreeMap;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde_json::Value;
use tokio::sync::Mutex;

use crate::{
    error::GradingError,
    grading::dispatcher::clamp_score,
    models::{
        assignment::{AssignTestRequest, Assignment},
        exercise::{CreateExerciseRequest, Exercise},
        submission::{Answer, GradedBy, ManualGradeRequest, Submission, SubmissionStatus},
        test::{AddQuestionRequest, CreateTestRequest, Test, TestQuestion},
    },
    services::{attempt_policy::AttemptPolicy, lifecycle::ensure_status},
    store::{AutoGrader, GradingStore},
};

/// A test question as stored, referencing its exercise by id.
#[derive(Debug, Clone)]
struct QuestionRow {
    id: i64,
    test_id: i64,
    exercise_id: i64,
    order: i32,
    weight: f64,
    is_required: bool,
}

#[derive(Default)]
struct Tables {
    next_id: i64,
    exercises: BTreeMap<i64, Exercise>,
    tests: BTreeMap<i64, Test>,
    questions: BTreeMap<i64, QuestionRow>,
    assignments: BTreeMap<(i64, i64), Assignment>,
    submissions: BTreeMap<i64, Submission>,
}

impl Tables {
    fn next_id(&mut self) -> i64 {
        self.next_id += 1;
        self.next_id
    }

    fn joined(&self, row: &QuestionRow) -> Result<TestQuestion, GradingError> {
        let exercise = self
            .exercises
            .get(&row.exercise_id)
            .cloned()
            .ok_or(GradingError::not_found("exercise", row.exercise_id))?;
        Ok(TestQuestion {
            id: row.id,
            test_id: row.test_id,
            order: row.order,
            weight: row.weight,
            is_required: row.is_required,
            exercise,
        })
    }

    fn questions_of(&self, test_id: i64) -> Result<Vec<TestQuestion>, GradingError> {
        let mut questions = self
            .questions
            .values()
            .filter(|q| q.test_id == test_id)
            .map(|q| self.joined(q))
            .collect::<Result<Vec<_>, _>>()?;
        questions.sort_by_key(|q| (q.order, q.id));
        Ok(questions)
    }

    /// Assignment with the test's current passing score filled in.
    fn assignment_view(&self, assignment: &Assignment) -> Assignment {
        let mut view = assignment.clone();
        view.passing_score = self
            .tests
            .get(&assignment.test_id)
            .and_then(|t| t.passing_score);
        view
    }
}

/// Process-local store guarded by a single async mutex.
///
/// Every trait method takes the lock once, so each call is atomic with
/// respect to every other call. Backs the integration tests.
#[derive(Default)]
pub struct MemoryStore {
    tables: Mutex<Tables>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl GradingStore for MemoryStore {
    async fn create_exercise(&self, req: CreateExerciseRequest) -> Result<Exercise, GradingError> {
        let mut tables = self.tables.lock().await;
        let exercise = Exercise {
            id: tables.next_id(),
            title: req.title,
            question: req.question,
            instructions: req.instructions,
            options: req.options,
            exercise_type: req.exercise_type,
            correct_answers: req.correct_answers,
            alternate_answers: req.alternate_answers,
            validation_rules: req.validation_rules,
            scoring_mechanism: req.scoring_mechanism,
            max_score: req.max_score,
            grading_mode: req.grading_mode,
            created_at: Some(Utc::now()),
        };
        tables.exercises.insert(exercise.id, exercise.clone());
        Ok(exercise)
    }

    async fn get_exercise(&self, id: i64) -> Result<Option<Exercise>, GradingError> {
        Ok(self.tables.lock().await.exercises.get(&id).cloned())
    }

    async fn create_test(&self, req: CreateTestRequest) -> Result<Test, GradingError> {
        let mut tables = self.tables.lock().await;
        let test = Test {
            id: tables.next_id(),
            title: req.title,
            description: req.description,
            duration_minutes: req.duration_minutes,
            passing_score: req.passing_score,
            created_at: Some(Utc::now()),
        };
        tables.tests.insert(test.id, test.clone());
        Ok(test)
    }

    async fn get_test(&self, id: i64) -> Result<Option<Test>, GradingError> {
        Ok(self.tables.lock().await.tests.get(&id).cloned())
    }

    async fn add_question(
        &self,
        test_id: i64,
        req: AddQuestionRequest,
    ) -> Result<TestQuestion, GradingError> {
        let mut tables = self.tables.lock().await;
        if !tables.tests.contains_key(&test_id) {
            return Err(GradingError::not_found("test", test_id));
        }
        if !tables.exercises.contains_key(&req.exercise_id) {
            return Err(GradingError::not_found("exercise", req.exercise_id));
        }
        if tables
            .questions
            .values()
            .any(|q| q.test_id == test_id && q.order == req.order)
        {
            return Err(GradingError::Conflict(format!(
                "question order {} is already used in test {}",
                req.order, test_id
            )));
        }

        let row = QuestionRow {
            id: tables.next_id(),
            test_id,
            exercise_id: req.exercise_id,
            order: req.order,
            weight: req.weight,
            is_required: req.is_required,
        };
        let question = tables.joined(&row)?;
        tables.questions.insert(row.id, row);
        Ok(question)
    }

    async fn get_questions(&self, test_id: i64) -> Result<Vec<TestQuestion>, GradingError> {
        self.tables.lock().await.questions_of(test_id)
    }

    async fn assign_test(
        &self,
        req: AssignTestRequest,
        now: DateTime<Utc>,
    ) -> Result<Assignment, GradingError> {
        let mut tables = self.tables.lock().await;
        if !tables.tests.contains_key(&req.test_id) {
            return Err(GradingError::not_found("test", req.test_id));
        }

        let key = (req.student_id, req.test_id);
        let existing_id = tables.assignments.get(&key).map(|a| a.id);
        let id = match existing_id {
            Some(id) => id,
            None => tables.next_id(),
        };
        let assignment = tables.assignments.entry(key).or_insert_with(|| Assignment {
            id,
            student_id: req.student_id,
            test_id: req.test_id,
            assigned_at: now,
            due_at: None,
            max_attempts: req.max_attempts,
            attempts_used: 0,
            passing_score: None,
        });
        assignment.due_at = req.due_at;
        assignment.max_attempts = req.max_attempts;

        let assignment = assignment.clone();
        Ok(tables.assignment_view(&assignment))
    }

    async fn get_assignment(
        &self,
        student_id: i64,
        test_id: i64,
    ) -> Result<Option<Assignment>, GradingError> {
        let tables = self.tables.lock().await;
        Ok(tables
            .assignments
            .get(&(student_id, test_id))
            .map(|a| tables.assignment_view(a)))
    }

    async fn list_assignments(&self, student_id: i64) -> Result<Vec<Assignment>, GradingError> {
        let tables = self.tables.lock().await;
        let mut assignments: Vec<Assignment> = tables
            .assignments
            .values()
            .filter(|a| a.student_id == student_id)
            .map(|a| tables.assignment_view(a))
            .collect();
        assignments.sort_by_key(|a| (a.assigned_at, a.id));
        Ok(assignments)
    }

    async fn start_attempt(
        &self,
        student_id: i64,
        test_id: i64,
        now: DateTime<Utc>,
    ) -> Result<Submission, GradingError> {
        let mut tables = self.tables.lock().await;
        let attempt_number = {
            let assignment = tables
                .assignments
                .get_mut(&(student_id, test_id))
                .ok_or(GradingError::NotAssigned {
                    student_id,
                    test_id,
                })?;
            AttemptPolicy::record_attempt_start(assignment, now)?
        };

        let submission = Submission {
            id: tables.next_id(),
            student_id,
            test_id,
            status: SubmissionStatus::InProgress,
            attempt_number,
            started_at: now,
            submitted_at: None,
            answers: Vec::new(),
        };
        tables.submissions.insert(submission.id, submission.clone());
        Ok(submission)
    }

    async fn get_submission(&self, id: i64) -> Result<Option<Submission>, GradingError> {
        Ok(self.tables.lock().await.submissions.get(&id).cloned())
    }

    async fn list_submissions(
        &self,
        student_id: i64,
        test_id: i64,
    ) -> Result<Vec<Submission>, GradingError> {
        let tables = self.tables.lock().await;
        let mut submissions: Vec<Submission> = tables
            .submissions
            .values()
            .filter(|s| s.student_id == student_id && s.test_id == test_id)
            .cloned()
            .collect();
        submissions.sort_by_key(|s| (s.attempt_number, s.id));
        Ok(submissions)
    }

    async fn record_answer(
        &self,
        submission_id: i64,
        question_id: i64,
        response: Value,
        now: DateTime<Utc>,
    ) -> Result<Answer, GradingError> {
        let mut tables = self.tables.lock().await;
        let (status, test_id) = tables
            .submissions
            .get(&submission_id)
            .map(|s| (s.status, s.test_id))
            .ok_or(GradingError::not_found("submission", submission_id))?;
        ensure_status(submission_id, status, SubmissionStatus::InProgress)?;

        if !tables
            .questions
            .get(&question_id)
            .is_some_and(|q| q.test_id == test_id)
        {
            return Err(GradingError::not_found("question", question_id));
        }

        let new_id = tables.next_id();
        let submission = tables
            .submissions
            .get_mut(&submission_id)
            .ok_or(GradingError::not_found("submission", submission_id))?;

        if let Some(existing) = submission
            .answers
            .iter_mut()
            .find(|a| a.question_id == question_id)
        {
            existing.response_data = response;
            existing.answered_at = now;
            existing.is_correct = None;
            existing.score = None;
            existing.feedback = None;
            existing.detail = None;
            existing.graded_by = GradedBy::Unset;
            existing.grading_notes = None;
            existing.graded_at = None;
            return Ok(existing.clone());
        }

        let answer = Answer {
            id: new_id,
            submission_id,
            question_id,
            response_data: response,
            is_correct: None,
            score: None,
            feedback: None,
            detail: None,
            graded_by: GradedBy::Unset,
            grading_notes: None,
            answered_at: now,
            graded_at: None,
        };
        submission.answers.push(answer.clone());
        Ok(answer)
    }

    async fn complete_submission(
        &self,
        submission_id: i64,
        now: DateTime<Utc>,
        grader: &AutoGrader,
    ) -> Result<Submission, GradingError> {
        let mut tables = self.tables.lock().await;
        let (status, test_id) = tables
            .submissions
            .get(&submission_id)
            .map(|s| (s.status, s.test_id))
            .ok_or(GradingError::not_found("submission", submission_id))?;
        ensure_status(submission_id, status, SubmissionStatus::InProgress)?;

        let questions = tables.questions_of(test_id)?;
        let submission = tables
            .submissions
            .get_mut(&submission_id)
            .ok_or(GradingError::not_found("submission", submission_id))?;

        submission.status = SubmissionStatus::Submitted;
        submission.submitted_at = Some(now);

        let verdicts = grader(&questions, &submission.answers);
        for verdict in verdicts {
            let target = submission.answers.iter_mut().find(|a| a.id == verdict.answer_id);
            if let Some(answer) = target {
                answer.is_correct = Some(verdict.is_correct);
                answer.score = Some(verdict.score);
                answer.feedback = Some(verdict.feedback);
                answer.detail = Some(verdict.detail);
                answer.graded_by = GradedBy::Auto;
                answer.graded_at = Some(now);
            }
        }

        submission.status = SubmissionStatus::Graded;
        Ok(submission.clone())
    }

    async fn manually_grade(
        &self,
        answer_id: i64,
        grade: &ManualGradeRequest,
        now: DateTime<Utc>,
    ) -> Result<Answer, GradingError> {
        let mut tables = self.tables.lock().await;
        let (submission_id, status, question_id) = tables
            .submissions
            .values()
            .find_map(|s| {
                s.answers
                    .iter()
                    .find(|a| a.id == answer_id)
                    .map(|a| (s.id, s.status, a.question_id))
            })
            .ok_or(GradingError::not_found("answer", answer_id))?;
        ensure_status(submission_id, status, SubmissionStatus::Graded)?;

        let max_score = tables
            .questions
            .get(&question_id)
            .and_then(|q| tables.exercises.get(&q.exercise_id))
            .map(|e| e.max_score)
            .ok_or(GradingError::not_found("question", question_id))?;

        let answer = tables
            .submissions
            .get_mut(&submission_id)
            .and_then(|s| s.answers.iter_mut().find(|a| a.id == answer_id))
            .ok_or(GradingError::not_found("answer", answer_id))?;

        answer.is_correct = Some(grade.is_correct);
        answer.score = Some(clamp_score(grade.score, max_score));
        answer.feedback = grade.feedback.clone();
        answer.grading_notes = grade.notes.clone();
        answer.graded_by = GradedBy::Manual;
        answer.graded_at = Some(now);
        Ok(answer.clone())
    }
}
