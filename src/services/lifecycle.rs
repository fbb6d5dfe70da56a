// src/services/lifecycle.rs

use std::sync::Arc;

use chrono::{DateTime, Utc};
use serde_json::Value;

use crate::{
    error::GradingError,
    grading::{
        aggregate,
        dispatcher::{self, requires_manual_grading},
        Verdict,
    },
    models::{
        exercise::ExerciseType,
        score::{AssignmentOverview, AttemptSummary},
        submission::{
            Answer, AnswerVerdict, ManualGradeRequest, ManualGradeResult, Submission,
            SubmissionResult, SubmissionStatus,
        },
        test::TestQuestion,
    },
    store::GradingStore,
};

/// Rejects an operation unless the submission is in `expected`.
pub fn ensure_status(
    submission_id: i64,
    actual: SubmissionStatus,
    expected: SubmissionStatus,
) -> Result<(), GradingError> {
    if actual == expected {
        Ok(())
    } else {
        Err(GradingError::InvalidState {
            submission_id,
            expected: expected.as_str(),
            actual: actual.as_str(),
        })
    }
}

/// Evaluates every answer whose exercise is auto-gradable.
/// Answers to manual (or unrecognized) exercises get no verdict.
pub fn grade_auto_answers(questions: &[TestQuestion], answers: &[Answer]) -> Vec<AnswerVerdict> {
    answers
        .iter()
        .filter_map(|answer| {
            let question = questions.iter().find(|q| q.id == answer.question_id)?;
            if requires_manual_grading(&question.exercise) {
                return None;
            }
            let verdict = dispatcher::evaluate(&question.exercise, &answer.response_data);
            Some(AnswerVerdict {
                answer_id: answer.id,
                is_correct: verdict.is_correct,
                score: verdict.score,
                feedback: verdict.feedback,
                detail: verdict.detail,
            })
        })
        .collect()
}

/// State machine for a single test attempt:
/// `in_progress` -> `submitted` -> `graded`.
///
/// Every method is an independent unit of work; cross-request atomicity is
/// delegated to the store.
#[derive(Clone)]
pub struct SubmissionLifecycle {
    store: Arc<dyn GradingStore>,
}

impl SubmissionLifecycle {
    pub fn new(store: Arc<dyn GradingStore>) -> Self {
        Self { store }
    }

    pub fn store(&self) -> &Arc<dyn GradingStore> {
        &self.store
    }

    pub async fn start(&self, student_id: i64, test_id: i64) -> Result<Submission, GradingError> {
        self.start_at(student_id, test_id, Utc::now()).await
    }

    /// Starts an attempt as of `now` (used for due-date checks).
    pub async fn start_at(
        &self,
        student_id: i64,
        test_id: i64,
        now: DateTime<Utc>,
    ) -> Result<Submission, GradingError> {
        match self.store.start_attempt(student_id, test_id, now).await {
            Ok(submission) => {
                tracing::info!(
                    submission_id = submission.id,
                    student_id,
                    test_id,
                    attempt = submission.attempt_number,
                    "Attempt started"
                );
                Ok(submission)
            }
            Err(e) => {
                tracing::warn!(student_id, test_id, "Attempt rejected: {}", e);
                Err(e)
            }
        }
    }

    /// Upserts the learner's response for one question (last write wins).
    pub async fn record_answer(
        &self,
        submission_id: i64,
        question_id: i64,
        response: Value,
    ) -> Result<Answer, GradingError> {
        let submission = self.load_submission(submission_id).await?;
        ensure_status(submission.id, submission.status, SubmissionStatus::InProgress)?;

        let questions = self.store.get_questions(submission.test_id).await?;
        if !questions.iter().any(|q| q.id == question_id) {
            return Err(GradingError::not_found("question", question_id));
        }

        let answer = self
            .store
            .record_answer(submission_id, question_id, response, Utc::now())
            .await?;
        tracing::debug!(submission_id, question_id, answer_id = answer.id, "Answer recorded");
        Ok(answer)
    }

    /// Submits the attempt, auto-grades what can be auto-graded and returns
    /// the graded submission with its score.
    pub async fn complete(&self, submission_id: i64) -> Result<SubmissionResult, GradingError> {
        let submission = self
            .store
            .complete_submission(submission_id, Utc::now(), &grade_auto_answers)
            .await?;

        let (questions, passing_score) = self.test_context(submission.test_id).await?;
        for q in &questions {
            if q.exercise.exercise_type.parse::<ExerciseType>().is_err() {
                tracing::warn!(
                    exercise_id = q.exercise.id,
                    exercise_type = %q.exercise.exercise_type,
                    "Unknown exercise type, left for manual review"
                );
            }
        }

        let score = aggregate(&submission, &questions, passing_score);
        tracing::info!(
            submission_id,
            percentage = score.percentage,
            needs_manual_review = score.needs_manual_review,
            "Submission graded"
        );
        Ok(SubmissionResult { submission, score })
    }

    /// Records an instructor's verdict and returns the recomputed score.
    pub async fn manually_grade(
        &self,
        answer_id: i64,
        grade: &ManualGradeRequest,
    ) -> Result<ManualGradeResult, GradingError> {
        if !grade.score.is_finite() || grade.score < 0.0 {
            return Err(GradingError::Validation(
                "score must be a non-negative number".to_string(),
            ));
        }

        let answer = self.store.manually_grade(answer_id, grade, Utc::now()).await?;
        let result = self.get_result(answer.submission_id).await?;
        tracing::info!(
            answer_id,
            submission_id = answer.submission_id,
            percentage = result.score.percentage,
            "Answer graded manually"
        );

        Ok(ManualGradeResult {
            answer,
            score: result.score,
        })
    }

    /// Current state of a submission and its freshly derived score.
    pub async fn get_result(&self, submission_id: i64) -> Result<SubmissionResult, GradingError> {
        let submission = self.load_submission(submission_id).await?;
        let (questions, passing_score) = self.test_context(submission.test_id).await?;
        let score = aggregate(&submission, &questions, passing_score);
        Ok(SubmissionResult { submission, score })
    }

    /// Every assignment of a student with its attempts and best result.
    pub async fn student_overview(
        &self,
        student_id: i64,
    ) -> Result<Vec<AssignmentOverview>, GradingError> {
        let assignments = self.store.list_assignments(student_id).await?;
        let mut overview = Vec::with_capacity(assignments.len());

        for assignment in assignments {
            let test = self
                .store
                .get_test(assignment.test_id)
                .await?
                .ok_or(GradingError::not_found("test", assignment.test_id))?;
            let questions = self.store.get_questions(test.id).await?;
            let submissions = self.store.list_submissions(student_id, test.id).await?;

            let attempts: Vec<AttemptSummary> = submissions
                .into_iter()
                .map(|submission| {
                    let score = (submission.status == SubmissionStatus::Graded)
                        .then(|| aggregate(&submission, &questions, test.passing_score));
                    AttemptSummary { submission, score }
                })
                .collect();

            let best_percentage = attempts
                .iter()
                .filter_map(|a| a.score.as_ref().map(|s| s.percentage))
                .fold(None, |best: Option<f64>, p| Some(best.map_or(p, |b| b.max(p))));
            let has_passed = attempts
                .iter()
                .any(|a| a.score.as_ref().and_then(|s| s.is_passing) == Some(true));

            overview.push(AssignmentOverview {
                attempts_remaining: assignment.attempts_remaining(),
                assignment,
                test_title: test.title,
                submissions: attempts,
                best_percentage,
                has_passed,
            });
        }

        Ok(overview)
    }

    /// Grades a response against a stored exercise without recording it.
    pub async fn evaluate_exercise(
        &self,
        exercise_id: i64,
        response: &Value,
    ) -> Result<Verdict, GradingError> {
        let exercise = self
            .store
            .get_exercise(exercise_id)
            .await?
            .ok_or(GradingError::not_found("exercise", exercise_id))?;
        Ok(dispatcher::evaluate(&exercise, response))
    }

    async fn load_submission(&self, submission_id: i64) -> Result<Submission, GradingError> {
        self.store
            .get_submission(submission_id)
            .await?
            .ok_or(GradingError::not_found("submission", submission_id))
    }

    async fn test_context(
        &self,
        test_id: i64,
    ) -> Result<(Vec<TestQuestion>, Option<f64>), GradingError> {
        let test = self
            .store
            .get_test(test_id)
            .await?
            .ok_or(GradingError::not_found("test", test_id))?;
        let questions = self.store.get_questions(test_id).await?;
        Ok((questions, test.passing_score))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn ensure_status_reports_both_states() {
        assert!(
            ensure_status(1, SubmissionStatus::InProgress, SubmissionStatus::InProgress).is_ok()
        );
        let err =
            ensure_status(1, SubmissionStatus::Graded, SubmissionStatus::InProgress).unwrap_err();
        assert!(matches!(
            err,
            GradingError::InvalidState {
                expected: "in_progress",
                actual: "graded",
                ..
            }
        ));
    }
}
