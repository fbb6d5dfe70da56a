// src/handlers/submissions.rs

use axum::{
    Json,
    extract::{Path, State},
    http::StatusCode,
    response::IntoResponse,
};
use validator::Validate;

use crate::{
    error::AppError,
    models::submission::{ManualGradeRequest, RecordAnswerRequest, StartSubmissionRequest},
    services::SubmissionLifecycle,
};

/// Starts a new attempt. Fails with 403 when no attempts remain, the test
/// is past due or not assigned to the student.
pub async fn start_submission(
    State(lifecycle): State<SubmissionLifecycle>,
    Json(payload): Json<StartSubmissionRequest>,
) -> Result<impl IntoResponse, AppError> {
    let submission = lifecycle.start(payload.student_id, payload.test_id).await?;
    Ok((StatusCode::CREATED, Json(submission)))
}

pub async fn get_submission(
    State(lifecycle): State<SubmissionLifecycle>,
    Path(id): Path<i64>,
) -> Result<impl IntoResponse, AppError> {
    let result = lifecycle.get_result(id).await?;
    Ok(Json(result))
}

pub async fn record_answer(
    State(lifecycle): State<SubmissionLifecycle>,
    Path((id, question_id)): Path<(i64, i64)>,
    Json(payload): Json<RecordAnswerRequest>,
) -> Result<impl IntoResponse, AppError> {
    payload.validate()?;

    let answer = lifecycle
        .record_answer(id, question_id, payload.response_data)
        .await?;
    Ok(Json(answer))
}

pub async fn complete_submission(
    State(lifecycle): State<SubmissionLifecycle>,
    Path(id): Path<i64>,
) -> Result<impl IntoResponse, AppError> {
    let result = lifecycle.complete(id).await?;
    Ok(Json(result))
}

/// Instructor grading of a single answer; returns the recomputed score.
pub async fn grade_answer(
    State(lifecycle): State<SubmissionLifecycle>,
    Path(answer_id): Path<i64>,
    Json(payload): Json<ManualGradeRequest>,
) -> Result<impl IntoResponse, AppError> {
    payload.validate()?;

    let result = lifecycle.manually_grade(answer_id, &payload).await?;
    Ok(Json(result))
}
