// src/handlers/students.rs

use axum::{
    Json,
    extract::{Path, State},
    response::IntoResponse,
};

use crate::{error::AppError, services::SubmissionLifecycle};

/// Assignments of a student with attempts and best results.
pub async fn student_overview(
    State(lifecycle): State<SubmissionLifecycle>,
    Path(student_id): Path<i64>,
) -> Result<impl IntoResponse, AppError> {
    let overview = lifecycle.student_overview(student_id).await?;
    Ok(Json(overview))
}
