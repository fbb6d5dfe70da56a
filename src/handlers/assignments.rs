// src/handlers/assignments.rs

use std::sync::Arc;

use axum::{Json, extract::State, response::IntoResponse};
use chrono::Utc;
use validator::Validate;

use crate::{error::AppError, models::assignment::AssignTestRequest, store::GradingStore};

/// Assigns a test to a student, or updates the due date and attempt limit
/// of an existing assignment. Attempts already used are kept.
pub async fn assign_test(
    State(store): State<Arc<dyn GradingStore>>,
    Json(payload): Json<AssignTestRequest>,
) -> Result<impl IntoResponse, AppError> {
    payload.validate()?;

    let assignment = store.assign_test(payload, Utc::now()).await?;
    tracing::info!(
        student_id = assignment.student_id,
        test_id = assignment.test_id,
        max_attempts = assignment.max_attempts,
        "Test assigned"
    );

    Ok(Json(assignment))
}
