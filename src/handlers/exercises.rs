// src/handlers/exercises.rs

use std::sync::Arc;

use axum::{
    Json,
    extract::{Path, State},
    http::StatusCode,
    response::IntoResponse,
};
use validator::Validate;

use crate::{
    error::AppError,
    models::exercise::{CreateExerciseRequest, EvaluateRequest, ExerciseType},
    services::SubmissionLifecycle,
    store::GradingStore,
};

/// Registers an exercise with its answer key.
///
/// Unknown type tags are accepted and stored as-is; their answers are left
/// for manual review.
pub async fn create_exercise(
    State(store): State<Arc<dyn GradingStore>>,
    Json(payload): Json<CreateExerciseRequest>,
) -> Result<impl IntoResponse, AppError> {
    payload.validate()?;

    if payload.exercise_type.parse::<ExerciseType>().is_err() {
        tracing::warn!(
            exercise_type = %payload.exercise_type,
            "Registering exercise with unknown type; it will need manual review"
        );
    }

    let exercise = store.create_exercise(payload).await?;
    tracing::info!(
        exercise_id = exercise.id,
        exercise_type = %exercise.exercise_type,
        "Exercise created"
    );

    Ok((StatusCode::CREATED, Json(exercise)))
}

/// Returns the exercise including its answer key (authoring view).
pub async fn get_exercise(
    State(store): State<Arc<dyn GradingStore>>,
    Path(id): Path<i64>,
) -> Result<impl IntoResponse, AppError> {
    let exercise = store
        .get_exercise(id)
        .await?
        .ok_or_else(|| AppError::NotFound(format!("exercise {} not found", id)))?;

    Ok(Json(exercise))
}

/// Grades a response without recording anything.
pub async fn evaluate_exercise(
    State(lifecycle): State<SubmissionLifecycle>,
    Path(id): Path<i64>,
    Json(payload): Json<EvaluateRequest>,
) -> Result<impl IntoResponse, AppError> {
    payload.validate()?;

    let verdict = lifecycle.evaluate_exercise(id, &payload.response).await?;
    Ok(Json(verdict))
}
