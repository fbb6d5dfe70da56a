// src/handlers/tests.rs

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
    models::test::{AddQuestionRequest, CreateTestRequest, PublicQuestion, TestResponse},
    store::GradingStore,
};

pub async fn create_test(
    State(store): State<Arc<dyn GradingStore>>,
    Json(payload): Json<CreateTestRequest>,
) -> Result<impl IntoResponse, AppError> {
    payload.validate()?;

    let test = store.create_test(payload).await?;
    tracing::info!(test_id = test.id, "Test created");

    Ok((StatusCode::CREATED, Json(test)))
}

/// Returns a test with its questions as learners see them (no answer keys).
pub async fn get_test(
    State(store): State<Arc<dyn GradingStore>>,
    Path(id): Path<i64>,
) -> Result<impl IntoResponse, AppError> {
    let test = store
        .get_test(id)
        .await?
        .ok_or_else(|| AppError::NotFound(format!("test {} not found", id)))?;
    let questions = store.get_questions(id).await?;

    Ok(Json(TestResponse {
        test,
        questions: questions.iter().map(PublicQuestion::from).collect(),
    }))
}

pub async fn add_question(
    State(store): State<Arc<dyn GradingStore>>,
    Path(test_id): Path<i64>,
    Json(payload): Json<AddQuestionRequest>,
) -> Result<impl IntoResponse, AppError> {
    payload.validate()?;

    let question = store.add_question(test_id, payload).await?;
    tracing::info!(
        test_id,
        question_id = question.id,
        order = question.order,
        "Question added"
    );

    Ok((StatusCode::CREATED, Json(PublicQuestion::from(&question))))
}
