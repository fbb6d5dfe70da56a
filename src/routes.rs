// src/routes.rs

use axum::{
    Router,
    http::{Method, header},
    routing::{get, post, put},
};
use tower::ServiceBuilder;
use tower_http::{cors::CorsLayer, trace::TraceLayer};

use crate::{
    handlers::{assignments, exercises, students, submissions, tests},
    state::AppState,
};

/// Assembles the main application router.
///
/// * Authoring: exercises, tests, assignments.
/// * Learner flow: submissions and their answers.
/// * Global middleware (Trace, CORS) is applied once around everything.
pub fn create_router(state: AppState) -> Router {
    let cors = CorsLayer::new()
        .allow_origin(tower_http::cors::Any)
        .allow_methods([Method::GET, Method::POST, Method::PUT])
        .allow_headers([header::CONTENT_TYPE]);

    let exercise_routes = Router::new()
        .route("/", post(exercises::create_exercise))
        .route("/{id}", get(exercises::get_exercise))
        .route("/{id}/evaluate", post(exercises::evaluate_exercise));

    let test_routes = Router::new()
        .route("/", post(tests::create_test))
        .route("/{id}", get(tests::get_test))
        .route("/{id}/questions", post(tests::add_question));

    let submission_routes = Router::new()
        .route("/", post(submissions::start_submission))
        .route("/{id}", get(submissions::get_submission))
        .route(
            "/{id}/answers/{question_id}",
            put(submissions::record_answer),
        )
        .route("/{id}/complete", post(submissions::complete_submission));

    let api = Router::new()
        .nest("/exercises", exercise_routes)
        .nest("/tests", test_routes)
        .route("/assignments", put(assignments::assign_test))
        .nest("/submissions", submission_routes)
        .route("/answers/{id}/grade", post(submissions::grade_answer))
        .route("/students/{id}/overview", get(students::student_overview));

    Router::new()
        .nest("/api", api)
        .layer(
            ServiceBuilder::new()
                .layer(TraceLayer::new_for_http())
                .layer(cors),
        )
        .with_state(state)
}
