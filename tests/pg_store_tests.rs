// tests/pg_store_tests.rs

//! Runs the atomic store operations against Postgres.
//! Skipped unless DATABASE_URL points at a database the tests may migrate.

use std::sync::Arc;

use chrono::Utc;
use lms_grading::{
    error::GradingError,
    models::{
        assignment::AssignTestRequest,
        exercise::CreateExerciseRequest,
        submission::{GradedBy, ManualGradeRequest, SubmissionStatus},
        test::{AddQuestionRequest, CreateTestRequest},
    },
    services::SubmissionLifecycle,
    store::{GradingStore, PgStore},
};
use serde_json::{Value, json};
use sqlx::postgres::PgPoolOptions;

const STUDENT: i64 = 11;

async fn pg_store() -> Option<Arc<dyn GradingStore>> {
    let Ok(database_url) = std::env::var("DATABASE_URL") else {
        eprintln!("DATABASE_URL not set, skipping Postgres store tests");
        return None;
    };

    let pool = PgPoolOptions::new()
        .max_connections(8)
        .connect(&database_url)
        .await
        .expect("Failed to connect to Postgres for testing. Make sure DATABASE_URL is set.");

    sqlx::migrate!("./migrations")
        .run(&pool)
        .await
        .expect("Failed to migrate database");

    Some(Arc::new(PgStore::new(pool)))
}

fn exercise(value: Value) -> CreateExerciseRequest {
    serde_json::from_value(value).expect("valid exercise payload")
}

/// Creates a fresh test holding the given exercises, assigned to `STUDENT`.
/// Returns (test_id, question ids in order).
async fn seed_test(
    store: &Arc<dyn GradingStore>,
    exercises: Vec<Value>,
    max_attempts: i32,
) -> (i64, Vec<i64>) {
    let test = store
        .create_test(CreateTestRequest {
            title: "Postgres unit".to_string(),
            description: None,
            duration_minutes: None,
            passing_score: Some(50.0),
        })
        .await
        .unwrap();

    let mut question_ids = Vec::new();
    for (order, payload) in exercises.into_iter().enumerate() {
        let ex = store.create_exercise(exercise(payload)).await.unwrap();
        let q = store
            .add_question(
                test.id,
                AddQuestionRequest {
                    exercise_id: ex.id,
                    order: order as i32 + 1,
                    weight: 1.0,
                    is_required: true,
                },
            )
            .await
            .unwrap();
        question_ids.push(q.id);
    }

    store
        .assign_test(
            AssignTestRequest {
                student_id: STUDENT,
                test_id: test.id,
                due_at: None,
                max_attempts,
            },
            Utc::now(),
        )
        .await
        .unwrap();

    (test.id, question_ids)
}

#[tokio::test]
async fn concurrent_starts_never_exceed_the_limit() {
    let Some(store) = pg_store().await else {
        return;
    };
    let (test_id, _) = seed_test(
        &store,
        vec![json!({ "exercise_type": "word_scramble", "correct_answers": ["rust"] })],
        2,
    )
    .await;

    let handles: Vec<_> = (0..8)
        .map(|_| {
            let store = store.clone();
            tokio::spawn(async move { store.start_attempt(STUDENT, test_id, Utc::now()).await })
        })
        .collect();

    let mut started = Vec::new();
    let mut rejected = 0;
    for handle in handles {
        match handle.await.unwrap() {
            Ok(sub) => started.push(sub.attempt_number),
            Err(GradingError::AttemptLimitExceeded { used: 2, max: 2 }) => rejected += 1,
            Err(other) => panic!("unexpected error: {other}"),
        }
    }

    started.sort_unstable();
    assert_eq!(started, vec![1, 2]);
    assert_eq!(rejected, 6);

    let assignment = store
        .get_assignment(STUDENT, test_id)
        .await
        .unwrap()
        .unwrap();
    assert_eq!(assignment.attempts_used, 2);
    assert_eq!(store.list_submissions(STUDENT, test_id).await.unwrap().len(), 2);
}

#[tokio::test]
async fn recording_twice_keeps_the_last_response() {
    let Some(store) = pg_store().await else {
        return;
    };
    let (test_id, questions) = seed_test(
        &store,
        vec![json!({ "exercise_type": "word_scramble", "correct_answers": ["rust"] })],
        1,
    )
    .await;

    let sub = store.start_attempt(STUDENT, test_id, Utc::now()).await.unwrap();
    let first = store
        .record_answer(sub.id, questions[0], json!({ "answer": "tsur" }), Utc::now())
        .await
        .unwrap();
    let second = store
        .record_answer(sub.id, questions[0], json!({ "answer": "rust" }), Utc::now())
        .await
        .unwrap();

    assert_eq!(first.id, second.id);
    assert_eq!(second.response_data, json!({ "answer": "rust" }));

    let stored = store.get_submission(sub.id).await.unwrap().unwrap();
    assert_eq!(stored.answers.len(), 1);
    assert_eq!(stored.answers[0].response_data, json!({ "answer": "rust" }));
    assert_eq!(stored.answers[0].is_correct, None);
}

#[tokio::test]
async fn completion_and_manual_grading_persist() {
    let Some(store) = pg_store().await else {
        return;
    };
    let (test_id, questions) = seed_test(
        &store,
        vec![
            json!({
                "question": "Unscramble the word.",
                "options": { "letters": ["t", "s", "u", "r"] },
                "exercise_type": "word_scramble",
                "correct_answers": ["rust"],
                "scoring_mechanism": { "correctPoints": 2 },
                "max_score": 2
            }),
            json!({
                "exercise_type": "long_answer",
                "correct_answers": [],
                "grading_mode": "manual",
                "max_score": 5
            }),
        ],
        1,
    )
    .await;
    let lifecycle = SubmissionLifecycle::new(store.clone());

    let stored = store.get_questions(test_id).await.unwrap();
    assert_eq!(stored[0].exercise.question, "Unscramble the word.");
    assert_eq!(stored[0].exercise.options, Some(json!({ "letters": ["t", "s", "u", "r"] })));

    let sub = lifecycle.start(STUDENT, test_id).await.unwrap();
    lifecycle
        .record_answer(sub.id, questions[0], json!({ "answer": "RUST" }))
        .await
        .unwrap();
    let essay = lifecycle
        .record_answer(sub.id, questions[1], json!({ "answer": "Ownership." }))
        .await
        .unwrap();

    let result = lifecycle.complete(sub.id).await.unwrap();
    assert_eq!(result.submission.status, SubmissionStatus::Graded);
    assert!(result.submission.submitted_at.is_some());
    assert_eq!(result.score.total_score, 2.0);
    assert_eq!(result.score.max_possible_score, 7.0);
    assert!(result.score.needs_manual_review);

    let err = lifecycle.complete(sub.id).await.unwrap_err();
    assert!(matches!(err, GradingError::InvalidState { .. }));

    // Over-max scores are clamped to the exercise's max
    let graded = lifecycle
        .manually_grade(
            essay.id,
            &ManualGradeRequest {
                is_correct: true,
                score: 9.0,
                feedback: None,
                notes: Some("Thorough".to_string()),
            },
        )
        .await
        .unwrap();
    assert_eq!(graded.answer.score, Some(5.0));
    assert_eq!(graded.answer.graded_by, GradedBy::Manual);
    assert_eq!(graded.score.total_score, 7.0);
    assert!(!graded.score.needs_manual_review);
    assert_eq!(graded.score.is_passing, Some(true));

    let reread = lifecycle.get_result(sub.id).await.unwrap();
    assert_eq!(reread.score, graded.score);
}
