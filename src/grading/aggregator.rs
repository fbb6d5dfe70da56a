// src/grading/aggregator.rs

use crate::{
    grading::dispatcher::{clamp_score, requires_manual_grading},
    models::{score::Score, submission::Submission, test::TestQuestion},
};

/// Combines per-question results into a submission score.
///
/// * Questions are weighted; unanswered ones score 0 but still count towards
///   `max_possible_score`.
/// * Each answer's score is clamped to its exercise's max before weighting.
/// * Pure and deterministic, so it is safe to re-run after manual grading.
pub fn aggregate(
    submission: &Submission,
    questions: &[TestQuestion],
    passing_score: Option<f64>,
) -> Score {
    let mut ordered: Vec<&TestQuestion> = questions.iter().collect();
    ordered.sort_by_key(|q| (q.order, q.id));

    let mut total_score = 0.0;
    let mut max_possible_score = 0.0;
    let mut answered_count = 0;
    let mut correct_count = 0;
    let mut pending_review_count = 0;

    for question in &ordered {
        let max_score = question.exercise.max_score;
        max_possible_score += question.weight * f64::from(max_score);

        let Some(answer) = submission.answer_for(question.id) else {
            continue;
        };
        answered_count += 1;
        total_score += question.weight * clamp_score(answer.score.unwrap_or(0.0), max_score);

        match answer.is_correct {
            Some(true) => correct_count += 1,
            Some(false) => {}
            None if requires_manual_grading(&question.exercise) => pending_review_count += 1,
            None => {}
        }
    }

    let percentage = if max_possible_score > 0.0 {
        (total_score / max_possible_score * 100.0).clamp(0.0, 100.0)
    } else {
        0.0
    };

    Score {
        total_score,
        max_possible_score,
        percentage,
        is_passing: passing_score.map(|threshold| percentage >= threshold),
        needs_manual_review: pending_review_count > 0,
        question_count: ordered.len(),
        answered_count,
        correct_count,
        pending_review_count,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::{
        exercise::{Exercise, GradingMode, ScoringMechanism, ValidationRules},
        submission::{Answer, GradedBy, SubmissionStatus},
    };
    use chrono::Utc;
    use serde_json::json;

    fn question(
        id: i64,
        order: i32,
        weight: f64,
        max_score: u32,
        mode: GradingMode,
    ) -> TestQuestion {
        TestQuestion {
            id,
            test_id: 1,
            order,
            weight,
            is_required: true,
            exercise: Exercise {
                id: id * 10,
                title: String::new(),
                question: String::new(),
                instructions: None,
                options: None,
                exercise_type: "short_answer".to_string(),
                correct_answers: json!(["x"]),
                alternate_answers: None,
                validation_rules: ValidationRules::default(),
                scoring_mechanism: ScoringMechanism::default(),
                max_score,
                grading_mode: mode,
                created_at: None,
            },
        }
    }

    fn answer(question_id: i64, is_correct: Option<bool>, score: Option<f64>) -> Answer {
        Answer {
            id: question_id * 100,
            submission_id: 1,
            question_id,
            response_data: json!("x"),
            is_correct,
            score,
            feedback: None,
            detail: None,
            graded_by: if is_correct.is_some() { GradedBy::Auto } else { GradedBy::Unset },
            grading_notes: None,
            answered_at: Utc::now(),
            graded_at: None,
        }
    }

    fn submission(answers: Vec<Answer>) -> Submission {
        Submission {
            id: 1,
            student_id: 1,
            test_id: 1,
            status: SubmissionStatus::Graded,
            attempt_number: 1,
            started_at: Utc::now(),
            submitted_at: Some(Utc::now()),
            answers,
        }
    }

    #[test]
    fn weights_scores_and_counts_missing_answers() {
        let questions = vec![
            question(1, 1, 2.0, 5, GradingMode::Auto),
            question(2, 2, 1.0, 10, GradingMode::Auto),
        ];
        let sub = submission(vec![answer(1, Some(true), Some(5.0))]);
        let score = aggregate(&sub, &questions, Some(50.0));

        assert_eq!(score.max_possible_score, 20.0);
        assert_eq!(score.total_score, 10.0);
        assert_eq!(score.percentage, 50.0);
        assert_eq!(score.is_passing, Some(true));
        assert_eq!(score.answered_count, 1);
        assert_eq!(score.correct_count, 1);
        assert_eq!(score.question_count, 2);
    }

    #[test]
    fn answer_scores_are_clamped_before_weighting() {
        let questions = vec![question(1, 1, 3.0, 2, GradingMode::Auto)];
        let sub = submission(vec![answer(1, Some(true), Some(9.0))]);
        let score = aggregate(&sub, &questions, None);
        assert_eq!(score.total_score, 6.0);
        assert_eq!(score.percentage, 100.0);
        assert_eq!(score.is_passing, None);
    }

    #[test]
    fn zero_max_possible_score_gives_zero_percentage() {
        let questions = vec![question(1, 1, 1.0, 0, GradingMode::Auto)];
        let sub = submission(vec![answer(1, Some(true), Some(0.0))]);
        let score = aggregate(&sub, &questions, Some(0.0));
        assert_eq!(score.percentage, 0.0);
        assert_eq!(score.is_passing, Some(true));

        let empty = aggregate(&submission(vec![]), &[], Some(60.0));
        assert_eq!(empty.percentage, 0.0);
        assert_eq!(empty.is_passing, Some(false));
    }

    #[test]
    fn ungraded_manual_answers_flag_review() {
        let questions = vec![
            question(1, 1, 1.0, 4, GradingMode::Auto),
            question(2, 2, 1.0, 4, GradingMode::Manual),
        ];
        let sub = submission(vec![answer(1, Some(true), Some(4.0)), answer(2, None, None)]);
        let score = aggregate(&sub, &questions, Some(60.0));
        assert!(score.needs_manual_review);
        assert_eq!(score.pending_review_count, 1);
        assert_eq!(score.percentage, 50.0);
        assert_eq!(score.is_passing, Some(false));

        let graded = submission(vec![
            answer(1, Some(true), Some(4.0)),
            answer(2, Some(true), Some(3.0)),
        ]);
        let score = aggregate(&graded, &questions, Some(60.0));
        assert!(!score.needs_manual_review);
        assert_eq!(score.percentage, 87.5);
        assert_eq!(score.is_passing, Some(true));
    }

    #[test]
    fn aggregation_is_idempotent() {
        let questions = vec![
            question(2, 2, 0.5, 3, GradingMode::Auto),
            question(1, 1, 1.5, 7, GradingMode::Manual),
        ];
        let sub = submission(vec![answer(2, Some(false), Some(1.0)), answer(1, None, None)]);
        assert_eq!(
            aggregate(&sub, &questions, Some(40.0)),
            aggregate(&sub, &questions, Some(40.0))
        );
    }
}
