// src/grading/dispatcher.rs

use serde_json::Value;

use crate::{
    grading::evaluators::{self, EvaluationContext, Verdict},
    models::exercise::{Exercise, ExerciseType, GradingMode},
};

/// The closed set of evaluators. Each exercise type maps to exactly one.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Evaluator {
    MultipleChoice,
    TrueFalse,
    Blanks,
    Matching,
    Reordering,
    ShortAnswer,
    WordScramble,
    ManualReview,
}

impl Evaluator {
    pub fn evaluate(self, ctx: &EvaluationContext<'_>, response: &Value) -> Verdict {
        match self {
            Evaluator::MultipleChoice => evaluators::multiple_choice(ctx, response),
            Evaluator::TrueFalse => evaluators::true_false(ctx, response),
            Evaluator::Blanks => evaluators::fill_blank(ctx, response),
            Evaluator::Matching => evaluators::matching(ctx, response),
            Evaluator::Reordering => evaluators::sentence_reordering(ctx, response),
            Evaluator::ShortAnswer => evaluators::short_answer(ctx, response),
            Evaluator::WordScramble => evaluators::word_scramble(ctx, response),
            Evaluator::ManualReview => Verdict::pending_review(response),
        }
    }

    pub fn is_manual(self) -> bool {
        self == Evaluator::ManualReview
    }
}

/// Exhaustive, so a new `ExerciseType` variant must be given an evaluator here.
pub fn evaluator_for(kind: ExerciseType) -> Evaluator {
    match kind {
        ExerciseType::MultipleChoice => Evaluator::MultipleChoice,
        ExerciseType::TrueFalse => Evaluator::TrueFalse,
        ExerciseType::FillBlank | ExerciseType::ClozeTest => Evaluator::Blanks,
        ExerciseType::MatchingWords | ExerciseType::ImageLabeling => Evaluator::Matching,
        ExerciseType::SentenceReordering => Evaluator::Reordering,
        ExerciseType::ShortAnswer | ExerciseType::SynAnt => Evaluator::ShortAnswer,
        ExerciseType::WordScramble => Evaluator::WordScramble,
        ExerciseType::LongAnswer | ExerciseType::Comprehension => Evaluator::ManualReview,
    }
}

/// Looks up the evaluator for a raw type tag (case-insensitive).
/// Unrecognized tags resolve to manual review and are never auto-scored.
pub fn dispatch(exercise_type: &str) -> Evaluator {
    exercise_type
        .parse::<ExerciseType>()
        .map(evaluator_for)
        .unwrap_or(Evaluator::ManualReview)
}

/// Evaluator for a concrete exercise; manual grading mode overrides the type.
pub fn resolve(exercise: &Exercise) -> Evaluator {
    match exercise.grading_mode {
        GradingMode::Manual => Evaluator::ManualReview,
        GradingMode::Auto => dispatch(&exercise.exercise_type),
    }
}

/// True when answers to this exercise wait for an instructor.
pub fn requires_manual_grading(exercise: &Exercise) -> bool {
    resolve(exercise).is_manual()
}

/// Keeps a score inside `[0, max_score]`. Non-finite scores become 0.
pub fn clamp_score(score: f64, max_score: u32) -> f64 {
    if score.is_finite() {
        score.clamp(0.0, f64::from(max_score))
    } else {
        0.0
    }
}

/// Evaluates a response against an exercise and clamps the score.
pub fn evaluate(exercise: &Exercise, response: &Value) -> Verdict {
    let ctx = EvaluationContext::from(exercise);
    let mut verdict = resolve(exercise).evaluate(&ctx, response);
    verdict.score = clamp_score(verdict.score, exercise.max_score);
    verdict
}
