// src/grading/evaluators.rs

//! One pure evaluator per exercise family.
//!
//! Evaluators are total: a response of the wrong shape yields a zero-score
//! verdict whose `detail.error` names the problem, never an `Err`.

use std::collections::{BTreeMap, BTreeSet};

use serde::Serialize;
use serde_json::{Value, json};

use crate::{
    grading::text::{
        normalize, normalized_scalar, parse_bool, response_field, round_half_up, scalar_text,
        tokenize,
    },
    models::exercise::{
        AlternateAnswers, Exercise, MatchStrategy, ScoringMechanism, ValidationRules,
    },
};

pub const MANUAL_REVIEW_FEEDBACK: &str = "pending manual review";

/// Outcome of evaluating one response.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Verdict {
    pub is_correct: bool,
    pub score: f64,
    pub feedback: String,
    pub detail: Value,
}

impl Verdict {
    /// Zero-score verdict for a response of the wrong shape.
    pub fn format_error(code: &str, feedback: impl Into<String>) -> Self {
        Self {
            is_correct: false,
            score: 0.0,
            feedback: feedback.into(),
            detail: json!({ "error": code }),
        }
    }

    /// Zero-score verdict for an exercise whose answer key cannot be read.
    fn invalid_key() -> Self {
        Self {
            is_correct: false,
            score: 0.0,
            feedback: "This exercise cannot be graded automatically: its answer key is malformed."
                .to_string(),
            detail: json!({ "error": "invalid_answer_key" }),
        }
    }

    pub fn pending_review(response: &Value) -> Self {
        Self {
            is_correct: false,
            score: 0.0,
            feedback: MANUAL_REVIEW_FEEDBACK.to_string(),
            detail: json!({ "needs_review": true, "response": response }),
        }
    }

    pub fn error_code(&self) -> Option<&str> {
        self.detail.get("error").and_then(Value::as_str)
    }
}

/// Everything an evaluator reads from an exercise.
#[derive(Debug, Clone, Copy)]
pub struct EvaluationContext<'a> {
    pub correct_answers: &'a Value,
    pub alternate_answers: Option<&'a AlternateAnswers>,
    pub rules: &'a ValidationRules,
    pub scoring: &'a ScoringMechanism,
    pub max_score: u32,
}

impl<'a> From<&'a Exercise> for EvaluationContext<'a> {
    fn from(exercise: &'a Exercise) -> Self {
        Self {
            correct_answers: &exercise.correct_answers,
            alternate_answers: exercise.alternate_answers.as_ref(),
            rules: &exercise.validation_rules,
            scoring: &exercise.scoring_mechanism,
            max_score: exercise.max_score,
        }
    }
}

impl<'a> EvaluationContext<'a> {
    fn case_sensitive(&self) -> bool {
        self.rules.case_sensitive
    }

    fn norm(&self, s: &str) -> String {
        normalize(s, self.case_sensitive())
    }

    /// Whether `given` equals `expected` or one of `alternates` under the case rule.
    fn matches_any(&self, given: &str, expected: &str, alternates: &[String]) -> bool {
        given == self.norm(expected) || alternates.iter().any(|alt| given == self.norm(alt))
    }

    fn all_alternates(&self) -> Vec<&'a str> {
        self.alternate_answers
            .map(AlternateAnswers::flatten)
            .unwrap_or_default()
    }

    fn alternates_at(&self, idx: usize) -> &'a [String] {
        self.alternate_answers.map(|a| a.at(idx)).unwrap_or(&[])
    }

    fn alternates_for(&self, key: &str) -> &'a [String] {
        self.alternate_answers.map(|a| a.for_key(key)).unwrap_or(&[])
    }

    /// The key as a list of scalar strings. A lone scalar counts as a list of one.
    fn scalar_key(&self) -> Option<Vec<String>> {
        match self.correct_answers {
            Value::Array(items) => items.iter().map(scalar_text).collect(),
            other => scalar_text(other).map(|s| vec![s]),
        }
    }
}

// ---------------------------------------------------------------------------
// multiple_choice
// ---------------------------------------------------------------------------

pub fn multiple_choice(ctx: &EvaluationContext<'_>, response: &Value) -> Verdict {
    let Some(correct) = ctx.scalar_key() else {
        return Verdict::invalid_key();
    };
    if correct.is_empty() {
        return Verdict::invalid_key();
    }

    let field = response_field(response, &["selected_options", "selected_option", "answer"]);
    let selected = match field {
        Value::Null => Some(Vec::new()),
        Value::Array(items) => items.iter().map(scalar_text).collect(),
        Value::Object(_) => None,
        scalar => scalar_text(scalar).map(|s| vec![s]),
    };
    let Some(selected) = selected else {
        return Verdict::format_error(
            "invalid_format",
            "Invalid response format. Please select an option.",
        );
    };

    let user_set: BTreeSet<String> = selected.iter().map(|s| ctx.norm(s)).collect();
    let correct_set: BTreeSet<String> = correct.iter().map(|s| ctx.norm(s)).collect();

    if !ctx.rules.allow_multiple && user_set.len() > 1 {
        return Verdict::format_error(
            "multiple_selections_not_allowed",
            "Please select only one option.",
        );
    }

    let overlap = user_set.intersection(&correct_set).count();
    let is_correct = user_set == correct_set;

    let score = if is_correct {
        ctx.scoring.correct_points
    } else if ctx.scoring.allow_partial && overlap > 0 {
        round_half_up(ctx.scoring.correct_points * overlap as f64 / correct_set.len() as f64)
    } else {
        ctx.scoring.incorrect_points
    };

    Verdict {
        is_correct,
        score,
        feedback: if is_correct {
            "Correct! Well done.".to_string()
        } else {
            "Incorrect. Please try again.".to_string()
        },
        detail: json!({
            "user_selections": selected,
            "correct_answers": correct,
            "partially_correct": !is_correct && overlap > 0,
        }),
    }
}

// ---------------------------------------------------------------------------
// true_false
// ---------------------------------------------------------------------------

fn bool_list(value: &Value) -> Option<Vec<bool>> {
    match value {
        Value::Array(items) => items.iter().map(parse_bool).collect(),
        other => parse_bool(other).map(|b| vec![b]),
    }
}

pub fn true_false(ctx: &EvaluationContext<'_>, response: &Value) -> Verdict {
    let Some(correct) = bool_list(ctx.correct_answers) else {
        return Verdict::invalid_key();
    };
    if correct.is_empty() {
        return Verdict::invalid_key();
    }

    let Some(given) = bool_list(response_field(response, &["answers", "answer", "is_true"])) else {
        return Verdict::format_error(
            "invalid_format",
            "Invalid response format. Please provide boolean values.",
        );
    };

    if given.len() != correct.len() {
        return Verdict::format_error(
            "incomplete_answers",
            format!("Please answer all {} questions.", correct.len()),
        );
    }

    let results: BTreeMap<String, Value> = given
        .iter()
        .zip(&correct)
        .enumerate()
        .map(|(idx, (user, expected))| {
            (
                format!("question_{}", idx),
                json!({
                    "user_answer": user,
                    "correct_answer": expected,
                    "is_correct": user == expected,
                }),
            )
        })
        .collect();
    let correct_count = given.iter().zip(&correct).filter(|(u, c)| u == c).count();
    let total = correct.len();
    let is_correct = correct_count == total;

    Verdict {
        is_correct,
        score: ctx.scoring.points_per_correct * correct_count as f64,
        feedback: if is_correct {
            "All answers correct!".to_string()
        } else {
            format!("You got {} out of {} correct.", correct_count, total)
        },
        detail: json!({
            "question_results": results,
            "correct_count": correct_count,
            "total_questions": total,
        }),
    }
}

// ---------------------------------------------------------------------------
// fill_blank / cloze_test
// ---------------------------------------------------------------------------

struct Blank<'a> {
    key: String,
    position: usize,
    expected: String,
    alternates: &'a [String],
}

fn blanks<'a>(ctx: &EvaluationContext<'a>) -> Option<Vec<Blank<'a>>> {
    match ctx.correct_answers {
        Value::Array(items) => items
            .iter()
            .enumerate()
            .map(|(idx, v)| {
                Some(Blank {
                    key: idx.to_string(),
                    position: idx,
                    expected: scalar_text(v)?,
                    alternates: ctx.alternates_at(idx),
                })
            })
            .collect(),
        Value::Object(map) => {
            let mut keys: Vec<&String> = map.keys().collect();
            keys.sort_by(|a, b| (trailing_index(a), *a).cmp(&(trailing_index(b), *b)));
            keys.into_iter()
                .enumerate()
                .map(|(idx, k)| {
                    Some(Blank {
                        key: k.clone(),
                        position: idx,
                        expected: scalar_text(&map[k.as_str()])?,
                        alternates: ctx.alternates_for(k),
                    })
                })
                .collect()
        }
        _ => None,
    }
}

/// Numeric suffix of a blank key (`gap10` -> 10), so keyed blanks keep their
/// natural order when an array response is read by position.
fn trailing_index(key: &str) -> Option<u64> {
    let digits = key.len() - key.trim_end_matches(|c: char| c.is_ascii_digit()).len();
    key[key.len() - digits..].parse().ok()
}

/// Array responses are read by position, object responses by blank key.
fn blank_response<'v>(given: &'v Value, blank: &Blank<'_>) -> Option<&'v Value> {
    match given {
        Value::Array(items) => items.get(blank.position),
        Value::Object(map) => map.get(&blank.key),
        _ => None,
    }
}

pub fn fill_blank(ctx: &EvaluationContext<'_>, response: &Value) -> Verdict {
    let Some(blanks) = blanks(ctx) else {
        return Verdict::invalid_key();
    };
    if blanks.is_empty() {
        return Verdict::invalid_key();
    }

    let given = response_field(response, &["answers", "blanks", "answer", "text"]);
    let single_blank_scalar = blanks.len() == 1 && scalar_text(given).is_some();
    if !(given.is_array() || given.is_object() || single_blank_scalar) {
        return Verdict::format_error(
            "invalid_format",
            "Invalid response format. Please provide an answer for each blank.",
        );
    }

    let mut correct_count = 0usize;
    let mut results = BTreeMap::new();
    for blank in &blanks {
        let raw = if single_blank_scalar {
            Some(given)
        } else {
            blank_response(given, blank)
        };
        let user = raw
            .map(|v| normalized_scalar(v, ctx.case_sensitive()))
            .unwrap_or_default();
        let ok = raw.and_then(scalar_text).is_some()
            && ctx.matches_any(&user, &blank.expected, blank.alternates);
        if ok {
            correct_count += 1;
        }
        results.insert(
            format!("blank_{}", blank.key),
            json!({
                "user_answer": raw.cloned().unwrap_or(Value::Null),
                "expected": blank.expected,
                "is_correct": ok,
            }),
        );
    }

    let total = blanks.len();
    let is_correct = correct_count == total;
    Verdict {
        is_correct,
        score: ctx.scoring.points_per_correct * correct_count as f64,
        feedback: if is_correct {
            "All blanks filled correctly. Well done!".to_string()
        } else {
            format!("You got {} out of {} blanks correct.", correct_count, total)
        },
        detail: json!({
            "blank_results": results,
            "correct_count": correct_count,
            "total_blanks": total,
        }),
    }
}

// ---------------------------------------------------------------------------
// matching_words / image_labeling
// ---------------------------------------------------------------------------

/// Reads `{"k": "v"}` or `[{"left": "k", "right": "v"}, ...]`.
fn pairs(value: &Value) -> Option<Vec<(String, Value)>> {
    match value {
        Value::Object(map) => Some(map.iter().map(|(k, v)| (k.clone(), v.clone())).collect()),
        Value::Array(items) => items
            .iter()
            .map(|item| {
                let left = scalar_text(item.get("left")?)?;
                let right = item.get("right")?.clone();
                Some((left, right))
            })
            .collect(),
        _ => None,
    }
}

pub fn matching(ctx: &EvaluationContext<'_>, response: &Value) -> Verdict {
    let Some(expected) = pairs(ctx.correct_answers) else {
        return Verdict::invalid_key();
    };
    if expected.is_empty() || expected.iter().any(|(_, v)| scalar_text(v).is_none()) {
        return Verdict::invalid_key();
    }

    let Some(given) = pairs(response_field(response, &["matches", "labels", "pairs", "answer"]))
    else {
        return Verdict::format_error(
            "invalid_format",
            "Invalid response format. Please provide a mapping of items to matches.",
        );
    };
    let given: BTreeMap<String, Value> = given.into_iter().collect();

    let mut correct_count = 0usize;
    let mut results = BTreeMap::new();
    for (key, expected_value) in &expected {
        let expected_text = scalar_text(expected_value).unwrap_or_default();
        let user = given.get(key);
        let ok = user.and_then(scalar_text).is_some_and(|u| {
            ctx.matches_any(&ctx.norm(&u), &expected_text, ctx.alternates_for(key))
        });
        if ok {
            correct_count += 1;
        }
        results.insert(
            key.clone(),
            json!({
                "user_match": user.cloned().unwrap_or(Value::Null),
                "correct_match": expected_text,
                "is_correct": ok,
            }),
        );
    }

    let total = expected.len();
    let is_correct = correct_count == total;
    Verdict {
        is_correct,
        score: round_half_up(correct_count as f64 * f64::from(ctx.max_score) / total as f64),
        feedback: if is_correct {
            "All matches are correct. Well done!".to_string()
        } else {
            format!("You matched {} out of {} correctly.", correct_count, total)
        },
        detail: json!({
            "match_results": results,
            "correct_count": correct_count,
            "total_matches": total,
        }),
    }
}

// ---------------------------------------------------------------------------
// sentence_reordering
// ---------------------------------------------------------------------------

pub fn sentence_reordering(ctx: &EvaluationContext<'_>, response: &Value) -> Verdict {
    let Some(correct) = ctx.scalar_key() else {
        return Verdict::invalid_key();
    };
    if correct.is_empty() {
        return Verdict::invalid_key();
    }

    let Value::Array(items) = response_field(response, &["order", "answer"]) else {
        return Verdict::format_error(
            "invalid_format",
            "Invalid response format. Please provide the items in order.",
        );
    };

    let user: Vec<String> = items
        .iter()
        .map(|v| normalized_scalar(v, ctx.case_sensitive()))
        .collect();
    let expected: Vec<String> = correct.iter().map(|s| ctx.norm(s)).collect();

    let position_results: Vec<bool> = expected
        .iter()
        .enumerate()
        .map(|(i, want)| user.get(i) == Some(want))
        .collect();
    let correct_positions = position_results.iter().filter(|ok| **ok).count();
    let total = expected.len();
    let is_correct = user == expected;
    // Extra or missing items count as misplaced.
    let slots = total.max(user.len());

    let score = if is_correct {
        f64::from(ctx.max_score)
    } else if ctx.scoring.allow_partial {
        f64::from(ctx.max_score) * correct_positions as f64 / slots as f64
    } else {
        ctx.scoring.incorrect_points
    };

    Verdict {
        is_correct,
        score,
        feedback: if is_correct {
            "Correct! The items are in the right order.".to_string()
        } else {
            format!(
                "You placed {} out of {} items in the correct position.",
                correct_positions, total
            )
        },
        detail: json!({
            "position_results": position_results,
            "correct_positions": correct_positions,
            "total_items": total,
        }),
    }
}

// ---------------------------------------------------------------------------
// short_answer / syn_ant
// ---------------------------------------------------------------------------

fn text_response(response: &Value, keys: &[&str]) -> Option<String> {
    scalar_text(response_field(response, keys))
}

pub fn short_answer(ctx: &EvaluationContext<'_>, response: &Value) -> Verdict {
    let Some(correct) = ctx.scalar_key() else {
        return Verdict::invalid_key();
    };
    if correct.is_empty() {
        return Verdict::invalid_key();
    }
    let Some(answer) = text_response(response, &["answer", "text"]) else {
        return Verdict::format_error(
            "invalid_format",
            "Invalid response format. Please provide a text answer.",
        );
    };

    let mut partial_ratio = None;
    let (is_correct, detail) = match ctx.rules.strategy {
        MatchStrategy::CaseInsensitive | MatchStrategy::ExactMatch => {
            let case_sensitive = ctx.rules.strategy == MatchStrategy::ExactMatch;
            let given = normalize(&answer, case_sensitive);
            let matched = correct
                .iter()
                .map(String::as_str)
                .chain(ctx.all_alternates())
                .find(|candidate| normalize(candidate, case_sensitive) == given);
            (
                matched.is_some(),
                json!({ "user_answer": answer, "matched_answer": matched }),
            )
        }
        MatchStrategy::ContainsKeywords => {
            let keywords: BTreeSet<String> = correct
                .iter()
                .flat_map(|c| tokenize(c, ctx.case_sensitive()))
                .collect();
            if keywords.is_empty() {
                return Verdict::invalid_key();
            }
            let words = tokenize(&answer, ctx.case_sensitive());
            let matched: Vec<&String> = keywords.intersection(&words).collect();
            let ratio = matched.len() as f64 / keywords.len() as f64;
            let enough_terms = ctx
                .rules
                .min_required_terms
                .is_none_or(|min| matched.len() >= min);
            partial_ratio = Some(ratio);
            (
                ratio >= ctx.rules.keyword_match_threshold && enough_terms,
                json!({
                    "user_answer": answer,
                    "matched_keywords": matched,
                    "expected_keywords": keywords,
                    "match_percentage": ratio,
                }),
            )
        }
        MatchStrategy::Unsupported => {
            return Verdict::format_error(
                "unsupported_strategy",
                "This exercise uses an evaluation strategy that cannot be graded automatically.",
            );
        }
    };

    let score = match (is_correct, partial_ratio) {
        (true, _) => ctx.scoring.correct_points,
        (false, Some(ratio)) if ctx.scoring.allow_partial && ratio > 0.0 => {
            round_half_up(ctx.scoring.correct_points * ratio)
        }
        (false, _) => ctx.scoring.incorrect_points,
    };

    Verdict {
        is_correct,
        score,
        feedback: if is_correct {
            "Correct! Your answer matches what we were looking for.".to_string()
        } else {
            "Your answer doesn't match what we were looking for.".to_string()
        },
        detail,
    }
}

// ---------------------------------------------------------------------------
// word_scramble
// ---------------------------------------------------------------------------

pub fn word_scramble(ctx: &EvaluationContext<'_>, response: &Value) -> Verdict {
    let Some(correct) = ctx.scalar_key() else {
        return Verdict::invalid_key();
    };
    if correct.is_empty() {
        return Verdict::invalid_key();
    }
    let Some(answer) = text_response(response, &["answer", "word"]) else {
        return Verdict::format_error(
            "invalid_format",
            "Invalid response format. Please provide the unscrambled word.",
        );
    };

    let given = ctx.norm(&answer);
    let is_correct = correct
        .iter()
        .map(String::as_str)
        .chain(ctx.all_alternates())
        .any(|candidate| ctx.norm(candidate) == given);

    Verdict {
        is_correct,
        score: if is_correct {
            ctx.scoring.correct_points
        } else {
            ctx.scoring.incorrect_points
        },
        feedback: if is_correct {
            "Correct! Well done.".to_string()
        } else {
            "Incorrect. Try again.".to_string()
        },
        detail: json!({ "user_answer": answer, "expected_answers": correct }),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    struct Key {
        correct: Value,
        alternates: Option<AlternateAnswers>,
        rules: ValidationRules,
        scoring: ScoringMechanism,
        max_score: u32,
    }

    impl Key {
        fn new(correct: Value) -> Self {
            Self {
                correct,
                alternates: None,
                rules: ValidationRules::default(),
                scoring: ScoringMechanism::default(),
                max_score: 10,
            }
        }

        fn ctx(&self) -> EvaluationContext<'_> {
            EvaluationContext {
                correct_answers: &self.correct,
                alternate_answers: self.alternates.as_ref(),
                rules: &self.rules,
                scoring: &self.scoring,
                max_score: self.max_score,
            }
        }
    }

    #[test]
    fn multiple_choice_exact_selection_earns_correct_points() {
        let mut key = Key::new(json!(["b"]));
        key.scoring.correct_points = 3.0;
        let v = multiple_choice(&key.ctx(), &json!({ "selected_options": ["B"] }));
        assert!(v.is_correct);
        assert_eq!(v.score, 3.0);
    }

    #[test]
    fn multiple_choice_rejects_several_options_when_single_select() {
        let key = Key::new(json!(["a"]));
        let v = multiple_choice(&key.ctx(), &json!({ "selected_options": ["a", "b"] }));
        assert!(!v.is_correct);
        assert_eq!(v.score, 0.0);
        assert_eq!(v.feedback, "Please select only one option.");
        assert_eq!(v.error_code(), Some("multiple_selections_not_allowed"));
    }

    #[test]
    fn multiple_choice_partial_credit_rounds_half_up() {
        let mut key = Key::new(json!(["a", "b", "c", "d"]));
        key.rules.allow_multiple = true;
        key.scoring.allow_partial = true;
        key.scoring.correct_points = 2.0;
        // 2 * 1/4 = 0.5 -> 1
        let v = multiple_choice(&key.ctx(), &json!({ "selected_options": ["a"] }));
        assert!(!v.is_correct);
        assert_eq!(v.score, 1.0);
        assert_eq!(v.detail["partially_correct"], true);
    }

    #[test]
    fn multiple_choice_without_partial_scores_incorrect_points() {
        let mut key = Key::new(json!(["a", "b"]));
        key.rules.allow_multiple = true;
        let v = multiple_choice(&key.ctx(), &json!(["a"]));
        assert!(!v.is_correct);
        assert_eq!(v.score, 0.0);
    }

    #[test]
    fn multiple_choice_is_case_sensitive_on_request() {
        let mut key = Key::new(json!(["Option A"]));
        key.rules.case_sensitive = true;
        let v = multiple_choice(&key.ctx(), &json!({ "answer": "option a" }));
        assert!(!v.is_correct);
    }

    #[test]
    fn true_false_scores_per_matching_statement() {
        let key = Key::new(json!([true, false]));
        let v = true_false(&key.ctx(), &json!({ "answers": [true, false] }));
        assert!(v.is_correct);
        assert_eq!(v.score, 2.0);

        let v = true_false(&key.ctx(), &json!({ "answers": [true, true] }));
        assert!(!v.is_correct);
        assert_eq!(v.score, 1.0);
    }

    #[test]
    fn true_false_length_mismatch_is_a_format_error() {
        let key = Key::new(json!([true, false, true]));
        let v = true_false(&key.ctx(), &json!({ "answers": [true] }));
        assert_eq!(v.score, 0.0);
        assert_eq!(v.error_code(), Some("incomplete_answers"));
        assert_eq!(v.feedback, "Please answer all 3 questions.");
    }

    #[test]
    fn true_false_rejects_non_boolean_values() {
        let key = Key::new(json!([true]));
        let v = true_false(&key.ctx(), &json!({ "answers": ["maybe"] }));
        assert_eq!(
            v.feedback,
            "Invalid response format. Please provide boolean values."
        );
        assert_eq!(v.score, 0.0);
    }

    #[test]
    fn fill_blank_uses_positional_alternates() {
        let mut key = Key::new(json!(["color", "big"]));
        key.alternates = Some(serde_json::from_value(json!([["colour"], []])).unwrap());
        let v = fill_blank(&key.ctx(), &json!({ "answers": { "0": "Colour", "1": "large" } }));
        assert!(!v.is_correct);
        assert_eq!(v.score, 1.0);
        assert_eq!(v.detail["correct_count"], 1);
        assert_eq!(v.detail["blank_results"]["blank_0"]["is_correct"], true);
    }

    #[test]
    fn fill_blank_accepts_array_responses() {
        let mut key = Key::new(json!(["a", "b", "c"]));
        key.scoring.points_per_correct = 2.0;
        let v = fill_blank(&key.ctx(), &json!({ "answers": ["a", "b", "c"] }));
        assert!(v.is_correct);
        assert_eq!(v.score, 6.0);
    }

    #[test]
    fn fill_blank_missing_blanks_count_as_wrong() {
        let key = Key::new(json!(["a", "b"]));
        let v = fill_blank(&key.ctx(), &json!({ "answers": { "0": "a" } }));
        assert!(!v.is_correct);
        assert_eq!(v.score, 1.0);
        assert_eq!(v.detail["total_blanks"], 2);
    }

    #[test]
    fn cloze_keyed_blanks_with_keyed_alternates() {
        let mut key = Key::new(json!({ "gap1": "went", "gap2": "saw" }));
        key.alternates = Some(serde_json::from_value(json!({ "gap2": ["noticed"] })).unwrap());
        let v = fill_blank(
            &key.ctx(),
            &json!({ "blanks": { "gap1": "went", "gap2": "Noticed" } }),
        );
        assert!(v.is_correct);
        assert_eq!(v.score, 2.0);
    }

    #[test]
    fn fill_blank_rejects_scalar_for_multiple_blanks() {
        let key = Key::new(json!(["a", "b"]));
        let v = fill_blank(&key.ctx(), &json!({ "answers": "a" }));
        assert_eq!(v.error_code(), Some("invalid_format"));
    }

    #[test]
    fn keyed_blanks_read_array_responses_in_gap_order() {
        let words = ["a", "b", "c", "d", "e", "f", "g", "h", "i", "j", "k", "l"];
        let key_map: serde_json::Map<String, Value> = words
            .iter()
            .enumerate()
            .map(|(i, w)| (format!("gap{}", i + 1), json!(w)))
            .collect();
        let key = Key::new(Value::Object(key_map));

        let v = fill_blank(&key.ctx(), &json!({ "answers": words }));
        assert!(v.is_correct);
        assert_eq!(v.detail["correct_count"], 12);
        assert_eq!(v.detail["blank_results"]["blank_gap10"]["user_answer"], "j");
    }

    #[test]
    fn trailing_index_reads_numeric_suffix() {
        assert_eq!(trailing_index("gap10"), Some(10));
        assert_eq!(trailing_index("7"), Some(7));
        assert_eq!(trailing_index("gap"), None);
    }

    #[test]
    fn matching_scores_proportionally_to_max_score() {
        let mut key = Key::new(json!({ "France": "Paris", "UK": "London" }));
        key.max_score = 2;
        let v = matching(
            &key.ctx(),
            &json!({ "matches": { "France": "Paris", "UK": "Berlin" } }),
        );
        assert!(!v.is_correct);
        assert_eq!(v.score, 1.0);
        assert_eq!(v.detail["match_results"]["UK"]["is_correct"], false);
    }

    #[test]
    fn matching_accepts_left_right_pairs() {
        let mut key = Key::new(json!([
            { "left": "dog", "right": "perro" },
            { "left": "cat", "right": "gato" },
            { "left": "cow", "right": "vaca" }
        ]));
        key.max_score = 10;
        let v = matching(
            &key.ctx(),
            &json!({ "matches": { "dog": "perro", "cat": "GATO", "cow": "toro" } }),
        );
        // 2/3 of 10 = 6.67 -> 7
        assert_eq!(v.score, 7.0);
        assert!(!v.is_correct);
    }

    #[test]
    fn matching_exact_half_rounds_up() {
        let pairs: serde_json::Map<String, Value> =
            (0..10).map(|i| (format!("k{}", i), json!(format!("v{}", i)))).collect();
        let mut key = Key::new(Value::Object(pairs));
        key.max_score = 45;
        let answers: serde_json::Map<String, Value> = (0..10)
            .map(|i| {
                let value = if i < 7 { format!("v{}", i) } else { "wrong".to_string() };
                (format!("k{}", i), json!(value))
            })
            .collect();

        // 7/10 of 45 = 31.5 -> 32
        let v = matching(&key.ctx(), &Value::Object(answers));
        assert_eq!(v.detail["correct_count"], 7);
        assert_eq!(v.score, 32.0);
    }

    #[test]
    fn matching_rejects_non_mapping_response() {
        let key = Key::new(json!({ "a": "b" }));
        let v = matching(&key.ctx(), &json!({ "matches": "a-b" }));
        assert_eq!(v.error_code(), Some("invalid_format"));
        assert_eq!(v.score, 0.0);
    }

    #[test]
    fn reordering_partial_credit_is_strictly_positional() {
        let mut key = Key::new(json!([1, 2, 3, 4]));
        key.max_score = 4;
        key.scoring.allow_partial = true;
        let v = sentence_reordering(&key.ctx(), &json!({ "order": [1, 3, 2, 4] }));
        assert!(!v.is_correct);
        assert_eq!(v.score, 2.0);
        assert_eq!(v.detail["correct_positions"], 2);
    }

    #[test]
    fn reordering_extra_items_cost_credit() {
        let mut key = Key::new(json!([1, 2, 3, 4]));
        key.max_score = 6;
        key.scoring.allow_partial = true;
        let v = sentence_reordering(&key.ctx(), &json!([1, 2, 3, 4, 5, 6]));
        assert!(!v.is_correct);
        // 4 of 6 slots
        assert_eq!(v.score, 4.0);

        let v = sentence_reordering(&key.ctx(), &json!([1, 2]));
        // 2 of 4 slots
        assert_eq!(v.score, 3.0);
    }

    #[test]
    fn reordering_without_partial_scores_nothing_unless_exact() {
        let mut key = Key::new(json!(["a", "b"]));
        key.max_score = 5;
        let v = sentence_reordering(&key.ctx(), &json!(["b", "a"]));
        assert_eq!(v.score, 0.0);
        let v = sentence_reordering(&key.ctx(), &json!(["A", "B"]));
        assert!(v.is_correct);
        assert_eq!(v.score, 5.0);
    }

    #[test]
    fn short_answer_case_insensitive_checks_alternates() {
        let mut key = Key::new(json!(["Paris"]));
        key.alternates = Some(serde_json::from_value(json!([["Paris, France"]])).unwrap());
        let v = short_answer(&key.ctx(), &json!({ "answer": "paris, france" }));
        assert!(v.is_correct);
        assert_eq!(v.score, 1.0);
        assert_eq!(v.detail["matched_answer"], "Paris, France");
    }

    #[test]
    fn short_answer_exact_match_is_case_sensitive() {
        let mut key = Key::new(json!(["NaCl"]));
        key.rules.strategy = MatchStrategy::ExactMatch;
        assert!(!short_answer(&key.ctx(), &json!({ "answer": "nacl" })).is_correct);
        assert!(short_answer(&key.ctx(), &json!({ "answer": " NaCl " })).is_correct);
    }

    #[test]
    fn short_answer_keywords_meet_threshold() {
        let mut key = Key::new(json!(["Python", "high-level", "programming", "dynamic"]));
        key.rules.strategy = MatchStrategy::ContainsKeywords;
        key.rules.keyword_match_threshold = 0.5;
        let v = short_answer(
            &key.ctx(),
            &json!({ "answer": "Python is a high-level language." }),
        );
        assert!(v.is_correct);
        assert_eq!(v.detail["match_percentage"], 0.5);
    }

    #[test]
    fn short_answer_keywords_respect_min_required_terms() {
        let mut key = Key::new(json!(["alpha beta gamma delta"]));
        key.rules.strategy = MatchStrategy::ContainsKeywords;
        key.rules.keyword_match_threshold = 0.25;
        key.rules.min_required_terms = Some(2);
        let v = short_answer(&key.ctx(), &json!({ "answer": "alpha only" }));
        assert!(!v.is_correct);
        let v = short_answer(&key.ctx(), &json!({ "answer": "alpha and beta" }));
        assert!(v.is_correct);
    }

    #[test]
    fn short_answer_default_threshold_is_seventy_percent() {
        let mut key = Key::new(json!(["one two three four"]));
        key.rules.strategy = MatchStrategy::ContainsKeywords;
        assert!(!short_answer(&key.ctx(), &json!("one two")).is_correct);
        assert!(short_answer(&key.ctx(), &json!("one two three")).is_correct);
    }

    #[test]
    fn short_answer_unsupported_strategy_scores_zero() {
        let mut key = Key::new(json!(["x"]));
        key.rules.strategy = MatchStrategy::Unsupported;
        let v = short_answer(&key.ctx(), &json!({ "answer": "x" }));
        assert!(!v.is_correct);
        assert_eq!(v.error_code(), Some("unsupported_strategy"));
    }

    #[test]
    fn word_scramble_matches_alternates() {
        let mut key = Key::new(json!(["listen"]));
        key.alternates = Some(serde_json::from_value(json!(["silent"])).unwrap());
        assert!(word_scramble(&key.ctx(), &json!({ "word": "Silent" })).is_correct);
        assert!(!word_scramble(&key.ctx(), &json!({ "word": "tinsel" })).is_correct);
    }

    #[test]
    fn word_scramble_rejects_structured_response() {
        let key = Key::new(json!(["listen"]));
        let v = word_scramble(&key.ctx(), &json!({ "answer": ["l", "i"] }));
        assert_eq!(v.error_code(), Some("invalid_format"));
    }

    #[test]
    fn malformed_answer_key_never_scores() {
        let key = Key::new(json!("not a mapping"));
        let v = matching(&key.ctx(), &json!({ "a": "b" }));
        assert_eq!(v.error_code(), Some("invalid_answer_key"));
        assert_eq!(v.score, 0.0);
    }
}
