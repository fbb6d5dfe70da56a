// src/models/exercise.rs

use std::{collections::BTreeMap, fmt, str::FromStr};

use serde::{Deserialize, Serialize};
use validator::Validate;

/// Closed set of exercise kinds known to the grading engine.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ExerciseType {
    MultipleChoice,
    TrueFalse,
    FillBlank,
    ClozeTest,
    MatchingWords,
    ImageLabeling,
    SentenceReordering,
    ShortAnswer,
    WordScramble,
    LongAnswer,
    Comprehension,
    SynAnt,
}

impl ExerciseType {
    pub const ALL: [ExerciseType; 12] = [
        ExerciseType::MultipleChoice,
        ExerciseType::TrueFalse,
        ExerciseType::FillBlank,
        ExerciseType::ClozeTest,
        ExerciseType::MatchingWords,
        ExerciseType::ImageLabeling,
        ExerciseType::SentenceReordering,
        ExerciseType::ShortAnswer,
        ExerciseType::WordScramble,
        ExerciseType::LongAnswer,
        ExerciseType::Comprehension,
        ExerciseType::SynAnt,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            ExerciseType::MultipleChoice => "multiple_choice",
            ExerciseType::TrueFalse => "true_false",
            ExerciseType::FillBlank => "fill_blank",
            ExerciseType::ClozeTest => "cloze_test",
            ExerciseType::MatchingWords => "matching_words",
            ExerciseType::ImageLabeling => "image_labeling",
            ExerciseType::SentenceReordering => "sentence_reordering",
            ExerciseType::ShortAnswer => "short_answer",
            ExerciseType::WordScramble => "word_scramble",
            ExerciseType::LongAnswer => "long_answer",
            ExerciseType::Comprehension => "comprehension",
            ExerciseType::SynAnt => "syn_ant",
        }
    }
}

impl fmt::Display for ExerciseType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Parses a type tag case-insensitively. Surrounding whitespace is ignored.
impl FromStr for ExerciseType {
    type Err = UnknownExerciseType;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let wanted = s.trim();
        ExerciseType::ALL
            .into_iter()
            .find(|t| t.as_str().eq_ignore_ascii_case(wanted))
            .ok_or_else(|| UnknownExerciseType(s.to_string()))
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UnknownExerciseType(pub String);

impl fmt::Display for UnknownExerciseType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "unknown exercise type '{}'", self.0)
    }
}

/// Whether an exercise is scored by the engine or by an instructor.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum GradingMode {
    #[default]
    Auto,
    Manual,
}

impl GradingMode {
    pub fn as_str(&self) -> &'static str {
        match self {
            GradingMode::Auto => "auto",
            GradingMode::Manual => "manual",
        }
    }
}

impl FromStr for GradingMode {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "auto" => Ok(GradingMode::Auto),
            "manual" => Ok(GradingMode::Manual),
            other => Err(format!("unknown grading mode '{}'", other)),
        }
    }
}

/// Short-answer comparison strategy.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MatchStrategy {
    #[default]
    CaseInsensitive,
    ExactMatch,
    ContainsKeywords,
    /// Any strategy name the engine does not implement.
    #[serde(other)]
    Unsupported,
}

/// Named validation options attached to an exercise.
///
/// Keys are accepted in snake_case and camelCase.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ValidationRules {
    #[serde(alias = "caseSensitive")]
    pub case_sensitive: bool,
    #[serde(alias = "allowMultiple")]
    pub allow_multiple: bool,
    pub strategy: MatchStrategy,
    #[serde(alias = "keywordMatchThreshold")]
    pub keyword_match_threshold: f64,
    #[serde(alias = "minRequiredTerms")]
    pub min_required_terms: Option<usize>,
}

pub const DEFAULT_KEYWORD_MATCH_THRESHOLD: f64 = 0.7;

impl Default for ValidationRules {
    fn default() -> Self {
        Self {
            case_sensitive: false,
            allow_multiple: false,
            strategy: MatchStrategy::default(),
            keyword_match_threshold: DEFAULT_KEYWORD_MATCH_THRESHOLD,
            min_required_terms: None,
        }
    }
}

/// Point values used by the evaluators.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ScoringMechanism {
    #[serde(alias = "correctPoints")]
    pub correct_points: f64,
    #[serde(alias = "incorrectPoints")]
    pub incorrect_points: f64,
    #[serde(alias = "pointsPerCorrect")]
    pub points_per_correct: f64,
    #[serde(alias = "allowPartial")]
    pub allow_partial: bool,
}

impl Default for ScoringMechanism {
    fn default() -> Self {
        Self {
            correct_points: 1.0,
            incorrect_points: 0.0,
            points_per_correct: 1.0,
            allow_partial: false,
        }
    }
}

/// One entry of a per-position alternates list: a single string or a group.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum OneOrMany {
    One(String),
    Many(Vec<String>),
}

impl OneOrMany {
    pub fn as_slice(&self) -> &[String] {
        match self {
            OneOrMany::One(s) => std::slice::from_ref(s),
            OneOrMany::Many(v) => v,
        }
    }
}

/// Acceptable alternatives to the primary answer key.
///
/// A list is read positionally by blank-style evaluators and flattened into
/// a global pool by single-answer evaluators. A map is read by key.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum AlternateAnswers {
    List(Vec<OneOrMany>),
    Keyed(BTreeMap<String, OneOrMany>),
}

impl AlternateAnswers {
    /// Alternatives for the blank at `idx`.
    pub fn at(&self, idx: usize) -> &[String] {
        match self {
            AlternateAnswers::List(items) => {
                items.get(idx).map(OneOrMany::as_slice).unwrap_or(&[])
            }
            AlternateAnswers::Keyed(map) => map
                .get(&idx.to_string())
                .map(OneOrMany::as_slice)
                .unwrap_or(&[]),
        }
    }

    /// Alternatives for a named blank or pair.
    pub fn for_key(&self, key: &str) -> &[String] {
        match self {
            AlternateAnswers::Keyed(map) => map.get(key).map(OneOrMany::as_slice).unwrap_or(&[]),
            AlternateAnswers::List(_) => {
                key.parse::<usize>().map(|idx| self.at(idx)).unwrap_or(&[])
            }
        }
    }

    /// Every alternative regardless of position.
    pub fn flatten(&self) -> Vec<&str> {
        let groups: Box<dyn Iterator<Item = &OneOrMany>> = match self {
            AlternateAnswers::List(items) => Box::new(items.iter()),
            AlternateAnswers::Keyed(map) => Box::new(map.values()),
        };
        groups
            .flat_map(|g| g.as_slice().iter().map(String::as_str))
            .collect()
    }
}

/// An assessable item. Read-only while grading.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Exercise {
    pub id: i64,
    pub title: String,

    /// Prompt shown to the learner.
    #[serde(default)]
    pub question: String,
    pub instructions: Option<String>,

    /// Presentation data for the learner: choices, items to order, image
    /// regions. Never consulted when grading.
    pub options: Option<serde_json::Value>,

    /// Raw type tag as stored. Resolved by the dispatcher, so unknown tags
    /// survive a round trip and fall back to manual review.
    pub exercise_type: String,

    /// Ordered answer values: strings, booleans, or keyed mappings.
    pub correct_answers: serde_json::Value,

    pub alternate_answers: Option<AlternateAnswers>,

    #[serde(default)]
    pub validation_rules: ValidationRules,

    #[serde(default)]
    pub scoring_mechanism: ScoringMechanism,

    pub max_score: u32,

    #[serde(default)]
    pub grading_mode: GradingMode,

    pub created_at: Option<chrono::DateTime<chrono::Utc>>,
}

/// DTO for registering a new exercise.
#[derive(Debug, Clone, Deserialize, Validate)]
pub struct CreateExerciseRequest {
    #[validate(length(max = 255))]
    #[serde(default)]
    pub title: String,
    #[validate(length(max = 5000))]
    #[serde(default)]
    pub question: String,
    #[validate(length(max = 5000))]
    pub instructions: Option<String>,
    #[validate(custom(function = validate_response_size))]
    pub options: Option<serde_json::Value>,
    #[validate(length(min = 1, max = 50))]
    pub exercise_type: String,
    #[validate(custom(function = validate_answer_key))]
    pub correct_answers: serde_json::Value,
    pub alternate_answers: Option<AlternateAnswers>,
    #[serde(default)]
    pub validation_rules: ValidationRules,
    #[serde(default)]
    pub scoring_mechanism: ScoringMechanism,
    #[validate(range(max = 10000))]
    #[serde(default = "default_max_score")]
    pub max_score: u32,
    #[serde(default)]
    pub grading_mode: GradingMode,
}

/// DTO for evaluating a response against a stored exercise (practice mode).
#[derive(Debug, Clone, Deserialize, Validate)]
pub struct EvaluateRequest {
    #[validate(custom(function = validate_response_size))]
    pub response: serde_json::Value,
}

const MAX_PAYLOAD_BYTES: usize = 50_000;

/// Caps learner responses, shared by practice evaluation and recorded answers.
pub(crate) fn validate_response_size(
    data: &serde_json::Value,
) -> Result<(), validator::ValidationError> {
    if data.to_string().len() > MAX_PAYLOAD_BYTES {
        return Err(validator::ValidationError::new("payload_too_large"));
    }
    Ok(())
}

fn default_max_score() -> u32 {
    1
}

/// Answer keys are arrays or objects; scalars are only meaningful wrapped.
fn validate_answer_key(key: &serde_json::Value) -> Result<(), validator::ValidationError> {
    if !(key.is_array() || key.is_object()) {
        return Err(validator::ValidationError::new("answer_key_must_be_array_or_object"));
    }
    if key.to_string().len() > MAX_PAYLOAD_BYTES {
        return Err(validator::ValidationError::new("answer_key_too_large"));
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn exercise_type_parses_case_insensitively() {
        assert_eq!("Multiple_Choice".parse::<ExerciseType>(), Ok(ExerciseType::MultipleChoice));
        assert_eq!(" syn_ant ".parse::<ExerciseType>(), Ok(ExerciseType::SynAnt));
        assert!("essay_v2".parse::<ExerciseType>().is_err());
    }

    #[test]
    fn validation_rules_accept_camel_case() {
        let rules: ValidationRules = serde_json::from_value(serde_json::json!({
            "caseSensitive": true,
            "keywordMatchThreshold": 0.5,
            "strategy": "contains_keywords"
        }))
        .unwrap();
        assert!(rules.case_sensitive);
        assert_eq!(rules.keyword_match_threshold, 0.5);
        assert_eq!(rules.strategy, MatchStrategy::ContainsKeywords);
        assert!(!rules.allow_multiple);
    }

    #[test]
    fn unknown_strategy_is_kept_as_unsupported() {
        let rules: ValidationRules =
            serde_json::from_value(serde_json::json!({ "strategy": "fuzzy_match" })).unwrap();
        assert_eq!(rules.strategy, MatchStrategy::Unsupported);
    }

    #[test]
    fn alternates_by_position_and_flattened() {
        let alts: AlternateAnswers =
            serde_json::from_value(serde_json::json!([["colour", "color"], "grey"])).unwrap();
        assert_eq!(alts.at(0), ["colour".to_string(), "color".to_string()]);
        assert_eq!(alts.at(1), ["grey".to_string()]);
        assert!(alts.at(5).is_empty());
        assert_eq!(alts.flatten(), vec!["colour", "color", "grey"]);
    }

    #[test]
    fn oversized_responses_fail_validation() {
        let big = serde_json::Value::String("x".repeat(MAX_PAYLOAD_BYTES));
        assert!(validate_response_size(&big).is_err());
        assert!(validate_response_size(&serde_json::json!({ "answer": "Paris" })).is_ok());

        let req = EvaluateRequest { response: big };
        assert!(req.validate().is_err());
    }

    #[test]
    fn alternates_by_key() {
        let alts: AlternateAnswers =
            serde_json::from_value(serde_json::json!({ "UK": ["Londres"] })).unwrap();
        assert_eq!(alts.for_key("UK"), ["Londres".to_string()]);
        assert!(alts.for_key("France").is_empty());
    }
}
