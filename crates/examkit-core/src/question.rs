//! Question model types.
//!
//! A question is shared metadata plus one of a closed set of ten typed
//! payloads. Scoring dispatches on the payload with an exhaustive match, so
//! adding a variant is a compile-time-checked change, not an inheritance
//! hierarchy.

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::error::ValidationIssue;

/// One question in an assessment. Immutable after creation except through an
/// explicit revision of the owning definition.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Question {
    /// Unique identifier within the definition.
    pub id: String,
    /// The text shown to the examinee.
    pub prompt: String,
    /// Maximum points awardable.
    pub points: f64,
    /// Difficulty bucket, used by adaptive selection.
    #[serde(default)]
    pub difficulty: Difficulty,
    /// Whether the question must be answered before submission.
    #[serde(default)]
    pub required: bool,
    /// Type-specific correctness data.
    #[serde(flatten)]
    pub kind: QuestionKind,
}

/// Difficulty buckets for adaptive selection.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Difficulty {
    Easy,
    #[default]
    Medium,
    Hard,
}

impl fmt::Display for Difficulty {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Difficulty::Easy => write!(f, "easy"),
            Difficulty::Medium => write!(f, "medium"),
            Difficulty::Hard => write!(f, "hard"),
        }
    }
}

impl FromStr for Difficulty {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "easy" => Ok(Difficulty::Easy),
            "medium" => Ok(Difficulty::Medium),
            "hard" => Ok(Difficulty::Hard),
            other => Err(format!("unknown difficulty: {other}")),
        }
    }
}

/// One selectable option of a multiple-choice question.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ChoiceOption {
    pub id: String,
    pub text: String,
    #[serde(default)]
    pub correct: bool,
}

/// One test case of a code question.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CodeTestCase {
    pub input: String,
    pub expected: String,
    /// Relative weight toward the question's points.
    #[serde(default = "default_weight")]
    pub weight: f64,
}

fn default_weight() -> f64 {
    1.0
}

fn default_true() -> bool {
    true
}

/// The closed set of question variants.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum QuestionKind {
    MultipleChoice {
        options: Vec<ChoiceOption>,
        /// When false, exactly one option may be selected.
        #[serde(default)]
        multiple_answers: bool,
    },
    TrueFalse {
        correct: bool,
    },
    ShortAnswer {
        accepted: Vec<String>,
        #[serde(default)]
        case_sensitive: bool,
        /// Exact match when true, substring containment when false.
        #[serde(default = "default_true")]
        exact_match: bool,
    },
    Essay {
        #[serde(default)]
        min_words: Option<u32>,
    },
    FillInBlank {
        /// Template text containing one `{blank}` marker per blank.
        template: String,
        /// Accepted answers per blank, in template order.
        blanks: Vec<Vec<String>>,
    },
    Matching {
        left: Vec<String>,
        right: Vec<String>,
        /// Correct (left index, right index) pairs.
        pairs: Vec<(usize, usize)>,
    },
    Ordering {
        items: Vec<String>,
        /// Item indices in correct order.
        correct_order: Vec<usize>,
    },
    Numerical {
        answer: f64,
        #[serde(default)]
        tolerance: f64,
        #[serde(default)]
        unit: Option<String>,
    },
    Code {
        language: String,
        #[serde(default)]
        starter_code: Option<String>,
        test_cases: Vec<CodeTestCase>,
    },
    DragDrop {
        items: Vec<String>,
        zones: Vec<String>,
        /// Correct (item index, zone index) placements.
        placements: Vec<(usize, usize)>,
    },
}

/// Marker expected inside fill-in-blank templates.
pub const BLANK_MARKER: &str = "{blank}";

impl QuestionKind {
    /// Stable name matching the serde tag.
    pub fn type_name(&self) -> &'static str {
        match self {
            QuestionKind::MultipleChoice { .. } => "multiple_choice",
            QuestionKind::TrueFalse { .. } => "true_false",
            QuestionKind::ShortAnswer { .. } => "short_answer",
            QuestionKind::Essay { .. } => "essay",
            QuestionKind::FillInBlank { .. } => "fill_in_blank",
            QuestionKind::Matching { .. } => "matching",
            QuestionKind::Ordering { .. } => "ordering",
            QuestionKind::Numerical { .. } => "numerical",
            QuestionKind::Code { .. } => "code",
            QuestionKind::DragDrop { .. } => "drag_drop",
        }
    }

    /// Whether the engine can grade this variant without a human. Code counts
    /// as auto-gradable because an execution verdict fills in the facts.
    pub fn is_auto_gradable(&self) -> bool {
        matches!(
            self,
            QuestionKind::MultipleChoice { .. }
                | QuestionKind::TrueFalse { .. }
                | QuestionKind::ShortAnswer { .. }
                | QuestionKind::Numerical { .. }
                | QuestionKind::Code { .. }
        )
    }
}

impl Question {
    /// Per-question validation rules. Returns every violation found.
    pub fn validate(&self) -> Vec<ValidationIssue> {
        let mut issues = Vec::new();
        let issue = |msg: String| ValidationIssue::question(self.id.clone(), msg);

        if self.prompt.trim().is_empty() {
            issues.push(issue("prompt is empty".into()));
        }
        if self.points < 0.0 {
            issues.push(issue(format!("points must be non-negative, got {}", self.points)));
        }

        match &self.kind {
            QuestionKind::MultipleChoice {
                options,
                multiple_answers,
            } => {
                if options.len() < 2 {
                    issues.push(issue("multiple choice needs at least 2 options".into()));
                }
                let correct = options.iter().filter(|o| o.correct).count();
                if correct == 0 {
                    issues.push(issue("multiple choice needs at least 1 correct option".into()));
                }
                if !multiple_answers && correct > 1 {
                    issues.push(issue(format!(
                        "single-answer question has {correct} correct options"
                    )));
                }
            }
            QuestionKind::ShortAnswer { accepted, .. } => {
                if accepted.is_empty() {
                    issues.push(issue("short answer needs at least 1 accepted answer".into()));
                }
            }
            QuestionKind::FillInBlank { template, blanks } => {
                let markers = template.matches(BLANK_MARKER).count();
                if markers == 0 {
                    issues.push(issue(format!(
                        "fill-in-blank template contains no '{BLANK_MARKER}' marker"
                    )));
                } else if markers != blanks.len() {
                    issues.push(issue(format!(
                        "template has {markers} blank(s) but {} answer list(s)",
                        blanks.len()
                    )));
                }
                if blanks.iter().any(|b| b.is_empty()) {
                    issues.push(issue("every blank needs at least 1 accepted answer".into()));
                }
            }
            QuestionKind::Matching { left, right, pairs } => {
                if left.is_empty() || right.is_empty() {
                    issues.push(issue("matching needs non-empty left and right columns".into()));
                }
                for &(l, r) in pairs {
                    if l >= left.len() || r >= right.len() {
                        issues.push(issue(format!("pair ({l}, {r}) is out of bounds")));
                    }
                }
            }
            QuestionKind::Ordering {
                items,
                correct_order,
            } => {
                if items.len() < 2 {
                    issues.push(issue("ordering needs at least 2 items".into()));
                }
                if correct_order.len() != items.len() {
                    issues.push(issue("correct_order must cover every item exactly once".into()));
                }
            }
            QuestionKind::Numerical { tolerance, .. } => {
                if *tolerance < 0.0 {
                    issues.push(issue("tolerance must be non-negative".into()));
                }
            }
            QuestionKind::Code {
                language,
                test_cases,
                ..
            } => {
                if language.trim().is_empty() {
                    issues.push(issue("code question needs a language".into()));
                }
                if test_cases.is_empty() {
                    issues.push(issue("code question needs at least 1 test case".into()));
                }
            }
            QuestionKind::DragDrop {
                items,
                zones,
                placements,
            } => {
                if items.is_empty() || zones.is_empty() {
                    issues.push(issue("drag-drop needs items and zones".into()));
                }
                for &(i, z) in placements {
                    if i >= items.len() || z >= zones.len() {
                        issues.push(issue(format!("placement ({i}, {z}) is out of bounds")));
                    }
                }
            }
            QuestionKind::TrueFalse { .. } | QuestionKind::Essay { .. } => {}
        }

        issues
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn mc_question(id: &str, points: f64, correct_ids: &[&str]) -> Question {
        let options = ["a", "b", "c", "d"]
            .iter()
            .map(|o| ChoiceOption {
                id: (*o).into(),
                text: format!("option {o}"),
                correct: correct_ids.contains(o),
            })
            .collect();
        Question {
            id: id.into(),
            prompt: format!("question {id}"),
            points,
            difficulty: Difficulty::Medium,
            required: false,
            kind: QuestionKind::MultipleChoice {
                options,
                multiple_answers: correct_ids.len() > 1,
            },
        }
    }

    #[test]
    fn difficulty_display_and_parse() {
        assert_eq!(Difficulty::Hard.to_string(), "hard");
        assert_eq!("Easy".parse::<Difficulty>().unwrap(), Difficulty::Easy);
        assert!("impossible".parse::<Difficulty>().is_err());
    }

    #[test]
    fn valid_question_has_no_issues() {
        assert!(mc_question("q1", 10.0, &["a"]).validate().is_empty());
    }

    #[test]
    fn mc_without_correct_option_is_invalid() {
        let q = mc_question("q1", 10.0, &[]);
        let issues = q.validate();
        assert_eq!(issues.len(), 1);
        assert!(issues[0].message.contains("correct option"));
    }

    #[test]
    fn single_answer_mc_with_two_correct_is_invalid() {
        let mut q = mc_question("q1", 10.0, &["a", "b"]);
        if let QuestionKind::MultipleChoice {
            multiple_answers, ..
        } = &mut q.kind
        {
            *multiple_answers = false;
        }
        let issues = q.validate();
        assert!(issues
            .iter()
            .any(|i| i.message.contains("2 correct options")));
    }

    #[test]
    fn fill_in_blank_requires_marker() {
        let q = Question {
            id: "fib".into(),
            prompt: "fill this in".into(),
            points: 5.0,
            difficulty: Difficulty::Easy,
            required: false,
            kind: QuestionKind::FillInBlank {
                template: "no marker here".into(),
                blanks: vec![vec!["x".into()]],
            },
        };
        let issues = q.validate();
        assert!(issues.iter().any(|i| i.message.contains("{blank}")));
    }

    #[test]
    fn code_question_requires_language_and_cases() {
        let q = Question {
            id: "code".into(),
            prompt: "write code".into(),
            points: 20.0,
            difficulty: Difficulty::Hard,
            required: true,
            kind: QuestionKind::Code {
                language: " ".into(),
                starter_code: None,
                test_cases: vec![],
            },
        };
        let issues = q.validate();
        assert_eq!(issues.len(), 2);
    }

    #[test]
    fn auto_gradable_split() {
        assert!(mc_question("q", 1.0, &["a"]).kind.is_auto_gradable());
        let essay = QuestionKind::Essay { min_words: None };
        assert!(!essay.is_auto_gradable());
        let matching = QuestionKind::Matching {
            left: vec!["l".into()],
            right: vec!["r".into()],
            pairs: vec![(0, 0)],
        };
        assert!(!matching.is_auto_gradable());
    }

    #[test]
    fn question_serde_roundtrip_keeps_tag() {
        let q = mc_question("q1", 10.0, &["a"]);
        let json = serde_json::to_string(&q).unwrap();
        assert!(json.contains("\"type\":\"multiple_choice\""));
        let back: Question = serde_json::from_str(&json).unwrap();
        assert_eq!(back.id, "q1");
        assert_eq!(back.kind.type_name(), "multiple_choice");
    }
}
