//! Per-question-type scoring and session aggregation.
//!
//! Scorers are stateless and dispatched with one exhaustive match over the
//! question kind, so a new variant cannot be added without deciding how it
//! grades. Matching, ordering, fill-in-blank, and drag-drop are routed to
//! manual review by design; essays always are.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::answer::{Answer, AnswerPayload};
use crate::definition::GradingConfig;
use crate::question::{Question, QuestionKind};

/// Score for one question.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct QuestionScore {
    pub question_id: String,
    pub raw: f64,
    pub max: f64,
    pub is_correct: bool,
    /// A human must grade this answer before the session score is final.
    pub needs_review: bool,
    pub feedback: String,
}

impl QuestionScore {
    fn unanswered(question: &Question) -> Self {
        Self {
            question_id: question.id.clone(),
            raw: 0.0,
            max: question.points,
            is_correct: false,
            needs_review: false,
            feedback: "not answered".into(),
        }
    }

    fn manual(question: &Question) -> Self {
        Self {
            question_id: question.id.clone(),
            raw: 0.0,
            max: question.points,
            is_correct: false,
            needs_review: true,
            feedback: "pending manual review".into(),
        }
    }

    fn graded(question: &Question, raw: f64, is_correct: bool, feedback: &str) -> Self {
        Self {
            question_id: question.id.clone(),
            raw,
            max: question.points,
            is_correct,
            needs_review: false,
            feedback: feedback.into(),
        }
    }
}

/// Aggregated session score, recomputed wholesale on submit and never
/// partially persisted mid-session.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SessionScore {
    pub raw: f64,
    pub max: f64,
    /// `round(raw / max x 100)`.
    pub percentage: f64,
    pub passed: bool,
    pub letter_grade: String,
    /// True when any question needs a human; suppresses auto-grading.
    pub needs_manual_review: bool,
    pub question_scores: Vec<QuestionScore>,
    pub graded_at: DateTime<Utc>,
}

/// Score one question against its (possibly absent) answer.
pub fn score_question(question: &Question, answer: Option<&Answer>) -> QuestionScore {
    let payload = match answer.and_then(|a| a.payload.as_ref()) {
        Some(p) => p,
        None => return QuestionScore::unanswered(question),
    };

    match (&question.kind, payload) {
        (
            QuestionKind::MultipleChoice {
                options,
                multiple_answers,
            },
            AnswerPayload::MultipleChoice { selected },
        ) => score_multiple_choice(question, options, *multiple_answers, selected),

        (QuestionKind::TrueFalse { correct }, AnswerPayload::TrueFalse { value }) => {
            if value == correct {
                QuestionScore::graded(question, question.points, true, "correct")
            } else {
                QuestionScore::graded(question, 0.0, false, "incorrect")
            }
        }

        (
            QuestionKind::ShortAnswer {
                accepted,
                case_sensitive,
                exact_match,
            },
            AnswerPayload::ShortAnswer { text },
        ) => score_short_answer(question, accepted, *case_sensitive, *exact_match, text),

        (
            QuestionKind::Numerical {
                answer: target,
                tolerance,
                unit,
            },
            AnswerPayload::Numerical {
                value,
                unit: submitted_unit,
            },
        ) => score_numerical(question, *target, *tolerance, unit, *value, submitted_unit),

        (QuestionKind::Code { test_cases, .. }, AnswerPayload::Code { results, .. }) => {
            match results {
                Some(results) => score_code(question, test_cases, results),
                // No execution verdict: a human (or a retry) has to settle it.
                None => QuestionScore::manual(question),
            }
        }

        // Never auto-scored.
        (QuestionKind::Essay { .. }, AnswerPayload::Essay { .. }) => QuestionScore::manual(question),

        // Defined in the data model but routed to manual review by design;
        // the correctness data stays available for future auto-scoring.
        (QuestionKind::FillInBlank { .. }, AnswerPayload::FillInBlank { .. })
        | (QuestionKind::Matching { .. }, AnswerPayload::Matching { .. })
        | (QuestionKind::Ordering { .. }, AnswerPayload::Ordering { .. })
        | (QuestionKind::DragDrop { .. }, AnswerPayload::DragDrop { .. }) => {
            QuestionScore::manual(question)
        }

        // Payload/question mismatch is rejected at intake; if one slips
        // through persistence it degrades to manual review, not an error.
        _ => {
            tracing::warn!(
                question = %question.id,
                kind = question.kind.type_name(),
                "answer payload does not match question type; routing to manual review"
            );
            QuestionScore::manual(question)
        }
    }
}

fn score_multiple_choice(
    question: &Question,
    options: &[crate::question::ChoiceOption],
    multiple_answers: bool,
    selected: &[String],
) -> QuestionScore {
    let correct_ids: Vec<&str> = options
        .iter()
        .filter(|o| o.correct)
        .map(|o| o.id.as_str())
        .collect();

    if !multiple_answers {
        // Full points iff exactly one selection equal to the correct option.
        let is_correct =
            selected.len() == 1 && correct_ids.first() == Some(&selected[0].as_str());
        return if is_correct {
            QuestionScore::graded(question, question.points, true, "correct")
        } else {
            QuestionScore::graded(question, 0.0, false, "incorrect")
        };
    }

    let correct_selected = selected
        .iter()
        .filter(|s| correct_ids.contains(&s.as_str()))
        .count();
    let incorrect_selected = selected.len() - correct_selected;

    let mut raw = if correct_ids.is_empty() {
        0.0
    } else {
        (correct_selected as f64 / correct_ids.len() as f64) * question.points
    };
    if incorrect_selected > 0 {
        raw /= 2.0;
    }

    let exact = incorrect_selected == 0 && correct_selected == correct_ids.len();
    let feedback = if exact {
        "correct"
    } else if raw > 0.0 {
        "partially correct"
    } else {
        "incorrect"
    };
    QuestionScore::graded(question, raw, exact, feedback)
}

fn score_short_answer(
    question: &Question,
    accepted: &[String],
    case_sensitive: bool,
    exact_match: bool,
    text: &str,
) -> QuestionScore {
    let submitted = if case_sensitive {
        text.trim().to_string()
    } else {
        text.trim().to_lowercase()
    };

    // First match wins.
    let matched = accepted.iter().any(|candidate| {
        let candidate = if case_sensitive {
            candidate.trim().to_string()
        } else {
            candidate.trim().to_lowercase()
        };
        if exact_match {
            submitted == candidate
        } else {
            submitted.contains(&candidate)
        }
    });

    if matched {
        QuestionScore::graded(question, question.points, true, "correct")
    } else {
        QuestionScore::graded(question, 0.0, false, "incorrect")
    }
}

fn score_numerical(
    question: &Question,
    target: f64,
    tolerance: f64,
    unit: &Option<String>,
    value: f64,
    submitted_unit: &Option<String>,
) -> QuestionScore {
    let within = (value - target).abs() <= tolerance;
    // Units are compared only when both sides provide one.
    let unit_ok = match (unit, submitted_unit) {
        (Some(expected), Some(got)) => expected.eq_ignore_ascii_case(got),
        _ => true,
    };
    if within && unit_ok {
        QuestionScore::graded(question, question.points, true, "correct")
    } else if !unit_ok {
        QuestionScore::graded(question, 0.0, false, "wrong unit")
    } else {
        QuestionScore::graded(question, 0.0, false, "outside tolerance")
    }
}

fn score_code(
    question: &Question,
    test_cases: &[crate::question::CodeTestCase],
    results: &[crate::answer::TestCaseResult],
) -> QuestionScore {
    let total_weight: f64 = test_cases.iter().map(|t| t.weight).sum();
    if total_weight <= 0.0 {
        return QuestionScore::manual(question);
    }
    let passed_weight: f64 = results
        .iter()
        .filter(|r| r.passed)
        .filter_map(|r| test_cases.get(r.index).map(|t| t.weight))
        .sum();

    let fraction = passed_weight / total_weight;
    let raw = fraction * question.points;
    let all_passed = fraction >= 1.0;
    let feedback = format!(
        "{}/{} test cases passed",
        results.iter().filter(|r| r.passed).count(),
        test_cases.len()
    );
    QuestionScore::graded(question, raw, all_passed, &feedback)
}

/// Compute the full session score: every served question contributes to max,
/// answered questions contribute raw points.
pub fn score_session(
    questions: &[Question],
    answers: &[Answer],
    grading: &GradingConfig,
    now: DateTime<Utc>,
) -> SessionScore {
    let question_scores: Vec<QuestionScore> = questions
        .iter()
        .map(|q| {
            let answer = answers.iter().find(|a| a.question_id == q.id);
            score_question(q, answer)
        })
        .collect();

    let raw: f64 = question_scores.iter().map(|s| s.raw).sum();
    let max: f64 = question_scores.iter().map(|s| s.max).sum();
    let percentage = if max > 0.0 {
        (raw / max * 100.0).round()
    } else {
        0.0
    };
    let needs_manual_review = question_scores.iter().any(|s| s.needs_review);
    let passed = percentage >= grading.passing_score;
    let letter_grade = grading.letter_grade(percentage);

    tracing::debug!(
        raw,
        max,
        percentage,
        passed,
        needs_manual_review,
        "session scored"
    );

    SessionScore {
        raw,
        max,
        percentage,
        passed,
        letter_grade,
        needs_manual_review,
        question_scores,
        graded_at: now,
    }
}
