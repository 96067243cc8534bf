//! Answer model types.
//!
//! Answers are tagged payloads mirroring the question variants. A session
//! holds at most one live answer per question id; resubmission replaces the
//! stored answer (last write wins), which is what makes `submit_answer` safe
//! to retry.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::question::QuestionKind;

/// One examinee answer, keyed by question id.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Answer {
    pub question_id: String,
    /// `None` for skipped / mark-for-review placeholders.
    pub payload: Option<AnswerPayload>,
    /// Seconds the examinee reported spending on this answer.
    #[serde(default)]
    pub time_spent_secs: u64,
    /// How many times this answer has been (re)submitted.
    pub attempt_count: u32,
    pub skipped: bool,
    pub marked_for_review: bool,
    pub submitted_at: DateTime<Utc>,
}

impl Answer {
    pub fn new(question_id: impl Into<String>, payload: AnswerPayload, now: DateTime<Utc>) -> Self {
        Self {
            question_id: question_id.into(),
            payload: Some(payload),
            time_spent_secs: 0,
            attempt_count: 1,
            skipped: false,
            marked_for_review: false,
            submitted_at: now,
        }
    }

    /// Placeholder recorded when a question is skipped or flagged without an
    /// answer.
    pub fn skipped(question_id: impl Into<String>, now: DateTime<Utc>) -> Self {
        Self {
            question_id: question_id.into(),
            payload: None,
            time_spent_secs: 0,
            attempt_count: 0,
            skipped: true,
            marked_for_review: false,
            submitted_at: now,
        }
    }

    /// Whether this answer carries a payload of the right variant for the
    /// given question kind. Placeholders match everything.
    pub fn matches_kind(&self, kind: &QuestionKind) -> bool {
        let Some(payload) = &self.payload else {
            return true;
        };
        matches!(
            (payload, kind),
            (AnswerPayload::MultipleChoice { .. }, QuestionKind::MultipleChoice { .. })
                | (AnswerPayload::TrueFalse { .. }, QuestionKind::TrueFalse { .. })
                | (AnswerPayload::ShortAnswer { .. }, QuestionKind::ShortAnswer { .. })
                | (AnswerPayload::Essay { .. }, QuestionKind::Essay { .. })
                | (AnswerPayload::FillInBlank { .. }, QuestionKind::FillInBlank { .. })
                | (AnswerPayload::Matching { .. }, QuestionKind::Matching { .. })
                | (AnswerPayload::Ordering { .. }, QuestionKind::Ordering { .. })
                | (AnswerPayload::Numerical { .. }, QuestionKind::Numerical { .. })
                | (AnswerPayload::Code { .. }, QuestionKind::Code { .. })
                | (AnswerPayload::DragDrop { .. }, QuestionKind::DragDrop { .. })
        )
    }
}

/// Type-specific answer content.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum AnswerPayload {
    MultipleChoice {
        /// Selected option ids.
        selected: Vec<String>,
    },
    TrueFalse {
        value: bool,
    },
    ShortAnswer {
        text: String,
    },
    Essay {
        text: String,
    },
    FillInBlank {
        /// One entry per blank, in template order.
        entries: Vec<String>,
    },
    Matching {
        pairs: Vec<(usize, usize)>,
    },
    Ordering {
        order: Vec<usize>,
    },
    Numerical {
        value: f64,
        #[serde(default)]
        unit: Option<String>,
    },
    Code {
        source: String,
        /// Per-test-case verdicts from the external execution service.
        /// `None` until execution has run.
        #[serde(default)]
        results: Option<Vec<TestCaseResult>>,
    },
    DragDrop {
        placements: Vec<(usize, usize)>,
    },
}

/// Verdict for one code-question test case, produced by the external
/// execution collaborator and consumed by scoring.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TestCaseResult {
    /// Index into the question's `test_cases`.
    pub index: usize,
    pub passed: bool,
    pub duration_ms: u64,
    #[serde(default)]
    pub output: Option<String>,
}
