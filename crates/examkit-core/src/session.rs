//! Session lifecycle: one examinee's timed attempt at an assessment.
//!
//! The session owns the state machine, navigation, answer intake,
//! pause/resume, and time accounting. Every time-dependent operation takes
//! `now` from the caller so the machine is deterministic under test; the
//! engine crate passes `Utc::now()`.
//!
//! Sessions are archived after grading, never deleted.

use std::fmt;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::adaptive::AdaptiveState;
use crate::answer::{Answer, AnswerPayload};
use crate::definition::{GradingConfig, NavigationConfig, TimingConfig};
use crate::error::{EngineError, Result, ValidationIssue};
use crate::integrity::{IntegrityTracker, SecurityEvent};
use crate::question::{Question, QuestionKind};
use crate::scoring::SessionScore;

/// Lifecycle states.
///
/// `NotStarted -> InProgress <-> Paused`, `InProgress|Paused -> Submitted ->
/// (Graded | UnderReview)`, with terminal `TimedOut` and `Terminated`. Only
/// `InProgress` accepts answers, navigation, and review marks; `Paused`
/// accepts resume and submit.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SessionStatus {
    NotStarted,
    InProgress,
    Paused,
    Submitted,
    UnderReview,
    Graded,
    TimedOut,
    Terminated,
}

impl SessionStatus {
    /// States in which the attempt is still running (or runnable).
    pub fn is_live(&self) -> bool {
        matches!(
            self,
            SessionStatus::NotStarted | SessionStatus::InProgress | SessionStatus::Paused
        )
    }

    /// States from which no transition exists at all.
    pub fn is_terminal(&self) -> bool {
        matches!(
            self,
            SessionStatus::Graded | SessionStatus::TimedOut | SessionStatus::Terminated
        )
    }
}

impl fmt::Display for SessionStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            SessionStatus::NotStarted => "not_started",
            SessionStatus::InProgress => "in_progress",
            SessionStatus::Paused => "paused",
            SessionStatus::Submitted => "submitted",
            SessionStatus::UnderReview => "under_review",
            SessionStatus::Graded => "graded",
            SessionStatus::TimedOut => "timed_out",
            SessionStatus::Terminated => "terminated",
        };
        write!(f, "{s}")
    }
}

/// How the session got submitted.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SubmissionMethod {
    /// The examinee submitted.
    Manual,
    /// The timeout sweep submitted an expired session.
    Auto,
    /// An administrator or proctor forced submission.
    Forced,
}

/// Definition configuration copied onto the session at creation time, so
/// later definition revisions never change an in-flight attempt.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ConfigSnapshot {
    pub timing: TimingConfig,
    pub navigation: NavigationConfig,
    pub grading: GradingConfig,
    pub definition_version: u32,
}

/// Accumulated active time on one question. `opened_at` is set while the
/// question is the current one and the session is running.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct QuestionTiming {
    pub question_id: String,
    pub accumulated_secs: u64,
    pub opened_at: Option<DateTime<Utc>>,
}

/// Wall-clock bookkeeping for one session.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct TimingRecord {
    pub started_at: Option<DateTime<Utc>>,
    pub submitted_at: Option<DateTime<Utc>>,
    /// Set while paused.
    pub paused_at: Option<DateTime<Utc>>,
    /// Total paused wall-clock seconds, excluded from the time limit.
    pub pause_accumulated_secs: u64,
    /// Active seconds from start to submission; set once on submit.
    pub total_active_secs: Option<u64>,
    pub per_question: Vec<QuestionTiming>,
}

/// Progress counters, recomputed on every answer upsert.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Progress {
    pub answered: usize,
    pub skipped: usize,
    pub completion_percent: f64,
}

/// One examinee's attempt at an assessment definition.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Session {
    pub id: Uuid,
    pub definition_id: String,
    pub user_id: String,
    /// 1-based attempt number, unique per user + definition.
    pub attempt: u32,
    pub status: SessionStatus,
    pub config: ConfigSnapshot,
    /// The questions served to this session, in presentation order.
    pub questions: Vec<Question>,
    pub answers: Vec<Answer>,
    pub current_index: usize,
    pub progress: Progress,
    pub timing: TimingRecord,
    pub adaptive: Option<AdaptiveState>,
    pub score: Option<SessionScore>,
    pub integrity: IntegrityTracker,
    pub submission_method: Option<SubmissionMethod>,
    pub created_at: DateTime<Utc>,
}

impl Session {
    pub fn current_question(&self) -> Option<&Question> {
        self.questions.get(self.current_index)
    }

    pub fn answer_for(&self, question_id: &str) -> Option<&Answer> {
        self.answers.iter().find(|a| a.question_id == question_id)
    }

    /// Begin the attempt: stamps the start time and opens timing for the
    /// first question.
    pub fn start(&mut self, now: DateTime<Utc>) -> Result<()> {
        if self.status != SessionStatus::NotStarted {
            return Err(EngineError::state("start", self.status));
        }
        self.status = SessionStatus::InProgress;
        self.timing.started_at = Some(now);
        if let Some(q) = self.questions.first() {
            let id = q.id.clone();
            self.open_interval(&id, now);
        }
        tracing::info!(session = %self.id, user = %self.user_id, "session started");
        Ok(())
    }

    /// Pause the attempt. Closes the open per-question interval without
    /// discarding it; paused wall clock is excluded from the time limit.
    pub fn pause(&mut self, now: DateTime<Utc>) -> Result<()> {
        if self.status != SessionStatus::InProgress {
            return Err(EngineError::state("pause", self.status));
        }
        self.close_open_interval(now);
        self.timing.paused_at = Some(now);
        self.status = SessionStatus::Paused;
        Ok(())
    }

    /// Resume from pause, re-opening the timing interval for the current
    /// question.
    pub fn resume(&mut self, now: DateTime<Utc>) -> Result<()> {
        if self.status != SessionStatus::Paused {
            return Err(EngineError::state("resume", self.status));
        }
        self.fold_pause(now);
        self.status = SessionStatus::InProgress;
        if let Some(q) = self.current_question() {
            let id = q.id.clone();
            self.open_interval(&id, now);
        }
        Ok(())
    }

    /// Upsert an answer by question id. Replace semantics make this
    /// idempotent under retry; the attempt count still records resubmissions.
    pub fn submit_answer(&mut self, mut answer: Answer, now: DateTime<Utc>) -> Result<()> {
        if self.status != SessionStatus::InProgress {
            return Err(EngineError::state("submit an answer to", self.status));
        }
        let question = self
            .questions
            .iter()
            .find(|q| q.id == answer.question_id)
            .ok_or_else(|| {
                EngineError::NotFound(format!("question '{}' in session", answer.question_id))
            })?;
        if !answer.matches_kind(&question.kind) {
            return Err(EngineError::Validation(vec![ValidationIssue::question(
                answer.question_id.clone(),
                format!(
                    "answer payload does not match question type '{}'",
                    question.kind.type_name()
                ),
            )]));
        }
        if let (
            QuestionKind::Essay {
                min_words: Some(min),
            },
            Some(AnswerPayload::Essay { text }),
        ) = (&question.kind, &answer.payload)
        {
            let words = text.split_whitespace().count();
            if words < *min as usize {
                return Err(EngineError::Validation(vec![ValidationIssue::question(
                    answer.question_id.clone(),
                    format!("essay has {words} word(s), minimum is {min}"),
                )]));
            }
        }

        answer.submitted_at = now;
        if let Some(existing) = self
            .answers
            .iter_mut()
            .find(|a| a.question_id == answer.question_id)
        {
            answer.attempt_count = existing.attempt_count + 1;
            *existing = answer;
        } else {
            self.answers.push(answer);
        }
        self.recompute_progress();
        Ok(())
    }

    /// Move to another question. Returns `Ok(false)` without side effects
    /// when the target precedes the current question and backward navigation
    /// is disallowed.
    pub fn navigate_to(&mut self, question_id: &str, now: DateTime<Utc>) -> Result<bool> {
        if self.status != SessionStatus::InProgress {
            return Err(EngineError::state("navigate", self.status));
        }
        let target = self
            .questions
            .iter()
            .position(|q| q.id == question_id)
            .ok_or_else(|| {
                EngineError::NotFound(format!("question '{question_id}' in session"))
            })?;
        if target < self.current_index && !self.config.navigation.allow_backward {
            return Ok(false);
        }
        self.close_open_interval(now);
        self.current_index = target;
        self.open_interval(question_id, now);
        Ok(true)
    }

    /// Flag a question for later review; records a skipped placeholder when
    /// no answer exists yet.
    pub fn mark_for_review(&mut self, question_id: &str, now: DateTime<Utc>) -> Result<()> {
        if self.status != SessionStatus::InProgress {
            return Err(EngineError::state("mark a question in", self.status));
        }
        if !self.questions.iter().any(|q| q.id == question_id) {
            return Err(EngineError::NotFound(format!(
                "question '{question_id}' in session"
            )));
        }
        if let Some(answer) = self
            .answers
            .iter_mut()
            .find(|a| a.question_id == question_id)
        {
            answer.marked_for_review = true;
        } else {
            let mut placeholder = Answer::skipped(question_id, now);
            placeholder.marked_for_review = true;
            self.answers.push(placeholder);
            self.recompute_progress();
        }
        Ok(())
    }

    /// Seconds left on the clock: `limit - active elapsed`, floored at zero.
    /// `None` when the session is untimed.
    pub fn remaining_time(&self, now: DateTime<Utc>) -> Option<u64> {
        let limit = self.config.timing.time_limit_secs?;
        Some(limit.saturating_sub(self.active_elapsed_secs(now)))
    }

    /// Whether the clock has run out on a running (or paused) attempt.
    pub fn is_expired(&self, now: DateTime<Utc>) -> bool {
        matches!(
            self.status,
            SessionStatus::InProgress | SessionStatus::Paused
        ) && self.remaining_time(now) == Some(0)
    }

    /// Submit the attempt. Allowed from `InProgress` or `Paused`; closes the
    /// active timing interval, stamps submission, and records total active
    /// time. A manual submission is refused while a required question is
    /// unanswered; auto and forced submissions take the attempt as it
    /// stands. Scoring happens afterwards via [`Session::apply_score`].
    pub fn submit(&mut self, now: DateTime<Utc>, method: SubmissionMethod) -> Result<()> {
        if !matches!(
            self.status,
            SessionStatus::InProgress | SessionStatus::Paused
        ) {
            return Err(EngineError::state("submit", self.status));
        }
        if method == SubmissionMethod::Manual {
            let missing: Vec<ValidationIssue> = self
                .questions
                .iter()
                .filter(|q| q.required && !self.is_answered(&q.id))
                .map(|q| {
                    ValidationIssue::question(q.id.clone(), "required question is unanswered")
                })
                .collect();
            if !missing.is_empty() {
                return Err(EngineError::Validation(missing));
            }
        }
        if self.status == SessionStatus::Paused {
            self.fold_pause(now);
        }
        self.close_open_interval(now);
        self.timing.submitted_at = Some(now);
        self.timing.total_active_secs = Some(self.active_elapsed_secs(now));
        self.status = SessionStatus::Submitted;
        self.submission_method = Some(method);
        tracing::info!(session = %self.id, ?method, "session submitted");
        Ok(())
    }

    /// Attach the computed score and settle the final state: `UnderReview`
    /// when any question needs a human, otherwise `Graded`.
    pub fn apply_score(&mut self, score: SessionScore) -> Result<()> {
        if self.status != SessionStatus::Submitted {
            return Err(EngineError::state("grade", self.status));
        }
        self.status = if score.needs_manual_review {
            SessionStatus::UnderReview
        } else {
            SessionStatus::Graded
        };
        self.score = Some(score);
        Ok(())
    }

    /// Hard-expire an attempt that can no longer be submitted, e.g. when the
    /// definition's availability deadline passed mid-attempt.
    pub fn time_out(&mut self, now: DateTime<Utc>) -> Result<()> {
        if !self.status.is_live() {
            return Err(EngineError::state("time out", self.status));
        }
        self.close_open_interval(now);
        self.timing.submitted_at = Some(now);
        self.status = SessionStatus::TimedOut;
        tracing::warn!(session = %self.id, "session timed out");
        Ok(())
    }

    /// Proctoring-driven hard stop.
    pub fn terminate(&mut self, now: DateTime<Utc>) -> Result<()> {
        if !self.status.is_live() {
            return Err(EngineError::state("terminate", self.status));
        }
        self.close_open_interval(now);
        self.status = SessionStatus::Terminated;
        tracing::warn!(session = %self.id, "session terminated");
        Ok(())
    }

    /// Append an externally reported security event. Accepted until the
    /// session settles (proctoring pipelines report with lag); rejected once
    /// graded or dead.
    pub fn add_security_event(&mut self, event: SecurityEvent) -> Result<()> {
        if self.status.is_terminal() {
            return Err(EngineError::state("record a security event for", self.status));
        }
        self.integrity.record(event);
        Ok(())
    }

    /// A question counts as answered once it has a real payload; a skipped
    /// placeholder from [`Session::mark_for_review`] does not count.
    fn is_answered(&self, question_id: &str) -> bool {
        self.answer_for(question_id)
            .is_some_and(|a| a.payload.is_some() && !a.skipped)
    }

    fn recompute_progress(&mut self) {
        let answered = self
            .answers
            .iter()
            .filter(|a| a.payload.is_some() && !a.skipped)
            .count();
        let skipped = self.answers.iter().filter(|a| a.skipped).count();
        let total = self.questions.len();
        self.progress = Progress {
            answered,
            skipped,
            completion_percent: if total == 0 {
                0.0
            } else {
                (answered as f64 / total as f64) * 100.0
            },
        };
    }

    fn open_interval(&mut self, question_id: &str, now: DateTime<Utc>) {
        if let Some(entry) = self
            .timing
            .per_question
            .iter_mut()
            .find(|t| t.question_id == question_id)
        {
            entry.opened_at = Some(now);
        } else {
            self.timing.per_question.push(QuestionTiming {
                question_id: question_id.to_string(),
                accumulated_secs: 0,
                opened_at: Some(now),
            });
        }
    }

    fn close_open_interval(&mut self, now: DateTime<Utc>) {
        for entry in &mut self.timing.per_question {
            if let Some(opened) = entry.opened_at.take() {
                entry.accumulated_secs += (now - opened).num_seconds().max(0) as u64;
            }
        }
    }

    /// Add the current pause interval into the accumulator.
    fn fold_pause(&mut self, now: DateTime<Utc>) {
        if let Some(paused_at) = self.timing.paused_at.take() {
            self.timing.pause_accumulated_secs += (now - paused_at).num_seconds().max(0) as u64;
        }
    }

    /// Wall-clock seconds since start, minus all paused time.
    fn active_elapsed_secs(&self, now: DateTime<Utc>) -> u64 {
        let Some(started) = self.timing.started_at else {
            return 0;
        };
        let wall = (now - started).num_seconds().max(0) as u64;
        let mut paused = self.timing.pause_accumulated_secs;
        if let Some(paused_at) = self.timing.paused_at {
            paused += (now - paused_at).num_seconds().max(0) as u64;
        }
        wall.saturating_sub(paused)
    }
}
