//! Session reports with JSON persistence.
//!
//! A report is a read-only projection of a session for examiners and
//! examinees. Score details are withheld while the session's integrity state
//! is in violation; the rest of the report still renders.

use std::path::Path;

use anyhow::{Context, Result};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::scoring::SessionScore;
use crate::session::{Progress, Session, SessionStatus, SubmissionMethod};

/// A complete report over one session.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SessionReport {
    pub session_id: Uuid,
    pub definition_id: String,
    pub definition_version: u32,
    pub user_id: String,
    pub attempt: u32,
    pub status: SessionStatus,
    pub created_at: DateTime<Utc>,
    pub submitted_at: Option<DateTime<Utc>>,
    pub submission_method: Option<SubmissionMethod>,
    /// Active seconds from start to submission.
    pub total_active_secs: Option<u64>,
    pub progress: Progress,
    /// Seconds spent per question, in presentation order.
    pub time_per_question: Vec<QuestionTime>,
    /// `None` when ungraded, or when results are withheld.
    pub score: Option<SessionScore>,
    /// False when integrity violations withhold the score.
    pub results_released: bool,
    pub integrity: IntegritySummary,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct QuestionTime {
    pub question_id: String,
    pub seconds: u64,
}

/// Integrity state as exposed to report consumers. Individual events stay on
/// the session; reports only carry the aggregate.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct IntegritySummary {
    pub score: u32,
    pub flagged_for_review: bool,
    pub has_violations: bool,
    pub event_count: usize,
}

impl SessionReport {
    /// Project a session into a report. When the session has integrity
    /// violations the score is withheld and `results_released` is false.
    pub fn from_session(session: &Session) -> Self {
        let has_violations = session.integrity.has_violations();
        let results_released = !has_violations;

        let time_per_question = session
            .timing
            .per_question
            .iter()
            .map(|t| QuestionTime {
                question_id: t.question_id.clone(),
                seconds: t.accumulated_secs,
            })
            .collect();

        if has_violations {
            tracing::warn!(
                session = %session.id,
                integrity = session.integrity.score(),
                "withholding results due to integrity violations"
            );
        }

        Self {
            session_id: session.id,
            definition_id: session.definition_id.clone(),
            definition_version: session.config.definition_version,
            user_id: session.user_id.clone(),
            attempt: session.attempt,
            status: session.status,
            created_at: session.created_at,
            submitted_at: session.timing.submitted_at,
            submission_method: session.submission_method,
            total_active_secs: session.timing.total_active_secs,
            progress: session.progress.clone(),
            time_per_question,
            score: if results_released {
                session.score.clone()
            } else {
                None
            },
            results_released,
            integrity: IntegritySummary {
                score: session.integrity.score(),
                flagged_for_review: session.integrity.flagged_for_review(),
                has_violations,
                event_count: session.integrity.events().len(),
            },
        }
    }

    /// Save the report as JSON to a file.
    pub fn save_json(&self, path: &Path) -> Result<()> {
        let json = serde_json::to_string_pretty(self).context("failed to serialize report")?;
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        std::fs::write(path, json)
            .with_context(|| format!("failed to write report to {}", path.display()))?;
        Ok(())
    }

    /// Load a report from a JSON file.
    pub fn load_json(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path)
            .with_context(|| format!("failed to read report from {}", path.display()))?;
        let report: SessionReport =
            serde_json::from_str(&content).context("failed to parse report JSON")?;
        Ok(report)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::answer::{Answer, AnswerPayload};
    use crate::definition::{GradingConfig, NavigationConfig, TimingConfig};
    use crate::integrity::{SecurityEvent, Severity};
    use crate::question::{Difficulty, Question, QuestionKind};
    use crate::scoring::score_session;
    use crate::session::{ConfigSnapshot, SubmissionMethod, TimingRecord};
    use chrono::Duration;

    fn graded_session() -> Session {
        let t0 = Utc::now();
        let questions = vec![Question {
            id: "q1".into(),
            prompt: "q1".into(),
            points: 10.0,
            difficulty: Difficulty::Medium,
            required: false,
            kind: QuestionKind::TrueFalse { correct: true },
        }];
        let mut session = Session {
            id: Uuid::new_v4(),
            definition_id: "exam-1".into(),
            user_id: "alice".into(),
            attempt: 1,
            status: SessionStatus::NotStarted,
            config: ConfigSnapshot {
                timing: TimingConfig::default(),
                navigation: NavigationConfig::default(),
                grading: GradingConfig::default(),
                definition_version: 1,
            },
            questions,
            answers: vec![],
            current_index: 0,
            progress: Progress::default(),
            timing: TimingRecord::default(),
            adaptive: None,
            score: None,
            integrity: crate::integrity::IntegrityTracker::new(),
            submission_method: None,
            created_at: t0,
        };
        session.start(t0).unwrap();
        session
            .submit_answer(
                Answer::new("q1", AnswerPayload::TrueFalse { value: true }, t0),
                t0 + Duration::seconds(20),
            )
            .unwrap();
        session
            .submit(t0 + Duration::seconds(30), SubmissionMethod::Manual)
            .unwrap();
        let score = score_session(
            &session.questions,
            &session.answers,
            &session.config.grading,
            t0 + Duration::seconds(30),
        );
        session.apply_score(score).unwrap();
        session
    }

    #[test]
    fn clean_session_releases_results() {
        let session = graded_session();
        let report = SessionReport::from_session(&session);

        assert!(report.results_released);
        let score = report.score.as_ref().unwrap();
        assert_eq!(score.percentage, 100.0);
        assert_eq!(report.status, SessionStatus::Graded);
        assert_eq!(report.total_active_secs, Some(30));
        assert_eq!(report.time_per_question[0].seconds, 30);
    }

    #[test]
    fn violations_withhold_the_score() {
        let mut session = graded_session();
        // Grading already happened; a late critical report still withholds.
        session.integrity.record(SecurityEvent {
            timestamp: Utc::now(),
            event_type: "impersonation_detected".into(),
            severity: Severity::Critical,
            details: None,
        });
        let report = SessionReport::from_session(&session);

        assert!(!report.results_released);
        assert!(report.score.is_none());
        // The aggregate integrity picture is still visible.
        assert!(report.integrity.has_violations);
        assert_eq!(report.integrity.event_count, 1);
    }

    #[test]
    fn json_roundtrip() {
        let session = graded_session();
        let report = SessionReport::from_session(&session);
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("reports").join("session.json");

        report.save_json(&path).unwrap();
        let loaded = SessionReport::load_json(&path).unwrap();

        assert_eq!(loaded.session_id, report.session_id);
        assert_eq!(loaded.definition_id, "exam-1");
        assert!(loaded.results_released);
    }
}
