//! Assessment definitions: the question set plus timing, navigation,
//! grading, adaptive, and eligibility configuration.
//!
//! A published definition is immutable; changes go through `new_revision`,
//! which produces a fresh draft with a bumped version. In-flight sessions
//! snapshot their configuration at creation time, so revisions never change
//! a running attempt.

use std::collections::HashSet;
use std::fmt;

use chrono::{DateTime, Utc};
use rand::seq::SliceRandom;
use rand::Rng;
use serde::{Deserialize, Serialize};

use crate::adaptive;
use crate::error::{EngineError, Result, ValidationIssue};
use crate::question::{Difficulty, Question};

/// A named group of candidate questions from which a subset is sampled per
/// session.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct QuestionPool {
    pub name: String,
    pub candidates: Vec<Question>,
    /// How many candidates each session draws.
    pub select_count: usize,
    /// Random draw when true, first `select_count` in authored order when
    /// false.
    #[serde(default)]
    pub randomize: bool,
}

/// Session-level time limits.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct TimingConfig {
    /// Wall-clock limit on active (non-paused) time. `None` means untimed.
    #[serde(default)]
    pub time_limit_secs: Option<u64>,
}

/// Navigation rules during an attempt.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NavigationConfig {
    /// May the examinee return to earlier questions?
    #[serde(default = "default_true")]
    pub allow_backward: bool,
    /// Shuffle the generated question order per session.
    #[serde(default)]
    pub randomize_order: bool,
}

impl Default for NavigationConfig {
    fn default() -> Self {
        Self {
            allow_backward: true,
            randomize_order: false,
        }
    }
}

fn default_true() -> bool {
    true
}

/// One letter-grade band over a percentage range.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GradeBand {
    pub grade: String,
    pub min: f64,
    pub max: f64,
}

/// Grading thresholds and the letter-grade scale.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GradingConfig {
    /// Passing threshold as a percentage.
    #[serde(default = "default_passing_score")]
    pub passing_score: f64,
    #[serde(default = "GradingConfig::default_scale")]
    pub scale: Vec<GradeBand>,
}

fn default_passing_score() -> f64 {
    60.0
}

impl Default for GradingConfig {
    fn default() -> Self {
        Self {
            passing_score: default_passing_score(),
            scale: Self::default_scale(),
        }
    }
}

impl GradingConfig {
    pub fn default_scale() -> Vec<GradeBand> {
        let band = |grade: &str, min: f64, max: f64| GradeBand {
            grade: grade.into(),
            min,
            max,
        };
        vec![
            band("A", 90.0, 100.0),
            band("B", 80.0, 89.0),
            band("C", 70.0, 79.0),
            band("D", 60.0, 69.0),
            band("F", 0.0, 59.0),
        ]
    }

    /// First band whose `[min, max]` range contains the percentage; falls
    /// back to the lowest band when nothing matches.
    pub fn letter_grade(&self, percentage: f64) -> String {
        self.scale
            .iter()
            .find(|b| percentage >= b.min && percentage <= b.max)
            .or_else(|| {
                self.scale
                    .iter()
                    .min_by(|a, b| a.min.total_cmp(&b.min))
            })
            .map(|b| b.grade.clone())
            .unwrap_or_default()
    }
}

/// Simplified adaptive-selection configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AdaptiveConfig {
    #[serde(default)]
    pub enabled: bool,
    #[serde(default)]
    pub initial_difficulty: Difficulty,
    #[serde(default = "default_min_questions")]
    pub min_questions: usize,
    #[serde(default = "default_max_questions")]
    pub max_questions: usize,
}

fn default_min_questions() -> usize {
    5
}

fn default_max_questions() -> usize {
    20
}

impl Default for AdaptiveConfig {
    fn default() -> Self {
        Self {
            enabled: false,
            initial_difficulty: Difficulty::Medium,
            min_questions: default_min_questions(),
            max_questions: default_max_questions(),
        }
    }
}

/// When the assessment may be taken.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct AvailabilityWindow {
    #[serde(default)]
    pub from: Option<DateTime<Utc>>,
    #[serde(default)]
    pub until: Option<DateTime<Utc>>,
}

/// Who may take the assessment.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ParticipantConfig {
    #[serde(default)]
    pub mode: ParticipantMode,
    /// Consulted only in `Specific` mode.
    #[serde(default)]
    pub allowed: Vec<String>,
    /// Always consulted; explicit exclusions win.
    #[serde(default)]
    pub excluded: Vec<String>,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ParticipantMode {
    #[default]
    All,
    Specific,
}

/// Definition lifecycle.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum DefinitionStatus {
    #[default]
    Draft,
    Published,
    Archived,
}

/// Result of an eligibility check. Never an error: ineligibility is a normal
/// outcome with a named reason.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Eligibility {
    Eligible,
    Ineligible(IneligibilityReason),
}

impl Eligibility {
    pub fn is_eligible(&self) -> bool {
        matches!(self, Eligibility::Eligible)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum IneligibilityReason {
    /// The availability window has not opened yet.
    NotYetAvailable,
    /// The availability window has closed.
    DeadlinePassed,
    /// The definition is not published.
    NotAvailable,
    /// The user is not on the allow list, or is explicitly excluded.
    NotAuthorized,
}

impl fmt::Display for IneligibilityReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            IneligibilityReason::NotYetAvailable => write!(f, "assessment is not yet available"),
            IneligibilityReason::DeadlinePassed => write!(f, "assessment deadline has passed"),
            IneligibilityReason::NotAvailable => write!(f, "assessment is not available"),
            IneligibilityReason::NotAuthorized => write!(f, "user is not authorized"),
        }
    }
}

/// An exam/quiz definition: ordered and pooled questions plus all per-session
/// configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AssessmentDefinition {
    pub id: String,
    pub title: String,
    #[serde(default)]
    pub description: String,
    #[serde(default)]
    pub questions: Vec<Question>,
    #[serde(default)]
    pub pools: Vec<QuestionPool>,
    #[serde(default)]
    pub timing: TimingConfig,
    #[serde(default)]
    pub navigation: NavigationConfig,
    #[serde(default)]
    pub grading: GradingConfig,
    #[serde(default)]
    pub adaptive: AdaptiveConfig,
    #[serde(default)]
    pub availability: AvailabilityWindow,
    #[serde(default)]
    pub participants: ParticipantConfig,
    /// `None` means unlimited attempts.
    #[serde(default)]
    pub max_attempts: Option<u32>,
    #[serde(default)]
    pub status: DefinitionStatus,
    #[serde(default = "default_version")]
    pub version: u32,
}

fn default_version() -> u32 {
    1
}

impl AssessmentDefinition {
    /// Validate the definition and every question in it. Returns the full
    /// list of violations, not just the first.
    pub fn validate(&self) -> Vec<ValidationIssue> {
        let mut issues = Vec::new();

        if self.questions.is_empty() && self.pools.is_empty() {
            issues.push(ValidationIssue::definition("definition has no questions"));
        }

        let mut seen = HashSet::new();
        for q in self.all_questions() {
            if !seen.insert(q.id.as_str()) {
                issues.push(ValidationIssue::question(
                    q.id.clone(),
                    "duplicate question id",
                ));
            }
            issues.extend(q.validate());
        }

        for pool in &self.pools {
            if pool.select_count == 0 {
                issues.push(ValidationIssue::definition(format!(
                    "pool '{}' selects zero questions",
                    pool.name
                )));
            }
            if pool.select_count > pool.candidates.len() {
                issues.push(ValidationIssue::definition(format!(
                    "pool '{}' selects {} of {} candidates",
                    pool.name,
                    pool.select_count,
                    pool.candidates.len()
                )));
            }
            // Uniform points within a pool keep total_points well defined
            // before sampling happens.
            if let Some(first) = pool.candidates.first() {
                if pool.candidates.iter().any(|c| c.points != first.points) {
                    issues.push(ValidationIssue::definition(format!(
                        "pool '{}' mixes point values; all candidates must be worth the same",
                        pool.name
                    )));
                }
            }
        }

        if let (Some(from), Some(until)) = (self.availability.from, self.availability.until) {
            if until <= from {
                issues.push(ValidationIssue::definition(
                    "availability window closes before it opens",
                ));
            }
        }

        issues
    }

    /// Every question this definition can serve: fixed questions plus all
    /// pool candidates.
    pub fn all_questions(&self) -> impl Iterator<Item = &Question> {
        self.questions
            .iter()
            .chain(self.pools.iter().flat_map(|p| p.candidates.iter()))
    }

    /// Maximum points a generated session is worth. Each pool contributes
    /// `select_count x per-candidate points` once, regardless of which
    /// candidates get sampled.
    pub fn total_points(&self) -> f64 {
        let fixed: f64 = self.questions.iter().map(|q| q.points).sum();
        let pooled: f64 = self
            .pools
            .iter()
            .map(|p| {
                let per = p.candidates.first().map(|c| c.points).unwrap_or(0.0);
                per * p.select_count as f64
            })
            .sum();
        fixed + pooled
    }

    /// Build one session's ordered question list.
    ///
    /// Adaptive disabled: expand each pool (random sample or fixed slice),
    /// append to the fixed questions, then shuffle everything when
    /// `randomize_order` is set. Adaptive enabled: delegate to the
    /// difficulty-bucket selector over the whole bank.
    pub fn generate_question_set<R: Rng + ?Sized>(&self, rng: &mut R) -> Vec<Question> {
        if self.adaptive.enabled {
            let bank: Vec<Question> = self.all_questions().cloned().collect();
            return adaptive::select_questions(&bank, &self.adaptive, rng);
        }

        let mut set = self.questions.clone();
        for pool in &self.pools {
            let count = pool.select_count.min(pool.candidates.len());
            if pool.randomize {
                set.extend(
                    pool.candidates
                        .choose_multiple(rng, count)
                        .cloned(),
                );
            } else {
                set.extend(pool.candidates.iter().take(count).cloned());
            }
        }
        if self.navigation.randomize_order {
            set.shuffle(rng);
        }
        set
    }

    /// Check whether `user_id` may start an attempt at `now`.
    pub fn check_eligibility(&self, user_id: &str, now: DateTime<Utc>) -> Eligibility {
        if self.status != DefinitionStatus::Published {
            return Eligibility::Ineligible(IneligibilityReason::NotAvailable);
        }
        if let Some(from) = self.availability.from {
            if now < from {
                return Eligibility::Ineligible(IneligibilityReason::NotYetAvailable);
            }
        }
        if let Some(until) = self.availability.until {
            if now > until {
                return Eligibility::Ineligible(IneligibilityReason::DeadlinePassed);
            }
        }
        if self.participants.excluded.iter().any(|u| u == user_id) {
            return Eligibility::Ineligible(IneligibilityReason::NotAuthorized);
        }
        if self.participants.mode == ParticipantMode::Specific
            && !self.participants.allowed.iter().any(|u| u == user_id)
        {
            return Eligibility::Ineligible(IneligibilityReason::NotAuthorized);
        }
        Eligibility::Eligible
    }

    /// Publish the definition, refusing if validation finds any violation.
    pub fn publish(&mut self) -> Result<()> {
        let issues = self.validate();
        if !issues.is_empty() {
            return Err(EngineError::Validation(issues));
        }
        self.status = DefinitionStatus::Published;
        tracing::info!(definition = %self.id, version = self.version, "definition published");
        Ok(())
    }

    /// Start a new draft revision of a published definition. The published
    /// version stays immutable; edits go to the returned draft.
    pub fn new_revision(&self) -> Self {
        let mut next = self.clone();
        next.version = self.version + 1;
        next.status = DefinitionStatus::Draft;
        next
    }

    /// Serialize for export. Reconstructing via [`AssessmentDefinition::import`]
    /// yields an identical question set, scoring config, and total points.
    pub fn export(&self) -> serde_json::Result<String> {
        serde_json::to_string_pretty(self)
    }

    pub fn import(payload: &str) -> serde_json::Result<Self> {
        serde_json::from_str(payload)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::question::{ChoiceOption, QuestionKind};
    use rand::rngs::StdRng;
    use rand::SeedableRng;

    fn tf(id: &str, points: f64) -> Question {
        Question {
            id: id.into(),
            prompt: format!("statement {id}"),
            points,
            difficulty: Difficulty::Medium,
            required: false,
            kind: QuestionKind::TrueFalse { correct: true },
        }
    }

    fn mc(id: &str, points: f64) -> Question {
        Question {
            id: id.into(),
            prompt: format!("pick one {id}"),
            points,
            difficulty: Difficulty::Medium,
            required: false,
            kind: QuestionKind::MultipleChoice {
                options: vec![
                    ChoiceOption {
                        id: "a".into(),
                        text: "right".into(),
                        correct: true,
                    },
                    ChoiceOption {
                        id: "b".into(),
                        text: "wrong".into(),
                        correct: false,
                    },
                ],
                multiple_answers: false,
            },
        }
    }

    fn definition(questions: Vec<Question>) -> AssessmentDefinition {
        AssessmentDefinition {
            id: "exam-1".into(),
            title: "Exam One".into(),
            description: String::new(),
            questions,
            pools: vec![],
            timing: TimingConfig::default(),
            navigation: NavigationConfig::default(),
            grading: GradingConfig::default(),
            adaptive: AdaptiveConfig::default(),
            availability: AvailabilityWindow::default(),
            participants: ParticipantConfig::default(),
            max_attempts: None,
            status: DefinitionStatus::Published,
            version: 1,
        }
    }

    #[test]
    fn total_points_sums_questions_and_pools_once() {
        let mut def = definition(vec![mc("q1", 10.0), tf("q2", 5.0)]);
        def.pools.push(QuestionPool {
            name: "pool-a".into(),
            candidates: vec![tf("p1", 2.0), tf("p2", 2.0), tf("p3", 2.0)],
            select_count: 2,
            randomize: true,
        });
        // 10 + 5 + 2x2, not 2x3
        assert_eq!(def.total_points(), 19.0);
    }

    #[test]
    fn generated_set_points_match_total_points() {
        let mut def = definition(vec![mc("q1", 10.0)]);
        def.pools.push(QuestionPool {
            name: "pool-a".into(),
            candidates: vec![tf("p1", 3.0), tf("p2", 3.0), tf("p3", 3.0), tf("p4", 3.0)],
            select_count: 2,
            randomize: true,
        });
        let mut rng = StdRng::seed_from_u64(7);
        let set = def.generate_question_set(&mut rng);
        assert_eq!(set.len(), 3);
        let sum: f64 = set.iter().map(|q| q.points).sum();
        assert_eq!(sum, def.total_points());
    }

    #[test]
    fn non_randomized_pool_takes_authored_order() {
        let mut def = definition(vec![]);
        def.pools.push(QuestionPool {
            name: "pool-a".into(),
            candidates: vec![tf("p1", 1.0), tf("p2", 1.0), tf("p3", 1.0)],
            select_count: 2,
            randomize: false,
        });
        let mut rng = StdRng::seed_from_u64(1);
        let set = def.generate_question_set(&mut rng);
        let ids: Vec<&str> = set.iter().map(|q| q.id.as_str()).collect();
        assert_eq!(ids, vec!["p1", "p2"]);
    }

    #[test]
    fn validate_reports_every_violation() {
        let mut def = definition(vec![mc("q1", 10.0), mc("q1", -1.0)]);
        def.pools.push(QuestionPool {
            name: "bad".into(),
            candidates: vec![tf("p1", 1.0), tf("p2", 2.0)],
            select_count: 5,
            randomize: false,
        });
        let issues = def.validate();
        let messages: Vec<&str> = issues.iter().map(|i| i.message.as_str()).collect();
        assert!(messages.iter().any(|m| m.contains("duplicate question id")));
        assert!(messages.iter().any(|m| m.contains("non-negative")));
        assert!(messages.iter().any(|m| m.contains("selects 5 of 2")));
        assert!(messages.iter().any(|m| m.contains("mixes point values")));
    }

    #[test]
    fn publish_refuses_invalid_definition() {
        let mut def = definition(vec![]);
        def.status = DefinitionStatus::Draft;
        match def.publish() {
            Err(EngineError::Validation(issues)) => assert!(!issues.is_empty()),
            other => panic!("expected validation error, got {other:?}"),
        }
        assert_eq!(def.status, DefinitionStatus::Draft);
    }

    #[test]
    fn eligibility_window_and_status() {
        let now = Utc::now();
        let mut def = definition(vec![tf("q1", 1.0)]);

        def.status = DefinitionStatus::Draft;
        assert_eq!(
            def.check_eligibility("u1", now),
            Eligibility::Ineligible(IneligibilityReason::NotAvailable)
        );

        def.status = DefinitionStatus::Published;
        def.availability.from = Some(now + chrono::Duration::hours(1));
        assert_eq!(
            def.check_eligibility("u1", now),
            Eligibility::Ineligible(IneligibilityReason::NotYetAvailable)
        );

        def.availability.from = Some(now - chrono::Duration::hours(2));
        def.availability.until = Some(now - chrono::Duration::hours(1));
        assert_eq!(
            def.check_eligibility("u1", now),
            Eligibility::Ineligible(IneligibilityReason::DeadlinePassed)
        );
    }

    #[test]
    fn eligibility_participant_lists() {
        let now = Utc::now();
        let mut def = definition(vec![tf("q1", 1.0)]);
        def.participants.mode = ParticipantMode::Specific;
        def.participants.allowed = vec!["alice".into()];
        def.participants.excluded = vec!["mallory".into()];

        assert!(def.check_eligibility("alice", now).is_eligible());
        assert_eq!(
            def.check_eligibility("bob", now),
            Eligibility::Ineligible(IneligibilityReason::NotAuthorized)
        );
        assert_eq!(
            def.check_eligibility("mallory", now),
            Eligibility::Ineligible(IneligibilityReason::NotAuthorized)
        );
    }

    #[test]
    fn revision_bumps_version_and_resets_to_draft() {
        let def = definition(vec![tf("q1", 1.0)]);
        let next = def.new_revision();
        assert_eq!(next.version, 2);
        assert_eq!(next.status, DefinitionStatus::Draft);
        assert_eq!(def.version, 1);
    }

    #[test]
    fn export_import_roundtrip_preserves_scoring() {
        let mut def = definition(vec![mc("q1", 10.0), tf("q2", 5.0)]);
        def.grading.passing_score = 75.0;
        let payload = def.export().unwrap();
        let back = AssessmentDefinition::import(&payload).unwrap();
        assert_eq!(back.questions.len(), 2);
        assert_eq!(back.grading.passing_score, 75.0);
        assert_eq!(back.total_points(), def.total_points());
    }

    #[test]
    fn letter_grade_bands() {
        let grading = GradingConfig::default();
        assert_eq!(grading.letter_grade(95.0), "A");
        assert_eq!(grading.letter_grade(80.0), "B");
        assert_eq!(grading.letter_grade(0.0), "F");
        // Gap values fall back to the lowest band.
        assert_eq!(grading.letter_grade(89.5), "F");
    }
}
