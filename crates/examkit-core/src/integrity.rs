//! Session integrity tracking.
//!
//! Proctoring and behavioral subsystems report `SecurityEvent`s; this module
//! only consumes their severities. Each event deducts from a 0-100 score.
//! Dropping below 70 flags the session for review (sticky). Violations are a
//! stricter, separate check used to gate result release: any critical event,
//! or a score below 50.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Severity reported by the proctoring side.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Severity {
    Low,
    Medium,
    High,
    Critical,
}

impl Severity {
    /// Integrity-score deduction for one event of this severity.
    pub fn deduction(&self) -> u32 {
        match self {
            Severity::Low => 1,
            Severity::Medium => 5,
            Severity::High => 15,
            Severity::Critical => 30,
        }
    }
}

/// One externally reported security event. Append-only; never removed from a
/// session.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SecurityEvent {
    pub timestamp: DateTime<Utc>,
    /// Free-form event type, e.g. "tab_switch" or "face_not_visible".
    pub event_type: String,
    pub severity: Severity,
    #[serde(default)]
    pub details: Option<String>,
}

/// Score threshold below which the session is flagged for review.
pub const REVIEW_THRESHOLD: u32 = 70;
/// Score threshold below which the session has violations.
pub const VIOLATION_THRESHOLD: u32 = 50;

/// Running integrity state for one session.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct IntegrityTracker {
    score: u32,
    flagged_for_review: bool,
    events: Vec<SecurityEvent>,
}

impl Default for IntegrityTracker {
    fn default() -> Self {
        Self::new()
    }
}

impl IntegrityTracker {
    pub fn new() -> Self {
        Self {
            score: 100,
            flagged_for_review: false,
            events: Vec::new(),
        }
    }

    /// Ingest one event: append it, apply the deduction (floored at 0), and
    /// flag for review once the score drops below [`REVIEW_THRESHOLD`].
    pub fn record(&mut self, event: SecurityEvent) {
        self.score = self.score.saturating_sub(event.severity.deduction());
        if !self.flagged_for_review && self.score < REVIEW_THRESHOLD {
            self.flagged_for_review = true;
            tracing::warn!(
                score = self.score,
                event_type = %event.event_type,
                "integrity score dropped below review threshold"
            );
        }
        self.events.push(event);
    }

    /// Current score, always in `[0, 100]`.
    pub fn score(&self) -> u32 {
        self.score
    }

    /// Sticky review flag; once set it never auto-clears, even across
    /// [`IntegrityTracker::reset`].
    pub fn flagged_for_review(&self) -> bool {
        self.flagged_for_review
    }

    /// Stricter check gating result release: any critical event, or score
    /// below [`VIOLATION_THRESHOLD`].
    pub fn has_violations(&self) -> bool {
        self.score < VIOLATION_THRESHOLD
            || self
                .events
                .iter()
                .any(|e| e.severity == Severity::Critical)
    }

    pub fn events(&self) -> &[SecurityEvent] {
        &self.events
    }

    /// Explicit administrative reset of the score. The event log and the
    /// review flag survive.
    pub fn reset(&mut self) {
        tracing::info!(previous = self.score, "integrity score reset");
        self.score = 100;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn event(severity: Severity) -> SecurityEvent {
        SecurityEvent {
            timestamp: Utc::now(),
            event_type: "tab_switch".into(),
            severity,
            details: None,
        }
    }

    #[test]
    fn deductions_per_severity() {
        let mut tracker = IntegrityTracker::new();
        tracker.record(event(Severity::Low));
        assert_eq!(tracker.score(), 99);
        tracker.record(event(Severity::Medium));
        assert_eq!(tracker.score(), 94);
        tracker.record(event(Severity::High));
        assert_eq!(tracker.score(), 79);
        assert!(!tracker.flagged_for_review());
    }

    #[test]
    fn three_critical_events_floor_and_flag() {
        let mut tracker = IntegrityTracker::new();

        tracker.record(event(Severity::Critical));
        // 100 - 30 = 70: not strictly below the threshold yet.
        assert_eq!(tracker.score(), 70);
        assert!(!tracker.flagged_for_review());

        tracker.record(event(Severity::Critical));
        assert_eq!(tracker.score(), 40);
        assert!(tracker.flagged_for_review());

        tracker.record(event(Severity::Critical));
        assert_eq!(tracker.score(), 10);
    }

    #[test]
    fn score_floors_at_zero() {
        let mut tracker = IntegrityTracker::new();
        for _ in 0..10 {
            tracker.record(event(Severity::Critical));
        }
        assert_eq!(tracker.score(), 0);
    }

    #[test]
    fn violations_are_stricter_than_review_flag() {
        let mut tracker = IntegrityTracker::new();
        // Four high events: 100 - 60 = 40. Flagged and in violation.
        for _ in 0..4 {
            tracker.record(event(Severity::High));
        }
        assert!(tracker.flagged_for_review());
        assert!(tracker.has_violations());

        // One critical event alone is a violation even at score 70.
        let mut tracker = IntegrityTracker::new();
        tracker.record(event(Severity::Critical));
        assert!(!tracker.flagged_for_review());
        assert!(tracker.has_violations());

        // Two high events: flagged at 70? No: 100 - 30 = 70, not flagged,
        // not in violation.
        let mut tracker = IntegrityTracker::new();
        tracker.record(event(Severity::High));
        tracker.record(event(Severity::High));
        assert_eq!(tracker.score(), 70);
        assert!(!tracker.flagged_for_review());
        assert!(!tracker.has_violations());
    }

    #[test]
    fn reset_restores_score_but_keeps_flag_and_events() {
        let mut tracker = IntegrityTracker::new();
        tracker.record(event(Severity::Critical));
        tracker.record(event(Severity::Critical));
        assert!(tracker.flagged_for_review());

        tracker.reset();
        assert_eq!(tracker.score(), 100);
        assert!(tracker.flagged_for_review());
        assert_eq!(tracker.events().len(), 2);
        // Critical events still count as violations after a reset.
        assert!(tracker.has_violations());
    }
}
