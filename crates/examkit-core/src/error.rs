//! Error taxonomy for the assessment engine.
//!
//! Typed errors so callers can branch on the failure class without string
//! matching. Manual review is an outcome flag on scores and sessions, never
//! an error.

use std::fmt;

use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::definition::IneligibilityReason;
use crate::session::SessionStatus;

/// A single definition or question validation violation.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ValidationIssue {
    /// The offending question, if the issue is question-scoped.
    pub question_id: Option<String>,
    /// Human-readable description of the violation.
    pub message: String,
}

impl ValidationIssue {
    pub fn definition(message: impl Into<String>) -> Self {
        Self {
            question_id: None,
            message: message.into(),
        }
    }

    pub fn question(question_id: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            question_id: Some(question_id.into()),
            message: message.into(),
        }
    }
}

impl fmt::Display for ValidationIssue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.question_id {
            Some(id) => write!(f, "question '{id}': {}", self.message),
            None => write!(f, "{}", self.message),
        }
    }
}

/// Errors produced by engine operations.
#[derive(Debug, Error)]
pub enum EngineError {
    /// The definition or a question in it is malformed. Carries every
    /// violation found, not just the first.
    #[error("definition failed validation with {} issue(s)", .0.len())]
    Validation(Vec<ValidationIssue>),

    /// The user may not take this assessment.
    #[error("not eligible: {reason}")]
    Eligibility { reason: IneligibilityReason },

    /// Duplicate active session, exhausted attempts, or a concurrent write
    /// lost the optimistic version race.
    #[error("conflict: {0}")]
    Conflict(String),

    /// Missing session, question, or definition.
    #[error("not found: {0}")]
    NotFound(String),

    /// The operation is invalid for the session's current lifecycle state.
    #[error("cannot {operation} a session in state {status}")]
    State {
        operation: &'static str,
        status: SessionStatus,
    },

    /// Transient persistence failure; idempotent operations are safe to retry.
    #[error("store error: {0}")]
    Store(String),
}

impl EngineError {
    /// Returns `true` if the caller should retry the operation.
    pub fn is_transient(&self) -> bool {
        matches!(self, EngineError::Store(_))
    }

    pub fn state(operation: &'static str, status: SessionStatus) -> Self {
        EngineError::State { operation, status }
    }
}

/// Convenience alias used throughout the engine.
pub type Result<T> = std::result::Result<T, EngineError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn validation_issue_display() {
        let issue = ValidationIssue::question("q1", "needs at least 2 options");
        assert_eq!(issue.to_string(), "question 'q1': needs at least 2 options");

        let issue = ValidationIssue::definition("no questions");
        assert_eq!(issue.to_string(), "no questions");
    }

    #[test]
    fn only_store_errors_are_transient() {
        assert!(EngineError::Store("connection reset".into()).is_transient());
        assert!(!EngineError::NotFound("session".into()).is_transient());
        assert!(!EngineError::Conflict("version mismatch".into()).is_transient());
    }

    #[test]
    fn state_error_names_operation_and_status() {
        let err = EngineError::state("submit an answer to", SessionStatus::Graded);
        assert_eq!(
            err.to_string(),
            "cannot submit an answer to a session in state graded"
        );
    }
}
