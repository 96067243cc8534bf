//! Session construction from a published definition.

use chrono::{DateTime, Utc};
use rand::Rng;
use uuid::Uuid;

use crate::adaptive::AdaptiveState;
use crate::definition::{AssessmentDefinition, Eligibility};
use crate::error::{EngineError, Result};
use crate::integrity::IntegrityTracker;
use crate::session::{ConfigSnapshot, Progress, Session, SessionStatus, TimingRecord};

/// Build a new [`Session`] for `user_id`, gated on eligibility and the
/// attempt limit. `prior_attempts` is the caller's count of already-created
/// sessions for this user and definition; uniqueness of the attempt number
/// is the caller's concern (the engine holds a per-session lock around it).
pub fn create_session<R: Rng + ?Sized>(
    definition: &AssessmentDefinition,
    user_id: &str,
    prior_attempts: u32,
    now: DateTime<Utc>,
    rng: &mut R,
) -> Result<Session> {
    match definition.check_eligibility(user_id, now) {
        Eligibility::Eligible => {}
        Eligibility::Ineligible(reason) => {
            return Err(EngineError::Eligibility { reason });
        }
    }

    if let Some(max) = definition.max_attempts {
        if prior_attempts >= max {
            return Err(EngineError::Conflict(format!(
                "user '{user_id}' has used all {max} attempts for '{}'",
                definition.id
            )));
        }
    }

    let questions = definition.generate_question_set(rng);
    let adaptive = definition.adaptive.enabled.then(|| AdaptiveState {
        initial_difficulty: definition.adaptive.initial_difficulty,
        served: questions.iter().map(|q| q.id.clone()).collect(),
    });

    let session = Session {
        id: Uuid::new_v4(),
        definition_id: definition.id.clone(),
        user_id: user_id.to_string(),
        attempt: prior_attempts + 1,
        status: SessionStatus::NotStarted,
        config: ConfigSnapshot {
            timing: definition.timing.clone(),
            navigation: definition.navigation.clone(),
            grading: definition.grading.clone(),
            definition_version: definition.version,
        },
        questions,
        answers: Vec::new(),
        current_index: 0,
        progress: Progress::default(),
        timing: TimingRecord::default(),
        adaptive,
        score: None,
        integrity: IntegrityTracker::new(),
        submission_method: None,
        created_at: now,
    };

    tracing::info!(
        session = %session.id,
        definition = %session.definition_id,
        user = user_id,
        attempt = session.attempt,
        questions = session.questions.len(),
        "session created"
    );
    Ok(session)
}
