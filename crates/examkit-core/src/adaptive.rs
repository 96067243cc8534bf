//! Simplified adaptive question selection.
//!
//! This is deliberately NOT computerized-adaptive testing: there is no
//! ability re-estimation between items and no IRT model. Selection takes the
//! configured initial-difficulty bucket and randomly samples
//! `min(min_questions, available)` questions from it. Kept simple on
//! purpose; a real CAT implementation would need calibrated item parameters
//! that do not exist here.

use rand::seq::SliceRandom;
use rand::Rng;
use serde::{Deserialize, Serialize};

use crate::definition::AdaptiveConfig;
use crate::question::{Difficulty, Question};

/// Per-session adaptive bookkeeping, snapshotted onto the session.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AdaptiveState {
    pub initial_difficulty: Difficulty,
    /// Question ids served to this session, in order.
    pub served: Vec<String>,
}

/// Sample the session's question set from the initial-difficulty bucket.
pub fn select_questions<R: Rng + ?Sized>(
    bank: &[Question],
    config: &AdaptiveConfig,
    rng: &mut R,
) -> Vec<Question> {
    let bucket: Vec<&Question> = bank
        .iter()
        .filter(|q| q.difficulty == config.initial_difficulty)
        .collect();
    let count = config.min_questions.min(bucket.len());
    if count < config.min_questions {
        tracing::warn!(
            bucket = %config.initial_difficulty,
            available = bucket.len(),
            wanted = config.min_questions,
            "adaptive bucket smaller than min_questions"
        );
    }
    bucket
        .choose_multiple(rng, count)
        .map(|q| (*q).clone())
        .collect()
}
