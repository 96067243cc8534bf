//! Background expiry sweep.
//!
//! Clients cannot be trusted to submit when their clock runs out, so the
//! sweeper periodically settles expired sessions server-side and lets the
//! store evict old settled ones.

use std::sync::Arc;
use std::time::Duration;

use chrono::Utc;
use tokio::time::MissedTickBehavior;

use crate::service::AssessmentService;

/// Periodic task that auto-submits expired sessions.
pub struct TimeoutSweeper {
    service: Arc<AssessmentService>,
    interval: Duration,
}

impl TimeoutSweeper {
    pub fn new(service: Arc<AssessmentService>, interval: Duration) -> Self {
        Self { service, interval }
    }

    /// Run the sweep loop on the current task, forever.
    pub async fn run(self) {
        let mut ticker = tokio::time::interval(self.interval);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
        loop {
            ticker.tick().await;
            if let Err(e) = self.service.sweep_expired(Utc::now()).await {
                tracing::warn!(error = %e, "expiry sweep failed");
            }
            if let Err(e) = self.service.evict_settled().await {
                tracing::warn!(error = %e, "store eviction failed");
            }
        }
    }

    /// Spawn the sweep loop as a background task.
    pub fn spawn(self) -> tokio::task::JoinHandle<()> {
        tokio::spawn(self.run())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::executor::MockExecutor;
    use crate::store::InMemorySessionStore;
    use examkit_core::definition::{AssessmentDefinition, DefinitionStatus, TimingConfig};
    use examkit_core::question::{Difficulty, Question, QuestionKind};
    use examkit_core::session::{SessionStatus, SubmissionMethod};

    fn timed_definition(limit_secs: u64) -> AssessmentDefinition {
        let mut def = AssessmentDefinition {
            id: "timed".into(),
            title: "Timed".into(),
            description: String::new(),
            questions: vec![Question {
                id: "q1".into(),
                prompt: "q1".into(),
                points: 5.0,
                difficulty: Difficulty::Medium,
                required: false,
                kind: QuestionKind::TrueFalse { correct: true },
            }],
            pools: vec![],
            timing: TimingConfig {
                time_limit_secs: Some(limit_secs),
            },
            navigation: Default::default(),
            grading: Default::default(),
            adaptive: Default::default(),
            availability: Default::default(),
            participants: Default::default(),
            max_attempts: None,
            status: DefinitionStatus::Draft,
            version: 1,
        };
        def.publish().unwrap();
        def
    }

    #[tokio::test(start_paused = true)]
    async fn sweeper_settles_expired_sessions() {
        let service = Arc::new(AssessmentService::new(
            Arc::new(InMemorySessionStore::new(Duration::from_secs(3600))),
            Arc::new(MockExecutor::passing()),
        ));
        // Zero-second limit: expired the instant it starts.
        service.register_definition(timed_definition(0)).unwrap();
        let session = service.create_session("timed", "alice").await.unwrap();
        service.start_session(session.id).await.unwrap();

        let handle = TimeoutSweeper::new(service.clone(), Duration::from_secs(1)).spawn();
        tokio::time::sleep(Duration::from_secs(2)).await;
        handle.abort();

        let settled = service.get_session(session.id).await.unwrap();
        assert_eq!(settled.status, SessionStatus::Graded);
        assert_eq!(settled.submission_method, Some(SubmissionMethod::Auto));
    }
}
