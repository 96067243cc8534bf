//! The assessment service: definitions registry, session operations, and the
//! expiry sweep.
//!
//! Every session mutation runs under that session's async lock, loads the
//! session, applies the state-machine transition, and saves with optimistic
//! versioning. Time-limit expiry is checked before each mutation, so an
//! expired session is auto-submitted on first touch even between sweeps.

use std::collections::HashMap;
use std::sync::{Arc, Mutex, PoisonError, RwLock};

use chrono::{DateTime, Utc};
use uuid::Uuid;

use examkit_core::answer::{Answer, AnswerPayload};
use examkit_core::definition::AssessmentDefinition;
use examkit_core::error::{EngineError, Result};
use examkit_core::factory;
use examkit_core::integrity::SecurityEvent;
use examkit_core::question::QuestionKind;
use examkit_core::report::SessionReport;
use examkit_core::scoring::score_session;
use examkit_core::session::{Session, SubmissionMethod};

use crate::executor::CodeExecutor;
use crate::store::SessionStore;

/// Transport-agnostic facade over the session state machine.
pub struct AssessmentService {
    definitions: RwLock<HashMap<String, AssessmentDefinition>>,
    store: Arc<dyn SessionStore>,
    executor: Arc<dyn CodeExecutor>,
    /// Per-session mutual exclusion for mutating operations.
    locks: Mutex<HashMap<Uuid, Arc<tokio::sync::Mutex<()>>>>,
    /// How often each question has been served, updated off the request path.
    usage: Arc<Mutex<HashMap<String, u64>>>,
}

impl AssessmentService {
    pub fn new(store: Arc<dyn SessionStore>, executor: Arc<dyn CodeExecutor>) -> Self {
        Self {
            definitions: RwLock::new(HashMap::new()),
            store,
            executor,
            locks: Mutex::new(HashMap::new()),
            usage: Arc::new(Mutex::new(HashMap::new())),
        }
    }

    /// Register a definition, refusing malformed ones outright. Eligibility
    /// (published, window, participants) is enforced at session creation.
    pub fn register_definition(&self, definition: AssessmentDefinition) -> Result<()> {
        let issues = definition.validate();
        if !issues.is_empty() {
            return Err(EngineError::Validation(issues));
        }
        tracing::info!(definition = %definition.id, version = definition.version, "definition registered");
        self.definitions_mut().insert(definition.id.clone(), definition);
        Ok(())
    }

    pub fn definition(&self, id: &str) -> Result<AssessmentDefinition> {
        self.definitions_read()
            .get(id)
            .cloned()
            .ok_or_else(|| EngineError::NotFound(format!("definition '{id}'")))
    }

    /// Create a session for `user_id`. Refuses when the user is ineligible,
    /// already has a live session, or has exhausted the attempt limit.
    pub async fn create_session(&self, definition_id: &str, user_id: &str) -> Result<Session> {
        let definition = self.definition(definition_id)?;

        if let Some(existing) = self.store.find_active_for(definition_id, user_id).await? {
            return Err(EngineError::Conflict(format!(
                "user '{user_id}' already has an active session {} for '{definition_id}'",
                existing.id
            )));
        }
        let prior_attempts = self.store.count_attempts(definition_id, user_id).await?;

        let session = {
            let mut rng = rand::thread_rng();
            factory::create_session(&definition, user_id, prior_attempts, Utc::now(), &mut rng)?
        };
        self.store.save(session.clone(), 0).await?;
        self.record_usage(&session);
        Ok(session)
    }

    /// Times the question has been served across all sessions. Best-effort;
    /// recent creations may not be counted yet.
    pub fn question_usage(&self, question_id: &str) -> u64 {
        self.usage
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .get(question_id)
            .copied()
            .unwrap_or(0)
    }

    /// Bump serve counters off the request path; creation never waits on
    /// bookkeeping.
    fn record_usage(&self, session: &Session) {
        let usage = Arc::clone(&self.usage);
        let ids: Vec<String> = session.questions.iter().map(|q| q.id.clone()).collect();
        tokio::spawn(async move {
            let mut usage = usage.lock().unwrap_or_else(PoisonError::into_inner);
            for id in ids {
                *usage.entry(id).or_insert(0) += 1;
            }
        });
    }

    pub async fn start_session(&self, id: Uuid) -> Result<Session> {
        let lock = self.lock_for(id);
        let _guard = lock.lock().await;

        let (mut session, version) = self.load_session(id).await?;
        session.start(Utc::now())?;
        self.store.save(session.clone(), version).await?;
        Ok(session)
    }

    pub async fn pause_session(&self, id: Uuid) -> Result<Session> {
        let lock = self.lock_for(id);
        let _guard = lock.lock().await;

        let (mut session, mut version) = self.load_session(id).await?;
        let now = Utc::now();
        self.settle_if_expired(&mut session, &mut version, now).await?;
        session.pause(now)?;
        self.store.save(session.clone(), version).await?;
        Ok(session)
    }

    pub async fn resume_session(&self, id: Uuid) -> Result<Session> {
        let lock = self.lock_for(id);
        let _guard = lock.lock().await;

        let (mut session, mut version) = self.load_session(id).await?;
        let now = Utc::now();
        self.settle_if_expired(&mut session, &mut version, now).await?;
        session.resume(now)?;
        self.store.save(session.clone(), version).await?;
        Ok(session)
    }

    /// Upsert an answer. Safe to retry: a duplicate submission replaces the
    /// stored answer and bumps its attempt count.
    pub async fn submit_answer(&self, id: Uuid, answer: Answer) -> Result<Session> {
        let lock = self.lock_for(id);
        let _guard = lock.lock().await;

        let (mut session, mut version) = self.load_session(id).await?;
        let now = Utc::now();
        self.settle_if_expired(&mut session, &mut version, now).await?;
        session.submit_answer(answer, now)?;
        self.store.save(session.clone(), version).await?;
        Ok(session)
    }

    /// Move the session to another question. `Ok(false)` when backward
    /// navigation is disallowed; the session is unchanged in that case.
    pub async fn navigate_to_question(&self, id: Uuid, question_id: &str) -> Result<bool> {
        let lock = self.lock_for(id);
        let _guard = lock.lock().await;

        let (mut session, mut version) = self.load_session(id).await?;
        let now = Utc::now();
        self.settle_if_expired(&mut session, &mut version, now).await?;
        let moved = session.navigate_to(question_id, now)?;
        if moved {
            self.store.save(session, version).await?;
        }
        Ok(moved)
    }

    pub async fn mark_for_review(&self, id: Uuid, question_id: &str) -> Result<Session> {
        let lock = self.lock_for(id);
        let _guard = lock.lock().await;

        let (mut session, mut version) = self.load_session(id).await?;
        let now = Utc::now();
        self.settle_if_expired(&mut session, &mut version, now).await?;
        session.mark_for_review(question_id, now)?;
        self.store.save(session.clone(), version).await?;
        Ok(session)
    }

    /// Submit and grade the session. A submission that arrives after the
    /// clock ran out is recorded as an auto submission.
    pub async fn submit_session(&self, id: Uuid) -> Result<Session> {
        let lock = self.lock_for(id);
        let _guard = lock.lock().await;

        let (mut session, version) = self.load_session(id).await?;
        let now = Utc::now();
        let method = if session.is_expired(now) {
            SubmissionMethod::Auto
        } else {
            SubmissionMethod::Manual
        };
        self.finalize(&mut session, now, method).await?;
        self.store.save(session.clone(), version).await?;
        Ok(session)
    }

    pub async fn get_session(&self, id: Uuid) -> Result<Session> {
        Ok(self.load_session(id).await?.0)
    }

    pub async fn get_session_report(&self, id: Uuid) -> Result<SessionReport> {
        let (session, _) = self.load_session(id).await?;
        Ok(SessionReport::from_session(&session))
    }

    /// Record a proctoring event against a session. Accepted until the
    /// session settles.
    pub async fn add_security_event(&self, id: Uuid, event: SecurityEvent) -> Result<Session> {
        let lock = self.lock_for(id);
        let _guard = lock.lock().await;

        let (mut session, version) = self.load_session(id).await?;
        session.add_security_event(event)?;
        self.store.save(session.clone(), version).await?;
        Ok(session)
    }

    /// Proctor-driven hard stop. The session is never graded.
    pub async fn terminate_session(&self, id: Uuid) -> Result<Session> {
        let lock = self.lock_for(id);
        let _guard = lock.lock().await;

        let (mut session, version) = self.load_session(id).await?;
        session.terminate(Utc::now())?;
        self.store.save(session.clone(), version).await?;
        Ok(session)
    }

    /// One sweep pass: auto-submit sessions whose clock ran out, and time
    /// out live sessions whose definition deadline passed. Returns how many
    /// sessions were settled.
    pub async fn sweep_expired(&self, now: DateTime<Utc>) -> Result<usize> {
        let active = self.store.list_active().await?;
        let passes = futures::future::join_all(
            active.into_iter().map(|s| self.sweep_one(s.id, now)),
        )
        .await;

        let mut settled = 0;
        for result in passes {
            match result {
                Ok(true) => settled += 1,
                Ok(false) => {}
                Err(e) => tracing::warn!(error = %e, "sweep pass failed for a session"),
            }
        }
        if settled > 0 {
            tracing::info!(settled, "expiry sweep settled sessions");
        }
        Ok(settled)
    }

    /// Let the store drop settled sessions past its retention window, and
    /// drop lock entries no task holds so the lock map does not grow for the
    /// process lifetime.
    pub async fn evict_settled(&self) -> Result<usize> {
        let evicted = self.store.evict_settled().await?;
        self.prune_locks();
        Ok(evicted)
    }

    async fn sweep_one(&self, id: Uuid, now: DateTime<Utc>) -> Result<bool> {
        let lock = self.lock_for(id);
        let _guard = lock.lock().await;

        // Re-load under the lock; the session may have settled since listing.
        let Some((mut session, version)) = self.store.load(id).await? else {
            return Ok(false);
        };
        if session.is_expired(now) {
            self.finalize(&mut session, now, SubmissionMethod::Auto).await?;
        } else if session.status.is_live() && self.deadline_passed(&session, now) {
            session.time_out(now)?;
        } else {
            return Ok(false);
        }
        self.store.save(session, version).await?;
        Ok(true)
    }

    /// Submit, execute pending code answers, score, and settle.
    async fn finalize(
        &self,
        session: &mut Session,
        now: DateTime<Utc>,
        method: SubmissionMethod,
    ) -> Result<()> {
        session.submit(now, method)?;
        self.execute_code_answers(session).await;
        let score = score_session(
            &session.questions,
            &session.answers,
            &session.config.grading,
            now,
        );
        session.apply_score(score)?;
        Ok(())
    }

    /// Run the executor for every code answer that has no verdict yet. An
    /// executor failure leaves the answer verdict-less, which routes the
    /// question to manual review instead of failing the submission.
    async fn execute_code_answers(&self, session: &mut Session) {
        for i in 0..session.answers.len() {
            let (source, language, test_cases) = {
                let answer = &session.answers[i];
                let Some(AnswerPayload::Code {
                    source,
                    results: None,
                }) = &answer.payload
                else {
                    continue;
                };
                let Some(QuestionKind::Code {
                    language,
                    test_cases,
                    ..
                }) = session
                    .questions
                    .iter()
                    .find(|q| q.id == answer.question_id)
                    .map(|q| &q.kind)
                else {
                    continue;
                };
                (source.clone(), language.clone(), test_cases.clone())
            };

            match self.executor.execute(&language, &source, &test_cases).await {
                Ok(verdicts) => {
                    if let Some(AnswerPayload::Code { results, .. }) =
                        &mut session.answers[i].payload
                    {
                        *results = Some(verdicts);
                    }
                }
                Err(e) => {
                    tracing::warn!(
                        session = %session.id,
                        question = %session.answers[i].question_id,
                        error = %e,
                        "code execution failed; answer goes to manual review"
                    );
                }
            }
        }
    }

    fn deadline_passed(&self, session: &Session, now: DateTime<Utc>) -> bool {
        self.definitions_read()
            .get(&session.definition_id)
            .and_then(|d| d.availability.until)
            .is_some_and(|until| now > until)
    }

    /// Auto-submit an expired session before a mutation. The caller's
    /// follow-up transition then fails with the settled state, which is the
    /// answer the client should see.
    async fn settle_if_expired(
        &self,
        session: &mut Session,
        version: &mut u64,
        now: DateTime<Utc>,
    ) -> Result<()> {
        if session.is_expired(now) {
            self.finalize(session, now, SubmissionMethod::Auto).await?;
            *version = self.store.save(session.clone(), *version).await?;
        }
        Ok(())
    }

    async fn load_session(&self, id: Uuid) -> Result<(Session, u64)> {
        self.store
            .load(id)
            .await?
            .ok_or_else(|| EngineError::NotFound(format!("session {id}")))
    }

    fn lock_for(&self, id: Uuid) -> Arc<tokio::sync::Mutex<()>> {
        self.locks
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .entry(id)
            .or_default()
            .clone()
    }

    /// Retain only lock entries some task still holds. Safe against
    /// [`AssessmentService::lock_for`] because both run under the map mutex;
    /// a pruned entry is simply recreated on the session's next use.
    fn prune_locks(&self) {
        self.locks
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .retain(|_, lock| Arc::strong_count(lock) > 1);
    }

    fn definitions_read(
        &self,
    ) -> std::sync::RwLockReadGuard<'_, HashMap<String, AssessmentDefinition>> {
        self.definitions.read().unwrap_or_else(PoisonError::into_inner)
    }

    fn definitions_mut(
        &self,
    ) -> std::sync::RwLockWriteGuard<'_, HashMap<String, AssessmentDefinition>> {
        self.definitions.write().unwrap_or_else(PoisonError::into_inner)
    }
}
