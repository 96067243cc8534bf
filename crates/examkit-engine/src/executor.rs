//! Code execution seam.
//!
//! Submitted code runs somewhere external (a sandbox, a judge service); the
//! engine only needs per-test-case verdicts. [`MockExecutor`] stands in for
//! that backend under test.

use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::Mutex;

use async_trait::async_trait;

use examkit_core::answer::TestCaseResult;
use examkit_core::question::CodeTestCase;

/// Runs submitted code against a question's test cases.
#[async_trait]
pub trait CodeExecutor: Send + Sync {
    fn name(&self) -> &str;

    /// Execute `source` against `test_cases`, returning one verdict per case
    /// in case order.
    async fn execute(
        &self,
        language: &str,
        source: &str,
        test_cases: &[CodeTestCase],
    ) -> anyhow::Result<Vec<TestCaseResult>>;
}

/// A mock executor for testing the engine without a sandbox.
///
/// Returns configurable verdicts, cycling when there are more test cases
/// than configured verdicts. An empty verdict list fails every case.
pub struct MockExecutor {
    verdicts: Vec<bool>,
    /// Number of calls made.
    call_count: AtomicU32,
    /// Last source received.
    last_source: Mutex<Option<String>>,
    fail: bool,
}

impl MockExecutor {
    /// Create a mock with explicit per-case verdicts.
    pub fn with_verdicts(verdicts: Vec<bool>) -> Self {
        Self {
            verdicts,
            call_count: AtomicU32::new(0),
            last_source: Mutex::new(None),
            fail: false,
        }
    }

    /// Create a mock where every test case passes.
    pub fn passing() -> Self {
        Self::with_verdicts(vec![true])
    }

    /// Create a mock where every test case fails.
    pub fn failing() -> Self {
        Self::with_verdicts(vec![false])
    }

    /// Create a mock whose `execute` itself errors, simulating a sandbox
    /// outage.
    pub fn erroring() -> Self {
        Self {
            verdicts: vec![],
            call_count: AtomicU32::new(0),
            last_source: Mutex::new(None),
            fail: true,
        }
    }

    /// Get the number of calls made to this executor.
    pub fn call_count(&self) -> u32 {
        self.call_count.load(Ordering::Relaxed)
    }

    /// Get the last source submitted to this executor.
    pub fn last_source(&self) -> Option<String> {
        self.last_source
            .lock()
            .unwrap_or_else(std::sync::PoisonError::into_inner)
            .clone()
    }
}

#[async_trait]
impl CodeExecutor for MockExecutor {
    fn name(&self) -> &str {
        "mock"
    }

    async fn execute(
        &self,
        _language: &str,
        source: &str,
        test_cases: &[CodeTestCase],
    ) -> anyhow::Result<Vec<TestCaseResult>> {
        self.call_count.fetch_add(1, Ordering::Relaxed);
        *self
            .last_source
            .lock()
            .unwrap_or_else(std::sync::PoisonError::into_inner) = Some(source.to_string());

        if self.fail {
            anyhow::bail!("sandbox unavailable");
        }

        Ok(test_cases
            .iter()
            .enumerate()
            .map(|(index, _)| TestCaseResult {
                index,
                passed: !self.verdicts.is_empty()
                    && self.verdicts[index % self.verdicts.len()],
                duration_ms: 1,
                output: None,
            })
            .collect())
    }
}
