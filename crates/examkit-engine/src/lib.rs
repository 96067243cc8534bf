//! examkit-engine — Async session orchestration.
//!
//! Wraps the pure state machine from `examkit-core` with a pluggable session
//! store, per-session locking, code execution, and a background sweep that
//! auto-submits expired attempts.

pub mod executor;
pub mod service;
pub mod store;
pub mod sweep;

pub use executor::{CodeExecutor, MockExecutor};
pub use service::AssessmentService;
pub use store::{InMemorySessionStore, SessionStore};
pub use sweep::TimeoutSweeper;
