//! examkit-core — Assessment data model, session state machine, and scoring.
//!
//! This crate defines the fundamental types and algorithms the examkit
//! system builds on: question and answer variants, assessment definitions,
//! the timed session lifecycle, per-type scoring, adaptive selection, and
//! the integrity score derived from reported security events.

pub mod adaptive;
pub mod answer;
pub mod definition;
pub mod error;
pub mod factory;
pub mod integrity;
pub mod parser;
pub mod question;
pub mod report;
pub mod scoring;
pub mod session;
