//! Job orchestration and artifact resolution for video emotion analysis.
//!
//! Everything here is HTTP-free: the API crate only turns uploads into
//! [`orchestrator::JobOrchestrator::submit`] calls and [`outcome::JobOutcome`]s
//! into responses.

pub mod artifacts;
pub mod derived;
pub mod error;
pub mod media;
pub mod orchestrator;
pub mod outcome;
pub mod query;
pub mod runner;
pub mod scope;
pub mod types;
