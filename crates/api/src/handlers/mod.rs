//! Request handlers.
//!
//! Handlers delegate to the orchestrator or the query service held in
//! [`AppState`](crate::state::AppState) and map failures via
//! [`AppError`](crate::error::AppError).

pub mod analysis;
pub mod artifacts;
