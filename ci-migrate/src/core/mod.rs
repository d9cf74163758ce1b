//! Deterministic, pure logic behind `detect` and `update`.
//!
//! Core modules must be free of I/O side effects. They operate on in-memory
//! snapshots of repository state and return deterministic outputs suitable for
//! tests.

pub mod assess;
pub mod reconcile;
pub mod travis;
pub mod types;
pub mod workflow;
