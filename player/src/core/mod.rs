//! Deterministic, pure logic of the turn orchestration layer.
//!
//! Core modules are free of I/O side effects. They read an explicit
//! [`board::EngineState`] and return deterministic values suitable for tests.

pub mod board;
pub mod catalogue;
pub mod history;
pub mod legal;
pub mod snapshot;
pub mod types;
