//! Oracle-driven player for a turn-based property-trading board game.
//!
//! The player exchanges state snapshots and action proposals with an external
//! decision oracle and applies the chosen actions to a board engine. The layers:
//!
//! - **[`core`]**: Pure, deterministic logic: engine state model, legal-action
//!   resolution, snapshots, history and the action catalogue. No I/O.
//! - **[`engine`]**: The collaborator trait the core mutates state through, plus a
//!   reference table engine for whole games.
//! - **[`io`]**: Side-effecting operations (prompts, oracle transports, config, logs).
//!   Isolated to enable scripted oracles in tests.
//!
//! [`dispatch`], [`orchestrator`] and [`session`] coordinate core logic with I/O to
//! play turns and games.

pub mod core;
pub mod dispatch;
pub mod engine;
pub mod exit_codes;
pub mod io;
pub mod logging;
pub mod orchestrator;
pub mod session;
#[cfg(any(test, feature = "test-support"))]
pub mod test_support;
