//! Stable exit codes for player CLI commands.

/// Command succeeded, or the game ended with one actor left.
pub const OK: i32 = 0;
/// Command failed due to invalid config, state, oracle setup or other errors.
pub const INVALID: i32 = 1;
/// `player play` stopped because a turn made no progress.
pub const STALLED: i32 = 2;
/// `player play` completed the configured number of turns.
pub const TURN_LIMIT: i32 = 3;
