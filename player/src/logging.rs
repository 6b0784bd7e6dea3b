//! Diagnostic tracing on stderr.
//!
//! Tracing is for watching a game as it runs and is filtered by `RUST_LOG`. The
//! per-turn JSON written by [`crate::io::turn_log`] is the durable record and does
//! not depend on it.

use tracing_subscriber::{EnvFilter, fmt, layer::SubscriberExt, util::SubscriberInitExt};

/// Filter used when `RUST_LOG` is unset: only warnings, which is where fallbacks and
/// oracle failures are reported.
pub const DEFAULT_FILTER: &str = "warn";

/// Install the global subscriber: `RUST_LOG` or [`DEFAULT_FILTER`], compact lines on stderr.
///
/// ```bash
/// RUST_LOG=player::orchestrator=debug player play --turns 4
/// ```
pub fn init() {
    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(DEFAULT_FILTER));

    tracing_subscriber::registry()
        .with(filter)
        .with(
            fmt::layer()
                .with_writer(std::io::stderr)
                .with_target(false)
                .compact(),
        )
        .init();
}
