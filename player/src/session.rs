//! Whole-game driver for `player play`.
//!
//! One orchestrator serves every seat; [`SeatOracles`] routes each decision request
//! to the oracle of the acting seat, so auction bids and trade answers reach the
//! right player while history stays shared.

use std::time::Instant;

use anyhow::Result;
use chrono::{SecondsFormat, Utc};
use tracing::{info, instrument, warn};

use crate::core::board::EngineState;
use crate::engine::Engine;
use crate::io::oracle::{DecisionError, Oracle, OracleReply, OracleRequest};
use crate::orchestrator::{TurnEnd, TurnOrchestrator, TurnReport};

/// Turn runs allowed between two passed turns (auction and trade hand-offs included).
pub const MAX_RUNS_PER_TURN: u32 = 64;

/// Per-seat oracles, indexed by seat.
pub struct SeatOracles {
    seats: Vec<Box<dyn Oracle>>,
}

impl SeatOracles {
    pub fn new(seats: Vec<Box<dyn Oracle>>) -> Self {
        Self { seats }
    }

    pub fn len(&self) -> usize {
        self.seats.len()
    }

    pub fn is_empty(&self) -> bool {
        self.seats.is_empty()
    }
}

impl Oracle for SeatOracles {
    fn decide(&self, request: &OracleRequest) -> Result<OracleReply, DecisionError> {
        let oracle = self.seats.get(request.acting).ok_or_else(|| {
            DecisionError::Transport(format!("no oracle seated at {}", request.acting))
        })?;
        oracle.decide(request)
    }
}

/// Reason why `run_game` stopped.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum GameStop {
    /// `max_turns` turns were completed.
    TurnLimit { turns: u32, max_turns: u32 },
    /// An actor made no progress, or kept the engine busy without passing the turn.
    Stalled { actor: usize, end: TurnEnd },
    /// At most one solvent actor remains.
    LastStanding { winner: Option<usize> },
}

/// Summary of a game run.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct GameOutcome {
    pub turns_played: u32,
    pub runs: u32,
    pub stop: GameStop,
}

/// One `run_turn` call, handed to the observer.
pub struct TurnRun<'a> {
    /// 1-indexed across the game.
    pub index: u32,
    pub report: &'a TurnReport,
    pub state_before: &'a EngineState,
    pub state_after: &'a EngineState,
    pub started_at: String,
    pub ended_at: String,
    pub duration_ms: u64,
}

/// Play until `max_turns` turns pass, the game stalls, or one actor remains.
///
/// `on_run` sees every turn run; its error stops the game.
#[instrument(skip_all, fields(max_turns))]
pub fn run_game<E, O, F>(
    engine: &mut E,
    orchestrator: &mut TurnOrchestrator<O>,
    max_turns: u32,
    mut on_run: F,
) -> Result<GameOutcome>
where
    E: Engine + ?Sized,
    O: Oracle,
    F: FnMut(&TurnRun<'_>) -> Result<()>,
{
    let mut turns_played = 0u32;
    let mut runs = 0u32;
    let mut runs_this_turn = 0u32;

    loop {
        let solvent: Vec<usize> = engine
            .state()
            .actors
            .iter()
            .enumerate()
            .filter(|(_, actor)| !actor.bankrupt)
            .map(|(i, _)| i)
            .collect();
        if solvent.len() <= 1 {
            info!(winner = ?solvent.first(), "one actor left");
            return Ok(GameOutcome {
                turns_played,
                runs,
                stop: GameStop::LastStanding {
                    winner: solvent.first().copied(),
                },
            });
        }

        let state_before = engine.state().clone();
        let started = Instant::now();
        let started_at = now_rfc3339();
        let report = orchestrator.run_turn(engine);
        runs += 1;
        runs_this_turn += 1;

        on_run(&TurnRun {
            index: runs,
            report: &report,
            state_before: &state_before,
            state_after: engine.state(),
            started_at,
            ended_at: now_rfc3339(),
            duration_ms: u64::try_from(started.elapsed().as_millis()).unwrap_or(u64::MAX),
        })?;

        match report.end {
            TurnEnd::Passed => {
                turns_played += 1;
                runs_this_turn = 0;
                info!(turns_played, next = engine.state().turn, "turn passed");
                if turns_played >= max_turns {
                    return Ok(GameOutcome {
                        turns_played,
                        runs,
                        stop: GameStop::TurnLimit {
                            turns: turns_played,
                            max_turns,
                        },
                    });
                }
            }
            TurnEnd::Handoff if runs_this_turn < MAX_RUNS_PER_TURN => {}
            end => {
                warn!(actor = report.actor, ?end, "game stalled");
                return Ok(GameOutcome {
                    turns_played,
                    runs,
                    stop: GameStop::Stalled {
                        actor: report.actor,
                        end,
                    },
                });
            }
        }
    }
}

fn now_rfc3339() -> String {
    Utc::now().to_rfc3339_opts(SecondsFormat::Millis, true)
}
