//! Turn orchestration: the bounded decide/dispatch loop run at each engine
//! callback point.
//!
//! A cycle takes queued actions first and asks the oracle otherwise, dispatches,
//! and keeps going only while the acting actor still owes `roll` or `end-turn`
//! after a continuation-class action. Any decision failure, a follow-up that does
//! not progress the turn (queued or not), or the round limit forces the callback's
//! fallback. On turn callbacks the fallback always carries the turn to `end-turn`.

use std::collections::VecDeque;

use serde::Serialize;
use serde_json::json;
use tracing::{debug, info, instrument, warn};

use crate::core::board::EngineState;
use crate::core::history::TurnHistory;
use crate::core::legal::{TurnPhase, phase, resolve};
use crate::core::snapshot::GameStateSnapshot;
use crate::core::types::{Action, ActionName, ActionOutcome, LegalActionSet};
use crate::dispatch::dispatch;
use crate::engine::Engine;
use crate::io::config::TurnConfig;
use crate::io::oracle::{DecisionClient, Oracle};

/// Fallback dispatches allowed while carrying a turn to `end-turn`.
const MAX_FALLBACK_STEPS: usize = 8;

/// Where the engine hands control to the player.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum CallbackPoint {
    BeforeRoll,
    AfterLanding,
    InJail,
    Auction,
    TradeOffer,
}

impl CallbackPoint {
    /// Callback point implied by the current state.
    pub fn for_state(state: &EngineState) -> Option<Self> {
        let point = match phase(state)? {
            TurnPhase::PreRoll | TurnPhase::MustReroll => CallbackPoint::BeforeRoll,
            TurnPhase::PostRoll => CallbackPoint::AfterLanding,
            TurnPhase::JailPreRoll | TurnPhase::JailPostRoll | TurnPhase::ForcedRelease => {
                CallbackPoint::InJail
            }
            TurnPhase::Auction => CallbackPoint::Auction,
            TurnPhase::TradeOffer => CallbackPoint::TradeOffer,
        };
        Some(point)
    }

    /// Next safe action to dispatch when the cycle cannot continue.
    ///
    /// Turn callbacks end the turn when they can. Before the roll they roll first,
    /// and in forced release, where neither is legal, they pay the fine.
    pub fn fallback(self, legal: &LegalActionSet) -> Action {
        match self {
            CallbackPoint::Auction => Action::new(ActionName::PassBid),
            CallbackPoint::TradeOffer => {
                Action::with_args(ActionName::TradeRespond, json!({ "accept": false }))
            }
            CallbackPoint::BeforeRoll | CallbackPoint::AfterLanding | CallbackPoint::InJail => {
                if legal.contains(ActionName::EndTurn) {
                    Action::end_turn()
                } else if legal.contains(ActionName::Roll) {
                    Action::new(ActionName::Roll)
                } else if legal.contains(ActionName::PayFine) {
                    Action::new(ActionName::PayFine)
                } else {
                    Action::end_turn()
                }
            }
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum DecisionSource {
    Queue,
    Oracle,
}

/// One dispatched decision.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct RoundRecord {
    pub round: u32,
    pub acting: usize,
    pub source: DecisionSource,
    /// Legal set offered for this round.
    pub legal: Vec<ActionName>,
    pub action: Action,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub rationale: Option<String>,
    pub outcome: ActionOutcome,
}

/// Something the observer should know about; each one forced the fallback.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum Notice {
    /// The oracle failed or answered outside the protocol.
    DecisionFailed { round: u32, error: String },
    /// A follow-up answer did not roll or end the turn.
    FollowUpViolation { round: u32, action: ActionName },
    /// The cycle used every allowed round.
    RoundLimit { limit: u32 },
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct FallbackRecord {
    pub action: Action,
    pub outcome: ActionOutcome,
}

/// Observer surface of one callback cycle.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct CycleReport {
    pub point: CallbackPoint,
    pub rounds: Vec<RoundRecord>,
    pub notices: Vec<Notice>,
    /// Fallback dispatches in order; the last one ends the turn unless refused.
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub fallback: Vec<FallbackRecord>,
}

impl CycleReport {
    fn new(point: CallbackPoint) -> Self {
        Self {
            point,
            rounds: Vec::new(),
            notices: Vec::new(),
            fallback: Vec::new(),
        }
    }

    /// True when any round or the fallback changed the engine state.
    pub fn applied_any(&self) -> bool {
        self.rounds.iter().any(|r| r.outcome.applied)
            || self.fallback.iter().any(|f| f.outcome.applied)
    }

    /// Applied actions in dispatch order, fallback included.
    pub fn applied_actions(&self) -> impl Iterator<Item = &Action> {
        self.rounds
            .iter()
            .filter(|r| r.outcome.applied)
            .map(|r| &r.action)
            .chain(
                self.fallback
                    .iter()
                    .filter(|f| f.outcome.applied)
                    .map(|f| &f.action),
            )
    }
}

/// Why `run_turn` returned.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum TurnEnd {
    /// The turn passed to another actor.
    Passed,
    /// The engine now waits on another actor (auction bid or trade answer).
    Handoff,
    /// A cycle applied nothing.
    Stalled,
    /// `max_cycles_per_turn` cycles ran without the turn ending.
    CycleLimit,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct TurnReport {
    /// Actor that was acting when the turn run started.
    pub actor: usize,
    /// Turn actor when the run started.
    pub turn: usize,
    pub cycles: Vec<CycleReport>,
    pub end: TurnEnd,
}

impl TurnReport {
    pub fn actions_applied(&self) -> usize {
        self.cycles.iter().map(|c| c.applied_actions().count()).sum()
    }
}

#[derive(Debug, Clone, PartialEq)]
struct QueuedAction {
    actor: usize,
    action: Action,
}

/// Drives decision/dispatch cycles for whichever actor the engine waits on.
pub struct TurnOrchestrator<O> {
    client: DecisionClient<O>,
    queue: VecDeque<QueuedAction>,
    history: TurnHistory,
    config: TurnConfig,
}

impl<O: Oracle> TurnOrchestrator<O> {
    pub fn new(client: DecisionClient<O>, config: TurnConfig) -> Self {
        Self {
            client,
            queue: VecDeque::new(),
            history: TurnHistory::new(),
            config,
        }
    }

    pub fn history(&self) -> &TurnHistory {
        &self.history
    }

    pub fn client(&self) -> &DecisionClient<O> {
        &self.client
    }

    pub fn queued(&self) -> usize {
        self.queue.len()
    }

    /// Plan an action for `actor`; it runs before any oracle call while that actor acts.
    pub fn enqueue(&mut self, actor: usize, action: Action) {
        self.queue.push_back(QueuedAction { actor, action });
    }

    /// Next queued action for `acting`. Plans made for another actor are stale and dropped.
    fn dequeue_for(&mut self, acting: usize) -> Option<Action> {
        match self.queue.front() {
            Some(front) if front.actor == acting => self.queue.pop_front().map(|q| q.action),
            Some(_) => {
                debug!(dropped = self.queue.len(), "dropping plans queued for another actor");
                self.queue.clear();
                None
            }
            None => None,
        }
    }

    /// Run one bounded cycle at `point`.
    #[instrument(skip_all, fields(point = ?point))]
    pub fn run_cycle<E: Engine + ?Sized>(
        &mut self,
        engine: &mut E,
        point: CallbackPoint,
    ) -> CycleReport {
        let mut report = CycleReport::new(point);
        let limit = self.config.max_rounds_per_cycle;
        let mut follow_up = false;

        for round in 1..=limit {
            let state = engine.state();
            let acting = state.acting_actor();
            let legal = resolve(state);

            let (action, source, rationale) = match self.dequeue_for(acting) {
                Some(action) => (action, DecisionSource::Queue, None),
                None => {
                    let snapshot =
                        GameStateSnapshot::build(state, &self.history, self.config.history_in_prompt);
                    match self.client.request_decision(&snapshot, &legal) {
                        Ok(decision) => {
                            for planned in decision.planned {
                                self.enqueue(acting, planned);
                            }
                            (decision.action, DecisionSource::Oracle, decision.rationale)
                        }
                        Err(err) => {
                            warn!(round, err = %err, "decision failed, falling back");
                            report.notices.push(Notice::DecisionFailed {
                                round,
                                error: err.to_string(),
                            });
                            self.run_fallback(engine, &mut report);
                            return report;
                        }
                    }
                }
            };

            if follow_up && !action.name.is_progression() {
                warn!(round, action = %action.name, "follow-up decision must roll or end the turn");
                report.notices.push(Notice::FollowUpViolation {
                    round,
                    action: action.name,
                });
                self.run_fallback(engine, &mut report);
                return report;
            }

            let outcome = dispatch(&action, engine, &mut self.history);
            let applied = outcome.applied;
            let name = action.name;
            report.rounds.push(RoundRecord {
                round,
                acting,
                source,
                legal: legal.to_vec(),
                action,
                rationale,
                outcome,
            });
            if !applied {
                self.queue.clear();
                return report;
            }
            if !name.may_continue() {
                return report;
            }

            let next = resolve(engine.state());
            if !next.needs_progression() {
                return report;
            }
            debug!(round, legal = %next, "progression still owed, requesting follow-up");
            follow_up = true;
        }

        warn!(limit, "round limit reached, falling back");
        report.notices.push(Notice::RoundLimit { limit });
        self.run_fallback(engine, &mut report);
        report
    }

    /// Dispatch the callback's fallback until it ends the turn or is refused.
    /// Remaining plans are discarded.
    fn run_fallback<E: Engine + ?Sized>(&mut self, engine: &mut E, report: &mut CycleReport) {
        self.queue.clear();
        for _ in 0..MAX_FALLBACK_STEPS {
            let action = report.point.fallback(&resolve(engine.state()));
            let name = action.name;
            let outcome = dispatch(&action, engine, &mut self.history);
            let applied = outcome.applied;
            info!(action = %action, applied, "fallback dispatched");
            report.fallback.push(FallbackRecord { action, outcome });
            // Only rolling and paying the fine lead on to another step.
            if !applied || !matches!(name, ActionName::Roll | ActionName::PayFine) {
                return;
            }
        }
        warn!(steps = MAX_FALLBACK_STEPS, "fallback did not reach the end of the turn");
    }

    /// Drive the acting actor until the turn passes, another actor must answer,
    /// or no progress is made.
    #[instrument(skip_all)]
    pub fn run_turn<E: Engine + ?Sized>(&mut self, engine: &mut E) -> TurnReport {
        let turn = engine.state().turn;
        let actor = engine.state().acting_actor();
        let mut cycles = Vec::new();

        for _ in 0..self.config.max_cycles_per_turn {
            if let Some(end) = turn_boundary(engine.state(), turn, actor) {
                return TurnReport {
                    actor,
                    turn,
                    cycles,
                    end,
                };
            }
            let Some(point) = CallbackPoint::for_state(engine.state()) else {
                warn!("no acting actor, cannot continue the turn");
                return TurnReport {
                    actor,
                    turn,
                    cycles,
                    end: TurnEnd::Stalled,
                };
            };
            let cycle = self.run_cycle(engine, point);
            let progressed = cycle.applied_any();
            cycles.push(cycle);
            if !progressed {
                warn!(actor, "cycle applied nothing, turn stalled");
                return TurnReport {
                    actor,
                    turn,
                    cycles,
                    end: TurnEnd::Stalled,
                };
            }
        }

        let end = turn_boundary(engine.state(), turn, actor).unwrap_or(TurnEnd::CycleLimit);
        TurnReport {
            actor,
            turn,
            cycles,
            end,
        }
    }
}

fn turn_boundary(
    state: &EngineState,
    turn: usize,
    actor: usize,
) -> Option<TurnEnd> {
    if state.turn != turn {
        Some(TurnEnd::Passed)
    } else if state.acting_actor() != actor {
        Some(TurnEnd::Handoff)
    } else {
        None
    }
}
