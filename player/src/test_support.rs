//! Test-only helpers: deterministic tables, scripted oracles and a recording engine.

use std::cell::RefCell;
use std::collections::VecDeque;

use serde_json::Value;

use crate::core::board::{Actor, EngineState};
use crate::engine::board::standard_squares;
use crate::engine::dice::ScriptedDice;
use crate::engine::table::TableEngine;
use crate::engine::{Engine, Refusal, TradeTerms};
use crate::io::oracle::{DecisionError, Oracle, OracleReply, OracleRequest, ToolCall};

/// Standard board with one unjailed actor per cash entry, named `Actor {i}`, seat 0 to act.
pub fn table_state(cash: &[i64]) -> EngineState {
    EngineState {
        turn: 0,
        actors: cash
            .iter()
            .enumerate()
            .map(|(i, cash)| Actor::new(&format!("Actor {i}"), *cash))
            .collect(),
        squares: standard_squares(),
        dice_rolled: false,
        last_roll: None,
        doubles: 0,
        landing_pending: false,
        prompt: None,
    }
}

/// Table engine over [`table_state`] rolling `rolls` in order.
pub fn scripted_table(
    cash: &[i64],
    rolls: impl IntoIterator<Item = [u8; 2]>,
) -> TableEngine {
    TableEngine::from_state(table_state(cash), Box::new(ScriptedDice::new(rolls)))
}

/// Reply with a single tool call.
pub fn call(name: &str, arguments: Value) -> OracleReply {
    OracleReply {
        calls: vec![ToolCall::new(name, arguments)],
        rationale: None,
    }
}

/// Oracle that returns scripted replies in order and records every request.
///
/// Once the script is exhausted it replies with no call (an implicit `end-turn`).
pub struct ScriptedOracle {
    replies: RefCell<VecDeque<Result<OracleReply, DecisionError>>>,
    requests: RefCell<Vec<OracleRequest>>,
}

impl ScriptedOracle {
    pub fn new(replies: impl IntoIterator<Item = Result<OracleReply, DecisionError>>) -> Self {
        Self {
            replies: RefCell::new(replies.into_iter().collect()),
            requests: RefCell::new(Vec::new()),
        }
    }

    pub fn requests(&self) -> Vec<OracleRequest> {
        self.requests.borrow().clone()
    }

    pub fn remaining(&self) -> usize {
        self.replies.borrow().len()
    }
}

impl Oracle for ScriptedOracle {
    fn decide(&self, request: &OracleRequest) -> Result<OracleReply, DecisionError> {
        self.requests.borrow_mut().push(request.clone());
        self.replies
            .borrow_mut()
            .pop_front()
            .unwrap_or_else(|| Ok(OracleReply::default()))
    }
}

/// Engine double that records collaborator calls.
///
/// `roll` applies `next_roll` to the dice fields; every other operation only
/// records. Setting `refuse` makes the next call fail with that reason.
pub struct RecordingEngine {
    pub state: EngineState,
    pub calls: Vec<String>,
    pub next_roll: [u8; 2],
    pub refuse: Option<String>,
}

impl RecordingEngine {
    pub fn new(state: EngineState) -> Self {
        Self {
            state,
            calls: Vec::new(),
            next_roll: [1, 2],
            refuse: None,
        }
    }

    fn record(&mut self, call: String) -> Result<(), Refusal> {
        if let Some(reason) = self.refuse.take() {
            return Err(Refusal::new(reason));
        }
        self.calls.push(call);
        Ok(())
    }
}

impl Engine for RecordingEngine {
    fn state(&self) -> &EngineState {
        &self.state
    }

    fn roll(&mut self) -> Result<(), Refusal> {
        self.record("roll".to_string())?;
        let [a, b] = self.next_roll;
        self.state.dice_rolled = true;
        self.state.last_roll = Some([a, b]);
        self.state.doubles = if a == b { self.state.doubles + 1 } else { 0 };
        Ok(())
    }

    fn end_turn(&mut self) -> Result<(), Refusal> {
        self.record("end_turn".to_string())
    }

    fn buy_property(&mut self) -> Result<(), Refusal> {
        self.record("buy_property".to_string())
    }

    fn decline_buy_property(&mut self) -> Result<(), Refusal> {
        self.record("decline_buy_property".to_string())
    }

    fn build(&mut self, square: usize) -> Result<(), Refusal> {
        self.record(format!("build({square})"))
    }

    fn sell_building(&mut self, square: usize) -> Result<(), Refusal> {
        self.record(format!("sell_building({square})"))
    }

    fn mortgage(&mut self, square: usize) -> Result<(), Refusal> {
        self.record(format!("mortgage({square})"))
    }

    fn unmortgage(&mut self, square: usize) -> Result<(), Refusal> {
        self.record(format!("unmortgage({square})"))
    }

    fn use_jail_card(&mut self) -> Result<(), Refusal> {
        self.record("use_jail_card".to_string())
    }

    fn pay_jail_fine(&mut self) -> Result<(), Refusal> {
        self.record("pay_jail_fine".to_string())
    }

    fn initiate_trade(&mut self, terms: TradeTerms) -> Result<(), Refusal> {
        self.record(format!(
            "initiate_trade({}, {:?}, {:?}, {}, {})",
            terms.recipient,
            terms.offered_squares,
            terms.requested_squares,
            terms.offered_money,
            terms.requested_money
        ))
    }

    fn respond_to_trade(&mut self, accept: bool) -> Result<(), Refusal> {
        self.record(format!("respond_to_trade({accept})"))
    }

    fn place_bid(&mut self, amount: u32) -> Result<(), Refusal> {
        self.record(format!("place_bid({amount})"))
    }

    fn pass_bid(&mut self) -> Result<(), Refusal> {
        self.record("pass_bid".to_string())
    }

    fn exit_auction(&mut self) -> Result<(), Refusal> {
        self.record("exit_auction".to_string())
    }
}
