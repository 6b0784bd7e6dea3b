//! Board engine collaborator interface.
//!
//! The [`Engine`] trait is the only way the orchestration layer mutates game
//! state. Each operation acts for the currently acting actor and reports success
//! through its `Result`; a [`Refusal`] leaves the state untouched.

pub mod board;
pub mod dice;
pub mod table;

use thiserror::Error;

use crate::core::board::EngineState;

/// An engine operation that was not carried out.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("{reason}")]
pub struct Refusal {
    pub reason: String,
}

impl Refusal {
    pub fn new(reason: impl Into<String>) -> Self {
        Self {
            reason: reason.into(),
        }
    }
}

/// Terms of a trade proposed by the turn actor.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct TradeTerms {
    pub recipient: usize,
    pub offered_squares: Vec<usize>,
    pub requested_squares: Vec<usize>,
    pub offered_money: u32,
    pub requested_money: u32,
}

pub trait Engine {
    fn state(&self) -> &EngineState;

    fn roll(&mut self) -> Result<(), Refusal>;
    fn end_turn(&mut self) -> Result<(), Refusal>;
    fn buy_property(&mut self) -> Result<(), Refusal>;
    fn decline_buy_property(&mut self) -> Result<(), Refusal>;
    fn build(&mut self, square: usize) -> Result<(), Refusal>;
    fn sell_building(&mut self, square: usize) -> Result<(), Refusal>;
    fn mortgage(&mut self, square: usize) -> Result<(), Refusal>;
    fn unmortgage(&mut self, square: usize) -> Result<(), Refusal>;
    fn use_jail_card(&mut self) -> Result<(), Refusal>;
    fn pay_jail_fine(&mut self) -> Result<(), Refusal>;
    fn initiate_trade(&mut self, terms: TradeTerms) -> Result<(), Refusal>;
    fn respond_to_trade(&mut self, accept: bool) -> Result<(), Refusal>;
    fn place_bid(&mut self, amount: u32) -> Result<(), Refusal>;
    fn pass_bid(&mut self) -> Result<(), Refusal>;
    fn exit_auction(&mut self) -> Result<(), Refusal>;
}
