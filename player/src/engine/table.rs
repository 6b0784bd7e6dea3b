//! Reference table engine: the standard board rules needed to play whole games.
//!
//! Chance and community-chest squares are inert and bankruptcy is not adjudicated;
//! cash may go negative.

use tracing::{debug, info};

use crate::core::board::{
    Actor, EngineState, JAIL_FINE, JAIL_SQUARE, MAX_DOUBLES, MAX_JAIL_ATTEMPTS, PendingPrompt,
    Square, TradeOffer,
};
use crate::core::legal::{TurnPhase, phase};
use crate::core::snapshot::{Rent, current_rent};
use crate::engine::board::{GO_SALARY, GO_TO_JAIL_SQUARE, TAXES, standard_squares};
use crate::engine::dice::Dice;
use crate::engine::{Engine, Refusal, TradeTerms};

/// Auction bookkeeping between two bids.
struct AuctionRound {
    square: usize,
    highest_bid: u32,
    highest_bidder: Option<usize>,
    bidders: Vec<usize>,
}

impl AuctionRound {
    fn into_prompt(self, bidder: usize) -> PendingPrompt {
        PendingPrompt::Auction {
            square: self.square,
            highest_bid: self.highest_bid,
            highest_bidder: self.highest_bidder,
            bidders: self.bidders,
            bidder,
        }
    }
}

pub struct TableEngine {
    state: EngineState,
    dice: Box<dyn Dice>,
    /// Consecutive passes since the last bid.
    auction_passes: usize,
    turns_played: u32,
}

impl TableEngine {
    /// Seat `names` on a fresh standard board with `starting_cash` each.
    pub fn new(names: &[String], starting_cash: i64, dice: Box<dyn Dice>) -> Self {
        let state = EngineState {
            turn: 0,
            actors: names
                .iter()
                .map(|name| Actor::new(name, starting_cash))
                .collect(),
            squares: standard_squares(),
            dice_rolled: false,
            last_roll: None,
            doubles: 0,
            landing_pending: false,
            prompt: None,
        };
        Self::from_state(state, dice)
    }

    pub fn from_state(state: EngineState, dice: Box<dyn Dice>) -> Self {
        Self {
            state,
            dice,
            auction_passes: 0,
            turns_played: 0,
        }
    }

    /// Completed turns since the engine was created.
    pub fn turns_played(&self) -> u32 {
        self.turns_played
    }

    pub fn state_mut(&mut self) -> &mut EngineState {
        &mut self.state
    }

    fn ensure_no_prompt(&self) -> Result<(), Refusal> {
        match &self.state.prompt {
            Some(PendingPrompt::Auction { .. }) => Err(Refusal::new("an auction is in progress")),
            Some(PendingPrompt::Trade(_)) => Err(Refusal::new("a trade offer is pending")),
            None => Ok(()),
        }
    }

    fn turn_actor(&self) -> Result<usize, Refusal> {
        let turn = self.state.turn;
        match self.state.actor(turn) {
            Some(actor) if !actor.bankrupt => Ok(turn),
            Some(_) => Err(Refusal::new("turn actor is bankrupt")),
            None => Err(Refusal::new(format!("no actor at seat {turn}"))),
        }
    }

    fn owned_square(&self, actor: usize, square: usize) -> Result<&Square, Refusal> {
        let sq = self
            .state
            .square(square)
            .ok_or_else(|| Refusal::new(format!("no square {square}")))?;
        if sq.owner != Some(actor) {
            return Err(Refusal::new(format!("{} is not yours", sq.name)));
        }
        Ok(sq)
    }

    fn next_seat(&self, from: usize) -> usize {
        let seats = self.state.actors.len();
        (1..=seats)
            .map(|k| (from + k) % seats)
            .find(|seat| !self.state.actors[*seat].bankrupt)
            .unwrap_or(from)
    }

    fn send_to_jail(&mut self, idx: usize) {
        let actor = &mut self.state.actors[idx];
        actor.position = JAIL_SQUARE;
        actor.in_jail = true;
        actor.jail_attempts = 0;
        self.state.doubles = 0;
        self.state.landing_pending = false;
        info!(actor = idx, "sent to jail");
    }

    /// Release from jail; after a failed roll this turn the actor moves by it.
    fn leave_jail(&mut self, idx: usize) {
        let actor = &mut self.state.actors[idx];
        actor.in_jail = false;
        actor.jail_attempts = 0;
        if self.state.dice_rolled
            && let Some(roll) = self.state.last_roll
        {
            self.advance(idx, usize::from(roll[0] + roll[1]));
        }
    }

    fn advance(&mut self, idx: usize, steps: usize) {
        let size = self.state.squares.len();
        if size == 0 {
            return;
        }
        let actor = &mut self.state.actors[idx];
        let target = actor.position + steps;
        if target >= size {
            actor.cash += GO_SALARY;
            debug!(actor = idx, "passed GO");
        }
        actor.position = target % size;
        self.land(idx);
    }

    fn land(&mut self, idx: usize) {
        let position = self.state.actors[idx].position;
        if position == GO_TO_JAIL_SQUARE {
            self.send_to_jail(idx);
            return;
        }
        if let Some((_, tax)) = TAXES.iter().find(|(sq, _)| *sq == position) {
            self.state.actors[idx].cash -= tax;
            debug!(actor = idx, tax, "paid tax");
            return;
        }

        let dice_total = self
            .state
            .last_roll
            .map(|roll| i64::from(roll[0] + roll[1]))
            .unwrap_or(0);
        let owed = {
            let Some(sq) = self.state.square(position) else {
                return;
            };
            if !sq.is_purchasable() {
                return;
            }
            match sq.owner {
                None => None,
                Some(owner) if owner == idx => return,
                Some(owner) => {
                    let in_monopoly = sq
                        .group
                        .is_some_and(|group| self.state.monopoly_owner(group) == Some(owner));
                    let rent = match current_rent(&self.state, sq, in_monopoly) {
                        Rent::None => 0,
                        Rent::Flat(amount) => i64::from(amount),
                        Rent::DiceMultiple(factor) => i64::from(factor) * dice_total,
                    };
                    Some((owner, rent))
                }
            }
        };

        match owed {
            None => self.state.landing_pending = true,
            Some((owner, rent)) if rent > 0 => {
                self.state.actors[idx].cash -= rent;
                self.state.actors[owner].cash += rent;
                info!(actor = idx, owner, rent, "paid rent");
            }
            Some(_) => {}
        }
    }

    fn auction(&self) -> Result<(AuctionRound, usize), Refusal> {
        match &self.state.prompt {
            Some(PendingPrompt::Auction {
                square,
                highest_bid,
                highest_bidder,
                bidders,
                bidder,
            }) => Ok((
                AuctionRound {
                    square: *square,
                    highest_bid: *highest_bid,
                    highest_bidder: *highest_bidder,
                    bidders: bidders.clone(),
                },
                *bidder,
            )),
            _ => Err(Refusal::new("no auction in progress")),
        }
    }

    /// Prompt the next bidder at or after `from`, or close the auction.
    fn next_bidder(&mut self, round: AuctionRound, from: usize) {
        let eligible = round
            .bidders
            .iter()
            .filter(|b| Some(**b) != round.highest_bidder)
            .count();
        if eligible == 0 || self.auction_passes >= eligible {
            self.finish_auction(round);
            return;
        }
        let n = round.bidders.len();
        let next = (0..n)
            .map(|k| round.bidders[(from + k) % n])
            .find(|b| Some(*b) != round.highest_bidder);
        match next {
            Some(bidder) => self.state.prompt = Some(round.into_prompt(bidder)),
            None => self.finish_auction(round),
        }
    }

    fn finish_auction(&mut self, round: AuctionRound) {
        self.state.prompt = None;
        self.auction_passes = 0;
        match round.highest_bidder {
            Some(winner) => {
                self.state.actors[winner].cash -= i64::from(round.highest_bid);
                self.state.squares[round.square].owner = Some(winner);
                info!(
                    square = round.square,
                    winner,
                    bid = round.highest_bid,
                    "auction won"
                );
            }
            None => info!(square = round.square, "auction closed without bids"),
        }
    }
}

impl Engine for TableEngine {
    fn state(&self) -> &EngineState {
        &self.state
    }

    fn roll(&mut self) -> Result<(), Refusal> {
        self.ensure_no_prompt()?;
        let idx = self.turn_actor()?;
        match phase(&self.state) {
            Some(TurnPhase::PreRoll | TurnPhase::MustReroll | TurnPhase::JailPreRoll) => {}
            _ => return Err(Refusal::new("dice already rolled this turn")),
        }

        let roll = self.dice.roll();
        let is_double = roll[0] == roll[1];
        let total = usize::from(roll[0] + roll[1]);
        self.state.dice_rolled = true;
        self.state.last_roll = Some(roll);
        self.state.landing_pending = false;
        debug!(actor = idx, ?roll, "rolled");

        if self.state.actors[idx].in_jail {
            if is_double {
                info!(actor = idx, "rolled doubles, released from jail");
                self.state.actors[idx].in_jail = false;
                self.state.actors[idx].jail_attempts = 0;
                self.advance(idx, total);
            } else {
                self.state.actors[idx].jail_attempts += 1;
            }
            return Ok(());
        }

        if is_double {
            self.state.doubles += 1;
            if self.state.doubles >= MAX_DOUBLES {
                self.send_to_jail(idx);
                return Ok(());
            }
        } else {
            self.state.doubles = 0;
        }
        self.advance(idx, total);
        Ok(())
    }

    fn end_turn(&mut self) -> Result<(), Refusal> {
        self.ensure_no_prompt()?;
        let idx = self.turn_actor()?;
        match phase(&self.state) {
            Some(TurnPhase::PostRoll | TurnPhase::JailPostRoll) => {}
            Some(TurnPhase::MustReroll) => return Err(Refusal::new("doubles rolled: roll again")),
            Some(TurnPhase::ForcedRelease) => {
                return Err(Refusal::new("third failed jail roll: leave jail first"));
            }
            _ => return Err(Refusal::new("dice not rolled yet")),
        }

        self.state.dice_rolled = false;
        self.state.doubles = 0;
        self.state.landing_pending = false;
        self.state.last_roll = None;
        self.state.turn = self.next_seat(idx);
        self.turns_played += 1;
        debug!(actor = idx, next = self.state.turn, "turn ended");
        Ok(())
    }

    fn buy_property(&mut self) -> Result<(), Refusal> {
        self.ensure_no_prompt()?;
        let idx = self.turn_actor()?;
        if !self.state.landing_pending {
            return Err(Refusal::new("no purchase pending"));
        }
        let position = self.state.actors[idx].position;
        let price = match self.state.square(position) {
            Some(sq) if sq.is_purchasable() && sq.owner.is_none() => sq.price,
            _ => return Err(Refusal::new("square is not for sale")),
        };
        if self.state.actors[idx].cash < i64::from(price) {
            return Err(Refusal::new(format!("insufficient cash: price is ${price}")));
        }

        self.state.actors[idx].cash -= i64::from(price);
        self.state.squares[position].owner = Some(idx);
        self.state.landing_pending = false;
        info!(actor = idx, square = position, price, "bought property");
        Ok(())
    }

    fn decline_buy_property(&mut self) -> Result<(), Refusal> {
        self.ensure_no_prompt()?;
        let idx = self.turn_actor()?;
        if !self.state.landing_pending {
            return Err(Refusal::new("no purchase pending"));
        }
        self.state.landing_pending = false;

        let seats = self.state.actors.len();
        let bidders: Vec<usize> = (0..seats)
            .map(|k| (idx + k) % seats)
            .filter(|seat| !self.state.actors[*seat].bankrupt)
            .collect();
        let square = self.state.actors[idx].position;
        let Some(first) = bidders.first().copied() else {
            return Ok(());
        };
        self.auction_passes = 0;
        self.state.prompt = Some(PendingPrompt::Auction {
            square,
            highest_bid: 0,
            highest_bidder: None,
            bidders,
            bidder: first,
        });
        info!(actor = idx, square, "declined purchase, auction opened");
        Ok(())
    }

    fn build(&mut self, square: usize) -> Result<(), Refusal> {
        self.ensure_no_prompt()?;
        let idx = self.turn_actor()?;
        let sq = self.owned_square(idx, square)?;
        let group = sq
            .group
            .filter(|group| group.is_colour())
            .ok_or_else(|| Refusal::new(format!("{} cannot take buildings", sq.name)))?;
        let (level, house_price) = (sq.buildings, sq.house_price);

        if self.state.monopoly_owner(group) != Some(idx) {
            return Err(Refusal::new(format!("you do not own all of {}", group.label())));
        }
        if self.state.group_squares(group).any(|(_, s)| s.mortgaged) {
            return Err(Refusal::new("a square in the group is mortgaged"));
        }
        if level >= 5 {
            return Err(Refusal::new("already has a hotel"));
        }
        let lowest = self
            .state
            .group_squares(group)
            .map(|(_, s)| s.buildings)
            .min()
            .unwrap_or(0);
        if level > lowest {
            return Err(Refusal::new("build evenly across the group"));
        }
        if self.state.actors[idx].cash < i64::from(house_price) {
            return Err(Refusal::new(format!(
                "insufficient cash: building costs ${house_price}"
            )));
        }

        self.state.actors[idx].cash -= i64::from(house_price);
        self.state.squares[square].buildings += 1;
        info!(actor = idx, square, level = level + 1, "built");
        Ok(())
    }

    fn sell_building(&mut self, square: usize) -> Result<(), Refusal> {
        self.ensure_no_prompt()?;
        let idx = self.turn_actor()?;
        let sq = self.owned_square(idx, square)?;
        let (level, house_price, group) = (sq.buildings, sq.house_price, sq.group);
        if level == 0 {
            return Err(Refusal::new(format!("{} has no buildings", sq.name)));
        }
        if let Some(group) = group {
            let highest = self
                .state
                .group_squares(group)
                .map(|(_, s)| s.buildings)
                .max()
                .unwrap_or(0);
            if level < highest {
                return Err(Refusal::new("sell evenly across the group"));
            }
        }

        self.state.actors[idx].cash += i64::from(house_price / 2);
        self.state.squares[square].buildings -= 1;
        info!(actor = idx, square, level = level - 1, "sold building");
        Ok(())
    }

    fn mortgage(&mut self, square: usize) -> Result<(), Refusal> {
        self.ensure_no_prompt()?;
        let idx = self.turn_actor()?;
        let sq = self.owned_square(idx, square)?;
        if sq.mortgaged {
            return Err(Refusal::new(format!("{} is already mortgaged", sq.name)));
        }
        let value = sq.mortgage_value();
        if let Some(group) = sq.group
            && self.state.group_squares(group).any(|(_, s)| s.buildings > 0)
        {
            return Err(Refusal::new("sell the group's buildings first"));
        }

        self.state.actors[idx].cash += i64::from(value);
        self.state.squares[square].mortgaged = true;
        info!(actor = idx, square, value, "mortgaged");
        Ok(())
    }

    fn unmortgage(&mut self, square: usize) -> Result<(), Refusal> {
        self.ensure_no_prompt()?;
        let idx = self.turn_actor()?;
        let sq = self.owned_square(idx, square)?;
        if !sq.mortgaged {
            return Err(Refusal::new(format!("{} is not mortgaged", sq.name)));
        }
        let cost = sq.unmortgage_cost();
        if self.state.actors[idx].cash < i64::from(cost) {
            return Err(Refusal::new(format!("insufficient cash: unmortgage costs ${cost}")));
        }

        self.state.actors[idx].cash -= i64::from(cost);
        self.state.squares[square].mortgaged = false;
        info!(actor = idx, square, cost, "unmortgaged");
        Ok(())
    }

    fn use_jail_card(&mut self) -> Result<(), Refusal> {
        self.ensure_no_prompt()?;
        let idx = self.turn_actor()?;
        let actor = &self.state.actors[idx];
        if !actor.in_jail {
            return Err(Refusal::new("not in jail"));
        }
        if actor.jail_cards == 0 {
            return Err(Refusal::new("no jail card held"));
        }
        if self.state.dice_rolled && actor.jail_attempts < MAX_JAIL_ATTEMPTS {
            return Err(Refusal::new("release attempt already made this turn"));
        }

        self.state.actors[idx].jail_cards -= 1;
        info!(actor = idx, "used jail card");
        self.leave_jail(idx);
        Ok(())
    }

    fn pay_jail_fine(&mut self) -> Result<(), Refusal> {
        self.ensure_no_prompt()?;
        let idx = self.turn_actor()?;
        let actor = &self.state.actors[idx];
        if !actor.in_jail {
            return Err(Refusal::new("not in jail"));
        }
        if self.state.dice_rolled && actor.jail_attempts < MAX_JAIL_ATTEMPTS {
            return Err(Refusal::new("release attempt already made this turn"));
        }
        // After the third failed roll the fine is owed regardless of cash.
        if !self.state.dice_rolled && actor.cash < JAIL_FINE {
            return Err(Refusal::new(format!("insufficient cash: fine is ${JAIL_FINE}")));
        }

        self.state.actors[idx].cash -= JAIL_FINE;
        info!(actor = idx, "paid jail fine");
        self.leave_jail(idx);
        Ok(())
    }

    fn initiate_trade(&mut self, terms: TradeTerms) -> Result<(), Refusal> {
        self.ensure_no_prompt()?;
        let idx = self.turn_actor()?;
        let to = terms.recipient;
        if to == idx {
            return Err(Refusal::new("cannot trade with yourself"));
        }
        match self.state.actor(to) {
            Some(actor) if !actor.bankrupt => {}
            _ => return Err(Refusal::new(format!("no active actor at seat {to}"))),
        }
        if terms.offered_squares.is_empty()
            && terms.requested_squares.is_empty()
            && terms.offered_money == 0
            && terms.requested_money == 0
        {
            return Err(Refusal::new("empty trade"));
        }
        for (squares, owner) in [(&terms.offered_squares, idx), (&terms.requested_squares, to)] {
            for square in squares {
                let sq = self.owned_square(owner, *square)?;
                if sq.buildings > 0 {
                    return Err(Refusal::new(format!("{} has buildings", sq.name)));
                }
            }
        }
        if self.state.actors[idx].cash < i64::from(terms.offered_money) {
            return Err(Refusal::new("insufficient cash for the offered money"));
        }

        info!(from = idx, to, "trade offered");
        self.state.prompt = Some(PendingPrompt::Trade(TradeOffer {
            from: idx,
            to,
            offered_squares: terms.offered_squares,
            requested_squares: terms.requested_squares,
            offered_money: terms.offered_money,
            requested_money: terms.requested_money,
        }));
        Ok(())
    }

    fn respond_to_trade(&mut self, accept: bool) -> Result<(), Refusal> {
        let Some(PendingPrompt::Trade(offer)) = self.state.prompt.clone() else {
            return Err(Refusal::new("no trade offer pending"));
        };
        if !accept {
            self.state.prompt = None;
            info!(from = offer.from, to = offer.to, "trade rejected");
            return Ok(());
        }
        if self.state.actors[offer.to].cash < i64::from(offer.requested_money) {
            return Err(Refusal::new("insufficient cash for the requested money"));
        }

        for square in &offer.offered_squares {
            self.state.squares[*square].owner = Some(offer.to);
        }
        for square in &offer.requested_squares {
            self.state.squares[*square].owner = Some(offer.from);
        }
        let net = i64::from(offer.offered_money) - i64::from(offer.requested_money);
        self.state.actors[offer.from].cash -= net;
        self.state.actors[offer.to].cash += net;
        self.state.prompt = None;
        info!(from = offer.from, to = offer.to, "trade accepted");
        Ok(())
    }

    fn place_bid(&mut self, amount: u32) -> Result<(), Refusal> {
        let (mut round, bidder) = self.auction()?;
        if amount <= round.highest_bid {
            return Err(Refusal::new(format!(
                "bid must exceed ${}",
                round.highest_bid
            )));
        }
        if self.state.actors[bidder].cash < i64::from(amount) {
            return Err(Refusal::new("bid exceeds cash"));
        }

        debug!(bidder, amount, "bid placed");
        round.highest_bid = amount;
        round.highest_bidder = Some(bidder);
        self.auction_passes = 0;
        let at = round.bidders.iter().position(|b| *b == bidder).unwrap_or(0);
        self.next_bidder(round, at + 1);
        Ok(())
    }

    fn pass_bid(&mut self) -> Result<(), Refusal> {
        let (round, bidder) = self.auction()?;
        debug!(bidder, "bid passed");
        self.auction_passes += 1;
        let at = round.bidders.iter().position(|b| *b == bidder).unwrap_or(0);
        self.next_bidder(round, at + 1);
        Ok(())
    }

    fn exit_auction(&mut self) -> Result<(), Refusal> {
        let (mut round, bidder) = self.auction()?;
        debug!(bidder, "left auction");
        let at = round.bidders.iter().position(|b| *b == bidder).unwrap_or(0);
        round.bidders.retain(|b| *b != bidder);
        self.next_bidder(round, at);
        Ok(())
    }
}
