//! Raw engine state as seen by the core.
//!
//! The engine owns this data; the core only reads it. Every resolver and snapshot
//! call receives an explicit `&EngineState`.

use serde::{Deserialize, Serialize};

pub const BOARD_SIZE: usize = 40;
pub const JAIL_SQUARE: usize = 10;
pub const JAIL_FINE: i64 = 50;
pub const MAX_JAIL_ATTEMPTS: u8 = 3;
pub const MAX_DOUBLES: u8 = 3;

/// Property group. Colour groups first, then railroads and utilities.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum Group {
    Purple,
    LightBlue,
    Pink,
    Orange,
    Red,
    Yellow,
    Green,
    DarkBlue,
    Railroad,
    Utility,
}

impl Group {
    pub const ALL: [Group; 10] = [
        Group::Purple,
        Group::LightBlue,
        Group::Pink,
        Group::Orange,
        Group::Red,
        Group::Yellow,
        Group::Green,
        Group::DarkBlue,
        Group::Railroad,
        Group::Utility,
    ];

    pub fn label(self) -> &'static str {
        match self {
            Group::Purple => "Purple",
            Group::LightBlue => "Light Blue",
            Group::Pink => "Pink",
            Group::Orange => "Orange",
            Group::Red => "Red",
            Group::Yellow => "Yellow",
            Group::Green => "Green",
            Group::DarkBlue => "Dark Blue",
            Group::Railroad => "Railroad",
            Group::Utility => "Utility",
        }
    }

    /// Only colour groups take houses and hotels.
    pub fn is_colour(self) -> bool {
        !matches!(self, Group::Railroad | Group::Utility)
    }
}

/// One board square.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Square {
    pub name: String,
    #[serde(default)]
    pub price: u32,
    #[serde(default)]
    pub group: Option<Group>,
    #[serde(default)]
    pub owner: Option<usize>,
    #[serde(default)]
    pub mortgaged: bool,
    /// Building level: 0-4 houses, 5 is a hotel.
    #[serde(default)]
    pub buildings: u8,
    #[serde(default)]
    pub house_price: u32,
    /// Rent by building level, index 0 being the bare site. Empty for railroads
    /// and utilities.
    #[serde(default)]
    pub rents: Vec<u32>,
}

impl Square {
    /// A square that cannot be bought (GO, taxes, chance, jail, ...).
    pub fn plain(name: &str) -> Self {
        Self {
            name: name.to_string(),
            price: 0,
            group: None,
            owner: None,
            mortgaged: false,
            buildings: 0,
            house_price: 0,
            rents: Vec::new(),
        }
    }

    pub fn is_purchasable(&self) -> bool {
        self.price > 0 && self.group.is_some()
    }

    pub fn mortgage_value(&self) -> u32 {
        self.price.div_ceil(2)
    }

    /// Mortgage value plus 10% interest.
    pub fn unmortgage_cost(&self) -> u32 {
        let cost = (u64::from(self.price) * 55 + 50) / 100;
        u32::try_from(cost).unwrap_or(u32::MAX)
    }

    pub fn building_value(&self) -> u32 {
        u32::from(self.buildings.min(5)) * self.house_price
    }
}

/// One seated participant.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Actor {
    pub name: String,
    pub cash: i64,
    #[serde(default)]
    pub position: usize,
    #[serde(default)]
    pub in_jail: bool,
    /// Failed release rolls during the current jail stay.
    #[serde(default)]
    pub jail_attempts: u8,
    /// Held "get out of jail free" cards.
    #[serde(default)]
    pub jail_cards: u8,
    #[serde(default)]
    pub bankrupt: bool,
}

impl Actor {
    pub fn new(name: &str, cash: i64) -> Self {
        Self {
            name: name.to_string(),
            cash,
            position: 0,
            in_jail: false,
            jail_attempts: 0,
            jail_cards: 0,
            bankrupt: false,
        }
    }
}

/// A proposed property/cash exchange between two actors.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TradeOffer {
    pub from: usize,
    pub to: usize,
    #[serde(default)]
    pub offered_squares: Vec<usize>,
    #[serde(default)]
    pub requested_squares: Vec<usize>,
    #[serde(default)]
    pub offered_money: u32,
    #[serde(default)]
    pub requested_money: u32,
}

/// A question the engine is waiting on from an actor other than the normal turn flow.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum PendingPrompt {
    Auction {
        square: usize,
        highest_bid: u32,
        highest_bidder: Option<usize>,
        /// Actors still in the auction, in bidding order.
        bidders: Vec<usize>,
        /// Actor whose bid is awaited.
        bidder: usize,
    },
    Trade(TradeOffer),
}

impl PendingPrompt {
    /// Actor the engine is waiting on.
    pub fn actor(&self) -> usize {
        match self {
            PendingPrompt::Auction { bidder, .. } => *bidder,
            PendingPrompt::Trade(offer) => offer.to,
        }
    }
}

/// Complete raw state exposed by the engine.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct EngineState {
    /// Index of the actor whose turn it is.
    pub turn: usize,
    pub actors: Vec<Actor>,
    pub squares: Vec<Square>,
    #[serde(default)]
    pub dice_rolled: bool,
    #[serde(default)]
    pub last_roll: Option<[u8; 2]>,
    /// Consecutive doubles rolled this turn.
    #[serde(default)]
    pub doubles: u8,
    /// The turn actor landed on an unowned priced square and has not bought or
    /// declined it yet.
    #[serde(default)]
    pub landing_pending: bool,
    #[serde(default)]
    pub prompt: Option<PendingPrompt>,
}

impl EngineState {
    /// Actor expected to act now: the prompt's actor, or the turn actor.
    pub fn acting_actor(&self) -> usize {
        self.prompt
            .as_ref()
            .map(PendingPrompt::actor)
            .unwrap_or(self.turn)
    }

    pub fn actor(&self, index: usize) -> Option<&Actor> {
        self.actors.get(index)
    }

    pub fn square(&self, index: usize) -> Option<&Square> {
        self.squares.get(index)
    }

    /// Square the turn actor stands on.
    pub fn current_square(&self) -> Option<&Square> {
        self.actor(self.turn)
            .and_then(|actor| self.square(actor.position))
    }

    pub fn owns_any(&self, actor: usize) -> bool {
        self.squares.iter().any(|sq| sq.owner == Some(actor))
    }

    pub fn group_squares(&self, group: Group) -> impl Iterator<Item = (usize, &Square)> {
        self.squares
            .iter()
            .enumerate()
            .filter(move |(_, sq)| sq.group == Some(group))
    }

    /// Owner of every square in `group`, if there is a single one.
    pub fn monopoly_owner(&self, group: Group) -> Option<usize> {
        let mut owner = None;
        let mut any = false;
        for (_, sq) in self.group_squares(group) {
            any = true;
            let sq_owner = sq.owner?;
            match owner {
                None => owner = Some(sq_owner),
                Some(existing) if existing != sq_owner => return None,
                Some(_) => {}
            }
        }
        if any { owner } else { None }
    }

    /// Number of squares in `group` held by `actor`.
    pub fn owned_in_group(&self, group: Group, actor: usize) -> usize {
        self.group_squares(group)
            .filter(|(_, sq)| sq.owner == Some(actor))
            .count()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::engine::board::standard_squares;

    fn state() -> EngineState {
        EngineState {
            turn: 0,
            actors: vec![Actor::new("A", 1500), Actor::new("B", 1500)],
            squares: standard_squares(),
            dice_rolled: false,
            last_roll: None,
            doubles: 0,
            landing_pending: false,
            prompt: None,
        }
    }

    #[test]
    fn monopoly_requires_single_owner_of_whole_group() {
        let mut state = state();
        state.squares[1].owner = Some(0);
        assert_eq!(state.monopoly_owner(Group::Purple), None);
        state.squares[3].owner = Some(1);
        assert_eq!(state.monopoly_owner(Group::Purple), None);
        state.squares[3].owner = Some(0);
        assert_eq!(state.monopoly_owner(Group::Purple), Some(0));
        assert_eq!(state.owned_in_group(Group::Purple, 0), 2);
    }

    #[test]
    fn acting_actor_follows_pending_prompt() {
        let mut state = state();
        assert_eq!(state.acting_actor(), 0);
        state.prompt = Some(PendingPrompt::Trade(TradeOffer {
            from: 0,
            to: 1,
            offered_squares: vec![],
            requested_squares: vec![],
            offered_money: 10,
            requested_money: 0,
        }));
        assert_eq!(state.acting_actor(), 1);
    }

    #[test]
    fn mortgage_values_round_like_the_table_rules() {
        let boardwalk = &standard_squares()[39];
        assert_eq!(boardwalk.mortgage_value(), 200);
        assert_eq!(boardwalk.unmortgage_cost(), 220);
        let baltic = &standard_squares()[3];
        assert_eq!(baltic.unmortgage_cost(), 33);
    }
}
