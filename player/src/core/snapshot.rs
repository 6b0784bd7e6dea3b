//! Immutable per-round projection of the engine state.
//!
//! Built fresh before every decision request and never mutated afterwards. Derived
//! views (groupings, monopolies, asset values, rent) are computed here so the
//! prompt layer only formats.

use std::collections::BTreeMap;
use std::fmt;

use serde::Serialize;

use crate::core::board::{EngineState, Group, PendingPrompt, Square};
use crate::core::history::{HISTORY_CAPACITY, TurnHistory, TurnHistoryEntry};
use crate::core::legal::{TurnPhase, phase, resolve};
use crate::core::types::ActionName;

/// Rent currently charged on a square.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(tag = "kind", content = "amount", rename_all = "snake_case")]
pub enum Rent {
    None,
    Flat(u32),
    /// Multiple of the dice total (utilities).
    DiceMultiple(u32),
}

impl fmt::Display for Rent {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Rent::None => f.write_str("none"),
            Rent::Flat(amount) => write!(f, "${amount}"),
            Rent::DiceMultiple(factor) => write!(f, "{factor} x dice roll"),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct SquareView {
    pub index: usize,
    pub name: String,
    pub price: u32,
    pub group: Option<Group>,
    pub owner: Option<usize>,
    pub owner_name: Option<String>,
    pub mortgaged: bool,
    pub houses: u8,
    pub hotel: bool,
    pub house_price: u32,
    pub in_monopoly: bool,
    pub current_rent: Rent,
    pub rent_label: String,
    pub mortgage_value: u32,
    pub unmortgage_cost: u32,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ActorView {
    pub index: usize,
    pub name: String,
    pub cash: i64,
    pub position: usize,
    pub position_name: String,
    pub in_jail: bool,
    pub jail_attempts: u8,
    pub has_jail_card: bool,
    /// Unmortgaged holdings by group.
    pub properties_by_group: BTreeMap<Group, Vec<SquareView>>,
    pub mortgaged: Vec<SquareView>,
    /// Colour groups owned whole with nothing mortgaged.
    pub buildable_groups: Vec<Group>,
    pub property_value: i64,
    pub mortgage_value: i64,
    pub building_value: i64,
    pub asset_value: i64,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Monopoly {
    pub group: Group,
    pub squares: Vec<usize>,
    pub owner: usize,
    pub owner_name: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct GameStateSnapshot {
    /// Actor the decision is requested for.
    pub acting: usize,
    /// Actor whose turn it is.
    pub turn: usize,
    pub actors: Vec<ActorView>,
    pub current_square: Option<SquareView>,
    pub dice_rolled: bool,
    pub last_roll: Option<[u8; 2]>,
    pub doubles: u8,
    pub phase: Option<TurnPhase>,
    pub legal_actions: Vec<ActionName>,
    pub monopolies: Vec<Monopoly>,
    pub history: Vec<TurnHistoryEntry>,
    pub prompt: Option<PendingPrompt>,
}

impl GameStateSnapshot {
    /// Project `state` and the newest `history_limit` history entries.
    pub fn build(state: &EngineState, history: &TurnHistory, history_limit: usize) -> Self {
        let actors = (0..state.actors.len())
            .map(|index| actor_view(state, index))
            .collect();
        let current_square = state
            .actor(state.turn)
            .map(|actor| square_view(state, actor.position));

        Self {
            acting: state.acting_actor(),
            turn: state.turn,
            actors,
            current_square,
            dice_rolled: state.dice_rolled,
            last_roll: state.last_roll,
            doubles: state.doubles,
            phase: phase(state),
            legal_actions: resolve(state).to_vec(),
            monopolies: monopolies(state),
            history: history.recent(history_limit.min(HISTORY_CAPACITY)),
            prompt: state.prompt.clone(),
        }
    }

    pub fn acting_actor(&self) -> Option<&ActorView> {
        self.actors.get(self.acting)
    }
}

/// Every group held whole by a single actor.
pub fn monopolies(state: &EngineState) -> Vec<Monopoly> {
    Group::ALL
        .into_iter()
        .filter_map(|group| {
            let owner = state.monopoly_owner(group)?;
            Some(Monopoly {
                group,
                squares: state.group_squares(group).map(|(i, _)| i).collect(),
                owner,
                owner_name: actor_name(state, owner),
            })
        })
        .collect()
}

fn actor_name(state: &EngineState, index: usize) -> String {
    state
        .actor(index)
        .map(|actor| actor.name.clone())
        .unwrap_or_else(|| format!("actor {index}"))
}

fn actor_view(state: &EngineState, index: usize) -> ActorView {
    let actor = &state.actors[index];
    let mut properties_by_group: BTreeMap<Group, Vec<SquareView>> = BTreeMap::new();
    let mut mortgaged = Vec::new();
    let (mut property_value, mut mortgage_value, mut building_value) = (0i64, 0i64, 0i64);

    for (i, sq) in state.squares.iter().enumerate() {
        if sq.owner != Some(index) {
            continue;
        }
        let Some(group) = sq.group else {
            continue;
        };
        if sq.mortgaged {
            mortgage_value += i64::from(sq.mortgage_value());
            mortgaged.push(square_view(state, i));
        } else {
            property_value += i64::from(sq.price);
            building_value += i64::from(sq.building_value());
            properties_by_group
                .entry(group)
                .or_default()
                .push(square_view(state, i));
        }
    }

    let buildable_groups = Group::ALL
        .into_iter()
        .filter(|group| group.is_colour())
        .filter(|group| state.monopoly_owner(*group) == Some(index))
        .filter(|group| state.group_squares(*group).all(|(_, sq)| !sq.mortgaged))
        .collect();

    let asset_value = actor.cash + property_value + mortgage_value + building_value;

    ActorView {
        index,
        name: actor.name.clone(),
        cash: actor.cash,
        position: actor.position,
        position_name: state
            .square(actor.position)
            .map(|sq| sq.name.clone())
            .unwrap_or_default(),
        in_jail: actor.in_jail,
        jail_attempts: actor.jail_attempts,
        has_jail_card: actor.jail_cards > 0,
        properties_by_group,
        mortgaged,
        buildable_groups,
        property_value,
        mortgage_value,
        building_value,
        asset_value,
    }
}

fn square_view(state: &EngineState, index: usize) -> SquareView {
    let Some(sq) = state.square(index) else {
        return SquareView {
            index,
            name: String::new(),
            price: 0,
            group: None,
            owner: None,
            owner_name: None,
            mortgaged: false,
            houses: 0,
            hotel: false,
            house_price: 0,
            in_monopoly: false,
            current_rent: Rent::None,
            rent_label: Rent::None.to_string(),
            mortgage_value: 0,
            unmortgage_cost: 0,
        };
    };
    let in_monopoly = match (sq.group, sq.owner) {
        (Some(group), Some(owner)) => state.monopoly_owner(group) == Some(owner),
        _ => false,
    };
    let current_rent = current_rent(state, sq, in_monopoly);
    SquareView {
        index,
        name: sq.name.clone(),
        price: sq.price,
        group: sq.group,
        owner: sq.owner,
        owner_name: sq.owner.map(|owner| actor_name(state, owner)),
        mortgaged: sq.mortgaged,
        houses: if sq.buildings < 5 { sq.buildings } else { 0 },
        hotel: sq.buildings >= 5,
        house_price: sq.house_price,
        in_monopoly,
        current_rent,
        rent_label: current_rent.to_string(),
        mortgage_value: sq.mortgage_value(),
        unmortgage_cost: sq.unmortgage_cost(),
    }
}

/// Rent owed by a visitor landing on `sq` right now.
pub fn current_rent(state: &EngineState, sq: &Square, in_monopoly: bool) -> Rent {
    let (Some(group), Some(owner)) = (sq.group, sq.owner) else {
        return Rent::None;
    };
    if sq.mortgaged {
        return Rent::None;
    }
    match group {
        Group::Railroad => {
            let owned = state.owned_in_group(Group::Railroad, owner).max(1) as u32;
            Rent::Flat(25 << (owned - 1))
        }
        Group::Utility => {
            if state.owned_in_group(Group::Utility, owner) >= 2 {
                Rent::DiceMultiple(10)
            } else {
                Rent::DiceMultiple(4)
            }
        }
        _ => {
            let level = usize::from(sq.buildings.min(5));
            let base = sq.rents.get(level).copied().unwrap_or(0);
            if level == 0 && in_monopoly {
                Rent::Flat(base * 2)
            } else {
                Rent::Flat(base)
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_support::table_state;

    #[test]
    fn asset_value_counts_cash_property_mortgage_and_buildings() {
        let mut state = table_state(&[1000, 1500]);
        // Purple monopoly with two houses on Baltic, Reading Railroad mortgaged.
        state.squares[1].owner = Some(0);
        state.squares[3].owner = Some(0);
        state.squares[3].buildings = 2;
        state.squares[5].owner = Some(0);
        state.squares[5].mortgaged = true;

        let snapshot = GameStateSnapshot::build(&state, &TurnHistory::new(), 5);
        let me = snapshot.acting_actor().expect("acting actor");
        assert_eq!(me.property_value, 120);
        assert_eq!(me.mortgage_value, 100);
        assert_eq!(me.building_value, 100);
        assert_eq!(me.asset_value, 1320);
        assert_eq!(me.buildable_groups, vec![Group::Purple]);
        assert_eq!(me.mortgaged.len(), 1);
        assert_eq!(me.properties_by_group[&Group::Purple].len(), 2);
        assert_eq!(snapshot.monopolies.len(), 1);
        assert_eq!(snapshot.monopolies[0].squares, vec![1, 3]);
    }

    #[test]
    fn asset_value_sums_prices_beyond_u32() {
        let mut state = table_state(&[-100, 1500]);
        for square in [1, 3] {
            state.squares[square].owner = Some(0);
            state.squares[square].price = u32::MAX;
        }

        let snapshot = GameStateSnapshot::build(&state, &TurnHistory::new(), 5);
        let me = snapshot.acting_actor().expect("acting actor");
        let expected = 2 * i64::from(u32::MAX);
        assert_eq!(me.property_value, expected);
        assert_eq!(me.asset_value, expected - 100);
    }

    #[test]
    fn rent_follows_group_rules() {
        let mut state = table_state(&[1500, 1500]);
        state.squares[5].owner = Some(1);
        state.squares[15].owner = Some(1);
        assert_eq!(current_rent(&state, &state.squares[5], false), Rent::Flat(50));

        state.squares[12].owner = Some(1);
        assert_eq!(
            current_rent(&state, &state.squares[12], false),
            Rent::DiceMultiple(4)
        );
        state.squares[28].owner = Some(1);
        assert_eq!(
            current_rent(&state, &state.squares[12], true),
            Rent::DiceMultiple(10)
        );

        state.squares[37].owner = Some(1);
        state.squares[39].owner = Some(1);
        assert_eq!(current_rent(&state, &state.squares[39], true), Rent::Flat(100));
        state.squares[39].buildings = 5;
        assert_eq!(current_rent(&state, &state.squares[39], true), Rent::Flat(2000));
        state.squares[39].mortgaged = true;
        assert_eq!(current_rent(&state, &state.squares[39], true), Rent::None);
    }

    #[test]
    fn snapshot_exposes_at_most_five_history_entries() {
        let state = table_state(&[1500, 1500]);
        let mut history = TurnHistory::new();
        for i in 0..8 {
            history.append(0, "Actor 0", vec![format!("step {i}")]);
        }
        let snapshot = GameStateSnapshot::build(&state, &history, 5);
        assert_eq!(snapshot.history.len(), 5);
        assert_eq!(snapshot.history[0].actions, vec!["step 7".to_string()]);
        assert_eq!(snapshot.legal_actions, vec![ActionName::Roll]);
    }
}
