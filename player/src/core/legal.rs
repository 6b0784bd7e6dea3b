//! Legal-action resolution: the turn-flow state machine.
//!
//! `resolve` is a pure function of the engine state at the instant of the call.
//! Callers must resolve again after every mutation instead of reusing a set.

use serde::Serialize;

use crate::core::board::{EngineState, JAIL_FINE, MAX_DOUBLES, MAX_JAIL_ATTEMPTS, PendingPrompt};
use crate::core::types::{ActionName, LegalActionSet};

/// Where the acting actor stands in the turn flow.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum TurnPhase {
    /// Not in jail, dice not rolled yet.
    PreRoll,
    /// Rolled doubles (fewer than three): must roll again.
    MustReroll,
    /// Rolled without owing another roll: the turn may end.
    PostRoll,
    /// In jail, release attempt not made yet this turn.
    JailPreRoll,
    /// In jail after a failed release roll, attempts remaining.
    JailPostRoll,
    /// In jail, release roll failed and the attempt limit is reached: the actor
    /// must pay the fine or use a card.
    ForcedRelease,
    /// The engine waits on an auction bid from the acting actor.
    Auction,
    /// The engine waits on a trade answer from the acting actor.
    TradeOffer,
}

/// Classify the state into a [`TurnPhase`]. `None` when the acting actor is missing.
pub fn phase(state: &EngineState) -> Option<TurnPhase> {
    if let Some(prompt) = &state.prompt {
        return Some(match prompt {
            PendingPrompt::Auction { .. } => TurnPhase::Auction,
            PendingPrompt::Trade(_) => TurnPhase::TradeOffer,
        });
    }
    let actor = state.actor(state.turn)?;
    let phase = match (actor.in_jail, state.dice_rolled) {
        (false, false) => TurnPhase::PreRoll,
        (false, true) if state.doubles > 0 && state.doubles < MAX_DOUBLES => TurnPhase::MustReroll,
        (false, true) => TurnPhase::PostRoll,
        (true, false) => TurnPhase::JailPreRoll,
        (true, true) if actor.jail_attempts < MAX_JAIL_ATTEMPTS => TurnPhase::JailPostRoll,
        (true, true) => TurnPhase::ForcedRelease,
    };
    Some(phase)
}

/// Compute the set of actions the acting actor may take right now.
pub fn resolve(state: &EngineState) -> LegalActionSet {
    let mut legal = LegalActionSet::new();
    let Some(phase) = phase(state) else {
        return legal;
    };
    let acting = state.acting_actor();
    let Some(actor) = state.actor(acting) else {
        return legal;
    };

    match phase {
        TurnPhase::Auction => {
            legal.insert(ActionName::Bid);
            legal.insert(ActionName::PassBid);
            legal.insert(ActionName::ExitAuction);
            return legal;
        }
        TurnPhase::TradeOffer => {
            legal.insert(ActionName::TradeRespond);
            return legal;
        }
        TurnPhase::PreRoll | TurnPhase::MustReroll => legal.insert(ActionName::Roll),
        TurnPhase::PostRoll | TurnPhase::JailPostRoll => legal.insert(ActionName::EndTurn),
        TurnPhase::JailPreRoll => {
            legal.insert(ActionName::Roll);
            if actor.cash >= JAIL_FINE {
                legal.insert(ActionName::PayFine);
            }
            if actor.jail_cards > 0 {
                legal.insert(ActionName::JailCard);
            }
        }
        TurnPhase::ForcedRelease => {
            // The fine is owed even without the cash; the engine settles the debt.
            legal.insert(ActionName::PayFine);
            if actor.jail_cards > 0 {
                legal.insert(ActionName::JailCard);
            }
        }
    }

    if landing_window_open(state) {
        legal.insert(ActionName::Buy);
        legal.insert(ActionName::DeclineBuy);
    }

    let management_window = !actor.in_jail && (!state.dice_rolled || state.doubles == 0);
    if management_window && state.owns_any(acting) {
        legal.insert(ActionName::Build);
        legal.insert(ActionName::SellBuilding);
        legal.insert(ActionName::Mortgage);
        legal.insert(ActionName::Unmortgage);
        legal.insert(ActionName::TradeInitiate);
    }

    legal
}

fn landing_window_open(state: &EngineState) -> bool {
    let Some(actor) = state.actor(state.turn) else {
        return false;
    };
    if !state.dice_rolled || actor.in_jail || !state.landing_pending {
        return false;
    }
    state
        .square(actor.position)
        .is_some_and(|sq| sq.is_purchasable() && sq.owner.is_none())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::board::{Actor, TradeOffer};
    use crate::test_support::table_state;

    fn set(names: &[ActionName]) -> LegalActionSet {
        names.iter().copied().collect()
    }

    const MANAGEMENT: [ActionName; 5] = [
        ActionName::Build,
        ActionName::SellBuilding,
        ActionName::Mortgage,
        ActionName::Unmortgage,
        ActionName::TradeInitiate,
    ];

    #[test]
    fn unrolled_without_holdings_allows_only_roll() {
        let state = table_state(&[1500, 1500]);
        assert_eq!(phase(&state), Some(TurnPhase::PreRoll));
        assert_eq!(resolve(&state), set(&[ActionName::Roll]));
    }

    #[test]
    fn unrolled_with_holdings_opens_management_window() {
        let mut state = table_state(&[1500, 1500]);
        state.squares[1].owner = Some(0);
        let legal = resolve(&state);
        assert!(legal.contains(ActionName::Roll));
        for name in MANAGEMENT {
            assert!(legal.contains(name), "missing {name}");
        }
        assert!(!legal.contains(ActionName::EndTurn));
    }

    #[test]
    fn pending_reroll_excludes_management() {
        for doubles in [1, 2] {
            let mut state = table_state(&[1500, 1500]);
            state.squares[1].owner = Some(0);
            state.dice_rolled = true;
            state.doubles = doubles;
            assert_eq!(phase(&state), Some(TurnPhase::MustReroll));
            assert_eq!(resolve(&state), set(&[ActionName::Roll]));
        }
    }

    #[test]
    fn landing_on_unowned_square_offers_purchase() {
        let mut state = table_state(&[1500, 1500]);
        state.dice_rolled = true;
        state.actors[0].position = 39;
        state.landing_pending = true;
        let legal = resolve(&state);
        for name in [ActionName::EndTurn, ActionName::Buy, ActionName::DeclineBuy] {
            assert!(legal.contains(name), "missing {name}");
        }
    }

    #[test]
    fn landing_window_closes_once_resolved_or_owned() {
        let mut state = table_state(&[1500, 1500]);
        state.dice_rolled = true;
        state.actors[0].position = 39;
        assert_eq!(resolve(&state), set(&[ActionName::EndTurn]));

        state.landing_pending = true;
        state.squares[39].owner = Some(1);
        assert!(!resolve(&state).contains(ActionName::Buy));
    }

    #[test]
    fn landing_window_stays_open_while_reroll_is_owed() {
        let mut state = table_state(&[1500, 1500]);
        state.dice_rolled = true;
        state.doubles = 1;
        state.actors[0].position = 6;
        state.landing_pending = true;
        assert_eq!(
            resolve(&state),
            set(&[ActionName::Roll, ActionName::Buy, ActionName::DeclineBuy])
        );
    }

    #[test]
    fn jail_without_cash_or_card_allows_only_roll() {
        let mut state = table_state(&[30, 1500]);
        state.actors[0].in_jail = true;
        state.actors[0].position = 10;
        assert_eq!(resolve(&state), set(&[ActionName::Roll]));
    }

    #[test]
    fn jail_with_cash_and_card_offers_every_release() {
        let mut state = table_state(&[50, 1500]);
        state.actors[0].in_jail = true;
        state.actors[0].jail_cards = 1;
        state.squares[1].owner = Some(0);
        assert_eq!(
            resolve(&state),
            set(&[ActionName::Roll, ActionName::JailCard, ActionName::PayFine])
        );
    }

    #[test]
    fn failed_jail_roll_ends_turn_until_attempts_run_out() {
        let mut state = table_state(&[10, 1500]);
        state.actors[0].in_jail = true;
        state.dice_rolled = true;
        state.actors[0].jail_attempts = 2;
        assert_eq!(resolve(&state), set(&[ActionName::EndTurn]));

        state.actors[0].jail_attempts = 3;
        assert_eq!(phase(&state), Some(TurnPhase::ForcedRelease));
        assert_eq!(resolve(&state), set(&[ActionName::PayFine]));

        state.actors[0].jail_cards = 1;
        assert_eq!(
            resolve(&state),
            set(&[ActionName::JailCard, ActionName::PayFine])
        );
    }

    #[test]
    fn third_double_jails_without_free_reroll() {
        let mut state = table_state(&[1500, 1500]);
        state.dice_rolled = true;
        state.doubles = 0;
        state.actors[0].in_jail = true;
        state.actors[0].position = 10;
        let legal = resolve(&state);
        assert!(!legal.contains(ActionName::Roll));
        assert_eq!(legal, set(&[ActionName::EndTurn]));
    }

    #[test]
    fn prompts_override_turn_flow() {
        let mut state = table_state(&[1500, 1500, 1500]);
        state.prompt = Some(PendingPrompt::Auction {
            square: 39,
            highest_bid: 0,
            highest_bidder: None,
            bidders: vec![0, 1, 2],
            bidder: 1,
        });
        assert_eq!(
            resolve(&state),
            set(&[ActionName::Bid, ActionName::PassBid, ActionName::ExitAuction])
        );

        state.prompt = Some(PendingPrompt::Trade(TradeOffer {
            from: 0,
            to: 2,
            offered_squares: vec![],
            requested_squares: vec![],
            offered_money: 0,
            requested_money: 0,
        }));
        assert_eq!(resolve(&state), set(&[ActionName::TradeRespond]));
    }

    #[test]
    fn resolve_is_idempotent() {
        let mut state = table_state(&[1500, 1500]);
        state.squares[5].owner = Some(0);
        state.dice_rolled = true;
        state.actors[0].position = 12;
        state.landing_pending = true;
        assert_eq!(resolve(&state), resolve(&state));
    }

    #[test]
    fn missing_actor_yields_empty_set() {
        let mut state = table_state(&[1500]);
        state.actors = Vec::<Actor>::new();
        assert!(resolve(&state).is_empty());
        assert_eq!(phase(&state), None);
    }
}
