//! Action dispatch: validate a proposed action against the live state, apply it
//! through the engine, and record what happened.
//!
//! Legality is resolved again from the engine's current state on every call, so a
//! set computed before an earlier mutation can never gate this one.

use serde_json::{Map, Value};
use tracing::{debug, info, instrument, warn};

use crate::core::board::{BOARD_SIZE, EngineState, JAIL_FINE, PendingPrompt};
use crate::core::history::TurnHistory;
use crate::core::legal::resolve;
use crate::core::types::{Action, ActionName, ActionOutcome, Rejection};
use crate::engine::{Engine, Refusal, TradeTerms};

/// Apply `action` for the acting actor.
///
/// Returns `applied = false` with a [`Rejection`] when the action is not legal now,
/// its arguments are invalid, or the engine refuses it. Only applied actions reach
/// the history.
#[instrument(skip_all, fields(action = %action.name))]
pub fn dispatch<E: Engine + ?Sized>(
    action: &Action,
    engine: &mut E,
    history: &mut TurnHistory,
) -> ActionOutcome {
    let state = engine.state();
    let acting = state.acting_actor();
    let legal = resolve(state);
    if !legal.contains(action.name) {
        warn!(acting, legal = %legal, "action not legal, skipping engine call");
        return ActionOutcome::rejected(Rejection::NotLegal {
            action: action.name,
        });
    }

    let command = match Command::parse(action, state, acting) {
        Ok(command) => command,
        Err(rejection) => {
            warn!(acting, rejection = %rejection, "action arguments rejected");
            return ActionOutcome::rejected(rejection);
        }
    };
    // Describe the target before the mutation moves it (e.g. an auction ending).
    let pending_summary = command.describe(state);
    let actor_name = state
        .actor(acting)
        .map(|a| a.name.clone())
        .unwrap_or_default();

    debug!(acting, "invoking engine operation");
    if let Err(refusal) = command.apply(engine) {
        warn!(acting, reason = %refusal, "engine refused action");
        return ActionOutcome::rejected(Rejection::Engine {
            reason: refusal.reason,
        });
    }

    let summary = match command {
        Command::Roll => roll_summary(engine.state()),
        _ => pending_summary,
    };
    info!(acting, summary = %summary, "action applied");
    history.record(acting, &actor_name, summary);
    if action.name == ActionName::EndTurn {
        history.close_turn();
    }
    ActionOutcome::success()
}

/// A validated action with typed arguments.
#[derive(Debug, Clone, PartialEq, Eq)]
enum Command {
    Roll,
    Buy,
    DeclineBuy,
    EndTurn,
    JailCard,
    PayFine,
    Build(usize),
    SellBuilding(usize),
    Mortgage(usize),
    Unmortgage(usize),
    TradeInitiate(TradeTerms),
    TradeRespond(bool),
    Bid(u32),
    PassBid,
    ExitAuction,
}

impl Command {
    fn parse(action: &Action, state: &EngineState, acting: usize) -> Result<Self, Rejection> {
        let args = &action.args;
        let command = match action.name {
            ActionName::Roll => Command::Roll,
            ActionName::Buy => Command::Buy,
            ActionName::DeclineBuy => Command::DeclineBuy,
            ActionName::EndTurn => Command::EndTurn,
            ActionName::JailCard => Command::JailCard,
            ActionName::PayFine => Command::PayFine,
            ActionName::Build => Command::Build(owned_square(args, state, acting)?),
            ActionName::SellBuilding => {
                Command::SellBuilding(owned_square(args, state, acting)?)
            }
            ActionName::Mortgage => Command::Mortgage(owned_square(args, state, acting)?),
            ActionName::Unmortgage => Command::Unmortgage(owned_square(args, state, acting)?),
            ActionName::TradeInitiate => {
                Command::TradeInitiate(trade_terms(args, state, acting)?)
            }
            ActionName::TradeRespond => {
                let accept = args
                    .get("accept")
                    .and_then(Value::as_bool)
                    .ok_or_else(|| invalid("trade-respond requires boolean 'accept'"))?;
                Command::TradeRespond(accept)
            }
            ActionName::Bid => Command::Bid(money(args, "amount")?.ok_or_else(|| {
                invalid("bid requires non-negative integer 'amount'")
            })?),
            ActionName::PassBid => Command::PassBid,
            ActionName::ExitAuction => Command::ExitAuction,
        };
        Ok(command)
    }

    fn apply<E: Engine + ?Sized>(&self, engine: &mut E) -> Result<(), Refusal> {
        match self {
            Command::Roll => engine.roll(),
            Command::Buy => engine.buy_property(),
            Command::DeclineBuy => engine.decline_buy_property(),
            Command::EndTurn => engine.end_turn(),
            Command::JailCard => engine.use_jail_card(),
            Command::PayFine => engine.pay_jail_fine(),
            Command::Build(square) => engine.build(*square),
            Command::SellBuilding(square) => engine.sell_building(*square),
            Command::Mortgage(square) => engine.mortgage(*square),
            Command::Unmortgage(square) => engine.unmortgage(*square),
            Command::TradeInitiate(terms) => engine.initiate_trade(terms.clone()),
            Command::TradeRespond(accept) => engine.respond_to_trade(*accept),
            Command::Bid(amount) => engine.place_bid(*amount),
            Command::PassBid => engine.pass_bid(),
            Command::ExitAuction => engine.exit_auction(),
        }
    }

    /// History line for this command, phrased against the pre-mutation state.
    fn describe(&self, state: &EngineState) -> String {
        let square_name = |index: usize| {
            state
                .square(index)
                .map(|sq| sq.name.clone())
                .unwrap_or_else(|| format!("square {index}"))
        };
        let current = || {
            state
                .actor(state.turn)
                .map(|a| square_name(a.position))
                .unwrap_or_default()
        };
        match self {
            Command::Roll => "Rolled dice".to_string(),
            Command::Buy => format!("Bought property: {}", current()),
            Command::DeclineBuy => format!("Declined to buy: {}", current()),
            Command::EndTurn => "Ended turn".to_string(),
            Command::JailCard => "Used get out of jail free card".to_string(),
            Command::PayFine => format!("Paid ${JAIL_FINE} jail fine"),
            Command::Build(square) => format!("Built on {}", square_name(*square)),
            Command::SellBuilding(square) => {
                format!("Sold building on {}", square_name(*square))
            }
            Command::Mortgage(square) => format!("Mortgaged {}", square_name(*square)),
            Command::Unmortgage(square) => format!("Unmortgaged {}", square_name(*square)),
            Command::TradeInitiate(terms) => {
                let recipient = state
                    .actor(terms.recipient)
                    .map(|a| a.name.as_str())
                    .unwrap_or("?");
                format!("Proposed trade to {recipient}")
            }
            Command::TradeRespond(true) => "Accepted trade".to_string(),
            Command::TradeRespond(false) => "Rejected trade".to_string(),
            Command::Bid(amount) => match &state.prompt {
                Some(PendingPrompt::Auction { square, .. }) => {
                    format!("Bid ${amount} on {}", square_name(*square))
                }
                _ => format!("Bid ${amount}"),
            },
            Command::PassBid => "Passed on bid".to_string(),
            Command::ExitAuction => "Left auction".to_string(),
        }
    }
}

fn roll_summary(state: &EngineState) -> String {
    match state.last_roll {
        Some([a, b]) => format!("Rolled dice: {a}, {b}"),
        None => "Rolled dice".to_string(),
    }
}

fn invalid(message: impl Into<String>) -> Rejection {
    Rejection::InvalidArgument {
        message: message.into(),
    }
}

fn square_index(value: &Value, field: &str) -> Result<usize, Rejection> {
    value
        .as_u64()
        .and_then(|n| usize::try_from(n).ok())
        .filter(|n| *n < BOARD_SIZE)
        .ok_or_else(|| invalid(format!("'{field}' must be a square index in [0, {BOARD_SIZE})")))
}

/// The `square` argument, which must be owned by `acting`.
fn owned_square(
    args: &Map<String, Value>,
    state: &EngineState,
    acting: usize,
) -> Result<usize, Rejection> {
    let square = square_index(args.get("square").unwrap_or(&Value::Null), "square")?;
    let owner = state.square(square).and_then(|sq| sq.owner);
    if owner != Some(acting) {
        return Err(Rejection::NotOwner { square, owner });
    }
    Ok(square)
}

/// Optional non-negative money field. Missing or null is `None`.
fn money(args: &Map<String, Value>, field: &str) -> Result<Option<u32>, Rejection> {
    match args.get(field) {
        None | Some(Value::Null) => Ok(None),
        Some(value) => value
            .as_u64()
            .and_then(|n| u32::try_from(n).ok())
            .map(Some)
            .ok_or_else(|| invalid(format!("'{field}' must be a non-negative integer"))),
    }
}

fn square_list(args: &Map<String, Value>, field: &str) -> Result<Vec<usize>, Rejection> {
    match args.get(field) {
        None | Some(Value::Null) => Ok(Vec::new()),
        Some(Value::Array(items)) => items
            .iter()
            .map(|item| square_index(item, field))
            .collect(),
        Some(_) => Err(invalid(format!("'{field}' must be an array of square indices"))),
    }
}

fn trade_terms(
    args: &Map<String, Value>,
    state: &EngineState,
    acting: usize,
) -> Result<TradeTerms, Rejection> {
    let recipient = args
        .get("recipient")
        .and_then(Value::as_u64)
        .and_then(|n| usize::try_from(n).ok())
        .ok_or_else(|| invalid("trade-initiate requires integer 'recipient'"))?;
    let seated = state.actor(recipient).is_some_and(|a| !a.bankrupt);
    if recipient == acting || !seated {
        return Err(invalid(format!(
            "recipient {recipient} is not another seated actor"
        )));
    }
    Ok(TradeTerms {
        recipient,
        offered_squares: square_list(args, "offered_squares")?,
        requested_squares: square_list(args, "requested_squares")?,
        offered_money: money(args, "offered_money")?.unwrap_or(0),
        requested_money: money(args, "requested_money")?.unwrap_or(0),
    })
}
