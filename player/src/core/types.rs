//! Shared deterministic types for the turn orchestration core.
//!
//! These types define stable contracts between the resolver, the dispatcher and
//! the decision client. They carry no engine handles and serialize to stable JSON.

use std::collections::BTreeSet;
use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use thiserror::Error;

/// Fixed action catalogue.
///
/// Declaration order is the catalogue order; sets of names iterate in this order.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum ActionName {
    Roll,
    Buy,
    DeclineBuy,
    EndTurn,
    JailCard,
    PayFine,
    Build,
    SellBuilding,
    Mortgage,
    Unmortgage,
    TradeInitiate,
    TradeRespond,
    Bid,
    PassBid,
    ExitAuction,
}

impl ActionName {
    pub const ALL: [ActionName; 15] = [
        ActionName::Roll,
        ActionName::Buy,
        ActionName::DeclineBuy,
        ActionName::EndTurn,
        ActionName::JailCard,
        ActionName::PayFine,
        ActionName::Build,
        ActionName::SellBuilding,
        ActionName::Mortgage,
        ActionName::Unmortgage,
        ActionName::TradeInitiate,
        ActionName::TradeRespond,
        ActionName::Bid,
        ActionName::PassBid,
        ActionName::ExitAuction,
    ];

    pub fn as_str(self) -> &'static str {
        match self {
            ActionName::Roll => "roll",
            ActionName::Buy => "buy",
            ActionName::DeclineBuy => "decline-buy",
            ActionName::EndTurn => "end-turn",
            ActionName::JailCard => "jail-card",
            ActionName::PayFine => "pay-fine",
            ActionName::Build => "build",
            ActionName::SellBuilding => "sell-building",
            ActionName::Mortgage => "mortgage",
            ActionName::Unmortgage => "unmortgage",
            ActionName::TradeInitiate => "trade-initiate",
            ActionName::TradeRespond => "trade-respond",
            ActionName::Bid => "bid",
            ActionName::PassBid => "pass-bid",
            ActionName::ExitAuction => "exit-auction",
        }
    }

    /// `roll` and `end-turn` are the only actions that advance the turn machine.
    pub fn is_progression(self) -> bool {
        matches!(self, ActionName::Roll | ActionName::EndTurn)
    }

    /// Actions after which turn progression may still be owed.
    ///
    /// Roll and end-turn drive their own flow; trade and auction actions are
    /// continued by the engine prompting the next participant.
    pub fn may_continue(self) -> bool {
        matches!(
            self,
            ActionName::Buy
                | ActionName::DeclineBuy
                | ActionName::Build
                | ActionName::SellBuilding
                | ActionName::Mortgage
                | ActionName::Unmortgage
                | ActionName::PayFine
                | ActionName::JailCard
        )
    }

    /// Actions whose target is a single square index.
    pub fn targets_square(self) -> bool {
        matches!(
            self,
            ActionName::Build
                | ActionName::SellBuilding
                | ActionName::Mortgage
                | ActionName::Unmortgage
        )
    }
}

impl fmt::Display for ActionName {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A name that is not part of the action catalogue.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("unknown action '{0}'")]
pub struct UnknownAction(pub String);

impl FromStr for ActionName {
    type Err = UnknownAction;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        ActionName::ALL
            .into_iter()
            .find(|name| name.as_str() == s)
            .ok_or_else(|| UnknownAction(s.to_string()))
    }
}

/// Proposed action: a catalogue name plus its argument object.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Action {
    pub name: ActionName,
    #[serde(default)]
    pub args: Map<String, Value>,
}

impl Action {
    pub fn new(name: ActionName) -> Self {
        Self {
            name,
            args: Map::new(),
        }
    }

    /// Build an action from a JSON value; anything but an object yields empty args.
    pub fn with_args(name: ActionName, args: Value) -> Self {
        let args = match args {
            Value::Object(map) => map,
            _ => Map::new(),
        };
        Self { name, args }
    }

    pub fn end_turn() -> Self {
        Self::new(ActionName::EndTurn)
    }
}

impl fmt::Display for Action {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.args.is_empty() {
            write!(f, "{}", self.name)
        } else {
            write!(f, "{}({})", self.name, Value::Object(self.args.clone()))
        }
    }
}

/// Set of actions permitted at one instant. Recomputed on demand, never cached.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct LegalActionSet(BTreeSet<ActionName>);

impl LegalActionSet {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(&mut self, name: ActionName) {
        self.0.insert(name);
    }

    pub fn contains(&self, name: ActionName) -> bool {
        self.0.contains(&name)
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = ActionName> + '_ {
        self.0.iter().copied()
    }

    /// True when `roll` or `end-turn` is still available.
    pub fn needs_progression(&self) -> bool {
        self.contains(ActionName::Roll) || self.contains(ActionName::EndTurn)
    }

    pub fn to_vec(&self) -> Vec<ActionName> {
        self.iter().collect()
    }
}

impl FromIterator<ActionName> for LegalActionSet {
    fn from_iter<I: IntoIterator<Item = ActionName>>(iter: I) -> Self {
        Self(iter.into_iter().collect())
    }
}

impl fmt::Display for LegalActionSet {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let names: Vec<&str> = self.iter().map(ActionName::as_str).collect();
        write!(f, "{{{}}}", names.join(", "))
    }
}

/// Why the dispatcher did not apply an action.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum Rejection {
    /// The action is absent from the legal set resolved at dispatch time.
    NotLegal { action: ActionName },
    /// Arguments are missing, mistyped or out of range.
    InvalidArgument { message: String },
    /// The target square is not owned by the acting actor.
    NotOwner { square: usize, owner: Option<usize> },
    /// The engine refused the operation.
    Engine { reason: String },
}

impl fmt::Display for Rejection {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Rejection::NotLegal { action } => write!(f, "'{action}' is not legal now"),
            Rejection::InvalidArgument { message } => write!(f, "invalid argument: {message}"),
            Rejection::NotOwner { square, owner } => match owner {
                Some(owner) => write!(f, "square {square} is owned by actor {owner}"),
                None => write!(f, "square {square} is unowned"),
            },
            Rejection::Engine { reason } => write!(f, "engine refused: {reason}"),
        }
    }
}

/// Result of dispatching one action.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ActionOutcome {
    pub applied: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub rejection: Option<Rejection>,
}

impl ActionOutcome {
    pub fn success() -> Self {
        Self {
            applied: true,
            rejection: None,
        }
    }

    pub fn rejected(rejection: Rejection) -> Self {
        Self {
            applied: false,
            rejection: Some(rejection),
        }
    }
}
