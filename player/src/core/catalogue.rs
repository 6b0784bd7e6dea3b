//! Tool catalogue advertised to the decision oracle.
//!
//! One entry per [`ActionName`], each carrying a JSON-Schema parameter object. The
//! same schemas validate the arguments of every decision before dispatch.

use serde::Serialize;
use serde_json::{Value, json};

use crate::core::types::{ActionName, LegalActionSet};

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ToolSpec {
    pub name: ActionName,
    pub description: &'static str,
    pub parameters: Value,
}

/// Full catalogue in catalogue order.
pub fn catalogue() -> Vec<ToolSpec> {
    ActionName::ALL.into_iter().map(tool_spec).collect()
}

/// Catalogue restricted to the actions in `legal`.
pub fn for_legal(legal: &LegalActionSet) -> Vec<ToolSpec> {
    legal.iter().map(tool_spec).collect()
}

pub fn tool_spec(name: ActionName) -> ToolSpec {
    ToolSpec {
        name,
        description: description(name),
        parameters: parameters(name),
    }
}

fn description(name: ActionName) -> &'static str {
    match name {
        ActionName::Roll => "Roll the dice to move your token",
        ActionName::Buy => "Buy the property you landed on",
        ActionName::DeclineBuy => "Decline to buy the property you landed on; it goes to auction",
        ActionName::EndTurn => "End your turn",
        ActionName::JailCard => "Use your Get Out of Jail Free card",
        ActionName::PayFine => "Pay $50 to get out of jail",
        ActionName::Build => "Buy a house (or hotel) for a property in a buildable monopoly",
        ActionName::SellBuilding => "Sell a house from a property",
        ActionName::Mortgage => "Mortgage a property",
        ActionName::Unmortgage => "Unmortgage a property",
        ActionName::TradeInitiate => "Initiate a trade with another player",
        ActionName::TradeRespond => "Accept or reject the pending trade offer",
        ActionName::Bid => "Place a bid in an auction",
        ActionName::PassBid => "Pass on bidding in this round of the auction",
        ActionName::ExitAuction => "Exit the auction entirely",
    }
}

fn no_parameters() -> Value {
    json!({
        "type": "object",
        "properties": {},
        "additionalProperties": false
    })
}

fn square_parameter() -> Value {
    json!({
        "type": "object",
        "properties": {
            "square": {
                "type": "integer",
                "minimum": 0,
                "maximum": 39,
                "description": "The index of the property (0-39)"
            }
        },
        "required": ["square"],
        "additionalProperties": false
    })
}

fn parameters(name: ActionName) -> Value {
    match name {
        ActionName::Build
        | ActionName::SellBuilding
        | ActionName::Mortgage
        | ActionName::Unmortgage => square_parameter(),
        ActionName::TradeInitiate => json!({
            "type": "object",
            "properties": {
                "recipient": {
                    "type": "integer",
                    "minimum": 0,
                    "description": "The index of the player to trade with"
                },
                "offered_squares": {
                    "type": "array",
                    "items": { "type": "integer", "minimum": 0, "maximum": 39 },
                    "description": "Indexes of properties to offer"
                },
                "requested_squares": {
                    "type": "array",
                    "items": { "type": "integer", "minimum": 0, "maximum": 39 },
                    "description": "Indexes of properties to request"
                },
                "offered_money": {
                    "type": "integer",
                    "minimum": 0,
                    "description": "Amount of money to offer"
                },
                "requested_money": {
                    "type": "integer",
                    "minimum": 0,
                    "description": "Amount of money to request"
                }
            },
            "required": ["recipient"],
            "additionalProperties": false
        }),
        ActionName::TradeRespond => json!({
            "type": "object",
            "properties": {
                "accept": {
                    "type": "boolean",
                    "description": "True to accept, false to reject"
                }
            },
            "required": ["accept"],
            "additionalProperties": false
        }),
        ActionName::Bid => json!({
            "type": "object",
            "properties": {
                "amount": {
                    "type": "integer",
                    "minimum": 0,
                    "description": "Bid amount"
                }
            },
            "required": ["amount"],
            "additionalProperties": false
        }),
        ActionName::Roll
        | ActionName::Buy
        | ActionName::DeclineBuy
        | ActionName::EndTurn
        | ActionName::JailCard
        | ActionName::PayFine
        | ActionName::PassBid
        | ActionName::ExitAuction => no_parameters(),
    }
}
