//! Decision protocol client.
//!
//! The [`Oracle`] trait decouples the orchestrator from the decision backend
//! (an agent command or a chat-completions endpoint). Tests use scripted oracles
//! that return predetermined replies without spawning processes or opening sockets.

use std::sync::atomic::{AtomicBool, Ordering};

use jsonschema::validator_for;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use thiserror::Error;
use tracing::{debug, instrument, warn};

use crate::core::catalogue::{ToolSpec, for_legal, tool_spec};
use crate::core::snapshot::GameStateSnapshot;
use crate::core::types::{Action, ActionName, LegalActionSet};
use crate::io::prompt::PromptBuilder;

/// Why a decision could not be obtained.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum DecisionError {
    #[error("a decision request is already in flight")]
    Busy,
    #[error("oracle transport failed: {0}")]
    Transport(String),
    #[error("malformed oracle response: {0}")]
    Malformed(String),
    #[error("action '{0}' is outside the offered catalogue")]
    OutsideCatalogue(String),
    #[error("prompt rendering failed: {0}")]
    Prompt(String),
}

/// One request sent to the oracle.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct OracleRequest {
    pub acting: usize,
    pub system: String,
    pub user: String,
    /// Tools restricted to the legal set at request time.
    pub tools: Vec<ToolSpec>,
}

/// A tool selection as returned by the oracle, before validation.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ToolCall {
    pub name: String,
    #[serde(default)]
    pub arguments: Value,
}

impl ToolCall {
    pub fn new(name: &str, arguments: Value) -> Self {
        Self {
            name: name.to_string(),
            arguments,
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct OracleReply {
    /// Tool calls in the order the oracle made them; may be empty.
    pub calls: Vec<ToolCall>,
    pub rationale: Option<String>,
}

/// Abstraction over decision backends.
pub trait Oracle {
    fn decide(&self, request: &OracleRequest) -> Result<OracleReply, DecisionError>;
}

impl<T: Oracle + ?Sized> Oracle for &T {
    fn decide(&self, request: &OracleRequest) -> Result<OracleReply, DecisionError> {
        (**self).decide(request)
    }
}

impl<T: Oracle + ?Sized> Oracle for Box<T> {
    fn decide(&self, request: &OracleRequest) -> Result<OracleReply, DecisionError> {
        (**self).decide(request)
    }
}

/// A validated decision.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Decision {
    pub action: Action,
    /// Further actions the oracle chose in the same reply, to be queued.
    pub planned: Vec<Action>,
    pub rationale: Option<String>,
}

/// Releases the in-flight flag on drop.
pub(crate) struct InFlightGuard<'a> {
    flag: &'a AtomicBool,
}

impl Drop for InFlightGuard<'_> {
    fn drop(&mut self) {
        self.flag.store(false, Ordering::Release);
    }
}

/// Turns snapshots into oracle requests and oracle replies into actions.
pub struct DecisionClient<O> {
    oracle: O,
    prompts: PromptBuilder,
    in_flight: AtomicBool,
}

impl<O: Oracle> DecisionClient<O> {
    pub fn new(oracle: O, prompts: PromptBuilder) -> Self {
        Self {
            oracle,
            prompts,
            in_flight: AtomicBool::new(false),
        }
    }

    pub fn oracle(&self) -> &O {
        &self.oracle
    }

    /// Claim the single in-flight slot.
    pub(crate) fn try_begin(&self) -> Result<InFlightGuard<'_>, DecisionError> {
        self.in_flight
            .compare_exchange(false, true, Ordering::AcqRel, Ordering::Acquire)
            .map_err(|_| DecisionError::Busy)?;
        Ok(InFlightGuard {
            flag: &self.in_flight,
        })
    }

    /// Ask the oracle for the acting actor's next action.
    #[instrument(skip_all, fields(acting = snapshot.acting, legal = %legal))]
    pub fn request_decision(
        &self,
        snapshot: &GameStateSnapshot,
        legal: &LegalActionSet,
    ) -> Result<Decision, DecisionError> {
        let _guard = self.try_begin()?;

        let request = OracleRequest {
            acting: snapshot.acting,
            system: self
                .prompts
                .system_prompt()
                .map_err(|err| DecisionError::Prompt(format!("{err:#}")))?,
            user: self
                .prompts
                .turn_prompt(snapshot)
                .map_err(|err| DecisionError::Prompt(format!("{err:#}")))?,
            tools: for_legal(legal),
        };
        debug!(user_bytes = request.user.len(), tools = request.tools.len(), "requesting decision");

        let reply = self.oracle.decide(&request).inspect_err(|err| {
            warn!(err = %err, "oracle request failed");
        })?;
        let decision = interpret_reply(reply, legal)?;
        debug!(action = %decision.action, planned = decision.planned.len(), "decision received");
        Ok(decision)
    }
}

/// Validate a reply: the first call is the decision and must be in the offered
/// catalogue; later calls become planned actions. No call means `end-turn`.
pub fn interpret_reply(
    reply: OracleReply,
    legal: &LegalActionSet,
) -> Result<Decision, DecisionError> {
    let mut calls = reply.calls.into_iter();
    let Some(first) = calls.next() else {
        debug!("no tool call, ending turn");
        return Ok(Decision {
            action: Action::end_turn(),
            planned: Vec::new(),
            rationale: reply.rationale,
        });
    };

    let action = parse_call(first)?;
    if !legal.contains(action.name) {
        return Err(DecisionError::OutsideCatalogue(action.name.to_string()));
    }
    let planned = calls.map(parse_call).collect::<Result<Vec<_>, _>>()?;

    Ok(Decision {
        action,
        planned,
        rationale: reply.rationale,
    })
}

/// Resolve a tool call to a catalogue action with schema-checked arguments.
pub fn parse_call(call: ToolCall) -> Result<Action, DecisionError> {
    let name: ActionName = call
        .name
        .parse()
        .map_err(|_| DecisionError::OutsideCatalogue(call.name.clone()))?;
    let arguments = match call.arguments {
        Value::Null => Value::Object(Default::default()),
        other => other,
    };
    validate_arguments(name, &arguments)?;
    Ok(Action::with_args(name, arguments))
}

fn validate_arguments(name: ActionName, arguments: &Value) -> Result<(), DecisionError> {
    let schema = tool_spec(name).parameters;
    let compiled = validator_for(&schema)
        .map_err(|err| DecisionError::Malformed(format!("invalid {name} schema: {err}")))?;
    let messages: Vec<String> = compiled
        .iter_errors(arguments)
        .map(|err| err.to_string())
        .collect();
    if !messages.is_empty() {
        return Err(DecisionError::Malformed(format!(
            "{name} arguments: {}",
            messages.join("; ")
        )));
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::history::TurnHistory;
    use crate::test_support::{ScriptedOracle, call, table_state};
    use serde_json::json;

    fn client(oracle: &ScriptedOracle) -> DecisionClient<&ScriptedOracle> {
        DecisionClient::new(oracle, PromptBuilder::new(20_000).expect("prompts"))
    }

    fn unrolled() -> (GameStateSnapshot, LegalActionSet) {
        let state = table_state(&[1500, 1500]);
        let snapshot = GameStateSnapshot::build(&state, &TurnHistory::new(), 5);
        let legal = crate::core::legal::resolve(&state);
        (snapshot, legal)
    }

    #[test]
    fn request_carries_prompt_and_restricted_catalogue() {
        let oracle = ScriptedOracle::new([Ok(call("roll", json!({})))]);
        let (snapshot, legal) = unrolled();
        let decision = client(&oracle)
            .request_decision(&snapshot, &legal)
            .expect("decision");
        assert_eq!(decision.action.name, ActionName::Roll);

        let requests = oracle.requests();
        assert_eq!(requests.len(), 1);
        let tools: Vec<ActionName> = requests[0].tools.iter().map(|t| t.name).collect();
        assert_eq!(tools, vec![ActionName::Roll]);
        assert!(requests[0].system.contains("Turn Flow Rules"));
        assert!(requests[0].user.contains("# Available Actions:"));
    }

    #[test]
    fn empty_reply_is_implicit_end_turn() {
        let oracle = ScriptedOracle::new([Ok(OracleReply {
            calls: Vec::new(),
            rationale: Some("nothing to do".to_string()),
        })]);
        let (snapshot, legal) = unrolled();
        let decision = client(&oracle)
            .request_decision(&snapshot, &legal)
            .expect("decision");
        assert_eq!(decision.action, Action::end_turn());
        assert_eq!(decision.rationale.as_deref(), Some("nothing to do"));
    }

    #[test]
    fn unknown_or_illegal_names_are_outside_catalogue() {
        let (_, legal) = unrolled();
        let err = interpret_reply(call("teleport", json!({})), &legal).unwrap_err();
        assert_eq!(err, DecisionError::OutsideCatalogue("teleport".to_string()));

        let err = interpret_reply(call("buy", json!({})), &legal).unwrap_err();
        assert_eq!(err, DecisionError::OutsideCatalogue("buy".to_string()));
    }

    #[test]
    fn schema_violating_arguments_are_malformed() {
        let legal: LegalActionSet = [ActionName::Build].into_iter().collect();
        let err = interpret_reply(call("build", json!({"square": 40})), &legal).unwrap_err();
        assert!(matches!(err, DecisionError::Malformed(_)), "{err:?}");
        let err = interpret_reply(call("build", json!({})), &legal).unwrap_err();
        assert!(matches!(err, DecisionError::Malformed(_)), "{err:?}");
    }

    #[test]
    fn extra_calls_become_planned_actions() {
        let legal: LegalActionSet = [ActionName::Buy, ActionName::EndTurn].into_iter().collect();
        let reply = OracleReply {
            calls: vec![
                ToolCall::new("buy", json!({})),
                ToolCall::new("build", json!({"square": 39})),
                ToolCall::new("end-turn", Value::Null),
            ],
            rationale: None,
        };
        let decision = interpret_reply(reply, &legal).expect("decision");
        assert_eq!(decision.action.name, ActionName::Buy);
        let planned: Vec<ActionName> = decision.planned.iter().map(|a| a.name).collect();
        assert_eq!(planned, vec![ActionName::Build, ActionName::EndTurn]);
    }

    #[test]
    fn overlapping_request_is_busy() {
        let oracle = ScriptedOracle::new([Ok(call("roll", json!({})))]);
        let client = client(&oracle);
        let (snapshot, legal) = unrolled();

        let guard = client.try_begin().expect("first claim");
        let err = client.request_decision(&snapshot, &legal).unwrap_err();
        assert_eq!(err, DecisionError::Busy);
        assert!(oracle.requests().is_empty());

        drop(guard);
        assert!(client.request_decision(&snapshot, &legal).is_ok());
    }

    #[test]
    fn transport_errors_pass_through() {
        let oracle = ScriptedOracle::new([Err(DecisionError::Transport("down".to_string()))]);
        let (snapshot, legal) = unrolled();
        let err = client(&oracle)
            .request_decision(&snapshot, &legal)
            .unwrap_err();
        assert_eq!(err, DecisionError::Transport("down".to_string()));
    }
}
