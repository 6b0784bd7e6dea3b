//! End-to-end turn scenarios: scripted oracle, table engine, real dispatcher.

use player::core::board::{PendingPrompt, TradeOffer};
use player::core::legal::resolve;
use player::core::types::{Action, ActionName, LegalActionSet};
use player::engine::Engine;
use player::engine::table::TableEngine;
use player::io::config::TurnConfig;
use player::io::oracle::{DecisionClient, DecisionError, OracleReply, ToolCall};
use player::io::prompt::PromptBuilder;
use player::orchestrator::{
    CallbackPoint, CycleReport, DecisionSource, Notice, TurnEnd, TurnOrchestrator,
};
use player::session::{GameStop, run_game};
use player::test_support::{ScriptedOracle, call, scripted_table};
use serde_json::json;

fn orchestrator(oracle: &ScriptedOracle) -> TurnOrchestrator<&ScriptedOracle> {
    orchestrator_with(oracle, TurnConfig::default())
}

fn orchestrator_with(
    oracle: &ScriptedOracle,
    config: TurnConfig,
) -> TurnOrchestrator<&ScriptedOracle> {
    let prompts = PromptBuilder::new(20_000).expect("prompts");
    TurnOrchestrator::new(DecisionClient::new(oracle, prompts), config)
}

fn set(names: &[ActionName]) -> LegalActionSet {
    names.iter().copied().collect()
}

fn fallback_names(cycle: &CycleReport) -> Vec<ActionName> {
    cycle.fallback.iter().map(|f| f.action.name).collect()
}

fn jailed(cash: i64, attempts: u8, rolls: &[[u8; 2]]) -> TableEngine {
    let mut engine = scripted_table(&[cash, 1500], rolls.iter().copied());
    let actor = &mut engine.state_mut().actors[0];
    actor.in_jail = true;
    actor.position = 10;
    actor.jail_attempts = attempts;
    engine
}

/// Verifies a plain roll leaves only `end-turn` and asks nothing further.
#[test]
fn scenario_a_single_roll_then_end_turn_only() {
    let oracle = ScriptedOracle::new([Ok(call("roll", json!({})))]);
    let mut engine = scripted_table(&[1500, 1500], [[3, 4]]);
    let mut orchestrator = orchestrator(&oracle);

    let report = orchestrator.run_cycle(&mut engine, CallbackPoint::BeforeRoll);

    assert_eq!(report.rounds.len(), 1);
    assert!(report.rounds[0].outcome.applied);
    assert!(report.notices.is_empty());
    assert!(report.fallback.is_empty());
    assert_eq!(oracle.requests().len(), 1);
    let state = engine.state();
    assert!(state.dice_rolled);
    assert_eq!(state.doubles, 0);
    assert_eq!(resolve(state), set(&[ActionName::EndTurn]));
}

/// Verifies doubles keep `roll` legal and the third double jails the actor.
#[test]
fn scenario_b_three_doubles_send_to_jail() {
    let oracle = ScriptedOracle::new([
        Ok(call("roll", json!({}))),
        Ok(call("roll", json!({}))),
        Ok(call("roll", json!({}))),
    ]);
    let mut engine = scripted_table(&[1500, 1500], [[5, 5], [2, 2], [6, 6]]);
    let mut orchestrator = orchestrator(&oracle);

    let first = orchestrator.run_cycle(&mut engine, CallbackPoint::BeforeRoll);
    assert!(first.rounds[0].outcome.applied);
    assert_eq!(engine.state().doubles, 1);
    assert_eq!(resolve(engine.state()), set(&[ActionName::Roll]));

    orchestrator.run_cycle(&mut engine, CallbackPoint::BeforeRoll);
    assert_eq!(engine.state().doubles, 2);
    assert!(resolve(engine.state()).contains(ActionName::Roll));

    orchestrator.run_cycle(&mut engine, CallbackPoint::BeforeRoll);
    let state = engine.state();
    assert!(state.actors[0].in_jail);
    assert_eq!(state.actors[0].position, 10);
    let legal = resolve(state);
    assert!(!legal.contains(ActionName::Roll));
    assert_eq!(legal, set(&[ActionName::EndTurn]));
    assert_eq!(oracle.requests().len(), 3);
}

/// Verifies an unknown action before the roll still ends the turn, with no
/// other mutation than the fallback's roll.
#[test]
fn scenario_c_unknown_action_ends_the_turn() {
    let oracle = ScriptedOracle::new([Ok(call("teleport", json!({"square": 39})))]);
    let mut engine = scripted_table(&[1500, 1500], [[3, 4]]);
    let mut orchestrator = orchestrator(&oracle);

    let report = orchestrator.run_turn(&mut engine);

    assert_eq!(report.end, TurnEnd::Passed);
    let cycle = &report.cycles[0];
    assert_eq!(cycle.point, CallbackPoint::BeforeRoll);
    assert!(cycle.rounds.is_empty());
    match cycle.notices.as_slice() {
        [Notice::DecisionFailed { round: 1, error }] => assert!(error.contains("teleport")),
        other => panic!("unexpected notices: {other:?}"),
    }
    assert_eq!(
        fallback_names(cycle),
        vec![ActionName::Roll, ActionName::EndTurn]
    );
    assert!(cycle.fallback.iter().all(|f| f.outcome.applied));

    let state = engine.state();
    assert_eq!(state.turn, 1);
    assert_eq!(state.actors[0].position, 7);
    assert_eq!(state.actors[0].cash, 1500);
    assert!(state.squares.iter().all(|sq| sq.owner.is_none()));
}

/// Verifies one failed decision before the roll does not stop the game.
#[test]
fn transient_failure_before_roll_keeps_the_game_going() {
    let oracle = ScriptedOracle::new([
        Err(DecisionError::Transport("blip".to_string())),
        Ok(call("roll", json!({}))),
        Ok(call("end-turn", json!({}))),
    ]);
    let mut engine = scripted_table(&[1500, 1500], [[3, 4], [3, 4]]);
    let mut orchestrator = orchestrator(&oracle);

    let mut ends = Vec::new();
    let outcome = run_game(&mut engine, &mut orchestrator, 2, |run| {
        ends.push((run.report.actor, run.report.end));
        Ok(())
    })
    .expect("game");

    assert_eq!(
        outcome.stop,
        GameStop::TurnLimit {
            turns: 2,
            max_turns: 2
        }
    );
    assert_eq!(ends, vec![(0, TurnEnd::Passed), (1, TurnEnd::Passed)]);
    assert_eq!(engine.state().turn, 0);
    assert_eq!(oracle.remaining(), 0);
}

/// Verifies a jailed actor short of the fine may only roll.
#[test]
fn scenario_d_jailed_without_cash_may_only_roll() {
    let oracle = ScriptedOracle::new([Ok(call("roll", json!({})))]);
    let mut engine = jailed(30, 0, &[[1, 2]]);
    assert_eq!(resolve(engine.state()), set(&[ActionName::Roll]));

    let mut orchestrator = orchestrator(&oracle);
    let report = orchestrator.run_cycle(&mut engine, CallbackPoint::InJail);
    assert!(report.rounds[0].outcome.applied);
    let state = engine.state();
    assert!(state.actors[0].in_jail);
    assert_eq!(state.actors[0].jail_attempts, 1);
    assert_eq!(resolve(state), set(&[ActionName::EndTurn]));
}

/// Verifies the third failed jail roll forces the fine, paid by the fallback
/// when the oracle tries to end the turn.
#[test]
fn forced_release_pays_the_fine_on_fallback() {
    let oracle = ScriptedOracle::new([
        Ok(call("roll", json!({}))),
        Ok(call("end-turn", json!({}))),
    ]);
    let mut engine = jailed(30, 2, &[[1, 2]]);
    let mut orchestrator = orchestrator(&oracle);

    let report = orchestrator.run_turn(&mut engine);

    assert_eq!(report.end, TurnEnd::Passed);
    let release = &report.cycles[1];
    assert_eq!(release.point, CallbackPoint::InJail);
    assert_eq!(release.rounds.len(), 0);
    assert!(matches!(
        release.notices.as_slice(),
        [Notice::DecisionFailed { .. }]
    ));
    assert_eq!(
        fallback_names(release),
        vec![ActionName::PayFine, ActionName::EndTurn]
    );
    assert!(release.fallback.iter().all(|f| f.outcome.applied));

    let actor = &engine.state().actors[0];
    assert!(!actor.in_jail);
    assert_eq!(actor.cash, -20);
    assert_eq!(actor.position, 13);
    assert_eq!(engine.state().turn, 1);
}

/// Verifies a follow-up answer that neither rolls nor ends the turn is refused.
#[test]
fn follow_up_must_progress_the_turn() {
    let oracle = ScriptedOracle::new([
        Ok(call("roll", json!({}))),
        Ok(call("buy", json!({}))),
        Ok(call("mortgage", json!({"square": 6}))),
    ]);
    let mut engine = scripted_table(&[1500, 1500], [[2, 4]]);
    let mut orchestrator = orchestrator(&oracle);

    let report = orchestrator.run_turn(&mut engine);

    assert_eq!(report.end, TurnEnd::Passed);
    let landing = &report.cycles[1];
    assert_eq!(landing.point, CallbackPoint::AfterLanding);
    assert_eq!(landing.rounds.len(), 1);
    assert_eq!(landing.rounds[0].action.name, ActionName::Buy);
    assert_eq!(
        landing.notices,
        vec![Notice::FollowUpViolation {
            round: 2,
            action: ActionName::Mortgage
        }]
    );
    assert_eq!(fallback_names(landing), vec![ActionName::EndTurn]);

    let state = engine.state();
    assert_eq!(state.squares[6].owner, Some(0));
    assert!(!state.squares[6].mortgaged);
    assert_eq!(state.actors[0].cash, 1400);
    assert_eq!(state.turn, 1);
}

/// Verifies planned calls are held to the same follow-up rule as fresh answers.
#[test]
fn planned_follow_up_must_progress_the_turn() {
    let oracle = ScriptedOracle::new([
        Ok(call("roll", json!({}))),
        Ok(OracleReply {
            calls: vec![
                ToolCall::new("buy", json!({})),
                ToolCall::new("mortgage", json!({"square": 6})),
            ],
            rationale: None,
        }),
    ]);
    let mut engine = scripted_table(&[1500, 1500], [[2, 4]]);
    let mut orchestrator = orchestrator(&oracle);

    let report = orchestrator.run_turn(&mut engine);

    assert_eq!(report.end, TurnEnd::Passed);
    let landing = &report.cycles[1];
    let rounds: Vec<(ActionName, DecisionSource)> = landing
        .rounds
        .iter()
        .map(|r| (r.action.name, r.source))
        .collect();
    assert_eq!(rounds, vec![(ActionName::Buy, DecisionSource::Oracle)]);
    assert_eq!(
        landing.notices,
        vec![Notice::FollowUpViolation {
            round: 2,
            action: ActionName::Mortgage
        }]
    );
    assert_eq!(fallback_names(landing), vec![ActionName::EndTurn]);
    assert_eq!(orchestrator.queued(), 0);

    let state = engine.state();
    assert_eq!(state.squares[6].owner, Some(0));
    assert!(!state.squares[6].mortgaged);
    assert_eq!(state.turn, 1);
}

/// Verifies an accepted follow-up continues the same cycle.
#[test]
fn buy_then_end_turn_in_one_cycle() {
    let oracle = ScriptedOracle::new([
        Ok(call("roll", json!({}))),
        Ok(call("buy", json!({}))),
        Ok(call("end-turn", json!({}))),
    ]);
    let mut engine = scripted_table(&[1500, 1500], [[2, 4]]);
    let mut orchestrator = orchestrator(&oracle);

    let report = orchestrator.run_turn(&mut engine);

    assert_eq!(report.end, TurnEnd::Passed);
    assert_eq!(report.cycles.len(), 2);
    let names: Vec<ActionName> = report.cycles[1].rounds.iter().map(|r| r.action.name).collect();
    assert_eq!(names, vec![ActionName::Buy, ActionName::EndTurn]);
    let history: Vec<&str> = orchestrator
        .history()
        .iter()
        .flat_map(|entry| entry.actions.iter().map(String::as_str))
        .collect();
    assert_eq!(
        history,
        vec!["Rolled dice: 2, 4", "Bought property: Oriental Avenue", "Ended turn"]
    );
}

/// Verifies the round bound forces the fallback, discards leftover plans and
/// still passes the turn.
#[test]
fn round_limit_forces_fallback() {
    let oracle = ScriptedOracle::new([]);
    let mut engine = scripted_table(&[1500, 1500], [[3, 4]]);
    engine.state_mut().squares[1].owner = Some(0);
    let mut orchestrator = orchestrator_with(
        &oracle,
        TurnConfig {
            max_rounds_per_cycle: 1,
            ..TurnConfig::default()
        },
    );
    orchestrator.enqueue(0, Action::with_args(ActionName::Mortgage, json!({"square": 1})));
    orchestrator.enqueue(0, Action::with_args(ActionName::Unmortgage, json!({"square": 1})));

    let report = orchestrator.run_cycle(&mut engine, CallbackPoint::BeforeRoll);

    assert_eq!(report.rounds.len(), 1);
    assert_eq!(report.rounds[0].source, DecisionSource::Queue);
    assert_eq!(report.notices, vec![Notice::RoundLimit { limit: 1 }]);
    assert_eq!(
        fallback_names(&report),
        vec![ActionName::Roll, ActionName::EndTurn]
    );
    assert!(report.fallback.iter().all(|f| f.outcome.applied));
    assert_eq!(orchestrator.queued(), 0);
    assert!(oracle.requests().is_empty());

    let state = engine.state();
    assert!(state.squares[1].mortgaged);
    assert_eq!(state.actors[0].cash, 1530);
    assert_eq!(state.turn, 1);
}

/// Verifies planned calls from one reply are queued and run without asking again.
#[test]
fn planned_calls_run_from_the_queue() {
    let oracle = ScriptedOracle::new([
        Ok(call("roll", json!({}))),
        Ok(OracleReply {
            calls: vec![
                ToolCall::new("buy", json!({})),
                ToolCall::new("end-turn", json!({})),
            ],
            rationale: Some("cheap and central".to_string()),
        }),
    ]);
    let mut engine = scripted_table(&[1500, 1500], [[2, 4]]);
    let mut orchestrator = orchestrator(&oracle);

    let report = orchestrator.run_turn(&mut engine);

    assert_eq!(report.end, TurnEnd::Passed);
    let landing = &report.cycles[1];
    let sources: Vec<DecisionSource> = landing.rounds.iter().map(|r| r.source).collect();
    assert_eq!(sources, vec![DecisionSource::Oracle, DecisionSource::Queue]);
    assert_eq!(landing.rounds[0].rationale.as_deref(), Some("cheap and central"));
    assert_eq!(oracle.requests().len(), 2);
}

/// Verifies a malformed bid passes and hands the auction to the next bidder.
#[test]
fn auction_failure_passes_the_bid() {
    let oracle = ScriptedOracle::new([
        Ok(call("roll", json!({}))),
        Ok(call("decline-buy", json!({}))),
        Ok(call("bid", json!({"amount": "lots"}))),
    ]);
    let mut engine = scripted_table(&[1500, 1500], [[2, 4]]);
    let mut orchestrator = orchestrator(&oracle);

    let report = orchestrator.run_turn(&mut engine);

    assert_eq!(report.end, TurnEnd::Handoff);
    let auction = report.cycles.last().expect("cycle");
    assert_eq!(auction.point, CallbackPoint::Auction);
    assert_eq!(fallback_names(auction), vec![ActionName::PassBid]);
    assert!(auction.fallback[0].outcome.applied);
    match &engine.state().prompt {
        Some(PendingPrompt::Auction { bidder, square, .. }) => {
            assert_eq!(*bidder, 1);
            assert_eq!(*square, 6);
        }
        other => panic!("expected auction, got {other:?}"),
    }
    assert_eq!(
        resolve(engine.state()),
        set(&[ActionName::Bid, ActionName::PassBid, ActionName::ExitAuction])
    );
}

/// Verifies an unanswered trade offer is rejected by the fallback.
#[test]
fn trade_failure_rejects_the_offer() {
    let oracle = ScriptedOracle::new([Err(DecisionError::Transport("timeout".to_string()))]);
    let mut engine = scripted_table(&[1500, 1500], []);
    {
        let state = engine.state_mut();
        state.squares[1].owner = Some(0);
        state.squares[3].owner = Some(1);
        state.prompt = Some(PendingPrompt::Trade(TradeOffer {
            from: 0,
            to: 1,
            offered_squares: vec![1],
            requested_squares: vec![3],
            offered_money: 0,
            requested_money: 0,
        }));
    }
    assert_eq!(resolve(engine.state()), set(&[ActionName::TradeRespond]));
    let mut orchestrator = orchestrator(&oracle);

    let report = orchestrator.run_turn(&mut engine);

    assert_eq!(report.actor, 1);
    assert_eq!(report.end, TurnEnd::Handoff);
    let fallback = &report.cycles[0].fallback;
    assert_eq!(fallback.len(), 1);
    assert_eq!(
        fallback[0].action,
        Action::with_args(ActionName::TradeRespond, json!({"accept": false}))
    );
    assert!(fallback[0].outcome.applied);
    let state = engine.state();
    assert_eq!(state.prompt, None);
    assert_eq!(state.squares[1].owner, Some(0));
    assert_eq!(state.squares[3].owner, Some(1));
}
