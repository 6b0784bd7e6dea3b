//! Oracle-driven board game player.
//!
//! Seats one decision oracle per player at a reference table engine and plays
//! turns, writing per-turn logs when asked.

use std::fs;
use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use chrono::Utc;
use clap::{Parser, Subcommand};
use serde::Serialize;

use player::core::board::EngineState;
use player::core::catalogue::catalogue;
use player::core::legal::{TurnPhase, phase, resolve};
use player::core::types::ActionName;
use player::engine::dice::RandomDice;
use player::engine::table::TableEngine;
use player::exit_codes;
use player::io::chat::ChatOracle;
use player::io::command::CommandOracle;
use player::io::config::{
    DEFAULT_CONFIG_PATH, OracleConfig, OracleKind, PlayerConfig, load_config, write_config,
};
use player::io::oracle::{DecisionClient, Oracle};
use player::io::prompt::PromptBuilder;
use player::io::turn_log::{TurnMeta, TurnWriteRequest, write_turn};
use player::logging;
use player::orchestrator::TurnOrchestrator;
use player::session::{GameStop, SeatOracles, TurnRun, run_game};

const ORACLE_WORK_DIR: &str = ".player/oracle";

#[derive(Parser)]
#[command(
    name = "player",
    version,
    about = "Oracle-driven player for a property-trading board game"
)]
struct Cli {
    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Write a default `player.toml` if missing.
    Init {
        /// Overwrite an existing config.
        #[arg(short, long)]
        force: bool,
        #[arg(long, default_value = DEFAULT_CONFIG_PATH)]
        config: PathBuf,
    },
    /// Print the action catalogue with parameter schemas as JSON.
    Catalogue,
    /// Print the turn phase and legal actions for an engine state JSON file.
    Legal {
        state: PathBuf,
    },
    /// Play a game with one oracle per seat.
    Play {
        #[arg(long, default_value = DEFAULT_CONFIG_PATH)]
        config: PathBuf,
        /// Override `game.max_turns`.
        #[arg(long)]
        turns: Option<u32>,
        /// Write per-turn logs under this directory.
        #[arg(long)]
        log_dir: Option<PathBuf>,
    },
}

fn main() {
    logging::init();
    match run() {
        Ok(code) => std::process::exit(code),
        Err(err) => {
            eprintln!("{:#}", err);
            std::process::exit(exit_codes::INVALID);
        }
    }
}

fn run() -> Result<i32> {
    let cli = Cli::parse();
    match cli.command {
        Command::Init { force, config } => cmd_init(&config, force),
        Command::Catalogue => cmd_catalogue(),
        Command::Legal { state } => cmd_legal(&state),
        Command::Play {
            config,
            turns,
            log_dir,
        } => cmd_play(&config, turns, log_dir.as_deref()),
    }
}

fn cmd_init(path: &Path, force: bool) -> Result<i32> {
    if !force && path.exists() {
        println!("{} already exists (use --force to overwrite)", path.display());
        return Ok(exit_codes::OK);
    }
    write_config(path, &PlayerConfig::default())?;
    println!("wrote {}", path.display());
    Ok(exit_codes::OK)
}

fn cmd_catalogue() -> Result<i32> {
    print_json(&catalogue())?;
    Ok(exit_codes::OK)
}

#[derive(Serialize)]
struct LegalReport {
    acting: usize,
    phase: Option<TurnPhase>,
    legal: Vec<ActionName>,
}

fn cmd_legal(path: &Path) -> Result<i32> {
    let raw = fs::read_to_string(path).with_context(|| format!("read {}", path.display()))?;
    let state: EngineState =
        serde_json::from_str(&raw).with_context(|| format!("parse {}", path.display()))?;
    print_json(&LegalReport {
        acting: state.acting_actor(),
        phase: phase(&state),
        legal: resolve(&state).to_vec(),
    })?;
    Ok(exit_codes::OK)
}

fn cmd_play(config_path: &Path, turns: Option<u32>, log_dir: Option<&Path>) -> Result<i32> {
    let cfg = load_config(config_path)?;
    let max_turns = turns.unwrap_or(cfg.game.max_turns);
    let seats = (0..cfg.game.seats.len())
        .map(|seat| build_oracle(&cfg.oracle, seat))
        .collect::<Result<Vec<_>>>()?;

    let prompts = PromptBuilder::new(cfg.turn.prompt_budget_bytes)?;
    let client = DecisionClient::new(SeatOracles::new(seats), prompts);
    let mut orchestrator = TurnOrchestrator::new(client, cfg.turn.clone());
    let mut engine = TableEngine::new(
        &cfg.game.seats,
        cfg.game.starting_cash,
        Box::new(RandomDice::new(cfg.game.seed)),
    );

    let game_id = format!("game-{}", Utc::now().format("%Y%m%dT%H%M%SZ"));
    let outcome = run_game(&mut engine, &mut orchestrator, max_turns, |run| {
        print_run(run);
        match log_dir {
            Some(root) => log_run(root, &game_id, run),
            None => Ok(()),
        }
    })?;

    println!(
        "{} turns played in {} runs: {:?}",
        outcome.turns_played, outcome.runs, outcome.stop
    );
    Ok(match outcome.stop {
        GameStop::TurnLimit { .. } => exit_codes::TURN_LIMIT,
        GameStop::Stalled { .. } => exit_codes::STALLED,
        GameStop::LastStanding { .. } => exit_codes::OK,
    })
}

fn build_oracle(cfg: &OracleConfig, seat: usize) -> Result<Box<dyn Oracle>> {
    match cfg.kind {
        OracleKind::Command => {
            let work_dir = Path::new(ORACLE_WORK_DIR).join(format!("seat-{seat}"));
            let oracle = CommandOracle::new(cfg, &work_dir)
                .with_context(|| format!("set up command oracle for seat {seat}"))?;
            Ok(Box::new(oracle))
        }
        OracleKind::Chat => {
            let oracle = ChatOracle::new(&cfg.chat)
                .with_context(|| format!("set up chat oracle for seat {seat}"))?;
            Ok(Box::new(oracle))
        }
    }
}

fn actor_name(state: &EngineState, index: usize) -> String {
    state
        .actor(index)
        .map(|actor| actor.name.clone())
        .unwrap_or_else(|| format!("seat {index}"))
}

fn print_run(run: &TurnRun<'_>) {
    let report = run.report;
    let applied: Vec<String> = report
        .cycles
        .iter()
        .flat_map(|cycle| cycle.applied_actions())
        .map(ToString::to_string)
        .collect();
    println!(
        "#{} {}: {:?} [{}]",
        run.index,
        actor_name(run.state_before, report.actor),
        report.end,
        applied.join(", ")
    );
}

fn log_run(root: &Path, game_id: &str, run: &TurnRun<'_>) -> Result<()> {
    let report = run.report;
    let meta = TurnMeta {
        game_id: game_id.to_string(),
        index: run.index,
        actor: report.actor,
        actor_name: actor_name(run.state_before, report.actor),
        end: report.end,
        cycles: report.cycles.len(),
        actions_applied: report.actions_applied(),
        notices: report.cycles.iter().map(|c| c.notices.len()).sum(),
        started_at: Some(run.started_at.clone()),
        ended_at: Some(run.ended_at.clone()),
        duration_ms: Some(run.duration_ms),
    };
    write_turn(&TurnWriteRequest {
        root,
        game_id,
        index: run.index,
        meta: &meta,
        report,
        state_before: run.state_before,
        state_after: run.state_after,
    })?;
    Ok(())
}

/// Print `value` as pretty JSON on stdout.
fn print_json<T: Serialize>(value: &T) -> Result<()> {
    let payload = serde_json::to_string_pretty(value).context("serialize json")?;
    println!("{payload}");
    Ok(())
}
