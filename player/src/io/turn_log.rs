//! Per-turn logs under `<log_dir>/<game_id>/<index>/`.

use std::fs;
use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use serde::Serialize;

use crate::core::board::EngineState;
use crate::orchestrator::{TurnEnd, TurnReport};

#[derive(Debug, Clone, Serialize)]
pub struct TurnMeta {
    pub game_id: String,
    pub index: u32,
    pub actor: usize,
    pub actor_name: String,
    pub end: TurnEnd,
    pub cycles: usize,
    pub actions_applied: usize,
    pub notices: usize,
    pub started_at: Option<String>,
    pub ended_at: Option<String>,
    pub duration_ms: Option<u64>,
}

#[derive(Debug, Clone)]
pub struct TurnLogPaths {
    pub dir: PathBuf,
    pub meta_path: PathBuf,
    pub report_path: PathBuf,
    pub state_before_path: PathBuf,
    pub state_after_path: PathBuf,
}

impl TurnLogPaths {
    pub fn new(root: &Path, game_id: &str, index: u32) -> Self {
        let dir = root.join(game_id).join(format!("{index:04}"));
        Self {
            dir: dir.clone(),
            meta_path: dir.join("meta.json"),
            report_path: dir.join("report.json"),
            state_before_path: dir.join("state.before.json"),
            state_after_path: dir.join("state.after.json"),
        }
    }
}

pub struct TurnWriteRequest<'a> {
    pub root: &'a Path,
    pub game_id: &'a str,
    pub index: u32,
    pub meta: &'a TurnMeta,
    pub report: &'a TurnReport,
    pub state_before: &'a EngineState,
    pub state_after: &'a EngineState,
}

pub fn write_turn(request: &TurnWriteRequest<'_>) -> Result<TurnLogPaths> {
    let paths = TurnLogPaths::new(request.root, request.game_id, request.index);
    fs::create_dir_all(&paths.dir)
        .with_context(|| format!("create turn log dir {}", paths.dir.display()))?;

    write_json(&paths.meta_path, request.meta)?;
    write_json(&paths.report_path, request.report)?;
    write_json(&paths.state_before_path, request.state_before)?;
    write_json(&paths.state_after_path, request.state_after)?;

    Ok(paths)
}

fn write_json<T: Serialize>(path: &Path, value: &T) -> Result<()> {
    let mut buf = serde_json::to_string_pretty(value)
        .with_context(|| format!("serialize {}", path.display()))?;
    buf.push('\n');
    fs::write(path, buf).with_context(|| format!("write {}", path.display()))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_support::table_state;

    #[test]
    fn turn_paths_are_stable() {
        let temp = tempfile::tempdir().expect("tempdir");
        let paths = TurnLogPaths::new(temp.path(), "game-1", 7);

        assert!(paths.dir.ends_with(Path::new("game-1/0007")));
        assert!(paths.meta_path.ends_with("meta.json"));
        assert!(paths.report_path.ends_with("report.json"));
        assert!(paths.state_before_path.ends_with("state.before.json"));
        assert!(paths.state_after_path.ends_with("state.after.json"));
    }

    #[test]
    fn writes_turn_logs() {
        let temp = tempfile::tempdir().expect("tempdir");
        let state = table_state(&[1500, 1500]);
        let report = TurnReport {
            actor: 0,
            turn: 0,
            cycles: Vec::new(),
            end: TurnEnd::Stalled,
        };
        let meta = TurnMeta {
            game_id: "game-1".to_string(),
            index: 1,
            actor: 0,
            actor_name: "Actor 0".to_string(),
            end: TurnEnd::Stalled,
            cycles: 0,
            actions_applied: 0,
            notices: 0,
            started_at: None,
            ended_at: None,
            duration_ms: None,
        };

        let paths = write_turn(&TurnWriteRequest {
            root: temp.path(),
            game_id: "game-1",
            index: 1,
            meta: &meta,
            report: &report,
            state_before: &state,
            state_after: &state,
        })
        .expect("write logs");

        assert!(paths.state_before_path.is_file());
        assert!(paths.state_after_path.is_file());
        let written = fs::read_to_string(&paths.meta_path).expect("meta");
        assert!(written.contains("\"end\": \"stalled\""));
        assert!(written.ends_with("}\n"));
    }
}
