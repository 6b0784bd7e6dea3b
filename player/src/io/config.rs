//! Player configuration stored in `player.toml`.

use std::fs;
use std::path::Path;

use anyhow::{Context, Result, anyhow};
use serde::{Deserialize, Serialize};

use crate::core::history::HISTORY_CAPACITY;

pub const DEFAULT_CONFIG_PATH: &str = "player.toml";

/// Player configuration (TOML).
///
/// Edited by humans; missing fields fall back to the defaults below.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct PlayerConfig {
    pub turn: TurnConfig,
    pub oracle: OracleConfig,
    pub game: GameConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(default)]
pub struct TurnConfig {
    /// Decision rounds allowed in one callback cycle before the fallback fires.
    pub max_rounds_per_cycle: u32,
    /// Cycles allowed while driving one turn.
    pub max_cycles_per_turn: u32,
    /// History entries shown in the prompt.
    pub history_in_prompt: usize,
    /// Byte budget of the rendered state description.
    pub prompt_budget_bytes: usize,
}

impl Default for TurnConfig {
    fn default() -> Self {
        Self {
            max_rounds_per_cycle: 8,
            max_cycles_per_turn: 12,
            history_in_prompt: 5,
            prompt_budget_bytes: 12_000,
        }
    }
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum OracleKind {
    /// Spawn an agent CLI per decision.
    Command,
    /// Call an OpenAI-compatible chat-completions endpoint.
    Chat,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct OracleConfig {
    pub kind: OracleKind,
    /// Agent argv. `{schema}` and `{output}` are replaced with file paths.
    pub command: Vec<String>,
    pub timeout_secs: u64,
    /// Keep at most this many bytes of agent stdout/stderr.
    pub output_limit_bytes: usize,
    pub chat: ChatConfig,
}

impl Default for OracleConfig {
    fn default() -> Self {
        Self {
            kind: OracleKind::Command,
            command: [
                "codex",
                "exec",
                "--skip-git-repo-check",
                "--output-schema",
                "{schema}",
                "--output-last-message",
                "{output}",
                "-",
            ]
            .into_iter()
            .map(String::from)
            .collect(),
            timeout_secs: 120,
            output_limit_bytes: 100_000,
            chat: ChatConfig::default(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct ChatConfig {
    pub endpoint: String,
    pub model: String,
    /// Name of the environment variable holding the API key.
    pub api_key_env: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub temperature: Option<f32>,
    pub max_tokens: u32,
    pub timeout_secs: u64,
}

impl Default for ChatConfig {
    fn default() -> Self {
        Self {
            endpoint: "https://api.openai.com/v1/chat/completions".to_string(),
            model: "gpt-4o".to_string(),
            api_key_env: "OPENAI_API_KEY".to_string(),
            temperature: None,
            max_tokens: 4000,
            timeout_secs: 120,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(default)]
pub struct GameConfig {
    /// Seat names, in turn order.
    pub seats: Vec<String>,
    pub starting_cash: i64,
    /// Dice seed; unseeded games use entropy.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub seed: Option<u64>,
    /// Stop the game after this many completed turns.
    pub max_turns: u32,
}

impl Default for GameConfig {
    fn default() -> Self {
        Self {
            seats: vec!["Player 1".to_string(), "Player 2".to_string()],
            starting_cash: 1500,
            seed: None,
            max_turns: 100,
        }
    }
}

impl PlayerConfig {
    pub fn validate(&self) -> Result<()> {
        if self.turn.max_rounds_per_cycle == 0 {
            return Err(anyhow!("turn.max_rounds_per_cycle must be > 0"));
        }
        if self.turn.max_cycles_per_turn == 0 {
            return Err(anyhow!("turn.max_cycles_per_turn must be > 0"));
        }
        if self.turn.history_in_prompt > HISTORY_CAPACITY {
            return Err(anyhow!(
                "turn.history_in_prompt must be <= {HISTORY_CAPACITY}"
            ));
        }
        if self.turn.prompt_budget_bytes == 0 {
            return Err(anyhow!("turn.prompt_budget_bytes must be > 0"));
        }
        if self.oracle.timeout_secs == 0 {
            return Err(anyhow!("oracle.timeout_secs must be > 0"));
        }
        if self.oracle.output_limit_bytes == 0 {
            return Err(anyhow!("oracle.output_limit_bytes must be > 0"));
        }
        match self.oracle.kind {
            OracleKind::Command => {
                if self.oracle.command.is_empty() || self.oracle.command[0].trim().is_empty() {
                    return Err(anyhow!("oracle.command must be a non-empty array"));
                }
            }
            OracleKind::Chat => {
                let chat = &self.oracle.chat;
                if chat.endpoint.trim().is_empty() || chat.model.trim().is_empty() {
                    return Err(anyhow!("oracle.chat.endpoint and oracle.chat.model are required"));
                }
                if chat.timeout_secs == 0 || chat.max_tokens == 0 {
                    return Err(anyhow!(
                        "oracle.chat.timeout_secs and oracle.chat.max_tokens must be > 0"
                    ));
                }
            }
        }
        if self.game.seats.len() < 2 {
            return Err(anyhow!("game.seats needs at least two names"));
        }
        if self.game.seats.iter().any(|name| name.trim().is_empty()) {
            return Err(anyhow!("game.seats names must be non-empty"));
        }
        if self.game.starting_cash <= 0 {
            return Err(anyhow!("game.starting_cash must be > 0"));
        }
        if self.game.max_turns == 0 {
            return Err(anyhow!("game.max_turns must be > 0"));
        }
        Ok(())
    }
}

/// Load config from a TOML file.
///
/// If the file is missing, returns `PlayerConfig::default()`.
pub fn load_config(path: &Path) -> Result<PlayerConfig> {
    if !path.exists() {
        let cfg = PlayerConfig::default();
        cfg.validate()?;
        return Ok(cfg);
    }
    let contents = fs::read_to_string(path).with_context(|| format!("read {}", path.display()))?;
    let cfg: PlayerConfig =
        toml::from_str(&contents).with_context(|| format!("parse {}", path.display()))?;
    cfg.validate()
        .with_context(|| format!("validate {}", path.display()))?;
    Ok(cfg)
}

/// Atomically write config to disk (temp file + rename).
pub fn write_config(path: &Path, cfg: &PlayerConfig) -> Result<()> {
    cfg.validate()?;
    let mut buf = toml::to_string_pretty(cfg).context("serialize config toml")?;
    buf.push('\n');
    let tmp_path = path.with_extension("toml.tmp");
    if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
        fs::create_dir_all(parent)
            .with_context(|| format!("create directory {}", parent.display()))?;
    }
    fs::write(&tmp_path, buf)
        .with_context(|| format!("write temp config {}", tmp_path.display()))?;
    fs::rename(&tmp_path, path).with_context(|| format!("replace config {}", path.display()))?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn load_missing_returns_default() {
        let temp = tempfile::tempdir().expect("tempdir");
        let cfg = load_config(&temp.path().join("missing.toml")).expect("load");
        assert_eq!(cfg, PlayerConfig::default());
    }

    #[test]
    fn write_then_load_round_trips() {
        let temp = tempfile::tempdir().expect("tempdir");
        let path = temp.path().join("player.toml");
        let mut cfg = PlayerConfig::default();
        cfg.game.seed = Some(42);
        cfg.oracle.chat.temperature = Some(0.5);
        write_config(&path, &cfg).expect("write");
        assert_eq!(load_config(&path).expect("load"), cfg);
    }

    #[test]
    fn partial_file_fills_defaults() {
        let temp = tempfile::tempdir().expect("tempdir");
        let path = temp.path().join("player.toml");
        fs::write(
            &path,
            "[oracle]\nkind = \"chat\"\n\n[game]\nseats = [\"A\", \"B\", \"C\"]\n",
        )
        .expect("write");
        let cfg = load_config(&path).expect("load");
        assert_eq!(cfg.oracle.kind, OracleKind::Chat);
        assert_eq!(cfg.game.seats.len(), 3);
        assert_eq!(cfg.turn, TurnConfig::default());
        assert_eq!(cfg.oracle.chat.model, "gpt-4o");
    }

    #[test]
    fn invalid_values_are_rejected() {
        let mut cfg = PlayerConfig::default();
        cfg.turn.history_in_prompt = 11;
        assert!(cfg.validate().is_err());

        let mut cfg = PlayerConfig::default();
        cfg.game.seats = vec!["Solo".to_string()];
        let err = cfg.validate().unwrap_err();
        assert!(err.to_string().contains("at least two"));

        let mut cfg = PlayerConfig::default();
        cfg.oracle.command.clear();
        assert!(cfg.validate().is_err());
    }
}
