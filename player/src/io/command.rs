//! Command oracle: one agent CLI invocation per decision.
//!
//! The prompt goes to the child's stdin. The child answers with a JSON decision,
//! either written to the `{output}` path or printed on stdout, and the answer is
//! validated against the decision JSON Schema before it is interpreted.

use std::fmt::Write as _;
use std::fs;
use std::path::{Path, PathBuf};
use std::process::Command;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;

use anyhow::{Context, Result, anyhow};
use jsonschema::{Validator, validator_for};
use serde::Deserialize;
use serde_json::Value;
use tracing::{debug, info, instrument, warn};

use crate::io::config::OracleConfig;
use crate::io::oracle::{DecisionError, Oracle, OracleReply, OracleRequest, ToolCall};
use crate::io::process::run_with_timeout;

pub const DECISION_SCHEMA: &str = include_str!("../../schemas/decision.schema.json");

#[derive(Debug, Deserialize)]
struct CommandDecision {
    action: Option<String>,
    #[serde(default)]
    args: Value,
    rationale: Option<String>,
    #[serde(default)]
    planned: Vec<PlannedCall>,
}

#[derive(Debug, Deserialize)]
struct PlannedCall {
    action: String,
    #[serde(default)]
    args: Value,
}

pub struct CommandOracle {
    argv: Vec<String>,
    work_dir: PathBuf,
    schema_path: PathBuf,
    validator: Validator,
    timeout: Duration,
    output_limit_bytes: usize,
    requests: AtomicU64,
}

impl CommandOracle {
    /// Prepare `work_dir` (decision schema, per-request outputs and logs).
    pub fn new(cfg: &OracleConfig, work_dir: &Path) -> Result<Self> {
        if cfg.command.is_empty() {
            return Err(anyhow!("oracle.command must be a non-empty array"));
        }
        fs::create_dir_all(work_dir)
            .with_context(|| format!("create oracle dir {}", work_dir.display()))?;
        let schema_path = work_dir.join("decision.schema.json");
        fs::write(&schema_path, DECISION_SCHEMA)
            .with_context(|| format!("write {}", schema_path.display()))?;
        let schema: Value = serde_json::from_str(DECISION_SCHEMA).context("parse decision schema")?;
        let validator =
            validator_for(&schema).map_err(|err| anyhow!("compile decision schema: {err}"))?;

        Ok(Self {
            argv: cfg.command.clone(),
            work_dir: work_dir.to_path_buf(),
            schema_path,
            validator,
            timeout: Duration::from_secs(cfg.timeout_secs),
            output_limit_bytes: cfg.output_limit_bytes,
            requests: AtomicU64::new(0),
        })
    }

    /// Substitute placeholders; the flag tells whether the answer goes to `output_path`.
    fn build_command(&self, output_path: &Path) -> (Command, bool) {
        let schema = self.schema_path.to_string_lossy();
        let output = output_path.to_string_lossy();
        let uses_output = self.argv.iter().any(|arg| arg.contains("{output}"));
        let args: Vec<String> = self
            .argv
            .iter()
            .map(|arg| arg.replace("{schema}", &schema).replace("{output}", &output))
            .collect();

        let mut cmd = Command::new(&args[0]);
        cmd.args(&args[1..]).current_dir(&self.work_dir);
        (cmd, uses_output)
    }
}

impl Oracle for CommandOracle {
    #[instrument(skip_all, fields(acting = request.acting))]
    fn decide(&self, request: &OracleRequest) -> Result<OracleReply, DecisionError> {
        let n = self.requests.fetch_add(1, Ordering::Relaxed);
        let output_path = self.work_dir.join(format!("decision-{n}.json"));
        let log_path = self.work_dir.join(format!("decision-{n}.log"));
        if output_path.exists() {
            fs::remove_file(&output_path).map_err(|err| {
                DecisionError::Transport(format!("remove stale {}: {err}", output_path.display()))
            })?;
        }

        let (cmd, uses_output) = self.build_command(&output_path);
        info!(program = %self.argv[0], "invoking oracle command");
        let prompt = render_command_prompt(request);
        let output = run_with_timeout(cmd, prompt.as_bytes(), self.timeout, self.output_limit_bytes)
            .map_err(|err| DecisionError::Transport(format!("{err:#}")))?;

        if let Err(err) = fs::write(&log_path, output.transcript()) {
            warn!(err = %err, path = %log_path.display(), "failed to write oracle log");
        }
        if output.timed_out {
            return Err(DecisionError::Transport(format!(
                "oracle command timed out after {:?}",
                self.timeout
            )));
        }
        if !output.status.success() {
            return Err(DecisionError::Transport(format!(
                "oracle command failed with status {:?}",
                output.status.code()
            )));
        }

        let text = if uses_output {
            fs::read_to_string(&output_path).map_err(|err| {
                DecisionError::Malformed(format!(
                    "missing decision output {}: {err}",
                    output_path.display()
                ))
            })?
        } else {
            String::from_utf8_lossy(&output.stdout).into_owned()
        };
        debug!(bytes = text.len(), "oracle answered");
        parse_decision(&self.validator, &text)
    }
}

/// Validate and convert a JSON decision document. A null action carries no call.
pub fn parse_decision(validator: &Validator, text: &str) -> Result<OracleReply, DecisionError> {
    let value: Value = serde_json::from_str(text.trim())
        .map_err(|err| DecisionError::Malformed(format!("decision is not JSON: {err}")))?;
    let messages: Vec<String> = validator
        .iter_errors(&value)
        .map(|err| err.to_string())
        .collect();
    if !messages.is_empty() {
        return Err(DecisionError::Malformed(format!(
            "decision schema validation failed: {}",
            messages.join("; ")
        )));
    }
    let decision: CommandDecision = serde_json::from_value(value)
        .map_err(|err| DecisionError::Malformed(format!("decision shape: {err}")))?;

    let mut calls = Vec::new();
    if let Some(action) = decision.action {
        calls.push(ToolCall::new(&action, decision.args));
        calls.extend(
            decision
                .planned
                .into_iter()
                .map(|planned| ToolCall::new(&planned.action, planned.args)),
        );
    }
    Ok(OracleReply {
        calls,
        rationale: decision.rationale,
    })
}

/// Plain-text prompt for agents that read stdin.
pub fn render_command_prompt(request: &OracleRequest) -> String {
    let mut buf = String::new();
    buf.push_str(&request.system);
    buf.push_str("\n\n");
    buf.push_str(&request.user);
    buf.push_str("\n\n# Tools\nChoose exactly one of these tools. Parameters are JSON Schema.\n");
    for tool in &request.tools {
        let _ = write!(
            buf,
            "\n## {}\n{}\nParameters: {}\n",
            tool.name, tool.description, tool.parameters
        );
    }
    buf.push_str(
        "\n# Response\nReply with one JSON object and nothing else:\n\
         {\"action\": \"<tool name, or null to end the turn>\", \"args\": {}, \
         \"rationale\": \"<brief reasoning>\", \
         \"planned\": [{\"action\": \"<tool>\", \"args\": {}}]}\n",
    );
    buf
}
