//! Chat oracle: OpenAI-compatible chat-completions endpoint with function tools.

use std::time::Duration;

use anyhow::{Context, Result};
use reqwest::blocking::Client;
use reqwest::header::{AUTHORIZATION, CONTENT_TYPE, HeaderMap, HeaderValue};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use tracing::{debug, info, instrument, warn};

use crate::io::config::ChatConfig;
use crate::io::oracle::{DecisionError, Oracle, OracleReply, OracleRequest, ToolCall};

#[derive(Debug, Serialize)]
struct ChatMessage {
    role: &'static str,
    content: String,
}

#[derive(Debug, Serialize)]
struct ChatFunction {
    name: String,
    description: String,
    parameters: Value,
}

#[derive(Debug, Serialize)]
struct ChatTool {
    #[serde(rename = "type")]
    kind: &'static str,
    function: ChatFunction,
}

#[derive(Debug, Serialize)]
struct ChatRequest {
    model: String,
    messages: Vec<ChatMessage>,
    tools: Vec<ChatTool>,
    tool_choice: &'static str,
    max_tokens: u32,
    #[serde(skip_serializing_if = "Option::is_none")]
    temperature: Option<f32>,
}

#[derive(Debug, Deserialize)]
struct ChatResponse {
    choices: Vec<ChatChoice>,
}

#[derive(Debug, Deserialize)]
struct ChatChoice {
    message: ChatMessageResponse,
}

#[derive(Debug, Deserialize)]
struct ChatMessageResponse {
    #[serde(default)]
    content: Option<String>,
    #[serde(default)]
    tool_calls: Option<Vec<ChatToolCall>>,
}

#[derive(Debug, Deserialize)]
struct ChatToolCall {
    function: ChatFunctionCall,
}

#[derive(Debug, Deserialize)]
struct ChatFunctionCall {
    name: String,
    /// JSON-encoded argument object.
    #[serde(default)]
    arguments: String,
}

pub struct ChatOracle {
    client: Client,
    config: ChatConfig,
    api_key: Option<String>,
}

impl ChatOracle {
    pub fn new(config: &ChatConfig) -> Result<Self> {
        let client = Client::builder()
            .timeout(Duration::from_secs(config.timeout_secs))
            .build()
            .context("build http client")?;
        let api_key = std::env::var(&config.api_key_env).ok();
        if api_key.is_none() {
            warn!(env = %config.api_key_env, "api key not set, sending unauthenticated requests");
        }
        Ok(Self {
            client,
            config: config.clone(),
            api_key,
        })
    }

    fn build_body(&self, request: &OracleRequest) -> ChatRequest {
        ChatRequest {
            model: self.config.model.clone(),
            messages: vec![
                ChatMessage {
                    role: "system",
                    content: request.system.clone(),
                },
                ChatMessage {
                    role: "user",
                    content: request.user.clone(),
                },
            ],
            tools: request
                .tools
                .iter()
                .map(|tool| ChatTool {
                    kind: "function",
                    function: ChatFunction {
                        name: tool.name.to_string(),
                        description: tool.description.to_string(),
                        parameters: tool.parameters.clone(),
                    },
                })
                .collect(),
            tool_choice: "auto",
            max_tokens: self.config.max_tokens,
            temperature: self.config.temperature,
        }
    }

    fn headers(&self) -> Result<HeaderMap, DecisionError> {
        let mut headers = HeaderMap::new();
        headers.insert(CONTENT_TYPE, HeaderValue::from_static("application/json"));
        if let Some(key) = &self.api_key {
            let value = HeaderValue::from_str(&format!("Bearer {key}"))
                .map_err(|err| DecisionError::Transport(format!("api key header: {err}")))?;
            headers.insert(AUTHORIZATION, value);
        }
        Ok(headers)
    }
}

impl Oracle for ChatOracle {
    #[instrument(skip_all, fields(acting = request.acting, model = %self.config.model))]
    fn decide(&self, request: &OracleRequest) -> Result<OracleReply, DecisionError> {
        let body = self.build_body(request);
        info!(endpoint = %self.config.endpoint, tools = body.tools.len(), "calling chat endpoint");

        let response = self
            .client
            .post(&self.config.endpoint)
            .headers(self.headers()?)
            .json(&body)
            .send()
            .map_err(|err| DecisionError::Transport(err.to_string()))?;

        let status = response.status();
        let text = response
            .text()
            .map_err(|err| DecisionError::Transport(err.to_string()))?;
        if !status.is_success() {
            return Err(DecisionError::Transport(format!("HTTP {status}: {text}")));
        }
        debug!(bytes = text.len(), "chat response received");
        parse_chat_response(&text)
    }
}

/// Extract tool calls and rationale from a chat-completions response body.
pub fn parse_chat_response(text: &str) -> Result<OracleReply, DecisionError> {
    let parsed: ChatResponse = serde_json::from_str(text)
        .map_err(|err| DecisionError::Malformed(format!("chat response: {err}")))?;
    let message = parsed
        .choices
        .into_iter()
        .next()
        .ok_or_else(|| DecisionError::Malformed("chat response has no choices".to_string()))?
        .message;

    let calls = message
        .tool_calls
        .unwrap_or_default()
        .into_iter()
        .map(|call| {
            let arguments = if call.function.arguments.trim().is_empty() {
                Value::Object(Default::default())
            } else {
                serde_json::from_str(&call.function.arguments).map_err(|err| {
                    DecisionError::Malformed(format!(
                        "arguments of {}: {err}",
                        call.function.name
                    ))
                })?
            };
            Ok(ToolCall::new(&call.function.name, arguments))
        })
        .collect::<Result<Vec<_>, DecisionError>>()?;

    Ok(OracleReply {
        calls,
        rationale: message.content.filter(|content| !content.trim().is_empty()),
    })
}
