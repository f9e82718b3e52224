//! Anthropic Messages API backend.

use async_trait::async_trait;
use futures_util::StreamExt;
use reqwest::Client;
use serde::Deserialize;
use serde_json::{json, Value};
use tracing::{debug, warn};

use crate::config::LlmConfig;
use crate::llm_client::{
    sse, ChatMessage, Completion, FinishReason, LlmError, LlmGateway, LlmRequest, Role,
    TextStream, ToolCall, ToolSpec, ToolTurn, Usage,
};

const DEFAULT_BASE_URL: &str = "https://api.anthropic.com";
const ANTHROPIC_VERSION: &str = "2023-06-01";
pub const DEFAULT_MODEL: &str = "claude-sonnet-4-5";

#[derive(Debug, Deserialize)]
struct MessagesResponse {
    content: Vec<ContentBlock>,
    usage: Usage,
    stop_reason: Option<String>,
}

#[derive(Debug, Deserialize)]
struct ContentBlock {
    #[serde(rename = "type")]
    block_type: String,
    text: Option<String>,
    id: Option<String>,
    name: Option<String>,
    input: Option<Value>,
}

#[derive(Debug, Deserialize)]
struct AnthropicError {
    error: AnthropicErrorBody,
}

#[derive(Debug, Deserialize)]
struct AnthropicErrorBody {
    message: String,
}

impl MessagesResponse {
    fn text(&self) -> String {
        self.content
            .iter()
            .filter(|b| b.block_type == "text")
            .filter_map(|b| b.text.as_deref())
            .collect::<Vec<_>>()
            .join("")
    }

    fn tool_calls(&self) -> Vec<ToolCall> {
        self.content
            .iter()
            .filter(|b| b.block_type == "tool_use")
            .map(|b| ToolCall {
                id: b.id.clone().unwrap_or_default(),
                name: b.name.clone().unwrap_or_default(),
                arguments: b.input.clone().unwrap_or(Value::Null),
            })
            .collect()
    }

    fn finish_reason(&self) -> FinishReason {
        match self.stop_reason.as_deref() {
            Some("end_turn") | Some("stop_sequence") | None => FinishReason::Stop,
            Some("max_tokens") => FinishReason::MaxTokens,
            Some("tool_use") => FinishReason::ToolUse,
            Some(other) => FinishReason::Other(other.to_string()),
        }
    }
}

#[derive(Clone)]
pub struct AnthropicBackend {
    client: Client,
    api_key: String,
    base_url: String,
    model: String,
    max_tokens: u32,
}

impl AnthropicBackend {
    pub fn new(config: &LlmConfig) -> Self {
        Self {
            client: Client::builder()
                .timeout(std::time::Duration::from_secs(120))
                .build()
                .unwrap_or_default(),
            api_key: config.api_key.clone(),
            base_url: config
                .base_url
                .clone()
                .unwrap_or_else(|| DEFAULT_BASE_URL.to_string()),
            model: config
                .model
                .clone()
                .unwrap_or_else(|| DEFAULT_MODEL.to_string()),
            max_tokens: config.max_tokens,
        }
    }

    fn body(&self, request: &LlmRequest, tools: &[ToolSpec], stream: bool) -> Value {
        let mut body = json!({
            "model": self.model,
            "max_tokens": request.max_tokens.unwrap_or(self.max_tokens),
            "messages": to_anthropic_messages(&request.messages),
        });

        let system = system_text(&request.messages);
        if !system.is_empty() {
            body["system"] = json!(system);
        }
        if !tools.is_empty() {
            body["tools"] = tools
                .iter()
                .map(|t| {
                    json!({
                        "name": t.name,
                        "description": t.description,
                        "input_schema": t.parameters,
                    })
                })
                .collect();
        }
        if stream {
            body["stream"] = json!(true);
        }
        body
    }

    async fn send(&self, body: &Value) -> Result<reqwest::Response, LlmError> {
        let response = self
            .client
            .post(format!(
                "{}/v1/messages",
                self.base_url.trim_end_matches('/')
            ))
            .header("x-api-key", &self.api_key)
            .header("anthropic-version", ANTHROPIC_VERSION)
            .header("content-type", "application/json")
            .json(body)
            .send()
            .await?;

        let status = response.status();

        // 529 is Anthropic's "overloaded"; treated like 429 so it gets backoff.
        if status.as_u16() == 429 || status.as_u16() == 529 {
            let body = response.text().await.unwrap_or_default();
            warn!("Anthropic API returned {}: {}", status, body);
            return Err(LlmError::RateLimited(format!("status {status}")));
        }

        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            let message = serde_json::from_str::<AnthropicError>(&body)
                .map(|e| e.error.message)
                .unwrap_or(body);
            return Err(LlmError::Api {
                status: status.as_u16(),
                message,
            });
        }

        Ok(response)
    }

    async fn call(&self, body: &Value) -> Result<MessagesResponse, LlmError> {
        let response: MessagesResponse = self.send(body).await?.json().await?;
        debug!(
            "Anthropic call succeeded: input_tokens={}, output_tokens={}",
            response.usage.input_tokens, response.usage.output_tokens
        );
        Ok(response)
    }
}

#[async_trait]
impl LlmGateway for AnthropicBackend {
    fn provider(&self) -> &str {
        "anthropic"
    }

    fn model(&self) -> &str {
        &self.model
    }

    async fn generate(&self, request: &LlmRequest) -> Result<Completion, LlmError> {
        let response = self.call(&self.body(request, &[], false)).await?;
        let text = response.text();
        if text.trim().is_empty() {
            return Err(LlmError::EmptyContent);
        }
        Ok(Completion {
            finish_reason: response.finish_reason(),
            usage: response.usage,
            text,
        })
    }

    async fn generate_stream(&self, request: &LlmRequest) -> Result<TextStream, LlmError> {
        let response = self.send(&self.body(request, &[], true)).await?;
        let stream = sse::data_lines(response.bytes_stream()).filter_map(|line| async move {
            match line {
                Ok(data) => stream_delta_text(&data).transpose(),
                Err(e) => Some(Err(e)),
            }
        });
        Ok(Box::pin(stream))
    }

    async fn generate_with_tools(
        &self,
        request: &LlmRequest,
        tools: &[ToolSpec],
    ) -> Result<ToolTurn, LlmError> {
        let response = self.call(&self.body(request, tools, false)).await?;
        let tool_calls = response.tool_calls();
        Ok(ToolTurn {
            message: ChatMessage {
                tool_calls: tool_calls.clone(),
                ..ChatMessage::assistant(response.text())
            },
            finish_reason: response.finish_reason(),
            usage: response.usage,
            tool_calls,
        })
    }
}

fn system_text(messages: &[ChatMessage]) -> String {
    messages
        .iter()
        .filter(|m| m.role == Role::System)
        .map(|m| m.content.as_str())
        .collect::<Vec<_>>()
        .join("\n\n")
}

/// Maps the conversation to Anthropic's shape. System messages go in the top-level
/// `system` field; consecutive tool results are merged into one user message.
fn to_anthropic_messages(messages: &[ChatMessage]) -> Vec<Value> {
    let mut out: Vec<Value> = Vec::new();
    let mut pending_results: Vec<Value> = Vec::new();

    for message in messages.iter().filter(|m| m.role != Role::System) {
        if message.role == Role::Tool {
            pending_results.push(json!({
                "type": "tool_result",
                "tool_use_id": message.tool_call_id,
                "content": message.content,
            }));
            continue;
        }
        if !pending_results.is_empty() {
            out.push(json!({ "role": "user", "content": std::mem::take(&mut pending_results) }));
        }

        match message.role {
            Role::Assistant if !message.tool_calls.is_empty() => {
                let mut blocks = Vec::new();
                if !message.content.is_empty() {
                    blocks.push(json!({ "type": "text", "text": message.content }));
                }
                for call in &message.tool_calls {
                    blocks.push(json!({
                        "type": "tool_use",
                        "id": call.id,
                        "name": call.name,
                        "input": call.arguments,
                    }));
                }
                out.push(json!({ "role": "assistant", "content": blocks }));
            }
            Role::Assistant => {
                out.push(json!({ "role": "assistant", "content": message.content }));
            }
            _ => out.push(json!({ "role": "user", "content": message.content })),
        }
    }

    if !pending_results.is_empty() {
        out.push(json!({ "role": "user", "content": pending_results }));
    }
    out
}

/// Extracts the text delta from one streaming event payload, if it carries one.
fn stream_delta_text(data: &str) -> Result<Option<String>, LlmError> {
    let event: Value = serde_json::from_str(data)?;
    match event.get("type").and_then(Value::as_str) {
        Some("content_block_delta") => Ok(event
            .pointer("/delta/text")
            .and_then(Value::as_str)
            .map(str::to_string)),
        Some("error") => Err(LlmError::Stream(
            event
                .pointer("/error/message")
                .and_then(Value::as_str)
                .unwrap_or("unknown stream error")
                .to_string(),
        )),
        _ => Ok(None),
    }
}
