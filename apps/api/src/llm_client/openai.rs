//! OpenAI-compatible chat-completions backend (OpenAI, or any server speaking the same API).

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

const DEFAULT_BASE_URL: &str = "https://api.openai.com";
pub const DEFAULT_MODEL: &str = "gpt-4o-mini";

#[derive(Debug, Deserialize)]
struct ChatResponse {
    choices: Vec<Choice>,
    #[serde(default)]
    usage: Option<ChatUsage>,
}

#[derive(Debug, Deserialize)]
struct Choice {
    message: ResponseMessage,
    finish_reason: Option<String>,
}

#[derive(Debug, Deserialize)]
struct ResponseMessage {
    content: Option<String>,
    #[serde(default)]
    tool_calls: Vec<ResponseToolCall>,
}

#[derive(Debug, Deserialize)]
struct ResponseToolCall {
    id: String,
    function: ResponseFunction,
}

#[derive(Debug, Deserialize)]
struct ResponseFunction {
    name: String,
    /// JSON-encoded arguments string.
    arguments: String,
}

#[derive(Debug, Deserialize)]
struct ChatUsage {
    prompt_tokens: u32,
    completion_tokens: u32,
}

impl ChatResponse {
    fn into_parts(self) -> Result<(String, Vec<ToolCall>, FinishReason, Usage), LlmError> {
        let usage = self
            .usage
            .map(|u| Usage {
                input_tokens: u.prompt_tokens,
                output_tokens: u.completion_tokens,
            })
            .unwrap_or_default();
        let choice = self.choices.into_iter().next().ok_or(LlmError::EmptyContent)?;
        let finish_reason = match choice.finish_reason.as_deref() {
            Some("stop") | None => FinishReason::Stop,
            Some("length") => FinishReason::MaxTokens,
            Some("tool_calls") => FinishReason::ToolUse,
            Some(other) => FinishReason::Other(other.to_string()),
        };
        let tool_calls = choice
            .message
            .tool_calls
            .into_iter()
            .map(|c| ToolCall {
                id: c.id,
                arguments: serde_json::from_str(&c.function.arguments)
                    .unwrap_or(Value::String(c.function.arguments)),
                name: c.function.name,
            })
            .collect();
        Ok((
            choice.message.content.unwrap_or_default(),
            tool_calls,
            finish_reason,
            usage,
        ))
    }
}

#[derive(Clone)]
pub struct OpenAiBackend {
    client: Client,
    api_key: String,
    base_url: String,
    model: String,
    max_tokens: u32,
}

impl OpenAiBackend {
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
            "messages": request.messages.iter().map(to_openai_message).collect::<Vec<_>>(),
        });
        if !tools.is_empty() {
            body["tools"] = tools
                .iter()
                .map(|t| {
                    json!({
                        "type": "function",
                        "function": {
                            "name": t.name,
                            "description": t.description,
                            "parameters": t.parameters,
                        }
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
                "{}/v1/chat/completions",
                self.base_url.trim_end_matches('/')
            ))
            .bearer_auth(&self.api_key)
            .json(body)
            .send()
            .await?;

        let status = response.status();
        if status.as_u16() == 429 {
            let body = response.text().await.unwrap_or_default();
            warn!("OpenAI API returned {}: {}", status, body);
            return Err(LlmError::RateLimited(format!("status {status}")));
        }
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            let message = serde_json::from_str::<Value>(&body)
                .ok()
                .and_then(|v| {
                    v.pointer("/error/message")
                        .and_then(Value::as_str)
                        .map(str::to_string)
                })
                .unwrap_or(body);
            return Err(LlmError::Api {
                status: status.as_u16(),
                message,
            });
        }
        Ok(response)
    }

    async fn call(&self, body: &Value) -> Result<ChatResponse, LlmError> {
        let response: ChatResponse = self.send(body).await?.json().await?;
        debug!("OpenAI call succeeded: choices={}", response.choices.len());
        Ok(response)
    }
}

#[async_trait]
impl LlmGateway for OpenAiBackend {
    fn provider(&self) -> &str {
        "openai"
    }

    fn model(&self) -> &str {
        &self.model
    }

    async fn generate(&self, request: &LlmRequest) -> Result<Completion, LlmError> {
        let (text, _, finish_reason, usage) =
            self.call(&self.body(request, &[], false)).await?.into_parts()?;
        if text.trim().is_empty() {
            return Err(LlmError::EmptyContent);
        }
        Ok(Completion {
            text,
            finish_reason,
            usage,
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
        let (text, tool_calls, finish_reason, usage) =
            self.call(&self.body(request, tools, false)).await?.into_parts()?;
        Ok(ToolTurn {
            message: ChatMessage {
                tool_calls: tool_calls.clone(),
                ..ChatMessage::assistant(text)
            },
            tool_calls,
            finish_reason,
            usage,
        })
    }
}

fn to_openai_message(message: &ChatMessage) -> Value {
    match message.role {
        Role::Tool => json!({
            "role": "tool",
            "tool_call_id": message.tool_call_id,
            "content": message.content,
        }),
        Role::Assistant if !message.tool_calls.is_empty() => json!({
            "role": "assistant",
            "content": message.content,
            "tool_calls": message.tool_calls.iter().map(|c| json!({
                "id": c.id,
                "type": "function",
                "function": { "name": c.name, "arguments": c.arguments.to_string() },
            })).collect::<Vec<_>>(),
        }),
        Role::Assistant => json!({ "role": "assistant", "content": message.content }),
        Role::System => json!({ "role": "system", "content": message.content }),
        Role::User => json!({ "role": "user", "content": message.content }),
    }
}

fn stream_delta_text(data: &str) -> Result<Option<String>, LlmError> {
    if data == "[DONE]" {
        return Ok(None);
    }
    let chunk: Value = serde_json::from_str(data)?;
    Ok(chunk
        .pointer("/choices/0/delta/content")
        .and_then(Value::as_str)
        .filter(|s| !s.is_empty())
        .map(str::to_string))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_tool_arguments_are_decoded_from_json_string() {
        let response: ChatResponse = serde_json::from_value(json!({
            "choices": [{
                "message": {
                    "content": null,
                    "tool_calls": [{
                        "id": "call_1",
                        "type": "function",
                        "function": {"name": "fetch_page", "arguments": "{\"url\":\"https://acme.test\"}"}
                    }]
                },
                "finish_reason": "tool_calls"
            }],
            "usage": {"prompt_tokens": 12, "completion_tokens": 3}
        }))
        .unwrap();

        let (text, calls, finish, usage) = response.into_parts().unwrap();
        assert!(text.is_empty());
        assert_eq!(finish, FinishReason::ToolUse);
        assert_eq!(calls[0].arguments["url"], "https://acme.test");
        assert_eq!(usage.input_tokens, 12);
    }

    #[test]
    fn test_length_finish_reason_is_max_tokens() {
        let response: ChatResponse = serde_json::from_value(json!({
            "choices": [{"message": {"content": "cut off"}, "finish_reason": "length"}]
        }))
        .unwrap();
        let (_, _, finish, usage) = response.into_parts().unwrap();
        assert_eq!(finish, FinishReason::MaxTokens);
        assert_eq!(usage, Usage::default());
    }

    #[test]
    fn test_stream_delta_text_handles_done_sentinel() {
        assert!(stream_delta_text("[DONE]").unwrap().is_none());
        let chunk = r#"{"choices":[{"delta":{"content":"Hello"}}]}"#;
        assert_eq!(stream_delta_text(chunk).unwrap().as_deref(), Some("Hello"));
    }

    #[test]
    fn test_tool_message_maps_to_tool_role() {
        let v = to_openai_message(&ChatMessage::tool_result("call_1", "ok"));
        assert_eq!(v["role"], "tool");
        assert_eq!(v["tool_call_id"], "call_1");
    }
}
