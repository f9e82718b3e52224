/// LLM Client: the single point of entry for all model calls in Hireflow.
///
/// ARCHITECTURAL RULE: No other module may call a provider API directly.
/// All LLM interactions MUST go through an `LlmGateway`, and in production
/// that gateway is always a `ResilientGateway` wrapping a concrete backend.
use std::sync::Arc;

use async_trait::async_trait;
use futures_util::stream::BoxStream;
use serde::{de::DeserializeOwned, Deserialize, Serialize};
use serde_json::Value;
use thiserror::Error;
use uuid::Uuid;

use crate::config::{Config, LlmProviderKind};
use crate::store::CallRecorder;

pub mod anthropic;
pub mod openai;
pub mod prompts;
pub mod resilience;
pub mod sse;

pub use resilience::ResilientGateway;

#[derive(Debug, Error)]
pub enum LlmError {
    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    #[error("API error (status {status}): {message}")]
    Api { status: u16, message: String },

    #[error("Rate limited: {0}")]
    RateLimited(String),

    #[error("JSON parse error: {0}")]
    Parse(#[from] serde_json::Error),

    #[error("LLM returned empty content")]
    EmptyContent,

    #[error("Circuit open: LLM calls are temporarily blocked")]
    CircuitOpen,

    #[error("Stream error: {0}")]
    Stream(String),
}

impl LlmError {
    /// Rate-limit class errors are the only ones worth retrying.
    pub fn is_rate_limit(&self) -> bool {
        matches!(self, LlmError::RateLimited(_))
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    System,
    User,
    Assistant,
    Tool,
}

/// A role-tagged conversation message.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ChatMessage {
    pub role: Role,
    pub content: String,
    /// Tool invocations requested by the assistant in this message.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub tool_calls: Vec<ToolCall>,
    /// For `Role::Tool` messages: the invocation this result answers.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub tool_call_id: Option<String>,
}

impl ChatMessage {
    fn plain(role: Role, content: impl Into<String>) -> Self {
        Self {
            role,
            content: content.into(),
            tool_calls: Vec::new(),
            tool_call_id: None,
        }
    }

    pub fn system(content: impl Into<String>) -> Self {
        Self::plain(Role::System, content)
    }

    pub fn user(content: impl Into<String>) -> Self {
        Self::plain(Role::User, content)
    }

    pub fn assistant(content: impl Into<String>) -> Self {
        Self::plain(Role::Assistant, content)
    }

    pub fn tool_result(tool_call_id: impl Into<String>, content: impl Into<String>) -> Self {
        Self {
            tool_call_id: Some(tool_call_id.into()),
            ..Self::plain(Role::Tool, content)
        }
    }
}

/// A named tool the model may ask the caller to execute.
#[derive(Debug, Clone, Serialize)]
pub struct ToolSpec {
    pub name: String,
    pub description: String,
    /// JSON schema of the tool's parameters object.
    pub parameters: Value,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ToolCall {
    pub id: String,
    pub name: String,
    pub arguments: Value,
}

/// Owner/application linkage attached to every call for traceability.
#[derive(Debug, Clone, Copy, Default)]
pub struct CallTrace {
    pub role_id: Option<Uuid>,
    pub application_id: Option<Uuid>,
}

#[derive(Debug, Clone)]
pub struct LlmRequest {
    /// Stable name of the prompt, e.g. "keyword_extraction". Used in call records.
    pub prompt_name: &'static str,
    pub messages: Vec<ChatMessage>,
    /// Overrides the backend's configured output cap.
    pub max_tokens: Option<u32>,
    pub trace: CallTrace,
}

impl LlmRequest {
    pub fn new(prompt_name: &'static str, system: &str, user: impl Into<String>) -> Self {
        Self {
            prompt_name,
            messages: vec![ChatMessage::system(system), ChatMessage::user(user)],
            max_tokens: None,
            trace: CallTrace::default(),
        }
    }

    pub fn traced(mut self, role_id: Uuid, application_id: Uuid) -> Self {
        self.trace = CallTrace {
            role_id: Some(role_id),
            application_id: Some(application_id),
        };
        self
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FinishReason {
    Stop,
    /// Output was truncated at the token limit.
    MaxTokens,
    ToolUse,
    Other(String),
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Deserialize)]
pub struct Usage {
    pub input_tokens: u32,
    pub output_tokens: u32,
}

#[derive(Debug, Clone)]
pub struct Completion {
    pub text: String,
    pub finish_reason: FinishReason,
    pub usage: Usage,
}

/// Result of a tool-augmented turn. The caller executes `tool_calls` and sends
/// the results back as `Role::Tool` messages in a follow-up turn.
#[derive(Debug, Clone)]
pub struct ToolTurn {
    pub message: ChatMessage,
    pub tool_calls: Vec<ToolCall>,
    pub finish_reason: FinishReason,
    pub usage: Usage,
}

pub type TextStream = BoxStream<'static, Result<String, LlmError>>;

/// Provider-agnostic chat generation. One concrete backend is chosen at startup.
#[async_trait]
pub trait LlmGateway: Send + Sync {
    fn provider(&self) -> &str;

    fn model(&self) -> &str;

    async fn generate(&self, request: &LlmRequest) -> Result<Completion, LlmError>;

    /// Yields text chunks as they arrive. Dropping the stream stops the call.
    async fn generate_stream(&self, request: &LlmRequest) -> Result<TextStream, LlmError>;

    async fn generate_with_tools(
        &self,
        request: &LlmRequest,
        tools: &[ToolSpec],
    ) -> Result<ToolTurn, LlmError>;
}

/// Builds the configured backend wrapped in breaker, retry and pacer.
pub fn build_gateway(
    config: &Config,
    recorder: Option<Arc<dyn CallRecorder>>,
) -> Arc<dyn LlmGateway> {
    let backend: Arc<dyn LlmGateway> = match config.llm.provider {
        LlmProviderKind::Anthropic => Arc::new(anthropic::AnthropicBackend::new(&config.llm)),
        LlmProviderKind::OpenAi => Arc::new(openai::OpenAiBackend::new(&config.llm)),
    };
    Arc::new(ResilientGateway::new(backend, &config.resilience, recorder))
}

/// Deserializes model text as JSON, tolerating markdown code fences around it.
pub fn parse_json<T: DeserializeOwned>(text: &str) -> Result<T, LlmError> {
    let text = strip_json_fences(text);
    if text.is_empty() {
        return Err(LlmError::EmptyContent);
    }
    serde_json::from_str(text).map_err(LlmError::Parse)
}

/// Strips ```json ... ``` or ``` ... ``` code fences from LLM output.
fn strip_json_fences(text: &str) -> &str {
    let text = text.trim();
    if let Some(stripped) = text.strip_prefix("```json") {
        stripped
            .trim_start()
            .strip_suffix("```")
            .map(|s| s.trim())
            .unwrap_or(stripped.trim_start())
    } else if let Some(stripped) = text.strip_prefix("```") {
        stripped
            .trim_start()
            .strip_suffix("```")
            .map(|s| s.trim())
            .unwrap_or(stripped.trim_start())
    } else {
        text
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_strip_json_fences_with_json_tag() {
        let input = "```json\n{\"key\": \"value\"}\n```";
        assert_eq!(strip_json_fences(input), "{\"key\": \"value\"}");
    }

    #[test]
    fn test_strip_json_fences_without_tag() {
        let input = "```\n{\"key\": \"value\"}\n```";
        assert_eq!(strip_json_fences(input), "{\"key\": \"value\"}");
    }

    #[test]
    fn test_strip_json_fences_no_fences() {
        let input = "{\"key\": \"value\"}";
        assert_eq!(strip_json_fences(input), "{\"key\": \"value\"}");
    }

    #[test]
    fn test_parse_json_rejects_empty_and_garbage() {
        assert!(matches!(
            parse_json::<Value>("   "),
            Err(LlmError::EmptyContent)
        ));
        assert!(matches!(
            parse_json::<Value>("Sure! Here are your keywords."),
            Err(LlmError::Parse(_))
        ));
    }

    #[test]
    fn test_only_rate_limit_is_retryable() {
        assert!(LlmError::RateLimited("429".into()).is_rate_limit());
        assert!(!LlmError::EmptyContent.is_rate_limit());
        assert!(!LlmError::Api {
            status: 400,
            message: "bad".into()
        }
        .is_rate_limit());
    }

    #[test]
    fn test_tool_result_message_carries_call_id() {
        let msg = ChatMessage::tool_result("call_1", "page text");
        assert_eq!(msg.role, Role::Tool);
        assert_eq!(msg.tool_call_id.as_deref(), Some("call_1"));
    }
}
