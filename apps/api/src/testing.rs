//! Test doubles shared across module tests.

use std::collections::VecDeque;
use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::Mutex;

use async_trait::async_trait;
use futures_util::stream;

use crate::llm_client::{
    ChatMessage, Completion, FinishReason, LlmError, LlmGateway, LlmRequest, TextStream, ToolCall,
    ToolSpec, ToolTurn, Usage,
};

type Responder = Box<dyn Fn(&LlmRequest) -> Result<String, LlmError> + Send + Sync>;

/// Scripted gateway. Queued outcomes are consumed first; after that the
/// responder (if any) answers, and otherwise the call fails with `EmptyContent`.
#[derive(Default)]
pub struct MockGateway {
    queue: Mutex<VecDeque<Result<Completion, LlmError>>>,
    tool_turns: Mutex<VecDeque<ToolTurn>>,
    responder: Option<Responder>,
    calls: AtomicU32,
    requests: Mutex<Vec<LlmRequest>>,
}

impl MockGateway {
    pub fn new() -> Self {
        Self::default()
    }

    /// Answers every unscripted call with `f(request)`.
    pub fn with_responder<F>(f: F) -> Self
    where
        F: Fn(&LlmRequest) -> Result<String, LlmError> + Send + Sync + 'static,
    {
        Self {
            responder: Some(Box::new(f)),
            ..Self::new()
        }
    }

    pub fn push_text(&self, text: &str) {
        self.push_completion(text, FinishReason::Stop);
    }

    pub fn push_completion(&self, text: &str, finish_reason: FinishReason) {
        self.queue.lock().unwrap().push_back(Ok(Completion {
            text: text.to_string(),
            finish_reason,
            usage: Usage {
                input_tokens: 10,
                output_tokens: 20,
            },
        }));
    }

    pub fn push_error(&self, err: LlmError) {
        self.queue.lock().unwrap().push_back(Err(err));
    }

    /// Queues a tool-use turn asking for `fetch_page(url)`.
    pub fn push_fetch_request(&self, url: &str) {
        let call = ToolCall {
            id: format!("call_{}", self.tool_turns.lock().unwrap().len() + 1),
            name: "fetch_page".to_string(),
            arguments: serde_json::json!({ "url": url }),
        };
        let mut message = ChatMessage::assistant("");
        message.tool_calls = vec![call.clone()];
        self.tool_turns.lock().unwrap().push_back(ToolTurn {
            message,
            tool_calls: vec![call],
            finish_reason: FinishReason::ToolUse,
            usage: Usage::default(),
        });
    }

    pub fn call_count(&self) -> u32 {
        self.calls.load(Ordering::SeqCst)
    }

    pub fn requests(&self) -> Vec<LlmRequest> {
        self.requests.lock().unwrap().clone()
    }

    fn next(&self, request: &LlmRequest) -> Result<Completion, LlmError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        self.requests.lock().unwrap().push(request.clone());
        if let Some(outcome) = self.queue.lock().unwrap().pop_front() {
            return outcome;
        }
        match &self.responder {
            Some(f) => f(request).map(|text| Completion {
                text,
                finish_reason: FinishReason::Stop,
                usage: Usage::default(),
            }),
            None => Err(LlmError::EmptyContent),
        }
    }
}

#[async_trait]
impl LlmGateway for MockGateway {
    fn provider(&self) -> &str {
        "mock"
    }

    fn model(&self) -> &str {
        "mock-model"
    }

    async fn generate(&self, request: &LlmRequest) -> Result<Completion, LlmError> {
        self.next(request)
    }

    async fn generate_stream(&self, request: &LlmRequest) -> Result<TextStream, LlmError> {
        let completion = self.next(request)?;
        let chunks: Vec<Result<String, LlmError>> = completion
            .text
            .split_inclusive(' ')
            .map(|chunk| Ok(chunk.to_string()))
            .collect();
        Ok(Box::pin(stream::iter(chunks)))
    }

    async fn generate_with_tools(
        &self,
        request: &LlmRequest,
        _tools: &[ToolSpec],
    ) -> Result<ToolTurn, LlmError> {
        let scripted = self.tool_turns.lock().unwrap().pop_front();
        if let Some(turn) = scripted {
            self.calls.fetch_add(1, Ordering::SeqCst);
            self.requests.lock().unwrap().push(request.clone());
            return Ok(turn);
        }
        let completion = self.next(request)?;
        Ok(ToolTurn {
            message: ChatMessage::assistant(completion.text.clone()),
            tool_calls: Vec::new(),
            finish_reason: completion.finish_reason,
            usage: completion.usage,
        })
    }
}

/// Text of the last user message in a request.
pub fn last_user_text(request: &LlmRequest) -> &str {
    request
        .messages
        .iter()
        .rev()
        .find(|m| m.role == crate::llm_client::Role::User)
        .map(|m| m.content.as_str())
        .unwrap_or_default()
}
