//! Resilience wrappers around an `LlmGateway`: circuit breaker, rate-limit retry
//! with exponential backoff, and a rate pacer enforcing a minimum call spacing.
//!
//! Order per call: breaker gate → (pacer → backend call) retried on rate limits →
//! breaker records the final outcome.

use std::future::Future;
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use chrono::Utc;
use serde::Serialize;
use tokio::time::Instant;
use tracing::{info, warn};
use uuid::Uuid;

use crate::config::ResilienceConfig;
use crate::llm_client::{
    Completion, LlmError, LlmGateway, LlmRequest, TextStream, ToolSpec, ToolTurn, Usage,
};
use crate::models::call_record::{CallRecord, CallStatus};
use crate::store::CallRecorder;

// ────────────────────────────────────────────────────────────────────────────
// Circuit breaker
// ────────────────────────────────────────────────────────────────────────────

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum CircuitState {
    Closed,
    Open,
    HalfOpen,
}

#[derive(Debug)]
struct BreakerInner {
    state: CircuitState,
    consecutive_failures: u32,
    last_failure: Option<Instant>,
    trial_in_flight: bool,
}

/// Consecutive-failure circuit breaker. State changes are check-then-set under one lock.
#[derive(Debug)]
pub struct CircuitBreaker {
    inner: Mutex<BreakerInner>,
    failure_threshold: u32,
    reset_timeout: Duration,
}

impl CircuitBreaker {
    pub fn new(failure_threshold: u32, reset_timeout: Duration) -> Self {
        Self {
            inner: Mutex::new(BreakerInner {
                state: CircuitState::Closed,
                consecutive_failures: 0,
                last_failure: None,
                trial_in_flight: false,
            }),
            failure_threshold: failure_threshold.max(1),
            reset_timeout,
        }
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, BreakerInner> {
        self.inner.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    /// Whether a call may go out now. An open circuit whose reset timeout has
    /// elapsed moves to half-open and admits exactly one trial call.
    pub fn can_proceed(&self) -> bool {
        self.try_admit().is_some()
    }

    /// Admits a call and returns a permit that must be settled with its outcome.
    /// A trial permit dropped unsettled reopens the circuit.
    pub fn admit(&self) -> Option<CallPermit<'_>> {
        self.try_admit().map(|trial| CallPermit {
            breaker: self,
            trial,
            settled: false,
        })
    }

    /// `Some(true)` when the admitted call is the half-open trial.
    fn try_admit(&self) -> Option<bool> {
        let mut inner = self.lock();
        match inner.state {
            CircuitState::Closed => Some(false),
            CircuitState::Open => {
                let elapsed = inner
                    .last_failure
                    .map(|t| t.elapsed() >= self.reset_timeout)
                    .unwrap_or(true);
                if elapsed {
                    info!("Circuit half-open: admitting one trial LLM call");
                    inner.state = CircuitState::HalfOpen;
                    inner.trial_in_flight = true;
                    Some(true)
                } else {
                    None
                }
            }
            CircuitState::HalfOpen => {
                if inner.trial_in_flight {
                    None
                } else {
                    inner.trial_in_flight = true;
                    Some(true)
                }
            }
        }
    }

    /// The trial call was cancelled before it produced an outcome.
    fn abandon_trial(&self) {
        let mut inner = self.lock();
        if inner.state == CircuitState::HalfOpen && inner.trial_in_flight {
            warn!("Trial LLM call abandoned, circuit reopened");
            inner.state = CircuitState::Open;
            inner.trial_in_flight = false;
            inner.last_failure = Some(Instant::now());
        }
    }

    pub fn record_success(&self) {
        let mut inner = self.lock();
        if inner.state != CircuitState::Closed {
            info!("Circuit closed after successful LLM call");
        }
        inner.state = CircuitState::Closed;
        inner.consecutive_failures = 0;
        inner.trial_in_flight = false;
    }

    pub fn record_failure(&self) {
        let mut inner = self.lock();
        inner.consecutive_failures += 1;
        inner.last_failure = Some(Instant::now());
        inner.trial_in_flight = false;

        let reopen = inner.state == CircuitState::HalfOpen
            || inner.consecutive_failures >= self.failure_threshold;
        if reopen && inner.state != CircuitState::Open {
            warn!(
                "Circuit opened after {} consecutive LLM failures",
                inner.consecutive_failures
            );
        }
        if reopen {
            inner.state = CircuitState::Open;
        }
    }

    pub fn state(&self) -> CircuitState {
        self.lock().state
    }

    pub fn failure_count(&self) -> u32 {
        self.lock().consecutive_failures
    }
}

/// Admission ticket for one guarded call.
pub struct CallPermit<'a> {
    breaker: &'a CircuitBreaker,
    trial: bool,
    settled: bool,
}

impl CallPermit<'_> {
    pub fn succeed(mut self) {
        self.settled = true;
        self.breaker.record_success();
    }

    pub fn fail(mut self) {
        self.settled = true;
        self.breaker.record_failure();
    }
}

impl Drop for CallPermit<'_> {
    fn drop(&mut self) {
        if !self.settled && self.trial {
            self.breaker.abandon_trial();
        }
    }
}

// ────────────────────────────────────────────────────────────────────────────
// Retry on rate limit
// ────────────────────────────────────────────────────────────────────────────

#[derive(Debug, Clone)]
pub struct RetryPolicy {
    /// Total attempts, including the first.
    pub max_attempts: u32,
    pub base_delay: Duration,
}

impl RetryPolicy {
    /// Backoff before attempt `attempt + 1`: base, 2×base, 4×base, ...
    pub fn delay_for(&self, attempt: u32) -> Duration {
        self.base_delay * 2u32.saturating_pow(attempt.saturating_sub(1))
    }

    /// Runs `op`, retrying only rate-limit errors. Exhaustion returns the last error.
    pub async fn run<T, F, Fut>(&self, mut op: F) -> Result<T, LlmError>
    where
        F: FnMut() -> Fut,
        Fut: Future<Output = Result<T, LlmError>>,
    {
        let max_attempts = self.max_attempts.max(1);
        let mut attempt = 1;
        loop {
            match op().await {
                Ok(value) => return Ok(value),
                Err(e) if e.is_rate_limit() && attempt < max_attempts => {
                    let delay = self.delay_for(attempt);
                    warn!(
                        "LLM rate limited (attempt {}/{}), retrying after {}ms",
                        attempt,
                        max_attempts,
                        delay.as_millis()
                    );
                    tokio::time::sleep(delay).await;
                    attempt += 1;
                }
                Err(e) => return Err(e),
            }
        }
    }
}

// ────────────────────────────────────────────────────────────────────────────
// Rate pacer
// ────────────────────────────────────────────────────────────────────────────

/// Spaces call starts at least `min_interval` apart across all concurrent callers.
#[derive(Debug)]
pub struct RatePacer {
    min_interval: Duration,
    last_call: tokio::sync::Mutex<Option<Instant>>,
}

impl RatePacer {
    pub fn new(min_interval: Duration) -> Self {
        Self {
            min_interval,
            last_call: tokio::sync::Mutex::new(None),
        }
    }

    /// Waits until the next call may start and stamps it. The lock is held across
    /// the sleep so concurrent callers queue behind each other.
    pub async fn pace(&self) {
        let mut last_call = self.last_call.lock().await;
        if let Some(previous) = *last_call {
            let elapsed = previous.elapsed();
            if elapsed < self.min_interval {
                tokio::time::sleep(self.min_interval - elapsed).await;
            }
        }
        *last_call = Some(Instant::now());
    }
}

// ────────────────────────────────────────────────────────────────────────────
// Resilient gateway
// ────────────────────────────────────────────────────────────────────────────

trait Metered {
    fn usage(&self) -> Usage;
}

impl Metered for Completion {
    fn usage(&self) -> Usage {
        self.usage
    }
}

impl Metered for ToolTurn {
    fn usage(&self) -> Usage {
        self.usage
    }
}

impl Metered for TextStream {
    fn usage(&self) -> Usage {
        Usage::default()
    }
}

/// The gateway every orchestrator talks to in production.
pub struct ResilientGateway {
    inner: Arc<dyn LlmGateway>,
    breaker: CircuitBreaker,
    retry: RetryPolicy,
    pacer: RatePacer,
    recorder: Option<Arc<dyn CallRecorder>>,
}

impl ResilientGateway {
    pub fn new(
        inner: Arc<dyn LlmGateway>,
        config: &ResilienceConfig,
        recorder: Option<Arc<dyn CallRecorder>>,
    ) -> Self {
        Self {
            inner,
            breaker: CircuitBreaker::new(config.failure_threshold, config.reset_timeout),
            retry: RetryPolicy {
                max_attempts: config.retry_max_attempts,
                base_delay: config.retry_base_delay,
            },
            pacer: RatePacer::new(config.min_interval),
            recorder,
        }
    }

    pub fn circuit_state(&self) -> CircuitState {
        self.breaker.state()
    }

    async fn guarded<T, F, Fut>(
        &self,
        request: &LlmRequest,
        retry: bool,
        op: F,
    ) -> Result<T, LlmError>
    where
        T: Metered,
        F: Fn() -> Fut,
        Fut: Future<Output = Result<T, LlmError>>,
    {
        let Some(permit) = self.breaker.admit() else {
            warn!(
                prompt = request.prompt_name,
                "Circuit open, failing LLM call fast"
            );
            return Err(LlmError::CircuitOpen);
        };

        let attempt = || {
            let op = &op;
            async move {
                self.pacer.pace().await;
                let started = Instant::now();
                let outcome = op().await;
                let record = self.call_record(request, started.elapsed(), &outcome);
                self.persist(record).await;
                outcome
            }
        };

        let result = if retry {
            self.retry.run(attempt).await
        } else {
            attempt().await
        };

        match &result {
            Ok(_) => permit.succeed(),
            Err(_) => permit.fail(),
        }
        result
    }

    fn call_record<T: Metered>(
        &self,
        request: &LlmRequest,
        latency: Duration,
        outcome: &Result<T, LlmError>,
    ) -> CallRecord {
        let usage = outcome.as_ref().map(Metered::usage).unwrap_or_default();
        CallRecord {
            id: Uuid::new_v4(),
            created_at: Utc::now(),
            provider: self.inner.provider().to_string(),
            model: self.inner.model().to_string(),
            prompt_name: request.prompt_name.to_string(),
            input_tokens: usage.input_tokens,
            output_tokens: usage.output_tokens,
            latency_ms: latency.as_millis() as u64,
            status: if outcome.is_ok() {
                CallStatus::Success
            } else {
                CallStatus::Error
            },
            error: outcome.as_ref().err().map(|e| e.to_string()),
            role_id: request.trace.role_id,
            application_id: request.trace.application_id,
        }
    }

    async fn persist(&self, record: CallRecord) {
        info!(
            provider = %record.provider,
            model = %record.model,
            prompt = %record.prompt_name,
            latency_ms = record.latency_ms,
            input_tokens = record.input_tokens,
            output_tokens = record.output_tokens,
            status = record.status.as_str(),
            "LLM call"
        );

        if let Some(recorder) = &self.recorder {
            if let Err(e) = recorder.record(&record).await {
                warn!("Failed to persist LLM call record {}: {e}", record.id);
            }
        }
    }
}

#[async_trait]
impl LlmGateway for ResilientGateway {
    fn provider(&self) -> &str {
        self.inner.provider()
    }

    fn model(&self) -> &str {
        self.inner.model()
    }

    async fn generate(&self, request: &LlmRequest) -> Result<Completion, LlmError> {
        self.guarded(request, true, || self.inner.generate(request))
            .await
    }

    /// Streams are not retried: a partially consumed stream cannot be replayed.
    async fn generate_stream(&self, request: &LlmRequest) -> Result<TextStream, LlmError> {
        self.guarded(request, false, || self.inner.generate_stream(request))
            .await
    }

    async fn generate_with_tools(
        &self,
        request: &LlmRequest,
        tools: &[ToolSpec],
    ) -> Result<ToolTurn, LlmError> {
        self.guarded(request, true, || {
            self.inner.generate_with_tools(request, tools)
        })
        .await
    }
}
