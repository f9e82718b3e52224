use std::time::Duration;

use anyhow::{Context, Result};

/// Which concrete LLM backend sits behind the gateway.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LlmProviderKind {
    Anthropic,
    OpenAi,
}

/// Application configuration loaded from environment variables.
/// Fails at startup if required variables are missing or malformed.
#[derive(Debug, Clone)]
pub struct Config {
    pub database_url: String,
    pub port: u16,
    pub rust_log: String,
    pub llm: LlmConfig,
    pub resilience: ResilienceConfig,
    pub sse_idle_timeout: Duration,
    pub keyword_min_confidence: i32,
    pub keyword_boost_weight: f64,
    pub max_line_length: usize,
    pub manual_context_max_chars: usize,
    pub research_fetch_enabled: bool,
}

#[derive(Debug, Clone)]
pub struct LlmConfig {
    pub provider: LlmProviderKind,
    pub api_key: String,
    pub model: Option<String>,
    pub base_url: Option<String>,
    pub max_tokens: u32,
}

/// Knobs for the circuit breaker, rate-limit retry and rate pacer.
#[derive(Debug, Clone)]
pub struct ResilienceConfig {
    pub failure_threshold: u32,
    pub reset_timeout: Duration,
    pub retry_max_attempts: u32,
    pub retry_base_delay: Duration,
    pub min_interval: Duration,
}

impl Default for ResilienceConfig {
    fn default() -> Self {
        Self {
            failure_threshold: 3,
            reset_timeout: Duration::from_secs(60),
            retry_max_attempts: 3,
            retry_base_delay: Duration::from_secs(5),
            min_interval: Duration::from_millis(1000),
        }
    }
}

impl Config {
    pub fn from_env() -> Result<Self> {
        dotenvy::dotenv().ok(); // load .env if present; ignore if missing

        let provider = match optional_env("LLM_PROVIDER")
            .unwrap_or_else(|| "anthropic".to_string())
            .to_lowercase()
            .as_str()
        {
            "anthropic" => LlmProviderKind::Anthropic,
            "openai" => LlmProviderKind::OpenAi,
            other => anyhow::bail!("LLM_PROVIDER must be 'anthropic' or 'openai', got '{other}'"),
        };

        let defaults = ResilienceConfig::default();

        Ok(Config {
            database_url: require_env("DATABASE_URL")?,
            port: parse_env("PORT", 8080)?,
            rust_log: std::env::var("RUST_LOG").unwrap_or_else(|_| "info".to_string()),
            llm: LlmConfig {
                provider,
                api_key: require_env("LLM_API_KEY")?,
                model: optional_env("LLM_MODEL"),
                base_url: optional_env("LLM_BASE_URL"),
                max_tokens: parse_env("LLM_MAX_TOKENS", 4096)?,
            },
            resilience: ResilienceConfig {
                failure_threshold: parse_env(
                    "CIRCUIT_FAILURE_THRESHOLD",
                    defaults.failure_threshold,
                )?,
                reset_timeout: Duration::from_secs(parse_env(
                    "CIRCUIT_RESET_TIMEOUT_SECS",
                    defaults.reset_timeout.as_secs(),
                )?),
                retry_max_attempts: parse_env("RETRY_MAX_ATTEMPTS", defaults.retry_max_attempts)?,
                retry_base_delay: Duration::from_millis(parse_env(
                    "RETRY_BASE_DELAY_MS",
                    defaults.retry_base_delay.as_millis() as u64,
                )?),
                min_interval: Duration::from_millis(parse_env(
                    "LLM_MIN_INTERVAL_MS",
                    defaults.min_interval.as_millis() as u64,
                )?),
            },
            sse_idle_timeout: Duration::from_secs(parse_env("SSE_IDLE_TIMEOUT_SECS", 30)?),
            keyword_min_confidence: parse_env("KEYWORD_MIN_CONFIDENCE", 3)?,
            keyword_boost_weight: parse_env("KEYWORD_BOOST_WEIGHT", 0.3)?,
            max_line_length: parse_env("MAX_LINE_LENGTH", 100)?,
            manual_context_max_chars: parse_env("MANUAL_CONTEXT_MAX_CHARS", 5000)?,
            research_fetch_enabled: parse_env("RESEARCH_FETCH_ENABLED", true)?,
        })
    }
}

fn require_env(key: &str) -> Result<String> {
    std::env::var(key).with_context(|| format!("Required environment variable '{key}' is not set"))
}

fn optional_env(key: &str) -> Option<String> {
    std::env::var(key).ok().filter(|v| !v.trim().is_empty())
}

fn parse_env<T>(key: &str, default: T) -> Result<T>
where
    T: std::str::FromStr,
    T::Err: std::error::Error + Send + Sync + 'static,
{
    match optional_env(key) {
        Some(raw) => raw
            .trim()
            .parse::<T>()
            .with_context(|| format!("{key} has an invalid value: '{raw}'")),
        None => Ok(default),
    }
}
