//! Research orchestrator: runs every research category for one application
//! as a detached background task, streaming progress through the hub.
//!
//! Flow: start_for_application → (gate on run state) → keywords → researching →
//!       spawn run → per category: progress → gateway call(s) → classify →
//!       persist result (best-effort) → complete event.

use std::collections::BTreeMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use chrono::Utc;
use dashmap::mapref::entry::Entry;
use dashmap::DashMap;
use serde::Serialize;
use tokio::task::AbortHandle;
use tracing::{error, info, warn};
use uuid::Uuid;

use crate::errors::AppError;
use crate::lifecycle::Lifecycle;
use crate::llm_client::prompts::{render_template, GROUNDING_INSTRUCTION};
use crate::llm_client::{ChatMessage, LlmError, LlmGateway, LlmRequest, ToolCall};
use crate::models::application::{ApplicationStatus, ApplicationUpdate};
use crate::models::research::{CategoryResult, ResearchResult};
use crate::research::categories::{classify, ResearchCategory, CATEGORIES};
use crate::research::fetch::{fetch_tool, PageFetcher, FETCH_TOOL_NAME};
use crate::research::hub::{CategoryStatus, ProgressEvent, ProgressHub};
use crate::research::prompts::{
    CATEGORY_PROMPT_TEMPLATE, RESEARCH_SYSTEM, SOURCE_HINT_NO_TOOL, SOURCE_HINT_WITH_TOOL,
    SOURCE_HINT_WITH_URL,
};
use crate::store::ApplicationStore;

/// Tool round-trips allowed per category before the answer is taken as-is.
const MAX_TOOL_ROUNDS: usize = 3;

/// Job posting excerpt length included in category prompts.
const POSTING_EXCERPT_CHARS: usize = 3000;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum RunStatus {
    Pending,
    Running,
    Complete,
    Failed,
}

impl RunStatus {
    pub fn is_active(&self) -> bool {
        matches!(self, RunStatus::Pending | RunStatus::Running)
    }
}

struct RunEntry {
    run_id: u64,
    status: RunStatus,
    abort: Option<AbortHandle>,
}

/// Everything a run needs, captured when it starts.
#[derive(Debug, Clone)]
pub struct ResearchJob {
    pub application_id: Uuid,
    pub role_id: Uuid,
    pub company_name: String,
    pub job_posting: String,
    pub job_url: Option<String>,
}

pub struct ResearchOrchestrator {
    gateway: Arc<dyn LlmGateway>,
    applications: Arc<dyn ApplicationStore>,
    lifecycle: Arc<Lifecycle>,
    hub: Arc<ProgressHub>,
    fetcher: Option<Arc<dyn PageFetcher>>,
    runs: Arc<DashMap<Uuid, RunEntry>>,
    next_run_id: AtomicU64,
}

impl ResearchOrchestrator {
    pub fn new(
        gateway: Arc<dyn LlmGateway>,
        applications: Arc<dyn ApplicationStore>,
        lifecycle: Arc<Lifecycle>,
        hub: Arc<ProgressHub>,
        fetcher: Option<Arc<dyn PageFetcher>>,
    ) -> Self {
        Self {
            gateway,
            applications,
            lifecycle,
            hub,
            fetcher,
            runs: Arc::new(DashMap::new()),
            next_run_id: AtomicU64::new(1),
        }
    }

    /// In-memory state of the current run, if one is tracked.
    pub fn status(&self, application_id: Uuid) -> Option<RunStatus> {
        self.runs.get(&application_id).map(|entry| entry.status)
    }

    pub fn is_running(&self, application_id: Uuid) -> bool {
        self.status(application_id)
            .map(|s| s.is_active())
            .unwrap_or(false)
    }

    /// Validates the application and starts a background run.
    ///
    /// 409 while a run is active, 400 without company name or job posting,
    /// and a precondition error unless the application is in `keywords`
    /// (first run) or `researching` (re-run).
    pub async fn start_for_application(
        self: &Arc<Self>,
        role_id: Uuid,
        application_id: Uuid,
    ) -> Result<u64, AppError> {
        if self.is_running(application_id) {
            return Err(AppError::Conflict(
                "Research is already running for this application".to_string(),
            ));
        }

        let application = self.applications.get(role_id, application_id).await?;
        let company_name = non_empty(application.company_name.as_deref())
            .ok_or_else(|| AppError::Validation("company_name is required for research".to_string()))?;
        let job_posting = non_empty(application.job_posting.as_deref())
            .ok_or_else(|| AppError::Validation("job_posting is required for research".to_string()))?;

        match application.status {
            ApplicationStatus::Keywords | ApplicationStatus::Researching => {
                self.lifecycle
                    .transition(role_id, application_id, ApplicationStatus::Researching)
                    .await?;
            }
            other => {
                return Err(AppError::Precondition(format!(
                    "Research can start from 'keywords' or 'researching'; application is '{other}'"
                )))
            }
        }

        self.start(ResearchJob {
            application_id,
            role_id,
            company_name: company_name.to_string(),
            job_posting: job_posting.to_string(),
            job_url: application.job_url.clone(),
        })
    }

    /// Reserves the run slot and spawns the run. Fails with `Conflict` if a run is active.
    pub fn start(self: &Arc<Self>, job: ResearchJob) -> Result<u64, AppError> {
        let application_id = job.application_id;
        let run_id = self.next_run_id.fetch_add(1, Ordering::Relaxed);
        let pending = RunEntry {
            run_id,
            status: RunStatus::Pending,
            abort: None,
        };
        match self.runs.entry(application_id) {
            Entry::Occupied(entry) if entry.get().status.is_active() => {
                return Err(AppError::Conflict(
                    "Research is already running for this application".to_string(),
                ));
            }
            Entry::Occupied(mut entry) => {
                entry.insert(pending);
            }
            Entry::Vacant(entry) => {
                entry.insert(pending);
            }
        }

        self.hub.open(application_id);
        let handle = tokio::spawn(self.clone().run(job, run_id));
        if let Some(mut entry) = self.runs.get_mut(&application_id) {
            if entry.run_id == run_id {
                entry.abort = Some(handle.abort_handle());
            }
        }
        info!(application_id = %application_id, run_id, "Research started");
        Ok(run_id)
    }

    /// Stops an active run. Returns false (and does nothing) when none is running.
    pub fn cancel(&self, application_id: Uuid) -> bool {
        let Some((_, entry)) = self
            .runs
            .remove_if(&application_id, |_, entry| entry.status.is_active())
        else {
            return false;
        };
        if let Some(abort) = entry.abort {
            abort.abort();
        }
        warn!(application_id = %application_id, run_id = entry.run_id, "Research cancelled; marked failed");
        self.hub.publish(
            application_id,
            ProgressEvent::Error {
                message: "Research was cancelled".to_string(),
                recoverable: false,
            },
        );
        self.hub.close(application_id);
        true
    }

    async fn run(self: Arc<Self>, job: ResearchJob, run_id: u64) {
        let application_id = job.application_id;
        let _cleanup = RunCleanup {
            runs: self.runs.clone(),
            application_id,
            run_id,
        };
        self.set_status(application_id, run_id, RunStatus::Running);

        match self.execute(&job).await {
            Ok(results) => {
                self.set_status(application_id, run_id, RunStatus::Complete);
                info!(
                    application_id = %application_id,
                    gaps = ?results.gaps,
                    "Research complete"
                );
                self.hub
                    .publish(application_id, ProgressEvent::Complete { results });
            }
            Err(e) => {
                self.set_status(application_id, run_id, RunStatus::Failed);
                error!(application_id = %application_id, "Research failed: {e}");
                let message = match e {
                    AppError::CircuitOpen => {
                        "The AI service is temporarily unavailable. Try again in a minute."
                    }
                    _ => "Research failed. Try again.",
                };
                self.hub.publish(
                    application_id,
                    ProgressEvent::Error {
                        message: message.to_string(),
                        recoverable: false,
                    },
                );
            }
        }
    }

    async fn execute(&self, job: &ResearchJob) -> Result<ResearchResult, AppError> {
        let mut categories = BTreeMap::new();
        let mut gaps = Vec::new();

        for category in CATEGORIES {
            self.hub.publish(
                job.application_id,
                ProgressEvent::Progress {
                    category: category.id.to_string(),
                    status: CategoryStatus::Searching,
                    message: format!("Researching {}...", category.label),
                },
            );

            let result = match self.research_category(job, category).await {
                Ok(result) => result,
                // An open circuit will fail every remaining category the same way.
                Err(LlmError::CircuitOpen) => return Err(AppError::CircuitOpen),
                Err(e) => {
                    warn!(
                        application_id = %job.application_id,
                        category = category.id,
                        "Research call failed: {e}"
                    );
                    CategoryResult::not_found("Research call failed")
                }
            };

            let (status, message) = if result.found {
                (CategoryStatus::Found, format!("Found {}", category.label))
            } else {
                gaps.push(category.id.to_string());
                (
                    CategoryStatus::NotFound,
                    format!("No usable {} found", category.label),
                )
            };
            self.hub.publish(
                job.application_id,
                ProgressEvent::Progress {
                    category: category.id.to_string(),
                    status,
                    message,
                },
            );
            categories.insert(category.id.to_string(), result);
        }

        let results = ResearchResult {
            categories,
            gaps,
            completed_at: Utc::now(),
        };
        self.persist(job, &results).await;
        Ok(results)
    }

    /// Best-effort: the complete event already carries the data.
    async fn persist(&self, job: &ResearchJob, results: &ResearchResult) {
        let value = match serde_json::to_value(results) {
            Ok(value) => value,
            Err(e) => {
                error!(application_id = %job.application_id, "Failed to serialize research: {e}");
                return;
            }
        };
        let update = ApplicationUpdate {
            research_data: Some(value),
            ..Default::default()
        };
        if let Err(e) = self
            .applications
            .update(job.role_id, job.application_id, update)
            .await
        {
            error!(application_id = %job.application_id, "Failed to persist research: {e}");
        }
    }

    async fn research_category(
        &self,
        job: &ResearchJob,
        category: &ResearchCategory,
    ) -> Result<CategoryResult, LlmError> {
        let system = format!("{RESEARCH_SYSTEM}\n\n{GROUNDING_INSTRUCTION}");
        let mut request = LlmRequest::new(
            "company_research",
            &system,
            self.category_prompt(job, category),
        )
        .traced(job.role_id, job.application_id);

        let Some(fetcher) = &self.fetcher else {
            let completion = self.gateway.generate(&request).await?;
            return Ok(classify(category, &completion.text));
        };

        let tools = [fetch_tool()];
        let mut rounds = 0;
        loop {
            let turn = self.gateway.generate_with_tools(&request, &tools).await?;
            if turn.tool_calls.is_empty() || rounds == MAX_TOOL_ROUNDS {
                return Ok(classify(category, &turn.message.content));
            }
            rounds += 1;
            request.messages.push(turn.message.clone());
            for call in &turn.tool_calls {
                let output = run_tool(fetcher.as_ref(), call).await;
                request
                    .messages
                    .push(ChatMessage::tool_result(call.id.clone(), output));
            }
        }
    }

    fn category_prompt(&self, job: &ResearchJob, category: &ResearchCategory) -> String {
        let source_hint = match (&self.fetcher, &job.job_url) {
            (Some(_), Some(url)) => SOURCE_HINT_WITH_URL.replace("{job_url}", url),
            (Some(_), None) => SOURCE_HINT_WITH_TOOL.to_string(),
            (None, _) => SOURCE_HINT_NO_TOOL.to_string(),
        };
        let excerpt: String = job.job_posting.chars().take(POSTING_EXCERPT_CHARS).collect();
        render_template(
            CATEGORY_PROMPT_TEMPLATE,
            &[
                ("company", job.company_name.as_str()),
                ("label", category.label),
                ("focus", category.focus),
                ("source_hint", source_hint.as_str()),
                ("job_posting", excerpt.as_str()),
            ],
        )
    }

    fn set_status(&self, application_id: Uuid, run_id: u64, status: RunStatus) {
        if let Some(mut entry) = self.runs.get_mut(&application_id) {
            if entry.run_id == run_id {
                entry.status = status;
            }
        }
    }
}

async fn run_tool(fetcher: &dyn PageFetcher, call: &ToolCall) -> String {
    if call.name != FETCH_TOOL_NAME {
        return format!("Unknown tool '{}'", call.name);
    }
    let Some(url) = call.arguments.get("url").and_then(|v| v.as_str()) else {
        return "Missing required argument 'url'".to_string();
    };
    match fetcher.fetch(url).await {
        Ok(text) if text.is_empty() => "The page had no readable text.".to_string(),
        Ok(text) => text,
        Err(e) => {
            warn!("fetch_page failed for {url}: {e:#}");
            format!("Could not fetch {url}")
        }
    }
}

fn non_empty(value: Option<&str>) -> Option<&str> {
    value.map(str::trim).filter(|v| !v.is_empty())
}

/// Clears the run entry however the task ends, unless a newer run replaced it.
struct RunCleanup {
    runs: Arc<DashMap<Uuid, RunEntry>>,
    application_id: Uuid,
    run_id: u64,
}

impl Drop for RunCleanup {
    fn drop(&mut self) {
        self.runs
            .remove_if(&self.application_id, |_, entry| entry.run_id == self.run_id);
    }
}
