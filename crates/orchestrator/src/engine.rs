//! Job submission, supervision and queries

use std::panic::AssertUnwindSafe;
use std::sync::Arc;

use db::{ClaimResult, JobRepository, KeyValueStore, StepRepository};
use events::{Event, EventBus};
use futures::FutureExt;
use serde::Serialize;
use stackforge_core::{validate_description, Job, Step};
use tracing::{error, info, warn};

use crate::adapters::AdapterRegistry;
use crate::config::{OrchestratorConfig, StrategyKind};
use crate::context::StrategyContext;
use crate::error::{OrchestratorError, Result};
use crate::executor::{panic_message, CommandExecutor};
use crate::planner::{GeminiPlanner, PlanGenerator};
use crate::strategies::{OrchestrationStrategy, PlannedStrategy, ScriptedStrategy};

/// A job together with its current step list.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[cfg_attr(feature = "typescript", derive(ts_rs::TS))]
#[cfg_attr(feature = "typescript", ts(export))]
#[serde(rename_all = "camelCase")]
pub struct JobDetails {
    pub job: Job,
    pub steps: Vec<Step>,
}

#[derive(Clone)]
pub struct OrchestrationEngine {
    ctx: StrategyContext,
    strategy: StrategyKind,
    scripted: Arc<dyn OrchestrationStrategy>,
    planned: Option<Arc<dyn OrchestrationStrategy>>,
}

impl OrchestrationEngine {
    pub fn new(ctx: StrategyContext, strategy: StrategyKind) -> Self {
        Self {
            ctx,
            strategy,
            scripted: Arc::new(ScriptedStrategy::new()),
            planned: None,
        }
    }

    /// Wire repositories, adapters, executor and planner from configuration.
    pub fn from_config(
        config: &OrchestratorConfig,
        store: Arc<dyn KeyValueStore>,
        events: EventBus,
    ) -> Self {
        let registry = Arc::new(AdapterRegistry::from_config(config));
        let executor = CommandExecutor::new(config.execution_mode, registry);
        let ctx = StrategyContext::new(
            JobRepository::new(Arc::clone(&store), config.job_retention),
            StepRepository::new(store, config.job_retention),
            events,
            Arc::new(executor),
        );

        let engine = Self::new(ctx, config.strategy);
        match GeminiPlanner::from_config(&config.gemini) {
            Some(planner) => engine.with_planner(Arc::new(planner)),
            None => engine,
        }
    }

    pub fn with_planner(mut self, planner: Arc<dyn PlanGenerator>) -> Self {
        self.planned = Some(Arc::new(PlannedStrategy::new(planner)));
        self
    }

    pub fn with_scripted_strategy(mut self, strategy: Arc<dyn OrchestrationStrategy>) -> Self {
        self.scripted = strategy;
        self
    }

    pub fn with_executor(mut self, executor: CommandExecutor) -> Self {
        self.ctx.executor = Arc::new(executor);
        self
    }

    pub fn with_strategy(mut self, strategy: StrategyKind) -> Self {
        self.strategy = strategy;
        self
    }

    pub fn events(&self) -> &EventBus {
        &self.ctx.events
    }

    pub fn strategy(&self) -> StrategyKind {
        self.strategy
    }

    /// Create a job and start it in the background.
    pub async fn submit(&self, description: &str) -> Result<Job> {
        let job = self.create_job(description).await?;
        let engine = self.clone();
        let job_id = job.id.clone();
        tokio::spawn(async move {
            engine.run_supervised(&job_id).await;
        });
        Ok(job)
    }

    /// Validate, persist and announce a queued job without running it.
    pub async fn create_job(&self, description: &str) -> Result<Job> {
        let description = validate_description(description)?;
        let job = self.ctx.jobs.create(&Job::new(description)).await?;
        info!(job_id = %job.id, "Job queued");
        self.ctx.events.broadcast(&Event::JobQueued {
            job_id: job.id.clone(),
            description: job.description.clone(),
        });
        Ok(job)
    }

    /// Claim a queued job and drive it to a terminal state.
    ///
    /// A job runs at most once: a second call fails with
    /// [`OrchestratorError::JobAlreadyStarted`].
    pub async fn run(&self, job_id: &str) -> Result<()> {
        let job = match self.ctx.jobs.claim(job_id).await? {
            ClaimResult::Claimed(job) => job,
            ClaimResult::NotFound => return Err(OrchestratorError::JobNotFound(job_id.to_string())),
            ClaimResult::AlreadyClaimed(status) => {
                return Err(OrchestratorError::JobAlreadyStarted {
                    job_id: job_id.to_string(),
                    status,
                })
            }
        };

        self.ctx.events.broadcast(&Event::JobStarted {
            job_id: job.id.clone(),
        });

        let strategy = self.select_strategy();
        info!(job_id, strategy = strategy.name(), "Job started");
        strategy.run(&self.ctx, &job).await
    }

    /// [`run`](Self::run) that never leaves a job stuck in `running`.
    pub async fn run_supervised(&self, job_id: &str) {
        let outcome = AssertUnwindSafe(self.run(job_id)).catch_unwind().await;
        let reason = match outcome {
            Ok(Ok(())) => return,
            Ok(Err(
                e @ (OrchestratorError::JobNotFound(_) | OrchestratorError::JobAlreadyStarted { .. }),
            )) => {
                warn!(job_id, error = %e, "Job not run");
                return;
            }
            Ok(Err(e)) => e.to_string(),
            Err(panic) => format!("Strategy panicked: {}", panic_message(panic.as_ref())),
        };

        error!(job_id, error = %reason, "Orchestration job crashed");
        if let Err(e) = self.fail_unfinished(job_id, &reason).await {
            error!(job_id, error = %e, "Failed to mark crashed job as failed");
        }
    }

    async fn fail_unfinished(&self, job_id: &str, reason: &str) -> Result<()> {
        let Some(job) = self.ctx.jobs.get(job_id).await? else {
            return Ok(());
        };
        if job.status.is_terminal() {
            return Ok(());
        }
        self.ctx.fail_job(job_id, reason).await
    }

    fn select_strategy(&self) -> Arc<dyn OrchestrationStrategy> {
        match (self.strategy, &self.planned) {
            (StrategyKind::Planned, Some(planned)) => Arc::clone(planned),
            (StrategyKind::Planned, None) => {
                warn!("Planned strategy requested without a planner, using scripted");
                Arc::clone(&self.scripted)
            }
            (StrategyKind::Scripted, _) => Arc::clone(&self.scripted),
        }
    }

    pub async fn get_snapshot(&self, job_id: &str) -> Result<Vec<Step>> {
        Ok(self.ctx.steps.get(job_id).await?)
    }

    pub async fn get_job(&self, job_id: &str) -> Result<Option<Job>> {
        Ok(self.ctx.jobs.get(job_id).await?)
    }

    pub async fn get_job_details(&self, job_id: &str) -> Result<Option<JobDetails>> {
        let Some(job) = self.get_job(job_id).await? else {
            return Ok(None);
        };
        let steps = self.get_snapshot(job_id).await?;
        Ok(Some(JobDetails { job, steps }))
    }

    pub async fn list_jobs(&self) -> Result<Vec<Job>> {
        Ok(self.ctx.jobs.list().await?)
    }
}
