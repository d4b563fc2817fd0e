use std::sync::Arc;

use db::{JobRepository, StepRepository};
use events::{Event, EventBus};
use stackforge_core::{Command, CommandResult, JobStatus, Step, StepStatus};
use tracing::{debug, warn};

use crate::error::Result;
use crate::executor::{CommandExecutor, ExecutorOptions};
use crate::state_machine::StepStateMachine;

/// Everything a strategy run touches. Each helper persists first, then
/// broadcasts, so observers never see a state the store does not have.
#[derive(Clone)]
pub struct StrategyContext {
    pub jobs: JobRepository,
    pub steps: StepRepository,
    pub events: EventBus,
    pub executor: Arc<CommandExecutor>,
}

impl StrategyContext {
    pub fn new(
        jobs: JobRepository,
        steps: StepRepository,
        events: EventBus,
        executor: Arc<CommandExecutor>,
    ) -> Self {
        Self {
            jobs,
            steps,
            events,
            executor,
        }
    }

    /// Validated step transition, persisted and broadcast as `step:update`.
    pub async fn transition(&self, job_id: &str, step: &mut Step, to: StepStatus) -> Result<()> {
        StepStateMachine::validate_transition(step.id, step.status, to)?;
        step.status = to;
        self.steps.upsert(job_id, step).await?;
        debug!(job_id, step_id = step.id, status = %to, "Step transitioned");
        self.events.broadcast(&Event::StepUpdate {
            job_id: job_id.to_string(),
            step: step.clone(),
        });
        Ok(())
    }

    /// Replace the job's step list without announcing it.
    pub async fn initialize_steps(&self, job_id: &str, steps: &[Step]) -> Result<Vec<Step>> {
        Ok(self.steps.initialize(job_id, steps).await?)
    }

    /// Append steps and broadcast the ones actually added as `steps:append`.
    pub async fn append_steps(&self, job_id: &str, steps: &[Step]) -> Result<Vec<Step>> {
        let added = self.steps.append(job_id, steps).await?;
        if !added.is_empty() {
            self.events.broadcast(&Event::StepsAppend {
                job_id: job_id.to_string(),
                steps: added.clone(),
            });
        }
        Ok(added)
    }

    pub fn announce_steps(&self, job_id: &str, steps: &[Step]) {
        self.events.broadcast(&Event::StepsAppend {
            job_id: job_id.to_string(),
            steps: steps.to_vec(),
        });
    }

    pub async fn execute(
        &self,
        job_id: &str,
        command: &Command,
        simulate_failure: bool,
    ) -> CommandResult {
        let options = ExecutorOptions::for_job(job_id).with_simulated_failure(simulate_failure);
        self.executor.execute(command, &options).await
    }

    /// Broadcasts `job:completed` only if the job actually moved there.
    pub async fn complete_job(&self, job_id: &str) -> Result<()> {
        if self.jobs.transition(job_id, JobStatus::Completed).await?.is_none() {
            warn!(job_id, "Job not completed, no event sent");
            return Ok(());
        }
        self.events.broadcast(&Event::JobCompleted {
            job_id: job_id.to_string(),
        });
        Ok(())
    }

    pub async fn fail_job(&self, job_id: &str, error: &str) -> Result<()> {
        if self.jobs.transition(job_id, JobStatus::Failed).await?.is_none() {
            warn!(job_id, error, "Job not failed, no event sent");
            return Ok(());
        }
        self.events.broadcast(&Event::JobFailed {
            job_id: job_id.to_string(),
            error: error.to_string(),
        });
        Ok(())
    }
}
