use std::sync::Arc;

use async_trait::async_trait;
use stackforge_core::plan::{default_plan, sanitize_service};
use stackforge_core::{Job, Step, StepId, StepStatus};
use tracing::{error, info, warn};

use super::{step_command, OrchestrationStrategy};
use crate::context::StrategyContext;
use crate::error::Result;
use crate::planner::{PlanGenerator, PlannedStep};

/// Model-generated plan, no remediation. The first failure ends the job.
pub struct PlannedStrategy {
    planner: Arc<dyn PlanGenerator>,
}

impl PlannedStrategy {
    pub fn new(planner: Arc<dyn PlanGenerator>) -> Self {
        Self { planner }
    }

    /// Generated plan, or the default plan when generation fails or comes
    /// back empty.
    pub async fn build_plan(&self, job: &Job) -> Vec<Step> {
        match self.planner.generate_plan(&job.description).await {
            Ok(planned) if !planned.is_empty() => {
                info!(job_id = %job.id, steps = planned.len(), "Generated plan");
                to_steps(&planned)
            }
            Ok(_) => {
                warn!(job_id = %job.id, "Planner returned no steps, using default plan");
                default_plan()
            }
            Err(e) => {
                warn!(job_id = %job.id, error = %e, "Plan generation failed, using default plan");
                default_plan()
            }
        }
    }
}

fn to_steps(planned: &[PlannedStep]) -> Vec<Step> {
    planned
        .iter()
        .enumerate()
        .map(|(index, step)| {
            Step::new(
                index as StepId,
                step.title.as_str(),
                step.details.as_str(),
                sanitize_service(&step.service),
            )
        })
        .collect()
}

#[async_trait]
impl OrchestrationStrategy for PlannedStrategy {
    fn name(&self) -> &'static str {
        "planned"
    }

    async fn run(&self, ctx: &StrategyContext, job: &Job) -> Result<()> {
        let job_id = job.id.as_str();
        info!(job_id, description = %job.description, "Starting planned orchestration job");

        let plan = self.build_plan(job).await;
        let mut steps = ctx.initialize_steps(job_id, &plan).await?;
        ctx.announce_steps(job_id, &steps);

        let mode = ctx.executor.mode();
        for index in 0..steps.len() {
            ctx.transition(job_id, &mut steps[index], StepStatus::InProgress)
                .await?;

            let step = &steps[index];
            let command = step_command(step)
                .with_arg("stepIndex", index)
                .with_arg("mode", mode.as_str());
            let result = ctx.execute(job_id, &command, false).await;

            if !result.success {
                let error_message = result
                    .error
                    .unwrap_or_else(|| "MCP command failed".to_string());
                ctx.transition(job_id, &mut steps[index], StepStatus::Failure)
                    .await?;
                error!(
                    job_id,
                    step_id = steps[index].id,
                    title = %steps[index].title,
                    error = %error_message,
                    "Planned step failed"
                );
                ctx.fail_job(job_id, &error_message).await?;
                return Ok(());
            }

            ctx.transition(job_id, &mut steps[index], StepStatus::Success)
                .await?;
        }

        ctx.complete_job(job_id).await?;
        info!(job_id, total_steps = steps.len(), "Planned orchestration job completed");
        Ok(())
    }
}
