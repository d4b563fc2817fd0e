use async_trait::async_trait;
use stackforge_core::plan::{default_plan, DIAGNOSIS_STEP, FIX_STEP, VERIFICATION_STEP_TITLE};
use stackforge_core::{Job, Step, StepId, StepStatus};
use tracing::{error, info, warn};

use super::{step_command, OrchestrationStrategy};
use crate::context::StrategyContext;
use crate::error::Result;

/// The diagnosis/fix pair injected after a failed verification step.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RemediationPlan {
    /// The failed step that flips to success once `fix` succeeds
    pub target: StepId,
    pub diagnosis: StepId,
    pub fix: StepId,
    pub resolved: bool,
}

impl RemediationPlan {
    pub fn new(target: StepId, first_id: StepId) -> Self {
        Self {
            target,
            diagnosis: first_id,
            fix: first_id + 1,
            resolved: false,
        }
    }

    pub fn steps(&self) -> [Step; 2] {
        [
            DIAGNOSIS_STEP.to_step(self.diagnosis),
            FIX_STEP.to_step(self.fix),
        ]
    }

    pub fn active_status_for(&self, step_id: StepId) -> StepStatus {
        if step_id == self.diagnosis {
            StepStatus::Diagnosing
        } else if step_id == self.fix {
            StepStatus::Fixing
        } else {
            StepStatus::InProgress
        }
    }
}

/// Fixed plan, strictly sequential, with one round of remediation when the
/// verification step fails.
pub struct ScriptedStrategy {
    plan: Vec<Step>,
    fail_first_verification: bool,
}

impl Default for ScriptedStrategy {
    fn default() -> Self {
        Self::new()
    }
}

impl ScriptedStrategy {
    pub fn new() -> Self {
        Self {
            plan: default_plan(),
            fail_first_verification: true,
        }
    }

    pub fn with_plan(mut self, plan: Vec<Step>) -> Self {
        self.plan = plan;
        self
    }

    /// Whether the first verification attempt is forced to fail, which
    /// exercises the remediation path on every run.
    pub fn with_first_verification_failure(mut self, enabled: bool) -> Self {
        self.fail_first_verification = enabled;
        self
    }

    async fn flip_target(
        &self,
        ctx: &StrategyContext,
        job_id: &str,
        steps: &mut [Step],
        remediation: &mut RemediationPlan,
    ) -> Result<()> {
        remediation.resolved = true;
        let Some(target) = steps.iter_mut().find(|s| s.id == remediation.target) else {
            return Ok(());
        };
        ctx.transition(job_id, target, StepStatus::Success).await?;
        info!(
            job_id,
            step_id = target.id,
            title = %target.title,
            "Remediation step completed"
        );
        Ok(())
    }
}

#[async_trait]
impl OrchestrationStrategy for ScriptedStrategy {
    fn name(&self) -> &'static str {
        "scripted"
    }

    async fn run(&self, ctx: &StrategyContext, job: &Job) -> Result<()> {
        let job_id = job.id.as_str();
        info!(job_id, description = %job.description, "Starting orchestration job");

        let mut steps = ctx.initialize_steps(job_id, &self.plan).await?;
        for step in &mut steps {
            step.status = StepStatus::Pending;
        }
        let mut next_id = steps.iter().map(|s| s.id + 1).max().unwrap_or(0);
        let mut remediation: Option<RemediationPlan> = None;

        let mut index = 0;
        while index < steps.len() {
            let active = remediation
                .as_ref()
                .map_or(StepStatus::InProgress, |r| r.active_status_for(steps[index].id));
            ctx.transition(job_id, &mut steps[index], active).await?;

            let step = &steps[index];
            info!(
                job_id,
                step_id = step.id,
                title = %step.title,
                service = %step.service,
                "Step started"
            );

            let is_verification = step.title == VERIFICATION_STEP_TITLE;
            let recoverable = is_verification && remediation.is_none();
            let simulate_failure = recoverable && self.fail_first_verification;
            let result = ctx
                .execute(job_id, &step_command(step), simulate_failure)
                .await;

            if !result.success {
                let error_message = result
                    .error
                    .unwrap_or_else(|| "MCP command failed".to_string());
                ctx.transition(job_id, &mut steps[index], StepStatus::Failure)
                    .await?;
                let step = &steps[index];

                if recoverable {
                    warn!(
                        job_id,
                        step_id = step.id,
                        title = %step.title,
                        error = %error_message,
                        "Step failed"
                    );
                    let plan = RemediationPlan::new(step.id, next_id);
                    next_id += 2;
                    let injected = plan.steps();
                    steps.extend(injected.iter().cloned());
                    ctx.append_steps(job_id, &injected).await?;
                    info!(
                        job_id,
                        diagnosis = plan.diagnosis,
                        fix = plan.fix,
                        "Appended remediation steps"
                    );
                    remediation = Some(plan);
                    index += 1;
                    continue;
                }

                error!(
                    job_id,
                    step_id = step.id,
                    title = %step.title,
                    error = %error_message,
                    "Critical step failure"
                );
                ctx.fail_job(job_id, &error_message).await?;
                return Ok(());
            }

            ctx.transition(job_id, &mut steps[index], StepStatus::Success)
                .await?;
            info!(job_id, step_id = steps[index].id, "Step completed");

            if let Some(plan) = remediation.as_mut() {
                if !plan.resolved && steps[index].id == plan.fix {
                    self.flip_target(ctx, job_id, &mut steps, plan).await?;
                }
            }
            index += 1;
        }

        ctx.complete_job(job_id).await?;
        info!(job_id, total_steps = steps.len(), "Orchestration job completed");
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::context::test_support::*;
    use events::Event;
    use stackforge_core::plan::BASE_PLAN;
    use stackforge_core::JobStatus;

    fn collect(sub: &mut events::Subscription) -> Vec<Event> {
        let mut events = Vec::new();
        while let Some(raw) = sub.try_recv() {
            events.push(serde_json::from_str(&raw).unwrap());
        }
        events
    }

    #[tokio::test]
    async fn test_remediation_recovers_verification_failure() {
        let ctx = context_with(instant_executor());
        let job = running_job(&ctx, "X").await;

        ScriptedStrategy::new().run(&ctx, &job).await.unwrap();

        let stored = ctx.jobs.get(&job.id).await.unwrap().unwrap();
        assert_eq!(stored.status, JobStatus::Completed);

        let steps = ctx.steps.get(&job.id).await.unwrap();
        assert_eq!(steps.len(), BASE_PLAN.len() + 2);
        assert!(steps.iter().all(|s| s.status == StepStatus::Success));

        let verification = steps
            .iter()
            .find(|s| s.title == VERIFICATION_STEP_TITLE)
            .unwrap();
        assert_eq!(verification.status, StepStatus::Success);
        assert_eq!(steps[12].title, DIAGNOSIS_STEP.title);
        assert_eq!(steps[13].title, FIX_STEP.title);
        assert_eq!(steps[13].service, "GitHub");
    }

    #[tokio::test]
    async fn test_remediation_event_sequence() {
        let ctx = context_with(instant_executor());
        let job = running_job(&ctx, "X").await;
        let mut sub = ctx.events.subscribe();

        ScriptedStrategy::new().run(&ctx, &job).await.unwrap();

        let events = collect(&mut sub);
        let appends: Vec<_> = events
            .iter()
            .filter_map(|e| match e {
                Event::StepsAppend { steps, .. } => Some(steps.iter().map(|s| s.id).collect::<Vec<_>>()),
                _ => None,
            })
            .collect();
        assert_eq!(appends, vec![vec![12, 13]]);

        let statuses: Vec<(u32, StepStatus)> = events
            .iter()
            .filter_map(|e| match e {
                Event::StepUpdate { step, .. } => Some((step.id, step.status)),
                _ => None,
            })
            .collect();
        assert!(statuses.contains(&(10, StepStatus::Failure)));
        assert!(statuses.contains(&(12, StepStatus::Diagnosing)));
        assert!(statuses.contains(&(13, StepStatus::Fixing)));
        // The flip-back follows the fix step's success.
        let tail = &statuses[statuses.len() - 2..];
        assert_eq!(tail, &[(13, StepStatus::Success), (10, StepStatus::Success)]);

        assert_eq!(events.last().unwrap().kind(), "job:completed");
    }

    #[tokio::test]
    async fn test_one_step_in_progress_at_a_time() {
        let ctx = context_with(instant_executor());
        let job = running_job(&ctx, "X").await;
        let mut sub = ctx.events.subscribe();

        ScriptedStrategy::new().run(&ctx, &job).await.unwrap();

        let mut active: Option<u32> = None;
        for event in collect(&mut sub) {
            if let Event::StepUpdate { step, .. } = event {
                if step.status.is_active() {
                    assert!(active.is_none(), "step {} started while {:?} active", step.id, active);
                    active = Some(step.id);
                } else if active == Some(step.id) {
                    active = None;
                }
            }
        }
        assert!(active.is_none());
    }

    #[tokio::test]
    async fn test_repeated_verification_failure_is_terminal() {
        let executor = instant_executor().with_forced_failure(VERIFICATION_STEP_TITLE);
        let ctx = context_with(executor);
        let job = running_job(&ctx, "X").await;
        let plan = vec![
            Step::new(0, "Parse SaaS Definition", "d", "Orchestrator"),
            Step::new(1, VERIFICATION_STEP_TITLE, "first check", "Chrome DevTools"),
            Step::new(2, "Deploy to Vercel", "d", "Vercel"),
            Step::new(3, VERIFICATION_STEP_TITLE, "second check", "Chrome DevTools"),
        ];

        ScriptedStrategy::new()
            .with_plan(plan)
            .run(&ctx, &job)
            .await
            .unwrap();

        let stored = ctx.jobs.get(&job.id).await.unwrap().unwrap();
        assert_eq!(stored.status, JobStatus::Failed);

        let steps = ctx.steps.get(&job.id).await.unwrap();
        assert_eq!(steps.len(), 6);
        assert_eq!(steps[3].status, StepStatus::Failure);
        // Remediation never ran.
        assert_eq!(steps[4].status, StepStatus::Pending);
        assert_eq!(steps[5].status, StepStatus::Pending);
    }

    #[tokio::test]
    async fn test_failure_during_remediation_is_terminal() {
        let executor = instant_executor().with_forced_failure(DIAGNOSIS_STEP.title);
        let ctx = context_with(executor);
        let job = running_job(&ctx, "X").await;
        let mut sub = ctx.events.subscribe();

        ScriptedStrategy::new().run(&ctx, &job).await.unwrap();

        let stored = ctx.jobs.get(&job.id).await.unwrap().unwrap();
        assert_eq!(stored.status, JobStatus::Failed);

        let steps = ctx.steps.get(&job.id).await.unwrap();
        assert_eq!(steps[10].status, StepStatus::Failure);
        assert_eq!(steps[12].status, StepStatus::Failure);
        assert_eq!(steps[13].status, StepStatus::Pending);

        let last = collect(&mut sub).pop().unwrap();
        assert!(matches!(last, Event::JobFailed { ref error, .. } if error.contains(DIAGNOSIS_STEP.title)));
    }

    #[tokio::test]
    async fn test_ordinary_failure_halts_job() {
        let executor = instant_executor().with_forced_failure("Provision Database");
        let ctx = context_with(executor);
        let job = running_job(&ctx, "X").await;

        ScriptedStrategy::new().run(&ctx, &job).await.unwrap();

        let steps = ctx.steps.get(&job.id).await.unwrap();
        assert_eq!(steps.len(), BASE_PLAN.len());
        assert_eq!(steps[3].status, StepStatus::Failure);
        assert!(steps[4..].iter().all(|s| s.status == StepStatus::Pending));
        assert_eq!(
            ctx.jobs.get(&job.id).await.unwrap().unwrap().status,
            JobStatus::Failed
        );
    }

    #[tokio::test]
    async fn test_without_forced_verification_failure() {
        let ctx = context_with(instant_executor());
        let job = running_job(&ctx, "X").await;

        ScriptedStrategy::new()
            .with_first_verification_failure(false)
            .run(&ctx, &job)
            .await
            .unwrap();

        assert_eq!(ctx.steps.get(&job.id).await.unwrap().len(), BASE_PLAN.len());
        assert_eq!(
            ctx.jobs.get(&job.id).await.unwrap().unwrap().status,
            JobStatus::Completed
        );
    }

    #[test]
    fn test_remediation_plan_ids() {
        let plan = RemediationPlan::new(10, 12);
        let [diagnosis, fix] = plan.steps();

        assert_eq!(diagnosis.id, 12);
        assert_eq!(fix.id, 13);
        assert_eq!(plan.active_status_for(12), StepStatus::Diagnosing);
        assert_eq!(plan.active_status_for(13), StepStatus::Fixing);
        assert_eq!(plan.active_status_for(3), StepStatus::InProgress);
    }
}
