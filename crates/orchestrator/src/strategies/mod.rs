//! Policies that turn a job into a step plan and drive it to completion

mod planned;
mod scripted;

use async_trait::async_trait;
use stackforge_core::{Command, Job, Step};

use crate::context::StrategyContext;
use crate::error::Result;

pub use planned::PlannedStrategy;
pub use scripted::{RemediationPlan, ScriptedStrategy};

#[async_trait]
pub trait OrchestrationStrategy: Send + Sync {
    fn name(&self) -> &'static str;

    /// Run every step of `job`, which the caller has already moved to
    /// `running`. A step failure that ends the job is recorded on the job and
    /// returns `Ok`; `Err` means the run itself broke.
    async fn run(&self, ctx: &StrategyContext, job: &Job) -> Result<()>;
}

/// The command a step stands for: its service, its title as the action.
pub(crate) fn step_command(step: &Step) -> Command {
    Command::new(&step.service, &step.title).with_arg("details", step.details.as_str())
}
