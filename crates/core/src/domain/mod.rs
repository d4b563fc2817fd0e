mod command;
mod job;
mod step;

pub use command::{Command, CommandResult};
pub use job::{generate_job_id, Job, JobPatch, JobStatus};
pub use step::{Step, StepId, StepStatus};
