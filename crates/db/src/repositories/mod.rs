mod job_repository;
mod step_repository;

pub use job_repository::{ClaimResult, JobRepository};
pub use step_repository::StepRepository;

/// Prefix shared by every job-related key.
pub const JOB_KEY_PREFIX: &str = "job:";

const STEPS_KEY_SUFFIX: &str = ":steps";

pub fn job_key(job_id: &str) -> String {
    format!("{JOB_KEY_PREFIX}{job_id}")
}

pub fn steps_key(job_id: &str) -> String {
    format!("{JOB_KEY_PREFIX}{job_id}{STEPS_KEY_SUFFIX}")
}

fn is_steps_key(key: &str) -> bool {
    key.ends_with(STEPS_KEY_SUFFIX)
}
