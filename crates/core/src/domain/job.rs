use std::sync::atomic::{AtomicU64, Ordering};

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

static JOB_COUNTER: AtomicU64 = AtomicU64::new(0);

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Default, Hash)]
#[cfg_attr(feature = "typescript", derive(ts_rs::TS))]
#[cfg_attr(feature = "typescript", ts(export))]
#[serde(rename_all = "snake_case")]
pub enum JobStatus {
    #[default]
    Queued,
    Running,
    Completed,
    Failed,
}

impl JobStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Queued => "queued",
            Self::Running => "running",
            Self::Completed => "completed",
            Self::Failed => "failed",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "queued" => Some(Self::Queued),
            "running" => Some(Self::Running),
            "completed" => Some(Self::Completed),
            "failed" => Some(Self::Failed),
            _ => None,
        }
    }

    pub fn is_terminal(&self) -> bool {
        matches!(self, Self::Completed | Self::Failed)
    }

    /// Forward-only lifecycle. A queued job may fail before it ever runs
    /// (supervision failure); terminal states accept nothing.
    pub fn can_transition(&self, to: JobStatus) -> bool {
        matches!(
            (self, to),
            (Self::Queued, Self::Running)
                | (Self::Queued, Self::Failed)
                | (Self::Running, Self::Completed)
                | (Self::Running, Self::Failed)
        )
    }
}

impl std::fmt::Display for JobStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[cfg_attr(feature = "typescript", derive(ts_rs::TS))]
#[cfg_attr(feature = "typescript", ts(export))]
#[serde(rename_all = "camelCase")]
pub struct Job {
    pub id: String,
    pub description: String,
    pub status: JobStatus,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Job {
    pub fn new(description: impl Into<String>) -> Self {
        let now = Utc::now();
        Self {
            id: generate_job_id(now),
            description: description.into(),
            status: JobStatus::default(),
            created_at: now,
            updated_at: now,
        }
    }

    /// Merge a patch into this job. The status part is dropped when it would
    /// move the job backwards or out of a terminal state. Returns whether the
    /// status patch was accepted.
    pub fn apply(&mut self, patch: &JobPatch) -> bool {
        let mut accepted = true;
        if let Some(description) = &patch.description {
            self.description = description.clone();
        }
        if let Some(status) = patch.status {
            if status == self.status || self.status.can_transition(status) {
                self.status = status;
            } else {
                accepted = false;
            }
        }
        self.updated_at = Utc::now();
        accepted
    }
}

/// Millisecond timestamp plus a process-wide counter, so two jobs created in
/// the same millisecond still get distinct ids.
pub fn generate_job_id(now: DateTime<Utc>) -> String {
    let seq = JOB_COUNTER.fetch_add(1, Ordering::Relaxed) + 1;
    format!("job_{}_{}", now.timestamp_millis(), seq)
}

#[derive(Debug, Clone, Serialize, Deserialize, Default, PartialEq, Eq)]
pub struct JobPatch {
    pub description: Option<String>,
    pub status: Option<JobStatus>,
}

impl JobPatch {
    pub fn status(status: JobStatus) -> Self {
        Self {
            status: Some(status),
            ..Default::default()
        }
    }
}
