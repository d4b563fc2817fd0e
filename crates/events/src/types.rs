//! Event types pushed to orchestration observers

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use stackforge_core::Step;

/// All events observers can receive.
///
/// Serialized with a `type` tag (`job:queued`, `step:update`, ...) and
/// camelCase fields, so one event carries enough state for an observer to
/// update its view without re-fetching the job.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[cfg_attr(feature = "typescript", derive(ts_rs::TS))]
#[cfg_attr(feature = "typescript", ts(export))]
#[serde(tag = "type")]
pub enum Event {
    /// First frame on every new subscription
    #[serde(rename = "connection:ack")]
    ConnectionAck {
        message: String,
        timestamp: DateTime<Utc>,
    },

    #[serde(rename = "job:queued", rename_all = "camelCase")]
    JobQueued { job_id: String, description: String },

    #[serde(rename = "job:started", rename_all = "camelCase")]
    JobStarted { job_id: String },

    #[serde(rename = "job:completed", rename_all = "camelCase")]
    JobCompleted { job_id: String },

    #[serde(rename = "job:failed", rename_all = "camelCase")]
    JobFailed { job_id: String, error: String },

    /// Snapshot of one step after a state change
    #[serde(rename = "step:update", rename_all = "camelCase")]
    StepUpdate { job_id: String, step: Step },

    /// Steps added to the job's list, in id order
    #[serde(rename = "steps:append", rename_all = "camelCase")]
    StepsAppend { job_id: String, steps: Vec<Step> },

    /// Any tag this build does not know; observers ignore it
    #[serde(other)]
    Unknown,
}

impl Event {
    pub fn connection_ack() -> Self {
        Event::ConnectionAck {
            message: "Connected to orchestration event stream.".to_string(),
            timestamp: Utc::now(),
        }
    }

    /// The wire tag of this event.
    pub fn kind(&self) -> &'static str {
        match self {
            Event::ConnectionAck { .. } => "connection:ack",
            Event::JobQueued { .. } => "job:queued",
            Event::JobStarted { .. } => "job:started",
            Event::JobCompleted { .. } => "job:completed",
            Event::JobFailed { .. } => "job:failed",
            Event::StepUpdate { .. } => "step:update",
            Event::StepsAppend { .. } => "steps:append",
            Event::Unknown => "unknown",
        }
    }

    /// Get the job ID associated with this event, if any
    pub fn job_id(&self) -> Option<&str> {
        match self {
            Event::JobQueued { job_id, .. }
            | Event::JobStarted { job_id }
            | Event::JobCompleted { job_id }
            | Event::JobFailed { job_id, .. }
            | Event::StepUpdate { job_id, .. }
            | Event::StepsAppend { job_id, .. } => Some(job_id),
            Event::ConnectionAck { .. } | Event::Unknown => None,
        }
    }

    pub fn is_terminal(&self) -> bool {
        matches!(self, Event::JobCompleted { .. } | Event::JobFailed { .. })
    }
}
