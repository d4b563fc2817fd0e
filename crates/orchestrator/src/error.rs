use stackforge_core::{CoreError, JobStatus, StepId, StepStatus};
use thiserror::Error;

#[derive(Debug, Error)]
pub enum OrchestratorError {
    #[error("Validation error: {0}")]
    Validation(String),

    #[error("Job not found: {0}")]
    JobNotFound(String),

    #[error("Job {job_id} already started (status: {status})")]
    JobAlreadyStarted { job_id: String, status: JobStatus },

    #[error("Unsupported {service} command \"{action}\"")]
    AdapterUnsupported { service: String, action: String },

    #[error("Invalid transition for step {step_id} from {from} to {to}")]
    InvalidStepTransition {
        step_id: StepId,
        from: StepStatus,
        to: StepStatus,
    },

    #[error("Transport error: {0}")]
    Transport(#[from] mcp::TransportError),

    #[error("Plan generation failed: {0}")]
    Planner(String),

    #[error("Database error: {0}")]
    Database(#[from] db::DbError),

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
}

impl OrchestratorError {
    pub fn unsupported(service: impl Into<String>, action: impl Into<String>) -> Self {
        Self::AdapterUnsupported {
            service: service.into(),
            action: action.into(),
        }
    }

    pub fn planner(reason: impl Into<String>) -> Self {
        Self::Planner(reason.into())
    }
}

impl From<CoreError> for OrchestratorError {
    fn from(error: CoreError) -> Self {
        match error {
            CoreError::Validation(message) => Self::Validation(message),
        }
    }
}

pub type Result<T> = std::result::Result<T, OrchestratorError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_messages() {
        let error = OrchestratorError::unsupported("GitHub", "Delete Everything");
        assert_eq!(
            error.to_string(),
            "Unsupported GitHub command \"Delete Everything\""
        );

        let error = OrchestratorError::JobAlreadyStarted {
            job_id: "job_1_1".to_string(),
            status: JobStatus::Running,
        };
        assert_eq!(error.to_string(), "Job job_1_1 already started (status: running)");
    }

    #[test]
    fn test_validation_from_core() {
        let error: OrchestratorError = stackforge_core::validate_description(" ")
            .unwrap_err()
            .into();
        assert!(matches!(error, OrchestratorError::Validation(_)));
    }
}
