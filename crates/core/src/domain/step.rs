use serde::{Deserialize, Serialize};

pub type StepId = u32;

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Default, Hash)]
#[cfg_attr(feature = "typescript", derive(ts_rs::TS))]
#[cfg_attr(feature = "typescript", ts(export))]
#[serde(rename_all = "kebab-case")]
pub enum StepStatus {
    #[default]
    Pending,
    InProgress,
    Success,
    Failure,
    /// Active state of a diagnosis remediation step
    Diagnosing,
    /// Active state of a fix remediation step
    Fixing,
}

impl StepStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Pending => "pending",
            Self::InProgress => "in-progress",
            Self::Success => "success",
            Self::Failure => "failure",
            Self::Diagnosing => "diagnosing",
            Self::Fixing => "fixing",
        }
    }

    pub fn is_active(&self) -> bool {
        matches!(self, Self::InProgress | Self::Diagnosing | Self::Fixing)
    }

    pub fn is_terminal(&self) -> bool {
        matches!(self, Self::Success | Self::Failure)
    }

    pub fn can_transition(&self, to: StepStatus) -> bool {
        match self {
            Self::Pending => to.is_active(),
            Self::InProgress | Self::Diagnosing | Self::Fixing => to.is_terminal(),
            // Only remediation bookkeeping may revisit a failed step.
            Self::Failure => to == Self::Success,
            Self::Success => false,
        }
    }
}

impl std::fmt::Display for StepStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[cfg_attr(feature = "typescript", derive(ts_rs::TS))]
#[cfg_attr(feature = "typescript", ts(export))]
pub struct Step {
    pub id: StepId,
    pub title: String,
    pub details: String,
    pub service: String,
    pub status: StepStatus,
}

impl Step {
    pub fn new(
        id: StepId,
        title: impl Into<String>,
        details: impl Into<String>,
        service: impl Into<String>,
    ) -> Self {
        Self {
            id,
            title: title.into(),
            details: details.into(),
            service: service.into(),
            status: StepStatus::Pending,
        }
    }

    pub fn with_status(mut self, status: StepStatus) -> Self {
        self.status = status;
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_step_creation() {
        let step = Step::new(3, "Provision Database", "Create tables", "Supabase");

        assert_eq!(step.id, 3);
        assert_eq!(step.status, StepStatus::Pending);
        assert_eq!(step.service, "Supabase");
    }

    #[test]
    fn test_step_status_serialization() {
        assert_eq!(
            serde_json::to_string(&StepStatus::InProgress).unwrap(),
            "\"in-progress\""
        );
        assert_eq!(
            serde_json::from_str::<StepStatus>("\"diagnosing\"").unwrap(),
            StepStatus::Diagnosing
        );
    }

    #[test]
    fn test_valid_step_transitions() {
        assert!(StepStatus::Pending.can_transition(StepStatus::InProgress));
        assert!(StepStatus::Pending.can_transition(StepStatus::Diagnosing));
        assert!(StepStatus::Fixing.can_transition(StepStatus::Success));
        assert!(StepStatus::InProgress.can_transition(StepStatus::Failure));
        assert!(StepStatus::Failure.can_transition(StepStatus::Success));
    }

    #[test]
    fn test_invalid_step_transitions() {
        assert!(!StepStatus::Pending.can_transition(StepStatus::Success));
        assert!(!StepStatus::Success.can_transition(StepStatus::Failure));
        assert!(!StepStatus::Success.can_transition(StepStatus::InProgress));
        assert!(!StepStatus::Failure.can_transition(StepStatus::InProgress));
        assert!(!StepStatus::InProgress.can_transition(StepStatus::Pending));
    }
}
