use stackforge_core::{StepId, StepStatus};

use crate::error::{OrchestratorError, Result};

pub struct StepStateMachine;

impl StepStateMachine {
    pub fn validate_transition(step_id: StepId, from: StepStatus, to: StepStatus) -> Result<()> {
        if from.can_transition(to) {
            Ok(())
        } else {
            Err(OrchestratorError::InvalidStepTransition { step_id, from, to })
        }
    }

    pub fn can_transition(from: StepStatus, to: StepStatus) -> bool {
        Self::validate_transition(0, from, to).is_ok()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_valid_transitions() {
        assert!(StepStateMachine::can_transition(
            StepStatus::Pending,
            StepStatus::InProgress
        ));
        assert!(StepStateMachine::can_transition(
            StepStatus::Diagnosing,
            StepStatus::Success
        ));
        assert!(StepStateMachine::can_transition(
            StepStatus::Failure,
            StepStatus::Success
        ));
    }

    #[test]
    fn test_invalid_transition_reports_step() {
        let error =
            StepStateMachine::validate_transition(4, StepStatus::Success, StepStatus::Failure)
                .unwrap_err();

        match error {
            OrchestratorError::InvalidStepTransition { step_id, from, to } => {
                assert_eq!(step_id, 4);
                assert_eq!(from, StepStatus::Success);
                assert_eq!(to, StepStatus::Failure);
            }
            other => panic!("unexpected error: {other}"),
        }
    }
}
