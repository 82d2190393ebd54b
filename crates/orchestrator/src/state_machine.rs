use leadlens_core::RunStatus;

use crate::error::{OrchestratorError, Result};

pub struct RunStateMachine;

impl RunStateMachine {
    pub fn validate_transition(from: &RunStatus, to: &RunStatus) -> Result<()> {
        let allowed = Self::allowed_transitions(from);

        if allowed.contains(to) {
            Ok(())
        } else {
            Err(OrchestratorError::InvalidTransition {
                from: from.as_str().to_string(),
                to: to.as_str().to_string(),
            })
        }
    }

    fn allowed_transitions(from: &RunStatus) -> Vec<RunStatus> {
        match from {
            RunStatus::Pending => vec![RunStatus::Running, RunStatus::Cancelled],
            RunStatus::Running => vec![
                RunStatus::PhaseComplete,
                RunStatus::WaitingForUser,
                RunStatus::Review,
                RunStatus::Completed,
                RunStatus::Failed,
                RunStatus::Cancelled,
            ],
            RunStatus::PhaseComplete => vec![
                RunStatus::Running,
                RunStatus::Completed,
                RunStatus::Failed,
                RunStatus::Cancelled,
            ],
            RunStatus::WaitingForUser => vec![RunStatus::Running, RunStatus::Cancelled],
            RunStatus::Review => vec![
                RunStatus::Completed,
                RunStatus::Failed,
                RunStatus::Cancelled,
            ],
            RunStatus::Completed | RunStatus::Failed | RunStatus::Cancelled => vec![],
        }
    }

    pub fn can_transition(from: &RunStatus, to: &RunStatus) -> bool {
        Self::validate_transition(from, to).is_ok()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_valid_transitions() {
        assert!(RunStateMachine::can_transition(
            &RunStatus::Pending,
            &RunStatus::Running
        ));
        assert!(RunStateMachine::can_transition(
            &RunStatus::Running,
            &RunStatus::WaitingForUser
        ));
        assert!(RunStateMachine::can_transition(
            &RunStatus::WaitingForUser,
            &RunStatus::Running
        ));
        assert!(RunStateMachine::can_transition(
            &RunStatus::PhaseComplete,
            &RunStatus::Running
        ));
    }

    #[test]
    fn test_cancel_from_any_non_terminal() {
        for status in [
            RunStatus::Pending,
            RunStatus::Running,
            RunStatus::PhaseComplete,
            RunStatus::WaitingForUser,
            RunStatus::Review,
        ] {
            assert!(RunStateMachine::can_transition(
                &status,
                &RunStatus::Cancelled
            ));
        }
    }

    #[test]
    fn test_terminal_states_allow_nothing() {
        for terminal in [RunStatus::Completed, RunStatus::Failed, RunStatus::Cancelled] {
            for target in [
                RunStatus::Pending,
                RunStatus::Running,
                RunStatus::Completed,
                RunStatus::Cancelled,
            ] {
                assert!(!RunStateMachine::can_transition(&terminal, &target));
            }
        }
    }

    #[test]
    fn test_invalid_transitions() {
        assert!(!RunStateMachine::can_transition(
            &RunStatus::Pending,
            &RunStatus::Completed
        ));
        assert!(!RunStateMachine::can_transition(
            &RunStatus::WaitingForUser,
            &RunStatus::Completed
        ));
    }
}
