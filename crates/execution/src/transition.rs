//! Phase transition table.

use crate::error::ActionError;
use crate::phase::ActionPhase;

/// Returns `true` if an Action may move from `from` to `to`.
///
/// Every edge moves forward; the edges into `Cancelled` are the cancel
/// transition and the only way to leave a phase without finishing it.
#[must_use]
pub fn can_transition(from: ActionPhase, to: ActionPhase) -> bool {
    matches!(
        (from, to),
        (ActionPhase::Initial, ActionPhase::BeingRendered)
            | (ActionPhase::BeingRendered, ActionPhase::ReadyToRun)
            | (ActionPhase::BeingRendered, ActionPhase::Failed)
            | (ActionPhase::BeingRendered, ActionPhase::Cancelled)
            | (ActionPhase::ReadyToRun, ActionPhase::Running)
            | (ActionPhase::ReadyToRun, ActionPhase::Cancelled)
            | (ActionPhase::Running, ActionPhase::Succeeded)
            | (ActionPhase::Running, ActionPhase::Failed)
            | (ActionPhase::Running, ActionPhase::Cancelled)
    )
}

/// Validate a transition, returning an error if it is not in the table.
pub fn validate_transition(from: ActionPhase, to: ActionPhase) -> Result<(), ActionError> {
    if can_transition(from, to) {
        Ok(())
    } else {
        Err(ActionError::invalid_transition(from, to))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rstest::rstest;

    #[rstest]
    #[case(ActionPhase::Initial, ActionPhase::BeingRendered)]
    #[case(ActionPhase::BeingRendered, ActionPhase::ReadyToRun)]
    #[case(ActionPhase::BeingRendered, ActionPhase::Failed)]
    #[case(ActionPhase::ReadyToRun, ActionPhase::Running)]
    #[case(ActionPhase::Running, ActionPhase::Succeeded)]
    #[case(ActionPhase::Running, ActionPhase::Failed)]
    #[case(ActionPhase::Running, ActionPhase::Cancelled)]
    fn valid_transitions(#[case] from: ActionPhase, #[case] to: ActionPhase) {
        assert!(can_transition(from, to));
    }

    #[rstest]
    #[case(ActionPhase::Initial, ActionPhase::Running)]
    #[case(ActionPhase::Initial, ActionPhase::Cancelled)]
    #[case(ActionPhase::ReadyToRun, ActionPhase::BeingRendered)]
    #[case(ActionPhase::Running, ActionPhase::ReadyToRun)]
    #[case(ActionPhase::Succeeded, ActionPhase::Running)]
    #[case(ActionPhase::Failed, ActionPhase::Cancelled)]
    #[case(ActionPhase::Running, ActionPhase::Running)]
    fn invalid_transitions(#[case] from: ActionPhase, #[case] to: ActionPhase) {
        assert!(!can_transition(from, to));
    }

    #[test]
    fn forward_edges_never_decrease_rank() {
        let all = [
            ActionPhase::Initial,
            ActionPhase::BeingRendered,
            ActionPhase::ReadyToRun,
            ActionPhase::Running,
            ActionPhase::Succeeded,
            ActionPhase::Failed,
            ActionPhase::Cancelled,
        ];
        for from in all {
            for to in all {
                if can_transition(from, to) {
                    assert!(to.rank() > from.rank(), "{from} -> {to}");
                }
            }
        }
    }

    #[test]
    fn validate_reports_both_phases() {
        let err = validate_transition(ActionPhase::Succeeded, ActionPhase::Running).unwrap_err();
        assert_eq!(
            err.to_string(),
            "invalid transition from succeeded to running"
        );
    }
}
