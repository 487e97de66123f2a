//! Action lifecycle phases.

use serde::{Deserialize, Serialize};

/// Lifecycle phase of an Action.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ActionPhase {
    /// Created, not yet picked up.
    #[default]
    Initial,
    /// The capability reference is being flattened into a workflow.
    BeingRendered,
    /// Rendered; waiting for the run flag.
    ReadyToRun,
    /// Handed to the execution backend.
    Running,
    /// The execution reported success.
    Succeeded,
    /// Rendering or execution failed.
    Failed,
    /// Cancelled on request.
    Cancelled,
}

impl ActionPhase {
    /// Returns `true` if the phase is final.
    #[must_use]
    pub fn is_terminal(&self) -> bool {
        matches!(self, Self::Succeeded | Self::Failed | Self::Cancelled)
    }

    /// Returns `true` if the reconciler has work to do in this phase without
    /// any outside input.
    #[must_use]
    pub fn is_active(&self) -> bool {
        matches!(self, Self::Initial | Self::BeingRendered | Self::Running)
    }

    /// Returns `true` if a cancel request is honored in this phase.
    #[must_use]
    pub fn is_cancellable(&self) -> bool {
        matches!(self, Self::BeingRendered | Self::ReadyToRun | Self::Running)
    }

    /// Position along `Initial < BeingRendered < ReadyToRun < Running < terminal`.
    ///
    /// Observed phases never decrease in rank.
    #[must_use]
    pub fn rank(&self) -> u8 {
        match self {
            Self::Initial => 0,
            Self::BeingRendered => 1,
            Self::ReadyToRun => 2,
            Self::Running => 3,
            Self::Succeeded | Self::Failed | Self::Cancelled => 4,
        }
    }
}

impl std::fmt::Display for ActionPhase {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Initial => write!(f, "initial"),
            Self::BeingRendered => write!(f, "being_rendered"),
            Self::ReadyToRun => write!(f, "ready_to_run"),
            Self::Running => write!(f, "running"),
            Self::Succeeded => write!(f, "succeeded"),
            Self::Failed => write!(f, "failed"),
            Self::Cancelled => write!(f, "cancelled"),
        }
    }
}
