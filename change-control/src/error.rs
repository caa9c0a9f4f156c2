//! Error types for change-control operations.
//!
//! Invariant violations and vetoes are ordinary `Err` values with no side
//! effects on controller state (a veto is the one exception: it terminates
//! the plan). Collaborator failures are carried separately so callers can
//! retry them.

use thiserror::Error;

use crate::collaborators::GateKind;
use crate::scale::limits::Dimension;
use crate::scale::precondition::PreconditionReport;
use crate::upgrade::plan::UpgradeStatus;

/// Result type alias for controller operations
pub type ControlResult<T> = Result<T, ControlError>;

/// Failure reported by an external collaborator (metric source or gate).
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("{collaborator} unavailable: {message}")]
pub struct CollaboratorError {
    /// Which collaborator failed (e.g. "metrics", "policy_gate").
    pub collaborator: String,
    /// Error detail as reported by the collaborator.
    pub message: String,
}

impl CollaboratorError {
    pub fn new(collaborator: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            collaborator: collaborator.into(),
            message: message.into(),
        }
    }
}

/// Errors from upgrade and scale controller operations
#[derive(Debug, Error)]
pub enum ControlError {
    #[error("upgrade plan '{0}' is already active")]
    PlanAlreadyActive(String),

    #[error("no upgrade plan is active")]
    NoActivePlan,

    #[error("plan '{requested}' is not the active plan")]
    PlanNotActive { requested: String },

    #[error("cannot {action} a plan in state '{status}'")]
    InvalidPlanState {
        action: &'static str,
        status: UpgradeStatus,
    },

    #[error("{gate} gate vetoed the action: {reason}")]
    Vetoed { gate: GateKind, reason: String },

    #[error("a scale ramp on '{0}' is already active")]
    RampAlreadyActive(Dimension),

    #[error("no scale ramp is active")]
    NoActiveRamp,

    #[error("scale preconditions not met: {}", .0.failures().join("; "))]
    PreconditionsFailed(PreconditionReport),

    #[error("dimension '{dimension}' is already at {value}; nothing to ramp")]
    NothingToRamp { dimension: Dimension, value: u64 },

    #[error("dimension '{0}' has no configured limit")]
    UnknownDimension(Dimension),

    #[error("metric '{0}' is not reported by the metric source")]
    UnknownMetric(String),

    #[error("invalid request: {0}")]
    InvalidRequest(String),

    #[error(transparent)]
    Collaborator(#[from] CollaboratorError),
}

impl ControlError {
    /// Whether the call was refused because of the single-active-record
    /// invariant or a call made in the wrong lifecycle state.
    pub fn is_invariant_violation(&self) -> bool {
        matches!(
            self,
            Self::PlanAlreadyActive(_)
                | Self::NoActivePlan
                | Self::PlanNotActive { .. }
                | Self::InvalidPlanState { .. }
                | Self::RampAlreadyActive(_)
                | Self::NoActiveRamp
        )
    }

    /// Whether retrying the same call later may succeed without operator
    /// intervention (collaborator I/O failures only).
    pub fn is_retryable(&self) -> bool {
        matches!(self, Self::Collaborator(_))
    }
}
