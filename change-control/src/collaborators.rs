//! Collaborator Ports — metric source, gatekeepers, continuity health
//!
//! The controllers never compute metrics or author policy themselves. They
//! consult these traits, which the embedding application implements. All
//! calls are async suspend points with no built-in timeout; callers that
//! need one wrap the controller call in their own.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::sync::Arc;

use crate::error::CollaboratorError;

/// Mapping from metric-domain name to a score in `[0, 100]`.
pub type MetricSnapshot = BTreeMap<String, f64>;

/// Slack applied when a score is compared against a boundary, so that
/// `61.1 -> 66.1` counts as a gain of exactly 5.
pub const SCORE_EPSILON: f64 = 1e-9;

/// `value >= floor`, treating values within [`SCORE_EPSILON`] as equal.
pub fn score_at_least(value: f64, floor: f64) -> bool {
    value + SCORE_EPSILON >= floor
}

/// Kind of action submitted to a gate.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ActionKind {
    /// Approval of a proposed upgrade plan.
    UpgradeApproval,
    /// Start of a staged dimension ramp.
    ScaleRamp,
}

impl std::fmt::Display for ActionKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::UpgradeApproval => write!(f, "upgrade_approval"),
            Self::ScaleRamp => write!(f, "scale_ramp"),
        }
    }
}

/// Which gate produced a veto.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum GateKind {
    Policy,
    Operations,
}

impl std::fmt::Display for GateKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Policy => write!(f, "policy"),
            Self::Operations => write!(f, "operations"),
        }
    }
}

/// Verdict from the policy gate.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PolicyVerdict {
    pub approved: bool,
    pub reason: String,
}

impl PolicyVerdict {
    pub fn approve() -> Self {
        Self {
            approved: true,
            reason: String::new(),
        }
    }

    pub fn veto(reason: impl Into<String>) -> Self {
        Self {
            approved: false,
            reason: reason.into(),
        }
    }
}

/// Verdict from the operations (human-approval zone) gate.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct OpsVerdict {
    pub allowed: bool,
    /// Optional explanation; empty when the gate gives none.
    #[serde(default)]
    pub reason: String,
}

impl OpsVerdict {
    pub fn allow() -> Self {
        Self {
            allowed: true,
            reason: String::new(),
        }
    }

    pub fn deny(reason: impl Into<String>) -> Self {
        Self {
            allowed: false,
            reason: reason.into(),
        }
    }
}

/// Health of the continuity subsystem as reported externally.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ContinuityStatus {
    Ok,
    DegradedMitigated,
    DegradedUnmitigated,
    Failed,
}

impl ContinuityStatus {
    /// Healthy, or degraded with an active mitigation.
    pub fn permits_scaling(self) -> bool {
        matches!(self, Self::Ok | Self::DegradedMitigated)
    }
}

impl std::fmt::Display for ContinuityStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Ok => write!(f, "OK"),
            Self::DegradedMitigated => write!(f, "DEGRADED_MITIGATED"),
            Self::DegradedUnmitigated => write!(f, "DEGRADED_UNMITIGATED"),
            Self::Failed => write!(f, "FAILED"),
        }
    }
}

/// Source of current metric-domain scores.
#[async_trait]
pub trait MetricSource: Send + Sync {
    /// Current score for every metric domain.
    async fn snapshot(&self) -> Result<MetricSnapshot, CollaboratorError>;
}

/// Policy/content gatekeeper. May veto any action by its description.
#[async_trait]
pub trait PolicyGate: Send + Sync {
    async fn check(
        &self,
        kind: ActionKind,
        description: &str,
    ) -> Result<PolicyVerdict, CollaboratorError>;

    /// Number of policy violations in the gate's recent reporting window.
    async fn recent_violations(&self) -> Result<u32, CollaboratorError>;
}

/// Operations gatekeeper enforcing human-approval zones for
/// infrastructure-affecting actions.
#[async_trait]
pub trait OpsGate: Send + Sync {
    async fn check(&self, kind: ActionKind, description: &str)
        -> Result<OpsVerdict, CollaboratorError>;
}

/// Reporter of continuity health.
#[async_trait]
pub trait ContinuityMonitor: Send + Sync {
    async fn status(&self) -> Result<ContinuityStatus, CollaboratorError>;
}

/// Handles to every collaborator, injected into each controller.
#[derive(Clone)]
pub struct Collaborators {
    pub metrics: Arc<dyn MetricSource>,
    pub policy: Arc<dyn PolicyGate>,
    pub ops: Arc<dyn OpsGate>,
    pub continuity: Arc<dyn ContinuityMonitor>,
}

impl Collaborators {
    pub fn new(
        metrics: Arc<dyn MetricSource>,
        policy: Arc<dyn PolicyGate>,
        ops: Arc<dyn OpsGate>,
        continuity: Arc<dyn ContinuityMonitor>,
    ) -> Self {
        Self {
            metrics,
            policy,
            ops,
            continuity,
        }
    }
}

impl std::fmt::Debug for Collaborators {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Collaborators").finish_non_exhaustive()
    }
}
