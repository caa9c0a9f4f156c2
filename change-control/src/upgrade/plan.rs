//! Upgrade plans — axes, lifecycle states, and legal transitions.
//!
//! ```text
//! Proposed → Approved → DryRun → Live → Completed
//!    │          │         │       │
//!    ├──────────┴─→ Rejected      │
//!    └──────────┴─────────┴───────┴─→ RolledBack
//! ```

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

use crate::error::{ControlError, ControlResult};

/// Independent category of improvement. Declaration order is the
/// tie-break priority used when suggesting the next axis.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Axis {
    /// Batch sizes, caching, scheduling of model work.
    Compute,
    /// Choice of inference/model provider.
    Provider,
    /// Ingestion and curation of agent memory data.
    Data,
}

impl Axis {
    /// Every axis, in priority order.
    pub const ALL: [Axis; 3] = [Axis::Compute, Axis::Provider, Axis::Data];

    /// Whether changes on this axis affect infrastructure and therefore
    /// need the operations gate as well as the policy gate.
    pub fn touches_infrastructure(self) -> bool {
        matches!(self, Self::Compute | Self::Provider)
    }

    /// Canned steps an operator follows to undo a change on this axis.
    pub fn rollback_checklist(self) -> Vec<String> {
        let steps: &[&str] = match self {
            Self::Compute => &[
                "Disable the upgrade feature flag",
                "Restore previous batch sizes",
                "Clear response and embedding caches",
                "Confirm latency and error metrics return to baseline",
            ],
            Self::Provider => &[
                "Disable the upgrade feature flag",
                "Revert routing to the prior provider",
                "Re-validate continuity health against the prior provider",
                "Confirm metric scores return to baseline",
            ],
            Self::Data => &[
                "Disable the upgrade feature flag",
                "Disable new ingestion sources",
                "Strip records ingested without validation",
                "Confirm metric scores return to baseline",
            ],
        };
        steps.iter().map(|s| s.to_string()).collect()
    }
}

impl fmt::Display for Axis {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Compute => write!(f, "compute"),
            Self::Provider => write!(f, "provider"),
            Self::Data => write!(f, "data"),
        }
    }
}

impl FromStr for Axis {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "compute" => Ok(Self::Compute),
            "provider" => Ok(Self::Provider),
            "data" => Ok(Self::Data),
            other => Err(format!("unknown axis '{}'", other)),
        }
    }
}

/// Lifecycle state of an upgrade plan.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum UpgradeStatus {
    Proposed,
    Approved,
    DryRun,
    Live,
    /// Terminal: change kept.
    Completed,
    /// Terminal: vetoed by a gate.
    Rejected,
    /// Terminal: change undone.
    RolledBack,
}

impl UpgradeStatus {
    pub fn is_terminal(self) -> bool {
        matches!(self, Self::Completed | Self::Rejected | Self::RolledBack)
    }
}

impl fmt::Display for UpgradeStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Proposed => write!(f, "proposed"),
            Self::Approved => write!(f, "approved"),
            Self::DryRun => write!(f, "dry_run"),
            Self::Live => write!(f, "live"),
            Self::Completed => write!(f, "completed"),
            Self::Rejected => write!(f, "rejected"),
            Self::RolledBack => write!(f, "rolled_back"),
        }
    }
}

fn is_legal_transition(from: UpgradeStatus, to: UpgradeStatus) -> bool {
    use UpgradeStatus::*;

    // Any non-terminal state can be rolled back.
    if to == RolledBack && !from.is_terminal() {
        return true;
    }

    matches!(
        (from, to),
        (Proposed, Approved)
            | (Proposed, Rejected)
            | (Approved, Rejected)
            | (Approved, DryRun)
            | (DryRun, Live)
            | (Live, Completed)
    )
}

/// A success metric as declared by the proposer: which metric, and by how
/// many points it is expected to move.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SuccessMetric {
    pub metric: String,
    pub delta: f64,
}

impl SuccessMetric {
    pub fn new(metric: impl Into<String>, delta: f64) -> Self {
        Self {
            metric: metric.into(),
            delta,
        }
    }
}

/// A success metric resolved against the snapshot taken at proposal time.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SuccessCriterion {
    pub metric: String,
    pub baseline: f64,
    pub target: f64,
}

/// Operator request to open a new upgrade plan.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct UpgradeProposal {
    pub axis: Axis,
    pub name: String,
    pub hypothesis: String,
    #[serde(default)]
    pub scope: String,
    pub success_metrics: Vec<SuccessMetric>,
}

/// Record of a status change.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PlanTransition {
    pub from: UpgradeStatus,
    pub to: UpgradeStatus,
    pub at: DateTime<Utc>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub reason: Option<String>,
}

/// A hypothesis-driven improvement and everything recorded about it.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct UpgradePlan {
    pub id: String,
    pub axis: Axis,
    pub name: String,
    pub hypothesis: String,
    pub scope: String,
    pub criteria: Vec<SuccessCriterion>,
    pub rollback_checklist: Vec<String>,
    /// Name of the feature flag gating this change.
    pub flag: String,
    pub status: UpgradeStatus,
    /// Minimum mean delta for the change to be kept.
    pub roi_threshold: f64,
    /// Score from the most recent ROI evaluation.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub roi_score: Option<f64>,
    #[serde(default)]
    pub lessons: Vec<String>,
    pub created_at: DateTime<Utc>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub approved_at: Option<DateTime<Utc>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub dry_run_started_at: Option<DateTime<Utc>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub live_at: Option<DateTime<Utc>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub closed_at: Option<DateTime<Utc>>,
    #[serde(default)]
    pub transitions: Vec<PlanTransition>,
}

impl UpgradePlan {
    /// Text submitted to the gates when asking for approval.
    pub fn action_description(&self) -> String {
        let metrics: Vec<String> = self
            .criteria
            .iter()
            .map(|c| format!("{} {:.1}->{:.1}", c.metric, c.baseline, c.target))
            .collect();
        format!(
            "{} upgrade '{}': {} (scope: {}; targets: {})",
            self.axis,
            self.name,
            self.hypothesis,
            if self.scope.is_empty() {
                "unspecified"
            } else {
                self.scope.as_str()
            },
            metrics.join(", ")
        )
    }

    /// Whether an ROI evaluation has been recorded for this plan.
    pub fn is_evaluated(&self) -> bool {
        self.roi_score.is_some()
    }

    /// Refuse `action` unless the plan is in one of `allowed`.
    pub(crate) fn require_status(
        &self,
        action: &'static str,
        allowed: &[UpgradeStatus],
    ) -> ControlResult<()> {
        if allowed.contains(&self.status) {
            Ok(())
        } else {
            Err(ControlError::InvalidPlanState {
                action,
                status: self.status,
            })
        }
    }

    /// Refuse `action` unless `to` is reachable from the current status.
    pub(crate) fn check_transition(&self, action: &'static str, to: UpgradeStatus) -> ControlResult<()> {
        if is_legal_transition(self.status, to) {
            Ok(())
        } else {
            Err(ControlError::InvalidPlanState {
                action,
                status: self.status,
            })
        }
    }

    /// Move to `to`, recording the transition. Refuses illegal edges.
    pub(crate) fn transition(
        &mut self,
        action: &'static str,
        to: UpgradeStatus,
        reason: Option<&str>,
    ) -> ControlResult<()> {
        self.check_transition(action, to)?;

        let now = Utc::now();
        tracing::debug!(
            plan = %self.id,
            from = %self.status,
            to = %to,
            "Upgrade plan transition"
        );

        self.transitions.push(PlanTransition {
            from: self.status,
            to,
            at: now,
            reason: reason.map(String::from),
        });
        self.status = to;

        match to {
            UpgradeStatus::Approved => self.approved_at = Some(now),
            UpgradeStatus::DryRun => self.dry_run_started_at = Some(now),
            UpgradeStatus::Live => self.live_at = Some(now),
            UpgradeStatus::Completed | UpgradeStatus::Rejected | UpgradeStatus::RolledBack => {
                self.closed_at = Some(now)
            }
            UpgradeStatus::Proposed => {}
        }
        Ok(())
    }
}

/// Build a flag name unique to this plan.
pub(crate) fn flag_name(axis: Axis, name: &str, plan_id: &str) -> String {
    let mut slug = String::with_capacity(name.len());
    for ch in name.chars() {
        if ch.is_ascii_alphanumeric() {
            slug.push(ch.to_ascii_lowercase());
        } else if !slug.ends_with('_') {
            slug.push('_');
        }
    }
    let slug = slug.trim_matches('_');
    let short_id: String = plan_id.chars().filter(|c| *c != '-').take(8).collect();
    if slug.is_empty() {
        format!("upgrade.{}.{}", axis, short_id)
    } else {
        format!("upgrade.{}.{}.{}", axis, slug, short_id)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn plan(status: UpgradeStatus) -> UpgradePlan {
        UpgradePlan {
            id: "p-1".into(),
            axis: Axis::Compute,
            name: "Bigger batches".into(),
            hypothesis: "Larger batches raise throughput".into(),
            scope: "planner workers".into(),
            criteria: vec![SuccessCriterion {
                metric: "efficiency".into(),
                baseline: 60.0,
                target: 65.0,
            }],
            rollback_checklist: Axis::Compute.rollback_checklist(),
            flag: "upgrade.compute.bigger_batches.p1".into(),
            status,
            roi_threshold: 5.0,
            roi_score: None,
            lessons: Vec::new(),
            created_at: Utc::now(),
            approved_at: None,
            dry_run_started_at: None,
            live_at: None,
            closed_at: None,
            transitions: Vec::new(),
        }
    }

    #[test]
    fn test_happy_path_transitions() {
        let mut p = plan(UpgradeStatus::Proposed);
        p.transition("approve", UpgradeStatus::Approved, None).unwrap();
        p.transition("dry-run", UpgradeStatus::DryRun, None).unwrap();
        p.transition("go live", UpgradeStatus::Live, None).unwrap();
        p.transition("complete", UpgradeStatus::Completed, Some("kept"))
            .unwrap();

        assert_eq!(p.transitions.len(), 4);
        assert!(p.approved_at.is_some());
        assert!(p.dry_run_started_at.is_some());
        assert!(p.live_at.is_some());
        assert!(p.closed_at.is_some());
        assert_eq!(p.transitions[3].reason.as_deref(), Some("kept"));
    }

    #[test]
    fn test_skipping_dry_run_is_illegal() {
        let mut p = plan(UpgradeStatus::Approved);
        let err = p.transition("go live", UpgradeStatus::Live, None).unwrap_err();
        assert!(matches!(
            err,
            ControlError::InvalidPlanState {
                status: UpgradeStatus::Approved,
                ..
            }
        ));
        assert_eq!(p.status, UpgradeStatus::Approved);
        assert!(p.transitions.is_empty());
    }

    #[test]
    fn test_rollback_from_any_open_state() {
        for status in [
            UpgradeStatus::Proposed,
            UpgradeStatus::Approved,
            UpgradeStatus::DryRun,
            UpgradeStatus::Live,
        ] {
            assert!(is_legal_transition(status, UpgradeStatus::RolledBack));
        }
        for status in [
            UpgradeStatus::Completed,
            UpgradeStatus::Rejected,
            UpgradeStatus::RolledBack,
        ] {
            assert!(!is_legal_transition(status, UpgradeStatus::RolledBack));
        }
    }

    #[test]
    fn test_rejection_only_before_dry_run() {
        assert!(is_legal_transition(UpgradeStatus::Proposed, UpgradeStatus::Rejected));
        assert!(is_legal_transition(UpgradeStatus::Approved, UpgradeStatus::Rejected));
        assert!(!is_legal_transition(UpgradeStatus::DryRun, UpgradeStatus::Rejected));
        assert!(!is_legal_transition(UpgradeStatus::Live, UpgradeStatus::Rejected));
    }

    #[test]
    fn test_checklists_are_axis_specific() {
        let compute = Axis::Compute.rollback_checklist().join(" ");
        let provider = Axis::Provider.rollback_checklist().join(" ");
        let data = Axis::Data.rollback_checklist().join(" ");
        assert!(compute.contains("batch sizes") && compute.contains("caches"));
        assert!(provider.contains("prior provider") && provider.contains("continuity"));
        assert!(data.contains("ingestion") && data.contains("without validation"));
    }

    #[test]
    fn test_infrastructure_classification() {
        assert!(Axis::Compute.touches_infrastructure());
        assert!(Axis::Provider.touches_infrastructure());
        assert!(!Axis::Data.touches_infrastructure());
    }

    #[test]
    fn test_flag_name_slug() {
        assert_eq!(
            flag_name(Axis::Data, "Curate  Memory!", "1f2e3d4c-aaaa-bbbb"),
            "upgrade.data.curate_memory.1f2e3d4c"
        );
        assert_eq!(flag_name(Axis::Compute, "***", "abc"), "upgrade.compute.abc");
    }

    #[test]
    fn test_axis_parse_and_display() {
        for axis in Axis::ALL {
            assert_eq!(axis.to_string().parse::<Axis>().unwrap(), axis);
        }
        assert!("network".parse::<Axis>().is_err());
    }

    #[test]
    fn test_action_description_mentions_targets() {
        let desc = plan(UpgradeStatus::Proposed).action_description();
        assert!(desc.starts_with("compute upgrade 'Bigger batches'"));
        assert!(desc.contains("efficiency 60.0->65.0"));
    }
}
