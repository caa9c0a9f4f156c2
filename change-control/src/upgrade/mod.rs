//! Upgrade Controller — one hypothesis-driven change at a time
//!
//! A plan moves through approval, a dry run, and a live period behind its
//! own feature flag. While live it is scored against the success metrics
//! declared at proposal time; the operator then completes it (change kept)
//! or rolls it back (flag disabled).
//!
//! Every collaborator call an operation needs is made before the operation
//! touches state, so a metric or gate outage leaves the controller as it was.
//!
//! # Usage
//!
//! ```rust,ignore
//! let mut upgrades = UpgradeController::new(UpgradeConfig::default(), collaborators);
//! let plan = upgrades.propose(proposal).await?;
//! upgrades.approve(&plan.id).await?;
//! upgrades.start_dry_run(&plan.id)?;
//! upgrades.go_live(&plan.id)?;
//! let roi = upgrades.evaluate_roi().await?;
//! ```

pub mod flags;
pub mod plan;
pub mod roi;

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use tracing::{info, warn};
use uuid::Uuid;

use crate::collaborators::{ActionKind, Collaborators, GateKind};
use crate::config::UpgradeConfig;
use crate::error::{ControlError, ControlResult};
use crate::scale::precondition::UpgradeReadiness;
use crate::state::{ActiveSlot, BoundedHistory};

use self::flags::{FeatureFlag, FlagRegistry, FlagSummary};
use self::plan::{flag_name, Axis, SuccessCriterion, UpgradePlan, UpgradeProposal, UpgradeStatus};
use self::roi::RoiRecord;

/// Number of completed upgrades on one axis.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct AxisUsage {
    pub axis: Axis,
    pub completed: u32,
}

/// Serializable state of an [`UpgradeController`].
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct UpgradeLedger {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub active: Option<UpgradePlan>,
    /// Terminal plans, oldest first.
    #[serde(default)]
    pub history: Vec<UpgradePlan>,
    /// ROI evaluations, oldest first.
    #[serde(default)]
    pub roi_history: Vec<RoiRecord>,
    #[serde(default)]
    pub axis_usage: Vec<AxisUsage>,
    #[serde(default)]
    pub flags: Vec<FeatureFlag>,
}

/// Dashboard view of the upgrade controller.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct UpgradeSummary {
    pub active_plan: Option<String>,
    pub active_status: Option<UpgradeStatus>,
    pub completed: usize,
    pub rolled_back: usize,
    pub rejected: usize,
    pub roi_evaluations: usize,
    /// Score of the most recent ROI evaluation.
    pub last_roi: Option<f64>,
    pub suggested_axis: Axis,
    pub flags: FlagSummary,
}

/// Owns the active upgrade plan and everything recorded about past ones.
#[derive(Debug)]
pub struct UpgradeController {
    config: UpgradeConfig,
    collaborators: Collaborators,
    active: ActiveSlot<UpgradePlan>,
    history: BoundedHistory<UpgradePlan>,
    roi_history: BoundedHistory<RoiRecord>,
    axis_usage: BTreeMap<Axis, u32>,
    flags: FlagRegistry,
}

impl UpgradeController {
    pub fn new(config: UpgradeConfig, collaborators: Collaborators) -> Self {
        Self {
            history: BoundedHistory::new(config.history_capacity),
            roi_history: BoundedHistory::new(config.roi_history_capacity),
            config,
            collaborators,
            active: ActiveSlot::Idle,
            axis_usage: BTreeMap::new(),
            flags: FlagRegistry::new(),
        }
    }

    /// Rebuild a controller from an exported ledger.
    pub fn restore(config: UpgradeConfig, collaborators: Collaborators, ledger: UpgradeLedger) -> Self {
        Self {
            history: BoundedHistory::from_entries(config.history_capacity, ledger.history),
            roi_history: BoundedHistory::from_entries(config.roi_history_capacity, ledger.roi_history),
            config,
            collaborators,
            active: ActiveSlot::from(ledger.active),
            axis_usage: ledger
                .axis_usage
                .into_iter()
                .map(|u| (u.axis, u.completed))
                .collect(),
            flags: FlagRegistry::from_flags(ledger.flags),
        }
    }

    /// Open a new plan in `proposed`.
    ///
    /// Baselines for every success metric come from a fresh snapshot; the
    /// target of each is its baseline plus the declared delta.
    pub async fn propose(&mut self, proposal: UpgradeProposal) -> ControlResult<UpgradePlan> {
        if let Some(active) = self.active.get() {
            return Err(ControlError::PlanAlreadyActive(active.id.clone()));
        }
        if proposal.name.trim().is_empty() {
            return Err(ControlError::InvalidRequest(
                "upgrade name must not be empty".to_string(),
            ));
        }
        if proposal.success_metrics.is_empty() {
            return Err(ControlError::InvalidRequest(
                "an upgrade needs at least one success metric".to_string(),
            ));
        }
        if let Some(bad) = proposal.success_metrics.iter().find(|m| !m.delta.is_finite()) {
            return Err(ControlError::InvalidRequest(format!(
                "success metric '{}' has a non-finite delta",
                bad.metric
            )));
        }

        let snapshot = self.collaborators.metrics.snapshot().await?;

        let mut criteria = Vec::with_capacity(proposal.success_metrics.len());
        for declared in &proposal.success_metrics {
            let baseline = snapshot
                .get(&declared.metric)
                .copied()
                .ok_or_else(|| ControlError::UnknownMetric(declared.metric.clone()))?;
            criteria.push(SuccessCriterion {
                metric: declared.metric.clone(),
                baseline,
                target: baseline + declared.delta,
            });
        }

        let id = Uuid::new_v4().to_string();
        let flag = flag_name(proposal.axis, &proposal.name, &id);
        let plan = UpgradePlan {
            id: id.clone(),
            axis: proposal.axis,
            name: proposal.name,
            hypothesis: proposal.hypothesis,
            scope: proposal.scope,
            criteria,
            rollback_checklist: proposal.axis.rollback_checklist(),
            flag: flag.clone(),
            status: UpgradeStatus::Proposed,
            roi_threshold: self.config.roi_threshold_for(proposal.axis),
            roi_score: None,
            lessons: Vec::new(),
            created_at: chrono::Utc::now(),
            approved_at: None,
            dry_run_started_at: None,
            live_at: None,
            closed_at: None,
            transitions: Vec::new(),
        };

        self.flags.register(&flag, &id)?;
        if let Err(plan) = self.active.occupy(plan.clone()) {
            self.flags.retire(&plan.flag);
            return Err(ControlError::PlanAlreadyActive(plan.id));
        }

        info!(
            plan = %plan.id,
            axis = %plan.axis,
            name = %plan.name,
            flag = %plan.flag,
            "Upgrade proposed"
        );
        Ok(plan)
    }

    /// Submit the active plan to the gates.
    ///
    /// The policy gate is always consulted; the operations gate only for
    /// axes that touch infrastructure. A veto from either rejects the plan,
    /// archives it, and returns [`ControlError::Vetoed`].
    pub async fn approve(&mut self, id: &str) -> ControlResult<UpgradePlan> {
        let plan = self.active_plan(id)?;
        plan.require_status("approve", &[UpgradeStatus::Proposed, UpgradeStatus::Approved])?;
        let description = plan.action_description();
        let infrastructure = plan.axis.touches_infrastructure();

        let policy = self
            .collaborators
            .policy
            .check(ActionKind::UpgradeApproval, &description)
            .await?;
        let veto = if !policy.approved {
            Some((GateKind::Policy, policy.reason))
        } else if infrastructure {
            let ops = self
                .collaborators
                .ops
                .check(ActionKind::UpgradeApproval, &description)
                .await?;
            (!ops.allowed).then_some((GateKind::Operations, ops.reason))
        } else {
            None
        };

        if let Some((gate, reason)) = veto {
            self.reject(gate, &reason)?;
            return Err(ControlError::Vetoed { gate, reason });
        }

        let plan = self.active_plan_mut(id)?;
        if plan.status == UpgradeStatus::Proposed {
            plan.transition("approve", UpgradeStatus::Approved, None)?;
        }
        info!(plan = %plan.id, axis = %plan.axis, "Upgrade approved");
        Ok(plan.clone())
    }

    /// Move an approved plan into its dry run.
    pub fn start_dry_run(&mut self, id: &str) -> ControlResult<UpgradePlan> {
        let plan = self.active_plan_mut(id)?;
        plan.require_status("start a dry run of", &[UpgradeStatus::Approved])?;
        plan.transition("start a dry run of", UpgradeStatus::DryRun, None)?;
        info!(plan = %plan.id, "Upgrade dry run started");
        Ok(plan.clone())
    }

    /// Enable the plan's flag and move it live.
    pub fn go_live(&mut self, id: &str) -> ControlResult<UpgradePlan> {
        let flag = {
            let plan = self.active_plan(id)?;
            plan.require_status("take live", &[UpgradeStatus::DryRun])?;
            plan.flag.clone()
        };
        self.flags.enable(&flag, "upgrade went live")?;

        let plan = self.active_plan_mut(id)?;
        plan.transition("take live", UpgradeStatus::Live, None)?;
        info!(plan = %plan.id, flag = %flag, "Upgrade live");
        Ok(plan.clone())
    }

    /// Score the live plan against a fresh snapshot.
    ///
    /// The record is kept in the ROI history and its score stored on the
    /// plan. Status is left alone: keeping or rolling back is the
    /// operator's call.
    pub async fn evaluate_roi(&mut self) -> ControlResult<RoiRecord> {
        let plan = self.active.get().ok_or(ControlError::NoActivePlan)?;
        plan.require_status("evaluate ROI of", &[UpgradeStatus::Live])?;

        let snapshot = self.collaborators.metrics.snapshot().await?;
        let record = roi::evaluate(plan, &snapshot)?;

        if let Some(plan) = self.active.get_mut() {
            plan.roi_score = Some(record.roi_score);
        }
        self.roi_history.push(record.clone());

        if record.passed {
            info!(
                plan = %record.plan_id,
                roi = record.roi_score,
                threshold = record.threshold,
                "ROI evaluation passed"
            );
        } else {
            warn!(
                plan = %record.plan_id,
                roi = record.roi_score,
                threshold = record.threshold,
                "ROI evaluation below threshold"
            );
        }
        Ok(record)
    }

    /// Keep the live change. The flag stays enabled.
    pub fn complete(&mut self, lessons: Vec<String>) -> ControlResult<UpgradePlan> {
        let plan = self.active.get_mut().ok_or(ControlError::NoActivePlan)?;
        plan.require_status("complete", &[UpgradeStatus::Live])?;
        plan.transition("complete", UpgradeStatus::Completed, None)?;
        plan.lessons.extend(lessons);

        let plan = self.active.take().ok_or(ControlError::NoActivePlan)?;
        *self.axis_usage.entry(plan.axis).or_insert(0) += 1;
        info!(plan = %plan.id, axis = %plan.axis, "Upgrade completed");
        self.archive(plan.clone());
        Ok(plan)
    }

    /// Undo the active plan from any non-terminal state.
    ///
    /// The plan's flag is switched off first; if that fails the plan stays
    /// active in its current state.
    pub fn rollback(&mut self, reason: &str) -> ControlResult<UpgradePlan> {
        let plan = self.active.get().ok_or(ControlError::NoActivePlan)?;
        plan.check_transition("roll back", UpgradeStatus::RolledBack)?;
        let flag = plan.flag.clone();
        self.flags.disable(&flag, reason)?;

        let plan = self.active.get_mut().ok_or(ControlError::NoActivePlan)?;
        plan.transition("roll back", UpgradeStatus::RolledBack, Some(reason))?;
        plan.lessons.push(format!("Rolled back: {}", reason));

        let plan = self.active.take().ok_or(ControlError::NoActivePlan)?;
        warn!(plan = %plan.id, axis = %plan.axis, reason = %reason, "Upgrade rolled back");
        self.archive(plan.clone());
        Ok(plan)
    }

    /// The least-used axis. Ties go to the earlier axis in [`Axis::ALL`].
    pub fn suggest_next_axis(&self) -> Axis {
        Axis::ALL
            .iter()
            .copied()
            .min_by_key(|axis| self.axis_usage.get(axis).copied().unwrap_or(0))
            .unwrap_or(Axis::Compute)
    }

    /// What the scale preconditions need to know about upgrades.
    pub fn readiness(&self) -> UpgradeReadiness {
        match self.active.get() {
            Some(plan) => UpgradeReadiness {
                active_plan: Some(plan.id.clone()),
                evaluated: plan.is_evaluated(),
            },
            None => UpgradeReadiness::idle(),
        }
    }

    pub fn active(&self) -> Option<&UpgradePlan> {
        self.active.get()
    }

    pub fn history(&self) -> &BoundedHistory<UpgradePlan> {
        &self.history
    }

    pub fn roi_history(&self) -> &BoundedHistory<RoiRecord> {
        &self.roi_history
    }

    pub fn flags(&self) -> &FlagRegistry {
        &self.flags
    }

    pub fn axis_usage(&self, axis: Axis) -> u32 {
        self.axis_usage.get(&axis).copied().unwrap_or(0)
    }

    pub fn config(&self) -> &UpgradeConfig {
        &self.config
    }

    pub fn export(&self) -> UpgradeLedger {
        UpgradeLedger {
            active: self.active.get().cloned(),
            history: self.history.to_vec(),
            roi_history: self.roi_history.to_vec(),
            axis_usage: self
                .axis_usage
                .iter()
                .map(|(axis, completed)| AxisUsage {
                    axis: *axis,
                    completed: *completed,
                })
                .collect(),
            flags: self.flags.iter().cloned().collect(),
        }
    }

    pub fn summary(&self) -> UpgradeSummary {
        let count = |status: UpgradeStatus| self.history.iter().filter(|p| p.status == status).count();
        UpgradeSummary {
            active_plan: self.active.get().map(|p| p.id.clone()),
            active_status: self.active.get().map(|p| p.status),
            completed: count(UpgradeStatus::Completed),
            rolled_back: count(UpgradeStatus::RolledBack),
            rejected: count(UpgradeStatus::Rejected),
            roi_evaluations: self.roi_history.len(),
            last_roi: self.roi_history.last().map(|r| r.roi_score),
            suggested_axis: self.suggest_next_axis(),
            flags: self.flags.summary(),
        }
    }

    fn active_plan(&self, id: &str) -> ControlResult<&UpgradePlan> {
        match self.active.get() {
            None => Err(ControlError::NoActivePlan),
            Some(plan) if plan.id != id => Err(ControlError::PlanNotActive {
                requested: id.to_string(),
            }),
            Some(plan) => Ok(plan),
        }
    }

    fn active_plan_mut(&mut self, id: &str) -> ControlResult<&mut UpgradePlan> {
        match self.active.get_mut() {
            None => Err(ControlError::NoActivePlan),
            Some(plan) if plan.id != id => Err(ControlError::PlanNotActive {
                requested: id.to_string(),
            }),
            Some(plan) => Ok(plan),
        }
    }

    fn reject(&mut self, gate: GateKind, reason: &str) -> ControlResult<()> {
        let plan = self.active.get_mut().ok_or(ControlError::NoActivePlan)?;
        plan.lessons
            .push(format!("Rejected by {} gate: {}", gate, reason));
        plan.transition("reject", UpgradeStatus::Rejected, Some(reason))?;

        let plan = self.active.take().ok_or(ControlError::NoActivePlan)?;
        warn!(plan = %plan.id, gate = %gate, reason = %reason, "Upgrade vetoed");
        self.archive(plan);
        Ok(())
    }

    /// Push a terminal plan into history. A plan evicted from history
    /// takes its flag with it unless that flag is still enabled.
    fn archive(&mut self, plan: UpgradePlan) {
        if let Some(evicted) = self.history.push(plan) {
            if self.flags.retire(&evicted.flag).is_some() {
                tracing::debug!(plan = %evicted.id, flag = %evicted.flag, "Retired feature flag");
            }
        }
    }
}
