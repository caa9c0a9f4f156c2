//! Scale Controller — staged, checkpointed ramps of one dimension
//!
//! A ramp only starts when every precondition holds and the operations
//! gate allows it. Each step raises the dimension by one increment and
//! validates every baseline metric; the first regression rolls the ramp
//! back and restores the dimension to where it started.
//!
//! # Usage
//!
//! ```rust,ignore
//! let mut scaling = ScaleController::new(ScaleConfig::default(), DimensionLimits::defaults(), collaborators);
//! scaling.start_ramp(RampRequest::new(Dimension::Throughput, 600), &UpgradeReadiness::idle()).await?;
//! while scaling.step_ramp().await?.continued {}
//! ```

pub mod limits;
pub mod precondition;
pub mod ramp;
pub mod report;

use chrono::Utc;
use serde::{Deserialize, Serialize};
use tracing::{debug, info, warn};
use uuid::Uuid;

use crate::collaborators::{ActionKind, Collaborators, GateKind, MetricSnapshot};
use crate::config::ScaleConfig;
use crate::error::{ControlError, ControlResult};
use crate::state::{ActiveSlot, BoundedHistory};

use self::limits::{Dimension, DimensionLimit, DimensionLimits};
use self::precondition::{ImprovementTracker, PreconditionInputs, PreconditionReport, UpgradeReadiness};
use self::ramp::{plan_steps, Checkpoint, RampResult, RampStatus, ScaleRamp};
use self::report::ScaleReport;

const REGRESSION_REASON: &str = "Metric regression detected";

/// Operator request to ramp one dimension.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RampRequest {
    pub dimension: Dimension,
    /// Desired value; silently lowered to the dimension's hard cap.
    pub target: u64,
    /// Increment per step. Defaults to a fifth of the distance.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub step_size: Option<u64>,
}

impl RampRequest {
    pub fn new(dimension: Dimension, target: u64) -> Self {
        Self {
            dimension,
            target,
            step_size: None,
        }
    }

    pub fn with_step_size(mut self, step_size: u64) -> Self {
        self.step_size = Some(step_size);
        self
    }
}

/// Result of one [`ScaleController::step_ramp`] call.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StepOutcome {
    /// `true` while the ramp is still in progress.
    pub continued: bool,
    pub status: RampStatus,
    /// Step just taken (1-indexed).
    pub step: u32,
    /// Dimension value reached by this step.
    pub value: u64,
    pub checkpoint: Checkpoint,
    /// Present once the ramp has ended.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub report: Option<ScaleReport>,
}

/// Serializable state of a [`ScaleController`].
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ScaleLedger {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub active: Option<ScaleRamp>,
    /// Terminal ramps, oldest first.
    #[serde(default)]
    pub history: Vec<ScaleRamp>,
    #[serde(default)]
    pub limits: Vec<DimensionLimit>,
    #[serde(default)]
    pub sustained_cycles: u32,
}

/// Dashboard view of the scale controller.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ScaleSummary {
    pub active_ramp: Option<String>,
    pub active_dimension: Option<Dimension>,
    /// Steps taken / planned for the active ramp.
    pub active_progress: Option<(u32, u32)>,
    pub stable: usize,
    pub failed: usize,
    pub last_result: Option<RampResult>,
    pub sustained_cycles: u32,
    pub required_cycles: u32,
    pub limits: Vec<DimensionLimit>,
}

/// Owns the dimension limits, the active ramp, and past ramps.
#[derive(Debug)]
pub struct ScaleController {
    config: ScaleConfig,
    collaborators: Collaborators,
    limits: DimensionLimits,
    improvement: ImprovementTracker,
    active: ActiveSlot<ScaleRamp>,
    history: BoundedHistory<ScaleRamp>,
}

impl ScaleController {
    pub fn new(config: ScaleConfig, limits: DimensionLimits, collaborators: Collaborators) -> Self {
        Self {
            history: BoundedHistory::new(config.history_capacity),
            config,
            collaborators,
            limits,
            improvement: ImprovementTracker::default(),
            active: ActiveSlot::Idle,
        }
    }

    /// Rebuild a controller from an exported ledger.
    pub fn restore(config: ScaleConfig, collaborators: Collaborators, ledger: ScaleLedger) -> Self {
        Self {
            history: BoundedHistory::from_entries(config.history_capacity, ledger.history),
            config,
            collaborators,
            limits: DimensionLimits::from_limits(ledger.limits),
            improvement: ImprovementTracker::with_cycles(ledger.sustained_cycles),
            active: ActiveSlot::from(ledger.active),
        }
    }

    /// Update the sustained-improvement counter and return it.
    pub fn record_improvement_cycle(&mut self, improved: bool) -> u32 {
        let cycles = self.improvement.record(improved);
        if improved {
            debug!(sustained_cycles = cycles, "Improvement cycle recorded");
        } else {
            info!("Improvement streak reset");
        }
        cycles
    }

    /// Evaluate every precondition against fresh collaborator state.
    pub async fn evaluate_preconditions(
        &self,
        upgrade: &UpgradeReadiness,
    ) -> ControlResult<PreconditionReport> {
        let recent_violations = self.collaborators.policy.recent_violations().await?;
        let continuity = self.collaborators.continuity.status().await?;

        Ok(precondition::evaluate(&PreconditionInputs {
            sustained_cycles: self.improvement.sustained_cycles(),
            required_cycles: self.config.required_cycles,
            recent_violations,
            continuity,
            upgrade: upgrade.clone(),
        }))
    }

    /// Start a ramp toward `request.target`, clamped to the hard cap.
    ///
    /// Refused while another ramp is active, when the clamped target does
    /// not raise the dimension, when any precondition fails, or when the
    /// operations gate denies it.
    pub async fn start_ramp(
        &mut self,
        request: RampRequest,
        upgrade: &UpgradeReadiness,
    ) -> ControlResult<ScaleRamp> {
        if let Some(active) = self.active.get() {
            return Err(ControlError::RampAlreadyActive(active.dimension));
        }
        let limit = *self
            .limits
            .get(request.dimension)
            .ok_or(ControlError::UnknownDimension(request.dimension))?;
        if request.step_size == Some(0) {
            return Err(ControlError::InvalidRequest(
                "step size must be at least 1".to_string(),
            ));
        }

        let target = request.target.min(limit.hard_cap());
        if target < limit.current() {
            return Err(ControlError::InvalidRequest(format!(
                "target {} is below the current {} value {}; ramps only scale up",
                target,
                request.dimension,
                limit.current()
            )));
        }
        if target == limit.current() {
            return Err(ControlError::NothingToRamp {
                dimension: request.dimension,
                value: target,
            });
        }

        let preconditions = self.evaluate_preconditions(upgrade).await?;
        if !preconditions.passed() {
            warn!(
                dimension = %request.dimension,
                failures = ?preconditions.failures(),
                "Scale preconditions not met"
            );
            return Err(ControlError::PreconditionsFailed(preconditions));
        }

        let description = format!(
            "ramp {} from {} to {} (cap {})",
            request.dimension,
            limit.current(),
            target,
            limit.hard_cap()
        );
        let verdict = self
            .collaborators
            .ops
            .check(ActionKind::ScaleRamp, &description)
            .await?;
        if !verdict.allowed {
            warn!(dimension = %request.dimension, reason = %verdict.reason, "Scale ramp denied");
            return Err(ControlError::Vetoed {
                gate: GateKind::Operations,
                reason: verdict.reason,
            });
        }

        let baseline = self.collaborators.metrics.snapshot().await?;

        let distance = target - limit.current();
        let (step_size, step_count) =
            plan_steps(distance, request.step_size, self.config.default_step_divisor);
        let ramp = ScaleRamp {
            id: Uuid::new_v4().to_string(),
            dimension: request.dimension,
            start_value: limit.current(),
            current_value: limit.current(),
            target_value: target,
            step_size,
            step_count,
            step_index: 0,
            status: RampStatus::Ramping,
            baseline,
            tolerance: self.config.tolerance_for(request.dimension),
            checkpoints: Vec::new(),
            started_at: Utc::now(),
            finished_at: None,
            result: None,
            reason: None,
            transitions: Vec::new(),
            report: None,
        };

        if let Err(ramp) = self.active.occupy(ramp.clone()) {
            return Err(ControlError::RampAlreadyActive(ramp.dimension));
        }
        info!(
            ramp = %ramp.id,
            dimension = %ramp.dimension,
            from = ramp.start_value,
            to = ramp.target_value,
            requested = request.target,
            step_size = ramp.step_size,
            steps = ramp.step_count,
            "Scale ramp started"
        );
        Ok(ramp)
    }

    /// Take one step and validate it.
    ///
    /// A checkpoint regression rolls the ramp back and returns
    /// `continued = false` rather than an error.
    pub async fn step_ramp(&mut self) -> ControlResult<StepOutcome> {
        let ramp = self.active.get().ok_or(ControlError::NoActiveRamp)?;
        if ramp.status != RampStatus::Ramping {
            return Err(ControlError::NoActiveRamp);
        }
        if self.limits.get(ramp.dimension).is_none() {
            return Err(ControlError::UnknownDimension(ramp.dimension));
        }
        let value = ramp.next_value();
        let step = ramp.step_index + 1;

        let metrics = self.collaborators.metrics.snapshot().await?;
        let regressions = ramp.regressions(&metrics);
        let finishing = !regressions.is_empty() || value >= ramp.target_value;
        let post = if finishing {
            Some(self.collaborators.metrics.snapshot().await?)
        } else {
            None
        };

        let checkpoint = Checkpoint {
            step,
            value,
            metrics,
            at: Utc::now(),
            passed: regressions.is_empty(),
            regressions,
        };

        let ramp = self.active.get_mut().ok_or(ControlError::NoActiveRamp)?;
        let dimension = ramp.dimension;
        let limit = self
            .limits
            .get_mut(dimension)
            .ok_or(ControlError::UnknownDimension(dimension))?;
        limit.set_current(value);
        ramp.step_index = step;
        ramp.current_value = value;
        ramp.checkpoints.push(checkpoint.clone());

        debug!(
            dimension = %dimension,
            step = step,
            value = value,
            passed = checkpoint.passed,
            "Scale checkpoint"
        );

        let Some(post) = post else {
            return Ok(StepOutcome {
                continued: true,
                status: RampStatus::Ramping,
                step,
                value,
                checkpoint,
                report: None,
            });
        };

        let mut ramp = self.active.take().ok_or(ControlError::NoActiveRamp)?;
        let report = if checkpoint.passed {
            self.finish_stable(&mut ramp, post)
        } else {
            let regressed: Vec<String> = checkpoint.regressions.iter().map(|r| r.to_string()).collect();
            warn!(
                ramp = %ramp.id,
                dimension = %dimension,
                step = step,
                regressions = ?regressed,
                "Checkpoint regression, rolling back"
            );
            self.finish_rollback(&mut ramp, REGRESSION_REASON, post)
        };
        let status = ramp.status;
        self.history.push(ramp);

        Ok(StepOutcome {
            continued: false,
            status,
            step,
            value,
            checkpoint,
            report: Some(report),
        })
    }

    /// Abort the active ramp and restore its dimension.
    pub async fn rollback(&mut self, reason: &str) -> ControlResult<ScaleReport> {
        let dimension = self.active.get().ok_or(ControlError::NoActiveRamp)?.dimension;
        if self.limits.get(dimension).is_none() {
            return Err(ControlError::UnknownDimension(dimension));
        }
        let post = self.collaborators.metrics.snapshot().await?;

        let mut ramp = self.active.take().ok_or(ControlError::NoActiveRamp)?;
        warn!(ramp = %ramp.id, dimension = %ramp.dimension, reason = %reason, "Scale ramp rolled back");
        let report = self.finish_rollback(&mut ramp, reason, post);
        self.history.push(ramp);
        Ok(report)
    }

    fn finish_stable(&self, ramp: &mut ScaleRamp, post: MetricSnapshot) -> ScaleReport {
        ramp.transition(RampStatus::Stable, None);
        let report = ScaleReport::build(
            ramp,
            post,
            RampResult::Success,
            None,
            self.config.lesson_delta_threshold,
        );
        ramp.result = Some(RampResult::Success);
        ramp.finished_at = Some(report.generated_at);
        ramp.report = Some(report.clone());
        info!(
            ramp = %ramp.id,
            dimension = %ramp.dimension,
            value = ramp.current_value,
            steps = ramp.step_index,
            "Scale ramp stable"
        );
        report
    }

    /// The report is built before the dimension is restored, so its final
    /// value is the one the ramp reached. Callers have already checked that
    /// the dimension has a limit.
    fn finish_rollback(&mut self, ramp: &mut ScaleRamp, reason: &str, post: MetricSnapshot) -> ScaleReport {
        ramp.transition(RampStatus::RollingBack, Some(reason));
        let report = ScaleReport::build(
            ramp,
            post,
            RampResult::Rollback,
            Some(reason),
            self.config.lesson_delta_threshold,
        );

        if let Some(limit) = self.limits.get_mut(ramp.dimension) {
            limit.set_current(ramp.start_value);
        }
        ramp.current_value = ramp.start_value;
        ramp.transition(RampStatus::Failed, Some(reason));
        ramp.result = Some(RampResult::Rollback);
        ramp.reason = Some(reason.to_string());
        ramp.finished_at = Some(report.generated_at);
        ramp.report = Some(report.clone());
        report
    }

    pub fn limits(&self) -> &DimensionLimits {
        &self.limits
    }

    pub fn limit(&self, dimension: Dimension) -> Option<&DimensionLimit> {
        self.limits.get(dimension)
    }

    pub fn active(&self) -> Option<&ScaleRamp> {
        self.active.get()
    }

    pub fn history(&self) -> &BoundedHistory<ScaleRamp> {
        &self.history
    }

    /// Report of the most recently finished ramp.
    pub fn last_report(&self) -> Option<&ScaleReport> {
        self.history.last().and_then(|r| r.report.as_ref())
    }

    pub fn sustained_cycles(&self) -> u32 {
        self.improvement.sustained_cycles()
    }

    pub fn config(&self) -> &ScaleConfig {
        &self.config
    }

    pub fn export(&self) -> ScaleLedger {
        ScaleLedger {
            active: self.active.get().cloned(),
            history: self.history.to_vec(),
            limits: self.limits.to_vec(),
            sustained_cycles: self.improvement.sustained_cycles(),
        }
    }

    pub fn summary(&self) -> ScaleSummary {
        let count = |status: RampStatus| self.history.iter().filter(|r| r.status == status).count();
        ScaleSummary {
            active_ramp: self.active.get().map(|r| r.id.clone()),
            active_dimension: self.active.get().map(|r| r.dimension),
            active_progress: self.active.get().map(|r| (r.step_index, r.step_count)),
            stable: count(RampStatus::Stable),
            failed: count(RampStatus::Failed),
            last_result: self.history.last().and_then(|r| r.result),
            sustained_cycles: self.improvement.sustained_cycles(),
            required_cycles: self.config.required_cycles,
            limits: self.limits.to_vec(),
        }
    }
}
