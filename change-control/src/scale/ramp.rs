//! Scale ramps — staged movement of one dimension toward a target.
//!
//! ```text
//! (idle) → Ramping ─┬─→ Stable                    (target reached, all checkpoints passed)
//!                   └─→ RollingBack → Failed      (regression or manual rollback)
//! ```

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;

use crate::collaborators::{score_at_least, MetricSnapshot};
use crate::scale::limits::Dimension;
use crate::scale::report::ScaleReport;

/// Lifecycle state of a ramp.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RampStatus {
    Ramping,
    /// Terminal: target reached with every checkpoint passing.
    Stable,
    RollingBack,
    /// Terminal: dimension restored to its start value.
    Failed,
}

impl RampStatus {
    pub fn is_terminal(self) -> bool {
        matches!(self, Self::Stable | Self::Failed)
    }
}

impl fmt::Display for RampStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Ramping => write!(f, "ramping"),
            Self::Stable => write!(f, "stable"),
            Self::RollingBack => write!(f, "rolling_back"),
            Self::Failed => write!(f, "failed"),
        }
    }
}

/// How a ramp ended.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RampResult {
    Success,
    Rollback,
}

impl fmt::Display for RampResult {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Success => write!(f, "success"),
            Self::Rollback => write!(f, "rollback"),
        }
    }
}

/// A metric that fell more than the tolerance below its pre-ramp baseline.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MetricRegression {
    pub metric: String,
    pub baseline: f64,
    /// `None` when the metric source stopped reporting the metric.
    pub observed: Option<f64>,
}

impl fmt::Display for MetricRegression {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.observed {
            Some(value) => write!(f, "{} {:.1} -> {:.1}", self.metric, self.baseline, value),
            None => write!(f, "{} {:.1} -> missing", self.metric, self.baseline),
        }
    }
}

/// Metric validation performed after one ramp step.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Checkpoint {
    /// 1-indexed step number.
    pub step: u32,
    /// Dimension value reached by this step.
    pub value: u64,
    pub metrics: MetricSnapshot,
    pub at: DateTime<Utc>,
    pub passed: bool,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub regressions: Vec<MetricRegression>,
}

/// Record of a ramp status change.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RampTransition {
    pub from: RampStatus,
    pub to: RampStatus,
    pub at: DateTime<Utc>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub reason: Option<String>,
}

/// A staged ramp of one dimension.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ScaleRamp {
    pub id: String,
    pub dimension: Dimension,
    pub start_value: u64,
    pub current_value: u64,
    pub target_value: u64,
    pub step_size: u64,
    pub step_count: u32,
    /// Steps taken so far.
    pub step_index: u32,
    pub status: RampStatus,
    /// Metric scores captured before the first step.
    pub baseline: MetricSnapshot,
    /// Allowed drop below baseline, in points.
    pub tolerance: f64,
    #[serde(default)]
    pub checkpoints: Vec<Checkpoint>,
    pub started_at: DateTime<Utc>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub finished_at: Option<DateTime<Utc>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub result: Option<RampResult>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub reason: Option<String>,
    #[serde(default)]
    pub transitions: Vec<RampTransition>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub report: Option<ScaleReport>,
}

impl ScaleRamp {
    /// Value the next step would reach.
    pub fn next_value(&self) -> u64 {
        self.current_value
            .saturating_add(self.step_size)
            .min(self.target_value)
    }

    /// Metrics in `snapshot` that fell below `baseline - tolerance`.
    /// Metrics absent from the baseline are not judged.
    pub fn regressions(&self, snapshot: &MetricSnapshot) -> Vec<MetricRegression> {
        self.baseline
            .iter()
            .filter_map(|(metric, &baseline)| {
                let observed = snapshot.get(metric).copied();
                match observed {
                    Some(value) if score_at_least(value + self.tolerance, baseline) => None,
                    _ => Some(MetricRegression {
                        metric: metric.clone(),
                        baseline,
                        observed,
                    }),
                }
            })
            .collect()
    }

    pub(crate) fn transition(&mut self, to: RampStatus, reason: Option<&str>) {
        tracing::debug!(
            ramp = %self.id,
            from = %self.status,
            to = %to,
            "Scale ramp transition"
        );
        self.transitions.push(RampTransition {
            from: self.status,
            to,
            at: Utc::now(),
            reason: reason.map(String::from),
        });
        self.status = to;
    }
}

/// Step size and step count for a ramp covering `distance`.
///
/// Without an explicit step, the distance is split into `divisor` steps
/// (rounded up). The step is never below 1 and there is at least one step.
pub fn plan_steps(distance: u64, step_size: Option<u64>, divisor: u64) -> (u64, u32) {
    let step = step_size
        .unwrap_or_else(|| distance.div_ceil(divisor.max(1)))
        .max(1);
    let count = distance.div_ceil(step).max(1);
    (step, u32::try_from(count).unwrap_or(u32::MAX))
}
