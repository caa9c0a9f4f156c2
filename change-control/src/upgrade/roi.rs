//! ROI evaluation — did the live change move its declared metrics?
//!
//! ROI is the mean of `after - baseline` across the plan's declared
//! success metrics, compared against the plan's threshold.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::collaborators::{score_at_least, MetricSnapshot};
use crate::error::{ControlError, ControlResult};
use crate::upgrade::plan::{Axis, UpgradePlan};

/// Recommendation derived from an ROI evaluation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RoiDecision {
    Keep,
    Rollback,
}

impl std::fmt::Display for RoiDecision {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Keep => write!(f, "keep"),
            Self::Rollback => write!(f, "rollback"),
        }
    }
}

/// Before/after values for one declared metric.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MetricDelta {
    pub metric: String,
    pub before: f64,
    pub after: f64,
    pub delta: f64,
}

/// Immutable result of one ROI evaluation.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RoiRecord {
    pub plan_id: String,
    pub axis: Axis,
    pub measured_at: DateTime<Utc>,
    pub deltas: Vec<MetricDelta>,
    /// Mean delta across declared metrics.
    pub roi_score: f64,
    pub threshold: f64,
    pub passed: bool,
    pub decision: RoiDecision,
}

/// Score `plan` against a fresh snapshot.
///
/// Fails when the snapshot no longer reports one of the declared metrics.
pub fn evaluate(plan: &UpgradePlan, after: &MetricSnapshot) -> ControlResult<RoiRecord> {
    let mut deltas = Vec::with_capacity(plan.criteria.len());
    for criterion in &plan.criteria {
        let value = after
            .get(&criterion.metric)
            .copied()
            .ok_or_else(|| ControlError::UnknownMetric(criterion.metric.clone()))?;
        deltas.push(MetricDelta {
            metric: criterion.metric.clone(),
            before: criterion.baseline,
            after: value,
            delta: value - criterion.baseline,
        });
    }

    let roi_score = if deltas.is_empty() {
        0.0
    } else {
        deltas.iter().map(|d| d.delta).sum::<f64>() / deltas.len() as f64
    };
    let passed = score_at_least(roi_score, plan.roi_threshold);

    Ok(RoiRecord {
        plan_id: plan.id.clone(),
        axis: plan.axis,
        measured_at: Utc::now(),
        deltas,
        roi_score,
        threshold: plan.roi_threshold,
        passed,
        decision: if passed {
            RoiDecision::Keep
        } else {
            RoiDecision::Rollback
        },
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::upgrade::plan::{SuccessCriterion, UpgradeStatus};

    fn live_plan(criteria: &[(&str, f64)], threshold: f64) -> UpgradePlan {
        UpgradePlan {
            id: "p-roi".into(),
            axis: Axis::Provider,
            name: "Switch provider".into(),
            hypothesis: "New provider answers better".into(),
            scope: String::new(),
            criteria: criteria
                .iter()
                .map(|(m, b)| SuccessCriterion {
                    metric: m.to_string(),
                    baseline: *b,
                    target: b + threshold,
                })
                .collect(),
            rollback_checklist: Vec::new(),
            flag: "f".into(),
            status: UpgradeStatus::Live,
            roi_threshold: threshold,
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

    fn snapshot(values: &[(&str, f64)]) -> MetricSnapshot {
        values.iter().map(|(k, v)| (k.to_string(), *v)).collect()
    }

    #[test]
    fn test_exact_threshold_keeps() {
        let plan = live_plan(&[("quality", 70.0)], 5.0);
        let record = evaluate(&plan, &snapshot(&[("quality", 75.0)])).unwrap();
        assert_eq!(record.roi_score, 5.0);
        assert!(record.passed);
        assert_eq!(record.decision, RoiDecision::Keep);
    }

    #[test]
    fn test_exact_threshold_keeps_with_fractional_baseline() {
        let plan = live_plan(&[("quality", 61.1)], 5.0);
        let record = evaluate(&plan, &snapshot(&[("quality", 66.1)])).unwrap();
        assert!(record.roi_score < 5.0);
        assert!(record.passed);
        assert_eq!(record.decision, RoiDecision::Keep);
    }

    #[test]
    fn test_just_below_threshold_rolls_back() {
        let plan = live_plan(&[("quality", 61.1)], 5.0);
        let record = evaluate(&plan, &snapshot(&[("quality", 66.09)])).unwrap();
        assert!(!record.passed);
        assert_eq!(record.decision, RoiDecision::Rollback);
    }

    #[test]
    fn test_mean_across_metrics() {
        let plan = live_plan(&[("quality", 70.0), ("latency", 50.0)], 5.0);
        let record = evaluate(
            &plan,
            &snapshot(&[("quality", 80.0), ("latency", 48.0), ("other", 1.0)]),
        )
        .unwrap();
        assert_eq!(record.deltas.len(), 2);
        assert_eq!(record.roi_score, 4.0);
        assert!(!record.passed);
        assert_eq!(record.decision, RoiDecision::Rollback);
    }

    #[test]
    fn test_missing_metric_errors() {
        let plan = live_plan(&[("quality", 70.0)], 5.0);
        let err = evaluate(&plan, &snapshot(&[("latency", 40.0)])).unwrap_err();
        assert!(matches!(err, ControlError::UnknownMetric(m) if m == "quality"));
    }
}
