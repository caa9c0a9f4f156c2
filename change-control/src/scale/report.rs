//! Terminal ramp summaries.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

use crate::collaborators::MetricSnapshot;
use crate::scale::limits::Dimension;
use crate::scale::ramp::{RampResult, ScaleRamp};

/// Summary of a finished ramp.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ScaleReport {
    pub ramp_id: String,
    pub dimension: Dimension,
    pub start_value: u64,
    /// Value reached when the ramp ended (before any rollback restore).
    pub final_value: u64,
    pub target_value: u64,
    pub steps_completed: u32,
    pub step_count: u32,
    pub pre_metrics: MetricSnapshot,
    pub post_metrics: MetricSnapshot,
    /// `post - pre` for every baseline metric still reported.
    pub deltas: BTreeMap<String, f64>,
    pub result: RampResult,
    pub duration_ms: i64,
    pub generated_at: DateTime<Utc>,
    pub lessons: Vec<String>,
}

impl ScaleReport {
    /// Build the report for `ramp` from a fresh post-ramp snapshot.
    ///
    /// `notable_delta` is the movement (in points, either direction) above
    /// which a metric earns its own lesson line.
    pub(crate) fn build(
        ramp: &ScaleRamp,
        post: MetricSnapshot,
        result: RampResult,
        reason: Option<&str>,
        notable_delta: f64,
    ) -> Self {
        let deltas: BTreeMap<String, f64> = ramp
            .baseline
            .iter()
            .filter_map(|(metric, pre)| post.get(metric).map(|after| (metric.clone(), after - pre)))
            .collect();

        let mut lessons = Vec::with_capacity(deltas.len() + 1);
        lessons.push(match result {
            RampResult::Success => format!(
                "Scaled {} from {} to {} in {} steps with every checkpoint passing",
                ramp.dimension, ramp.start_value, ramp.current_value, ramp.step_index
            ),
            RampResult::Rollback => format!(
                "Rolled back {} at step {}/{} (value {}, restored to {}): {}",
                ramp.dimension,
                ramp.step_index,
                ramp.step_count,
                ramp.current_value,
                ramp.start_value,
                reason.unwrap_or("no reason given")
            ),
        });

        for (metric, delta) in &deltas {
            if delta.abs() <= notable_delta {
                continue;
            }
            let pre = ramp.baseline.get(metric).copied().unwrap_or_default();
            let direction = if *delta > 0.0 { "rose" } else { "fell" };
            lessons.push(format!(
                "{} {} {:.1} points ({:.1} -> {:.1})",
                metric,
                direction,
                delta.abs(),
                pre,
                pre + delta
            ));
        }

        let generated_at = Utc::now();
        Self {
            ramp_id: ramp.id.clone(),
            dimension: ramp.dimension,
            start_value: ramp.start_value,
            final_value: ramp.current_value,
            target_value: ramp.target_value,
            steps_completed: ramp.step_index,
            step_count: ramp.step_count,
            pre_metrics: ramp.baseline.clone(),
            post_metrics: post,
            deltas,
            result,
            duration_ms: (generated_at - ramp.started_at).num_milliseconds(),
            generated_at,
            lessons,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::scale::ramp::RampStatus;

    fn ramp() -> ScaleRamp {
        ScaleRamp {
            id: "r-1".into(),
            dimension: Dimension::Throughput,
            start_value: 100,
            current_value: 400,
            target_value: 600,
            step_size: 100,
            step_count: 5,
            step_index: 3,
            status: RampStatus::RollingBack,
            baseline: [("stability", 80.0), ("quality", 60.0), ("latency", 50.0)]
                .iter()
                .map(|(k, v)| (k.to_string(), *v))
                .collect(),
            tolerance: 10.0,
            checkpoints: Vec::new(),
            started_at: Utc::now(),
            finished_at: None,
            result: None,
            reason: None,
            transitions: Vec::new(),
            report: None,
        }
    }

    #[test]
    fn test_rollback_report_lessons() {
        let post: MetricSnapshot = [("stability", 65.0), ("quality", 67.0), ("latency", 52.0)]
            .iter()
            .map(|(k, v)| (k.to_string(), *v))
            .collect();
        let report = ScaleReport::build(
            &ramp(),
            post,
            RampResult::Rollback,
            Some("Metric regression detected"),
            5.0,
        );

        assert_eq!(report.final_value, 400);
        assert_eq!(report.deltas["stability"], -15.0);
        assert_eq!(report.deltas["latency"], 2.0);
        assert_eq!(report.lessons.len(), 3);
        assert!(report.lessons[0].contains("step 3/5"));
        assert!(report.lessons[0].ends_with("Metric regression detected"));
        assert!(report
            .lessons
            .iter()
            .any(|l| l == "stability fell 15.0 points (80.0 -> 65.0)"));
        assert!(report
            .lessons
            .iter()
            .any(|l| l == "quality rose 7.0 points (60.0 -> 67.0)"));
    }

    #[test]
    fn test_missing_post_metric_has_no_delta() {
        let post: MetricSnapshot = [("stability".to_string(), 80.0)].into_iter().collect();
        let report = ScaleReport::build(&ramp(), post, RampResult::Success, None, 5.0);
        assert_eq!(report.deltas.len(), 1);
        assert_eq!(report.lessons.len(), 1);
        assert!(report.lessons[0].starts_with("Scaled throughput from 100 to 400"));
    }
}
