//! End-to-end scenarios against in-test fake collaborators.
//!
//! The fakes script metric snapshots per call so each test reads as a
//! timeline: baseline, then one snapshot per checkpoint, then the report.

use std::collections::VecDeque;
use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use change_control::{
    ActionKind, Axis, ChangeControl, CollaboratorError, Collaborators, ContinuityMonitor,
    ContinuityStatus, ControlConfig, ControlError, Dimension, MetricSnapshot, MetricSource,
    OpsGate, OpsVerdict, PolicyGate, PolicyVerdict, RampRequest, RampResult, RampStatus,
    RoiDecision, SuccessMetric, UpgradeProposal, UpgradeStatus,
};

fn snapshot(stability: f64, quality: f64) -> MetricSnapshot {
    [("stability", stability), ("quality", quality)]
        .iter()
        .map(|(k, v)| (k.to_string(), *v))
        .collect()
}

/// Serves scripted snapshots in order, repeating the last one.
struct TimelineMetrics {
    timeline: Mutex<VecDeque<MetricSnapshot>>,
    last: Mutex<MetricSnapshot>,
}

impl TimelineMetrics {
    fn steady(initial: MetricSnapshot) -> Self {
        Self {
            timeline: Mutex::new(VecDeque::new()),
            last: Mutex::new(initial),
        }
    }

    fn then(&self, next: MetricSnapshot) {
        self.timeline.lock().unwrap().push_back(next);
    }
}

#[async_trait]
impl MetricSource for TimelineMetrics {
    async fn snapshot(&self) -> Result<MetricSnapshot, CollaboratorError> {
        let mut last = self.last.lock().unwrap();
        if let Some(next) = self.timeline.lock().unwrap().pop_front() {
            *last = next;
        }
        Ok(last.clone())
    }
}

struct FakePolicy {
    violations: u32,
}

#[async_trait]
impl PolicyGate for FakePolicy {
    async fn check(&self, _: ActionKind, _: &str) -> Result<PolicyVerdict, CollaboratorError> {
        Ok(PolicyVerdict::approve())
    }

    async fn recent_violations(&self) -> Result<u32, CollaboratorError> {
        Ok(self.violations)
    }
}

struct OpenOps;

#[async_trait]
impl OpsGate for OpenOps {
    async fn check(&self, _: ActionKind, _: &str) -> Result<OpsVerdict, CollaboratorError> {
        Ok(OpsVerdict::allow())
    }
}

struct Healthy;

#[async_trait]
impl ContinuityMonitor for Healthy {
    async fn status(&self) -> Result<ContinuityStatus, CollaboratorError> {
        Ok(ContinuityStatus::Ok)
    }
}

fn control_with(metrics: Arc<TimelineMetrics>) -> ChangeControl {
    let collaborators = Collaborators::new(
        metrics,
        Arc::new(FakePolicy { violations: 0 }),
        Arc::new(OpenOps),
        Arc::new(Healthy),
    );
    ChangeControl::new(ControlConfig::default(), collaborators).unwrap()
}

fn sustain(control: &mut ChangeControl, cycles: u32) {
    for _ in 0..cycles {
        control.scaling_mut().record_improvement_cycle(true);
    }
}

#[tokio::test]
async fn throughput_ramp_reaches_target() {
    let metrics = Arc::new(TimelineMetrics::steady(snapshot(80.0, 60.0)));
    let mut control = control_with(metrics);
    sustain(&mut control, 3);

    control
        .start_scale_ramp(RampRequest::new(Dimension::Throughput, 600))
        .await
        .unwrap();

    let mut outcomes = Vec::new();
    loop {
        let outcome = control.scaling_mut().step_ramp().await.unwrap();
        let continued = outcome.continued;
        outcomes.push(outcome);
        if !continued {
            break;
        }
    }

    assert_eq!(outcomes.len(), 5);
    assert!(outcomes.iter().all(|o| o.checkpoint.passed));
    let values: Vec<u64> = outcomes.iter().map(|o| o.value).collect();
    assert_eq!(values, vec![200, 300, 400, 500, 600]);

    let last = outcomes.last().unwrap();
    assert_eq!(last.status, RampStatus::Stable);
    assert_eq!(last.report.as_ref().unwrap().final_value, 600);
    assert_eq!(control.scaling().limit(Dimension::Throughput).unwrap().current(), 600);
}

#[tokio::test]
async fn stability_drop_at_step_three_rolls_back() {
    let metrics = Arc::new(TimelineMetrics::steady(snapshot(80.0, 60.0)));
    // baseline, step 1, step 2, step 3, report
    metrics.then(snapshot(80.0, 60.0));
    metrics.then(snapshot(79.0, 61.0));
    metrics.then(snapshot(78.0, 61.0));
    metrics.then(snapshot(65.0, 61.0));
    let mut control = control_with(metrics);
    sustain(&mut control, 3);

    control
        .start_scale_ramp(RampRequest::new(Dimension::Throughput, 600))
        .await
        .unwrap();
    assert!(control.scaling_mut().step_ramp().await.unwrap().continued);
    assert!(control.scaling_mut().step_ramp().await.unwrap().continued);

    let outcome = control.scaling_mut().step_ramp().await.unwrap();
    assert!(!outcome.continued);
    assert_eq!(outcome.status, RampStatus::Failed);

    let report = outcome.report.unwrap();
    assert_eq!(report.result, RampResult::Rollback);
    assert_eq!(report.deltas["stability"], -15.0);
    assert!(report
        .lessons
        .iter()
        .any(|l| l == "stability fell 15.0 points (80.0 -> 65.0)"));
    assert_eq!(control.scaling().limit(Dimension::Throughput).unwrap().current(), 100);

    let err = control.scaling_mut().step_ramp().await.unwrap_err();
    assert!(matches!(err, ControlError::NoActiveRamp));
}

#[tokio::test]
async fn second_proposal_leaves_active_plan_alone() {
    let metrics = Arc::new(TimelineMetrics::steady(snapshot(80.0, 60.0)));
    let mut control = control_with(metrics);

    let proposal = UpgradeProposal {
        axis: Axis::Provider,
        name: "Faster provider".into(),
        hypothesis: "Lower latency keeps agents coherent".into(),
        scope: "all agents".into(),
        success_metrics: vec![SuccessMetric::new("stability", 5.0)],
    };
    let first = control.upgrades_mut().propose(proposal.clone()).await.unwrap();
    let before = control.status();

    let err = control.upgrades_mut().propose(proposal).await.unwrap_err();
    assert!(err.is_invariant_violation());
    assert_eq!(control.upgrades().active().map(|p| p.id.as_str()), Some(first.id.as_str()));
    assert_eq!(control.status(), before);
}

#[tokio::test]
async fn roi_at_exact_threshold_is_kept() {
    let metrics = Arc::new(TimelineMetrics::steady(snapshot(80.0, 60.0)));
    let mut control = control_with(metrics.clone());

    let plan = control
        .upgrades_mut()
        .propose(UpgradeProposal {
            axis: Axis::Data,
            name: "Validated ingestion".into(),
            hypothesis: "Clean memory raises answer quality".into(),
            scope: String::new(),
            success_metrics: vec![SuccessMetric::new("quality", 5.0)],
        })
        .await
        .unwrap();
    control.upgrades_mut().approve(&plan.id).await.unwrap();
    control.upgrades_mut().start_dry_run(&plan.id).unwrap();
    control.upgrades_mut().go_live(&plan.id).unwrap();

    metrics.then(snapshot(80.0, 65.0));
    let record = control.upgrades_mut().evaluate_roi().await.unwrap();
    assert_eq!(record.roi_score, 5.0);
    assert!(record.passed);
    assert_eq!(record.decision, RoiDecision::Keep);
    assert_eq!(control.upgrades().active().unwrap().status, UpgradeStatus::Live);
}

#[tokio::test]
async fn two_cycles_of_three_blocks_ramp() {
    let metrics = Arc::new(TimelineMetrics::steady(snapshot(80.0, 60.0)));
    let mut control = control_with(metrics);
    sustain(&mut control, 2);

    let err = control
        .start_scale_ramp(RampRequest::new(Dimension::Throughput, 600))
        .await
        .unwrap_err();
    assert!(matches!(err, ControlError::PreconditionsFailed(_)));
    assert!(control.scaling().active().is_none());
    assert_eq!(control.scaling().limit(Dimension::Throughput).unwrap().current(), 100);
}

#[tokio::test]
async fn target_above_cap_is_clamped() {
    let metrics = Arc::new(TimelineMetrics::steady(snapshot(80.0, 60.0)));
    let mut control = control_with(metrics);
    sustain(&mut control, 3);

    let ramp = control
        .start_scale_ramp(RampRequest::new(Dimension::Concurrency, 1_000).with_step_size(20))
        .await
        .unwrap();
    assert_eq!(ramp.target_value, 64);
    assert_eq!(ramp.step_count, 3);

    while control.scaling_mut().step_ramp().await.unwrap().continued {
        let limit = control.scaling().limit(Dimension::Concurrency).unwrap();
        assert!(limit.current() <= limit.hard_cap());
    }
    assert_eq!(control.scaling().limit(Dimension::Concurrency).unwrap().current(), 64);
}

#[tokio::test]
async fn policy_violations_block_ramp() {
    let metrics = Arc::new(TimelineMetrics::steady(snapshot(80.0, 60.0)));
    let collaborators = Collaborators::new(
        metrics,
        Arc::new(FakePolicy { violations: 2 }),
        Arc::new(OpenOps),
        Arc::new(Healthy),
    );
    let mut control = ChangeControl::new(ControlConfig::default(), collaborators).unwrap();
    sustain(&mut control, 5);

    let err = control
        .start_scale_ramp(RampRequest::new(Dimension::Storage, 4096))
        .await
        .unwrap_err();
    match err {
        ControlError::PreconditionsFailed(report) => {
            assert_eq!(
                report.failures(),
                vec!["policy_violations: 2 recent violations".to_string()]
            );
        }
        other => panic!("unexpected error: {:?}", other),
    }
}
