//! Status export and restore through the simulated collaborators.

use change_control::simulated::SimulatedWorld;
use change_control::{
    Axis, ChangeControl, ControlConfig, ControlStatus, Dimension, RampRequest, SuccessMetric,
    UpgradeProposal, UpgradeStatus,
};

async fn busy_control(world: &SimulatedWorld) -> ChangeControl {
    let mut control = ChangeControl::new(ControlConfig::default(), world.collaborators()).unwrap();
    for _ in 0..3 {
        control.scaling_mut().record_improvement_cycle(true);
    }

    // One completed compute upgrade.
    let plan = control
        .upgrades_mut()
        .propose(UpgradeProposal {
            axis: Axis::Compute,
            name: "Response cache".into(),
            hypothesis: "Caching cuts tail latency".into(),
            scope: "gateway".into(),
            success_metrics: vec![SuccessMetric::new("latency", 5.0)],
        })
        .await
        .unwrap();
    control.upgrades_mut().approve(&plan.id).await.unwrap();
    control.upgrades_mut().start_dry_run(&plan.id).unwrap();
    control.upgrades_mut().go_live(&plan.id).unwrap();
    world.metrics.set_metric("latency", 58.0);
    control.upgrades_mut().evaluate_roi().await.unwrap();
    control
        .upgrades_mut()
        .complete(vec!["cache hit rate settled at 40%".into()])
        .unwrap();

    // One stable ramp and one in flight.
    control
        .start_scale_ramp(RampRequest::new(Dimension::Concurrency, 8).with_step_size(4))
        .await
        .unwrap();
    control.scaling_mut().step_ramp().await.unwrap();
    control
        .start_scale_ramp(RampRequest::new(Dimension::Population, 60))
        .await
        .unwrap();
    control.scaling_mut().step_ramp().await.unwrap();

    control
}

#[tokio::test]
async fn status_survives_json_round_trip() {
    let world = SimulatedWorld::new([("latency", 50.0), ("stability", 80.0)]);
    let control = busy_control(&world).await;
    let status = control.status();

    let json = serde_json::to_string_pretty(&status).unwrap();
    let parsed: ControlStatus = serde_json::from_str(&json).unwrap();
    let restored = ChangeControl::restore(ControlConfig::default(), world.collaborators(), parsed).unwrap();

    assert_eq!(restored.status(), status);
    assert_eq!(restored.summary(), control.summary());
}

#[tokio::test]
async fn restored_control_keeps_working() {
    let world = SimulatedWorld::new([("latency", 50.0), ("stability", 80.0)]);
    let control = busy_control(&world).await;
    let mut restored =
        ChangeControl::restore(ControlConfig::default(), world.collaborators(), control.status()).unwrap();

    assert_eq!(restored.upgrades().axis_usage(Axis::Compute), 1);
    assert_eq!(restored.upgrades().suggest_next_axis(), Axis::Provider);
    assert_eq!(
        restored.upgrades().history().last().unwrap().status,
        UpgradeStatus::Completed
    );
    assert_eq!(restored.scaling().limit(Dimension::Concurrency).unwrap().current(), 8);

    while restored.scaling_mut().step_ramp().await.unwrap().continued {}
    assert_eq!(restored.scaling().limit(Dimension::Population).unwrap().current(), 60);
    assert_eq!(restored.summary().scaling.stable, 2);
}

#[tokio::test]
async fn summary_reflects_activity() {
    let world = SimulatedWorld::new([("latency", 50.0), ("stability", 80.0)]);
    let control = busy_control(&world).await;
    let summary = control.summary();

    assert_eq!(summary.upgrades.completed, 1);
    assert_eq!(summary.upgrades.last_roi, Some(8.0));
    assert_eq!(summary.upgrades.flags.enabled.len(), 1);
    assert_eq!(summary.scaling.active_dimension, Some(Dimension::Population));
    assert_eq!(summary.scaling.active_progress, Some((1, 5)));
    assert!(summary.scaling_unblocked);
}
