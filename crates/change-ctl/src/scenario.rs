//! Scripted scenarios: a simulated world plus a list of operator actions.
//!
//! ```toml
//! name = "throughput ramp"
//!
//! [world]
//! metrics = { stability = 80.0, quality = 60.0 }
//!
//! [[steps]]
//! action = "improvement_cycle"
//! improved = true
//! count = 3
//!
//! [[steps]]
//! action = "start_ramp"
//! dimension = "throughput"
//! target = 600
//!
//! [[steps]]
//! action = "step_until_done"
//! ```
//!
//! A step that the engine refuses is recorded as a failed step rather than
//! aborting the run; refusals (vetoes, failed preconditions) are usually
//! what a scenario is written to show.

use anyhow::{Context, Result};
use change_control::simulated::SimulatedWorld;
use change_control::{
    Axis, ChangeControl, ContinuityStatus, ControlConfig, ControlError, ControlStatus,
    ControlSummary, Dimension, MetricSnapshot, RampRequest, SuccessMetric, UpgradeProposal,
};
use serde::{Deserialize, Serialize};
use std::path::Path;
use tracing::{info, warn};

fn default_count() -> u32 {
    1
}

fn default_max_steps() -> u32 {
    100
}

/// Initial state of the simulated collaborators.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct WorldSpec {
    pub metrics: MetricSnapshot,
    #[serde(default)]
    pub violations: u32,
    #[serde(default = "healthy")]
    pub continuity: ContinuityStatus,
}

fn healthy() -> ContinuityStatus {
    ContinuityStatus::Ok
}

/// One scripted action.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "action", rename_all = "snake_case")]
pub enum ScenarioStep {
    ImprovementCycle {
        improved: bool,
        #[serde(default = "default_count")]
        count: u32,
    },
    SetMetric {
        metric: String,
        value: f64,
    },
    /// Queue snapshots served by the next metric queries, in order.
    QueueMetrics {
        snapshots: Vec<MetricSnapshot>,
    },
    /// Veto every policy check with `reason`; omit `reason` to lift it.
    PolicyVeto {
        #[serde(default)]
        reason: Option<String>,
    },
    /// Deny every operations check with `reason`; omit `reason` to lift it.
    OpsDeny {
        #[serde(default)]
        reason: Option<String>,
    },
    Violations {
        count: u32,
    },
    Continuity {
        status: ContinuityStatus,
    },
    Propose {
        axis: Axis,
        name: String,
        hypothesis: String,
        #[serde(default)]
        scope: String,
        success_metrics: Vec<SuccessMetric>,
    },
    Approve,
    DryRun,
    GoLive,
    EvaluateRoi,
    Complete {
        #[serde(default)]
        lessons: Vec<String>,
    },
    RollbackUpgrade {
        reason: String,
    },
    StartRamp {
        dimension: Dimension,
        target: u64,
        #[serde(default)]
        step_size: Option<u64>,
    },
    Step {
        #[serde(default = "default_count")]
        count: u32,
    },
    StepUntilDone {
        #[serde(default = "default_max_steps")]
        max_steps: u32,
    },
    RollbackRamp {
        reason: String,
    },
}

impl ScenarioStep {
    fn label(&self) -> &'static str {
        match self {
            Self::ImprovementCycle { .. } => "improvement_cycle",
            Self::SetMetric { .. } => "set_metric",
            Self::QueueMetrics { .. } => "queue_metrics",
            Self::PolicyVeto { .. } => "policy_veto",
            Self::OpsDeny { .. } => "ops_deny",
            Self::Violations { .. } => "violations",
            Self::Continuity { .. } => "continuity",
            Self::Propose { .. } => "propose",
            Self::Approve => "approve",
            Self::DryRun => "dry_run",
            Self::GoLive => "go_live",
            Self::EvaluateRoi => "evaluate_roi",
            Self::Complete { .. } => "complete",
            Self::RollbackUpgrade { .. } => "rollback_upgrade",
            Self::StartRamp { .. } => "start_ramp",
            Self::Step { .. } => "step",
            Self::StepUntilDone { .. } => "step_until_done",
            Self::RollbackRamp { .. } => "rollback_ramp",
        }
    }
}

/// A named world and the actions to run against it.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Scenario {
    #[serde(default)]
    pub name: String,
    pub world: WorldSpec,
    #[serde(default)]
    pub steps: Vec<ScenarioStep>,
}

impl Scenario {
    pub fn from_toml_str(input: &str) -> Result<Self> {
        toml::from_str(input).context("parsing scenario")
    }

    pub fn load(path: &Path) -> Result<Self> {
        let raw = std::fs::read_to_string(path)
            .with_context(|| format!("reading scenario {}", path.display()))?;
        Self::from_toml_str(&raw).with_context(|| format!("in {}", path.display()))
    }
}

/// What happened at one scripted step.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StepRecord {
    pub index: usize,
    pub action: String,
    pub ok: bool,
    pub detail: String,
}

/// Full result of a scenario run.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ScenarioReport {
    pub name: String,
    pub steps: Vec<StepRecord>,
    pub summary: ControlSummary,
    pub status: ControlStatus,
}

impl ScenarioReport {
    pub fn failed_steps(&self) -> impl Iterator<Item = &StepRecord> {
        self.steps.iter().filter(|s| !s.ok)
    }
}

/// Run every step of `scenario` against a fresh engine.
pub async fn run(scenario: Scenario, config: ControlConfig) -> Result<ScenarioReport> {
    let world = SimulatedWorld::new(scenario.world.metrics.clone());
    world.policy.set_violations(scenario.world.violations);
    world.continuity.set(scenario.world.continuity);

    let mut control =
        ChangeControl::new(config, world.collaborators()).context("building change control")?;

    info!(scenario = %scenario.name, steps = scenario.steps.len(), "Running scenario");

    let mut records = Vec::with_capacity(scenario.steps.len());
    for (index, step) in scenario.steps.into_iter().enumerate() {
        let action = step.label().to_string();
        let (ok, detail) = match apply(&mut control, &world, step).await {
            Ok(detail) => (true, detail),
            Err(e) => {
                warn!(step = index, action = %action, error = %e, "Scenario step refused");
                (false, e.to_string())
            }
        };
        records.push(StepRecord {
            index,
            action,
            ok,
            detail,
        });
    }

    Ok(ScenarioReport {
        name: scenario.name,
        steps: records,
        summary: control.summary(),
        status: control.status(),
    })
}

fn active_plan_id(control: &ChangeControl) -> Result<String, ControlError> {
    control
        .upgrades()
        .active()
        .map(|p| p.id.clone())
        .ok_or(ControlError::NoActivePlan)
}

async fn apply(
    control: &mut ChangeControl,
    world: &SimulatedWorld,
    step: ScenarioStep,
) -> Result<String, ControlError> {
    match step {
        ScenarioStep::ImprovementCycle { improved, count } => {
            let mut cycles = control.scaling().sustained_cycles();
            for _ in 0..count {
                cycles = control.scaling_mut().record_improvement_cycle(improved);
            }
            Ok(format!("{} sustained improvement cycles", cycles))
        }
        ScenarioStep::SetMetric { metric, value } => {
            world.metrics.set_metric(&metric, value);
            Ok(format!("{} = {:.1}", metric, value))
        }
        ScenarioStep::QueueMetrics { snapshots } => {
            let queued = snapshots.len();
            for snapshot in snapshots {
                world.metrics.push(snapshot);
            }
            Ok(format!("{} snapshots queued", queued))
        }
        ScenarioStep::PolicyVeto { reason } => Ok(match reason {
            Some(reason) => {
                world.policy.veto(&reason);
                format!("policy vetoes: {}", reason)
            }
            None => {
                world.policy.allow();
                "policy approves".to_string()
            }
        }),
        ScenarioStep::OpsDeny { reason } => Ok(match reason {
            Some(reason) => {
                world.ops.deny(&reason);
                format!("operations denies: {}", reason)
            }
            None => {
                world.ops.allow();
                "operations allows".to_string()
            }
        }),
        ScenarioStep::Violations { count } => {
            world.policy.set_violations(count);
            Ok(format!("{} recent violations", count))
        }
        ScenarioStep::Continuity { status } => {
            world.continuity.set(status);
            Ok(format!("continuity {}", status))
        }
        ScenarioStep::Propose {
            axis,
            name,
            hypothesis,
            scope,
            success_metrics,
        } => {
            let plan = control
                .upgrades_mut()
                .propose(UpgradeProposal {
                    axis,
                    name,
                    hypothesis,
                    scope,
                    success_metrics,
                })
                .await?;
            Ok(format!("plan {} proposed with flag {}", plan.id, plan.flag))
        }
        ScenarioStep::Approve => {
            let id = active_plan_id(control)?;
            let plan = control.upgrades_mut().approve(&id).await?;
            Ok(format!("plan {} {}", plan.id, plan.status))
        }
        ScenarioStep::DryRun => {
            let id = active_plan_id(control)?;
            let plan = control.upgrades_mut().start_dry_run(&id)?;
            Ok(format!("plan {} {}", plan.id, plan.status))
        }
        ScenarioStep::GoLive => {
            let id = active_plan_id(control)?;
            let plan = control.upgrades_mut().go_live(&id)?;
            Ok(format!("plan {} {}, flag {} enabled", plan.id, plan.status, plan.flag))
        }
        ScenarioStep::EvaluateRoi => {
            let record = control.upgrades_mut().evaluate_roi().await?;
            Ok(format!(
                "ROI {:.2} against threshold {:.2}: {}",
                record.roi_score, record.threshold, record.decision
            ))
        }
        ScenarioStep::Complete { lessons } => {
            let plan = control.upgrades_mut().complete(lessons)?;
            Ok(format!("plan {} {}", plan.id, plan.status))
        }
        ScenarioStep::RollbackUpgrade { reason } => {
            let plan = control.upgrades_mut().rollback(&reason)?;
            Ok(format!("plan {} {}", plan.id, plan.status))
        }
        ScenarioStep::StartRamp {
            dimension,
            target,
            step_size,
        } => {
            let ramp = control
                .start_scale_ramp(RampRequest {
                    dimension,
                    target,
                    step_size,
                })
                .await?;
            Ok(format!(
                "{} ramp {} -> {} in {} steps of {}",
                ramp.dimension, ramp.start_value, ramp.target_value, ramp.step_count, ramp.step_size
            ))
        }
        ScenarioStep::Step { count } => {
            let mut last = String::new();
            for _ in 0..count {
                let outcome = control.scaling_mut().step_ramp().await?;
                last = format!("step {} reached {}: {}", outcome.step, outcome.value, outcome.status);
                if !outcome.continued {
                    break;
                }
            }
            Ok(last)
        }
        ScenarioStep::StepUntilDone { max_steps } => {
            for _ in 0..max_steps {
                let outcome = control.scaling_mut().step_ramp().await?;
                if !outcome.continued {
                    let headline = outcome
                        .report
                        .and_then(|r| r.lessons.into_iter().next())
                        .unwrap_or_default();
                    return Ok(format!("{} after {} steps: {}", outcome.status, outcome.step, headline));
                }
            }
            Ok(format!("still ramping after {} steps", max_steps))
        }
        ScenarioStep::RollbackRamp { reason } => {
            let report = control.scaling_mut().rollback(&reason).await?;
            Ok(report.lessons.into_iter().next().unwrap_or_default())
        }
    }
}
