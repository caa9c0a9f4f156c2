//! Precondition Evaluator — go/no-go gate before any ramp starts
//!
//! Four checks, all required:
//!
//! | Check | Passes when |
//! |---|---|
//! | `sustained_improvement` | improvement counter ≥ required cycles |
//! | `policy_violations` | zero violations in the recent window |
//! | `continuity` | `OK`, or degraded with active mitigation |
//! | `upgrade_evaluated` | no upgrade active, or the active one has an ROI evaluation |

use serde::{Deserialize, Serialize};

use crate::collaborators::ContinuityStatus;

/// Hysteresis counter of consecutive improvement cycles. A single
/// non-improving cycle resets it to zero.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ImprovementTracker {
    sustained_cycles: u32,
}

impl ImprovementTracker {
    pub fn with_cycles(sustained_cycles: u32) -> Self {
        Self { sustained_cycles }
    }

    /// Record one cycle's outcome and return the updated count.
    pub fn record(&mut self, improved: bool) -> u32 {
        self.sustained_cycles = if improved {
            self.sustained_cycles.saturating_add(1)
        } else {
            0
        };
        self.sustained_cycles
    }

    pub fn sustained_cycles(&self) -> u32 {
        self.sustained_cycles
    }
}

/// What the upgrade controller exposes to scale preconditions.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct UpgradeReadiness {
    /// Id of the plan currently in flight, if any.
    pub active_plan: Option<String>,
    /// Whether the active plan has at least one ROI evaluation.
    pub evaluated: bool,
}

impl UpgradeReadiness {
    pub fn idle() -> Self {
        Self::default()
    }

    /// Scaling is blocked only while an upgrade is active and unevaluated.
    pub fn permits_scaling(&self) -> bool {
        self.active_plan.is_none() || self.evaluated
    }
}

/// Everything the evaluator needs, gathered before any decision is made.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PreconditionInputs {
    pub sustained_cycles: u32,
    pub required_cycles: u32,
    pub recent_violations: u32,
    pub continuity: ContinuityStatus,
    pub upgrade: UpgradeReadiness,
}

/// Result of one precondition.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PreconditionCheck {
    pub name: String,
    pub passed: bool,
    pub detail: String,
}

/// Outcome of every precondition.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PreconditionReport {
    pub checks: Vec<PreconditionCheck>,
}

impl PreconditionReport {
    pub fn passed(&self) -> bool {
        self.checks.iter().all(|c| c.passed)
    }

    /// Details of the failing checks.
    pub fn failures(&self) -> Vec<String> {
        self.checks
            .iter()
            .filter(|c| !c.passed)
            .map(|c| format!("{}: {}", c.name, c.detail))
            .collect()
    }
}

/// Evaluate every precondition. All are reported, not just the first failure.
pub fn evaluate(inputs: &PreconditionInputs) -> PreconditionReport {
    let mut checks = Vec::with_capacity(4);

    checks.push(PreconditionCheck {
        name: "sustained_improvement".to_string(),
        passed: inputs.sustained_cycles >= inputs.required_cycles,
        detail: format!(
            "{} of {} required improvement cycles",
            inputs.sustained_cycles, inputs.required_cycles
        ),
    });

    checks.push(PreconditionCheck {
        name: "policy_violations".to_string(),
        passed: inputs.recent_violations == 0,
        detail: format!("{} recent violations", inputs.recent_violations),
    });

    checks.push(PreconditionCheck {
        name: "continuity".to_string(),
        passed: inputs.continuity.permits_scaling(),
        detail: format!("continuity is {}", inputs.continuity),
    });

    checks.push(PreconditionCheck {
        name: "upgrade_evaluated".to_string(),
        passed: inputs.upgrade.permits_scaling(),
        detail: match &inputs.upgrade.active_plan {
            None => "no upgrade active".to_string(),
            Some(id) if inputs.upgrade.evaluated => format!("upgrade {} has ROI evaluation", id),
            Some(id) => format!("upgrade {} is active without ROI evaluation", id),
        },
    });

    PreconditionReport { checks }
}
