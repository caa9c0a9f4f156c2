//! Controlled-change rollout for a running multi-agent system.
//!
//! Two controllers guard every change:
//!
//! - [`UpgradeController`] takes one hypothesis-driven upgrade at a time
//!   through gate approval, a dry run, and a live period behind a feature
//!   flag, then scores it against the metrics it promised to move.
//! - [`ScaleController`] ramps one bounded dimension at a time in
//!   checkpointed steps and rolls back on the first metric regression.
//!
//! [`ChangeControl`] wires the two so an unevaluated upgrade blocks scaling.
//! Metrics, gates, and continuity health come from injected
//! [`Collaborators`]; [`simulated`] provides in-memory ones.

pub mod collaborators;
pub mod config;
pub mod engine;
pub mod error;
pub mod scale;
pub mod simulated;
pub mod state;
pub mod upgrade;

pub use collaborators::{
    ActionKind, Collaborators, ContinuityMonitor, ContinuityStatus, GateKind, MetricSnapshot,
    MetricSource, OpsGate, OpsVerdict, PolicyGate, PolicyVerdict,
};
pub use config::{ConfigError, ControlConfig, ScaleConfig, UpgradeConfig};
pub use engine::{ChangeControl, ControlStatus, ControlSummary};
pub use error::{CollaboratorError, ControlError, ControlResult};
pub use scale::limits::{Dimension, DimensionLimit, DimensionLimits};
pub use scale::precondition::{PreconditionReport, UpgradeReadiness};
pub use scale::ramp::{RampResult, RampStatus, ScaleRamp};
pub use scale::report::ScaleReport;
pub use scale::{RampRequest, ScaleController, StepOutcome};
pub use upgrade::plan::{Axis, SuccessMetric, UpgradePlan, UpgradeProposal, UpgradeStatus};
pub use upgrade::roi::{RoiDecision, RoiRecord};
pub use upgrade::UpgradeController;
