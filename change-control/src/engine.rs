//! `ChangeControl` wires the two controllers together.
//!
//! Scale preconditions need to know whether an upgrade is in flight and
//! unevaluated; this context feeds the upgrade controller's readiness
//! into every ramp start. Independent instances share nothing.

use serde::{Deserialize, Serialize};

use crate::collaborators::Collaborators;
use crate::config::{ConfigError, ControlConfig};
use crate::error::ControlResult;
use crate::scale::precondition::PreconditionReport;
use crate::scale::ramp::ScaleRamp;
use crate::scale::{RampRequest, ScaleController, ScaleLedger, ScaleSummary};
use crate::upgrade::{UpgradeController, UpgradeLedger, UpgradeSummary};

/// Full serializable state of a [`ChangeControl`].
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ControlStatus {
    pub upgrades: UpgradeLedger,
    pub scaling: ScaleLedger,
}

/// Compact view for dashboards.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ControlSummary {
    pub upgrades: UpgradeSummary,
    pub scaling: ScaleSummary,
    /// Whether the upgrade side currently permits a ramp to start.
    pub scaling_unblocked: bool,
}

/// Upgrade and scale controllers sharing one set of collaborators.
#[derive(Debug)]
pub struct ChangeControl {
    upgrades: UpgradeController,
    scaling: ScaleController,
}

impl ChangeControl {
    /// Build both controllers from validated configuration.
    pub fn new(config: ControlConfig, collaborators: Collaborators) -> Result<Self, ConfigError> {
        config.validate()?;
        let limits = config.dimension_limits()?;
        Ok(Self {
            upgrades: UpgradeController::new(config.upgrade, collaborators.clone()),
            scaling: ScaleController::new(config.scale, limits, collaborators),
        })
    }

    /// Rebuild from an exported status. Dimension limits come from the
    /// status, not from `config`.
    pub fn restore(
        config: ControlConfig,
        collaborators: Collaborators,
        status: ControlStatus,
    ) -> Result<Self, ConfigError> {
        config.validate()?;
        Ok(Self {
            upgrades: UpgradeController::restore(config.upgrade, collaborators.clone(), status.upgrades),
            scaling: ScaleController::restore(config.scale, collaborators, status.scaling),
        })
    }

    pub fn upgrades(&self) -> &UpgradeController {
        &self.upgrades
    }

    pub fn upgrades_mut(&mut self) -> &mut UpgradeController {
        &mut self.upgrades
    }

    pub fn scaling(&self) -> &ScaleController {
        &self.scaling
    }

    pub fn scaling_mut(&mut self) -> &mut ScaleController {
        &mut self.scaling
    }

    /// Start a ramp with the current upgrade readiness as a precondition.
    pub async fn start_scale_ramp(&mut self, request: RampRequest) -> ControlResult<ScaleRamp> {
        let readiness = self.upgrades.readiness();
        self.scaling.start_ramp(request, &readiness).await
    }

    /// Preview the preconditions a ramp start would check.
    pub async fn scale_preconditions(&self) -> ControlResult<PreconditionReport> {
        self.scaling
            .evaluate_preconditions(&self.upgrades.readiness())
            .await
    }

    pub fn status(&self) -> ControlStatus {
        ControlStatus {
            upgrades: self.upgrades.export(),
            scaling: self.scaling.export(),
        }
    }

    pub fn summary(&self) -> ControlSummary {
        ControlSummary {
            upgrades: self.upgrades.summary(),
            scaling: self.scaling.summary(),
            scaling_unblocked: self.upgrades.readiness().permits_scaling(),
        }
    }
}
