//! Feature Flags — per-plan switches gating upgrade behavior
//!
//! Every upgrade plan owns exactly one flag. Flags are created disabled,
//! enabled only when the plan goes live, and disabled again on rollback.
//! Each toggle is kept in the flag's history for auditing.
//!
//! # Usage
//!
//! ```rust,ignore
//! use change_control::upgrade::flags::FlagRegistry;
//!
//! let mut flags = FlagRegistry::new();
//! flags.register("upgrade.compute.bigger_batches.1f2e3d4c", "plan-1")?;
//! assert!(!flags.is_enabled("upgrade.compute.bigger_batches.1f2e3d4c"));
//! ```

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

use crate::error::{ControlError, ControlResult};

/// A boolean switch owned by one upgrade plan.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FeatureFlag {
    /// Unique flag name.
    pub name: String,
    /// Whether the gated behavior is active.
    pub enabled: bool,
    /// Plan that owns this flag.
    pub plan_id: String,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    /// Every enable/disable, oldest first.
    #[serde(default)]
    pub toggles: Vec<FlagToggle>,
}

/// Record of a flag being switched.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FlagToggle {
    pub enabled: bool,
    pub at: DateTime<Utc>,
    pub reason: String,
}

/// Flag summary for status reporting.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FlagSummary {
    pub total: usize,
    /// Names of enabled flags, sorted.
    pub enabled: Vec<String>,
}

/// Owns every feature flag created by the upgrade controller.
///
/// Flags of kept upgrades stay enabled for as long as the process runs, so
/// the registry holds one entry per completed upgrade plus the disabled
/// flags of plans still in history.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct FlagRegistry {
    flags: BTreeMap<String, FeatureFlag>,
}

impl FlagRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Rebuild from exported flags.
    pub fn from_flags(flags: impl IntoIterator<Item = FeatureFlag>) -> Self {
        Self {
            flags: flags.into_iter().map(|f| (f.name.clone(), f)).collect(),
        }
    }

    /// Create a disabled flag owned by `plan_id`.
    pub fn register(&mut self, name: &str, plan_id: &str) -> ControlResult<()> {
        if self.flags.contains_key(name) {
            return Err(ControlError::InvalidRequest(format!(
                "feature flag '{}' already exists",
                name
            )));
        }
        let now = Utc::now();
        self.flags.insert(
            name.to_string(),
            FeatureFlag {
                name: name.to_string(),
                enabled: false,
                plan_id: plan_id.to_string(),
                created_at: now,
                updated_at: now,
                toggles: Vec::new(),
            },
        );
        Ok(())
    }

    pub fn get(&self, name: &str) -> Option<&FeatureFlag> {
        self.flags.get(name)
    }

    /// Whether a flag exists and is enabled. Unknown flags read as off.
    pub fn is_enabled(&self, name: &str) -> bool {
        self.flags.get(name).map(|f| f.enabled).unwrap_or(false)
    }

    pub fn enable(&mut self, name: &str, reason: &str) -> ControlResult<()> {
        self.set(name, true, reason)
    }

    /// Disable a flag. Already-disabled flags are left as they are.
    pub fn disable(&mut self, name: &str, reason: &str) -> ControlResult<()> {
        self.set(name, false, reason)
    }

    fn set(&mut self, name: &str, enabled: bool, reason: &str) -> ControlResult<()> {
        let flag = self.flags.get_mut(name).ok_or_else(|| {
            ControlError::InvalidRequest(format!("unknown feature flag '{}'", name))
        })?;

        if flag.enabled == enabled {
            return Ok(());
        }

        let now = Utc::now();
        flag.toggles.push(FlagToggle {
            enabled,
            at: now,
            reason: reason.to_string(),
        });
        flag.enabled = enabled;
        flag.updated_at = now;
        Ok(())
    }

    /// Drop a disabled flag whose plan has left history. Enabled flags
    /// gate live behavior and are kept: a flag only switches off on
    /// rollback, and a completed plan can no longer roll back.
    pub fn retire(&mut self, name: &str) -> Option<FeatureFlag> {
        if self.flags.get(name).is_some_and(|f| !f.enabled) {
            self.flags.remove(name)
        } else {
            None
        }
    }

    pub fn iter(&self) -> impl Iterator<Item = &FeatureFlag> {
        self.flags.values()
    }

    pub fn len(&self) -> usize {
        self.flags.len()
    }

    pub fn is_empty(&self) -> bool {
        self.flags.is_empty()
    }

    pub fn summary(&self) -> FlagSummary {
        FlagSummary {
            total: self.flags.len(),
            enabled: self
                .flags
                .values()
                .filter(|f| f.enabled)
                .map(|f| f.name.clone())
                .collect(),
        }
    }
}
