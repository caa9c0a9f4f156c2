//! Configuration for the upgrade and scale controllers.
//!
//! Loaded from TOML, then optionally overridden from the environment.
//!
//! # Environment Variables
//!
//! | Variable | Default | Description |
//! |---|---|---|
//! | `CHANGE_ROI_THRESHOLD` | `5.0` | Mean delta required to keep an upgrade |
//! | `CHANGE_REQUIRED_CYCLES` | `3` | Sustained improvement cycles before a ramp |
//! | `CHANGE_CHECKPOINT_TOLERANCE` | `10.0` | Allowed drop below baseline per checkpoint |
//!
//! # Example
//!
//! ```toml
//! [upgrade]
//! roi_threshold = 5.0
//!
//! [upgrade.axis_roi_thresholds]
//! provider = 8.0
//!
//! [scale]
//! required_cycles = 3
//! checkpoint_tolerance = 10.0
//!
//! [dimensions.throughput]
//! current = 100
//! hard_cap = 1000
//! ```

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use thiserror::Error;

use crate::scale::limits::{Dimension, DimensionLimit, DimensionLimits};
use crate::upgrade::plan::Axis;

/// Errors from loading or validating configuration
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("failed to read config file {path}: {source}")]
    Read {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("failed to parse config: {0}")]
    Parse(#[from] toml::de::Error),

    #[error("invalid value for {var}: '{value}'")]
    Env { var: String, value: String },

    #[error("invalid config: {0}")]
    Invalid(String),
}

/// Upgrade controller settings.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct UpgradeConfig {
    /// Mean delta (points) an upgrade must reach to be kept.
    pub roi_threshold: f64,
    /// Terminal plans retained in history.
    pub history_capacity: usize,
    /// ROI records retained.
    pub roi_history_capacity: usize,
    /// Per-axis threshold overrides, keyed by axis name.
    pub axis_roi_thresholds: BTreeMap<String, f64>,
}

impl Default for UpgradeConfig {
    fn default() -> Self {
        Self {
            roi_threshold: 5.0,
            history_capacity: 50,
            roi_history_capacity: 100,
            axis_roi_thresholds: BTreeMap::new(),
        }
    }
}

impl UpgradeConfig {
    /// ROI threshold for `axis`, falling back to the global threshold.
    pub fn roi_threshold_for(&self, axis: Axis) -> f64 {
        self.axis_roi_thresholds
            .get(&axis.to_string())
            .copied()
            .unwrap_or(self.roi_threshold)
    }
}

/// Scale controller settings.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ScaleConfig {
    /// Consecutive improvement cycles required before a ramp may start.
    pub required_cycles: u32,
    /// Points a metric may drop below its pre-ramp baseline at a checkpoint.
    pub checkpoint_tolerance: f64,
    /// Number of steps a ramp is split into when no step size is given.
    pub default_step_divisor: u64,
    /// Movement (points) above which a metric gets its own report lesson.
    pub lesson_delta_threshold: f64,
    /// Terminal ramps retained in history.
    pub history_capacity: usize,
    /// Per-dimension tolerance overrides, keyed by dimension name.
    pub dimension_tolerances: BTreeMap<String, f64>,
}

impl Default for ScaleConfig {
    fn default() -> Self {
        Self {
            required_cycles: 3,
            checkpoint_tolerance: 10.0,
            default_step_divisor: 5,
            lesson_delta_threshold: 5.0,
            history_capacity: 50,
            dimension_tolerances: BTreeMap::new(),
        }
    }
}

impl ScaleConfig {
    /// Checkpoint tolerance for `dimension`, falling back to the global value.
    pub fn tolerance_for(&self, dimension: Dimension) -> f64 {
        self.dimension_tolerances
            .get(&dimension.to_string())
            .copied()
            .unwrap_or(self.checkpoint_tolerance)
    }
}

/// Initial value and hard cap of one dimension.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct LimitConfig {
    pub current: u64,
    pub hard_cap: u64,
}

/// Top-level configuration.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ControlConfig {
    pub upgrade: UpgradeConfig,
    pub scale: ScaleConfig,
    /// Dimension limits keyed by dimension name. Dimensions not listed use
    /// their built-in defaults.
    pub dimensions: BTreeMap<String, LimitConfig>,
}

impl ControlConfig {
    /// Parse configuration from a TOML string.
    pub fn from_toml_str(input: &str) -> Result<Self, ConfigError> {
        Ok(toml::from_str(input)?)
    }

    /// Load configuration from a TOML file.
    pub fn load(path: &Path) -> Result<Self, ConfigError> {
        let raw = std::fs::read_to_string(path).map_err(|source| ConfigError::Read {
            path: path.to_path_buf(),
            source,
        })?;
        Self::from_toml_str(&raw)
    }

    /// Apply `CHANGE_*` environment overrides.
    pub fn apply_env_overrides(&mut self) -> Result<(), ConfigError> {
        self.apply_overrides_from(|var| std::env::var(var).ok())
    }

    /// Apply overrides from an arbitrary variable lookup.
    pub fn apply_overrides_from<F>(&mut self, lookup: F) -> Result<(), ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        if let Some(v) = parse_var::<_, f64>(&lookup, "CHANGE_ROI_THRESHOLD")? {
            self.upgrade.roi_threshold = v;
        }
        if let Some(v) = parse_var::<_, u32>(&lookup, "CHANGE_REQUIRED_CYCLES")? {
            self.scale.required_cycles = v;
        }
        if let Some(v) = parse_var::<_, f64>(&lookup, "CHANGE_CHECKPOINT_TOLERANCE")? {
            self.scale.checkpoint_tolerance = v;
        }
        Ok(())
    }

    /// Reject settings the controllers cannot run with.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.upgrade.history_capacity == 0
            || self.upgrade.roi_history_capacity == 0
            || self.scale.history_capacity == 0
        {
            return Err(ConfigError::Invalid(
                "history capacities must be at least 1".to_string(),
            ));
        }
        if self.scale.default_step_divisor == 0 {
            return Err(ConfigError::Invalid(
                "scale.default_step_divisor must be at least 1".to_string(),
            ));
        }
        if !self.upgrade.roi_threshold.is_finite() {
            return Err(ConfigError::Invalid(
                "upgrade.roi_threshold must be finite".to_string(),
            ));
        }
        if self.scale.checkpoint_tolerance.is_nan() || self.scale.checkpoint_tolerance < 0.0 {
            return Err(ConfigError::Invalid(
                "scale.checkpoint_tolerance must be non-negative".to_string(),
            ));
        }
        for (name, threshold) in &self.upgrade.axis_roi_thresholds {
            name.parse::<Axis>().map_err(ConfigError::Invalid)?;
            if !threshold.is_finite() {
                return Err(ConfigError::Invalid(format!(
                    "ROI threshold for axis '{}' must be finite",
                    name
                )));
            }
        }
        for (name, tolerance) in &self.scale.dimension_tolerances {
            name.parse::<Dimension>().map_err(ConfigError::Invalid)?;
            if tolerance.is_nan() || *tolerance < 0.0 {
                return Err(ConfigError::Invalid(format!(
                    "tolerance for dimension '{}' must be non-negative",
                    name
                )));
            }
        }
        self.dimension_limits().map(|_| ())
    }

    /// Resolve configured limits over the built-in defaults.
    pub fn dimension_limits(&self) -> Result<DimensionLimits, ConfigError> {
        let mut limits: BTreeMap<Dimension, DimensionLimit> = DimensionLimits::defaults()
            .iter()
            .map(|l| (l.dimension, *l))
            .collect();

        for (name, limit) in &self.dimensions {
            let dimension = name.parse::<Dimension>().map_err(ConfigError::Invalid)?;
            if limit.current > limit.hard_cap {
                return Err(ConfigError::Invalid(format!(
                    "dimension '{}' starts at {} above its hard cap {}",
                    name, limit.current, limit.hard_cap
                )));
            }
            limits.insert(
                dimension,
                DimensionLimit::new(dimension, limit.current, limit.hard_cap),
            );
        }

        Ok(DimensionLimits::from_limits(limits.into_values()))
    }
}

fn parse_var<F, T>(lookup: &F, var: &str) -> Result<Option<T>, ConfigError>
where
    F: Fn(&str) -> Option<String>,
    T: std::str::FromStr,
{
    match lookup(var) {
        None => Ok(None),
        Some(raw) => raw
            .trim()
            .parse::<T>()
            .map(Some)
            .map_err(|_| ConfigError::Env {
                var: var.to_string(),
                value: raw,
            }),
    }
}
