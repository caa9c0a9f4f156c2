//! Bounded operating dimensions and their hard caps.

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;
use std::str::FromStr;

/// A numeric operating parameter that can be ramped under supervision.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Dimension {
    /// Number of simulated agents.
    Population,
    /// Requests processed per tick.
    Throughput,
    /// Parallel agent tasks.
    Concurrency,
    /// Memory storage budget, in megabytes.
    Storage,
}

impl Dimension {
    pub const ALL: [Dimension; 4] = [
        Dimension::Population,
        Dimension::Throughput,
        Dimension::Concurrency,
        Dimension::Storage,
    ];

    /// Initial (current, hard cap) used when configuration omits a dimension.
    pub fn default_limit(self) -> (u64, u64) {
        match self {
            Self::Population => (10, 100),
            Self::Throughput => (100, 1000),
            Self::Concurrency => (4, 64),
            Self::Storage => (1024, 16_384),
        }
    }
}

impl fmt::Display for Dimension {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Population => write!(f, "population"),
            Self::Throughput => write!(f, "throughput"),
            Self::Concurrency => write!(f, "concurrency"),
            Self::Storage => write!(f, "storage"),
        }
    }
}

impl FromStr for Dimension {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "population" => Ok(Self::Population),
            "throughput" => Ok(Self::Throughput),
            "concurrency" => Ok(Self::Concurrency),
            "storage" => Ok(Self::Storage),
            other => Err(format!("unknown dimension '{}'", other)),
        }
    }
}

/// Current value and immutable hard cap of one dimension.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct DimensionLimit {
    pub dimension: Dimension,
    current: u64,
    hard_cap: u64,
}

impl DimensionLimit {
    /// A `current` above `hard_cap` is lowered to the cap.
    pub fn new(dimension: Dimension, current: u64, hard_cap: u64) -> Self {
        Self {
            dimension,
            current: current.min(hard_cap),
            hard_cap,
        }
    }

    pub fn current(&self) -> u64 {
        self.current
    }

    pub fn hard_cap(&self) -> u64 {
        self.hard_cap
    }

    /// Set the current value, never exceeding the hard cap.
    pub(crate) fn set_current(&mut self, value: u64) {
        self.current = value.min(self.hard_cap);
    }
}

/// Limits for every configured dimension.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct DimensionLimits {
    limits: BTreeMap<Dimension, DimensionLimit>,
}

impl DimensionLimits {
    /// Limits for every built-in dimension at their defaults.
    pub fn defaults() -> Self {
        Self::from_limits(Dimension::ALL.iter().map(|d| {
            let (current, cap) = d.default_limit();
            DimensionLimit::new(*d, current, cap)
        }))
    }

    /// Build from explicit limits. Deserialized limits are re-clamped so a
    /// hand-edited ledger cannot smuggle in a value above its cap.
    pub fn from_limits(limits: impl IntoIterator<Item = DimensionLimit>) -> Self {
        Self {
            limits: limits
                .into_iter()
                .map(|l| (l.dimension, DimensionLimit::new(l.dimension, l.current, l.hard_cap)))
                .collect(),
        }
    }

    pub fn get(&self, dimension: Dimension) -> Option<&DimensionLimit> {
        self.limits.get(&dimension)
    }

    pub(crate) fn get_mut(&mut self, dimension: Dimension) -> Option<&mut DimensionLimit> {
        self.limits.get_mut(&dimension)
    }

    pub fn iter(&self) -> impl Iterator<Item = &DimensionLimit> {
        self.limits.values()
    }

    pub fn to_vec(&self) -> Vec<DimensionLimit> {
        self.limits.values().copied().collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_current_never_exceeds_cap() {
        let mut limit = DimensionLimit::new(Dimension::Throughput, 5000, 1000);
        assert_eq!(limit.current(), 1000);
        limit.set_current(1200);
        assert_eq!(limit.current(), 1000);
        limit.set_current(300);
        assert_eq!(limit.current(), 300);
        assert_eq!(limit.hard_cap(), 1000);
    }

    #[test]
    fn test_defaults_cover_every_dimension() {
        let limits = DimensionLimits::defaults();
        for dimension in Dimension::ALL {
            assert!(limits.get(dimension).is_some(), "missing {}", dimension);
        }
        assert_eq!(limits.get(Dimension::Throughput).unwrap().current(), 100);
    }

    #[test]
    fn test_dimension_parse() {
        assert_eq!("THROUGHPUT".parse::<Dimension>().unwrap(), Dimension::Throughput);
        assert!("bandwidth".parse::<Dimension>().is_err());
    }
}
