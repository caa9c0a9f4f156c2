//! In-memory collaborators for simulation runs and tests.
//!
//! Each collaborator is shared through an `Arc`, so a driver can keep a
//! handle and change what it reports while a controller holds another.
//!
//! ```rust,ignore
//! use change_control::simulated::SimulatedWorld;
//!
//! let world = SimulatedWorld::new([("stability", 80.0)]);
//! let mut control = ChangeControl::new(ControlConfig::default(), world.collaborators())?;
//! world.metrics.set_metric("stability", 65.0);
//! ```

use async_trait::async_trait;
use std::collections::VecDeque;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use crate::collaborators::{
    ActionKind, Collaborators, ContinuityMonitor, ContinuityStatus, MetricSnapshot, MetricSource,
    OpsGate, OpsVerdict, PolicyGate, PolicyVerdict,
};
use crate::error::CollaboratorError;

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(PoisonError::into_inner)
}

#[derive(Debug, Default)]
struct MetricScript {
    current: MetricSnapshot,
    queued: VecDeque<MetricSnapshot>,
    pending_failures: u32,
    served: u64,
}

/// Metric source that serves queued snapshots in order, then keeps
/// repeating the last one served.
#[derive(Debug, Default)]
pub struct ScriptedMetrics {
    script: Mutex<MetricScript>,
}

impl ScriptedMetrics {
    pub fn new(initial: MetricSnapshot) -> Self {
        Self {
            script: Mutex::new(MetricScript {
                current: initial,
                ..Default::default()
            }),
        }
    }

    /// Replace the reported snapshot and drop anything queued.
    pub fn set(&self, snapshot: MetricSnapshot) {
        let mut script = lock(&self.script);
        script.queued.clear();
        script.current = snapshot;
    }

    /// Change a single metric in the reported snapshot.
    pub fn set_metric(&self, metric: &str, score: f64) {
        lock(&self.script).current.insert(metric.to_string(), score);
    }

    /// Queue a snapshot to be served by a later call, after any already queued.
    pub fn push(&self, snapshot: MetricSnapshot) {
        lock(&self.script).queued.push_back(snapshot);
    }

    /// Make the next `n` calls fail.
    pub fn fail_next(&self, n: u32) {
        lock(&self.script).pending_failures = n;
    }

    /// Number of snapshots served successfully.
    pub fn served(&self) -> u64 {
        lock(&self.script).served
    }

    /// What the next successful call would report if nothing is queued.
    pub fn current(&self) -> MetricSnapshot {
        lock(&self.script).current.clone()
    }
}

#[async_trait]
impl MetricSource for ScriptedMetrics {
    async fn snapshot(&self) -> Result<MetricSnapshot, CollaboratorError> {
        let mut script = lock(&self.script);
        if script.pending_failures > 0 {
            script.pending_failures -= 1;
            return Err(CollaboratorError::new("metrics", "scripted failure"));
        }
        if let Some(next) = script.queued.pop_front() {
            script.current = next;
        }
        script.served += 1;
        Ok(script.current.clone())
    }
}

#[derive(Debug, Default)]
struct PolicyScript {
    veto: Option<String>,
    violations: u32,
    checks: Vec<(ActionKind, String)>,
    unavailable: bool,
}

/// Policy gate that approves everything unless told to veto.
#[derive(Debug, Default)]
pub struct SimulatedPolicy {
    script: Mutex<PolicyScript>,
}

impl SimulatedPolicy {
    pub fn new() -> Self {
        Self::default()
    }

    /// Veto every subsequent check with `reason`.
    pub fn veto(&self, reason: &str) {
        lock(&self.script).veto = Some(reason.to_string());
    }

    pub fn allow(&self) {
        lock(&self.script).veto = None;
    }

    pub fn set_violations(&self, count: u32) {
        lock(&self.script).violations = count;
    }

    /// Make every call fail until cleared.
    pub fn set_unavailable(&self, unavailable: bool) {
        lock(&self.script).unavailable = unavailable;
    }

    /// Every check received, in order.
    pub fn checks(&self) -> Vec<(ActionKind, String)> {
        lock(&self.script).checks.clone()
    }
}

#[async_trait]
impl PolicyGate for SimulatedPolicy {
    async fn check(
        &self,
        kind: ActionKind,
        description: &str,
    ) -> Result<PolicyVerdict, CollaboratorError> {
        let mut script = lock(&self.script);
        if script.unavailable {
            return Err(CollaboratorError::new("policy_gate", "scripted outage"));
        }
        script.checks.push((kind, description.to_string()));
        Ok(match &script.veto {
            Some(reason) => PolicyVerdict::veto(reason.clone()),
            None => PolicyVerdict::approve(),
        })
    }

    async fn recent_violations(&self) -> Result<u32, CollaboratorError> {
        let script = lock(&self.script);
        if script.unavailable {
            return Err(CollaboratorError::new("policy_gate", "scripted outage"));
        }
        Ok(script.violations)
    }
}

#[derive(Debug, Default)]
struct OpsScript {
    deny: Option<String>,
    checks: Vec<(ActionKind, String)>,
}

/// Operations gate that allows everything unless told to deny.
#[derive(Debug, Default)]
pub struct SimulatedOps {
    script: Mutex<OpsScript>,
}

impl SimulatedOps {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn deny(&self, reason: &str) {
        lock(&self.script).deny = Some(reason.to_string());
    }

    pub fn allow(&self) {
        lock(&self.script).deny = None;
    }

    pub fn checks(&self) -> Vec<(ActionKind, String)> {
        lock(&self.script).checks.clone()
    }
}

#[async_trait]
impl OpsGate for SimulatedOps {
    async fn check(
        &self,
        kind: ActionKind,
        description: &str,
    ) -> Result<OpsVerdict, CollaboratorError> {
        let mut script = lock(&self.script);
        script.checks.push((kind, description.to_string()));
        Ok(match &script.deny {
            Some(reason) => OpsVerdict::deny(reason.clone()),
            None => OpsVerdict::allow(),
        })
    }
}

/// Continuity monitor reporting whatever status it was last given.
#[derive(Debug)]
pub struct SimulatedContinuity {
    status: Mutex<ContinuityStatus>,
}

impl SimulatedContinuity {
    pub fn new(status: ContinuityStatus) -> Self {
        Self {
            status: Mutex::new(status),
        }
    }

    pub fn set(&self, status: ContinuityStatus) {
        *lock(&self.status) = status;
    }
}

impl Default for SimulatedContinuity {
    fn default() -> Self {
        Self::new(ContinuityStatus::Ok)
    }
}

#[async_trait]
impl ContinuityMonitor for SimulatedContinuity {
    async fn status(&self) -> Result<ContinuityStatus, CollaboratorError> {
        Ok(*lock(&self.status))
    }
}

/// A full set of simulated collaborators with handles kept for steering.
#[derive(Debug, Clone)]
pub struct SimulatedWorld {
    pub metrics: Arc<ScriptedMetrics>,
    pub policy: Arc<SimulatedPolicy>,
    pub ops: Arc<SimulatedOps>,
    pub continuity: Arc<SimulatedContinuity>,
}

impl SimulatedWorld {
    /// A permissive world reporting `metrics`, healthy continuity, and no
    /// policy violations.
    pub fn new<I, K>(metrics: I) -> Self
    where
        I: IntoIterator<Item = (K, f64)>,
        K: Into<String>,
    {
        let snapshot: MetricSnapshot = metrics.into_iter().map(|(k, v)| (k.into(), v)).collect();
        Self {
            metrics: Arc::new(ScriptedMetrics::new(snapshot)),
            policy: Arc::new(SimulatedPolicy::new()),
            ops: Arc::new(SimulatedOps::new()),
            continuity: Arc::new(SimulatedContinuity::default()),
        }
    }

    /// Collaborator handles to inject into a controller.
    pub fn collaborators(&self) -> Collaborators {
        Collaborators::new(
            self.metrics.clone(),
            self.policy.clone(),
            self.ops.clone(),
            self.continuity.clone(),
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn snapshot(values: &[(&str, f64)]) -> MetricSnapshot {
        values.iter().map(|(k, v)| (k.to_string(), *v)).collect()
    }

    #[tokio::test]
    async fn test_queued_snapshots_then_repeat_last() {
        let metrics = ScriptedMetrics::new(snapshot(&[("q", 1.0)]));
        metrics.push(snapshot(&[("q", 2.0)]));
        metrics.push(snapshot(&[("q", 3.0)]));

        assert_eq!(metrics.snapshot().await.unwrap()["q"], 2.0);
        assert_eq!(metrics.snapshot().await.unwrap()["q"], 3.0);
        assert_eq!(metrics.snapshot().await.unwrap()["q"], 3.0);
        assert_eq!(metrics.served(), 3);
    }

    #[tokio::test]
    async fn test_scripted_failures() {
        let metrics = ScriptedMetrics::new(snapshot(&[("q", 1.0)]));
        metrics.fail_next(1);
        assert!(metrics.snapshot().await.is_err());
        assert!(metrics.snapshot().await.is_ok());
        assert_eq!(metrics.served(), 1);
    }

    #[tokio::test]
    async fn test_policy_veto_and_record() {
        let policy = SimulatedPolicy::new();
        assert!(policy.check(ActionKind::ScaleRamp, "a").await.unwrap().approved);
        policy.veto("frozen");
        let verdict = policy.check(ActionKind::UpgradeApproval, "b").await.unwrap();
        assert!(!verdict.approved);
        assert_eq!(verdict.reason, "frozen");
        assert_eq!(policy.checks().len(), 2);
    }

    #[tokio::test]
    async fn test_world_shares_handles() {
        let world = SimulatedWorld::new([("stability", 80.0)]);
        let collaborators = world.collaborators();
        world.metrics.set_metric("stability", 60.0);
        world.continuity.set(ContinuityStatus::Failed);

        assert_eq!(collaborators.metrics.snapshot().await.unwrap()["stability"], 60.0);
        assert_eq!(
            collaborators.continuity.status().await.unwrap(),
            ContinuityStatus::Failed
        );
    }
}
