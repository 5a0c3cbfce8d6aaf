//! Shared deployment-state registry
//!
//! One [`DeploymentState`] per managed workload, keyed by workload name. The
//! registry is the only mutable state shared between the reconciler, the
//! watcher, and executors, so access goes through a small closure-based API
//! instead of exposing the map: readers take the read lock, writers publish a
//! whole-state change under the write lock, and a torn state is never
//! observable.
//!
//! Executor serialization is separate from the data lock. Each workload owns
//! an async mutex handed out by [`StateRegistry::executor_lock`]; holding it
//! across the composite rollback keeps overlapping cycles from interleaving
//! without blocking readers of other workloads.

use std::collections::BTreeMap;
use std::collections::HashMap;
use std::sync::{Arc, RwLock};

use chrono::{DateTime, Utc};
use dashmap::DashMap;
use serde::Serialize;

/// Where a workload sits in its delivery lifecycle
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize)]
#[serde(rename_all = "kebab-case")]
pub enum DeploymentPhase {
    /// No rollout activity observed
    #[default]
    Idle,
    /// A progressive rollout is underway
    Progressing,
    /// The last transition was an autonomous rollback
    RolledBack,
}

/// Coarse health classification derived from SLO evaluation
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum HealthStatus {
    /// No SLO currently violating
    #[default]
    Healthy,
    /// At least one SLO violating, below the rollback threshold
    Degraded,
    /// Violations forced a rollback
    Failing,
}

/// Tracked state for one managed workload
#[derive(Clone, Debug, Default, Serialize)]
pub struct DeploymentState {
    /// Workload name within the orchestrator
    pub name: String,
    /// Namespace holding the workload
    pub namespace: String,
    /// Revision tag currently serving traffic, when known
    pub current_version: String,
    /// Revision tag a rollout is converging toward, when known
    pub target_version: String,
    /// Progressive-delivery strategy governing the workload
    pub strategy: String,
    /// Delivery lifecycle phase
    pub phase: DeploymentPhase,
    /// Last observed subset weights, summing to 100
    pub traffic_split: BTreeMap<String, i32>,
    /// Consecutive violating cycles per SLO; reset together on rollback
    pub slo_violations: BTreeMap<String, u32>,
    /// Completion time of the last rollback; `None` means never
    pub last_rollback: Option<DateTime<Utc>>,
    /// Rollbacks in a row without an intervening healthy window.
    /// Bookkeeping only; no policy consults it.
    pub consecutive_failures: u32,
    /// Coarse health classification
    pub health_status: HealthStatus,
    /// Whether traffic was already redirected to the secondary cluster
    pub cross_cluster_active: bool,
}

impl DeploymentState {
    /// Fresh state for a newly discovered workload
    pub fn new(name: impl Into<String>, namespace: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            namespace: namespace.into(),
            ..Default::default()
        }
    }
}

/// Registry of deployment states with per-workload executor locks
#[derive(Default)]
pub struct StateRegistry {
    states: RwLock<HashMap<String, DeploymentState>>,
    executor_locks: DashMap<String, Arc<tokio::sync::Mutex<()>>>,
}

impl StateRegistry {
    /// Create an empty registry
    pub fn new() -> Self {
        Self::default()
    }

    /// Insert or replace the state for a workload
    pub fn upsert(&self, state: DeploymentState) {
        let mut states = self.states.write().expect("state lock poisoned");
        states.insert(state.name.clone(), state);
    }

    /// Whether a workload is currently tracked
    pub fn contains(&self, name: &str) -> bool {
        let states = self.states.read().expect("state lock poisoned");
        states.contains_key(name)
    }

    /// Number of tracked workloads
    pub fn len(&self) -> usize {
        let states = self.states.read().expect("state lock poisoned");
        states.len()
    }

    /// Whether the registry is empty
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Run a closure against a workload's state under read protection
    pub fn with_state<R>(&self, name: &str, f: impl FnOnce(&DeploymentState) -> R) -> Option<R> {
        let states = self.states.read().expect("state lock poisoned");
        states.get(name).map(f)
    }

    /// Run a closure against a workload's mutable state under write
    /// protection. The mutation publishes atomically when the closure
    /// returns.
    pub fn with_state_mut<R>(
        &self,
        name: &str,
        f: impl FnOnce(&mut DeploymentState) -> R,
    ) -> Option<R> {
        let mut states = self.states.write().expect("state lock poisoned");
        states.get_mut(name).map(f)
    }

    /// Like [`with_state_mut`](Self::with_state_mut) but creates the entry
    /// first when the workload is not yet tracked.
    pub fn with_state_ensure<R>(
        &self,
        name: &str,
        namespace: &str,
        f: impl FnOnce(&mut DeploymentState) -> R,
    ) -> R {
        let mut states = self.states.write().expect("state lock poisoned");
        let state = states
            .entry(name.to_string())
            .or_insert_with(|| DeploymentState::new(name, namespace));
        f(state)
    }

    /// Clone a workload's state, if tracked
    pub fn snapshot(&self, name: &str) -> Option<DeploymentState> {
        self.with_state(name, Clone::clone)
    }

    /// Drop a workload's state and its executor lock
    pub fn remove(&self, name: &str) -> Option<DeploymentState> {
        let removed = {
            let mut states = self.states.write().expect("state lock poisoned");
            states.remove(name)
        };
        self.executor_locks.remove(name);
        removed
    }

    /// Names of all tracked workloads
    pub fn names(&self) -> Vec<String> {
        let states = self.states.read().expect("state lock poisoned");
        states.keys().cloned().collect()
    }

    /// The per-workload mutex serializing rollback execution.
    ///
    /// Cloning the `Arc` outside the data lock means holding the executor
    /// lock never blocks state readers.
    pub fn executor_lock(&self, name: &str) -> Arc<tokio::sync::Mutex<()>> {
        self.executor_locks
            .entry(name.to_string())
            .or_default()
            .clone()
    }
}
