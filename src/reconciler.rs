//! Reconciliation loop and workload watcher
//!
//! The reconciler drives full evaluation sweeps on a fixed cadence: list the
//! participating workloads, evaluate each one's SLOs, fold the result through
//! the rollback policy, and hand warranted rollbacks to the executor. A
//! concurrent watcher task keeps the state registry aligned with the
//! orchestrator, creating entries when labeled workloads appear and dropping
//! them on deletion.
//!
//! No per-workload failure stops the loop; a workload's cycle ends at its
//! first error and the next tick retries. Only cancellation stops the
//! reconciler.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use futures::StreamExt;
use k8s_openapi::api::apps::v1::Deployment;
use kube::api::Api;
use kube::runtime::watcher::{self, Event};
use kube::runtime::WatchStreamExt;
use kube::Client;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

use crate::config::SloConfig;
use crate::executor::{current_image_tag, RollbackExecutor};
use crate::metrics::ControllerMetrics;
use crate::orchestrator::Orchestrator;
use crate::policy::{self, RollbackDecision};
use crate::registry::{DeploymentPhase, DeploymentState, HealthStatus, StateRegistry};
use crate::slo::SloEvaluator;
use crate::{Result, PARTICIPATION_LABEL, WORKLOAD_NAMESPACE};

/// Cadence of full evaluation sweeps
pub const EVALUATION_INTERVAL: Duration = Duration::from_secs(30);

/// Annotation naming the progressive-delivery strategy for a workload
pub const STRATEGY_ANNOTATION: &str = "autonomous-deployment/strategy";

/// Top-level control loop
pub struct Reconciler {
    orchestrator: Arc<dyn Orchestrator>,
    evaluator: SloEvaluator,
    executor: RollbackExecutor,
    registry: Arc<StateRegistry>,
    slos: HashMap<String, SloConfig>,
}

impl Reconciler {
    /// Wire the loop over its collaborators
    pub fn new(
        orchestrator: Arc<dyn Orchestrator>,
        evaluator: SloEvaluator,
        executor: RollbackExecutor,
        registry: Arc<StateRegistry>,
        slos: HashMap<String, SloConfig>,
    ) -> Self {
        Self {
            orchestrator,
            evaluator,
            executor,
            registry,
            slos,
        }
    }

    /// Run evaluation sweeps until cancelled.
    ///
    /// Cancellation is observed between sweeps and between workloads; an
    /// in-flight executor step is allowed to finish.
    pub async fn run(&self, shutdown: CancellationToken) {
        info!(
            interval_secs = EVALUATION_INTERVAL.as_secs(),
            "Starting autonomous deployment controller loop"
        );

        let mut ticker = tokio::time::interval(EVALUATION_INTERVAL);
        ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Skip);
        // The interval yields immediately; consume that tick so the first
        // sweep runs a full period after startup, once the watcher has had a
        // chance to populate the registry.
        ticker.tick().await;

        loop {
            tokio::select! {
                _ = shutdown.cancelled() => {
                    info!("Shutting down controller loop");
                    return;
                }
                _ = ticker.tick() => {
                    self.evaluate_all().await;
                }
            }
        }
    }

    /// One full sweep over the participating workloads
    pub async fn evaluate_all(&self) {
        let workloads = match self.orchestrator.list_workloads().await {
            Ok(workloads) => workloads,
            Err(e) => {
                warn!(error = %e, "Failed to list workloads, skipping sweep");
                return;
            }
        };

        for workload in workloads {
            let Some(name) = workload.metadata.name.clone() else {
                continue;
            };
            if let Err(e) = self.evaluate_one(&name).await {
                if e.is_policy_abort() {
                    warn!(workload = %name, error = %e, "Rollback aborted by policy");
                } else {
                    error!(workload = %name, error = %e, "Evaluation cycle failed");
                }
            }
        }
    }

    /// Evaluate, decide, and (when warranted) roll back one workload
    async fn evaluate_one(&self, name: &str) -> Result<()> {
        let violations = self.evaluator.evaluate(name).await;
        let now = chrono::Utc::now();

        let decision = self
            .registry
            .with_state_ensure(name, WORKLOAD_NAMESPACE, |state| {
                let decision = policy::decide(state, &violations, now, &self.slos);
                // Health classification for this cycle; a firing rollback
                // overrides to Failing in the executor's finalize step.
                if violations.is_empty() {
                    state.health_status = HealthStatus::Healthy;
                    if state.phase == DeploymentPhase::RolledBack {
                        state.phase = DeploymentPhase::Idle;
                    }
                } else if !matches!(decision, RollbackDecision::Rollback { .. }) {
                    state.health_status = HealthStatus::Degraded;
                }
                decision
            });

        match decision {
            RollbackDecision::NoOp => Ok(()),
            RollbackDecision::CooldownHold => {
                info!(workload = %name, "Rollback cooldown active, holding");
                Ok(())
            }
            RollbackDecision::Rollback { reason } => {
                self.executor.execute(name, reason).await.map(|_| ())
            }
        }
    }
}

/// Maintain the state registry from the orchestrator's watch stream until
/// cancelled.
///
/// The stream reconnects with backoff on failure; the periodic sweep's list
/// acts as the resync safety net for anything a reconnect window misses.
pub async fn run_workload_watcher(
    client: Client,
    namespace: &str,
    registry: Arc<StateRegistry>,
    metrics: Arc<ControllerMetrics>,
    shutdown: CancellationToken,
) {
    let api: Api<Deployment> = Api::namespaced(client, namespace);
    let config = watcher::Config::default().labels(PARTICIPATION_LABEL);
    let stream = watcher::watcher(api, config).default_backoff();
    let mut stream = std::pin::pin!(stream);

    info!(namespace = %namespace, selector = PARTICIPATION_LABEL, "Workload watcher started");

    loop {
        tokio::select! {
            _ = shutdown.cancelled() => break,
            event = stream.next() => match event {
                Some(Ok(event)) => handle_workload_event(&registry, &metrics, event),
                Some(Err(e)) => {
                    warn!(error = %e, "Workload watcher error, stream will reconnect");
                    tokio::time::sleep(Duration::from_secs(5)).await;
                }
                None => break,
            }
        }
    }

    info!("Workload watcher stopped");
}

/// Fold one watch event into the registry
fn handle_workload_event(
    registry: &StateRegistry,
    metrics: &ControllerMetrics,
    event: Event<Deployment>,
) {
    match event {
        Event::Apply(workload) | Event::InitApply(workload) => {
            let Some(name) = workload.metadata.name.clone() else {
                return;
            };
            if registry.contains(&name) {
                debug!(workload = %name, "Workload updated");
                return;
            }

            let namespace = workload
                .metadata
                .namespace
                .clone()
                .unwrap_or_else(|| WORKLOAD_NAMESPACE.to_string());
            let mut state = DeploymentState::new(name.clone(), namespace);
            state.strategy = workload
                .metadata
                .annotations
                .as_ref()
                .and_then(|a| a.get(STRATEGY_ANNOTATION))
                .cloned()
                .unwrap_or_default();
            state.current_version = current_image_tag(&workload).unwrap_or_default();

            registry.upsert(state);
            metrics.deployments_total.inc();
            info!(workload = %name, "New deployment detected");
        }
        Event::Delete(workload) => {
            let Some(name) = workload.metadata.name else {
                return;
            };
            if registry.remove(&name).is_some() {
                info!(workload = %name, "Deployment deleted, state dropped");
            }
        }
        Event::Init | Event::InitDone => {
            debug!("Workload watcher synchronized");
        }
    }
}
