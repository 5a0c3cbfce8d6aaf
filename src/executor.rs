//! Composite rollback executor
//!
//! A rollback spans two control planes with no joint transaction, so step
//! order is the safety mechanism: traffic is pinned back to the stable subset
//! first, and only then is the workload revision decremented. If the router
//! reset succeeds but the revision step fails, the workload is left serving
//! stable traffic with an un-decremented revision, and the next cycle retries
//! from current remote state.
//!
//! Every step recomputes from what the cluster reports rather than from a
//! remembered "already rolled back" flag, which keeps repeated executions
//! safe: re-zeroing a zero-weight canary is a no-op, and decrementing a
//! revision at its floor aborts with [`Error::NoPreviousRevision`].

use std::sync::Arc;
use std::time::Instant;

use chrono::Utc;
use k8s_openapi::api::apps::v1::Deployment;
use tracing::{info, warn};

use crate::config::CrossClusterConfig;
use crate::metrics::ControllerMetrics;
use crate::orchestrator::{EventSeverity, Orchestrator};
use crate::registry::{DeploymentPhase, HealthStatus, StateRegistry};
use crate::routing;
use crate::slo::SloKind;
use crate::{Error, Result, APP_ROUTE_HOST, REVISION_ANNOTATION};

/// How a rollback attempt ended
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum RollbackOutcome {
    /// Both mandatory steps succeeded and state was finalized
    Completed {
        /// Revision the workload was rolled back to
        previous_revision: i64,
    },
    /// The workload vanished mid-rollback; its state entry was removed
    WorkloadGone,
}

/// Executes the composite rollback action
pub struct RollbackExecutor {
    orchestrator: Arc<dyn Orchestrator>,
    registry: Arc<StateRegistry>,
    metrics: Arc<ControllerMetrics>,
    cross_cluster: CrossClusterConfig,
}

impl RollbackExecutor {
    /// Build an executor over the given adapter, registry, and metrics
    pub fn new(
        orchestrator: Arc<dyn Orchestrator>,
        registry: Arc<StateRegistry>,
        metrics: Arc<ControllerMetrics>,
        cross_cluster: CrossClusterConfig,
    ) -> Self {
        Self {
            orchestrator,
            registry,
            metrics,
            cross_cluster,
        }
    }

    /// Roll `workload` back, serialized against any other attempt for the
    /// same workload.
    ///
    /// On success the workload's state is finalized (cooldown stamp,
    /// violation counters cleared) and the rollback counter moves. Policy
    /// aborts and transient failures leave state untouched so the next cycle
    /// retries.
    pub async fn execute(&self, workload: &str, reason: SloKind) -> Result<RollbackOutcome> {
        let lock = self.registry.executor_lock(workload);
        let _guard = lock.lock().await;

        let started = Instant::now();
        let result = self.run(workload, reason).await;
        self.metrics
            .deployment_duration
            .observe(started.elapsed().as_secs_f64());
        result
    }

    async fn run(&self, workload: &str, reason: SloKind) -> Result<RollbackOutcome> {
        info!(workload = %workload, reason = %reason, "Performing autonomous rollback");

        // Step 1: pin traffic back to the stable subset. Safety-critical,
        // so it goes first.
        let mut ruleset = self.orchestrator.get_route_ruleset().await?;
        let reset = routing::reset_to_stable(&mut ruleset);
        if !reset.has_target() {
            self.emit_abort_event(workload, &Error::NoRollbackTarget).await;
            return Err(Error::NoRollbackTarget);
        }
        self.orchestrator.update_route_ruleset(&ruleset).await?;

        // Step 2: decrement the workload revision.
        let mut deployment = match self.orchestrator.get_workload(workload).await {
            Err(e) if e.is_not_found() => return self.abort_clean(workload),
            other => other?,
        };
        let previous_revision = match decrement_revision(&mut deployment) {
            Ok(revision) => revision,
            Err(e) => {
                if e.is_policy_abort() {
                    self.emit_abort_event(workload, &e).await;
                }
                return Err(e);
            }
        };
        match self.orchestrator.update_workload(&deployment).await {
            Err(e) if e.is_not_found() => return self.abort_clean(workload),
            other => other?,
        }

        // Step 3: header-based redirection, only for workloads already
        // failed over. Non-fatal.
        let failed_over = self
            .registry
            .with_state(workload, |s| s.cross_cluster_active)
            .unwrap_or(false);
        if failed_over {
            if let Err(e) = self.redirect_to_secondary(workload).await {
                warn!(workload = %workload, error = %e, "Cross-cluster failover failed");
            }
        }

        // Step 4: finalize state in one write.
        let now = Utc::now();
        let split = routing::subset_weights(&ruleset);
        let version = current_image_tag(&deployment).unwrap_or_default();
        self.registry.with_state_mut(workload, |state| {
            state.last_rollback = Some(now);
            state.consecutive_failures += 1;
            state.phase = DeploymentPhase::RolledBack;
            state.health_status = HealthStatus::Failing;
            state.traffic_split = split;
            state.current_version = version;
            for count in state.slo_violations.values_mut() {
                *count = 0;
            }
        });

        // Step 5: account.
        self.metrics.rollbacks_total.inc();

        // Step 6: audit trail, naming the trigger and the chosen revision.
        self.orchestrator
            .emit_event(
                workload,
                EventSeverity::Warning,
                "AutonomousRollback",
                &format!(
                    "Autonomous rollback to revision {previous_revision} after consecutive {reason} violations"
                ),
            )
            .await;

        info!(
            workload = %workload,
            revision = previous_revision,
            "Autonomous rollback completed"
        );
        Ok(RollbackOutcome::Completed { previous_revision })
    }

    /// Attach failover headers routing the application host at the secondary
    /// cluster.
    async fn redirect_to_secondary(&self, workload: &str) -> Result<()> {
        let secondary = &self.cross_cluster.secondary_cluster;
        info!(
            workload = %workload,
            secondary = %secondary,
            "Redirecting traffic to secondary cluster"
        );

        let mut ruleset = self.orchestrator.get_route_ruleset().await?;
        let touched = routing::apply_failover_headers(&mut ruleset, APP_ROUTE_HOST, secondary);
        if touched == 0 {
            warn!(workload = %workload, host = APP_ROUTE_HOST, "No routes matched for failover");
            return Ok(());
        }
        self.orchestrator.update_route_ruleset(&ruleset).await?;
        Ok(())
    }

    /// The workload disappeared under us: drop its state and report a clean
    /// abort. No counters move.
    fn abort_clean(&self, workload: &str) -> Result<RollbackOutcome> {
        info!(workload = %workload, "Workload deleted mid-rollback, aborting cleanly");
        self.registry.remove(workload);
        Ok(RollbackOutcome::WorkloadGone)
    }

    async fn emit_abort_event(&self, workload: &str, error: &Error) {
        self.orchestrator
            .emit_event(
                workload,
                EventSeverity::Warning,
                "RollbackAborted",
                &format!("Autonomous rollback aborted: {error}"),
            )
            .await;
    }
}

/// Decrement the workload's revision annotation and, heuristically, its
/// container image tags.
///
/// Returns the revision rolled back to. The image decrement targets tags of
/// the form `path:vMAJOR.MINOR[.PATCH]`, lowering the minor component when it
/// is above zero; a tag already at `.0` is left as-is and only the annotation
/// moves. A workload without a readable revision, or already at revision 1,
/// aborts with [`Error::NoPreviousRevision`].
pub(crate) fn decrement_revision(deployment: &mut Deployment) -> Result<i64> {
    let annotations = deployment
        .metadata
        .annotations
        .get_or_insert_with(Default::default);

    let revision: i64 = match annotations.get(REVISION_ANNOTATION) {
        Some(raw) => raw.parse().map_err(|_| {
            warn!(revision = %raw, "Unparsable revision annotation");
            Error::NoPreviousRevision
        })?,
        None => {
            warn!("Workload has no revision annotation");
            return Err(Error::NoPreviousRevision);
        }
    };
    if revision <= 1 {
        return Err(Error::NoPreviousRevision);
    }

    let previous = revision - 1;
    annotations.insert(REVISION_ANNOTATION.to_string(), previous.to_string());

    if let Some(pod_spec) = deployment
        .spec
        .as_mut()
        .and_then(|spec| spec.template.spec.as_mut())
    {
        for container in &mut pod_spec.containers {
            if let Some(image) = &container.image {
                if let Some(decremented) = decrement_image_tag(image) {
                    container.image = Some(decremented);
                }
            }
        }
    }

    Ok(previous)
}

/// Image of the workload's first container, used as the serving version tag
/// in deployment state.
pub(crate) fn current_image_tag(deployment: &Deployment) -> Option<String> {
    deployment
        .spec
        .as_ref()?
        .template
        .spec
        .as_ref()?
        .containers
        .first()?
        .image
        .clone()
}

/// Lower the minor component of a `path:vMAJOR.MINOR[.PATCH]` image tag.
/// Returns `None` when the tag does not match the scheme or the minor is
/// already zero.
pub(crate) fn decrement_image_tag(image: &str) -> Option<String> {
    let (path, tag) = image.split_once(":v")?;
    let mut parts: Vec<&str> = tag.split('.').collect();
    if parts.len() < 2 {
        return None;
    }

    let minor: u64 = parts[1].parse().ok()?;
    if minor == 0 {
        return None;
    }

    let lowered = (minor - 1).to_string();
    parts[1] = &lowered;
    Some(format!("{path}:v{}", parts.join(".")))
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::BTreeMap;

    use k8s_openapi::api::apps::v1::DeploymentSpec;
    use k8s_openapi::api::core::v1::{Container, PodSpec, PodTemplateSpec};
    use kube::api::ObjectMeta;
    use mockall::predicate::eq;

    use crate::orchestrator::MockOrchestrator;
    use crate::registry::DeploymentState;
    use crate::routing::{Destination, HttpRoute, RouteRulesetSpec, WeightedDestination};

    fn deployment(name: &str, revision: &str, image: &str) -> Deployment {
        Deployment {
            metadata: ObjectMeta {
                name: Some(name.to_string()),
                namespace: Some("ecommerce".to_string()),
                annotations: Some(BTreeMap::from([(
                    REVISION_ANNOTATION.to_string(),
                    revision.to_string(),
                )])),
                ..Default::default()
            },
            spec: Some(DeploymentSpec {
                template: PodTemplateSpec {
                    spec: Some(PodSpec {
                        containers: vec![Container {
                            name: "app".to_string(),
                            image: Some(image.to_string()),
                            ..Default::default()
                        }],
                        ..Default::default()
                    }),
                    ..Default::default()
                },
                ..Default::default()
            }),
            ..Default::default()
        }
    }

    fn canary_ruleset() -> RouteRulesetSpec {
        RouteRulesetSpec {
            http: vec![HttpRoute {
                route: vec![
                    WeightedDestination {
                        destination: Destination {
                            host: "ecommerce-app".to_string(),
                            subset: Some("stable".to_string()),
                            ..Default::default()
                        },
                        weight: 70,
                        ..Default::default()
                    },
                    WeightedDestination {
                        destination: Destination {
                            host: "ecommerce-app".to_string(),
                            subset: Some("canary".to_string()),
                            ..Default::default()
                        },
                        weight: 30,
                        ..Default::default()
                    },
                ],
                ..Default::default()
            }],
            ..Default::default()
        }
    }

    fn not_found() -> Error {
        Error::Kube(kube::Error::Api(kube::error::ErrorResponse {
            status: "Failure".into(),
            message: "not found".into(),
            reason: "NotFound".into(),
            code: 404,
        }))
    }

    fn executor_with(
        orchestrator: MockOrchestrator,
        registry: Arc<StateRegistry>,
    ) -> (RollbackExecutor, Arc<ControllerMetrics>) {
        let metrics = Arc::new(ControllerMetrics::new().unwrap());
        let cross_cluster = CrossClusterConfig {
            primary_cluster: "c1".to_string(),
            secondary_cluster: "c2".to_string(),
            ..Default::default()
        };
        let executor = RollbackExecutor::new(
            Arc::new(orchestrator),
            registry,
            metrics.clone(),
            cross_cluster,
        );
        (executor, metrics)
    }

    // =========================================================================
    // Pure helpers
    // =========================================================================

    #[test]
    fn image_tag_minor_decrements() {
        assert_eq!(decrement_image_tag("repo/app:v1.3"), Some("repo/app:v1.2".into()));
        assert_eq!(
            decrement_image_tag("repo/app:v2.5.9"),
            Some("repo/app:v2.4.9".into())
        );
        // Minor at the floor: heuristic declines
        assert_eq!(decrement_image_tag("repo/app:v1.0"), None);
        // Non-semantic tags are untouched
        assert_eq!(decrement_image_tag("repo/app:latest"), None);
        assert_eq!(decrement_image_tag("repo/app:v7"), None);
        assert_eq!(decrement_image_tag("repo/app"), None);
    }

    #[test]
    fn revision_decrement_updates_annotation_and_image() {
        let mut deploy = deployment("svc-a", "3", "repo/app:v1.2");
        let previous = decrement_revision(&mut deploy).unwrap();

        assert_eq!(previous, 2);
        let annotations = deploy.metadata.annotations.as_ref().unwrap();
        assert_eq!(annotations[REVISION_ANNOTATION], "2");
        let image = deploy.spec.as_ref().unwrap().template.spec.as_ref().unwrap().containers[0]
            .image
            .as_deref();
        assert_eq!(image, Some("repo/app:v1.1"));
    }

    #[test]
    fn revision_floor_aborts() {
        let mut deploy = deployment("svc-a", "1", "repo/app:v1.2");
        assert!(matches!(
            decrement_revision(&mut deploy),
            Err(Error::NoPreviousRevision)
        ));

        let mut deploy = deployment("svc-a", "not-a-number", "repo/app:v1.2");
        assert!(matches!(
            decrement_revision(&mut deploy),
            Err(Error::NoPreviousRevision)
        ));
    }

    #[test]
    fn image_at_minor_floor_keeps_tag_but_moves_annotation() {
        let mut deploy = deployment("svc-a", "2", "repo/app:v1.0");
        let previous = decrement_revision(&mut deploy).unwrap();

        assert_eq!(previous, 1);
        let image = deploy.spec.as_ref().unwrap().template.spec.as_ref().unwrap().containers[0]
            .image
            .as_deref();
        assert_eq!(image, Some("repo/app:v1.0"));
    }

    // =========================================================================
    // Composite action
    // =========================================================================

    /// Full happy path: traffic reset, revision decremented, state
    /// finalized, counter moved, event emitted.
    #[tokio::test]
    async fn completed_rollback_resets_traffic_and_finalizes_state() {
        let registry = Arc::new(StateRegistry::new());
        let mut state = DeploymentState::new("svc-a", "ecommerce");
        state.slo_violations.insert("success_rate".to_string(), 3);
        state.slo_violations.insert("latency_p95".to_string(), 1);
        registry.upsert(state);

        let mut orchestrator = MockOrchestrator::new();
        orchestrator
            .expect_get_route_ruleset()
            .times(1)
            .returning(|| Ok(canary_ruleset()));
        orchestrator
            .expect_update_route_ruleset()
            .withf(|spec| {
                let weights = routing::subset_weights(spec);
                weights["stable"] == 100 && weights["canary"] == 0
            })
            .times(1)
            .returning(|_| Ok(()));
        orchestrator
            .expect_get_workload()
            .with(eq("svc-a"))
            .times(1)
            .returning(|_| Ok(deployment("svc-a", "3", "repo/app:v1.2")));
        orchestrator
            .expect_update_workload()
            .withf(|d| {
                d.metadata.annotations.as_ref().unwrap()[REVISION_ANNOTATION] == "2"
            })
            .times(1)
            .returning(|_| Ok(()));
        orchestrator
            .expect_emit_event()
            .withf(|_, severity, reason, message| {
                *severity == EventSeverity::Warning
                    && reason == "AutonomousRollback"
                    && message.contains("revision 2")
                    && message.contains("success_rate")
            })
            .times(1)
            .returning(|_, _, _, _| ());

        let (executor, metrics) = executor_with(orchestrator, registry.clone());
        let outcome = executor.execute("svc-a", SloKind::SuccessRate).await.unwrap();

        assert_eq!(
            outcome,
            RollbackOutcome::Completed {
                previous_revision: 2
            }
        );
        assert_eq!(metrics.rollbacks_total.get(), 1);

        let snap = registry.snapshot("svc-a").unwrap();
        assert!(snap.last_rollback.is_some());
        assert_eq!(snap.phase, DeploymentPhase::RolledBack);
        assert_eq!(snap.consecutive_failures, 1);
        assert!(snap.slo_violations.values().all(|&v| v == 0));
        assert_eq!(snap.traffic_split["stable"], 100);
        assert_eq!(snap.traffic_split["canary"], 0);
        assert_eq!(snap.current_version, "repo/app:v1.1");

        // Executor wall-time was observed
        let text = metrics.encode().unwrap();
        assert!(text.contains("autonomous_deployment_duration_seconds_count 1"));
    }

    /// A ruleset without a canary/stable pair cannot be rolled back; the
    /// abort is surfaced to operators and state stays unfinalized.
    #[tokio::test]
    async fn missing_subset_pair_aborts_before_any_write() {
        let registry = Arc::new(StateRegistry::new());
        registry.upsert(DeploymentState::new("svc-a", "ecommerce"));

        let mut orchestrator = MockOrchestrator::new();
        orchestrator.expect_get_route_ruleset().returning(|| {
            Ok(RouteRulesetSpec {
                http: vec![HttpRoute {
                    route: vec![WeightedDestination {
                        destination: Destination {
                            host: "ecommerce-app".to_string(),
                            subset: Some("stable".to_string()),
                            ..Default::default()
                        },
                        weight: 100,
                        ..Default::default()
                    }],
                    ..Default::default()
                }],
                ..Default::default()
            })
        });
        orchestrator.expect_update_route_ruleset().times(0);
        orchestrator
            .expect_emit_event()
            .withf(|_, _, reason, _| reason == "RollbackAborted")
            .times(1)
            .returning(|_, _, _, _| ());

        let (executor, metrics) = executor_with(orchestrator, registry.clone());
        let err = executor.execute("svc-a", SloKind::ErrorRate).await.unwrap_err();

        assert!(matches!(err, Error::NoRollbackTarget));
        assert_eq!(metrics.rollbacks_total.get(), 0);
        assert!(registry.snapshot("svc-a").unwrap().last_rollback.is_none());
    }

    /// Revision floor: traffic was already reset (safe), but state is not
    /// finalized and the abort event fires.
    #[tokio::test]
    async fn revision_floor_leaves_state_unfinalized() {
        let registry = Arc::new(StateRegistry::new());
        let mut state = DeploymentState::new("svc-a", "ecommerce");
        state.slo_violations.insert("success_rate".to_string(), 3);
        registry.upsert(state);

        let mut orchestrator = MockOrchestrator::new();
        orchestrator
            .expect_get_route_ruleset()
            .returning(|| Ok(canary_ruleset()));
        orchestrator
            .expect_update_route_ruleset()
            .times(1)
            .returning(|_| Ok(()));
        orchestrator
            .expect_get_workload()
            .returning(|_| Ok(deployment("svc-a", "1", "repo/app:v1.0")));
        orchestrator.expect_update_workload().times(0);
        orchestrator
            .expect_emit_event()
            .withf(|_, _, reason, message| {
                reason == "RollbackAborted" && message.contains("no previous revision")
            })
            .times(1)
            .returning(|_, _, _, _| ());

        let (executor, metrics) = executor_with(orchestrator, registry.clone());
        let err = executor.execute("svc-a", SloKind::SuccessRate).await.unwrap_err();

        assert!(matches!(err, Error::NoPreviousRevision));
        assert_eq!(metrics.rollbacks_total.get(), 0);

        let snap = registry.snapshot("svc-a").unwrap();
        assert!(snap.last_rollback.is_none());
        assert_eq!(snap.slo_violations["success_rate"], 3);
    }

    /// Workload deleted between list and execution: clean abort, state entry
    /// removed, no counter movement.
    #[tokio::test]
    async fn deleted_workload_aborts_clean() {
        let registry = Arc::new(StateRegistry::new());
        registry.upsert(DeploymentState::new("svc-a", "ecommerce"));

        let mut orchestrator = MockOrchestrator::new();
        orchestrator
            .expect_get_route_ruleset()
            .returning(|| Ok(canary_ruleset()));
        orchestrator
            .expect_update_route_ruleset()
            .returning(|_| Ok(()));
        orchestrator
            .expect_get_workload()
            .returning(|_| Err(not_found()));
        orchestrator.expect_emit_event().times(0);

        let (executor, metrics) = executor_with(orchestrator, registry.clone());
        let outcome = executor.execute("svc-a", SloKind::SuccessRate).await.unwrap();

        assert_eq!(outcome, RollbackOutcome::WorkloadGone);
        assert!(!registry.contains("svc-a"));
        assert_eq!(metrics.rollbacks_total.get(), 0);
    }

    /// Router reset succeeded but the revision update failed: the cycle
    /// reports failure, state is unfinalized, and the next tick retries.
    #[tokio::test]
    async fn partial_rollback_reports_failure_for_retry() {
        let registry = Arc::new(StateRegistry::new());
        registry.upsert(DeploymentState::new("svc-a", "ecommerce"));

        let mut orchestrator = MockOrchestrator::new();
        orchestrator
            .expect_get_route_ruleset()
            .returning(|| Ok(canary_ruleset()));
        orchestrator
            .expect_update_route_ruleset()
            .returning(|_| Ok(()));
        orchestrator
            .expect_get_workload()
            .returning(|_| Ok(deployment("svc-a", "3", "repo/app:v1.2")));
        orchestrator.expect_update_workload().returning(|_| {
            Err(Error::Kube(kube::Error::Api(kube::error::ErrorResponse {
                status: "Failure".into(),
                message: "the object has been modified".into(),
                reason: "Conflict".into(),
                code: 409,
            })))
        });
        orchestrator.expect_emit_event().times(0);

        let (executor, metrics) = executor_with(orchestrator, registry.clone());
        let err = executor.execute("svc-a", SloKind::SuccessRate).await.unwrap_err();

        assert!(matches!(err, Error::Kube(_)));
        assert_eq!(metrics.rollbacks_total.get(), 0);
        assert!(registry.snapshot("svc-a").unwrap().last_rollback.is_none());
    }

    /// Cross-cluster redirection fires for failed-over workloads and its
    /// failure is non-fatal: state still finalizes.
    #[tokio::test]
    async fn failover_headers_attach_and_failure_is_non_fatal() {
        let registry = Arc::new(StateRegistry::new());
        let mut state = DeploymentState::new("svc-a", "ecommerce");
        state.cross_cluster_active = true;
        registry.upsert(state);

        let mut orchestrator = MockOrchestrator::new();
        let mut route_calls = 0u32;
        orchestrator
            .expect_get_route_ruleset()
            .times(2)
            .returning(|| Ok(canary_ruleset()));
        orchestrator
            .expect_update_route_ruleset()
            .times(2)
            .returning(move |spec| {
                route_calls += 1;
                match route_calls {
                    // First write: the traffic reset
                    1 => {
                        assert_eq!(routing::subset_weights(spec)["canary"], 0);
                        Ok(())
                    }
                    // Second write: the failover headers; simulate a router
                    // outage to prove the step is non-fatal
                    _ => {
                        let headers = spec.http[0].route[0]
                            .headers
                            .as_ref()
                            .and_then(|h| h.request.as_ref())
                            .expect("failover headers attached");
                        assert_eq!(headers.add["x-failover-active"], "true");
                        assert_eq!(headers.add["x-target-cluster"], "c2");
                        Err(Error::telemetry("router returned 503"))
                    }
                }
            });
        orchestrator
            .expect_get_workload()
            .returning(|_| Ok(deployment("svc-a", "4", "repo/app:v2.3")));
        orchestrator
            .expect_update_workload()
            .returning(|_| Ok(()));
        orchestrator
            .expect_emit_event()
            .withf(|_, _, reason, _| reason == "AutonomousRollback")
            .times(1)
            .returning(|_, _, _, _| ());

        let (executor, metrics) = executor_with(orchestrator, registry.clone());
        let outcome = executor.execute("svc-a", SloKind::LatencyP95).await.unwrap();

        assert_eq!(
            outcome,
            RollbackOutcome::Completed {
                previous_revision: 3
            }
        );
        assert_eq!(metrics.rollbacks_total.get(), 1);
        let snap = registry.snapshot("svc-a").unwrap();
        assert!(snap.last_rollback.is_some());
        assert!(snap.cross_cluster_active);
    }

    /// Workloads that never failed over skip the redirection step entirely.
    #[tokio::test]
    async fn failover_skipped_without_active_flag() {
        let registry = Arc::new(StateRegistry::new());
        registry.upsert(DeploymentState::new("svc-a", "ecommerce"));

        let mut orchestrator = MockOrchestrator::new();
        orchestrator
            .expect_get_route_ruleset()
            .times(1)
            .returning(|| Ok(canary_ruleset()));
        orchestrator
            .expect_update_route_ruleset()
            .times(1)
            .returning(|_| Ok(()));
        orchestrator
            .expect_get_workload()
            .returning(|_| Ok(deployment("svc-a", "2", "repo/app:v1.1")));
        orchestrator.expect_update_workload().returning(|_| Ok(()));
        orchestrator
            .expect_emit_event()
            .returning(|_, _, _, _| ());

        let (executor, _metrics) = executor_with(orchestrator, registry);
        let outcome = executor.execute("svc-a", SloKind::SuccessRate).await.unwrap();
        assert_eq!(
            outcome,
            RollbackOutcome::Completed {
                previous_revision: 1
            }
        );
    }
}
