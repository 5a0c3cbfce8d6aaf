//! Orchestrator adapter
//!
//! Everything the controller asks of the cluster goes through the
//! [`Orchestrator`] trait: listing and updating workloads, reading and
//! writing the weighted route ruleset, and emitting audit events. The
//! Kubernetes implementation uses typed apps/v1 APIs for workloads and an
//! untyped [`DynamicObject`] handle for the route ruleset, whose spec is
//! parsed into the [`routing`](crate::routing) types and written back with a
//! merge patch.
//!
//! Workload updates are full replaces so optimistic-concurrency conflicts
//! surface to the caller instead of being silently merged away.

use async_trait::async_trait;
use chrono::Utc;
use k8s_openapi::api::apps::v1::Deployment;
use k8s_openapi::api::core::v1::{Event, EventSource, ObjectReference};
use k8s_openapi::apimachinery::pkg::apis::meta::v1::Time;
use kube::api::{Api, DynamicObject, ListParams, ObjectMeta, Patch, PatchParams, PostParams};
use kube::discovery::ApiResource;
use kube::Client;
use tracing::{debug, warn};

#[cfg(test)]
use mockall::automock;

use crate::routing::RouteRulesetSpec;
use crate::{Error, Result, EVENT_COMPONENT, PARTICIPATION_LABEL, ROUTE_RULESET_NAME};

/// Severity of an emitted audit event
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum EventSeverity {
    /// Informational event
    Normal,
    /// Something an operator should look at
    Warning,
}

impl EventSeverity {
    /// The orchestrator's string form of this severity
    pub fn as_str(self) -> &'static str {
        match self {
            EventSeverity::Normal => "Normal",
            EventSeverity::Warning => "Warning",
        }
    }
}

/// Cluster operations the controller depends on
#[cfg_attr(test, automock)]
#[async_trait]
pub trait Orchestrator: Send + Sync {
    /// Workloads in the managed namespace carrying the participation label
    async fn list_workloads(&self) -> Result<Vec<Deployment>>;

    /// Fetch one workload by name
    async fn get_workload(&self, name: &str) -> Result<Deployment>;

    /// Replace a workload. Optimistic; a concurrent writer surfaces as a
    /// conflict error.
    async fn update_workload(&self, workload: &Deployment) -> Result<()>;

    /// Read the shared route ruleset's spec
    async fn get_route_ruleset(&self) -> Result<RouteRulesetSpec>;

    /// Write the shared route ruleset's spec back
    async fn update_route_ruleset(&self, spec: &RouteRulesetSpec) -> Result<()>;

    /// Emit an audit event for a workload. Best-effort: failures are logged
    /// and swallowed.
    async fn emit_event(&self, workload: &str, severity: EventSeverity, reason: &str, message: &str);
}

/// Kubernetes-backed orchestrator adapter
pub struct KubeOrchestrator {
    client: Client,
    namespace: String,
}

impl KubeOrchestrator {
    /// Create an adapter bound to the managed namespace
    pub fn new(client: Client, namespace: impl Into<String>) -> Self {
        Self {
            client,
            namespace: namespace.into(),
        }
    }

    fn workloads(&self) -> Api<Deployment> {
        Api::namespaced(self.client.clone(), &self.namespace)
    }

    fn routes(&self) -> Api<DynamicObject> {
        Api::namespaced_with(self.client.clone(), &self.namespace, &route_api_resource())
    }

    fn events(&self) -> Api<Event> {
        Api::namespaced(self.client.clone(), &self.namespace)
    }
}

/// API coordinates of the router's ruleset resource
pub fn route_api_resource() -> ApiResource {
    ApiResource {
        group: "networking.istio.io".to_string(),
        version: "v1beta1".to_string(),
        api_version: "networking.istio.io/v1beta1".to_string(),
        kind: "VirtualService".to_string(),
        plural: "virtualservices".to_string(),
    }
}

#[async_trait]
impl Orchestrator for KubeOrchestrator {
    async fn list_workloads(&self) -> Result<Vec<Deployment>> {
        let params = ListParams::default().labels(PARTICIPATION_LABEL);
        let list = self.workloads().list(&params).await?;
        Ok(list.items)
    }

    async fn get_workload(&self, name: &str) -> Result<Deployment> {
        Ok(self.workloads().get(name).await?)
    }

    async fn update_workload(&self, workload: &Deployment) -> Result<()> {
        let name = workload
            .metadata
            .name
            .as_deref()
            .ok_or_else(|| Error::serialization("workload has no name"))?;
        self.workloads()
            .replace(name, &PostParams::default(), workload)
            .await?;
        Ok(())
    }

    async fn get_route_ruleset(&self) -> Result<RouteRulesetSpec> {
        let object = self.routes().get(ROUTE_RULESET_NAME).await?;
        let spec = object
            .data
            .get("spec")
            .cloned()
            .ok_or_else(|| Error::serialization(format!("{ROUTE_RULESET_NAME} has no spec")))?;
        serde_json::from_value(spec)
            .map_err(|e| Error::serialization(format!("invalid route ruleset spec: {e}")))
    }

    async fn update_route_ruleset(&self, spec: &RouteRulesetSpec) -> Result<()> {
        let patch = serde_json::json!({ "spec": spec });
        self.routes()
            .patch(
                ROUTE_RULESET_NAME,
                &PatchParams::default(),
                &Patch::Merge(&patch),
            )
            .await?;
        Ok(())
    }

    async fn emit_event(
        &self,
        workload: &str,
        severity: EventSeverity,
        reason: &str,
        message: &str,
    ) {
        let now = Time(Utc::now());
        let event = Event {
            metadata: ObjectMeta {
                name: Some(format!("{workload}-{}", now.0.timestamp())),
                namespace: Some(self.namespace.clone()),
                ..Default::default()
            },
            involved_object: ObjectReference {
                kind: Some("Deployment".to_string()),
                name: Some(workload.to_string()),
                namespace: Some(self.namespace.clone()),
                ..Default::default()
            },
            type_: Some(severity.as_str().to_string()),
            reason: Some(reason.to_string()),
            message: Some(message.to_string()),
            source: Some(EventSource {
                component: Some(EVENT_COMPONENT.to_string()),
                ..Default::default()
            }),
            first_timestamp: Some(now.clone()),
            last_timestamp: Some(now),
            count: Some(1),
            ..Default::default()
        };

        match self.events().create(&PostParams::default(), &event).await {
            Ok(_) => debug!(workload = %workload, reason = %reason, "Event emitted"),
            Err(e) => warn!(workload = %workload, reason = %reason, error = %e, "Failed to emit event"),
        }
    }
}
