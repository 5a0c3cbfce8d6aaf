//! Controller Prometheus metrics
//!
//! All metrics live in a registry owned by [`ControllerMetrics`] rather than
//! the process-global default registry, so tests can assert on counter values
//! without cross-test interference. The metric set mirrors what operators
//! alert on: rollbacks performed, workloads discovered, violations detected,
//! and executor wall-time.

use prometheus::{Encoder, Histogram, HistogramOpts, IntCounter, Opts, Registry, TextEncoder};

use crate::{Error, Result};

/// Buckets for executor wall-time, in seconds. Rollbacks that take longer
/// than ten minutes are stuck, not slow.
const DEPLOYMENT_DURATION_BUCKETS: &[f64] = &[1.0, 5.0, 10.0, 30.0, 60.0, 120.0, 300.0, 600.0];

/// The controller's metric handles, registered against an owned registry
#[derive(Clone)]
pub struct ControllerMetrics {
    registry: Registry,

    /// Completed autonomous rollbacks
    pub rollbacks_total: IntCounter,

    /// Workloads discovered by watcher add-events
    pub deployments_total: IntCounter,

    /// SLO violations detected, summed across SLOs
    pub slo_violations_total: IntCounter,

    /// Cross-cluster communication latency; reserved for future signals
    pub cross_cluster_latency: Histogram,

    /// Wall-time of composite rollback executions
    pub deployment_duration: Histogram,
}

impl ControllerMetrics {
    /// Create and register the controller metric set
    pub fn new() -> Result<Self> {
        let registry = Registry::new();

        let rollbacks_total = IntCounter::with_opts(Opts::new(
            "autonomous_rollbacks_total",
            "Total number of autonomous rollbacks performed",
        ))
        .map_err(|e| Error::metrics(e.to_string()))?;

        let deployments_total = IntCounter::with_opts(Opts::new(
            "autonomous_deployments_total",
            "Total number of autonomous deployments managed",
        ))
        .map_err(|e| Error::metrics(e.to_string()))?;

        let slo_violations_total = IntCounter::with_opts(Opts::new(
            "autonomous_slo_violations_total",
            "Total number of SLO violations detected",
        ))
        .map_err(|e| Error::metrics(e.to_string()))?;

        let cross_cluster_latency = Histogram::with_opts(HistogramOpts::new(
            "autonomous_cross_cluster_latency_seconds",
            "Cross-cluster communication latency",
        ))
        .map_err(|e| Error::metrics(e.to_string()))?;

        let deployment_duration = Histogram::with_opts(
            HistogramOpts::new(
                "autonomous_deployment_duration_seconds",
                "Duration of autonomous deployment operations",
            )
            .buckets(DEPLOYMENT_DURATION_BUCKETS.to_vec()),
        )
        .map_err(|e| Error::metrics(e.to_string()))?;

        for collector in [
            Box::new(rollbacks_total.clone()) as Box<dyn prometheus::core::Collector>,
            Box::new(deployments_total.clone()),
            Box::new(slo_violations_total.clone()),
            Box::new(cross_cluster_latency.clone()),
            Box::new(deployment_duration.clone()),
        ] {
            registry
                .register(collector)
                .map_err(|e| Error::metrics(e.to_string()))?;
        }

        Ok(Self {
            registry,
            rollbacks_total,
            deployments_total,
            slo_violations_total,
            cross_cluster_latency,
            deployment_duration,
        })
    }

    /// Render the registry in Prometheus text exposition format
    pub fn encode(&self) -> Result<String> {
        let mut buf = Vec::new();
        TextEncoder::new()
            .encode(&self.registry.gather(), &mut buf)
            .map_err(|e| Error::metrics(e.to_string()))?;
        String::from_utf8(buf).map_err(|e| Error::metrics(e.to_string()))
    }
}
