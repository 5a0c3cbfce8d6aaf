//! SLO kinds, query templates, and the evaluator
//!
//! Three objectives guard every managed workload: request success rate, p95
//! latency, and 5xx error rate. Each evaluation cycle runs the configured
//! queries against the telemetry backend and reports the violating subset in
//! a fixed enumeration order, which later doubles as the tie-break order when
//! several SLOs cross their thresholds in the same cycle.
//!
//! Query failures are isolated per SLO: a transport error or missing data for
//! one objective leaves that objective "not violating" for the cycle and
//! never masks the others.

use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;

use tracing::{debug, warn};

use crate::config::SloConfig;
use crate::metrics::ControllerMetrics;
use crate::retry::{with_retries, RetryPolicy};
use crate::telemetry::TelemetryQuerier;

/// A service-level objective the controller evaluates
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum SloKind {
    /// Share of non-5xx responses, in percent; violates below threshold
    SuccessRate,
    /// 95th percentile request latency, in milliseconds; violates above
    LatencyP95,
    /// Share of 5xx responses, in percent; violates above threshold
    ErrorRate,
}

impl SloKind {
    /// Evaluation and tie-break order
    pub const ALL: [SloKind; 3] = [SloKind::SuccessRate, SloKind::LatencyP95, SloKind::ErrorRate];

    /// Canonical configuration key for this SLO
    pub fn key(self) -> &'static str {
        match self {
            SloKind::SuccessRate => "success_rate",
            SloKind::LatencyP95 => "latency_p95",
            SloKind::ErrorRate => "error_rate",
        }
    }

    /// Instant-query PromQL for this SLO, bound to a workload and a
    /// measurement window
    pub fn query(self, workload: &str, window: &str) -> String {
        match self {
            SloKind::SuccessRate => format!(
                "(sum(rate(istio_requests_total{{destination_service_name=\"{workload}\",response_code!~\"5.*\"}}[{window}])) / \
                 sum(rate(istio_requests_total{{destination_service_name=\"{workload}\"}}[{window}]))) * 100"
            ),
            SloKind::LatencyP95 => format!(
                "histogram_quantile(0.95, \
                 sum(rate(istio_request_duration_milliseconds_bucket{{destination_service_name=\"{workload}\"}}[{window}])) by (le))"
            ),
            SloKind::ErrorRate => format!(
                "(sum(rate(istio_requests_total{{destination_service_name=\"{workload}\",response_code=~\"5.*\"}}[{window}])) / \
                 sum(rate(istio_requests_total{{destination_service_name=\"{workload}\"}}[{window}]))) * 100"
            ),
        }
    }

    /// Whether an observed value violates the given threshold
    pub fn violates(self, value: f64, threshold: f64) -> bool {
        match self {
            // Higher is better
            SloKind::SuccessRate => value < threshold,
            // Lower is better
            SloKind::LatencyP95 | SloKind::ErrorRate => value > threshold,
        }
    }
}

impl fmt::Display for SloKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.key())
    }
}

/// Evaluates the configured SLOs for managed workloads
pub struct SloEvaluator {
    telemetry: Arc<dyn TelemetryQuerier>,
    slos: HashMap<String, SloConfig>,
    retry: RetryPolicy,
    metrics: Arc<ControllerMetrics>,
}

impl SloEvaluator {
    /// Build an evaluator over the given telemetry backend and SLO table
    pub fn new(
        telemetry: Arc<dyn TelemetryQuerier>,
        slos: HashMap<String, SloConfig>,
        retry: RetryPolicy,
        metrics: Arc<ControllerMetrics>,
    ) -> Self {
        Self {
            telemetry,
            slos,
            retry,
            metrics,
        }
    }

    /// Evaluate every configured SLO for `workload` and return the violating
    /// subset in enumeration order.
    ///
    /// Each detected violation increments the violations counter exactly
    /// once. SLOs absent from configuration are skipped.
    pub async fn evaluate(&self, workload: &str) -> Vec<SloKind> {
        let mut violations = Vec::new();

        for kind in SloKind::ALL {
            let Some(slo) = self.slos.get(kind.key()) else {
                continue;
            };

            let query = kind.query(workload, &slo.measurement_window);
            let observed = with_retries(&self.retry, kind.key(), || {
                self.telemetry.query(&query)
            })
            .await;

            match observed {
                Ok(value) if kind.violates(value, slo.threshold) => {
                    self.metrics.slo_violations_total.inc();
                    warn!(
                        workload = %workload,
                        slo = %kind,
                        value = value,
                        threshold = slo.threshold,
                        "SLO violation detected"
                    );
                    violations.push(kind);
                }
                Ok(value) => {
                    debug!(
                        workload = %workload,
                        slo = %kind,
                        value = value,
                        threshold = slo.threshold,
                        "SLO within objective"
                    );
                }
                Err(e) => {
                    // Treated as "not violating" for this cycle; the counter
                    // only moves on observed violations.
                    warn!(
                        workload = %workload,
                        slo = %kind,
                        error = %e,
                        "SLO query failed, skipping for this cycle"
                    );
                }
            }
        }

        violations
    }
}
