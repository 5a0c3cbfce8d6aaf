//! Prometheus-compatible telemetry client
//!
//! The controller reads SLO signals through instant queries against the
//! configured query endpoint. Results come back as a vector or scalar; both
//! normalize to a single `f64`. The trait seam exists so the evaluator and
//! the readiness probe can run against a mock in tests.

use async_trait::async_trait;
use serde::Deserialize;
use tracing::{debug, warn};

#[cfg(test)]
use mockall::automock;

use crate::config::{parse_duration, TelemetryConfig};
use crate::{Error, Result};

/// Instant-query access to the telemetry backend
#[cfg_attr(test, automock)]
#[async_trait]
pub trait TelemetryQuerier: Send + Sync {
    /// Execute `promql` as an instant query at "now" and normalize the
    /// result to a single value.
    ///
    /// Fails with [`Error::NoData`] when the result set is empty. Warnings
    /// attached to a successful response are logged, not fatal.
    async fn query(&self, promql: &str) -> Result<f64>;
}

/// HTTP client for a Prometheus-compatible query API
pub struct PrometheusClient {
    http: reqwest::Client,
    endpoint: String,
}

impl PrometheusClient {
    /// Build a client from telemetry configuration.
    ///
    /// The configured query timeout applies per request; retry scheduling is
    /// the caller's concern.
    pub fn new(config: &TelemetryConfig) -> Result<Self> {
        if config.prometheus_endpoint.is_empty() {
            return Err(Error::config("prometheus_endpoint is not set"));
        }
        let timeout = parse_duration(&config.query_timeout)?;
        let http = reqwest::Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|e| Error::telemetry(format!("failed to build http client: {e}")))?;

        Ok(Self {
            http,
            endpoint: config.prometheus_endpoint.trim_end_matches('/').to_string(),
        })
    }
}

#[async_trait]
impl TelemetryQuerier for PrometheusClient {
    async fn query(&self, promql: &str) -> Result<f64> {
        let url = format!("{}/api/v1/query", self.endpoint);
        let response = self
            .http
            .get(&url)
            .query(&[("query", promql)])
            .send()
            .await
            .map_err(|e| Error::telemetry(format!("query request failed: {e}")))?;

        let status = response.status();
        if !status.is_success() {
            return Err(Error::telemetry(format!(
                "query endpoint returned {status}"
            )));
        }

        let body: QueryResponse = response
            .json()
            .await
            .map_err(|e| Error::telemetry(format!("malformed query response: {e}")))?;

        if body.status != "success" {
            return Err(Error::telemetry(format!(
                "query returned status {:?}",
                body.status
            )));
        }

        for warning in &body.warnings {
            warn!(query = promql, warning = %warning, "Telemetry query warning");
        }

        let value = extract_value(&body.data)?;
        debug!(query = promql, value = value, "Telemetry query result");
        Ok(value)
    }
}

#[derive(Debug, Deserialize)]
struct QueryResponse {
    status: String,
    #[serde(default)]
    warnings: Vec<String>,
    data: QueryData,
}

#[derive(Debug, Deserialize)]
struct QueryData {
    #[serde(rename = "resultType")]
    result_type: String,
    #[serde(default)]
    result: serde_json::Value,
}

/// Pull the single value out of an instant-query result.
///
/// Vectors yield the first sample; scalars yield the scalar. An empty vector
/// or an unrecognized result type is `NoData`.
fn extract_value(data: &QueryData) -> Result<f64> {
    let sample = match data.result_type.as_str() {
        "vector" => data
            .result
            .as_array()
            .and_then(|samples| samples.first())
            .and_then(|sample| sample.get("value")),
        "scalar" => Some(&data.result),
        _ => None,
    };

    let Some(sample) = sample else {
        return Err(Error::NoData);
    };

    // A sample is a [timestamp, "value"] pair
    sample
        .get(1)
        .and_then(|v| v.as_str())
        .and_then(|s| s.parse::<f64>().ok())
        .ok_or_else(|| Error::telemetry(format!("unparsable sample value: {sample}")))
}
