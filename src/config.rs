//! Controller configuration
//!
//! Configuration is a single YAML file mounted into the pod, with `$VAR` /
//! `${VAR}` references expanded from the environment before parsing. The file
//! carries four sections: per-SLO thresholds, progressive-delivery strategy
//! metadata, cross-cluster failover parameters, and the telemetry backend.
//!
//! Measurement windows stay as strings because they are substituted verbatim
//! into PromQL range selectors; only the query timeout is parsed into a
//! [`Duration`] on this side.

use std::collections::HashMap;
use std::path::Path;
use std::time::Duration;

use serde::Deserialize;
use tracing::info;

use crate::{Error, Result};

/// Default config file path when `CONTROLLER_CONFIG_PATH` is unset
pub const DEFAULT_CONFIG_PATH: &str = "/etc/config/config.yaml";

/// Top-level controller configuration
#[derive(Clone, Debug, Default, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct Config {
    /// Per-SLO evaluation parameters, keyed by SLO name
    /// (`success_rate`, `latency_p95`, `error_rate`)
    #[serde(default)]
    pub slos: HashMap<String, SloConfig>,

    /// Progressive-delivery strategy parameters, keyed by strategy name.
    /// Consumed only as metadata by this controller.
    #[serde(default)]
    pub strategies: HashMap<String, StrategyConfig>,

    /// Cross-cluster failover parameters
    #[serde(default)]
    pub cross_cluster: CrossClusterConfig,

    /// Telemetry backend parameters
    #[serde(default)]
    pub azure_monitor: TelemetryConfig,
}

/// Evaluation parameters for a single SLO
#[derive(Clone, Debug, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct SloConfig {
    /// Violation threshold; direction depends on the SLO kind
    pub threshold: f64,

    /// PromQL range-selector window, e.g. `5m`
    pub measurement_window: String,

    /// Advisory evaluation cadence; the sweep ticker is the effective cadence
    #[serde(default)]
    pub evaluation_interval: String,

    /// Consecutive violating cycles required before a rollback triggers
    pub consecutive_failures: u32,
}

/// Parameters of a progressive-delivery strategy.
///
/// The rollout engine that consumes these lives outside this controller; the
/// fields are retained so one config file serves both.
#[derive(Clone, Debug, Default, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct StrategyConfig {
    /// Starting canary weight (0-100)
    #[serde(default)]
    pub initial_weight: i32,

    /// Weight added per promotion step
    #[serde(default)]
    pub increment: i32,

    /// Weight at which the rollout is considered fully promoted
    #[serde(default)]
    pub max_weight: i32,

    /// Interval between promotion steps
    #[serde(default)]
    pub promotion_interval: String,

    /// Free-form promotion criteria, opaque to this controller
    #[serde(default)]
    pub success_criteria: HashMap<String, serde_yaml::Value>,
}

/// Cross-cluster failover parameters
#[derive(Clone, Debug, Default, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct CrossClusterConfig {
    /// Cluster serving traffic under normal operation
    #[serde(default)]
    pub primary_cluster: String,

    /// Cluster that header-based failover redirects to
    #[serde(default)]
    pub secondary_cluster: String,

    /// Rollbacks before failover is considered (consumed by the platform)
    #[serde(default)]
    pub failover_threshold: u32,

    /// Healthy cycles before failback; no failback path is implemented yet
    #[serde(default)]
    pub failback_threshold: u32,

    /// Cadence of the platform's cross-cluster health probe
    #[serde(default)]
    pub health_check_interval: String,
}

/// Telemetry backend parameters
#[derive(Clone, Debug, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct TelemetryConfig {
    /// Monitor workspace identifier; reserved for future cloud-metric signals
    #[serde(default)]
    pub workspace_id: String,

    /// Base URL of the Prometheus-compatible query API
    pub prometheus_endpoint: String,

    /// Per-query HTTP timeout, e.g. `30s`
    #[serde(default = "default_query_timeout")]
    pub query_timeout: String,

    /// Attempts per SLO query before giving up for the cycle
    #[serde(default = "default_retry_attempts")]
    pub retry_attempts: u32,
}

fn default_query_timeout() -> String {
    "30s".to_string()
}

fn default_retry_attempts() -> u32 {
    3
}

impl Default for TelemetryConfig {
    fn default() -> Self {
        Self {
            workspace_id: String::new(),
            prometheus_endpoint: String::new(),
            query_timeout: default_query_timeout(),
            retry_attempts: default_retry_attempts(),
        }
    }
}

impl Config {
    /// Load configuration from the given path.
    ///
    /// Environment-variable references in the file are expanded before the
    /// YAML is parsed, so secrets and endpoints can be injected by the pod
    /// spec rather than baked into the ConfigMap.
    pub fn load(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let raw = std::fs::read_to_string(path)
            .map_err(|e| Error::config(format!("failed to read {}: {e}", path.display())))?;

        let expanded = expand_env(&raw, |var| std::env::var(var).ok());

        let config: Config = serde_yaml::from_str(&expanded)
            .map_err(|e| Error::config(format!("failed to parse {}: {e}", path.display())))?;

        info!(
            path = %path.display(),
            slos = config.slos.len(),
            strategies = config.strategies.len(),
            "Configuration loaded"
        );

        Ok(config)
    }
}

/// Expand `$VAR` and `${VAR}` references using the given lookup.
///
/// Unset variables expand to the empty string. A literal `$` not followed by
/// an identifier or `{` passes through unchanged.
pub fn expand_env(input: &str, lookup: impl Fn(&str) -> Option<String>) -> String {
    let mut out = String::with_capacity(input.len());
    let mut chars = input.char_indices().peekable();

    while let Some((_, c)) = chars.next() {
        if c != '$' {
            out.push(c);
            continue;
        }

        match chars.peek() {
            Some(&(start, '{')) => {
                chars.next();
                let rest = &input[start + 1..];
                match rest.find('}') {
                    Some(end) => {
                        let name = &rest[..end];
                        out.push_str(&lookup(name).unwrap_or_default());
                        for _ in 0..=end {
                            chars.next();
                        }
                    }
                    // Unterminated brace: keep the text as written
                    None => {
                        out.push_str("${");
                    }
                }
            }
            Some(&(start, c2)) if c2 == '_' || c2.is_ascii_alphabetic() => {
                let rest = &input[start..];
                let len = rest
                    .find(|ch: char| ch != '_' && !ch.is_ascii_alphanumeric())
                    .unwrap_or(rest.len());
                let name = &rest[..len];
                out.push_str(&lookup(name).unwrap_or_default());
                for _ in 0..len {
                    chars.next();
                }
            }
            _ => out.push('$'),
        }
    }

    out
}

/// Parse a duration string of the form `<int><unit>` where unit is one of
/// `ms`, `s`, `m`, `h`.
pub fn parse_duration(input: &str) -> Result<Duration> {
    let input = input.trim();
    let split = input
        .find(|c: char| !c.is_ascii_digit())
        .ok_or_else(|| Error::config(format!("duration {input:?} has no unit")))?;
    let (digits, unit) = input.split_at(split);
    let value: u64 = digits
        .parse()
        .map_err(|_| Error::config(format!("invalid duration value in {input:?}")))?;

    match unit {
        "ms" => Ok(Duration::from_millis(value)),
        "s" => Ok(Duration::from_secs(value)),
        "m" => Ok(Duration::from_secs(value * 60)),
        "h" => Ok(Duration::from_secs(value * 3600)),
        _ => Err(Error::config(format!("unknown duration unit {unit:?}"))),
    }
}
