//! Error types for the rollback controller

use thiserror::Error;

/// Main error type for controller operations
#[derive(Debug, Error)]
#[non_exhaustive]
pub enum Error {
    /// Kubernetes API error
    #[error("kubernetes error: {0}")]
    Kube(#[from] kube::Error),

    /// Configuration loading or parsing error
    #[error("configuration error: {0}")]
    Config(String),

    /// Telemetry backend error (transport, bad status, malformed body)
    #[error("telemetry error: {0}")]
    Telemetry(String),

    /// The telemetry query succeeded but returned no samples
    #[error("no data returned from query")]
    NoData,

    /// The route ruleset has no canary/stable subset pair to reset
    #[error("route ruleset has no rollback target subsets")]
    NoRollbackTarget,

    /// The workload is already at its first revision
    #[error("no previous revision available for rollback")]
    NoPreviousRevision,

    /// Serialization/deserialization error
    #[error("serialization error: {0}")]
    Serialization(String),

    /// Metrics registration or encoding error
    #[error("metrics error: {0}")]
    Metrics(String),
}

impl Error {
    /// Create a configuration error with the given message
    pub fn config(msg: impl Into<String>) -> Self {
        Self::Config(msg.into())
    }

    /// Create a telemetry error with the given message
    pub fn telemetry(msg: impl Into<String>) -> Self {
        Self::Telemetry(msg.into())
    }

    /// Create a serialization error with the given message
    pub fn serialization(msg: impl Into<String>) -> Self {
        Self::Serialization(msg.into())
    }

    /// Create a metrics error with the given message
    pub fn metrics(msg: impl Into<String>) -> Self {
        Self::Metrics(msg.into())
    }

    /// Whether this error is a Kubernetes 404 for the addressed resource.
    ///
    /// The executor treats "not found" on the workload path as a clean abort:
    /// the workload was deleted mid-cycle and its state entry is dropped.
    pub fn is_not_found(&self) -> bool {
        matches!(self, Error::Kube(kube::Error::Api(resp)) if resp.code == 404)
    }

    /// Whether this error aborts the rollback by policy rather than by
    /// infrastructure failure.
    ///
    /// Policy aborts leave the workload state unfinalized and are logged as
    /// warnings; the next cycle re-evaluates from current remote state.
    pub fn is_policy_abort(&self) -> bool {
        matches!(self, Error::NoRollbackTarget | Error::NoPreviousRevision)
    }
}
