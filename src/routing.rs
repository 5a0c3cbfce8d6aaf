//! Weighted route-ruleset types and rollback mutations
//!
//! The traffic router models a ruleset as a list of HTTP routes, each
//! splitting traffic across weighted subset destinations. Rollguard only
//! cares about two mutations: resetting the split so the stable subset takes
//! all traffic, and attaching cross-cluster failover headers. Both are pure
//! functions over the spec so the executor's ordering logic stays testable
//! without a cluster.
//!
//! The types round-trip through the orchestrator's untyped representation;
//! fields this controller does not model (match clauses, retries, timeouts)
//! are preserved across a read-modify-write via flattened passthrough maps.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

/// Subsets carrying the new revision during a progressive rollout
const CANARY_SUBSETS: [&str; 2] = ["canary", "green"];

/// Subsets carrying the last known-good revision
const STABLE_SUBSETS: [&str; 2] = ["stable", "blue"];

/// Weight granted to the stable subset after a rollback
const FULL_WEIGHT: i32 = 100;

/// Spec of a weighted-routing ruleset
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct RouteRulesetSpec {
    /// Hostnames the ruleset applies to
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub hosts: Vec<String>,

    /// HTTP routing rules, evaluated in order
    #[serde(default)]
    pub http: Vec<HttpRoute>,

    /// Unmodeled ruleset fields, preserved verbatim
    #[serde(flatten)]
    pub extra: BTreeMap<String, serde_json::Value>,
}

/// A single HTTP routing rule
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct HttpRoute {
    /// Weighted destinations this rule splits traffic across
    #[serde(default)]
    pub route: Vec<WeightedDestination>,

    /// Unmodeled rule fields (match clauses, retries, ...), preserved verbatim
    #[serde(flatten)]
    pub extra: BTreeMap<String, serde_json::Value>,
}

/// One weighted leg of a traffic split
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct WeightedDestination {
    /// Where the traffic goes
    pub destination: Destination,

    /// Share of traffic in percent (0-100)
    #[serde(default)]
    pub weight: i32,

    /// Header operations applied to requests taking this leg
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub headers: Option<HeaderOperations>,

    /// Unmodeled destination-level fields, preserved verbatim
    #[serde(flatten)]
    pub extra: BTreeMap<String, serde_json::Value>,
}

/// A routing destination: a host and an optional versioned subset
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct Destination {
    /// Service host the traffic is sent to
    pub host: String,

    /// Named endpoint subset within the host
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub subset: Option<String>,

    /// Unmodeled fields (port, ...), preserved verbatim
    #[serde(flatten)]
    pub extra: BTreeMap<String, serde_json::Value>,
}

/// Request/response header manipulation on a route leg
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct HeaderOperations {
    /// Operations on the request side
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub request: Option<HeaderMutation>,

    /// Unmodeled operations (response side), preserved verbatim
    #[serde(flatten)]
    pub extra: BTreeMap<String, serde_json::Value>,
}

/// Headers added to traffic on a route leg
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct HeaderMutation {
    /// Headers to add
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub add: BTreeMap<String, String>,

    /// Unmodeled mutations (set, remove), preserved verbatim
    #[serde(flatten)]
    pub extra: BTreeMap<String, serde_json::Value>,
}

/// Result of a traffic reset: how many legs were touched on each side
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct ResetOutcome {
    /// Canary/green legs forced to weight 0
    pub demoted: usize,
    /// Stable/blue legs forced to full weight
    pub promoted: usize,
}

impl ResetOutcome {
    /// Whether the ruleset contained a usable rollback target: at least one
    /// leg on each side of the split.
    pub fn has_target(&self) -> bool {
        self.demoted > 0 && self.promoted > 0
    }
}

/// Force the split back to the stable side: canary/green legs to 0, and
/// stable/blue legs to full weight. Legs without a subset are untouched.
///
/// Idempotent; resetting an already-reset ruleset touches the same legs and
/// changes nothing.
pub fn reset_to_stable(spec: &mut RouteRulesetSpec) -> ResetOutcome {
    let mut outcome = ResetOutcome::default();

    for rule in &mut spec.http {
        for leg in &mut rule.route {
            match leg.destination.subset.as_deref() {
                Some(subset) if CANARY_SUBSETS.contains(&subset) => {
                    leg.weight = 0;
                    outcome.demoted += 1;
                }
                Some(subset) if STABLE_SUBSETS.contains(&subset) => {
                    leg.weight = FULL_WEIGHT;
                    outcome.promoted += 1;
                }
                _ => {}
            }
        }
    }

    outcome
}

/// Attach cross-cluster failover headers to every leg routed at `host`.
///
/// Returns how many legs were updated. Existing header operations on a leg
/// are replaced for the two failover keys and preserved otherwise.
pub fn apply_failover_headers(
    spec: &mut RouteRulesetSpec,
    host: &str,
    secondary_cluster: &str,
) -> usize {
    let mut updated = 0;

    for rule in &mut spec.http {
        for leg in &mut rule.route {
            if leg.destination.host != host {
                continue;
            }
            let mutation = leg
                .headers
                .get_or_insert_with(HeaderOperations::default)
                .request
                .get_or_insert_with(HeaderMutation::default);
            mutation
                .add
                .insert("x-failover-active".to_string(), "true".to_string());
            mutation
                .add
                .insert("x-target-cluster".to_string(), secondary_cluster.to_string());
            updated += 1;
        }
    }

    updated
}

/// Current weight per named subset, for state bookkeeping after a reset.
/// A subset appearing on several rules reports its last weight.
pub fn subset_weights(spec: &RouteRulesetSpec) -> BTreeMap<String, i32> {
    let mut weights = BTreeMap::new();
    for rule in &spec.http {
        for leg in &rule.route {
            if let Some(subset) = &leg.destination.subset {
                weights.insert(subset.clone(), leg.weight);
            }
        }
    }
    weights
}
