//! Rollback decision policy
//!
//! The policy is a pure function of the workload's state, the cycle's
//! violation set, the clock, and the SLO table. Keeping it free of I/O means
//! the consecutive-failure accounting and the cooldown can be tested against
//! a deterministic clock, while the reconciler supplies real time.

use std::collections::HashMap;

use chrono::{DateTime, Duration, Utc};

use crate::config::SloConfig;
use crate::registry::DeploymentState;
use crate::slo::SloKind;

/// Minimum interval between successive rollbacks of one workload
pub fn rollback_cooldown() -> Duration {
    Duration::minutes(10)
}

/// Outcome of a policy evaluation
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum RollbackDecision {
    /// No SLO has reached its consecutive-failure threshold
    NoOp,
    /// A rollback is warranted but the cooldown window is still open
    CooldownHold,
    /// Roll the workload back
    Rollback {
        /// The SLO that reached its threshold first in enumeration order
        reason: SloKind,
    },
}

/// Fold this cycle's violations into the state and decide whether to roll
/// back.
///
/// Violation counters only move here: each violated SLO's counter increments,
/// and counters for SLOs not in the set keep their value (an errored query is
/// neither progress nor recovery). The first SLO in enumeration order whose
/// counter reaches its configured `consecutive_failures` triggers; the
/// trigger is then gated by the cooldown measured from the last completed
/// rollback.
pub fn decide(
    state: &mut DeploymentState,
    violations: &[SloKind],
    now: DateTime<Utc>,
    slos: &HashMap<String, SloConfig>,
) -> RollbackDecision {
    for kind in violations {
        *state
            .slo_violations
            .entry(kind.key().to_string())
            .or_insert(0) += 1;
    }

    let triggered = SloKind::ALL.into_iter().find(|kind| {
        let Some(slo) = slos.get(kind.key()) else {
            return false;
        };
        let count = state
            .slo_violations
            .get(kind.key())
            .copied()
            .unwrap_or(0);
        slo.consecutive_failures > 0 && count >= slo.consecutive_failures
    });

    let Some(reason) = triggered else {
        return RollbackDecision::NoOp;
    };

    if let Some(last) = state.last_rollback {
        if now - last < rollback_cooldown() {
            return RollbackDecision::CooldownHold;
        }
    }

    RollbackDecision::Rollback { reason }
}
