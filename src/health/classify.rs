//! Health classification from replication state
//!
//! Pure decision logic, separated from the probe so it can be exercised
//! without a database.

use crate::config::NodeRole;

use super::record::{HealthRecord, ObservedRole};

/// Replication statistics of a node in recovery
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ReplicaStats {
    /// WAL replay explicitly paused
    pub replay_paused: bool,
    /// Received and replayed WAL positions match
    pub is_sync: bool,
    /// Seconds since the last replayed transaction committed (0 when unknown)
    pub lag_seconds: f64,
}

/// Raw facts gathered by a probe
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ProbeReport {
    pub in_recovery: bool,
    /// Collected only for nodes expected to be replicas and found in recovery
    pub replica: Option<ReplicaStats>,
}

impl ProbeReport {
    pub fn primary() -> Self {
        Self {
            in_recovery: false,
            replica: None,
        }
    }

    pub fn replica(stats: ReplicaStats) -> Self {
        Self {
            in_recovery: true,
            replica: Some(stats),
        }
    }
}

/// Turn a probe report into a health verdict
///
/// - Expected primary in recovery, or expected replica not in recovery:
///   unhealthy with a mismatch message
/// - Primary: healthy, zero lag
/// - Replica: healthy iff replay is not paused and lag <= `max_lag_ms`
pub fn classify(expected: NodeRole, report: &ProbeReport, max_lag_ms: u64) -> HealthRecord {
    match (expected, report.in_recovery) {
        (NodeRole::Primary, true) => HealthRecord {
            role_observed: ObservedRole::Replica,
            healthy: false,
            lag_ms: None,
            diagnostic: "Expected primary but found replica".to_string(),
        },
        (NodeRole::Primary, false) => HealthRecord {
            role_observed: ObservedRole::Primary,
            healthy: true,
            lag_ms: Some(0),
            diagnostic: String::new(),
        },
        (NodeRole::Replica(_), false) => HealthRecord {
            role_observed: ObservedRole::Primary,
            healthy: false,
            lag_ms: None,
            diagnostic: "Expected replica but found primary".to_string(),
        },
        (NodeRole::Replica(_), true) => match report.replica {
            Some(stats) => classify_replica(&stats, max_lag_ms),
            None => HealthRecord {
                role_observed: ObservedRole::Replica,
                healthy: false,
                lag_ms: None,
                diagnostic: "Replication statistics unavailable".to_string(),
            },
        },
    }
}

fn classify_replica(stats: &ReplicaStats, max_lag_ms: u64) -> HealthRecord {
    let lag_seconds = if stats.is_sync || !stats.lag_seconds.is_finite() {
        0.0
    } else {
        stats.lag_seconds.max(0.0)
    };
    // Lag arrives rounded to hundredths of a second; round to avoid 0.57 -> 569ms
    let lag_ms = (lag_seconds * 1000.0).round() as u64;
    // Threshold is checked on the unrounded value so 1000.4ms is over 1000ms
    let over_threshold = lag_seconds * 1000.0 > max_lag_ms as f64;

    let mut flags = Vec::new();
    if stats.replay_paused {
        flags.push("Replay paused".to_string());
    } else if stats.is_sync {
        flags.push("In sync".to_string());
    } else {
        flags.push("Syncing...".to_string());
    }
    if lag_ms > 0 {
        flags.push(format!("lag {:.2}s", lag_seconds));
    }
    if over_threshold {
        flags.push(format!("lag exceeds {}ms", max_lag_ms));
    }

    HealthRecord {
        role_observed: ObservedRole::Replica,
        healthy: !stats.replay_paused && !over_threshold,
        lag_ms: Some(lag_ms),
        diagnostic: flags.join(", "),
    }
}
