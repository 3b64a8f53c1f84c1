//! Health record wire format
//!
//! One record per node role, serialized as compact JSON:
//! `{"role":"replica","healthy":true,"lag_ms":120,"message":"Syncing..."}`.
//! Readers must tolerate extra fields; the router only looks at `healthy`.

use std::fmt;

use serde::{Deserialize, Serialize};

/// Role a node reports for itself
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ObservedRole {
    Primary,
    Replica,
    Unknown,
}

/// Health verdict for one node
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct HealthRecord {
    #[serde(rename = "role")]
    pub role_observed: ObservedRole,
    pub healthy: bool,
    /// Replication delay; absent when it could not be measured
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub lag_ms: Option<u64>,
    /// Human-readable flags, advisory only
    #[serde(rename = "message", default, skip_serializing_if = "String::is_empty")]
    pub diagnostic: String,
}

impl HealthRecord {
    /// Record for a node that could not be probed
    pub fn unreachable(error: impl fmt::Display) -> Self {
        Self {
            role_observed: ObservedRole::Unknown,
            healthy: false,
            lag_ms: None,
            diagnostic: error.to_string(),
        }
    }

    pub fn encode(&self) -> Result<String, serde_json::Error> {
        serde_json::to_string(self)
    }

    pub fn decode(raw: &str) -> Result<Self, serde_json::Error> {
        serde_json::from_str(raw)
    }
}

/// The part of a stored record the router depends on
#[derive(Deserialize)]
struct Verdict {
    healthy: bool,
}

/// Whether a stored value reports a healthy node
///
/// Malformed values count as unhealthy.
pub fn is_healthy_value(raw: &str) -> bool {
    serde_json::from_str::<Verdict>(raw)
        .map(|v| v.healthy)
        .unwrap_or(false)
}
