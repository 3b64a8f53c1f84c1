//! Replica health monitoring
//!
//! This module provides:
//! - The health record exchanged through the shared status store
//! - Primary/replica role verification and lag classification
//! - PostgreSQL probing of replication state
//! - The sequential monitor loop that publishes only changed records

mod classify;
mod monitor;
mod probe;
mod record;

pub use classify::{classify, ProbeReport, ReplicaStats};
pub use monitor::{CycleReport, HealthMonitor, NodeReport, PublishOutcome};
pub use probe::{NodeProbe, PgProbe, ProbeError};
pub use record::{is_healthy_value, HealthRecord, ObservedRole};
