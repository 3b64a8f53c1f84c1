//! Replica-aware read routing for a PostgreSQL primary/replica topology
//!
//! Two cooperating components that only talk through a shared status store:
//! - `health::HealthMonitor` probes every node and publishes health records
//! - `router::ReadRouter` turns those records into a role for each read

pub mod circuit;
pub mod config;
pub mod health;
pub mod metrics;
pub mod router;
pub mod store;
