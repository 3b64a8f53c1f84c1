//! Integration test entry point
//!
//! Router and monitor tests run against the in-memory store and always run.
//! Live tests against Redis and PostgreSQL run with:
//! REPLICA_ROUTER_RUN_INTEGRATION_TESTS=1 cargo test --test integration
//!
//! Environment variables:
//! - REPLICA_ROUTER_RUN_INTEGRATION_TESTS: Set to "1" to enable live tests
//! - REPLICA_ROUTER_TEST_REDIS_URL: Redis URL (default: redis://127.0.0.1:6379/15)
//! - REPLICA_ROUTER_TEST_PG_HOST: PostgreSQL primary host (default: 127.0.0.1)
//! - REPLICA_ROUTER_TEST_PG_PORT: PostgreSQL primary port (default: 5432)

mod live;
mod monitor;
mod rw_split;

use std::env;
use std::sync::Arc;

use async_trait::async_trait;
use parking_lot::Mutex;
use std::collections::HashMap;

use pg_replica_router::config::NodeConfig;
use pg_replica_router::health::{NodeProbe, ProbeError, ProbeReport, ReplicaStats};

/// Check if live integration tests should run
pub fn should_run_integration_tests() -> bool {
    env::var("REPLICA_ROUTER_RUN_INTEGRATION_TESTS")
        .map(|v| v == "1")
        .unwrap_or(false)
}

/// Skip test if live integration tests are not enabled
#[macro_export]
macro_rules! skip_if_not_enabled {
    () => {
        if !crate::should_run_integration_tests() {
            eprintln!(
                "Skipping integration test (set REPLICA_ROUTER_RUN_INTEGRATION_TESTS=1 to run)"
            );
            return;
        }
    };
}

pub fn test_redis_url() -> String {
    env::var("REPLICA_ROUTER_TEST_REDIS_URL")
        .unwrap_or_else(|_| "redis://127.0.0.1:6379/15".to_string())
}

pub fn test_pg_host() -> String {
    env::var("REPLICA_ROUTER_TEST_PG_HOST").unwrap_or_else(|_| "127.0.0.1".to_string())
}

pub fn test_pg_port() -> u16 {
    env::var("REPLICA_ROUTER_TEST_PG_PORT")
        .ok()
        .and_then(|p| p.parse().ok())
        .unwrap_or(5432)
}

/// Probe whose answers are set per host by the test
#[derive(Default)]
pub struct FakeProbe {
    reports: Mutex<HashMap<String, Result<ProbeReport, String>>>,
}

impl FakeProbe {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    pub fn set(&self, host: &str, report: ProbeReport) {
        self.reports.lock().insert(host.to_string(), Ok(report));
    }

    pub fn fail(&self, host: &str, message: &str) {
        self.reports
            .lock()
            .insert(host.to_string(), Err(message.to_string()));
    }
}

#[async_trait]
impl NodeProbe for FakeProbe {
    async fn probe(&self, node: &NodeConfig) -> Result<ProbeReport, ProbeError> {
        match self.reports.lock().get(&node.host) {
            Some(Ok(report)) => Ok(*report),
            Some(Err(message)) => Err(ProbeError::Connection(message.clone())),
            None => Err(ProbeError::Connection("connection refused".to_string())),
        }
    }
}

pub fn replica_report(replay_paused: bool, is_sync: bool, lag_seconds: f64) -> ProbeReport {
    ProbeReport::replica(ReplicaStats {
        replay_paused,
        is_sync,
        lag_seconds,
    })
}
