//! Health monitor loop
//!
//! Probes every configured node in sequence on a fixed interval and
//! publishes each verdict to the status store when it differs from what the
//! store already holds. Nothing that goes wrong for one node stops the cycle.

use std::sync::Arc;
use std::time::Duration;

use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use crate::config::{Config, MonitorConfig, NodeConfig, NodeRole};
use crate::metrics::metrics;
use crate::store::{status_key, StatusStore};

use super::classify::classify;
use super::probe::{NodeProbe, ProbeError};
use super::record::HealthRecord;

/// What happened when publishing a record
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PublishOutcome {
    /// Record differed from the stored value and was written
    Written,
    /// Stored value was already identical; nothing written
    Unchanged,
    /// The store could not be read or written
    Failed,
}

impl PublishOutcome {
    pub fn as_str(&self) -> &'static str {
        match self {
            PublishOutcome::Written => "written",
            PublishOutcome::Unchanged => "unchanged",
            PublishOutcome::Failed => "failed",
        }
    }
}

/// Result of checking one node in a cycle
#[derive(Debug, Clone)]
pub struct NodeReport {
    pub role: NodeRole,
    pub host: String,
    pub record: HealthRecord,
    pub publish: PublishOutcome,
}

/// Result of one full probe cycle
#[derive(Debug, Clone, Default)]
pub struct CycleReport {
    pub nodes: Vec<NodeReport>,
}

impl CycleReport {
    pub fn healthy_count(&self) -> usize {
        self.nodes.iter().filter(|n| n.record.healthy).count()
    }

    pub fn get(&self, role: NodeRole) -> Option<&NodeReport> {
        self.nodes.iter().find(|n| n.role == role)
    }
}

/// Health monitor daemon
pub struct HealthMonitor {
    nodes: Vec<NodeConfig>,
    probe: Arc<dyn NodeProbe>,
    store: Arc<dyn StatusStore>,
    key_prefix: String,
    config: MonitorConfig,
}

impl HealthMonitor {
    pub fn new(config: &Config, probe: Arc<dyn NodeProbe>, store: Arc<dyn StatusStore>) -> Self {
        Self {
            nodes: config.nodes.clone(),
            probe,
            store,
            key_prefix: config.store.key_prefix.clone(),
            config: config.monitor.clone(),
        }
    }

    /// Probe one node and classify the result
    ///
    /// Never fails: connection errors, query errors and timeouts all become
    /// an unknown/unhealthy record.
    pub async fn check_node(&self, node: &NodeConfig) -> HealthRecord {
        let timeout = self.config.check_timeout();
        let result = match tokio::time::timeout(timeout, self.probe.probe(node)).await {
            Ok(result) => result,
            Err(_) => Err(ProbeError::Timeout(timeout)),
        };

        match result {
            Ok(report) => classify(node.role, &report, self.config.max_lag_ms),
            Err(e) => {
                debug!(role = %node.role, host = %node.host, error = %e, "Probe failed");
                HealthRecord::unreachable(e)
            }
        }
    }

    /// Write a record unless the store already holds the same serialized value
    async fn publish(&self, role: NodeRole, record: &HealthRecord) -> PublishOutcome {
        let encoded = match record.encode() {
            Ok(encoded) => encoded,
            Err(e) => {
                warn!(role = %role, error = %e, "Failed to serialize health record");
                return PublishOutcome::Failed;
            }
        };
        let key = status_key(&self.key_prefix, role);

        match self.store.get(&key).await {
            Ok(Some(current)) if current == encoded => return PublishOutcome::Unchanged,
            Ok(_) => {}
            Err(e) => {
                warn!(role = %role, error = %e, "Status store read failed, reconnecting next cycle");
                self.store.reset().await;
                return PublishOutcome::Failed;
            }
        }

        match self.store.set(&key, &encoded).await {
            Ok(()) => PublishOutcome::Written,
            Err(e) => {
                warn!(role = %role, error = %e, "Status store write failed, reconnecting next cycle");
                self.store.reset().await;
                PublishOutcome::Failed
            }
        }
    }

    /// Probe and publish every node once, in configuration order
    pub async fn run_cycle(&self) -> CycleReport {
        let mut report = CycleReport::default();

        for node in &self.nodes {
            let record = self.check_node(node).await;
            let publish = self.publish(node.role, &record).await;

            let role = node.role.to_string();
            metrics().record_probe(&role, record.healthy, record.lag_ms);
            metrics().record_publish(&role, publish.as_str());

            match (publish, record.healthy) {
                (PublishOutcome::Written, true) => info!(
                    role = %node.role,
                    host = %node.host,
                    lag_ms = ?record.lag_ms,
                    message = %record.diagnostic,
                    "Node healthy"
                ),
                (PublishOutcome::Written, false) => warn!(
                    role = %node.role,
                    host = %node.host,
                    observed = ?record.role_observed,
                    lag_ms = ?record.lag_ms,
                    message = %record.diagnostic,
                    "Node unhealthy"
                ),
                _ => debug!(
                    role = %node.role,
                    host = %node.host,
                    healthy = record.healthy,
                    lag_ms = ?record.lag_ms,
                    publish = publish.as_str(),
                    "Node checked"
                ),
            }

            report.nodes.push(NodeReport {
                role: node.role,
                host: node.host.clone(),
                record,
                publish,
            });
        }

        report
    }

    /// Run probe cycles until `shutdown` is cancelled
    pub async fn run(&self, shutdown: CancellationToken) {
        let interval = self.config.check_interval();
        info!(
            nodes = self.nodes.len(),
            interval_ms = self.config.check_interval_ms,
            max_lag_ms = self.config.max_lag_ms,
            "Health monitor started"
        );

        loop {
            let report = self.run_cycle().await;
            debug!(
                healthy = report.healthy_count(),
                total = report.nodes.len(),
                "Probe cycle complete"
            );

            tokio::select! {
                _ = shutdown.cancelled() => {
                    info!("Health monitor shutting down");
                    break;
                }
                _ = tokio::time::sleep(interval) => {}
            }
        }
    }

    pub fn interval(&self) -> Duration {
        self.config.check_interval()
    }
}
