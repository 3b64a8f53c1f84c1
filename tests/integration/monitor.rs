//! Health monitor publishing through the status store

use std::sync::Arc;

use pg_replica_router::config::{Config, NodeRole};
use pg_replica_router::health::{
    HealthMonitor, HealthRecord, ObservedRole, ProbeReport, PublishOutcome,
};
use pg_replica_router::router::{ReadRouter, RouteSource};
use pg_replica_router::store::MemoryStore;

use crate::{replica_report, FakeProbe};

fn stored(store: &MemoryStore, role: &str) -> HealthRecord {
    let raw = store
        .peek(&format!("db_status:{}", role))
        .expect("record should be published");
    HealthRecord::decode(&raw).expect("record should decode")
}

#[tokio::test]
async fn test_identical_cycles_write_once() {
    let probe = FakeProbe::new();
    probe.set("postgres-primary", ProbeReport::primary());
    probe.set("postgres-replica1", replica_report(false, false, 0.25));
    probe.set("postgres-replica2", replica_report(false, true, 0.0));
    let store = Arc::new(MemoryStore::new());
    let monitor = HealthMonitor::new(&Config::default(), probe.clone(), store.clone());

    monitor.run_cycle().await;
    monitor.run_cycle().await;
    monitor.run_cycle().await;

    assert_eq!(store.write_count(), 3);
    let replica = stored(&store, "replica_1");
    assert!(replica.healthy);
    assert_eq!(replica.lag_ms, Some(250));
    assert_eq!(replica.diagnostic, "Syncing..., lag 0.25s");
}

#[tokio::test]
async fn test_misconfigured_nodes_are_unhealthy() {
    let probe = FakeProbe::new();
    // Primary and replica_1 swapped roles after a failover
    probe.set("postgres-primary", replica_report(false, true, 0.0));
    probe.set("postgres-replica1", ProbeReport::primary());
    probe.set("postgres-replica2", replica_report(false, true, 0.0));
    let store = Arc::new(MemoryStore::new());
    let monitor = HealthMonitor::new(&Config::default(), probe.clone(), store.clone());

    let report = monitor.run_cycle().await;
    assert_eq!(report.healthy_count(), 1);

    let primary = stored(&store, "primary");
    assert!(!primary.healthy);
    assert_eq!(primary.role_observed, ObservedRole::Replica);
    assert_eq!(primary.diagnostic, "Expected primary but found replica");

    let replica = stored(&store, "replica_1");
    assert!(!replica.healthy);
    assert_eq!(replica.role_observed, ObservedRole::Primary);
    assert_eq!(replica.diagnostic, "Expected replica but found primary");
}

#[tokio::test]
async fn test_lag_threshold_boundary() {
    let probe = FakeProbe::new();
    probe.set("postgres-primary", ProbeReport::primary());
    probe.set("postgres-replica1", replica_report(false, false, 1.0));
    probe.set("postgres-replica2", replica_report(false, false, 1.01));
    let store = Arc::new(MemoryStore::new());
    let monitor = HealthMonitor::new(&Config::default(), probe.clone(), store.clone());

    monitor.run_cycle().await;
    assert!(stored(&store, "replica_1").healthy);
    assert!(!stored(&store, "replica_2").healthy);

    // Paused replay is unhealthy even with no lag
    probe.set("postgres-replica1", replica_report(true, true, 0.0));
    let report = monitor.run_cycle().await;
    assert_eq!(
        report.get(NodeRole::Replica(1)).unwrap().publish,
        PublishOutcome::Written
    );
    let paused = stored(&store, "replica_1");
    assert!(!paused.healthy);
    assert_eq!(paused.diagnostic, "Replay paused");
}

#[tokio::test]
async fn test_unreachable_node_and_store_outage() {
    let probe = FakeProbe::new();
    probe.set("postgres-primary", ProbeReport::primary());
    probe.fail("postgres-replica1", "could not translate host name");
    probe.set("postgres-replica2", replica_report(false, true, 0.0));
    let store = Arc::new(MemoryStore::new());
    let monitor = HealthMonitor::new(&Config::default(), probe.clone(), store.clone());

    store.set_failing(true);
    let report = monitor.run_cycle().await;
    assert_eq!(report.nodes.len(), 3);
    assert!(report
        .nodes
        .iter()
        .all(|n| n.publish == PublishOutcome::Failed));

    store.set_failing(false);
    monitor.run_cycle().await;
    let replica = stored(&store, "replica_1");
    assert!(!replica.healthy);
    assert_eq!(replica.role_observed, ObservedRole::Unknown);
    assert!(replica.diagnostic.contains("could not translate host name"));
}

#[tokio::test(start_paused = true)]
async fn test_monitor_feeds_router() {
    let probe = FakeProbe::new();
    probe.set("postgres-primary", ProbeReport::primary());
    probe.set("postgres-replica1", replica_report(false, true, 0.0));
    probe.set("postgres-replica2", replica_report(false, false, 5.0));
    let store = Arc::new(MemoryStore::new());
    let config = Config::default();
    let monitor = HealthMonitor::new(&config, probe.clone(), store.clone());
    let router = ReadRouter::from_config(&config, store.clone()).unwrap();

    monitor.run_cycle().await;
    let decision = router.decide().await;
    assert_eq!(decision.source, RouteSource::Store);
    assert_eq!(decision.healthy_roles, vec![NodeRole::Replica(1)]);

    // replica_2 catches up; the router sees it after the cache TTL
    probe.set("postgres-replica2", replica_report(false, true, 0.0));
    monitor.run_cycle().await;
    tokio::time::advance(router.cache_ttl()).await;

    let decision = router.decide().await;
    assert_eq!(
        decision.healthy_roles,
        vec![NodeRole::Replica(1), NodeRole::Replica(2)]
    );
}
