//! Live tests against Redis and PostgreSQL

use std::sync::Arc;

use pg_replica_router::config::{Config, DatabaseConfig, MonitorConfig, NodeConfig, NodeRole, StoreConfig};
use pg_replica_router::health::{HealthMonitor, NodeProbe, PgProbe};
use pg_replica_router::router::{ReadRouter, RouteSource};
use pg_replica_router::store::{RedisStore, StatusStore};

use crate::{skip_if_not_enabled, test_pg_host, test_pg_port, test_redis_url};

fn redis_store() -> RedisStore {
    let config = StoreConfig {
        url: test_redis_url(),
        ..StoreConfig::default()
    };
    RedisStore::new(&config).expect("Failed to create Redis store")
}

#[tokio::test]
async fn test_redis_round_trip() {
    skip_if_not_enabled!();

    let store = redis_store();
    let key = "it_status:replica_1";
    store.set(key, r#"{"healthy":true}"#).await.expect("SET should succeed");
    assert_eq!(
        store.get(key).await.expect("GET should succeed").as_deref(),
        Some(r#"{"healthy":true}"#)
    );

    let keys = vec![key.to_string(), "it_status:missing".to_string()];
    let values = store.get_many(&keys).await.expect("MGET should succeed");
    assert_eq!(values.len(), 2);
    assert!(values[1].is_none());
}

#[tokio::test]
async fn test_primary_probe() {
    skip_if_not_enabled!();

    let probe = PgProbe::new(DatabaseConfig::default(), &MonitorConfig::default());
    let node = NodeConfig {
        port: Some(test_pg_port()),
        ..NodeConfig::new(NodeRole::Primary, test_pg_host())
    };

    let report = probe.probe(&node).await.expect("probe should succeed");
    assert!(!report.in_recovery, "test server should be a primary");
}

#[tokio::test]
async fn test_monitor_and_router_over_redis() {
    skip_if_not_enabled!();

    let mut config = Config::default();
    config.store.url = test_redis_url();
    config.store.key_prefix = "it_status:".to_string();
    config.nodes = vec![
        NodeConfig {
            port: Some(test_pg_port()),
            ..NodeConfig::new(NodeRole::Primary, test_pg_host())
        },
        // Expected replica that is actually the primary: must be unhealthy
        NodeConfig {
            port: Some(test_pg_port()),
            ..NodeConfig::new(NodeRole::Replica(1), test_pg_host())
        },
    ];

    let store = Arc::new(RedisStore::new(&config.store).unwrap());
    let probe = Arc::new(PgProbe::new(config.database.clone(), &config.monitor));
    let monitor = HealthMonitor::new(&config, probe, store.clone());

    let report = monitor.run_cycle().await;
    assert!(report.get(NodeRole::Primary).unwrap().record.healthy);
    assert!(!report.get(NodeRole::Replica(1)).unwrap().record.healthy);

    let router = ReadRouter::from_config(&config, store).unwrap();
    let decision = router.decide().await;
    assert_eq!(decision.source, RouteSource::Store);
    assert_eq!(decision.role, NodeRole::Primary);
}
