//! Replication state probing for PostgreSQL nodes
//!
//! Determines whether a node is in recovery (replica) or not (primary) via
//! `pg_is_in_recovery()`, and for replicas gathers:
//! 1. `pg_is_wal_replay_paused()`
//! 2. Whether received and replayed WAL positions match
//! 3. Seconds since the last replayed transaction committed

use std::time::Duration;

use async_trait::async_trait;
use sqlx::postgres::{PgConnectOptions, PgConnection};
use sqlx::{ConnectOptions, Connection};
use tracing::debug;

use crate::config::{DatabaseConfig, MonitorConfig, NodeConfig};

use super::classify::{ProbeReport, ReplicaStats};

/// Error during a probe
#[derive(Debug, thiserror::Error)]
pub enum ProbeError {
    #[error("Connection failed: {0}")]
    Connection(String),
    #[error("Query failed: {0}")]
    Query(String),
    #[error("Probe timed out after {0:?}")]
    Timeout(Duration),
}

impl From<sqlx::Error> for ProbeError {
    fn from(e: sqlx::Error) -> Self {
        ProbeError::Query(e.to_string())
    }
}

/// Source of replication facts for a node
#[async_trait]
pub trait NodeProbe: Send + Sync {
    async fn probe(&self, node: &NodeConfig) -> Result<ProbeReport, ProbeError>;
}

const IN_RECOVERY_SQL: &str = "SELECT pg_is_in_recovery()";

const REPLAY_PAUSED_SQL: &str = "SELECT pg_is_wal_replay_paused()";

const REPLICATION_STATS_SQL: &str = "\
WITH stats AS (
    SELECT
        pg_last_wal_receive_lsn() = pg_last_wal_replay_lsn() AS is_sync,
        COALESCE(EXTRACT(EPOCH FROM (now() - pg_last_xact_replay_timestamp())), 0) AS lag_s
)
SELECT is_sync, ROUND(lag_s::numeric, 2)::float8 AS lag_s FROM stats";

/// Probe that opens a fresh PostgreSQL connection per check
pub struct PgProbe {
    database: DatabaseConfig,
    connect_timeout: Duration,
}

impl PgProbe {
    pub fn new(database: DatabaseConfig, monitor: &MonitorConfig) -> Self {
        Self {
            database,
            connect_timeout: monitor.connect_timeout(),
        }
    }

    fn connect_options(&self, node: &NodeConfig) -> PgConnectOptions {
        PgConnectOptions::new()
            .host(&node.host)
            .port(node.port.unwrap_or(self.database.port))
            .username(&self.database.user)
            .password(&self.database.password)
            .database(&self.database.dbname)
            .application_name("health-monitor")
    }

    async fn connect(&self, node: &NodeConfig) -> Result<PgConnection, ProbeError> {
        tokio::time::timeout(self.connect_timeout, self.connect_options(node).connect())
            .await
            .map_err(|_| ProbeError::Timeout(self.connect_timeout))?
            .map_err(|e| ProbeError::Connection(e.to_string()))
    }

    /// Run the probe queries on an open connection
    async fn inspect(conn: &mut PgConnection, node: &NodeConfig) -> Result<ProbeReport, ProbeError> {
        let in_recovery: bool = sqlx::query_scalar(IN_RECOVERY_SQL)
            .fetch_one(&mut *conn)
            .await?;

        // Statistics only matter for a node that is supposed to replicate
        if !in_recovery || node.role.is_primary() {
            debug!(role = %node.role, in_recovery, "Role check complete");
            return Ok(ProbeReport {
                in_recovery,
                replica: None,
            });
        }

        let replay_paused: bool = sqlx::query_scalar(REPLAY_PAUSED_SQL)
            .fetch_one(&mut *conn)
            .await?;

        let (is_sync, lag_seconds): (Option<bool>, f64) = sqlx::query_as(REPLICATION_STATS_SQL)
            .fetch_one(&mut *conn)
            .await?;

        Ok(ProbeReport::replica(ReplicaStats {
            replay_paused,
            // NULL when nothing has been received yet
            is_sync: is_sync.unwrap_or(false),
            lag_seconds,
        }))
    }
}

#[async_trait]
impl NodeProbe for PgProbe {
    async fn probe(&self, node: &NodeConfig) -> Result<ProbeReport, ProbeError> {
        let mut conn = self.connect(node).await?;

        let result = Self::inspect(&mut conn, node).await;

        // Close on every path; a dropped connection is closed as well if this
        // future is cancelled by the caller's timeout
        if let Err(e) = conn.close().await {
            debug!(host = %node.host, error = %e, "Error closing probe connection");
        }

        result
    }
}
