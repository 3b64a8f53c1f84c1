use std::collections::HashSet;
use std::fmt;
use std::str::FromStr;
use std::time::Duration;

use serde::{Deserialize, Serialize};

use super::ConfigError;

#[derive(Debug, Clone, Deserialize)]
pub struct Config {
    /// Shared status store (Redis)
    #[serde(default)]
    pub store: StoreConfig,
    /// Credentials used by the health monitor to probe every node
    #[serde(default)]
    pub database: DatabaseConfig,
    /// Database nodes keyed by the role they are expected to play
    #[serde(default = "default_nodes")]
    pub nodes: Vec<NodeConfig>,
    #[serde(default)]
    pub monitor: MonitorConfig,
    #[serde(default)]
    pub router: RouterConfig,
    #[serde(default)]
    pub metrics: MetricsConfig,
}

// ============================================================================
// Node Roles
// ============================================================================

/// Connection role of a database node
///
/// Textual form is `primary` or `replica_<n>` (n >= 1). The same text is used
/// as the suffix of the status store key.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub enum NodeRole {
    Primary,
    Replica(u16),
}

impl NodeRole {
    pub fn is_primary(&self) -> bool {
        matches!(self, NodeRole::Primary)
    }

    pub fn is_replica(&self) -> bool {
        matches!(self, NodeRole::Replica(_))
    }
}

impl fmt::Display for NodeRole {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            NodeRole::Primary => f.write_str("primary"),
            NodeRole::Replica(n) => write!(f, "replica_{}", n),
        }
    }
}

impl FromStr for NodeRole {
    type Err = ConfigError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        if s == "primary" {
            return Ok(NodeRole::Primary);
        }
        let index = s
            .strip_prefix("replica_")
            .and_then(|n| n.parse::<u16>().ok())
            .filter(|n| *n >= 1)
            .ok_or_else(|| ConfigError::Invalid(format!("Unknown node role: {}", s)))?;
        Ok(NodeRole::Replica(index))
    }
}

impl TryFrom<String> for NodeRole {
    type Error = ConfigError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        value.parse()
    }
}

impl From<NodeRole> for String {
    fn from(role: NodeRole) -> Self {
        role.to_string()
    }
}

// ============================================================================
// Node / Database Configuration
// ============================================================================

/// A database node and the role it is expected to play
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct NodeConfig {
    pub role: NodeRole,
    pub host: String,
    /// Overrides `database.port` for this node
    #[serde(default)]
    pub port: Option<u16>,
}

impl NodeConfig {
    pub fn new(role: NodeRole, host: impl Into<String>) -> Self {
        Self {
            role,
            host: host.into(),
            port: None,
        }
    }
}

fn default_nodes() -> Vec<NodeConfig> {
    vec![
        NodeConfig::new(NodeRole::Primary, "postgres-primary"),
        NodeConfig::new(NodeRole::Replica(1), "postgres-replica1"),
        NodeConfig::new(NodeRole::Replica(2), "postgres-replica2"),
    ]
}

#[derive(Debug, Clone, Deserialize)]
pub struct DatabaseConfig {
    #[serde(default = "default_db_user")]
    pub user: String,
    #[serde(default = "default_db_password")]
    pub password: String,
    #[serde(default = "default_db_name")]
    pub dbname: String,
    #[serde(default = "default_db_port")]
    pub port: u16,
}

fn default_db_user() -> String {
    "postgres".to_string()
}

fn default_db_password() -> String {
    "password".to_string()
}

fn default_db_name() -> String {
    "app_development".to_string()
}

fn default_db_port() -> u16 {
    5432
}

impl Default for DatabaseConfig {
    fn default() -> Self {
        Self {
            user: default_db_user(),
            password: default_db_password(),
            dbname: default_db_name(),
            port: default_db_port(),
        }
    }
}

// ============================================================================
// Status Store Configuration
// ============================================================================

#[derive(Debug, Clone, Deserialize)]
pub struct StoreConfig {
    #[serde(default = "default_store_url")]
    pub url: String,
    /// Prefix prepended to the node role to build a status key
    #[serde(default = "default_key_prefix")]
    pub key_prefix: String,
    #[serde(default = "default_store_timeout_ms")]
    pub connect_timeout_ms: u64,
    #[serde(default = "default_store_timeout_ms")]
    pub response_timeout_ms: u64,
}

fn default_store_url() -> String {
    "redis://localhost:6379/0".to_string()
}

fn default_key_prefix() -> String {
    "db_status:".to_string()
}

fn default_store_timeout_ms() -> u64 {
    100
}

impl Default for StoreConfig {
    fn default() -> Self {
        Self {
            url: default_store_url(),
            key_prefix: default_key_prefix(),
            connect_timeout_ms: default_store_timeout_ms(),
            response_timeout_ms: default_store_timeout_ms(),
        }
    }
}

impl StoreConfig {
    pub fn connect_timeout(&self) -> Duration {
        Duration::from_millis(self.connect_timeout_ms)
    }

    pub fn response_timeout(&self) -> Duration {
        Duration::from_millis(self.response_timeout_ms)
    }
}

// ============================================================================
// Health Monitor Configuration
// ============================================================================

#[derive(Debug, Clone, Deserialize)]
pub struct MonitorConfig {
    /// Sleep between probe cycles (milliseconds)
    #[serde(default = "default_check_interval_ms")]
    pub check_interval_ms: u64,
    /// Connect timeout for a probe connection (milliseconds)
    #[serde(default = "default_connect_timeout_ms")]
    pub connect_timeout_ms: u64,
    /// Upper bound for a whole probe, connect included (milliseconds)
    #[serde(default = "default_check_timeout_ms")]
    pub check_timeout_ms: u64,
    /// Replicas lagging more than this are unhealthy (milliseconds)
    #[serde(default = "default_max_lag_ms")]
    pub max_lag_ms: u64,
}

fn default_check_interval_ms() -> u64 {
    5000
}

fn default_connect_timeout_ms() -> u64 {
    2000
}

fn default_check_timeout_ms() -> u64 {
    3000
}

fn default_max_lag_ms() -> u64 {
    1000
}

impl Default for MonitorConfig {
    fn default() -> Self {
        Self {
            check_interval_ms: default_check_interval_ms(),
            connect_timeout_ms: default_connect_timeout_ms(),
            check_timeout_ms: default_check_timeout_ms(),
            max_lag_ms: default_max_lag_ms(),
        }
    }
}

impl MonitorConfig {
    pub fn check_interval(&self) -> Duration {
        Duration::from_millis(self.check_interval_ms)
    }

    pub fn connect_timeout(&self) -> Duration {
        Duration::from_millis(self.connect_timeout_ms)
    }

    pub fn check_timeout(&self) -> Duration {
        Duration::from_millis(self.check_timeout_ms)
    }
}

// ============================================================================
// Read Router Configuration
// ============================================================================

#[derive(Debug, Clone, Deserialize)]
pub struct RouterConfig {
    /// How long a fetched healthy set is reused (milliseconds)
    #[serde(default = "default_cache_ttl_ms")]
    pub cache_ttl_ms: u64,
    /// How long the store is skipped after a failure (milliseconds)
    #[serde(default = "default_circuit_cooldown_ms")]
    pub circuit_cooldown_ms: u64,
    /// Upper bound for one store round trip (milliseconds)
    #[serde(default = "default_store_timeout_ms")]
    pub store_timeout_ms: u64,
}

fn default_cache_ttl_ms() -> u64 {
    2000
}

fn default_circuit_cooldown_ms() -> u64 {
    10_000
}

impl Default for RouterConfig {
    fn default() -> Self {
        Self {
            cache_ttl_ms: default_cache_ttl_ms(),
            circuit_cooldown_ms: default_circuit_cooldown_ms(),
            store_timeout_ms: default_store_timeout_ms(),
        }
    }
}

impl RouterConfig {
    pub fn cache_ttl(&self) -> Duration {
        Duration::from_millis(self.cache_ttl_ms)
    }

    pub fn circuit_cooldown(&self) -> Duration {
        Duration::from_millis(self.circuit_cooldown_ms)
    }

    pub fn store_timeout(&self) -> Duration {
        Duration::from_millis(self.store_timeout_ms)
    }
}

// ============================================================================
// Metrics Configuration
// ============================================================================

#[derive(Debug, Clone, Deserialize)]
pub struct MetricsConfig {
    /// Serve `/metrics` from the health monitor process
    #[serde(default)]
    pub enabled: bool,
    #[serde(default = "default_metrics_addr")]
    pub listen_addr: String,
}

fn default_metrics_addr() -> String {
    "0.0.0.0:9464".to_string()
}

impl Default for MetricsConfig {
    fn default() -> Self {
        Self {
            enabled: false,
            listen_addr: default_metrics_addr(),
        }
    }
}

impl Default for Config {
    fn default() -> Self {
        Self {
            store: StoreConfig::default(),
            database: DatabaseConfig::default(),
            nodes: default_nodes(),
            monitor: MonitorConfig::default(),
            router: RouterConfig::default(),
            metrics: MetricsConfig::default(),
        }
    }
}

impl Config {
    /// Apply overrides from the process environment
    pub fn apply_env_overrides(&mut self) {
        self.apply_overrides(|key| std::env::var(key).ok());
    }

    /// Apply overrides from an arbitrary variable lookup
    ///
    /// Recognized keys: `REDIS_URL`, `PRIMARY_DB_HOST`, `REPLICA<N>_DB_HOST`,
    /// `DB_USER`, `DB_PASSWORD`, `DB_NAME`.
    pub fn apply_overrides<F>(&mut self, lookup: F)
    where
        F: Fn(&str) -> Option<String>,
    {
        if let Some(url) = lookup("REDIS_URL") {
            self.store.url = url;
        }
        if let Some(user) = lookup("DB_USER") {
            self.database.user = user;
        }
        if let Some(password) = lookup("DB_PASSWORD") {
            self.database.password = password;
        }
        if let Some(dbname) = lookup("DB_NAME") {
            self.database.dbname = dbname;
        }
        for node in &mut self.nodes {
            let key = match node.role {
                NodeRole::Primary => "PRIMARY_DB_HOST".to_string(),
                NodeRole::Replica(n) => format!("REPLICA{}_DB_HOST", n),
            };
            if let Some(host) = lookup(&key) {
                node.host = host;
            }
        }
    }

    /// Check topology invariants: one primary, at least one replica, no duplicate roles
    pub fn validate(&self) -> Result<(), ConfigError> {
        let mut seen = HashSet::new();
        for node in &self.nodes {
            if !seen.insert(node.role) {
                return Err(ConfigError::Invalid(format!("Duplicate node role: {}", node.role)));
            }
        }

        let primaries = self.nodes.iter().filter(|n| n.role.is_primary()).count();
        if primaries != 1 {
            return Err(ConfigError::Invalid(format!(
                "Expected exactly one primary node, found {}",
                primaries
            )));
        }
        if self.replicas().is_empty() {
            return Err(ConfigError::Invalid("No replica nodes configured".into()));
        }
        Ok(())
    }

    /// Configured replica roles in declaration order
    pub fn replicas(&self) -> Vec<NodeRole> {
        self.nodes
            .iter()
            .map(|n| n.role)
            .filter(NodeRole::is_replica)
            .collect()
    }

    /// Effective port for a node
    pub fn port_for(&self, node: &NodeConfig) -> u16 {
        node.port.unwrap_or(self.database.port)
    }
}
