//! Read router: healthy replica selection
//!
//! Each decision resolves the healthy replica set from, in order of
//! preference:
//! 1. The in-process cache, while younger than the cache TTL
//! 2. All configured replicas, while the circuit breaker is open
//! 3. The status store (a failure opens the breaker and falls back to 2)
//!
//! and then picks one role round-robin, or the primary when the set is empty.

use std::sync::Arc;
use std::time::Duration;

use thiserror::Error;
use tokio::sync::Mutex;
use tokio::time::Instant;
use tracing::{debug, error};

use crate::circuit::{CircuitBreaker, CircuitState};
use crate::config::{Config, NodeRole, RouterConfig};
use crate::health::is_healthy_value;
use crate::metrics::metrics;
use crate::store::{status_key, StatusStore, StoreError};

/// Startup-time router misconfiguration
#[derive(Debug, Error)]
pub enum RouterError {
    #[error("No replicas configured")]
    NoReplicas,
    #[error("Replica set must not contain {0}")]
    NotAReplica(NodeRole),
}

/// Where the healthy set for a decision came from
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RouteSource {
    /// Fresh in-process cache; no store call
    Cache,
    /// Status store fetch
    Store,
    /// Status store fetch failed; all replicas assumed healthy
    StoreFailed,
    /// Circuit breaker open; store skipped and all replicas assumed healthy
    CircuitOpen,
}

impl RouteSource {
    pub fn as_str(&self) -> &'static str {
        match self {
            RouteSource::Cache => "cache",
            RouteSource::Store => "store",
            RouteSource::StoreFailed => "store_failed",
            RouteSource::CircuitOpen => "circuit_open",
        }
    }
}

/// Outcome of one routing decision
///
/// Besides the role, carries diagnostics for the caller: which path was taken
/// and how long the store round trip took, if there was one.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RoutingDecision {
    pub role: NodeRole,
    pub source: RouteSource,
    pub healthy_roles: Vec<NodeRole>,
    pub store_latency: Option<Duration>,
}

impl RoutingDecision {
    pub fn store_latency_ms(&self) -> Option<f64> {
        self.store_latency.map(|d| d.as_secs_f64() * 1000.0)
    }

    /// Whether reads fell back to the primary because no replica is healthy
    pub fn is_primary_fallback(&self) -> bool {
        self.role.is_primary()
    }
}

/// Round-robin position over a candidate list whose size may change
#[derive(Debug, Default)]
pub struct RoundRobinCursor {
    next: usize,
}

impl RoundRobinCursor {
    pub fn new() -> Self {
        Self::default()
    }

    /// Pick the role at the cursor and advance, normalizing against the
    /// current list length
    ///
    /// A fresh cursor starts at the first role. Returns None if the list is
    /// empty
    pub fn select(&mut self, roles: &[NodeRole]) -> Option<NodeRole> {
        if roles.is_empty() {
            return None;
        }
        let idx = self.next % roles.len();
        self.next = (idx + 1) % roles.len();
        Some(roles[idx])
    }
}

/// Healthy set reused until the TTL elapses
#[derive(Debug)]
struct RoutingCache {
    healthy_roles: Vec<NodeRole>,
    fetched_at: Instant,
}

#[derive(Debug)]
struct RouterState {
    cache: Option<RoutingCache>,
    cursor: RoundRobinCursor,
    circuit: CircuitBreaker,
}

/// Read router
///
/// One instance per process, shared behind an `Arc`. All mutable state lives
/// behind a single lock held for the whole decision, so cache refreshes and
/// breaker transitions are atomic relative to concurrent callers. The store
/// is contacted at most once per TTL window, so the occasional wait is bounded
/// by `store_timeout`.
pub struct ReadRouter {
    store: Arc<dyn StatusStore>,
    replicas: Vec<NodeRole>,
    keys: Vec<String>,
    config: RouterConfig,
    state: Mutex<RouterState>,
}

impl ReadRouter {
    pub fn new(
        replicas: Vec<NodeRole>,
        key_prefix: &str,
        config: RouterConfig,
        store: Arc<dyn StatusStore>,
    ) -> Result<Self, RouterError> {
        if replicas.is_empty() {
            return Err(RouterError::NoReplicas);
        }
        if let Some(role) = replicas.iter().find(|r| !r.is_replica()) {
            return Err(RouterError::NotAReplica(*role));
        }

        let keys = replicas
            .iter()
            .map(|role| status_key(key_prefix, *role))
            .collect();
        let state = RouterState {
            cache: None,
            cursor: RoundRobinCursor::new(),
            circuit: CircuitBreaker::new(config.circuit_cooldown()),
        };

        Ok(Self {
            store,
            replicas,
            keys,
            config,
            state: Mutex::new(state),
        })
    }

    pub fn from_config(config: &Config, store: Arc<dyn StatusStore>) -> Result<Self, RouterError> {
        Self::new(
            config.replicas(),
            &config.store.key_prefix,
            config.router.clone(),
            store,
        )
    }

    /// Configured replica roles
    pub fn replicas(&self) -> &[NodeRole] {
        &self.replicas
    }

    pub fn cache_ttl(&self) -> Duration {
        self.config.cache_ttl()
    }

    /// Pick the role to serve one read
    ///
    /// Never fails: store outages, malformed records and an all-unhealthy
    /// replica set all resolve to a concrete role.
    pub async fn decide(&self) -> RoutingDecision {
        let mut state = self.state.lock().await;
        let now = Instant::now();

        let fresh = state
            .cache
            .as_ref()
            .filter(|cache| now.duration_since(cache.fetched_at) < self.config.cache_ttl())
            .map(|cache| cache.healthy_roles.clone());

        let (healthy_roles, source, store_latency) = if let Some(roles) = fresh {
            (roles, RouteSource::Cache, None)
        } else if state.circuit.is_open(now) {
            if let CircuitState::Open { remaining } = state.circuit.state(now) {
                debug!(
                    remaining_ms = remaining.as_millis() as u64,
                    "Circuit open, skipping status store"
                );
            }
            (self.replicas.clone(), RouteSource::CircuitOpen, None)
        } else {
            let started = Instant::now();
            let result = self.fetch_healthy().await;
            let elapsed = started.elapsed();
            match result {
                Ok(roles) => (roles, RouteSource::Store, Some(elapsed)),
                Err(e) => {
                    state.circuit.trip(Instant::now());
                    metrics().record_circuit_opened();
                    error!(
                        error = %e,
                        cooldown_ms = state.circuit.cooldown().as_millis() as u64,
                        "Status store unavailable, circuit opened; routing to all replicas"
                    );
                    (self.replicas.clone(), RouteSource::StoreFailed, Some(elapsed))
                }
            }
        };

        if source != RouteSource::Cache {
            state.cache = Some(RoutingCache {
                healthy_roles: healthy_roles.clone(),
                fetched_at: Instant::now(),
            });
        }

        let role = state
            .cursor
            .select(&healthy_roles)
            .unwrap_or(NodeRole::Primary);
        drop(state);

        let decision = RoutingDecision {
            role,
            source,
            healthy_roles,
            store_latency,
        };

        metrics().record_decision(source.as_str(), &role.to_string(), store_latency);
        debug!(
            role = %role,
            source = source.as_str(),
            healthy = ?decision.healthy_roles,
            store_latency_ms = ?decision.store_latency_ms(),
            "Selected read role"
        );

        decision
    }

    /// Read every replica's record and keep those reporting healthy
    ///
    /// Missing and malformed records count as unhealthy.
    async fn fetch_healthy(&self) -> Result<Vec<NodeRole>, StoreError> {
        let timeout = self.config.store_timeout();
        let values = tokio::time::timeout(timeout, self.store.get_many(&self.keys))
            .await
            .map_err(|_| StoreError::Timeout(timeout))??;

        Ok(self
            .replicas
            .iter()
            .zip(values)
            .filter(|(_, value)| value.as_deref().is_some_and(is_healthy_value))
            .map(|(role, _)| *role)
            .collect())
    }
}
