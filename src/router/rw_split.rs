//! Read-write split at the request boundary
//!
//! Reads (GET/HEAD) ask the read router for a role. Everything else goes to
//! the primary without consulting it.

use std::sync::Arc;

use crate::config::NodeRole;

use super::selector::{ReadRouter, RoutingDecision};

/// Read-write routing decision
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RouteTarget {
    /// Route to the primary (any mutating request)
    Primary,
    /// Route to a replica chosen by the read router
    Replica,
}

/// Read-write splitter
pub struct RwSplitter;

impl RwSplitter {
    /// Determine routing target from a request method
    pub fn route(method: &str) -> RouteTarget {
        if method.eq_ignore_ascii_case("GET") || method.eq_ignore_ascii_case("HEAD") {
            RouteTarget::Replica
        } else {
            RouteTarget::Primary
        }
    }

    /// Check if a request may be served by a replica
    pub fn can_use_replica(method: &str) -> bool {
        Self::route(method) == RouteTarget::Replica
    }
}

/// Connection role resolved for one request
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Resolution {
    pub role: NodeRole,
    /// Present only for reads; carries the router's diagnostics
    pub decision: Option<RoutingDecision>,
}

/// Request-facing entry point that applies the read-write split
#[derive(Clone)]
pub struct Dispatcher {
    router: Arc<ReadRouter>,
}

impl Dispatcher {
    pub fn new(router: Arc<ReadRouter>) -> Self {
        Self { router }
    }

    /// Resolve the connection role for a request method
    pub async fn resolve(&self, method: &str) -> Resolution {
        match RwSplitter::route(method) {
            RouteTarget::Replica => {
                let decision = self.router.decide().await;
                Resolution {
                    role: decision.role,
                    decision: Some(decision),
                }
            }
            RouteTarget::Primary => Resolution {
                role: NodeRole::Primary,
                decision: None,
            },
        }
    }
}
