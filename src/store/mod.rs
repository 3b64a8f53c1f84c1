//! Shared status store
//!
//! The health monitor publishes one record per node role and the read router
//! consumes them. The two never talk directly; this key/value store is the
//! only channel between them.
//!
//! - `RedisStore`: production backend with bounded connect/response times
//! - `MemoryStore`: in-process backend for local runs and tests

mod memory;
mod redis;

pub use self::memory::MemoryStore;
pub use self::redis::RedisStore;

use std::time::Duration;

use async_trait::async_trait;
use thiserror::Error;

use crate::config::NodeRole;

/// Error talking to the status store
#[derive(Debug, Error)]
pub enum StoreError {
    #[error("Connection failed: {0}")]
    Connection(String),
    #[error("Command failed: {0}")]
    Command(String),
    #[error("Timed out after {0:?}")]
    Timeout(Duration),
}

/// Key/value access to the shared status store
///
/// No expiry is ever set by writers. A missing key is `Ok(None)`, not an error.
#[async_trait]
pub trait StatusStore: Send + Sync {
    async fn get(&self, key: &str) -> Result<Option<String>, StoreError>;

    /// Fetch several keys in one round trip where the backend supports it
    ///
    /// The result has one slot per requested key, in order.
    async fn get_many(&self, keys: &[String]) -> Result<Vec<Option<String>>, StoreError> {
        let mut values = Vec::with_capacity(keys.len());
        for key in keys {
            values.push(self.get(key).await?);
        }
        Ok(values)
    }

    async fn set(&self, key: &str, value: &str) -> Result<(), StoreError>;

    /// Drop any cached connection so the next call reconnects
    async fn reset(&self) {}
}

/// Build the status key for a node role, e.g. `db_status:replica_1`
pub fn status_key(prefix: &str, role: NodeRole) -> String {
    format!("{}{}", prefix, role)
}
