//! Redis-backed status store

use std::future::Future;
use std::time::Duration;

use ::redis::aio::MultiplexedConnection;
use ::redis::{AsyncCommands, Client, RedisResult};
use async_trait::async_trait;
use tokio::sync::Mutex;
use tracing::{debug, info};

use super::{StatusStore, StoreError};
use crate::config::StoreConfig;

/// Status store backed by a single multiplexed Redis connection
///
/// The connection is opened lazily and cached. Any failed or timed-out
/// command drops the cached handle so the next call reconnects from scratch.
pub struct RedisStore {
    client: Client,
    conn: Mutex<Option<MultiplexedConnection>>,
    connect_timeout: Duration,
    response_timeout: Duration,
}

impl RedisStore {
    pub fn new(config: &StoreConfig) -> Result<Self, StoreError> {
        let client =
            Client::open(config.url.as_str()).map_err(|e| StoreError::Connection(e.to_string()))?;
        Ok(Self {
            client,
            conn: Mutex::new(None),
            connect_timeout: config.connect_timeout(),
            response_timeout: config.response_timeout(),
        })
    }

    /// Get the cached connection or open a new one
    async fn connection(&self) -> Result<MultiplexedConnection, StoreError> {
        let mut guard = self.conn.lock().await;
        if let Some(conn) = guard.as_ref() {
            return Ok(conn.clone());
        }

        let conn = tokio::time::timeout(
            self.connect_timeout,
            self.client.get_multiplexed_async_connection(),
        )
        .await
        .map_err(|_| StoreError::Timeout(self.connect_timeout))?
        .map_err(|e| StoreError::Connection(e.to_string()))?;

        info!("Connected to status store");
        *guard = Some(conn.clone());
        Ok(conn)
    }

    /// Run a command under the response timeout, dropping the connection on failure
    async fn bounded<T, F>(&self, fut: F) -> Result<T, StoreError>
    where
        F: Future<Output = RedisResult<T>>,
    {
        let result = match tokio::time::timeout(self.response_timeout, fut).await {
            Ok(Ok(value)) => Ok(value),
            Ok(Err(e)) => Err(StoreError::Command(e.to_string())),
            Err(_) => Err(StoreError::Timeout(self.response_timeout)),
        };

        if result.is_err() {
            self.reset().await;
        }
        result
    }
}

#[async_trait]
impl StatusStore for RedisStore {
    async fn get(&self, key: &str) -> Result<Option<String>, StoreError> {
        let mut conn = self.connection().await?;
        self.bounded(conn.get::<_, Option<String>>(key)).await
    }

    async fn get_many(&self, keys: &[String]) -> Result<Vec<Option<String>>, StoreError> {
        if keys.is_empty() {
            return Ok(Vec::new());
        }
        let mut conn = self.connection().await?;
        let values: Vec<Option<String>> = self.bounded(conn.mget(keys)).await?;
        if values.len() != keys.len() {
            return Err(StoreError::Command(format!(
                "MGET returned {} values for {} keys",
                values.len(),
                keys.len()
            )));
        }
        Ok(values)
    }

    async fn set(&self, key: &str, value: &str) -> Result<(), StoreError> {
        let mut conn = self.connection().await?;
        self.bounded(conn.set::<_, _, ()>(key, value)).await
    }

    async fn reset(&self) {
        if self.conn.lock().await.take().is_some() {
            debug!("Dropped status store connection");
        }
    }
}
