//! Redis connection pool for the preference store backend.
//!
//! Manages a lazily-established multiplexed connection shared across tasks.

use redis::aio::MultiplexedConnection;
use redis::{Client, RedisError};
use tokio::sync::RwLock;

/// Redis connection pool for data operations.
///
/// Holds a single multiplexed connection suitable for command traffic.
/// The connection is established on first use and re-established after
/// `reset` is called following an error.
pub struct RedisPool {
    /// Redis client for creating connections
    client: Client,

    /// Multiplexed connection (shared across tasks)
    connection: RwLock<Option<MultiplexedConnection>>,
}

impl RedisPool {
    /// Create a new Redis pool. Does not connect yet.
    pub fn new(url: &str) -> Result<Self, RedisError> {
        let client = Client::open(url)?;

        Ok(Self {
            client,
            connection: RwLock::new(None),
        })
    }

    /// Get a connection from the pool, establishing one if none exists.
    pub async fn get_connection(&self) -> Result<MultiplexedConnection, RedisError> {
        {
            let conn = self.connection.read().await;
            if let Some(ref c) = *conn {
                return Ok(c.clone());
            }
        }

        self.connect().await
    }

    /// Establish a new connection.
    async fn connect(&self) -> Result<MultiplexedConnection, RedisError> {
        let mut conn_guard = self.connection.write().await;

        // Another task may have connected while we waited for the write lock
        if let Some(ref c) = *conn_guard {
            return Ok(c.clone());
        }

        let conn = self.client.get_multiplexed_async_connection().await?;
        tracing::info!("Redis connection established");
        *conn_guard = Some(conn.clone());
        Ok(conn)
    }

    /// Drop the cached connection so the next use reconnects.
    pub async fn reset(&self) {
        let mut conn_guard = self.connection.write().await;
        *conn_guard = None;
        tracing::debug!("Redis connection reset");
    }
}
