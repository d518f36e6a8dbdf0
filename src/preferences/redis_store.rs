//! Redis preference store backend.
//!
//! Documents live under `{prefix}:{company}:{site}:{user}` as JSON strings,
//! written there by the provisioning pipeline that owns user preferences.

use std::sync::Arc;

use async_trait::async_trait;
use redis::AsyncCommands;
use serde_json::Value;

use crate::redis::RedisPool;

use super::store::{PreferenceStore, PreferenceStoreError};

pub struct RedisPreferenceStore {
    pool: Arc<RedisPool>,
    key_prefix: String,
}

impl RedisPreferenceStore {
    pub fn new(pool: Arc<RedisPool>, key_prefix: String) -> Self {
        Self { pool, key_prefix }
    }

    fn key(&self, user_id: &str, company_id: &str, site_id: &str) -> String {
        format!("{}:{}:{}:{}", self.key_prefix, company_id, site_id, user_id)
    }
}

#[async_trait]
impl PreferenceStore for RedisPreferenceStore {
    async fn fetch(
        &self,
        user_id: &str,
        company_id: &str,
        site_id: &str,
    ) -> Result<Option<Value>, PreferenceStoreError> {
        let key = self.key(user_id, company_id, site_id);

        let mut conn = match self.pool.get_connection().await {
            Ok(conn) => conn,
            Err(e) => {
                self.pool.reset().await;
                return Err(e.into());
            }
        };

        let raw: Option<String> = match conn.get(&key).await {
            Ok(raw) => raw,
            Err(e) => {
                // Force a reconnect on the next lookup
                self.pool.reset().await;
                return Err(e.into());
            }
        };

        let raw = match raw {
            Some(raw) => raw,
            None => return Ok(None),
        };

        let document: Value = serde_json::from_str(&raw)?;
        if document.is_null() {
            return Ok(None);
        }

        tracing::debug!(key = %key, "Fetched preference document");
        Ok(Some(document))
    }

    fn backend_name(&self) -> &'static str {
        "redis"
    }
}
