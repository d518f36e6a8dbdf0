//! Preference store factory

use std::sync::Arc;

use crate::config::PreferencesConfig;
use crate::redis::RedisPool;

use super::memory_store::MemoryPreferenceStore;
use super::redis_store::RedisPreferenceStore;
use super::store::PreferenceStore;

/// Create a preference store based on configuration.
///
/// Returns the backend named by the `backend` setting:
/// - `"redis"`: a `RedisPreferenceStore` if a Redis pool is provided
/// - `"memory"` (default): a `MemoryPreferenceStore`
pub fn create_preference_store(
    settings: &PreferencesConfig,
    redis_pool: Option<Arc<RedisPool>>,
) -> Arc<dyn PreferenceStore> {
    match settings.backend.as_str() {
        "redis" => {
            if let Some(pool) = redis_pool {
                tracing::info!(
                    backend = "redis",
                    prefix = %settings.key_prefix,
                    "Creating Redis preference store"
                );
                Arc::new(RedisPreferenceStore::new(pool, settings.key_prefix.clone()))
            } else {
                tracing::warn!(
                    "Redis preference backend requested but no pool provided, falling back to memory"
                );
                Arc::new(MemoryPreferenceStore::new())
            }
        }
        _ => {
            tracing::info!(backend = "memory", "Creating memory preference store");
            Arc::new(MemoryPreferenceStore::new())
        }
    }
}
