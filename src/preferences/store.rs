//! Preference store trait and error types.

use async_trait::async_trait;
use serde_json::Value;

/// Error types for preference store operations
#[derive(Debug, thiserror::Error)]
pub enum PreferenceStoreError {
    /// Redis operation failed
    #[error("Redis error: {0}")]
    Redis(#[from] redis::RedisError),

    /// Stored document is not valid JSON
    #[error("Malformed preference document: {0}")]
    Malformed(#[from] serde_json::Error),
}

/// Remote lookup of raw preference documents.
///
/// One fetch per authentication attempt. `Ok(None)` means no document
/// exists for the identity; the caller treats that as a terminal
/// rejection for the attempt.
#[async_trait]
pub trait PreferenceStore: Send + Sync {
    /// Fetch the raw preference document for an identity.
    async fn fetch(
        &self,
        user_id: &str,
        company_id: &str,
        site_id: &str,
    ) -> Result<Option<Value>, PreferenceStoreError>;

    /// Backend name for health reporting
    fn backend_name(&self) -> &'static str;
}
