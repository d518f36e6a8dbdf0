//! In-memory preference store backend using DashMap.
//!
//! Used as the fallback backend and by tests. Documents are keyed by the
//! full identity triple and lost on restart.

use async_trait::async_trait;
use dashmap::DashMap;
use serde_json::Value;

use super::store::{PreferenceStore, PreferenceStoreError};

/// In-memory preference store backend.
#[derive(Default)]
pub struct MemoryPreferenceStore {
    /// identity key -> raw preference document
    documents: DashMap<String, Value>,
}

impl MemoryPreferenceStore {
    pub fn new() -> Self {
        Self {
            documents: DashMap::new(),
        }
    }

    fn key(user_id: &str, company_id: &str, site_id: &str) -> String {
        format!("{}:{}:{}", company_id, site_id, user_id)
    }

    /// Seed a preference document for an identity.
    pub fn insert(&self, user_id: &str, company_id: &str, site_id: &str, document: Value) {
        self.documents
            .insert(Self::key(user_id, company_id, site_id), document);
    }

    /// Remove the document for an identity.
    pub fn remove(&self, user_id: &str, company_id: &str, site_id: &str) {
        self.documents.remove(&Self::key(user_id, company_id, site_id));
    }

    pub fn len(&self) -> usize {
        self.documents.len()
    }

    pub fn is_empty(&self) -> bool {
        self.documents.is_empty()
    }
}

#[async_trait]
impl PreferenceStore for MemoryPreferenceStore {
    async fn fetch(
        &self,
        user_id: &str,
        company_id: &str,
        site_id: &str,
    ) -> Result<Option<Value>, PreferenceStoreError> {
        let document = self
            .documents
            .get(&Self::key(user_id, company_id, site_id))
            .map(|entry| entry.value().clone())
            .filter(|doc| !doc.is_null());

        Ok(document)
    }

    fn backend_name(&self) -> &'static str {
        "memory"
    }
}
