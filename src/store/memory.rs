use async_trait::async_trait;
use std::collections::HashMap;
use tokio::sync::RwLock;

use super::{Document, DocumentStore, StoreError};

/// Process-local document store, for development and tests.
///
/// Documents are kept in their serialized form so callers can compare stored
/// bytes across repeated writes.
#[derive(Default)]
pub struct MemoryDocumentStore {
    documents: RwLock<HashMap<String, String>>,
}

impl MemoryDocumentStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Serialized document stored under `key`.
    pub async fn raw(&self, key: &str) -> Option<String> {
        self.documents.read().await.get(key).cloned()
    }

    pub async fn len(&self) -> usize {
        self.documents.read().await.len()
    }
}

#[async_trait]
impl DocumentStore for MemoryDocumentStore {
    async fn upsert(&self, key: &str, document: &Document) -> Result<(), StoreError> {
        let body = serde_json::to_string(document)?;
        self.documents.write().await.insert(key.to_string(), body);
        Ok(())
    }

    async fn fetch(&self, key: &str) -> Result<Option<Document>, StoreError> {
        match self.documents.read().await.get(key) {
            Some(body) => Ok(Some(serde_json::from_str(body)?)),
            None => Ok(None),
        }
    }
}
