// ============================================================================
// Store Layer
// ============================================================================
//
// Narrow persistence contracts consumed by the consumer pipelines:
//
// - DocumentStore: idempotent create-or-replace of a JSON document by key
// - BlobStore:     create-or-replace of a byte object by key
//
// StoreAdapter binds an Order to one of them (see adapters.rs). Backends are
// constructed once at startup and shared behind `Arc<dyn ...>`.
//
// ============================================================================

mod adapters;
mod blob;
mod errors;
mod memory;
mod scylla_store;

use async_trait::async_trait;
use bytes::Bytes;
use std::sync::Arc;

pub use adapters::{object_key, DocumentStoreAdapter, ObjectStoreAdapter, StoreAdapter};
pub use blob::ObjectStoreBlobs;
pub use errors::StoreError;
pub use memory::MemoryDocumentStore;
pub use scylla_store::ScyllaDocumentStore;

use crate::config::{DocumentBackend, DocumentStoreConfig, ObjectStoreConfig};
use crate::utils::{retry_on_transient, RetryConfig};

/// JSON document as handed to a document store.
pub type Document = serde_json::Value;

#[async_trait]
pub trait DocumentStore: Send + Sync {
    /// Create or replace the document stored under `key`.
    async fn upsert(&self, key: &str, document: &Document) -> Result<(), StoreError>;

    async fn fetch(&self, key: &str) -> Result<Option<Document>, StoreError>;
}

#[async_trait]
pub trait BlobStore: Send + Sync {
    /// Write `body` under `key`. With `overwrite` an existing object is
    /// replaced; without it the call fails with `StoreError::AlreadyExists`.
    async fn put_object(&self, key: &str, body: Bytes, overwrite: bool) -> Result<(), StoreError>;

    async fn get_object(&self, key: &str) -> Result<Option<Bytes>, StoreError>;
}

/// Build the configured document store, waiting for it to come up.
pub async fn connect_document_store(config: &DocumentStoreConfig) -> anyhow::Result<Arc<dyn DocumentStore>> {
    match config.backend {
        DocumentBackend::Memory => {
            tracing::warn!("Using in-memory document store; records are lost on exit");
            Ok(Arc::new(MemoryDocumentStore::new()))
        }
        DocumentBackend::Scylla => {
            tracing::info!(nodes = ?config.nodes, keyspace = %config.database, "Connecting to ScyllaDB");
            let store = retry_on_transient(RetryConfig::startup(), |_| ScyllaDocumentStore::connect(config))
                .await
                .into_result()?;
            Ok(Arc::new(store))
        }
    }
}

/// Build the configured object store and make sure its container is usable.
pub async fn connect_blob_store(config: &ObjectStoreConfig) -> anyhow::Result<Arc<dyn BlobStore>> {
    let blobs = ObjectStoreBlobs::from_config(config)?;
    tracing::info!(backend = ?config.backend, container = %config.container, "Ensuring object store container");
    retry_on_transient(RetryConfig::startup(), |_| blobs.ensure_container())
        .await
        .into_result()?;
    Ok(Arc::new(blobs))
}
