use async_trait::async_trait;
use bytes::Bytes;
use std::sync::Arc;

use super::{BlobStore, DocumentStore, StoreError};
use crate::domain::order::Order;

/// How a consumer pipeline persists an order.
///
/// Implementations must be idempotent by `orderId`: persisting the same order
/// any number of times, concurrently or not, leaves the store as a single
/// persist would.
#[async_trait]
pub trait StoreAdapter: Send + Sync {
    /// Short name used in logs and metrics.
    fn name(&self) -> &'static str;

    async fn persist(&self, order: &Order) -> Result<(), StoreError>;
}

/// Upserts `{id, customerName, items, status: "Processed"}` keyed by order id.
pub struct DocumentStoreAdapter {
    store: Arc<dyn DocumentStore>,
}

impl DocumentStoreAdapter {
    pub fn new(store: Arc<dyn DocumentStore>) -> Self {
        Self { store }
    }
}

#[async_trait]
impl StoreAdapter for DocumentStoreAdapter {
    fn name(&self) -> &'static str {
        "document_store"
    }

    async fn persist(&self, order: &Order) -> Result<(), StoreError> {
        let document = serde_json::to_value(order.to_processed_document())?;
        self.store.upsert(order.order_id(), &document).await
    }
}

/// Object key an order snapshot is written under.
pub fn object_key(order_id: &str) -> String {
    format!("order-{order_id}.json")
}

/// Overwrites `order-<orderId>.json` with the canonical order snapshot.
pub struct ObjectStoreAdapter {
    store: Arc<dyn BlobStore>,
}

impl ObjectStoreAdapter {
    pub fn new(store: Arc<dyn BlobStore>) -> Self {
        Self { store }
    }
}

#[async_trait]
impl StoreAdapter for ObjectStoreAdapter {
    fn name(&self) -> &'static str {
        "object_store"
    }

    async fn persist(&self, order: &Order) -> Result<(), StoreError> {
        let body = Bytes::from(order.to_canonical_json()?);
        self.store.put_object(&object_key(order.order_id()), body, true).await
    }
}
