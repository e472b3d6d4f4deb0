use async_trait::async_trait;
use futures_util::FutureExt;
use std::any::Any;
use std::panic::AssertUnwindSafe;
use std::sync::Arc;
use std::time::Instant;

use super::PipelineError;
use crate::domain::order::{validate, Order};
use crate::messaging::{DeliveryMetadata, Disposition, MessageHandler};
use crate::metrics::Metrics;
use crate::store::StoreAdapter;

/// Turns one delivered message into one persisted order.
///
/// Holds no state between invocations, so the same pipeline may be driven by
/// any number of workers at once.
pub struct ConsumerPipeline<A> {
    subscription: String,
    adapter: A,
    metrics: Option<Arc<Metrics>>,
}

impl<A: StoreAdapter> ConsumerPipeline<A> {
    pub fn new(subscription: impl Into<String>, adapter: A) -> Self {
        Self {
            subscription: subscription.into(),
            adapter,
            metrics: None,
        }
    }

    pub fn with_metrics(mut self, metrics: Arc<Metrics>) -> Self {
        self.metrics = Some(metrics);
        self
    }

    pub async fn process(&self, raw: &[u8]) -> Result<Order, PipelineError> {
        let value: serde_json::Value = serde_json::from_slice(raw).map_err(PipelineError::MalformedMessage)?;
        let order = validate(&value)?;
        self.adapter.persist(&order).await?;
        Ok(order)
    }

    fn classify(&self, result: Result<Order, PipelineError>, meta: &DeliveryMetadata) -> Disposition {
        match result {
            Ok(order) => {
                tracing::info!(
                    subscription = %self.subscription,
                    store = self.adapter.name(),
                    order_id = %order.order_id(),
                    delivery_count = meta.delivery_count,
                    "Order persisted"
                );
                Disposition::Completed
            }
            Err(e) if e.is_poison() => {
                tracing::error!(
                    subscription = %self.subscription,
                    partition = meta.partition,
                    offset = meta.offset,
                    kind = e.kind(),
                    error = %e,
                    poison = true,
                    "Rejecting message"
                );
                Disposition::DeadLetter { reason: e.to_string() }
            }
            Err(e) => {
                tracing::warn!(
                    subscription = %self.subscription,
                    partition = meta.partition,
                    offset = meta.offset,
                    delivery_count = meta.delivery_count,
                    kind = e.kind(),
                    error = %e,
                    poison = false,
                    "Message handling failed, will be redelivered"
                );
                Disposition::Redeliver { reason: e.to_string() }
            }
        }
    }
}

fn panic_message(payload: Box<dyn Any + Send>) -> String {
    if let Some(s) = payload.downcast_ref::<&str>() {
        s.to_string()
    } else if let Some(s) = payload.downcast_ref::<String>() {
        s.clone()
    } else {
        "handler panicked".to_string()
    }
}

#[async_trait]
impl<A: StoreAdapter> MessageHandler for ConsumerPipeline<A> {
    async fn on_message(&self, raw: &[u8], meta: &DeliveryMetadata) -> Disposition {
        let started = Instant::now();

        let result = AssertUnwindSafe(self.process(raw))
            .catch_unwind()
            .await
            .unwrap_or_else(|payload| Err(PipelineError::Unexpected(panic_message(payload))));
        let disposition = self.classify(result, meta);

        if let Some(ref metrics) = self.metrics {
            metrics.record_handled(&self.subscription, disposition.outcome(), started.elapsed().as_secs_f64());
        }
        disposition
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::{
        BlobStore, DocumentStore, DocumentStoreAdapter, MemoryDocumentStore, ObjectStoreAdapter, ObjectStoreBlobs,
        StoreError,
    };
    use serde_json::json;
    use std::sync::atomic::{AtomicUsize, Ordering};

    fn message(id: &str, customer: &str) -> Vec<u8> {
        serde_json::to_vec(&json!({"orderId": id, "customerName": customer, "items": [{"sku": "A-1", "qty": 2}]}))
            .unwrap()
    }

    fn meta(subscription: &str) -> DeliveryMetadata {
        DeliveryMetadata::first_delivery(subscription)
    }

    fn document_pipeline() -> (ConsumerPipeline<DocumentStoreAdapter>, Arc<MemoryDocumentStore>) {
        let store = Arc::new(MemoryDocumentStore::new());
        let pipeline = ConsumerPipeline::new("subscription1", DocumentStoreAdapter::new(store.clone()));
        (pipeline, store)
    }

    fn object_pipeline() -> (ConsumerPipeline<ObjectStoreAdapter>, Arc<ObjectStoreBlobs>) {
        let blobs = Arc::new(ObjectStoreBlobs::in_memory());
        let pipeline = ConsumerPipeline::new("subscription2", ObjectStoreAdapter::new(blobs.clone()));
        (pipeline, blobs)
    }

    /// Fails every write; counts attempts.
    #[derive(Default)]
    struct UnavailableAdapter {
        attempts: AtomicUsize,
    }

    #[async_trait]
    impl StoreAdapter for UnavailableAdapter {
        fn name(&self) -> &'static str {
            "unavailable"
        }

        async fn persist(&self, _order: &Order) -> Result<(), StoreError> {
            self.attempts.fetch_add(1, Ordering::SeqCst);
            Err(StoreError::Unavailable("connection refused".to_string()))
        }
    }

    struct PanickingAdapter;

    #[async_trait]
    impl StoreAdapter for PanickingAdapter {
        fn name(&self) -> &'static str {
            "panicking"
        }

        async fn persist(&self, _order: &Order) -> Result<(), StoreError> {
            panic!("adapter bug")
        }
    }

    #[tokio::test]
    async fn test_document_pipeline_writes_processed_record() {
        let (pipeline, store) = document_pipeline();

        let disposition = pipeline.on_message(&message("O1", "Alice"), &meta("subscription1")).await;

        assert_eq!(disposition, Disposition::Completed);
        assert_eq!(
            store.fetch("O1").await.unwrap(),
            Some(json!({
                "id": "O1",
                "customerName": "Alice",
                "items": [{"sku": "A-1", "qty": 2}],
                "status": "Processed"
            }))
        );
    }

    #[tokio::test]
    async fn test_document_redelivery_leaves_identical_bytes() {
        let (pipeline, store) = document_pipeline();
        let raw = message("O1", "Alice");

        pipeline.on_message(&raw, &meta("subscription1")).await;
        let first = store.raw("O1").await.unwrap();

        let mut redelivery = meta("subscription1");
        redelivery.delivery_count = 2;
        assert_eq!(pipeline.on_message(&raw, &redelivery).await, Disposition::Completed);

        assert_eq!(store.raw("O1").await.unwrap(), first);
        assert_eq!(store.len().await, 1);
    }

    #[tokio::test]
    async fn test_item_numbers_survive_both_stores_unchanged() {
        let raw = br#"{"orderId":"O1","customerName":"Alice","items":[{"price":1.10,"qty":18446744073709551616}]}"#;
        let (documents, store) = document_pipeline();
        let (objects, blobs) = object_pipeline();

        assert_eq!(documents.on_message(raw, &meta("subscription1")).await, Disposition::Completed);
        assert_eq!(objects.on_message(raw, &meta("subscription2")).await, Disposition::Completed);

        let body = blobs.get_object("order-O1.json").await.unwrap().unwrap();
        assert_eq!(&body[..], &raw[..]);
        assert!(store
            .raw("O1")
            .await
            .unwrap()
            .contains(r#""items":[{"price":1.10,"qty":18446744073709551616}]"#));
    }

    #[tokio::test]
    async fn test_object_pipeline_writes_single_snapshot() {
        let (pipeline, blobs) = object_pipeline();
        let raw = message("O1", "Alice");

        assert_eq!(pipeline.on_message(&raw, &meta("subscription2")).await, Disposition::Completed);
        assert_eq!(pipeline.on_message(&raw, &meta("subscription2")).await, Disposition::Completed);

        assert_eq!(blobs.keys().await.unwrap(), vec!["order-O1.json".to_string()]);
        let body = blobs.get_object("order-O1.json").await.unwrap().unwrap();
        let decoded: serde_json::Value = serde_json::from_slice(&body).unwrap();
        assert_eq!(
            decoded,
            json!({"orderId": "O1", "customerName": "Alice", "items": [{"sku": "A-1", "qty": 2}]})
        );
    }

    #[tokio::test]
    async fn test_malformed_body_is_dead_lettered_without_writes() {
        let (documents, store) = document_pipeline();
        let (objects, blobs) = object_pipeline();

        let a = documents.on_message(b"not json{", &meta("subscription1")).await;
        let b = objects.on_message(b"not json{", &meta("subscription2")).await;

        assert!(matches!(a, Disposition::DeadLetter { ref reason } if reason.starts_with("Message body is not valid JSON")));
        assert!(matches!(b, Disposition::DeadLetter { .. }));
        assert_eq!(store.len().await, 0);
        assert!(blobs.keys().await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_invalid_order_is_dead_lettered_without_writes() {
        let (pipeline, store) = document_pipeline();
        let raw = serde_json::to_vec(&json!({"orderId": "O1", "customerName": "", "items": ["x"]})).unwrap();

        match pipeline.process(&raw).await {
            Err(PipelineError::InvalidMessage(e)) => assert_eq!(e.field(), Some("customerName")),
            other => panic!("expected invalid message, got {:?}", other),
        }
        assert!(matches!(
            pipeline.on_message(&raw, &meta("subscription1")).await,
            Disposition::DeadLetter { .. }
        ));
        assert_eq!(store.len().await, 0);
    }

    #[tokio::test]
    async fn test_store_failure_requests_redelivery() {
        let pipeline = ConsumerPipeline::new("subscription1", UnavailableAdapter::default());

        let disposition = pipeline.on_message(&message("O1", "Alice"), &meta("subscription1")).await;

        assert_eq!(
            disposition,
            Disposition::Redeliver {
                reason: "store unavailable: connection refused".to_string()
            }
        );
        // no retry inside the pipeline
        assert_eq!(pipeline.adapter.attempts.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_panic_is_contained_and_redelivered() {
        let pipeline = ConsumerPipeline::new("subscription2", PanickingAdapter);

        let disposition = pipeline.on_message(&message("O1", "Alice"), &meta("subscription2")).await;

        assert_eq!(
            disposition,
            Disposition::Redeliver {
                reason: "Unexpected failure: adapter bug".to_string()
            }
        );
    }

    #[tokio::test]
    async fn test_outcomes_are_recorded() {
        let metrics = Arc::new(Metrics::new().unwrap());
        let (pipeline, _store) = document_pipeline();
        let pipeline = pipeline.with_metrics(metrics.clone());

        pipeline.on_message(&message("O1", "Alice"), &meta("subscription1")).await;
        pipeline.on_message(b"{", &meta("subscription1")).await;

        assert_eq!(metrics.messages_handled.with_label_values(&["subscription1", "completed"]).get(), 1);
        assert_eq!(metrics.messages_handled.with_label_values(&["subscription1", "dead_lettered"]).get(), 1);
    }

    #[tokio::test]
    async fn test_concurrent_duplicated_deliveries_to_both_subscriptions() {
        let store = Arc::new(MemoryDocumentStore::new());
        let blobs = Arc::new(ObjectStoreBlobs::in_memory());
        let documents: Arc<dyn MessageHandler> =
            Arc::new(ConsumerPipeline::new("subscription1", DocumentStoreAdapter::new(store.clone())));
        let objects: Arc<dyn MessageHandler> =
            Arc::new(ConsumerPipeline::new("subscription2", ObjectStoreAdapter::new(blobs.clone())));

        let o1 = message("O1", "Alice");
        let o2 = message("O2", "Bob");
        let deliveries = [&o1, &o2, &o1, &o2, &o2, &o1];

        let mut tasks = Vec::new();
        for raw in deliveries {
            for (handler, subscription) in [(&documents, "subscription1"), (&objects, "subscription2")] {
                let handler = handler.clone();
                let raw = raw.clone();
                tasks.push(tokio::spawn(async move { handler.on_message(&raw, &meta(subscription)).await }));
            }
        }

        for outcome in futures_util::future::join_all(tasks).await {
            assert_eq!(outcome.unwrap(), Disposition::Completed);
        }

        assert_eq!(store.len().await, 2);
        assert_eq!(store.fetch("O2").await.unwrap().unwrap()["customerName"], "Bob");
        assert_eq!(
            blobs.keys().await.unwrap(),
            vec!["order-O1.json".to_string(), "order-O2.json".to_string()]
        );
        let body = blobs.get_object("order-O1.json").await.unwrap().unwrap();
        assert_eq!(serde_json::from_slice::<serde_json::Value>(&body).unwrap()["customerName"], "Alice");
    }
}
