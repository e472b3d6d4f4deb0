use std::sync::Arc;
use uuid::Uuid;

use super::broker::{Broker, OutboundMessage, TransportError, MESSAGE_ID_HEADER};
use crate::domain::order::Order;
use crate::metrics::Metrics;

#[derive(Debug, thiserror::Error)]
pub enum PublishError {
    #[error("failed to serialize order: {0}")]
    SerializationFailed(#[from] serde_json::Error),

    #[error("failed to enqueue order: {0}")]
    TransportFailed(#[from] TransportError),
}

impl PublishError {
    pub fn reason(&self) -> &'static str {
        match self {
            PublishError::SerializationFailed(_) => "serialization",
            PublishError::TransportFailed(_) => "transport",
        }
    }
}

/// Sends each validated order to the topic as exactly one message.
///
/// There is no retry here: a transport failure goes back to the caller, and
/// delivery to subscriptions is the broker's job.
pub struct OrderPublisher {
    broker: Arc<dyn Broker>,
    topic: String,
    metrics: Option<Arc<Metrics>>,
}

impl OrderPublisher {
    pub fn new(broker: Arc<dyn Broker>, topic: impl Into<String>) -> Self {
        Self {
            broker,
            topic: topic.into(),
            metrics: None,
        }
    }

    pub fn with_metrics(mut self, metrics: Arc<Metrics>) -> Self {
        self.metrics = Some(metrics);
        self
    }

    pub async fn publish(&self, order: &Order) -> Result<(), PublishError> {
        let result = self.send(order).await;

        match &result {
            Ok(()) => tracing::info!(
                order_id = %order.order_id(),
                customer_name = %order.customer_name(),
                items = order.items().len(),
                topic = %self.topic,
                "Order published"
            ),
            Err(e) => tracing::error!(
                order_id = %order.order_id(),
                topic = %self.topic,
                error = %e,
                "Failed to publish order"
            ),
        }
        if let Some(ref metrics) = self.metrics {
            metrics.record_publish(result.as_ref().err().map(PublishError::reason));
        }

        result
    }

    async fn send(&self, order: &Order) -> Result<(), PublishError> {
        let payload = order.to_canonical_json()?;
        let message = OutboundMessage::new(order.order_id(), payload)
            .with_header(MESSAGE_ID_HEADER, Uuid::now_v7().to_string());

        // dropped on every path out of this function, releasing the channel
        let mut sender = self.broker.open_sender(&self.topic)?;
        sender.send(message).await?;
        Ok(())
    }
}
