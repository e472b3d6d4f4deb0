use async_trait::async_trait;
use chrono::{DateTime, Utc};
use std::sync::Arc;

/// Broker-supplied facts about one delivery. Diagnostics only; handlers must
/// not branch on these.
#[derive(Debug, Clone, PartialEq)]
pub struct DeliveryMetadata {
    pub subscription: String,
    pub message_id: Option<String>,
    /// 1 on first delivery, incremented on every redelivery
    pub delivery_count: u32,
    pub enqueued_at: Option<DateTime<Utc>>,
    pub partition: i32,
    pub offset: i64,
}

impl DeliveryMetadata {
    pub fn first_delivery(subscription: impl Into<String>) -> Self {
        Self {
            subscription: subscription.into(),
            message_id: None,
            delivery_count: 1,
            enqueued_at: None,
            partition: 0,
            offset: 0,
        }
    }
}

/// What the dispatcher should do with a message once its handler returns.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Disposition {
    /// Persisted; acknowledge.
    Completed,
    /// Poison message: park it on the dead-letter topic and acknowledge.
    DeadLetter { reason: String },
    /// Transient failure: leave unacknowledged so it is delivered again.
    Redeliver { reason: String },
}

impl Disposition {
    pub fn outcome(&self) -> &'static str {
        match self {
            Disposition::Completed => "completed",
            Disposition::DeadLetter { .. } => "dead_lettered",
            Disposition::Redeliver { .. } => "redelivered",
        }
    }
}

/// Callback invoked once per delivered message, possibly concurrently with
/// any other invocation, including a redelivery of the same message.
#[async_trait]
pub trait MessageHandler: Send + Sync {
    async fn on_message(&self, raw: &[u8], meta: &DeliveryMetadata) -> Disposition;
}

#[derive(Debug, thiserror::Error)]
pub enum DispatchError {
    #[error("failed to subscribe {subscription}: {reason}")]
    Subscribe { subscription: String, reason: String },

    #[error("consumer worker for {subscription} stopped: {reason}")]
    WorkerStopped { subscription: String, reason: String },

    #[error("{subscription} could not rewind partition {partition} to offset {offset}: {reason}")]
    Rewind {
        subscription: String,
        partition: i32,
        offset: i64,
        reason: String,
    },
}

/// Owns the receive loop of one subscription and drives the handler
/// registered against it.
#[async_trait]
pub trait Dispatcher: Send + Sync {
    fn subscription(&self) -> &str;

    /// Register `handler` and dispatch deliveries to it until the
    /// subscription fails.
    async fn serve(&self, handler: Arc<dyn MessageHandler>) -> Result<(), DispatchError>;
}
