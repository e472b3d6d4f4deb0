use actix::prelude::*;
use chrono::Utc;
use std::collections::HashMap;
use std::sync::Arc;

use crate::messaging::{Broker, OutboundMessage, MESSAGE_ID_HEADER};
use crate::metrics::Metrics;

// ============================================================================
// Dead Letter Queue Actor
// ============================================================================
//
// Parks poison messages (and messages that ran out of delivery attempts) on
// `<topic>.<subscription>.dlq`. The original payload is forwarded untouched;
// why it was parked travels in headers.
//
// The subscription only acknowledges the source message after the forward
// succeeded, so a failed forward means the message is delivered again.
//
// ============================================================================

pub const DLQ_REASON_HEADER: &str = "dlq-reason";
pub const DLQ_SUBSCRIPTION_HEADER: &str = "dlq-subscription";
pub const DLQ_DELIVERY_COUNT_HEADER: &str = "dlq-delivery-count";
pub const DLQ_PARKED_AT_HEADER: &str = "dlq-parked-at";

pub fn dead_letter_topic(topic: &str, subscription: &str) -> String {
    format!("{topic}.{subscription}.dlq")
}

pub struct DlqActor {
    broker: Arc<dyn Broker>,
    metrics: Option<Arc<Metrics>>,
    parked: HashMap<String, u64>,
}

impl DlqActor {
    pub fn new(broker: Arc<dyn Broker>) -> Self {
        Self {
            broker,
            metrics: None,
            parked: HashMap::new(),
        }
    }

    pub fn with_metrics(mut self, metrics: Arc<Metrics>) -> Self {
        self.metrics = Some(metrics);
        self
    }
}

impl Actor for DlqActor {
    type Context = Context<Self>;

    fn started(&mut self, _ctx: &mut Self::Context) {
        tracing::info!("DlqActor started - Dead Letter Queue ready");
    }
}

// ============================================================================
// Messages
// ============================================================================

#[derive(Message, Debug, Clone)]
#[rtype(result = "Result<(), String>")]
pub struct AddToDlq {
    pub subscription: String,
    pub source_topic: String,
    pub key: Option<String>,
    pub payload: Vec<u8>,
    pub reason: String,
    pub delivery_count: u32,
    pub message_id: Option<String>,
}

#[derive(Message)]
#[rtype(result = "DlqStats")]
pub struct GetDlqStats;

#[derive(Debug, Clone, Default, PartialEq)]
pub struct DlqStats {
    pub total_messages: u64,
    pub by_subscription: HashMap<String, u64>,
}

// ============================================================================
// Handlers
// ============================================================================

impl Handler<AddToDlq> for DlqActor {
    type Result = ResponseActFuture<Self, Result<(), String>>;

    fn handle(&mut self, msg: AddToDlq, _: &mut Self::Context) -> Self::Result {
        tracing::error!(
            subscription = %msg.subscription,
            message_id = ?msg.message_id,
            delivery_count = msg.delivery_count,
            reason = %msg.reason,
            poison = true,
            "Parking message on dead letter queue"
        );

        let broker = self.broker.clone();
        let subscription = msg.subscription.clone();

        Box::pin(
            async move { forward(broker.as_ref(), msg).await }
                .into_actor(self)
                .map(move |result, act, _ctx| {
                    if result.is_ok() {
                        *act.parked.entry(subscription.clone()).or_default() += 1;
                        if let Some(ref metrics) = act.metrics {
                            metrics.record_dead_letter(&subscription);
                        }
                    }
                    result
                }),
        )
    }
}

impl Handler<GetDlqStats> for DlqActor {
    type Result = MessageResult<GetDlqStats>;

    fn handle(&mut self, _msg: GetDlqStats, _: &mut Self::Context) -> Self::Result {
        MessageResult(DlqStats {
            total_messages: self.parked.values().sum(),
            by_subscription: self.parked.clone(),
        })
    }
}

async fn forward(broker: &dyn Broker, msg: AddToDlq) -> Result<(), String> {
    let topic = dead_letter_topic(&msg.source_topic, &msg.subscription);

    let mut message = OutboundMessage::new(msg.key.unwrap_or_default(), msg.payload)
        .with_header(DLQ_REASON_HEADER, msg.reason)
        .with_header(DLQ_SUBSCRIPTION_HEADER, msg.subscription)
        .with_header(DLQ_DELIVERY_COUNT_HEADER, msg.delivery_count.to_string())
        .with_header(DLQ_PARKED_AT_HEADER, Utc::now().to_rfc3339());
    if let Some(message_id) = msg.message_id {
        message = message.with_header(MESSAGE_ID_HEADER, message_id);
    }

    let mut sender = broker
        .open_sender(&topic)
        .map_err(|e| format!("Failed to open DLQ sender: {}", e))?;
    sender
        .send(message)
        .await
        .map_err(|e| format!("Failed to publish to {}: {}", topic, e))?;

    tracing::info!(topic = %topic, "Message stored in DLQ");
    Ok(())
}
