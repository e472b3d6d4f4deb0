use actix::Addr;
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use rdkafka::{
    config::ClientConfig,
    consumer::{Consumer, StreamConsumer},
    error::KafkaResult,
    message::{Headers, Message, OwnedMessage},
    Offset,
};
use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use super::broker::MESSAGE_ID_HEADER;
use super::dispatcher::{DeliveryMetadata, DispatchError, Dispatcher, Disposition, MessageHandler};
use crate::actors::{AddToDlq, DlqActor, HealthMonitorActor, HealthStatus, UpdateHealth};
use crate::config::AppConfig;

// ============================================================================
// Redpanda Subscription Dispatcher
// ============================================================================
//
// A subscription is a consumer group over the order topic; every group gets
// its own copy of every message. Each worker is one group member, so the
// partitions (and with them the concurrency) are spread across workers.
//
// Offsets are stored only once a message reaches a terminal disposition:
//
//   Completed   -> store offset
//   DeadLetter  -> forward to the DLQ topic, then store offset
//   Redeliver   -> wait, seek the partition back to the message
//
// A message that keeps asking for redelivery is dead-lettered after
// `max_delivery_attempts` deliveries. If the seek back fails the worker
// stops: it must never store an offset past a message it has not settled.
//
// ============================================================================

const SEEK_TIMEOUT: Duration = Duration::from_secs(5);

#[derive(Debug, Clone)]
pub struct SubscriptionSettings {
    pub brokers: String,
    pub topic: String,
    pub subscription: String,
    pub workers: usize,
    pub max_delivery_attempts: u32,
    pub redelivery_delay: Duration,
}

impl SubscriptionSettings {
    pub fn from_config(config: &AppConfig, subscription: &str) -> Self {
        Self {
            brokers: config.broker.connection.clone(),
            topic: config.broker.topic.clone(),
            subscription: subscription.to_string(),
            workers: config.consumers.workers,
            max_delivery_attempts: config.consumers.max_delivery_attempts,
            redelivery_delay: config.consumers.redelivery_delay,
        }
    }
}

pub struct RedpandaSubscription {
    settings: SubscriptionSettings,
    dlq: Addr<DlqActor>,
    health: Option<Addr<HealthMonitorActor>>,
}

impl RedpandaSubscription {
    pub fn new(settings: SubscriptionSettings, dlq: Addr<DlqActor>) -> Self {
        Self {
            settings,
            dlq,
            health: None,
        }
    }

    pub fn with_health_monitor(mut self, health: Addr<HealthMonitorActor>) -> Self {
        self.health = Some(health);
        self
    }

    fn create_consumer(&self, worker_id: usize) -> Result<StreamConsumer, DispatchError> {
        let subscribe_error = |e: rdkafka::error::KafkaError| DispatchError::Subscribe {
            subscription: self.settings.subscription.clone(),
            reason: e.to_string(),
        };

        let consumer: StreamConsumer = ClientConfig::new()
            .set("bootstrap.servers", &self.settings.brokers)
            .set("group.id", &self.settings.subscription)
            .set("client.id", format!("{}-{}", self.settings.subscription, worker_id))
            .set("enable.auto.commit", "true")
            .set("enable.auto.offset.store", "false")
            .set("auto.offset.reset", "earliest")
            .set("enable.partition.eof", "false")
            .create()
            .map_err(subscribe_error)?;

        consumer
            .subscribe(&[self.settings.topic.as_str()])
            .map_err(subscribe_error)?;

        Ok(consumer)
    }
}

#[async_trait]
impl Dispatcher for RedpandaSubscription {
    fn subscription(&self) -> &str {
        &self.settings.subscription
    }

    async fn serve(&self, handler: Arc<dyn MessageHandler>) -> Result<(), DispatchError> {
        let mut workers = Vec::with_capacity(self.settings.workers);

        for worker_id in 0..self.settings.workers {
            let worker = Worker::new(
                worker_id,
                self.create_consumer(worker_id)?,
                handler.clone(),
                self.settings.clone(),
                self.dlq.clone(),
                self.health.clone(),
            );
            workers.push(tokio::spawn(worker.run()));
        }

        tracing::info!(
            subscription = %self.settings.subscription,
            topic = %self.settings.topic,
            workers = self.settings.workers,
            "Subscription consuming"
        );

        let (finished, _, remaining) = futures_util::future::select_all(workers).await;
        for worker in remaining {
            worker.abort();
        }
        match finished {
            Ok(result) => result,
            Err(e) => Err(DispatchError::WorkerStopped {
                subscription: self.settings.subscription.clone(),
                reason: e.to_string(),
            }),
        }
    }
}

/// The two position moves a worker makes on its partitions.
trait PartitionCursor: Send {
    /// Mark every offset before `next_offset` as handled.
    fn advance(&self, topic: &str, partition: i32, next_offset: i64) -> KafkaResult<()>;

    /// Make `offset` the next message fetched from the partition.
    fn rewind(&self, topic: &str, partition: i32, offset: i64) -> KafkaResult<()>;
}

impl PartitionCursor for StreamConsumer {
    fn advance(&self, topic: &str, partition: i32, next_offset: i64) -> KafkaResult<()> {
        self.store_offset(topic, partition, next_offset)
    }

    fn rewind(&self, topic: &str, partition: i32, offset: i64) -> KafkaResult<()> {
        self.seek(topic, partition, Offset::Offset(offset), SEEK_TIMEOUT)
    }
}

struct Worker<C> {
    id: usize,
    consumer: C,
    handler: Arc<dyn MessageHandler>,
    settings: SubscriptionSettings,
    dlq: Addr<DlqActor>,
    health: Option<Addr<HealthMonitorActor>>,
    tracker: RedeliveryTracker,
    /// Last degraded flag sent to the health monitor
    reported: Option<bool>,
}

impl Worker<StreamConsumer> {
    async fn run(mut self) -> Result<(), DispatchError> {
        self.report(HealthStatus::Healthy);

        loop {
            let message = match self.consumer.recv().await {
                Ok(message) => message.detach(),
                Err(e) => {
                    tracing::warn!(
                        subscription = %self.settings.subscription,
                        worker = self.id,
                        error = %e,
                        "Receive failed"
                    );
                    continue;
                }
            };
            self.dispatch(message).await?;
        }
    }
}

impl<C: PartitionCursor> Worker<C> {
    fn new(
        id: usize,
        consumer: C,
        handler: Arc<dyn MessageHandler>,
        settings: SubscriptionSettings,
        dlq: Addr<DlqActor>,
        health: Option<Addr<HealthMonitorActor>>,
    ) -> Self {
        Self {
            id,
            consumer,
            handler,
            tracker: RedeliveryTracker::new(settings.max_delivery_attempts),
            settings,
            dlq,
            health,
            reported: None,
        }
    }

    /// Health component name; one per worker so workers never mask each other.
    fn component(&self) -> String {
        format!("{}/worker-{}", self.settings.subscription, self.id)
    }

    /// Settle one message. Fails only if the message can be neither
    /// acknowledged nor rewound; the worker must then stop.
    async fn dispatch(&mut self, message: OwnedMessage) -> Result<(), DispatchError> {
        let position = (message.partition(), message.offset());
        let meta = DeliveryMetadata {
            subscription: self.settings.subscription.clone(),
            message_id: header(&message, MESSAGE_ID_HEADER),
            delivery_count: self.tracker.begin(position),
            enqueued_at: message.timestamp().to_millis().and_then(DateTime::<Utc>::from_timestamp_millis),
            partition: message.partition(),
            offset: message.offset(),
        };

        let disposition = self
            .handler
            .on_message(message.payload().unwrap_or_default(), &meta)
            .await;

        match self.tracker.escalate(position, disposition) {
            Disposition::Completed => {
                self.acknowledge(&message);
                self.report(HealthStatus::Healthy);
                Ok(())
            }
            Disposition::DeadLetter { reason } => {
                let dead_letter = AddToDlq {
                    subscription: self.settings.subscription.clone(),
                    source_topic: message.topic().to_string(),
                    key: message.key().map(|k| String::from_utf8_lossy(k).into_owned()),
                    payload: message.payload().unwrap_or_default().to_vec(),
                    reason,
                    delivery_count: meta.delivery_count,
                    message_id: meta.message_id.clone(),
                };

                match self.dlq.send(dead_letter).await {
                    Ok(Ok(())) => {
                        self.acknowledge(&message);
                        Ok(())
                    }
                    Ok(Err(e)) => {
                        tracing::error!(error = %e, offset = meta.offset, "Dead-letter publish failed, redelivering");
                        self.rewind(&message).await
                    }
                    Err(e) => {
                        tracing::error!(error = %e, offset = meta.offset, "DLQ actor unreachable, redelivering");
                        self.rewind(&message).await
                    }
                }
            }
            Disposition::Redeliver { reason } => {
                self.report(HealthStatus::Degraded(reason));
                self.rewind(&message).await
            }
        }
    }

    fn acknowledge(&mut self, message: &OwnedMessage) {
        self.tracker.finish((message.partition(), message.offset()));

        if let Err(e) = self
            .consumer
            .advance(message.topic(), message.partition(), message.offset() + 1)
        {
            // the message will be seen again after a rebalance; handlers are idempotent
            tracing::warn!(
                subscription = %self.settings.subscription,
                partition = message.partition(),
                offset = message.offset(),
                error = %e,
                "Failed to store offset"
            );
        }
    }

    /// Without a successful seek the next fetch would be a later offset, and
    /// acknowledging that would skip this message.
    async fn rewind(&mut self, message: &OwnedMessage) -> Result<(), DispatchError> {
        tokio::time::sleep(self.settings.redelivery_delay).await;

        self.consumer
            .rewind(message.topic(), message.partition(), message.offset())
            .map_err(|e| {
                tracing::error!(
                    subscription = %self.settings.subscription,
                    worker = self.id,
                    partition = message.partition(),
                    offset = message.offset(),
                    error = %e,
                    "Failed to seek back for redelivery, stopping worker"
                );
                DispatchError::Rewind {
                    subscription: self.settings.subscription.clone(),
                    partition: message.partition(),
                    offset: message.offset(),
                    reason: e.to_string(),
                }
            })
    }

    fn report(&mut self, status: HealthStatus) {
        let degraded = !status.is_healthy();
        if self.reported == Some(degraded) {
            return;
        }
        self.reported = Some(degraded);

        if let Some(ref health) = self.health {
            health.do_send(UpdateHealth {
                component: self.component(),
                status,
                details: None,
            });
        }
    }
}

fn header(message: &OwnedMessage, name: &str) -> Option<String> {
    message
        .headers()?
        .iter()
        .find(|h| h.key == name)
        .and_then(|h| h.value)
        .map(|value| String::from_utf8_lossy(value).into_owned())
}

/// Per-worker delivery counts for messages that have not settled yet.
///
/// A partition is consumed in order and an unsettled message is rewound, so
/// each partition has at most one unsettled offset. Keying by partition keeps
/// the map bounded even when a partition is revoked mid-redelivery.
struct RedeliveryTracker {
    max_attempts: u32,
    pending: HashMap<i32, (i64, u32)>,
}

impl RedeliveryTracker {
    fn new(max_attempts: u32) -> Self {
        Self {
            max_attempts,
            pending: HashMap::new(),
        }
    }

    /// Record a delivery and return its delivery count.
    fn begin(&mut self, (partition, offset): (i32, i64)) -> u32 {
        let entry = self.pending.entry(partition).or_insert((offset, 0));
        if entry.0 != offset {
            *entry = (offset, 0);
        }
        entry.1 += 1;
        entry.1
    }

    fn deliveries(&self, (partition, offset): (i32, i64)) -> u32 {
        match self.pending.get(&partition) {
            Some(&(pending, count)) if pending == offset => count,
            _ => 0,
        }
    }

    /// Turn a redelivery request into a dead-letter once the message has
    /// used up its delivery attempts.
    fn escalate(&self, position: (i32, i64), disposition: Disposition) -> Disposition {
        match disposition {
            Disposition::Redeliver { reason } if self.deliveries(position) >= self.max_attempts => {
                Disposition::DeadLetter {
                    reason: format!("max delivery attempts exceeded ({}): {}", self.max_attempts, reason),
                }
            }
            other => other,
        }
    }

    fn finish(&mut self, position: (i32, i64)) {
        if self.deliveries(position) > 0 {
            self.pending.remove(&position.0);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::actors::GetSystemHealth;
    use crate::messaging::memory::MemoryBroker;
    use actix::Actor;
    use rdkafka::error::KafkaError;
    use rdkafka::message::Timestamp;
    use std::sync::Mutex;

    #[derive(Default)]
    struct CursorLog {
        advanced: Vec<(i32, i64)>,
        rewound: Vec<(i32, i64)>,
    }

    /// Records position moves instead of talking to a broker.
    #[derive(Clone, Default)]
    struct RecordingCursor {
        log: Arc<Mutex<CursorLog>>,
        fail_rewind: bool,
    }

    impl RecordingCursor {
        fn advanced(&self) -> Vec<(i32, i64)> {
            self.log.lock().unwrap().advanced.clone()
        }

        fn rewound(&self) -> Vec<(i32, i64)> {
            self.log.lock().unwrap().rewound.clone()
        }
    }

    impl PartitionCursor for RecordingCursor {
        fn advance(&self, _topic: &str, partition: i32, next_offset: i64) -> KafkaResult<()> {
            self.log.lock().unwrap().advanced.push((partition, next_offset));
            Ok(())
        }

        fn rewind(&self, _topic: &str, partition: i32, offset: i64) -> KafkaResult<()> {
            if self.fail_rewind {
                return Err(KafkaError::Seek("partition not assigned".to_string()));
            }
            self.log.lock().unwrap().rewound.push((partition, offset));
            Ok(())
        }
    }

    struct FixedHandler(Disposition);

    #[async_trait]
    impl MessageHandler for FixedHandler {
        async fn on_message(&self, _raw: &[u8], _meta: &DeliveryMetadata) -> Disposition {
            self.0.clone()
        }
    }

    fn settings(max_delivery_attempts: u32) -> SubscriptionSettings {
        SubscriptionSettings {
            brokers: "unused:9092".to_string(),
            topic: "orders".to_string(),
            subscription: "subscription1".to_string(),
            workers: 1,
            max_delivery_attempts,
            redelivery_delay: Duration::ZERO,
        }
    }

    fn worker(
        id: usize,
        disposition: Disposition,
        max_delivery_attempts: u32,
        broker: Arc<MemoryBroker>,
        cursor: RecordingCursor,
    ) -> Worker<RecordingCursor> {
        Worker::new(
            id,
            cursor,
            Arc::new(FixedHandler(disposition)),
            settings(max_delivery_attempts),
            DlqActor::new(broker).start(),
            None,
        )
    }

    fn message(partition: i32, offset: i64) -> OwnedMessage {
        OwnedMessage::new(
            Some(b"not json".to_vec()),
            Some(b"O1".to_vec()),
            "orders".to_string(),
            Timestamp::NotAvailable,
            partition,
            offset,
            None,
        )
    }

    fn dead_letter() -> Disposition {
        Disposition::DeadLetter {
            reason: "malformed".to_string(),
        }
    }

    #[actix::test]
    async fn test_completed_message_stores_next_offset() {
        let cursor = RecordingCursor::default();
        let mut worker = worker(0, Disposition::Completed, 10, Arc::new(MemoryBroker::new()), cursor.clone());

        worker.dispatch(message(0, 7)).await.unwrap();

        assert_eq!(cursor.advanced(), vec![(0, 8)]);
        assert!(cursor.rewound().is_empty());
    }

    #[actix::test]
    async fn test_redelivery_rewinds_without_storing_offset() {
        let cursor = RecordingCursor::default();
        let mut worker = worker(0, redeliver(), 10, Arc::new(MemoryBroker::new()), cursor.clone());

        worker.dispatch(message(0, 7)).await.unwrap();
        worker.dispatch(message(0, 7)).await.unwrap();

        assert!(cursor.advanced().is_empty());
        assert_eq!(cursor.rewound(), vec![(0, 7), (0, 7)]);
    }

    #[actix::test]
    async fn test_dead_letter_is_forwarded_then_acknowledged() {
        let broker = Arc::new(MemoryBroker::new());
        let cursor = RecordingCursor::default();
        let mut worker = worker(0, dead_letter(), 10, broker.clone(), cursor.clone());

        worker.dispatch(message(1, 3)).await.unwrap();

        let parked = broker.published("orders.subscription1.dlq");
        assert_eq!(parked.len(), 1);
        assert_eq!(parked[0].payload, b"not json".to_vec());
        assert_eq!(cursor.advanced(), vec![(1, 4)]);
    }

    #[actix::test]
    async fn test_failed_dead_letter_forward_is_not_acknowledged() {
        let broker = Arc::new(MemoryBroker::new());
        broker.fail_sends(true);
        let cursor = RecordingCursor::default();
        let mut worker = worker(0, dead_letter(), 10, broker.clone(), cursor.clone());

        worker.dispatch(message(1, 3)).await.unwrap();

        assert!(cursor.advanced().is_empty());
        assert_eq!(cursor.rewound(), vec![(1, 3)]);
    }

    #[actix::test]
    async fn test_last_allowed_delivery_is_dead_lettered() {
        let broker = Arc::new(MemoryBroker::new());
        let cursor = RecordingCursor::default();
        let mut worker = worker(0, redeliver(), 2, broker.clone(), cursor.clone());

        worker.dispatch(message(0, 7)).await.unwrap();
        assert!(broker.published("orders.subscription1.dlq").is_empty());

        worker.dispatch(message(0, 7)).await.unwrap();

        let parked = broker.published("orders.subscription1.dlq");
        assert_eq!(parked.len(), 1);
        assert!(parked[0]
            .header("dlq-reason")
            .unwrap()
            .starts_with("max delivery attempts exceeded (2)"));
        assert_eq!(parked[0].header("dlq-delivery-count"), Some("2"));
        assert_eq!(cursor.rewound(), vec![(0, 7)]);
        assert_eq!(cursor.advanced(), vec![(0, 8)]);
    }

    #[actix::test]
    async fn test_failed_seek_stops_the_worker_instead_of_moving_on() {
        let cursor = RecordingCursor {
            fail_rewind: true,
            ..RecordingCursor::default()
        };
        let mut worker = worker(0, redeliver(), 10, Arc::new(MemoryBroker::new()), cursor.clone());

        let err = worker.dispatch(message(2, 11)).await.unwrap_err();

        assert!(matches!(
            err,
            DispatchError::Rewind {
                partition: 2,
                offset: 11,
                ..
            }
        ));
        assert!(cursor.advanced().is_empty());
    }

    #[actix::test]
    async fn test_recovered_worker_does_not_mask_degraded_one() {
        let monitor = HealthMonitorActor::new().start();
        let broker = Arc::new(MemoryBroker::new());

        let mut stuck = worker(0, redeliver(), 10, broker.clone(), RecordingCursor::default());
        stuck.health = Some(monitor.clone());
        let mut healthy = worker(1, Disposition::Completed, 10, broker, RecordingCursor::default());
        healthy.health = Some(monitor.clone());

        stuck.dispatch(message(0, 1)).await.unwrap();
        healthy.dispatch(message(1, 1)).await.unwrap();

        let health = monitor.send(GetSystemHealth).await.unwrap();
        assert!(matches!(health.overall_status, HealthStatus::Degraded(_)));
        assert!(!health.components["subscription1/worker-0"].status.is_healthy());
        assert!(health.components["subscription1/worker-1"].status.is_healthy());
    }

    fn redeliver() -> Disposition {
        Disposition::Redeliver {
            reason: "store unavailable".to_string(),
        }
    }

    #[test]
    fn test_delivery_count_increments_until_finished() {
        let mut tracker = RedeliveryTracker::new(10);

        assert_eq!(tracker.begin((0, 42)), 1);
        assert_eq!(tracker.begin((0, 42)), 2);
        assert_eq!(tracker.begin((1, 42)), 1);

        tracker.finish((0, 42));
        assert_eq!(tracker.begin((0, 42)), 1);
    }

    #[test]
    fn test_new_offset_on_partition_replaces_stale_entry() {
        let mut tracker = RedeliveryTracker::new(10);
        tracker.begin((0, 5));
        tracker.begin((0, 5));

        // partition revoked mid-redelivery, later reassigned further on
        assert_eq!(tracker.begin((0, 9)), 1);
        assert_eq!(tracker.pending.len(), 1);

        tracker.finish((0, 5));
        assert_eq!(tracker.deliveries((0, 9)), 1);
    }

    #[test]
    fn test_redelivery_allowed_below_limit() {
        let mut tracker = RedeliveryTracker::new(3);
        tracker.begin((0, 7));
        tracker.begin((0, 7));

        assert_eq!(tracker.escalate((0, 7), redeliver()), redeliver());
    }

    #[test]
    fn test_redelivery_escalates_to_dead_letter_at_limit() {
        let mut tracker = RedeliveryTracker::new(3);
        for _ in 0..3 {
            tracker.begin((0, 7));
        }

        match tracker.escalate((0, 7), redeliver()) {
            Disposition::DeadLetter { reason } => {
                assert!(reason.starts_with("max delivery attempts exceeded (3)"));
                assert!(reason.ends_with("store unavailable"));
            }
            other => panic!("expected dead letter, got {:?}", other),
        }
    }

    #[test]
    fn test_terminal_dispositions_pass_through() {
        let mut tracker = RedeliveryTracker::new(1);
        tracker.begin((0, 1));

        assert_eq!(tracker.escalate((0, 1), Disposition::Completed), Disposition::Completed);
        let poison = Disposition::DeadLetter {
            reason: "invalid".to_string(),
        };
        assert_eq!(tracker.escalate((0, 1), poison.clone()), poison);
    }
}
