use async_trait::async_trait;
use rdkafka::{
    config::ClientConfig,
    message::{Header, OwnedHeaders},
    producer::{FutureProducer, FutureRecord},
    util::Timeout,
};
use std::time::Duration;

use super::broker::{Broker, OutboundMessage, TopicSender, TransportError};
use crate::config::BrokerConfig;
use crate::utils::{CircuitBreaker, CircuitBreakerConfig, CircuitBreakerError, CircuitState};

/// Kafka-protocol producer shared by the publish endpoint and the DLQ.
pub struct RedpandaClient {
    producer: FutureProducer,
    circuit_breaker: CircuitBreaker,
    send_timeout: Duration,
}

impl RedpandaClient {
    pub fn new(config: &BrokerConfig) -> Result<Self, TransportError> {
        let producer: FutureProducer = ClientConfig::new()
            .set("bootstrap.servers", &config.connection)
            .set("message.timeout.ms", config.send_timeout.as_millis().to_string())
            .set("enable.idempotence", "true")
            .create()
            .map_err(|e| TransportError::Unavailable(format!("Failed to create producer: {}", e)))?;

        Ok(Self {
            producer,
            circuit_breaker: CircuitBreaker::new("redpanda", CircuitBreakerConfig::default()),
            send_timeout: config.send_timeout,
        })
    }

    pub async fn circuit_state(&self) -> CircuitState {
        self.circuit_breaker.state().await
    }

    async fn send_to(&self, topic: &str, message: &OutboundMessage) -> Result<(), TransportError> {
        let result = self
            .circuit_breaker
            .call(async {
                let headers = message.headers.iter().fold(OwnedHeaders::new(), |headers, (key, value)| {
                    headers.insert(Header {
                        key: key.as_str(),
                        value: Some(value.as_str()),
                    })
                });

                let record = FutureRecord::to(topic)
                    .key(&message.key)
                    .payload(&message.payload)
                    .headers(headers);

                self.producer
                    .send(record, Timeout::After(self.send_timeout))
                    .await
                    .map(|_| ())
                    .map_err(|(e, _)| e)
            })
            .await;

        match result {
            Ok(()) => {
                tracing::debug!(topic, key = %message.key, "Published to Redpanda");
                Ok(())
            }
            Err(CircuitBreakerError::CircuitOpen) => {
                tracing::error!(topic, "Circuit breaker open - Redpanda unavailable");
                Err(TransportError::CircuitOpen(topic.to_string()))
            }
            Err(CircuitBreakerError::OperationFailed(e)) => {
                tracing::error!(error = %e, topic, "Failed to publish to Redpanda");
                Err(TransportError::SendFailed {
                    topic: topic.to_string(),
                    reason: e.to_string(),
                })
            }
        }
    }
}

impl Broker for RedpandaClient {
    fn open_sender(&self, topic: &str) -> Result<Box<dyn TopicSender + '_>, TransportError> {
        tracing::trace!(topic, "Acquired topic sender");
        Ok(Box::new(RedpandaSender {
            client: self,
            topic: topic.to_string(),
        }))
    }
}

/// Borrowed view of the shared producer, bound to one topic.
struct RedpandaSender<'a> {
    client: &'a RedpandaClient,
    topic: String,
}

#[async_trait]
impl<'a> TopicSender for RedpandaSender<'a> {
    async fn send(&mut self, message: OutboundMessage) -> Result<(), TransportError> {
        self.client.send_to(&self.topic, &message).await
    }
}

impl Drop for RedpandaSender<'_> {
    fn drop(&mut self) {
        tracing::trace!(topic = %self.topic, "Released topic sender");
    }
}
