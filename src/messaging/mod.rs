// ============================================================================
// Messaging
// ============================================================================
//
// - broker:       send-side contract (Broker / TopicSender)
// - redpanda:     Kafka-protocol producer behind a circuit breaker
// - publisher:    canonical encoding + exactly one send per order
// - dispatcher:   receive-side contract (Dispatcher / MessageHandler)
// - subscription: consumer-group dispatcher with redelivery and dead-lettering
//
// ============================================================================

mod broker;
mod dispatcher;
#[cfg(test)]
pub(crate) mod memory;
mod publisher;
mod redpanda;
mod subscription;

pub use broker::{Broker, OutboundMessage, TopicSender, TransportError, MESSAGE_ID_HEADER};
pub use dispatcher::{DeliveryMetadata, DispatchError, Dispatcher, Disposition, MessageHandler};
pub use publisher::{OrderPublisher, PublishError};
pub use redpanda::RedpandaClient;
pub use subscription::{RedpandaSubscription, SubscriptionSettings};
