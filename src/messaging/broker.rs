use async_trait::async_trait;

/// Header carrying the publisher-assigned message id.
pub const MESSAGE_ID_HEADER: &str = "message-id";

#[derive(Debug, thiserror::Error)]
pub enum TransportError {
    #[error("broker unavailable: {0}")]
    Unavailable(String),

    #[error("circuit breaker open for topic {0}")]
    CircuitOpen(String),

    #[error("failed to send to topic {topic}: {reason}")]
    SendFailed { topic: String, reason: String },
}

/// A message ready to be enqueued on a topic.
#[derive(Debug, Clone, PartialEq)]
pub struct OutboundMessage {
    /// Partition key
    pub key: String,
    pub payload: Vec<u8>,
    pub headers: Vec<(String, String)>,
}

impl OutboundMessage {
    pub fn new(key: impl Into<String>, payload: Vec<u8>) -> Self {
        Self {
            key: key.into(),
            payload,
            headers: Vec::new(),
        }
    }

    pub fn with_header(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.headers.push((name.into(), value.into()));
        self
    }

    pub fn header(&self, name: &str) -> Option<&str> {
        self.headers
            .iter()
            .find(|(key, _)| key == name)
            .map(|(_, value)| value.as_str())
    }
}

/// Process-wide broker connection.
///
/// Senders are borrowed from it per publish and released when dropped; the
/// connection itself outlives them all.
pub trait Broker: Send + Sync {
    fn open_sender(&self, topic: &str) -> Result<Box<dyn TopicSender + '_>, TransportError>;
}

/// Scoped send channel for one topic.
#[async_trait]
pub trait TopicSender: Send {
    async fn send(&mut self, message: OutboundMessage) -> Result<(), TransportError>;
}
