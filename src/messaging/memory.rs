use async_trait::async_trait;
use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::Mutex;

use super::broker::{Broker, OutboundMessage, TopicSender, TransportError};

/// In-process broker used by tests: records every message per topic and
/// counts currently open senders.
#[derive(Default)]
pub struct MemoryBroker {
    topics: Mutex<HashMap<String, Vec<OutboundMessage>>>,
    open_senders: AtomicUsize,
    fail_open: AtomicBool,
    fail_sends: AtomicBool,
}

impl MemoryBroker {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn published(&self, topic: &str) -> Vec<OutboundMessage> {
        self.topics.lock().unwrap().get(topic).cloned().unwrap_or_default()
    }

    pub fn open_senders(&self) -> usize {
        self.open_senders.load(Ordering::SeqCst)
    }

    pub fn fail_open(&self, fail: bool) {
        self.fail_open.store(fail, Ordering::SeqCst);
    }

    pub fn fail_sends(&self, fail: bool) {
        self.fail_sends.store(fail, Ordering::SeqCst);
    }
}

impl Broker for MemoryBroker {
    fn open_sender(&self, topic: &str) -> Result<Box<dyn TopicSender + '_>, TransportError> {
        if self.fail_open.load(Ordering::SeqCst) {
            return Err(TransportError::Unavailable("memory broker offline".to_string()));
        }
        self.open_senders.fetch_add(1, Ordering::SeqCst);
        Ok(Box::new(MemorySender {
            broker: self,
            topic: topic.to_string(),
        }))
    }
}

struct MemorySender<'a> {
    broker: &'a MemoryBroker,
    topic: String,
}

#[async_trait]
impl<'a> TopicSender for MemorySender<'a> {
    async fn send(&mut self, message: OutboundMessage) -> Result<(), TransportError> {
        if self.broker.fail_sends.load(Ordering::SeqCst) {
            return Err(TransportError::SendFailed {
                topic: self.topic.clone(),
                reason: "memory broker rejected send".to_string(),
            });
        }
        self.broker
            .topics
            .lock()
            .unwrap()
            .entry(self.topic.clone())
            .or_default()
            .push(message);
        Ok(())
    }
}

impl Drop for MemorySender<'_> {
    fn drop(&mut self) {
        self.broker.open_senders.fetch_sub(1, Ordering::SeqCst);
    }
}
