//! In-process broker: FIFO queues per topic.
//!
//! Used by tests and single-process wiring. A topic is one FIFO, so per-key
//! ordering holds trivially; competing consumers on the same topic behave
//! like one consumer group.

use std::collections::{HashMap, VecDeque};
use std::marker::PhantomData;
use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use serde::de::DeserializeOwned;
use serde::Serialize;

use crate::config::CONSUMER_POLL_INTERVAL;
use crate::error_handling::BusError;

use super::{Consumer, Message, Producer};

struct RawMessage {
    key: Vec<u8>,
    payload: Vec<u8>,
}

#[derive(Default)]
struct TopicQueue {
    messages: Mutex<VecDeque<RawMessage>>,
    closed: Mutex<bool>,
}

/// An in-process message broker.
#[derive(Default)]
pub struct MemoryBus {
    topics: Mutex<HashMap<String, Arc<TopicQueue>>>,
}

impl MemoryBus {
    pub fn new() -> Self {
        Self::default()
    }

    fn topic(&self, name: &str) -> Arc<TopicQueue> {
        let mut topics = self.topics.lock().expect("bus lock poisoned");
        Arc::clone(topics.entry(name.to_string()).or_default())
    }

    /// Typed producer for `topic`.
    pub fn producer<T: Serialize + Send + Sync>(&self, topic: &str) -> MemoryProducer<T> {
        MemoryProducer {
            queue: self.topic(topic),
            _marker: PhantomData,
        }
    }

    /// Typed consumer for `topic`.
    pub fn consumer<T: DeserializeOwned + Send>(&self, topic: &str) -> MemoryConsumer<T> {
        MemoryConsumer {
            queue: self.topic(topic),
            _marker: PhantomData,
        }
    }

    /// Marks a topic closed: consumers see `BusError::Closed` once drained.
    pub fn close_topic(&self, topic: &str) {
        let queue = self.topic(topic);
        *queue.closed.lock().expect("bus lock poisoned") = true;
    }
}

pub struct MemoryProducer<T> {
    queue: Arc<TopicQueue>,
    _marker: PhantomData<fn(T)>,
}

#[async_trait]
impl<T: Serialize + Send + Sync> Producer<T> for MemoryProducer<T> {
    async fn publish(&self, key: &[u8], value: &T) -> Result<(), BusError> {
        let payload = serde_json::to_vec(value)?;
        self.queue
            .messages
            .lock()
            .expect("bus lock poisoned")
            .push_back(RawMessage {
                key: key.to_vec(),
                payload,
            });
        Ok(())
    }
}

pub struct MemoryConsumer<T> {
    queue: Arc<TopicQueue>,
    _marker: PhantomData<fn() -> T>,
}

#[async_trait]
impl<T: DeserializeOwned + Send> Consumer<T> for MemoryConsumer<T> {
    async fn fetch(&mut self) -> Result<Option<Message<T>>, BusError> {
        let raw = self
            .queue
            .messages
            .lock()
            .expect("bus lock poisoned")
            .pop_front();
        match raw {
            Some(raw) => {
                let value = serde_json::from_slice(&raw.payload)?;
                Ok(Some(Message {
                    key: raw.key,
                    value,
                }))
            }
            None => {
                if *self.queue.closed.lock().expect("bus lock poisoned") {
                    return Err(BusError::Closed);
                }
                // Benign empty poll; back off briefly so callers can loop.
                tokio::time::sleep(CONSUMER_POLL_INTERVAL).await;
                Ok(None)
            }
        }
    }
}
