//! An in-process [`BrokerAdapter`] double for unit tests that exercise
//! rendezvous/DAG/reactor logic without a live Kafka broker.
//!
//! Topics are plain FIFO queues behind a mutex; a [`tokio::sync::Notify`]
//! per topic wakes waiting consumers when a message is produced.

use crate::{BrokerAdapter, BrokerConfig, BrokerError, Consumer, RawMessage};
use async_trait::async_trait;
use std::collections::{HashMap, VecDeque};
use std::sync::atomic::{AtomicBool, AtomicI64, Ordering};
use std::sync::{Arc, Mutex};
use tokio::sync::Notify;

struct Topic {
    queue: Mutex<VecDeque<RawMessage>>,
    notify: Notify,
    next_offset: AtomicI64,
}

impl Topic {
    fn new() -> Self {
        Self {
            queue: Mutex::new(VecDeque::new()),
            notify: Notify::new(),
            next_offset: AtomicI64::new(0),
        }
    }
}

/// In-memory stand-in for a Kafka cluster: topic creation/deletion and
/// produce/consume, scoped to a single process.
#[derive(Clone, Default)]
pub struct InMemoryBroker {
    topics: Arc<Mutex<HashMap<String, Arc<Topic>>>>,
    closed: Arc<AtomicBool>,
}

impl InMemoryBroker {
    pub fn new() -> Self {
        Self::default()
    }

    /// Whether a topic currently exists. Exposed for tests asserting the
    /// rendezvous teardown invariant (ephemeral topics don't outlive a
    /// successful call).
    pub fn topic_exists(&self, name: &str) -> bool {
        self.topics.lock().unwrap().contains_key(name)
    }

    /// Number of topics currently known to this broker. Exposed for tests
    /// that assert ephemeral topics don't leak across a batch of calls.
    pub fn topic_count(&self) -> usize {
        self.topics.lock().unwrap().len()
    }

    fn ensure_open(&self) -> Result<(), BrokerError> {
        if self.closed.load(Ordering::Acquire) {
            return Err(BrokerError::Closed);
        }
        Ok(())
    }
}

#[async_trait]
impl BrokerAdapter for InMemoryBroker {
    async fn produce(&self, topic: &str, key: &[u8], value: Vec<u8>) -> Result<(), BrokerError> {
        self.ensure_open()?;

        let topic_handle = {
            let mut topics = self.topics.lock().unwrap();
            topics
                .get(topic)
                .cloned()
                .ok_or_else(|| BrokerError::ProduceFailed(format!("unknown topic '{topic}'")))?
        };

        let offset = topic_handle.next_offset.fetch_add(1, Ordering::SeqCst);
        let message = RawMessage {
            topic: topic.to_string(),
            partition: 0,
            offset,
            key: if key.is_empty() {
                None
            } else {
                Some(key.to_vec())
            },
            value,
        };

        topic_handle.queue.lock().unwrap().push_back(message);
        topic_handle.notify.notify_waiters();
        Ok(())
    }

    async fn create_topic(&self, name: &str) -> Result<(), BrokerError> {
        self.ensure_open()?;
        let mut topics = self.topics.lock().unwrap();
        topics.entry(name.to_string()).or_insert_with(|| Arc::new(Topic::new()));
        Ok(())
    }

    async fn delete_topic(&self, name: &str) -> Result<(), BrokerError> {
        self.ensure_open()?;
        self.topics.lock().unwrap().remove(name);
        Ok(())
    }

    async fn subscribe(
        &self,
        _config: &BrokerConfig,
        topic: &str,
    ) -> Result<Box<dyn Consumer>, BrokerError> {
        self.ensure_open()?;
        let topic_handle = {
            let mut topics = self.topics.lock().unwrap();
            topics
                .entry(topic.to_string())
                .or_insert_with(|| Arc::new(Topic::new()))
                .clone()
        };

        Ok(Box::new(InMemoryConsumer {
            topic: topic_handle,
            closed: false,
        }))
    }

    async fn close_producer(&self) -> Result<(), BrokerError> {
        self.closed.store(true, Ordering::Release);
        Ok(())
    }
}

struct InMemoryConsumer {
    topic: Arc<Topic>,
    closed: bool,
}

#[async_trait]
impl Consumer for InMemoryConsumer {
    async fn recv(&mut self) -> Result<RawMessage, BrokerError> {
        loop {
            if self.closed {
                return Err(BrokerError::Closed);
            }

            if let Some(message) = self.topic.queue.lock().unwrap().pop_front() {
                return Ok(message);
            }

            self.topic.notify.notified().await;
        }
    }

    async fn close(&mut self) -> Result<(), BrokerError> {
        self.closed = true;
        self.topic.notify.notify_waiters();
        Ok(())
    }
}
