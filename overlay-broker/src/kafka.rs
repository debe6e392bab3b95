//! Kafka-compatible implementation of [`BrokerAdapter`].
//!
//! Configuration maps are merged key-by-key into [`ClientConfig`] rather
//! than reinterpreted, so deployments can pass through any broker-specific
//! setting (TLS, SASL, batching, ...) without this crate knowing about it.

use crate::{BrokerAdapter, BrokerConfig, BrokerError, Consumer, RawMessage};
use async_trait::async_trait;
use rdkafka::admin::{AdminClient, AdminOptions, NewTopic, TopicReplication};
use rdkafka::client::DefaultClientContext;
use rdkafka::config::ClientConfig;
use rdkafka::consumer::{Consumer as _, StreamConsumer};
use rdkafka::error::{KafkaError, RDKafkaErrorCode};
use rdkafka::message::Message as _;
use rdkafka::producer::{FutureProducer, FutureRecord};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tracing::{error, info};

/// Replication factor applied to every topic this adapter creates.
/// Deployment-configured in spec; fixed here to `1` since the pack's own
/// single-broker dev setups (teacher's `KafkaBroker::new`,
/// `kafka_integration_tests.rs`) never vary it.
const TOPIC_REPLICATION_FACTOR: i32 = 1;

/// A Kafka-backed [`BrokerAdapter`].
pub struct KafkaBroker {
    producer: Arc<FutureProducer>,
    admin_client: AdminClient<DefaultClientContext>,
    closed: Arc<AtomicBool>,
}

impl KafkaBroker {
    /// Builds a new broker handle. `producer_config` and `admin_config`
    /// are merged verbatim into their respective `ClientConfig`s; at
    /// minimum both must carry `bootstrap.servers`.
    pub fn new(
        producer_config: &BrokerConfig,
        admin_config: &BrokerConfig,
    ) -> Result<Self, BrokerError> {
        let mut producer_client_config = ClientConfig::new();
        for (key, value) in producer_config {
            producer_client_config.set(key, value);
        }
        let producer: FutureProducer = producer_client_config
            .create()
            .map_err(|e| BrokerError::ProduceFailed(format!("producer creation error: {e}")))?;

        let mut admin_client_config = ClientConfig::new();
        for (key, value) in admin_config {
            admin_client_config.set(key, value);
        }
        let admin_client = admin_client_config
            .create()
            .map_err(|e| BrokerError::AdminFailed(format!("admin client creation error: {e}")))?;

        Ok(Self {
            producer: Arc::new(producer),
            admin_client,
            closed: Arc::new(AtomicBool::new(false)),
        })
    }

    fn ensure_open(&self) -> Result<(), BrokerError> {
        if self.closed.load(Ordering::Acquire) {
            return Err(BrokerError::Closed);
        }
        Ok(())
    }
}

#[async_trait]
impl BrokerAdapter for KafkaBroker {
    async fn produce(&self, topic: &str, key: &[u8], value: Vec<u8>) -> Result<(), BrokerError> {
        self.ensure_open()?;

        let record = FutureRecord::to(topic).payload(&value).key(key);

        match self.producer.send(record, Duration::from_secs(0)).await {
            Ok(_) => Ok(()),
            Err((e, _)) => {
                error!("failed to produce to '{}': {:?}", topic, e);
                Err(BrokerError::ProduceFailed(e.to_string()))
            }
        }
    }

    async fn create_topic(&self, name: &str) -> Result<(), BrokerError> {
        self.ensure_open()?;
        let admin_opts = AdminOptions::new();
        let topic = NewTopic::new(name, 1, TopicReplication::Fixed(TOPIC_REPLICATION_FACTOR));

        match self.admin_client.create_topics(&[topic], &admin_opts).await {
            Ok(results) => match &results[0] {
                Ok(_) => {
                    info!("topic '{}' created", name);
                    Ok(())
                }
                Err((_, RDKafkaErrorCode::TopicAlreadyExists)) => {
                    info!("topic '{}' already exists", name);
                    Ok(())
                }
                Err((_, err)) => {
                    error!("failed to create topic '{}': {:?}", name, err);
                    Err(BrokerError::AdminFailed(format!("{err:?}")))
                }
            },
            Err(e) => {
                error!("admin operation failed: {:?}", e);
                Err(BrokerError::AdminFailed(e.to_string()))
            }
        }
    }

    async fn delete_topic(&self, name: &str) -> Result<(), BrokerError> {
        self.ensure_open()?;
        let admin_opts = AdminOptions::new();

        match self.admin_client.delete_topics(&[name], &admin_opts).await {
            Ok(results) => match &results[0] {
                Ok(_) => {
                    info!("topic '{}' deleted", name);
                    Ok(())
                }
                Err((_, RDKafkaErrorCode::UnknownTopicOrPartition)) => {
                    info!("topic '{}' already absent", name);
                    Ok(())
                }
                Err((_, err)) => {
                    error!("failed to delete topic '{}': {:?}", name, err);
                    Err(BrokerError::AdminFailed(format!("{err:?}")))
                }
            },
            Err(e) => {
                error!("admin operation failed: {:?}", e);
                Err(BrokerError::AdminFailed(e.to_string()))
            }
        }
    }

    async fn subscribe(
        &self,
        config: &BrokerConfig,
        topic: &str,
    ) -> Result<Box<dyn Consumer>, BrokerError> {
        self.ensure_open()?;

        let mut client_config = ClientConfig::new();
        for (key, value) in config {
            client_config.set(key, value);
        }

        let consumer: StreamConsumer = client_config
            .create()
            .map_err(|e| BrokerError::ConsumeFailed(format!("consumer creation error: {e}")))?;

        consumer
            .subscribe(&[topic])
            .map_err(|e| BrokerError::ConsumeFailed(format!("failed to subscribe: {e}")))?;

        Ok(Box::new(KafkaConsumer {
            consumer,
            closed: false,
        }))
    }

    async fn close_producer(&self) -> Result<(), BrokerError> {
        self.closed.store(true, Ordering::Release);
        Ok(())
    }
}

struct KafkaConsumer {
    consumer: StreamConsumer,
    closed: bool,
}

#[async_trait]
impl Consumer for KafkaConsumer {
    async fn recv(&mut self) -> Result<RawMessage, BrokerError> {
        if self.closed {
            return Err(BrokerError::Closed);
        }

        match self.consumer.recv().await {
            Ok(msg) => {
                let detached = msg.detach();
                let value = detached.payload().map_or(Vec::new(), |p| p.to_vec());
                let key = detached.key().map(|k| k.to_vec());
                Ok(RawMessage {
                    topic: detached.topic().to_string(),
                    partition: detached.partition(),
                    offset: detached.offset(),
                    key,
                    value,
                })
            }
            Err(KafkaError::PartitionEOF(_)) => Err(BrokerError::ConsumeFailed(
                "partition EOF".to_string(),
            )),
            Err(e) => {
                error!("error receiving message: {:?}", e);
                Err(BrokerError::ConsumeFailed(e.to_string()))
            }
        }
    }

    async fn close(&mut self) -> Result<(), BrokerError> {
        if !self.closed {
            self.consumer.unsubscribe();
            self.closed = true;
        }
        Ok(())
    }
}
