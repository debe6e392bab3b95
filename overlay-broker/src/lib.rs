//! Broker Adapter: a thin capability surface over the message broker and
//! its coordination service.
//!
//! This crate defines the [`BrokerAdapter`] and [`Consumer`] traits, a
//! Kafka-backed implementation ([`kafka::KafkaBroker`]), and an in-memory
//! test double ([`testing::InMemoryBroker`]) the rest of the overlay's
//! crates use to exercise rendezvous/DAG/reactor logic without a live
//! broker.

pub mod kafka;
pub mod testing;

use async_trait::async_trait;
use std::collections::HashMap;
use thiserror::Error;

/// Broker-specific configuration, passed through opaquely — no
/// reinterpretation by this crate beyond merging into the client config.
pub type BrokerConfig = HashMap<String, String>;

/// A decoded-less broker record: binary value, topic, partition, offset,
/// key. Translation to a structured [`overlay_codec::Value`] happens one
/// layer up, in the rendezvous/reactor crates.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RawMessage {
    pub topic: String,
    pub partition: i32,
    pub offset: i64,
    pub key: Option<Vec<u8>>,
    pub value: Vec<u8>,
}

/// Errors surfaced by broker operations.
#[derive(Debug, Error)]
pub enum BrokerError {
    /// The broker rejected or timed out a produce call.
    #[error("produce failed: {0}")]
    ProduceFailed(String),

    /// A topic create/delete/list/metadata operation failed.
    #[error("topic admin operation failed: {0}")]
    AdminFailed(String),

    /// A consume/recv call failed.
    #[error("consume failed: {0}")]
    ConsumeFailed(String),

    /// The handle has been closed; no further operations are permitted.
    #[error("broker handle closed")]
    Closed,
}

/// A bound consumer on a single topic. Never shared: the reactor's primary
/// consumer and each rendezvous's ephemeral consumer each get their own.
#[async_trait]
pub trait Consumer: Send + Sync {
    /// Pulls the next message in broker-delivery order. Blocks until one
    /// is available or the consumer is closed.
    async fn recv(&mut self) -> Result<RawMessage, BrokerError>;

    /// Releases broker-side resources. Post-condition: `recv` returns
    /// [`BrokerError::Closed`] afterward.
    async fn close(&mut self) -> Result<(), BrokerError>;
}

/// Capability surface the overlay needs from the broker and its
/// coordination service.
#[async_trait]
pub trait BrokerAdapter: Send + Sync {
    /// Produces a record, not returning until the broker has acknowledged.
    async fn produce(&self, topic: &str, key: &[u8], value: Vec<u8>) -> Result<(), BrokerError>;

    /// Creates a topic with a single partition and deployment-configured
    /// replication factor. Idempotent: succeeds if the topic already
    /// exists. Must not return until the topic is visible to subsequent
    /// `subscribe` calls — this ordering prevents the lost-reply race
    /// where a reply arrives before its consumer has subscribed.
    async fn create_topic(&self, name: &str) -> Result<(), BrokerError>;

    /// Deletes a topic. Idempotent: succeeds if the topic does not exist.
    async fn delete_topic(&self, name: &str) -> Result<(), BrokerError>;

    /// Subscribes to a topic, returning a bound [`Consumer`]. `config` is
    /// passed through opaquely to the underlying client.
    async fn subscribe(
        &self,
        config: &BrokerConfig,
        topic: &str,
    ) -> Result<Box<dyn Consumer>, BrokerError>;

    /// Releases the shared producer. Post-condition: no further `produce`
    /// calls are permitted on this handle.
    async fn close_producer(&self) -> Result<(), BrokerError>;
}
