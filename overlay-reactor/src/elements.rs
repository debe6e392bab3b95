//! The reactor's resource bundle: a bound consumer on the primary topic, a
//! shared producer/admin handle, and an optional output channel.

use crate::error::ReactorError;
use overlay_broker::{BrokerAdapter, BrokerConfig, Consumer};
use overlay_codec::Value;
use overlay_dag::combinators::CombinatorRegistry;
use overlay_rendezvous::RendezvousConfig;
use std::sync::Arc;
use tokio::sync::mpsc;

/// Resources a started [`crate::Reactor`] owns for the duration of its run.
pub struct Elements {
    pub(crate) primary_consumer: Box<dyn Consumer>,
    pub(crate) primary_topic: String,
    pub(crate) broker: Arc<dyn BrokerAdapter>,
    pub(crate) output_channel: Option<mpsc::Sender<Value>>,
    pub(crate) error_sink: Option<mpsc::Sender<ReactorError>>,
    pub(crate) rendezvous_config: RendezvousConfig,
    pub(crate) combinators: CombinatorRegistry,
    pub(crate) layer_concurrency: bool,
}

/// Builds an [`Elements`] bundle. Mirrors the layered-configuration
/// builder style the teacher uses for its service configs: accumulate
/// fields, then fallibly assemble broker-side resources at the end.
pub struct ElementsBuilder {
    broker: Arc<dyn BrokerAdapter>,
    primary_topic: Option<String>,
    primary_consumer_config: BrokerConfig,
    rendezvous_config: Option<RendezvousConfig>,
    output_channel: Option<mpsc::Sender<Value>>,
    error_sink: Option<mpsc::Sender<ReactorError>>,
    combinators: CombinatorRegistry,
    layer_concurrency: bool,
}

impl ElementsBuilder {
    pub fn new(broker: Arc<dyn BrokerAdapter>) -> Self {
        Self {
            broker,
            primary_topic: None,
            primary_consumer_config: BrokerConfig::new(),
            rendezvous_config: None,
            output_channel: None,
            error_sink: None,
            combinators: CombinatorRegistry::with_builtins(),
            layer_concurrency: false,
        }
    }

    pub fn primary_topic(mut self, topic: impl Into<String>) -> Self {
        self.primary_topic = Some(topic.into());
        self
    }

    pub fn primary_consumer_config(mut self, config: BrokerConfig) -> Self {
        self.primary_consumer_config = config;
        self
    }

    pub fn rendezvous_config(mut self, config: RendezvousConfig) -> Self {
        self.rendezvous_config = Some(config);
        self
    }

    pub fn output_channel(mut self, sender: mpsc::Sender<Value>) -> Self {
        self.output_channel = Some(sender);
        self
    }

    pub fn error_sink(mut self, sender: mpsc::Sender<ReactorError>) -> Self {
        self.error_sink = Some(sender);
        self
    }

    pub fn combinators(mut self, registry: CombinatorRegistry) -> Self {
        self.combinators = registry;
        self
    }

    pub fn layer_concurrency(mut self, enabled: bool) -> Self {
        self.layer_concurrency = enabled;
        self
    }

    /// Subscribes to the configured primary topic and assembles the
    /// bundle. Fails if no primary topic or rendezvous config was set, or
    /// if the broker subscription itself fails.
    pub async fn build(self) -> Result<Elements, ReactorError> {
        let primary_topic = self
            .primary_topic
            .ok_or_else(|| ReactorError::Configuration("primary_topic not set".to_string()))?;
        let rendezvous_config = self
            .rendezvous_config
            .ok_or_else(|| ReactorError::Configuration("rendezvous_config not set".to_string()))?;

        let primary_consumer = self
            .broker
            .subscribe(&self.primary_consumer_config, &primary_topic)
            .await
            .map_err(ReactorError::SubscribeFailed)?;

        Ok(Elements {
            primary_consumer,
            primary_topic,
            broker: self.broker,
            output_channel: self.output_channel,
            error_sink: self.error_sink,
            rendezvous_config,
            combinators: self.combinators,
            layer_concurrency: self.layer_concurrency,
        })
    }
}
