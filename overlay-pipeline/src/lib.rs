//! Pipeline: a producer-side convenience for emitting a message onto a
//! topic, optionally waiting for its reply via rendezvous rather than
//! wiring up a full reactor.

use overlay_broker::{BrokerAdapter, BrokerError};
use overlay_codec::Value;
use overlay_rendezvous::{rendezvous, RendezvousConfig, RendezvousError, RequestSpec};
use std::sync::Arc;
use thiserror::Error;
use tokio::sync::mpsc;

/// Errors a pipeline send can fail with.
#[derive(Debug, Error)]
pub enum PipelineError {
    /// The plain (non-waiting) produce call failed.
    #[error("produce failed: {0}")]
    ProduceFailed(BrokerError),

    /// A waiting send's rendezvous call failed.
    #[error(transparent)]
    Rendezvous(#[from] RendezvousError),
}

/// Outcome of a [`Pipeline::send`] call.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PipelineOutcome {
    /// `wait` was requested and the rendezvous reply arrived.
    Delivered(Value),
    /// `wait` was not requested; the broker has acknowledged the produce.
    Pending,
}

/// Producer-side handle bundling a broker, a rendezvous config, and an
/// optional output channel for waiting sends.
pub struct Pipeline {
    broker: Arc<dyn BrokerAdapter>,
    rendezvous_config: RendezvousConfig,
    output_channel: Option<mpsc::Sender<Value>>,
}

impl Pipeline {
    pub fn new(broker: Arc<dyn BrokerAdapter>, rendezvous_config: RendezvousConfig) -> Self {
        Self {
            broker,
            rendezvous_config,
            output_channel: None,
        }
    }

    pub fn with_output_channel(mut self, sender: mpsc::Sender<Value>) -> Self {
        self.output_channel = Some(sender);
        self
    }

    /// Emits `message` on `topic`. If `wait` is `false`, produces once and
    /// returns as soon as the broker acknowledges. If `wait` is `true`,
    /// performs a full rendezvous call; when an output channel is
    /// configured the reply is delivered there instead of being returned,
    /// and this call resolves to [`PipelineOutcome::Pending`].
    pub async fn send(
        &self,
        topic: &str,
        message: Value,
        wait: bool,
    ) -> Result<PipelineOutcome, PipelineError> {
        if !wait {
            let bytes = overlay_codec::encode(&message).map_err(|e| {
                PipelineError::ProduceFailed(BrokerError::ProduceFailed(e.to_string()))
            })?;
            self.broker
                .produce(topic, topic.as_bytes(), bytes)
                .await
                .map_err(PipelineError::ProduceFailed)?;
            return Ok(PipelineOutcome::Pending);
        }

        let args = match message {
            Value::Array(items) => items,
            other => vec![other],
        };
        let request = RequestSpec {
            topic: topic.to_string(),
            args,
        };
        let reply = rendezvous(&request, self.broker.as_ref(), &self.rendezvous_config).await?;

        match &self.output_channel {
            Some(sender) => {
                let _ = sender.send(reply).await;
                Ok(PipelineOutcome::Pending)
            }
            None => Ok(PipelineOutcome::Delivered(reply)),
        }
    }
}
