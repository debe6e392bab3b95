//! Ephemeral Rendezvous: the complete create-topic -> send-request ->
//! await-single-reply -> delete-topic sequence that simulates a
//! request/response call over a fire-and-forget broker.

use overlay_broker::{BrokerAdapter, BrokerConfig, BrokerError};
use overlay_codec::{decode, encode, envelope, CodecError, Value};
use std::time::Duration;
use thiserror::Error;
use tracing::{error, warn};
use uuid::Uuid;

/// A single outbound subtask call: the topic to invoke and its base
/// argument list.
#[derive(Debug, Clone)]
pub struct RequestSpec {
    pub topic: String,
    pub args: Vec<Value>,
}

/// Tunables for a rendezvous call. No default timeout is imposed by the
/// broker layer, so callers must pick one explicitly.
#[derive(Debug, Clone)]
pub struct RendezvousConfig {
    pub consumer_config: BrokerConfig,
    pub timeout: Duration,
}

/// Errors a rendezvous call can abort with. Each variant corresponds to a
/// distinct lifecycle failure point.
#[derive(Debug, Error)]
pub enum RendezvousError {
    /// Creating the ephemeral response topic failed.
    #[error("rendezvous setup failed: {0}")]
    SetupFailed(BrokerError),

    /// Sending the request to the subtask topic failed.
    #[error("rendezvous dispatch failed: {0}")]
    DispatchFailed(BrokerError),

    /// No reply arrived within the configured timeout.
    #[error("rendezvous timed out after {0:?}")]
    Timeout(Duration),

    /// The reply could not be decoded.
    #[error("rendezvous reply was malformed: {0}")]
    Malformed(#[from] CodecError),
}

/// Performs one complete rendezvous call and returns the decoded reply.
///
/// Guarantee: on `Ok`, the ephemeral response topic has already been
/// deleted. On every error path a best-effort delete is attempted, but a
/// residual topic left behind by a crash mid-call is acceptable — broker-
/// side external cleanup is assumed, per spec.
pub async fn rendezvous(
    request: &RequestSpec,
    broker: &dyn BrokerAdapter,
    config: &RendezvousConfig,
) -> Result<Value, RendezvousError> {
    let response_topic = Uuid::new_v4().to_string();

    broker
        .create_topic(&response_topic)
        .await
        .map_err(RendezvousError::SetupFailed)?;

    let payload = envelope::request(&response_topic, &request.args);
    let bytes = match encode(&payload) {
        Ok(bytes) => bytes,
        Err(e) => {
            best_effort_delete(broker, &response_topic).await;
            return Err(RendezvousError::Malformed(e));
        }
    };

    if let Err(e) = broker
        .produce(&request.topic, request.topic.as_bytes(), bytes)
        .await
    {
        best_effort_delete(broker, &response_topic).await;
        return Err(RendezvousError::DispatchFailed(e));
    }

    let mut consumer = match broker.subscribe(&config.consumer_config, &response_topic).await {
        Ok(consumer) => consumer,
        Err(e) => {
            best_effort_delete(broker, &response_topic).await;
            return Err(RendezvousError::SetupFailed(e));
        }
    };

    let received = match tokio::time::timeout(config.timeout, consumer.recv()).await {
        Ok(Ok(message)) => message,
        Ok(Err(e)) => {
            let _ = consumer.close().await;
            best_effort_delete(broker, &response_topic).await;
            return Err(RendezvousError::DispatchFailed(e));
        }
        Err(_) => {
            let _ = consumer.close().await;
            best_effort_delete(broker, &response_topic).await;
            return Err(RendezvousError::Timeout(config.timeout));
        }
    };

    if let Err(e) = consumer.close().await {
        warn!("failed to close rendezvous consumer for '{}': {}", response_topic, e);
    }

    if let Err(e) = broker.delete_topic(&response_topic).await {
        error!("failed to delete ephemeral topic '{}': {}", response_topic, e);
    }

    let value = decode(&received.value)?;
    Ok(value)
}

async fn best_effort_delete(broker: &dyn BrokerAdapter, topic: &str) {
    if let Err(e) = broker.delete_topic(topic).await {
        warn!("best-effort cleanup of ephemeral topic '{}' failed: {}", topic, e);
    }
}
