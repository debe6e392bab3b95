//! Errors the reactor loop and its per-message tasks can raise.

use overlay_broker::BrokerError;
use overlay_codec::CodecError;
use overlay_dag::DagError;
use thiserror::Error;

/// Per-message and reactor-level error kinds (spec.md §7).
#[derive(Debug, Error)]
pub enum ReactorError {
    /// The message failed to decode. The message is skipped; the reactor
    /// keeps running.
    #[error("malformed payload: {0}")]
    MalformedPayload(#[from] CodecError),

    /// A produce (reply dispatch, or underlying broker admin call) failed.
    #[error("produce failed: {0}")]
    ProduceFailed(BrokerError),

    /// Subscribing the primary or a rendezvous consumer to a topic failed.
    #[error("subscribe failed: {0}")]
    SubscribeFailed(BrokerError),

    /// The per-message dependency evaluation failed.
    #[error("dependency evaluation failed: {0}")]
    Dag(#[from] DagError),

    /// The broker handle was closed, typically during shutdown.
    #[error("broker closed")]
    BrokerClosed,

    /// The [`crate::ElementsBuilder`] was missing a required field.
    #[error("reactor configuration error: {0}")]
    Configuration(String),
}
