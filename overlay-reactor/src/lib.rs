//! Reactor Loop: the long-running consumer on a primary topic. For each
//! message it resolves a per-message dependency DAG and dispatches the
//! final result to a reply topic, an output channel, or both.

mod elements;
mod error;
mod state;

pub use elements::{Elements, ElementsBuilder};
pub use error::ReactorError;
pub use state::ReactorState;

use overlay_broker::BrokerAdapter;
use overlay_codec::{decode, encode, envelope, Value};
use overlay_dag::{DagEvaluator, DependencyMap, ResultMap};
use std::sync::Arc;
use tokio::sync::Notify;
use tracing::{error, warn};

/// A decoded message pulled from the primary topic.
#[derive(Debug, Clone)]
pub struct Message {
    pub topic: String,
    pub partition: i32,
    pub offset: i64,
    pub key: Option<Vec<u8>>,
    pub value: Value,
}

/// Computes the dependency map for a message. Returning an empty map is
/// equivalent to the subtask-free path.
pub type DepsFn = Arc<dyn Fn(&Message) -> DependencyMap + Send + Sync>;

/// Computes the final result from a message and its resolved dependency
/// results.
pub type ProcFn = Arc<dyn Fn(&Message, &ResultMap) -> Value + Send + Sync>;

/// A reactor definition: the two user-supplied functions that drive
/// per-message processing. Call [`Reactor::start`] with an [`Elements`]
/// bundle to begin consuming.
pub struct Reactor {
    deps_fn: DepsFn,
    proc_fn: ProcFn,
}

impl Reactor {
    pub fn new(deps_fn: DepsFn, proc_fn: ProcFn) -> Self {
        Self { deps_fn, proc_fn }
    }

    /// Begins processing the primary topic using the given resource
    /// bundle. Returns a handle for observing state and requesting
    /// shutdown.
    pub fn start(self, elements: Elements) -> ReactorHandle {
        let state = Arc::new(state::AtomicReactorState::new());
        state.set(ReactorState::Running);
        let shutdown_notify = Arc::new(Notify::new());

        let deps_fn = self.deps_fn;
        let proc_fn = self.proc_fn;
        let loop_state = state.clone();
        let loop_shutdown = shutdown_notify.clone();
        let Elements {
            mut primary_consumer,
            primary_topic,
            broker,
            output_channel,
            error_sink,
            rendezvous_config,
            combinators,
            layer_concurrency,
        } = elements;

        let join_handle = tokio::spawn(async move {
            loop {
                let raw = tokio::select! {
                    _ = loop_shutdown.notified() => {
                        let _ = primary_consumer.close().await;
                        break;
                    }
                    recv_result = primary_consumer.recv() => match recv_result {
                        Ok(raw) => raw,
                        Err(overlay_broker::BrokerError::Closed) => {
                            if let Some(sink) = &error_sink {
                                let _ = sink.send(ReactorError::BrokerClosed).await;
                            }
                            break;
                        }
                        Err(e) => {
                            error!("primary consumer error on '{}': {}", primary_topic, e);
                            break;
                        }
                    },
                };

                let broker = broker.clone();
                let deps_fn = deps_fn.clone();
                let proc_fn = proc_fn.clone();
                let output_channel = output_channel.clone();
                let error_sink = error_sink.clone();
                let rendezvous_config = rendezvous_config.clone();
                let combinators = combinators.clone();
                let primary_topic = primary_topic.clone();

                tokio::spawn(async move {
                    let outcome = process_one(
                        raw,
                        &primary_topic,
                        broker.as_ref(),
                        &deps_fn,
                        &proc_fn,
                        rendezvous_config,
                        combinators,
                        layer_concurrency,
                        output_channel,
                    )
                    .await;

                    if let Err(e) = outcome {
                        error!("message processing failed: {}", e);
                        if let Some(sink) = error_sink {
                            let _ = sink.send(e).await;
                        }
                    }
                });
            }

            let _ = broker.close_producer().await;
            loop_state.set(ReactorState::Stopped);
        });

        ReactorHandle {
            state,
            shutdown_notify,
            join_handle: Some(join_handle),
        }
    }
}

#[allow(clippy::too_many_arguments)]
async fn process_one(
    raw: overlay_broker::RawMessage,
    _primary_topic: &str,
    broker: &dyn BrokerAdapter,
    deps_fn: &DepsFn,
    proc_fn: &ProcFn,
    rendezvous_config: overlay_rendezvous::RendezvousConfig,
    combinators: overlay_dag::combinators::CombinatorRegistry,
    layer_concurrency: bool,
    output_channel: Option<tokio::sync::mpsc::Sender<Value>>,
) -> Result<(), ReactorError> {
    let value = decode(&raw.value).map_err(ReactorError::MalformedPayload)?;

    let message = Message {
        topic: raw.topic,
        partition: raw.partition,
        offset: raw.offset,
        key: raw.key,
        value,
    };

    let deps_map = deps_fn(&message);

    let evaluator = DagEvaluator::new(broker, rendezvous_config)
        .with_combinators(combinators)
        .with_layer_concurrency(layer_concurrency);
    let results = evaluator.evaluate(&deps_map).await.map_err(ReactorError::Dag)?;

    let final_value = proc_fn(&message, &results);

    if let Some(return_topic) = envelope::return_topic(&message.value) {
        let reply = envelope::reply(final_value.clone());
        let encoded = encode(&reply).map_err(ReactorError::MalformedPayload)?;
        broker
            .produce(return_topic, message.topic.as_bytes(), encoded)
            .await
            .map_err(ReactorError::ProduceFailed)?;
    }

    if let Some(sender) = output_channel {
        if sender.send(final_value).await.is_err() {
            warn!("output channel closed; dropping result for message on '{}'", message.topic);
        }
    }

    Ok(())
}

/// A started reactor. Tracks the `{New -> Running -> Stopping -> Stopped}`
/// state machine and owns the primary loop's join handle.
pub struct ReactorHandle {
    state: Arc<state::AtomicReactorState>,
    shutdown_notify: Arc<Notify>,
    join_handle: Option<tokio::task::JoinHandle<()>>,
}

impl ReactorHandle {
    pub fn state(&self) -> ReactorState {
        self.state.get()
    }

    /// Requests shutdown: transitions to `Stopping`, wakes the primary loop
    /// out of its current `recv`, and waits for it to close the consumer,
    /// close the shared producer, and reach `Stopped`.
    pub async fn shutdown(mut self) {
        if self.state.get() == ReactorState::Running {
            self.state.set(ReactorState::Stopping);
        }
        self.shutdown_notify.notify_one();
        if let Some(handle) = self.join_handle.take() {
            let _ = handle.await;
        }
    }
}

impl Drop for ReactorHandle {
    fn drop(&mut self) {
        if self.state.get() == ReactorState::Running {
            warn!("reactor handle dropped while running; primary loop will keep running detached");
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use overlay_broker::testing::InMemoryBroker;
    use overlay_broker::BrokerAdapter;
    use overlay_dag::{DependencyMap, SubtaskSpec};
    use overlay_rendezvous::RendezvousConfig;
    use serde_json::json;
    use std::time::Duration;

    fn rendezvous_config() -> RendezvousConfig {
        RendezvousConfig {
            consumer_config: Default::default(),
            timeout: Duration::from_millis(200),
        }
    }

    fn identity_reactor() -> Reactor {
        Reactor::new(
            Arc::new(|_msg: &Message| DependencyMap::new()),
            Arc::new(|msg: &Message, _results: &ResultMap| msg.value.clone()),
        )
    }

    #[tokio::test]
    async fn message_with_return_topic_gets_a_reply_and_the_reactor_keeps_running() {
        let broker = InMemoryBroker::new();
        broker.create_topic("primary").await.unwrap();
        broker.create_topic("reply").await.unwrap();
        let mut reply_consumer = broker.subscribe(&Default::default(), "reply").await.unwrap();

        let elements = ElementsBuilder::new(Arc::new(broker.clone()))
            .primary_topic("primary")
            .rendezvous_config(rendezvous_config())
            .build()
            .await
            .unwrap();

        let handle = identity_reactor().start(elements);

        let payload = json!({"return-topic": "reply", "n": 1});
        broker
            .produce("primary", b"", encode(&payload).unwrap())
            .await
            .unwrap();

        let reply = reply_consumer.recv().await.unwrap();
        assert_eq!(decode(&reply.value).unwrap(), payload);
        assert_eq!(handle.state(), ReactorState::Running);

        handle.shutdown().await;
    }

    #[tokio::test]
    async fn message_with_no_return_topic_and_no_output_channel_is_silently_dropped() {
        let broker = InMemoryBroker::new();
        broker.create_topic("primary").await.unwrap();
        broker.create_topic("reply").await.unwrap();
        let mut reply_consumer = broker.subscribe(&Default::default(), "reply").await.unwrap();

        let elements = ElementsBuilder::new(Arc::new(broker.clone()))
            .primary_topic("primary")
            .rendezvous_config(rendezvous_config())
            .build()
            .await
            .unwrap();

        let handle = identity_reactor().start(elements);

        broker
            .produce("primary", b"", encode(&json!({"n": 1})).unwrap())
            .await
            .unwrap();
        // second message proves the loop kept going after the first had
        // nowhere to deliver its result.
        broker
            .produce("primary", b"", encode(&json!({"n": 2, "return-topic": "reply"})).unwrap())
            .await
            .unwrap();

        let reply = tokio::time::timeout(Duration::from_secs(1), reply_consumer.recv())
            .await
            .expect("reactor should still be processing messages")
            .unwrap();
        assert_eq!(decode(&reply.value).unwrap(), json!({"n": 2, "return-topic": "reply"}));

        handle.shutdown().await;
    }

    #[tokio::test]
    async fn a_rendezvous_timeout_on_one_message_does_not_stop_the_reactor() {
        let broker = InMemoryBroker::new();
        broker.create_topic("primary").await.unwrap();
        broker.create_topic("black-hole").await.unwrap();
        broker.create_topic("reply").await.unwrap();
        let mut reply_consumer = broker.subscribe(&Default::default(), "reply").await.unwrap();

        let (error_tx, mut error_rx) = tokio::sync::mpsc::channel(4);

        let reactor = Reactor::new(
            Arc::new(|_msg: &Message| {
                let mut deps = DependencyMap::new();
                deps.insert("stuck", SubtaskSpec::new("black-hole", vec![]));
                deps
            }),
            Arc::new(|_msg: &Message, _results: &ResultMap| json!("unreachable")),
        );

        let elements = ElementsBuilder::new(Arc::new(broker.clone()))
            .primary_topic("primary")
            .rendezvous_config(rendezvous_config())
            .error_sink(error_tx)
            .build()
            .await
            .unwrap();

        let handle = reactor.start(elements);

        broker
            .produce("primary", b"", encode(&json!({"slow": true})).unwrap())
            .await
            .unwrap();

        let err = tokio::time::timeout(Duration::from_secs(1), error_rx.recv())
            .await
            .expect("the stuck dependency should surface as a per-message error")
            .unwrap();
        assert!(matches!(err, ReactorError::Dag(_)));

        // the reactor is still alive and keeps serving unrelated messages.
        broker
            .produce("primary", b"", encode(&json!({"return-topic": "reply"})).unwrap())
            .await
            .unwrap();
        let reply = tokio::time::timeout(Duration::from_secs(1), reply_consumer.recv())
            .await
            .expect("a later message should still be processed")
            .unwrap();
        assert_eq!(decode(&reply.value).unwrap(), json!({"return-topic": "reply"}));

        handle.shutdown().await;
    }

    #[tokio::test]
    async fn shutdown_closes_the_consumer_and_reaches_stopped() {
        let broker = InMemoryBroker::new();
        broker.create_topic("primary").await.unwrap();

        let elements = ElementsBuilder::new(Arc::new(broker.clone()))
            .primary_topic("primary")
            .rendezvous_config(rendezvous_config())
            .build()
            .await
            .unwrap();

        let handle = identity_reactor().start(elements);
        assert_eq!(handle.state(), ReactorState::Running);

        // no messages ever arrive: shutdown must still complete, proving it
        // doesn't wait on a blocked recv().
        handle.shutdown().await;
    }
}
