mod config;

use clap::Parser;
use config::DemoConfig;
use overlay_broker::{kafka::KafkaBroker, BrokerAdapter, BrokerConfig};
use overlay_dag::{DependencyMap, ResultMap, SubtaskSpec};
use overlay_pipeline::Pipeline;
use overlay_reactor::{ElementsBuilder, Message, Reactor};
use overlay_rendezvous::RendezvousConfig;
use serde_json::json;
use std::sync::Arc;
use std::time::Duration;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

#[derive(Parser)]
#[command(author, version, about, long_about = None)]
struct Cli {
    /// Run a single pass with a synthetic message instead of consuming the
    /// configured primary topic.
    #[arg(long)]
    smoke_test: bool,
}

/// A toy deps_fn: a message carrying `{"op": "sum", "values": [..]}`
/// dispatches one subtask to the `sum` topic; anything else has no
/// dependencies.
fn deps_fn(message: &Message) -> DependencyMap {
    let mut deps = DependencyMap::new();
    if message.value.get("op").and_then(|v| v.as_str()) == Some("sum") {
        let values = message
            .value
            .get("values")
            .cloned()
            .unwrap_or_else(|| json!([]));
        let args = values.as_array().cloned().unwrap_or_default();
        deps.insert("sum", SubtaskSpec::new("sum", args));
    }
    deps
}

/// A toy proc_fn: echoes the resolved subtask result (if any) alongside
/// the original message.
fn proc_fn(message: &Message, results: &ResultMap) -> overlay_codec::Value {
    match results.get("sum") {
        Some(resolved) => json!({"received": message.value, "sum": resolved.result}),
        None => json!({"received": message.value}),
    }
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::registry()
        .with(EnvFilter::try_from_default_env().unwrap_or_else(|_| "info,overlay_demo=debug".into()))
        .with(
            tracing_subscriber::fmt::layer()
                .compact()
                .with_file(true)
                .with_line_number(true),
        )
        .init();

    let cli = Cli::parse();
    let config = DemoConfig::load()?;

    let mut broker_config = BrokerConfig::new();
    broker_config.insert("bootstrap.servers".to_string(), config.bootstrap_servers.clone());

    let mut consumer_config = broker_config.clone();
    consumer_config.insert("group.id".to_string(), config.consumer_group.clone());
    consumer_config.insert("auto.offset.reset".to_string(), "earliest".to_string());

    let broker: Arc<dyn BrokerAdapter> =
        Arc::new(KafkaBroker::new(&broker_config, &broker_config)?);

    broker.create_topic(&config.primary_topic).await?;

    let rendezvous_config = RendezvousConfig {
        consumer_config: consumer_config.clone(),
        timeout: Duration::from_millis(config.rendezvous_timeout_ms),
    };

    if cli.smoke_test {
        tracing::info!("running a single synthetic message through deps_fn/proc_fn");
        let message = Message {
            topic: config.primary_topic.clone(),
            partition: 0,
            offset: 0,
            key: None,
            value: json!({"op": "sum", "values": [1, 2, 3]}),
        };
        let deps = deps_fn(&message);
        tracing::info!(?deps, "resolved dependency map");
        return Ok(());
    }

    let elements = ElementsBuilder::new(broker.clone())
        .primary_topic(config.primary_topic.clone())
        .primary_consumer_config(consumer_config)
        .rendezvous_config(rendezvous_config)
        .layer_concurrency(config.layer_concurrency)
        .build()
        .await?;

    let reactor = Reactor::new(Arc::new(deps_fn), Arc::new(proc_fn));
    let handle = reactor.start(elements);

    tracing::info!(topic = %config.primary_topic, "reactor running, waiting for ctrl-c");
    tokio::signal::ctrl_c().await?;
    tracing::info!("shutdown requested");
    handle.shutdown().await;

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn message(value: overlay_codec::Value) -> Message {
        Message {
            topic: "primary".to_string(),
            partition: 0,
            offset: 0,
            key: None,
            value,
        }
    }

    #[test]
    fn sum_op_produces_a_single_subtask() {
        let deps = deps_fn(&message(json!({"op": "sum", "values": [1, 2, 3]})));
        assert_eq!(deps.len(), 1);
    }

    #[test]
    fn non_sum_op_has_no_dependencies() {
        let deps = deps_fn(&message(json!({"op": "noop"})));
        assert!(deps.is_empty());
    }

    #[test]
    fn proc_fn_echoes_message_when_no_subtask_ran() {
        let msg = message(json!({"op": "noop"}));
        let result = proc_fn(&msg, &ResultMap::default());
        assert_eq!(result, json!({"received": {"op": "noop"}}));
    }
}
