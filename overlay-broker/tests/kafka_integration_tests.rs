use overlay_broker::kafka::KafkaBroker;
use overlay_broker::{BrokerAdapter, BrokerConfig};
use std::time::Duration;
use tokio::time::{sleep, timeout};
use uuid::Uuid;

const KAFKA_BOOTSTRAP_SERVERS: &str = "localhost:9092";
const TEST_TOPIC: &str = "overlay-broker-test-topic";

fn producer_config() -> BrokerConfig {
    BrokerConfig::from([("bootstrap.servers".to_string(), KAFKA_BOOTSTRAP_SERVERS.to_string())])
}

fn admin_config() -> BrokerConfig {
    producer_config()
}

fn consumer_config(group_id: &str) -> BrokerConfig {
    BrokerConfig::from([
        ("bootstrap.servers".to_string(), KAFKA_BOOTSTRAP_SERVERS.to_string()),
        ("group.id".to_string(), group_id.to_string()),
        ("enable.partition.eof".to_string(), "false".to_string()),
        ("session.timeout.ms".to_string(), "6000".to_string()),
        ("enable.auto.commit".to_string(), "false".to_string()),
        ("auto.offset.reset".to_string(), "earliest".to_string()),
    ])
}

#[tokio::test]
#[ignore]
async fn create_and_delete_topic() {
    let broker = KafkaBroker::new(&producer_config(), &admin_config()).unwrap();
    let topic_name = format!("{}-{}", TEST_TOPIC, Uuid::new_v4());

    broker.create_topic(&topic_name).await.expect("create topic");
    sleep(Duration::from_secs(1)).await;

    broker.delete_topic(&topic_name).await.expect("delete topic");
}

#[tokio::test]
#[ignore]
async fn publish_and_subscribe_roundtrip() {
    let broker = KafkaBroker::new(&producer_config(), &admin_config()).unwrap();
    let topic_name = format!("{}-{}", TEST_TOPIC, Uuid::new_v4());

    broker.create_topic(&topic_name).await.expect("create topic");
    sleep(Duration::from_secs(1)).await;

    let mut consumer = broker
        .subscribe(&consumer_config("overlay-broker-test-group"), &topic_name)
        .await
        .expect("subscribe");

    broker
        .produce(&topic_name, b"test-key", b"test-payload".to_vec())
        .await
        .expect("produce");

    let message = timeout(Duration::from_secs(5), consumer.recv())
        .await
        .expect("timed out waiting for message")
        .expect("recv");

    assert_eq!(message.key, Some(b"test-key".to_vec()));
    assert_eq!(message.value, b"test-payload".to_vec());

    consumer.close().await.expect("close consumer");
    broker.delete_topic(&topic_name).await.expect("delete topic");
}
