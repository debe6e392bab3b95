use config::{Config, ConfigError, Environment, File};
use serde::Deserialize;
use std::env;

/// Configuration for the demo binary, layered the way `RestConfig` is in
/// the REST service: a default file, an environment-specific file, then
/// environment variables, each overriding the last.
#[derive(Debug, Deserialize)]
pub struct DemoConfig {
    /// `bootstrap.servers` value shared by the producer, admin client, and
    /// every consumer this binary creates.
    pub bootstrap_servers: String,

    /// Primary topic the reactor consumes from.
    pub primary_topic: String,

    /// Consumer group id used for the primary consumer.
    pub consumer_group: String,

    /// Whether independent nodes within a topological layer dispatch
    /// concurrently.
    #[serde(default)]
    pub layer_concurrency: bool,

    /// Rendezvous timeout, in milliseconds.
    #[serde(default = "default_rendezvous_timeout_ms")]
    pub rendezvous_timeout_ms: u64,
}

fn default_rendezvous_timeout_ms() -> u64 {
    5_000
}

impl DemoConfig {
    pub fn load() -> Result<Self, ConfigError> {
        let run_mode = env::var("RUN_MODE").unwrap_or_else(|_| "development".into());

        let s = Config::builder()
            .add_source(File::with_name("config/overlay_demo").required(false))
            .add_source(File::with_name(&format!("config/overlay_demo.{run_mode}")).required(false))
            .add_source(Environment::with_prefix("OVERLAY"))
            .build()?;

        s.try_deserialize()
    }
}
