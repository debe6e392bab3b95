//! DAG Evaluator: given a named set of subtask specifications with
//! inter-subtask dependencies, computes a topological order, executes
//! subtasks respecting that order via [`overlay_rendezvous`], and threads
//! each subtask's result into its dependents' argument lists.

pub mod combinators;

use combinators::CombinatorRegistry;
use overlay_broker::BrokerAdapter;
use overlay_codec::Value;
use overlay_rendezvous::{rendezvous, RendezvousConfig, RendezvousError, RequestSpec};
use petgraph::algo::toposort;
use petgraph::graph::{DiGraph, NodeIndex};
use std::collections::HashMap;
use thiserror::Error;

/// One node's specification in a dependency map.
#[derive(Debug, Clone)]
pub struct SubtaskSpec {
    pub topic: String,
    pub args: Vec<Value>,
    /// Subtasks that must complete before this one dispatches. Order
    /// matters: the combinator folds results in this declared order, not
    /// in rendezvous-completion order.
    pub deps: Vec<String>,
    /// Name of a registered combinator; `None` means the default
    /// ([`combinators::DEFAULT_COMBINATOR`]).
    pub arg_in_fn: Option<String>,
}

impl SubtaskSpec {
    pub fn new(topic: impl Into<String>, args: Vec<Value>) -> Self {
        Self {
            topic: topic.into(),
            args,
            deps: Vec::new(),
            arg_in_fn: None,
        }
    }

    pub fn with_deps(mut self, deps: Vec<String>) -> Self {
        self.deps = deps;
        self
    }

    pub fn with_arg_in_fn(mut self, name: impl Into<String>) -> Self {
        self.arg_in_fn = Some(name.into());
        self
    }
}

/// A resolved node: the original spec plus its rendezvous result.
#[derive(Debug, Clone)]
pub struct ResolvedSubtask {
    pub spec: SubtaskSpec,
    pub result: Value,
}

/// A mapping from node name to subtask spec. A plain ordered vector, not a
/// hash map: declaration order is semantically meaningful (spec.md §4.4's
/// tie-break rule) and this is the simplest structure that preserves it.
#[derive(Debug, Clone, Default)]
pub struct DependencyMap {
    nodes: Vec<(String, SubtaskSpec)>,
}

impl DependencyMap {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(&mut self, name: impl Into<String>, spec: SubtaskSpec) -> &mut Self {
        self.nodes.push((name.into(), spec));
        self
    }

    pub fn is_empty(&self) -> bool {
        self.nodes.is_empty()
    }

    pub fn len(&self) -> usize {
        self.nodes.len()
    }

    pub fn iter(&self) -> impl Iterator<Item = &(String, SubtaskSpec)> {
        self.nodes.iter()
    }

    fn get(&self, name: &str) -> Option<&SubtaskSpec> {
        self.nodes.iter().find(|(n, _)| n == name).map(|(_, s)| s)
    }
}

impl FromIterator<(String, SubtaskSpec)> for DependencyMap {
    fn from_iter<T: IntoIterator<Item = (String, SubtaskSpec)>>(iter: T) -> Self {
        Self {
            nodes: iter.into_iter().collect(),
        }
    }
}

/// The result of a full evaluation: every node from the input, each now
/// carrying its rendezvous result.
#[derive(Debug, Clone, Default)]
pub struct ResultMap {
    nodes: Vec<(String, ResolvedSubtask)>,
}

impl ResultMap {
    pub fn get(&self, name: &str) -> Option<&ResolvedSubtask> {
        self.nodes.iter().find(|(n, _)| n == name).map(|(_, r)| r)
    }

    pub fn iter(&self) -> impl Iterator<Item = &(String, ResolvedSubtask)> {
        self.nodes.iter()
    }

    pub fn is_empty(&self) -> bool {
        self.nodes.is_empty()
    }

    pub fn len(&self) -> usize {
        self.nodes.len()
    }
}

/// Errors the evaluator can abort with.
#[derive(Debug, Error)]
pub enum DagError {
    /// The dependency map's induced graph has a cycle.
    #[error("cyclic dependencies in dependency map")]
    CyclicDependencies,

    /// A `deps` entry names a node that isn't a key in the dependency map.
    #[error("dependency map references unknown node '{0}'")]
    UnknownDependency(String),

    /// A subtask's rendezvous call failed; the whole evaluation aborts
    /// immediately with no compensation for already-completed subtasks.
    #[error(transparent)]
    Rendezvous(#[from] RendezvousError),
}

/// Evaluates a dependency map: topological order, sequential-by-default
/// dispatch, result-to-argument dataflow via the combinator registry.
pub struct DagEvaluator<'a> {
    broker: &'a dyn BrokerAdapter,
    rendezvous_config: RendezvousConfig,
    combinators: CombinatorRegistry,
    layer_concurrency: bool,
}

impl<'a> DagEvaluator<'a> {
    pub fn new(broker: &'a dyn BrokerAdapter, rendezvous_config: RendezvousConfig) -> Self {
        Self {
            broker,
            rendezvous_config,
            combinators: CombinatorRegistry::with_builtins(),
            layer_concurrency: false,
        }
    }

    pub fn with_combinators(mut self, combinators: CombinatorRegistry) -> Self {
        self.combinators = combinators;
        self
    }

    /// Opts into dispatching independent nodes within the same
    /// topological layer concurrently. The fold order of `combine` is
    /// unaffected: it's always the declared order of a node's own `deps`,
    /// never the order rendezvous calls happen to complete in.
    pub fn with_layer_concurrency(mut self, enabled: bool) -> Self {
        self.layer_concurrency = enabled;
        self
    }

    /// Runs the full evaluation algorithm from spec.md §4.4.
    pub async fn evaluate(&self, deps: &DependencyMap) -> Result<ResultMap, DagError> {
        if deps.is_empty() {
            return Ok(ResultMap::default());
        }

        let layers = layered_topological_order(deps)?;

        let mut results = ResultMap::default();

        for layer in layers {
            if self.layer_concurrency && layer.len() > 1 {
                let futures = layer.iter().map(|name| self.dispatch_node(deps, &results, name));
                let resolved = futures::future::try_join_all(futures).await?;
                for (name, resolved_subtask) in layer.into_iter().zip(resolved) {
                    results.nodes.push((name, resolved_subtask));
                }
            } else {
                for name in layer {
                    let resolved_subtask = self.dispatch_node(deps, &results, &name).await?;
                    results.nodes.push((name, resolved_subtask));
                }
            }
        }

        Ok(results)
    }

    async fn dispatch_node(
        &self,
        deps: &DependencyMap,
        results_so_far: &ResultMap,
        name: &str,
    ) -> Result<ResolvedSubtask, DagError> {
        let spec = deps
            .get(name)
            .expect("node name came from the dependency map's own graph");

        let mut args = spec.args.clone();
        let combine = self.combinators.get(spec.arg_in_fn.as_deref());
        for dep_name in &spec.deps {
            let dep_result = &results_so_far
                .get(dep_name)
                .expect("dependency already resolved by an earlier topological layer")
                .result;
            args = combine(args, dep_result);
        }

        let request = RequestSpec {
            topic: spec.topic.clone(),
            args,
        };
        let result = rendezvous(&request, self.broker, &self.rendezvous_config).await?;

        Ok(ResolvedSubtask {
            spec: spec.clone(),
            result,
        })
    }
}

/// Builds the induced graph, validates acyclicity, and groups nodes into
/// topological layers (all nodes in a layer depend only on nodes in
/// strictly earlier layers), preserving declaration order within a layer.
fn layered_topological_order(deps: &DependencyMap) -> Result<Vec<Vec<String>>, DagError> {
    let mut graph: DiGraph<String, ()> = DiGraph::new();
    let mut index_of: HashMap<String, NodeIndex> = HashMap::new();

    for (name, _) in deps.iter() {
        let idx = graph.add_node(name.clone());
        index_of.insert(name.clone(), idx);
    }

    for (name, spec) in deps.iter() {
        let to = index_of[name];
        for dep in &spec.deps {
            let from = *index_of
                .get(dep)
                .ok_or_else(|| DagError::UnknownDependency(dep.clone()))?;
            graph.add_edge(from, to, ());
        }
    }

    let order = toposort(&graph, None).map_err(|_| DagError::CyclicDependencies)?;

    // Compute each node's layer as 1 + max(layer of its deps), 0 if none.
    let mut layer_of: HashMap<String, usize> = HashMap::new();
    for idx in &order {
        let name = &graph[*idx];
        let spec = deps.get(name).expect("node present in dependency map");
        let layer = spec
            .deps
            .iter()
            .map(|d| layer_of.get(d).copied().unwrap_or(0) + 1)
            .max()
            .unwrap_or(0);
        layer_of.insert(name.clone(), layer);
    }

    let max_layer = layer_of.values().copied().max().unwrap_or(0);
    let mut layers: Vec<Vec<String>> = vec![Vec::new(); max_layer + 1];
    for (name, _) in deps.iter() {
        let layer = layer_of[name];
        layers[layer].push(name.clone());
    }

    Ok(layers)
}

#[cfg(test)]
mod tests {
    use super::*;
    use overlay_broker::testing::InMemoryBroker;
    use overlay_broker::BrokerAdapter;
    use overlay_codec::{decode, encode, envelope};
    use serde_json::json;
    use std::time::Duration;

    fn rendezvous_config() -> RendezvousConfig {
        RendezvousConfig {
            consumer_config: Default::default(),
            timeout: Duration::from_millis(500),
        }
    }

    /// Spawns a fake subtask service that replies with whatever the
    /// provided function computes from the request's `data`.
    fn spawn_responder<F>(broker: InMemoryBroker, topic: &str, reply_fn: F)
    where
        F: Fn(Value) -> Value + Send + 'static,
    {
        let broker_clone = broker.clone();
        let topic = topic.to_string();
        tokio::spawn(async move {
            broker_clone.create_topic(&topic).await.unwrap();
            let mut consumer = broker_clone
                .subscribe(&Default::default(), &topic)
                .await
                .unwrap();
            loop {
                let msg = match consumer.recv().await {
                    Ok(msg) => msg,
                    Err(_) => break,
                };
                let request: Value = decode(&msg.value).unwrap();
                let response_topic = envelope::response_topic(&request).unwrap().to_string();
                let data = envelope::data(&request).cloned().unwrap_or(json!(null));
                let reply = encode(&reply_fn(data)).unwrap();
                broker_clone.produce(&response_topic, b"", reply).await.unwrap();
            }
        });
    }

    #[tokio::test]
    async fn empty_dependency_map_returns_empty_result() {
        let broker = InMemoryBroker::new();
        let evaluator = DagEvaluator::new(&broker, rendezvous_config());
        let result = evaluator.evaluate(&DependencyMap::new()).await.unwrap();
        assert!(result.is_empty());
    }

    #[tokio::test]
    async fn node_with_no_deps_gets_its_original_args() {
        let broker = InMemoryBroker::new();
        spawn_responder(broker.clone(), "add", |data| {
            let sum: i64 = data.as_array().unwrap().iter().map(|v| v.as_i64().unwrap()).sum();
            json!(sum)
        });
        // give the responder a moment to create its topic and subscribe
        tokio::time::sleep(Duration::from_millis(50)).await;

        let mut deps = DependencyMap::new();
        deps.insert("a", SubtaskSpec::new("add", vec![json!(1), json!(2), json!(3)]));

        let evaluator = DagEvaluator::new(&broker, rendezvous_config());
        let results = evaluator.evaluate(&deps).await.unwrap();

        assert_eq!(results.get("a").unwrap().result, json!(6));
    }

    #[tokio::test]
    async fn chain_with_custom_combinator_threads_result_into_next_call() {
        let broker = InMemoryBroker::new();
        spawn_responder(broker.clone(), "add", |data| {
            let sum: i64 = data.as_array().unwrap().iter().map(|v| v.as_i64().unwrap()).sum();
            json!(sum)
        });
        spawn_responder(broker.clone(), "sub", |data| {
            let items: Vec<i64> = data.as_array().unwrap().iter().map(|v| v.as_i64().unwrap()).collect();
            json!(items[0] - items[1])
        });
        tokio::time::sleep(Duration::from_millis(50)).await;

        let mut deps = DependencyMap::new();
        deps.insert("one", SubtaskSpec::new("add", vec![json!(1), json!(2), json!(3)]));
        deps.insert(
            "two",
            SubtaskSpec::new("sub", vec![json!(2)])
                .with_arg_in_fn("prepend")
                .with_deps(vec!["one".to_string()]),
        );

        let evaluator = DagEvaluator::new(&broker, rendezvous_config());
        let results = evaluator.evaluate(&deps).await.unwrap();

        assert_eq!(results.get("one").unwrap().result, json!(6));
        assert_eq!(results.get("two").unwrap().result, json!(4));
    }

    #[tokio::test]
    async fn cycle_is_rejected_before_any_dispatch() {
        let broker = InMemoryBroker::new();

        let mut deps = DependencyMap::new();
        deps.insert("a", SubtaskSpec::new("x", vec![]).with_deps(vec!["b".to_string()]));
        deps.insert("b", SubtaskSpec::new("y", vec![]).with_deps(vec!["a".to_string()]));

        let evaluator = DagEvaluator::new(&broker, rendezvous_config());
        let err = evaluator.evaluate(&deps).await.unwrap_err();

        assert!(matches!(err, DagError::CyclicDependencies));
        assert_eq!(broker.topic_count(), 0, "no ephemeral topics should be created for a rejected cycle");
    }

    #[tokio::test]
    async fn independent_layer_preserves_declared_fold_order_under_concurrency() {
        let broker = InMemoryBroker::new();
        spawn_responder(broker.clone(), "left", |_| json!("L"));
        spawn_responder(broker.clone(), "right", |_| json!("R"));
        spawn_responder(broker.clone(), "join", |data| data);
        tokio::time::sleep(Duration::from_millis(50)).await;

        let mut deps = DependencyMap::new();
        deps.insert("left", SubtaskSpec::new("left", vec![]));
        deps.insert("right", SubtaskSpec::new("right", vec![]));
        deps.insert(
            "joined",
            SubtaskSpec::new("join", vec![])
                .with_arg_in_fn("append")
                .with_deps(vec!["left".to_string(), "right".to_string()]),
        );

        let evaluator = DagEvaluator::new(&broker, rendezvous_config()).with_layer_concurrency(true);
        let results = evaluator.evaluate(&deps).await.unwrap();

        assert_eq!(results.get("joined").unwrap().result, json!(["L", "R"]));
    }
}
