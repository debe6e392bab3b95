//! Named `arg-in-fn` combinators: given the args accumulated so far and one
//! upstream dependency's result, return the new args. Registered under a
//! string name so a dependency map can reference one by key (spec.md §9
//! design note) rather than carrying a first-class function value.

use overlay_codec::Value;
use std::collections::HashMap;
use std::sync::Arc;
use tracing::warn;

/// A combinator: `(args_so_far, one_dep_result) -> new_args`. Must be
/// deterministic and total over the domain it's registered for.
pub type Combinator = Arc<dyn Fn(Vec<Value>, &Value) -> Vec<Value> + Send + Sync>;

/// The name of the combinator applied when a subtask spec doesn't name one.
pub const DEFAULT_COMBINATOR: &str = "append";

/// Appends the dependency's result to the tail of the args list.
pub fn append(mut args: Vec<Value>, result: &Value) -> Vec<Value> {
    args.push(result.clone());
    args
}

/// Inserts the dependency's result at the head of the args list.
pub fn prepend(mut args: Vec<Value>, result: &Value) -> Vec<Value> {
    args.insert(0, result.clone());
    args
}

/// Merges the dependency's result into the args list:
/// - if `result` is a JSON array, its elements are appended individually;
/// - if `result` is a JSON object and the last arg is also an object, the
///   two objects are shallow-merged (result's keys win on conflict);
/// - otherwise falls back to [`append`] and logs a warning, since there's
///   no sensible merge for a scalar against a non-object tail.
pub fn merge(mut args: Vec<Value>, result: &Value) -> Vec<Value> {
    match result {
        Value::Array(items) => {
            args.extend(items.iter().cloned());
            args
        }
        Value::Object(incoming) => match args.last_mut() {
            Some(Value::Object(existing)) => {
                for (k, v) in incoming {
                    existing.insert(k.clone(), v.clone());
                }
                args
            }
            _ => {
                warn!("merge combinator: no object tail to merge into, falling back to append");
                append(args, result)
            }
        },
        _ => {
            warn!("merge combinator: scalar dependency result, falling back to append");
            append(args, result)
        }
    }
}

/// A name -> combinator lookup table. Construction starts from the
/// built-ins (`append`, `prepend`, `merge`); callers register additional
/// custom combinators at reactor construction time (spec.md §9).
#[derive(Clone)]
pub struct CombinatorRegistry {
    combinators: HashMap<String, Combinator>,
}

impl CombinatorRegistry {
    /// A registry seeded with the built-in combinators.
    pub fn with_builtins() -> Self {
        let mut registry = Self {
            combinators: HashMap::new(),
        };
        registry.register("append", append);
        registry.register("prepend", prepend);
        registry.register("merge", merge);
        registry
    }

    /// Registers (or overwrites) a named combinator.
    pub fn register<F>(&mut self, name: &str, f: F)
    where
        F: Fn(Vec<Value>, &Value) -> Vec<Value> + Send + Sync + 'static,
    {
        self.combinators.insert(name.to_string(), Arc::new(f));
    }

    /// Looks up a combinator by name, falling back to [`append`] (and
    /// warning) if the name is unregistered.
    pub fn get(&self, name: Option<&str>) -> Combinator {
        let name = name.unwrap_or(DEFAULT_COMBINATOR);
        match self.combinators.get(name) {
            Some(combinator) => combinator.clone(),
            None => {
                warn!("unregistered combinator '{}', falling back to append", name);
                Arc::new(append)
            }
        }
    }
}

impl Default for CombinatorRegistry {
    fn default() -> Self {
        Self::with_builtins()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn append_adds_to_tail() {
        let args = append(vec![json!(1), json!(2)], &json!(3));
        assert_eq!(args, vec![json!(1), json!(2), json!(3)]);
    }

    #[test]
    fn prepend_adds_to_head() {
        let args = prepend(vec![json!(2)], &json!(6));
        assert_eq!(args, vec![json!(6), json!(2)]);
    }

    #[test]
    fn merge_extends_arrays() {
        let args = merge(vec![json!(1)], &json!([2, 3]));
        assert_eq!(args, vec![json!(1), json!(2), json!(3)]);
    }

    #[test]
    fn merge_combines_trailing_objects() {
        let args = merge(vec![json!({"a": 1})], &json!({"b": 2}));
        assert_eq!(args, vec![json!({"a": 1, "b": 2})]);
    }

    #[test]
    fn merge_falls_back_to_append_for_scalars() {
        let args = merge(vec![json!(1)], &json!(2));
        assert_eq!(args, vec![json!(1), json!(2)]);
    }

    #[test]
    fn registry_falls_back_to_append_for_unknown_names() {
        let registry = CombinatorRegistry::with_builtins();
        let combinator = registry.get(Some("does-not-exist"));
        assert_eq!(combinator(vec![json!(1)], &json!(2)), vec![json!(1), json!(2)]);
    }

    #[test]
    fn registry_supports_custom_combinators() {
        let mut registry = CombinatorRegistry::with_builtins();
        registry.register("double-prepend", |mut args: Vec<Value>, result: &Value| {
            args.insert(0, result.clone());
            args.insert(0, result.clone());
            args
        });
        let combinator = registry.get(Some("double-prepend"));
        assert_eq!(
            combinator(vec![json!(1)], &json!(9)),
            vec![json!(9), json!(9), json!(1)]
        );
    }
}
