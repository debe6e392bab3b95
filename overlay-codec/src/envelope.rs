//! Well-known fields recognized inside a [`Value`](crate::Value) mapping.

use crate::Value;
use serde_json::json;

const RETURN_TOPIC: &str = "return-topic";
const RESPONSE_TOPIC: &str = "response-topic";
const DATA: &str = "data";
const ARGS: &str = "args";

/// Reads the primary message's reply destination, if present.
pub fn return_topic(value: &Value) -> Option<&str> {
    value.get(RETURN_TOPIC).and_then(Value::as_str)
}

/// Reads the per-subtask return address injected by the orchestrator.
pub fn response_topic(value: &Value) -> Option<&str> {
    value.get(RESPONSE_TOPIC).and_then(Value::as_str)
}

/// Reads the subtask payload, checked under `data` first and `args` second
/// (both names appear across the system: `data` on the wire, `args` in a
/// dependency map's subtask spec).
pub fn data(value: &Value) -> Option<&Value> {
    value.get(DATA).or_else(|| value.get(ARGS))
}

/// Builds the outbound request envelope a rendezvous call sends to a
/// subtask topic: `{"response-topic": <r>, "data": [<arg>, ...]}`.
pub fn request(response_topic: &str, args: &[Value]) -> Value {
    json!({
        RESPONSE_TOPIC: response_topic,
        DATA: args,
    })
}

/// Builds a reply envelope addressed back to the primary message's
/// `return-topic`. The reply itself carries no extra wrapping beyond the
/// caller-supplied result — spec treats the reply envelope as "any
/// JSON-compatible value".
pub fn reply(result: Value) -> Value {
    result
}
