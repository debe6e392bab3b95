//! Translates between broker records (opaque bytes) and structured payloads.
//!
//! The overlay treats every payload as an open, JSON-shaped value: a scalar,
//! a sequence, or a string-keyed mapping. [`Value`] is a direct alias for
//! [`serde_json::Value`] rather than a hand-rolled sum type, since that's
//! already exactly the shape spec calls for.
//!
//! A handful of field names inside a `Value` mapping carry special meaning
//! to the rest of the overlay (`return-topic`, `response-topic`, `data`);
//! the [`envelope`] module centralizes reading and building them so no other
//! crate has to remember the exact key strings.

pub mod envelope;

use thiserror::Error;

/// A structured payload. An alias, not a newtype, so callers can use the
/// full `serde_json::Value` API (`.get`, `.as_str`, `json!`, ...) directly.
pub type Value = serde_json::Value;

/// Errors raised while translating between bytes and [`Value`].
#[derive(Debug, Error)]
pub enum CodecError {
    /// The bytes did not parse as a well-formed payload.
    #[error("malformed payload: {0}")]
    MalformedPayload(#[from] serde_json::Error),
}

/// Serializes a structured value to its compact textual (JSON) wire form.
pub fn encode(value: &Value) -> Result<Vec<u8>, CodecError> {
    Ok(serde_json::to_vec(value)?)
}

/// Parses bytes pulled off the broker into a structured value.
///
/// Fails with [`CodecError::MalformedPayload`] if the bytes are not
/// well-formed JSON.
pub fn decode(bytes: &[u8]) -> Result<Value, CodecError> {
    serde_json::from_slice(bytes).map_err(CodecError::MalformedPayload)
}
