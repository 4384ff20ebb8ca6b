//! The `{type, data}` wire envelope.

use serde::{Deserialize, Serialize};
use serde_json::Value;

/// Unit of transport between contexts.
///
/// An envelope is self-describing structured text with exactly two
/// top-level fields: a string discriminator and an arbitrary payload that
/// is opaque to the bus. It round-trips losslessly through JSON.
///
/// Inbound payloads that fail to parse as an envelope are never surfaced
/// as errors; the channel is shared with unrelated traffic and foreign
/// payloads are routine.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Envelope {
    /// Message type discriminator (e.g. `"rpc_request"`).
    #[serde(rename = "type")]
    pub kind: String,

    /// Application payload, opaque to the bus. Defaults to `null` when the
    /// sender omitted it.
    #[serde(default)]
    pub data: Value,
}

impl Envelope {
    /// Build an envelope from a kind and payload.
    pub fn new(kind: impl Into<String>, data: Value) -> Self {
        Self {
            kind: kind.into(),
            data,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_envelope_serializes_with_type_field() {
        let envelope = Envelope::new("ready", json!({"ok": true}));
        let text = serde_json::to_string(&envelope).unwrap();
        assert_eq!(text, r#"{"type":"ready","data":{"ok":true}}"#);
    }

    #[test]
    fn test_envelope_roundtrip() {
        let envelope = Envelope::new("rpc_request", json!({"id": 0, "method": "echo"}));
        let text = serde_json::to_string(&envelope).unwrap();
        let parsed: Envelope = serde_json::from_str(&text).unwrap();
        assert_eq!(parsed, envelope);
    }

    #[test]
    fn test_envelope_missing_data_defaults_to_null() {
        let parsed: Envelope = serde_json::from_str(r#"{"type":"ready"}"#).unwrap();
        assert_eq!(parsed.kind, "ready");
        assert_eq!(parsed.data, Value::Null);
    }

    #[test]
    fn test_envelope_rejects_foreign_shapes() {
        assert!(serde_json::from_str::<Envelope>("not json at all").is_err());
        assert!(serde_json::from_str::<Envelope>(r#""just a string""#).is_err());
        assert!(serde_json::from_str::<Envelope>(r#"{"type":5}"#).is_err());
        assert!(serde_json::from_str::<Envelope>(r#"{"data":{}}"#).is_err());
    }
}
