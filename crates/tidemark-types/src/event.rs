use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};
use serde_json::Value;

/// A single event payload with optional per-event headers.
///
/// Tidemark is payload-agnostic: the body is an opaque JSON value chosen by
/// the caller and never interpreted by the store. Headers carry
/// cross-cutting context (correlation ids, causation ids, actor identity)
/// that should not live in the domain payload itself.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct EventMessage {
    /// Metadata about this event.
    pub headers: BTreeMap<String, Value>,
    /// The event payload.
    pub body: Value,
}

impl EventMessage {
    /// Create an event with the given body and no headers.
    pub fn new(body: Value) -> Self {
        Self {
            headers: BTreeMap::new(),
            body,
        }
    }

    /// Attach a header to this event (builder style).
    pub fn with_header(mut self, name: impl Into<String>, value: Value) -> Self {
        self.headers.insert(name.into(), value);
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn new_has_no_headers() {
        let event = EventMessage::new(json!({"kind": "OrderPlaced"}));
        assert!(event.headers.is_empty());
        assert_eq!(event.body["kind"], "OrderPlaced");
    }

    #[test]
    fn with_header_accumulates() {
        let event = EventMessage::new(json!(1))
            .with_header("correlation", json!("abc"))
            .with_header("actor", json!("svc-billing"));
        assert_eq!(event.headers.len(), 2);
        assert_eq!(event.headers["correlation"], json!("abc"));
    }

    #[test]
    fn serde_roundtrip() {
        let event = EventMessage::new(json!({"n": 42})).with_header("k", json!("v"));
        let json = serde_json::to_string(&event).unwrap();
        let parsed: EventMessage = serde_json::from_str(&json).unwrap();
        assert_eq!(event, parsed);
    }
}
