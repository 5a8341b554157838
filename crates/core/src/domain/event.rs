use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};
use serde_json::Value;
use uuid::Uuid;

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct Event {
    pub id: String,
    pub source: String,
    #[serde(rename = "type")]
    pub event_type: String,
    #[serde(default)]
    pub payload: BTreeMap<String, Value>,
    #[serde(default)]
    pub headers: BTreeMap<String, String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub trace_id: Option<String>,
}

/// Read-only view handed to the planner. The event itself stays immutable
/// after ingest apart from the one-time trace id assignment.
#[derive(Clone, Copy, Debug)]
pub struct Observation<'a> {
    pub event_type: &'a str,
    pub payload: &'a BTreeMap<String, Value>,
    pub headers: &'a BTreeMap<String, String>,
}

impl Event {
    /// Assigns a fresh trace id if none was supplied at ingest, and returns
    /// the effective trace id.
    pub fn ensure_trace_id(&mut self) -> &str {
        if self.trace_id.is_none() {
            self.trace_id = Some(Uuid::new_v4().to_string());
        }
        self.trace_id.as_deref().unwrap_or_default()
    }

    pub fn trace_id(&self) -> &str {
        self.trace_id.as_deref().unwrap_or_default()
    }

    pub fn observation(&self) -> Observation<'_> {
        Observation {
            event_type: &self.event_type,
            payload: &self.payload,
            headers: &self.headers,
        }
    }
}

#[cfg(test)]
mod tests {
    use std::collections::BTreeMap;

    use super::Event;

    fn event_fixture(trace_id: Option<&str>) -> Event {
        Event {
            id: "e-1".to_string(),
            source: "shop".to_string(),
            event_type: "ORDER_CREATED".to_string(),
            payload: BTreeMap::new(),
            headers: BTreeMap::new(),
            trace_id: trace_id.map(str::to_string),
        }
    }

    #[test]
    fn ensure_trace_id_assigns_once_and_keeps_existing() {
        let mut event = event_fixture(None);
        let assigned = event.ensure_trace_id().to_string();
        assert!(!assigned.is_empty());
        assert_eq!(event.ensure_trace_id(), assigned);

        let mut event = event_fixture(Some("trace-7"));
        assert_eq!(event.ensure_trace_id(), "trace-7");
    }

    #[test]
    fn event_deserializes_with_defaults_for_optional_fields() {
        let event: Event = serde_json::from_str(
            r#"{"id": "e-2", "source": "shop", "type": "ORDER_CREATED"}"#,
        )
        .expect("minimal event should deserialize");

        assert_eq!(event.event_type, "ORDER_CREATED");
        assert!(event.payload.is_empty());
        assert!(event.headers.is_empty());
        assert!(event.trace_id.is_none());
    }
}
