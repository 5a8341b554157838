use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};
use serde_json::Value;

/// Terminal result of handling one event.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum EventOutcome {
    Ok { trace_id: String, results: BTreeMap<String, Value> },
    Failed { trace_id: String, partial: BTreeMap<String, Value>, failed_step: String },
}

impl EventOutcome {
    pub fn trace_id(&self) -> &str {
        match self {
            Self::Ok { trace_id, .. } | Self::Failed { trace_id, .. } => trace_id,
        }
    }

    pub fn is_ok(&self) -> bool {
        matches!(self, Self::Ok { .. })
    }
}
