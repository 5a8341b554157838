use std::collections::BTreeMap;
use std::sync::Arc;

use chrono::Utc;
use serde_json::Value;
use switchboard_core::{Event, PlanStep, PolicySnapshot};
use switchboard_db::Outbox;

use crate::approvals::ApprovalLedger;

/// Per-event execution state. Owned exclusively by the orchestrator for the
/// duration of one event and discarded afterwards; the outbox and approvals
/// handles it carries are the process-wide shared instances.
pub struct ExecutionContext {
    pub event: Event,
    pub policy: Arc<PolicySnapshot>,
    pub outbox: Arc<dyn Outbox>,
    pub approvals: Arc<ApprovalLedger>,
    pub started_at_ms: i64,
    pub completed_steps: Vec<PlanStep>,
    pub results: BTreeMap<String, Value>,
    pub current_step: String,
}

impl ExecutionContext {
    pub fn new(
        event: Event,
        policy: Arc<PolicySnapshot>,
        outbox: Arc<dyn Outbox>,
        approvals: Arc<ApprovalLedger>,
    ) -> Self {
        Self {
            event,
            policy,
            outbox,
            approvals,
            started_at_ms: Utc::now().timestamp_millis(),
            completed_steps: Vec::new(),
            results: BTreeMap::new(),
            current_step: String::new(),
        }
    }

    pub fn trace_id(&self) -> &str {
        self.event.trace_id()
    }

    pub fn latency_ms(&self) -> i64 {
        Utc::now().timestamp_millis() - self.started_at_ms
    }
}
