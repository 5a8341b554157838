use std::sync::Arc;

use async_trait::async_trait;
use serde_json::{json, Value};
use switchboard_core::LogSink;

use crate::context::ExecutionContext;
use crate::registry::{Tool, ToolError};

/// Opens an incident ticket. P0 tickets are human-gated: without a recorded
/// approval for `(trace_id, current step)` the invocation fails with the
/// distinguished approval signal and is never retried.
pub struct TicketTool {
    sink: Arc<dyn LogSink>,
}

impl TicketTool {
    pub fn new(sink: Arc<dyn LogSink>) -> Self {
        Self { sink }
    }
}

#[async_trait]
impl Tool for TicketTool {
    fn name(&self) -> &'static str {
        "open_ticket"
    }

    async fn invoke(
        &self,
        params: &Value,
        ctx: &ExecutionContext,
        is_compensation: bool,
    ) -> Result<Value, ToolError> {
        let priority = params.get("priority").and_then(Value::as_str).unwrap_or("P1");

        if priority == "P0" && !ctx.approvals.is_approved(ctx.trace_id(), &ctx.current_step) {
            return Err(ToolError::ApprovalRequired {
                trace_id: ctx.trace_id().to_string(),
                step: ctx.current_step.clone(),
            });
        }

        let title = params.get("title").and_then(Value::as_str).unwrap_or("Middleware incident");
        let ticket_number = ctx.outbox.next_offset("tickets").await?;

        self.sink.emit(json!({
            "level": "warning",
            "msg": "ticket_opened",
            "details": {
                "title": title,
                "priority": priority,
                "trace_id": ctx.trace_id(),
                "event_id": ctx.event.id,
            },
            "compensation": is_compensation,
        }));

        Ok(json!({"ticket_id": format!("T-{ticket_number}")}))
    }
}
