use std::sync::Arc;

use async_trait::async_trait;
use serde_json::{json, Value};
use switchboard_core::LogSink;

use crate::context::ExecutionContext;
use crate::registry::{Tool, ToolError};

/// Routes a message toward a JMS destination through an external bridge.
/// Message ids come from a per-destination outbox counter.
pub struct JmsTool {
    sink: Arc<dyn LogSink>,
}

impl JmsTool {
    pub fn new(sink: Arc<dyn LogSink>) -> Self {
        Self { sink }
    }
}

#[async_trait]
impl Tool for JmsTool {
    fn name(&self) -> &'static str {
        "route_jms"
    }

    async fn invoke(
        &self,
        params: &Value,
        ctx: &ExecutionContext,
        is_compensation: bool,
    ) -> Result<Value, ToolError> {
        let destination =
            params.get("destination").and_then(Value::as_str).unwrap_or("QUEUE.DEFAULT");
        let payload = params.get("payload").cloned().unwrap_or_else(|| {
            json!({"trace_id": ctx.trace_id(), "event": ctx.event.payload})
        });

        let sequence = ctx.outbox.next_offset(&format!("jms:{destination}")).await?;
        let message_id = format!("jms-{sequence}");

        self.sink.emit(json!({
            "level": "info",
            "msg": "route_jms",
            "destination": destination,
            "message_id": message_id,
            "payload": payload,
            "compensation": is_compensation,
        }));

        Ok(json!({"destination": destination, "message_id": message_id}))
    }
}
