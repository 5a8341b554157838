use std::sync::Arc;

use async_trait::async_trait;
use serde_json::{json, Value};
use switchboard_core::LogSink;

use crate::broker::BrokerCapability;
use crate::context::ExecutionContext;
use crate::registry::{Tool, ToolError};

/// Publishes `{trace_id, event}` to the broker, or allocates an outbox offset
/// for the topic when no producer is available. The fallback path is
/// observable through the emitted record's `fallback: true`.
pub struct PublishTool {
    capability: BrokerCapability,
    sink: Arc<dyn LogSink>,
}

impl PublishTool {
    pub fn new(capability: BrokerCapability, sink: Arc<dyn LogSink>) -> Self {
        Self { capability, sink }
    }

    async fn fallback(
        &self,
        topic: &str,
        ctx: &ExecutionContext,
        msg: &str,
    ) -> Result<Value, ToolError> {
        let offset = ctx.outbox.next_offset(topic).await?;
        self.sink.emit(json!({
            "level": "info",
            "msg": msg,
            "topic": topic,
            "offset": offset,
            "fallback": true,
        }));
        Ok(json!({"offset": offset, "topic": topic, "fallback": true}))
    }
}

#[async_trait]
impl Tool for PublishTool {
    fn name(&self) -> &'static str {
        "publish_kafka"
    }

    async fn invoke(
        &self,
        params: &Value,
        ctx: &ExecutionContext,
        _is_compensation: bool,
    ) -> Result<Value, ToolError> {
        let topic = params.get("topic").and_then(Value::as_str).unwrap_or("default");
        let payload = json!({"trace_id": ctx.trace_id(), "event": ctx.event.payload});
        let bytes = serde_json::to_vec(&payload)
            .map_err(|error| ToolError::Broker(error.to_string()))?;

        match &self.capability {
            BrokerCapability::Available(producer) => match producer.publish(topic, &bytes).await {
                Ok(()) => {
                    self.sink.emit(json!({
                        "level": "info",
                        "msg": "publish_ok",
                        "topic": topic,
                        "fallback": false,
                    }));
                    Ok(json!({"offset": Value::Null, "topic": topic}))
                }
                Err(error) => {
                    self.sink.emit(json!({
                        "level": "error",
                        "msg": "publish_failed",
                        "topic": topic,
                        "error": error.to_string(),
                    }));
                    self.fallback(topic, ctx, "publish_fallback").await
                }
            },
            BrokerCapability::Unavailable => self.fallback(topic, ctx, "publish_stub").await,
        }
    }
}
