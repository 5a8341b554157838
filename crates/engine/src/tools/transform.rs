use async_trait::async_trait;
use serde_json::{json, Map, Value};

use crate::context::ExecutionContext;
use crate::registry::{Tool, ToolError};

/// Pure JSON transformer over the event payload and prior step results.
pub struct TransformTool;

#[async_trait]
impl Tool for TransformTool {
    fn name(&self) -> &'static str {
        "transform_json"
    }

    async fn invoke(
        &self,
        params: &Value,
        ctx: &ExecutionContext,
        _is_compensation: bool,
    ) -> Result<Value, ToolError> {
        let template = params.get("template_or_fn").and_then(Value::as_str).unwrap_or_default();

        if template == "merge_customer" {
            let customer = ctx
                .results
                .get("fetch_customer")
                .and_then(|result| result.get("json"))
                .cloned()
                .unwrap_or_else(|| json!({}));

            let mut merged: Map<String, Value> =
                ctx.event.payload.iter().map(|(key, value)| (key.clone(), value.clone())).collect();
            merged.insert("customer".to_string(), customer);

            return Ok(json!({"data": Value::Object(merged)}));
        }

        Ok(json!({
            "data": {
                "event": ctx.event.payload,
                "prior": ctx.results,
            }
        }))
    }
}
