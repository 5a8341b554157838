//! Drives a single plan step: outbox idempotency check, tool dispatch, and
//! retry with capped exponential backoff plus jitter.

use std::sync::Arc;
use std::time::Duration;

use rand::Rng;
use serde_json::{json, Value};
use switchboard_core::{LogSink, PlanStep};
use thiserror::Error;

use crate::context::ExecutionContext;
use crate::registry::{ToolError, ToolRegistry};

const JITTER_MS: u64 = 50;

#[derive(Debug, Error)]
#[error("step `{step}` failed: {source}")]
pub struct StepError {
    pub step: String,
    #[source]
    pub source: ToolError,
}

pub struct StepExecutor {
    registry: Arc<ToolRegistry>,
    sink: Arc<dyn LogSink>,
}

impl StepExecutor {
    pub fn new(registry: Arc<ToolRegistry>, sink: Arc<dyn LogSink>) -> Self {
        Self { registry, sink }
    }

    pub async fn execute(
        &self,
        step: &PlanStep,
        ctx: &mut ExecutionContext,
    ) -> Result<Value, StepError> {
        let idem_key = format!("{}:{}", ctx.event.id, step.name);

        let saved = ctx
            .outbox
            .get(&idem_key)
            .await
            .map_err(|error| self.fail(step, ToolError::Outbox(error)))?;
        if let Some(saved) = saved {
            self.sink.emit(json!({
                "level": "info",
                "msg": "idempotent_reuse",
                "step": step.name,
                "key": idem_key,
            }));
            return Ok(saved);
        }

        let retry = &ctx.policy.execution.retry;
        let (base_ms, max_ms) = (retry.base_ms, retry.max_ms);
        let max_retries = ctx.policy.slo.max_retries;

        let mut attempt: u32 = 0;
        loop {
            attempt += 1;
            ctx.current_step = step.name.clone();

            match self.registry.dispatch(&step.tool, &step.params, ctx, false).await {
                Ok(result) => {
                    ctx.outbox
                        .put(&idem_key, &result)
                        .await
                        .map_err(|error| self.fail(step, ToolError::Outbox(error)))?;
                    self.sink.emit(json!({"level": "info", "msg": "step_ok", "step": step.name}));
                    return Ok(result);
                }
                Err(error @ ToolError::ApprovalRequired { .. }) => {
                    self.sink.emit(json!({
                        "level": "warning",
                        "msg": "step_waiting_approval",
                        "step": step.name,
                    }));
                    return Err(StepError { step: step.name.clone(), source: error });
                }
                Err(error) if !error.is_retryable() => {
                    self.sink.emit(json!({
                        "level": "error",
                        "msg": "step_failed",
                        "step": step.name,
                        "error": error.to_string(),
                    }));
                    return Err(StepError { step: step.name.clone(), source: error });
                }
                Err(error) => {
                    self.sink.emit(json!({
                        "level": "warning",
                        "msg": "step_retry",
                        "step": step.name,
                        "attempt": attempt,
                        "error": error.to_string(),
                    }));
                    if attempt > max_retries {
                        self.sink.emit(json!({
                            "level": "error",
                            "msg": "step_failed",
                            "step": step.name,
                            "error": error.to_string(),
                        }));
                        return Err(StepError { step: step.name.clone(), source: error });
                    }
                    let jitter = rand::thread_rng().gen_range(0..JITTER_MS);
                    let delay = backoff_ms(base_ms, max_ms, attempt) + jitter;
                    tokio::time::sleep(Duration::from_millis(delay)).await;
                }
            }
        }
    }

    fn fail(&self, step: &PlanStep, source: ToolError) -> StepError {
        self.sink.emit(json!({
            "level": "error",
            "msg": "step_failed",
            "step": step.name,
            "error": source.to_string(),
        }));
        StepError { step: step.name.clone(), source }
    }
}

fn backoff_ms(base_ms: u64, max_ms: u64, attempt: u32) -> u64 {
    let factor = 2u64.saturating_pow(attempt.saturating_sub(1));
    max_ms.min(base_ms.saturating_mul(factor))
}
