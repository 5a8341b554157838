//! Binds the per-event context and drives the plan: sense, plan, execute in
//! topological order with critic review, and unwind compensations on failure.

use std::sync::Arc;

use serde_json::json;
use switchboard_core::{
    build_plan, infer_intents, review_step, CriticVerdict, Event, EventOutcome, LogSink,
    PlanError, PolicySnapshot,
};
use switchboard_db::Outbox;
use thiserror::Error;
use tracing::Instrument;

use crate::approvals::ApprovalLedger;
use crate::context::ExecutionContext;
use crate::executor::StepExecutor;
use crate::registry::ToolRegistry;

#[derive(Debug, Error)]
pub enum OrchestratorError {
    #[error(transparent)]
    Plan(#[from] PlanError),
    #[error("plan has {steps} steps, exceeding slo.max_steps of {max_steps}")]
    PlanTooLarge { steps: usize, max_steps: usize },
}

pub struct EventOrchestrator {
    policy: Arc<PolicySnapshot>,
    outbox: Arc<dyn Outbox>,
    approvals: Arc<ApprovalLedger>,
    registry: Arc<ToolRegistry>,
    executor: StepExecutor,
    sink: Arc<dyn LogSink>,
}

impl EventOrchestrator {
    pub fn new(
        policy: Arc<PolicySnapshot>,
        outbox: Arc<dyn Outbox>,
        approvals: Arc<ApprovalLedger>,
        registry: Arc<ToolRegistry>,
        sink: Arc<dyn LogSink>,
    ) -> Self {
        let executor = StepExecutor::new(Arc::clone(&registry), Arc::clone(&sink));
        Self { policy, outbox, approvals, registry, executor, sink }
    }

    pub fn approvals(&self) -> Arc<ApprovalLedger> {
        Arc::clone(&self.approvals)
    }

    pub async fn handle_event(
        &self,
        mut event: Event,
    ) -> Result<EventOutcome, OrchestratorError> {
        event.ensure_trace_id();
        let mut ctx = ExecutionContext::new(
            event,
            Arc::clone(&self.policy),
            Arc::clone(&self.outbox),
            Arc::clone(&self.approvals),
        );

        {
            let span = tracing::info_span!("sense");
            let _entered = span.enter();
            self.sink.emit(json!({
                "level": "info",
                "msg": "sense",
                "trace_id": ctx.trace_id(),
                "etype": ctx.event.event_type,
                "eid": ctx.event.id,
            }));
        }

        let plan = {
            let span = tracing::info_span!("think_plan");
            let _entered = span.enter();
            let intents = infer_intents(&ctx.event.observation());
            build_plan(&intents)?
        };

        let max_steps = self.policy.slo.max_steps;
        if plan.len() > max_steps {
            return Err(OrchestratorError::PlanTooLarge { steps: plan.len(), max_steps });
        }

        let order: Vec<_> = plan.topo_order()?.into_iter().cloned().collect();
        for step in order {
            let span = tracing::info_span!("act", step = %step.name);
            let executed = self.executor.execute(&step, &mut ctx).instrument(span).await;

            let result = match executed {
                Ok(result) => result,
                Err(error) => {
                    self.recover(&mut ctx).await;
                    return Ok(self.failed(&mut ctx, &step.name, &error.to_string()));
                }
            };

            ctx.completed_steps.push(step.clone());
            ctx.results.insert(step.name.clone(), result.clone());

            if let CriticVerdict::Reject { reason } =
                review_step(&step, &result, ctx.latency_ms(), &self.policy.slo)
            {
                self.sink.emit(json!({
                    "level": "error",
                    "msg": "critic_reject",
                    "step": step.name,
                    "reason": reason,
                }));
                self.recover(&mut ctx).await;
                return Ok(self.failed(&mut ctx, &step.name, &reason));
            }
        }

        self.sink.emit(json!({
            "level": "info",
            "msg": "plan_success",
            "trace_id": ctx.trace_id(),
        }));
        Ok(EventOutcome::Ok { trace_id: ctx.trace_id().to_string(), results: ctx.results })
    }

    /// Best-effort saga unwind: compensations of completed steps run in
    /// reverse completion order, and one failing compensation never stops
    /// the rest.
    async fn recover(&self, ctx: &mut ExecutionContext) {
        let completed: Vec<_> = ctx.completed_steps.iter().rev().cloned().collect();
        for step in completed {
            let Some(compensation) = step.compensation else {
                continue;
            };
            match self
                .registry
                .dispatch(&compensation.tool, &compensation.params, ctx, true)
                .await
            {
                Ok(_) => self.sink.emit(json!({
                    "level": "warning",
                    "msg": "compensation_ok",
                    "step": step.name,
                })),
                Err(error) => self.sink.emit(json!({
                    "level": "error",
                    "msg": "compensation_failed",
                    "step": step.name,
                    "error": error.to_string(),
                })),
            }
        }
    }

    fn failed(&self, ctx: &mut ExecutionContext, step_name: &str, error: &str) -> EventOutcome {
        self.sink.emit(json!({
            "level": "error",
            "msg": "plan_failed",
            "step": step_name,
            "trace_id": ctx.trace_id(),
            "error": error,
        }));
        EventOutcome::Failed {
            trace_id: ctx.trace_id().to_string(),
            partial: std::mem::take(&mut ctx.results),
            failed_step: step_name.to_string(),
        }
    }
}
