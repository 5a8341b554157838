//! Tool registry: name to handler mapping, registered once at startup and
//! read-only afterwards. Dispatch enforces the RBAC allow-list before any
//! handler runs.

use std::collections::HashMap;
use std::sync::Arc;

use async_trait::async_trait;
use serde_json::Value;
use switchboard_db::OutboxError;
use thiserror::Error;

use crate::context::ExecutionContext;

#[async_trait]
pub trait Tool: Send + Sync {
    fn name(&self) -> &'static str;

    async fn invoke(
        &self,
        params: &Value,
        ctx: &ExecutionContext,
        is_compensation: bool,
    ) -> Result<Value, ToolError>;
}

#[derive(Debug, Error)]
pub enum ToolError {
    #[error("unknown tool `{0}`")]
    Unknown(String),
    #[error("tool `{0}` not allowed by rbac policy")]
    PermissionDenied(String),
    #[error("approval required for step `{step}` on trace `{trace_id}`")]
    ApprovalRequired { trace_id: String, step: String },
    #[error("invalid params for `{tool}`: {reason}")]
    InvalidParams { tool: &'static str, reason: String },
    #[error("http transport failure: {0}")]
    Transport(String),
    #[error("broker publish failure: {0}")]
    Broker(String),
    #[error(transparent)]
    Outbox(#[from] OutboxError),
}

impl ToolError {
    /// Transient failures are retried by the executor; permission and
    /// approval signals propagate immediately.
    pub fn is_retryable(&self) -> bool {
        matches!(self, Self::Transport(_) | Self::Broker(_) | Self::Outbox(_))
    }
}

#[derive(Default)]
pub struct ToolRegistry {
    tools: HashMap<String, Arc<dyn Tool>>,
}

impl ToolRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn register(&mut self, tool: impl Tool + 'static) {
        self.tools.insert(tool.name().to_string(), Arc::new(tool));
    }

    pub fn tool_names(&self) -> Vec<String> {
        self.tools.keys().cloned().collect()
    }

    pub async fn dispatch(
        &self,
        name: &str,
        params: &Value,
        ctx: &ExecutionContext,
        is_compensation: bool,
    ) -> Result<Value, ToolError> {
        let tool =
            self.tools.get(name).ok_or_else(|| ToolError::Unknown(name.to_string()))?;
        if !ctx.policy.rbac.roles.agent.allow_tools.contains(name) {
            return Err(ToolError::PermissionDenied(name.to_string()));
        }
        tool.invoke(params, ctx, is_compensation).await
    }
}
