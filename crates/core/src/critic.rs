//! Post-step validation against tool-specific rules and the SLO policy.

use serde_json::Value;

use crate::domain::plan::PlanStep;
use crate::policy::SloPolicy;

#[derive(Clone, Debug, PartialEq, Eq)]
pub enum CriticVerdict {
    Accept,
    Reject { reason: String },
}

impl CriticVerdict {
    pub fn is_accept(&self) -> bool {
        matches!(self, Self::Accept)
    }

    fn reject(reason: impl Into<String>) -> Self {
        Self::Reject { reason: reason.into() }
    }
}

pub fn review_step(
    step: &PlanStep,
    result: &Value,
    latency_ms: i64,
    slo: &SloPolicy,
) -> CriticVerdict {
    if step.tool == "call_rest" {
        let status = result.get("status").and_then(Value::as_i64).unwrap_or(500);
        if status >= 500 {
            return CriticVerdict::reject(format!("upstream returned status {status}"));
        }
    }

    if step.tool == "publish_kafka" {
        // A broker-path publish legitimately reports no offset; only the
        // outbox fallback is required to carry one.
        let fallback = result.get("fallback").and_then(Value::as_bool).unwrap_or(false);
        let offset_missing = result.get("offset").map(Value::is_null).unwrap_or(true);
        if fallback && offset_missing {
            return CriticVerdict::reject("fallback publish reported no offset");
        }
    }

    if let Some(max_latency_ms) = slo.max_latency_ms {
        if latency_ms > max_latency_ms {
            return CriticVerdict::reject(format!(
                "latency {latency_ms}ms exceeds slo of {max_latency_ms}ms"
            ));
        }
    }

    CriticVerdict::Accept
}
