//! Maps an observation to intents and intents to an executable plan.
//!
//! Intent inference is a deterministic rule table evaluated top to bottom,
//! first match wins. Plan assembly only wires a dependency to a step that was
//! actually added, so every produced plan passes validation.

use serde_json::{json, Value};

use crate::domain::event::Observation;
use crate::domain::plan::{CompensationSpec, Plan, PlanError, PlanStep};

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Intent {
    EnrichOrder,
    ReserveInventory,
    NotifyOms,
}

impl Intent {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::EnrichOrder => "enrich_order",
            Self::ReserveInventory => "reserve_inventory",
            Self::NotifyOms => "notify_oms",
        }
    }
}

pub fn infer_intents(observation: &Observation<'_>) -> Vec<Intent> {
    let region = observation
        .payload
        .get("region")
        .or_else(|| observation.payload.get("Region"))
        .and_then(Value::as_str);

    if observation.event_type == "ORDER_CREATED" && matches!(region, Some("US") | Some("EU")) {
        return vec![Intent::EnrichOrder, Intent::ReserveInventory, Intent::NotifyOms];
    }

    vec![Intent::NotifyOms]
}

pub fn build_plan(intents: &[Intent]) -> Result<Plan, PlanError> {
    let mut plan = Plan::new();
    let enrich = intents.contains(&Intent::EnrichOrder);
    let reserve = intents.contains(&Intent::ReserveInventory);

    if enrich {
        plan.add_step(PlanStep::new(
            "fetch_customer",
            "call_rest",
            json!({"url": "/crm/customer", "method": "GET"}),
        ))?;
        plan.add_step(
            PlanStep::new(
                "merge_profile",
                "transform_json",
                json!({"template_or_fn": "merge_customer"}),
            )
            .depends_on(&["fetch_customer"]),
        )?;
    }

    if reserve {
        let mut step = PlanStep::new(
            "reserve",
            "call_rest",
            json!({"url": "/wms/reservations", "method": "POST"}),
        );
        if enrich {
            step = step.depends_on(&["merge_profile"]);
        }
        plan.add_step(step)?;
        plan.add_compensation(
            "reserve",
            CompensationSpec {
                tool: "call_rest".to_string(),
                params: json!({"url": "/wms/cancel_reservation", "method": "POST"}),
            },
        )?;
    }

    if intents.contains(&Intent::NotifyOms) {
        let mut step = PlanStep::new("publish", "publish_kafka", json!({"topic": "oms.events"}));
        if plan.step("reserve").is_some() {
            step = step.depends_on(&["reserve"]);
        }
        plan.add_step(step)?;
    }

    plan.validate()?;
    Ok(plan)
}
