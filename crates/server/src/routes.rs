use std::sync::Arc;

use axum::extract::{Query, State};
use axum::http::StatusCode;
use axum::routing::post;
use axum::{Json, Router};
use serde::Deserialize;
use serde_json::{json, Value};
use switchboard_core::{Event, LogSink};
use switchboard_engine::broker::run_consumer;
use switchboard_engine::{ApprovalLedger, BrokerConnector, EventOrchestrator};

#[derive(Clone)]
pub struct AppState {
    pub orchestrator: Arc<EventOrchestrator>,
    pub approvals: Arc<ApprovalLedger>,
    pub broker: Arc<dyn BrokerConnector>,
    pub sink: Arc<dyn LogSink>,
}

pub fn router(state: AppState) -> Router {
    Router::new()
        .route("/ingest", post(ingest))
        .route("/approve", post(approve))
        .route("/consume/start", post(consume_start))
        .with_state(state)
        .merge(crate::health::router())
}

async fn ingest(
    State(state): State<AppState>,
    Json(event): Json<Event>,
) -> (StatusCode, Json<Value>) {
    let event_id = event.id.clone();
    let event_type = event.event_type.clone();

    match state.orchestrator.handle_event(event).await {
        Ok(outcome) => (StatusCode::OK, Json(json!({"ok": true, "result": outcome}))),
        Err(error) => {
            state.sink.emit(json!({
                "level": "error",
                "msg": "ingest_failed",
                "error": error.to_string(),
                "event_id": event_id,
                "etype": event_type,
            }));
            (StatusCode::INTERNAL_SERVER_ERROR, Json(json!({"detail": error.to_string()})))
        }
    }
}

#[derive(Debug, Deserialize)]
struct ApprovalBody {
    trace_id: String,
    step_name: String,
    #[serde(default)]
    approved_by: Option<String>,
}

async fn approve(State(state): State<AppState>, Json(body): Json<ApprovalBody>) -> Json<Value> {
    let approved_by = body.approved_by.as_deref().unwrap_or("unknown");
    state.approvals.approve(&body.trace_id, &body.step_name, approved_by);

    Json(json!({
        "ok": true,
        "approved": {"trace_id": body.trace_id, "step": body.step_name},
    }))
}

#[derive(Debug, Deserialize)]
struct ConsumeParams {
    #[serde(default = "default_group_id")]
    group_id: String,
    #[serde(default = "default_topic")]
    topic: String,
}

fn default_group_id() -> String {
    "switchboard-consumer".to_string()
}

fn default_topic() -> String {
    "orders.created".to_string()
}

async fn consume_start(
    State(state): State<AppState>,
    Query(params): Query<ConsumeParams>,
) -> (StatusCode, Json<Value>) {
    match state.broker.consumer(&params.group_id, &[params.topic.clone()]).await {
        Ok(consumer) => {
            tokio::spawn(run_consumer(
                Arc::clone(&state.orchestrator),
                consumer,
                Arc::clone(&state.sink),
            ));
            (
                StatusCode::OK,
                Json(json!({
                    "ok": true,
                    "status": "started",
                    "group_id": params.group_id,
                    "topic": params.topic,
                })),
            )
        }
        Err(error) => {
            (StatusCode::INTERNAL_SERVER_ERROR, Json(json!({"detail": error.to_string()})))
        }
    }
}

#[cfg(test)]
mod tests {
    use std::collections::BTreeMap;
    use std::sync::Arc;

    use axum::extract::{Query, State};
    use axum::http::StatusCode;
    use axum::Json;
    use serde_json::json;
    use switchboard_core::{
        Event, InMemoryLogSink, PolicySnapshot, SecretProvider,
    };
    use switchboard_db::InMemoryOutbox;
    use switchboard_engine::{
        standard_registry, ApprovalLedger, BrokerCapability, DisconnectedBroker,
        EventOrchestrator, ServiceCatalog,
    };

    use super::{approve, consume_start, ingest, AppState, ApprovalBody, ConsumeParams};

    fn state() -> AppState {
        let sink = Arc::new(InMemoryLogSink::default());
        let approvals = Arc::new(ApprovalLedger::default());

        let catalog =
            Arc::new(ServiceCatalog::new(BTreeMap::new(), SecretProvider::default()));
        let transport = Arc::new(NoNetworkTransport);
        let registry = Arc::new(standard_registry(
            catalog,
            transport,
            BrokerCapability::Unavailable,
            Arc::clone(&sink) as _,
        ));

        let orchestrator = Arc::new(EventOrchestrator::new(
            Arc::new(PolicySnapshot::default()),
            Arc::new(InMemoryOutbox::new()),
            Arc::clone(&approvals),
            registry,
            Arc::clone(&sink) as _,
        ));

        AppState {
            orchestrator,
            approvals,
            broker: Arc::new(DisconnectedBroker),
            sink: sink as _,
        }
    }

    struct NoNetworkTransport;

    #[async_trait::async_trait]
    impl switchboard_engine::HttpTransport for NoNetworkTransport {
        async fn send(
            &self,
            _request: switchboard_engine::tools::RestRequest,
        ) -> Result<switchboard_engine::tools::RestResponse, switchboard_engine::ToolError>
        {
            Err(switchboard_engine::ToolError::Transport("no network in tests".to_string()))
        }
    }

    #[tokio::test]
    async fn ingest_runs_the_pipeline_and_wraps_the_outcome() {
        let event = Event {
            id: "e-http-1".to_string(),
            source: "shop".to_string(),
            event_type: "ORDER_CREATED".to_string(),
            payload: BTreeMap::from([("region".to_string(), json!("JP"))]),
            headers: BTreeMap::new(),
            trace_id: None,
        };

        let (status, Json(payload)) = ingest(State(state()), Json(event)).await;

        assert_eq!(status, StatusCode::OK);
        assert_eq!(payload["ok"], true);
        assert_eq!(payload["result"]["status"], "ok");
        assert_eq!(payload["result"]["results"]["publish"]["offset"], 0);
        assert_eq!(payload["result"]["results"]["publish"]["fallback"], true);
    }

    #[tokio::test]
    async fn approve_records_the_approval_for_the_trace_and_step() {
        let state = state();

        let Json(payload) = approve(
            State(state.clone()),
            Json(ApprovalBody {
                trace_id: "trace-1".to_string(),
                step_name: "open_incident".to_string(),
                approved_by: Some("ops-lead".to_string()),
            }),
        )
        .await;

        assert_eq!(payload["ok"], true);
        assert_eq!(payload["approved"]["trace_id"], "trace-1");
        assert_eq!(payload["approved"]["step"], "open_incident");
        assert!(state.approvals.is_approved("trace-1", "open_incident"));
    }

    #[tokio::test]
    async fn consume_start_reports_an_unconfigured_broker() {
        let (status, Json(payload)) = consume_start(
            State(state()),
            Query(ConsumeParams {
                group_id: "group-1".to_string(),
                topic: "orders.created".to_string(),
            }),
        )
        .await;

        assert_eq!(status, StatusCode::INTERNAL_SERVER_ERROR);
        assert!(payload["detail"].as_str().expect("detail").contains("not configured"));
    }
}
