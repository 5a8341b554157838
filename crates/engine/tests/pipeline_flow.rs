//! End-to-end pipeline flows over in-memory collaborators: planner output
//! executed through the registry with a scripted HTTP transport, the outbox
//! enforcing idempotency, and recovery unwinding compensations.

use std::collections::BTreeMap;
use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use serde_json::{json, Value};
use switchboard_core::{
    Event, EventOutcome, InMemoryLogSink, PolicySnapshot, SecretProvider, ServiceConfig,
};
use switchboard_db::{InMemoryOutbox, Outbox};
use switchboard_engine::{
    standard_registry, ApprovalLedger, BrokerCapability, EventOrchestrator, HttpTransport,
    ServiceCatalog, ToolError,
};
use switchboard_engine::tools::{RestRequest, RestResponse};

struct ScriptedTransport {
    responses: BTreeMap<(String, String), RestResponse>,
    requests: Mutex<Vec<RestRequest>>,
}

impl ScriptedTransport {
    fn new(responses: impl IntoIterator<Item = ((&'static str, &'static str), RestResponse)>) -> Self {
        let responses = responses
            .into_iter()
            .map(|((method, url), response)| ((method.to_string(), url.to_string()), response))
            .collect();
        Self { responses, requests: Mutex::new(Vec::new()) }
    }

    fn requests(&self) -> Vec<RestRequest> {
        self.requests.lock().expect("requests lock").clone()
    }
}

#[async_trait]
impl HttpTransport for ScriptedTransport {
    async fn send(&self, request: RestRequest) -> Result<RestResponse, ToolError> {
        self.requests.lock().expect("requests lock").push(request.clone());
        self.responses
            .get(&(request.method.clone(), request.url.clone()))
            .cloned()
            .ok_or_else(|| ToolError::Transport(format!("no route for {}", request.url)))
    }
}

struct Harness {
    orchestrator: EventOrchestrator,
    transport: Arc<ScriptedTransport>,
    outbox: Arc<dyn Outbox>,
    sink: InMemoryLogSink,
}

fn harness(policy: PolicySnapshot, transport: ScriptedTransport) -> Harness {
    let transport = Arc::new(transport);
    let outbox: Arc<dyn Outbox> = Arc::new(InMemoryOutbox::new());
    let sink = InMemoryLogSink::default();

    let services = BTreeMap::from([
        (
            "crm".to_string(),
            ServiceConfig { base_url: "https://crm.test".to_string(), auth: None },
        ),
        (
            "wms".to_string(),
            ServiceConfig { base_url: "https://wms.test".to_string(), auth: None },
        ),
    ]);
    let catalog = Arc::new(ServiceCatalog::new(services, SecretProvider::default()));

    let registry = standard_registry(
        catalog,
        Arc::clone(&transport) as _,
        BrokerCapability::Unavailable,
        Arc::new(sink.clone()),
    );

    let orchestrator = EventOrchestrator::new(
        Arc::new(policy),
        Arc::clone(&outbox),
        Arc::new(ApprovalLedger::default()),
        Arc::new(registry),
        Arc::new(sink.clone()),
    );

    Harness { orchestrator, transport, outbox, sink }
}

fn order_event(id: &str, region: &str) -> Event {
    Event {
        id: id.to_string(),
        source: "shop".to_string(),
        event_type: "ORDER_CREATED".to_string(),
        payload: BTreeMap::from([
            ("region".to_string(), json!(region)),
            ("order_id".to_string(), json!("o1")),
        ]),
        headers: BTreeMap::new(),
        trace_id: Some(format!("trace-{id}")),
    }
}

fn seed_policy() -> PolicySnapshot {
    let mut policy = PolicySnapshot::default();
    policy.rbac.roles.agent.allow_tools =
        ["call_rest", "publish_kafka", "transform_json"].into_iter().map(str::to_string).collect();
    policy.execution.retry.base_ms = 1;
    policy.execution.retry.max_ms = 4;
    policy
}

fn happy_transport() -> ScriptedTransport {
    ScriptedTransport::new([
        (
            ("GET", "https://crm.test/crm/customer"),
            RestResponse { status: 200, json: Some(json!({"id": "c-1", "tier": "gold"})) },
        ),
        (
            ("POST", "https://wms.test/wms/reservations"),
            RestResponse { status: 201, json: Some(json!({"reservation_id": "r-1"})) },
        ),
        (
            ("POST", "https://wms.test/wms/cancel_reservation"),
            RestResponse { status: 200, json: Some(json!({"cancelled": true})) },
        ),
    ])
}

#[tokio::test]
async fn us_order_runs_the_full_chain_and_publishes_via_fallback() {
    let harness = harness(seed_policy(), happy_transport());

    let outcome = harness
        .orchestrator
        .handle_event(order_event("e1", "US"))
        .await
        .expect("pipeline should run");

    let EventOutcome::Ok { trace_id, results } = outcome else {
        panic!("expected ok outcome");
    };
    assert_eq!(trace_id, "trace-e1");
    assert_eq!(
        results.keys().cloned().collect::<Vec<_>>(),
        vec!["fetch_customer", "merge_profile", "publish", "reserve"],
    );
    assert_eq!(results["fetch_customer"]["status"], 200);
    assert_eq!(results["merge_profile"]["data"]["customer"]["tier"], "gold");
    assert_eq!(results["merge_profile"]["data"]["region"], "US");
    assert_eq!(results["reserve"]["status"], 201);
    assert_eq!(results["publish"]["offset"], 0);
    assert_eq!(results["publish"]["fallback"], true);

    let requests = harness.transport.requests();
    assert_eq!(requests.len(), 2);
    assert!(requests
        .iter()
        .all(|request| request.headers.contains(&("x-trace-id".to_string(), "trace-e1".to_string()))));
}

#[tokio::test]
async fn non_us_eu_order_publishes_without_any_upstream_calls() {
    let harness = harness(seed_policy(), ScriptedTransport::new([]));

    let outcome = harness
        .orchestrator
        .handle_event(order_event("e2", "JP"))
        .await
        .expect("pipeline should run");

    let EventOutcome::Ok { results, .. } = outcome else {
        panic!("expected ok outcome");
    };
    assert_eq!(results.len(), 1);
    assert_eq!(results["publish"]["offset"], 0);
    assert!(harness.transport.requests().is_empty());
}

#[tokio::test]
async fn replaying_the_same_event_reuses_outbox_results_and_skips_tools() {
    let harness = harness(seed_policy(), happy_transport());

    let first = harness
        .orchestrator
        .handle_event(order_event("e1", "US"))
        .await
        .expect("first run");
    let requests_after_first = harness.transport.requests().len();

    let second = harness
        .orchestrator
        .handle_event(order_event("e1", "US"))
        .await
        .expect("replay run");

    assert_eq!(first, second);
    assert_eq!(harness.transport.requests().len(), requests_after_first);

    let reuses = harness
        .sink
        .records()
        .iter()
        .filter(|record| record["msg"] == "idempotent_reuse")
        .count();
    assert_eq!(reuses, 4);

    let stored = harness.outbox.get("e1:publish").await.expect("stored publish");
    assert_eq!(stored.expect("publish result")["offset"], 0);
}

#[tokio::test]
async fn reservation_5xx_triggers_compensation_and_a_failed_outcome() {
    let transport = ScriptedTransport::new([
        (
            ("GET", "https://crm.test/crm/customer"),
            RestResponse { status: 200, json: Some(json!({"id": "c-1"})) },
        ),
        (
            ("POST", "https://wms.test/wms/reservations"),
            RestResponse { status: 503, json: None },
        ),
        (
            ("POST", "https://wms.test/wms/cancel_reservation"),
            RestResponse { status: 200, json: Some(json!({"cancelled": true})) },
        ),
    ]);
    let harness = harness(seed_policy(), transport);

    let outcome = harness
        .orchestrator
        .handle_event(order_event("e4", "EU"))
        .await
        .expect("pipeline should run");

    let EventOutcome::Failed { failed_step, partial, .. } = outcome else {
        panic!("expected failed outcome");
    };
    assert_eq!(failed_step, "reserve");
    assert_eq!(partial["reserve"]["status"], 503);
    assert!(partial.contains_key("merge_profile"));
    assert!(!partial.contains_key("publish"));

    let cancel_calls: Vec<_> = harness
        .transport
        .requests()
        .into_iter()
        .filter(|request| request.url.ends_with("/wms/cancel_reservation"))
        .collect();
    assert_eq!(cancel_calls.len(), 1);
    assert_eq!(cancel_calls[0].method, "POST");

    assert!(harness.sink.records().iter().any(|record| record["msg"] == "compensation_ok"));
    assert!(harness.sink.records().iter().any(|record| record["msg"] == "critic_reject"));
}

#[tokio::test]
async fn tools_outside_the_allow_list_never_reach_the_transport() {
    let mut policy = seed_policy();
    policy.rbac.roles.agent.allow_tools =
        ["publish_kafka", "transform_json"].into_iter().map(str::to_string).collect();
    let harness = harness(policy, happy_transport());

    let outcome = harness
        .orchestrator
        .handle_event(order_event("e5", "US"))
        .await
        .expect("pipeline should run");

    let EventOutcome::Failed { failed_step, partial, .. } = outcome else {
        panic!("expected failed outcome");
    };
    assert_eq!(failed_step, "fetch_customer");
    assert!(partial.is_empty());
    assert!(harness.transport.requests().is_empty());
}

#[tokio::test]
async fn consumer_loop_decodes_events_and_survives_bad_messages() {
    use switchboard_engine::broker::{run_consumer, BrokerConsumer, BrokerError};

    struct QueueConsumer {
        messages: Vec<Vec<u8>>,
    }

    #[async_trait]
    impl BrokerConsumer for QueueConsumer {
        async fn poll(&mut self) -> Result<Option<Vec<u8>>, BrokerError> {
            if self.messages.is_empty() {
                return Ok(None);
            }
            Ok(Some(self.messages.remove(0)))
        }
    }

    let harness = harness(seed_policy(), ScriptedTransport::new([]));
    let outbox = Arc::clone(&harness.outbox);
    let orchestrator = Arc::new(harness.orchestrator);

    let event = serde_json::to_vec(&order_event("e-stream", "JP")).expect("encode event");
    let consumer = Box::new(QueueConsumer {
        messages: vec![b"not json".to_vec(), event],
    });

    run_consumer(Arc::clone(&orchestrator), consumer, Arc::new(harness.sink.clone())).await;

    let stored = outbox.get("e-stream:publish").await.expect("outbox read");
    assert_eq!(stored.expect("publish stored")["offset"], 0);
    assert!(harness
        .sink
        .records()
        .iter()
        .any(|record| record["msg"] == "consumer_decode_failed"));
}

#[tokio::test]
async fn transient_reservation_failures_are_retried_to_success() {
    struct FlakyTransport {
        inner: ScriptedTransport,
        failures_left: Mutex<usize>,
    }

    #[async_trait]
    impl HttpTransport for FlakyTransport {
        async fn send(&self, request: RestRequest) -> Result<RestResponse, ToolError> {
            if request.url.ends_with("/wms/reservations") {
                let mut failures_left = self.failures_left.lock().expect("failures lock");
                if *failures_left > 0 {
                    *failures_left -= 1;
                    return Err(ToolError::Transport("connection reset".to_string()));
                }
            }
            self.inner.send(request).await
        }
    }

    let transport = Arc::new(FlakyTransport {
        inner: happy_transport(),
        failures_left: Mutex::new(2),
    });
    let outbox: Arc<dyn Outbox> = Arc::new(InMemoryOutbox::new());
    let sink = InMemoryLogSink::default();
    let services = BTreeMap::from([
        ("crm".to_string(), ServiceConfig { base_url: "https://crm.test".to_string(), auth: None }),
        ("wms".to_string(), ServiceConfig { base_url: "https://wms.test".to_string(), auth: None }),
    ]);
    let registry = standard_registry(
        Arc::new(ServiceCatalog::new(services, SecretProvider::default())),
        Arc::clone(&transport) as _,
        BrokerCapability::Unavailable,
        Arc::new(sink.clone()),
    );
    let orchestrator = EventOrchestrator::new(
        Arc::new(seed_policy()),
        outbox,
        Arc::new(ApprovalLedger::default()),
        Arc::new(registry),
        Arc::new(sink.clone()),
    );

    let outcome = orchestrator
        .handle_event(order_event("e3", "US"))
        .await
        .expect("pipeline should run");

    assert!(outcome.is_ok(), "third reservation attempt should succeed");
    let retries = sink
        .records()
        .iter()
        .filter(|record| record["msg"] == "step_retry" && record["step"] == "reserve")
        .count();
    assert_eq!(retries, 2);
}
