pub mod approvals;
pub mod broker;
pub mod context;
pub mod executor;
pub mod orchestrator;
pub mod registry;
pub mod tools;

pub use approvals::ApprovalLedger;
pub use broker::{
    BrokerCapability, BrokerConnector, BrokerConsumer, BrokerError, BrokerProducer,
    BrokerSettings, DisconnectedBroker,
};
pub use context::ExecutionContext;
pub use executor::{StepError, StepExecutor};
pub use orchestrator::{EventOrchestrator, OrchestratorError};
pub use registry::{Tool, ToolError, ToolRegistry};
pub use tools::{standard_registry, HttpTransport, ReqwestTransport, ServiceCatalog};
