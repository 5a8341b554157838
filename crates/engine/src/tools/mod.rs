pub mod jms;
pub mod publish;
pub mod rest;
pub mod ticket;
pub mod transform;

use std::sync::Arc;

use switchboard_core::LogSink;

pub use jms::JmsTool;
pub use publish::PublishTool;
pub use rest::{HttpTransport, ReqwestTransport, RestRequest, RestResponse, RestTool, ServiceCatalog};
pub use ticket::TicketTool;
pub use transform::TransformTool;

use crate::broker::BrokerCapability;
use crate::registry::ToolRegistry;

/// Builds the registry with the full tool set. Called once at startup.
pub fn standard_registry(
    catalog: Arc<ServiceCatalog>,
    transport: Arc<dyn HttpTransport>,
    capability: BrokerCapability,
    sink: Arc<dyn LogSink>,
) -> ToolRegistry {
    let mut registry = ToolRegistry::new();
    registry.register(RestTool::new(transport, catalog));
    registry.register(PublishTool::new(capability, Arc::clone(&sink)));
    registry.register(TransformTool);
    registry.register(TicketTool::new(Arc::clone(&sink)));
    registry.register(JmsTool::new(sink));
    registry
}
