//! Streaming broker seam. Concrete transports live outside this crate; the
//! engine only sees a producer capability and a consumer byte stream.

use std::env;
use std::path::PathBuf;
use std::sync::Arc;

use async_trait::async_trait;
use secrecy::SecretString;
use serde_json::json;
use switchboard_core::{Event, LogSink};
use thiserror::Error;

use crate::orchestrator::EventOrchestrator;

#[derive(Clone, Debug)]
pub struct BrokerSettings {
    pub bootstrap: Option<String>,
    pub sasl: Option<SaslSettings>,
    pub security_protocol: String,
    pub ssl_ca_location: Option<PathBuf>,
}

#[derive(Clone, Debug)]
pub struct SaslSettings {
    pub mechanism: String,
    pub username: String,
    pub password: SecretString,
}

impl BrokerSettings {
    /// Reads broker settings from the environment. The OCI streaming variable
    /// wins over the generic Kafka one.
    pub fn from_env() -> Self {
        let bootstrap = read_env("OCI_STREAMING_BOOTSTRAP")
            .or_else(|| read_env("KAFKA_BOOTSTRAP_SERVERS"));

        let sasl = match (read_env("SASL_USERNAME"), read_env("SASL_PASSWORD")) {
            (Some(username), Some(password)) => Some(SaslSettings {
                mechanism: read_env("SASL_MECHANISM").unwrap_or_else(|| "PLAIN".to_string()),
                username,
                password: password.into(),
            }),
            _ => None,
        };

        let default_protocol = if sasl.is_some() { "SASL_SSL" } else { "PLAINTEXT" };
        let security_protocol =
            read_env("SECURITY_PROTOCOL").unwrap_or_else(|| default_protocol.to_string());

        Self {
            bootstrap,
            sasl,
            security_protocol,
            ssl_ca_location: read_env("SSL_CA_LOCATION").map(PathBuf::from),
        }
    }

    pub fn is_configured(&self) -> bool {
        self.bootstrap.is_some()
    }
}

fn read_env(key: &str) -> Option<String> {
    env::var(key).ok().filter(|value| !value.trim().is_empty())
}

#[derive(Debug, Error)]
pub enum BrokerError {
    #[error("broker bootstrap not configured")]
    NotConfigured,
    #[error("broker transport failure: {0}")]
    Transport(String),
}

#[async_trait]
pub trait BrokerProducer: Send + Sync {
    async fn publish(&self, topic: &str, payload: &[u8]) -> Result<(), BrokerError>;
}

/// Whether a producer is wired in. The publish tool branches on this variant
/// alone and never on the concrete client behind it.
#[derive(Clone)]
pub enum BrokerCapability {
    Available(Arc<dyn BrokerProducer>),
    Unavailable,
}

/// Pull-based consumer handle. `Ok(None)` means the stream is exhausted and
/// the consumer loop should stop.
#[async_trait]
pub trait BrokerConsumer: Send {
    async fn poll(&mut self) -> Result<Option<Vec<u8>>, BrokerError>;
}

#[async_trait]
pub trait BrokerConnector: Send + Sync {
    fn producer(&self) -> BrokerCapability;

    async fn consumer(
        &self,
        group_id: &str,
        topics: &[String],
    ) -> Result<Box<dyn BrokerConsumer>, BrokerError>;
}

/// Connector used when no broker bootstrap is configured: publishes fall back
/// to the outbox offset allocator and consumers cannot start.
pub struct DisconnectedBroker;

#[async_trait]
impl BrokerConnector for DisconnectedBroker {
    fn producer(&self) -> BrokerCapability {
        BrokerCapability::Unavailable
    }

    async fn consumer(
        &self,
        _group_id: &str,
        _topics: &[String],
    ) -> Result<Box<dyn BrokerConsumer>, BrokerError> {
        Err(BrokerError::NotConfigured)
    }
}

/// Decodes each message as an Event and hands it to the orchestrator. Decode
/// and handling failures are logged and the loop keeps consuming.
pub async fn run_consumer(
    orchestrator: Arc<EventOrchestrator>,
    mut consumer: Box<dyn BrokerConsumer>,
    sink: Arc<dyn LogSink>,
) {
    loop {
        match consumer.poll().await {
            Ok(Some(message)) => {
                let event: Event = match serde_json::from_slice(&message) {
                    Ok(event) => event,
                    Err(error) => {
                        sink.emit(json!({
                            "level": "error",
                            "msg": "consumer_decode_failed",
                            "error": error.to_string(),
                        }));
                        continue;
                    }
                };
                if let Err(error) = orchestrator.handle_event(event).await {
                    sink.emit(json!({
                        "level": "error",
                        "msg": "consumer_handle_failed",
                        "error": error.to_string(),
                    }));
                }
            }
            Ok(None) => break,
            Err(error) => {
                sink.emit(json!({
                    "level": "error",
                    "msg": "consumer_poll_failed",
                    "error": error.to_string(),
                }));
            }
        }
    }
}
