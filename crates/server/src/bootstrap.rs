use std::sync::Arc;

use switchboard_core::config::{AppConfig, ConfigError, LoadOptions};
use switchboard_core::{
    LogSink, PolicyError, PolicySnapshot, Sanitizer, SecretProvider, StdoutJsonSink,
};
use switchboard_db::{connect, migrations, DbPool, SqlOutbox};
use switchboard_engine::{
    standard_registry, ApprovalLedger, BrokerConnector, BrokerSettings, DisconnectedBroker,
    EventOrchestrator, ReqwestTransport, ServiceCatalog,
};
use thiserror::Error;
use tracing::info;

pub struct Application {
    pub config: AppConfig,
    pub db_pool: DbPool,
    pub orchestrator: Arc<EventOrchestrator>,
    pub approvals: Arc<ApprovalLedger>,
    pub broker: Arc<dyn BrokerConnector>,
    pub sink: Arc<dyn LogSink>,
}

#[derive(Debug, Error)]
pub enum BootstrapError {
    #[error(transparent)]
    Config(#[from] ConfigError),
    #[error(transparent)]
    Policy(#[from] PolicyError),
    #[error("database connection failed: {0}")]
    DatabaseConnect(#[source] sqlx::Error),
    #[error("database migration failed: {0}")]
    Migration(#[source] sqlx::migrate::MigrateError),
    #[error("http client construction failed: {0}")]
    HttpClient(#[source] reqwest::Error),
}

pub async fn bootstrap(options: LoadOptions) -> Result<Application, BootstrapError> {
    info!(event_name = "system.bootstrap.start", "starting application bootstrap");

    let config = AppConfig::load(options)?;
    let policy = Arc::new(PolicySnapshot::load_or_default(config.policies.path.as_deref())?);
    info!(
        event_name = "system.bootstrap.telemetry",
        otlp_endpoint = %config.telemetry.otlp_endpoint,
        service_name = %config.telemetry.service_name,
        "trace export configured"
    );

    let db_pool = connect(&config.database).await.map_err(BootstrapError::DatabaseConnect)?;
    migrations::run_pending(&db_pool).await.map_err(BootstrapError::Migration)?;
    info!(event_name = "system.bootstrap.database_ready", "outbox store connected and migrated");

    let sink: Arc<dyn LogSink> =
        Arc::new(StdoutJsonSink::new(Sanitizer::new(&policy.data_policy.redact_fields)));
    let outbox = Arc::new(SqlOutbox::new(db_pool.clone()));
    let approvals = Arc::new(ApprovalLedger::default());

    let secrets = SecretProvider::new(
        config.secrets.files.clone(),
        config.secrets.static_values.clone(),
    );
    let catalog = Arc::new(ServiceCatalog::new(config.services.clone(), secrets));
    let transport = Arc::new(ReqwestTransport::new().map_err(BootstrapError::HttpClient)?);

    let broker_settings = BrokerSettings::from_env();
    if !broker_settings.is_configured() {
        info!(
            event_name = "system.bootstrap.broker_unconfigured",
            "no broker bootstrap configured; publishes fall back to the outbox"
        );
    }
    let broker: Arc<dyn BrokerConnector> = Arc::new(DisconnectedBroker);

    let registry = Arc::new(standard_registry(
        catalog,
        transport,
        broker.producer(),
        Arc::clone(&sink),
    ));

    let orchestrator = Arc::new(EventOrchestrator::new(
        policy,
        outbox,
        Arc::clone(&approvals),
        registry,
        Arc::clone(&sink),
    ));

    Ok(Application { config, db_pool, orchestrator, approvals, broker, sink })
}
