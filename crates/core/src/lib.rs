pub mod config;
pub mod critic;
pub mod domain;
pub mod planner;
pub mod policy;
pub mod sanitizer;
pub mod secrets;
pub mod telemetry;

pub use config::{AppConfig, ConfigError, ConfigOverrides, LoadOptions, SecretsConfig, ServiceConfig};
pub use critic::{review_step, CriticVerdict};
pub use domain::event::{Event, Observation};
pub use domain::outcome::EventOutcome;
pub use domain::plan::{CompensationSpec, Plan, PlanError, PlanStep};
pub use planner::{build_plan, infer_intents, Intent};
pub use policy::{
    DataPolicy, ExecutionPolicy, PolicyError, PolicySnapshot, RbacPolicy, RetryBackoff, SloPolicy,
};
pub use sanitizer::Sanitizer;
pub use secrets::{auth_header_from_spec, SecretProvider};
pub use telemetry::{InMemoryLogSink, LogSink, StdoutJsonSink};
