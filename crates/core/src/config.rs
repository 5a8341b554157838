use std::collections::BTreeMap;
use std::env;
use std::fs;
use std::path::{Path, PathBuf};

use serde::Deserialize;
use thiserror::Error;

#[derive(Clone, Debug)]
pub struct AppConfig {
    pub database: DatabaseConfig,
    pub server: ServerConfig,
    pub services: BTreeMap<String, ServiceConfig>,
    pub secrets: SecretsConfig,
    pub telemetry: TelemetryConfig,
    pub policies: PoliciesConfig,
}

#[derive(Clone, Debug)]
pub struct DatabaseConfig {
    pub url: String,
    pub max_connections: u32,
    pub timeout_secs: u64,
}

#[derive(Clone, Debug)]
pub struct ServerConfig {
    pub bind_address: String,
    pub port: u16,
}

#[derive(Clone, Debug, Deserialize, PartialEq)]
pub struct ServiceConfig {
    pub base_url: String,
    #[serde(default)]
    pub auth: Option<String>,
}

#[derive(Clone, Debug, Default, Deserialize)]
pub struct SecretsConfig {
    #[serde(default)]
    pub files: BTreeMap<String, PathBuf>,
    #[serde(default, rename = "static")]
    pub static_values: BTreeMap<String, String>,
}

#[derive(Clone, Debug)]
pub struct TelemetryConfig {
    pub otlp_endpoint: String,
    pub service_name: String,
}

#[derive(Clone, Debug, Default)]
pub struct PoliciesConfig {
    pub path: Option<PathBuf>,
}

#[derive(Clone, Debug, Default)]
pub struct ConfigOverrides {
    pub database_url: Option<String>,
    pub bind_address: Option<String>,
    pub port: Option<u16>,
    pub policy_path: Option<PathBuf>,
}

#[derive(Clone, Debug, Default)]
pub struct LoadOptions {
    pub config_path: Option<PathBuf>,
    pub require_file: bool,
    pub overrides: ConfigOverrides,
}

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("could not read config file `{path}`: {source}")]
    ReadFile { path: PathBuf, source: std::io::Error },
    #[error("could not parse config file `{path}`: {source}")]
    ParseFile { path: PathBuf, source: toml::de::Error },
    #[error("required config file was not found: `{0}`")]
    MissingConfigFile(PathBuf),
    #[error("invalid environment override for `{key}`: `{value}`")]
    InvalidEnvOverride { key: String, value: String },
    #[error("configuration validation failed: {0}")]
    Validation(String),
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            database: DatabaseConfig {
                url: "sqlite://switchboard.db".to_string(),
                max_connections: 5,
                timeout_secs: 30,
            },
            server: ServerConfig { bind_address: "127.0.0.1".to_string(), port: 8088 },
            services: BTreeMap::new(),
            secrets: SecretsConfig::default(),
            telemetry: TelemetryConfig {
                otlp_endpoint: "http://localhost:4318".to_string(),
                service_name: "switchboard".to_string(),
            },
            policies: PoliciesConfig::default(),
        }
    }
}

impl AppConfig {
    pub fn load(options: LoadOptions) -> Result<Self, ConfigError> {
        let mut config = Self::default();
        let maybe_path = resolve_config_path(options.config_path.as_deref());

        if let Some(path) = maybe_path {
            let patch = read_patch(&path)?;
            config.apply_patch(patch);
        } else if options.require_file {
            let expected = options.config_path.unwrap_or_else(|| PathBuf::from("switchboard.toml"));
            return Err(ConfigError::MissingConfigFile(expected));
        }

        config.apply_env_overrides()?;
        config.apply_overrides(options.overrides);
        config.validate()?;

        Ok(config)
    }

    fn apply_patch(&mut self, patch: ConfigPatch) {
        if let Some(database) = patch.database {
            if let Some(url) = database.url {
                self.database.url = url;
            }
            if let Some(max_connections) = database.max_connections {
                self.database.max_connections = max_connections;
            }
            if let Some(timeout_secs) = database.timeout_secs {
                self.database.timeout_secs = timeout_secs;
            }
        }

        if let Some(server) = patch.server {
            if let Some(bind_address) = server.bind_address {
                self.server.bind_address = bind_address;
            }
            if let Some(port) = server.port {
                self.server.port = port;
            }
        }

        if let Some(services) = patch.services {
            self.services = services;
        }

        if let Some(secrets) = patch.secrets {
            self.secrets = secrets;
        }

        if let Some(telemetry) = patch.telemetry {
            if let Some(otlp_endpoint) = telemetry.otlp_endpoint {
                self.telemetry.otlp_endpoint = otlp_endpoint;
            }
            if let Some(service_name) = telemetry.service_name {
                self.telemetry.service_name = service_name;
            }
        }

        if let Some(policies) = patch.policies {
            if let Some(path) = policies.path {
                self.policies.path = Some(path);
            }
        }
    }

    fn apply_env_overrides(&mut self) -> Result<(), ConfigError> {
        if let Some(value) = read_env("OUTBOX_PATH") {
            self.database.url = sqlite_url(&value);
        }
        if let Some(value) = read_env("SWITCHBOARD_DATABASE_MAX_CONNECTIONS") {
            self.database.max_connections =
                parse_u32("SWITCHBOARD_DATABASE_MAX_CONNECTIONS", &value)?;
        }
        if let Some(value) = read_env("SWITCHBOARD_BIND_ADDRESS") {
            self.server.bind_address = value;
        }
        if let Some(value) = read_env("SWITCHBOARD_PORT") {
            self.server.port = parse_u16("SWITCHBOARD_PORT", &value)?;
        }
        if let Some(value) = read_env("OTEL_EXPORTER_OTLP_ENDPOINT") {
            self.telemetry.otlp_endpoint = value;
        }
        if let Some(value) = read_env("POLICY_PATH") {
            self.policies.path = Some(PathBuf::from(value));
        }
        Ok(())
    }

    fn apply_overrides(&mut self, overrides: ConfigOverrides) {
        if let Some(database_url) = overrides.database_url {
            self.database.url = database_url;
        }
        if let Some(bind_address) = overrides.bind_address {
            self.server.bind_address = bind_address;
        }
        if let Some(port) = overrides.port {
            self.server.port = port;
        }
        if let Some(policy_path) = overrides.policy_path {
            self.policies.path = Some(policy_path);
        }
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        let url = self.database.url.trim();
        let sqlite_url =
            url.starts_with("sqlite://") || url.starts_with("sqlite::") || url == ":memory:";
        if !sqlite_url {
            return Err(ConfigError::Validation(
                "database.url must be a sqlite URL (`sqlite://...`, `sqlite::...`, or `:memory:`)"
                    .to_string(),
            ));
        }

        if self.database.max_connections == 0 {
            return Err(ConfigError::Validation(
                "database.max_connections must be greater than zero".to_string(),
            ));
        }

        if self.server.port == 0 {
            return Err(ConfigError::Validation(
                "server.port must be greater than zero".to_string(),
            ));
        }

        if !self.telemetry.otlp_endpoint.starts_with("http://")
            && !self.telemetry.otlp_endpoint.starts_with("https://")
        {
            return Err(ConfigError::Validation(
                "telemetry.otlp_endpoint must start with http:// or https://".to_string(),
            ));
        }

        for (name, service) in &self.services {
            if !service.base_url.starts_with("http://")
                && !service.base_url.starts_with("https://")
            {
                return Err(ConfigError::Validation(format!(
                    "services.{name}.base_url must start with http:// or https://"
                )));
            }
            if let Some(auth) = &service.auth {
                let valid = auth
                    .split_once(':')
                    .map(|(kind, key)| {
                        matches!(kind, "bearer" | "basic") && !key.trim().is_empty()
                    })
                    .unwrap_or(false);
                if !valid {
                    return Err(ConfigError::Validation(format!(
                        "services.{name}.auth must look like `bearer:<secret_key>` or `basic:<secret_key>`"
                    )));
                }
            }
        }

        Ok(())
    }
}

fn sqlite_url(value: &str) -> String {
    if value.starts_with("sqlite://") || value.starts_with("sqlite::") || value == ":memory:" {
        value.to_string()
    } else {
        format!("sqlite://{value}")
    }
}

fn resolve_config_path(explicit_path: Option<&Path>) -> Option<PathBuf> {
    if let Some(path) = explicit_path {
        return path.exists().then_some(path.to_path_buf());
    }

    [PathBuf::from("switchboard.toml"), PathBuf::from("config/switchboard.toml")]
        .into_iter()
        .find(|path| path.exists())
}

fn read_patch(path: &Path) -> Result<ConfigPatch, ConfigError> {
    let raw = fs::read_to_string(path)
        .map_err(|source| ConfigError::ReadFile { path: path.to_path_buf(), source })?;
    toml::from_str::<ConfigPatch>(&raw)
        .map_err(|source| ConfigError::ParseFile { path: path.to_path_buf(), source })
}

fn read_env(key: &str) -> Option<String> {
    env::var(key).ok().filter(|value| !value.trim().is_empty())
}

fn parse_u16(key: &str, value: &str) -> Result<u16, ConfigError> {
    value.parse::<u16>().map_err(|_| ConfigError::InvalidEnvOverride {
        key: key.to_string(),
        value: value.to_string(),
    })
}

fn parse_u32(key: &str, value: &str) -> Result<u32, ConfigError> {
    value.parse::<u32>().map_err(|_| ConfigError::InvalidEnvOverride {
        key: key.to_string(),
        value: value.to_string(),
    })
}

#[derive(Debug, Default, Deserialize)]
struct ConfigPatch {
    database: Option<DatabasePatch>,
    server: Option<ServerPatch>,
    services: Option<BTreeMap<String, ServiceConfig>>,
    secrets: Option<SecretsConfig>,
    telemetry: Option<TelemetryPatch>,
    policies: Option<PoliciesPatch>,
}

#[derive(Debug, Default, Deserialize)]
struct DatabasePatch {
    url: Option<String>,
    max_connections: Option<u32>,
    timeout_secs: Option<u64>,
}

#[derive(Debug, Default, Deserialize)]
struct ServerPatch {
    bind_address: Option<String>,
    port: Option<u16>,
}

#[derive(Debug, Default, Deserialize)]
struct TelemetryPatch {
    otlp_endpoint: Option<String>,
    service_name: Option<String>,
}

#[derive(Debug, Default, Deserialize)]
struct PoliciesPatch {
    path: Option<PathBuf>,
}
