//! REST caller with prefix-based service routing. `/crm/...` and `/wms/...`
//! resolve against the configured service base URLs and carry that service's
//! auth header; absolute URLs go out verbatim with no auth attached.

use std::collections::BTreeMap;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use reqwest::header::CONTENT_TYPE;
use serde_json::{json, Value};
use switchboard_core::{auth_header_from_spec, SecretProvider, ServiceConfig};

use crate::context::ExecutionContext;
use crate::registry::{Tool, ToolError};

const HTTP_TIMEOUT: Duration = Duration::from_secs(5);

#[derive(Clone, Debug, PartialEq)]
pub struct RestRequest {
    pub method: String,
    pub url: String,
    pub headers: Vec<(String, String)>,
    pub body: Option<Value>,
}

#[derive(Clone, Debug, PartialEq)]
pub struct RestResponse {
    pub status: u16,
    pub json: Option<Value>,
}

#[async_trait]
pub trait HttpTransport: Send + Sync {
    async fn send(&self, request: RestRequest) -> Result<RestResponse, ToolError>;
}

pub struct ReqwestTransport {
    client: reqwest::Client,
}

impl ReqwestTransport {
    pub fn new() -> Result<Self, reqwest::Error> {
        let client = reqwest::Client::builder().timeout(HTTP_TIMEOUT).build()?;
        Ok(Self { client })
    }
}

#[async_trait]
impl HttpTransport for ReqwestTransport {
    async fn send(&self, request: RestRequest) -> Result<RestResponse, ToolError> {
        let method =
            reqwest::Method::from_bytes(request.method.as_bytes()).map_err(|_| {
                ToolError::InvalidParams {
                    tool: "call_rest",
                    reason: format!("unsupported method `{}`", request.method),
                }
            })?;

        let mut builder = self.client.request(method, &request.url);
        for (name, value) in &request.headers {
            builder = builder.header(name, value);
        }
        if let Some(body) = &request.body {
            builder = builder.json(body);
        }

        let response =
            builder.send().await.map_err(|error| ToolError::Transport(error.to_string()))?;

        let status = response.status().as_u16();
        let is_json = response
            .headers()
            .get(CONTENT_TYPE)
            .and_then(|value| value.to_str().ok())
            .map(|value| value.contains("application/json"))
            .unwrap_or(false);
        let json = if is_json {
            Some(
                response
                    .json()
                    .await
                    .map_err(|error| ToolError::Transport(error.to_string()))?,
            )
        } else {
            None
        };

        Ok(RestResponse { status, json })
    }
}

pub struct ServiceCatalog {
    services: BTreeMap<String, ServiceConfig>,
    secrets: SecretProvider,
}

impl ServiceCatalog {
    pub fn new(services: BTreeMap<String, ServiceConfig>, secrets: SecretProvider) -> Self {
        Self { services, secrets }
    }

    fn base_url(&self, service: &str) -> Option<&str> {
        self.services.get(service).map(|config| config.base_url.as_str())
    }

    fn auth_header(&self, service: &str) -> Option<(&'static str, String)> {
        let spec = self.services.get(service)?.auth.as_deref()?;
        auth_header_from_spec(spec, &self.secrets)
    }
}

pub struct RestTool {
    transport: Arc<dyn HttpTransport>,
    catalog: Arc<ServiceCatalog>,
}

impl RestTool {
    pub fn new(transport: Arc<dyn HttpTransport>, catalog: Arc<ServiceCatalog>) -> Self {
        Self { transport, catalog }
    }
}

#[async_trait]
impl Tool for RestTool {
    fn name(&self) -> &'static str {
        "call_rest"
    }

    async fn invoke(
        &self,
        params: &Value,
        ctx: &ExecutionContext,
        _is_compensation: bool,
    ) -> Result<Value, ToolError> {
        let url = params.get("url").and_then(Value::as_str).ok_or(ToolError::InvalidParams {
            tool: "call_rest",
            reason: "missing `url`".to_string(),
        })?;
        let method = params
            .get("method")
            .and_then(Value::as_str)
            .unwrap_or("GET")
            .to_ascii_uppercase();
        let body = params.get("body").filter(|body| !body.is_null()).cloned();

        let mut headers: Vec<(String, String)> =
            vec![("x-trace-id".to_string(), ctx.trace_id().to_string())];
        for (name, value) in &ctx.event.headers {
            headers.push((name.clone(), value.clone()));
        }

        let service = if url.starts_with("/crm/") {
            Some("crm")
        } else if url.starts_with("/wms/") {
            Some("wms")
        } else {
            None
        };

        let full_url = match service {
            Some(service) => {
                if let Some((name, value)) = self.catalog.auth_header(service) {
                    headers.push((name.to_string(), value));
                }
                format!("{}{}", self.catalog.base_url(service).unwrap_or_default(), url)
            }
            None => url.to_string(),
        };

        let response = self
            .transport
            .send(RestRequest { method, url: full_url, headers, body })
            .await?;

        Ok(json!({
            "status": response.status,
            "json": response.json.unwrap_or(Value::Null),
        }))
    }
}
