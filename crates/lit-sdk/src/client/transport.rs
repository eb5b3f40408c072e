//! HTTP transport for the bundled server.
//!
//! Wraps a blocking `ureq` agent. Regular calls only bound the connect phase,
//! since scripts may run for a long time. Readiness probes carry a per-request
//! timeout so a server that accepts connections but never answers cannot
//! stall the launch loop past its deadline.

use std::fmt;
use std::time::Duration;

use serde_json::{Map, Value};
use tracing::debug;
use ureq::{Agent, AgentBuilder};

use super::CLIENT_TARGET;
use super::error::ClientError;
use super::response::RpcResponse;

pub(super) const CONNECTION_TIMEOUT: Duration = Duration::from_secs(5);
const MIN_PROBE_BUDGET: Duration = Duration::from_millis(1);

/// HTTP method of a request.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Method {
    Get,
    Post,
}

impl fmt::Display for Method {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Self::Get => "GET",
            Self::Post => "POST",
        })
    }
}

/// A single call against the bundled server.
#[derive(Debug, Clone, PartialEq)]
pub struct RpcRequest {
    endpoint: String,
    method: Method,
    payload: Option<Map<String, Value>>,
}

impl RpcRequest {
    /// Builds a bodiless `GET` request.
    #[must_use]
    pub fn get(endpoint: impl Into<String>) -> Self {
        Self {
            endpoint: endpoint.into(),
            method: Method::Get,
            payload: None,
        }
    }

    /// Builds a bodiless `POST` request.
    #[must_use]
    pub fn post(endpoint: impl Into<String>) -> Self {
        Self {
            endpoint: endpoint.into(),
            method: Method::Post,
            payload: None,
        }
    }

    /// Adds a field to the JSON body, creating the body when absent.
    #[must_use]
    pub fn with_field(mut self, key: impl Into<String>, value: impl Into<Value>) -> Self {
        self.payload
            .get_or_insert_with(Map::new)
            .insert(key.into(), value.into());
        self
    }

    #[must_use]
    pub fn endpoint(&self) -> &str {
        &self.endpoint
    }

    #[must_use]
    pub const fn method(&self) -> Method {
        self.method
    }

    #[must_use]
    pub const fn payload(&self) -> Option<&Map<String, Value>> {
        self.payload.as_ref()
    }
}

#[derive(Debug)]
pub(super) struct HttpTransport {
    base_url: String,
    agent: Agent,
    probe_timeout: Duration,
}

impl HttpTransport {
    pub(super) fn new(base_url: String, probe_timeout: Duration) -> Self {
        let agent = AgentBuilder::new()
            .timeout_connect(CONNECTION_TIMEOUT)
            .build();
        Self {
            base_url,
            agent,
            probe_timeout,
        }
    }

    pub(super) fn base_url(&self) -> &str {
        &self.base_url
    }

    /// Sends `request` and parses the reply.
    ///
    /// Error statuses still yield a response so their JSON body can be
    /// decoded into a failure.
    pub(super) fn send(&self, request: &RpcRequest) -> Result<RpcResponse, ClientError> {
        self.dispatch(request, None)
    }

    /// Sends a readiness probe bounded by the startup timeout.
    pub(super) fn probe(&self, request: &RpcRequest) -> bool {
        self.probe_within(request, self.probe_timeout)
    }

    /// Sends a readiness probe that gives up after `budget`; any failure
    /// counts as not ready.
    pub(super) fn probe_within(&self, request: &RpcRequest, budget: Duration) -> bool {
        match self.dispatch(request, Some(budget.max(MIN_PROBE_BUDGET))) {
            Ok(response) => response.bool_field("ready") == Some(true),
            Err(error) => {
                debug!(
                    target: CLIENT_TARGET,
                    endpoint = request.endpoint(),
                    error = %error,
                    "readiness probe failed"
                );
                false
            }
        }
    }

    fn dispatch(
        &self,
        request: &RpcRequest,
        timeout: Option<Duration>,
    ) -> Result<RpcResponse, ClientError> {
        let endpoint = request.endpoint();
        let url = format!("{}{endpoint}", self.base_url);
        let mut call = match request.method() {
            Method::Get => self.agent.get(&url),
            Method::Post => self.agent.post(&url),
        };
        if let Some(timeout) = timeout {
            call = call.timeout(timeout);
        }
        let result = match request.payload() {
            Some(payload) => call.send_json(Value::Object(payload.clone())),
            None => call.call(),
        };
        let response = match result {
            Ok(response) | Err(ureq::Error::Status(_, response)) => response,
            Err(source) => {
                return Err(ClientError::Transport {
                    endpoint: endpoint.to_owned(),
                    source: Box::new(source),
                });
            }
        };
        let status = response.status();
        let body = response
            .into_string()
            .map_err(|source| ClientError::ReadBody {
                endpoint: endpoint.to_owned(),
                source,
            })?;
        debug!(
            target: CLIENT_TARGET,
            method = %request.method(),
            endpoint,
            status,
            "received response"
        );
        RpcResponse::from_body(endpoint, status, &body)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn with_field_builds_json_body() {
        let request = RpcRequest::post("/sign")
            .with_field("toSign", "0xdead")
            .with_field("pkpPublicKey", json!("0x04"));
        assert_eq!(request.method(), Method::Post);
        let payload = request.payload().expect("payload present");
        assert_eq!(payload.get("toSign"), Some(&json!("0xdead")));
        assert_eq!(payload.get("pkpPublicKey"), Some(&json!("0x04")));
    }

    #[test]
    fn get_requests_have_no_body() {
        let request = RpcRequest::get("/pkp");
        assert_eq!(request.method().to_string(), "GET");
        assert!(request.payload().is_none());
    }

    #[test]
    fn unreachable_server_is_a_transport_error() {
        let transport = HttpTransport::new(String::from("http://127.0.0.1:9"), Duration::from_secs(1));
        let request = RpcRequest::post("/isReady");
        let error = transport.send(&request).expect_err("nothing listens on port 9");
        assert!(matches!(error, ClientError::Transport { .. }));
        assert!(!transport.probe(&request));
    }
}
