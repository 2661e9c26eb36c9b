//! HTTP transport for the Quay REST API
//!
//! The dispatcher talks to hosts through the [`HttpTransport`] trait so the
//! exchange itself can be swapped out (the reqwest implementation in
//! production, a recording mock in tests).

use crate::config::RunConfig;
use crate::error::{ReplicationError, Result};
use async_trait::async_trait;
use serde_json::Value;
use std::fmt;
use std::time::Duration;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Method {
    Get,
    Post,
    Put,
}

impl fmt::Display for Method {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Method::Get => write!(f, "GET"),
            Method::Post => write!(f, "POST"),
            Method::Put => write!(f, "PUT"),
        }
    }
}

/// One logical API call, independent of the host it is sent to
#[derive(Debug, Clone, PartialEq)]
pub struct ApiRequest {
    pub method: Method,
    /// Path and query, starting with `/api/v1/`
    pub path: String,
    pub body: Option<Value>,
    /// Human-readable label used in logs and errors
    pub action: String,
}

impl ApiRequest {
    pub fn get(path: impl Into<String>, action: impl Into<String>) -> Self {
        Self {
            method: Method::Get,
            path: path.into(),
            body: None,
            action: action.into(),
        }
    }

    pub fn post(path: impl Into<String>, body: Value, action: impl Into<String>) -> Self {
        Self {
            method: Method::Post,
            path: path.into(),
            body: Some(body),
            action: action.into(),
        }
    }

    pub fn put(path: impl Into<String>, body: Value, action: impl Into<String>) -> Self {
        Self {
            method: Method::Put,
            path: path.into(),
            body: Some(body),
            action: action.into(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ApiResponse {
    /// HTTP status; `0` when the call was not issued (dry run)
    pub status: u16,
    pub body: String,
}

impl ApiResponse {
    pub fn new(status: u16, body: impl Into<String>) -> Self {
        Self {
            status,
            body: body.into(),
        }
    }

    pub fn not_issued() -> Self {
        Self::new(0, String::new())
    }

    pub fn is_server_error(&self) -> bool {
        self.status >= 500
    }

    pub fn is_client_error(&self) -> bool {
        (400..500).contains(&self.status)
    }

    pub fn is_success(&self) -> bool {
        (200..300).contains(&self.status)
    }
}

/// Host connection details handed to the transport for each call
#[derive(Debug, Clone, Copy)]
pub struct Endpoint<'a> {
    pub host: &'a str,
    pub token: Option<&'a str>,
}

#[async_trait]
pub trait HttpTransport: Send + Sync {
    /// Perform one exchange. Only transport-level failures (DNS, refused
    /// connection, TLS, unreadable body) are errors; every HTTP status is
    /// returned as a response.
    async fn send(&self, endpoint: Endpoint<'_>, request: &ApiRequest) -> Result<ApiResponse>;
}

/// reqwest-backed transport
pub struct ReqwestTransport {
    client: reqwest::Client,
    scheme: &'static str,
}

impl ReqwestTransport {
    pub fn new(config: &RunConfig) -> Result<Self> {
        let client = reqwest::Client::builder()
            .danger_accept_invalid_certs(config.skip_verify)
            .danger_accept_invalid_hostnames(config.skip_verify)
            .timeout(Duration::from_secs(300))
            .build()
            .map_err(|e| {
                ReplicationError::Configuration(format!("Failed to create HTTP client: {}", e))
            })?;

        Ok(Self {
            client,
            scheme: config.scheme(),
        })
    }

    fn url(&self, host: &str, path: &str) -> Result<url::Url> {
        let base = url::Url::parse(&format!("{}://{}", self.scheme, host))?;
        Ok(base.join(path)?)
    }

    fn describe(error: &reqwest::Error) -> String {
        if error.is_timeout() {
            format!("timeout: {}", error)
        } else if error.is_connect() {
            format!("connection error: {}", error)
        } else {
            error.to_string()
        }
    }
}

#[async_trait]
impl HttpTransport for ReqwestTransport {
    async fn send(&self, endpoint: Endpoint<'_>, request: &ApiRequest) -> Result<ApiResponse> {
        let url = self.url(endpoint.host, &request.path)?;

        let mut req = match request.method {
            Method::Get => self.client.get(url),
            Method::Post => self.client.post(url),
            Method::Put => self.client.put(url),
        };

        if let Some(token) = endpoint.token {
            req = req.bearer_auth(token);
        }
        if let Some(body) = &request.body {
            req = req.json(body);
        }

        let transport_error = |e: reqwest::Error| ReplicationError::Transport {
            host: endpoint.host.to_string(),
            action: request.action.clone(),
            message: Self::describe(&e),
        };

        let response = req.send().await.map_err(transport_error)?;
        let status = response.status().as_u16();
        let body = response.text().await.map_err(transport_error)?;

        Ok(ApiResponse { status, body })
    }
}
