//! Mock transport for testing.
//!
//! Records every request it receives, serves scripted responses keyed by
//! path (query included), can inject latency and transport failures, and
//! tracks how many calls were in flight at once per host.

use crate::error::{ReplicationError, Result};
use crate::registry::transport::{ApiRequest, ApiResponse, Endpoint, HttpTransport, Method};
use async_trait::async_trait;
use serde_json::Value;
use std::collections::HashMap;
use std::sync::{Arc, Mutex, MutexGuard};
use std::time::Duration;

/// Record of one request seen by the mock
#[derive(Debug, Clone)]
pub struct RecordedRequest {
    pub host: String,
    pub token: Option<String>,
    pub method: Method,
    pub path: String,
    pub body: Option<Value>,
    /// Position in the global event sequence when the call started
    pub started: u64,
    /// Position in the global event sequence when the call finished
    pub finished: Option<u64>,
}

#[derive(Debug, Clone)]
enum Script {
    Fixed(ApiResponse),
    FailThenSucceed { status: u16, remaining: u32 },
    Refuse,
}

#[derive(Default)]
struct MockState {
    scripts: HashMap<String, Script>,
    requests: Vec<RecordedRequest>,
    sequence: u64,
    in_flight: HashMap<String, usize>,
    peak: HashMap<String, usize>,
}

#[derive(Default)]
pub struct MockTransport {
    state: Mutex<MockState>,
    latency: Mutex<Duration>,
}

impl MockTransport {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    fn lock(&self) -> MutexGuard<'_, MockState> {
        self.state.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    /// Delay applied to every call before it answers
    pub fn set_latency(&self, latency: Duration) {
        *self.latency.lock().unwrap_or_else(|p| p.into_inner()) = latency;
    }

    pub fn respond(&self, path: &str, status: u16, body: &str) {
        self.lock()
            .scripts
            .insert(path.to_string(), Script::Fixed(ApiResponse::new(status, body)));
    }

    pub fn respond_json(&self, path: &str, body: Value) {
        self.respond(path, 200, &body.to_string());
    }

    /// Answer `status` for the first `failures` calls, then 200
    pub fn fail_then_succeed(&self, path: &str, status: u16, failures: u32) {
        self.lock().scripts.insert(
            path.to_string(),
            Script::FailThenSucceed {
                status,
                remaining: failures,
            },
        );
    }

    /// Fail calls to `path` at the transport level
    pub fn refuse(&self, path: &str) {
        self.lock().scripts.insert(path.to_string(), Script::Refuse);
    }

    pub fn requests(&self) -> Vec<RecordedRequest> {
        self.lock().requests.clone()
    }

    pub fn calls_to(&self, path: &str) -> usize {
        self.lock().requests.iter().filter(|r| r.path == path).count()
    }

    /// Requests other than GETs, as `(method, path)` pairs
    pub fn mutations(&self) -> Vec<(Method, String)> {
        self.lock()
            .requests
            .iter()
            .filter(|r| r.method != Method::Get)
            .map(|r| (r.method, r.path.clone()))
            .collect()
    }

    pub fn peak_concurrency(&self, host: &str) -> usize {
        self.lock().peak.get(host).copied().unwrap_or(0)
    }

    fn begin(&self, endpoint: Endpoint<'_>, request: &ApiRequest) -> (usize, Option<ApiResponse>) {
        let mut state = self.lock();
        state.sequence += 1;
        let started = state.sequence;

        let host = endpoint.host.to_string();
        let current = {
            let count = state.in_flight.entry(host.clone()).or_insert(0);
            *count += 1;
            *count
        };
        let peak = state.peak.entry(host.clone()).or_insert(0);
        *peak = (*peak).max(current);

        state.requests.push(RecordedRequest {
            host,
            token: endpoint.token.map(str::to_string),
            method: request.method,
            path: request.path.clone(),
            body: request.body.clone(),
            started,
            finished: None,
        });
        let index = state.requests.len() - 1;

        let response = match state.scripts.get_mut(&request.path) {
            None => Some(ApiResponse::new(200, "{}")),
            Some(Script::Fixed(response)) => Some(response.clone()),
            Some(Script::FailThenSucceed { status, remaining }) => {
                if *remaining > 0 {
                    *remaining -= 1;
                    Some(ApiResponse::new(*status, "scripted failure"))
                } else {
                    Some(ApiResponse::new(200, "{}"))
                }
            }
            Some(Script::Refuse) => None,
        };
        (index, response)
    }

    fn finish(&self, host: &str, index: usize) {
        let mut state = self.lock();
        state.sequence += 1;
        let finished = state.sequence;
        state.requests[index].finished = Some(finished);
        if let Some(count) = state.in_flight.get_mut(host) {
            *count = count.saturating_sub(1);
        }
    }
}

#[async_trait]
impl HttpTransport for MockTransport {
    async fn send(&self, endpoint: Endpoint<'_>, request: &ApiRequest) -> Result<ApiResponse> {
        let (index, response) = self.begin(endpoint, request);

        let latency = *self.latency.lock().unwrap_or_else(|p| p.into_inner());
        if !latency.is_zero() {
            tokio::time::sleep(latency).await;
        }
        self.finish(endpoint.host, index);

        response.ok_or_else(|| ReplicationError::Transport {
            host: endpoint.host.to_string(),
            action: request.action.clone(),
            message: "connection refused".to_string(),
        })
    }
}
