//! Admission-controlled dispatcher
//!
//! One dispatcher per registry host. Every call first takes a slot from the
//! host's [`AdmissionGate`], then goes through the transport (unless the run
//! is a dry run), and is classified on the way back:
//!
//! - status >= 500: retried with a growing delay, up to `retries` extra
//!   attempts; running out is fatal or skips the action, depending on
//!   [`RetryExhaustion`]
//! - any other status, 4xx included: the action is done. Create calls are
//!   idempotent on the registry side, so "already exists" lands here
//! - transport failure: returned immediately, never retried

use crate::concurrency::{AdmissionGate, AdmissionStats};
use crate::config::{HostTarget, RetryExhaustion, RunConfig};
use crate::error::{ReplicationError, Result};
use crate::registry::endpoints;
use crate::registry::transport::{ApiRequest, ApiResponse, Endpoint, HttpTransport};
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};

/// Per-host counters reported at the end of a run
#[derive(Debug, Clone)]
pub struct DispatcherStats {
    pub host: String,
    pub admission: AdmissionStats,
    pub failed_actions: u64,
}

pub struct Dispatcher {
    target: HostTarget,
    gate: Arc<AdmissionGate>,
    transport: Arc<dyn HttpTransport>,
    config: RunConfig,
    failed_actions: AtomicU64,
}

impl Dispatcher {
    pub fn new(target: HostTarget, config: &RunConfig, transport: Arc<dyn HttpTransport>) -> Self {
        let gate = AdmissionGate::new(
            target.host.clone(),
            target.max_connections,
            config.sleep_period,
            config.admission_watchdog,
        );
        Self {
            target,
            gate,
            transport,
            config: config.clone(),
            failed_actions: AtomicU64::new(0),
        }
    }

    /// Override the run's dry-run flag for this host only
    pub fn with_dry_run(mut self, dry_run: bool) -> Self {
        self.config.dry_run = dry_run;
        self
    }

    pub fn host(&self) -> &str {
        &self.target.host
    }

    /// Run one logical action to completion
    pub async fn execute(&self, request: &ApiRequest) -> Result<ApiResponse> {
        let attempts = self.config.retries + 1;
        let mut last = ApiResponse::not_issued();

        for attempt in 0..attempts {
            let response = self.exchange(request, attempt).await?;

            if !response.is_server_error() {
                if response.is_client_error() {
                    tracing::debug!(
                        host = %self.target.host,
                        action = %request.action,
                        status = response.status,
                        body = %response.body,
                        "client error treated as completed"
                    );
                } else {
                    tracing::debug!(
                        host = %self.target.host,
                        action = %request.action,
                        status = response.status,
                        "action completed"
                    );
                }
                return Ok(response);
            }

            tracing::warn!(
                host = %self.target.host,
                method = %request.method,
                path = %request.path,
                status = response.status,
                body = %response.body,
                attempt,
                "server error"
            );

            if attempt + 1 < attempts {
                let delay = self.config.retry_delay(attempt);
                tracing::info!(
                    host = %self.target.host,
                    action = %request.action,
                    delay_ms = delay.as_millis() as u64,
                    "sleeping before a new attempt"
                );
                tokio::time::sleep(delay).await;
            }
            last = response;
        }

        self.exhausted(request, attempts, last)
    }

    async fn exchange(&self, request: &ApiRequest, attempt: u32) -> Result<ApiResponse> {
        let _slot = self.gate.admit(&request.action).await;

        if self.config.dry_run {
            tracing::debug!(
                host = %self.target.host,
                method = %request.method,
                path = %request.path,
                action = %request.action,
                "dry run, call not issued"
            );
            return Ok(ApiResponse::not_issued());
        }

        let endpoint = Endpoint {
            host: &self.target.host,
            token: self.target.bearer(),
        };
        let response = self.transport.send(endpoint, request).await?;
        tracing::debug!(
            host = %self.target.host,
            method = %request.method,
            path = %request.path,
            action = %request.action,
            status = response.status,
            attempt,
            "api call"
        );
        Ok(response)
    }

    fn exhausted(
        &self,
        request: &ApiRequest,
        attempts: u32,
        last: ApiResponse,
    ) -> Result<ApiResponse> {
        let error = ReplicationError::RetryExhausted {
            host: self.target.host.clone(),
            action: request.action.clone(),
            attempts,
        };
        match self.config.retry_exhaustion {
            RetryExhaustion::Abort => {
                tracing::error!(host = %self.target.host, body = ?request.body, "{}", error);
                Err(error)
            }
            RetryExhaustion::SkipAction => {
                tracing::error!(host = %self.target.host, body = ?request.body, "{}, skipping", error);
                self.failed_actions.fetch_add(1, Ordering::Relaxed);
                Ok(last)
            }
        }
    }

    /// Check that the host answers and accepts the token
    pub async fn verify_login(&self) -> Result<()> {
        let response = self.execute(&endpoints::check_login()).await?;
        if response.is_client_error() || response.is_server_error() {
            return Err(ReplicationError::Authentication {
                host: self.target.host.clone(),
                status: response.status,
            });
        }
        Ok(())
    }

    pub fn stats(&self) -> DispatcherStats {
        DispatcherStats {
            host: self.target.host.clone(),
            admission: self.gate.stats(),
            failed_actions: self.failed_actions.load(Ordering::Relaxed),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::MockTransport;
    use std::time::Duration;

    fn config(retries: u32) -> RunConfig {
        RunConfig {
            sleep_period: Duration::from_millis(5),
            backoff_unit: Duration::from_millis(10),
            retries,
            ..RunConfig::default()
        }
    }

    fn dispatcher(mock: &Arc<MockTransport>, config: &RunConfig) -> Dispatcher {
        Dispatcher::new(
            HostTarget::new("quay.example.com", "secret", 2),
            config,
            Arc::clone(mock) as Arc<dyn HttpTransport>,
        )
    }

    #[tokio::test]
    async fn test_client_error_is_not_retried() {
        let mock = MockTransport::new();
        mock.respond("/api/v1/organization/", 400, r#"{"error_message": "exists"}"#);
        let dispatcher = dispatcher(&mock, &config(3));

        let response = dispatcher
            .execute(&endpoints::create_organization("platform"))
            .await
            .unwrap();
        assert_eq!(response.status, 400);
        assert_eq!(mock.calls_to("/api/v1/organization/"), 1);
    }

    #[tokio::test]
    async fn test_server_errors_are_retried_until_success() {
        let mock = MockTransport::new();
        mock.fail_then_succeed("/api/v1/organization/", 503, 2);
        let dispatcher = dispatcher(&mock, &config(3));

        let response = dispatcher
            .execute(&endpoints::create_organization("platform"))
            .await
            .unwrap();
        assert_eq!(response.status, 200);
        assert_eq!(mock.calls_to("/api/v1/organization/"), 3);
    }

    #[tokio::test]
    async fn test_retry_exhaustion_aborts() {
        let mock = MockTransport::new();
        mock.respond("/api/v1/organization/", 500, "boom");
        let dispatcher = dispatcher(&mock, &config(2));

        let err = dispatcher
            .execute(&endpoints::create_organization("platform"))
            .await
            .unwrap_err();
        assert!(matches!(err, ReplicationError::RetryExhausted { attempts: 3, .. }));
        assert_eq!(mock.calls_to("/api/v1/organization/"), 3);
    }

    #[tokio::test]
    async fn test_retry_exhaustion_can_skip_the_action() {
        let mock = MockTransport::new();
        mock.respond("/api/v1/organization/", 502, "bad gateway");
        let config = RunConfig {
            retry_exhaustion: RetryExhaustion::SkipAction,
            ..config(1)
        };
        let dispatcher = dispatcher(&mock, &config);

        let response = dispatcher
            .execute(&endpoints::create_organization("platform"))
            .await
            .unwrap();
        assert_eq!(response.status, 502);
        assert_eq!(dispatcher.stats().failed_actions, 1);
    }

    #[tokio::test]
    async fn test_transport_error_is_immediately_fatal() {
        let mock = MockTransport::new();
        mock.refuse("/api/v1/organization/");
        let dispatcher = dispatcher(&mock, &config(3));

        let err = dispatcher
            .execute(&endpoints::create_organization("platform"))
            .await
            .unwrap_err();
        assert!(matches!(err, ReplicationError::Transport { .. }));
        assert_eq!(mock.calls_to("/api/v1/organization/"), 1);
        assert_eq!(dispatcher.stats().admission.in_flight, 0);
    }

    #[tokio::test]
    async fn test_dry_run_skips_exchange_but_counts_admission() {
        let mock = MockTransport::new();
        let config = RunConfig {
            dry_run: true,
            ..config(3)
        };
        let dispatcher = dispatcher(&mock, &config);

        let response = dispatcher
            .execute(&endpoints::create_organization("platform"))
            .await
            .unwrap();
        assert_eq!(response, ApiResponse::not_issued());
        assert!(mock.requests().is_empty());
        assert_eq!(dispatcher.stats().admission.completed, 1);
    }

    #[tokio::test]
    async fn test_bearer_token_is_forwarded() {
        let mock = MockTransport::new();
        let dispatcher = dispatcher(&mock, &config(0));
        dispatcher.execute(&endpoints::check_login()).await.unwrap();
        assert_eq!(mock.requests()[0].token.as_deref(), Some("secret"));
    }

    #[tokio::test]
    async fn test_login_rejected() {
        let mock = MockTransport::new();
        mock.respond("/api/v1/user/logs", 401, "unauthorized");
        let dispatcher = dispatcher(&mock, &config(0));
        let err = dispatcher.verify_login().await.unwrap_err();
        assert!(matches!(err, ReplicationError::Authentication { status: 401, .. }));
    }
}
