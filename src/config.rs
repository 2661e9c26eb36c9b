//! Configuration management module

use crate::error::{ReplicationError, Result};
use serde::{Deserialize, Serialize};
use std::time::Duration;

/// Stall window used when the admission watchdog is enabled from the CLI.
pub const DEFAULT_WATCHDOG_STALL: Duration = Duration::from_secs(30);

/// Destination (or clone source) registry host
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct HostTarget {
    pub host: String,
    #[serde(default)]
    pub token: String,
    #[serde(rename = "max_connections")]
    pub max_connections: usize,
}

impl HostTarget {
    pub fn new(host: impl Into<String>, token: impl Into<String>, max_connections: usize) -> Self {
        Self {
            host: host.into(),
            token: token.into(),
            max_connections,
        }
    }

    pub fn validate(&self) -> Result<()> {
        if self.host.trim().is_empty() {
            return Err(ReplicationError::Configuration(
                "Host name cannot be empty".to_string(),
            ));
        }
        if self.max_connections == 0 {
            return Err(ReplicationError::Configuration(format!(
                "max_connections for host {} must be greater than 0",
                self.host
            )));
        }
        Ok(())
    }

    /// Token to send, if any.
    pub fn bearer(&self) -> Option<&str> {
        if self.token.is_empty() {
            None
        } else {
            Some(self.token.as_str())
        }
    }
}

/// What happens when an action keeps failing with server errors
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RetryExhaustion {
    /// Stop the whole run with a fatal error.
    #[default]
    Abort,
    /// Give up on the one action, record it as failed and carry on.
    SkipAction,
}

/// Run-wide settings handed to the dispatchers, introspector and orchestrator
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RunConfig {
    pub debug: bool,
    pub skip_verify: bool,
    pub dry_run: bool,
    pub insecure: bool,
    pub ldap_sync: bool,
    pub clone: bool,
    /// Admission poll interval, also the delay before the first retry
    pub sleep_period: Duration,
    pub retries: u32,
    /// Multiplied by the attempt number for every later retry
    pub backoff_unit: Duration,
    pub retry_exhaustion: RetryExhaustion,
    /// Stall window after which a blocked admission resets the host gate
    pub admission_watchdog: Option<Duration>,
}

impl Default for RunConfig {
    fn default() -> Self {
        Self {
            debug: false,
            skip_verify: false,
            dry_run: false,
            insecure: false,
            ldap_sync: false,
            clone: false,
            sleep_period: Duration::from_millis(100),
            retries: 3,
            backoff_unit: Duration::from_secs(1),
            retry_exhaustion: RetryExhaustion::Abort,
            admission_watchdog: None,
        }
    }
}

impl RunConfig {
    pub fn validate(&self) -> Result<()> {
        if self.sleep_period.is_zero() {
            return Err(ReplicationError::Configuration(
                "sleep period must be greater than 0".to_string(),
            ));
        }
        if let Some(stall) = self.admission_watchdog {
            if stall <= self.sleep_period {
                return Err(ReplicationError::Configuration(
                    "admission watchdog window must exceed the sleep period".to_string(),
                ));
            }
        }
        Ok(())
    }

    /// Delay before retrying after a server error on `attempt` (0-based)
    pub fn retry_delay(&self, attempt: u32) -> Duration {
        if attempt == 0 {
            self.sleep_period
        } else {
            self.backoff_unit * attempt
        }
    }

    /// URL scheme used to reach every host
    pub fn scheme(&self) -> &'static str {
        if self.insecure { "http" } else { "https" }
    }

    /// Overlay settings from environment variables
    pub fn from_env(mut self) -> Self {
        if let Ok(val) = std::env::var("REPLIQUAY_SLEEP_MS") {
            if let Ok(ms) = val.parse::<u64>() {
                self.sleep_period = Duration::from_millis(ms);
            }
        }
        if let Ok(val) = std::env::var("REPLIQUAY_RETRIES") {
            if let Ok(retries) = val.parse() {
                self.retries = retries;
            }
        }
        if let Ok(val) = std::env::var("REPLIQUAY_DEBUG") {
            self.debug = parse_flag(&val);
        }
        if let Ok(val) = std::env::var("REPLIQUAY_SKIP_VERIFY") {
            self.skip_verify = parse_flag(&val);
        }
        if let Ok(val) = std::env::var("REPLIQUAY_DRY_RUN") {
            self.dry_run = parse_flag(&val);
        }
        self
    }
}

fn parse_flag(val: &str) -> bool {
    val.eq_ignore_ascii_case("true") || val == "1"
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_host_validation() {
        assert!(HostTarget::new("quay.example.com", "t", 4).validate().is_ok());
        assert!(HostTarget::new("", "t", 4).validate().is_err());
        assert!(HostTarget::new("quay.example.com", "t", 0).validate().is_err());
    }

    #[test]
    fn test_bearer_only_when_token_present() {
        assert_eq!(HostTarget::new("h", "", 1).bearer(), None);
        assert_eq!(HostTarget::new("h", "abc", 1).bearer(), Some("abc"));
    }

    #[test]
    fn test_retry_delay_grows_linearly() {
        let config = RunConfig {
            sleep_period: Duration::from_millis(100),
            backoff_unit: Duration::from_secs(1),
            ..RunConfig::default()
        };
        assert_eq!(config.retry_delay(0), Duration::from_millis(100));
        assert_eq!(config.retry_delay(1), Duration::from_secs(1));
        assert_eq!(config.retry_delay(2), Duration::from_secs(2));
        assert!(config.retry_delay(3) > config.retry_delay(2));
    }

    #[test]
    fn test_validate_rejects_zero_sleep() {
        let config = RunConfig {
            sleep_period: Duration::ZERO,
            ..RunConfig::default()
        };
        assert!(config.validate().is_err());
        assert!(RunConfig::default().validate().is_ok());
    }

    #[test]
    fn test_scheme_follows_insecure_flag() {
        let mut config = RunConfig::default();
        assert_eq!(config.scheme(), "https");
        config.insecure = true;
        assert_eq!(config.scheme(), "http");
    }
}
