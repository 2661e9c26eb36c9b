//! Error handling module for the replicator

use thiserror::Error;

#[derive(Error, Debug)]
pub enum ReplicationError {
    #[error("Configuration error: {0}")]
    Configuration(String),

    #[error("Duplicated organization {0}")]
    DuplicateOrganization(String),

    #[error("Authentication failed on host {host} (status {status})")]
    Authentication { host: String, status: u16 },

    #[error("Transport error on host {host} during '{action}': {message}")]
    Transport {
        host: String,
        action: String,
        message: String,
    },

    #[error("Malformed response from host {host} during '{action}': {message}")]
    MalformedResponse {
        host: String,
        action: String,
        message: String,
    },

    #[error("Too many attempts: unable to execute action '{action}' on host {host} after {attempts} attempts")]
    RetryExhausted {
        host: String,
        action: String,
        attempts: u32,
    },

    #[error("{count} actions failed after exhausting their retries")]
    ActionsFailed { count: u64 },

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("YAML error: {0}")]
    Yaml(#[from] serde_yaml::Error),

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
}

impl ReplicationError {
    /// Errors raised before any network activity took place.
    pub fn is_configuration(&self) -> bool {
        matches!(
            self,
            ReplicationError::Configuration(_)
                | ReplicationError::DuplicateOrganization(_)
                | ReplicationError::Yaml(_)
                | ReplicationError::Io(_)
        )
    }
}

impl From<url::ParseError> for ReplicationError {
    fn from(err: url::ParseError) -> Self {
        ReplicationError::Configuration(format!("invalid host address: {}", err))
    }
}

pub type Result<T> = std::result::Result<T, ReplicationError>;
