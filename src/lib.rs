//! Quay replication library
//!
//! This file serves as the library root for the repliquay crate,
//! organizing and exposing the various modules that make up the application.

pub mod cli;
pub mod concurrency;
pub mod config;
pub mod error;
pub mod loader;
pub mod logging;
pub mod model;
pub mod registry;
pub mod replication;
pub mod testing;

pub use config::{HostTarget, RetryExhaustion, RunConfig};
pub use error::{ReplicationError, Result};
pub use logging::Logger;
