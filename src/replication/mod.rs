//! Replication pipeline
//!
//! - [`permissions`]: flattens nested repository grants
//! - [`introspect`]: reads the configuration of a live source host
//! - [`orchestrator`]: applies the configuration to destination hosts

pub mod introspect;
pub mod orchestrator;
pub mod permissions;

pub use introspect::SourceIntrospector;
pub use orchestrator::Replicator;
pub use permissions::{map_permissions, organization_permissions};
