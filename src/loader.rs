//! Declarative file loading
//!
//! Three YAML documents feed a run:
//! - the quays file, listing registry hosts with their token and connection cap
//! - one organization file per organization
//! - an optional run-config file overriding command-line options

use crate::config::HostTarget;
use crate::error::{ReplicationError, Result};
use crate::model::Organization;
use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use std::path::{Path, PathBuf};

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct QuaysFile {
    #[serde(default)]
    pub quays: Vec<HostTarget>,
}

/// `params` section of the run-config file; absent keys keep CLI values
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct RunParams {
    pub sleep: Option<u64>,
    pub debug: Option<bool>,
    pub ldapsync: Option<bool>,
    pub dryrun: Option<bool>,
    pub clone: Option<bool>,
    pub retries: Option<u32>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct RunConfigFile {
    pub quays_file: Option<PathBuf>,
    #[serde(default)]
    pub repo_files: Vec<PathBuf>,
    #[serde(default)]
    pub params: RunParams,
}

pub fn load_hosts(path: &Path) -> Result<Vec<HostTarget>> {
    let content = std::fs::read_to_string(path).map_err(|e| {
        ReplicationError::Configuration(format!(
            "Error while reading quays file {}: {}",
            path.display(),
            e
        ))
    })?;
    let file: QuaysFile = serde_yaml::from_str(&content)?;

    for host in &file.quays {
        host.validate()?;
    }
    Ok(file.quays)
}

pub fn load_organization(path: &Path) -> Result<Organization> {
    let content = std::fs::read_to_string(path).map_err(|e| {
        ReplicationError::Configuration(format!(
            "Error while reading organization file {}: {}",
            path.display(),
            e
        ))
    })?;
    let org: Organization = serde_yaml::from_str(&content)?;
    if org.name.trim().is_empty() {
        return Err(ReplicationError::Configuration(format!(
            "{} does not name a quay_organization",
            path.display()
        )));
    }
    Ok(org)
}

/// Load every organization file, rejecting duplicate organization names
pub fn load_organizations(paths: &[PathBuf]) -> Result<Vec<Organization>> {
    let organizations = paths
        .iter()
        .map(|path| load_organization(path))
        .collect::<Result<Vec<_>>>()?;
    ensure_unique(&organizations)?;
    Ok(organizations)
}

pub fn ensure_unique(organizations: &[Organization]) -> Result<()> {
    let mut seen = HashSet::new();
    for org in organizations {
        if !seen.insert(org.name.as_str()) {
            return Err(ReplicationError::DuplicateOrganization(org.name.clone()));
        }
    }
    Ok(())
}

/// Read the run-config file; `None` when it does not exist
pub fn load_run_config(path: &Path) -> Result<Option<RunConfigFile>> {
    if !path.exists() {
        return Ok(None);
    }
    let content = std::fs::read_to_string(path)?;
    Ok(Some(serde_yaml::from_str(&content)?))
}
