//! Response bodies returned by a source host
//!
//! Only the fields the introspector reads are modelled; everything else in
//! the Quay payloads is ignored.

use serde::Deserialize;
use std::collections::BTreeMap;

#[derive(Debug, Default, Deserialize)]
pub struct UserResponse {
    #[serde(default)]
    pub organizations: Vec<OrganizationSummary>,
}

#[derive(Debug, Deserialize)]
pub struct OrganizationSummary {
    pub name: String,
}

#[derive(Debug, Default, Deserialize)]
pub struct OrganizationDetail {
    #[serde(default)]
    pub teams: BTreeMap<String, TeamDetail>,
    #[serde(default)]
    pub ordered_teams: Vec<String>,
}

impl OrganizationDetail {
    /// Teams in the host's display order, falling back to name order for
    /// teams missing from `ordered_teams`
    pub fn teams_in_order(&self) -> Vec<&TeamDetail> {
        let mut ordered: Vec<&TeamDetail> = self
            .ordered_teams
            .iter()
            .filter_map(|name| self.teams.get(name))
            .collect();
        for (name, team) in &self.teams {
            if !self.ordered_teams.contains(name) {
                ordered.push(team);
            }
        }
        ordered
    }
}

#[derive(Debug, Default, Deserialize)]
pub struct TeamDetail {
    pub name: String,
    #[serde(default)]
    pub description: Option<String>,
    #[serde(default)]
    pub role: String,
    #[serde(default)]
    pub is_synced: bool,
}

#[derive(Debug, Default, Deserialize)]
pub struct RobotsResponse {
    #[serde(default)]
    pub robots: Vec<RobotDetail>,
}

#[derive(Debug, Deserialize)]
pub struct RobotDetail {
    pub name: String,
    #[serde(default)]
    pub description: Option<String>,
}

#[derive(Debug, Default, Deserialize)]
pub struct RepositoriesResponse {
    #[serde(default)]
    pub repositories: Vec<RepositorySummary>,
}

#[derive(Debug, Deserialize)]
pub struct RepositorySummary {
    pub name: String,
}

#[derive(Debug, Default, Deserialize)]
pub struct PermissionsResponse {
    #[serde(default)]
    pub permissions: BTreeMap<String, PermissionDetail>,
}

#[derive(Debug, Deserialize)]
pub struct PermissionDetail {
    pub name: String,
    pub role: String,
    #[serde(default)]
    pub is_robot: bool,
}
