//! Canonical configuration model
//!
//! Organizations, their repositories, robots and teams, as described by the
//! declarative organization files or recovered from a live source host. Once
//! built the model is read-only for the rest of the run.

use serde::{Deserialize, Serialize};
use std::fmt;

/// Separator between organization and robot name in robot subject names
pub const ROBOT_SEPARATOR: char = '+';

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Organization {
    #[serde(rename = "quay_organization")]
    pub name: String,
    #[serde(rename = "quay_organization_role_name", default)]
    pub role_name: String,
    #[serde(rename = "repositories", default)]
    pub repositories: Vec<Repository>,
    #[serde(rename = "robots", default)]
    pub robots: Vec<Robot>,
    #[serde(rename = "teams", default)]
    pub teams: Vec<Team>,
}

impl Organization {
    pub fn new(name: impl Into<String>) -> Self {
        let name = name.into();
        Self {
            role_name: name.clone(),
            name,
            ..Self::default()
        }
    }

    pub fn repository(&self, name: &str) -> Option<&Repository> {
        self.repositories.iter().find(|repo| repo.name == name)
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Repository {
    pub name: String,
    #[serde(default)]
    pub mirror: bool,
    #[serde(rename = "permissions", default)]
    pub permissions: RepositoryPermissions,
}

impl Repository {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            ..Self::default()
        }
    }

    pub fn grants(&self, kind: SubjectKind) -> &[PermissionGrant] {
        match kind {
            SubjectKind::Robot => &self.permissions.robots,
            SubjectKind::Team => &self.permissions.teams,
        }
    }
}

/// Nested permission lists of one repository
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct RepositoryPermissions {
    #[serde(default)]
    pub robots: Vec<PermissionGrant>,
    #[serde(default)]
    pub teams: Vec<PermissionGrant>,
}

/// A (subject, role) entry as written under a repository
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PermissionGrant {
    pub name: String,
    pub role: String,
}

impl PermissionGrant {
    pub fn new(name: impl Into<String>, role: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            role: role.into(),
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Robot {
    pub name: String,
    #[serde(rename = "desc", default)]
    pub description: String,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Team {
    pub name: String,
    #[serde(default)]
    pub description: String,
    #[serde(default)]
    pub group_dn: Option<String>,
    #[serde(default)]
    pub role: String,
}

impl Team {
    /// Directory group to bind, ignoring blank references
    pub fn directory_group(&self) -> Option<&str> {
        self.group_dn
            .as_deref()
            .map(str::trim)
            .filter(|dn| !dn.is_empty())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SubjectKind {
    Robot,
    Team,
}

impl SubjectKind {
    /// Path segment of the repository permission endpoint
    pub fn endpoint_segment(self) -> &'static str {
        match self {
            SubjectKind::Robot => "user",
            SubjectKind::Team => "team",
        }
    }
}

impl fmt::Display for SubjectKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SubjectKind::Robot => write!(f, "robots"),
            SubjectKind::Team => write!(f, "teams"),
        }
    }
}

/// Flattened grant ready to be sent to a host
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PermissionAssignment {
    pub organization: String,
    pub repository: String,
    pub subject: String,
    pub kind: SubjectKind,
    pub role: String,
}

impl PermissionAssignment {
    /// Subject name as transmitted: robots are namespaced by organization
    pub fn api_subject(&self) -> String {
        match self.kind {
            SubjectKind::Robot => {
                format!("{}{}{}", self.organization, ROBOT_SEPARATOR, self.subject)
            }
            SubjectKind::Team => self.subject.clone(),
        }
    }
}

/// Split a namespaced robot subject into its bare robot name
pub fn bare_robot_name(subject: &str) -> Option<&str> {
    subject
        .split_once(ROBOT_SEPARATOR)
        .map(|(_, robot)| robot)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_organization_yaml_shape() {
        let yaml = r#"
quay_organization: platform
quay_organization_role_name: platform-admins
repositories:
  - name: api
    mirror: true
    permissions:
      robots:
        - name: builder
          role: write
      teams:
        - name: devs
          role: read
robots:
  - name: builder
    desc: CI robot
teams:
  - name: devs
    description: Developers
    group_dn: cn=devs,ou=groups
    role: member
"#;
        let org: Organization = serde_yaml::from_str(yaml).unwrap();
        assert_eq!(org.name, "platform");
        assert_eq!(org.role_name, "platform-admins");
        assert!(org.repositories[0].mirror);
        assert_eq!(org.repositories[0].grants(SubjectKind::Robot)[0].role, "write");
        assert_eq!(org.robots[0].description, "CI robot");
        assert_eq!(org.teams[0].directory_group(), Some("cn=devs,ou=groups"));
    }

    #[test]
    fn test_missing_sections_default_to_empty() {
        let org: Organization = serde_yaml::from_str("quay_organization: bare\n").unwrap();
        assert!(org.repositories.is_empty());
        assert!(org.robots.is_empty());
        assert!(org.teams.is_empty());
    }

    #[test]
    fn test_robot_subjects_are_namespaced() {
        let assignment = PermissionAssignment {
            organization: "platform".into(),
            repository: "api".into(),
            subject: "builder".into(),
            kind: SubjectKind::Robot,
            role: "write".into(),
        };
        assert_eq!(assignment.api_subject(), "platform+builder");

        let team = PermissionAssignment {
            kind: SubjectKind::Team,
            subject: "devs".into(),
            ..assignment
        };
        assert_eq!(team.api_subject(), "devs");
    }

    #[test]
    fn test_bare_robot_name() {
        assert_eq!(bare_robot_name("platform+builder"), Some("builder"));
        assert_eq!(bare_robot_name("alice"), None);
    }

    #[test]
    fn test_blank_group_dn_is_ignored() {
        let team = Team {
            name: "devs".into(),
            group_dn: Some("  ".into()),
            ..Team::default()
        };
        assert_eq!(team.directory_group(), None);
    }
}
