//! Permission mapping
//!
//! Flattens the robot/team grants nested under each repository into
//! [`PermissionAssignment`] records stamped with their repository and
//! organization.

use crate::model::{Organization, PermissionAssignment, Repository, SubjectKind};

/// Flatten one subject kind's grants across `repositories`, keeping
/// repository order and then declaration order
pub fn map_permissions(
    repositories: &[Repository],
    kind: SubjectKind,
    organization: &str,
) -> Vec<PermissionAssignment> {
    let assignments: Vec<PermissionAssignment> = repositories
        .iter()
        .flat_map(|repo| {
            repo.grants(kind).iter().map(move |grant| PermissionAssignment {
                organization: organization.to_string(),
                repository: repo.name.clone(),
                subject: grant.name.clone(),
                kind,
                role: grant.role.clone(),
            })
        })
        .collect();

    tracing::debug!(
        organization,
        kind = %kind,
        repositories = repositories.len(),
        mapped = assignments.len(),
        "mapped repository permissions"
    );
    assignments
}

/// Robot assignments followed by team assignments for one organization
pub fn organization_permissions(org: &Organization) -> Vec<PermissionAssignment> {
    let mut assignments = map_permissions(&org.repositories, SubjectKind::Robot, &org.name);
    assignments.extend(map_permissions(&org.repositories, SubjectKind::Team, &org.name));
    assignments
}
