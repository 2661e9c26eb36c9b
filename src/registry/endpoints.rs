//! Quay REST endpoints used by the replicator
//!
//! Each builder returns a ready [`ApiRequest`] with its JSON body and a log
//! label. Paths are the fixed set the tool needs, nothing more.

use crate::model::{PermissionAssignment, Repository, Robot, SubjectKind, Team};
use crate::registry::transport::ApiRequest;
use serde_json::json;

pub fn check_login() -> ApiRequest {
    ApiRequest::get("/api/v1/user/logs", "checking login")
}

pub fn list_user_organizations() -> ApiRequest {
    ApiRequest::get("/api/v1/user/", "get user organizations")
}

pub fn get_organization(org: &str) -> ApiRequest {
    ApiRequest::get(
        format!("/api/v1/organization/{}", org),
        format!("get {} organization details", org),
    )
}

pub fn list_robots(org: &str) -> ApiRequest {
    ApiRequest::get(
        format!("/api/v1/organization/{}/robots?permission=true&token=false", org),
        format!("get {} organization robots", org),
    )
}

pub fn list_repositories(org: &str) -> ApiRequest {
    ApiRequest::get(
        format!("/api/v1/repository?public=true&namespace={}", org),
        format!("get {} organization repositories", org),
    )
}

pub fn list_repository_permissions(org: &str, repo: &str, kind: SubjectKind) -> ApiRequest {
    let segment = kind.endpoint_segment();
    ApiRequest::get(
        format!("/api/v1/repository/{}/{}/permissions/{}/", org, repo, segment),
        format!("get {}/{} {} permissions", org, repo, segment),
    )
}

pub fn create_organization(org: &str) -> ApiRequest {
    ApiRequest::post(
        "/api/v1/organization/",
        json!({ "name": org }),
        format!("create organization {}", org),
    )
}

pub fn create_robot(org: &str, robot: &Robot) -> ApiRequest {
    ApiRequest::put(
        format!("/api/v1/organization/{}/robots/{}", org, robot.name),
        json!({ "description": robot.description }),
        format!("create robot {}", robot.name),
    )
}

pub fn create_team(org: &str, team: &Team) -> ApiRequest {
    ApiRequest::put(
        format!("/api/v1/organization/{}/team/{}", org, team.name),
        json!({ "role": team.role, "description": team.description }),
        format!("create team {}", team.name),
    )
}

pub fn sync_team(org: &str, team: &str, group_dn: &str) -> ApiRequest {
    ApiRequest::post(
        format!("/api/v1/organization/{}/team/{}/syncing", org, team),
        json!({ "group_dn": group_dn }),
        format!("create team sync {}", team),
    )
}

pub fn create_repository(org: &str, repo: &Repository) -> ApiRequest {
    ApiRequest::post(
        "/api/v1/repository",
        json!({
            "repository": repo.name,
            "visibility": "private",
            "namespace": org,
            "description": "repository description",
        }),
        format!("create repository {}", repo.name),
    )
}

pub fn assign_permission(assignment: &PermissionAssignment) -> ApiRequest {
    let subject = assignment.api_subject();
    ApiRequest::put(
        format!(
            "/api/v1/repository/{}/{}/permissions/{}/{}",
            assignment.organization,
            assignment.repository,
            assignment.kind.endpoint_segment(),
            subject
        ),
        json!({ "role": assignment.role }),
        format!(
            "create repo {} permission for {} {} and role {}",
            assignment.repository, assignment.kind, assignment.subject, assignment.role
        ),
    )
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::registry::transport::Method;

    #[test]
    fn test_robot_permission_targets_user_endpoint() {
        let assignment = PermissionAssignment {
            organization: "platform".into(),
            repository: "api".into(),
            subject: "builder".into(),
            kind: SubjectKind::Robot,
            role: "write".into(),
        };
        let request = assign_permission(&assignment);
        assert_eq!(request.method, Method::Put);
        assert_eq!(
            request.path,
            "/api/v1/repository/platform/api/permissions/user/platform+builder"
        );
        assert_eq!(request.body, Some(json!({ "role": "write" })));
    }

    #[test]
    fn test_team_permission_uses_bare_name() {
        let assignment = PermissionAssignment {
            organization: "platform".into(),
            repository: "api".into(),
            subject: "devs".into(),
            kind: SubjectKind::Team,
            role: "read".into(),
        };
        assert_eq!(
            assign_permission(&assignment).path,
            "/api/v1/repository/platform/api/permissions/team/devs"
        );
    }

    #[test]
    fn test_create_repository_body() {
        let request = create_repository("platform", &Repository::new("api"));
        assert_eq!(request.method, Method::Post);
        assert_eq!(request.path, "/api/v1/repository");
        let body = request.body.unwrap();
        assert_eq!(body["repository"], "api");
        assert_eq!(body["namespace"], "platform");
        assert_eq!(body["visibility"], "private");
    }

    #[test]
    fn test_source_listing_paths() {
        assert_eq!(
            list_robots("platform").path,
            "/api/v1/organization/platform/robots?permission=true&token=false"
        );
        assert_eq!(
            list_repositories("platform").path,
            "/api/v1/repository?public=true&namespace=platform"
        );
        assert_eq!(
            list_repository_permissions("platform", "api", SubjectKind::Team).path,
            "/api/v1/repository/platform/api/permissions/team/"
        );
    }
}
