//! Source introspection (clone mode)
//!
//! Reads the organization / team / robot / repository / permission tree of a
//! live source host and turns it into the canonical model, so it can be
//! replayed on destination hosts exactly like a declarative description.
//!
//! Organizations are read one after another. Inside one organization the
//! team, robot and repository listings run concurrently, and every
//! repository's team and user permission listings run concurrently too; the
//! organization is complete once all of them have joined.

use crate::error::{ReplicationError, Result};
use crate::logging::Logger;
use crate::model::{
    Organization, PermissionGrant, Repository, RepositoryPermissions, Robot, SubjectKind, Team,
    bare_robot_name,
};
use crate::registry::Dispatcher;
use crate::registry::api_types::{
    OrganizationDetail, PermissionsResponse, RepositoriesResponse, RobotsResponse, UserResponse,
};
use crate::registry::endpoints;
use crate::registry::transport::ApiRequest;
use futures::future::try_join_all;
use serde::de::DeserializeOwned;
use std::sync::Arc;

pub struct SourceIntrospector {
    dispatcher: Arc<Dispatcher>,
    output: Logger,
}

impl SourceIntrospector {
    pub fn new(dispatcher: Arc<Dispatcher>, output: Logger) -> Self {
        Self { dispatcher, output }
    }

    /// Every organization visible to the source token, fully populated
    pub async fn fetch(&self) -> Result<Vec<Organization>> {
        let user: UserResponse = self
            .get_json(&endpoints::list_user_organizations())
            .await?;

        self.output.info(&format!(
            "Source {} exposes {} organizations",
            self.dispatcher.host(),
            user.organizations.len()
        ));

        let mut organizations = Vec::with_capacity(user.organizations.len());
        for summary in &user.organizations {
            let org = self.fetch_organization(&summary.name).await?;
            self.output.detail(&format!(
                "org {}: {} repositories, {} robots, {} teams",
                org.name,
                org.repositories.len(),
                org.robots.len(),
                org.teams.len()
            ));
            organizations.push(org);
        }
        Ok(organizations)
    }

    pub async fn fetch_organization(&self, name: &str) -> Result<Organization> {
        self.output.step(&format!("Reading organization {}", name));

        let (teams, robots, repositories) = futures::try_join!(
            self.fetch_teams(name),
            self.fetch_robots(name),
            self.fetch_repositories(name),
        )?;

        Ok(Organization {
            name: name.to_string(),
            role_name: name.to_string(),
            repositories,
            robots,
            teams,
        })
    }

    /// Teams bound to a directory group are skipped: their membership is
    /// managed outside the registry.
    async fn fetch_teams(&self, org: &str) -> Result<Vec<Team>> {
        let detail: OrganizationDetail = self.get_json(&endpoints::get_organization(org)).await?;

        Ok(detail
            .teams_in_order()
            .into_iter()
            .filter(|team| !team.is_synced)
            .map(|team| Team {
                name: team.name.clone(),
                description: team.description.clone().unwrap_or_default(),
                group_dn: None,
                role: team.role.clone(),
            })
            .collect())
    }

    async fn fetch_robots(&self, org: &str) -> Result<Vec<Robot>> {
        let response: RobotsResponse = self.get_json(&endpoints::list_robots(org)).await?;

        Ok(response
            .robots
            .into_iter()
            .map(|robot| Robot {
                name: bare_robot_name(&robot.name)
                    .unwrap_or(&robot.name)
                    .to_string(),
                description: robot.description.unwrap_or_default(),
            })
            .collect())
    }

    async fn fetch_repositories(&self, org: &str) -> Result<Vec<Repository>> {
        let response: RepositoriesResponse =
            self.get_json(&endpoints::list_repositories(org)).await?;

        try_join_all(
            response
                .repositories
                .iter()
                .map(|repo| self.fetch_repository(org, &repo.name)),
        )
        .await
    }

    async fn fetch_repository(&self, org: &str, repo: &str) -> Result<Repository> {
        let team_request = endpoints::list_repository_permissions(org, repo, SubjectKind::Team);
        let user_request = endpoints::list_repository_permissions(org, repo, SubjectKind::Robot);
        let (teams, users) = futures::try_join!(
            self.get_json::<PermissionsResponse>(&team_request),
            self.get_json::<PermissionsResponse>(&user_request),
        )?;

        let teams = teams
            .permissions
            .into_values()
            .map(|perm| PermissionGrant::new(perm.name, perm.role))
            .collect();

        // Robots are listed under the user permissions; plain users are not
        // replicated.
        let robots = users
            .permissions
            .into_values()
            .filter(|perm| perm.is_robot)
            .filter_map(|perm| {
                bare_robot_name(&perm.name).map(|robot| PermissionGrant::new(robot, perm.role))
            })
            .collect();

        Ok(Repository {
            name: repo.to_string(),
            mirror: false,
            permissions: RepositoryPermissions { robots, teams },
        })
    }

    async fn get_json<T: DeserializeOwned + Default>(&self, request: &ApiRequest) -> Result<T> {
        let response = self.dispatcher.execute(request).await?;

        if matches!(response.status, 401 | 403) {
            return Err(ReplicationError::Authentication {
                host: self.dispatcher.host().to_string(),
                status: response.status,
            });
        }
        if !response.is_success() {
            tracing::warn!(
                host = %self.dispatcher.host(),
                action = %request.action,
                status = response.status,
                "source returned no data"
            );
            return Ok(T::default());
        }

        serde_json::from_str(&response.body).map_err(|e| ReplicationError::MalformedResponse {
            host: self.dispatcher.host().to_string(),
            action: request.action.clone(),
            message: e.to_string(),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::{HostTarget, RunConfig};
    use crate::registry::HttpTransport;
    use crate::testing::MockTransport;
    use serde_json::json;

    fn introspector(mock: &Arc<MockTransport>) -> SourceIntrospector {
        let dispatcher = Dispatcher::new(
            HostTarget::new("source.example.com", "token", 4),
            &RunConfig::default(),
            Arc::clone(mock) as Arc<dyn HttpTransport>,
        );
        SourceIntrospector::new(Arc::new(dispatcher), Logger::default())
    }

    #[tokio::test]
    async fn test_synced_teams_are_skipped() {
        let mock = MockTransport::new();
        mock.respond_json(
            "/api/v1/organization/platform",
            json!({
                "teams": {
                    "owners": {"name": "owners", "role": "admin", "is_synced": false},
                    "ldap": {"name": "ldap", "role": "member", "is_synced": true}
                },
                "ordered_teams": ["owners", "ldap"]
            }),
        );

        let org = introspector(&mock).fetch_organization("platform").await.unwrap();
        assert_eq!(org.teams.len(), 1);
        assert_eq!(org.teams[0].name, "owners");
        assert_eq!(org.teams[0].role, "admin");
    }

    #[tokio::test]
    async fn test_robot_names_lose_their_namespace() {
        let mock = MockTransport::new();
        mock.respond_json(
            "/api/v1/organization/platform/robots?permission=true&token=false",
            json!({"robots": [{"name": "platform+builder", "description": "CI"}]}),
        );

        let org = introspector(&mock).fetch_organization("platform").await.unwrap();
        assert_eq!(org.robots, vec![Robot { name: "builder".into(), description: "CI".into() }]);
    }

    #[tokio::test]
    async fn test_only_robot_user_permissions_are_kept() {
        let mock = MockTransport::new();
        mock.respond_json(
            "/api/v1/repository?public=true&namespace=platform",
            json!({"repositories": [{"name": "api"}]}),
        );
        mock.respond_json(
            "/api/v1/repository/platform/api/permissions/user/",
            json!({"permissions": {
                "alice": {"name": "alice", "role": "admin", "is_robot": false},
                "platform+ghost": {"name": "platform+ghost", "role": "read", "is_robot": false},
                "platform+builder": {"name": "platform+builder", "role": "write", "is_robot": true}
            }}),
        );
        mock.respond_json(
            "/api/v1/repository/platform/api/permissions/team/",
            json!({"permissions": {"devs": {"name": "devs", "role": "read"}}}),
        );

        let org = introspector(&mock).fetch_organization("platform").await.unwrap();
        let repo = &org.repositories[0];
        assert_eq!(repo.permissions.robots, vec![PermissionGrant::new("builder", "write")]);
        assert_eq!(repo.permissions.teams, vec![PermissionGrant::new("devs", "read")]);
    }

    #[tokio::test]
    async fn test_malformed_body_is_fatal() {
        let mock = MockTransport::new();
        mock.respond("/api/v1/user/", 200, "<html>not json</html>");

        let err = introspector(&mock).fetch().await.unwrap_err();
        assert!(matches!(err, ReplicationError::MalformedResponse { .. }));
    }

    #[tokio::test]
    async fn test_error_status_reads_as_empty() {
        let mock = MockTransport::new();
        mock.respond("/api/v1/organization/platform", 404, r#"{"error": "not found"}"#);

        let org = introspector(&mock).fetch_organization("platform").await.unwrap();
        assert!(org.teams.is_empty());
    }

    #[tokio::test]
    async fn test_rejected_token_is_fatal() {
        let mock = MockTransport::new();
        mock.respond("/api/v1/user/", 401, r#"{"error": "unauthorized"}"#);

        let err = introspector(&mock).fetch().await.unwrap_err();
        assert!(matches!(err, ReplicationError::Authentication { status: 401, .. }));
    }
}
