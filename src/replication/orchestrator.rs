//! Replication orchestrator
//!
//! Drives every (destination host, organization) pair through the same
//! pipeline, all pairs concurrently:
//!
//! 1. create the organization
//! 2. create its robots and teams (and bind teams to their directory group
//!    when directory sync is on)
//! 3. create its repositories
//! 4. assign repository permissions, on the designated host only
//!
//! Each stage joins before the next starts, so a permission is never
//! assigned before both its repository and its subject exist. The first
//! error drops every sibling future still running; nothing already applied
//! on a host is rolled back.

use crate::config::RunConfig;
use crate::error::{ReplicationError, Result};
use crate::logging::Logger;
use crate::model::{Organization, PermissionAssignment, Robot, Team};
use crate::registry::{Dispatcher, endpoints};
use crate::replication::permissions::organization_permissions;
use futures::future::{try_join, try_join_all};
use std::collections::HashMap;
use std::sync::Arc;

pub struct Replicator {
    dispatchers: Vec<Arc<Dispatcher>>,
    config: RunConfig,
    output: Logger,
}

impl Replicator {
    pub fn new(dispatchers: Vec<Arc<Dispatcher>>, config: &RunConfig, output: Logger) -> Self {
        Self {
            dispatchers,
            config: config.clone(),
            output,
        }
    }

    pub fn dispatchers(&self) -> &[Arc<Dispatcher>] {
        &self.dispatchers
    }

    /// Check every destination accepts its token, all hosts at once
    ///
    /// Skipped in dry-run mode since no call would reach the host anyway.
    pub async fn verify_logins(&self) -> Result<()> {
        if self.config.dry_run {
            self.output.info("Dry run: skipping login check");
            return Ok(());
        }
        try_join_all(self.dispatchers.iter().map(|dispatcher| async move {
            dispatcher.verify_login().await?;
            self.output.step(&format!("Login ok on {}", dispatcher.host()));
            Ok::<_, ReplicationError>(())
        }))
        .await?;
        Ok(())
    }

    /// Converge every destination host toward `organizations`
    pub async fn replicate(&self, organizations: &[Organization]) -> Result<()> {
        let permissions: HashMap<&str, Vec<PermissionAssignment>> = organizations
            .iter()
            .map(|org| {
                let mapped = organization_permissions(org);
                self.output.detail(&format!(
                    "Total mapped permissions for org {}: {}",
                    org.name,
                    mapped.len()
                ));
                (org.name.as_str(), mapped)
            })
            .collect();

        let permissions = &permissions;
        let pipelines = self.dispatchers.iter().enumerate().flat_map(move |(index, dispatcher)| {
            organizations.iter().map(move |org| {
                // Permissions do not depend on the host; only the first
                // destination applies them.
                let assignments = if index == 0 {
                    permissions.get(org.name.as_str()).map(Vec::as_slice)
                } else {
                    None
                };
                self.replicate_organization(dispatcher, org, assignments)
            })
        });

        try_join_all(pipelines).await?;
        Ok(())
    }

    async fn replicate_organization(
        &self,
        dispatcher: &Dispatcher,
        org: &Organization,
        assignments: Option<&[PermissionAssignment]>,
    ) -> Result<()> {
        let host = dispatcher.host();

        self.output
            .step(&format!("creating organization - Host: {}\t- {}", host, org.name));
        dispatcher
            .execute(&endpoints::create_organization(&org.name))
            .await?;

        self.output.step(&format!(
            "creating robots and teams for organization {} - Host: {}",
            org.name, host
        ));
        try_join(
            self.create_robots(dispatcher, &org.name, &org.robots),
            self.create_teams(dispatcher, &org.name, &org.teams),
        )
        .await?;

        self.output.step(&format!(
            "creating repositories for organization {} - Host: {}",
            org.name, host
        ));
        try_join_all(org.repositories.iter().map(|repo| async move {
            dispatcher
                .execute(&endpoints::create_repository(&org.name, repo))
                .await
        }))
        .await?;

        if let Some(assignments) = assignments {
            self.output.step(&format!(
                "creating {} permissions for repositories in organization {} - Host: {}",
                assignments.len(),
                org.name,
                host
            ));
            self.assign_permissions(dispatcher, assignments).await?;
        }

        self.output
            .success(&format!("organization {} replicated on {}", org.name, host));
        Ok(())
    }

    async fn create_robots(&self, dispatcher: &Dispatcher, org: &str, robots: &[Robot]) -> Result<()> {
        self.output
            .detail(&format!("creating {} robots for {} on {}", robots.len(), org, dispatcher.host()));
        try_join_all(
            robots
                .iter()
                .map(|robot| async move { dispatcher.execute(&endpoints::create_robot(org, robot)).await }),
        )
        .await?;
        Ok(())
    }

    async fn create_teams(&self, dispatcher: &Dispatcher, org: &str, teams: &[Team]) -> Result<()> {
        self.output
            .detail(&format!("creating {} teams for {} on {}", teams.len(), org, dispatcher.host()));
        try_join_all(teams.iter().map(|team| async move {
            dispatcher.execute(&endpoints::create_team(org, team)).await?;
            if self.config.ldap_sync {
                if let Some(group_dn) = team.directory_group() {
                    dispatcher
                        .execute(&endpoints::sync_team(org, &team.name, group_dn))
                        .await?;
                }
            }
            Ok::<_, ReplicationError>(())
        }))
        .await?;
        Ok(())
    }

    async fn assign_permissions(
        &self,
        dispatcher: &Dispatcher,
        assignments: &[PermissionAssignment],
    ) -> Result<()> {
        try_join_all(assignments.iter().map(|assignment| async move {
            dispatcher
                .execute(&endpoints::assign_permission(assignment))
                .await
        }))
        .await?;
        Ok(())
    }
}
