use crate::error::{ConfigError, Result};
use crate::logic::PermissionGate;
use crate::model::{Capability, Config, Id, MembershipScope, Project, UserContext};
use crate::store::Store;

/// A project together with the caller's capability over it
#[derive(Debug, Clone)]
pub struct ProjectAccess {
    pub project: Project,
    pub capability: Option<Capability>,
}

impl ProjectAccess {
    pub async fn load<S: Store>(store: &S, user: &UserContext, project_id: &Id) -> Result<Self> {
        let project = store
            .get_project(project_id)
            .await?
            .ok_or_else(|| ConfigError::not_found(format!("project {}", project_id)))?;
        let members = store
            .list_memberships(&MembershipScope::Project(project.id.clone()))
            .await?;
        let capability = PermissionGate::project_capability(user, &project, &members);
        Ok(Self {
            project,
            capability,
        })
    }

    pub fn require(&self, user: &UserContext, required: Capability, action: &str) -> Result<()> {
        PermissionGate::require(user, self.capability, required, action)
    }
}

/// A config, its project and the caller's capability over the config
#[derive(Debug, Clone)]
pub struct ConfigAccess {
    pub project: Project,
    pub config: Config,
    pub capability: Option<Capability>,
}

impl ConfigAccess {
    pub async fn load<S: Store>(store: &S, user: &UserContext, config_id: &Id) -> Result<Self> {
        let config = store
            .get_config(config_id)
            .await?
            .ok_or_else(|| ConfigError::not_found(format!("config {}", config_id)))?;
        Self::for_config(store, user, config).await
    }

    pub async fn for_config<S: Store>(store: &S, user: &UserContext, config: Config) -> Result<Self> {
        let project = store
            .get_project(&config.project_id)
            .await?
            .ok_or_else(|| ConfigError::not_found(format!("project {}", config.project_id)))?;
        let project_members = store
            .list_memberships(&MembershipScope::Project(project.id.clone()))
            .await?;
        let config_members = store
            .list_memberships(&MembershipScope::Config(config.id.clone()))
            .await?;
        let capability =
            PermissionGate::config_capability(user, &project, &project_members, &config_members);
        Ok(Self {
            project,
            config,
            capability,
        })
    }

    pub fn require(&self, user: &UserContext, required: Capability, action: &str) -> Result<()> {
        PermissionGate::require(user, self.capability, required, action)
    }

    pub fn require_bypass(&self, user: &UserContext, action: &str) -> Result<()> {
        PermissionGate::require_bypass(user, &self.project, self.capability, action)
    }
}
