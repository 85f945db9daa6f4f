use log::info;

use crate::config::WorkflowConfig;
use crate::error::{ConfigError, Result};
use crate::logic::{ProjectAccess, WriteValidator};
use crate::model::{
    Capability, Environment, Id, Membership, NewProject, Project, UserContext, WorkspaceRole,
};
use crate::store::Store;

pub struct ProjectOperations;

impl ProjectOperations {
    /// Workspace owners and admins create projects; the creator becomes a project maintainer.
    /// Review policy not given in the request comes from `defaults`.
    pub async fn create_project<S: Store>(
        store: &S,
        user: &UserContext,
        request: NewProject,
        defaults: &WorkflowConfig,
    ) -> Result<Project> {
        if !matches!(
            user.workspace_role,
            Some(WorkspaceRole::Owner | WorkspaceRole::Admin)
        ) {
            return Err(ConfigError::forbidden(
                "creating projects requires a workspace owner or admin",
            ));
        }
        if request.name.trim().is_empty() {
            return Err(ConfigError::validation("project name must not be empty"));
        }
        for (i, name) in request.environments.iter().enumerate() {
            WriteValidator::validate_name(name)?;
            if request.environments[..i].contains(name) {
                return Err(ConfigError::DuplicateName(name.clone()));
            }
        }

        let mut project = Project::new(request.name, request.description);
        project.require_proposals = request
            .require_proposals
            .unwrap_or(defaults.require_proposals);
        project.allow_self_approvals = request
            .allow_self_approvals
            .unwrap_or(defaults.allow_self_approvals);
        store.upsert_project(project.clone()).await?;

        if let Some(email) = user.email() {
            store
                .upsert_project_member(Membership::project(
                    project.id.clone(),
                    email,
                    Capability::Maintainer,
                ))
                .await?;
        }
        for (position, name) in request.environments.iter().enumerate() {
            let environment = Environment::new(project.id.clone(), name.clone(), position as i32);
            store.create_environment(environment, Vec::new()).await?;
        }

        info!("project {} ({}) created by {}", project.name, project.id, user.user_id);
        Ok(project)
    }

    pub async fn get_project<S: Store>(
        store: &S,
        user: &UserContext,
        project_id: &Id,
    ) -> Result<Project> {
        let access = ProjectAccess::load(store, user, project_id).await?;
        access.require(user, Capability::Viewer, "reading projects")?;
        Ok(access.project)
    }

    /// Add a project member or change their role
    pub async fn upsert_member<S: Store>(
        store: &S,
        user: &UserContext,
        project_id: &Id,
        email: &str,
        role: Capability,
    ) -> Result<Membership> {
        let access = ProjectAccess::load(store, user, project_id).await?;
        access.require(user, Capability::Maintainer, "managing project members")?;
        if !email.contains('@') {
            return Err(ConfigError::validation(format!("'{}' is not an email address", email)));
        }

        let membership = Membership::project(access.project.id.clone(), email, role);
        store.upsert_project_member(membership.clone()).await?;
        info!(
            "{} is now {} of project {}",
            membership.email, membership.role, access.project.id
        );
        Ok(membership)
    }
}
