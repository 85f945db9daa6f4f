use serde_json::{json, Value};

use crate::config::WorkflowConfig;
use crate::logic::{ConfigOperations, ProjectOperations};
use crate::model::{
    Capability, ConfigDetails, ConfigVariant, Environment, NewConfig, NewProject, NewProposal,
    Project, ProposedChanges, UserContext, VariantChange, WorkspaceRole,
};
use crate::store::{EnvironmentStore, MemoryStore};

pub(crate) fn member(id: &str) -> UserContext {
    UserContext::with_details(id.to_string(), Some(format!("{}@acme.io", id)), None)
        .with_workspace_role(WorkspaceRole::Member)
}

/// A project with `staging` and `production`, and one user per role
pub(crate) struct Fixture {
    pub store: MemoryStore,
    pub project: Project,
    pub staging: Environment,
    pub production: Environment,
    pub owner: UserContext,
    pub maintainer: UserContext,
    pub editor: UserContext,
    pub reviewer: UserContext,
    pub viewer: UserContext,
}

impl Fixture {
    pub async fn new() -> Self {
        Self::with_policy(WorkflowConfig::default()).await
    }

    pub async fn with_policy(policy: WorkflowConfig) -> Self {
        let store = MemoryStore::new();
        let owner = member("owner").with_workspace_role(WorkspaceRole::Owner);
        let project = ProjectOperations::create_project(
            &store,
            &owner,
            NewProject {
                name: "Storefront".to_string(),
                description: None,
                require_proposals: None,
                allow_self_approvals: None,
                environments: vec!["staging".to_string(), "production".to_string()],
            },
            &policy,
        )
        .await
        .unwrap();

        let maintainer = member("maintainer");
        let editor = member("editor");
        let reviewer = member("reviewer");
        let viewer = member("viewer");
        for (user, role) in [
            (&maintainer, Capability::Maintainer),
            (&editor, Capability::Editor),
            (&reviewer, Capability::Editor),
        ] {
            ProjectOperations::upsert_member(&store, &owner, &project.id, user.email().unwrap(), role)
                .await
                .unwrap();
        }

        let environments = store.list_environments(&project.id).await.unwrap();
        let staging = environments[0].clone();
        let production = environments[1].clone();

        Self {
            store,
            project,
            staging,
            production,
            owner,
            maintainer,
            editor,
            reviewer,
            viewer,
        }
    }

    /// `{"enabled": false}` with an object schema requiring a boolean `enabled`
    pub async fn create_flag(&self, name: &str) -> ConfigDetails {
        ConfigOperations::create_config(
            &self.store,
            &self.maintainer,
            &self.project.id,
            NewConfig {
                name: name.to_string(),
                description: String::new(),
                value: json!({"enabled": false}),
                schema: Some(json!({
                    "type": "object",
                    "properties": {"enabled": {"type": "boolean"}},
                    "required": ["enabled"]
                })),
                overrides: vec![],
                members: Default::default(),
                environment_variants: Default::default(),
            },
        )
        .await
        .unwrap()
    }
}

pub(crate) fn variant_in<'a>(details: &'a ConfigDetails, environment: &Environment) -> &'a ConfigVariant {
    details
        .variants
        .iter()
        .find(|v| v.environment_id.as_ref() == Some(&environment.id))
        .unwrap()
}

pub(crate) fn value_proposal(variant: &ConfigVariant, base_version: i64, value: Value) -> NewProposal {
    NewProposal {
        base_config_version: 1,
        changes: ProposedChanges {
            variants: vec![VariantChange {
                variant_id: variant.id.clone(),
                base_version,
                value: Some(value),
                schema: None,
                overrides: None,
            }],
            ..Default::default()
        },
        message: None,
    }
}
