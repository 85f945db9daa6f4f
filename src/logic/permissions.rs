use log::warn;

use crate::error::{ConfigError, Result};
use crate::model::{
    Capability, ChangedAspect, ConfigProposal, Membership, Project, ProposedChanges, UserContext,
    WorkspaceRole,
};

/// Resolves what a caller may do with a project and its configs.
///
/// Effective capability is the highest of:
/// - workspace role: owner/admin are maintainers, members are viewers;
/// - project membership row for the caller's email;
/// - config membership row for the caller's email;
/// - credential scope: `project_read` is viewer, `project_write` is editor.
///
/// A caller with none of these has no access at all.
pub struct PermissionGate;

impl PermissionGate {
    pub fn project_capability(
        user: &UserContext,
        project: &Project,
        project_members: &[Membership],
    ) -> Option<Capability> {
        let from_workspace = user.workspace_role.map(|role| match role {
            WorkspaceRole::Owner | WorkspaceRole::Admin => Capability::Maintainer,
            WorkspaceRole::Member => Capability::Viewer,
        });
        let from_scope = if user.has_project_write_scope(&project.id) {
            Some(Capability::Editor)
        } else if user.has_project_read_scope(&project.id) {
            Some(Capability::Viewer)
        } else {
            None
        };

        [from_workspace, from_scope, Self::membership_role(user, project_members)]
            .into_iter()
            .flatten()
            .max()
    }

    pub fn config_capability(
        user: &UserContext,
        project: &Project,
        project_members: &[Membership],
        config_members: &[Membership],
    ) -> Option<Capability> {
        let project_level = Self::project_capability(user, project, project_members);
        let config_level = Self::membership_role(user, config_members);
        project_level.max(config_level)
    }

    fn membership_role(user: &UserContext, members: &[Membership]) -> Option<Capability> {
        let email = user.email()?;
        members
            .iter()
            .filter(|m| m.email == email)
            .map(|m| m.role)
            .max()
    }

    pub fn required_for_aspect(aspect: ChangedAspect) -> Capability {
        match aspect {
            ChangedAspect::Value | ChangedAspect::Description | ChangedAspect::Overrides => {
                Capability::Editor
            }
            ChangedAspect::Schema | ChangedAspect::Members => Capability::Maintainer,
        }
    }

    /// Strictest capability among the fields a change touches; editor at minimum
    pub fn required_for_changes(changes: &ProposedChanges) -> Capability {
        changes
            .aspects()
            .into_iter()
            .map(Self::required_for_aspect)
            .max()
            .unwrap_or(Capability::Editor)
            .max(Capability::Editor)
    }

    /// Reviewing needs a maintainer unless the proposal touches only values and descriptions
    pub fn required_for_review(changes: &ProposedChanges) -> Capability {
        let value_only = changes
            .aspects()
            .into_iter()
            .all(|aspect| matches!(aspect, ChangedAspect::Value | ChangedAspect::Description));
        if value_only {
            Capability::Editor
        } else {
            Capability::Maintainer
        }
    }

    pub fn require(
        user: &UserContext,
        capability: Option<Capability>,
        required: Capability,
        action: &str,
    ) -> Result<()> {
        match capability {
            Some(held) if held >= required => Ok(()),
            Some(held) => {
                warn!(
                    "{} denied for {}: holds {}, needs {}",
                    action, user.user_id, held, required
                );
                Err(ConfigError::requires(required, action))
            }
            None => {
                warn!("{} denied for {}: no access", action, user.user_id);
                Err(ConfigError::forbidden(format!("{}: no access to this project", action)))
            }
        }
    }

    /// Approval gate: self-approval policy first, then the review capability
    pub fn check_approve(
        user: &UserContext,
        project: &Project,
        proposal: &ConfigProposal,
        capability: Option<Capability>,
    ) -> Result<()> {
        if !project.allow_self_approvals && proposal.proposer_id == user.user_id {
            warn!(
                "self-approval of proposal {} denied for {}",
                proposal.id, user.user_id
            );
            return Err(ConfigError::forbidden(
                "self-approval is not allowed in this project",
            ));
        }
        Self::require(
            user,
            capability,
            Self::required_for_review(&proposal.changes),
            "approving this proposal",
        )
    }

    /// Proposers may always withdraw their own proposal; everyone else needs review capability
    pub fn check_reject(
        user: &UserContext,
        proposal: &ConfigProposal,
        capability: Option<Capability>,
    ) -> Result<()> {
        if proposal.proposer_id == user.user_id {
            return Ok(());
        }
        Self::require(
            user,
            capability,
            Self::required_for_review(&proposal.changes),
            "rejecting this proposal",
        )
    }

    /// Whether the caller may write without a proposal.
    /// A project write credential always may; maintainers may unless the project requires proposals.
    pub fn can_bypass(user: &UserContext, project: &Project, capability: Option<Capability>) -> bool {
        if user.has_project_write_scope(&project.id) {
            return true;
        }
        !project.require_proposals && capability == Some(Capability::Maintainer)
    }

    pub fn require_bypass(
        user: &UserContext,
        project: &Project,
        capability: Option<Capability>,
        action: &str,
    ) -> Result<()> {
        if Self::can_bypass(user, project, capability) {
            return Ok(());
        }
        warn!("{} without proposal denied for {}", action, user.user_id);
        if project.require_proposals {
            Err(ConfigError::forbidden(format!(
                "{}: project requires changes to go through proposals",
                action
            )))
        } else {
            Err(ConfigError::requires(Capability::Maintainer, action))
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::{CredentialScope, NewProposal, VariantChange};
    use serde_json::json;

    fn project() -> Project {
        Project::new("shop".to_string(), None)
    }

    fn user(email: &str) -> UserContext {
        UserContext::with_details(email.to_string(), Some(email.to_string()), None)
    }

    fn proposal(project: &Project, proposer: &str, changes: ProposedChanges) -> ConfigProposal {
        ConfigProposal::new(
            "cfg".to_string(),
            project.id.clone(),
            NewProposal {
                base_config_version: 1,
                changes,
                message: None,
            },
            proposer.to_string(),
        )
    }

    fn value_change() -> ProposedChanges {
        ProposedChanges {
            variants: vec![VariantChange {
                variant_id: "v1".to_string(),
                base_version: 1,
                value: Some(json!(true)),
                schema: None,
                overrides: None,
            }],
            ..Default::default()
        }
    }

    fn schema_change() -> ProposedChanges {
        ProposedChanges {
            variants: vec![VariantChange {
                variant_id: "v1".to_string(),
                base_version: 1,
                value: None,
                schema: Some(Some(json!({"type": "boolean"}))),
                overrides: None,
            }],
            ..Default::default()
        }
    }

    #[test]
    fn test_capability_takes_highest_grant() {
        let p = project();
        let alice = user("alice@x.io");
        assert_eq!(PermissionGate::config_capability(&alice, &p, &[], &[]), None);

        let member = alice.clone().with_workspace_role(WorkspaceRole::Member);
        assert_eq!(
            PermissionGate::config_capability(&member, &p, &[], &[]),
            Some(Capability::Viewer)
        );

        let config_members = vec![Membership::config("cfg".to_string(), "Alice@x.io", Capability::Editor)];
        assert_eq!(
            PermissionGate::config_capability(&member, &p, &[], &config_members),
            Some(Capability::Editor)
        );

        let project_members = vec![Membership::project(p.id.clone(), "alice@x.io", Capability::Maintainer)];
        assert_eq!(
            PermissionGate::config_capability(&member, &p, &project_members, &config_members),
            Some(Capability::Maintainer)
        );

        let owner = user("bob@x.io").with_workspace_role(WorkspaceRole::Owner);
        assert_eq!(
            PermissionGate::project_capability(&owner, &p, &[]),
            Some(Capability::Maintainer)
        );
    }

    #[test]
    fn test_required_capability_per_aspect() {
        assert_eq!(PermissionGate::required_for_changes(&value_change()), Capability::Editor);
        assert_eq!(PermissionGate::required_for_changes(&schema_change()), Capability::Maintainer);
        let members = ProposedChanges {
            members: Some(Default::default()),
            ..Default::default()
        };
        assert_eq!(PermissionGate::required_for_changes(&members), Capability::Maintainer);
        let description = ProposedChanges {
            description: Some("d".to_string()),
            ..Default::default()
        };
        assert_eq!(PermissionGate::required_for_changes(&description), Capability::Editor);
    }

    #[test]
    fn test_self_approval_is_forbidden_regardless_of_role() {
        let p = project();
        let proposer = user("alice@x.io");
        let pending = proposal(&p, &proposer.user_id, value_change());
        let result = PermissionGate::check_approve(&proposer, &p, &pending, Some(Capability::Maintainer));
        assert!(matches!(result, Err(ConfigError::Forbidden { .. })));

        let mut permissive = p.clone();
        permissive.allow_self_approvals = true;
        assert!(
            PermissionGate::check_approve(&proposer, &permissive, &pending, Some(Capability::Maintainer))
                .is_ok()
        );
    }

    #[test]
    fn test_editor_may_review_value_but_not_schema() {
        let p = project();
        let reviewer = user("rev@x.io");
        let value = proposal(&p, "someone", value_change());
        let schema = proposal(&p, "someone", schema_change());

        assert!(PermissionGate::check_approve(&reviewer, &p, &value, Some(Capability::Editor)).is_ok());
        match PermissionGate::check_approve(&reviewer, &p, &schema, Some(Capability::Editor)) {
            Err(ConfigError::Forbidden { required, .. }) => {
                assert_eq!(required, Some(Capability::Maintainer))
            }
            other => panic!("Expected Forbidden, got {:?}", other),
        }
        assert!(PermissionGate::check_reject(&reviewer, &schema, Some(Capability::Viewer)).is_err());
    }

    #[test]
    fn test_override_proposals_need_a_maintainer_to_review() {
        let p = project();
        let reviewer = user("rev@x.io");
        let overrides = ProposedChanges {
            variants: vec![VariantChange {
                variant_id: "v1".to_string(),
                base_version: 1,
                value: None,
                schema: None,
                overrides: Some(vec![]),
            }],
            ..Default::default()
        };
        assert_eq!(PermissionGate::required_for_changes(&overrides), Capability::Editor);
        assert_eq!(PermissionGate::required_for_review(&overrides), Capability::Maintainer);

        let pending = proposal(&p, "someone", overrides);
        match PermissionGate::check_approve(&reviewer, &p, &pending, Some(Capability::Editor)) {
            Err(ConfigError::Forbidden { required, .. }) => {
                assert_eq!(required, Some(Capability::Maintainer))
            }
            other => panic!("Expected Forbidden, got {:?}", other),
        }
        assert!(PermissionGate::check_reject(&reviewer, &pending, Some(Capability::Editor)).is_err());
        assert!(
            PermissionGate::check_approve(&reviewer, &p, &pending, Some(Capability::Maintainer)).is_ok()
        );
    }

    #[test]
    fn test_proposer_may_withdraw_own_proposal() {
        let p = project();
        let proposer = user("alice@x.io");
        let pending = proposal(&p, &proposer.user_id, schema_change());
        assert!(PermissionGate::check_reject(&proposer, &pending, Some(Capability::Editor)).is_ok());
    }

    #[test]
    fn test_bypass_rules() {
        let mut p = project();
        let maintainer = user("m@x.io");
        let integration = UserContext::new("ci".to_string())
            .with_scope(CredentialScope::ProjectWrite(p.id.clone()));

        assert!(PermissionGate::can_bypass(&maintainer, &p, Some(Capability::Maintainer)));
        assert!(!PermissionGate::can_bypass(&maintainer, &p, Some(Capability::Editor)));
        assert!(PermissionGate::can_bypass(&integration, &p, Some(Capability::Editor)));

        p.require_proposals = true;
        assert!(!PermissionGate::can_bypass(&maintainer, &p, Some(Capability::Maintainer)));
        assert!(PermissionGate::can_bypass(&integration, &p, Some(Capability::Editor)));
    }
}
