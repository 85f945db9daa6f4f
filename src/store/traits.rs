use crate::model::{
    AuditEvent, Config, ConfigProposal, ConfigVariant, Environment, Id, Membership,
    MembershipScope, NewAuditEvent, Project, ProposalStatus, VariantRevision, VariantState,
};
use crate::store::change_set::{ApplyOutcome, ChangeSet, VariantWrite};
use anyhow::Result;

#[async_trait::async_trait]
pub trait ProjectStore: Send + Sync {
    async fn get_project(&self, id: &Id) -> Result<Option<Project>>;
    async fn list_projects(&self) -> Result<Vec<Project>>;
    async fn upsert_project(&self, project: Project) -> Result<()>;
}

#[async_trait::async_trait]
pub trait EnvironmentStore: Send + Sync {
    async fn get_environment(&self, id: &Id) -> Result<Option<Environment>>;
    /// Environments of a project ordered by position
    async fn list_environments(&self, project_id: &Id) -> Result<Vec<Environment>>;
    /// Insert an environment together with its seeded variants (and their first revisions).
    /// Returns false, writing nothing, when the name is taken in the project.
    async fn create_environment(
        &self,
        environment: Environment,
        variants: Vec<ConfigVariant>,
    ) -> Result<bool>;
    /// Remove an environment with its variants and their revisions
    async fn delete_environment(&self, id: &Id) -> Result<bool>;
    /// Rewrite positions so `ordered_ids[i]` gets position `i`
    async fn reorder_environments(&self, project_id: &Id, ordered_ids: &[Id]) -> Result<()>;
}

#[async_trait::async_trait]
pub trait ConfigStore: Send + Sync {
    async fn get_config(&self, id: &Id) -> Result<Option<Config>>;
    async fn get_config_by_name(&self, project_id: &Id, name: &str) -> Result<Option<Config>>;
    async fn list_configs(&self, project_id: &Id) -> Result<Vec<Config>>;
    /// Insert a config with its variants, member rows and creation events in one transaction.
    /// Returns false, writing nothing, when the name is taken in the project.
    async fn create_config(
        &self,
        config: Config,
        variants: Vec<ConfigVariant>,
        members: Vec<Membership>,
        events: Vec<NewAuditEvent>,
    ) -> Result<bool>;
    /// Remove a config with its variants, revisions, proposals and member rows,
    /// recording `event` in the same transaction
    async fn delete_config(&self, id: &Id, event: NewAuditEvent) -> Result<bool>;
}

#[async_trait::async_trait]
pub trait VariantStore: Send + Sync {
    async fn get_variant_by_id(&self, id: &Id) -> Result<Option<ConfigVariant>>;
    /// `environment_id == None` addresses the base variant
    async fn get_variant(
        &self,
        config_id: &Id,
        environment_id: Option<&Id>,
    ) -> Result<Option<ConfigVariant>>;
    async fn list_variants(&self, config_id: &Id) -> Result<Vec<ConfigVariant>>;
    async fn list_variants_for_environment(&self, environment_id: &Id) -> Result<Vec<ConfigVariant>>;
    /// Revisions of a variant, newest first
    async fn list_revisions(&self, variant_id: &Id) -> Result<Vec<VariantRevision>>;
    async fn get_revision(&self, variant_id: &Id, version: i64) -> Result<Option<VariantRevision>>;
}

#[async_trait::async_trait]
pub trait ProposalStore: Send + Sync {
    async fn get_proposal(&self, id: &Id) -> Result<Option<ConfigProposal>>;
    async fn list_proposals(
        &self,
        config_id: &Id,
        status: Option<ProposalStatus>,
    ) -> Result<Vec<ConfigProposal>>;
    /// Pending proposals whose changes include the variant, oldest first
    async fn list_pending_proposals_for_variant(&self, variant_id: &Id) -> Result<Vec<ConfigProposal>>;
    /// Persist a pending proposal and its creation event together.
    /// Returns false, writing nothing, when the config no longer exists.
    async fn create_proposal(&self, proposal: ConfigProposal, event: NewAuditEvent) -> Result<bool>;
}

#[async_trait::async_trait]
pub trait MembershipStore: Send + Sync {
    async fn list_memberships(&self, scope: &MembershipScope) -> Result<Vec<Membership>>;
    /// Insert or change the role of a project member
    async fn upsert_project_member(&self, membership: Membership) -> Result<()>;
}

#[async_trait::async_trait]
pub trait EventStore: Send + Sync {
    /// Committed events in commit order, optionally restricted to one config
    async fn list_events(&self, project_id: &Id, config_id: Option<&Id>) -> Result<Vec<AuditEvent>>;
}

/// The single write path for variant state, config metadata and proposal status
#[async_trait::async_trait]
pub trait ChangeStore: VariantStore + Send + Sync {
    /// Commit every guarded write, transition, revision and event of `change`,
    /// or none of them. A failed guard is reported as an outcome, not an error.
    async fn apply_change_set(&self, change: ChangeSet) -> Result<ApplyOutcome>;

    /// Check-and-increment for one variant, addressed by config and environment
    async fn apply_if_version_matches(
        &self,
        config_id: &Id,
        environment_id: Option<&Id>,
        expected_version: i64,
        state: VariantState,
        updated_by: Option<String>,
        events: Vec<NewAuditEvent>,
    ) -> Result<ApplyOutcome> {
        let Some(variant) = self.get_variant(config_id, environment_id).await? else {
            return Ok(ApplyOutcome::NotFound(format!(
                "variant of config {} for environment {}",
                config_id,
                environment_id.map(String::as_str).unwrap_or("base")
            )));
        };

        let mut change = ChangeSet::new(config_id.clone());
        change.variant_writes.push(VariantWrite {
            variant_id: variant.id,
            expected_version,
            state,
            updated_by,
        });
        change.events = events;
        self.apply_change_set(change).await
    }
}

pub trait Store:
    ProjectStore
    + EnvironmentStore
    + ConfigStore
    + VariantStore
    + ProposalStore
    + MembershipStore
    + EventStore
    + ChangeStore
    + Send
    + Sync
{
}

impl<T> Store for T where
    T: ProjectStore
        + EnvironmentStore
        + ConfigStore
        + VariantStore
        + ProposalStore
        + MembershipStore
        + EventStore
        + ChangeStore
        + Send
        + Sync
{
}
