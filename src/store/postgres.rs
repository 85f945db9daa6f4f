use anyhow::{Context, Result};
use serde_json::Value;
use sqlx::{
    postgres::{PgPoolOptions, PgRow},
    PgPool, Postgres, Row, Transaction,
};

use crate::error::ConflictTarget;
use crate::model::{
    AuditEvent, Capability, Config, ConfigProposal, ConfigVariant, Environment, Id, Membership,
    MembershipScope, NewAuditEvent, Project, ProposalStatus, RejectionReason, VariantRevision,
};
use crate::store::change_set::{AppliedChange, ApplyOutcome, ChangeSet, TransitionConflict};
use crate::store::traits::{
    ChangeStore, ConfigStore, EnvironmentStore, EventStore, MembershipStore, ProjectStore,
    ProposalStore, VariantStore,
};

const VARIANT_COLUMNS: &str =
    "id, config_id, environment_id, value, schema, overrides, version, updated_by, updated_at";
const PROPOSAL_COLUMNS: &str = "id, config_id, project_id, base_config_version, changes, message, status, \
     proposer_id, reviewer_id, rejection_reason, rejected_in_favor_of_proposal_id, created_at, reviewed_at";
const CONFIG_COLUMNS: &str =
    "id, project_id, name, description, created_by, created_at, updated_at, version";

#[derive(Debug, Clone)]
pub struct PostgresStore {
    pool: PgPool,
}

impl PostgresStore {
    /// Create a new PostgreSQL store with the given database URL
    pub async fn new(database_url: &str, max_connections: u32) -> Result<Self> {
        let pool = PgPoolOptions::new()
            .max_connections(max_connections)
            .connect(database_url)
            .await
            .context("Failed to create PostgreSQL connection pool")?;

        Ok(Self { pool })
    }

    /// Run database migrations
    pub async fn migrate(&self) -> Result<()> {
        sqlx::migrate!("./migrations")
            .run(&self.pool)
            .await
            .context("Failed to run database migrations")?;
        Ok(())
    }

    /// Get a reference to the connection pool
    pub fn pool(&self) -> &PgPool {
        &self.pool
    }
}

fn project_from_row(row: &PgRow) -> Result<Project> {
    Ok(Project {
        id: row.try_get("id")?,
        name: row.try_get("name")?,
        description: row.try_get("description")?,
        require_proposals: row.try_get("require_proposals")?,
        allow_self_approvals: row.try_get("allow_self_approvals")?,
        created_at: row.try_get("created_at")?,
    })
}

fn environment_from_row(row: &PgRow) -> Result<Environment> {
    Ok(Environment {
        id: row.try_get("id")?,
        project_id: row.try_get("project_id")?,
        name: row.try_get("name")?,
        position: row.try_get("position")?,
        created_at: row.try_get("created_at")?,
    })
}

fn config_from_row(row: &PgRow) -> Result<Config> {
    Ok(Config {
        id: row.try_get("id")?,
        project_id: row.try_get("project_id")?,
        name: row.try_get("name")?,
        description: row.try_get("description")?,
        created_by: row.try_get("created_by")?,
        created_at: row.try_get("created_at")?,
        updated_at: row.try_get("updated_at")?,
        version: row.try_get("version")?,
    })
}

fn variant_from_row(row: &PgRow) -> Result<ConfigVariant> {
    let overrides: Value = row.try_get("overrides")?;
    Ok(ConfigVariant {
        id: row.try_get("id")?,
        config_id: row.try_get("config_id")?,
        environment_id: row.try_get("environment_id")?,
        value: row.try_get("value")?,
        schema: row.try_get("schema")?,
        overrides: serde_json::from_value(overrides).context("Failed to decode overrides")?,
        version: row.try_get("version")?,
        updated_by: row.try_get("updated_by")?,
        updated_at: row.try_get("updated_at")?,
    })
}

fn revision_from_row(row: &PgRow) -> Result<VariantRevision> {
    Ok(VariantRevision {
        variant_id: row.try_get("variant_id")?,
        version: row.try_get("version")?,
        hash: row.try_get("hash")?,
        parent_hash: row.try_get("parent_hash")?,
        author: row.try_get("author")?,
        created_at: row.try_get("created_at")?,
        data: row.try_get("data")?,
        data_size: row.try_get("data_size")?,
    })
}

fn proposal_from_row(row: &PgRow) -> Result<ConfigProposal> {
    let status: String = row.try_get("status")?;
    let reason: Option<String> = row.try_get("rejection_reason")?;
    let changes: Value = row.try_get("changes")?;
    Ok(ConfigProposal {
        id: row.try_get("id")?,
        config_id: row.try_get("config_id")?,
        project_id: row.try_get("project_id")?,
        base_config_version: row.try_get("base_config_version")?,
        changes: serde_json::from_value(changes).context("Failed to decode proposal changes")?,
        message: row.try_get("message")?,
        status: ProposalStatus::parse(&status)
            .with_context(|| format!("Unknown proposal status '{}'", status))?,
        proposer_id: row.try_get("proposer_id")?,
        reviewer_id: row.try_get("reviewer_id")?,
        rejection_reason: reason.as_deref().and_then(RejectionReason::parse),
        rejected_in_favor_of_proposal_id: row.try_get("rejected_in_favor_of_proposal_id")?,
        created_at: row.try_get("created_at")?,
        reviewed_at: row.try_get("reviewed_at")?,
    })
}

fn membership_from_row(row: &PgRow) -> Result<Membership> {
    let kind: String = row.try_get("scope_kind")?;
    let scope_id: String = row.try_get("scope_id")?;
    let role: String = row.try_get("role")?;
    let scope = match kind.as_str() {
        "project" => MembershipScope::Project(scope_id),
        "config" => MembershipScope::Config(scope_id),
        other => anyhow::bail!("Unknown membership scope '{}'", other),
    };
    Ok(Membership {
        scope,
        email: row.try_get("email")?,
        role: Capability::parse(&role).with_context(|| format!("Unknown role '{}'", role))?,
    })
}

fn event_from_row(row: &PgRow) -> Result<AuditEvent> {
    let payload: Value = row.try_get("payload")?;
    Ok(AuditEvent {
        sequence: row.try_get("sequence")?,
        id: row.try_get("id")?,
        project_id: row.try_get("project_id")?,
        config_id: row.try_get("config_id")?,
        actor_id: row.try_get("actor_id")?,
        event_type: row.try_get("event_type")?,
        payload: serde_json::from_value(payload).context("Failed to decode event payload")?,
        created_at: row.try_get("created_at")?,
    })
}

fn scope_parts(scope: &MembershipScope) -> (&'static str, &Id) {
    match scope {
        MembershipScope::Project(id) => ("project", id),
        MembershipScope::Config(id) => ("config", id),
    }
}

async fn insert_variant(tx: &mut Transaction<'_, Postgres>, variant: &ConfigVariant) -> Result<()> {
    sqlx::query(
        r#"
        INSERT INTO config_variants (id, config_id, environment_id, value, schema, overrides, version, updated_by, updated_at)
        VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9)
        "#,
    )
    .bind(&variant.id)
    .bind(&variant.config_id)
    .bind(&variant.environment_id)
    .bind(&variant.value)
    .bind(&variant.schema)
    .bind(serde_json::to_value(&variant.overrides)?)
    .bind(variant.version)
    .bind(&variant.updated_by)
    .bind(variant.updated_at)
    .execute(&mut **tx)
    .await
    .context("Failed to insert variant")?;
    Ok(())
}

async fn insert_revision(tx: &mut Transaction<'_, Postgres>, revision: &VariantRevision) -> Result<()> {
    sqlx::query(
        r#"
        INSERT INTO variant_revisions (variant_id, version, hash, parent_hash, author, created_at, data, data_size)
        VALUES ($1, $2, $3, $4, $5, $6, $7, $8)
        "#,
    )
    .bind(&revision.variant_id)
    .bind(revision.version)
    .bind(&revision.hash)
    .bind(&revision.parent_hash)
    .bind(&revision.author)
    .bind(revision.created_at)
    .bind(&revision.data)
    .bind(revision.data_size)
    .execute(&mut **tx)
    .await
    .context("Failed to insert revision")?;
    Ok(())
}

async fn insert_membership(tx: &mut Transaction<'_, Postgres>, membership: &Membership) -> Result<()> {
    let (kind, scope_id) = scope_parts(&membership.scope);
    sqlx::query(
        r#"
        INSERT INTO memberships (scope_kind, scope_id, email, role)
        VALUES ($1, $2, $3, $4)
        ON CONFLICT (scope_kind, scope_id, email) DO UPDATE SET role = EXCLUDED.role
        "#,
    )
    .bind(kind)
    .bind(scope_id)
    .bind(&membership.email)
    .bind(membership.role.as_str())
    .execute(&mut **tx)
    .await
    .context("Failed to upsert membership")?;
    Ok(())
}

async fn insert_events(tx: &mut Transaction<'_, Postgres>, events: &[NewAuditEvent]) -> Result<()> {
    for event in events {
        sqlx::query(
            r#"
            INSERT INTO audit_events (id, project_id, config_id, actor_id, event_type, payload, created_at)
            VALUES ($1, $2, $3, $4, $5, $6, $7)
            "#,
        )
        .bind(&event.id)
        .bind(&event.project_id)
        .bind(&event.config_id)
        .bind(&event.actor_id)
        .bind(event.payload.event_type())
        .bind(serde_json::to_value(&event.payload)?)
        .bind(event.created_at)
        .execute(&mut **tx)
        .await
        .context("Failed to append audit event")?;
    }
    Ok(())
}

#[async_trait::async_trait]
impl ProjectStore for PostgresStore {
    async fn get_project(&self, id: &Id) -> Result<Option<Project>> {
        let row = sqlx::query(
            "SELECT id, name, description, require_proposals, allow_self_approvals, created_at FROM projects WHERE id = $1",
        )
        .bind(id)
        .fetch_optional(&self.pool)
        .await
        .context("Failed to fetch project")?;

        row.as_ref().map(project_from_row).transpose()
    }

    async fn list_projects(&self) -> Result<Vec<Project>> {
        let rows = sqlx::query(
            "SELECT id, name, description, require_proposals, allow_self_approvals, created_at FROM projects ORDER BY created_at",
        )
        .fetch_all(&self.pool)
        .await
        .context("Failed to list projects")?;

        rows.iter().map(project_from_row).collect()
    }

    async fn upsert_project(&self, project: Project) -> Result<()> {
        sqlx::query(
            r#"
            INSERT INTO projects (id, name, description, require_proposals, allow_self_approvals, created_at)
            VALUES ($1, $2, $3, $4, $5, $6)
            ON CONFLICT (id) DO UPDATE SET
                name = EXCLUDED.name,
                description = EXCLUDED.description,
                require_proposals = EXCLUDED.require_proposals,
                allow_self_approvals = EXCLUDED.allow_self_approvals
            "#,
        )
        .bind(&project.id)
        .bind(&project.name)
        .bind(&project.description)
        .bind(project.require_proposals)
        .bind(project.allow_self_approvals)
        .bind(project.created_at)
        .execute(&self.pool)
        .await
        .context("Failed to upsert project")?;

        Ok(())
    }
}

#[async_trait::async_trait]
impl EnvironmentStore for PostgresStore {
    async fn get_environment(&self, id: &Id) -> Result<Option<Environment>> {
        let row = sqlx::query("SELECT id, project_id, name, position, created_at FROM environments WHERE id = $1")
            .bind(id)
            .fetch_optional(&self.pool)
            .await
            .context("Failed to fetch environment")?;

        row.as_ref().map(environment_from_row).transpose()
    }

    async fn list_environments(&self, project_id: &Id) -> Result<Vec<Environment>> {
        let rows = sqlx::query(
            "SELECT id, project_id, name, position, created_at FROM environments WHERE project_id = $1 ORDER BY position",
        )
        .bind(project_id)
        .fetch_all(&self.pool)
        .await
        .context("Failed to list environments")?;

        rows.iter().map(environment_from_row).collect()
    }

    async fn create_environment(
        &self,
        environment: Environment,
        variants: Vec<ConfigVariant>,
    ) -> Result<bool> {
        let mut tx = self.pool.begin().await.context("Failed to begin transaction")?;

        let inserted = sqlx::query(
            r#"
            INSERT INTO environments (id, project_id, name, position, created_at)
            VALUES ($1, $2, $3, $4, $5)
            ON CONFLICT (project_id, name) DO NOTHING
            "#,
        )
        .bind(&environment.id)
        .bind(&environment.project_id)
        .bind(&environment.name)
        .bind(environment.position)
        .bind(environment.created_at)
        .execute(&mut *tx)
        .await
        .context("Failed to insert environment")?;

        if inserted.rows_affected() == 0 {
            return Ok(false);
        }

        for variant in &variants {
            insert_variant(&mut tx, variant).await?;
            let revision = VariantRevision::of_variant(variant, None)
                .context("Failed to snapshot variant state")?;
            insert_revision(&mut tx, &revision).await?;
        }

        tx.commit().await.context("Failed to commit environment")?;
        Ok(true)
    }

    async fn delete_environment(&self, id: &Id) -> Result<bool> {
        // Variants and revisions cascade
        let result = sqlx::query("DELETE FROM environments WHERE id = $1")
            .bind(id)
            .execute(&self.pool)
            .await
            .context("Failed to delete environment")?;

        Ok(result.rows_affected() > 0)
    }

    async fn reorder_environments(&self, project_id: &Id, ordered_ids: &[Id]) -> Result<()> {
        let mut tx = self.pool.begin().await.context("Failed to begin transaction")?;
        for (position, id) in ordered_ids.iter().enumerate() {
            sqlx::query("UPDATE environments SET position = $3 WHERE id = $1 AND project_id = $2")
                .bind(id)
                .bind(project_id)
                .bind(position as i32)
                .execute(&mut *tx)
                .await
                .context("Failed to reorder environment")?;
        }
        tx.commit().await.context("Failed to commit reorder")?;
        Ok(())
    }
}

#[async_trait::async_trait]
impl ConfigStore for PostgresStore {
    async fn get_config(&self, id: &Id) -> Result<Option<Config>> {
        let row = sqlx::query(&format!("SELECT {} FROM configs WHERE id = $1", CONFIG_COLUMNS))
            .bind(id)
            .fetch_optional(&self.pool)
            .await
            .context("Failed to fetch config")?;

        row.as_ref().map(config_from_row).transpose()
    }

    async fn get_config_by_name(&self, project_id: &Id, name: &str) -> Result<Option<Config>> {
        let row = sqlx::query(&format!(
            "SELECT {} FROM configs WHERE project_id = $1 AND name = $2",
            CONFIG_COLUMNS
        ))
        .bind(project_id)
        .bind(name)
        .fetch_optional(&self.pool)
        .await
        .context("Failed to fetch config by name")?;

        row.as_ref().map(config_from_row).transpose()
    }

    async fn list_configs(&self, project_id: &Id) -> Result<Vec<Config>> {
        let rows = sqlx::query(&format!(
            "SELECT {} FROM configs WHERE project_id = $1 ORDER BY name",
            CONFIG_COLUMNS
        ))
        .bind(project_id)
        .fetch_all(&self.pool)
        .await
        .context("Failed to list configs")?;

        rows.iter().map(config_from_row).collect()
    }

    async fn create_config(
        &self,
        config: Config,
        variants: Vec<ConfigVariant>,
        members: Vec<Membership>,
        events: Vec<NewAuditEvent>,
    ) -> Result<bool> {
        let mut tx = self.pool.begin().await.context("Failed to begin transaction")?;

        let inserted = sqlx::query(
            r#"
            INSERT INTO configs (id, project_id, name, description, created_by, created_at, updated_at, version)
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8)
            ON CONFLICT (project_id, name) DO NOTHING
            "#,
        )
        .bind(&config.id)
        .bind(&config.project_id)
        .bind(&config.name)
        .bind(&config.description)
        .bind(&config.created_by)
        .bind(config.created_at)
        .bind(config.updated_at)
        .bind(config.version)
        .execute(&mut *tx)
        .await
        .context("Failed to insert config")?;

        if inserted.rows_affected() == 0 {
            return Ok(false);
        }

        for variant in &variants {
            insert_variant(&mut tx, variant).await?;
            let revision = VariantRevision::of_variant(variant, None)
                .context("Failed to snapshot variant state")?;
            insert_revision(&mut tx, &revision).await?;
        }
        for membership in &members {
            insert_membership(&mut tx, membership).await?;
        }
        insert_events(&mut tx, &events).await?;

        tx.commit().await.context("Failed to commit config")?;
        Ok(true)
    }

    async fn delete_config(&self, id: &Id, event: NewAuditEvent) -> Result<bool> {
        let mut tx = self.pool.begin().await.context("Failed to begin transaction")?;

        // Variants, revisions and proposals cascade
        let result = sqlx::query("DELETE FROM configs WHERE id = $1")
            .bind(id)
            .execute(&mut *tx)
            .await
            .context("Failed to delete config")?;
        if result.rows_affected() == 0 {
            return Ok(false);
        }

        sqlx::query("DELETE FROM memberships WHERE scope_kind = 'config' AND scope_id = $1")
            .bind(id)
            .execute(&mut *tx)
            .await
            .context("Failed to delete config members")?;
        insert_events(&mut tx, &[event]).await?;

        tx.commit().await.context("Failed to commit config deletion")?;
        Ok(true)
    }
}

#[async_trait::async_trait]
impl VariantStore for PostgresStore {
    async fn get_variant_by_id(&self, id: &Id) -> Result<Option<ConfigVariant>> {
        let row = sqlx::query(&format!("SELECT {} FROM config_variants WHERE id = $1", VARIANT_COLUMNS))
            .bind(id)
            .fetch_optional(&self.pool)
            .await
            .context("Failed to fetch variant")?;

        row.as_ref().map(variant_from_row).transpose()
    }

    async fn get_variant(
        &self,
        config_id: &Id,
        environment_id: Option<&Id>,
    ) -> Result<Option<ConfigVariant>> {
        let row = sqlx::query(&format!(
            "SELECT {} FROM config_variants WHERE config_id = $1 AND environment_id IS NOT DISTINCT FROM $2",
            VARIANT_COLUMNS
        ))
        .bind(config_id)
        .bind(environment_id)
        .fetch_optional(&self.pool)
        .await
        .context("Failed to fetch variant")?;

        row.as_ref().map(variant_from_row).transpose()
    }

    async fn list_variants(&self, config_id: &Id) -> Result<Vec<ConfigVariant>> {
        let rows = sqlx::query(
            r#"
            SELECT v.id, v.config_id, v.environment_id, v.value, v.schema, v.overrides, v.version, v.updated_by, v.updated_at
            FROM config_variants v
            LEFT JOIN environments e ON e.id = v.environment_id
            WHERE v.config_id = $1
            ORDER BY e.position NULLS FIRST
            "#,
        )
        .bind(config_id)
        .fetch_all(&self.pool)
        .await
        .context("Failed to list variants")?;

        rows.iter().map(variant_from_row).collect()
    }

    async fn list_variants_for_environment(&self, environment_id: &Id) -> Result<Vec<ConfigVariant>> {
        let rows = sqlx::query(&format!(
            "SELECT {} FROM config_variants WHERE environment_id = $1",
            VARIANT_COLUMNS
        ))
        .bind(environment_id)
        .fetch_all(&self.pool)
        .await
        .context("Failed to list environment variants")?;

        rows.iter().map(variant_from_row).collect()
    }

    async fn list_revisions(&self, variant_id: &Id) -> Result<Vec<VariantRevision>> {
        let rows = sqlx::query(
            "SELECT variant_id, version, hash, parent_hash, author, created_at, data, data_size \
             FROM variant_revisions WHERE variant_id = $1 ORDER BY version DESC",
        )
        .bind(variant_id)
        .fetch_all(&self.pool)
        .await
        .context("Failed to list revisions")?;

        rows.iter().map(revision_from_row).collect()
    }

    async fn get_revision(&self, variant_id: &Id, version: i64) -> Result<Option<VariantRevision>> {
        let row = sqlx::query(
            "SELECT variant_id, version, hash, parent_hash, author, created_at, data, data_size \
             FROM variant_revisions WHERE variant_id = $1 AND version = $2",
        )
        .bind(variant_id)
        .bind(version)
        .fetch_optional(&self.pool)
        .await
        .context("Failed to fetch revision")?;

        row.as_ref().map(revision_from_row).transpose()
    }
}

#[async_trait::async_trait]
impl ProposalStore for PostgresStore {
    async fn get_proposal(&self, id: &Id) -> Result<Option<ConfigProposal>> {
        let row = sqlx::query(&format!("SELECT {} FROM config_proposals WHERE id = $1", PROPOSAL_COLUMNS))
            .bind(id)
            .fetch_optional(&self.pool)
            .await
            .context("Failed to fetch proposal")?;

        row.as_ref().map(proposal_from_row).transpose()
    }

    async fn list_proposals(
        &self,
        config_id: &Id,
        status: Option<ProposalStatus>,
    ) -> Result<Vec<ConfigProposal>> {
        let rows = sqlx::query(&format!(
            "SELECT {} FROM config_proposals WHERE config_id = $1 AND ($2::TEXT IS NULL OR status = $2) ORDER BY created_at",
            PROPOSAL_COLUMNS
        ))
        .bind(config_id)
        .bind(status.map(|s| s.as_str()))
        .fetch_all(&self.pool)
        .await
        .context("Failed to list proposals")?;

        rows.iter().map(proposal_from_row).collect()
    }

    async fn list_pending_proposals_for_variant(&self, variant_id: &Id) -> Result<Vec<ConfigProposal>> {
        let filter = serde_json::json!({ "variants": [{ "variant_id": variant_id }] });
        let rows = sqlx::query(&format!(
            "SELECT {} FROM config_proposals WHERE status = 'pending' AND changes @> $1 ORDER BY created_at",
            PROPOSAL_COLUMNS
        ))
        .bind(filter)
        .fetch_all(&self.pool)
        .await
        .context("Failed to list pending proposals")?;

        rows.iter().map(proposal_from_row).collect()
    }

    async fn create_proposal(&self, proposal: ConfigProposal, event: NewAuditEvent) -> Result<bool> {
        let mut tx = self.pool.begin().await.context("Failed to begin transaction")?;

        // Same per-config lock as apply_change_set, so the creation event keeps commit order
        let locked = sqlx::query("SELECT version FROM configs WHERE id = $1 FOR UPDATE")
            .bind(&proposal.config_id)
            .fetch_optional(&mut *tx)
            .await
            .context("Failed to lock config")?;
        if locked.is_none() {
            return Ok(false);
        }

        sqlx::query(
            r#"
            INSERT INTO config_proposals (id, config_id, project_id, base_config_version, changes, message, status, proposer_id, created_at)
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9)
            "#,
        )
        .bind(&proposal.id)
        .bind(&proposal.config_id)
        .bind(&proposal.project_id)
        .bind(proposal.base_config_version)
        .bind(serde_json::to_value(&proposal.changes)?)
        .bind(&proposal.message)
        .bind(proposal.status.as_str())
        .bind(&proposal.proposer_id)
        .bind(proposal.created_at)
        .execute(&mut *tx)
        .await
        .context("Failed to insert proposal")?;
        insert_events(&mut tx, &[event]).await?;

        tx.commit().await.context("Failed to commit proposal")?;
        Ok(true)
    }
}

#[async_trait::async_trait]
impl MembershipStore for PostgresStore {
    async fn list_memberships(&self, scope: &MembershipScope) -> Result<Vec<Membership>> {
        let (kind, scope_id) = scope_parts(scope);
        let rows = sqlx::query(
            "SELECT scope_kind, scope_id, email, role FROM memberships WHERE scope_kind = $1 AND scope_id = $2 ORDER BY email",
        )
        .bind(kind)
        .bind(scope_id)
        .fetch_all(&self.pool)
        .await
        .context("Failed to list memberships")?;

        rows.iter().map(membership_from_row).collect()
    }

    async fn upsert_project_member(&self, membership: Membership) -> Result<()> {
        let mut tx = self.pool.begin().await.context("Failed to begin transaction")?;
        insert_membership(&mut tx, &membership).await?;
        tx.commit().await.context("Failed to commit membership")?;
        Ok(())
    }
}

#[async_trait::async_trait]
impl EventStore for PostgresStore {
    async fn list_events(&self, project_id: &Id, config_id: Option<&Id>) -> Result<Vec<AuditEvent>> {
        let rows = sqlx::query(
            r#"
            SELECT sequence, id, project_id, config_id, actor_id, event_type, payload, created_at
            FROM audit_events
            WHERE project_id = $1 AND ($2::TEXT IS NULL OR config_id = $2)
            ORDER BY sequence
            "#,
        )
        .bind(project_id)
        .bind(config_id)
        .fetch_all(&self.pool)
        .await
        .context("Failed to list events")?;

        rows.iter().map(event_from_row).collect()
    }
}

#[async_trait::async_trait]
impl ChangeStore for PostgresStore {
    async fn apply_change_set(&self, change: ChangeSet) -> Result<ApplyOutcome> {
        let mut tx = self.pool.begin().await.context("Failed to begin transaction")?;

        // Serializes change sets per config, so event sequence follows commit order
        let locked = sqlx::query("SELECT version FROM configs WHERE id = $1 FOR UPDATE")
            .bind(&change.config_id)
            .fetch_optional(&mut *tx)
            .await
            .context("Failed to lock config")?;
        let Some(locked) = locked else {
            return Ok(ApplyOutcome::NotFound(format!("config {}", change.config_id)));
        };

        let mut applied = AppliedChange::default();

        if let Some(update) = &change.config_update {
            let current: i64 = locked.try_get("version")?;
            if current != update.expected_version {
                return Ok(ApplyOutcome::VersionConflict {
                    target: ConflictTarget::Config(change.config_id.clone()),
                    expected: update.expected_version,
                    current: Some(current),
                });
            }

            let row = sqlx::query(
                r#"
                UPDATE configs
                SET description = COALESCE($2, description), version = version + 1, updated_at = NOW()
                WHERE id = $1
                RETURNING version
                "#,
            )
            .bind(&change.config_id)
            .bind(&update.description)
            .fetch_one(&mut *tx)
            .await
            .context("Failed to update config")?;
            applied.config_version = Some(row.try_get("version")?);

            if let Some(members) = &update.members {
                sqlx::query("DELETE FROM memberships WHERE scope_kind = 'config' AND scope_id = $1")
                    .bind(&change.config_id)
                    .execute(&mut *tx)
                    .await
                    .context("Failed to clear config members")?;
                for membership in members.to_memberships(&change.config_id) {
                    insert_membership(&mut tx, &membership).await?;
                }
            }
        }

        for write in &change.variant_writes {
            let row = sqlx::query(&format!(
                r#"
                UPDATE config_variants
                SET value = $3, schema = $4, overrides = $5, version = version + 1, updated_by = $6, updated_at = NOW()
                WHERE id = $1 AND version = $2
                RETURNING {}
                "#,
                VARIANT_COLUMNS
            ))
            .bind(&write.variant_id)
            .bind(write.expected_version)
            .bind(&write.state.value)
            .bind(&write.state.schema)
            .bind(serde_json::to_value(&write.state.overrides)?)
            .bind(&write.updated_by)
            .fetch_optional(&mut *tx)
            .await
            .context("Failed to update variant")?;

            let Some(row) = row else {
                let current: Option<i64> =
                    sqlx::query_scalar("SELECT version FROM config_variants WHERE id = $1")
                        .bind(&write.variant_id)
                        .fetch_optional(&mut *tx)
                        .await
                        .context("Failed to read variant version")?;
                return Ok(ApplyOutcome::VersionConflict {
                    target: ConflictTarget::Variant(write.variant_id.clone()),
                    expected: write.expected_version,
                    current,
                });
            };
            let variant = variant_from_row(&row)?;

            let parent_hash: Option<String> = sqlx::query_scalar(
                "SELECT hash FROM variant_revisions WHERE variant_id = $1 ORDER BY version DESC LIMIT 1",
            )
            .bind(&variant.id)
            .fetch_optional(&mut *tx)
            .await
            .context("Failed to read latest revision")?;
            let revision = VariantRevision::of_variant(&variant, parent_hash)
                .context("Failed to snapshot variant state")?;
            insert_revision(&mut tx, &revision).await?;

            applied.variant_versions.push((variant.id, variant.version));
        }

        let mut events = Vec::new();
        for transition in &change.proposal_transitions {
            let result = sqlx::query(
                r#"
                UPDATE config_proposals
                SET status = $2, reviewer_id = $3, rejection_reason = $4,
                    rejected_in_favor_of_proposal_id = $5, reviewed_at = NOW()
                WHERE id = $1 AND status = 'pending'
                "#,
            )
            .bind(&transition.proposal_id)
            .bind(transition.status.as_str())
            .bind(&transition.reviewer_id)
            .bind(transition.rejection_reason.map(|r| r.as_str()))
            .bind(&transition.superseded_by)
            .execute(&mut *tx)
            .await
            .context("Failed to transition proposal")?;

            if result.rows_affected() == 0 {
                let status: Option<String> =
                    sqlx::query_scalar("SELECT status FROM config_proposals WHERE id = $1")
                        .bind(&transition.proposal_id)
                        .fetch_optional(&mut *tx)
                        .await
                        .context("Failed to read proposal status")?;
                let Some(status) = status else {
                    return Ok(ApplyOutcome::NotFound(format!(
                        "proposal {}",
                        transition.proposal_id
                    )));
                };
                if transition.on_conflict == TransitionConflict::Skip {
                    continue;
                }
                return Ok(ApplyOutcome::ProposalNotPending {
                    proposal_id: transition.proposal_id.clone(),
                    status: ProposalStatus::parse(&status)
                        .with_context(|| format!("Unknown proposal status '{}'", status))?,
                });
            }

            applied.transitioned.push(transition.proposal_id.clone());
            events.extend(transition.event.clone());
        }
        events.extend(change.events);
        insert_events(&mut tx, &events).await?;

        tx.commit().await.context("Failed to commit change set")?;
        Ok(ApplyOutcome::Applied(applied))
    }
}
