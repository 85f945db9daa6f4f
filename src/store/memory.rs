use anyhow::{Context, Result};
use parking_lot::Mutex;
use std::collections::HashMap;

use crate::error::ConflictTarget;
use crate::model::{
    AuditEvent, Config, ConfigProposal, ConfigVariant, Environment, Id, Membership,
    MembershipScope, NewAuditEvent, Project, ProposalStatus, VariantRevision,
};
use crate::store::change_set::{AppliedChange, ApplyOutcome, ChangeSet, TransitionConflict};
use crate::store::traits::{
    ChangeStore, ConfigStore, EnvironmentStore, EventStore, MembershipStore, ProjectStore,
    ProposalStore, VariantStore,
};

#[derive(Debug, Default)]
struct MemoryState {
    projects: HashMap<Id, Project>,
    environments: HashMap<Id, Environment>,
    configs: HashMap<Id, Config>,
    variants: HashMap<Id, ConfigVariant>,
    /// Per variant, oldest first
    revisions: HashMap<Id, Vec<VariantRevision>>,
    proposals: HashMap<Id, ConfigProposal>,
    memberships: Vec<Membership>,
    events: Vec<AuditEvent>,
}

impl MemoryState {
    fn append_events(&mut self, events: Vec<NewAuditEvent>) {
        for event in events {
            let sequence = self.events.len() as i64 + 1;
            self.events.push(AuditEvent::from_new(event, sequence));
        }
    }

    fn record_revision(&mut self, variant: &ConfigVariant) -> Result<()> {
        let history = self.revisions.entry(variant.id.clone()).or_default();
        let parent_hash = history.last().map(|r| r.hash.clone());
        let revision = VariantRevision::of_variant(variant, parent_hash)
            .context("Failed to snapshot variant state")?;
        history.push(revision);
        Ok(())
    }

    fn remove_variants(&mut self, keep: impl Fn(&ConfigVariant) -> bool) {
        let removed: Vec<Id> = self
            .variants
            .values()
            .filter(|v| !keep(v))
            .map(|v| v.id.clone())
            .collect();
        for id in removed {
            self.variants.remove(&id);
            self.revisions.remove(&id);
        }
    }

    /// Every guard of the change set, checked before anything is written
    fn check_guards(&self, change: &ChangeSet) -> Option<ApplyOutcome> {
        if let Some(update) = &change.config_update {
            let current = self.configs.get(&change.config_id).map(|c| c.version);
            if current != Some(update.expected_version) {
                return Some(ApplyOutcome::VersionConflict {
                    target: ConflictTarget::Config(change.config_id.clone()),
                    expected: update.expected_version,
                    current,
                });
            }
        }

        for write in &change.variant_writes {
            let current = self.variants.get(&write.variant_id).map(|v| v.version);
            if current != Some(write.expected_version) {
                return Some(ApplyOutcome::VersionConflict {
                    target: ConflictTarget::Variant(write.variant_id.clone()),
                    expected: write.expected_version,
                    current,
                });
            }
        }

        for transition in &change.proposal_transitions {
            match self.proposals.get(&transition.proposal_id) {
                None => {
                    return Some(ApplyOutcome::NotFound(format!(
                        "proposal {}",
                        transition.proposal_id
                    )))
                }
                Some(proposal)
                    if proposal.status != ProposalStatus::Pending
                        && transition.on_conflict == TransitionConflict::Fail =>
                {
                    return Some(ApplyOutcome::ProposalNotPending {
                        proposal_id: proposal.id.clone(),
                        status: proposal.status,
                    })
                }
                Some(_) => {}
            }
        }
        None
    }
}

/// In-process store. One lock guards the whole state, so every change set is
/// applied atomically and events are appended in commit order.
#[derive(Debug, Default)]
pub struct MemoryStore {
    state: Mutex<MemoryState>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait::async_trait]
impl ProjectStore for MemoryStore {
    async fn get_project(&self, id: &Id) -> Result<Option<Project>> {
        Ok(self.state.lock().projects.get(id).cloned())
    }

    async fn list_projects(&self) -> Result<Vec<Project>> {
        let state = self.state.lock();
        let mut projects: Vec<Project> = state.projects.values().cloned().collect();
        projects.sort_by(|a, b| a.created_at.cmp(&b.created_at));
        Ok(projects)
    }

    async fn upsert_project(&self, project: Project) -> Result<()> {
        self.state.lock().projects.insert(project.id.clone(), project);
        Ok(())
    }
}

#[async_trait::async_trait]
impl EnvironmentStore for MemoryStore {
    async fn get_environment(&self, id: &Id) -> Result<Option<Environment>> {
        Ok(self.state.lock().environments.get(id).cloned())
    }

    async fn list_environments(&self, project_id: &Id) -> Result<Vec<Environment>> {
        let state = self.state.lock();
        let mut environments: Vec<Environment> = state
            .environments
            .values()
            .filter(|e| &e.project_id == project_id)
            .cloned()
            .collect();
        environments.sort_by_key(|e| e.position);
        Ok(environments)
    }

    async fn create_environment(
        &self,
        environment: Environment,
        variants: Vec<ConfigVariant>,
    ) -> Result<bool> {
        let mut state = self.state.lock();
        let taken = state
            .environments
            .values()
            .any(|e| e.project_id == environment.project_id && e.name == environment.name);
        if taken {
            return Ok(false);
        }

        // Snapshot first so a failure leaves nothing behind
        let revisions = variants
            .iter()
            .map(|v| VariantRevision::of_variant(v, None))
            .collect::<std::io::Result<Vec<_>>>()
            .context("Failed to snapshot variant state")?;

        state
            .environments
            .insert(environment.id.clone(), environment);
        for (variant, revision) in variants.into_iter().zip(revisions) {
            state.revisions.insert(variant.id.clone(), vec![revision]);
            state.variants.insert(variant.id.clone(), variant);
        }
        Ok(true)
    }

    async fn delete_environment(&self, id: &Id) -> Result<bool> {
        let mut state = self.state.lock();
        if state.environments.remove(id).is_none() {
            return Ok(false);
        }
        state.remove_variants(|v| v.environment_id.as_ref() != Some(id));
        Ok(true)
    }

    async fn reorder_environments(&self, project_id: &Id, ordered_ids: &[Id]) -> Result<()> {
        let mut state = self.state.lock();
        for (position, id) in ordered_ids.iter().enumerate() {
            if let Some(environment) = state.environments.get_mut(id) {
                if &environment.project_id == project_id {
                    environment.position = position as i32;
                }
            }
        }
        Ok(())
    }
}

#[async_trait::async_trait]
impl ConfigStore for MemoryStore {
    async fn get_config(&self, id: &Id) -> Result<Option<Config>> {
        Ok(self.state.lock().configs.get(id).cloned())
    }

    async fn get_config_by_name(&self, project_id: &Id, name: &str) -> Result<Option<Config>> {
        Ok(self
            .state
            .lock()
            .configs
            .values()
            .find(|c| &c.project_id == project_id && c.name == name)
            .cloned())
    }

    async fn list_configs(&self, project_id: &Id) -> Result<Vec<Config>> {
        let state = self.state.lock();
        let mut configs: Vec<Config> = state
            .configs
            .values()
            .filter(|c| &c.project_id == project_id)
            .cloned()
            .collect();
        configs.sort_by(|a, b| a.name.cmp(&b.name));
        Ok(configs)
    }

    async fn create_config(
        &self,
        config: Config,
        variants: Vec<ConfigVariant>,
        members: Vec<Membership>,
        events: Vec<NewAuditEvent>,
    ) -> Result<bool> {
        let mut state = self.state.lock();
        let taken = state
            .configs
            .values()
            .any(|c| c.project_id == config.project_id && c.name == config.name);
        if taken {
            return Ok(false);
        }

        let revisions = variants
            .iter()
            .map(|v| VariantRevision::of_variant(v, None))
            .collect::<std::io::Result<Vec<_>>>()
            .context("Failed to snapshot variant state")?;

        state.configs.insert(config.id.clone(), config);
        for (variant, revision) in variants.into_iter().zip(revisions) {
            state.revisions.insert(variant.id.clone(), vec![revision]);
            state.variants.insert(variant.id.clone(), variant);
        }
        state.memberships.extend(members);
        state.append_events(events);
        Ok(true)
    }

    async fn delete_config(&self, id: &Id, event: NewAuditEvent) -> Result<bool> {
        let mut state = self.state.lock();
        if state.configs.remove(id).is_none() {
            return Ok(false);
        }
        state.remove_variants(|v| &v.config_id != id);
        state.proposals.retain(|_, p| &p.config_id != id);
        state
            .memberships
            .retain(|m| m.scope != MembershipScope::Config(id.clone()));
        state.append_events(vec![event]);
        Ok(true)
    }
}

#[async_trait::async_trait]
impl VariantStore for MemoryStore {
    async fn get_variant_by_id(&self, id: &Id) -> Result<Option<ConfigVariant>> {
        Ok(self.state.lock().variants.get(id).cloned())
    }

    async fn get_variant(
        &self,
        config_id: &Id,
        environment_id: Option<&Id>,
    ) -> Result<Option<ConfigVariant>> {
        Ok(self
            .state
            .lock()
            .variants
            .values()
            .find(|v| &v.config_id == config_id && v.environment_id.as_ref() == environment_id)
            .cloned())
    }

    async fn list_variants(&self, config_id: &Id) -> Result<Vec<ConfigVariant>> {
        let state = self.state.lock();
        let mut variants: Vec<ConfigVariant> = state
            .variants
            .values()
            .filter(|v| &v.config_id == config_id)
            .cloned()
            .collect();
        // Base first, then by environment position
        variants.sort_by_key(|v| {
            v.environment_id
                .as_ref()
                .and_then(|env| state.environments.get(env))
                .map(|env| env.position + 1)
                .unwrap_or(0)
        });
        Ok(variants)
    }

    async fn list_variants_for_environment(&self, environment_id: &Id) -> Result<Vec<ConfigVariant>> {
        Ok(self
            .state
            .lock()
            .variants
            .values()
            .filter(|v| v.environment_id.as_ref() == Some(environment_id))
            .cloned()
            .collect())
    }

    async fn list_revisions(&self, variant_id: &Id) -> Result<Vec<VariantRevision>> {
        let state = self.state.lock();
        let mut revisions = state.revisions.get(variant_id).cloned().unwrap_or_default();
        revisions.reverse();
        Ok(revisions)
    }

    async fn get_revision(&self, variant_id: &Id, version: i64) -> Result<Option<VariantRevision>> {
        Ok(self
            .state
            .lock()
            .revisions
            .get(variant_id)
            .and_then(|history| history.iter().find(|r| r.version == version))
            .cloned())
    }
}

#[async_trait::async_trait]
impl ProposalStore for MemoryStore {
    async fn get_proposal(&self, id: &Id) -> Result<Option<ConfigProposal>> {
        Ok(self.state.lock().proposals.get(id).cloned())
    }

    async fn list_proposals(
        &self,
        config_id: &Id,
        status: Option<ProposalStatus>,
    ) -> Result<Vec<ConfigProposal>> {
        let state = self.state.lock();
        let mut proposals: Vec<ConfigProposal> = state
            .proposals
            .values()
            .filter(|p| &p.config_id == config_id)
            .filter(|p| status.map_or(true, |s| p.status == s))
            .cloned()
            .collect();
        proposals.sort_by(|a, b| a.created_at.cmp(&b.created_at));
        Ok(proposals)
    }

    async fn list_pending_proposals_for_variant(&self, variant_id: &Id) -> Result<Vec<ConfigProposal>> {
        let state = self.state.lock();
        let mut proposals: Vec<ConfigProposal> = state
            .proposals
            .values()
            .filter(|p| p.status == ProposalStatus::Pending && p.touches_variant(variant_id))
            .cloned()
            .collect();
        proposals.sort_by(|a, b| a.created_at.cmp(&b.created_at));
        Ok(proposals)
    }

    async fn create_proposal(&self, proposal: ConfigProposal, event: NewAuditEvent) -> Result<bool> {
        let mut state = self.state.lock();
        if !state.configs.contains_key(&proposal.config_id) {
            return Ok(false);
        }
        state.proposals.insert(proposal.id.clone(), proposal);
        state.append_events(vec![event]);
        Ok(true)
    }
}

#[async_trait::async_trait]
impl MembershipStore for MemoryStore {
    async fn list_memberships(&self, scope: &MembershipScope) -> Result<Vec<Membership>> {
        Ok(self
            .state
            .lock()
            .memberships
            .iter()
            .filter(|m| &m.scope == scope)
            .cloned()
            .collect())
    }

    async fn upsert_project_member(&self, membership: Membership) -> Result<()> {
        let mut state = self.state.lock();
        state
            .memberships
            .retain(|m| !(m.scope == membership.scope && m.email == membership.email));
        state.memberships.push(membership);
        Ok(())
    }
}

#[async_trait::async_trait]
impl EventStore for MemoryStore {
    async fn list_events(&self, project_id: &Id, config_id: Option<&Id>) -> Result<Vec<AuditEvent>> {
        Ok(self
            .state
            .lock()
            .events
            .iter()
            .filter(|e| &e.project_id == project_id)
            .filter(|e| config_id.map_or(true, |id| e.config_id.as_ref() == Some(id)))
            .cloned()
            .collect())
    }
}

#[async_trait::async_trait]
impl ChangeStore for MemoryStore {
    async fn apply_change_set(&self, change: ChangeSet) -> Result<ApplyOutcome> {
        let mut state = self.state.lock();
        if let Some(failed) = state.check_guards(&change) {
            return Ok(failed);
        }

        // Build every new variant and revision before touching the state
        let mut written = Vec::with_capacity(change.variant_writes.len());
        for write in change.variant_writes {
            if let Some(current) = state.variants.get(&write.variant_id) {
                let mut next = current.clone();
                next.apply_state(write.state, write.updated_by);
                let parent_hash = state
                    .revisions
                    .get(&next.id)
                    .and_then(|history| history.last())
                    .map(|r| r.hash.clone());
                let revision = VariantRevision::of_variant(&next, parent_hash)
                    .context("Failed to snapshot variant state")?;
                written.push((next, revision));
            }
        }

        let mut applied = AppliedChange::default();

        if let Some(update) = change.config_update {
            if let Some(config) = state.configs.get_mut(&change.config_id) {
                if let Some(description) = update.description {
                    config.description = description;
                }
                config.version += 1;
                config.updated_at = chrono::Utc::now();
                applied.config_version = Some(config.version);
            }
            if let Some(members) = update.members {
                let scope = MembershipScope::Config(change.config_id.clone());
                state.memberships.retain(|m| m.scope != scope);
                state
                    .memberships
                    .extend(members.to_memberships(&change.config_id));
            }
        }

        for (variant, revision) in written {
            applied
                .variant_versions
                .push((variant.id.clone(), variant.version));
            state
                .revisions
                .entry(variant.id.clone())
                .or_default()
                .push(revision);
            state.variants.insert(variant.id.clone(), variant);
        }

        let mut events = Vec::new();
        let now = chrono::Utc::now();
        for transition in change.proposal_transitions {
            let Some(proposal) = state.proposals.get_mut(&transition.proposal_id) else {
                continue;
            };
            if proposal.status != ProposalStatus::Pending {
                // Only reachable with TransitionConflict::Skip
                continue;
            }
            proposal.status = transition.status;
            proposal.reviewer_id = Some(transition.reviewer_id);
            proposal.rejection_reason = transition.rejection_reason;
            proposal.rejected_in_favor_of_proposal_id = transition.superseded_by;
            proposal.reviewed_at = Some(now);
            applied.transitioned.push(transition.proposal_id);
            events.extend(transition.event);
        }
        events.extend(change.events);
        state.append_events(events);

        Ok(ApplyOutcome::Applied(applied))
    }
}
