use log::info;

use crate::error::{ConfigError, Result};
use crate::logic::{ChangePlanner, ConfigAccess, EventEmitter, PermissionGate};
use crate::model::{
    Capability, ConfigProposal, Id, NewProposal, ProposalStatus, RejectionReason, UserContext,
};
use crate::store::{ChangeSet, ProposalTransition, Store, TransitionConflict};

/// Proposal lifecycle: `pending -> approved | rejected`, each transition exactly once
pub struct ProposalWorkflow;

impl ProposalWorkflow {
    /// Persist a pending proposal. Nothing about the config changes.
    pub async fn create_proposal<S: Store>(
        store: &S,
        user: &UserContext,
        config_id: &Id,
        request: NewProposal,
    ) -> Result<ConfigProposal> {
        let access = ConfigAccess::load(store, user, config_id).await?;
        if request.changes.is_empty() {
            return Err(ConfigError::validation("the proposal does not change anything"));
        }
        access.require(
            user,
            PermissionGate::required_for_changes(&request.changes),
            "proposing this change",
        )?;

        // Validates values against schemas and the base versions against the current ones
        ChangePlanner::plan(
            store,
            &access.config,
            user,
            request.base_config_version,
            &request.changes,
        )
        .await?;

        let proposal = ConfigProposal::new(
            access.config.id.clone(),
            access.project.id.clone(),
            request,
            user.user_id.clone(),
        );
        let event = EventEmitter::new(&access.config, user).proposal_created(&proposal);
        if !store.create_proposal(proposal.clone(), event).await? {
            return Err(ConfigError::not_found(format!("config {}", proposal.config_id)));
        }

        info!(
            "proposal {} created for config {} by {}",
            proposal.id, access.config.name, user.user_id
        );
        Ok(proposal)
    }

    /// Apply a pending proposal at its recorded base versions. If any version
    /// moved, nothing is written and the proposal stays pending.
    pub async fn approve_proposal<S: Store>(
        store: &S,
        user: &UserContext,
        proposal_id: &Id,
    ) -> Result<ConfigProposal> {
        let proposal = Self::load_pending(store, proposal_id).await?;
        let access = ConfigAccess::load(store, user, &proposal.config_id).await?;
        PermissionGate::check_approve(user, &access.project, &proposal, access.capability)?;

        let mut change = ChangePlanner::plan(
            store,
            &access.config,
            user,
            proposal.base_config_version,
            &proposal.changes,
        )
        .await?;
        change.proposal_transitions.push(ProposalTransition {
            proposal_id: proposal.id.clone(),
            status: ProposalStatus::Approved,
            reviewer_id: user.user_id.clone(),
            rejection_reason: None,
            superseded_by: None,
            event: Some(EventEmitter::new(&access.config, user).proposal_approved(&proposal)),
            on_conflict: TransitionConflict::Fail,
        });

        let applied = store.apply_change_set(change).await?.into_result()?;
        info!(
            "proposal {} approved by {}: {} variant(s) written",
            proposal.id,
            user.user_id,
            applied.variant_versions.len()
        );
        Self::reload(store, proposal_id).await
    }

    /// Reject a pending proposal; `superseded_by` records the proposal that replaces it
    pub async fn reject_proposal<S: Store>(
        store: &S,
        user: &UserContext,
        proposal_id: &Id,
        superseded_by: Option<Id>,
    ) -> Result<ConfigProposal> {
        let proposal = Self::load_pending(store, proposal_id).await?;
        let access = ConfigAccess::load(store, user, &proposal.config_id).await?;
        PermissionGate::check_reject(user, &proposal, access.capability)?;

        if let Some(replacement) = &superseded_by {
            if replacement == &proposal.id {
                return Err(ConfigError::validation("a proposal cannot supersede itself"));
            }
            let exists = store
                .get_proposal(replacement)
                .await?
                .map(|p| p.config_id == proposal.config_id)
                .unwrap_or(false);
            if !exists {
                return Err(ConfigError::not_found(format!("proposal {}", replacement)));
            }
        }
        let reason = if superseded_by.is_some() {
            RejectionReason::Superseded
        } else {
            RejectionReason::RejectedExplicitly
        };

        let emitter = EventEmitter::new(&access.config, user);
        let mut change = ChangeSet::new(access.config.id.clone());
        change.proposal_transitions.push(ProposalTransition {
            proposal_id: proposal.id.clone(),
            status: ProposalStatus::Rejected,
            reviewer_id: user.user_id.clone(),
            rejection_reason: Some(reason),
            superseded_by: superseded_by.clone(),
            event: Some(emitter.proposal_rejected(&proposal, reason, superseded_by)),
            on_conflict: TransitionConflict::Fail,
        });

        store.apply_change_set(change).await?.into_result()?;
        info!(
            "proposal {} rejected by {} ({})",
            proposal.id,
            user.user_id,
            reason.as_str()
        );
        Self::reload(store, proposal_id).await
    }

    /// Reject every still-pending proposal touching the variant.
    /// Returns the ids actually rejected; none pending is a successful no-op.
    pub async fn reject_all_pending<S: Store>(
        store: &S,
        user: &UserContext,
        variant_id: &Id,
    ) -> Result<Vec<Id>> {
        let variant = store
            .get_variant_by_id(variant_id)
            .await?
            .ok_or_else(|| ConfigError::not_found(format!("variant {}", variant_id)))?;
        let access = ConfigAccess::load(store, user, &variant.config_id).await?;
        access.require(user, Capability::Editor, "rejecting proposals")?;

        let pending = store.list_pending_proposals_for_variant(&variant.id).await?;
        // Every permission check happens before the first rejection
        for proposal in &pending {
            PermissionGate::check_reject(user, proposal, access.capability)?;
        }
        if pending.is_empty() {
            return Ok(Vec::new());
        }

        let emitter = EventEmitter::new(&access.config, user);
        let mut change = ChangeSet::new(access.config.id.clone());
        for proposal in &pending {
            change.proposal_transitions.push(ProposalTransition {
                proposal_id: proposal.id.clone(),
                status: ProposalStatus::Rejected,
                reviewer_id: user.user_id.clone(),
                rejection_reason: Some(RejectionReason::RejectedExplicitly),
                superseded_by: None,
                event: Some(emitter.proposal_rejected(
                    proposal,
                    RejectionReason::RejectedExplicitly,
                    None,
                )),
                // Proposals decided concurrently are left as they are
                on_conflict: TransitionConflict::Skip,
            });
        }

        let applied = store.apply_change_set(change).await?.into_result()?;
        info!(
            "{} pending proposal(s) for variant {} rejected by {}",
            applied.transitioned.len(),
            variant.id,
            user.user_id
        );
        Ok(applied.transitioned)
    }

    pub async fn get_proposal<S: Store>(
        store: &S,
        user: &UserContext,
        proposal_id: &Id,
    ) -> Result<ConfigProposal> {
        let proposal = Self::reload(store, proposal_id).await?;
        let access = ConfigAccess::load(store, user, &proposal.config_id).await?;
        access.require(user, Capability::Viewer, "reading proposals")?;
        Ok(proposal)
    }

    pub async fn list_proposals<S: Store>(
        store: &S,
        user: &UserContext,
        config_id: &Id,
        status: Option<ProposalStatus>,
    ) -> Result<Vec<ConfigProposal>> {
        let access = ConfigAccess::load(store, user, config_id).await?;
        access.require(user, Capability::Viewer, "reading proposals")?;
        Ok(store.list_proposals(&access.config.id, status).await?)
    }

    async fn load_pending<S: Store>(store: &S, proposal_id: &Id) -> Result<ConfigProposal> {
        let proposal = Self::reload(store, proposal_id).await?;
        if proposal.status.is_terminal() {
            return Err(ConfigError::InvalidState {
                proposal_id: proposal.id,
                status: proposal.status,
            });
        }
        Ok(proposal)
    }

    async fn reload<S: Store>(store: &S, proposal_id: &Id) -> Result<ConfigProposal> {
        store
            .get_proposal(proposal_id)
            .await?
            .ok_or_else(|| ConfigError::not_found(format!("proposal {}", proposal_id)))
    }
}
