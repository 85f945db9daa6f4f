use log::warn;

use crate::error::{ConfigError, ConflictTarget};
use crate::model::{ConfigMembers, Id, NewAuditEvent, ProposalStatus, RejectionReason, VariantState};

/// All-or-nothing unit of work handed to `ChangeStore::apply_change_set`.
///
/// Guards checked before anything is written:
/// - `config_update`: the config's metadata version equals `expected_version`;
/// - each variant write: the variant's version equals `expected_version`;
/// - each proposal transition: the proposal is still pending (or is skipped, see `on_conflict`).
#[derive(Debug, Clone)]
pub struct ChangeSet {
    pub config_id: Id,
    pub config_update: Option<ConfigUpdate>,
    pub variant_writes: Vec<VariantWrite>,
    pub proposal_transitions: Vec<ProposalTransition>,
    pub events: Vec<NewAuditEvent>,
}

impl ChangeSet {
    pub fn new(config_id: Id) -> Self {
        Self {
            config_id,
            config_update: None,
            variant_writes: Vec::new(),
            proposal_transitions: Vec::new(),
            events: Vec::new(),
        }
    }

    pub fn is_empty(&self) -> bool {
        self.config_update.is_none()
            && self.variant_writes.is_empty()
            && self.proposal_transitions.is_empty()
            && self.events.is_empty()
    }
}

/// Metadata write; bumps the config version by one
#[derive(Debug, Clone)]
pub struct ConfigUpdate {
    pub expected_version: i64,
    pub description: Option<String>,
    /// Replaces every config-level member row
    pub members: Option<ConfigMembers>,
}

/// Variant write; bumps the variant version by one and appends a revision
#[derive(Debug, Clone)]
pub struct VariantWrite {
    pub variant_id: Id,
    pub expected_version: i64,
    pub state: VariantState,
    pub updated_by: Option<String>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TransitionConflict {
    /// A non-pending proposal fails the whole change set
    Fail,
    /// A non-pending proposal is left alone and its event dropped
    Skip,
}

#[derive(Debug, Clone)]
pub struct ProposalTransition {
    pub proposal_id: Id,
    pub status: ProposalStatus,
    pub reviewer_id: String,
    pub rejection_reason: Option<RejectionReason>,
    pub superseded_by: Option<Id>,
    /// Recorded only if this transition is applied
    pub event: Option<NewAuditEvent>,
    pub on_conflict: TransitionConflict,
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct AppliedChange {
    /// (variant id, new version) per variant write
    pub variant_versions: Vec<(Id, i64)>,
    pub config_version: Option<i64>,
    /// Proposals actually transitioned
    pub transitioned: Vec<Id>,
}

impl AppliedChange {
    pub fn version_of(&self, variant_id: &str) -> Option<i64> {
        self.variant_versions
            .iter()
            .find(|(id, _)| id == variant_id)
            .map(|(_, version)| *version)
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ApplyOutcome {
    Applied(AppliedChange),
    /// `current == None` means the target no longer exists
    VersionConflict {
        target: ConflictTarget,
        expected: i64,
        current: Option<i64>,
    },
    ProposalNotPending {
        proposal_id: Id,
        status: ProposalStatus,
    },
    NotFound(String),
}

impl ApplyOutcome {
    /// Map a failed guard onto the caller-facing error
    pub fn into_result(self) -> Result<AppliedChange, ConfigError> {
        match self {
            ApplyOutcome::Applied(applied) => Ok(applied),
            ApplyOutcome::VersionConflict {
                target,
                current: None,
                ..
            } => Err(ConfigError::not_found(target.to_string())),
            ApplyOutcome::VersionConflict {
                target,
                expected,
                current,
            } => {
                warn!(
                    "version conflict on {}: expected {}, current {:?}",
                    target, expected, current
                );
                Err(ConfigError::VersionConflict {
                    target,
                    expected,
                    current,
                })
            }
            ApplyOutcome::ProposalNotPending {
                proposal_id,
                status,
            } => Err(ConfigError::InvalidState {
                proposal_id,
                status,
            }),
            ApplyOutcome::NotFound(what) => Err(ConfigError::NotFound(what)),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_deleted_target_maps_to_not_found() {
        let outcome = ApplyOutcome::VersionConflict {
            target: ConflictTarget::Variant("v1".to_string()),
            expected: 3,
            current: None,
        };
        assert!(matches!(outcome.into_result(), Err(ConfigError::NotFound(_))));

        let outcome = ApplyOutcome::VersionConflict {
            target: ConflictTarget::Variant("v1".to_string()),
            expected: 3,
            current: Some(4),
        };
        match outcome.into_result() {
            Err(ConfigError::VersionConflict { current, .. }) => assert_eq!(current, Some(4)),
            other => panic!("Expected VersionConflict, got {:?}", other),
        }
    }
}
