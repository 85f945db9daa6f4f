use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::model::{ChangedAspect, Id, MemberEntry, RejectionReason};

/// Domain event payloads; the tag is the event type consumers filter on
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum EventPayload {
    ConfigCreated {
        name: String,
        description: String,
        value: Value,
        schema: Option<Value>,
    },
    /// One event per changed aspect. `environment_id` is None for the base
    /// variant and for metadata aspects.
    ConfigUpdated {
        aspect: ChangedAspect,
        variant_id: Option<Id>,
        environment_id: Option<Id>,
        before: Value,
        after: Value,
        version: i64,
    },
    ConfigDeleted {
        name: String,
    },
    ConfigMembersChanged {
        added: Vec<MemberEntry>,
        removed: Vec<MemberEntry>,
    },
    ConfigProposalCreated {
        proposal_id: Id,
        aspects: Vec<ChangedAspect>,
    },
    ConfigProposalApproved {
        proposal_id: Id,
        proposer_id: String,
    },
    ConfigProposalRejected {
        proposal_id: Id,
        proposer_id: String,
        reason: RejectionReason,
        rejected_in_favor_of_proposal_id: Option<Id>,
    },
    ConfigVersionRestored {
        variant_id: Id,
        environment_id: Option<Id>,
        restored_version: i64,
        new_version: i64,
    },
}

impl EventPayload {
    pub fn event_type(&self) -> &'static str {
        match self {
            EventPayload::ConfigCreated { .. } => "config_created",
            EventPayload::ConfigUpdated { .. } => "config_updated",
            EventPayload::ConfigDeleted { .. } => "config_deleted",
            EventPayload::ConfigMembersChanged { .. } => "config_members_changed",
            EventPayload::ConfigProposalCreated { .. } => "config_proposal_created",
            EventPayload::ConfigProposalApproved { .. } => "config_proposal_approved",
            EventPayload::ConfigProposalRejected { .. } => "config_proposal_rejected",
            EventPayload::ConfigVersionRestored { .. } => "config_version_restored",
        }
    }
}

/// Event handed to the store; it becomes an `AuditEvent` when its change set commits
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NewAuditEvent {
    pub id: Id,
    pub project_id: Id,
    pub config_id: Option<Id>,
    pub actor_id: Option<String>,
    pub payload: EventPayload,
    pub created_at: DateTime<Utc>,
}

impl NewAuditEvent {
    pub fn new(
        project_id: Id,
        config_id: Option<Id>,
        actor_id: Option<String>,
        payload: EventPayload,
    ) -> Self {
        Self {
            id: crate::model::generate_id(),
            project_id,
            config_id,
            actor_id,
            payload,
            created_at: Utc::now(),
        }
    }
}

/// Immutable, committed domain event
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AuditEvent {
    /// Commit order across the store; events of one config are observed in this order
    pub sequence: i64,
    pub id: Id,
    pub project_id: Id,
    pub config_id: Option<Id>,
    pub actor_id: Option<String>,
    pub event_type: String,
    pub payload: EventPayload,
    pub created_at: DateTime<Utc>,
}

impl AuditEvent {
    pub fn from_new(event: NewAuditEvent, sequence: i64) -> Self {
        Self {
            sequence,
            event_type: event.payload.event_type().to_string(),
            id: event.id,
            project_id: event.project_id,
            config_id: event.config_id,
            actor_id: event.actor_id,
            payload: event.payload,
            created_at: event.created_at,
        }
    }
}
