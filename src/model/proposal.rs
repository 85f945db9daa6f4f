use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::model::common::deserialize_some;
use crate::model::{generate_id, ConfigMembers, Id, Override};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ProposalStatus {
    Pending,
    Approved,
    Rejected,
}

impl ProposalStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            ProposalStatus::Pending => "pending",
            ProposalStatus::Approved => "approved",
            ProposalStatus::Rejected => "rejected",
        }
    }

    pub fn parse(value: &str) -> Option<Self> {
        match value {
            "pending" => Some(ProposalStatus::Pending),
            "approved" => Some(ProposalStatus::Approved),
            "rejected" => Some(ProposalStatus::Rejected),
            _ => None,
        }
    }

    pub fn is_terminal(&self) -> bool {
        !matches!(self, ProposalStatus::Pending)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RejectionReason {
    RejectedExplicitly,
    /// Another proposal replaced this one; see `rejected_in_favor_of_proposal_id`
    Superseded,
}

impl RejectionReason {
    pub fn as_str(&self) -> &'static str {
        match self {
            RejectionReason::RejectedExplicitly => "rejected_explicitly",
            RejectionReason::Superseded => "superseded",
        }
    }

    pub fn parse(value: &str) -> Option<Self> {
        match value {
            "rejected_explicitly" => Some(RejectionReason::RejectedExplicitly),
            "superseded" => Some(RejectionReason::Superseded),
            _ => None,
        }
    }
}

/// Aspect of a config a change can touch; one audit event is emitted per changed aspect
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ChangedAspect {
    Value,
    Description,
    Schema,
    Overrides,
    Members,
}

/// Requested change to one variant, bound to the version it was computed against
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct VariantChange {
    pub variant_id: Id,
    pub base_version: i64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub value: Option<Value>,
    /// `Some(None)` removes the schema
    #[serde(
        default,
        deserialize_with = "deserialize_some",
        skip_serializing_if = "Option::is_none"
    )]
    pub schema: Option<Option<Value>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub overrides: Option<Vec<Override>>,
}

impl VariantChange {
    pub fn aspects(&self) -> Vec<ChangedAspect> {
        let mut aspects = Vec::new();
        if self.value.is_some() {
            aspects.push(ChangedAspect::Value);
        }
        if self.schema.is_some() {
            aspects.push(ChangedAspect::Schema);
        }
        if self.overrides.is_some() {
            aspects.push(ChangedAspect::Overrides);
        }
        aspects
    }
}

/// The set of fields a proposal (or a direct edit) wants to change
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ProposedChanges {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub members: Option<ConfigMembers>,
    #[serde(default)]
    pub variants: Vec<VariantChange>,
}

impl ProposedChanges {
    /// Every aspect any field of this change touches, deduplicated
    pub fn aspects(&self) -> Vec<ChangedAspect> {
        let mut aspects = Vec::new();
        if self.description.is_some() {
            aspects.push(ChangedAspect::Description);
        }
        if self.members.is_some() {
            aspects.push(ChangedAspect::Members);
        }
        for change in &self.variants {
            for aspect in change.aspects() {
                if !aspects.contains(&aspect) {
                    aspects.push(aspect);
                }
            }
        }
        aspects
    }

    pub fn touches_metadata(&self) -> bool {
        self.description.is_some() || self.members.is_some()
    }

    pub fn is_empty(&self) -> bool {
        self.aspects().is_empty()
    }
}

/// Input model for creating a proposal
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NewProposal {
    /// Config metadata version the description/member changes were computed against
    pub base_config_version: i64,
    #[serde(flatten)]
    pub changes: ProposedChanges,
    #[serde(default)]
    pub message: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ConfigProposal {
    pub id: Id,
    pub config_id: Id,
    pub project_id: Id,
    pub base_config_version: i64,
    pub changes: ProposedChanges,
    pub message: Option<String>,
    pub status: ProposalStatus,
    pub proposer_id: String,
    pub reviewer_id: Option<String>,
    pub rejection_reason: Option<RejectionReason>,
    /// Lookup-only back-reference to the proposal that replaced this one
    pub rejected_in_favor_of_proposal_id: Option<Id>,
    pub created_at: DateTime<Utc>,
    pub reviewed_at: Option<DateTime<Utc>>,
}

impl ConfigProposal {
    pub fn new(config_id: Id, project_id: Id, proposal: NewProposal, proposer_id: String) -> Self {
        Self {
            id: generate_id(),
            config_id,
            project_id,
            base_config_version: proposal.base_config_version,
            changes: proposal.changes,
            message: proposal.message,
            status: ProposalStatus::Pending,
            proposer_id,
            reviewer_id: None,
            rejection_reason: None,
            rejected_in_favor_of_proposal_id: None,
            created_at: Utc::now(),
            reviewed_at: None,
        }
    }

    pub fn touches_variant(&self, variant_id: &str) -> bool {
        self.changes
            .variants
            .iter()
            .any(|change| change.variant_id == variant_id)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_schema_field_distinguishes_absent_and_null() {
        let absent: VariantChange =
            serde_json::from_value(json!({"variant_id": "v", "base_version": 1})).unwrap();
        assert_eq!(absent.schema, None);
        assert!(absent.aspects().is_empty());

        let removed: VariantChange = serde_json::from_value(
            json!({"variant_id": "v", "base_version": 1, "schema": null}),
        )
        .unwrap();
        assert_eq!(removed.schema, Some(None));
        assert_eq!(removed.aspects(), vec![ChangedAspect::Schema]);
    }

    #[test]
    fn test_aspects_are_deduplicated_across_variants() {
        let changes = ProposedChanges {
            description: Some("new".to_string()),
            members: None,
            variants: vec![
                VariantChange {
                    variant_id: "a".to_string(),
                    base_version: 1,
                    value: Some(json!(1)),
                    schema: None,
                    overrides: None,
                },
                VariantChange {
                    variant_id: "b".to_string(),
                    base_version: 3,
                    value: Some(json!(2)),
                    schema: None,
                    overrides: Some(vec![]),
                },
            ],
        };
        assert_eq!(
            changes.aspects(),
            vec![
                ChangedAspect::Description,
                ChangedAspect::Value,
                ChangedAspect::Overrides
            ]
        );
    }

    #[test]
    fn test_new_proposal_flattens_changes() {
        let proposal: NewProposal = serde_json::from_value(json!({
            "base_config_version": 2,
            "description": "desc",
            "variants": [{"variant_id": "v1", "base_version": 1, "value": {"enabled": true}}]
        }))
        .unwrap();
        assert_eq!(proposal.base_config_version, 2);
        assert_eq!(proposal.changes.description.as_deref(), Some("desc"));
        assert_eq!(proposal.changes.variants.len(), 1);
    }
}
