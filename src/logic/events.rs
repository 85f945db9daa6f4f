use serde_json::{json, Value};

use crate::model::{
    ChangedAspect, Config, ConfigMembers, ConfigProposal, ConfigVariant, EventPayload, Id,
    NewAuditEvent, RejectionReason, UserContext, VariantState,
};

/// Builds the domain events a change emits. Events are handed to the store
/// inside the change set that causes them, so they commit with it or not at all.
pub struct EventEmitter<'a> {
    project_id: &'a Id,
    config_id: &'a Id,
    actor: &'a UserContext,
}

impl<'a> EventEmitter<'a> {
    pub fn new(config: &'a Config, actor: &'a UserContext) -> Self {
        Self {
            project_id: &config.project_id,
            config_id: &config.id,
            actor,
        }
    }

    pub fn emit(&self, payload: EventPayload) -> NewAuditEvent {
        NewAuditEvent::new(
            self.project_id.clone(),
            Some(self.config_id.clone()),
            Some(self.actor.user_id.clone()),
            payload,
        )
    }

    pub fn config_created(&self, config: &Config, base: &VariantState) -> NewAuditEvent {
        self.emit(EventPayload::ConfigCreated {
            name: config.name.clone(),
            description: config.description.clone(),
            value: base.value.clone(),
            schema: base.schema.clone(),
        })
    }

    pub fn config_deleted(&self, config: &Config) -> NewAuditEvent {
        self.emit(EventPayload::ConfigDeleted {
            name: config.name.clone(),
        })
    }

    /// One `config_updated` per variant field that actually differs
    pub fn variant_updated(
        &self,
        before: &ConfigVariant,
        after: &VariantState,
        new_version: i64,
    ) -> Vec<NewAuditEvent> {
        let fields = [
            (ChangedAspect::Value, before.value.clone(), after.value.clone()),
            (
                ChangedAspect::Schema,
                before.schema.clone().unwrap_or(Value::Null),
                after.schema.clone().unwrap_or(Value::Null),
            ),
            (
                ChangedAspect::Overrides,
                json!(before.overrides),
                json!(after.overrides),
            ),
        ];

        fields
            .into_iter()
            .filter(|(_, old, new)| old != new)
            .map(|(aspect, old, new)| {
                self.emit(EventPayload::ConfigUpdated {
                    aspect,
                    variant_id: Some(before.id.clone()),
                    environment_id: before.environment_id.clone(),
                    before: old,
                    after: new,
                    version: new_version,
                })
            })
            .collect()
    }

    pub fn description_updated(&self, before: &str, after: &str, new_version: i64) -> Option<NewAuditEvent> {
        if before == after {
            return None;
        }
        Some(self.emit(EventPayload::ConfigUpdated {
            aspect: ChangedAspect::Description,
            variant_id: None,
            environment_id: None,
            before: json!(before),
            after: json!(after),
            version: new_version,
        }))
    }

    pub fn members_changed(&self, before: &ConfigMembers, after: &ConfigMembers) -> Option<NewAuditEvent> {
        let diff = before.diff(after);
        if diff.is_empty() {
            return None;
        }
        Some(self.emit(EventPayload::ConfigMembersChanged {
            added: diff.added,
            removed: diff.removed,
        }))
    }

    pub fn proposal_created(&self, proposal: &ConfigProposal) -> NewAuditEvent {
        self.emit(EventPayload::ConfigProposalCreated {
            proposal_id: proposal.id.clone(),
            aspects: proposal.changes.aspects(),
        })
    }

    pub fn proposal_approved(&self, proposal: &ConfigProposal) -> NewAuditEvent {
        self.emit(EventPayload::ConfigProposalApproved {
            proposal_id: proposal.id.clone(),
            proposer_id: proposal.proposer_id.clone(),
        })
    }

    pub fn proposal_rejected(
        &self,
        proposal: &ConfigProposal,
        reason: RejectionReason,
        superseded_by: Option<Id>,
    ) -> NewAuditEvent {
        self.emit(EventPayload::ConfigProposalRejected {
            proposal_id: proposal.id.clone(),
            proposer_id: proposal.proposer_id.clone(),
            reason,
            rejected_in_favor_of_proposal_id: superseded_by,
        })
    }

    pub fn version_restored(
        &self,
        variant: &ConfigVariant,
        restored_version: i64,
        new_version: i64,
    ) -> NewAuditEvent {
        self.emit(EventPayload::ConfigVersionRestored {
            variant_id: variant.id.clone(),
            environment_id: variant.environment_id.clone(),
            restored_version,
            new_version,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::{Condition, Override};

    fn config() -> Config {
        Config::new("p1".to_string(), "flag_x".to_string(), String::new(), "alice".to_string())
    }

    #[test]
    fn test_variant_update_emits_only_changed_aspects() {
        let config = config();
        let actor = UserContext::new("alice".to_string());
        let emitter = EventEmitter::new(&config, &actor);
        let variant = ConfigVariant::new(
            config.id.clone(),
            Some("env-prod".to_string()),
            VariantState {
                value: json!({"enabled": false}),
                schema: None,
                overrides: vec![],
            },
            None,
        );

        let mut after = variant.state();
        after.value = json!({"enabled": true});
        let events = emitter.variant_updated(&variant, &after, 2);
        assert_eq!(events.len(), 1);
        match &events[0].payload {
            EventPayload::ConfigUpdated {
                aspect,
                before,
                after,
                version,
                environment_id,
                ..
            } => {
                assert_eq!(*aspect, ChangedAspect::Value);
                assert_eq!(before, &json!({"enabled": false}));
                assert_eq!(after, &json!({"enabled": true}));
                assert_eq!(*version, 2);
                assert_eq!(environment_id.as_deref(), Some("env-prod"));
            }
            other => panic!("Expected config_updated, got {:?}", other),
        }

        after.overrides.push(Override {
            name: "eu".to_string(),
            condition: Condition::equals("region", "EU"),
            value: json!({"enabled": true}),
        });
        after.schema = Some(json!({"type": "object"}));
        assert_eq!(emitter.variant_updated(&variant, &after, 2).len(), 3);
        assert!(emitter.variant_updated(&variant, &variant.state(), 2).is_empty());
    }

    #[test]
    fn test_metadata_events_skip_no_ops() {
        let config = config();
        let actor = UserContext::new("alice".to_string());
        let emitter = EventEmitter::new(&config, &actor);
        assert!(emitter.description_updated("a", "a", 2).is_none());
        assert!(emitter.description_updated("a", "b", 2).is_some());

        let before = ConfigMembers::default();
        let after = ConfigMembers {
            maintainers: vec!["m@x.io".to_string()],
            editors: vec![],
        };
        assert!(emitter.members_changed(&before, &before).is_none());
        let event = emitter.members_changed(&before, &after).unwrap();
        assert_eq!(event.payload.event_type(), "config_members_changed");
        assert_eq!(event.config_id.as_deref(), Some(config.id.as_str()));
    }
}
