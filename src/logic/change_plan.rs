use std::collections::HashSet;

use crate::error::{ConfigError, ConflictTarget, Result};
use crate::logic::{EventEmitter, WriteValidator};
use crate::model::{
    Config, ConfigMembers, MembershipScope, ProposedChanges, UserContext, VariantState,
};
use crate::store::{ChangeSet, ConfigUpdate, Store, VariantWrite};

/// Turns requested changes into a guarded change set.
///
/// Each touched variant must still be at the version the change was computed
/// against, and metadata changes need the config at `base_config_version`;
/// otherwise planning fails with `VersionConflict` before anything is written.
/// The store re-checks the same guards when the change set is applied.
pub struct ChangePlanner;

impl ChangePlanner {
    pub async fn plan<S: Store>(
        store: &S,
        config: &Config,
        actor: &UserContext,
        base_config_version: i64,
        changes: &ProposedChanges,
    ) -> Result<ChangeSet> {
        if changes.is_empty() {
            return Err(ConfigError::validation("the change does not modify anything"));
        }

        let emitter = EventEmitter::new(config, actor);
        let mut change = ChangeSet::new(config.id.clone());
        let mut seen = HashSet::new();

        for requested in &changes.variants {
            if !seen.insert(requested.variant_id.as_str()) {
                return Err(ConfigError::validation(format!(
                    "variant {} is listed more than once",
                    requested.variant_id
                )));
            }

            let variant = store
                .get_variant_by_id(&requested.variant_id)
                .await?
                .filter(|v| v.config_id == config.id)
                .ok_or_else(|| {
                    ConfigError::not_found(format!(
                        "variant {} of config {}",
                        requested.variant_id, config.name
                    ))
                })?;

            if variant.version != requested.base_version {
                return Err(ConfigError::VersionConflict {
                    target: ConflictTarget::Variant(variant.id.clone()),
                    expected: requested.base_version,
                    current: Some(variant.version),
                });
            }

            let state = VariantState {
                value: requested.value.clone().unwrap_or_else(|| variant.value.clone()),
                schema: match &requested.schema {
                    Some(schema) => schema.clone(),
                    None => variant.schema.clone(),
                },
                overrides: requested
                    .overrides
                    .clone()
                    .unwrap_or_else(|| variant.overrides.clone()),
            };
            WriteValidator::validate_state(&state)?;

            change
                .events
                .extend(emitter.variant_updated(&variant, &state, variant.version + 1));
            change.variant_writes.push(VariantWrite {
                variant_id: variant.id.clone(),
                expected_version: requested.base_version,
                state,
                updated_by: Some(actor.user_id.clone()),
            });
        }

        if changes.touches_metadata() {
            if config.version != base_config_version {
                return Err(ConfigError::VersionConflict {
                    target: ConflictTarget::Config(config.id.clone()),
                    expected: base_config_version,
                    current: Some(config.version),
                });
            }

            let new_version = config.version + 1;
            let description = changes.description.as_ref().and_then(|description| {
                let event = emitter.description_updated(&config.description, description, new_version)?;
                change.events.push(event);
                Some(description.clone())
            });

            let members = match &changes.members {
                Some(requested) => {
                    let current = ConfigMembers::from_memberships(
                        &store
                            .list_memberships(&MembershipScope::Config(config.id.clone()))
                            .await?,
                    );
                    let requested = requested.normalized();
                    let event = emitter.members_changed(&current, &requested);
                    let changed = event.is_some();
                    change.events.extend(event);
                    changed.then_some(requested)
                }
                None => None,
            };

            // Identical metadata leaves the config version alone
            if description.is_some() || members.is_some() {
                change.config_update = Some(ConfigUpdate {
                    expected_version: base_config_version,
                    description,
                    members,
                });
            }
        }

        if change.events.is_empty() {
            return Err(ConfigError::validation(
                "the change leaves every field as it is",
            ));
        }
        Ok(change)
    }
}
