use log::{debug, info};
use serde::{Deserialize, Serialize};

use crate::error::{ConfigError, ConflictTarget, Result};
use crate::logic::{
    ChangePlanner, ConfigAccess, EventEmitter, OverrideEvaluator, ProjectAccess, WriteValidator,
};
use crate::model::{
    AuditEvent, Capability, Config, ConfigDetails, ConfigMembers, ConfigVariant,
    EvaluationContext, Id, MembershipScope, NewConfig, ProposedChanges, Resolution, UserContext,
    VariantRevision, VariantState,
};
use crate::store::{ChangeSet, Store, VariantWrite};

/// Direct (proposal-less) change to a config
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct UpdateConfig {
    pub base_config_version: i64,
    #[serde(flatten)]
    pub changes: ProposedChanges,
}

/// Re-apply the state of a past revision as a new version
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RestoreVersion {
    pub version: i64,
    /// Version the caller saw; the restore fails if the variant moved since
    pub base_version: i64,
}

pub struct ConfigOperations;

impl ConfigOperations {
    /// Effective value of a config for an environment (by name) and context.
    /// Without an environment, or when the environment has no variant, the base definition is used.
    pub async fn resolve_config<S: Store>(
        store: &S,
        user: &UserContext,
        project_id: &Id,
        name: &str,
        environment: Option<&str>,
        context: &EvaluationContext,
    ) -> Result<Resolution> {
        let config = store
            .get_config_by_name(project_id, name)
            .await?
            .ok_or_else(|| ConfigError::not_found(format!("config '{}'", name)))?;
        let access = ConfigAccess::for_config(store, user, config).await?;
        access.require(user, Capability::Viewer, "reading config values")?;

        let environment_id = match environment {
            Some(env_name) => Some(
                store
                    .list_environments(project_id)
                    .await?
                    .into_iter()
                    .find(|e| e.name == env_name)
                    .map(|e| e.id)
                    .ok_or_else(|| ConfigError::not_found(format!("environment '{}'", env_name)))?,
            ),
            None => None,
        };

        let variant = match &environment_id {
            Some(env_id) => match store.get_variant(&access.config.id, Some(env_id)).await? {
                Some(variant) => Some(variant),
                None => {
                    debug!(
                        "config {} has no variant for environment {}, using base",
                        access.config.name, env_id
                    );
                    store.get_variant(&access.config.id, None).await?
                }
            },
            None => store.get_variant(&access.config.id, None).await?,
        };
        let variant = variant.ok_or_else(|| {
            ConfigError::not_found(format!("variant of config '{}'", access.config.name))
        })?;

        Ok(OverrideEvaluator::resolve(&variant, context))
    }

    /// Create a config with its base definition and one variant per environment
    /// (seeded explicitly, or copied from the base).
    pub async fn create_config<S: Store>(
        store: &S,
        user: &UserContext,
        project_id: &Id,
        request: NewConfig,
    ) -> Result<ConfigDetails> {
        let access = ProjectAccess::load(store, user, project_id).await?;
        access.require(user, Capability::Editor, "creating configs")?;
        WriteValidator::validate_name(&request.name)?;

        let base_state = VariantState {
            value: request.value,
            schema: request.schema,
            overrides: request.overrides,
        };
        WriteValidator::validate_state(&base_state)?;

        let environments = store.list_environments(&access.project.id).await?;
        if let Some(unknown) = request
            .environment_variants
            .keys()
            .find(|id| !environments.iter().any(|e| &e.id == *id))
        {
            return Err(ConfigError::not_found(format!("environment {}", unknown)));
        }

        if store
            .get_config_by_name(&access.project.id, &request.name)
            .await?
            .is_some()
        {
            return Err(ConfigError::DuplicateName(request.name));
        }

        let config = Config::new(
            access.project.id.clone(),
            request.name,
            request.description,
            user.user_id.clone(),
        );
        let author = Some(user.user_id.clone());
        let base = ConfigVariant::new(config.id.clone(), None, base_state.clone(), author.clone());

        let mut variants = vec![base.clone()];
        for environment in &environments {
            let variant = match request.environment_variants.get(&environment.id) {
                Some(seed) => {
                    let state = VariantState {
                        value: seed.value.clone(),
                        schema: seed.schema.clone(),
                        overrides: seed.overrides.clone(),
                    };
                    WriteValidator::validate_state(&state)?;
                    ConfigVariant::new(config.id.clone(), Some(environment.id.clone()), state, author.clone())
                }
                None => base.copy_to_environment(environment.id.clone(), author.clone()),
            };
            variants.push(variant);
        }

        // The creator maintains what they created
        let mut members = request.members.clone();
        if let Some(email) = user.email() {
            members.maintainers.push(email.to_string());
        }
        let members = members.normalized();

        let emitter = EventEmitter::new(&config, user);
        let mut events = vec![emitter.config_created(&config, &base_state)];
        events.extend(emitter.members_changed(&ConfigMembers::default(), &members));

        let created = store
            .create_config(
                config.clone(),
                variants.clone(),
                members.to_memberships(&config.id),
                events,
            )
            .await?;
        if !created {
            return Err(ConfigError::DuplicateName(config.name));
        }

        info!(
            "config {} created in project {} by {}",
            config.name, config.project_id, user.user_id
        );
        Ok(ConfigDetails {
            config,
            variants,
            members,
        })
    }

    pub async fn get_config<S: Store>(
        store: &S,
        user: &UserContext,
        config_id: &Id,
    ) -> Result<ConfigDetails> {
        let access = ConfigAccess::load(store, user, config_id).await?;
        access.require(user, Capability::Viewer, "reading configs")?;
        Self::details(store, access.config).await
    }

    pub async fn list_configs<S: Store>(
        store: &S,
        user: &UserContext,
        project_id: &Id,
    ) -> Result<Vec<Config>> {
        let access = ProjectAccess::load(store, user, project_id).await?;
        access.require(user, Capability::Viewer, "listing configs")?;
        Ok(store.list_configs(&access.project.id).await?)
    }

    /// Apply a change without a proposal. Same version checks and events as an approval.
    pub async fn update_config<S: Store>(
        store: &S,
        user: &UserContext,
        config_id: &Id,
        request: UpdateConfig,
    ) -> Result<ConfigDetails> {
        let access = ConfigAccess::load(store, user, config_id).await?;
        access.require_bypass(user, "changing a config directly")?;

        let change = ChangePlanner::plan(
            store,
            &access.config,
            user,
            request.base_config_version,
            &request.changes,
        )
        .await?;
        let applied = store.apply_change_set(change).await?.into_result()?;

        info!(
            "config {} changed directly by {}: {} variant(s) written",
            access.config.name,
            user.user_id,
            applied.variant_versions.len()
        );
        Self::reload_details(store, config_id).await
    }

    /// Remove a config with everything it owns
    pub async fn delete_config<S: Store>(store: &S, user: &UserContext, config_id: &Id) -> Result<()> {
        let access = ConfigAccess::load(store, user, config_id).await?;
        if !user.has_project_write_scope(&access.project.id) {
            access.require(user, Capability::Maintainer, "deleting configs")?;
        }

        let event = EventEmitter::new(&access.config, user).config_deleted(&access.config);
        if !store.delete_config(&access.config.id, event).await? {
            return Err(ConfigError::not_found(format!("config {}", config_id)));
        }
        info!("config {} deleted by {}", access.config.name, user.user_id);
        Ok(())
    }

    /// Revision history of a variant, newest first
    pub async fn list_revisions<S: Store>(
        store: &S,
        user: &UserContext,
        variant_id: &Id,
    ) -> Result<Vec<VariantRevision>> {
        let variant = store
            .get_variant_by_id(variant_id)
            .await?
            .ok_or_else(|| ConfigError::not_found(format!("variant {}", variant_id)))?;
        let access = ConfigAccess::load(store, user, &variant.config_id).await?;
        access.require(user, Capability::Viewer, "reading history")?;
        Ok(store.list_revisions(&variant.id).await?)
    }

    pub async fn restore_version<S: Store>(
        store: &S,
        user: &UserContext,
        config_id: &Id,
        variant_id: &Id,
        request: RestoreVersion,
    ) -> Result<ConfigVariant> {
        let access = ConfigAccess::load(store, user, config_id).await?;
        access.require_bypass(user, "restoring a version")?;

        let variant = store
            .get_variant_by_id(variant_id)
            .await?
            .filter(|v| v.config_id == access.config.id)
            .ok_or_else(|| ConfigError::not_found(format!("variant {}", variant_id)))?;
        if variant.version != request.base_version {
            return Err(ConfigError::VersionConflict {
                target: ConflictTarget::Variant(variant.id.clone()),
                expected: request.base_version,
                current: Some(variant.version),
            });
        }
        let revision = store
            .get_revision(&variant.id, request.version)
            .await?
            .ok_or_else(|| {
                ConfigError::not_found(format!("version {} of variant {}", request.version, variant.id))
            })?;
        let state = revision.state()?;
        WriteValidator::validate_state(&state)?;

        let new_version = variant.version + 1;
        let emitter = EventEmitter::new(&access.config, user);
        let mut events = emitter.variant_updated(&variant, &state, new_version);
        if events.is_empty() {
            return Err(ConfigError::validation(format!(
                "version {} is identical to the current state",
                request.version
            )));
        }
        events.insert(0, emitter.version_restored(&variant, request.version, new_version));

        let mut change = ChangeSet::new(access.config.id.clone());
        change.variant_writes.push(VariantWrite {
            variant_id: variant.id.clone(),
            expected_version: request.base_version,
            state,
            updated_by: Some(user.user_id.clone()),
        });
        change.events = events;
        store.apply_change_set(change).await?.into_result()?;

        info!(
            "variant {} of config {} restored to version {} as version {}",
            variant.id, access.config.name, request.version, new_version
        );
        store
            .get_variant_by_id(&variant.id)
            .await?
            .ok_or_else(|| ConfigError::not_found(format!("variant {}", variant.id)))
    }

    /// Committed events of a project, or of one of its configs, in commit order
    pub async fn list_events<S: Store>(
        store: &S,
        user: &UserContext,
        project_id: &Id,
        config_id: Option<&Id>,
    ) -> Result<Vec<AuditEvent>> {
        let access = ProjectAccess::load(store, user, project_id).await?;
        access.require(user, Capability::Viewer, "reading events")?;
        Ok(store.list_events(&access.project.id, config_id).await?)
    }

    async fn reload_details<S: Store>(store: &S, config_id: &Id) -> Result<ConfigDetails> {
        let config = store
            .get_config(config_id)
            .await?
            .ok_or_else(|| ConfigError::not_found(format!("config {}", config_id)))?;
        Self::details(store, config).await
    }

    async fn details<S: Store>(store: &S, config: Config) -> Result<ConfigDetails> {
        let variants = store.list_variants(&config.id).await?;
        let members = ConfigMembers::from_memberships(
            &store
                .list_memberships(&MembershipScope::Config(config.id.clone()))
                .await?,
        );
        Ok(ConfigDetails {
            config,
            variants,
            members,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::WorkflowConfig;
    use crate::logic::test_support::{value_proposal, variant_in, Fixture};
    use crate::model::{Condition, CredentialScope, EnvironmentSeed, EventPayload, Override};
    use crate::store::{ConfigStore, EventStore, VariantStore};
    use serde_json::json;
    use std::collections::HashMap;

    fn direct(variant: &ConfigVariant, base_version: i64, value: serde_json::Value) -> UpdateConfig {
        UpdateConfig {
            base_config_version: 1,
            changes: value_proposal(variant, base_version, value).changes,
        }
    }

    #[tokio::test]
    async fn test_create_config_seeds_every_environment() {
        let fx = Fixture::new().await;
        let mut seeds = HashMap::new();
        seeds.insert(
            fx.production.id.clone(),
            EnvironmentSeed {
                value: json!(10),
                schema: None,
                overrides: vec![],
            },
        );
        let details = ConfigOperations::create_config(
            &fx.store,
            &fx.editor,
            &fx.project.id,
            NewConfig {
                name: "max_items".to_string(),
                description: "Cart limit".to_string(),
                value: json!(5),
                schema: Some(json!({"type": "integer", "minimum": 1})),
                overrides: vec![],
                members: Default::default(),
                environment_variants: seeds,
            },
        )
        .await
        .unwrap();

        assert_eq!(details.variants.len(), 3);
        assert!(details.variants.iter().all(|v| v.version == 1));
        assert_eq!(details.base_variant().unwrap().value, json!(5));
        assert_eq!(variant_in(&details, &fx.staging).value, json!(5));
        assert_eq!(variant_in(&details, &fx.production).value, json!(10));
        assert_eq!(details.members.maintainers, vec!["editor@acme.io"]);
    }

    #[tokio::test]
    async fn test_create_config_rejects_bad_input() {
        let fx = Fixture::new().await;
        fx.create_flag("flag_x").await;

        let request = |name: &str, value: serde_json::Value| NewConfig {
            name: name.to_string(),
            description: String::new(),
            value,
            schema: Some(json!({"type": "boolean"})),
            overrides: vec![],
            members: Default::default(),
            environment_variants: HashMap::new(),
        };

        let duplicate =
            ConfigOperations::create_config(&fx.store, &fx.editor, &fx.project.id, request("flag_x", json!(true))).await;
        assert!(matches!(duplicate, Err(ConfigError::DuplicateName(name)) if name == "flag_x"));

        let bad_name =
            ConfigOperations::create_config(&fx.store, &fx.editor, &fx.project.id, request("1flag", json!(true))).await;
        assert!(matches!(bad_name, Err(ConfigError::Validation { .. })));

        let bad_value =
            ConfigOperations::create_config(&fx.store, &fx.editor, &fx.project.id, request("flag_y", json!("on"))).await;
        assert!(matches!(bad_value, Err(ConfigError::Validation { .. })));

        let by_viewer =
            ConfigOperations::create_config(&fx.store, &fx.viewer, &fx.project.id, request("flag_z", json!(true))).await;
        assert!(matches!(by_viewer, Err(ConfigError::Forbidden { .. })));

        assert_eq!(fx.store.list_configs(&fx.project.id).await.unwrap().len(), 1);
    }

    #[tokio::test]
    async fn test_create_config_enforces_full_json_schema() {
        let fx = Fixture::new().await;
        let request = |name: &str, schema: serde_json::Value, value: serde_json::Value| NewConfig {
            name: name.to_string(),
            description: String::new(),
            value,
            schema: Some(schema),
            overrides: vec![],
            members: Default::default(),
            environment_variants: HashMap::new(),
        };

        let pattern = json!({"type": "string", "pattern": "^[A-Z]{2}$"});
        let bad_code = ConfigOperations::create_config(
            &fx.store,
            &fx.editor,
            &fx.project.id,
            request("country", pattern.clone(), json!("not-a-code")),
        )
        .await;
        assert!(matches!(bad_code, Err(ConfigError::Validation { .. })));

        let unique = json!({"type": "array", "uniqueItems": true});
        let repeated = ConfigOperations::create_config(
            &fx.store,
            &fx.editor,
            &fx.project.id,
            request("tags", unique, json!(["a", "a"])),
        )
        .await;
        match repeated {
            Err(ConfigError::Validation { violations, .. }) => {
                assert!(violations.iter().any(|v| v.path == "/value"));
            }
            other => panic!("Expected validation error, got {:?}", other),
        }
        assert!(fx.store.list_configs(&fx.project.id).await.unwrap().is_empty());

        ConfigOperations::create_config(
            &fx.store,
            &fx.editor,
            &fx.project.id,
            request("country", pattern, json!("SE")),
        )
        .await
        .unwrap();
    }

    #[tokio::test]
    async fn test_resolve_uses_environment_overrides() {
        let fx = Fixture::new().await;
        let details = fx.create_flag("flag_x").await;
        let production = variant_in(&details, &fx.production);

        let mut update = direct(production, 1, json!({"enabled": false}));
        update.changes.variants[0].value = None;
        update.changes.variants[0].overrides = Some(vec![Override {
            name: "eu".to_string(),
            condition: Condition::equals("region", "EU"),
            value: json!({"enabled": true}),
        }]);
        ConfigOperations::update_config(&fx.store, &fx.maintainer, &details.config.id, update)
            .await
            .unwrap();

        let mut eu = EvaluationContext::new();
        eu.insert("region".to_string(), json!("EU"));
        let resolution = ConfigOperations::resolve_config(
            &fx.store,
            &fx.viewer,
            &fx.project.id,
            "flag_x",
            Some("production"),
            &eu,
        )
        .await
        .unwrap();
        assert_eq!(resolution.value, json!({"enabled": true}));
        assert_eq!(resolution.matched_override.as_deref(), Some("eu"));
        assert_eq!(resolution.version, 2);

        // Staging and the base definition carry no overrides
        for environment in [Some("staging"), None] {
            let resolution = ConfigOperations::resolve_config(
                &fx.store,
                &fx.viewer,
                &fx.project.id,
                "flag_x",
                environment,
                &eu,
            )
            .await
            .unwrap();
            assert_eq!(resolution.value, json!({"enabled": false}));
            assert_eq!(resolution.matched_override, None);
        }

        let unknown = ConfigOperations::resolve_config(
            &fx.store,
            &fx.viewer,
            &fx.project.id,
            "flag_x",
            Some("qa"),
            &eu,
        )
        .await;
        assert!(matches!(unknown, Err(ConfigError::NotFound(_))));
    }

    #[tokio::test]
    async fn test_direct_update_requires_bypass() {
        let fx = Fixture::new().await;
        let details = fx.create_flag("flag_x").await;
        let production = variant_in(&details, &fx.production);

        let by_editor = ConfigOperations::update_config(
            &fx.store,
            &fx.editor,
            &details.config.id,
            direct(production, 1, json!({"enabled": true})),
        )
        .await;
        assert!(matches!(by_editor, Err(ConfigError::Forbidden { .. })));

        let updated = ConfigOperations::update_config(
            &fx.store,
            &fx.maintainer,
            &details.config.id,
            direct(production, 1, json!({"enabled": true})),
        )
        .await
        .unwrap();
        let production = variant_in(&updated, &fx.production);
        assert_eq!(production.version, 2);
        assert_eq!(production.value, json!({"enabled": true}));

        let stale = ConfigOperations::update_config(
            &fx.store,
            &fx.maintainer,
            &details.config.id,
            direct(production, 1, json!({"enabled": false})),
        )
        .await;
        assert!(matches!(
            stale,
            Err(ConfigError::VersionConflict {
                expected: 1,
                current: Some(2),
                ..
            })
        ));
    }

    #[tokio::test]
    async fn test_unchanged_metadata_keeps_config_version() {
        let fx = Fixture::new().await;
        let details = fx.create_flag("flag_x").await;
        let production = variant_in(&details, &fx.production);

        let mut update = direct(production, 1, json!({"enabled": true}));
        update.changes.description = Some(details.config.description.clone());
        update.changes.members = Some(details.members.clone());
        let updated = ConfigOperations::update_config(&fx.store, &fx.maintainer, &details.config.id, update)
            .await
            .unwrap();
        assert_eq!(updated.config.version, 1);
        assert_eq!(variant_in(&updated, &fx.production).version, 2);

        let mut renamed = direct(variant_in(&updated, &fx.production), 2, json!({"enabled": false}));
        renamed.changes.description = Some("Checkout flag".to_string());
        let updated = ConfigOperations::update_config(&fx.store, &fx.maintainer, &details.config.id, renamed)
            .await
            .unwrap();
        assert_eq!(updated.config.version, 2);
        assert_eq!(updated.config.description, "Checkout flag");
    }

    #[tokio::test]
    async fn test_projects_requiring_proposals_only_let_credentials_write() {
        let fx = Fixture::with_policy(WorkflowConfig {
            allow_self_approvals: false,
            require_proposals: true,
        })
        .await;
        let details = fx.create_flag("flag_x").await;
        let production = variant_in(&details, &fx.production);

        let by_maintainer = ConfigOperations::update_config(
            &fx.store,
            &fx.maintainer,
            &details.config.id,
            direct(production, 1, json!({"enabled": true})),
        )
        .await;
        assert!(matches!(by_maintainer, Err(ConfigError::Forbidden { .. })));

        let deploy_key = UserContext::new("deploy-key".to_string())
            .with_scope(CredentialScope::ProjectWrite(fx.project.id.clone()));
        ConfigOperations::update_config(
            &fx.store,
            &deploy_key,
            &details.config.id,
            direct(production, 1, json!({"enabled": true})),
        )
        .await
        .unwrap();
    }

    #[tokio::test]
    async fn test_restore_reapplies_old_state_as_new_version() {
        let fx = Fixture::new().await;
        let details = fx.create_flag("flag_x").await;
        let production = variant_in(&details, &fx.production).clone();

        ConfigOperations::update_config(
            &fx.store,
            &fx.maintainer,
            &details.config.id,
            direct(&production, 1, json!({"enabled": true})),
        )
        .await
        .unwrap();

        let restored = ConfigOperations::restore_version(
            &fx.store,
            &fx.maintainer,
            &details.config.id,
            &production.id,
            RestoreVersion {
                version: 1,
                base_version: 2,
            },
        )
        .await
        .unwrap();
        assert_eq!(restored.version, 3);
        assert_eq!(restored.value, json!({"enabled": false}));

        let revisions = ConfigOperations::list_revisions(&fx.store, &fx.viewer, &production.id)
            .await
            .unwrap();
        let versions: Vec<i64> = revisions.iter().map(|r| r.version).collect();
        assert_eq!(versions, vec![3, 2, 1]);

        let events = fx
            .store
            .list_events(&fx.project.id, Some(&details.config.id))
            .await
            .unwrap();
        let tail: Vec<&str> = events.iter().rev().take(2).map(|e| e.event_type.as_str()).collect();
        assert_eq!(tail, vec!["config_updated", "config_version_restored"]);
        assert!(events.iter().any(|e| matches!(
            e.payload,
            EventPayload::ConfigVersionRestored {
                restored_version: 1,
                new_version: 3,
                ..
            }
        )));

        let unchanged = ConfigOperations::restore_version(
            &fx.store,
            &fx.maintainer,
            &details.config.id,
            &production.id,
            RestoreVersion {
                version: 1,
                base_version: 3,
            },
        )
        .await;
        assert!(matches!(unchanged, Err(ConfigError::Validation { .. })));

        let stale = ConfigOperations::restore_version(
            &fx.store,
            &fx.maintainer,
            &details.config.id,
            &production.id,
            RestoreVersion {
                version: 2,
                base_version: 2,
            },
        )
        .await;
        assert!(matches!(stale, Err(ConfigError::VersionConflict { .. })));

        let missing = ConfigOperations::restore_version(
            &fx.store,
            &fx.maintainer,
            &details.config.id,
            &production.id,
            RestoreVersion {
                version: 42,
                base_version: 3,
            },
        )
        .await;
        assert!(matches!(missing, Err(ConfigError::NotFound(_))));
    }

    #[tokio::test]
    async fn test_restore_with_foreign_base_version_conflicts() {
        let fx = Fixture::new().await;
        let details = fx.create_flag("flag_x").await;
        let production = variant_in(&details, &fx.production).clone();

        ConfigOperations::update_config(
            &fx.store,
            &fx.maintainer,
            &details.config.id,
            direct(&production, 1, json!({"enabled": true})),
        )
        .await
        .unwrap();

        for base_version in [i64::MAX, i64::MIN, 0, 7] {
            let result = ConfigOperations::restore_version(
                &fx.store,
                &fx.maintainer,
                &details.config.id,
                &production.id,
                RestoreVersion {
                    version: 1,
                    base_version,
                },
            )
            .await;
            match result {
                Err(ConfigError::VersionConflict {
                    expected, current, ..
                }) => {
                    assert_eq!(expected, base_version);
                    assert_eq!(current, Some(2));
                }
                other => panic!("Expected version conflict, got {:?}", other),
            }
        }

        let current = fx.store.get_variant_by_id(&production.id).await.unwrap().unwrap();
        assert_eq!(current.version, 2);
        assert_eq!(current.value, json!({"enabled": true}));
    }

    #[tokio::test]
    async fn test_delete_config_removes_variants_and_frees_the_name() {
        let fx = Fixture::new().await;
        let details = fx.create_flag("flag_x").await;
        let production = variant_in(&details, &fx.production).clone();

        let by_editor = ConfigOperations::delete_config(&fx.store, &fx.editor, &details.config.id).await;
        assert!(matches!(by_editor, Err(ConfigError::Forbidden { .. })));

        ConfigOperations::delete_config(&fx.store, &fx.maintainer, &details.config.id)
            .await
            .unwrap();
        assert!(fx.store.get_config(&details.config.id).await.unwrap().is_none());
        assert!(fx.store.get_variant_by_id(&production.id).await.unwrap().is_none());

        let events = ConfigOperations::list_events(&fx.store, &fx.viewer, &fx.project.id, None)
            .await
            .unwrap();
        assert_eq!(events.last().map(|e| e.event_type.as_str()), Some("config_deleted"));

        fx.create_flag("flag_x").await;
    }
}
