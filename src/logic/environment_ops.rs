use log::info;
use std::collections::HashSet;

use crate::error::{ConfigError, Result};
use crate::logic::{ProjectAccess, WriteValidator};
use crate::model::{Capability, ConfigVariant, Environment, Id, UserContext};
use crate::store::Store;

pub struct EnvironmentOperations;

impl EnvironmentOperations {
    pub async fn list_environments<S: Store>(
        store: &S,
        user: &UserContext,
        project_id: &Id,
    ) -> Result<Vec<Environment>> {
        let access = ProjectAccess::load(store, user, project_id).await?;
        access.require(user, Capability::Viewer, "listing environments")?;
        Ok(store.list_environments(&access.project.id).await?)
    }

    /// Add an environment at the end of the order. Every config gets a variant
    /// at version 1: a verbatim copy of its variant in `copy_from`, or of its
    /// base definition.
    pub async fn create_environment<S: Store>(
        store: &S,
        user: &UserContext,
        project_id: &Id,
        name: &str,
        copy_from: Option<&Id>,
    ) -> Result<Environment> {
        let access = ProjectAccess::load(store, user, project_id).await?;
        access.require(user, Capability::Maintainer, "creating environments")?;
        WriteValidator::validate_name(name)?;

        let existing = store.list_environments(&access.project.id).await?;
        if existing.iter().any(|e| e.name == name) {
            return Err(ConfigError::DuplicateName(name.to_string()));
        }
        if let Some(source) = copy_from {
            if !existing.iter().any(|e| &e.id == source) {
                return Err(ConfigError::not_found(format!("environment {}", source)));
            }
        }

        let position = existing.iter().map(|e| e.position + 1).max().unwrap_or(0);
        let environment = Environment::new(access.project.id.clone(), name.to_string(), position);
        let author = Some(user.user_id.clone());

        let variants: Vec<ConfigVariant> = Self::template_variants(store, &access.project.id, copy_from)
            .await?
            .iter()
            .map(|template| template.copy_to_environment(environment.id.clone(), author.clone()))
            .collect();

        let seeded = variants.len();
        if !store.create_environment(environment.clone(), variants).await? {
            return Err(ConfigError::DuplicateName(name.to_string()));
        }
        info!(
            "environment {} created in project {} with {} variant(s)",
            environment.name, environment.project_id, seeded
        );
        Ok(environment)
    }

    /// Remove an environment with its variants and their history.
    /// A project always keeps at least one environment.
    pub async fn delete_environment<S: Store>(
        store: &S,
        user: &UserContext,
        project_id: &Id,
        environment_id: &Id,
    ) -> Result<()> {
        let access = ProjectAccess::load(store, user, project_id).await?;
        access.require(user, Capability::Maintainer, "deleting environments")?;

        let existing = store.list_environments(&access.project.id).await?;
        if !existing.iter().any(|e| &e.id == environment_id) {
            return Err(ConfigError::not_found(format!("environment {}", environment_id)));
        }
        if existing.len() == 1 {
            return Err(ConfigError::validation(
                "cannot delete the last environment of a project",
            ));
        }

        if !store.delete_environment(environment_id).await? {
            return Err(ConfigError::not_found(format!("environment {}", environment_id)));
        }
        info!("environment {} deleted from project {}", environment_id, project_id);
        Ok(())
    }

    /// `ordered_ids` must name every environment of the project exactly once
    pub async fn reorder_environments<S: Store>(
        store: &S,
        user: &UserContext,
        project_id: &Id,
        ordered_ids: &[Id],
    ) -> Result<Vec<Environment>> {
        let access = ProjectAccess::load(store, user, project_id).await?;
        access.require(user, Capability::Maintainer, "reordering environments")?;

        let current: Vec<Environment> = store.list_environments(&access.project.id).await?;
        let known: HashSet<&Id> = current.iter().map(|e| &e.id).collect();
        let requested: HashSet<&Id> = ordered_ids.iter().collect();
        if requested.len() != ordered_ids.len() || requested != known {
            return Err(ConfigError::validation(
                "the new order must list every environment of the project exactly once",
            ));
        }

        store
            .reorder_environments(&access.project.id, ordered_ids)
            .await?;
        info!("environments of project {} reordered", project_id);
        Ok(store.list_environments(&access.project.id).await?)
    }

    /// Per config, the variant a new environment starts from
    async fn template_variants<S: Store>(
        store: &S,
        project_id: &Id,
        copy_from: Option<&Id>,
    ) -> Result<Vec<ConfigVariant>> {
        let source_variants = match copy_from {
            Some(source) => store.list_variants_for_environment(source).await?,
            None => Vec::new(),
        };
        let mut templates = Vec::new();
        for config in store.list_configs(project_id).await? {
            match source_variants.iter().find(|v| v.config_id == config.id) {
                Some(variant) => templates.push(variant.clone()),
                None => templates.extend(store.get_variant(&config.id, None).await?),
            }
        }
        Ok(templates)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::logic::test_support::{value_proposal, variant_in, Fixture};
    use crate::logic::{ConfigOperations, UpdateConfig};
    use crate::store::VariantStore;
    use serde_json::json;

    #[tokio::test]
    async fn test_new_environment_copies_source_variants_at_version_one() {
        let fx = Fixture::new().await;
        let details = fx.create_flag("flag_x").await;
        let production = variant_in(&details, &fx.production);
        ConfigOperations::update_config(
            &fx.store,
            &fx.maintainer,
            &details.config.id,
            UpdateConfig {
                base_config_version: 1,
                changes: value_proposal(production, 1, json!({"enabled": true})).changes,
            },
        )
        .await
        .unwrap();

        let canary = EnvironmentOperations::create_environment(
            &fx.store,
            &fx.maintainer,
            &fx.project.id,
            "canary",
            Some(&fx.production.id),
        )
        .await
        .unwrap();
        assert_eq!(canary.position, 2);

        let copied = fx
            .store
            .get_variant(&details.config.id, Some(&canary.id))
            .await
            .unwrap()
            .unwrap();
        assert_eq!(copied.version, 1);
        assert_eq!(copied.value, json!({"enabled": true}));

        let blank = EnvironmentOperations::create_environment(
            &fx.store,
            &fx.maintainer,
            &fx.project.id,
            "qa",
            None,
        )
        .await
        .unwrap();
        let from_base = fx
            .store
            .get_variant(&details.config.id, Some(&blank.id))
            .await
            .unwrap()
            .unwrap();
        assert_eq!(from_base.value, json!({"enabled": false}));

        let names: Vec<String> = EnvironmentOperations::list_environments(&fx.store, &fx.viewer, &fx.project.id)
            .await
            .unwrap()
            .into_iter()
            .map(|e| e.name)
            .collect();
        assert_eq!(names, vec!["staging", "production", "canary", "qa"]);
    }

    #[tokio::test]
    async fn test_create_environment_rejects_duplicates_and_editors() {
        let fx = Fixture::new().await;
        let duplicate = EnvironmentOperations::create_environment(
            &fx.store,
            &fx.maintainer,
            &fx.project.id,
            "staging",
            None,
        )
        .await;
        assert!(matches!(duplicate, Err(ConfigError::DuplicateName(_))));

        let by_editor =
            EnvironmentOperations::create_environment(&fx.store, &fx.editor, &fx.project.id, "qa", None).await;
        assert!(matches!(by_editor, Err(ConfigError::Forbidden { .. })));

        let unknown_source = EnvironmentOperations::create_environment(
            &fx.store,
            &fx.maintainer,
            &fx.project.id,
            "qa",
            Some(&"missing".to_string()),
        )
        .await;
        assert!(matches!(unknown_source, Err(ConfigError::NotFound(_))));
    }

    #[tokio::test]
    async fn test_delete_environment_keeps_the_last_one() {
        let fx = Fixture::new().await;
        let details = fx.create_flag("flag_x").await;
        let staging_variant = variant_in(&details, &fx.staging).clone();

        EnvironmentOperations::delete_environment(&fx.store, &fx.maintainer, &fx.project.id, &fx.staging.id)
            .await
            .unwrap();
        assert!(fx
            .store
            .get_variant_by_id(&staging_variant.id)
            .await
            .unwrap()
            .is_none());

        let last = EnvironmentOperations::delete_environment(
            &fx.store,
            &fx.maintainer,
            &fx.project.id,
            &fx.production.id,
        )
        .await;
        assert!(matches!(last, Err(ConfigError::Validation { .. })));

        // Base and production variants survive
        let remaining = fx.store.list_variants(&details.config.id).await.unwrap();
        assert_eq!(remaining.len(), 2);
    }

    #[tokio::test]
    async fn test_reorder_requires_a_permutation() {
        let fx = Fixture::new().await;
        let reordered = EnvironmentOperations::reorder_environments(
            &fx.store,
            &fx.maintainer,
            &fx.project.id,
            &[fx.production.id.clone(), fx.staging.id.clone()],
        )
        .await
        .unwrap();
        let names: Vec<&str> = reordered.iter().map(|e| e.name.as_str()).collect();
        assert_eq!(names, vec!["production", "staging"]);

        for invalid in [
            vec![fx.production.id.clone()],
            vec![fx.production.id.clone(), fx.production.id.clone()],
            vec![fx.production.id.clone(), "other".to_string()],
        ] {
            let result =
                EnvironmentOperations::reorder_environments(&fx.store, &fx.maintainer, &fx.project.id, &invalid)
                    .await;
            assert!(matches!(result, Err(ConfigError::Validation { .. })));
        }
    }
}
