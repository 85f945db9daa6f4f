use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::model::{generate_id, Condition, Id};

/// Ordered, conditional value substitution
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Override {
    /// Human label, reported back when the override matches
    pub name: String,
    pub condition: Condition,
    pub value: Value,
}

/// The mutable part of a variant; what a change writes and what a revision snapshots
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct VariantState {
    pub value: Value,
    #[serde(default)]
    pub schema: Option<Value>,
    #[serde(default)]
    pub overrides: Vec<Override>,
}

/// One environment's materialized state of a config.
/// `environment_id == None` is the config's base definition.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ConfigVariant {
    pub id: Id,
    pub config_id: Id,
    pub environment_id: Option<Id>,
    pub value: Value,
    pub schema: Option<Value>,
    pub overrides: Vec<Override>,
    /// Starts at 1, increases by exactly 1 per applied change
    pub version: i64,
    pub updated_by: Option<String>,
    pub updated_at: DateTime<Utc>,
}

impl ConfigVariant {
    pub fn new(
        config_id: Id,
        environment_id: Option<Id>,
        state: VariantState,
        author: Option<String>,
    ) -> Self {
        Self {
            id: generate_id(),
            config_id,
            environment_id,
            value: state.value,
            schema: state.schema,
            overrides: state.overrides,
            version: 1,
            updated_by: author,
            updated_at: Utc::now(),
        }
    }

    pub fn is_base(&self) -> bool {
        self.environment_id.is_none()
    }

    pub fn state(&self) -> VariantState {
        VariantState {
            value: self.value.clone(),
            schema: self.schema.clone(),
            overrides: self.overrides.clone(),
        }
    }

    /// Verbatim copy of this variant's state for another environment, at version 1
    pub fn copy_to_environment(&self, environment_id: Id, author: Option<String>) -> Self {
        Self::new(
            self.config_id.clone(),
            Some(environment_id),
            self.state(),
            author,
        )
    }

    /// Apply a state after a successful version check
    pub fn apply_state(&mut self, state: VariantState, author: Option<String>) {
        self.value = state.value;
        self.schema = state.schema;
        self.overrides = state.overrides;
        self.version += 1;
        self.updated_by = author;
        self.updated_at = Utc::now();
    }
}

/// Result of evaluating a variant for a context
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Resolution {
    pub value: Value,
    /// Name of the override that produced `value`, if any
    pub matched_override: Option<String>,
    pub variant_id: Id,
    pub version: i64,
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_copy_to_environment_starts_at_version_one() {
        let mut base = ConfigVariant::new(
            "cfg".to_string(),
            None,
            VariantState {
                value: json!({"enabled": false}),
                schema: Some(json!({"type": "object"})),
                overrides: vec![Override {
                    name: "eu".to_string(),
                    condition: Condition::equals("region", "EU"),
                    value: json!({"enabled": true}),
                }],
            },
            Some("alice".to_string()),
        );
        base.apply_state(base.state(), None);
        assert_eq!(base.version, 2);

        let copy = base.copy_to_environment("env-prod".to_string(), Some("bob".to_string()));
        assert_eq!(copy.version, 1);
        assert_ne!(copy.id, base.id);
        assert_eq!(copy.environment_id.as_deref(), Some("env-prod"));
        assert_eq!(copy.state(), base.state());
    }
}
