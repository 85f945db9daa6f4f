use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::HashMap;

use crate::model::{generate_id, ConfigMembers, ConfigVariant, Id, Override};

/// A named dynamic configuration value within a project
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Config {
    pub id: Id,
    pub project_id: Id,
    /// Unique within the project
    pub name: String,
    pub description: String,
    pub created_by: String,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    /// Version of the metadata (description, members); variants carry their own versions
    pub version: i64,
}

impl Config {
    pub fn new(project_id: Id, name: String, description: String, created_by: String) -> Self {
        let now = Utc::now();
        Self {
            id: generate_id(),
            project_id,
            name,
            description,
            created_by,
            created_at: now,
            updated_at: now,
            version: 1,
        }
    }
}

/// Input model for creating a config
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NewConfig {
    pub name: String,
    #[serde(default)]
    pub description: String,
    pub value: Value,
    #[serde(default)]
    pub schema: Option<Value>,
    #[serde(default)]
    pub overrides: Vec<Override>,
    #[serde(default)]
    pub members: ConfigMembers,
    /// Optional per-environment seeds keyed by environment id
    #[serde(default)]
    pub environment_variants: HashMap<Id, EnvironmentSeed>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EnvironmentSeed {
    pub value: Value,
    #[serde(default)]
    pub schema: Option<Value>,
    #[serde(default)]
    pub overrides: Vec<Override>,
}

/// A config together with its variants and members
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ConfigDetails {
    pub config: Config,
    pub variants: Vec<ConfigVariant>,
    pub members: ConfigMembers,
}

impl ConfigDetails {
    pub fn base_variant(&self) -> Option<&ConfigVariant> {
        self.variants.iter().find(|v| v.is_base())
    }
}
