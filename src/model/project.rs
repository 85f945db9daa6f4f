use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::model::{generate_id, Id};

/// A project groups configs, environments and members, and carries the review policy.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Project {
    pub id: Id,
    pub name: String,
    pub description: Option<String>,
    /// When set, only privileged credentials may apply changes without a proposal
    pub require_proposals: bool,
    /// When unset, a proposer may never approve their own proposal
    pub allow_self_approvals: bool,
    pub created_at: DateTime<Utc>,
}

impl Project {
    pub fn new(name: String, description: Option<String>) -> Self {
        Self {
            id: generate_id(),
            name,
            description,
            require_proposals: false,
            allow_self_approvals: false,
            created_at: Utc::now(),
        }
    }
}

/// Input model for creating a project
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NewProject {
    pub name: String,
    pub description: Option<String>,
    pub require_proposals: Option<bool>,
    pub allow_self_approvals: Option<bool>,
    /// Environment names to create, in order
    #[serde(default)]
    pub environments: Vec<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Environment {
    pub id: Id,
    pub project_id: Id,
    pub name: String,
    /// Display order within the project, starting at 0
    pub position: i32,
    pub created_at: DateTime<Utc>,
}

impl Environment {
    pub fn new(project_id: Id, name: String, position: i32) -> Self {
        Self {
            id: generate_id(),
            project_id,
            name,
            position,
            created_at: Utc::now(),
        }
    }
}
