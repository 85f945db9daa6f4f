use serde::{Deserialize, Serialize};

use crate::model::Id;

/// Role of the caller in the workspace that owns the project.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum WorkspaceRole {
    Owner,
    Admin,
    Member,
}

impl WorkspaceRole {
    pub fn parse(value: &str) -> Option<Self> {
        match value.trim().to_ascii_lowercase().as_str() {
            "owner" => Some(WorkspaceRole::Owner),
            "admin" => Some(WorkspaceRole::Admin),
            "member" => Some(WorkspaceRole::Member),
            _ => None,
        }
    }
}

/// Scope granted to an integration credential (API key)
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "scope", content = "project_id", rename_all = "snake_case")]
pub enum CredentialScope {
    ProjectRead(Id),
    ProjectWrite(Id),
}

impl CredentialScope {
    /// Parses `project_read:<id>` / `project_write:<id>`.
    pub fn parse(value: &str) -> Option<Self> {
        let (kind, project_id) = value.trim().split_once(':')?;
        if project_id.is_empty() {
            return None;
        }
        match kind {
            "project_read" => Some(CredentialScope::ProjectRead(project_id.to_string())),
            "project_write" => Some(CredentialScope::ProjectWrite(project_id.to_string())),
            _ => None,
        }
    }
}

/// Normalized caller identity handed to the core by the session resolver
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct UserContext {
    pub user_id: String,
    pub user_email: Option<String>,
    pub user_name: Option<String>,
    pub workspace_role: Option<WorkspaceRole>,
    #[serde(default)]
    pub credential_scopes: Vec<CredentialScope>,
}

impl UserContext {
    /// Create a new UserContext with just a user ID
    pub fn new(user_id: String) -> Self {
        Self {
            user_id,
            user_email: None,
            user_name: None,
            workspace_role: None,
            credential_scopes: Vec::new(),
        }
    }

    /// Create a UserContext with full user information
    pub fn with_details(user_id: String, email: Option<String>, name: Option<String>) -> Self {
        Self {
            user_id,
            user_email: email.map(|e| normalize_email(&e)),
            user_name: name,
            workspace_role: None,
            credential_scopes: Vec::new(),
        }
    }

    pub fn with_workspace_role(mut self, role: WorkspaceRole) -> Self {
        self.workspace_role = Some(role);
        self
    }

    pub fn with_scope(mut self, scope: CredentialScope) -> Self {
        self.credential_scopes.push(scope);
        self
    }

    /// Create a system user context for internal operations
    pub fn system() -> Self {
        Self {
            user_id: "system".to_string(),
            user_email: Some("system@oat-config.internal".to_string()),
            user_name: Some("System".to_string()),
            workspace_role: Some(WorkspaceRole::Owner),
            credential_scopes: Vec::new(),
        }
    }

    pub fn email(&self) -> Option<&str> {
        self.user_email.as_deref()
    }

    /// Whether this caller carries an integration credential that may write to the project
    pub fn has_project_write_scope(&self, project_id: &str) -> bool {
        self.credential_scopes
            .iter()
            .any(|scope| matches!(scope, CredentialScope::ProjectWrite(id) if id == project_id))
    }

    pub fn has_project_read_scope(&self, project_id: &str) -> bool {
        self.credential_scopes.iter().any(|scope| match scope {
            CredentialScope::ProjectRead(id) | CredentialScope::ProjectWrite(id) => id == project_id,
        })
    }
}

/// Emails identify members; compare them case-insensitively
pub fn normalize_email(email: &str) -> String {
    email.trim().to_lowercase()
}
