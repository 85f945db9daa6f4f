use serde::Serialize;
use thiserror::Error;

use crate::model::{Capability, Id, ProposalStatus};

/// What an optimistic version check was guarding
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "kind", content = "id", rename_all = "snake_case")]
pub enum ConflictTarget {
    Variant(Id),
    Config(Id),
}

impl std::fmt::Display for ConflictTarget {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ConflictTarget::Variant(id) => write!(f, "variant {}", id),
            ConflictTarget::Config(id) => write!(f, "config {}", id),
        }
    }
}

/// Single schema or structure violation, addressed by a JSON pointer
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Violation {
    pub path: String,
    pub message: String,
}

impl Violation {
    pub fn new(path: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            path: path.into(),
            message: message.into(),
        }
    }
}

impl std::fmt::Display for Violation {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        if self.path.is_empty() {
            write!(f, "{}", self.message)
        } else {
            write!(f, "{}: {}", self.path, self.message)
        }
    }
}

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("{0} not found")]
    NotFound(String),

    #[error("forbidden: {reason}")]
    Forbidden {
        reason: String,
        required: Option<Capability>,
    },

    #[error("validation failed: {message}")]
    Validation {
        message: String,
        violations: Vec<Violation>,
    },

    /// Retryable: refetch, recompute, resubmit
    #[error("version conflict on {target}: expected {expected}, current {current:?}")]
    VersionConflict {
        target: ConflictTarget,
        expected: i64,
        current: Option<i64>,
    },

    #[error("proposal {proposal_id} is already {status:?}")]
    InvalidState {
        proposal_id: Id,
        status: ProposalStatus,
    },

    #[error("name '{0}' is already taken")]
    DuplicateName(String),

    #[error(transparent)]
    Storage(#[from] anyhow::Error),
}

impl ConfigError {
    pub fn not_found(what: impl Into<String>) -> Self {
        ConfigError::NotFound(what.into())
    }

    pub fn forbidden(reason: impl Into<String>) -> Self {
        ConfigError::Forbidden {
            reason: reason.into(),
            required: None,
        }
    }

    pub fn requires(required: Capability, action: &str) -> Self {
        ConfigError::Forbidden {
            reason: format!("{} requires {} capability", action, required),
            required: Some(required),
        }
    }

    pub fn validation(message: impl Into<String>) -> Self {
        ConfigError::Validation {
            message: message.into(),
            violations: Vec::new(),
        }
    }

    pub fn violations(message: impl Into<String>, violations: Vec<Violation>) -> Self {
        ConfigError::Validation {
            message: message.into(),
            violations,
        }
    }

    /// Stable machine-readable kind, used by the HTTP layer
    pub fn kind(&self) -> &'static str {
        match self {
            ConfigError::NotFound(_) => "not_found",
            ConfigError::Forbidden { .. } => "forbidden",
            ConfigError::Validation { .. } => "validation_error",
            ConfigError::VersionConflict { .. } => "version_conflict",
            ConfigError::InvalidState { .. } => "invalid_state",
            ConfigError::DuplicateName(_) => "duplicate_name",
            ConfigError::Storage(_) => "storage_error",
        }
    }

    pub fn is_retryable(&self) -> bool {
        matches!(self, ConfigError::VersionConflict { .. })
    }
}

pub type Result<T, E = ConfigError> = std::result::Result<T, E>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_only_version_conflict_is_retryable() {
        let conflict = ConfigError::VersionConflict {
            target: ConflictTarget::Variant("v1".to_string()),
            expected: 1,
            current: Some(2),
        };
        assert!(conflict.is_retryable());
        assert_eq!(conflict.kind(), "version_conflict");
        assert!(conflict.to_string().contains("variant v1"));

        assert!(!ConfigError::not_found("config x").is_retryable());
        assert!(!ConfigError::validation("bad").is_retryable());
    }

    #[test]
    fn test_storage_errors_wrap_anyhow() {
        let err: ConfigError = anyhow::anyhow!("connection reset").into();
        assert_eq!(err.kind(), "storage_error");
        assert_eq!(err.to_string(), "connection reset");
    }
}
