use itertools::Itertools;
use serde::{Deserialize, Serialize};

use crate::model::user_context::normalize_email;
use crate::model::{Capability, Id};

/// What a membership row is attached to
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(tag = "kind", content = "id", rename_all = "snake_case")]
pub enum MembershipScope {
    Project(Id),
    Config(Id),
}

/// Association between an email-identified user and a project or config
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Membership {
    pub scope: MembershipScope,
    pub email: String,
    pub role: Capability,
}

impl Membership {
    pub fn project(project_id: Id, email: &str, role: Capability) -> Self {
        Self {
            scope: MembershipScope::Project(project_id),
            email: normalize_email(email),
            role,
        }
    }

    pub fn config(config_id: Id, email: &str, role: Capability) -> Self {
        Self {
            scope: MembershipScope::Config(config_id),
            email: normalize_email(email),
            role,
        }
    }
}

/// Config-level member lists as they are edited and proposed
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ConfigMembers {
    #[serde(default)]
    pub maintainers: Vec<String>,
    #[serde(default)]
    pub editors: Vec<String>,
}

impl ConfigMembers {
    /// Normalized form: lowercase, deduplicated, sorted; a maintainer is never also listed as editor.
    pub fn normalized(&self) -> Self {
        let maintainers: Vec<String> = self
            .maintainers
            .iter()
            .map(|e| normalize_email(e))
            .filter(|e| !e.is_empty())
            .sorted()
            .dedup()
            .collect();
        let editors = self
            .editors
            .iter()
            .map(|e| normalize_email(e))
            .filter(|e| !e.is_empty() && !maintainers.contains(e))
            .sorted()
            .dedup()
            .collect();
        Self {
            maintainers,
            editors,
        }
    }

    pub fn from_memberships(memberships: &[Membership]) -> Self {
        let mut members = ConfigMembers::default();
        for m in memberships {
            match m.role {
                Capability::Maintainer => members.maintainers.push(m.email.clone()),
                Capability::Editor => members.editors.push(m.email.clone()),
                Capability::Viewer => {}
            }
        }
        members.normalized()
    }

    pub fn to_memberships(&self, config_id: &Id) -> Vec<Membership> {
        let normalized = self.normalized();
        normalized
            .maintainers
            .iter()
            .map(|e| Membership::config(config_id.clone(), e, Capability::Maintainer))
            .chain(
                normalized
                    .editors
                    .iter()
                    .map(|e| Membership::config(config_id.clone(), e, Capability::Editor)),
            )
            .collect()
    }

    /// (email, role) pairs present in `after` but not in `self`, and vice versa
    pub fn diff(&self, after: &ConfigMembers) -> MembersDiff {
        let before = self.pairs();
        let after = after.pairs();
        MembersDiff {
            added: after.iter().filter(|p| !before.contains(p)).cloned().collect(),
            removed: before.iter().filter(|p| !after.contains(p)).cloned().collect(),
        }
    }

    fn pairs(&self) -> Vec<MemberEntry> {
        let normalized = self.normalized();
        normalized
            .maintainers
            .into_iter()
            .map(|email| MemberEntry {
                email,
                role: Capability::Maintainer,
            })
            .chain(normalized.editors.into_iter().map(|email| MemberEntry {
                email,
                role: Capability::Editor,
            }))
            .collect()
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MemberEntry {
    pub email: String,
    pub role: Capability,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct MembersDiff {
    pub added: Vec<MemberEntry>,
    pub removed: Vec<MemberEntry>,
}

impl MembersDiff {
    pub fn is_empty(&self) -> bool {
        self.added.is_empty() && self.removed.is_empty()
    }
}
