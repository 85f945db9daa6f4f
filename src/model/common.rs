use serde::{Deserialize, Deserializer, Serialize};
use uuid::Uuid;

pub type Id = String;

pub fn generate_id() -> Id {
    Uuid::new_v4().to_string()
}

/// Effective permission level a caller holds over a config or project.
/// Ordering is meaningful: `Viewer < Editor < Maintainer`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Capability {
    Viewer,
    Editor,
    Maintainer,
}

impl Capability {
    pub fn as_str(&self) -> &'static str {
        match self {
            Capability::Viewer => "viewer",
            Capability::Editor => "editor",
            Capability::Maintainer => "maintainer",
        }
    }

    pub fn parse(value: &str) -> Option<Self> {
        match value {
            "viewer" => Some(Capability::Viewer),
            "editor" => Some(Capability::Editor),
            "maintainer" => Some(Capability::Maintainer),
            _ => None,
        }
    }
}

impl std::fmt::Display for Capability {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Deserialize a field that distinguishes "absent" from "explicit null".
/// Use together with `#[serde(default)]` on an `Option<Option<T>>` field.
pub fn deserialize_some<'de, T, D>(deserializer: D) -> Result<Option<T>, D::Error>
where
    T: Deserialize<'de>,
    D: Deserializer<'de>,
{
    Deserialize::deserialize(deserializer).map(Some)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_capability_ordering() {
        assert!(Capability::Viewer < Capability::Editor);
        assert!(Capability::Editor < Capability::Maintainer);
        assert_eq!(
            [Capability::Editor, Capability::Maintainer, Capability::Viewer]
                .into_iter()
                .max(),
            Some(Capability::Maintainer)
        );
    }

    #[test]
    fn test_capability_round_trip_through_str() {
        for cap in [Capability::Viewer, Capability::Editor, Capability::Maintainer] {
            assert_eq!(Capability::parse(cap.as_str()), Some(cap));
        }
        assert_eq!(Capability::parse("owner"), None);
    }
}
