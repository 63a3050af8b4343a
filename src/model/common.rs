use serde::{Deserialize, Serialize};
use std::fmt;
use uuid::Uuid;

pub type Id = String;

pub fn generate_id() -> Id {
    Uuid::new_v4().to_string()
}

/// Opaque revision token supplied by the document store with every read and
/// required, unmodified, on every write. The core never inspects its contents.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Revision(String);

impl Revision {
    pub fn new(token: impl Into<String>) -> Self {
        Self(token.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for Revision {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Generate a deterministic child document ID from a parent document and the
/// migration that derives the child. Re-running the same migration against the
/// same parent always yields the same ID, so a crashed run converges instead
/// of minting duplicates.
pub fn derived_child_id(parent_id: &Id, derivation: &str) -> Id {
    format!("{}:{}", parent_id, derivation)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_generate_id_is_unique() {
        assert_ne!(generate_id(), generate_id());
    }

    #[test]
    fn test_derived_child_id_is_stable() {
        let parent = "proj-1".to_string();
        assert_eq!(
            derived_child_id(&parent, "combustion-tests-to-installations"),
            derived_child_id(&parent, "combustion-tests-to-installations"),
        );
        assert_ne!(derived_child_id(&parent, "a"), derived_child_id(&parent, "b"));
    }
}
