//! Newtype wrappers for identifiers to ensure type safety.

use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use std::fmt;
use uuid::Uuid;

use crate::error::CoreError;

/// Maximum length of a caller-supplied run id.
const MAX_RUN_ID_LEN: usize = 128;

/// Number of hex characters kept from the effect id digest.
const EFFECT_ID_LEN: usize = 32;

/// Identity of one pipeline run.
///
/// Run ids become path components in the persisted state layout, so
/// caller-supplied ids are restricted to `[A-Za-z0-9._-]`.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct RunId(String);

impl RunId {
    /// Create a RunId from a caller-supplied string, validating its format.
    pub fn parse(id: impl Into<String>) -> Result<Self, CoreError> {
        let id = id.into();
        let valid_chars = id
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || matches!(c, '.' | '_' | '-'));

        if id.is_empty() || id.len() > MAX_RUN_ID_LEN || !valid_chars || id == "." || id == ".." {
            return Err(CoreError::InvalidRunId(id));
        }
        Ok(Self(id))
    }

    /// Generate a new random RunId.
    pub fn generate() -> Self {
        Self(Uuid::new_v4().to_string())
    }

    /// Get the inner string reference.
    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// Consume and return the inner string.
    pub fn into_inner(self) -> String {
        self.0
    }
}

impl fmt::Display for RunId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Deterministic identity of one task invocation within one run.
///
/// Used as the persistence key for resume and idempotency.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct EffectId(String);

impl EffectId {
    /// Derive the effect id for the task at `index` named `task_name` in `run_id`.
    pub fn derive(run_id: &RunId, index: usize, task_name: &str) -> Self {
        let mut hasher = Sha256::new();
        hasher.update(run_id.as_str().as_bytes());
        hasher.update([0u8]);
        hasher.update(index.to_string().as_bytes());
        hasher.update([0u8]);
        hasher.update(task_name.as_bytes());

        let mut digest = hex::encode(hasher.finalize());
        digest.truncate(EFFECT_ID_LEN);
        Self(digest)
    }

    /// Wrap an already-derived effect id (e.g. read back from storage).
    pub fn from_stored(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    /// Get the inner string reference.
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for EffectId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_run_id_generate() {
        let id1 = RunId::generate();
        let id2 = RunId::generate();
        assert_ne!(id1, id2);
    }

    #[test]
    fn test_run_id_parse_rejects_path_components() {
        assert!(RunId::parse("release-2024.01_a").is_ok());
        assert!(RunId::parse("").is_err());
        assert!(RunId::parse("..").is_err());
        assert!(RunId::parse("a/b").is_err());
        assert!(RunId::parse("x".repeat(129)).is_err());
    }

    #[test]
    fn test_effect_id_is_deterministic() {
        let run = RunId::parse("run-1").unwrap();
        let a = EffectId::derive(&run, 3, "code-signing");
        let b = EffectId::derive(&run, 3, "code-signing");
        assert_eq!(a, b);
        assert_eq!(a.as_str().len(), 32);
        assert!(a.as_str().chars().all(|c| c.is_ascii_hexdigit()));
    }

    #[test]
    fn test_effect_id_distinguishes_position_name_and_run() {
        let run = RunId::parse("run-1").unwrap();
        let other = RunId::parse("run-2").unwrap();
        let base = EffectId::derive(&run, 1, "a");

        assert_ne!(base, EffectId::derive(&run, 2, "a"));
        assert_ne!(base, EffectId::derive(&run, 1, "b"));
        assert_ne!(base, EffectId::derive(&other, 1, "a"));
        // The separator keeps "1"+"1a" apart from "11"+"a".
        assert_ne!(
            EffectId::derive(&run, 1, "1a"),
            EffectId::derive(&run, 11, "a")
        );
    }
}
