//! Identifiers for tuned skills and configuration snapshots.

use crate::CoreError;
use serde::{Deserialize, Serialize};
use ulid::Ulid;

/// Identifier for a tuned skill.
///
/// Used as a file-name component by storage backends, so only ASCII
/// alphanumerics, `_`, `-` and `.` are accepted (and not a bare `.`/`..`).
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct SkillId(String);

impl SkillId {
    /// Create a validated skill id.
    pub fn new(id: impl Into<String>) -> Result<Self, CoreError> {
        let id = id.into();
        let valid = !id.is_empty()
            && id != "."
            && id != ".."
            && id.chars().all(|c| c.is_ascii_alphanumeric() || matches!(c, '_' | '-' | '.'));
        if valid {
            Ok(Self(id))
        } else {
            Err(CoreError::InvalidSkillId(id))
        }
    }

    /// Borrow as a string slice.
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl std::fmt::Display for SkillId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        self.0.fmt(f)
    }
}

impl std::str::FromStr for SkillId {
    type Err = CoreError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::new(s)
    }
}

impl TryFrom<String> for SkillId {
    type Error = CoreError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        Self::new(value)
    }
}

impl From<SkillId> for String {
    fn from(id: SkillId) -> Self {
        id.0
    }
}

/// Version of a configuration snapshot.
///
/// Backed by a ULID, so the textual form sorts lexicographically in
/// creation order.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct SnapshotVersion(Ulid);

impl SnapshotVersion {
    /// Generate the next version from a monotonic generator.
    ///
    /// Versions produced by the same generator are strictly increasing even
    /// within one millisecond.
    pub fn next(generator: &mut ulid::Generator) -> Result<Self, CoreError> {
        generator
            .generate()
            .map(Self)
            .map_err(|_| CoreError::VersionOverflow)
    }

    /// Creation time encoded in the version.
    pub fn datetime(&self) -> crate::Time {
        chrono::DateTime::<chrono::Utc>::from(self.0.datetime())
    }
}

impl std::fmt::Display for SnapshotVersion {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        self.0.fmt(f)
    }
}

impl std::str::FromStr for SnapshotVersion {
    type Err = CoreError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Ok(Self(s.parse()?))
    }
}
