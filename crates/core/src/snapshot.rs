//! Configuration snapshot metadata.

use crate::{SkillId, SnapshotVersion, Time};
use serde::{Deserialize, Serialize};

/// An immutable copy of a configuration document, taken before a mutation.
///
/// The raw bytes live in the snapshot store; this is the metadata marker.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ConfigSnapshot {
    /// Skill whose configuration was copied
    pub skill_id: SkillId,

    /// Monotonic version
    pub version: SnapshotVersion,

    /// When the copy was taken
    pub created_at: Time,

    /// Size of the copied document
    pub size_bytes: u64,
}
