//! Errors raised while constructing core values.

/// Errors from the core data model.
#[derive(Debug, thiserror::Error)]
pub enum CoreError {
    /// Skill identifier is empty or contains characters unsafe for file names
    #[error("Invalid skill id: {0:?}")]
    InvalidSkillId(String),

    /// Snapshot version could not be decoded
    #[error("Invalid snapshot version: {0}")]
    InvalidVersion(#[from] ulid::DecodeError),

    /// Monotonic version generator overflowed within one millisecond
    #[error("Snapshot version overflow")]
    VersionOverflow,
}
