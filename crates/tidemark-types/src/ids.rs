use std::fmt;

use serde::{Deserialize, Serialize};

/// Caller-chosen identifier for an event stream.
///
/// Stream ids are opaque, non-empty strings naming a single entity's event
/// sequence (e.g. `"order-7421"`, `"account-checking-993"`). A stream id is
/// only unique within its [`Partition`].
#[derive(Clone, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct StreamId(String);

impl StreamId {
    /// Create a new stream id from a string.
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    /// The string representation of this stream id.
    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// Returns `true` if the id is the empty string (structurally invalid).
    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
}

impl fmt::Display for StreamId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl From<&str> for StreamId {
    fn from(s: &str) -> Self {
        Self::new(s)
    }
}

impl From<String> for StreamId {
    fn from(s: String) -> Self {
        Self(s)
    }
}

/// Tenancy tag isolating streams, snapshots, and stream-heads from one
/// another within the same physical store.
///
/// Every persistence handle is scoped to exactly one partition at
/// construction time; all of its reads and mutations are implicitly
/// prefixed by it. The `"default"` sentinel is used when no partition is
/// configured and is not otherwise special.
#[derive(Clone, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct Partition(String);

impl Partition {
    /// The sentinel partition name used when none is configured.
    pub const DEFAULT: &'static str = "default";

    /// Create a partition tag from a string.
    pub fn new(name: impl Into<String>) -> Self {
        Self(name.into())
    }

    /// The string representation of this partition tag.
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl Default for Partition {
    fn default() -> Self {
        Self(Self::DEFAULT.to_string())
    }
}

impl fmt::Display for Partition {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl From<&str> for Partition {
    fn from(s: &str) -> Self {
        Self::new(s)
    }
}

/// Globally unique identifier for a commit (UUID v7 for time-ordering).
///
/// The commit id is the idempotence key of the write path: resubmitting an
/// attempt with a commit id the backend has already persisted for the same
/// stream is classified as a duplicate, not a new commit.
#[derive(Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct CommitId(uuid::Uuid);

impl CommitId {
    /// Generate a new time-ordered commit id (UUID v7).
    pub fn new() -> Self {
        Self(uuid::Uuid::now_v7())
    }

    /// Create from an existing UUID.
    pub fn from_uuid(uuid: uuid::Uuid) -> Self {
        Self(uuid)
    }

    /// The underlying UUID.
    pub fn as_uuid(&self) -> &uuid::Uuid {
        &self.0
    }

    /// Returns `true` for the all-zero UUID (structurally invalid).
    pub fn is_nil(&self) -> bool {
        self.0.is_nil()
    }

    /// Short representation (first 8 characters of the UUID).
    pub fn short_id(&self) -> String {
        self.0.to_string()[..8].to_string()
    }
}

impl Default for CommitId {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Debug for CommitId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "CommitId({})", self.short_id())
    }
}

impl fmt::Display for CommitId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}
