//! Task identifier.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use uuid::Uuid;

/// Globally unique 128-bit identifier correlating a result with its task.
///
/// Backed by a fixed-size [`Uuid`], so equality and hashing are plain
/// 16-byte comparisons. The courier never mints identifiers for real
/// tasks; it carries whatever the task source assigned and echoes it on
/// every retry.
///
/// # Examples
///
/// ```
/// use result_courier::TaskId;
///
/// let id: TaskId = "6f1c2a3b-0000-4000-8000-000000000001".parse().unwrap();
/// assert_eq!(id.to_string(), "6f1c2a3b-0000-4000-8000-000000000001");
/// assert_eq!(TaskId::from_bytes(*id.as_bytes()), id);
/// ```
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct TaskId(Uuid);

impl TaskId {
    /// Generates a random (v4) identifier.
    pub fn new_v4() -> Self {
        Self(Uuid::new_v4())
    }

    /// Builds an identifier from its 16 raw bytes.
    pub const fn from_bytes(bytes: [u8; 16]) -> Self {
        Self(Uuid::from_bytes(bytes))
    }

    /// Returns the 16 raw bytes.
    pub fn as_bytes(&self) -> &[u8; 16] {
        self.0.as_bytes()
    }

    /// Returns the identifier as a native 128-bit integer.
    pub fn as_u128(&self) -> u128 {
        self.0.as_u128()
    }

    /// Returns the underlying [`Uuid`].
    pub fn as_uuid(&self) -> &Uuid {
        &self.0
    }
}

impl From<Uuid> for TaskId {
    fn from(uuid: Uuid) -> Self {
        Self(uuid)
    }
}

impl From<TaskId> for Uuid {
    fn from(id: TaskId) -> Self {
        id.0
    }
}

impl FromStr for TaskId {
    type Err = uuid::Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Uuid::parse_str(s).map(Self)
    }
}

impl fmt::Display for TaskId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        // Hyphenated lowercase, the form the listening post keys results by.
        write!(f, "{}", self.0.hyphenated())
    }
}
