use std::fmt;

use serde::{Deserialize, Serialize};

/// Identifier of a synthetic program point inserted immediately before an
/// original statement.
///
/// Ids are dense from 1 upward, assigned in source order during the rewrite,
/// and unique per compiled unit.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct CheckpointId(u32);

impl CheckpointId {
    #[must_use]
    pub const fn from_raw(raw: u32) -> Self {
        Self(raw)
    }

    #[must_use]
    pub const fn raw(self) -> u32 {
        self.0
    }
}

impl fmt::Display for CheckpointId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}
