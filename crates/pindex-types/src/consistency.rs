//! Consistency levels accepted by `ConsistencyWait`.

use serde::{Deserialize, Serialize};

use crate::error::PIndexError;

/// How long a query caller is willing to wait for a partition to catch up.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ConsistencyLevel {
    /// Answer from whatever is currently visible
    #[default]
    None,
    /// Wait until the partition has applied at least the requested sequence
    AtPlus,
}

impl ConsistencyLevel {
    /// Parse the wire form; the empty string means no wait.
    pub fn parse(s: &str) -> Result<Self, PIndexError> {
        match s {
            "" => Ok(ConsistencyLevel::None),
            "at_plus" => Ok(ConsistencyLevel::AtPlus),
            other => Err(PIndexError::UnsupportedConsistencyLevel(other.to_string())),
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            ConsistencyLevel::None => "",
            ConsistencyLevel::AtPlus => "at_plus",
        }
    }
}

impl std::str::FromStr for ConsistencyLevel {
    type Err = PIndexError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::parse(s)
    }
}

impl std::fmt::Display for ConsistencyLevel {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ConsistencyLevel::None => write!(f, "none"),
            ConsistencyLevel::AtPlus => write!(f, "at_plus"),
        }
    }
}

/// Outcome of a successful consistency wait.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ConsistencyStatus {
    /// Visible sequence of the partition when the wait returned
    pub cur_seq: u64,
    /// Most recent rollback target seen on the partition during the wait (0 if none)
    pub rollback_tried_seq: u64,
}
