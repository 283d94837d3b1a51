//! Per-partition checkpoint: the opaque blob plus the last applied sequence.
//!
//! The opaque bytes are meaningless to the core; a backend stores them for
//! the feed producer (e.g. failover-log cursors) and must persist them in
//! the same atomic write as `last_seq`.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::error::PIndexError;

/// Checkpoint returned by `GetOpaque`.
///
/// `Checkpoint::default()` is the "no checkpoint" value: empty opaque and
/// sequence 0.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Checkpoint {
    /// Backend/feed-defined resumption state
    #[serde(default)]
    pub opaque: Vec<u8>,

    /// Last sequence applied when the opaque was stored
    #[serde(default)]
    pub last_seq: u64,

    /// When the checkpoint was written (milliseconds since epoch in JSON)
    #[serde(default, with = "chrono::serde::ts_milliseconds_option")]
    pub updated_at: Option<DateTime<Utc>>,
}

impl Checkpoint {
    /// Create a checkpoint stamped with the current time.
    pub fn new(opaque: impl Into<Vec<u8>>, last_seq: u64) -> Self {
        Self {
            opaque: opaque.into(),
            last_seq,
            updated_at: Some(Utc::now()),
        }
    }

    /// True when nothing has ever been checkpointed.
    pub fn is_empty(&self) -> bool {
        self.opaque.is_empty() && self.last_seq == 0
    }

    /// Clamp the sequence after a rollback, keeping the opaque.
    pub fn clamp_to(&mut self, seq: u64) {
        if self.last_seq > seq {
            self.last_seq = seq;
            self.updated_at = Some(Utc::now());
        }
    }

    /// Serialize to JSON bytes for storage
    pub fn to_bytes(&self) -> Result<Vec<u8>, PIndexError> {
        serde_json::to_vec(self).map_err(PIndexError::from)
    }

    /// Deserialize from JSON bytes
    pub fn from_bytes(bytes: &[u8]) -> Result<Self, PIndexError> {
        serde_json::from_slice(bytes).map_err(PIndexError::from)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_is_empty() {
        let cp = Checkpoint::default();
        assert!(cp.is_empty());
        assert_eq!(cp.last_seq, 0);
        assert!(cp.updated_at.is_none());
    }

    #[test]
    fn test_new_is_not_empty() {
        let cp = Checkpoint::new(b"cursor".to_vec(), 0);
        assert!(!cp.is_empty());
        assert!(cp.updated_at.is_some());
    }

    #[test]
    fn test_clamp_only_lowers() {
        let mut cp = Checkpoint::new(b"x".to_vec(), 40);
        cp.clamp_to(50);
        assert_eq!(cp.last_seq, 40);
        cp.clamp_to(10);
        assert_eq!(cp.last_seq, 10);
        assert_eq!(cp.opaque, b"x".to_vec());
    }

    #[test]
    fn test_json_keeps_opaque_and_seq_together() {
        let cp = Checkpoint::new(vec![1, 2, 3], 42);
        let decoded = Checkpoint::from_bytes(&cp.to_bytes().unwrap()).unwrap();
        assert_eq!(decoded.opaque, vec![1, 2, 3]);
        assert_eq!(decoded.last_seq, 42);
        assert_eq!(
            decoded.updated_at.map(|t| t.timestamp_millis()),
            cp.updated_at.map(|t| t.timestamp_millis())
        );
    }

    #[test]
    fn test_missing_fields_decode_to_default() {
        let decoded = Checkpoint::from_bytes(b"{}").unwrap();
        assert!(decoded.is_empty());
    }
}
