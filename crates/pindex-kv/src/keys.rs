//! Key encoding for the kv store.
//!
//! Every key starts with the partition: `{len:u16 BE}{partition}`. The
//! length prefix keeps partitions from bleeding into each other in scans
//! ("1" + "0abc" vs "10" + "abc").
//!
//! - data: `{partition prefix}{user key}`
//! - history: `{partition prefix}{op index:u64 BE}`
//! - seqs / checkpoints: the bare partition id

use crate::error::KvError;

/// Encode the partition prefix shared by data and history keys.
pub fn partition_prefix(partition: &str) -> Result<Vec<u8>, KvError> {
    let len = u16::try_from(partition.len()).map_err(|_| {
        KvError::Key(format!("partition id too long: {} bytes", partition.len()))
    })?;
    let mut buf = Vec::with_capacity(2 + partition.len());
    buf.extend_from_slice(&len.to_be_bytes());
    buf.extend_from_slice(partition.as_bytes());
    Ok(buf)
}

/// Split a prefixed key into (partition, rest).
pub fn split_partition(bytes: &[u8]) -> Result<(String, &[u8]), KvError> {
    if bytes.len() < 2 {
        return Err(KvError::Key(format!("key too short: {} bytes", bytes.len())));
    }
    let len = u16::from_be_bytes([bytes[0], bytes[1]]) as usize;
    let rest = &bytes[2..];
    if rest.len() < len {
        return Err(KvError::Key(format!(
            "partition length {} exceeds key length {}",
            len,
            rest.len()
        )));
    }
    let partition = std::str::from_utf8(&rest[..len])
        .map_err(|e| KvError::Key(format!("Invalid UTF-8 partition: {}", e)))?;
    Ok((partition.to_string(), &rest[len..]))
}

/// Key of a user entry in the data column family.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DataKey {
    pub partition: String,
    pub key: Vec<u8>,
}

impl DataKey {
    pub fn new(partition: impl Into<String>, key: impl Into<Vec<u8>>) -> Self {
        Self {
            partition: partition.into(),
            key: key.into(),
        }
    }

    pub fn to_bytes(&self) -> Result<Vec<u8>, KvError> {
        let mut buf = partition_prefix(&self.partition)?;
        buf.extend_from_slice(&self.key);
        Ok(buf)
    }

    pub fn from_bytes(bytes: &[u8]) -> Result<Self, KvError> {
        let (partition, key) = split_partition(bytes)?;
        Ok(Self {
            partition,
            key: key.to_vec(),
        })
    }
}

/// Key of an undo record in the history column family.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HistoryKey {
    pub partition: String,
    pub op: u64,
}

impl HistoryKey {
    pub fn new(partition: impl Into<String>, op: u64) -> Self {
        Self {
            partition: partition.into(),
            op,
        }
    }

    pub fn to_bytes(&self) -> Result<Vec<u8>, KvError> {
        let mut buf = partition_prefix(&self.partition)?;
        buf.extend_from_slice(&self.op.to_be_bytes());
        Ok(buf)
    }

    pub fn from_bytes(bytes: &[u8]) -> Result<Self, KvError> {
        let (partition, rest) = split_partition(bytes)?;
        let op: [u8; 8] = rest
            .try_into()
            .map_err(|_| KvError::Key(format!("history op index is {} bytes", rest.len())))?;
        Ok(Self {
            partition,
            op: u64::from_be_bytes(op),
        })
    }

    /// Last possible history key of the partition, for reverse seeks.
    pub fn partition_end(partition: &str) -> Result<Vec<u8>, KvError> {
        Self::new(partition, u64::MAX).to_bytes()
    }
}
