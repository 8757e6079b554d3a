//! Topic to tracker routing.
//!
//! The owning tracker is a pure function of the stream id: SHA-256 of the
//! id, first eight bytes big-endian, modulo the tracker count. Partitions of
//! one stream always share a tracker.

use sha2::{Digest, Sha256};
use shared_types::{StreamPartId, TrackerRecord};

use crate::events::TrackerSyncError;

#[derive(Debug, Clone)]
pub struct TrackerRegistry {
    records: Vec<TrackerRecord>,
}

impl TrackerRegistry {
    pub fn new(records: Vec<TrackerRecord>) -> Result<Self, TrackerSyncError> {
        if records.is_empty() {
            return Err(TrackerSyncError::NoTrackers);
        }
        Ok(Self { records })
    }

    pub fn get_tracker(&self, stream_part_id: &StreamPartId) -> &TrackerRecord {
        &self.records[key_to_index(&stream_part_id.stream_id, self.records.len())]
    }

    pub fn get_all_trackers(&self) -> &[TrackerRecord] {
        &self.records
    }
}

fn key_to_index(key: &str, len: usize) -> usize {
    let digest = Sha256::digest(key.as_bytes());
    let mut prefix = [0u8; 8];
    prefix.copy_from_slice(&digest[..8]);
    (u64::from_be_bytes(prefix) % len as u64) as usize
}
