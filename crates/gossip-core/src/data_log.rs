//! Anti-entropy log.
//!
//! Keeps the latest payload seen from each originator so it can be replayed
//! to a peer whose vector clock shows it is behind.

use crate::config::DATA_LOG_SIZE;
use crate::protocol::message::MessageBody;
use crate::vector_clock::VectorRecord;
use bytes::Bytes;

/// Latest payload from one originator.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DataLogRecord {
    pub version: VectorRecord,
    pub data: Bytes,
}

impl DataLogRecord {
    /// Rebuild the Data message body for replay.
    pub fn create_data_message(&self) -> MessageBody {
        MessageBody::Data {
            version: self.version.clone(),
            data: self.data.clone(),
        }
    }
}

/// Bounded ring of [`DataLogRecord`]s, one per originator.
///
/// When a new originator arrives at capacity, the oldest slot is
/// overwritten.
#[derive(Debug, Clone)]
pub struct DataLog {
    slots: Vec<DataLogRecord>,
    next_slot: usize,
    capacity: usize,
}

impl Default for DataLog {
    fn default() -> Self {
        Self::with_capacity(DATA_LOG_SIZE)
    }
}

impl DataLog {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_capacity(capacity: usize) -> Self {
        Self {
            slots: Vec::with_capacity(capacity),
            next_slot: 0,
            capacity: capacity.max(1),
        }
    }

    /// Store `data` as the latest payload of `version.member_id`.
    pub fn add_or_replace(&mut self, version: &VectorRecord, data: &Bytes) {
        if let Some(existing) = self
            .slots
            .iter_mut()
            .find(|r| r.version.member_id == version.member_id)
        {
            existing.version.sequence_number = version.sequence_number;
            existing.data = data.clone();
            return;
        }

        let record = DataLogRecord {
            version: version.clone(),
            data: data.clone(),
        };
        if self.slots.len() < self.capacity {
            self.slots.push(record);
        } else {
            self.slots[self.next_slot] = record;
            self.next_slot = (self.next_slot + 1) % self.capacity;
        }
    }

    pub fn get(&self, member_id: &str) -> Option<&DataLogRecord> {
        self.slots.iter().find(|r| r.version.member_id == member_id)
    }

    pub fn iter(&self) -> impl Iterator<Item = &DataLogRecord> {
        self.slots.iter()
    }

    pub fn len(&self) -> usize {
        self.slots.len()
    }

    pub fn is_empty(&self) -> bool {
        self.slots.is_empty()
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn record(id: &str, seq: u64) -> VectorRecord {
        VectorRecord::new(id, seq)
    }

    #[test]
    fn test_add_new_originator() {
        let mut log = DataLog::new();
        log.add_or_replace(&record("m1", 1), &Bytes::from_static(b"a"));
        assert_eq!(log.len(), 1);
        assert_eq!(log.get("m1").unwrap().data, Bytes::from_static(b"a"));
    }

    #[test]
    fn test_replace_same_originator() {
        let mut log = DataLog::new();
        log.add_or_replace(&record("m1", 1), &Bytes::from_static(b"a"));
        log.add_or_replace(&record("m2", 1), &Bytes::from_static(b"b"));
        log.add_or_replace(&record("m1", 2), &Bytes::from_static(b"c"));

        assert_eq!(log.len(), 2);
        let m1 = log.get("m1").unwrap();
        assert_eq!(m1.version.sequence_number, 2);
        assert_eq!(m1.data, Bytes::from_static(b"c"));
    }

    #[test]
    fn test_capacity_is_bounded() {
        let mut log = DataLog::new();
        for i in 0..30 {
            log.add_or_replace(&record(&format!("m{i}"), 1), &Bytes::from_static(b"x"));
        }
        assert_eq!(log.len(), DATA_LOG_SIZE);
    }

    #[test]
    fn test_ring_overwrites_oldest() {
        let mut log = DataLog::with_capacity(3);
        for id in ["a", "b", "c", "d", "e"] {
            log.add_or_replace(&record(id, 1), &Bytes::from_static(b"x"));
        }
        assert_eq!(log.len(), 3);
        assert!(log.get("a").is_none());
        assert!(log.get("b").is_none());
        for id in ["c", "d", "e"] {
            assert!(log.get(id).is_some());
        }
    }

    #[test]
    fn test_replace_at_capacity_does_not_evict() {
        let mut log = DataLog::with_capacity(2);
        log.add_or_replace(&record("a", 1), &Bytes::from_static(b"1"));
        log.add_or_replace(&record("b", 1), &Bytes::from_static(b"1"));
        log.add_or_replace(&record("a", 2), &Bytes::from_static(b"2"));

        assert_eq!(log.len(), 2);
        assert!(log.get("b").is_some());
        assert_eq!(log.get("a").unwrap().version.sequence_number, 2);
    }

    #[test]
    fn test_create_data_message() {
        let mut log = DataLog::new();
        log.add_or_replace(&record("m1", 4), &Bytes::from_static(b"payload"));

        let body = log.get("m1").unwrap().create_data_message();
        assert_eq!(
            body,
            MessageBody::Data {
                version: record("m1", 4),
                data: Bytes::from_static(b"payload"),
            }
        );
    }
}
