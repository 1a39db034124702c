//! Vector clock for causal tracking of disseminated data.
//!
//! Each originator contributes one counter. A node's clock answers "what
//! have I seen from whom", and comparing two clocks tells the nodes which of
//! them should send data to the other during anti-entropy.
//!
//! # Examples
//!
//! ```
//! use gossip_core::{ClockOrdering, VectorClock};
//!
//! let mut a = VectorClock::new();
//! a.set_sequence_number_by_id("m1", 5);
//!
//! let mut b = VectorClock::new();
//! b.set_sequence_number_by_id("m1", 3);
//! b.set_sequence_number_by_id("m2", 9);
//!
//! // a leads on m1 but has never seen m2
//! assert_eq!(a.compare(&b, false), ClockOrdering::Conflict);
//! ```

use crate::member::Member;
use crate::protocol::codec::{
    put_bytes, put_number, DecodeError, EncodeError, Reader, WireDecode, WireEncode, FIELD_WIDTH,
};
use serde::{Deserialize, Serialize};

/// Result of comparing local causal state against incoming state.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ClockOrdering {
    /// Local state is behind: the incoming side has data we lack.
    Before,
    /// Local state is ahead: the incoming side is stale.
    After,
    /// Both sides have seen the same data.
    Equal,
    /// Each side has data the other lacks.
    Conflict,
}

impl ClockOrdering {
    /// Fold one per-record result into an accumulated result.
    ///
    /// `Equal` never overrides a divergence, and a divergence in the
    /// opposite direction of an earlier one becomes `Conflict`.
    pub fn fold(self, next: ClockOrdering) -> ClockOrdering {
        match (self, next) {
            (acc, ClockOrdering::Equal) => acc,
            (ClockOrdering::Equal, next) => next,
            (acc, next) if acc == next => acc,
            _ => ClockOrdering::Conflict,
        }
    }
}

/// Latest sequence number seen from one originator.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct VectorRecord {
    pub member_id: String,
    pub sequence_number: u64,
}

impl VectorRecord {
    pub fn new(member_id: impl Into<String>, sequence_number: u64) -> Self {
        Self {
            member_id: member_id.into(),
            sequence_number,
        }
    }
}

impl WireEncode for VectorRecord {
    fn encode_into(&self, out: &mut Vec<u8>) -> Result<(), EncodeError> {
        put_number(out, "sequence number", self.sequence_number, FIELD_WIDTH)?;
        put_bytes(out, "member id length", self.member_id.as_bytes())
    }
}

impl WireDecode for VectorRecord {
    fn decode_from(reader: &mut Reader<'_>) -> Result<Self, DecodeError> {
        let sequence_number = reader.number(FIELD_WIDTH)?;
        let member_id = reader.text()?.to_string();
        Ok(Self {
            member_id,
            sequence_number,
        })
    }
}

/// Per-originator counters, at most one record per member id.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct VectorClock {
    records: Vec<VectorRecord>,
}

impl VectorClock {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn find(&self, member_id: &str) -> Option<&VectorRecord> {
        self.records.iter().find(|r| r.member_id == member_id)
    }

    fn find_mut(&mut self, member_id: &str) -> Option<&mut VectorRecord> {
        self.records.iter_mut().find(|r| r.member_id == member_id)
    }

    /// Sequence number recorded for `member_id`, 0 if never seen.
    pub fn get(&self, member_id: &str) -> u64 {
        self.find(member_id).map(|r| r.sequence_number).unwrap_or(0)
    }

    /// Insert or overwrite the record for `member_id`.
    pub fn set_sequence_number_by_id(&mut self, member_id: &str, sequence_number: u64) -> &VectorRecord {
        match self.records.iter().position(|r| r.member_id == member_id) {
            Some(idx) => {
                self.records[idx].sequence_number = sequence_number;
                &self.records[idx]
            }
            None => {
                self.records.push(VectorRecord::new(member_id, sequence_number));
                &self.records[self.records.len() - 1]
            }
        }
    }

    /// Insert or overwrite the record for `member`.
    pub fn set_sequence_number_for_member(&mut self, member: &Member, sequence_number: u64) -> &VectorRecord {
        self.set_sequence_number_by_id(&member.member_id(), sequence_number)
    }

    /// Bump the counter for `member`, returning the new value.
    ///
    /// Returns `None` if the member has no record yet.
    pub fn increment_for_member(&mut self, member: &Member) -> Option<u64> {
        let record = self.find_mut(&member.member_id())?;
        record.sequence_number += 1;
        Some(record.sequence_number)
    }

    /// Compare a single incoming record without modifying this clock.
    pub fn compare_record(&self, record: &VectorRecord) -> ClockOrdering {
        match self.find(&record.member_id) {
            None => ClockOrdering::Before,
            Some(local) if local.sequence_number > record.sequence_number => ClockOrdering::After,
            Some(local) if local.sequence_number < record.sequence_number => ClockOrdering::Before,
            Some(_) => ClockOrdering::Equal,
        }
    }

    /// Compare a single incoming record and, when it is newer, adopt it.
    pub fn merge_record(&mut self, record: &VectorRecord) -> ClockOrdering {
        let ordering = self.compare_record(record);
        if ordering == ClockOrdering::Before {
            self.set_sequence_number_by_id(&record.member_id, record.sequence_number);
        }
        ordering
    }

    /// Compare a single record, merging it when `merge` is set.
    pub fn compare_with_record(&mut self, record: &VectorRecord, merge: bool) -> ClockOrdering {
        if merge {
            self.merge_record(record)
        } else {
            self.compare_record(record)
        }
    }

    /// Compare this whole clock against `other` without modifying it.
    ///
    /// A record present only locally counts as `After`, one present only in
    /// `other` as `Before`. Results are folded with [`ClockOrdering::fold`].
    pub fn compare_clock(&self, other: &VectorClock) -> ClockOrdering {
        let mut result = ClockOrdering::Equal;

        for local in &self.records {
            let next = match other.find(&local.member_id) {
                None => ClockOrdering::After,
                Some(theirs) => self.compare_record(theirs),
            };
            result = result.fold(next);
        }

        for theirs in &other.records {
            if self.find(&theirs.member_id).is_none() {
                result = result.fold(ClockOrdering::Before);
            }
        }

        result
    }

    /// Compare against `other`; when `merge` is set, adopt every newer or
    /// unknown record from `other` afterwards.
    pub fn compare(&mut self, other: &VectorClock, merge: bool) -> ClockOrdering {
        let result = self.compare_clock(other);
        if merge {
            for record in &other.records {
                self.merge_record(record);
            }
        }
        result
    }

    pub fn records(&self) -> impl Iterator<Item = &VectorRecord> {
        self.records.iter()
    }

    pub fn len(&self) -> usize {
        self.records.len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }
}

impl WireEncode for VectorClock {
    fn encode_into(&self, out: &mut Vec<u8>) -> Result<(), EncodeError> {
        // Reserved index field, always zero.
        put_number(out, "clock index", 0, FIELD_WIDTH)?;
        put_number(out, "clock size", self.records.len() as u64, FIELD_WIDTH)?;
        for record in &self.records {
            record.encode_into(out)?;
        }
        Ok(())
    }
}

impl WireDecode for VectorClock {
    fn decode_from(reader: &mut Reader<'_>) -> Result<Self, DecodeError> {
        let _index = reader.number(FIELD_WIDTH)?;
        let size = reader.number(FIELD_WIDTH)?;

        let mut clock = VectorClock::new();
        for _ in 0..size {
            let record = VectorRecord::decode_from(reader)?;
            // Keep the one-record-per-member invariant even for hostile input.
            clock.set_sequence_number_by_id(&record.member_id, record.sequence_number);
        }
        Ok(clock)
    }
}
