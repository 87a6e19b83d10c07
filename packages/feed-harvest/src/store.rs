//! Per-run accumulation store.
//!
//! Records are keyed by [`IdentityKey`] and kept in admission order. The
//! first record seen for a key wins; later duplicates are refused even if
//! their other fields differ.

use indexmap::IndexMap;

use crate::types::record::{AcceptedRecord, CandidateRecord, IdentityKey};

/// Ordered, deduplicating, optionally capped record store.
///
/// Owned by exactly one run. Never shared across runs.
#[derive(Debug, Default)]
pub struct Accumulator {
    records: IndexMap<IdentityKey, AcceptedRecord>,
    cap: Option<usize>,
}

impl Accumulator {
    /// Unbounded store.
    pub fn new() -> Self {
        Self::default()
    }

    /// Store that refuses everything once `cap` records are held.
    pub fn with_cap(cap: usize) -> Self {
        Self {
            records: IndexMap::with_capacity(cap.min(256)),
            cap: Some(cap),
        }
    }

    /// Admit a candidate. Returns `false` when its key is already held or
    /// the store is full; the store is unchanged in that case.
    pub fn offer(&mut self, candidate: CandidateRecord) -> bool {
        if self.is_full() || self.records.contains_key(&candidate.identity_key) {
            return false;
        }
        let sequence = self.records.len();
        let key = candidate.identity_key.clone();
        self.records
            .insert(key, AcceptedRecord::admit(candidate, sequence));
        true
    }

    pub fn contains(&self, key: &IdentityKey) -> bool {
        self.records.contains_key(key)
    }

    pub fn len(&self) -> usize {
        self.records.len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }

    pub fn cap(&self) -> Option<usize> {
        self.cap
    }

    /// Whether the cap has been reached.
    pub fn is_full(&self) -> bool {
        self.cap.is_some_and(|cap| self.records.len() >= cap)
    }

    /// Copy of the current records in admission order.
    pub fn snapshot(&self) -> Vec<AcceptedRecord> {
        self.records.values().cloned().collect()
    }

    /// Consume the store, yielding records in admission order.
    pub fn into_records(self) -> Vec<AcceptedRecord> {
        self.records.into_values().collect()
    }
}
