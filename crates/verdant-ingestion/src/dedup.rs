//! In-flight deduplication for a collection run.

use std::collections::HashMap;

use crate::models::CandidateRecord;

/// The deduplicated working set of one collection phase.
///
/// Keyed by `external_id`, at most one record per key. Re-inserting a key
/// replaces the stored record (last write wins) but keeps its original
/// position, so iteration order is stable across flushes and reloads and a
/// checkpoint offset always points at the same record.
#[derive(Debug, Default)]
pub struct CollectionSession {
    records: Vec<CandidateRecord>,
    index: HashMap<String, usize>,
}

/// What happened when a record was offered to the session.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Insert {
    New,
    Replaced,
}

impl CollectionSession {
    pub fn new() -> Self { Self::default() }

    /// Rebuild a session from cached records, collapsing any repeated keys.
    pub fn from_records(records: impl IntoIterator<Item = CandidateRecord>) -> Self {
        let mut session = Self::new();
        for r in records {
            session.insert(r);
        }
        session
    }

    pub fn insert(&mut self, record: CandidateRecord) -> Insert {
        match self.index.get(&record.external_id) {
            Some(&pos) => {
                self.records[pos] = record;
                Insert::Replaced
            }
            None => {
                self.index.insert(record.external_id.clone(), self.records.len());
                self.records.push(record);
                Insert::New
            }
        }
    }

    pub fn len(&self) -> usize { self.records.len() }

    pub fn is_empty(&self) -> bool { self.records.is_empty() }

    pub fn records(&self) -> &[CandidateRecord] { &self.records }
}
