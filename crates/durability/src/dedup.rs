//! Snapshot deduplication.
//!
//! Full-state snapshots repeat the same record bodies many times (every task
//! of a job embeds the same configuration). `reduce` keeps the first
//! occurrence of each distinct body inline and replaces every later exact
//! duplicate with a back-reference to the index of that first occurrence.
//!
//! # Invariants
//!
//! - References only point backward (`target < index`), so `restore` is a
//!   single forward pass with no external dictionary.
//! - A reference always targets an inline record.
//! - Deduplication is exact: fingerprint hits are confirmed by comparing
//!   bytes, so a hash collision costs space, never correctness.

use replog_core::{Error, Result, SnapshotRecord, StateSnapshot};
use rustc_hash::FxHashMap;
use serde::{Deserialize, Serialize};
use xxhash_rust::xxh3::xxh3_128;

/// Body of a deduplicated record.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum DedupBody {
    /// Body stored in place
    Inline(Vec<u8>),
    /// Same body as the record at this earlier index
    Ref(u32),
}

/// One record of a deduplicated snapshot.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DedupRecord {
    /// Entity key, always kept
    pub key: String,
    /// Inline body or back-reference
    pub body: DedupBody,
}

/// Size-reduced, self-contained encoding of a [`StateSnapshot`].
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct DeduplicatedSnapshot {
    /// Records in original order
    pub records: Vec<DedupRecord>,
}

impl DeduplicatedSnapshot {
    /// Serialize for persistence as a snapshot payload.
    pub fn to_bytes(&self) -> Result<Vec<u8>> {
        Ok(bincode::serialize(self)?)
    }

    /// Deserialize a snapshot payload.
    pub fn from_bytes(bytes: &[u8]) -> Result<Self> {
        bincode::deserialize(bytes)
            .map_err(|e| Error::malformed_snapshot(format!("undecodable snapshot: {}", e)))
    }

    /// Space accounting for logging.
    pub fn stats(&self) -> DedupStats {
        let mut stats = DedupStats {
            records: self.records.len(),
            ..DedupStats::default()
        };
        for record in &self.records {
            match &record.body {
                DedupBody::Inline(_) => stats.unique_bodies += 1,
                DedupBody::Ref(target) => {
                    stats.references += 1;
                    if let Some(DedupRecord {
                        body: DedupBody::Inline(data),
                        ..
                    }) = self.records.get(*target as usize)
                    {
                        stats.bytes_saved += data.len();
                    }
                }
            }
        }
        stats
    }
}

/// Deduplication statistics.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct DedupStats {
    /// Total records
    pub records: usize,
    /// Records stored inline
    pub unique_bodies: usize,
    /// Records stored as back-references
    pub references: usize,
    /// Body bytes not written thanks to references
    pub bytes_saved: usize,
}

/// Lossless snapshot deduplicator.
#[derive(Debug, Clone, Copy, Default)]
pub struct SnapshotDeduplicator;

impl SnapshotDeduplicator {
    /// Create a deduplicator.
    pub fn new() -> Self {
        SnapshotDeduplicator
    }

    /// Replace duplicate record bodies with back-references.
    pub fn reduce(&self, snapshot: StateSnapshot) -> DeduplicatedSnapshot {
        let mut first_seen: FxHashMap<u128, u32> = FxHashMap::default();
        let mut records: Vec<DedupRecord> = Vec::with_capacity(snapshot.records.len());

        for record in snapshot.records {
            let index = records.len() as u32;
            let fingerprint = xxh3_128(&record.data);

            let duplicate_of = first_seen.get(&fingerprint).copied().filter(|&target| {
                matches!(
                    &records[target as usize].body,
                    DedupBody::Inline(existing) if *existing == record.data
                )
            });

            let body = match duplicate_of {
                Some(target) => DedupBody::Ref(target),
                None => {
                    first_seen.entry(fingerprint).or_insert(index);
                    DedupBody::Inline(record.data)
                }
            };
            records.push(DedupRecord {
                key: record.key,
                body,
            });
        }

        DeduplicatedSnapshot { records }
    }

    /// Resolve back-references, reproducing the original snapshot.
    ///
    /// Fails with `MalformedSnapshot` if a reference points to itself, forward,
    /// or outside the snapshot.
    pub fn restore(&self, reduced: DeduplicatedSnapshot) -> Result<StateSnapshot> {
        let count = reduced.records.len();
        let mut records: Vec<SnapshotRecord> = Vec::with_capacity(count);

        for (index, record) in reduced.records.into_iter().enumerate() {
            let data = match record.body {
                DedupBody::Inline(data) => data,
                DedupBody::Ref(target) => {
                    let target = target as usize;
                    if target >= count {
                        return Err(Error::malformed_snapshot(format!(
                            "record {} references record {} of {}: out of range",
                            index, target, count
                        )));
                    }
                    if target >= index {
                        return Err(Error::malformed_snapshot(format!(
                            "record {} references record {}: references must point backward",
                            index, target
                        )));
                    }
                    records[target].data.clone()
                }
            };
            records.push(SnapshotRecord {
                key: record.key,
                data,
            });
        }

        Ok(StateSnapshot { records })
    }
}
