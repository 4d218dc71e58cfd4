//! Partial databases built by one partition of the corpus
//!
//! Every partition fills its own [`PartialDatabase`] without any shared
//! state. Partials are merged by concatenating the occurrence lists of each
//! hash and unioning the lookups; since sequence ids are globally unique,
//! the merged content does not depend on how the corpus was partitioned once
//! the occurrence lists are sorted.

use std::collections::BTreeMap;

use ahash::AHashMap;

use crate::builder::parse::SequenceRecord;
use crate::database::LookupEntry;
use crate::fingerprint::{Fingerprints, Occurrence};

/// Serialized bytes of one occurrence (sequence + window)
const OCCURRENCE_BYTES: u64 = 8;

/// Serialized bytes of one table entry header (hash + count)
const HASH_ENTRY_BYTES: u64 = 8;

/// Serialized bytes of a lookup entry without its strings
const LOOKUP_ENTRY_BYTES: u64 = 20;

/// Index content of one corpus partition
#[derive(Debug, Clone, Default)]
pub struct PartialDatabase {
    table: AHashMap<u32, Vec<Occurrence>>,
    lookup: BTreeMap<u32, LookupEntry>,
    corpus_bytes: u64,
    projected_bytes: u64,
}

impl PartialDatabase {
    /// Create an empty partial database
    pub fn new() -> Self {
        Self::default()
    }

    /// Account for a record of the corpus, indexed or not
    pub fn add_corpus_record(&mut self, record: &SequenceRecord) {
        self.corpus_bytes += fasta_bytes(record);
    }

    /// Add the fingerprints of one sequence
    pub fn insert(&mut self, record: &SequenceRecord, fingerprints: Fingerprints) {
        let sequence = fingerprints.sequence();
        let fingerprint_count = fingerprints.len() as u32;

        for (hash, occurrence) in fingerprints.into_entries() {
            let occurrences = self.table.entry(hash).or_insert_with(|| {
                self.projected_bytes += HASH_ENTRY_BYTES;
                Vec::new()
            });
            occurrences.push(occurrence);
            self.projected_bytes += OCCURRENCE_BYTES;
        }

        let entry = LookupEntry {
            name: record.id.clone(),
            description: record.description.clone(),
            length: record.len() as u32,
            fingerprint_count,
        };
        self.projected_bytes += LOOKUP_ENTRY_BYTES
            + entry.name.len() as u64
            + entry.description.as_ref().map_or(0, |d| d.len() as u64);
        self.lookup.insert(sequence, entry);
    }

    /// Merge another partial into this one
    pub fn merge(mut self, other: PartialDatabase) -> PartialDatabase {
        // re-derive the projection, shared hashes are stored once
        self.projected_bytes += other.projected_bytes;
        for (hash, mut occurrences) in other.table {
            match self.table.get_mut(&hash) {
                Some(existing) => {
                    self.projected_bytes -= HASH_ENTRY_BYTES;
                    existing.append(&mut occurrences);
                }
                None => {
                    self.table.insert(hash, occurrences);
                }
            }
        }
        self.lookup.extend(other.lookup);
        self.corpus_bytes += other.corpus_bytes;
        self
    }

    /// Bytes of the corpus seen by this partition (FASTA representation)
    pub fn corpus_bytes(&self) -> u64 {
        self.corpus_bytes
    }

    /// Projected serialized size of the index content
    pub fn projected_bytes(&self) -> u64 {
        self.projected_bytes
    }

    /// Number of indexed sequences
    pub fn num_sequences(&self) -> usize {
        self.lookup.len()
    }

    /// Number of distinct hashes
    pub fn num_hashes(&self) -> usize {
        self.table.len()
    }

    /// Split into hash table and lookup
    pub fn into_parts(self) -> (AHashMap<u32, Vec<Occurrence>>, BTreeMap<u32, LookupEntry>) {
        (self.table, self.lookup)
    }
}

/// Size of a record written as FASTA (`>id description\nresidues\n`)
fn fasta_bytes(record: &SequenceRecord) -> u64 {
    let header = 1 + record.id.len() + record.description.as_ref().map_or(0, |d| d.len() + 1);
    (header + 1 + record.residues.len() + 1) as u64
}
