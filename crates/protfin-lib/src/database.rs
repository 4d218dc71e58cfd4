//! Fingerprint database
//!
//! The [`Database`] maps every fingerprint to the list of its occurrences
//! and keeps a lookup of the indexed sequences. It is produced once by the
//! [`DatabaseBuilder`](crate::builder::DatabaseBuilder) or loaded from disk,
//! and is read-only afterwards, so any number of threads can query it.

use std::collections::BTreeMap;
use std::fs::File;
use std::io::{BufReader, BufWriter, Read, Write};
use std::path::Path;
use std::sync::Arc;

use ahash::AHashMap;
use serde::{Deserialize, Serialize};
use tracing::{debug, info};

use crate::builder::config::FingerprintConfig;
use crate::error::{ProtfinError, Result};
use crate::fingerprint::{Fingerprints, Occurrence};
use crate::hash_schema::HashSchema;
use crate::pipeline::Fingerprinter;
use crate::quantile::QuantileReference;
use crate::serialization::{database_file_path, decode_error, DatabaseHeader};

/// Lookup information of one indexed sequence
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LookupEntry {
    /// Sequence identifier
    pub name: String,
    /// Header description, if any
    pub description: Option<String>,
    /// Number of residues
    pub length: u32,
    /// Number of fingerprints stored for the sequence
    pub fingerprint_count: u32,
}

/// Summary statistics of a database
#[derive(Debug, Clone, PartialEq)]
pub struct DatabaseStats {
    /// Indexed sequences
    pub num_sequences: usize,
    /// Distinct fingerprints
    pub num_hashes: usize,
    /// Stored occurrences
    pub num_occurrences: usize,
    /// Mean fingerprints per sequence
    pub mean_fingerprints_per_sequence: f64,
    /// Largest number of distinct sequences sharing one fingerprint
    pub max_sequences_per_hash: usize,
}

/// Database body as written after the header
#[derive(Serialize)]
struct DatabaseBodyRef<'a> {
    config: &'a FingerprintConfig,
    schema: &'a HashSchema,
    reference: Option<&'a QuantileReference>,
    lookup: &'a BTreeMap<u32, LookupEntry>,
    table: Vec<(u32, &'a [Occurrence])>,
}

/// Owned counterpart of [`DatabaseBodyRef`]
#[derive(Deserialize)]
struct DatabaseBody {
    config: FingerprintConfig,
    schema: HashSchema,
    reference: Option<QuantileReference>,
    lookup: BTreeMap<u32, LookupEntry>,
    table: Vec<(u32, Vec<Occurrence>)>,
}

/// Read-only fingerprint index plus sequence lookup
#[derive(Debug, Clone)]
pub struct Database {
    config: FingerprintConfig,
    schema: HashSchema,
    reference: Option<Arc<QuantileReference>>,
    table: AHashMap<u32, Vec<Occurrence>>,
    lookup: BTreeMap<u32, LookupEntry>,
}

impl Database {
    /// Assemble a database from its parts
    ///
    /// The configuration is validated and occurrence lists are sorted by
    /// (sequence, window).
    pub fn from_parts(
        config: FingerprintConfig,
        reference: Option<Arc<QuantileReference>>,
        mut table: AHashMap<u32, Vec<Occurrence>>,
        lookup: BTreeMap<u32, LookupEntry>,
    ) -> Result<Self> {
        config.validate()?;
        let schema = config.schema()?;
        for occurrences in table.values_mut() {
            occurrences.sort_unstable_by_key(|occ| (occ.sequence, occ.window));
        }
        Ok(Self { config, schema, reference, table, lookup })
    }

    /// Fingerprinting parameters the database was built with
    pub fn config(&self) -> &FingerprintConfig {
        &self.config
    }

    /// Hash layout the database was built with
    pub fn schema(&self) -> &HashSchema {
        &self.schema
    }

    /// Quantile reference the database was built with
    pub fn reference(&self) -> Option<&Arc<QuantileReference>> {
        self.reference.as_ref()
    }

    /// Pipeline that fingerprints queries exactly like the indexed corpus
    pub fn fingerprinter(&self) -> Result<Fingerprinter> {
        Fingerprinter::new(self.config.clone(), self.reference.clone())
    }

    /// Occurrences of a hash (empty if unknown)
    pub fn occurrences(&self, hash: u32) -> &[Occurrence] {
        self.table.get(&hash).map(Vec::as_slice).unwrap_or(&[])
    }

    /// Occurrence lists of every hash shared with the query, ascending hash
    pub fn query<'a>(&'a self, fingerprints: &Fingerprints) -> Vec<(u32, &'a [Occurrence])> {
        fingerprints
            .hashes()
            .filter_map(|hash| self.table.get(&hash).map(|occ| (hash, occ.as_slice())))
            .collect()
    }

    /// Lookup entry of a sequence
    pub fn lookup(&self, sequence: u32) -> Option<&LookupEntry> {
        self.lookup.get(&sequence)
    }

    /// Iterate over the lookup in ascending id order
    pub fn sequences(&self) -> impl Iterator<Item = (u32, &LookupEntry)> {
        self.lookup.iter().map(|(&id, entry)| (id, entry))
    }

    /// Number of indexed sequences
    pub fn num_sequences(&self) -> usize {
        self.lookup.len()
    }

    /// Number of distinct hashes
    pub fn num_hashes(&self) -> usize {
        self.table.len()
    }

    /// Number of stored occurrences
    pub fn num_occurrences(&self) -> usize {
        self.table.values().map(Vec::len).sum()
    }

    /// Number of distinct sequences per hash, ascending hash
    pub fn sequences_per_hash(&self) -> Vec<(u32, usize)> {
        let mut counts: Vec<(u32, usize)> = self
            .table
            .iter()
            .map(|(&hash, occurrences)| {
                // lists are sorted by sequence
                let distinct = occurrences.chunk_by(|a, b| a.sequence == b.sequence).count();
                (hash, distinct)
            })
            .collect();
        counts.sort_unstable();
        counts
    }

    /// Summary statistics
    pub fn stats(&self) -> DatabaseStats {
        let num_sequences = self.num_sequences();
        let total_fingerprints: u64 =
            self.lookup.values().map(|e| e.fingerprint_count as u64).sum();
        DatabaseStats {
            num_sequences,
            num_hashes: self.num_hashes(),
            num_occurrences: self.num_occurrences(),
            mean_fingerprints_per_sequence: if num_sequences == 0 {
                0.0
            } else {
                total_fingerprints as f64 / num_sequences as f64
            },
            max_sequences_per_hash: self
                .sequences_per_hash()
                .into_iter()
                .map(|(_, n)| n)
                .max()
                .unwrap_or(0),
        }
    }

    /// Log summary statistics via tracing
    pub fn print_stats(&self) {
        let stats = self.stats();
        info!("Database statistics:");
        info!("  sequences: {}", stats.num_sequences);
        info!("  distinct fingerprints: {}", stats.num_hashes);
        info!("  occurrences: {}", stats.num_occurrences);
        info!("  fingerprints per sequence: {:.2}", stats.mean_fingerprints_per_sequence);
        info!("  max sequences per fingerprint: {}", stats.max_sequences_per_hash);
    }

    /// Serialize the database to a writer
    pub fn serialize_to(&self, writer: &mut dyn Write) -> Result<()> {
        let header = DatabaseHeader::new(self.lookup.len() as u32, self.table.len() as u64);
        header.write(writer)?;

        let mut table: Vec<(u32, &[Occurrence])> =
            self.table.iter().map(|(&hash, occ)| (hash, occ.as_slice())).collect();
        table.sort_unstable_by_key(|&(hash, _)| hash);

        let body = DatabaseBodyRef {
            config: &self.config,
            schema: &self.schema,
            reference: self.reference.as_deref(),
            lookup: &self.lookup,
            table,
        };
        bincode::serialize_into(&mut *writer, &body)?;
        Ok(())
    }

    /// Deserialize a database from a reader
    ///
    /// # Errors
    /// [`ProtfinError::MalformedDatabase`] for a wrong magic, a truncated
    /// stream, an invalid stored configuration or inconsistent content,
    /// [`ProtfinError::VersionMismatch`] for an incompatible format version.
    pub fn deserialize_from(reader: &mut dyn Read) -> Result<Self> {
        let header = DatabaseHeader::read(reader)?;
        debug!(
            "Database format {}.{}: {} sequences, {} hashes",
            header.version_major, header.version_minor, header.num_sequences, header.num_hashes
        );

        let body: DatabaseBody = bincode::deserialize_from(&mut *reader).map_err(decode_error)?;

        body.config.validate().map_err(|e| {
            ProtfinError::MalformedDatabase(format!("stored configuration is invalid: {}", e))
        })?;
        if body.schema != body.config.schema()? {
            return Err(ProtfinError::MalformedDatabase(
                "stored hash schema does not match the stored configuration".into(),
            ));
        }
        if body.lookup.len() as u64 != header.num_sequences as u64 {
            return Err(ProtfinError::MalformedDatabase(format!(
                "header announces {} sequences, found {}",
                header.num_sequences,
                body.lookup.len()
            )));
        }

        let mut table = AHashMap::with_capacity(body.table.len());
        for (hash, occurrences) in body.table {
            if let Some(occ) = occurrences.iter().find(|o| !body.lookup.contains_key(&o.sequence)) {
                return Err(ProtfinError::MalformedDatabase(format!(
                    "hash {:#010x} refers to unknown sequence {}",
                    hash, occ.sequence
                )));
            }
            table.insert(hash, occurrences);
        }
        if table.len() as u64 != header.num_hashes {
            return Err(ProtfinError::MalformedDatabase(format!(
                "header announces {} hashes, found {} distinct",
                header.num_hashes,
                table.len()
            )));
        }

        Ok(Self {
            config: body.config,
            schema: body.schema,
            reference: body.reference.map(Arc::new),
            table,
            lookup: body.lookup,
        })
    }

    /// Save the database to `<base>.pfdb`
    pub fn save<P: AsRef<Path>>(&self, path: P) -> Result<()> {
        let path = database_file_path(path);
        let mut writer = BufWriter::new(File::create(&path)?);
        self.serialize_to(&mut writer)?;
        writer.flush()?;
        info!("Saved database to {}", path.display());
        Ok(())
    }

    /// Load a database from `<base>.pfdb`
    pub fn load<P: AsRef<Path>>(path: P) -> Result<Self> {
        let path = database_file_path(path);
        let mut reader = BufReader::new(File::open(&path)?);
        let database = Self::deserialize_from(&mut reader)?;
        info!(
            "Loaded database from {} ({} sequences, {} fingerprints)",
            path.display(),
            database.num_sequences(),
            database.num_hashes()
        );
        Ok(database)
    }
}
