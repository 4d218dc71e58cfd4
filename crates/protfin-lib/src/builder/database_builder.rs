//! Database builder orchestration
//!
//! Coordinates the pipeline that builds a fingerprint database:
//! 1. Read the corpus and assign sequence ids in source order
//! 2. Fingerprint every partition in parallel into a private partial
//!    database, checking the index size budget as it grows
//! 3. Merge the partials
//! 4. Assemble the final database

use std::sync::Arc;

use anyhow::Context;
use rayon::prelude::*;
use tracing::{debug, info, warn};

use crate::builder::config::BuildConfiguration;
use crate::builder::parse::{SequenceRecord, SequenceSource};
use crate::builder::partition::PartialDatabase;
use crate::constants::GUARD_INTERVAL;
use crate::database::Database;
use crate::error::{ProtfinError, Result};
use crate::pipeline::Fingerprinter;
use crate::quantile::QuantileReference;

/// A sequence that could not be fingerprinted
#[derive(Debug)]
pub struct SequenceFailure {
    /// Sequence id
    pub sequence: u32,
    /// Sequence identifier from the source
    pub name: String,
    /// What went wrong
    pub error: ProtfinError,
}

/// Outcome of a build besides the database itself
#[derive(Debug, Default)]
pub struct BuildReport {
    /// Records read from the source
    pub num_sequences: usize,
    /// Records present in the lookup
    pub num_indexed: usize,
    /// Number of partitions used
    pub num_partitions: usize,
    /// Corpus size in FASTA bytes
    pub corpus_bytes: u64,
    /// Projected serialized index size
    pub projected_bytes: u64,
    /// Sequences skipped because their pipeline failed
    pub failures: Vec<SequenceFailure>,
}

/// Size budget of the index relative to the corpus it was built from
#[derive(Debug, Clone, Copy)]
struct IndexGuard {
    ratio: Option<f64>,
}

impl IndexGuard {
    fn budget(&self, corpus_bytes: u64) -> Option<u64> {
        self.ratio.map(|ratio| (ratio * corpus_bytes as f64) as u64)
    }

    fn check(&self, partial: &PartialDatabase) -> Result<()> {
        let Some(budget) = self.budget(partial.corpus_bytes()) else {
            return Ok(());
        };
        let projected = partial.projected_bytes();
        if projected > budget {
            return Err(ProtfinError::IndexTooLarge { projected, budget });
        }
        Ok(())
    }
}

/// Builder for fingerprint databases
pub struct DatabaseBuilder {
    config: BuildConfiguration,
    reference: Option<Arc<QuantileReference>>,
}

impl DatabaseBuilder {
    /// Create a new database builder with the given configuration
    pub fn new(config: BuildConfiguration) -> Result<Self> {
        config.validate()?;
        Ok(Self { config, reference: None })
    }

    /// Use a quantile reference (required by the quantile peak policy)
    pub fn with_reference(mut self, reference: Arc<QuantileReference>) -> Self {
        self.reference = Some(reference);
        self
    }

    /// Build configuration in use
    pub fn config(&self) -> &BuildConfiguration {
        &self.config
    }

    /// Build a database from a sequence source
    ///
    /// Reading errors of the source abort the build.
    pub fn build_from_source<S>(&self, source: &mut S) -> anyhow::Result<(Database, BuildReport)>
    where
        S: SequenceSource + ?Sized,
    {
        let records = source.read_all().context("Failed to read the sequence corpus")?;
        self.build_from_records(records).context("Failed to build the fingerprint database")
    }

    /// Build a database from records; ids are their positions
    ///
    /// # Parallelism
    /// The number of threads is controlled by `config.num_threads`:
    /// - `0` = use all available CPU cores (rayon default)
    /// - `N` = use exactly N threads
    ///
    /// # Errors
    /// Fails on an invalid configuration or when a partition exceeds the
    /// index size budget. Failing sequences are reported, not fatal.
    pub fn build_from_records(&self, records: Vec<SequenceRecord>) -> Result<(Database, BuildReport)> {
        // Validate the whole pipeline before touching any sequence
        let fingerprinter =
            Fingerprinter::new(self.config.fingerprint.clone(), self.reference.clone())?;

        if records.len() > u32::MAX as usize {
            return Err(ProtfinError::InvalidConfig(format!(
                "{} sequences exceed the 32-bit sequence id space",
                records.len()
            )));
        }

        let pool = rayon::ThreadPoolBuilder::new()
            .num_threads(self.config.num_threads)
            .build()
            .map_err(|e| ProtfinError::InvalidConfig(format!("Failed to create thread pool: {e}")))?;

        pool.install(|| self.build_inner(&fingerprinter, records))
    }

    /// Inner build logic, runs inside the rayon thread pool
    fn build_inner(
        &self,
        fingerprinter: &Fingerprinter,
        records: Vec<SequenceRecord>,
    ) -> Result<(Database, BuildReport)> {
        if self.config.verbose {
            self.config.print();
        }
        info!("Building protfin database");

        let num_sequences = records.len();
        let requested = match self.config.num_partitions {
            0 => rayon::current_num_threads(),
            n => n,
        }
        .clamp(1, num_sequences.max(1));
        let chunk_size = num_sequences.div_ceil(requested).max(1);
        let num_partitions = num_sequences.div_ceil(chunk_size).max(1);

        // Step 1: Fingerprint partitions
        info!(
            "Step 1: Fingerprinting {} sequences in {} partitions...",
            num_sequences, num_partitions
        );
        let guard = IndexGuard { ratio: self.config.max_index_ratio };
        let partials = records
            .par_chunks(chunk_size)
            .enumerate()
            .map(|(p, chunk)| {
                let first_id = (p * chunk_size) as u32;
                build_partition(fingerprinter, guard, first_id, chunk)
            })
            .collect::<Result<Vec<_>>>()?;

        // Step 2: Merge partials
        info!("Step 2: Merging {} partitions...", partials.len());
        let mut failures = Vec::new();
        let mut merged = PartialDatabase::new();
        for (partial, mut partition_failures) in partials {
            merged = merged.merge(partial);
            failures.append(&mut partition_failures);
        }
        failures.sort_by_key(|f| f.sequence);

        // Step 3: Assemble database
        info!("Step 3: Assembling database...");
        let report = BuildReport {
            num_sequences,
            num_indexed: merged.num_sequences(),
            num_partitions,
            corpus_bytes: merged.corpus_bytes(),
            projected_bytes: merged.projected_bytes(),
            failures,
        };
        let (table, lookup) = merged.into_parts();
        let database = Database::from_parts(
            self.config.fingerprint.clone(),
            fingerprinter.reference().cloned(),
            table,
            lookup,
        )?;

        info!("Database Build Complete");
        info!(
            "  {} of {} sequences indexed, {} distinct fingerprints",
            report.num_indexed,
            report.num_sequences,
            database.num_hashes()
        );
        info!("Projected size: {:.2} MB", report.projected_bytes as f64 / (1024.0 * 1024.0));
        if !report.failures.is_empty() {
            warn!("{} sequences could not be fingerprinted", report.failures.len());
        }

        Ok((database, report))
    }
}

/// Fingerprint one partition sequentially
fn build_partition(
    fingerprinter: &Fingerprinter,
    guard: IndexGuard,
    first_id: u32,
    records: &[SequenceRecord],
) -> Result<(PartialDatabase, Vec<SequenceFailure>)> {
    let mut partial = PartialDatabase::new();
    let mut failures = Vec::new();

    for (offset, record) in records.iter().enumerate() {
        let sequence = first_id + offset as u32;
        partial.add_corpus_record(record);

        match fingerprinter.fingerprint(sequence, &record.residues) {
            Ok(fingerprints) => partial.insert(record, fingerprints),
            Err(error) => {
                warn!("Skipping sequence {} ({}): {}", sequence, record.id, error);
                failures.push(SequenceFailure { sequence, name: record.id.clone(), error });
            }
        }

        if (offset + 1) % GUARD_INTERVAL == 0 {
            guard.check(&partial)?;
        }
    }
    guard.check(&partial)?;

    debug!(
        "  partition starting at {}: {} sequences, {} hashes, {} projected bytes",
        first_id,
        partial.num_sequences(),
        partial.num_hashes(),
        partial.projected_bytes()
    );
    Ok((partial, failures))
}
