//! Builder module for constructing protfin databases
//!
//! This module implements the build pipeline:
//! 1. Read the protein sequences (FASTA or memory) and assign sequence ids
//! 2. Split the corpus into partitions
//! 3. Fingerprint every partition in parallel into a partial database,
//!    guarding the projected index size
//! 4. Merge the partials into the final [`Database`](crate::database::Database)

pub mod config;
pub mod parse;
pub mod partition;
pub mod database_builder;

pub use config::{BuildConfiguration, FingerprintConfig};
pub use parse::{FastaSource, MemorySource, SequenceRecord, SequenceSource, SourceSize};
pub use partition::PartialDatabase;
pub use database_builder::{BuildReport, DatabaseBuilder, SequenceFailure};
