// protfin: spectral fingerprints of protein sequences
//
// Maps protein sequences to numeric property signals, extracts spectral
// landmarks, hashes landmark pairs into fingerprints and matches queries
// against an indexed corpus.

#![doc = include_str!("../README.md")]
#![warn(missing_docs)]

pub mod constants;
pub mod error;
pub mod kidera;
pub mod spectrum;
pub mod peaks;
pub mod quantile;
pub mod constellation;
pub mod hash_schema;
pub mod fingerprint;
pub mod pipeline;
pub mod database;
pub mod matcher;
pub mod sink;
pub mod builder;
pub mod serialization;

// Re-export common types at crate root
pub use error::{ProtfinError, Result};
pub use kidera::FeatureMapper;
pub use spectrum::{Stft, WindowLayout};
pub use peaks::{Band, Peak, PeakPicker, PeakPolicy, ProminencePicker, QuantilePicker};
pub use quantile::QuantileReference;
pub use constellation::{ConstellationMap, ConstellationPoint, LandmarkExtractor};
pub use hash_schema::{FieldKind, HashComponents, HashField, HashSchema};
pub use fingerprint::{FingerprintGenerator, Fingerprints, Occurrence, OccurrencePolicy};
pub use pipeline::Fingerprinter;
pub use database::{Database, DatabaseStats, LookupEntry};
pub use matcher::{CandidateScore, MatchStatus, Matcher, QueryResult, RankingPolicy};
pub use sink::{ResultSink, TextSink};
pub use builder::{BuildConfiguration, DatabaseBuilder, FingerprintConfig};

/// Version information
pub fn version() -> (u8, u8, u8) {
    constants::VERSION
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_version() {
        let (major, minor, patch) = version();
        assert_eq!(major, 0);
        assert_eq!(minor, 1);
        assert_eq!(patch, 0);
    }
}
