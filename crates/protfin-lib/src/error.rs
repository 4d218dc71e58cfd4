//! Error types for protfin
//!
//! Every fatal condition of the pipeline, the database build and the
//! persisted format maps onto one variant of [`ProtfinError`]. Recovered
//! conditions (unknown residues, queries without candidates) never surface
//! as errors.

use thiserror::Error;

/// Error type for all fallible protfin operations
#[derive(Error, Debug)]
pub enum ProtfinError {
    /// The configured hash fields do not fit into a 32-bit fingerprint
    #[error("Hash overflow: fields need {total_bits} bits, only {max_bits} available")]
    HashOverflow {
        /// Sum of all configured field widths
        total_bits: u32,
        /// Width of a fingerprint
        max_bits: u32,
    },

    /// A value does not fit into its hash field
    #[error("Field overflow: {field} value {value} does not fit into {bits} bits")]
    FieldOverflow {
        /// Name of the offending field
        field: &'static str,
        /// Value that was packed
        value: u32,
        /// Declared width of the field
        bits: u8,
    },

    /// The Kidera factor selector is outside the property table
    #[error("Invalid Kidera factor index {index}, expected 0..{available}")]
    InvalidFactor {
        /// Requested factor row
        index: usize,
        /// Number of rows in the table
        available: usize,
    },

    /// The projected index size exceeds the configured budget
    #[error("Index too large: projected {projected} bytes exceeds budget of {budget} bytes")]
    IndexTooLarge {
        /// Projected serialized size in bytes
        projected: u64,
        /// Allowed size in bytes
        budget: u64,
    },

    /// A configuration parameter is invalid
    #[error("Invalid configuration: {0}")]
    InvalidConfig(String),

    /// The quantile reference does not match the window configuration
    #[error("Quantile reference has {found} bins, window size {window_size} needs {expected}")]
    ReferenceMismatch {
        /// Bins stored in the reference
        found: usize,
        /// Bins produced by the configured window size
        expected: usize,
        /// Configured window size
        window_size: usize,
    },

    /// A persisted database could not be decoded
    #[error("Malformed database: {0}")]
    MalformedDatabase(String),

    /// A persisted database was written with an incompatible format version
    #[error("Incompatible database format version {found_major}.{found_minor}, expected {expected_major}.{expected_minor}")]
    VersionMismatch {
        /// Major version found in the file
        found_major: u32,
        /// Minor version found in the file
        found_minor: u32,
        /// Major version supported by this build
        expected_major: u32,
        /// Minor version supported by this build
        expected_minor: u32,
    },

    /// I/O error
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// Binary encoding error while writing a database
    #[error("Binary encoding error: {0}")]
    Bincode(#[from] bincode::Error),

    /// JSON (de)serialization error
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
}

/// Result type for protfin operations
pub type Result<T> = std::result::Result<T, ProtfinError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_messages() {
        let err = ProtfinError::HashOverflow { total_bits: 40, max_bits: 32 };
        assert_eq!(err.to_string(), "Hash overflow: fields need 40 bits, only 32 available");

        let err = ProtfinError::FieldOverflow { field: "delta", value: 5000, bits: 12 };
        assert!(err.to_string().contains("5000"));
        assert!(err.to_string().contains("12 bits"));
    }

    #[test]
    fn test_io_error_conversion() {
        let io = std::io::Error::new(std::io::ErrorKind::UnexpectedEof, "eof");
        let err: ProtfinError = io.into();
        assert!(matches!(err, ProtfinError::Io(_)));
    }
}
