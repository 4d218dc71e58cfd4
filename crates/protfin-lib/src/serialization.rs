//! Persisted database format
//!
//! A database is stored in one binary file, `<base>.pfdb`: a fixed
//! little-endian header followed by the bincode encoding of the database
//! body.
//!
//! ```text
//! DatabaseHeader
//!   ├─ magic: "PRTFNDB1"
//!   ├─ version_major: u32
//!   ├─ version_minor: u32
//!   ├─ num_sequences: u32
//!   └─ num_hashes: u64
//! Body (bincode)
//!   ├─ config: FingerprintConfig
//!   ├─ schema: HashSchema, most significant field first
//!   ├─ reference: Option<QuantileReference>
//!   ├─ lookup: id -> LookupEntry, ascending id
//!   └─ table: (hash, occurrences), ascending hash
//! ```
//!
//! The header is read first, so a foreign file or an incompatible version
//! is rejected before any body byte is decoded.

use std::io::{self, Read, Write};
use std::path::{Path, PathBuf};

use crate::error::{ProtfinError, Result};

/// Magic bytes for the protfin database format
const MAGIC: &[u8; 8] = b"PRTFNDB1";

/// File format version: (major, minor)
/// Increment major on breaking changes, minor on compatible changes
pub const FORMAT_VERSION: (u32, u32) = (1, 0);

/// Extension of database files
pub const DATABASE_EXTENSION: &str = "pfdb";

/// Header for the serialized database
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct DatabaseHeader {
    /// Magic number for format identification ("PRTFNDB1")
    pub magic: [u8; 8],
    /// Format version major number
    pub version_major: u32,
    /// Format version minor number
    pub version_minor: u32,
    /// Number of lookup entries
    pub num_sequences: u32,
    /// Number of distinct hashes in the table
    pub num_hashes: u64,
}

impl DatabaseHeader {
    /// Create a new header
    pub fn new(num_sequences: u32, num_hashes: u64) -> Self {
        Self {
            magic: *MAGIC,
            version_major: FORMAT_VERSION.0,
            version_minor: FORMAT_VERSION.1,
            num_sequences,
            num_hashes,
        }
    }

    /// Write header to a writer
    pub fn write(&self, writer: &mut dyn Write) -> io::Result<()> {
        writer.write_all(&self.magic)?;
        writer.write_all(&self.version_major.to_le_bytes())?;
        writer.write_all(&self.version_minor.to_le_bytes())?;
        writer.write_all(&self.num_sequences.to_le_bytes())?;
        writer.write_all(&self.num_hashes.to_le_bytes())?;
        Ok(())
    }

    /// Read header from a reader
    ///
    /// # Errors
    /// [`ProtfinError::MalformedDatabase`] for a wrong magic or a truncated
    /// header, [`ProtfinError::VersionMismatch`] for another major version.
    pub fn read(reader: &mut dyn Read) -> Result<Self> {
        let mut magic = [0u8; 8];
        read_exact(reader, &mut magic)?;

        if &magic != MAGIC {
            return Err(ProtfinError::MalformedDatabase(
                "invalid magic number for protfin database file".into(),
            ));
        }

        let version_major = read_u32(reader)?;
        let version_minor = read_u32(reader)?;

        if version_major != FORMAT_VERSION.0 {
            return Err(ProtfinError::VersionMismatch {
                found_major: version_major,
                found_minor: version_minor,
                expected_major: FORMAT_VERSION.0,
                expected_minor: FORMAT_VERSION.1,
            });
        }

        Ok(Self {
            magic,
            version_major,
            version_minor,
            num_sequences: read_u32(reader)?,
            num_hashes: read_u64(reader)?,
        })
    }
}

/// Build the database file path from a base path
pub fn database_file_path<P: AsRef<Path>>(base: P) -> PathBuf {
    let mut path = base.as_ref().to_path_buf();
    let ext = path.extension().map(|e| e.to_string_lossy().to_string()).unwrap_or_default();
    if ext == DATABASE_EXTENSION {
        path
    } else if ext.is_empty() {
        path.set_extension(DATABASE_EXTENSION);
        path
    } else {
        path.set_extension(format!("{ext}.{DATABASE_EXTENSION}"));
        path
    }
}

/// `read_exact` that reports end of file as a truncated database
pub(crate) fn read_exact(reader: &mut dyn Read, buf: &mut [u8]) -> Result<()> {
    reader.read_exact(buf).map_err(truncated)
}

/// Map an I/O error while decoding to the matching database error
pub(crate) fn truncated(err: io::Error) -> ProtfinError {
    if err.kind() == io::ErrorKind::UnexpectedEof {
        ProtfinError::MalformedDatabase("unexpected end of file".into())
    } else {
        ProtfinError::Io(err)
    }
}

/// Map a body decoding error to the matching database error
pub(crate) fn decode_error(err: bincode::Error) -> ProtfinError {
    match *err {
        bincode::ErrorKind::Io(err) => truncated(err),
        other => ProtfinError::MalformedDatabase(other.to_string()),
    }
}

pub(crate) fn read_u32(reader: &mut dyn Read) -> Result<u32> {
    let mut bytes = [0u8; 4];
    read_exact(reader, &mut bytes)?;
    Ok(u32::from_le_bytes(bytes))
}

pub(crate) fn read_u64(reader: &mut dyn Read) -> Result<u64> {
    let mut bytes = [0u8; 8];
    read_exact(reader, &mut bytes)?;
    Ok(u64::from_le_bytes(bytes))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_header_roundtrip() {
        let header = DatabaseHeader::new(12, 3456);

        let mut buffer = Vec::new();
        header.write(&mut buffer).unwrap();

        let header2 = DatabaseHeader::read(&mut buffer.as_slice()).unwrap();
        assert_eq!(header, header2);
    }

    #[test]
    fn test_bad_magic() {
        let mut buffer = Vec::new();
        DatabaseHeader::new(1, 1).write(&mut buffer).unwrap();
        buffer[0] = b'X';
        assert!(matches!(
            DatabaseHeader::read(&mut buffer.as_slice()),
            Err(ProtfinError::MalformedDatabase(_))
        ));
    }

    #[test]
    fn test_version_mismatch() {
        let mut header = DatabaseHeader::new(1, 1);
        header.version_major = FORMAT_VERSION.0 + 1;
        let mut buffer = Vec::new();
        header.write(&mut buffer).unwrap();
        assert!(matches!(
            DatabaseHeader::read(&mut buffer.as_slice()),
            Err(ProtfinError::VersionMismatch { .. })
        ));
    }

    #[test]
    fn test_truncated_header() {
        let mut buffer = Vec::new();
        DatabaseHeader::new(1, 1).write(&mut buffer).unwrap();
        buffer.truncate(10);
        assert!(matches!(
            DatabaseHeader::read(&mut buffer.as_slice()),
            Err(ProtfinError::MalformedDatabase(_))
        ));
    }

    #[test]
    fn test_decode_errors() {
        let eof: bincode::Error = Box::new(bincode::ErrorKind::Io(io::Error::new(
            io::ErrorKind::UnexpectedEof,
            "eof",
        )));
        assert!(matches!(decode_error(eof), ProtfinError::MalformedDatabase(_)));

        let denied: bincode::Error = Box::new(bincode::ErrorKind::Io(io::Error::new(
            io::ErrorKind::PermissionDenied,
            "denied",
        )));
        assert!(matches!(decode_error(denied), ProtfinError::Io(_)));

        // a two byte string that is not UTF-8
        let bytes = [2, 0, 0, 0, 0, 0, 0, 0, 0xff, 0xfe];
        let result: std::result::Result<String, _> = bincode::deserialize(&bytes);
        assert!(matches!(result.map_err(decode_error), Err(ProtfinError::MalformedDatabase(_))));
    }

    #[test]
    fn test_file_path_construction() {
        let base = Path::new("/tmp/my_db");
        assert!(database_file_path(base).to_string_lossy().ends_with("my_db.pfdb"));
        let already = Path::new("/tmp/my_db.pfdb");
        assert_eq!(database_file_path(already), already);
        let other = Path::new("/tmp/my_db.v2");
        assert!(database_file_path(other).to_string_lossy().ends_with("my_db.v2.pfdb"));
    }
}
