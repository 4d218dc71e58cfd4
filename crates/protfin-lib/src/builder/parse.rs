//! Protein sequence sources
//!
//! Reads protein sequences from FASTA files (gzip handled transparently by
//! needletail) or from memory. A [`SequenceSource`] yields records in a
//! stable order and reports whether it knows its size up front; the
//! position of a record in that order becomes its sequence id.

use anyhow::{Context, Result};
use needletail::{parse_fastx_file, FastxReader};
use std::path::{Path, PathBuf};

/// One protein sequence
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SequenceRecord {
    /// Identifier (header up to the first whitespace)
    pub id: String,
    /// Rest of the header line, if any
    pub description: Option<String>,
    /// Residues, upper case
    pub residues: String,
}

impl SequenceRecord {
    /// Create a record from its parts
    pub fn new(id: impl Into<String>, description: Option<String>, residues: impl Into<String>) -> Self {
        Self { id: id.into(), description, residues: residues.into() }
    }

    /// Create a record from a raw FASTA header and sequence
    pub fn from_fastx(header: &[u8], seq: &[u8]) -> Self {
        let header = String::from_utf8_lossy(header);
        let header = header.trim();
        let (id, description) = match header.split_once(char::is_whitespace) {
            Some((id, rest)) => {
                let rest = rest.trim();
                (id.to_string(), (!rest.is_empty()).then(|| rest.to_string()))
            }
            None => (header.to_string(), None),
        };
        let residues = String::from_utf8_lossy(seq).to_uppercase();
        Self { id, description, residues }
    }

    /// Number of residues
    pub fn len(&self) -> usize {
        self.residues.chars().count()
    }

    /// Whether the sequence has no residues
    pub fn is_empty(&self) -> bool {
        self.residues.is_empty()
    }
}

/// Size information of a sequence source
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SourceSize {
    /// Number of records known up front
    Known(usize),
    /// Number of records unknown until the source is exhausted
    Unbounded,
}

/// Yields sequence records in a stable order
pub trait SequenceSource {
    /// Number of records, if known
    fn size(&self) -> SourceSize;

    /// Next record, `None` when exhausted
    fn next_record(&mut self) -> Option<Result<SequenceRecord>>;

    /// Drain the source into memory
    fn read_all(&mut self) -> Result<Vec<SequenceRecord>> {
        let mut records = match self.size() {
            SourceSize::Known(n) => Vec::with_capacity(n),
            SourceSize::Unbounded => Vec::new(),
        };
        while let Some(record) = self.next_record() {
            records.push(record?);
        }
        Ok(records)
    }
}

/// FASTA file source
pub struct FastaSource {
    path: PathBuf,
    reader: Box<dyn FastxReader>,
    size: SourceSize,
}

impl FastaSource {
    /// Open a FASTA file, counting its records first
    pub fn open<P: AsRef<Path>>(path: P) -> Result<Self> {
        let path = path.as_ref();
        let (num_sequences, _) = count_sequences(path)?;
        let mut source = Self::open_unbounded(path)?;
        source.size = SourceSize::Known(num_sequences);
        Ok(source)
    }

    /// Open a FASTA file without counting (single pass)
    pub fn open_unbounded<P: AsRef<Path>>(path: P) -> Result<Self> {
        let path = path.as_ref();
        let reader = parse_fastx_file(path)
            .with_context(|| format!("Failed to open sequence file: {}", path.display()))?;
        Ok(Self { path: path.to_path_buf(), reader, size: SourceSize::Unbounded })
    }
}

impl SequenceSource for FastaSource {
    fn size(&self) -> SourceSize {
        self.size
    }

    fn next_record(&mut self) -> Option<Result<SequenceRecord>> {
        let path = &self.path;
        self.reader.next().map(|record| {
            let record = record
                .with_context(|| format!("Failed to parse sequence record in {}", path.display()))?;
            Ok(SequenceRecord::from_fastx(record.id(), &record.seq()))
        })
    }
}

/// In-memory source
#[derive(Debug, Clone, Default)]
pub struct MemorySource {
    records: std::collections::VecDeque<SequenceRecord>,
    total: usize,
}

impl MemorySource {
    /// Create a source over the given records
    pub fn new(records: Vec<SequenceRecord>) -> Self {
        let total = records.len();
        Self { records: records.into(), total }
    }

    /// Create a source from `(id, residues)` pairs
    pub fn from_pairs<I, S, T>(pairs: I) -> Self
    where
        I: IntoIterator<Item = (S, T)>,
        S: Into<String>,
        T: Into<String>,
    {
        Self::new(pairs.into_iter().map(|(id, seq)| SequenceRecord::new(id, None, seq)).collect())
    }
}

impl SequenceSource for MemorySource {
    fn size(&self) -> SourceSize {
        SourceSize::Known(self.total)
    }

    fn next_record(&mut self) -> Option<Result<SequenceRecord>> {
        self.records.pop_front().map(Ok)
    }
}

/// Parse a FASTA file and call a function for each record
///
/// # Errors
/// Returns error if the file cannot be opened or is malformed, or if the
/// callback fails.
pub fn parse_sequences<P, F>(path: P, mut callback: F) -> Result<()>
where
    P: AsRef<Path>,
    F: FnMut(SequenceRecord) -> Result<()>,
{
    let mut source = FastaSource::open_unbounded(path)?;
    while let Some(record) = source.next_record() {
        callback(record?)?;
    }
    Ok(())
}

/// Count sequences and total residues in a file
///
/// # Returns
/// `(num_sequences, total_residues)`
pub fn count_sequences<P: AsRef<Path>>(path: P) -> Result<(usize, usize)> {
    let path = path.as_ref();
    let mut reader = parse_fastx_file(path)
        .with_context(|| format!("Failed to open sequence file: {}", path.display()))?;

    let mut num_sequences = 0;
    let mut total_residues = 0;
    while let Some(record) = reader.next() {
        let record = record
            .with_context(|| format!("Failed to parse sequence record in {}", path.display()))?;
        num_sequences += 1;
        total_residues += record.num_bases();
    }

    Ok((num_sequences, total_residues))
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;
    use tempfile::NamedTempFile;

    fn fasta(content: &str) -> NamedTempFile {
        let mut temp_file = NamedTempFile::new().unwrap();
        write!(temp_file, "{}", content).unwrap();
        temp_file.flush().unwrap();
        temp_file
    }

    #[test]
    fn test_header_split() {
        let record = SequenceRecord::from_fastx(b"sp|P69905|HBA_HUMAN Hemoglobin subunit alpha", b"mvls");
        assert_eq!(record.id, "sp|P69905|HBA_HUMAN");
        assert_eq!(record.description.as_deref(), Some("Hemoglobin subunit alpha"));
        assert_eq!(record.residues, "MVLS");
        assert_eq!(record.len(), 4);

        let record = SequenceRecord::from_fastx(b"P1", b"");
        assert_eq!(record.id, "P1");
        assert_eq!(record.description, None);
        assert!(record.is_empty());
    }

    #[test]
    fn test_fasta_source() -> Result<()> {
        let file = fasta(">p1 first protein\nMKT\nAYI\n>p2\nWWGG\n");
        let mut source = FastaSource::open(file.path())?;
        assert_eq!(source.size(), SourceSize::Known(2));

        let records = source.read_all()?;
        assert_eq!(records.len(), 2);
        assert_eq!(records[0].id, "p1");
        assert_eq!(records[0].residues, "MKTAYI");
        assert_eq!(records[1].description, None);
        Ok(())
    }

    #[test]
    fn test_unbounded_source() -> Result<()> {
        let file = fasta(">a\nMM\n>b\nKK\n>c\nLL\n");
        let mut source = FastaSource::open_unbounded(file.path())?;
        assert_eq!(source.size(), SourceSize::Unbounded);
        assert_eq!(source.read_all()?.len(), 3);
        Ok(())
    }

    #[test]
    fn test_missing_file() {
        assert!(FastaSource::open("/nonexistent/protfin/input.fasta").is_err());
    }

    #[test]
    fn test_count_sequences() -> Result<()> {
        let file = fasta(">seq1\nMKTA\n>seq2\nWWGGWWGG\n");
        let (num_seqs, total_residues) = count_sequences(file.path())?;
        assert_eq!(num_seqs, 2);
        assert_eq!(total_residues, 12);

        let mut ids = Vec::new();
        parse_sequences(file.path(), |record| {
            ids.push(record.id);
            Ok(())
        })?;
        assert_eq!(ids, vec!["seq1", "seq2"]);
        Ok(())
    }

    #[test]
    fn test_memory_source() -> Result<()> {
        let mut source = MemorySource::from_pairs([("x", "MK"), ("y", "TA")]);
        assert_eq!(source.size(), SourceSize::Known(2));
        let first = source.next_record().unwrap()?;
        assert_eq!(first.id, "x");
        assert_eq!(source.read_all()?.len(), 1);
        assert!(source.next_record().is_none());
        Ok(())
    }
}
