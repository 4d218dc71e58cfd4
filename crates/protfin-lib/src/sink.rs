//! Query result sinks
//!
//! A [`ResultSink`] receives every [`QueryResult`] together with the query
//! record it belongs to. [`TextSink`] renders the human-readable report:
//!
//! ```text
//! P69905 - Hemoglobin subunit alpha: Jaccard Index of 1.0 : Score of 42
//!
//! Seems to be: P69905 - Hemoglobin subunit alpha
//!
//! Input:       P69905 - Hemoglobin subunit alpha
//! MVLSPADKTNVKAAWGKVGAHAGEYGAEALERMFLSFPTTKTYFPHFDLSHGSAQVKGHGKKVADAL...
//! Input-JSI: 1.0  -  Input-Score: 42
//!
//! Found hashes: 42
//! ```

use std::io::Write;

use crate::builder::parse::SequenceRecord;
use crate::database::Database;
use crate::error::Result;
use crate::matcher::{CandidateScore, QueryResult};

/// Consumer of query results
pub trait ResultSink {
    /// Handle the result of one query
    fn accept(&mut self, query: &SequenceRecord, result: &QueryResult) -> Result<()>;
}

impl ResultSink for Vec<QueryResult> {
    fn accept(&mut self, _query: &SequenceRecord, result: &QueryResult) -> Result<()> {
        self.push(result.clone());
        Ok(())
    }
}

/// Writes the text report of every query
pub struct TextSink<'a, W: Write> {
    writer: W,
    database: &'a Database,
    all_candidates: bool,
}

impl<'a, W: Write> TextSink<'a, W> {
    /// Create a sink resolving candidate names through `database`
    pub fn new(writer: W, database: &'a Database) -> Self {
        Self { writer, database, all_candidates: false }
    }

    /// List every ranked candidate instead of the top matches only
    pub fn with_all_candidates(mut self, all: bool) -> Self {
        self.all_candidates = all;
        self
    }

    /// Consume the sink, returning the writer
    pub fn into_inner(self) -> W {
        self.writer
    }

    fn name_and_description(&self, sequence: u32) -> (&'a str, &'a str) {
        match self.database.lookup(sequence) {
            Some(entry) => (entry.name.as_str(), entry.description.as_deref().unwrap_or("")),
            None => ("?", ""),
        }
    }

    fn write_candidate(&mut self, candidate: &CandidateScore) -> Result<()> {
        let (name, description) = self.name_and_description(candidate.sequence);
        writeln!(
            self.writer,
            "{} - {}: Jaccard Index of {:?} : Score of {}",
            name, description, candidate.jaccard, candidate.alignment_score
        )?;
        Ok(())
    }
}

impl<W: Write> ResultSink for TextSink<'_, W> {
    fn accept(&mut self, query: &SequenceRecord, result: &QueryResult) -> Result<()> {
        let top = result.top_matches();
        let listed = if self.all_candidates { &result.candidates[..] } else { top };
        for candidate in listed {
            self.write_candidate(candidate)?;
        }

        match top.first() {
            Some(best) => {
                let (name, description) = self.name_and_description(best.sequence);
                writeln!(self.writer, "\nSeems to be: {} - {}", name, description)?;
            }
            None => writeln!(self.writer, "\nNo matches found")?,
        }

        // the query's own entry among all candidates, else the last candidate
        let own = result
            .candidates
            .iter()
            .find(|c| self.name_and_description(c.sequence).0 == query.id)
            .or_else(|| result.candidates.last());
        let (jaccard, score) = own.map_or((0.0, 0), |c| (c.jaccard, c.alignment_score));

        writeln!(
            self.writer,
            "\nInput:       {} - {}",
            query.id,
            query.description.as_deref().unwrap_or("")
        )?;
        writeln!(self.writer, "{}", query.residues)?;
        writeln!(self.writer, "Input-JSI: {:?}  -  Input-Score: {}", jaccard, score)?;
        writeln!(self.writer, "\nFound hashes: {}", result.fingerprint_count)?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::builder::config::FingerprintConfig;
    use crate::database::LookupEntry;
    use crate::matcher::MatchStatus;
    use ahash::AHashMap;
    use std::collections::BTreeMap;

    fn database() -> Database {
        let mut lookup = BTreeMap::new();
        for (id, name, description) in [(0, "P1", Some("first protein")), (1, "P2", None)] {
            lookup.insert(
                id,
                LookupEntry {
                    name: name.into(),
                    description: description.map(String::from),
                    length: 20,
                    fingerprint_count: 4,
                },
            );
        }
        Database::from_parts(FingerprintConfig::default(), None, AHashMap::new(), lookup).unwrap()
    }

    fn candidate(sequence: u32, jaccard: f64, alignment_score: u32) -> CandidateScore {
        CandidateScore { sequence, offset: 0, alignment_score, jaccard, intersection: 4 }
    }

    fn render(result: &QueryResult, query: &SequenceRecord, all: bool) -> String {
        let db = database();
        let mut sink = TextSink::new(Vec::new(), &db).with_all_candidates(all);
        sink.accept(query, result).unwrap();
        String::from_utf8(sink.into_inner()).unwrap()
    }

    #[test]
    fn test_report_with_self_match() {
        let query = SequenceRecord::new("P2", Some("query".into()), "MKTAY");
        let result = QueryResult {
            query_id: "P2".into(),
            fingerprint_count: 4,
            status: MatchStatus::Matched,
            candidates: vec![candidate(0, 1.0, 4), candidate(1, 1.0, 4), candidate(1, 0.25, 1)],
        };
        let expected = "P1 - first protein: Jaccard Index of 1.0 : Score of 4\n\
                        P2 - : Jaccard Index of 1.0 : Score of 4\n\
                        \n\
                        Seems to be: P1 - first protein\n\
                        \n\
                        Input:       P2 - query\n\
                        MKTAY\n\
                        Input-JSI: 1.0  -  Input-Score: 4\n\
                        \n\
                        Found hashes: 4\n";
        assert_eq!(render(&result, &query, false), expected);
        assert_eq!(render(&result, &query, true).lines().count(), expected.lines().count() + 1);
    }

    #[test]
    fn test_input_score_outside_top_matches() {
        let query = SequenceRecord::new("P2", None, "MKTAY");
        let result = QueryResult {
            query_id: "P2".into(),
            fingerprint_count: 4,
            status: MatchStatus::Matched,
            candidates: vec![candidate(0, 1.0, 4), candidate(1, 0.5, 2)],
        };
        let report = render(&result, &query, false);
        assert!(report.starts_with("P1 - first protein: Jaccard Index of 1.0 : Score of 4\n\n"));
        assert!(report.contains("Input-JSI: 0.5  -  Input-Score: 2\n"));

        // an unknown query falls back to the last candidate
        let stranger = SequenceRecord::new("Q9", None, "MKTAY");
        let report = render(&result, &stranger, false);
        assert!(report.contains("Input-JSI: 0.5  -  Input-Score: 2\n"));
    }

    #[test]
    fn test_report_without_match() {
        let query = SequenceRecord::new("X", None, "AC");
        let result = QueryResult {
            query_id: "X".into(),
            fingerprint_count: 0,
            status: MatchStatus::NoMatch,
            candidates: Vec::new(),
        };
        let report = render(&result, &query, false);
        assert!(report.starts_with("\nNo matches found\n"));
        assert!(report.contains("Input-JSI: 0.0  -  Input-Score: 0\n"));
        assert!(report.ends_with("Found hashes: 0\n"));
    }

    #[test]
    fn test_collecting_sink() {
        let mut results: Vec<QueryResult> = Vec::new();
        let query = SequenceRecord::new("X", None, "AC");
        let result = QueryResult {
            query_id: "X".into(),
            fingerprint_count: 0,
            status: MatchStatus::NoMatch,
            candidates: Vec::new(),
        };
        results.accept(&query, &result).unwrap();
        assert_eq!(results, vec![result]);
    }
}
