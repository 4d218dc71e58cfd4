//! Query matching and candidate ranking
//!
//! Scoring a query works on the occurrence lists of every fingerprint it
//! shares with the database:
//!
//! 1. matched occurrences are grouped per candidate sequence
//! 2. the intersection counts matched (query window, candidate window)
//!    pairs, capped per hash at the smaller of both multiplicities, and
//!    gives the Jaccard index against the candidate's fingerprint count
//! 3. the offsets `candidate_window - query_window` of all matched pairs are
//!    counted; the most frequent one is the alignment and its count the
//!    alignment score. Offsets are visited in (hash, query window,
//!    candidate window) order and ties keep the first offset seen
//! 4. candidates are ranked by the [`RankingPolicy`], then by ascending id
//!
//! Every candidate sharing the best (Jaccard, score) pair is a top match.

use std::cmp::Ordering;
use std::fmt;
use std::str::FromStr;

use ahash::AHashMap;
use rayon::prelude::*;

use crate::builder::parse::SequenceRecord;
use crate::database::Database;
use crate::error::{ProtfinError, Result};
use crate::fingerprint::Fingerprints;
use crate::pipeline::Fingerprinter;

/// Primary sort key of the candidate ranking
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum RankingPolicy {
    /// Jaccard index first, alignment score second
    #[default]
    JaccardFirst,
    /// Alignment score first, Jaccard index second
    AlignmentFirst,
}

impl fmt::Display for RankingPolicy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            RankingPolicy::JaccardFirst => write!(f, "jaccard"),
            RankingPolicy::AlignmentFirst => write!(f, "alignment"),
        }
    }
}

impl FromStr for RankingPolicy {
    type Err = ProtfinError;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "jaccard" => Ok(RankingPolicy::JaccardFirst),
            "alignment" => Ok(RankingPolicy::AlignmentFirst),
            other => Err(ProtfinError::InvalidConfig(format!(
                "unknown ranking policy '{}', expected 'jaccard' or 'alignment'",
                other
            ))),
        }
    }
}

/// Similarity of one candidate to the query
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct CandidateScore {
    /// Candidate sequence id
    pub sequence: u32,
    /// Most frequent window offset (candidate - query)
    pub offset: i64,
    /// Number of matched pairs at that offset
    pub alignment_score: u32,
    /// Jaccard index of the fingerprint sets
    pub jaccard: f64,
    /// Size of the fingerprint intersection
    pub intersection: u32,
}

/// Whether a query found any candidate
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MatchStatus {
    /// At least one candidate shares a fingerprint
    Matched,
    /// No fingerprint, or none shared with the database
    NoMatch,
}

/// Ranked candidates of one query
#[derive(Debug, Clone, PartialEq)]
pub struct QueryResult {
    /// Query identifier
    pub query_id: String,
    /// Number of query fingerprints
    pub fingerprint_count: usize,
    /// Match indicator
    pub status: MatchStatus,
    /// Candidates, best first
    pub candidates: Vec<CandidateScore>,
}

impl QueryResult {
    /// Candidates tied with the best on both Jaccard index and score
    pub fn top_matches(&self) -> &[CandidateScore] {
        top_matches(&self.candidates)
    }
}

/// Leading run of candidates sharing the first (Jaccard, score) pair
pub fn top_matches(ranked: &[CandidateScore]) -> &[CandidateScore] {
    let Some(best) = ranked.first() else {
        return ranked;
    };
    let n = ranked
        .iter()
        .take_while(|c| c.jaccard == best.jaccard && c.alignment_score == best.alignment_score)
        .count();
    &ranked[..n]
}

#[derive(Default)]
struct CandidateAccumulator {
    intersection: u32,
    offsets: Vec<(i64, u32)>,
    slots: AHashMap<i64, usize>,
}

impl CandidateAccumulator {
    fn count_offset(&mut self, offset: i64) {
        match self.slots.get(&offset) {
            Some(&slot) => self.offsets[slot].1 += 1,
            None => {
                self.slots.insert(offset, self.offsets.len());
                self.offsets.push((offset, 1));
            }
        }
    }

    /// Most frequent offset, the first seen one on ties
    fn best_offset(&self) -> (i64, u32) {
        let mut best = (0, 0);
        for &(offset, count) in &self.offsets {
            if count > best.1 {
                best = (offset, count);
            }
        }
        best
    }
}

/// Rank the candidates of a query
pub fn score(
    fingerprints: &Fingerprints,
    database: &Database,
    ranking: RankingPolicy,
) -> Vec<CandidateScore> {
    let mut accumulators: AHashMap<u32, CandidateAccumulator> = AHashMap::new();

    let mut groups = fingerprints.groups();
    for (hash, occurrences) in database.query(fingerprints) {
        // both sides are in ascending hash order
        let Some((_, query_entries)) = groups.find(|(h, _)| *h == hash) else {
            continue;
        };
        // occurrence lists are sorted by (sequence, window)
        for candidate in occurrences.chunk_by(|a, b| a.sequence == b.sequence) {
            let acc = accumulators.entry(candidate[0].sequence).or_default();
            acc.intersection += query_entries.len().min(candidate.len()) as u32;
            for (_, query) in query_entries {
                for occ in candidate {
                    acc.count_offset(occ.window as i64 - query.window as i64);
                }
            }
        }
    }

    let query_count = fingerprints.len() as u64;
    let mut candidates: Vec<CandidateScore> = accumulators
        .into_iter()
        .map(|(sequence, acc)| {
            let candidate_count =
                database.lookup(sequence).map_or(0, |e| e.fingerprint_count as u64);
            let intersection = acc.intersection as u64;
            let union = (query_count + candidate_count).saturating_sub(intersection).max(1);
            let (offset, alignment_score) = acc.best_offset();
            CandidateScore {
                sequence,
                offset,
                alignment_score,
                jaccard: intersection as f64 / union as f64,
                intersection: acc.intersection,
            }
        })
        .collect();

    candidates.sort_by(|a, b| compare(a, b, ranking));
    candidates
}

fn compare(a: &CandidateScore, b: &CandidateScore, ranking: RankingPolicy) -> Ordering {
    let by_jaccard = b.jaccard.total_cmp(&a.jaccard);
    let by_score = b.alignment_score.cmp(&a.alignment_score);
    let primary = match ranking {
        RankingPolicy::JaccardFirst => by_jaccard.then(by_score),
        RankingPolicy::AlignmentFirst => by_score.then(by_jaccard),
    };
    primary.then(a.sequence.cmp(&b.sequence))
}

/// Matches queries against one database
#[derive(Debug)]
pub struct Matcher<'a> {
    database: &'a Database,
    fingerprinter: Fingerprinter,
    ranking: RankingPolicy,
}

impl<'a> Matcher<'a> {
    /// Create a matcher fingerprinting queries with the database's settings
    pub fn new(database: &'a Database) -> Result<Self> {
        Ok(Self {
            database,
            fingerprinter: database.fingerprinter()?,
            ranking: RankingPolicy::default(),
        })
    }

    /// Use another ranking policy
    pub fn with_ranking(mut self, ranking: RankingPolicy) -> Self {
        self.ranking = ranking;
        self
    }

    /// Database queried by this matcher
    pub fn database(&self) -> &'a Database {
        self.database
    }

    /// Rank candidates for precomputed query fingerprints
    pub fn score(&self, query_id: &str, fingerprints: &Fingerprints) -> QueryResult {
        let candidates = score(fingerprints, self.database, self.ranking);
        let status = if candidates.is_empty() { MatchStatus::NoMatch } else { MatchStatus::Matched };
        QueryResult {
            query_id: query_id.to_string(),
            fingerprint_count: fingerprints.len(),
            status,
            candidates,
        }
    }

    /// Fingerprint a query sequence and rank candidates
    pub fn match_sequence(&self, record: &SequenceRecord) -> Result<QueryResult> {
        // queries carry no database id; the id field is irrelevant for scoring
        let fingerprints = self.fingerprinter.fingerprint(u32::MAX, &record.residues)?;
        Ok(self.score(&record.id, &fingerprints))
    }

    /// Match many queries in parallel, one result per query in input order
    pub fn match_batch(&self, records: &[SequenceRecord]) -> Vec<Result<QueryResult>> {
        records.par_iter().map(|record| self.match_sequence(record)).collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::builder::config::{BuildConfiguration, FingerprintConfig};
    use crate::builder::DatabaseBuilder;
    use crate::constellation::{ConstellationMap, ConstellationPoint};
    use crate::fingerprint::{FingerprintGenerator, Occurrence, OccurrencePolicy};
    use crate::database::LookupEntry;
    use crate::hash_schema::HashSchema;
    use std::collections::BTreeMap;

    fn candidate(sequence: u32, jaccard: f64, alignment_score: u32) -> CandidateScore {
        CandidateScore { sequence, offset: 0, alignment_score, jaccard, intersection: 1 }
    }

    #[test]
    fn test_ranking_policies() {
        let mut a = vec![candidate(3, 0.5, 2), candidate(1, 0.2, 9), candidate(2, 0.5, 2)];
        a.sort_by(|x, y| compare(x, y, RankingPolicy::JaccardFirst));
        assert_eq!(a.iter().map(|c| c.sequence).collect::<Vec<_>>(), vec![2, 3, 1]);
        assert_eq!(top_matches(&a).len(), 2);

        a.sort_by(|x, y| compare(x, y, RankingPolicy::AlignmentFirst));
        assert_eq!(a.iter().map(|c| c.sequence).collect::<Vec<_>>(), vec![1, 2, 3]);
        assert_eq!(top_matches(&a).len(), 1);
        assert!(top_matches(&[]).is_empty());
    }

    #[test]
    fn test_ranking_parsing() {
        assert_eq!("Jaccard".parse::<RankingPolicy>().unwrap(), RankingPolicy::JaccardFirst);
        assert_eq!("alignment".parse::<RankingPolicy>().unwrap(), RankingPolicy::AlignmentFirst);
        assert!("random".parse::<RankingPolicy>().is_err());
    }

    #[test]
    fn test_offset_ties_keep_first_seen() {
        let mut acc = CandidateAccumulator::default();
        for offset in [4, -1, 4, -1, 7] {
            acc.count_offset(offset);
        }
        assert_eq!(acc.best_offset(), (4, 2));
    }

    /// Database with hand-made occurrence lists
    fn handmade(table: Vec<(u32, Vec<(u32, u32)>)>, counts: &[u32]) -> Database {
        let table = table
            .into_iter()
            .map(|(hash, occ)| {
                let occ = occ.into_iter().map(|(sequence, window)| Occurrence { window, sequence }).collect();
                (hash, occ)
            })
            .collect();
        let lookup: BTreeMap<u32, LookupEntry> = counts
            .iter()
            .enumerate()
            .map(|(i, &count)| {
                let entry = LookupEntry {
                    name: format!("c{}", i),
                    description: None,
                    length: 10,
                    fingerprint_count: count,
                };
                (i as u32, entry)
            })
            .collect();
        Database::from_parts(FingerprintConfig::default(), None, table, lookup).unwrap()
    }

    /// Query fingerprints from (bin, window) landmarks, one sentinel hash each
    /// as long as no two landmarks are two or more windows apart
    fn query(landmarks: &[(u32, u32)]) -> Fingerprints {
        let generator =
            FingerprintGenerator::new(HashSchema::legacy_v1(), 8, OccurrencePolicy::All, 0).unwrap();
        let max_window = landmarks.iter().map(|l| l.1).max().unwrap_or(0);
        let mut windows = vec![Vec::new(); max_window as usize + 1];
        for &(bin, window) in landmarks {
            windows[window as usize].push(ConstellationPoint { window, bin, amplitude: 1.0, band: None });
        }
        generator.generate(&ConstellationMap::from_windows(windows), 0).unwrap()
    }

    fn sentinel(bin: u32) -> u32 {
        HashSchema::legacy_v1().pack(&[0, 1023, bin]).unwrap()
    }

    #[test]
    fn test_jaccard_and_alignment() {
        // query: bins 1 and 2 in adjacent windows -> two sentinel hashes
        let q = query(&[(1, 0), (2, 1)]);
        assert_eq!(q.len(), 2);

        let db = handmade(
            vec![
                (sentinel(1), vec![(0, 5), (1, 0)]),
                (sentinel(2), vec![(0, 6)]),
                (sentinel(3), vec![(1, 3)]),
            ],
            &[2, 4],
        );
        let ranked = score(&q, &db, RankingPolicy::JaccardFirst);
        assert_eq!(ranked.len(), 2);

        // candidate 0 shares both hashes at offset 5: 2 / (2 + 2 - 2)
        assert_eq!(ranked[0].sequence, 0);
        assert_eq!(ranked[0].jaccard, 1.0);
        assert_eq!(ranked[0].offset, 5);
        assert_eq!(ranked[0].alignment_score, 2);

        // candidate 1 shares one hash: 1 / (2 + 4 - 1)
        assert_eq!(ranked[1].sequence, 1);
        assert!((ranked[1].jaccard - 0.2).abs() < 1e-12);
        assert_eq!(ranked[1].offset, 0);
        assert_eq!(ranked[1].alignment_score, 1);
    }

    #[test]
    fn test_intersection_capped_by_multiplicity() {
        // query has the same sentinel hash in windows 0 and 1
        let q = query(&[(1, 0), (1, 1)]);
        assert_eq!(q.len(), 2);
        let db = handmade(vec![(sentinel(1), vec![(0, 4)])], &[1]);
        let ranked = score(&q, &db, RankingPolicy::JaccardFirst);
        assert_eq!(ranked[0].intersection, 1);
        assert!((ranked[0].jaccard - 0.5).abs() < 1e-12);
        // offsets 4 and 3 both seen once; the first (query window 0) wins
        assert_eq!(ranked[0].offset, 4);
        assert!(ranked[0].jaccard <= 1.0);
    }

    #[test]
    fn test_no_shared_hash() {
        let q = query(&[(9, 0)]);
        let db = handmade(vec![(sentinel(1), vec![(0, 0)])], &[1]);
        assert!(score(&q, &db, RankingPolicy::JaccardFirst).is_empty());

        let matcher = Matcher::new(&db).unwrap();
        let result = matcher.score("q", &q);
        assert_eq!(result.status, MatchStatus::NoMatch);
        assert!(result.top_matches().is_empty());

        let empty = matcher.score("q", &Fingerprints::default());
        assert_eq!(empty.status, MatchStatus::NoMatch);
        assert_eq!(empty.fingerprint_count, 0);
    }

    #[test]
    fn test_self_match_and_batch() {
        let records: Vec<SequenceRecord> = [
            "MKTAYIAKQRQISFVKSHFSRQLEERLGLIEVQAPILSRVGDGTQDNLSGAEKAVQVKVKALPDAQ",
            "MVLSPADKTNVKAAWGKVGAHAGEYGAEALERMFLSFPTTKTYFPHFDLSHGSAQVKGHGKKVADAL",
            "MSTNPKPQRKTKRNTNRRPQDVKFPGGGQIVGGVYLLPRRGPRLGVRATRKTSERSQPRGRRQPIPK",
        ]
        .iter()
        .enumerate()
        .map(|(i, s)| SequenceRecord::new(format!("p{}", i), None, *s))
        .collect();
        let config = BuildConfiguration {
            fingerprint: FingerprintConfig::new(10, 5).unwrap(),
            num_threads: 2,
            max_index_ratio: None,
            verbose: false,
            ..BuildConfiguration::default()
        };
        let (db, _) = DatabaseBuilder::new(config).unwrap().build_from_records(records.clone()).unwrap();

        let matcher = Matcher::new(&db).unwrap();
        let results = matcher.match_batch(&records);
        assert_eq!(results.len(), 3);
        for (i, result) in results.into_iter().enumerate() {
            let result = result.unwrap();
            assert_eq!(result.status, MatchStatus::Matched);
            assert_eq!(result.query_id, format!("p{}", i));
            let best = result.candidates[0];
            assert_eq!(best.sequence, i as u32);
            assert_eq!(best.jaccard, 1.0);
            assert_eq!(best.offset, 0);
            assert_eq!(best.alignment_score as usize, result.fingerprint_count);
            assert!(result.candidates.iter().all(|c| c.jaccard > 0.0 && c.jaccard <= 1.0));
        }
    }
}
