//! Combinatorial fingerprints from constellation maps
//!
//! Every landmark (the anchor) is paired with every landmark of the
//! following `max_pair_distance` windows. A pair whose window distance is
//! below [`MIN_PAIR_DISTANCE`] or does not fit the delta field is skipped.
//! An anchor left without any partner still contributes one fingerprint:
//! delta `0` against the sentinel other-bin (all ones).

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::constants::{max_field_value, MIN_PAIR_DISTANCE};
use crate::constellation::{ConstellationMap, ConstellationPoint};
use crate::error::{ProtfinError, Result};
use crate::hash_schema::{FieldKind, HashComponents, HashSchema};

/// Where a fingerprint was seen
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Occurrence {
    /// Window index of the anchor landmark
    pub window: u32,
    /// Sequence id
    pub sequence: u32,
}

/// Which occurrences of a hash within one sequence are kept
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum OccurrencePolicy {
    /// Only the earliest window per hash
    #[default]
    First,
    /// Every distinct window per hash
    All,
}

impl fmt::Display for OccurrencePolicy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            OccurrencePolicy::First => write!(f, "first"),
            OccurrencePolicy::All => write!(f, "all"),
        }
    }
}

impl FromStr for OccurrencePolicy {
    type Err = ProtfinError;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "first" => Ok(OccurrencePolicy::First),
            "all" => Ok(OccurrencePolicy::All),
            other => Err(ProtfinError::InvalidConfig(format!(
                "unknown occurrence policy '{}', expected 'first' or 'all'",
                other
            ))),
        }
    }
}

/// Fingerprints of one sequence, sorted by (hash, window)
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Fingerprints {
    sequence: u32,
    entries: Vec<(u32, Occurrence)>,
}

impl Fingerprints {
    /// Sequence the fingerprints belong to
    pub fn sequence(&self) -> u32 {
        self.sequence
    }

    /// Number of (hash, occurrence) entries
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// Whether no fingerprint was produced
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// All entries in (hash, window) order
    pub fn entries(&self) -> &[(u32, Occurrence)] {
        &self.entries
    }

    /// Distinct hashes in ascending order
    pub fn hashes(&self) -> impl Iterator<Item = u32> + '_ {
        let mut last = None;
        self.entries.iter().filter_map(move |&(hash, _)| {
            if last == Some(hash) {
                None
            } else {
                last = Some(hash);
                Some(hash)
            }
        })
    }

    /// Entries grouped by hash: `(hash, windows)` in ascending hash order
    pub fn groups(&self) -> impl Iterator<Item = (u32, &[(u32, Occurrence)])> + '_ {
        self.entries
            .chunk_by(|a, b| a.0 == b.0)
            .map(|chunk| (chunk[0].0, chunk))
    }

    /// Consume into the sorted entries
    pub fn into_entries(self) -> Vec<(u32, Occurrence)> {
        self.entries
    }
}

/// Turns constellation maps into fingerprints
#[derive(Debug, Clone)]
pub struct FingerprintGenerator {
    schema: HashSchema,
    max_pair_distance: u32,
    max_delta: u32,
    policy: OccurrencePolicy,
    factor_id: u32,
}

impl FingerprintGenerator {
    /// Create a generator
    ///
    /// `factor_id` is only packed when the schema has a factor field.
    ///
    /// # Errors
    /// Fails if the schema is invalid, it lacks one of the mandatory fields,
    /// or `factor_id` does not fit the factor field.
    pub fn new(
        schema: HashSchema,
        max_pair_distance: u32,
        policy: OccurrencePolicy,
        factor_id: u32,
    ) -> Result<Self> {
        schema.validate()?;
        let delta_bits = schema.bits_of(FieldKind::Delta);
        let (Some(delta_bits), true, true) = (
            delta_bits,
            schema.has(FieldKind::OtherFrequency),
            schema.has(FieldKind::Frequency),
        ) else {
            return Err(ProtfinError::InvalidConfig(
                "hash schema needs delta, other frequency and frequency fields".into(),
            ));
        };
        if let Some(bits) = schema.bits_of(FieldKind::Factor) {
            if factor_id > max_field_value(bits) {
                return Err(ProtfinError::FieldOverflow {
                    field: FieldKind::Factor.name(),
                    value: factor_id,
                    bits,
                });
            }
        }

        Ok(Self {
            schema,
            max_pair_distance,
            max_delta: max_field_value(delta_bits),
            policy,
            factor_id,
        })
    }

    /// Hash layout in use
    pub fn schema(&self) -> &HashSchema {
        &self.schema
    }

    /// Occurrence policy in use
    pub fn policy(&self) -> OccurrencePolicy {
        self.policy
    }

    /// Call `f(hash, anchor_window)` for every fingerprint of the map
    ///
    /// Fingerprints are visited in anchor order (window, then bin), each
    /// anchor's pairs by partner (window, bin), and the sentinel hash right
    /// after an anchor that had no partner. No deduplication happens here.
    pub fn for_each_pair<F>(&self, map: &ConstellationMap, mut f: F) -> Result<()>
    where
        F: FnMut(u32, u32) -> Result<()>,
    {
        let num_windows = map.num_windows();
        let sentinel = self.schema.sentinel_other_bin();

        for (i, anchors) in map.windows().enumerate() {
            let last = num_windows.min(i + 1 + self.max_pair_distance as usize);
            for anchor in anchors {
                let mut paired = false;
                for j in (i + 1)..last {
                    let delta = (j - i) as u32;
                    if delta < MIN_PAIR_DISTANCE || delta > self.max_delta {
                        continue;
                    }
                    for partner in map.window(j) {
                        f(self.pack(anchor, partner.bin, delta, Some(partner))?, anchor.window)?;
                        paired = true;
                    }
                }
                if !paired {
                    let hash = self.pack(anchor, sentinel, 0, None)?;
                    f(hash, anchor.window)?;
                }
            }
        }
        Ok(())
    }

    /// Generate the fingerprints of one sequence under the occurrence policy
    pub fn generate(&self, map: &ConstellationMap, sequence: u32) -> Result<Fingerprints> {
        let mut entries = Vec::new();
        self.for_each_pair(map, |hash, window| {
            entries.push((hash, Occurrence { window, sequence }));
            Ok(())
        })?;

        entries.sort_unstable_by_key(|&(hash, occ)| (hash, occ.window));
        match self.policy {
            OccurrencePolicy::First => entries.dedup_by_key(|entry| entry.0),
            OccurrencePolicy::All => entries.dedup(),
        }

        Ok(Fingerprints { sequence, entries })
    }

    fn pack(
        &self,
        anchor: &ConstellationPoint,
        other_bin: u32,
        delta: u32,
        partner: Option<&ConstellationPoint>,
    ) -> Result<u32> {
        let band_bit = |p: Option<&ConstellationPoint>| p.and_then(|p| p.band).map_or(0, |b| b.bit());
        let components = HashComponents {
            delta,
            other_bin,
            bin: anchor.bin,
            bands: (band_bit(Some(anchor)) << 1) | band_bit(partner),
            factor: self.factor_id,
        };
        self.schema.pack_components(&components)
    }
}
