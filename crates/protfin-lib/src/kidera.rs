//! Kidera factor feature mapping
//!
//! Turns an amino acid sequence into a signal: every residue is replaced by
//! its value in one row of the Kidera physicochemical property table.
//!
//! The 20 standard residues are extended by group symbols (`X`, `B`, `Z`,
//! `J`, `Ψ`, `Ω`, `Φ`, `ζ`, `Π`, `+`, `-`) whose value is the mean of their
//! member residues. Symbols outside the extended table map to `0.0` and are
//! reported through `tracing::warn!`.

use ahash::{AHashMap, AHashSet};
use tracing::warn;

use crate::error::{ProtfinError, Result};

/// The 20 standard amino acids in table column order
pub const AMINO_ACIDS: [char; 20] = [
    'A', 'R', 'N', 'D', 'C', 'Q', 'E', 'G', 'H', 'I',
    'L', 'K', 'M', 'F', 'P', 'S', 'T', 'W', 'Y', 'V',
];

/// Names of the Kidera factors in table row order
pub const KIDERA_FACTOR_NAMES: [&str; 10] = [
    "Helix/bend preference",
    "Side-chain size",
    "Extended structure preference",
    "Hydrophobicity",
    "Double-bend preference",
    "Partial specific volume",
    "Flat extended preference",
    "Occurrence in alpha region",
    "pK-C",
    "Surrounding hydrophobicity",
];

/// Default factor row: Hydrophobicity
pub const DEFAULT_KIDERA_FACTOR: usize = 3;

/// Kidera et al. (1985) factor table, one row per factor, columns in
/// [`AMINO_ACIDS`] order
#[rustfmt::skip]
pub const KIDERA_TABLE: [[f64; 20]; 10] = [
    //  A      R      N      D      C      Q      E      G      H      I      L      K      M      F      P      S      T      W      Y      V
    [-1.56,  0.22,  1.14,  0.58,  0.12, -0.47, -1.45,  1.46, -0.41, -0.73, -1.04, -0.34, -1.40, -0.21,  2.06,  0.81,  0.26,  0.30,  1.38, -0.74],
    [-1.67,  1.27, -0.07, -0.22, -0.89,  0.24,  0.19, -1.96,  0.52, -0.16,  0.00,  0.82,  0.18,  0.98, -0.33, -1.08, -0.70,  2.10,  1.48, -0.71],
    [-0.97,  1.37, -0.12, -1.58,  0.45,  0.07, -1.61, -0.23, -0.28,  1.79, -0.24, -0.23, -0.42, -0.36, -1.15,  0.16,  1.21, -0.72,  0.80,  2.04],
    [-0.27,  1.87,  0.81,  0.81, -1.05,  1.10,  1.17, -0.16,  0.28, -0.77, -1.10,  1.70, -0.73, -1.43, -0.75,  0.42,  0.63, -1.57, -0.56, -0.40],
    [-0.93, -1.70,  0.18, -0.92, -0.71,  1.10, -0.71,  0.10,  1.64,  0.03, -0.55,  1.54,  2.00,  0.22,  0.88, -0.21, -0.10, -0.21,  0.57, -0.31],
    [-0.78,  0.46,  0.37,  0.15,  2.41,  0.59,  1.01, -0.11,  0.47, -0.45, -0.71,  0.32,  1.52, -0.81, -0.45, -0.43, -0.15, -0.75, -2.30, -0.04],
    [-0.20,  0.92, -0.09, -1.52,  1.52,  0.84, -1.12,  0.78,  0.68,  0.20,  0.06,  0.55, -1.53, -0.75, -0.72,  0.73,  0.53,  0.90, -1.32,  1.53],
    [-0.08, -0.39,  1.23,  0.47, -0.36, -0.19, -0.05,  1.46,  0.70, -0.81, -0.79, -0.56, -0.85,  0.92, -0.38,  0.08, -0.05,  0.02,  1.01,  0.13],
    [ 0.21,  0.23,  1.10, -1.45,  0.05,  0.70,  1.03,  0.47, -0.05,  0.24,  0.40, -0.27, -0.47,  0.67,  0.71,  0.27, -0.24, -0.22,  0.05, -0.24],
    [-0.48,  0.93, -0.28,  0.75, -0.62, -0.10, -0.24, -0.48,  0.35,  0.45,  0.08,  0.86,  0.35,  0.53, -0.31, -1.11,  0.31,  0.82,  0.22,  0.72],
];

/// Group symbols and the residues they stand for (`None` means all 20)
const GROUP_SYMBOLS: [(char, Option<&str>); 11] = [
    ('X', None),
    ('B', Some("DN")),
    ('Z', Some("EQ")),
    ('J', Some("IL")),
    ('Ψ', Some("ILMV")),
    ('Ω', Some("FWYH")),
    ('Φ', Some("ILMVFWY")),
    ('ζ', Some("DEHKNQRST")),
    ('Π', Some("AGPS")),
    ('+', Some("KRH")),
    ('-', Some("DE")),
];

/// Number of factor rows in the property table
pub const fn num_factors() -> usize {
    KIDERA_TABLE.len()
}

/// Additive constant that makes every table value non-negative
///
/// This is the absolute value of the global minimum over the whole table,
/// not over one row, so signals stay comparable across factors and runs.
pub fn normalization_shift() -> f64 {
    KIDERA_TABLE
        .iter()
        .flat_map(|row| row.iter().copied())
        .fold(f64::INFINITY, f64::min)
        .abs()
}

/// Maps residues to the values of one Kidera factor
#[derive(Debug, Clone)]
pub struct FeatureMapper {
    factor: usize,
    normalize: bool,
    values: AHashMap<char, f32>,
}

impl FeatureMapper {
    /// Create a mapper for the given factor row
    ///
    /// # Errors
    /// Returns [`ProtfinError::InvalidFactor`] if `factor` is not a row of
    /// the table.
    pub fn new(factor: usize, normalize: bool) -> Result<Self> {
        let row = KIDERA_TABLE.get(factor).ok_or(ProtfinError::InvalidFactor {
            index: factor,
            available: num_factors(),
        })?;

        let shift = if normalize { normalization_shift() } else { 0.0 };

        let mut values = AHashMap::with_capacity(AMINO_ACIDS.len() + GROUP_SYMBOLS.len());
        for (&aa, &value) in AMINO_ACIDS.iter().zip(row.iter()) {
            values.insert(aa, (value + shift) as f32);
        }

        for (symbol, members) in GROUP_SYMBOLS {
            let member_values: Vec<f32> = match members {
                Some(members) => members.chars().map(|aa| values[&aa]).collect(),
                None => AMINO_ACIDS.iter().map(|aa| values[aa]).collect(),
            };
            let mean = member_values.iter().map(|&v| v as f64).sum::<f64>()
                / member_values.len() as f64;
            values.insert(symbol, mean as f32);
        }

        Ok(Self { factor, normalize, values })
    }

    /// Transform a sequence into its feature vector
    ///
    /// Unknown symbols become `0.0`; each distinct unknown symbol is
    /// reported once per call.
    pub fn map(&self, residues: &str) -> Vec<f32> {
        let mut reported: AHashSet<char> = AHashSet::new();
        residues
            .chars()
            .map(|aa| match self.values.get(&aa) {
                Some(&value) => value,
                None => {
                    if reported.insert(aa) {
                        warn!("No known Kidera factor value for {:?}, treating as zero", aa);
                    }
                    0.0
                }
            })
            .collect()
    }

    /// Value of a single symbol, if it is part of the extended table
    pub fn value(&self, symbol: char) -> Option<f32> {
        self.values.get(&symbol).copied()
    }

    /// Selected factor row
    pub fn factor(&self) -> usize {
        self.factor
    }

    /// Whether the table values are shifted to non-negatives
    pub fn normalize(&self) -> bool {
        self.normalize
    }
}

/// Transform a sequence with a freshly built mapper
///
/// Prefer building one [`FeatureMapper`] and reusing it for many sequences.
pub fn map(residues: &str, factor: usize, normalize: bool) -> Result<Vec<f32>> {
    Ok(FeatureMapper::new(factor, normalize)?.map(residues))
}
