//! Fixed-width fingerprint layout
//!
//! A fingerprint is a `u32` built from an ordered list of bit fields. The
//! first field ends up in the most significant bits: packing starts from
//! zero and, for every field, shifts the accumulator left by the field width
//! and ORs the value in.
//!
//! The default layout is
//!
//! ```text
//!  31          20 19        10 9          0
//! +--------------+------------+------------+
//! |    delta     | other bin  |    bin     |
//! +--------------+------------+------------+
//! ```
//!
//! optionally followed by two band flags and a Kidera factor id when those
//! features are enabled (the widths of the bin fields shrink accordingly in
//! the configuration). The schema is stored with every database, so a
//! database can always be decoded with the layout it was built with.

use serde::{Deserialize, Serialize};

use crate::constants::{
    max_field_value, BAND_BITS, DEFAULT_DELTA_BITS, DEFAULT_FREQUENCY_BITS, FACTOR_BITS,
    HASH_BITS,
};
use crate::error::{ProtfinError, Result};

/// Semantic meaning of a hash field
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum FieldKind {
    /// Window distance between the two landmarks of a pair
    Delta,
    /// Frequency bin of the later landmark (or the sentinel)
    OtherFrequency,
    /// Frequency bin of the anchor landmark
    Frequency,
    /// Band flags of anchor and partner
    Bands,
    /// Kidera factor discriminator
    Factor,
}

impl FieldKind {
    /// Human-readable name
    pub fn name(self) -> &'static str {
        match self {
            FieldKind::Delta => "delta",
            FieldKind::OtherFrequency => "other frequency",
            FieldKind::Frequency => "frequency",
            FieldKind::Bands => "bands",
            FieldKind::Factor => "factor",
        }
    }
}

/// One field of the layout
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct HashField {
    /// What the field stores
    pub kind: FieldKind,
    /// Width in bits
    pub bits: u8,
}

/// Values of all possible fields of one fingerprint
///
/// Fields absent from a schema are ignored when packing and reported as `0`
/// when unpacking.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct HashComponents {
    /// Window distance
    pub delta: u32,
    /// Bin of the partner landmark
    pub other_bin: u32,
    /// Bin of the anchor landmark
    pub bin: u32,
    /// Band flags: anchor in the high bit, partner in the low bit
    pub bands: u32,
    /// Kidera factor id
    pub factor: u32,
}

impl HashComponents {
    fn get(&self, kind: FieldKind) -> u32 {
        match kind {
            FieldKind::Delta => self.delta,
            FieldKind::OtherFrequency => self.other_bin,
            FieldKind::Frequency => self.bin,
            FieldKind::Bands => self.bands,
            FieldKind::Factor => self.factor,
        }
    }

    fn set(&mut self, kind: FieldKind, value: u32) {
        match kind {
            FieldKind::Delta => self.delta = value,
            FieldKind::OtherFrequency => self.other_bin = value,
            FieldKind::Frequency => self.bin = value,
            FieldKind::Bands => self.bands = value,
            FieldKind::Factor => self.factor = value,
        }
    }
}

/// Ordered list of hash fields, most significant first
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct HashSchema {
    fields: Vec<HashField>,
}

impl HashSchema {
    /// Create a schema and validate it
    pub fn new(fields: Vec<HashField>) -> Result<Self> {
        let schema = Self { fields };
        schema.validate()?;
        Ok(schema)
    }

    /// The 12/10/10 layout: delta, other bin, bin
    pub fn legacy_v1() -> Self {
        Self {
            fields: vec![
                HashField { kind: FieldKind::Delta, bits: DEFAULT_DELTA_BITS },
                HashField { kind: FieldKind::OtherFrequency, bits: DEFAULT_FREQUENCY_BITS },
                HashField { kind: FieldKind::Frequency, bits: DEFAULT_FREQUENCY_BITS },
            ],
        }
    }

    /// Layout for the given widths and optional fields
    pub fn with_widths(
        delta_bits: u8,
        frequency_bits: u8,
        bands: bool,
        factor: bool,
    ) -> Result<Self> {
        let mut fields = vec![
            HashField { kind: FieldKind::Delta, bits: delta_bits },
            HashField { kind: FieldKind::OtherFrequency, bits: frequency_bits },
            HashField { kind: FieldKind::Frequency, bits: frequency_bits },
        ];
        if bands {
            fields.push(HashField { kind: FieldKind::Bands, bits: BAND_BITS });
        }
        if factor {
            fields.push(HashField { kind: FieldKind::Factor, bits: FACTOR_BITS });
        }
        Self::new(fields)
    }

    /// Check that every field has a width and the total fits a fingerprint
    ///
    /// # Errors
    /// [`ProtfinError::HashOverflow`] when the widths sum above 32,
    /// [`ProtfinError::InvalidConfig`] for empty or duplicated fields.
    pub fn validate(&self) -> Result<()> {
        let total_bits = self.total_bits();
        if total_bits > HASH_BITS {
            return Err(ProtfinError::HashOverflow { total_bits, max_bits: HASH_BITS });
        }
        for (i, field) in self.fields.iter().enumerate() {
            if field.bits == 0 {
                return Err(ProtfinError::InvalidConfig(format!(
                    "hash field '{}' has zero width",
                    field.kind.name()
                )));
            }
            if self.fields[..i].iter().any(|f| f.kind == field.kind) {
                return Err(ProtfinError::InvalidConfig(format!(
                    "hash field '{}' appears twice",
                    field.kind.name()
                )));
            }
        }
        Ok(())
    }

    /// Fields in packing order
    pub fn fields(&self) -> &[HashField] {
        &self.fields
    }

    /// Sum of all field widths
    pub fn total_bits(&self) -> u32 {
        self.fields.iter().map(|f| f.bits as u32).sum()
    }

    /// Width of a field, if the schema has it
    pub fn bits_of(&self, kind: FieldKind) -> Option<u8> {
        self.fields.iter().find(|f| f.kind == kind).map(|f| f.bits)
    }

    /// Whether the schema contains a field
    pub fn has(&self, kind: FieldKind) -> bool {
        self.bits_of(kind).is_some()
    }

    /// Other-bin value marking a landmark without partner (all ones)
    pub fn sentinel_other_bin(&self) -> u32 {
        self.bits_of(FieldKind::OtherFrequency).map_or(0, max_field_value)
    }

    /// Pack one value per field, in field order
    ///
    /// # Errors
    /// [`ProtfinError::FieldOverflow`] if a value does not fit its field,
    /// [`ProtfinError::InvalidConfig`] if the number of values is wrong.
    pub fn pack(&self, values: &[u32]) -> Result<u32> {
        if values.len() != self.fields.len() {
            return Err(ProtfinError::InvalidConfig(format!(
                "expected {} hash field values, got {}",
                self.fields.len(),
                values.len()
            )));
        }
        let mut hash = 0u64;
        for (field, &value) in self.fields.iter().zip(values) {
            if value > max_field_value(field.bits) {
                return Err(ProtfinError::FieldOverflow {
                    field: field.kind.name(),
                    value,
                    bits: field.bits,
                });
            }
            hash = (hash << field.bits) | value as u64;
        }
        Ok(hash as u32)
    }

    /// Pack the fields present in the schema from named components
    pub fn pack_components(&self, components: &HashComponents) -> Result<u32> {
        let values: Vec<u32> = self.fields.iter().map(|f| components.get(f.kind)).collect();
        self.pack(&values)
    }

    /// Split a fingerprint into one value per field, in field order
    pub fn unpack(&self, hash: u32) -> Vec<u32> {
        let mut values = vec![0u32; self.fields.len()];
        let mut rest = hash as u64;
        for (slot, field) in values.iter_mut().zip(&self.fields).rev() {
            *slot = (rest & max_field_value(field.bits) as u64) as u32;
            rest >>= field.bits;
        }
        values
    }

    /// Split a fingerprint into named components
    pub fn unpack_components(&self, hash: u32) -> HashComponents {
        let mut components = HashComponents::default();
        for (field, value) in self.fields.iter().zip(self.unpack(hash)) {
            components.set(field.kind, value);
        }
        components
    }
}

impl Default for HashSchema {
    fn default() -> Self {
        Self::legacy_v1()
    }
}
