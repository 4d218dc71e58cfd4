//! Constants and defaults for protfin
//!
//! This module defines the default pipeline parameters, the hash field
//! widths and the resource limits used throughout the library.

/// Version number
pub const VERSION: (u8, u8, u8) = (0, 1, 0);

/// Width of a fingerprint in bits
pub const HASH_BITS: u32 = 32;

/// Default bit width of the frequency bin fields
pub const DEFAULT_FREQUENCY_BITS: u8 = 10;

/// Default bit width of the window distance field
pub const DEFAULT_DELTA_BITS: u8 = 12;

/// Bit width of the band flags field (one flag per landmark of a pair)
pub const BAND_BITS: u8 = 2;

/// Bit width of the Kidera factor discriminator field
pub const FACTOR_BITS: u8 = 4;

/// Default analysis window size (in residues)
pub const DEFAULT_WINDOW_SIZE: usize = 30;

/// Default overlap between consecutive windows (half the default window)
pub const DEFAULT_OVERLAP: usize = DEFAULT_WINDOW_SIZE / 2;

/// Default number of landmarks kept per window
pub const DEFAULT_N_PEAKS: usize = 3;

/// Default maximum window distance between paired landmarks (target zone)
pub const DEFAULT_MAX_PAIR_DISTANCE: u32 = 8;

/// Smallest window distance that produces a pair hash
pub const MIN_PAIR_DISTANCE: u32 = 2;

/// Default lower significance threshold for the quantile peak policy
pub const DEFAULT_LOWER_QUANTILE: f64 = 0.05;

/// Default upper significance threshold for the quantile peak policy
pub const DEFAULT_UPPER_QUANTILE: f64 = 0.95;

/// Decimal places kept from spectral amplitudes
pub const AMPLITUDE_DECIMALS: i32 = 9;

/// Default limit of the projected index size relative to the corpus size
pub const DEFAULT_MAX_INDEX_RATIO: f64 = 6.0;

/// Number of sequences between two resource guard checks
pub const GUARD_INTERVAL: usize = 100;

/// Compute the largest value representable with `bits` bits.
///
/// Returns `u32::MAX` for widths of 32 bits or more.
#[inline]
pub const fn max_field_value(bits: u8) -> u32 {
    if bits >= 32 {
        u32::MAX
    } else {
        (1u32 << bits) - 1
    }
}
