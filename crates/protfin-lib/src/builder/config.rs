//! Configuration for fingerprinting and database construction
//!
//! [`FingerprintConfig`] holds every parameter that changes the produced
//! fingerprints; it is stored with the database so queries are always
//! fingerprinted exactly like the indexed corpus. [`BuildConfiguration`]
//! adds the parameters that only affect how a build runs.

use serde::{Deserialize, Serialize};

use crate::constants::*;
use crate::error::{ProtfinError, Result};
use crate::fingerprint::OccurrencePolicy;
use crate::hash_schema::HashSchema;
use crate::kidera::{num_factors, DEFAULT_KIDERA_FACTOR, KIDERA_FACTOR_NAMES};
use crate::peaks::PeakPolicy;
use crate::quantile::validate_quantiles;

/// Parameters of the fingerprinting pipeline
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FingerprintConfig {
    /// Number of residues per analysis window
    pub window_size: usize,

    /// Residues shared by consecutive windows (clamped to `window_size - 1`)
    pub overlap: usize,

    /// Landmarks kept per window (0 = all)
    pub n_peaks: usize,

    /// Landmark selection policy
    pub peak_policy: PeakPolicy,

    /// Lower significance quantile (quantile policy)
    pub lower_quantile: f64,

    /// Upper significance quantile (quantile policy)
    pub upper_quantile: f64,

    /// Kidera factor row used as signal
    pub kidera_factor: usize,

    /// Shift table values to non-negatives
    pub normalize: bool,

    /// Pack the Kidera factor id into every fingerprint
    pub factor_discriminator: bool,

    /// Pack the band flags of both landmarks (quantile policy only)
    pub band_flags: bool,

    /// Largest window distance between paired landmarks
    pub max_pair_distance: u32,

    /// Width of each frequency bin field
    pub frequency_bits: u8,

    /// Width of the window distance field
    pub delta_bits: u8,

    /// Which occurrences of a hash are kept per sequence
    pub occurrence_policy: OccurrencePolicy,
}

impl Default for FingerprintConfig {
    fn default() -> Self {
        Self {
            window_size: DEFAULT_WINDOW_SIZE,
            overlap: DEFAULT_OVERLAP,
            n_peaks: DEFAULT_N_PEAKS,
            peak_policy: PeakPolicy::Prominence,
            lower_quantile: DEFAULT_LOWER_QUANTILE,
            upper_quantile: DEFAULT_UPPER_QUANTILE,
            kidera_factor: DEFAULT_KIDERA_FACTOR,
            normalize: true,
            factor_discriminator: false,
            band_flags: false,
            max_pair_distance: DEFAULT_MAX_PAIR_DISTANCE,
            frequency_bits: DEFAULT_FREQUENCY_BITS,
            delta_bits: DEFAULT_DELTA_BITS,
            occurrence_policy: OccurrencePolicy::First,
        }
    }
}

impl FingerprintConfig {
    /// Create a configuration with the given window layout
    pub fn new(window_size: usize, overlap: usize) -> Result<Self> {
        let config = Self { window_size, overlap, ..Self::default() };
        config.validate()?;
        Ok(config)
    }

    /// Hash layout described by this configuration
    pub fn schema(&self) -> Result<HashSchema> {
        HashSchema::with_widths(
            self.delta_bits,
            self.frequency_bits,
            self.band_flags,
            self.factor_discriminator,
        )
    }

    /// Validate the configuration parameters
    ///
    /// Runs before any sequence is processed, so a layout that cannot be
    /// packed fails up front.
    pub fn validate(&self) -> Result<()> {
        self.schema()?;

        if self.window_size == 0 {
            return Err(ProtfinError::InvalidConfig("window_size must be positive".into()));
        }
        let highest_bin = (self.window_size / 2) as u32;
        if highest_bin > max_field_value(self.frequency_bits) {
            return Err(ProtfinError::InvalidConfig(format!(
                "window_size={} produces bin {} which does not fit {} frequency bits",
                self.window_size, highest_bin, self.frequency_bits
            )));
        }

        if self.kidera_factor >= num_factors() {
            return Err(ProtfinError::InvalidFactor {
                index: self.kidera_factor,
                available: num_factors(),
            });
        }

        if self.max_pair_distance < MIN_PAIR_DISTANCE {
            return Err(ProtfinError::InvalidConfig(format!(
                "max_pair_distance must be at least {}, got {}",
                MIN_PAIR_DISTANCE, self.max_pair_distance
            )));
        }

        if self.peak_policy == PeakPolicy::Quantile {
            validate_quantiles(self.lower_quantile, self.upper_quantile)?;
        } else if self.band_flags {
            return Err(ProtfinError::InvalidConfig(
                "band flags require the quantile peak policy".into(),
            ));
        }

        Ok(())
    }

    /// Log configuration parameters via tracing
    pub fn print(&self) {
        tracing::info!("Fingerprint Configuration:");
        tracing::info!("  window_size = {}", self.window_size);
        tracing::info!("  overlap = {}", self.overlap);
        tracing::info!("  n_peaks = {}", self.n_peaks);
        tracing::info!("  peak_policy = {}", self.peak_policy);
        if self.peak_policy == PeakPolicy::Quantile {
            tracing::info!("  quantiles = [{}, {}]", self.lower_quantile, self.upper_quantile);
        }
        tracing::info!(
            "  kidera_factor = {} ({})",
            self.kidera_factor,
            KIDERA_FACTOR_NAMES.get(self.kidera_factor).copied().unwrap_or("?")
        );
        tracing::debug!("  normalize = {}", self.normalize);
        tracing::debug!("  factor_discriminator = {}", self.factor_discriminator);
        tracing::debug!("  band_flags = {}", self.band_flags);
        tracing::info!("  max_pair_distance = {}", self.max_pair_distance);
        tracing::debug!("  frequency_bits = {}", self.frequency_bits);
        tracing::debug!("  delta_bits = {}", self.delta_bits);
        tracing::info!("  occurrence_policy = {}", self.occurrence_policy);
    }
}

/// Configuration parameters for building a fingerprint database
#[derive(Debug, Clone)]
pub struct BuildConfiguration {
    /// Fingerprinting parameters
    pub fingerprint: FingerprintConfig,

    /// Number of threads for parallel operations (0 = all available cores)
    pub num_threads: usize,

    /// Number of corpus partitions (0 = one per thread)
    pub num_partitions: usize,

    /// Largest allowed projected index size relative to the corpus size
    /// (`None` disables the guard)
    pub max_index_ratio: Option<f64>,

    /// Verbose output during construction
    pub verbose: bool,
}

impl Default for BuildConfiguration {
    fn default() -> Self {
        Self {
            fingerprint: FingerprintConfig::default(),
            num_threads: 0, // 0 = use all available cores
            num_partitions: 0,
            max_index_ratio: Some(DEFAULT_MAX_INDEX_RATIO),
            verbose: true,
        }
    }
}

impl BuildConfiguration {
    /// Create a build configuration around fingerprint parameters
    pub fn new(fingerprint: FingerprintConfig) -> Result<Self> {
        let config = Self { fingerprint, ..Self::default() };
        config.validate()?;
        Ok(config)
    }

    /// Validate the configuration parameters
    pub fn validate(&self) -> Result<()> {
        self.fingerprint.validate()?;

        if let Some(ratio) = self.max_index_ratio {
            if !(ratio > 0.0 && ratio.is_finite()) {
                return Err(ProtfinError::InvalidConfig(format!(
                    "max_index_ratio must be a positive number, got {}",
                    ratio
                )));
            }
        }

        Ok(())
    }

    /// Log configuration parameters via tracing
    pub fn print(&self) {
        tracing::info!("Build Configuration:");
        if self.num_threads == 0 {
            tracing::info!("  num_threads = all available cores");
        } else {
            tracing::info!("  num_threads = {}", self.num_threads);
        }
        if self.num_partitions == 0 {
            tracing::info!("  num_partitions = one per thread");
        } else {
            tracing::info!("  num_partitions = {}", self.num_partitions);
        }
        match self.max_index_ratio {
            Some(ratio) => tracing::info!("  max_index_ratio = {}", ratio),
            None => tracing::info!("  max_index_ratio = unlimited"),
        }
        tracing::debug!("  verbose = {}", self.verbose);
        self.fingerprint.print();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config() {
        let config = BuildConfiguration::default();
        assert_eq!(config.fingerprint.window_size, 30);
        assert_eq!(config.fingerprint.overlap, 15);
        assert!(config.validate().is_ok());
        assert_eq!(config.fingerprint.schema().unwrap(), HashSchema::legacy_v1());
    }

    #[test]
    fn test_new_config() {
        let config = FingerprintConfig::new(2, 0).unwrap();
        assert_eq!(config.window_size, 2);
        assert_eq!(config.overlap, 0);
        assert!(FingerprintConfig::new(0, 0).is_err());
    }

    #[test]
    fn test_validate_forty_bits() {
        let config = FingerprintConfig { delta_bits: 20, ..FingerprintConfig::default() };
        assert!(matches!(
            config.validate(),
            Err(ProtfinError::HashOverflow { total_bits: 40, max_bits: 32 })
        ));
    }

    #[test]
    fn test_validate_bins_fit_frequency_field() {
        let config = FingerprintConfig {
            window_size: 600,
            frequency_bits: 8,
            ..FingerprintConfig::default()
        };
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_validate_factor_and_distance() {
        let config = FingerprintConfig { kidera_factor: 10, ..FingerprintConfig::default() };
        assert!(matches!(config.validate(), Err(ProtfinError::InvalidFactor { .. })));

        let config = FingerprintConfig { max_pair_distance: 1, ..FingerprintConfig::default() };
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_validate_band_flags_need_quantile_policy() {
        let config = FingerprintConfig {
            band_flags: true,
            frequency_bits: 9,
            ..FingerprintConfig::default()
        };
        assert!(config.validate().is_err());

        let config = FingerprintConfig { peak_policy: PeakPolicy::Quantile, ..config };
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_validate_quantiles() {
        let config = FingerprintConfig {
            peak_policy: PeakPolicy::Quantile,
            lower_quantile: 0.9,
            upper_quantile: 0.1,
            ..FingerprintConfig::default()
        };
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_validate_index_ratio() {
        let config = BuildConfiguration { max_index_ratio: Some(0.0), ..BuildConfiguration::default() };
        assert!(config.validate().is_err());
        let config = BuildConfiguration { max_index_ratio: None, ..BuildConfiguration::default() };
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_serialization() {
        let config = FingerprintConfig {
            window_size: 16,
            overlap: 4,
            peak_policy: PeakPolicy::Quantile,
            band_flags: true,
            factor_discriminator: true,
            frequency_bits: 8,
            delta_bits: 10,
            occurrence_policy: OccurrencePolicy::All,
            ..FingerprintConfig::default()
        };
        let bytes = bincode::serialize(&config).expect("serialize failed");
        let restored: FingerprintConfig = bincode::deserialize(&bytes).expect("deserialize failed");
        assert_eq!(restored, config);
        assert!(restored.validate().is_ok());
    }
}
