//! Sequence to fingerprints pipeline
//!
//! A [`Fingerprinter`] chains the feature mapper, the landmark extractor and
//! the fingerprint generator under one validated [`FingerprintConfig`]. It
//! is immutable after construction and shared freely between threads.

use std::sync::Arc;

use crate::builder::config::FingerprintConfig;
use crate::constellation::{ConstellationMap, LandmarkExtractor};
use crate::error::{ProtfinError, Result};
use crate::fingerprint::{FingerprintGenerator, Fingerprints};
use crate::kidera::FeatureMapper;
use crate::peaks::{PeakPicker, PeakPolicy, ProminencePicker, QuantilePicker};
use crate::quantile::QuantileReference;
use crate::spectrum::WindowLayout;

/// Fingerprints sequences with one fixed configuration
#[derive(Debug, Clone)]
pub struct Fingerprinter {
    config: FingerprintConfig,
    reference: Option<Arc<QuantileReference>>,
    mapper: FeatureMapper,
    extractor: LandmarkExtractor,
    generator: FingerprintGenerator,
}

impl Fingerprinter {
    /// Validate the configuration and assemble the pipeline
    ///
    /// The quantile policy needs a `reference` whose bins match the window
    /// size; the prominence policy ignores it.
    pub fn new(
        config: FingerprintConfig,
        reference: Option<Arc<QuantileReference>>,
    ) -> Result<Self> {
        config.validate()?;

        let mapper = FeatureMapper::new(config.kidera_factor, config.normalize)?;

        let picker: Arc<dyn PeakPicker> = match config.peak_policy {
            PeakPolicy::Prominence => Arc::new(ProminencePicker::new(config.n_peaks)),
            PeakPolicy::Quantile => {
                let reference = reference.clone().ok_or_else(|| {
                    ProtfinError::InvalidConfig(
                        "the quantile peak policy needs a quantile reference".into(),
                    )
                })?;
                reference.check(config.window_size)?;
                Arc::new(QuantilePicker::new(reference, config.n_peaks))
            }
        };
        let reference = match config.peak_policy {
            PeakPolicy::Quantile => reference,
            PeakPolicy::Prominence => None,
        };

        let extractor =
            LandmarkExtractor::new(WindowLayout::new(config.window_size, config.overlap), picker);

        let generator = FingerprintGenerator::new(
            config.schema()?,
            config.max_pair_distance,
            config.occurrence_policy,
            config.kidera_factor as u32,
        )?;

        Ok(Self { config, reference, mapper, extractor, generator })
    }

    /// Configuration in use
    pub fn config(&self) -> &FingerprintConfig {
        &self.config
    }

    /// Quantile reference in use, if the quantile policy is active
    pub fn reference(&self) -> Option<&Arc<QuantileReference>> {
        self.reference.as_ref()
    }

    /// Fingerprint generator in use
    pub fn generator(&self) -> &FingerprintGenerator {
        &self.generator
    }

    /// Landmarks of a sequence
    pub fn constellation(&self, residues: &str) -> ConstellationMap {
        let features = self.mapper.map(residues);
        self.extractor.extract(&features)
    }

    /// Fingerprints of a sequence
    pub fn fingerprint(&self, sequence: u32, residues: &str) -> Result<Fingerprints> {
        let map = self.constellation(residues);
        self.generator.generate(&map, sequence)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::quantile::BinStatistics;

    fn assert_send_sync<T: Send + Sync>() {}

    #[test]
    fn test_fingerprinter_is_shareable() {
        assert_send_sync::<Fingerprinter>();
    }

    #[test]
    fn test_fingerprint_is_deterministic() {
        let fp = Fingerprinter::new(FingerprintConfig::default(), None).unwrap();
        let seq = "MKTAYIAKQRQISFVKSHFSRQLEERLGLIEVQAPILSRVGDGTQDNLSGAEKAVQVKVKALPDAQ";
        let a = fp.fingerprint(0, seq).unwrap();
        let b = fp.fingerprint(0, seq).unwrap();
        assert!(!a.is_empty());
        assert_eq!(a, b);
    }

    #[test]
    fn test_short_sequence_example() {
        let config = FingerprintConfig::new(2, 0).unwrap();
        let fp = Fingerprinter::new(config, None).unwrap();

        let map = fp.constellation("AAAACC");
        assert_eq!(map.num_windows(), 3);
        assert_eq!(map.num_points(), 3);

        // window 0 pairs with window 2; windows 1 and 2 fall back to the sentinel
        let mut emitted = Vec::new();
        fp.generator()
            .for_each_pair(&map, |hash, window| {
                emitted.push((hash, window));
                Ok(())
            })
            .unwrap();
        assert_eq!(emitted.len(), 3);
        assert_eq!(emitted[1].0, emitted[2].0);

        // both sentinel fingerprints anchor on bin 0 and collapse into one
        let fps = fp.fingerprint(0, "AAAACC").unwrap();
        assert_eq!(fps.len(), 2);
    }

    #[test]
    fn test_quantile_policy_needs_reference() {
        let config = FingerprintConfig {
            window_size: 4,
            overlap: 0,
            peak_policy: PeakPolicy::Quantile,
            ..FingerprintConfig::default()
        };
        assert!(Fingerprinter::new(config.clone(), None).is_err());

        let stats = BinStatistics { lower: 0.1, upper: 1.0, mean: 0.5, std_dev: 0.2 };
        let wrong = Arc::new(QuantileReference {
            window_size: 8,
            lower_quantile: 0.05,
            upper_quantile: 0.95,
            bins: vec![stats; 5],
        });
        assert!(matches!(
            Fingerprinter::new(config.clone(), Some(wrong)),
            Err(ProtfinError::ReferenceMismatch { found: 5, expected: 3, window_size: 4 })
        ));

        let right = Arc::new(QuantileReference {
            window_size: 4,
            lower_quantile: 0.05,
            upper_quantile: 0.95,
            bins: vec![stats; 3],
        });
        let fp = Fingerprinter::new(config, Some(right)).unwrap();
        assert!(fp.reference().is_some());
        assert!(!fp.fingerprint(0, "WWWWGGGGWWWWGGGG").unwrap().is_empty());
    }

    #[test]
    fn test_invalid_layout_fails_before_processing() {
        let config = FingerprintConfig { delta_bits: 20, ..FingerprintConfig::default() };
        assert!(Fingerprinter::new(config, None).is_err());
    }
}
