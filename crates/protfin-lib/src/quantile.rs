//! Reference amplitude statistics for the quantile peak policy
//!
//! A [`QuantileReference`] holds, for every frequency bin of one window
//! size, the lower and upper percentile of the amplitudes observed over a
//! training corpus together with their mean and standard deviation. It is
//! learned offline with [`QuantileReference::learn`], exchanged as JSON and
//! embedded into every database built with the quantile policy.

use std::fs::File;
use std::io::{BufReader, BufWriter, Write};
use std::path::Path;

use serde::{Deserialize, Serialize};
use tracing::info;

use crate::error::{ProtfinError, Result};
use crate::spectrum::{num_bins, Stft, WindowLayout};

/// Amplitude statistics of one frequency bin
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct BinStatistics {
    /// Amplitude at the lower significance quantile
    pub lower: f64,
    /// Amplitude at the upper significance quantile
    pub upper: f64,
    /// Mean amplitude
    pub mean: f64,
    /// Population standard deviation of the amplitude
    pub std_dev: f64,
}

/// Per-bin amplitude statistics for one window size
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct QuantileReference {
    /// Window size the statistics were learned for
    pub window_size: usize,
    /// Quantile used for the lower thresholds
    pub lower_quantile: f64,
    /// Quantile used for the upper thresholds
    pub upper_quantile: f64,
    /// Statistics per frequency bin
    pub bins: Vec<BinStatistics>,
}

impl QuantileReference {
    /// Learn reference statistics from a corpus of feature vectors
    ///
    /// Every vector is cut into non-overlapping windows of `window_size`
    /// values; the amplitudes of all windows are pooled per bin.
    ///
    /// # Errors
    /// Returns [`ProtfinError::InvalidConfig`] for invalid quantiles, a zero
    /// window size, or a corpus without any window.
    pub fn learn<'a, I>(
        vectors: I,
        window_size: usize,
        lower_quantile: f64,
        upper_quantile: f64,
    ) -> Result<Self>
    where
        I: IntoIterator<Item = &'a [f32]>,
    {
        validate_quantiles(lower_quantile, upper_quantile)?;
        if window_size == 0 {
            return Err(ProtfinError::InvalidConfig("window size must be positive".into()));
        }

        let stft = Stft::new(WindowLayout::new(window_size, 0));
        let mut amplitudes: Vec<Vec<f64>> = vec![Vec::new(); num_bins(window_size)];
        let mut num_windows = 0usize;

        for vector in vectors {
            for spectrum in stft.spectrogram(vector) {
                for (bin, amplitude) in spectrum.into_iter().enumerate() {
                    amplitudes[bin].push(amplitude);
                }
                num_windows += 1;
            }
        }

        if num_windows == 0 {
            return Err(ProtfinError::InvalidConfig(
                "cannot learn a quantile reference from an empty corpus".into(),
            ));
        }
        info!("Learned amplitude statistics from {} windows", num_windows);

        let bins = amplitudes
            .into_iter()
            .map(|mut values| {
                values.sort_by(f64::total_cmp);
                let n = values.len() as f64;
                let mean = values.iter().sum::<f64>() / n;
                let variance = values.iter().map(|v| (v - mean).powi(2)).sum::<f64>() / n;
                BinStatistics {
                    lower: quantile(&values, lower_quantile),
                    upper: quantile(&values, upper_quantile),
                    mean,
                    std_dev: variance.sqrt(),
                }
            })
            .collect();

        Ok(Self { window_size, lower_quantile, upper_quantile, bins })
    }

    /// Check that the reference fits a window size
    ///
    /// # Errors
    /// Returns [`ProtfinError::ReferenceMismatch`] if the number of bins
    /// differs from what `window_size` produces.
    pub fn check(&self, window_size: usize) -> Result<()> {
        let expected = num_bins(window_size);
        if self.bins.len() != expected {
            return Err(ProtfinError::ReferenceMismatch {
                found: self.bins.len(),
                expected,
                window_size,
            });
        }
        Ok(())
    }

    /// Load a reference from a JSON file
    pub fn from_json_file<P: AsRef<Path>>(path: P) -> Result<Self> {
        let reader = BufReader::new(File::open(path)?);
        let reference: Self = serde_json::from_reader(reader)?;
        validate_quantiles(reference.lower_quantile, reference.upper_quantile)?;
        Ok(reference)
    }

    /// Write the reference as pretty-printed JSON
    pub fn to_json_file<P: AsRef<Path>>(&self, path: P) -> Result<()> {
        let mut writer = BufWriter::new(File::create(path)?);
        serde_json::to_writer_pretty(&mut writer, self)?;
        writer.flush()?;
        Ok(())
    }
}

/// Linearly interpolated quantile of sorted values
fn quantile(sorted: &[f64], q: f64) -> f64 {
    let pos = q * (sorted.len() - 1) as f64;
    let lo = pos.floor() as usize;
    let hi = pos.ceil() as usize;
    sorted[lo] + (sorted[hi] - sorted[lo]) * (pos - lo as f64)
}

/// Check `0 <= lower < upper <= 1`
pub fn validate_quantiles(lower: f64, upper: f64) -> Result<()> {
    if !(0.0..=1.0).contains(&lower) || !(0.0..=1.0).contains(&upper) || lower >= upper {
        return Err(ProtfinError::InvalidConfig(format!(
            "quantiles must satisfy 0 <= lower < upper <= 1, got lower={}, upper={}",
            lower, upper
        )));
    }
    Ok(())
}
