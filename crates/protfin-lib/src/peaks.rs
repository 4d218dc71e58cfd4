//! Peak selection policies
//!
//! A [`PeakPicker`] chooses the salient frequency bins of one window
//! spectrum. Two interchangeable implementations exist:
//!
//! - [`ProminencePicker`]: local maxima ranked by topographic prominence
//! - [`QuantilePicker`]: bins outside the per-bin reference percentiles,
//!   ranked by their normalized deviation from the crossed threshold
//!
//! Both keep the top `n_peaks` candidates (`0` keeps all) and break ties
//! deterministically.

use std::cmp::Ordering;
use std::fmt;
use std::str::FromStr;
use std::sync::Arc;

use serde::{Deserialize, Serialize};

use crate::error::ProtfinError;
use crate::quantile::{BinStatistics, QuantileReference};

/// Significance band of a landmark selected by the quantile policy
///
/// `Upper` orders before `Lower`, which is the tie-break between bands.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum Band {
    /// Amplitude above the upper percentile threshold
    Upper,
    /// Amplitude below the lower percentile threshold
    Lower,
}

impl Band {
    /// Single bit used in band-aware fingerprints
    #[inline]
    pub fn bit(self) -> u32 {
        match self {
            Band::Upper => 1,
            Band::Lower => 0,
        }
    }
}

/// A selected frequency bin of one window
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Peak {
    /// Frequency bin index
    pub bin: u32,
    /// Magnitude at that bin
    pub amplitude: f64,
    /// Significance band, only set by the quantile policy
    pub band: Option<Band>,
}

/// Selects landmarks from a magnitude spectrum
pub trait PeakPicker: Send + Sync + fmt::Debug {
    /// Return the selected peaks in rank order (best first)
    fn pick(&self, spectrum: &[f64]) -> Vec<Peak>;

    /// Policy implemented by this picker
    fn policy(&self) -> PeakPolicy;
}

/// Peak selection policy
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum PeakPolicy {
    /// Local maxima ranked by prominence
    #[default]
    Prominence,
    /// Reference percentile outliers ranked by deviation
    Quantile,
}

impl fmt::Display for PeakPolicy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            PeakPolicy::Prominence => write!(f, "prominence"),
            PeakPolicy::Quantile => write!(f, "quantile"),
        }
    }
}

impl FromStr for PeakPolicy {
    type Err = ProtfinError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "prominence" => Ok(PeakPolicy::Prominence),
            "quantile" => Ok(PeakPolicy::Quantile),
            other => Err(ProtfinError::InvalidConfig(format!(
                "unknown peak policy '{}', expected 'prominence' or 'quantile'",
                other
            ))),
        }
    }
}

/// Keeps the most prominent local maxima of a spectrum
#[derive(Debug, Clone)]
pub struct ProminencePicker {
    n_peaks: usize,
}

impl ProminencePicker {
    /// Create a picker keeping `n_peaks` peaks (0 keeps all)
    pub fn new(n_peaks: usize) -> Self {
        Self { n_peaks }
    }
}

impl PeakPicker for ProminencePicker {
    fn pick(&self, spectrum: &[f64]) -> Vec<Peak> {
        let mut ranked: Vec<(f64, usize)> = local_maxima(spectrum)
            .into_iter()
            .map(|peak| (prominence(spectrum, peak), peak.index))
            .collect();

        ranked.sort_by(|a, b| b.0.total_cmp(&a.0).then(a.1.cmp(&b.1)));
        if self.n_peaks > 0 {
            ranked.truncate(self.n_peaks);
        }

        ranked
            .into_iter()
            .map(|(_, bin)| Peak { bin: bin as u32, amplitude: spectrum[bin], band: None })
            .collect()
    }

    fn policy(&self) -> PeakPolicy {
        PeakPolicy::Prominence
    }
}

/// A local maximum, possibly spanning a plateau `[left, right]`
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
struct LocalMaximum {
    index: usize,
    left: usize,
    right: usize,
}

/// Find local maxima; plateaus resolve to their middle bin
///
/// The spectrum boundaries count as lower ground, so the first and last bin
/// can be maxima. A completely flat spectrum has none.
fn local_maxima(spectrum: &[f64]) -> Vec<LocalMaximum> {
    let n = spectrum.len();
    let mut maxima = Vec::new();
    let mut left = 0;

    while left < n {
        let value = spectrum[left];
        let mut right = left;
        while right + 1 < n && spectrum[right + 1] == value {
            right += 1;
        }

        let rises = left == 0 || spectrum[left - 1] < value;
        let falls = right == n - 1 || spectrum[right + 1] < value;
        let flat = left == 0 && right == n - 1;
        if rises && falls && !flat {
            maxima.push(LocalMaximum { index: (left + right) / 2, left, right });
        }

        left = right + 1;
    }

    maxima
}

/// Topographic prominence of a local maximum
///
/// On each side, the base is the lowest value between the peak and the first
/// strictly higher value (or the boundary). The prominence is the height
/// above the higher of both bases; a side without any bins does not
/// constrain it.
fn prominence(spectrum: &[f64], peak: LocalMaximum) -> f64 {
    let height = spectrum[peak.index];

    let left_base = (peak.left > 0).then(|| {
        spectrum[..peak.left]
            .iter()
            .rev()
            .take_while(|&&v| v <= height)
            .fold(height, |base, &v| base.min(v))
    });
    let right_base = (peak.right + 1 < spectrum.len()).then(|| {
        spectrum[peak.right + 1..]
            .iter()
            .take_while(|&&v| v <= height)
            .fold(height, |base, &v| base.min(v))
    });

    let base = match (left_base, right_base) {
        (Some(l), Some(r)) => l.max(r),
        (Some(l), None) => l,
        (None, Some(r)) => r,
        (None, None) => 0.0,
    };
    height - base
}

/// Keeps the bins that leave the reference percentile band
#[derive(Debug, Clone)]
pub struct QuantilePicker {
    reference: Arc<QuantileReference>,
    n_peaks: usize,
}

impl QuantilePicker {
    /// Create a picker keeping `n_peaks` peaks over both bands (0 keeps all)
    pub fn new(reference: Arc<QuantileReference>, n_peaks: usize) -> Self {
        Self { reference, n_peaks }
    }

    /// Reference statistics used by this picker
    pub fn reference(&self) -> &QuantileReference {
        &self.reference
    }
}

impl PeakPicker for QuantilePicker {
    fn pick(&self, spectrum: &[f64]) -> Vec<Peak> {
        let mut candidates: Vec<(f64, Peak)> = spectrum
            .iter()
            .zip(self.reference.bins.iter())
            .enumerate()
            .filter_map(|(bin, (&amplitude, stats))| {
                let (band, threshold) = if amplitude > stats.upper {
                    (Band::Upper, stats.upper)
                } else if amplitude < stats.lower {
                    (Band::Lower, stats.lower)
                } else {
                    return None;
                };
                let peak = Peak { bin: bin as u32, amplitude, band: Some(band) };
                Some((deviation(amplitude, threshold, stats), peak))
            })
            .collect();

        candidates.sort_by(|a, b| {
            b.0.total_cmp(&a.0)
                .then_with(|| a.1.band.cmp(&b.1.band))
                .then_with(|| a.1.bin.cmp(&b.1.bin))
        });
        if self.n_peaks > 0 {
            candidates.truncate(self.n_peaks);
        }

        candidates.into_iter().map(|(_, peak)| peak).collect()
    }

    fn policy(&self) -> PeakPolicy {
        PeakPolicy::Quantile
    }
}

/// Normalized distance `|z(amplitude) - z(threshold)|`
///
/// Falls back to the raw distance when the bin has no spread.
fn deviation(amplitude: f64, threshold: f64, stats: &BinStatistics) -> f64 {
    if stats.std_dev > 0.0 && stats.std_dev.is_finite() {
        let z = |x: f64| (x - stats.mean) / stats.std_dev;
        (z(amplitude) - z(threshold)).abs()
    } else {
        (amplitude - threshold).abs()
    }
}

/// Compare peaks by bin, used to store landmarks in canonical order
pub(crate) fn by_bin(a: &Peak, b: &Peak) -> Ordering {
    a.bin.cmp(&b.bin)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn bins(peaks: &[Peak]) -> Vec<u32> {
        peaks.iter().map(|p| p.bin).collect()
    }

    #[test]
    fn test_interior_peaks_ranked_by_prominence() {
        //          0    1    2    3    4    5    6
        let s = [0.0, 5.0, 1.0, 3.0, 2.5, 9.0, 0.0];
        let picker = ProminencePicker::new(0);
        // prominences: bin 5 -> 9, bin 1 -> 4, bin 3 -> 0.5
        assert_eq!(bins(&picker.pick(&s)), vec![5, 1, 3]);

        let picker = ProminencePicker::new(2);
        assert_eq!(bins(&picker.pick(&s)), vec![5, 1]);
    }

    #[test]
    fn test_boundary_bins_are_eligible() {
        let s = [2.0, 0.0];
        let peaks = ProminencePicker::new(0).pick(&s);
        assert_eq!(bins(&peaks), vec![0]);
        assert_eq!(peaks[0].amplitude, 2.0);
        assert_eq!(peaks[0].band, None);

        let s = [0.0, 1.0, 4.0];
        assert_eq!(bins(&ProminencePicker::new(0).pick(&s)), vec![2]);
    }

    #[test]
    fn test_flat_spectrum_has_no_peaks() {
        assert!(ProminencePicker::new(0).pick(&[1.0, 1.0, 1.0]).is_empty());
        assert!(ProminencePicker::new(0).pick(&[0.0]).is_empty());
        assert!(ProminencePicker::new(0).pick(&[]).is_empty());
    }

    #[test]
    fn test_plateau_resolves_to_middle() {
        let s = [0.0, 3.0, 3.0, 3.0, 0.0];
        assert_eq!(bins(&ProminencePicker::new(0).pick(&s)), vec![2]);
    }

    #[test]
    fn test_prominence_ties_prefer_lower_bin() {
        let s = [0.0, 2.0, 0.0, 2.0, 0.0];
        assert_eq!(bins(&ProminencePicker::new(1).pick(&s)), vec![1]);
    }

    #[test]
    fn test_prominence_values() {
        let s = [1.0, 4.0, 2.0, 6.0, 3.0];
        let maxima = local_maxima(&s);
        assert_eq!(maxima.len(), 2);
        // bin 1: left base 1, right base 2 (stops at 6) -> 4 - 2
        assert_eq!(prominence(&s, maxima[0]), 2.0);
        // bin 3: left base 1 (nothing higher), right base 3 -> 6 - 3
        assert_eq!(prominence(&s, maxima[1]), 3.0);
    }

    fn reference() -> Arc<QuantileReference> {
        let stats = |lower, upper| BinStatistics { lower, upper, mean: 1.0, std_dev: 0.5 };
        Arc::new(QuantileReference {
            window_size: 6,
            lower_quantile: 0.05,
            upper_quantile: 0.95,
            bins: vec![stats(0.5, 2.0), stats(0.5, 2.0), stats(0.5, 2.0), stats(0.5, 2.0)],
        })
    }

    #[test]
    fn test_quantile_bands() {
        let picker = QuantilePicker::new(reference(), 0);
        let peaks = picker.pick(&[3.0, 1.0, 0.25, 2.0]);
        assert_eq!(bins(&peaks), vec![0, 2]);
        assert_eq!(peaks[0].band, Some(Band::Upper));
        assert_eq!(peaks[1].band, Some(Band::Lower));
    }

    #[test]
    fn test_quantile_ranking_and_ties() {
        // bin 0 upper deviation 1.0, bin 1 lower deviation 1.0, bin 3 upper deviation 3.0
        let picker = QuantilePicker::new(reference(), 0);
        let peaks = picker.pick(&[2.5, 0.0, 1.0, 3.5]);
        assert_eq!(bins(&peaks), vec![3, 0, 1]);

        let picker = QuantilePicker::new(reference(), 2);
        assert_eq!(bins(&picker.pick(&[2.5, 0.0, 1.0, 3.5])), vec![3, 0]);
    }

    #[test]
    fn test_zero_spread_uses_raw_distance() {
        let stats = BinStatistics { lower: 1.0, upper: 2.0, mean: 1.5, std_dev: 0.0 };
        assert_eq!(deviation(3.0, 2.0, &stats), 1.0);
    }

    #[test]
    fn test_policy_parsing() {
        assert_eq!("prominence".parse::<PeakPolicy>().unwrap(), PeakPolicy::Prominence);
        assert_eq!("Quantile".parse::<PeakPolicy>().unwrap(), PeakPolicy::Quantile);
        assert!("loudest".parse::<PeakPolicy>().is_err());
        for policy in [PeakPolicy::Prominence, PeakPolicy::Quantile] {
            assert_eq!(policy.to_string().parse::<PeakPolicy>().unwrap(), policy);
        }
    }
}
