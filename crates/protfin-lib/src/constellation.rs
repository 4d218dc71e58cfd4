//! Constellation maps: the landmarks of every window of a sequence
//!
//! A [`LandmarkExtractor`] combines the short-time Fourier transform with a
//! [`PeakPicker`] and turns a feature vector into a [`ConstellationMap`].
//! The map has exactly one entry per window (possibly empty), in window
//! order, and the points of an entry are stored by ascending bin.

use std::sync::Arc;

use crate::peaks::{by_bin, Band, PeakPicker, PeakPolicy};
use crate::spectrum::{Stft, WindowLayout};

/// A landmark of the spectrogram
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ConstellationPoint {
    /// Window index
    pub window: u32,
    /// Frequency bin
    pub bin: u32,
    /// Magnitude at (window, bin)
    pub amplitude: f64,
    /// Significance band, set only by the quantile policy
    pub band: Option<Band>,
}

/// Landmarks of one sequence, indexed by window
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ConstellationMap {
    windows: Vec<Vec<ConstellationPoint>>,
}

impl ConstellationMap {
    /// Create a map from per-window landmark lists
    pub fn from_windows(windows: Vec<Vec<ConstellationPoint>>) -> Self {
        Self { windows }
    }

    /// Number of windows
    pub fn num_windows(&self) -> usize {
        self.windows.len()
    }

    /// Total number of landmarks
    pub fn num_points(&self) -> usize {
        self.windows.iter().map(Vec::len).sum()
    }

    /// Landmarks of window `w` (empty when out of range)
    pub fn window(&self, w: usize) -> &[ConstellationPoint] {
        self.windows.get(w).map(Vec::as_slice).unwrap_or(&[])
    }

    /// Iterate over the windows in order
    pub fn windows(&self) -> impl Iterator<Item = &[ConstellationPoint]> {
        self.windows.iter().map(Vec::as_slice)
    }

    /// Iterate over all landmarks in (window, bin) order
    pub fn points(&self) -> impl Iterator<Item = &ConstellationPoint> {
        self.windows.iter().flatten()
    }
}

/// Extracts constellation maps from feature vectors
#[derive(Debug, Clone)]
pub struct LandmarkExtractor {
    stft: Stft,
    picker: Arc<dyn PeakPicker>,
}

impl LandmarkExtractor {
    /// Create an extractor for a window layout and peak picker
    pub fn new(layout: WindowLayout, picker: Arc<dyn PeakPicker>) -> Self {
        Self { stft: Stft::new(layout), picker }
    }

    /// Window layout in use
    pub fn layout(&self) -> WindowLayout {
        self.stft.layout()
    }

    /// Peak policy in use
    pub fn policy(&self) -> PeakPolicy {
        self.picker.policy()
    }

    /// Build the constellation map of a feature vector
    pub fn extract(&self, features: &[f32]) -> ConstellationMap {
        let windows = self
            .stft
            .spectrogram(features)
            .into_iter()
            .enumerate()
            .map(|(window, spectrum)| {
                let mut peaks = self.picker.pick(&spectrum);
                peaks.sort_by(by_bin);
                peaks
                    .into_iter()
                    .map(|peak| ConstellationPoint {
                        window: window as u32,
                        bin: peak.bin,
                        amplitude: peak.amplitude,
                        band: peak.band,
                    })
                    .collect()
            })
            .collect();

        ConstellationMap { windows }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::peaks::ProminencePicker;

    fn extractor(window_size: usize, overlap: usize, n_peaks: usize) -> LandmarkExtractor {
        LandmarkExtractor::new(
            WindowLayout::new(window_size, overlap),
            Arc::new(ProminencePicker::new(n_peaks)),
        )
    }

    #[test]
    fn test_one_entry_per_window() {
        let features: Vec<f32> = (0..10).map(|i| (i % 3) as f32).collect();
        let map = extractor(4, 2, 2).extract(&features);
        assert_eq!(map.num_windows(), WindowLayout::new(4, 2).num_windows(10));
        for (w, points) in map.windows().enumerate() {
            assert!(points.len() <= 2);
            assert!(points.iter().all(|p| p.window as usize == w));
            assert!(points.windows(2).all(|pair| pair[0].bin < pair[1].bin));
        }
    }

    #[test]
    fn test_constant_windows_yield_dc_landmarks() {
        // [c, c] has spectrum [c, 0]; the DC bin is the only maximum
        let map = extractor(2, 0, 3).extract(&[1.0, 1.0, 1.0, 1.0, 2.0, 2.0]);
        assert_eq!(map.num_windows(), 3);
        assert_eq!(map.num_points(), 3);
        for point in map.points() {
            assert_eq!(point.bin, 0);
            assert_eq!(point.band, None);
        }
        assert_eq!(map.window(2)[0].amplitude, 2.0);
    }

    #[test]
    fn test_all_zero_vector_has_no_landmarks() {
        let map = extractor(4, 0, 3).extract(&[0.0; 9]);
        assert_eq!(map.num_windows(), 3);
        assert_eq!(map.num_points(), 0);
        assert!(map.window(7).is_empty());
    }

    #[test]
    fn test_extraction_is_deterministic() {
        let features: Vec<f32> = (0..200).map(|i| ((i * 7919) % 101) as f32 / 17.0).collect();
        let ex = extractor(30, 15, 3);
        assert_eq!(ex.extract(&features), ex.extract(&features));
    }
}
