//! Short-time Fourier transform over feature vectors
//!
//! A feature vector is cut into overlapping windows of `window_size`
//! values advancing by `window_size - overlap`. Every window is transformed
//! with a direct DFT into a one-sided magnitude spectrum of
//! `window_size / 2 + 1` bins.
//!
//! Windowing policy:
//! - `overlap >= window_size` is clamped to `window_size - 1`
//! - a vector shorter than the window is zero-padded to exactly one window
//! - otherwise windows are emitted until every value is covered, the last
//!   window being zero-padded when it runs past the end
//!
//! Amplitudes are scaled by `1 / window_size` (boxcar window) and rounded to
//! [`AMPLITUDE_DECIMALS`] decimal places, so that peak selection does not
//! depend on last-ulp differences of the trigonometric functions.

use std::f64::consts::PI;

use crate::constants::AMPLITUDE_DECIMALS;

/// Window layout after clamping
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct WindowLayout {
    /// Number of values per window
    pub window_size: usize,
    /// Overlap after clamping (always `< window_size`)
    pub overlap: usize,
}

impl WindowLayout {
    /// Create a layout, clamping the overlap to `window_size - 1`
    ///
    /// `window_size` must be at least 1; configuration validation enforces it.
    pub fn new(window_size: usize, overlap: usize) -> Self {
        let window_size = window_size.max(1);
        let overlap = overlap.min(window_size - 1);
        Self { window_size, overlap }
    }

    /// Distance between the starts of two consecutive windows
    #[inline]
    pub fn step(&self) -> usize {
        self.window_size - self.overlap
    }

    /// Number of frequency bins of a window spectrum
    #[inline]
    pub fn num_bins(&self) -> usize {
        num_bins(self.window_size)
    }

    /// Number of windows needed to cover `len` values
    pub fn num_windows(&self, len: usize) -> usize {
        if len <= self.window_size {
            1
        } else {
            1 + (len - self.window_size).div_ceil(self.step())
        }
    }
}

/// Number of one-sided frequency bins for a window size
#[inline]
pub const fn num_bins(window_size: usize) -> usize {
    window_size / 2 + 1
}

/// Precomputed DFT twiddle factors for one window size
#[derive(Debug, Clone)]
pub struct Stft {
    layout: WindowLayout,
    cos: Vec<f64>,
    sin: Vec<f64>,
}

impl Stft {
    /// Create a transform for the given layout
    pub fn new(layout: WindowLayout) -> Self {
        let n = layout.window_size;
        // one full turn sampled at n points; bin k and sample t use index (k * t) mod n
        let (cos, sin) = (0..n)
            .map(|i| {
                let angle = 2.0 * PI * i as f64 / n as f64;
                (angle.cos(), angle.sin())
            })
            .unzip();
        Self { layout, cos, sin }
    }

    /// Window layout used by this transform
    pub fn layout(&self) -> WindowLayout {
        self.layout
    }

    /// Magnitude spectrum of every window of `signal`, in window order
    pub fn spectrogram(&self, signal: &[f32]) -> Vec<Vec<f64>> {
        let window_size = self.layout.window_size;
        let step = self.layout.step();
        let mut frame = vec![0.0f64; window_size];

        (0..self.layout.num_windows(signal.len()))
            .map(|w| {
                let start = w * step;
                for (t, slot) in frame.iter_mut().enumerate() {
                    *slot = signal.get(start + t).map_or(0.0, |&v| v as f64);
                }
                self.magnitudes(&frame)
            })
            .collect()
    }

    /// One-sided magnitude spectrum of a single window
    pub fn magnitudes(&self, frame: &[f64]) -> Vec<f64> {
        let n = self.layout.window_size;
        debug_assert_eq!(frame.len(), n);

        (0..self.layout.num_bins())
            .map(|k| {
                let mut re = 0.0f64;
                let mut im = 0.0f64;
                for (t, &x) in frame.iter().enumerate() {
                    let idx = (k * t) % n;
                    re += x * self.cos[idx];
                    im -= x * self.sin[idx];
                }
                round_amplitude(re.hypot(im) / n as f64)
            })
            .collect()
    }
}

/// Round an amplitude to the fixed number of decimals
#[inline]
pub fn round_amplitude(value: f64) -> f64 {
    let scale = 10f64.powi(AMPLITUDE_DECIMALS);
    (value * scale).round() / scale
}
