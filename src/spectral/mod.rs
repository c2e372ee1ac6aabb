//! Spectral engine: PSD estimation and the [`Spectrum`] container shared by
//! every frequency-domain analysis.
//!
//! ```text
//! [C, T] samples ─► segment ─► detrend · taper ─► rfft ─► |X|² / (fs Σw²)
//!                                                           │
//!                                         mean over segments, one-sided
//!                                                           ▼
//!                                     Spectrum { frequencies, power[C, F] }
//! ```
pub mod coherence;
pub mod fft;
pub mod psd;
pub mod segment;
pub mod window;

use ndarray::{Array2, ArrayView1, Axis};
use serde::{Deserialize, Serialize};

use crate::error::{Error, Result};

pub use coherence::{coherence, Coherence};
pub use psd::{compute_psd, periodogram, welch};

/// One-sided power spectral density per channel.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Spectrum {
    /// Bin centres in Hz, ascending.
    pub frequencies: Vec<f64>,
    /// `[channel, bin]`, squared signal units per Hz.
    pub power: Array2<f64>,
}

impl Spectrum {
    pub fn n_channels(&self) -> usize {
        self.power.nrows()
    }

    pub fn channel(&self, ch: usize) -> ArrayView1<'_, f64> {
        self.power.row(ch)
    }

    /// Bin spacing in Hz (`0` for fewer than two bins).
    pub fn resolution(&self) -> f64 {
        match self.frequencies.as_slice() {
            [a, b, ..] => b - a,
            _ => 0.0,
        }
    }

    /// Keep only bins with `fmin <= f <= fmax`.
    ///
    /// # Errors
    ///
    /// [`Error::EmptyBand`] when no bin falls in the range.
    pub fn restrict(&self, fmin: f64, fmax: f64) -> Result<Spectrum> {
        let idx = self.indices_in(fmin, fmax);
        if idx.is_empty() {
            return Err(Error::EmptyBand { min: fmin, max: fmax });
        }
        Ok(Spectrum {
            frequencies: idx.iter().map(|&k| self.frequencies[k]).collect(),
            power: self.power.select(Axis(1), &idx),
        })
    }

    /// Bin indices with `fmin <= f <= fmax`.
    pub fn indices_in(&self, fmin: f64, fmax: f64) -> Vec<usize> {
        self.frequencies
            .iter()
            .enumerate()
            .filter(|(_, &f)| f >= fmin && f <= fmax)
            .map(|(k, _)| k)
            .collect()
    }

    /// `10 · log10(power)`, floored at 1e-30 to keep empty bins finite.
    ///
    /// For display only; analyses work on linear power.
    pub fn to_decibels(&self) -> Array2<f64> {
        self.power.mapv(|p| 10.0 * p.max(1e-30).log10())
    }

    /// Frequency of the largest bin in channel `ch`.
    pub fn peak_frequency(&self, ch: usize) -> Option<f64> {
        let row = self.power.row(ch);
        let (k, _) = row
            .iter()
            .enumerate()
            .fold(None, |best: Option<(usize, f64)>, (k, &p)| match best {
                Some((_, bp)) if bp >= p => best,
                _ => Some((k, p)),
            })?;
        Some(self.frequencies[k])
    }

    pub fn nearest_bin(&self, f: f64) -> Option<usize> {
        nearest_index(&self.frequencies, f)
    }

    /// Mean spectrum across channels, as a single-row spectrum.
    pub fn channel_mean(&self) -> Spectrum {
        let mean = self
            .power
            .mean_axis(Axis(0))
            .unwrap_or_else(|| ndarray::Array1::zeros(self.frequencies.len()));
        Spectrum { frequencies: self.frequencies.clone(), power: mean.insert_axis(Axis(0)) }
    }
}

pub(crate) fn nearest_index(axis: &[f64], f: f64) -> Option<usize> {
    axis.iter()
        .enumerate()
        .min_by(|a, b| (a.1 - f).abs().total_cmp(&(b.1 - f).abs()))
        .map(|(k, _)| k)
}

#[cfg(test)]
mod tests {
    use super::*;
    use ndarray::array;

    fn spec() -> Spectrum {
        Spectrum {
            frequencies: vec![0.0, 0.5, 1.0, 1.5, 2.0],
            power: array![[1.0, 2.0, 8.0, 2.0, 1.0], [10.0, 1.0, 1.0, 1.0, 1.0]],
        }
    }

    #[test]
    fn restrict_is_inclusive() {
        let s = spec().restrict(0.5, 1.5).unwrap();
        assert_eq!(s.frequencies, vec![0.5, 1.0, 1.5]);
        assert_eq!(s.power.dim(), (2, 3));
        assert!(matches!(spec().restrict(3.0, 4.0), Err(Error::EmptyBand { .. })));
    }

    #[test]
    fn decibels_leave_linear_power_alone() {
        let s = spec();
        let db = s.to_decibels();
        approx::assert_abs_diff_eq!(db[[1, 0]], 10.0, epsilon = 1e-12);
        assert_eq!(s.power[[1, 0]], 10.0);
    }

    #[test]
    fn peaks_and_bins() {
        let s = spec();
        assert_eq!(s.peak_frequency(0), Some(1.0));
        assert_eq!(s.peak_frequency(1), Some(0.0));
        assert_eq!(s.nearest_bin(1.2), Some(2));
        assert_eq!(s.resolution(), 0.5);
        assert_eq!(s.channel_mean().power[[0, 0]], 5.5);
    }
}
