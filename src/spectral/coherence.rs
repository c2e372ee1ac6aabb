//! Welch cross-spectral density and magnitude-squared coherence.
//!
//! ```text
//! Cxy(f) = |Pxy(f)|² / (Pxx(f) · Pyy(f))
//! ```
//! `Pxy` is averaged over segments *before* taking the magnitude, so a
//! stationary phase relationship gives `Cxy ≈ 1` and independent signals
//! tend to `0` as the number of segments grows.  Density scaling cancels
//! in the ratio and is not applied.
use ndarray::ArrayView1;
use rustfft::num_complex::Complex;

use super::fft::{rfft_frequencies, RealFft};
use super::segment::segment_starts;
use super::window::taper;
use crate::config::SpectralSettings;
use crate::error::{Error, Result};

/// Frequencies and coherence values, one per one-sided bin.
#[derive(Debug, Clone, PartialEq)]
pub struct Coherence {
    pub frequencies: Vec<f64>,
    pub values: Vec<f64>,
}

impl Coherence {
    /// Coherence at the bin closest to `f`.
    pub fn at(&self, f: f64) -> Option<f64> {
        super::nearest_index(&self.frequencies, f).map(|k| self.values[k])
    }
}

/// Segment-averaged `Pxx`, `Pyy`, `Pxy` (unscaled).
fn cross_spectra(
    x: ArrayView1<f64>,
    y: ArrayView1<f64>,
    nperseg: usize,
    noverlap: usize,
    settings: &SpectralSettings,
) -> Result<(Vec<f64>, Vec<f64>, Vec<Complex<f64>>)> {
    let w = taper(settings.window, nperseg);
    let mut fft = RealFft::new(nperseg);
    let n_bins = fft.n_bins();
    let (mut pxx, mut pyy) = (vec![0.0; n_bins], vec![0.0; n_bins]);
    let mut pxy = vec![Complex::<f64>::default(); n_bins];

    let prepared = |sig: ArrayView1<f64>, start: usize| {
        let seg = sig.slice(ndarray::s![start..start + nperseg]);
        let mean = seg.mean().unwrap_or(0.0);
        seg.iter().zip(&w).map(|(&v, &wi)| (v - mean) * wi).collect::<Vec<_>>()
    };

    for start in segment_starts(x.len(), nperseg, noverlap)? {
        let fx: Vec<Complex<f64>> = fft.process(prepared(x, start)).to_vec();
        let fy = fft.process(prepared(y, start));
        for k in 0..n_bins {
            pxx[k] += fx[k].norm_sqr();
            pyy[k] += fy[k].norm_sqr();
            pxy[k] += fx[k].conj() * fy[k];
        }
    }
    Ok((pxx, pyy, pxy))
}

/// Magnitude-squared coherence of `x` and `y` with Welch segmentation.
///
/// Bins where either auto-spectrum vanishes get coherence `0`.
pub fn coherence(
    x: ArrayView1<f64>,
    y: ArrayView1<f64>,
    fs: f64,
    settings: &SpectralSettings,
) -> Result<Coherence> {
    settings.validate()?;
    if x.len() != y.len() {
        return Err(Error::param(format!("coherence inputs differ in length: {} vs {}", x.len(), y.len())));
    }
    let nperseg = settings.segment_samples(fs);
    let noverlap = settings.overlap_samples(fs);
    if nperseg < 2 {
        return Err(Error::param(format!("segment must span at least 2 samples, got {nperseg}")));
    }
    let (pxx, pyy, pxy) = cross_spectra(x, y, nperseg, noverlap, settings)?;

    let values = pxy
        .iter()
        .zip(pxx.iter().zip(&pyy))
        .map(|(sxy, (&sxx, &syy))| {
            let denom = sxx * syy;
            if denom > f64::MIN_POSITIVE {
                (sxy.norm_sqr() / denom).clamp(0.0, 1.0)
            } else {
                0.0
            }
        })
        .collect();

    Ok(Coherence { frequencies: rfft_frequencies(nperseg, fs), values })
}

#[cfg(test)]
mod tests {
    use super::*;
    use ndarray::Array1;
    use std::f64::consts::PI;

    #[test]
    fn phase_shifted_copy_is_coherent() {
        let fs = 128.0;
        let n = 128 * 32;
        let x = Array1::from_shape_fn(n, |i| (2.0 * PI * 10.0 * i as f64 / fs).sin());
        let y = Array1::from_shape_fn(n, |i| 3.0 * (2.0 * PI * 10.0 * i as f64 / fs + 1.0).sin());
        let c = coherence(x.view(), y.view(), fs, &SpectralSettings::default()).unwrap();
        approx::assert_abs_diff_eq!(c.at(10.0).unwrap(), 1.0, epsilon = 1e-9);
    }

    #[test]
    fn length_mismatch_rejected() {
        let x = Array1::zeros(2048);
        let y = Array1::zeros(1024);
        assert!(coherence(x.view(), y.view(), 128.0, &SpectralSettings::default()).is_err());
    }

    #[test]
    fn silent_input_gives_zero() {
        let x = Array1::zeros(2048);
        let y = Array1::ones(2048);
        let c = coherence(x.view(), y.view(), 128.0, &SpectralSettings::default()).unwrap();
        assert!(c.values.iter().all(|&v| v == 0.0));
    }
}
