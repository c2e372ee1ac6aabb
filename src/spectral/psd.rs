//! Power spectral density, scaled like `scipy.signal.welch(scaling='density')`.
//!
//! Algorithm, per channel:
//!   1. Cut the signal into segments of `nperseg` samples overlapping by
//!      `noverlap` (the periodogram uses one segment spanning the window).
//!   2. Remove each segment's mean, multiply by the taper `w`.
//!   3. `P_k = |rfft(seg)_k|² / (fs · Σw²)`, averaged over segments.
//!   4. Double every bin except DC and (for even lengths) Nyquist so the
//!      one-sided spectrum integrates to the signal variance.
use ndarray::{Array2, ArrayView1, ArrayView2};

use super::fft::{rfft_frequencies, RealFft};
use super::segment::segments;
use super::window::taper;
use super::Spectrum;
use crate::config::{PsdMethod, SpectralSettings, WindowKind};
use crate::error::{Error, Result};

/// PSD of every row of `data` ([C, T]) according to `settings`.
///
/// The full `0..=fs/2` axis is returned; apply [`Spectrum::restrict`] for
/// `fmin`/`fmax`.
pub fn compute_psd(data: ArrayView2<f64>, fs: f64, settings: &SpectralSettings) -> Result<Spectrum> {
    settings.validate()?;
    match settings.method {
        PsdMethod::Welch => welch(
            data,
            fs,
            settings.segment_samples(fs),
            settings.overlap_samples(fs),
            settings.window,
        ),
        PsdMethod::Periodogram => periodogram(data, fs, settings.window),
    }
}

/// Welch estimate with explicit segment geometry in samples.
///
/// # Errors
///
/// [`Error::SegmentTooLong`] when the data is shorter than `nperseg`.
pub fn welch(
    data: ArrayView2<f64>,
    fs: f64,
    nperseg: usize,
    noverlap: usize,
    window: WindowKind,
) -> Result<Spectrum> {
    if !(fs > 0.0 && fs.is_finite()) {
        return Err(Error::param(format!("sampling rate must be positive, got {fs}")));
    }
    if nperseg < 2 {
        return Err(Error::param(format!("segment must span at least 2 samples, got {nperseg}")));
    }
    let w = taper(window, nperseg);
    let scale = 1.0 / (fs * w.iter().map(|v| v * v).sum::<f64>());
    let mut fft = RealFft::new(nperseg);
    let n_bins = fft.n_bins();

    let mut power = Array2::<f64>::zeros((data.nrows(), n_bins));
    for (ch, row) in data.outer_iter().enumerate() {
        let acc = averaged_power(row, &w, &mut fft, nperseg, noverlap)?;
        let mut out = power.row_mut(ch);
        for (k, p) in acc.into_iter().enumerate() {
            out[k] = p * scale * one_sided_factor(k, nperseg);
        }
    }
    log::debug!(
        "welch: {} ch, nperseg={nperseg}, noverlap={noverlap}, {} bins",
        data.nrows(),
        n_bins
    );

    Ok(Spectrum { frequencies: rfft_frequencies(nperseg, fs), power })
}

/// Single-segment estimate over the whole input.
pub fn periodogram(data: ArrayView2<f64>, fs: f64, window: WindowKind) -> Result<Spectrum> {
    welch(data, fs, data.ncols(), 0, window)
}

/// Mean of `|rfft(detrend(seg) · w)|²` over all segments of `x`.
fn averaged_power(
    x: ArrayView1<f64>,
    w: &[f64],
    fft: &mut RealFft,
    nperseg: usize,
    noverlap: usize,
) -> Result<Vec<f64>> {
    let mut acc = vec![0.0; fft.n_bins()];
    let mut n_seg = 0usize;
    for seg in segments(x, nperseg, noverlap)? {
        let mean = seg.mean().unwrap_or(0.0);
        let spec = fft.process(seg.iter().zip(w).map(|(&v, &wi)| (v - mean) * wi));
        for (a, c) in acc.iter_mut().zip(spec) {
            *a += c.norm_sqr();
        }
        n_seg += 1;
    }
    let n = n_seg.max(1) as f64;
    acc.iter_mut().for_each(|a| *a /= n);
    Ok(acc)
}

pub(crate) fn one_sided_factor(k: usize, n: usize) -> f64 {
    if k == 0 || (n % 2 == 0 && k == n / 2) {
        1.0
    } else {
        2.0
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::f64::consts::PI;

    fn tone(fs: f64, f: f64, amp: f64, n: usize) -> Array2<f64> {
        Array2::from_shape_fn((1, n), |(_, i)| amp * (2.0 * PI * f * i as f64 / fs).sin())
    }

    #[test]
    fn welch_bin_count_and_peak() {
        let x = tone(256.0, 10.0, 1.0, 256 * 20);
        let s = welch(x.view(), 256.0, 1024, 512, WindowKind::Hann).unwrap();
        assert_eq!(s.frequencies.len(), 513);
        assert_eq!(s.peak_frequency(0), Some(10.0));
    }

    #[test]
    fn parseval_white_noise_variance() {
        // Integral of the one-sided density ≈ variance of the signal.
        let n = 4096;
        let x = Array2::from_shape_fn((1, n), |(_, i)| if i % 2 == 0 { 1.0 } else { -1.0 });
        let s = periodogram(x.view(), 100.0, WindowKind::Boxcar).unwrap();
        let df = s.resolution();
        let total: f64 = s.power.row(0).sum() * df;
        approx::assert_abs_diff_eq!(total, 1.0, epsilon = 1e-9);
    }

    #[test]
    fn sine_power_integrates_to_half_amp_squared() {
        let fs = 256.0;
        let x = tone(fs, 16.0, 2.0, 2048);
        let s = welch(x.view(), fs, 512, 256, WindowKind::Hann).unwrap();
        let total: f64 = s.power.row(0).sum() * s.resolution();
        approx::assert_abs_diff_eq!(total, 2.0, epsilon = 1e-6);
    }

    #[test]
    fn constant_input_is_removed() {
        let x = Array2::from_elem((2, 1024), 5.0);
        let s = welch(x.view(), 128.0, 256, 128, WindowKind::Hann).unwrap();
        assert!(s.power.iter().all(|&p| p.abs() < 1e-20));
    }

    #[test]
    fn short_window_fails() {
        let x = tone(256.0, 10.0, 1.0, 1000);
        let settings = SpectralSettings::default();
        let err = compute_psd(x.view(), 256.0, &settings).unwrap_err();
        assert_eq!(err.code(), "SEGMENT_TOO_LONG");
    }

    #[test]
    fn periodogram_uses_whole_window() {
        let x = tone(100.0, 5.0, 1.0, 1000);
        let settings = SpectralSettings { method: PsdMethod::Periodogram, ..Default::default() };
        let s = compute_psd(x.view(), 100.0, &settings).unwrap();
        assert_eq!(s.frequencies.len(), 501);
        approx::assert_abs_diff_eq!(s.resolution(), 0.1, epsilon = 1e-12);
    }
}
