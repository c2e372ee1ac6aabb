//! Signal-to-noise ratio against a local noise floor.
//!
//! ```text
//! peak  = max P(f)            for |f − f₀| ≤ 2 Hz
//! noise = mean P(f)           for 3 Hz ≤ |f − f₀| ≤ 10 Hz
//! SNR   = 10 · log10(peak / noise)   [dB]
//! ```
//! The 2–3 Hz gap is a guard band so peak leakage does not raise the
//! noise estimate.  Scaling the signal by `k` scales both terms by `k²`,
//! so the ratio is amplitude invariant.
use ndarray::Array2;
use serde::{Deserialize, Serialize};

use crate::config::{Band, SnrParams};
use crate::error::{Error, Result};
use crate::selection::Slice;
use crate::spectral::{compute_psd, Spectrum};

/// Half-width of the peak search around the target, Hz.
pub const PEAK_HALF_WIDTH_HZ: f64 = 2.0;
/// Inner edge of the noise band (guard), Hz.
pub const GUARD_HZ: f64 = 3.0;
/// Outer edge of the noise band, Hz.
pub const NOISE_HALF_WIDTH_HZ: f64 = 10.0;

/// SNR of one channel at one target frequency.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ChannelSnr {
    pub channel: String,
    /// Frequency of the bin holding `peak_power`.
    pub peak_frequency_hz: f64,
    pub peak_power: f64,
    pub noise_power: f64,
    pub snr_db: f64,
}

/// Peak/noise-floor SNR of channel `ch` of `spectrum` at `target`.
///
/// # Errors
///
/// [`Error::EmptyBand`] if no bin lies in the peak or noise band.
pub fn snr_at(spectrum: &Spectrum, ch: usize, target: f64) -> Result<(f64, f64, f64, f64)> {
    let row = spectrum.channel(ch);
    let mut peak: Option<(f64, f64)> = None;
    let (mut noise_sum, mut noise_n) = (0.0, 0usize);

    for (&f, &p) in spectrum.frequencies.iter().zip(row.iter()) {
        let d = (f - target).abs();
        if d <= PEAK_HALF_WIDTH_HZ && peak.map_or(true, |(_, bp)| p > bp) {
            peak = Some((f, p));
        }
        if (GUARD_HZ..=NOISE_HALF_WIDTH_HZ).contains(&d) {
            noise_sum += p;
            noise_n += 1;
        }
    }

    let (peak_f, peak_p) = peak.ok_or(Error::EmptyBand {
        min: target - PEAK_HALF_WIDTH_HZ,
        max: target + PEAK_HALF_WIDTH_HZ,
    })?;
    if noise_n == 0 {
        return Err(Error::EmptyBand { min: target - NOISE_HALF_WIDTH_HZ, max: target + NOISE_HALF_WIDTH_HZ });
    }
    let noise = noise_sum / noise_n as f64;
    Ok((peak_f, peak_p, noise, ratio_db(peak_p, noise)))
}

/// `10 · log10(signal / noise)`.  A vanishing noise floor is clamped to
/// `ε · signal` so a clean tone yields a large finite value; silence is 0 dB.
pub fn ratio_db(signal: f64, noise: f64) -> f64 {
    if signal <= 0.0 {
        return 0.0;
    }
    let floor = noise.max(f64::EPSILON * signal);
    10.0 * (signal / floor).log10()
}

/// Band-mean SNR of channel `ch`: mean power within `target ± bandwidth / 2`
/// over mean power of the bins in `noise` outside that band, in dB.
///
/// # Errors
///
/// [`Error::EmptyBand`] if either band holds no bin.
pub fn band_mean_snr_db(spectrum: &Spectrum, ch: usize, target: f64, bandwidth: f64, noise: Band) -> Result<f64> {
    let (lo, hi) = (target - bandwidth / 2.0, target + bandwidth / 2.0);
    let row = spectrum.channel(ch);
    let (mut sig, mut n_sig, mut floor, mut n_floor) = (0.0, 0usize, 0.0, 0usize);
    for (&f, &p) in spectrum.frequencies.iter().zip(row.iter()) {
        if f >= lo && f <= hi {
            sig += p;
            n_sig += 1;
        } else if noise.contains(f) {
            floor += p;
            n_floor += 1;
        }
    }
    if n_sig == 0 {
        return Err(Error::EmptyBand { min: lo, max: hi });
    }
    if n_floor == 0 {
        return Err(Error::EmptyBand { min: noise.min, max: noise.max });
    }
    Ok(ratio_db(sig / n_sig as f64, floor / n_floor as f64))
}

/// SNR at `target` for every channel of `spectrum`.
pub fn channel_snrs(spectrum: &Spectrum, names: &[String], target: f64) -> Result<Vec<ChannelSnr>> {
    names
        .iter()
        .enumerate()
        .map(|(ch, name)| {
            let (peak_frequency_hz, peak_power, noise_power, snr_db) = snr_at(spectrum, ch, target)?;
            Ok(ChannelSnr { channel: name.clone(), peak_frequency_hz, peak_power, noise_power, snr_db })
        })
        .collect()
}

/// Per-bin SNR in dB: each bin over the mean of its neighbours within
/// `±bandwidth / 2` (the bin itself excluded).
///
/// # Errors
///
/// [`Error::InvalidParameter`] when `bandwidth` spans less than one bin on
/// each side.
pub fn snr_spectrum(spectrum: &Spectrum, bandwidth: f64) -> Result<Array2<f64>> {
    let df = spectrum.resolution();
    let half = if df > 0.0 { (bandwidth / df / 2.0).round() as usize } else { 0 };
    if half == 0 {
        return Err(Error::param(format!(
            "neighbour bandwidth {bandwidth} Hz is narrower than two bins of {df} Hz"
        )));
    }
    let n = spectrum.frequencies.len();
    let mut out = Array2::<f64>::zeros(spectrum.power.dim());
    for (ch, row) in spectrum.power.outer_iter().enumerate() {
        for k in 0..n {
            let lo = k.saturating_sub(half);
            let hi = (k + half + 1).min(n);
            let (sum, count) = (lo..hi)
                .filter(|&j| j != k)
                .fold((0.0, 0usize), |(s, c), j| (s + row[j], c + 1));
            let mean = sum / count.max(1) as f64 + 1e-16;
            out[[ch, k]] = 10.0 * (row[k] / mean).max(1e-30).log10();
        }
    }
    Ok(out)
}

/// Numeric payload of an SNR analysis.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SnrResult {
    pub channel_names: Vec<String>,
    /// Bins in `[fmin, fmax]`.
    pub frequencies: Vec<f64>,
    /// `[channel, bin]`, dB.
    pub snr_spectrum: Array2<f64>,
    pub target_frequency_hz: Option<f64>,
    /// Empty when no target is set.
    pub channels: Vec<ChannelSnr>,
    pub mean_snr_db: Option<f64>,
}

pub fn analyze(slice: &Slice, params: &SnrParams) -> Result<SnrResult> {
    params.validate()?;
    let spectrum = compute_psd(slice.data.view(), slice.sampling_rate, &params.spectral)?;

    let idx = spectrum.indices_in(params.fmin, params.fmax);
    if idx.is_empty() {
        return Err(Error::EmptyBand { min: params.fmin, max: params.fmax });
    }
    let full = snr_spectrum(&spectrum, params.neighbor_bandwidth_hz)?;
    let snr_spec = full.select(ndarray::Axis(1), &idx);

    let channels = match params.target_frequency_hz {
        Some(t) => channel_snrs(&spectrum, &slice.channel_names, t)?,
        None => Vec::new(),
    };
    let mean_snr_db = mean(channels.iter().map(|c| c.snr_db));
    log::info!(
        "SNR: {} channels, target {:?} Hz, mean {:?} dB",
        slice.channel_names.len(),
        params.target_frequency_hz,
        mean_snr_db
    );

    Ok(SnrResult {
        channel_names: slice.channel_names.clone(),
        frequencies: idx.iter().map(|&k| spectrum.frequencies[k]).collect(),
        snr_spectrum: snr_spec,
        target_frequency_hz: params.target_frequency_hz,
        channels,
        mean_snr_db,
    })
}

pub(crate) fn mean<I: IntoIterator<Item = f64>>(values: I) -> Option<f64> {
    let (sum, n) = values.into_iter().fold((0.0, 0usize), |(s, n), v| (s + v, n + 1));
    (n > 0).then(|| sum / n as f64)
}

#[cfg(test)]
mod tests {
    use super::*;
    use ndarray::Array2;

    fn flat_with_peak(peak: f64) -> Spectrum {
        let frequencies: Vec<f64> = (0..=100).map(|k| k as f64 * 0.5).collect();
        let power = Array2::from_shape_fn((1, 101), |(_, k)| if k == 20 { peak } else { 1.0 });
        Spectrum { frequencies, power }
    }

    #[test]
    fn ten_x_peak_is_ten_db() {
        let s = flat_with_peak(10.0);
        let (f, p, noise, db) = snr_at(&s, 0, 10.0).unwrap();
        assert_eq!((f, p, noise), (10.0, 10.0, 1.0));
        approx::assert_abs_diff_eq!(db, 10.0, epsilon = 1e-12);
    }

    #[test]
    fn band_mean_excludes_signal_from_noise() {
        // 10 Hz bin at 10, its neighbours inside ±0.5 Hz at 1, everything else 1.
        let s = flat_with_peak(10.0);
        let db = band_mean_snr_db(&s, 0, 10.0, 1.0, Band::new(1.0, 50.0)).unwrap();
        // Signal band holds 9.5, 10, 10.5 Hz: mean (1 + 10 + 1) / 3 = 4.
        approx::assert_abs_diff_eq!(db, 10.0 * 4.0f64.log10(), epsilon = 1e-12);
        assert!(matches!(
            band_mean_snr_db(&s, 0, 10.0, 1.0, Band::new(9.6, 10.4)),
            Err(Error::EmptyBand { .. })
        ));
    }

    #[test]
    fn guard_band_excludes_leakage() {
        // Leakage at 12 Hz (inside the guard) must not count as noise.
        let mut s = flat_with_peak(100.0);
        s.power[[0, 24]] = 50.0;
        let (_, _, noise, _) = snr_at(&s, 0, 10.0).unwrap();
        assert_eq!(noise, 1.0);
    }

    #[test]
    fn target_beyond_axis_is_empty_band() {
        let s = flat_with_peak(10.0);
        assert!(matches!(snr_at(&s, 0, 200.0), Err(Error::EmptyBand { .. })));
    }

    #[test]
    fn snr_spectrum_marks_peak() {
        let s = flat_with_peak(10.0);
        let out = snr_spectrum(&s, 1.0).unwrap();
        approx::assert_abs_diff_eq!(out[[0, 20]], 10.0, epsilon = 1e-9);
        approx::assert_abs_diff_eq!(out[[0, 50]], 0.0, epsilon = 1e-9);
        assert!(snr_spectrum(&s, 0.2).is_err());
    }

    #[test]
    fn zero_noise_is_finite() {
        assert!(ratio_db(1.0, 0.0).is_finite());
        assert_eq!(ratio_db(0.0, 0.0), 0.0);
    }
}
