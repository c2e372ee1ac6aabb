//! Band power by trapezoidal integration of the PSD.
//!
//! `integrate` sums `(P_k + P_{k+1}) / 2 · (f_{k+1} − f_k)` over the bins
//! inside `[min, max]`.  A band holding a single bin counts that bin as a
//! rectangle one bin spacing wide.
use serde::{Deserialize, Serialize};

use super::snr::mean;
use crate::config::{Band, BandRatioParams, NamedBand};
use crate::error::{Error, Result};
use crate::selection::Slice;
use crate::spectral::{compute_psd, Spectrum};

/// Integrated power of channel `ch` over `band`.
///
/// # Errors
///
/// [`Error::EmptyBand`] when no bin falls inside `band`.
pub fn integrate(spectrum: &Spectrum, ch: usize, band: Band) -> Result<f64> {
    let idx = spectrum.indices_in(band.min, band.max);
    let row = spectrum.channel(ch);
    match idx.as_slice() {
        [] => return Err(Error::EmptyBand { min: band.min, max: band.max }),
        [k] => return Ok(row[*k] * spectrum.resolution()),
        _ => {}
    }
    let f = &spectrum.frequencies;
    Ok(idx
        .windows(2)
        .map(|w| 0.5 * (row[w[0]] + row[w[1]]) * (f[w[1]] - f[w[0]]))
        .sum())
}

// ── Band ratio ────────────────────────────────────────────────────────────

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ChannelRatio {
    pub channel: String,
    pub power_a: f64,
    pub power_b: f64,
    /// `None` when band B holds no power.
    pub ratio: Option<f64>,
}

/// Numeric payload of a band-ratio analysis.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct BandRatioResult {
    pub band_a: Band,
    pub band_b: Band,
    pub channels: Vec<ChannelRatio>,
    /// Mean over channels with a defined ratio.
    pub mean_ratio: Option<f64>,
}

/// `∫_A P / ∫_B P` for every channel of `spectrum`.
pub fn band_ratio(spectrum: &Spectrum, names: &[String], a: Band, b: Band) -> Result<BandRatioResult> {
    let channels = names
        .iter()
        .enumerate()
        .map(|(ch, name)| {
            let power_a = integrate(spectrum, ch, a)?;
            let power_b = integrate(spectrum, ch, b)?;
            let ratio = (power_b > 0.0).then(|| power_a / power_b);
            if ratio.is_none() {
                log::warn!("band ratio: channel '{name}' has no power in [{}, {}] Hz", b.min, b.max);
            }
            Ok(ChannelRatio { channel: name.clone(), power_a, power_b, ratio })
        })
        .collect::<Result<Vec<_>>>()?;
    let mean_ratio = mean(channels.iter().filter_map(|c| c.ratio));
    Ok(BandRatioResult { band_a: a, band_b: b, channels, mean_ratio })
}

pub fn analyze(slice: &Slice, params: &BandRatioParams) -> Result<BandRatioResult> {
    params.validate()?;
    let spectrum = compute_psd(slice.data.view(), slice.sampling_rate, &params.spectral)?;
    let out = band_ratio(&spectrum, &slice.channel_names, params.band_a, params.band_b)?;
    log::info!("band ratio: mean {:?} over {} channels", out.mean_ratio, out.channels.len());
    Ok(out)
}

// ── Named band powers ─────────────────────────────────────────────────────

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct BandPower {
    pub name: String,
    pub band: Band,
    pub absolute: f64,
    /// Fraction of the total power in the reference range.
    pub relative: f64,
}

/// Absolute and relative power of each named band for channel `ch`.
///
/// Relative power is taken against the integral over `total`.  Bands with
/// no bin below Nyquist report zero power instead of failing,
/// so one out-of-range band (gamma at low sampling rates) does not hide
/// the others.
pub fn band_powers(spectrum: &Spectrum, ch: usize, bands: &[NamedBand], total: Band) -> Result<Vec<BandPower>> {
    let total_power = integrate(spectrum, ch, total)?;
    Ok(bands
        .iter()
        .map(|nb| {
            let absolute = match integrate(spectrum, ch, nb.band) {
                Ok(p) => p,
                Err(_) => {
                    log::debug!("band {} [{}, {}] Hz has no bins", nb.name, nb.band.min, nb.band.max);
                    0.0
                }
            };
            let relative = if total_power > 0.0 { absolute / total_power } else { 0.0 };
            BandPower { name: nb.name.clone(), band: nb.band, absolute, relative }
        })
        .collect())
}

#[cfg(test)]
mod tests {
    use super::*;
    use ndarray::Array2;

    fn ramp() -> Spectrum {
        // P(f) = f on a 0.5 Hz grid up to 50 Hz.
        let frequencies: Vec<f64> = (0..=100).map(|k| k as f64 * 0.5).collect();
        let power = Array2::from_shape_fn((2, 101), |(c, k)| (c + 1) as f64 * k as f64 * 0.5);
        Spectrum { frequencies, power }
    }

    #[test]
    fn trapezoid_is_exact_for_linear() {
        // ∫_4^8 f df = 24
        let s = ramp();
        approx::assert_abs_diff_eq!(integrate(&s, 0, Band::new(4.0, 8.0)).unwrap(), 24.0, epsilon = 1e-12);
    }

    #[test]
    fn swapping_bands_inverts_ratio() {
        let s = ramp();
        let names = vec!["A".to_string(), "B".to_string()];
        let (a, b) = (Band::new(4.0, 8.0), Band::new(13.0, 30.0));
        let ab = band_ratio(&s, &names, a, b).unwrap();
        let ba = band_ratio(&s, &names, b, a).unwrap();
        for (x, y) in ab.channels.iter().zip(&ba.channels) {
            approx::assert_abs_diff_eq!(x.ratio.unwrap() * y.ratio.unwrap(), 1.0, epsilon = 1e-6);
        }
        approx::assert_abs_diff_eq!(ab.mean_ratio.unwrap(), 24.0 / 365.5, epsilon = 1e-12);
    }

    #[test]
    fn band_without_bins_is_empty() {
        let s = ramp();
        assert!(matches!(integrate(&s, 0, Band::new(4.1, 4.4)), Err(Error::EmptyBand { .. })));
        assert!(matches!(integrate(&s, 0, Band::new(60.0, 80.0)), Err(Error::EmptyBand { .. })));
    }

    #[test]
    fn single_bin_band_is_one_bin_wide() {
        // Only the 4.5 Hz bin lies in [4.3, 4.7]: P = 4.5, spacing 0.5.
        let s = ramp();
        approx::assert_abs_diff_eq!(integrate(&s, 0, Band::new(4.3, 4.7)).unwrap(), 2.25, epsilon = 1e-12);
        approx::assert_abs_diff_eq!(integrate(&s, 1, Band::new(4.3, 4.7)).unwrap(), 4.5, epsilon = 1e-12);

        let names = vec!["A".to_string(), "B".to_string()];
        let r = band_ratio(&s, &names, Band::new(4.3, 4.7), Band::new(9.8, 10.2)).unwrap();
        approx::assert_abs_diff_eq!(r.channels[0].ratio.unwrap(), 0.45, epsilon = 1e-12);
    }

    #[test]
    fn relative_powers() {
        let s = ramp();
        let bands = vec![NamedBand::new("lo", 0.0, 10.0), NamedBand::new("hi", 10.0, 20.0), NamedBand::new("x", 90.0, 99.0)];
        let out = band_powers(&s, 0, &bands, Band::new(0.0, 20.0)).unwrap();
        approx::assert_abs_diff_eq!(out[0].relative, 0.25, epsilon = 1e-12);
        approx::assert_abs_diff_eq!(out[1].relative, 0.75, epsilon = 1e-12);
        assert_eq!(out[2].absolute, 0.0);
    }
}
