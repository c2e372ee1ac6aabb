//! Steady-state evoked response detection.
//!
//! Three independent detectors per channel, combined into one confidence:
//!
//! | detector  | statistic                                   | detected when |
//! |-----------|---------------------------------------------|---------------|
//! | frequency | SNR at the target (see [`super::snr`])      | graded below  |
//! | time      | max normalised correlation with a sine      | `> 0.3`       |
//! | coherence | MSC with a reference sine at the target bin | `> 0.5`       |
//!
//! SNR grades: `high` above 6 dB, `medium` above 3 dB, `low` otherwise.
//! The frequency grade is primary; the other two detectors can raise it by
//! one level only when both agree.
use ndarray::{Array1, Array2, ArrayView1};
use serde::{Deserialize, Serialize};
use std::f64::consts::PI;

use super::band_power::{band_powers, BandPower};
use super::pca::{denoise, PcaDiagnostics};
use super::snr::snr_at;
use crate::config::{Band, SsvepParams};
use crate::error::Result;
use crate::selection::Slice;
use crate::spectral::{coherence, compute_psd};

pub const HIGH_SNR_DB: f64 = 6.0;
pub const MEDIUM_SNR_DB: f64 = 3.0;

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Confidence {
    Low,
    Medium,
    High,
}

impl Confidence {
    pub fn from_snr(snr_db: f64) -> Self {
        if snr_db > HIGH_SNR_DB {
            Confidence::High
        } else if snr_db > MEDIUM_SNR_DB {
            Confidence::Medium
        } else {
            Confidence::Low
        }
    }

    /// Raise `primary` one level when both corroborating detectors fire.
    pub fn combine(primary: Confidence, time_detected: bool, coherence_detected: bool) -> Self {
        match (primary, time_detected && coherence_detected) {
            (Confidence::Medium, true) => Confidence::High,
            (Confidence::Low, true) => Confidence::Medium,
            (c, _) => c,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ChannelDetection {
    pub channel: String,
    pub snr_db: f64,
    pub peak_power: f64,
    pub noise_power: f64,
    /// Grade from SNR alone.
    pub frequency_confidence: Confidence,
    /// Combined grade.
    pub confidence: Confidence,
    pub correlation: f64,
    pub time_detected: bool,
    pub coherence: f64,
    pub coherence_detected: bool,
    /// `0..=1`: 0.6 · min(SNR/12 dB, 1) + 0.2 · correlation + 0.2 · coherence.
    pub score: f64,
    pub band_powers: Vec<BandPower>,
}

/// Numeric payload of an SSVEP analysis.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SsvepResult {
    pub target_frequency_hz: f64,
    pub channels: Vec<ChannelDetection>,
    /// Channel with the highest SNR.
    pub best_channel: Option<String>,
    /// Any channel graded above `low`.
    pub detected: bool,
    pub pca: Option<PcaDiagnostics>,
    /// PSD over `[fmin, fmax]` of the analysed (possibly denoised) data.
    pub frequencies: Vec<f64>,
    pub power: Array2<f64>,
}

/// Unit-amplitude sine of `len` samples at `freq`.
pub fn sine(freq: f64, fs: f64, len: usize) -> Array1<f64> {
    Array1::from_shape_fn(len, |i| (2.0 * PI * freq * i as f64 / fs).sin())
}

/// Largest `|r|` of the sliding normalised correlation between `x` and a
/// `template_seconds` sine at `freq`.
///
/// Each lag is normalised by the energy of the overlapped stretch of `x`,
/// so the value is `1` for a clean tone regardless of its amplitude or the
/// record length.
pub fn template_correlation(x: ArrayView1<f64>, fs: f64, freq: f64, template_seconds: f64) -> f64 {
    let m = ((template_seconds * fs).round() as usize).clamp(1, x.len().max(1));
    if x.len() < m {
        return 0.0;
    }
    let t = sine(freq, fs, m);
    let t_energy = t.dot(&t);
    if t_energy <= 0.0 {
        return 0.0;
    }
    // Prefix sums of x² for the windowed energies.
    let mut prefix = Vec::with_capacity(x.len() + 1);
    prefix.push(0.0);
    for &v in x.iter() {
        let last = prefix[prefix.len() - 1];
        prefix.push(last + v * v);
    }

    (0..=x.len() - m)
        .map(|lag| {
            let energy = prefix[lag + m] - prefix[lag];
            if energy <= f64::MIN_POSITIVE {
                return 0.0;
            }
            let dot: f64 = x.slice(ndarray::s![lag..lag + m]).dot(&t);
            (dot / (energy * t_energy).sqrt()).abs()
        })
        .fold(0.0, f64::max)
}

pub fn analyze(slice: &Slice, params: &SsvepParams) -> Result<SsvepResult> {
    params.validate()?;
    let fs = slice.sampling_rate;
    let target = params.target_frequency_hz;

    // 1. Optional PCA denoising ----------------------------------------------
    let (data, pca) = match params.pca_components {
        Some(k) => {
            let (d, diag) = denoise(&slice.data, k, &slice.channel_names)?;
            (d, Some(diag))
        }
        None => (slice.data.clone(), None),
    };

    // 2. Frequency domain ----------------------------------------------------
    let spectrum = compute_psd(data.view(), fs, &params.spectral)?;
    let reference = sine(target, fs, data.ncols());
    let total = Band::new(params.fmin, params.fmax);

    let mut channels = Vec::with_capacity(slice.channel_names.len());
    for (ch, name) in slice.channel_names.iter().enumerate() {
        let (_, peak_power, noise_power, snr_db) = snr_at(&spectrum, ch, target)?;
        let frequency_confidence = Confidence::from_snr(snr_db);

        // 3. Time domain -----------------------------------------------------
        let correlation = template_correlation(data.row(ch), fs, target, params.template_seconds);
        let time_detected = correlation > params.correlation_threshold;

        // 4. Coherence ---------------------------------------------------------
        let coh = coherence(data.row(ch), reference.view(), fs, &params.spectral)?
            .at(target)
            .unwrap_or(0.0);
        let coherence_detected = coh > params.coherence_threshold;

        let confidence = Confidence::combine(frequency_confidence, time_detected, coherence_detected);
        let score = 0.6 * (snr_db / 12.0).clamp(0.0, 1.0) + 0.2 * correlation.min(1.0) + 0.2 * coh;
        log::debug!(
            "SSVEP {name}: snr={snr_db:.2} dB r={correlation:.3} coh={coh:.3} → {confidence:?}"
        );

        channels.push(ChannelDetection {
            channel: name.clone(),
            snr_db,
            peak_power,
            noise_power,
            frequency_confidence,
            confidence,
            correlation,
            time_detected,
            coherence: coh,
            coherence_detected,
            score,
            band_powers: band_powers(&spectrum, ch, &params.frequency_bands, total)?,
        });
    }

    let best_channel = channels
        .iter()
        .max_by(|a, b| a.snr_db.total_cmp(&b.snr_db))
        .map(|c| c.channel.clone());
    let detected = channels.iter().any(|c| c.confidence > Confidence::Low);
    let shown = spectrum.restrict(params.fmin, params.fmax)?;
    log::info!("SSVEP at {target} Hz: best channel {best_channel:?}, detected={detected}");

    Ok(SsvepResult {
        target_frequency_hz: target,
        channels,
        best_channel,
        detected,
        pca,
        frequencies: shown.frequencies,
        power: shown.power,
    })
}
