//! Time-frequency magnitude map with complex Morlet wavelets.
//!
//! For each frequency `f` the wavelet is
//! ```text
//! ψ_f(t) = exp(−t² / 2σ²) · exp(i 2π f t),   σ = n_cycles / (2π f)
//! ```
//! truncated at ±3.5σ.  The map is the magnitude of `x ⋆ ψ_f` evaluated
//! only at `time_points` evenly spaced sample positions, scaled by
//! `2 / Σ exp(−t² / 2σ²)` so a unit-amplitude sine reads ≈ 1 away from the
//! edges.  Samples outside the window count as zero.
use ndarray::{Array2, ArrayView1};
use serde::{Deserialize, Serialize};
use std::f64::consts::PI;

use crate::config::{FrequencyScale, TimeFrequencyParams};
use crate::error::{Error, Result};
use crate::selection::Slice;

/// Support of the Gaussian envelope, in standard deviations.
const SUPPORT_SIGMAS: f64 = 3.5;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TimeFrequencyMap {
    pub channel: String,
    pub frequencies: Vec<f64>,
    /// Seconds from the start of the recording.
    pub times: Vec<f64>,
    /// `[frequency, time]`.
    pub magnitude: Array2<f64>,
}

/// `n` frequencies from `min` to `max` inclusive.
pub fn frequency_grid(min: f64, max: f64, n: usize, scale: FrequencyScale) -> Vec<f64> {
    if n == 1 {
        return vec![min];
    }
    let step = |i: usize| i as f64 / (n - 1) as f64;
    match scale {
        FrequencyScale::Linear => (0..n).map(|i| min + (max - min) * step(i)).collect(),
        FrequencyScale::Log => {
            let (lo, hi) = (min.log10(), max.log10());
            (0..n).map(|i| 10f64.powf(lo + (hi - lo) * step(i))).collect()
        }
    }
}

/// `n` sample positions spread evenly over `0..len`.
pub fn time_positions(len: usize, n: usize) -> Vec<usize> {
    if n <= 1 || len <= 1 {
        return vec![0; n.min(1)];
    }
    (0..n)
        .map(|i| ((len - 1) as f64 * i as f64 / (n - 1) as f64).round() as usize)
        .collect()
}

/// Morlet magnitude of `x` at every `(frequency, position)` pair.
pub fn morlet_magnitude(x: ArrayView1<f64>, fs: f64, freqs: &[f64], positions: &[usize], n_cycles: f64) -> Array2<f64> {
    let n = x.len() as isize;
    let mut out = Array2::<f64>::zeros((freqs.len(), positions.len()));
    for (fi, &f) in freqs.iter().enumerate() {
        let sigma = n_cycles / (2.0 * PI * f) * fs;
        let half = (SUPPORT_SIGMAS * sigma).ceil() as isize;
        let omega = 2.0 * PI * f / fs;

        let kernel: Vec<(f64, f64, f64)> = (-half..=half)
            .map(|k| {
                let kf = k as f64;
                let g = (-kf * kf / (2.0 * sigma * sigma)).exp();
                (g, g * (omega * kf).cos(), g * (omega * kf).sin())
            })
            .collect();
        let norm = 2.0 / kernel.iter().map(|(g, _, _)| g).sum::<f64>();

        for (ti, &pos) in positions.iter().enumerate() {
            let (mut re, mut im) = (0.0, 0.0);
            for (j, (_, c, s)) in kernel.iter().enumerate() {
                let idx = pos as isize + j as isize - half;
                if idx < 0 || idx >= n {
                    continue;
                }
                let v = x[idx as usize];
                re += v * c;
                im -= v * s;
            }
            out[[fi, ti]] = norm * (re * re + im * im).sqrt();
        }
    }
    out
}

pub fn analyze(slice: &Slice, params: &TimeFrequencyParams) -> Result<TimeFrequencyMap> {
    params.validate()?;
    let nyquist = slice.sampling_rate / 2.0;
    if params.freq_max > nyquist {
        return Err(Error::param(format!(
            "freqMax {} Hz exceeds Nyquist {nyquist} Hz",
            params.freq_max
        )));
    }
    let Some(channel) = slice.channel_names.get(params.channel_index) else {
        return Err(Error::param(format!(
            "channelIndex {} out of range for {} selected channels",
            params.channel_index,
            slice.channel_names.len()
        )));
    };

    let freqs = frequency_grid(params.freq_min, params.freq_max, params.freq_points, params.scale);
    let positions = time_positions(slice.n_samples(), params.time_points);
    let magnitude = morlet_magnitude(
        slice.data.row(params.channel_index),
        slice.sampling_rate,
        &freqs,
        &positions,
        params.n_cycles,
    );
    log::info!("time-frequency: '{channel}', {}×{} map", freqs.len(), positions.len());

    Ok(TimeFrequencyMap {
        channel: channel.clone(),
        times: positions
            .iter()
            .map(|&p| slice.start_seconds + p as f64 / slice.sampling_rate)
            .collect(),
        frequencies: freqs,
        magnitude,
    })
}
