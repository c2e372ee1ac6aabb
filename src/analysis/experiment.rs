//! SNR per stimulation period, aggregated per experiment.
//!
//! Annotations imported from a CSV carry an experiment name.  Every such
//! annotation with a positive duration is one stimulation period, and the
//! periods of one file that share a name form one experiment:
//!
//! ```text
//!   file ─┬─ experiment "A" ─┬─ period 1 ─► PSD, SNR spectrum, SNR per target
//!         │                  └─ period 2 ─► …
//!         └─ experiment "B" ─── …
//!                    │
//!                    ▼
//!   mean PSD, mean SNR spectrum, mean SNR per target,
//!   peak SNR per channel near the first target ─► heatmap column
//! ```
//!
//! Rules:
//! 1. A period is `[round(onset × fs), round((onset + duration) × fs))`.
//!    One that runs past the end of the data, or is too short for the
//!    spectral estimator, is skipped with a warning.
//! 2. The SNR of a period at target `f₀` is the mean power within
//!    `f₀ ± bandwidth / 2` over the mean power in the noise range outside
//!    that band, in dB.
//! 3. The peak SNR of a channel is the largest bin of the mean SNR
//!    spectrum within `±peak_tolerance` of the first target (the nearest
//!    bin when none lies inside).
//! 4. Heatmap rows are the requested channels, columns the experiments in
//!    order of first appearance, file by file.  A channel missing from a
//!    file has no value in that file's columns.
use ndarray::Array2;
use serde::{Deserialize, Serialize};

use crate::analysis::snr::{band_mean_snr_db, snr_spectrum};
use crate::config::ExperimentSnrParams;
use crate::error::{Error, Result};
use crate::recording::{Annotation, Recording};
use crate::selection::slice;
use crate::spectral::{compute_psd, Spectrum};

/// One stimulation period.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PeriodSnr {
    pub filename: String,
    pub experiment: String,
    pub onset_seconds: f64,
    pub duration_seconds: f64,
    /// `[target, channel]`, dB.
    pub snr_db: Array2<f64>,
}

/// Aggregate over the periods of one experiment in one file.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ExperimentSummary {
    pub filename: String,
    pub experiment: String,
    /// Heatmap column label.
    pub label: String,
    /// Requested channels present in the file.
    pub channel_names: Vec<String>,
    pub n_periods: usize,
    /// Bins in the noise range.
    pub frequencies: Vec<f64>,
    /// `[channel, bin]`, mean over periods.
    pub mean_power: Array2<f64>,
    /// `[channel, bin]`, dB, mean over periods.
    pub mean_snr_spectrum: Array2<f64>,
    /// `[target, channel]`, dB, mean over periods.
    pub mean_snr_db: Array2<f64>,
    /// Per channel, near the first target.
    pub peak_snr_db: Vec<f64>,
    pub channels_above_threshold: Vec<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ExperimentSnrResult {
    /// Heatmap rows.
    pub channel_names: Vec<String>,
    pub target_frequencies: Vec<f64>,
    pub snr_threshold_db: f64,
    pub experiments: Vec<ExperimentSummary>,
    pub periods: Vec<PeriodSnr>,
    /// `[channel][experiment]` peak SNR in dB.
    pub heatmap: Vec<Vec<Option<f64>>>,
    pub warnings: Vec<String>,
}

impl ExperimentSnrResult {
    pub fn is_degraded(&self) -> bool {
        !self.warnings.is_empty()
    }

    pub fn column_labels(&self) -> Vec<String> {
        self.experiments.iter().map(|e| e.label.clone()).collect()
    }

    /// Heatmap as a `[channel, experiment]` matrix, NaN where missing.
    pub fn heatmap_matrix(&self) -> Array2<f64> {
        let cols = self.experiments.len();
        Array2::from_shape_fn((self.heatmap.len(), cols), |(r, c)| {
            self.heatmap[r].get(c).copied().flatten().unwrap_or(f64::NAN)
        })
    }
}

/// Score every experiment of the selected files.
///
/// `sources[0]` is the active file; `params.files` picks others by name.
///
/// # Errors
///
/// * [`Error::InvalidParameter`] for bad parameters, an empty channel
///   list, or when no period could be analysed.
/// * Errors of the SNR spectrum (bandwidth narrower than two bins).
pub fn analyze(
    sources: &[(&str, &Recording)],
    channels: &[String],
    params: &ExperimentSnrParams,
) -> Result<ExperimentSnrResult> {
    params.validate()?;
    if channels.is_empty() {
        return Err(Error::param("channel selection is empty"));
    }
    let mut warnings = Vec::new();

    let selected: Vec<(&str, &Recording)> = if params.files.is_empty() {
        sources.first().copied().into_iter().collect()
    } else {
        params
            .files
            .iter()
            .filter_map(|name| {
                let found = sources.iter().find(|(f, _)| *f == name.as_str()).copied();
                if found.is_none() {
                    warnings.push(format!("file '{name}' is not loaded and ready"));
                }
                found
            })
            .collect()
    };
    let multi_file = selected.len() > 1;

    let mut experiments = Vec::new();
    let mut periods = Vec::new();
    for (filename, recording) in &selected {
        let present: Vec<String> = channels
            .iter()
            .filter(|c| recording.channel_index(c).is_some())
            .cloned()
            .collect();
        if present.len() < channels.len() {
            warnings.push(format!(
                "{filename}: {} of {} channels missing",
                channels.len() - present.len(),
                channels.len()
            ));
        }
        if present.is_empty() {
            continue;
        }
        let groups = group_periods(recording.annotations());
        if groups.is_empty() {
            warnings.push(format!("{filename}: no experiment annotations"));
        }
        for (name, group) in groups {
            let mut acc = Accumulator::default();
            for a in group {
                match score_period(recording, &present, a, params) {
                    Ok((spectrum, snr_spec, snr_db)) => {
                        acc.add(&spectrum, snr_spec);
                        periods.push(PeriodSnr {
                            filename: filename.to_string(),
                            experiment: name.clone(),
                            onset_seconds: a.onset_seconds,
                            duration_seconds: a.duration_seconds,
                            snr_db,
                        });
                    }
                    Err(e @ Error::InvalidParameter(_)) => return Err(e),
                    Err(e) => {
                        let note = format!(
                            "{filename}: skipped '{name}' period at {:.2} s: {e}",
                            a.onset_seconds
                        );
                        log::warn!("experiment SNR: {note}");
                        warnings.push(note);
                    }
                }
            }
            let label = if multi_file { format!("{filename}: {name}") } else { name.clone() };
            match acc.finish(filename, &name, label, &present, &periods, params) {
                Some(summary) => experiments.push(summary),
                None => warnings.push(format!("{filename}: experiment '{name}' has no usable period")),
            }
        }
    }

    if experiments.is_empty() {
        return Err(Error::param(format!("no stimulation period could be analysed ({})", warnings.join("; "))));
    }

    let heatmap = channels
        .iter()
        .map(|ch| {
            experiments
                .iter()
                .map(|e| e.channel_names.iter().position(|c| c == ch).map(|i| e.peak_snr_db[i]))
                .collect()
        })
        .collect();

    log::info!(
        "experiment SNR: {} experiments, {} periods, targets {:?} Hz, {} warnings",
        experiments.len(),
        periods.len(),
        params.target_frequencies,
        warnings.len()
    );
    Ok(ExperimentSnrResult {
        channel_names: channels.to_vec(),
        target_frequencies: params.target_frequencies.clone(),
        snr_threshold_db: params.snr_threshold_db,
        experiments,
        periods,
        heatmap,
        warnings,
    })
}

/// Experiment periods in order of first appearance of each name.
fn group_periods(annotations: &[Annotation]) -> Vec<(String, Vec<&Annotation>)> {
    let mut groups: Vec<(String, Vec<&Annotation>)> = Vec::new();
    for a in annotations.iter().filter(|a| a.duration_seconds > 0.0) {
        let Some(name) = a.experiment.as_deref().map(str::trim).filter(|n| !n.is_empty()) else { continue };
        match groups.iter_mut().find(|(n, _)| n == name) {
            Some((_, members)) => members.push(a),
            None => groups.push((name.to_string(), vec![a])),
        }
    }
    groups
}

/// Spectrum restricted to the noise range, its SNR spectrum and the
/// `[target, channel]` band-mean SNR.
fn score_period(
    recording: &Recording,
    channels: &[String],
    period: &Annotation,
    params: &ExperimentSnrParams,
) -> Result<(Spectrum, Array2<f64>, Array2<f64>)> {
    let fs = recording.sampling_frequency_hz();
    let end = period.end_seconds();
    if (end * fs).round() as usize > recording.n_samples() {
        return Err(Error::invalid_window(
            period.onset_seconds,
            end,
            format!("runs past the end of the data at {:.2} s", recording.duration_seconds()),
        ));
    }
    let data = slice(recording, period.onset_seconds, end, channels)?;
    let full = compute_psd(data.data.view(), fs, &params.spectral)?;
    let snr_full = snr_spectrum(&full, params.signal_bandwidth_hz)?;

    let mut snr_db = Array2::<f64>::zeros((params.target_frequencies.len(), channels.len()));
    for (t, &target) in params.target_frequencies.iter().enumerate() {
        for ch in 0..channels.len() {
            snr_db[[t, ch]] = band_mean_snr_db(&full, ch, target, params.signal_bandwidth_hz, params.noise_range)?;
        }
    }

    let idx = full.indices_in(params.noise_range.min, params.noise_range.max);
    let spectrum = full.restrict(params.noise_range.min, params.noise_range.max)?;
    Ok((spectrum, snr_full.select(ndarray::Axis(1), &idx), snr_db))
}

/// Running sums over the periods of one experiment.
#[derive(Default)]
struct Accumulator {
    frequencies: Vec<f64>,
    power: Option<Array2<f64>>,
    snr_spectrum: Option<Array2<f64>>,
    n: usize,
}

impl Accumulator {
    fn add(&mut self, spectrum: &Spectrum, snr_spec: Array2<f64>) {
        match (&mut self.power, &mut self.snr_spectrum) {
            (Some(p), Some(s)) => {
                *p += &spectrum.power;
                *s += &snr_spec;
            }
            _ => {
                self.frequencies = spectrum.frequencies.clone();
                self.power = Some(spectrum.power.clone());
                self.snr_spectrum = Some(snr_spec);
            }
        }
        self.n += 1;
    }

    fn finish(
        self,
        filename: &str,
        experiment: &str,
        label: String,
        channels: &[String],
        periods: &[PeriodSnr],
        params: &ExperimentSnrParams,
    ) -> Option<ExperimentSummary> {
        let (Some(power), Some(snr_spectrum)) = (self.power, self.snr_spectrum) else { return None };
        let n = self.n as f64;
        let mean_power = power / n;
        let mean_snr_spectrum = snr_spectrum / n;

        let mut mean_snr_db = Array2::<f64>::zeros((params.target_frequencies.len(), channels.len()));
        for p in periods.iter().filter(|p| p.filename == filename && p.experiment == experiment) {
            mean_snr_db += &p.snr_db;
        }
        mean_snr_db /= n;

        let target = params.target_frequencies[0];
        let mut near: Vec<usize> = self
            .frequencies
            .iter()
            .enumerate()
            .filter(|(_, &f)| (f - target).abs() <= params.peak_tolerance_hz)
            .map(|(k, _)| k)
            .collect();
        if near.is_empty() {
            near.extend(crate::spectral::nearest_index(&self.frequencies, target));
        }
        let peak_snr_db: Vec<f64> = mean_snr_spectrum
            .outer_iter()
            .map(|row| near.iter().map(|&k| row[k]).fold(f64::NEG_INFINITY, f64::max))
            .collect();
        let channels_above_threshold = channels
            .iter()
            .zip(&peak_snr_db)
            .filter(|(_, &v)| v >= params.snr_threshold_db)
            .map(|(c, _)| c.clone())
            .collect();

        Some(ExperimentSummary {
            filename: filename.to_string(),
            experiment: experiment.to_string(),
            label,
            channel_names: channels.to_vec(),
            n_periods: self.n,
            frequencies: self.frequencies,
            mean_power,
            mean_snr_spectrum,
            mean_snr_db,
            peak_snr_db,
            channels_above_threshold,
        })
    }
}
