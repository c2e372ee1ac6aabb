//! PSD of several traces on one axis.
//!
//! A trace is one channel of one loaded file over its own time window, so
//! the same channel can be compared across files or across two parts of a
//! recording.  Each trace is estimated independently:
//!
//! 1. Resolve the file (`None` is the active one) and the channel.  A file
//!    or channel that is not there skips the trace with a warning.
//! 2. Resolve the window.  Missing bounds default to the recording edges;
//!    a window that is empty or runs past the end falls back to the whole
//!    recording with a warning.
//! 3. Estimate the PSD and keep the bins in `[fmin, fmax]`.
//!
//! The result is degraded when any trace was skipped or fell back, and an
//! error when none survived.
use serde::{Deserialize, Serialize};

use crate::config::{ComparisonPsdParams, PsdMethod, TraceSpec};
use crate::error::{Error, Result};
use crate::recording::Recording;
use crate::selection::{slice, TimeWindow};
use crate::spectral::compute_psd;

/// One estimated trace.  Power is linear.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ComparisonTrace {
    pub label: String,
    pub filename: String,
    pub channel: String,
    /// Window actually used, after any fallback.
    pub window: TimeWindow,
    pub frequencies: Vec<f64>,
    pub power: Vec<f64>,
    pub peak_frequency_hz: f64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ComparisonPsdResult {
    pub method: PsdMethod,
    pub traces: Vec<ComparisonTrace>,
    /// Skipped traces and window fallbacks, in trace order.
    pub warnings: Vec<String>,
}

impl ComparisonPsdResult {
    pub fn is_degraded(&self) -> bool {
        !self.warnings.is_empty()
    }
}

/// Estimate every trace of `params` against the loaded `sources`.
///
/// `sources[0]` is the active file.
///
/// # Errors
///
/// [`Error::InvalidParameter`] for bad parameters or when every trace was
/// skipped.
pub fn analyze(sources: &[(&str, &Recording)], params: &ComparisonPsdParams) -> Result<ComparisonPsdResult> {
    params.validate()?;
    let mut traces = Vec::with_capacity(params.traces.len());
    let mut warnings = Vec::new();

    for spec in &params.traces {
        match estimate(sources, spec, params, &mut warnings) {
            Ok(trace) => traces.push(trace),
            Err(e) => {
                log::warn!("comparison PSD: skipping {}: {e}", describe(spec));
                warnings.push(format!("skipped {}: {e}", describe(spec)));
            }
        }
    }

    if traces.is_empty() {
        return Err(Error::param(format!("no trace could be estimated ({})", warnings.join("; "))));
    }
    log::info!(
        "comparison PSD ({:?}): {} of {} traces in [{}, {}] Hz",
        params.spectral.method,
        traces.len(),
        params.traces.len(),
        params.fmin,
        params.fmax
    );
    Ok(ComparisonPsdResult { method: params.spectral.method, traces, warnings })
}

fn estimate(
    sources: &[(&str, &Recording)],
    spec: &TraceSpec,
    params: &ComparisonPsdParams,
    warnings: &mut Vec<String>,
) -> Result<ComparisonTrace> {
    let (filename, recording) = match &spec.filename {
        None => sources.first().copied().ok_or_else(|| Error::param("no active file"))?,
        Some(name) => sources
            .iter()
            .find(|(f, _)| *f == name.as_str())
            .copied()
            .ok_or_else(|| Error::param(format!("file '{name}' is not loaded and ready")))?,
    };
    if recording.channel_index(&spec.channel).is_none() {
        return Err(Error::UnknownChannel(spec.channel.clone()));
    }

    let full = TimeWindow::full(recording);
    let requested = TimeWindow::new(
        spec.start_seconds.unwrap_or(full.start_seconds),
        spec.end_seconds.unwrap_or(full.end_seconds),
    );
    let window = if requested.start_seconds >= 0.0
        && requested.start_seconds < requested.end_seconds
        && requested.end_seconds <= full.end_seconds
    {
        requested
    } else {
        let note = format!(
            "{}: window {:.2} to {:.2} s outside 0 to {:.2} s, using the whole recording",
            describe(spec),
            requested.start_seconds,
            requested.end_seconds,
            full.end_seconds
        );
        log::warn!("comparison PSD: {note}");
        warnings.push(note);
        full
    };

    let data = slice(recording, window.start_seconds, window.end_seconds, &[spec.channel.as_str()])?;
    let spectrum = compute_psd(data.data.view(), data.sampling_rate, &params.spectral)?
        .restrict(params.fmin, params.fmax)?;
    let peak_frequency_hz = spectrum.peak_frequency(0).unwrap_or(f64::NAN);

    Ok(ComparisonTrace {
        label: spec.label.clone().unwrap_or_else(|| format!("{filename} - {}", spec.channel)),
        filename: filename.to_string(),
        channel: spec.channel.clone(),
        window,
        power: spectrum.power.row(0).to_vec(),
        frequencies: spectrum.frequencies,
        peak_frequency_hz,
    })
}

fn describe(spec: &TraceSpec) -> String {
    match &spec.filename {
        Some(f) => format!("{f}:{}", spec.channel),
        None => spec.channel.clone(),
    }
}
