//! Analysis requests, results and dispatch.
//!
//! A request names the analysis (through its parameter variant), the time
//! window and the channel subset.  [`run`] slices the recording, runs the
//! matching algorithm and renders its plot; the session then wraps the
//! output into an [`AnalysisResult`] with an id and source filename.
//!
//! Comparison PSD and experiment SNR pick their own windows and may read
//! other loaded files; [`run_with`] hands them every ready recording.
use ndarray::Array2;
use serde::{Deserialize, Serialize};

use crate::analysis::{
    self, band_power, comparison, experiment, fooof, snr, ssvep, tfr, BandRatioResult, ComparisonPsdResult,
    ExperimentSnrResult, PsdResult, SnrResult, SpectralParamResult, SsvepResult, TimeFrequencyMap,
};
use crate::config::{AnalysisParams, AnalysisType, RawPlotParams};
use crate::error::{Error, Result};
use crate::recording::Recording;
use crate::render::{self, Marker, RenderedPlot};
use crate::selection::{slice, Slice, TimeWindow};

/// One user-triggered analysis.  Never mutated after submission.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AnalysisRequest {
    pub parameters: AnalysisParams,
    pub window: TimeWindow,
    /// Non-empty; output order follows this order.
    pub channels: Vec<String>,
}

impl AnalysisRequest {
    pub fn new(parameters: AnalysisParams, window: TimeWindow, channels: Vec<String>) -> Self {
        Self { parameters, window, channels }
    }

    pub fn analysis_type(&self) -> AnalysisType {
        self.parameters.analysis_type()
    }

    /// Short human-readable description for report captions.
    pub fn caption(&self) -> String {
        match &self.parameters {
            AnalysisParams::ComparisonPsd(p) => {
                return format!("{} of {} traces", self.analysis_type(), p.traces.len());
            }
            AnalysisParams::ExperimentSnr(p) => {
                let files = if p.files.len() > 1 { format!(" across {} files", p.files.len()) } else { String::new() };
                return format!("{} at {:?} Hz{files}", self.analysis_type(), p.target_frequencies);
            }
            _ => {}
        }
        let channels = if self.channels.len() > 4 {
            format!("{} channels", self.channels.len())
        } else {
            self.channels.join(", ")
        };
        format!(
            "{} of {channels}, {:.1} to {:.1} s",
            self.analysis_type(),
            self.window.start_seconds,
            self.window.end_seconds
        )
    }
}

/// Raw traces over the window.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RawTraces {
    pub channel_names: Vec<String>,
    pub sampling_rate: f64,
    pub start_seconds: f64,
    /// `[channel, sample]`, physical units.
    pub data: Array2<f64>,
}

/// Analysis-specific numeric output.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "analysisType", content = "data")]
pub enum Payload {
    #[serde(rename = "PSD")]
    Psd(PsdResult),
    #[serde(rename = "SNR")]
    Snr(SnrResult),
    BandRatio(BandRatioResult),
    TimeFrequency(TimeFrequencyMap),
    SpectralParam(SpectralParamResult),
    #[serde(rename = "SSVEP")]
    Ssvep(SsvepResult),
    RawPlot(RawTraces),
    #[serde(rename = "ComparisonPSD")]
    ComparisonPsd(ComparisonPsdResult),
    #[serde(rename = "ExperimentSNR")]
    ExperimentSnr(ExperimentSnrResult),
}

/// Whether a result is fully trustworthy.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", tag = "status")]
pub enum Quality {
    Ok,
    /// Delivered, but with a caveat (e.g. a fit that did not converge).
    Degraded { reason: String },
}

/// Output of [`run`], before the session assigns an id.
#[derive(Debug, Clone, PartialEq)]
pub struct AnalysisOutput {
    pub payload: Payload,
    pub plot: RenderedPlot,
    pub quality: Quality,
}

/// A completed analysis, as kept in the session's result list.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AnalysisResult {
    pub id: String,
    pub analysis_type: AnalysisType,
    pub payload: Payload,
    pub plot: RenderedPlot,
    pub request: AnalysisRequest,
    pub filename: String,
    pub quality: Quality,
    pub caption: String,
}

/// Slice `recording` per `request`, run the analysis and render its plot.
///
/// # Errors
///
/// Parameter validation, selection and analysis preconditions, all
/// recoverable; nothing is retried.
pub fn run(recording: &Recording, request: &AnalysisRequest) -> Result<AnalysisOutput> {
    run_with(&[("", recording)], request)
}

/// [`run`] against several loaded files.  `sources[0]` is the active file,
/// which every single-file analysis reads.
pub fn run_with(sources: &[(&str, &Recording)], request: &AnalysisRequest) -> Result<AnalysisOutput> {
    request.parameters.validate()?;
    let (_, recording) = *sources.first().ok_or_else(|| Error::param("no recording to analyse"))?;
    let windowed = || -> Result<Slice> {
        let data = slice(
            recording,
            request.window.start_seconds,
            request.window.end_seconds,
            &request.channels,
        )?;
        log::debug!(
            "running {} on {} channels × {} samples",
            request.analysis_type(),
            data.channel_names.len(),
            data.n_samples()
        );
        Ok(data)
    };

    let (payload, quality) = match &request.parameters {
        AnalysisParams::Psd(p) => (Payload::Psd(analysis::psd(&windowed()?, p)?), Quality::Ok),
        AnalysisParams::Snr(p) => (Payload::Snr(snr::analyze(&windowed()?, p)?), Quality::Ok),
        AnalysisParams::BandRatio(p) => (Payload::BandRatio(band_power::analyze(&windowed()?, p)?), Quality::Ok),
        AnalysisParams::TimeFrequency(p) => (Payload::TimeFrequency(tfr::analyze(&windowed()?, p)?), Quality::Ok),
        AnalysisParams::SpectralParam(p) => {
            let fit = fooof::analyze(&windowed()?, p)?;
            let quality = if fit.is_degraded() {
                let names: Vec<&str> = fit
                    .channels
                    .iter()
                    .filter(|c| c.fit.status == fooof::FitStatus::DidNotConverge)
                    .map(|c| c.channel.as_str())
                    .collect();
                Quality::Degraded { reason: format!("fit did not converge for {}", names.join(", ")) }
            } else {
                Quality::Ok
            };
            (Payload::SpectralParam(fit), quality)
        }
        AnalysisParams::Ssvep(p) => (Payload::Ssvep(ssvep::analyze(&windowed()?, p)?), Quality::Ok),
        AnalysisParams::RawPlot(_) => (Payload::RawPlot(raw_traces(windowed()?)), Quality::Ok),
        AnalysisParams::ComparisonPsd(p) => {
            let r = comparison::analyze(sources, p)?;
            let quality = caveats(&r.warnings);
            (Payload::ComparisonPsd(r), quality)
        }
        AnalysisParams::ExperimentSnr(p) => {
            let r = experiment::analyze(sources, &request.channels, p)?;
            let quality = caveats(&r.warnings);
            (Payload::ExperimentSnr(r), quality)
        }
    };

    let plot = plot_payload(&payload, &request.parameters)?;
    Ok(AnalysisOutput { payload, plot, quality })
}

fn caveats(warnings: &[String]) -> Quality {
    if warnings.is_empty() {
        Quality::Ok
    } else {
        Quality::Degraded { reason: warnings.join("; ") }
    }
}

fn raw_traces(s: Slice) -> RawTraces {
    RawTraces {
        channel_names: s.channel_names,
        sampling_rate: s.sampling_rate,
        start_seconds: s.start_seconds,
        data: s.data,
    }
}

/// Render the figure for a payload.
pub fn plot_payload(payload: &Payload, params: &AnalysisParams) -> Result<RenderedPlot> {
    match payload {
        Payload::Psd(r) => {
            let db = matches!(params, AnalysisParams::Psd(p) if p.use_decibels);
            let series: Vec<Vec<(f64, f64)>> = r
                .power
                .outer_iter()
                .map(|row| {
                    r.frequencies
                        .iter()
                        .zip(row.iter())
                        .map(|(&f, &p)| (f, if db { 10.0 * p.max(1e-30).log10() } else { p }))
                        .collect()
                })
                .collect();
            render::line_plot(&series, &[])
        }
        Payload::Snr(r) => {
            let series = rows_against(&r.frequencies, &r.snr_spectrum);
            let markers: Vec<Marker> = r.target_frequency_hz.map(Marker::Vertical).into_iter().collect();
            render::line_plot(&series, &markers)
        }
        Payload::BandRatio(r) => {
            let values: Vec<f64> = r.channels.iter().map(|c| c.ratio.unwrap_or(f64::NAN)).collect();
            let markers: Vec<Marker> = r.mean_ratio.map(Marker::Horizontal).into_iter().collect();
            render::bar_plot(&values, &markers)
        }
        Payload::TimeFrequency(m) => render::heatmap(&m.times, &m.frequencies, &m.magnitude),
        Payload::SpectralParam(r) => {
            let mut series: Vec<Vec<(f64, f64)>> = Vec::new();
            for c in &r.channels {
                let f = &c.fit.frequencies;
                for line in [&c.fit.power_spectrum, &c.fit.model_fit, &c.fit.aperiodic_fit] {
                    series.push(f.iter().copied().zip(line.iter().copied()).collect());
                }
            }
            render::line_plot(&series, &[])
        }
        Payload::Ssvep(r) => {
            let db = r.power.mapv(|p| 10.0 * p.max(1e-30).log10());
            render::line_plot(&rows_against(&r.frequencies, &db), &[Marker::Vertical(r.target_frequency_hz)])
        }
        Payload::RawPlot(t) => {
            let max_points = match params {
                AnalysisParams::RawPlot(p) => p.max_points,
                _ => RawPlotParams::default().max_points,
            };
            render::line_plot(&stacked_traces(t, max_points), &[])
        }
        Payload::ComparisonPsd(r) => {
            let series: Vec<Vec<(f64, f64)>> = r
                .traces
                .iter()
                .map(|t| {
                    t.frequencies
                        .iter()
                        .zip(&t.power)
                        .map(|(&f, &p)| (f, 10.0 * p.max(1e-30).log10()))
                        .collect()
                })
                .collect();
            render::line_plot(&series, &[])
        }
        Payload::ExperimentSnr(r) => {
            let xs: Vec<f64> = (0..r.experiments.len()).map(|i| i as f64).collect();
            let ys: Vec<f64> = (0..r.channel_names.len()).map(|i| i as f64).collect();
            render::heatmap(&xs, &ys, &r.heatmap_matrix())
        }
    }
}

fn rows_against(x: &[f64], rows: &Array2<f64>) -> Vec<Vec<(f64, f64)>> {
    rows.outer_iter()
        .map(|row| x.iter().copied().zip(row.iter().copied()).collect())
        .collect()
}

/// Each channel scaled to unit peak and offset by its index.
fn stacked_traces(t: &RawTraces, max_points: usize) -> Vec<Vec<(f64, f64)>> {
    t.data
        .outer_iter()
        .enumerate()
        .map(|(i, row)| {
            let mean = row.mean().unwrap_or(0.0);
            let peak = row.iter().map(|v| (v - mean).abs()).fold(0.0, f64::max);
            let scale = if peak > 0.0 { 0.45 / peak } else { 0.0 };
            let offset = (t.data.nrows() - 1 - i) as f64;
            render::decimate_min_max(row, max_points)
                .into_iter()
                .map(|(k, v)| (t.start_seconds + k as f64 / t.sampling_rate, offset + (v - mean) * scale))
                .collect()
        })
        .collect()
}

impl AnalysisResult {
    pub(crate) fn from_output(id: String, filename: String, request: AnalysisRequest, out: AnalysisOutput) -> Self {
        if let Quality::Degraded { reason } = &out.quality {
            log::warn!("{id} ({}): degraded result: {reason}", request.analysis_type());
        }
        Self {
            id,
            analysis_type: request.analysis_type(),
            caption: request.caption(),
            payload: out.payload,
            plot: out.plot,
            request,
            filename,
            quality: out.quality,
        }
    }
}
