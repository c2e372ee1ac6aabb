//! Analysis and reader configuration.
//!
//! Every analysis has its own parameter record with `pub` fields and a
//! `Default` that matches the workbench defaults (`fmin = 1`, `fmax = 45`
//! for all frequency-bounded analyses).  [`AnalysisParams`] is the tagged
//! union the UI sends; its JSON form is keyed by `analysisType`:
//!
//! ```
//! use eegkit::config::{AnalysisParams, PsdParams};
//!
//! let params: AnalysisParams = serde_json::from_str(
//!     r#"{"analysisType": "PSD", "fmax": 30.0, "method": "periodogram"}"#,
//! ).unwrap();
//! match params {
//!     AnalysisParams::Psd(p) => assert_eq!(p.fmax, 30.0),
//!     _ => unreachable!(),
//! }
//! ```
use serde::{Deserialize, Serialize};
use std::fmt;

use crate::error::{Error, Result};

// ── Shared pieces ─────────────────────────────────────────────────────────

/// PSD estimator.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum PsdMethod {
    /// Average of overlapping windowed periodograms.
    #[default]
    Welch,
    /// One FFT over the whole window.
    Periodogram,
}

/// Taper applied before each FFT.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum WindowKind {
    #[default]
    Hann,
    Boxcar,
}

/// A closed frequency interval in Hz, serialised as `[min, max]`.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(from = "[f64; 2]", into = "[f64; 2]")]
pub struct Band {
    pub min: f64,
    pub max: f64,
}

impl Band {
    pub const fn new(min: f64, max: f64) -> Self {
        Self { min, max }
    }

    pub fn contains(&self, f: f64) -> bool {
        f >= self.min && f <= self.max
    }

    pub fn overlaps(&self, other: &Band) -> bool {
        self.min < other.max && other.min < self.max
    }

    fn validate(&self, what: &str) -> Result<()> {
        if !(self.min.is_finite() && self.max.is_finite()) || self.min < 0.0 || self.min >= self.max {
            return Err(Error::param(format!(
                "{what} must satisfy 0 <= min < max, got [{}, {}]",
                self.min, self.max
            )));
        }
        Ok(())
    }
}

impl From<[f64; 2]> for Band {
    fn from(v: [f64; 2]) -> Self {
        Band::new(v[0], v[1])
    }
}

impl From<Band> for [f64; 2] {
    fn from(b: Band) -> Self {
        [b.min, b.max]
    }
}

/// A band with a display name, e.g. `Alpha [8, 12]`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NamedBand {
    pub name: String,
    pub band: Band,
}

impl NamedBand {
    pub fn new(name: &str, min: f64, max: f64) -> Self {
        Self { name: name.to_string(), band: Band::new(min, max) }
    }
}

/// Delta, theta, alpha, beta and gamma.
pub fn canonical_bands() -> Vec<NamedBand> {
    vec![
        NamedBand::new("Delta", 0.5, 4.0),
        NamedBand::new("Theta", 4.0, 8.0),
        NamedBand::new("Alpha", 8.0, 12.0),
        NamedBand::new("Beta", 12.0, 30.0),
        NamedBand::new("Gamma", 30.0, 100.0),
    ]
}

/// How a spectrum is estimated.  Flattened into the per-analysis records.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct SpectralSettings {
    pub method: PsdMethod,

    /// Welch segment length in seconds; `round(len * fs)` samples.
    ///
    /// Ignored by the periodogram.  Default: `4.0` s.
    pub segment_length_seconds: f64,

    /// Fraction of a segment shared with the next one, in `[0, 1)`.
    ///
    /// Default: `0.5`.
    pub overlap_fraction: f64,

    pub window: WindowKind,
}

impl Default for SpectralSettings {
    fn default() -> Self {
        Self {
            method: PsdMethod::Welch,
            segment_length_seconds: 4.0,
            overlap_fraction: 0.5,
            window: WindowKind::Hann,
        }
    }
}

impl SpectralSettings {
    pub fn validate(&self) -> Result<()> {
        if !(self.segment_length_seconds > 0.0 && self.segment_length_seconds.is_finite()) {
            return Err(Error::param(format!(
                "segmentLengthSeconds must be positive, got {}",
                self.segment_length_seconds
            )));
        }
        if !(0.0..1.0).contains(&self.overlap_fraction) {
            return Err(Error::param(format!(
                "overlapFraction must be in [0, 1), got {}",
                self.overlap_fraction
            )));
        }
        Ok(())
    }

    /// Segment length in samples at `fs`.
    pub fn segment_samples(&self, fs: f64) -> usize {
        (self.segment_length_seconds * fs).round() as usize
    }

    /// Overlap in samples at `fs`.
    pub fn overlap_samples(&self, fs: f64) -> usize {
        (self.segment_length_seconds * fs * self.overlap_fraction).round() as usize
    }
}

fn validate_range(fmin: f64, fmax: f64) -> Result<()> {
    if !(fmin >= 0.0 && fmin < fmax) {
        return Err(Error::param(format!("need 0 <= fmin < fmax, got fmin={fmin}, fmax={fmax}")));
    }
    Ok(())
}

// ── Per-analysis parameter records ────────────────────────────────────────

/// Power spectral density.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct PsdParams {
    pub fmin: f64,
    pub fmax: f64,
    #[serde(flatten)]
    pub spectral: SpectralSettings,
    /// Plot in dB.  Presentation only: the stored payload stays linear.
    pub use_decibels: bool,
}

impl Default for PsdParams {
    fn default() -> Self {
        Self { fmin: 1.0, fmax: 45.0, spectral: SpectralSettings::default(), use_decibels: true }
    }
}

impl PsdParams {
    pub fn validate(&self) -> Result<()> {
        validate_range(self.fmin, self.fmax)?;
        self.spectral.validate()
    }
}

/// Signal-to-noise ratio.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct SnrParams {
    pub fmin: f64,
    pub fmax: f64,
    #[serde(flatten)]
    pub spectral: SpectralSettings,

    /// Frequency whose peak/noise-floor SNR is reported per channel.
    ///
    /// `None` reports only the SNR spectrum.  Default: `Some(10.0)` Hz.
    pub target_frequency_hz: Option<f64>,

    /// Width of the neighbourhood used as the local noise estimate for the
    /// SNR spectrum.  Default: `1.0` Hz.
    pub neighbor_bandwidth_hz: f64,
}

impl Default for SnrParams {
    fn default() -> Self {
        Self {
            fmin: 1.0,
            fmax: 45.0,
            spectral: SpectralSettings::default(),
            target_frequency_hz: Some(10.0),
            neighbor_bandwidth_hz: 1.0,
        }
    }
}

impl SnrParams {
    pub fn validate(&self) -> Result<()> {
        validate_range(self.fmin, self.fmax)?;
        self.spectral.validate()?;
        if let Some(t) = self.target_frequency_hz {
            if !(t > 0.0 && t.is_finite()) {
                return Err(Error::param(format!("targetFrequencyHz must be positive, got {t}")));
            }
        }
        if !(self.neighbor_bandwidth_hz > 0.0) {
            return Err(Error::param("neighborBandwidthHz must be positive"));
        }
        Ok(())
    }
}

/// Ratio of integrated power in two bands (theta/beta by default).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct BandRatioParams {
    pub band_a: Band,
    pub band_b: Band,
    #[serde(flatten)]
    pub spectral: SpectralSettings,
}

impl Default for BandRatioParams {
    fn default() -> Self {
        Self {
            band_a: Band::new(4.0, 8.0),
            band_b: Band::new(13.0, 30.0),
            spectral: SpectralSettings::default(),
        }
    }
}

impl BandRatioParams {
    pub fn validate(&self) -> Result<()> {
        self.band_a.validate("bandA")?;
        self.band_b.validate("bandB")?;
        if self.band_a.overlaps(&self.band_b) {
            return Err(Error::param("bandA and bandB must be disjoint"));
        }
        self.spectral.validate()
    }
}

/// Spacing of the frequency axis of a time-frequency map.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum FrequencyScale {
    #[default]
    Linear,
    Log,
}

/// Single-channel time-frequency magnitude map.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct TimeFrequencyParams {
    pub freq_min: f64,
    pub freq_max: f64,
    pub freq_points: usize,
    pub time_points: usize,
    /// Index into the request's channel subset.
    pub channel_index: usize,
    pub scale: FrequencyScale,
    /// Morlet wavelet width in cycles.  Default: `7.0`.
    pub n_cycles: f64,
}

impl Default for TimeFrequencyParams {
    fn default() -> Self {
        Self {
            freq_min: 1.0,
            freq_max: 45.0,
            freq_points: 50,
            time_points: 200,
            channel_index: 0,
            scale: FrequencyScale::Linear,
            n_cycles: 7.0,
        }
    }
}

impl TimeFrequencyParams {
    pub fn validate(&self) -> Result<()> {
        if !(self.freq_min > 0.0 && self.freq_min < self.freq_max) {
            return Err(Error::param(format!(
                "need 0 < freqMin < freqMax, got [{}, {}]",
                self.freq_min, self.freq_max
            )));
        }
        if self.freq_points == 0 || self.time_points == 0 {
            return Err(Error::param("freqPoints and timePoints must be at least 1"));
        }
        if !(self.n_cycles > 0.0) {
            return Err(Error::param("nCycles must be positive"));
        }
        Ok(())
    }
}

/// Aperiodic model used by the spectral parameterization.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum AperiodicMode {
    /// `offset - log10(f^exponent)`
    #[default]
    Fixed,
    /// `offset - log10(knee + f^exponent)`
    Knee,
}

/// FOOOF-style spectral parameterization.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct SpectralParamConfig {
    pub freq_range: Band,

    /// Allowed peak bandwidth (2 × Gaussian SD) in Hz.  Default: `[0.5, 12]`.
    pub peak_width_limits: Band,

    pub max_peaks: usize,

    /// Absolute threshold on the flattened spectrum, in log10 power.
    ///
    /// Default: `0.1`.
    pub min_peak_height: f64,

    /// Relative threshold in standard deviations of the flattened spectrum.
    ///
    /// Default: `2.0`.
    pub peak_threshold: f64,

    pub aperiodic_mode: AperiodicMode,

    /// Upper bound on aperiodic/periodic refinement rounds.  Default: `10`.
    pub max_iterations: usize,

    #[serde(flatten)]
    pub spectral: SpectralSettings,
}

impl Default for SpectralParamConfig {
    fn default() -> Self {
        Self {
            freq_range: Band::new(1.0, 45.0),
            peak_width_limits: Band::new(0.5, 12.0),
            max_peaks: 6,
            min_peak_height: 0.1,
            peak_threshold: 2.0,
            aperiodic_mode: AperiodicMode::Fixed,
            max_iterations: 10,
            spectral: SpectralSettings::default(),
        }
    }
}

impl SpectralParamConfig {
    pub fn validate(&self) -> Result<()> {
        if !(self.freq_range.min > 0.0 && self.freq_range.min < self.freq_range.max) {
            return Err(Error::param("freqRange must satisfy 0 < min < max"));
        }
        self.peak_width_limits.validate("peakWidthLimits")?;
        if self.max_iterations == 0 {
            return Err(Error::param("maxIterations must be at least 1"));
        }
        self.spectral.validate()
    }
}

/// Steady-state evoked response detection.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct SsvepParams {
    pub target_frequency_hz: f64,

    /// Number of principal components kept for denoising.  `None` skips PCA.
    pub pca_components: Option<usize>,

    /// Bands reported as absolute/relative power per channel.
    pub frequency_bands: Vec<NamedBand>,

    pub fmin: f64,
    pub fmax: f64,

    #[serde(flatten)]
    pub spectral: SpectralSettings,

    /// Length of the sinusoidal template for time-domain detection.
    ///
    /// Default: `1.0` s.
    pub template_seconds: f64,

    /// Default: `0.3`.
    pub correlation_threshold: f64,

    /// Default: `0.5`.
    pub coherence_threshold: f64,
}

impl Default for SsvepParams {
    fn default() -> Self {
        Self {
            target_frequency_hz: 10.0,
            pca_components: None,
            frequency_bands: canonical_bands(),
            fmin: 1.0,
            fmax: 45.0,
            spectral: SpectralSettings::default(),
            template_seconds: 1.0,
            correlation_threshold: 0.3,
            coherence_threshold: 0.5,
        }
    }
}

impl SsvepParams {
    pub fn validate(&self) -> Result<()> {
        if !(self.target_frequency_hz > 0.0 && self.target_frequency_hz.is_finite()) {
            return Err(Error::param("targetFrequencyHz must be positive"));
        }
        if self.pca_components == Some(0) {
            return Err(Error::param("pcaComponents must be at least 1"));
        }
        if !(self.template_seconds > 0.0) {
            return Err(Error::param("templateSeconds must be positive"));
        }
        for b in &self.frequency_bands {
            b.band.validate(&b.name)?;
        }
        validate_range(self.fmin, self.fmax)?;
        self.spectral.validate()
    }
}

/// Raw trace plot.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct RawPlotParams {
    /// Traces are min/max decimated to at most this many columns when drawn.
    pub max_points: usize,
}

impl Default for RawPlotParams {
    fn default() -> Self {
        Self { max_points: 2000 }
    }
}

/// One trace of a comparison PSD.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TraceSpec {
    /// Loaded file the trace comes from.  `None` is the active file.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub filename: Option<String>,
    pub channel: String,
    /// Legend text.  Defaults to `"<filename> - <channel>"`.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub label: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub start_seconds: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub end_seconds: Option<f64>,
}

impl TraceSpec {
    pub fn new(channel: &str) -> Self {
        Self { filename: None, channel: channel.to_string(), label: None, start_seconds: None, end_seconds: None }
    }
}

/// PSD of several `(file, channel, window)` traces on one axis.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct ComparisonPsdParams {
    pub traces: Vec<TraceSpec>,
    pub fmin: f64,
    pub fmax: f64,
    #[serde(flatten)]
    pub spectral: SpectralSettings,
}

impl Default for ComparisonPsdParams {
    fn default() -> Self {
        Self { traces: Vec::new(), fmin: 1.0, fmax: 45.0, spectral: SpectralSettings::default() }
    }
}

impl ComparisonPsdParams {
    pub fn validate(&self) -> Result<()> {
        if self.traces.is_empty() {
            return Err(Error::param("traces must not be empty"));
        }
        validate_range(self.fmin, self.fmax)?;
        self.spectral.validate()
    }
}

/// SNR per stimulation period, grouped by the experiment column of
/// imported annotations.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct ExperimentSnrParams {
    /// Stimulation frequencies scored in every period.  Default: `[10.0]`.
    pub target_frequencies: Vec<f64>,

    /// Loaded files to aggregate.  Empty means the active file only.
    pub files: Vec<String>,

    #[serde(flatten)]
    pub spectral: SpectralSettings,

    /// Width of the signal band around each target.  Default: `1.0` Hz.
    pub signal_bandwidth_hz: f64,

    /// Range whose power outside the signal band is the noise estimate.
    ///
    /// Default: `[1, 50]`.
    pub noise_range: Band,

    /// Half-width of the search window for the per-channel peak SNR.
    ///
    /// Default: `0.1` Hz.
    pub peak_tolerance_hz: f64,

    /// Channels at or above this mean SNR are listed as responsive.
    ///
    /// Default: `10.0` dB.
    pub snr_threshold_db: f64,
}

impl Default for ExperimentSnrParams {
    fn default() -> Self {
        Self {
            target_frequencies: vec![10.0],
            files: Vec::new(),
            spectral: SpectralSettings::default(),
            signal_bandwidth_hz: 1.0,
            noise_range: Band::new(1.0, 50.0),
            peak_tolerance_hz: 0.1,
            snr_threshold_db: 10.0,
        }
    }
}

impl ExperimentSnrParams {
    pub fn validate(&self) -> Result<()> {
        if self.target_frequencies.is_empty() {
            return Err(Error::param("targetFrequencies must not be empty"));
        }
        if let Some(t) = self.target_frequencies.iter().find(|t| !(**t > 0.0 && t.is_finite())) {
            return Err(Error::param(format!("target frequencies must be positive, got {t}")));
        }
        if !(self.signal_bandwidth_hz > 0.0) {
            return Err(Error::param("signalBandwidthHz must be positive"));
        }
        if !(self.peak_tolerance_hz >= 0.0) {
            return Err(Error::param("peakToleranceHz must not be negative"));
        }
        self.noise_range.validate("noiseRange")?;
        self.spectral.validate()
    }
}

// ── Tagged union ──────────────────────────────────────────────────────────

/// Kind of analysis, as shown in reports.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum AnalysisType {
    #[serde(rename = "PSD")]
    Psd,
    #[serde(rename = "SNR")]
    Snr,
    BandRatio,
    TimeFrequency,
    SpectralParam,
    #[serde(rename = "SSVEP")]
    Ssvep,
    RawPlot,
    #[serde(rename = "ComparisonPSD")]
    ComparisonPsd,
    #[serde(rename = "ExperimentSNR")]
    ExperimentSnr,
}

impl AnalysisType {
    pub fn as_str(&self) -> &'static str {
        match self {
            AnalysisType::Psd => "PSD",
            AnalysisType::Snr => "SNR",
            AnalysisType::BandRatio => "BandRatio",
            AnalysisType::TimeFrequency => "TimeFrequency",
            AnalysisType::SpectralParam => "SpectralParam",
            AnalysisType::Ssvep => "SSVEP",
            AnalysisType::RawPlot => "RawPlot",
            AnalysisType::ComparisonPsd => "ComparisonPSD",
            AnalysisType::ExperimentSnr => "ExperimentSNR",
        }
    }
}

impl fmt::Display for AnalysisType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Parameters of one analysis invocation, keyed by `analysisType`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "analysisType")]
pub enum AnalysisParams {
    #[serde(rename = "PSD")]
    Psd(PsdParams),
    #[serde(rename = "SNR")]
    Snr(SnrParams),
    BandRatio(BandRatioParams),
    TimeFrequency(TimeFrequencyParams),
    SpectralParam(SpectralParamConfig),
    #[serde(rename = "SSVEP")]
    Ssvep(SsvepParams),
    RawPlot(RawPlotParams),
    #[serde(rename = "ComparisonPSD")]
    ComparisonPsd(ComparisonPsdParams),
    #[serde(rename = "ExperimentSNR")]
    ExperimentSnr(ExperimentSnrParams),
}

impl AnalysisParams {
    pub fn analysis_type(&self) -> AnalysisType {
        match self {
            AnalysisParams::Psd(_) => AnalysisType::Psd,
            AnalysisParams::Snr(_) => AnalysisType::Snr,
            AnalysisParams::BandRatio(_) => AnalysisType::BandRatio,
            AnalysisParams::TimeFrequency(_) => AnalysisType::TimeFrequency,
            AnalysisParams::SpectralParam(_) => AnalysisType::SpectralParam,
            AnalysisParams::Ssvep(_) => AnalysisType::Ssvep,
            AnalysisParams::RawPlot(_) => AnalysisType::RawPlot,
            AnalysisParams::ComparisonPsd(_) => AnalysisType::ComparisonPsd,
            AnalysisParams::ExperimentSnr(_) => AnalysisType::ExperimentSnr,
        }
    }

    pub fn validate(&self) -> Result<()> {
        match self {
            AnalysisParams::Psd(p) => p.validate(),
            AnalysisParams::Snr(p) => p.validate(),
            AnalysisParams::BandRatio(p) => p.validate(),
            AnalysisParams::TimeFrequency(p) => p.validate(),
            AnalysisParams::SpectralParam(p) => p.validate(),
            AnalysisParams::Ssvep(p) => p.validate(),
            AnalysisParams::RawPlot(p) => {
                if p.max_points < 2 {
                    return Err(Error::param("maxPoints must be at least 2"));
                }
                Ok(())
            }
            AnalysisParams::ComparisonPsd(p) => p.validate(),
            AnalysisParams::ExperimentSnr(p) => p.validate(),
        }
    }

    /// Whether the analysis reads other loaded files besides the active one.
    pub fn spans_files(&self) -> bool {
        matches!(self, AnalysisParams::ComparisonPsd(_) | AnalysisParams::ExperimentSnr(_))
    }
}

// ── Reader and runtime options ────────────────────────────────────────────

/// Offset handling applied once when a BDF file is ingested.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum BdfReferencing {
    /// Subtract each channel's mean (DC offset).
    #[default]
    Baseline,
    /// Subtract the across-channel mean at every sample.
    Average,
}

/// Decoding backends, in the order the reader tries them by default.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum BackendKind {
    /// The `edfplus` crate.
    EdfPlus,
    /// The `edf-reader` crate.
    EdfReader,
    /// Built-in EDF/BDF parser.
    Native,
}

impl BackendKind {
    pub fn all() -> Vec<BackendKind> {
        vec![BackendKind::EdfPlus, BackendKind::EdfReader, BackendKind::Native]
    }
}

/// Options for a single file load.
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct ReaderOptions {
    pub bdf_referencing: BdfReferencing,
}

/// Options for [`crate::edf::writer::write_edf`].
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct ExportOptions {
    /// Re-reference to the common average before writing.  Skipped when
    /// the recording was already average-referenced on load.
    pub average_reference: bool,

    /// Labels left out of the output, compared case-insensitively.
    ///
    /// Default: `["Status", "TimeStamp"]`.
    pub drop_channels: Vec<String>,
}

impl Default for ExportOptions {
    fn default() -> Self {
        Self { average_reference: false, drop_channels: vec!["Status".into(), "TimeStamp".into()] }
    }
}

impl ExportOptions {
    pub fn drops(&self, label: &str) -> bool {
        self.drop_channels.iter().any(|d| d.eq_ignore_ascii_case(label.trim()))
    }
}

/// Options for [`crate::runtime::Runtime::bootstrap`].
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct RuntimeConfig {
    /// Reader backends to register, in priority order.
    ///
    /// Default: all three, third-party crates first.
    pub backends: Vec<BackendKind>,

    /// Run the numeric self-checks during bootstrap.  Default: `true`.
    pub self_check: bool,
}

impl Default for RuntimeConfig {
    fn default() -> Self {
        Self { backends: BackendKind::all(), self_check: true }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_use_one_to_45_hz() {
        let psd = PsdParams::default();
        assert_eq!((psd.fmin, psd.fmax), (1.0, 45.0));
        let snr = SnrParams::default();
        assert_eq!((snr.fmin, snr.fmax), (1.0, 45.0));
        let tf = TimeFrequencyParams::default();
        assert_eq!((tf.freq_min, tf.freq_max), (1.0, 45.0));
    }

    #[test]
    fn band_serialises_as_pair() {
        let p = BandRatioParams::default();
        let v = serde_json::to_value(&p).unwrap();
        assert_eq!(v["bandA"], serde_json::json!([4.0, 8.0]));
        assert_eq!(v["segmentLengthSeconds"], serde_json::json!(4.0));
    }

    #[test]
    fn tagged_params_roundtrip_type() {
        let p = AnalysisParams::Ssvep(SsvepParams::default());
        let s = serde_json::to_string(&p).unwrap();
        assert!(s.contains("\"analysisType\":\"SSVEP\""));
        let back: AnalysisParams = serde_json::from_str(&s).unwrap();
        assert_eq!(back.analysis_type(), AnalysisType::Ssvep);
    }

    #[test]
    fn overlapping_bands_rejected() {
        let p = BandRatioParams {
            band_a: Band::new(4.0, 10.0),
            band_b: Band::new(8.0, 12.0),
            ..BandRatioParams::default()
        };
        assert!(matches!(p.validate(), Err(Error::InvalidParameter(_))));
    }

    #[test]
    fn overlap_fraction_must_be_below_one() {
        let mut s = SpectralSettings::default();
        s.overlap_fraction = 1.0;
        assert!(s.validate().is_err());
        assert_eq!(SpectralSettings::default().segment_samples(256.0), 1024);
        assert_eq!(SpectralSettings::default().overlap_samples(256.0), 512);
    }

    #[test]
    fn comparison_traces_parse_from_json() {
        let params: AnalysisParams = serde_json::from_str(
            r#"{"analysisType": "ComparisonPSD", "fmax": 30.0,
                "traces": [{"channel": "Oz"}, {"filename": "b.edf", "channel": "Pz", "startSeconds": 2.0}]}"#,
        )
        .unwrap();
        let AnalysisParams::ComparisonPsd(p) = &params else { panic!("wrong variant") };
        assert_eq!(p.traces.len(), 2);
        assert_eq!(p.traces[0].filename, None);
        assert_eq!(p.traces[1].start_seconds, Some(2.0));
        assert!(params.spans_files());
        assert!(params.validate().is_ok());
        assert!(AnalysisParams::ComparisonPsd(ComparisonPsdParams::default()).validate().is_err());
    }

    #[test]
    fn experiment_snr_rejects_bad_targets() {
        let mut p = ExperimentSnrParams::default();
        assert!(p.validate().is_ok());
        p.target_frequencies = vec![10.0, -1.0];
        assert!(matches!(p.validate(), Err(Error::InvalidParameter(_))));
        p.target_frequencies.clear();
        assert!(p.validate().is_err());
    }

    #[test]
    fn export_drops_status_channels_by_default() {
        let opts = ExportOptions::default();
        assert!(opts.drops("Status"));
        assert!(opts.drops("timestamp"));
        assert!(!opts.drops("Oz"));
    }
}
