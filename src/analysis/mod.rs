//! Analysis algorithms built on the spectral engine.
//!
//! Each submodule exposes an `analyze(&Slice, &Params)` entry point that
//! validates its parameters, computes, and returns a serialisable payload.
//! `comparison` and `experiment` read whole recordings instead, since they
//! pick their own windows and may span several loaded files.
//! PSD itself lives here since it is a thin layer over [`crate::spectral`].
pub mod band_power;
pub mod comparison;
pub mod experiment;
pub mod fooof;
pub mod pca;
pub mod snr;
pub mod ssvep;
pub mod tfr;

use ndarray::Array2;
use serde::{Deserialize, Serialize};

use crate::config::{PsdMethod, PsdParams};
use crate::error::Result;
use crate::selection::Slice;
use crate::spectral::compute_psd;

pub use band_power::{BandPower, BandRatioResult, ChannelRatio};
pub use comparison::{ComparisonPsdResult, ComparisonTrace};
pub use experiment::{ExperimentSnrResult, ExperimentSummary, PeriodSnr};
pub use fooof::{AperiodicParams, FitStatus, PeakParams, SpectralFit, SpectralParamResult};
pub use pca::PcaDiagnostics;
pub use snr::{ChannelSnr, SnrResult};
pub use ssvep::{ChannelDetection, Confidence, SsvepResult};
pub use tfr::TimeFrequencyMap;

/// Numeric payload of a PSD analysis.  Power is always linear.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PsdResult {
    pub method: PsdMethod,
    pub channel_names: Vec<String>,
    /// Bins in `[fmin, fmax]`.
    pub frequencies: Vec<f64>,
    /// `[channel, bin]`.
    pub power: Array2<f64>,
    /// Frequency of the largest bin per channel.
    pub peak_frequencies: Vec<f64>,
    pub frequency_resolution: f64,
}

pub fn psd(slice: &Slice, params: &PsdParams) -> Result<PsdResult> {
    params.validate()?;
    let full = compute_psd(slice.data.view(), slice.sampling_rate, &params.spectral)?;
    let spectrum = full.restrict(params.fmin, params.fmax)?;
    let peak_frequencies = (0..spectrum.n_channels())
        .map(|ch| spectrum.peak_frequency(ch).unwrap_or(f64::NAN))
        .collect();
    log::info!(
        "PSD ({:?}): {} channels, {} bins in [{}, {}] Hz",
        params.spectral.method,
        spectrum.n_channels(),
        spectrum.frequencies.len(),
        params.fmin,
        params.fmax
    );
    Ok(PsdResult {
        method: params.spectral.method,
        channel_names: slice.channel_names.clone(),
        frequency_resolution: full.resolution(),
        frequencies: spectrum.frequencies,
        power: spectrum.power,
        peak_frequencies,
    })
}
