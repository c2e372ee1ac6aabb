//! Windowing and channel selection.
//!
//! `slice` turns `(start, end, channels)` into a `[C, T]` copy of the
//! requested part of a recording.  Time bounds map to sample indices with
//! `round(t × fs)`, clamped to `[0, n_samples]`; the output channel order is
//! the request order.
use ndarray::Array2;
use serde::{Deserialize, Serialize};

use crate::error::{Error, Result};
use crate::recording::Recording;

/// A time range in seconds, `[start, end)`.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TimeWindow {
    pub start_seconds: f64,
    pub end_seconds: f64,
}

impl TimeWindow {
    pub fn new(start_seconds: f64, end_seconds: f64) -> Self {
        Self { start_seconds, end_seconds }
    }

    /// The whole recording.
    pub fn full(recording: &Recording) -> Self {
        Self::new(0.0, recording.duration_seconds())
    }

    pub fn duration(&self) -> f64 {
        self.end_seconds - self.start_seconds
    }

    /// Sample range `[i0, i1)` at `fs`, clamped to `n_samples`.
    pub fn sample_range(&self, fs: f64, n_samples: usize) -> Result<(usize, usize)> {
        let (s, e) = (self.start_seconds, self.end_seconds);
        if !(s.is_finite() && e.is_finite()) {
            return Err(Error::invalid_window(s, e, "bounds must be finite"));
        }
        let to_index = |t: f64| ((t * fs).round().max(0.0) as usize).min(n_samples);
        let (i0, i1) = (to_index(s), to_index(e));
        if i0 >= i1 {
            return Err(Error::invalid_window(
                s,
                e,
                format!("empty after clamping to {n_samples} samples ({i0}..{i1})"),
            ));
        }
        Ok((i0, i1))
    }
}

/// Data handed to an analysis.
#[derive(Debug, Clone, PartialEq)]
pub struct Slice {
    /// `[C, T]`, physical units.
    pub data: Array2<f64>,
    pub sampling_rate: f64,
    pub channel_names: Vec<String>,
    /// Start of the first returned sample, seconds from recording start.
    pub start_seconds: f64,
}

impl Slice {
    pub fn n_samples(&self) -> usize {
        self.data.ncols()
    }

    pub fn duration_seconds(&self) -> f64 {
        self.n_samples() as f64 / self.sampling_rate
    }
}

/// Copy `channels` over `[start, end)` seconds out of `recording`.
///
/// # Errors
///
/// * [`Error::InvalidWindow`] if the window is empty after clamping.
/// * [`Error::UnknownChannel`] for the first name not in the recording.
/// * [`Error::InvalidParameter`] if `channels` is empty.
pub fn slice<S: AsRef<str>>(recording: &Recording, start: f64, end: f64, channels: &[S]) -> Result<Slice> {
    if channels.is_empty() {
        return Err(Error::param("channel selection is empty"));
    }
    let rows: Vec<usize> = channels
        .iter()
        .map(|name| {
            recording
                .channel_index(name.as_ref())
                .ok_or_else(|| Error::UnknownChannel(name.as_ref().to_string()))
        })
        .collect::<Result<_>>()?;

    let fs = recording.sampling_frequency_hz();
    let (i0, i1) = TimeWindow::new(start, end).sample_range(fs, recording.n_samples())?;

    let src = recording.samples();
    let mut data = Array2::<f64>::zeros((rows.len(), i1 - i0));
    for (dst, &r) in rows.iter().enumerate() {
        data.row_mut(dst).assign(&src.slice(ndarray::s![r, i0..i1]));
    }

    Ok(Slice {
        data,
        sampling_rate: fs,
        channel_names: channels.iter().map(|c| c.as_ref().to_string()).collect(),
        start_seconds: i0 as f64 / fs,
    })
}
