//! Offset handling for BDF ingestion.
//!
//! Two mutually exclusive options, applied once per load:
//!
//! * `baseline_correct_inplace` — `data[c, t] -= mean(data[c, :])`.
//!   Removes each channel's DC offset and keeps inter-channel amplitude
//!   relationships.  Default for BDF.
//! * `average_reference_inplace` — `data[c, t] -= mean(data[:, t])`.
//!   Common-average reference, opt-in.
use ndarray::{Array2, Axis};

/// Subtract each channel's mean over time.
pub fn baseline_correct_inplace(data: &mut Array2<f64>) {
    for mut row in data.rows_mut() {
        let m = row.mean().unwrap_or(0.0);
        row.mapv_inplace(|v| v - m);
    }
}

/// Subtract the mean across channels at each time point.
pub fn average_reference_inplace(data: &mut Array2<f64>) {
    let Some(means) = data.mean_axis(Axis(0)) else { return }; // shape [T]
    for mut row in data.rows_mut() {
        row -= &means;
    }
}
