//! Per-channel standardisation.
//!
//! `standardize_rows_inplace` — matches `sklearn.preprocessing.StandardScaler`
//! applied to `[T, C]` data: for each channel
//!   μ = mean(x),  σ = std (ddof=0),  x = (x - μ) / σ
//! Channels with σ = 0 are only centred (σ is reported as 1), as the
//! scaler does.
use ndarray::Array2;

/// Standardise each row of `data` ([C, T]).  Returns the per-row `(mean, std)`
/// used, so the transform can be undone with [`destandardize_rows_inplace`].
pub fn standardize_rows_inplace(data: &mut Array2<f64>) -> Vec<(f64, f64)> {
    let mut stats = Vec::with_capacity(data.nrows());
    for mut row in data.rows_mut() {
        let n = row.len().max(1) as f64;
        let mean = row.sum() / n;
        let var = row.iter().map(|&v| (v - mean) * (v - mean)).sum::<f64>() / n;
        let std = if var > 0.0 { var.sqrt() } else { 1.0 };
        row.mapv_inplace(|v| (v - mean) / std);
        stats.push((mean, std));
    }
    stats
}

/// Inverse of [`standardize_rows_inplace`].
pub fn destandardize_rows_inplace(data: &mut Array2<f64>, stats: &[(f64, f64)]) {
    for (mut row, &(mean, std)) in data.rows_mut().into_iter().zip(stats) {
        row.mapv_inplace(|v| v * std + mean);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn rows_have_zero_mean_unit_std() {
        let mut data = Array2::from_shape_fn((4, 512), |(c, t)| {
            (c as f64 * 3.7 + t as f64 * 0.1).sin() * 50.0 + c as f64
        });
        standardize_rows_inplace(&mut data);
        for row in data.rows() {
            let m = row.mean().unwrap();
            let s = row.std(0.0);
            approx::assert_abs_diff_eq!(m, 0.0, epsilon = 1e-9);
            approx::assert_abs_diff_eq!(s, 1.0, epsilon = 1e-9);
        }
    }

    #[test]
    fn constant_row_centred_not_scaled() {
        let mut data = Array2::from_elem((2, 64), 7.0);
        let stats = standardize_rows_inplace(&mut data);
        assert_eq!(stats[0], (7.0, 1.0));
        assert!(data.iter().all(|&v| v == 0.0));
    }

    #[test]
    fn inverse_restores_input() {
        let orig = Array2::from_shape_fn((3, 100), |(c, t)| (t as f64).cos() * (c + 1) as f64 + 4.0);
        let mut data = orig.clone();
        let stats = standardize_rows_inplace(&mut data);
        destandardize_rows_inplace(&mut data, &stats);
        for (a, b) in data.iter().zip(orig.iter()) {
            approx::assert_abs_diff_eq!(*a, *b, epsilon = 1e-9);
        }
    }
}
