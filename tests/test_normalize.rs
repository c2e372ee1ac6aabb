mod common;
use common::{max_abs_diff, noise};
use eegkit::normalize::{destandardize_rows_inplace, standardize_rows_inplace};
use ndarray::Array2;

fn scaled_noise() -> Array2<f64> {
    let n = 4096;
    let mut data = Array2::zeros((4, n));
    for c in 0..4 {
        let scale = 10f64.powi(c as i32);
        data.row_mut(c).assign(&(noise(c as u64 + 50, scale, n) + 3.0 * scale));
    }
    data
}

#[test]
fn standardize_postconditions() {
    let mut data = scaled_noise();
    let stats = standardize_rows_inplace(&mut data);
    assert_eq!(stats.len(), 4);

    for (c, row) in data.outer_iter().enumerate() {
        let n = row.len() as f64;
        let mean = row.sum() / n;
        let std = (row.iter().map(|&v| (v - mean).powi(2)).sum::<f64>() / n).sqrt();
        assert!(mean.abs() < 1e-10, "ch={c} mean={mean:.2e}");
        approx::assert_abs_diff_eq!(std, 1.0, epsilon = 1e-10);
    }
    // Recovered scale tracks the generating one.
    for (c, &(_, std)) in stats.iter().enumerate() {
        let expected = 10f64.powi(c as i32);
        assert!((std / expected - 1.0).abs() < 0.05, "ch={c} std={std}");
    }
}

#[test]
fn destandardize_restores_input() {
    let original = scaled_noise();
    let mut data = original.clone();
    let stats = standardize_rows_inplace(&mut data);
    destandardize_rows_inplace(&mut data, &stats);
    let err = max_abs_diff(&data, &original);
    assert!(err < 1e-9, "max abs error {err:.2e}");
}
