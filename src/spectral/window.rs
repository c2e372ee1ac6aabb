//! Tapers applied to each segment before the FFT.
//!
//! Windows are *periodic* (DFT-even), as `scipy.signal.get_window` returns
//! them for spectral estimation: the denominator is `n`, not `n - 1`.
use std::f64::consts::PI;

use crate::config::WindowKind;

/// Periodic Hann window of length `n`.
pub fn hann(n: usize) -> Vec<f64> {
    (0..n)
        .map(|i| 0.5 - 0.5 * (2.0 * PI * i as f64 / n as f64).cos())
        .collect()
}

/// Rectangular window of length `n`.
pub fn boxcar(n: usize) -> Vec<f64> {
    vec![1.0; n]
}

pub fn taper(kind: WindowKind, n: usize) -> Vec<f64> {
    match kind {
        WindowKind::Hann => hann(n),
        WindowKind::Boxcar => boxcar(n),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn hann_is_periodic() {
        let w = hann(8);
        approx::assert_abs_diff_eq!(w[0], 0.0);
        approx::assert_abs_diff_eq!(w[4], 1.0, epsilon = 1e-12);
        // Periodic: symmetric about n/2, not (n-1)/2.
        for i in 1..4 {
            approx::assert_abs_diff_eq!(w[i], w[8 - i], epsilon = 1e-12);
        }
    }

    #[test]
    fn hann_power_sum() {
        // Σw² = 3n/8 for the periodic Hann window.
        let w = hann(1024);
        let s: f64 = w.iter().map(|v| v * v).sum();
        approx::assert_abs_diff_eq!(s, 384.0, epsilon = 1e-9);
    }
}
