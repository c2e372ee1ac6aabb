//! Real-input FFT on top of `rustfft`.
//!
//! `rustfft` only has complex transforms; a real signal is loaded into the
//! real parts and the first `n / 2 + 1` bins are kept, which is what
//! `numpy.fft.rfft` returns.
use rustfft::num_complex::Complex;
use rustfft::{Fft, FftPlanner};
use std::sync::Arc;

/// A planned forward transform of fixed length, reusable across segments.
pub struct RealFft {
    fft: Arc<dyn Fft<f64>>,
    buf: Vec<Complex<f64>>,
    scratch: Vec<Complex<f64>>,
}

impl RealFft {
    pub fn new(n: usize) -> Self {
        let mut planner: FftPlanner<f64> = FftPlanner::new();
        let fft = planner.plan_fft_forward(n);
        let scratch = vec![Complex::default(); fft.get_inplace_scratch_len()];
        Self { fft, buf: vec![Complex::default(); n], scratch }
    }

    pub fn len(&self) -> usize {
        self.buf.len()
    }

    pub fn is_empty(&self) -> bool {
        self.buf.is_empty()
    }

    /// Number of one-sided bins, `n / 2 + 1`.
    pub fn n_bins(&self) -> usize {
        self.len() / 2 + 1
    }

    /// Transform `x` (length `n`) and return the one-sided half spectrum.
    pub fn process<I: IntoIterator<Item = f64>>(&mut self, x: I) -> &[Complex<f64>] {
        for (dst, v) in self.buf.iter_mut().zip(x) {
            *dst = Complex { re: v, im: 0.0 };
        }
        self.fft.process_with_scratch(&mut self.buf, &mut self.scratch);
        let bins = self.n_bins();
        &self.buf[..bins]
    }
}

/// Frequencies of the one-sided bins for an `n`-point transform at `fs`.
pub fn rfft_frequencies(n: usize, fs: f64) -> Vec<f64> {
    (0..n / 2 + 1).map(|k| k as f64 * fs / n as f64).collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::f64::consts::PI;

    #[test]
    fn tone_lands_in_its_bin() {
        let n = 256;
        let mut fft = RealFft::new(n);
        let bins = fft.process((0..n).map(|i| (2.0 * PI * 8.0 * i as f64 / n as f64).cos()));
        assert_eq!(bins.len(), 129);
        approx::assert_abs_diff_eq!(bins[8].norm(), n as f64 / 2.0, epsilon = 1e-9);
        approx::assert_abs_diff_eq!(bins[9].norm(), 0.0, epsilon = 1e-9);
    }

    #[test]
    fn frequency_axis() {
        let f = rfft_frequencies(1024, 256.0);
        assert_eq!(f.len(), 513);
        assert_eq!(f[4], 1.0);
        assert_eq!(f[512], 128.0);
    }
}
