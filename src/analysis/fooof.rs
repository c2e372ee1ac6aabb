//! Spectral parameterization: aperiodic 1/f background plus Gaussian peaks,
//! fitted in log10 power.
//!
//! ```text
//! L(f) = A(f) + Σ_k h_k · exp(−(f − c_k)² / 2 s_k²)
//! A(f) = b − log10(f^χ)             fixed
//! A(f) = b − log10(κ + f^χ)         knee
//! ```
//!
//! # Algorithm
//! 1. Robust aperiodic fit: fit once, flatten, keep only the points at or
//!    below the 2.5th percentile of the clipped residual, refit.
//! 2. Peak search on `L − A`: repeatedly take the maximum, stop below
//!    `max(min_peak_height, peak_threshold · SD)`, guess the width from the
//!    half-height crossing and subtract the Gaussian.
//! 3. Drop guesses within one SD of the range edges and the weaker of any
//!    two overlapping guesses, then refine all Gaussians jointly with
//!    Levenberg–Marquardt.
//! 4. Refit the aperiodic component on `L − peaks`.
//! 5. Repeat 2–4 until the peak count is unchanged between two rounds or
//!    `max_iterations` is reached; the latter yields
//!    [`FitStatus::DidNotConverge`] carrying the lowest-error round.
use nalgebra::{DMatrix, DVector};
use serde::{Deserialize, Serialize};

use crate::config::{AperiodicMode, Band, SpectralParamConfig};
use crate::error::{Error, Result};
use crate::selection::Slice;
use crate::spectral::{compute_psd, Spectrum};

/// Percentile of the flattened spectrum kept for the robust refit.
const AP_PERCENTILE: f64 = 2.5;
/// Peaks closer than this many SDs to either range edge are dropped.
const EDGE_SDS: f64 = 1.0;
/// Two peaks overlap when their ±0.75 SD intervals intersect.
const OVERLAP_SDS: f64 = 0.75;
/// Centre frequency may move this many SDs during refinement.
const CF_BOUND_SDS: f64 = 1.5;
/// FWHM = 2·sqrt(2 ln 2)·SD.
const FWHM_PER_SD: f64 = 2.354_820_045_030_949;

pub const ALPHA_BAND: Band = Band::new(8.0, 12.0);

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AperiodicParams {
    pub offset: f64,
    pub exponent: f64,
    /// Present in knee mode only.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub knee: Option<f64>,
}

impl AperiodicParams {
    pub fn eval(&self, f: f64) -> f64 {
        match self.knee {
            Some(k) => self.offset - (k + f.powf(self.exponent)).log10(),
            None => self.offset - self.exponent * f.log10(),
        }
    }
}

/// A fitted oscillatory peak.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PeakParams {
    pub center_frequency: f64,
    /// Height above the aperiodic fit at the centre, log10 power.
    pub power: f64,
    /// 2 × Gaussian SD, Hz.
    pub bandwidth: f64,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum FitStatus {
    Converged,
    /// Peak count never settled; the fit is the best round seen.
    DidNotConverge,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SpectralFit {
    pub aperiodic: AperiodicParams,
    /// Ordered by centre frequency.
    pub peaks: Vec<PeakParams>,
    pub r_squared: f64,
    /// Mean absolute error of the model, log10 power.
    pub error: f64,
    pub frequencies: Vec<f64>,
    /// log10 of the input power over `frequencies`.
    pub power_spectrum: Vec<f64>,
    pub aperiodic_fit: Vec<f64>,
    pub model_fit: Vec<f64>,
    pub iterations: usize,
    pub status: FitStatus,
    /// Strongest peak in 8–12 Hz.
    pub alpha_peak: Option<PeakParams>,
}

/// Gaussian guess/fit: `[centre, height, sd]`.
#[derive(Debug, Clone, Copy, PartialEq)]
struct Gaussian {
    cf: f64,
    height: f64,
    sd: f64,
}

impl Gaussian {
    fn eval(&self, f: f64) -> f64 {
        self.height * (-(f - self.cf).powi(2) / (2.0 * self.sd * self.sd)).exp()
    }
}

/// Fit one power spectrum (linear units) over `cfg.freq_range`.
///
/// # Errors
///
/// * [`Error::EmptyBand`] if the range holds fewer than 3 bins.
/// * [`Error::InvalidParameter`] for non-positive power values.
pub fn fit_spectrum(freqs: &[f64], power: &[f64], cfg: &SpectralParamConfig) -> Result<SpectralFit> {
    let (f, y): (Vec<f64>, Vec<f64>) = freqs
        .iter()
        .zip(power)
        .filter(|(&fr, _)| cfg.freq_range.contains(fr))
        .map(|(&fr, &p)| (fr, p))
        .unzip();
    if f.len() < 3 {
        return Err(Error::EmptyBand { min: cfg.freq_range.min, max: cfg.freq_range.max });
    }
    if let Some(bad) = y.iter().find(|&&p| !(p > 0.0 && p.is_finite())) {
        return Err(Error::param(format!("power must be positive to take log10, found {bad}")));
    }
    let y: Vec<f64> = y.iter().map(|p| p.log10()).collect();
    let df = f[1] - f[0];
    let sd_limits = (cfg.peak_width_limits.min / 2.0, cfg.peak_width_limits.max / 2.0);

    // 1. Robust aperiodic start ---------------------------------------------
    let mut aperiodic = robust_aperiodic(&f, &y, cfg.aperiodic_mode);

    let mut best: Option<(f64, AperiodicParams, Vec<Gaussian>)> = None;
    let mut prev_count: Option<usize> = None;
    let mut status = FitStatus::DidNotConverge;
    let mut iterations = 0;

    for round in 1..=cfg.max_iterations {
        iterations = round;

        // 2–3. Peaks on the flattened spectrum -------------------------------
        let flat: Vec<f64> = f.iter().zip(&y).map(|(&fr, &v)| v - aperiodic.eval(fr)).collect();
        let guesses = find_peaks(&f, flat.clone(), df, cfg, sd_limits);
        let gaussians = refine_peaks(&f, &flat, guesses, sd_limits);

        // 4. Aperiodic refit without peaks -----------------------------------
        let peak_free: Vec<f64> = f
            .iter()
            .zip(&y)
            .map(|(&fr, &v)| v - gaussians.iter().map(|g| g.eval(fr)).sum::<f64>())
            .collect();
        aperiodic = fit_aperiodic(&f, &peak_free, cfg.aperiodic_mode, Some(aperiodic));

        let err = mean_abs_error(&y, &model(&f, &aperiodic, &gaussians));
        log::debug!("spectral fit round {round}: {} peaks, error {err:.4}", gaussians.len());
        let count = gaussians.len();
        if best.as_ref().map_or(true, |(e, _, _)| err < *e) {
            best = Some((err, aperiodic, gaussians));
        }

        // 5. Stop when the peak count settles --------------------------------
        if prev_count == Some(count) {
            status = FitStatus::Converged;
            break;
        }
        prev_count = Some(count);
    }

    let Some((_, aperiodic, gaussians)) = best else {
        return Err(Error::param("maxIterations must be at least 1"));
    };
    if status == FitStatus::DidNotConverge {
        log::warn!("spectral fit did not settle after {iterations} rounds; returning best round");
    }

    let aperiodic_fit: Vec<f64> = f.iter().map(|&fr| aperiodic.eval(fr)).collect();
    let model_fit = model(&f, &aperiodic, &gaussians);
    let peaks: Vec<PeakParams> = gaussians
        .iter()
        .map(|g| {
            let k = crate::spectral::nearest_index(&f, g.cf).unwrap_or(0);
            PeakParams { center_frequency: g.cf, power: model_fit[k] - aperiodic_fit[k], bandwidth: 2.0 * g.sd }
        })
        .collect();
    let alpha_peak = peaks
        .iter()
        .filter(|p| ALPHA_BAND.contains(p.center_frequency))
        .copied()
        .max_by(|a, b| a.power.total_cmp(&b.power));

    Ok(SpectralFit {
        aperiodic,
        r_squared: r_squared(&y, &model_fit),
        error: mean_abs_error(&y, &model_fit),
        peaks,
        frequencies: f,
        power_spectrum: y,
        aperiodic_fit,
        model_fit,
        iterations,
        status,
        alpha_peak,
    })
}

fn model(f: &[f64], ap: &AperiodicParams, peaks: &[Gaussian]) -> Vec<f64> {
    f.iter()
        .map(|&fr| ap.eval(fr) + peaks.iter().map(|g| g.eval(fr)).sum::<f64>())
        .collect()
}

// ── Aperiodic component ───────────────────────────────────────────────────

fn robust_aperiodic(f: &[f64], y: &[f64], mode: AperiodicMode) -> AperiodicParams {
    let initial = fit_aperiodic(f, y, mode, None);
    let flat: Vec<f64> = f
        .iter()
        .zip(y)
        .map(|(&fr, &v)| (v - initial.eval(fr)).max(0.0))
        .collect();
    let threshold = percentile(&flat, AP_PERCENTILE);
    let (fm, ym): (Vec<f64>, Vec<f64>) = f
        .iter()
        .zip(y)
        .zip(&flat)
        .filter(|(_, &fl)| fl <= threshold)
        .map(|((&fr, &v), _)| (fr, v))
        .unzip();
    let needed = if mode == AperiodicMode::Knee { 3 } else { 2 };
    if fm.len() < needed {
        return initial;
    }
    fit_aperiodic(&fm, &ym, mode, Some(initial))
}

fn fit_aperiodic(f: &[f64], y: &[f64], mode: AperiodicMode, start: Option<AperiodicParams>) -> AperiodicParams {
    let (offset, exponent) = fit_line(f, y);
    match mode {
        AperiodicMode::Fixed => AperiodicParams { offset, exponent, knee: None },
        AperiodicMode::Knee => {
            let p0 = match start {
                Some(AperiodicParams { offset, exponent, knee: Some(k) }) => vec![offset, k, exponent],
                _ => vec![offset, 0.0, exponent.abs()],
            };
            let knee_model = |p: &[f64], fr: f64| p[0] - (p[1] + fr.powf(p[2])).log10();
            let bounds = Bounds {
                lo: vec![f64::NEG_INFINITY, 0.0, f64::NEG_INFINITY],
                hi: vec![f64::INFINITY; 3],
            };
            let p = levenberg_marquardt(f, y, p0, &bounds, knee_model);
            AperiodicParams { offset: p[0], exponent: p[2], knee: Some(p[1]) }
        }
    }
}

/// Least-squares `y = b − χ·log10 f`, returns `(b, χ)`.
fn fit_line(f: &[f64], y: &[f64]) -> (f64, f64) {
    let x: Vec<f64> = f.iter().map(|v| v.log10()).collect();
    let n = x.len() as f64;
    let mx = x.iter().sum::<f64>() / n;
    let my = y.iter().sum::<f64>() / n;
    let sxx: f64 = x.iter().map(|v| (v - mx).powi(2)).sum();
    let sxy: f64 = x.iter().zip(y).map(|(a, b)| (a - mx) * (b - my)).sum();
    let slope = if sxx > 0.0 { sxy / sxx } else { 0.0 };
    (my - slope * mx, -slope)
}

// ── Periodic component ────────────────────────────────────────────────────

fn find_peaks(
    f: &[f64],
    mut flat: Vec<f64>,
    df: f64,
    cfg: &SpectralParamConfig,
    (sd_lo, sd_hi): (f64, f64),
) -> Vec<Gaussian> {
    let mut guesses = Vec::new();
    while guesses.len() < cfg.max_peaks {
        let Some((max_i, &max_h)) = flat.iter().enumerate().max_by(|a, b| a.1.total_cmp(b.1)) else {
            break;
        };
        if max_h <= cfg.peak_threshold * std_dev(&flat) || max_h <= cfg.min_peak_height {
            break;
        }

        let half = 0.5 * max_h;
        let left = (1..max_i).rev().find(|&i| flat[i] <= half).map(|i| max_i - i);
        let right = (max_i + 1..flat.len()).find(|&i| flat[i] <= half).map(|i| i - max_i);
        let sd = match left.into_iter().chain(right).min() {
            Some(short) => 2.0 * short as f64 * df / FWHM_PER_SD,
            None => 0.5 * (sd_lo + sd_hi),
        }
        .clamp(sd_lo, sd_hi);

        let g = Gaussian { cf: f[max_i], height: max_h, sd };
        for (v, &fr) in flat.iter_mut().zip(f) {
            *v -= g.eval(fr);
        }
        guesses.push(g);
    }

    let (f0, f1) = (f[0], f[f.len() - 1]);
    guesses.retain(|g| (g.cf - f0).abs() > EDGE_SDS * g.sd && (g.cf - f1).abs() > EDGE_SDS * g.sd);
    drop_overlapping(guesses)
}

/// Of two overlapping guesses keep the taller one.
fn drop_overlapping(mut guesses: Vec<Gaussian>) -> Vec<Gaussian> {
    guesses.sort_by(|a, b| a.cf.total_cmp(&b.cf));
    let mut keep = vec![true; guesses.len()];
    for i in 1..guesses.len() {
        let (a, b) = (guesses[i - 1], guesses[i]);
        if a.cf + OVERLAP_SDS * a.sd > b.cf - OVERLAP_SDS * b.sd {
            if a.height < b.height {
                keep[i - 1] = false;
            } else {
                keep[i] = false;
            }
        }
    }
    guesses.into_iter().zip(keep).filter_map(|(g, k)| k.then_some(g)).collect()
}

fn refine_peaks(f: &[f64], flat: &[f64], guesses: Vec<Gaussian>, (sd_lo, sd_hi): (f64, f64)) -> Vec<Gaussian> {
    if guesses.is_empty() {
        return guesses;
    }
    let mut p0 = Vec::with_capacity(3 * guesses.len());
    let mut bounds = Bounds { lo: Vec::new(), hi: Vec::new() };
    for g in &guesses {
        p0.extend([g.cf, g.height, g.sd]);
        bounds.lo.extend([g.cf - CF_BOUND_SDS * g.sd, 0.0, sd_lo]);
        bounds.hi.extend([g.cf + CF_BOUND_SDS * g.sd, f64::INFINITY, sd_hi]);
    }
    let sum_of_gaussians = |p: &[f64], fr: f64| {
        p.chunks_exact(3)
            .map(|g| g[1] * (-(fr - g[0]).powi(2) / (2.0 * g[2] * g[2])).exp())
            .sum::<f64>()
    };
    let p = levenberg_marquardt(f, flat, p0, &bounds, sum_of_gaussians);
    let mut out: Vec<Gaussian> = p
        .chunks_exact(3)
        .map(|g| Gaussian { cf: g[0], height: g[1], sd: g[2] })
        .collect();
    out.sort_by(|a, b| a.cf.total_cmp(&b.cf));
    out
}

// ── Levenberg–Marquardt ───────────────────────────────────────────────────

struct Bounds {
    lo: Vec<f64>,
    hi: Vec<f64>,
}

impl Bounds {
    fn clamp(&self, p: &mut [f64]) {
        for ((v, &lo), &hi) in p.iter_mut().zip(&self.lo).zip(&self.hi) {
            *v = v.clamp(lo, hi);
        }
    }
}

const LM_MAX_ITER: usize = 200;

/// Bounded least squares of `model(p, x) ≈ y` with a forward-difference
/// Jacobian.  Returns the best parameters found.
fn levenberg_marquardt<F>(x: &[f64], y: &[f64], mut p: Vec<f64>, bounds: &Bounds, model: F) -> Vec<f64>
where
    F: Fn(&[f64], f64) -> f64,
{
    let n_p = p.len();
    bounds.clamp(&mut p);
    let residuals = |p: &[f64]| -> DVector<f64> {
        DVector::from_iterator(x.len(), x.iter().zip(y).map(|(&xi, &yi)| yi - model(p, xi)))
    };
    let cost = |r: &DVector<f64>| {
        let c = r.norm_squared();
        if c.is_finite() {
            c
        } else {
            f64::INFINITY
        }
    };

    let mut r = residuals(&p);
    let mut c = cost(&r);
    let mut lambda = 1e-3;

    for _ in 0..LM_MAX_ITER {
        // Jacobian of the model, column per parameter.
        let mut jac = DMatrix::<f64>::zeros(x.len(), n_p);
        for j in 0..n_p {
            let h = 1e-6 * p[j].abs().max(1.0);
            let mut q = p.clone();
            q[j] += h;
            for (i, &xi) in x.iter().enumerate() {
                jac[(i, j)] = (model(&q, xi) - model(&p, xi)) / h;
            }
        }
        let jtj = jac.transpose() * &jac;
        let jtr = jac.transpose() * &r;

        let mut improved = false;
        while lambda < 1e12 {
            let mut a = jtj.clone();
            for d in 0..n_p {
                a[(d, d)] += lambda * jtj[(d, d)].max(1e-12);
            }
            let Some(step) = a.clone().cholesky().map(|ch| ch.solve(&jtr)).or_else(|| a.lu().solve(&jtr)) else {
                lambda *= 10.0;
                continue;
            };
            let mut trial: Vec<f64> = p.iter().zip(step.iter()).map(|(v, s)| v + s).collect();
            bounds.clamp(&mut trial);
            let r_trial = residuals(&trial);
            let c_trial = cost(&r_trial);
            if c_trial < c {
                let gain = (c - c_trial) / c.max(f64::MIN_POSITIVE);
                p = trial;
                r = r_trial;
                c = c_trial;
                lambda = (lambda / 10.0).max(1e-12);
                improved = gain > 1e-12;
                break;
            }
            lambda *= 10.0;
        }
        if !improved {
            break;
        }
    }
    p
}

// ── Statistics ────────────────────────────────────────────────────────────

fn std_dev(v: &[f64]) -> f64 {
    let n = v.len() as f64;
    let m = v.iter().sum::<f64>() / n;
    (v.iter().map(|x| (x - m).powi(2)).sum::<f64>() / n).sqrt()
}

/// Linear-interpolated percentile, `q` in `[0, 100]`.
fn percentile(v: &[f64], q: f64) -> f64 {
    let mut s = v.to_vec();
    s.sort_by(f64::total_cmp);
    let pos = q / 100.0 * (s.len() - 1) as f64;
    let (lo, hi) = (pos.floor() as usize, pos.ceil() as usize);
    s[lo] + (s[hi] - s[lo]) * (pos - lo as f64)
}

fn mean_abs_error(y: &[f64], m: &[f64]) -> f64 {
    y.iter().zip(m).map(|(a, b)| (a - b).abs()).sum::<f64>() / y.len() as f64
}

/// Squared Pearson correlation of data and model.
fn r_squared(y: &[f64], m: &[f64]) -> f64 {
    let n = y.len() as f64;
    let (my, mm) = (y.iter().sum::<f64>() / n, m.iter().sum::<f64>() / n);
    let cov: f64 = y.iter().zip(m).map(|(a, b)| (a - my) * (b - mm)).sum();
    let vy: f64 = y.iter().map(|a| (a - my).powi(2)).sum();
    let vm: f64 = m.iter().map(|b| (b - mm).powi(2)).sum();
    if vy > 0.0 && vm > 0.0 {
        cov * cov / (vy * vm)
    } else {
        0.0
    }
}

// ── Analysis entry point ──────────────────────────────────────────────────

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ChannelFit {
    pub channel: String,
    pub fit: SpectralFit,
}

/// Numeric payload of a spectral-parameterization analysis.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SpectralParamResult {
    pub aperiodic_mode: AperiodicMode,
    pub channels: Vec<ChannelFit>,
}

impl SpectralParamResult {
    /// `true` when any channel's fit did not converge.
    pub fn is_degraded(&self) -> bool {
        self.channels.iter().any(|c| c.fit.status == FitStatus::DidNotConverge)
    }
}

/// Fit every channel of an already computed spectrum.
pub fn fit_channels(spectrum: &Spectrum, names: &[String], cfg: &SpectralParamConfig) -> Result<SpectralParamResult> {
    let channels = names
        .iter()
        .enumerate()
        .map(|(ch, name)| {
            let power = spectrum.channel(ch).to_vec();
            let fit = fit_spectrum(&spectrum.frequencies, &power, cfg)?;
            Ok(ChannelFit { channel: name.clone(), fit })
        })
        .collect::<Result<Vec<_>>>()?;
    Ok(SpectralParamResult { aperiodic_mode: cfg.aperiodic_mode, channels })
}

pub fn analyze(slice: &Slice, cfg: &SpectralParamConfig) -> Result<SpectralParamResult> {
    cfg.validate()?;
    let spectrum = compute_psd(slice.data.view(), slice.sampling_rate, &cfg.spectral)?;
    let out = fit_channels(&spectrum, &slice.channel_names, cfg)?;
    log::info!(
        "spectral parameterization: {} channels, degraded={}",
        out.channels.len(),
        out.is_degraded()
    );
    Ok(out)
}
