mod common;
use common::{noise, sine};
use eegkit::analysis::{band_power, fooof, tfr};
use eegkit::{slice, Band, BandRatioParams, Channel, Recording, SourceFormat, SpectralParamConfig, TimeFrequencyParams};

const FS: f64 = 256.0;
const N: usize = 256 * 60;

fn single(label: &str, x: ndarray::Array1<f64>) -> Recording {
    let data = x.insert_axis(ndarray::Axis(0));
    Recording::new(vec![Channel::new(label)], FS, data, SourceFormat::Edf).unwrap()
}

// ── Band ratio ────────────────────────────────────────────────────────────

fn theta_heavy() -> Recording {
    let x = sine(FS, 6.0, 10.0, N) + sine(FS, 20.0, 2.0, N) + noise(3, 0.5, N);
    single("Cz", x)
}

#[test]
fn theta_dominant_signal_has_ratio_above_one() {
    let rec = theta_heavy();
    let out = band_power::analyze(&slice(&rec, 0.0, 60.0, &["Cz"]).unwrap(), &BandRatioParams::default()).unwrap();
    let r = out.channels[0].ratio.unwrap();
    assert!(r > 1.0, "theta/beta = {r}");
    assert_eq!(out.mean_ratio, Some(r));
}

#[test]
fn swapped_bands_multiply_to_one() {
    let rec = theta_heavy();
    let s = slice(&rec, 5.0, 45.0, &["Cz"]).unwrap();
    let ab = BandRatioParams::default();
    let ba = BandRatioParams { band_a: ab.band_b, band_b: ab.band_a, ..ab.clone() };

    let r_ab = band_power::analyze(&s, &ab).unwrap().channels[0].ratio.unwrap();
    let r_ba = band_power::analyze(&s, &ba).unwrap().channels[0].ratio.unwrap();
    approx::assert_abs_diff_eq!(r_ab * r_ba, 1.0, epsilon = 1e-6);
}

#[test]
fn overlapping_bands_are_rejected() {
    let rec = theta_heavy();
    let s = slice(&rec, 0.0, 60.0, &["Cz"]).unwrap();
    let p = BandRatioParams { band_a: Band::new(4.0, 10.0), band_b: Band::new(8.0, 12.0), ..Default::default() };
    assert_eq!(band_power::analyze(&s, &p).unwrap_err().code(), "INVALID_PARAMETER");
}

// ── Time-frequency ────────────────────────────────────────────────────────

#[test]
fn map_peaks_at_the_tone() {
    let rec = single("Oz", sine(FS, 15.0, 1.0, N));
    let s = slice(&rec, 10.0, 20.0, &["Oz"]).unwrap();
    let params = TimeFrequencyParams { freq_min: 5.0, freq_max: 40.0, freq_points: 36, time_points: 21, ..Default::default() };
    let map = tfr::analyze(&s, &params).unwrap();

    assert_eq!(map.channel, "Oz");
    assert_eq!(map.magnitude.dim(), (36, 21));
    assert!(map.times.iter().all(|&t| (10.0..20.0).contains(&t)));
    assert!(map.times.windows(2).all(|w| w[0] < w[1]));

    let mid = map.magnitude.column(10);
    let best = mid
        .iter()
        .enumerate()
        .max_by(|a, b| a.1.total_cmp(b.1))
        .map(|(i, _)| map.frequencies[i])
        .unwrap();
    approx::assert_abs_diff_eq!(best, 15.0, epsilon = 1e-9);
    approx::assert_abs_diff_eq!(mid[10], 1.0, epsilon = 0.05);
}

#[test]
fn map_rejects_frequencies_above_nyquist() {
    let rec = single("Oz", sine(FS, 15.0, 1.0, N));
    let s = slice(&rec, 0.0, 10.0, &["Oz"]).unwrap();
    let params = TimeFrequencyParams { freq_max: 200.0, ..Default::default() };
    assert_eq!(tfr::analyze(&s, &params).unwrap_err().code(), "INVALID_PARAMETER");

    let params = TimeFrequencyParams { channel_index: 3, ..Default::default() };
    assert!(tfr::analyze(&s, &params).is_err());
}

// ── Spectral parameterization ─────────────────────────────────────────────

#[test]
fn white_noise_with_alpha_gives_flat_fit_and_alpha_peak() {
    let x = noise(5, 1.0, N) + sine(FS, 10.0, 3.0, N);
    let rec = single("O1", x);
    let s = slice(&rec, 0.0, 60.0, &["O1"]).unwrap();
    let out = fooof::analyze(&s, &SpectralParamConfig::default()).unwrap();

    let fit = &out.channels[0].fit;
    assert!(fit.aperiodic.exponent.abs() < 0.3, "exponent {}", fit.aperiodic.exponent);
    assert!(
        fit.peaks.iter().any(|p| (p.center_frequency - 10.0).abs() < 1.0),
        "peaks: {:?}",
        fit.peaks
    );
    assert!(fit.r_squared > 0.5);
    assert_eq!(fit.frequencies.len(), fit.model_fit.len());
}

#[test]
fn silent_channel_cannot_be_parameterised() {
    let rec = single("Flat", ndarray::Array1::zeros(N));
    let s = slice(&rec, 0.0, 60.0, &["Flat"]).unwrap();
    let err = fooof::analyze(&s, &SpectralParamConfig::default()).unwrap_err();
    assert_eq!(err.code(), "INVALID_PARAMETER");
}

#[test]
fn spectral_fit_serialises_camel_case() {
    let rec = single("O1", noise(9, 1.0, N));
    let s = slice(&rec, 0.0, 60.0, &["O1"]).unwrap();
    let out = fooof::analyze(&s, &SpectralParamConfig::default()).unwrap();
    let json = serde_json::to_value(&out).unwrap();
    assert!(json["channels"][0]["fit"]["rSquared"].is_number());
    assert_eq!(json["aperiodicMode"], "fixed");
}
