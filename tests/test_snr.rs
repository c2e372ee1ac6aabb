mod common;
use common::{noise, sine};
use eegkit::analysis::snr;
use eegkit::{slice, Channel, Recording, SnrParams, SourceFormat};
use ndarray::Array2;

const FS: f64 = 256.0;
const N: usize = 256 * 30;

/// `Sig`: 12 Hz tone in noise.  `Bg`: noise only.
fn recording(scale: f64) -> Recording {
    let mut data = Array2::zeros((2, N));
    data.row_mut(0).assign(&((sine(FS, 12.0, 5.0, N) + noise(11, 1.0, N)) * scale));
    data.row_mut(1).assign(&(noise(12, 1.0, N) * scale));
    Recording::new(vec![Channel::new("Sig"), Channel::new("Bg")], FS, data, SourceFormat::Edf).unwrap()
}

fn params() -> SnrParams {
    SnrParams { target_frequency_hz: Some(12.0), ..Default::default() }
}

#[test]
fn tone_stands_out_from_noise() {
    let rec = recording(1.0);
    let out = snr::analyze(&slice(&rec, 0.0, 30.0, &["Sig", "Bg"]).unwrap(), &params()).unwrap();

    assert_eq!(out.channels.len(), 2);
    let sig = &out.channels[0];
    let bg = &out.channels[1];
    assert!((sig.peak_frequency_hz - 12.0).abs() <= 0.25);
    assert!(sig.snr_db > 15.0, "tone SNR {:.2} dB", sig.snr_db);
    assert!(bg.snr_db < sig.snr_db - 10.0);
    assert!(out.mean_snr_db.is_some());
    assert_eq!(out.snr_spectrum.dim(), (2, out.frequencies.len()));
    assert!(out.snr_spectrum.iter().all(|v| v.is_finite()));
}

#[test]
fn snr_is_invariant_to_amplitude_scaling() {
    let base = recording(1.0);
    let scaled = recording(1000.0);
    let a = snr::analyze(&slice(&base, 0.0, 30.0, &["Sig", "Bg"]).unwrap(), &params()).unwrap();
    let b = snr::analyze(&slice(&scaled, 0.0, 30.0, &["Sig", "Bg"]).unwrap(), &params()).unwrap();
    for (x, y) in a.channels.iter().zip(&b.channels) {
        approx::assert_abs_diff_eq!(x.snr_db, y.snr_db, epsilon = 1e-6);
    }
}

#[test]
fn no_target_gives_spectrum_only() {
    let rec = recording(1.0);
    let p = SnrParams { target_frequency_hz: None, ..Default::default() };
    let out = snr::analyze(&slice(&rec, 0.0, 30.0, &["Sig"]).unwrap(), &p).unwrap();
    assert!(out.channels.is_empty());
    assert_eq!(out.mean_snr_db, None);
    assert_eq!(out.snr_spectrum.nrows(), 1);
}

#[test]
fn silent_channel_has_finite_snr() {
    let data = Array2::zeros((1, N));
    let rec = Recording::new(vec![Channel::new("Flat")], FS, data, SourceFormat::Edf).unwrap();
    let out = snr::analyze(&slice(&rec, 0.0, 30.0, &["Flat"]).unwrap(), &params()).unwrap();
    assert!(out.channels[0].snr_db.is_finite());
}
