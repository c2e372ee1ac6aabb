mod common;
use common::{native_session, sine, ssvep_data, ssvep_edf};
use eegkit::{
    compute_psd, AnalysisParams, Payload, PsdMethod, PsdParams, ReaderOptions, SpectralSettings, WindowKind,
};
use ndarray::Array2;

#[test]
fn end_to_end_peak_within_one_bin_of_10hz() {
    let mut session = native_session();
    session.load("ssvep.edf", &ssvep_edf(), &ReaderOptions::default()).unwrap();

    let params = PsdParams {
        fmin: 1.0,
        fmax: 45.0,
        spectral: SpectralSettings { method: PsdMethod::Welch, segment_length_seconds: 4.0, ..Default::default() },
        ..Default::default()
    };
    let result = session.analyze(AnalysisParams::Psd(params)).unwrap();
    let Payload::Psd(psd) = &result.payload else { panic!("expected a PSD payload") };

    assert_eq!(psd.channel_names[0], "Ch1");
    let df = psd.frequency_resolution;
    approx::assert_abs_diff_eq!(df, 0.25, epsilon = 1e-12);
    assert!((psd.peak_frequencies[0] - 10.0).abs() <= df);
    assert_eq!(psd.frequencies.first().copied(), Some(1.0));
    assert_eq!(psd.frequencies.last().copied(), Some(45.0));
    assert_eq!(psd.power.dim(), (4, psd.frequencies.len()));
}

#[test]
fn welch_axis_has_half_segment_plus_one_bins() {
    let x = Array2::from_shape_fn((1, 4096), |(_, t)| ((t * 7919) % 101) as f64);
    for seconds in [0.5, 1.0, 2.0, 4.0] {
        let settings = SpectralSettings { segment_length_seconds: seconds, ..Default::default() };
        let s = compute_psd(x.view(), 256.0, &settings).unwrap();
        let nperseg = (seconds * 256.0) as usize;
        assert_eq!(s.frequencies.len(), nperseg / 2 + 1);
    }
}

#[test]
fn periodogram_resolution_is_one_over_duration() {
    let x = sine(200.0, 12.5, 1.0, 2000).insert_axis(ndarray::Axis(0));
    let settings = SpectralSettings { method: PsdMethod::Periodogram, window: WindowKind::Boxcar, ..Default::default() };
    let s = compute_psd(x.view(), 200.0, &settings).unwrap();
    approx::assert_abs_diff_eq!(s.resolution(), 0.1, epsilon = 1e-12);
    approx::assert_abs_diff_eq!(s.peak_frequency(0).unwrap(), 12.5, epsilon = 1e-9);
}

#[test]
fn window_shorter_than_segment_fails_without_result() {
    let mut session = native_session();
    session.load("ssvep.edf", &ssvep_edf(), &ReaderOptions::default()).unwrap();
    session.set_window(0.0, 2.0).unwrap();

    let err = session.analyze(AnalysisParams::Psd(PsdParams::default())).unwrap_err();
    assert_eq!(err.code(), "SEGMENT_TOO_LONG");
    assert!(err.is_recoverable());
    assert!(session.results().is_empty());
}

#[test]
fn psd_is_deterministic() {
    let data = ssvep_data();
    let settings = SpectralSettings::default();
    let a = compute_psd(data.view(), 256.0, &settings).unwrap();
    let b = compute_psd(data.view(), 256.0, &settings).unwrap();
    assert_eq!(a, b);
}
