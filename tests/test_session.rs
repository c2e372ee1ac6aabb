mod common;
use common::{native_session, noise, ssvep_data, ssvep_edf, EdfFile, LABELS};
use eegkit::{
    AnalysisParams, BdfReferencing, FileState, PsdParams, RawPlotParams, ReaderOptions, ReportBundle, SnrParams,
    SourceFormat, TimeWindow,
};
use ndarray::Array2;

fn short_edf(seconds: usize, seed: u64) -> Vec<u8> {
    let n = 256 * seconds;
    let mut data = Array2::zeros((4, n));
    for c in 0..4 {
        data.row_mut(c).assign(&noise(seed + c as u64, 5.0, n));
    }
    EdfFile::new(SourceFormat::Edf, &LABELS, &data, 256).to_bytes()
}

fn bdf_bytes() -> Vec<u8> {
    let data = ssvep_data() + 40.0;
    EdfFile::new(SourceFormat::Bdf, &LABELS, &data, 256).to_bytes()
}

// ── Files and selection ───────────────────────────────────────────────────

#[test]
fn window_survives_switching_files() {
    let mut s = native_session();
    s.load("a.edf", &ssvep_edf(), &ReaderOptions::default()).unwrap();
    assert_eq!(s.window(), Some(TimeWindow::new(0.0, 60.0)));
    assert_eq!(s.channels(), LABELS);

    s.set_window(10.0, 20.0).unwrap();
    s.load("b.edf", &short_edf(30, 40), &ReaderOptions::default()).unwrap();
    assert_eq!(s.active_filename(), Some("b.edf"));
    assert_eq!(s.window(), Some(TimeWindow::new(10.0, 20.0)));

    s.switch_active("a.edf").unwrap();
    assert_eq!(s.window(), Some(TimeWindow::new(10.0, 20.0)));
    assert_eq!(s.files(), vec![("a.edf", FileState::Ready), ("b.edf", FileState::Ready)]);
}

#[test]
fn rejected_selection_keeps_previous_one() {
    let mut s = native_session();
    s.load("a.edf", &short_edf(30, 1), &ReaderOptions::default()).unwrap();
    s.set_window(5.0, 15.0).unwrap();

    assert_eq!(s.set_window(20.0, 10.0).unwrap_err().code(), "INVALID_WINDOW");
    assert_eq!(s.set_window(40.0, 50.0).unwrap_err().code(), "INVALID_WINDOW");
    assert_eq!(s.set_channels(&["Ch9"]).unwrap_err().code(), "UNKNOWN_CHANNEL");
    assert_eq!(s.window(), Some(TimeWindow::new(5.0, 15.0)));
    assert_eq!(s.channels(), LABELS);

    s.set_channels(&["Ch3", "Ch1"]).unwrap();
    let req = s.request(AnalysisParams::Psd(PsdParams::default())).unwrap();
    assert_eq!(req.channels, ["Ch3", "Ch1"]);
    assert_eq!(req.window, TimeWindow::new(5.0, 15.0));
}

#[test]
fn malformed_file_leaves_session_usable() {
    let mut s = native_session();
    s.load("good.edf", &short_edf(20, 2), &ReaderOptions::default()).unwrap();

    let err = s.load("bad.edf", b"not an edf file at all", &ReaderOptions::default()).unwrap_err();
    assert_eq!(err.code(), "FORMAT_ERROR");
    assert_eq!(s.state("bad.edf"), Some(FileState::Unloaded));
    assert_eq!(s.active_filename(), Some("good.edf"));

    s.analyze(AnalysisParams::RawPlot(RawPlotParams::default())).unwrap();
    assert_eq!(s.results().len(), 1);
}

#[test]
fn discarded_file_cannot_be_activated() {
    let mut s = native_session();
    s.load("a.edf", &short_edf(10, 3), &ReaderOptions::default()).unwrap();
    s.discard("a.edf").unwrap();

    assert_eq!(s.state("a.edf"), Some(FileState::Discarded));
    assert_eq!(s.active_filename(), None);
    assert_eq!(s.switch_active("a.edf").unwrap_err().code(), "INVALID_STATE");
    assert_eq!(s.discard("nope.edf").unwrap_err().code(), "UNKNOWN_FILE");

    // Reloading brings it back.
    s.load("a.edf", &short_edf(10, 3), &ReaderOptions::default()).unwrap();
    assert_eq!(s.state("a.edf"), Some(FileState::Ready));
}

// ── BDF reuse ─────────────────────────────────────────────────────────────

#[test]
fn reloading_same_bdf_reuses_referenced_samples() {
    let mut s = native_session();
    let bytes = bdf_bytes();
    s.load("r.bdf", &bytes, &ReaderOptions::default()).unwrap();
    let first = s.active_recording().unwrap().samples().clone();
    let marker = s.add_custom_annotation(5.0, 2.0, "blink").unwrap();

    let info = s.load("r.bdf", &bytes, &ReaderOptions::default()).unwrap();
    assert_eq!(info.referencing, Some(BdfReferencing::Baseline));
    let rec = s.active_recording().unwrap();
    assert_eq!(rec.samples(), &first);
    assert!(rec.annotation(&marker).is_some());
    for row in rec.samples().outer_iter() {
        assert!(row.mean().unwrap().abs() < 1e-6);
    }

    // Other options decode again from the raw bytes.
    let opts = ReaderOptions { bdf_referencing: BdfReferencing::Average };
    let info = s.load("r.bdf", &bytes, &opts).unwrap();
    assert_eq!(info.referencing, Some(BdfReferencing::Average));
    assert!(s.active_recording().unwrap().annotation(&marker).is_none());
}

// ── Annotations ───────────────────────────────────────────────────────────

#[test]
fn csv_annotation_defines_window() {
    let mut s = native_session();
    s.load("a.edf", &ssvep_edf(), &ReaderOptions::default()).unwrap();

    let csv = "experiment,start_time,duration,label\nSSVEP,10,20,block_1\nSSVEP,45,0,marker\n";
    let ids = s.import_csv_annotations(csv, 2.0).unwrap();
    assert_eq!(ids, ["csv_ann_0", "csv_ann_1"]);

    let w = s.set_window_from_annotation("csv_ann_0").unwrap();
    assert_eq!(w, TimeWindow::new(12.0, 32.0));
    assert_eq!(s.window(), Some(w));

    assert_eq!(s.set_window_from_annotation("csv_ann_1").unwrap_err().code(), "INVALID_WINDOW");
    assert_eq!(s.window(), Some(w));

    let removed = s.remove_annotation("csv_ann_1").unwrap();
    assert_eq!(removed.description, "marker");
    assert!(s.remove_annotation("csv_ann_1").is_err());
}

// ── Analyses and results ──────────────────────────────────────────────────

#[test]
fn repeated_analysis_gives_identical_payloads() {
    let mut s = native_session();
    s.load("a.edf", &ssvep_edf(), &ReaderOptions::default()).unwrap();
    let params = AnalysisParams::Snr(SnrParams { target_frequency_hz: Some(10.0), ..Default::default() });

    let first = s.analyze(params.clone()).unwrap().clone();
    let second = s.analyze(params).unwrap().clone();
    assert_eq!(first.id, "result_1");
    assert_eq!(second.id, "result_2");
    assert_eq!(first.payload, second.payload);
    assert_eq!(first.plot, second.plot);
    assert!(first.plot.png.starts_with(b"\x89PNG"));
    assert_eq!(first.filename, "a.edf");
}

#[test]
fn background_load_and_analysis() {
    let mut s = native_session();
    let mut pending = s.load_in_background("bg.edf", ssvep_edf(), &ReaderOptions::default()).unwrap();
    assert_eq!(s.state("bg.edf"), Some(FileState::Loading));

    // One transition at a time.
    let err = s.load("other.edf", &short_edf(10, 4), &ReaderOptions::default()).unwrap_err();
    assert_eq!(err.code(), "INVALID_STATE");

    let _ = pending.poll();
    let info = s.finish_load(pending).unwrap();
    assert_eq!(info.n_channels, 4);
    assert_eq!(s.state("bg.edf"), Some(FileState::Ready));

    let job = s.analyze_in_background(AnalysisParams::Psd(PsdParams::default())).unwrap();
    assert_eq!(s.state("bg.edf"), Some(FileState::Analyzing));
    assert!(s.analyze(AnalysisParams::Psd(PsdParams::default())).is_err());
    let id = s.complete(job).unwrap().id.clone();
    assert_eq!(s.state("bg.edf"), Some(FileState::Ready));
    assert_eq!(s.results()[0].id, id);
}

#[test]
fn failed_background_load_is_reported() {
    let mut s = native_session();
    let pending = s.load_in_background("bad.edf", b"garbage".to_vec(), &ReaderOptions::default()).unwrap();
    assert_eq!(s.finish_load(pending).unwrap_err().code(), "FORMAT_ERROR");
    assert_eq!(s.state("bad.edf"), Some(FileState::Unloaded));
}

#[test]
fn dropped_background_load_releases_the_session() {
    let mut s = native_session();
    let pending = s.load_in_background("bg.edf", short_edf(10, 5), &ReaderOptions::default()).unwrap();
    assert_eq!(s.state("bg.edf"), Some(FileState::Loading));
    drop(pending);

    assert_eq!(s.state("bg.edf"), Some(FileState::Unloaded));
    s.load("other.edf", &short_edf(10, 6), &ReaderOptions::default()).unwrap();
    assert_eq!(s.state("other.edf"), Some(FileState::Ready));
    assert_eq!(s.active_filename(), Some("other.edf"));
}

#[test]
fn dropped_background_analysis_releases_the_session() {
    let mut s = native_session();
    s.load("a.edf", &short_edf(20, 7), &ReaderOptions::default()).unwrap();
    let job = s.analyze_in_background(AnalysisParams::Psd(PsdParams::default())).unwrap();
    drop(job);

    assert_eq!(s.state("a.edf"), Some(FileState::Ready));
    let id = s.analyze(AnalysisParams::RawPlot(RawPlotParams::default())).unwrap().id.clone();
    assert_eq!(id, "result_1");
    assert_eq!(s.results().len(), 1);
}

#[test]
fn failed_reload_keeps_previous_recording() {
    let mut s = native_session();
    let good = short_edf(20, 8);
    s.load("a.edf", &good, &ReaderOptions::default()).unwrap();
    let before = s.active_recording().unwrap().samples().clone();

    let err = s.load("a.edf", b"garbage", &ReaderOptions::default()).unwrap_err();
    assert_eq!(err.code(), "FORMAT_ERROR");
    assert_eq!(s.state("a.edf"), Some(FileState::Ready));
    assert_eq!(s.active_filename(), Some("a.edf"));
    assert_eq!(s.active_recording().unwrap().samples(), &before);

    // Same failure from the background path.
    let pending = s.load_in_background("a.edf", b"garbage".to_vec(), &ReaderOptions::default()).unwrap();
    assert_eq!(s.finish_load(pending).unwrap_err().code(), "FORMAT_ERROR");
    assert_eq!(s.state("a.edf"), Some(FileState::Ready));

    // The original bytes are still recognised as unchanged.
    s.load("a.edf", &good, &ReaderOptions::default()).unwrap();
    assert_eq!(s.active_recording().unwrap().samples(), &before);
}

#[test]
fn results_reorder_and_report_in_session_order() {
    let mut s = native_session();
    s.load("a.edf", &ssvep_edf(), &ReaderOptions::default()).unwrap();
    s.add_custom_annotation(15.0, 5.0, "inside").unwrap();
    s.add_custom_annotation(50.0, 1.0, "outside").unwrap();
    s.set_window(10.0, 30.0).unwrap();
    s.analyze(AnalysisParams::Psd(PsdParams::default())).unwrap();
    s.analyze(AnalysisParams::RawPlot(RawPlotParams::default())).unwrap();
    s.analyze(AnalysisParams::Snr(SnrParams::default())).unwrap();

    s.move_result("result_3", 0).unwrap();
    let order: Vec<&str> = s.results().iter().map(|r| r.id.as_str()).collect();
    assert_eq!(order, ["result_3", "result_1", "result_2"]);

    s.remove_result("result_1").unwrap();
    assert_eq!(s.remove_result("result_1").unwrap_err().code(), "UNKNOWN_RESULT");

    let bundle = ReportBundle::from_session(&s, &["result_2", "result_3"], None).unwrap();
    let kinds: Vec<&str> = bundle.items.iter().map(|i| i.analysis_type.as_str()).collect();
    assert_eq!(kinds, ["SNR", "RawPlot"]);
    assert_eq!(bundle.metadata.time_frame, TimeWindow::new(10.0, 30.0));
    assert_eq!(bundle.metadata.num_channels, 4);
    let notes: Vec<&str> = bundle.metadata.annotations.iter().map(|a| a.description.as_str()).collect();
    assert_eq!(notes, ["inside"]);

    let json: serde_json::Value = serde_json::from_str(&bundle.to_json().unwrap()).unwrap();
    assert!(json["items"][0]["imageBytes"].as_str().unwrap().starts_with("iVBOR"));

    let err = ReportBundle::from_session(&s, &["result_9"], None).unwrap_err();
    assert_eq!(err.code(), "UNKNOWN_RESULT");
}
