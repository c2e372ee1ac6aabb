//! # eegkit — EEG/EDF analysis workbench core
//!
//! `eegkit` loads EDF/BDF recordings through a chain of reader backends,
//! slices them by time window and channel, and runs spectral analyses
//! (PSD, SNR, band ratios, Morlet time-frequency maps, FOOOF-style spectral
//! parameterisation, SSVEP detection, multi-trace comparison PSD, per-period
//! experiment SNR).  Every analysis returns a serialisable numeric payload
//! plus a PNG plot, collected in a [`Session`].  Recordings can be written
//! back out as EDF+.
//!
//! ## Pipeline overview
//!
//! ```text
//! EDF/BDF bytes
//!   │
//!   ├─ edf::FormatReader      edfplus → edf-reader → native parser
//!   ├─ reference              BDF only: baseline (default) or average
//!   │
//!   ▼
//! Recording [C, T] f64 + annotations (file | csv | custom)
//!   │
//!   ├─ selection::slice       [start, end) s × channel subset
//!   ├─ spectral               Welch / periodogram, coherence
//!   ├─ analysis               snr · band_power · tfr · fooof · pca · ssvep
//!   │                         comparison · experiment (across loaded files)
//!   ├─ render                 plotters → PNG
//!   └─ edf::writer            EDF+ export, Status/TimeStamp dropped
//!        │
//!        └─→ AnalysisResult { payload, plot, quality }  ─►  report::ReportBundle
//! ```
//!
//! ## Quick start
//!
//! ```no_run
//! use eegkit::{AnalysisParams, PsdParams, ReaderOptions, Session};
//!
//! let bytes = std::fs::read("data/subject1.edf").unwrap();
//!
//! // 1. A session on the process-wide runtime
//! let mut session = Session::with_global_runtime();
//!
//! // 2. Load and select
//! session.load("subject1.edf", &bytes, &ReaderOptions::default()).unwrap();
//! session.set_window(10.0, 40.0).unwrap();
//! session.set_channels(&["O1", "O2"]).unwrap();
//!
//! // 3. Analyse
//! let result = session.analyze(AnalysisParams::Psd(PsdParams::default())).unwrap();
//! println!("{}: {} byte PNG", result.id, result.plot.png.len());
//! ```
//!
//! ## Running individual steps
//!
//! Every stage is usable without a session:
//!
//! ```no_run
//! use eegkit::config::SsvepParams;
//! use eegkit::selection::slice;
//!
//! let bytes = std::fs::read("data/ssvep.bdf").unwrap();
//! let rec = eegkit::edf::read(&bytes, "ssvep.bdf").unwrap();
//! let data = slice(&rec, 0.0, 30.0, &["Oz"]).unwrap();
//! let det = eegkit::analysis::ssvep::analyze(&data, &SsvepParams::default()).unwrap();
//! println!("best channel: {:?}", det.best_channel);
//! ```

pub mod analysis;
pub mod annotations_csv;
pub mod config;
pub mod edf;
pub mod error;
pub mod job;
pub mod normalize;
pub mod recording;
pub mod reference;
pub mod render;
pub mod report;
pub mod request;
pub mod runtime;
pub mod selection;
pub mod session;
pub mod spectral;

// ── Crate-root re-exports ─────────────────────────────────────────────────
//
// Everything a downstream user is likely to need is available directly as
// `eegkit::Foo` without having to know the internal module layout.

// error
pub use error::{Error, Result};

// config — parameter records and options
pub use config::{
    AnalysisParams, AnalysisType, Band, BandRatioParams, ComparisonPsdParams, ExperimentSnrParams, NamedBand,
    PsdMethod, PsdParams, RawPlotParams, SnrParams, SpectralParamConfig, SpectralSettings, SsvepParams,
    TimeFrequencyParams, TraceSpec, WindowKind,
    // ingestion, export and runtime
    BackendKind, BdfReferencing, ExportOptions, ReaderOptions, RuntimeConfig,
};

// recording model
pub use recording::{Annotation, AnnotationSource, Channel, Recording, RecordingInfo, SourceFormat};

// reader
pub use edf::writer::write_edf;
pub use edf::{FormatReader, Reader};
pub use annotations_csv::parse_csv_annotations;

// selection
pub use selection::{slice, Slice, TimeWindow};

// spectral engine
pub use spectral::{coherence, compute_psd, periodogram, welch, Coherence, Spectrum};

// analyses
pub use analysis::{
    psd, BandRatioResult, ComparisonPsdResult, Confidence, ExperimentSnrResult, PsdResult, SnrResult, SpectralFit,
    SpectralParamResult, SsvepResult, TimeFrequencyMap,
};

// requests, results, plots
pub use render::RenderedPlot;
pub use request::{AnalysisRequest, AnalysisResult, Payload, Quality};

// orchestration
pub use job::{Job, Progress};
pub use report::{ReportBundle, ReportItem, ReportMetadata};
pub use runtime::Runtime;
pub use session::{FileState, Session};
