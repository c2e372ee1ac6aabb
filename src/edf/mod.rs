//! EDF/BDF format reader.
//!
//! Decoding goes through an ordered chain of [`Reader`] backends.  Each
//! backend either returns a complete [`Decoded`] recording or fails; nothing
//! is kept from a failed attempt.  The next backend is then tried, and only
//! when all of them fail does the caller get an [`Error::Format`] listing
//! every backend's diagnostic.
//!
//! ```no_run
//! use eegkit::edf::FormatReader;
//! use eegkit::config::ReaderOptions;
//!
//! let bytes = std::fs::read("data/subject1.bdf").unwrap();
//! let reader = FormatReader::default();
//! let rec = reader.read(&bytes, "subject1.bdf", &ReaderOptions::default()).unwrap();
//! println!("{} channels @ {} Hz", rec.n_channels(), rec.sampling_frequency_hz());
//! ```
pub mod backends;
pub mod header;
pub mod native;
pub mod tal;
pub mod writer;

use chrono::NaiveDateTime;
use ndarray::Array2;
use std::panic::{catch_unwind, AssertUnwindSafe};

use crate::config::{BackendKind, ReaderOptions};
use crate::error::{Error, Result};
use crate::recording::{AnnotationDraft, AnnotationSource, Channel, HeaderInfo, Recording, SourceFormat};

pub use backends::{EdfPlusBackend, EdfReaderBackend, NativeBackend};
pub use header::{sniff_format, EdfHeader, SignalHeader};

/// Output of a successful backend decode, before it becomes a [`Recording`].
#[derive(Debug, Clone)]
pub struct Decoded {
    pub format: SourceFormat,
    pub channels: Vec<Channel>,
    pub sampling_frequency_hz: f64,
    /// `[channel, sample]`, physical units.
    pub samples: Array2<f64>,
    pub start: Option<NaiveDateTime>,
    pub header: HeaderInfo,
    pub annotations: Vec<AnnotationDraft>,
}

impl Decoded {
    /// Consistency checks every backend result must pass.
    fn validate(&self) -> anyhow::Result<()> {
        if self.channels.is_empty() {
            anyhow::bail!("no data channels");
        }
        if self.channels.len() != self.samples.nrows() {
            anyhow::bail!("{} labels for {} data rows", self.channels.len(), self.samples.nrows());
        }
        if self.samples.ncols() == 0 {
            anyhow::bail!("no samples");
        }
        if !(self.sampling_frequency_hz > 0.0 && self.sampling_frequency_hz.is_finite()) {
            anyhow::bail!("invalid sampling frequency {}", self.sampling_frequency_hz);
        }
        if self.samples.iter().any(|v| !v.is_finite()) {
            anyhow::bail!("non-finite sample values");
        }
        Ok(())
    }

    fn into_recording(mut self, opts: &ReaderOptions) -> Result<Recording> {
        dedupe_labels(&mut self.channels);
        let mut rec = Recording::new(self.channels, self.sampling_frequency_hz, self.samples, self.format)?
            .with_start(self.start)
            .with_header(self.header);
        for draft in self.annotations {
            if let Err(e) = rec.push_annotation(AnnotationSource::File, draft) {
                log::warn!("skipping annotation: {e}");
            }
        }
        if self.format == SourceFormat::Bdf {
            rec.apply_referencing(opts.bdf_referencing)?;
        }
        Ok(rec)
    }
}

/// A decoding backend.
pub trait Reader: Send + Sync {
    fn name(&self) -> &'static str;

    /// Whether this backend understands the container at all.
    fn supports(&self, format: SourceFormat) -> bool;

    fn decode(&self, bytes: &[u8], filename: &str) -> anyhow::Result<Decoded>;
}

/// Ordered chain of backends.
pub struct FormatReader {
    backends: Vec<Box<dyn Reader>>,
}

impl Default for FormatReader {
    /// `edfplus`, then `edf-reader`, then the built-in parser.
    fn default() -> Self {
        Self::new(&BackendKind::all())
    }
}

impl FormatReader {
    pub fn new(kinds: &[BackendKind]) -> Self {
        let backends = kinds
            .iter()
            .map(|k| -> Box<dyn Reader> {
                match k {
                    BackendKind::EdfPlus => Box::new(EdfPlusBackend),
                    BackendKind::EdfReader => Box::new(EdfReaderBackend),
                    BackendKind::Native => Box::new(NativeBackend),
                }
            })
            .collect();
        Self { backends }
    }

    /// Built-in parser only.
    pub fn native_only() -> Self {
        Self::new(&[BackendKind::Native])
    }

    pub fn with_backend(mut self, backend: Box<dyn Reader>) -> Self {
        self.backends.push(backend);
        self
    }

    pub fn backend_names(&self) -> Vec<&'static str> {
        self.backends.iter().map(|b| b.name()).collect()
    }

    /// Decode `bytes` into a [`Recording`].
    ///
    /// # Errors
    ///
    /// [`Error::Format`] when the container is not recognised or every
    /// applicable backend fails.
    pub fn read(&self, bytes: &[u8], filename: &str, opts: &ReaderOptions) -> Result<Recording> {
        let format_error = |message: String| Error::Format { filename: filename.to_string(), message };

        let format = sniff_format(bytes).ok_or_else(|| {
            format_error(format!(
                "not an EDF or BDF file ({} bytes, unrecognised version field)",
                bytes.len()
            ))
        })?;

        let mut diagnostics = Vec::new();
        for backend in self.backends.iter().filter(|b| b.supports(format)) {
            let attempt = catch_unwind(AssertUnwindSafe(|| backend.decode(bytes, filename)))
                .unwrap_or_else(|panic| Err(anyhow::anyhow!("backend panicked: {}", panic_message(&*panic))))
                .and_then(|d| d.validate().map(|_| d));
            match attempt {
                Ok(decoded) => {
                    log::info!(
                        "{filename}: decoded by {} ({} channels, {} samples @ {} Hz)",
                        backend.name(),
                        decoded.channels.len(),
                        decoded.samples.ncols(),
                        decoded.sampling_frequency_hz
                    );
                    return decoded.into_recording(opts);
                }
                Err(e) => {
                    log::warn!("{filename}: {} failed, trying next backend: {e:#}", backend.name());
                    diagnostics.push(format!("{}: {e:#}", backend.name()));
                }
            }
        }

        if diagnostics.is_empty() {
            return Err(format_error(format!("no registered backend supports {format:?}")));
        }
        Err(format_error(diagnostics.join("; ")))
    }
}

/// Decode with the default backend chain and options.
pub fn read(bytes: &[u8], filename: &str) -> Result<Recording> {
    FormatReader::default().read(bytes, filename, &ReaderOptions::default())
}

/// Indices of the channels sharing the first channel's sampling rate.
pub(crate) fn single_rate(labels: &[String], rates: &[f64]) -> anyhow::Result<Vec<usize>> {
    let Some(&reference) = rates.first() else {
        anyhow::bail!("no data channels");
    };
    let mut keep = Vec::with_capacity(rates.len());
    for (i, &r) in rates.iter().enumerate() {
        if (r - reference).abs() <= 1e-9 * reference.max(1.0) {
            keep.push(i);
        } else {
            log::warn!("dropping channel '{}': {r} Hz differs from {reference} Hz", labels[i]);
        }
    }
    Ok(keep)
}

fn dedupe_labels(channels: &mut [Channel]) {
    for i in 1..channels.len() {
        let base = channels[i].label.clone();
        let mut n = 1;
        while channels[..i].iter().any(|c| c.label == channels[i].label) {
            n += 1;
            channels[i].label = format!("{base}-{n}");
        }
    }
}

pub(crate) fn panic_message(panic: &(dyn std::any::Any + Send)) -> String {
    if let Some(s) = panic.downcast_ref::<&str>() {
        (*s).to_string()
    } else if let Some(s) = panic.downcast_ref::<String>() {
        s.clone()
    } else {
        "unknown panic".to_string()
    }
}
