//! Session orchestration.
//!
//! A [`Session`] owns every loaded file, the active time-window/channel
//! selection and the ordered list of analysis results.  Per file:
//!
//! ```text
//!             load ok                 analyze            done
//! Unloaded ──────────► Loading ──► Ready ──────► Analyzing ──► Ready
//!    ▲                   │           │
//!    └──── format error ─┘           └── discard ──► Discarded (samples freed)
//! ```
//!
//! Rules:
//!   1. The selection belongs to the session, not to a file: switching the
//!      active file never resets it.
//!   2. Loading the same bytes under the same name with the same reader
//!      options reuses the in-memory recording; BDF referencing is therefore
//!      never applied twice.
//!   3. One state transition at a time: while a load or an analysis is in
//!      flight, other loads and analyses are rejected.
//!   4. Results are appended in completion order and never edited; they
//!      outlive discarded files.
//!   5. A failed reload keeps the previously decoded recording.  Dropping a
//!      background handle unfinished returns the file to the state it would
//!      settle in without that job.
//!   6. Analyses that span files (comparison PSD, experiment SNR) see the
//!      active file first, then every other `Ready` file in load order.
use serde::{Deserialize, Serialize};
use std::collections::hash_map::DefaultHasher;
use std::hash::{Hash, Hasher};
use std::sync::{Arc, Weak};

use crate::annotations_csv::parse_csv_annotations;
use crate::config::{AnalysisParams, ExportOptions, ReaderOptions};
use crate::edf::FormatReader;
use crate::error::{Error, Result};
use crate::job::{Job, Progress};
use crate::recording::{Annotation, AnnotationSource, Recording, RecordingInfo};
use crate::request::{self, AnalysisOutput, AnalysisRequest, AnalysisResult};
use crate::runtime::Runtime;
use crate::selection::TimeWindow;

/// Lifecycle of one file within a session.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum FileState {
    Unloaded,
    Loading,
    Ready,
    Analyzing,
    Discarded,
}

impl std::fmt::Display for FileState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            FileState::Unloaded => "unloaded",
            FileState::Loading => "loading",
            FileState::Ready => "ready",
            FileState::Analyzing => "analyzing",
            FileState::Discarded => "discarded",
        };
        f.write_str(s)
    }
}

#[derive(Debug)]
struct FileEntry {
    filename: String,
    state: FileState,
    recording: Option<Recording>,
    content_hash: u64,
    options: ReaderOptions,
    // Held alive by the pending handle of a background job.
    in_flight: Option<Weak<()>>,
}

impl FileEntry {
    fn abandoned(&self) -> bool {
        self.in_flight.as_ref().is_some_and(|t| t.strong_count() == 0)
    }

    /// State after dropping a job whose handle is gone.
    fn settled(&self) -> FileState {
        if self.recording.is_some() {
            FileState::Ready
        } else {
            FileState::Unloaded
        }
    }

    fn current_state(&self) -> FileState {
        if self.abandoned() {
            self.settled()
        } else {
            self.state
        }
    }
}

/// A decode running on a worker thread.  Hand it back to
/// [`Session::finish_load`].
#[derive(Debug)]
pub struct PendingLoad {
    filename: String,
    content_hash: u64,
    options: ReaderOptions,
    job: Job<Recording>,
    _ticket: Arc<()>,
}

impl PendingLoad {
    pub fn filename(&self) -> &str {
        &self.filename
    }

    pub fn poll(&mut self) -> Vec<String> {
        self.job.poll()
    }

    pub fn is_finished(&self) -> bool {
        self.job.is_finished()
    }
}

/// An analysis running on a worker thread.  Hand it back to
/// [`Session::complete`].
#[derive(Debug)]
pub struct PendingAnalysis {
    filename: String,
    request: AnalysisRequest,
    job: Job<AnalysisOutput>,
    _ticket: Arc<()>,
}

impl PendingAnalysis {
    pub fn filename(&self) -> &str {
        &self.filename
    }

    pub fn request(&self) -> &AnalysisRequest {
        &self.request
    }

    pub fn poll(&mut self) -> Vec<String> {
        self.job.poll()
    }

    pub fn is_finished(&self) -> bool {
        self.job.is_finished()
    }
}

/// Files, selection and results of one user session.
#[derive(Debug)]
pub struct Session {
    runtime: std::result::Result<Runtime, String>,
    files: Vec<FileEntry>,
    active: Option<String>,
    window: Option<TimeWindow>,
    channels: Vec<String>,
    results: Vec<AnalysisResult>,
    next_result: usize,
}

fn content_hash(bytes: &[u8]) -> u64 {
    let mut h = DefaultHasher::new();
    bytes.hash(&mut h);
    h.finish()
}

impl Session {
    pub fn new(runtime: Runtime) -> Self {
        Self::from_bootstrap(Ok(runtime))
    }

    /// A session over the outcome of [`Runtime::bootstrap`].  A failed
    /// bootstrap yields a session that rejects every load and analysis.
    pub fn from_bootstrap(runtime: Result<Runtime>) -> Self {
        let runtime = runtime.map_err(|e| {
            log::error!("{e}");
            match e {
                Error::RuntimeBootstrap(msg) => msg,
                other => other.to_string(),
            }
        });
        Self {
            runtime,
            files: Vec::new(),
            active: None,
            window: None,
            channels: Vec::new(),
            results: Vec::new(),
            next_result: 1,
        }
    }

    /// A session on the process-wide runtime.
    pub fn with_global_runtime() -> Self {
        Self::from_bootstrap(Runtime::global().cloned())
    }

    pub fn runtime(&self) -> Result<&Runtime> {
        self.runtime.as_ref().map_err(|msg| Error::RuntimeBootstrap(msg.clone()))
    }

    // ── Files ─────────────────────────────────────────────────────────────

    /// Decode `bytes` on the calling thread and make the file active.
    ///
    /// # Errors
    ///
    /// * [`Error::RuntimeBootstrap`] if the runtime is unavailable.
    /// * [`Error::InvalidState`] while another load or analysis is in flight.
    /// * [`Error::Format`] if no backend can decode the bytes; the file is
    ///   left `Unloaded` and the rest of the session is untouched.
    pub fn load(&mut self, filename: &str, bytes: &[u8], options: &ReaderOptions) -> Result<RecordingInfo> {
        let reader = self.runtime()?.shared_reader();
        self.reap_abandoned();
        self.ensure_idle("load")?;
        let hash = content_hash(bytes);
        if let Some(info) = self.try_reuse(filename, hash, options) {
            return Ok(info);
        }
        self.begin_load(filename, hash, options);
        let outcome = reader.read(bytes, filename, options);
        self.install(filename, hash, options, outcome)
    }

    /// Start decoding on a worker thread.  The file is `Loading` until the
    /// returned handle is passed to [`finish_load`](Self::finish_load) or
    /// dropped; a dropped handle discards the decode.
    pub fn load_in_background(
        &mut self,
        filename: &str,
        bytes: Vec<u8>,
        options: &ReaderOptions,
    ) -> Result<PendingLoad> {
        let reader = self.runtime()?.shared_reader();
        self.reap_abandoned();
        self.ensure_idle("load")?;
        let hash = content_hash(&bytes);
        let reusable = self
            .entry(filename)
            .filter(|e| e.state == FileState::Ready && e.content_hash == hash && e.options == *options)
            .and_then(|e| e.recording.clone());
        let ticket = Arc::new(());
        if reusable.is_none() {
            self.begin_load(filename, hash, options);
            self.track(filename, &ticket);
        }

        let name = filename.to_string();
        let opts = *options;
        let job = Job::spawn(format!("load {filename}"), move |p: &Progress| match reusable {
            Some(rec) => {
                p.report(format!("{name}: already decoded"));
                Ok(rec)
            }
            None => {
                p.report(format!("{name}: decoding {} bytes", bytes.len()));
                let rec = decode_with(&reader, &bytes, &name, &opts)?;
                p.report(format!("{name}: {} channels decoded", rec.n_channels()));
                Ok(rec)
            }
        });
        Ok(PendingLoad { filename: filename.to_string(), content_hash: hash, options: opts, job, _ticket: ticket })
    }

    /// Wait for a background load and install its recording.
    pub fn finish_load(&mut self, pending: PendingLoad) -> Result<RecordingInfo> {
        let PendingLoad { filename, content_hash, options, job, _ticket } = pending;
        if let Some(info) = self.try_reuse(&filename, content_hash, &options) {
            // Drain the worker so its thread is joined.
            job.wait()?;
            return Ok(info);
        }
        let outcome = job.wait();
        self.install(&filename, content_hash, &options, outcome)
    }

    fn try_reuse(&mut self, filename: &str, hash: u64, options: &ReaderOptions) -> Option<RecordingInfo> {
        let entry = self.entry(filename)?;
        if entry.state != FileState::Ready || entry.content_hash != hash || entry.options != *options {
            return None;
        }
        let info = entry.recording.as_ref()?.info(filename);
        log::info!("{filename}: unchanged, reusing decoded recording");
        self.active = Some(filename.to_string());
        Some(info)
    }

    /// Mark the file `Loading`.  A previously decoded recording stays in
    /// place until a new one is installed.
    fn begin_load(&mut self, filename: &str, hash: u64, options: &ReaderOptions) {
        match self.files.iter_mut().find(|e| e.filename == filename) {
            Some(entry) => entry.state = FileState::Loading,
            None => self.files.push(FileEntry {
                filename: filename.to_string(),
                state: FileState::Loading,
                recording: None,
                content_hash: hash,
                options: *options,
                in_flight: None,
            }),
        }
    }

    fn track(&mut self, filename: &str, ticket: &Arc<()>) {
        if let Some(e) = self.files.iter_mut().find(|e| e.filename == filename) {
            e.in_flight = Some(Arc::downgrade(ticket));
        }
    }

    /// Settle files whose background handle was dropped unfinished.
    fn reap_abandoned(&mut self) {
        for e in self.files.iter_mut().filter(|e| e.abandoned()) {
            let settled = e.settled();
            log::warn!("{}: background {} abandoned, back to {settled}", e.filename, e.state);
            e.state = settled;
            e.in_flight = None;
        }
    }

    fn install(
        &mut self,
        filename: &str,
        hash: u64,
        options: &ReaderOptions,
        outcome: Result<Recording>,
    ) -> Result<RecordingInfo> {
        let entry = self
            .files
            .iter_mut()
            .find(|e| e.filename == filename)
            .ok_or_else(|| Error::UnknownFile(filename.to_string()))?;
        entry.in_flight = None;
        let rec = match outcome {
            Ok(rec) => rec,
            Err(e) => {
                entry.state = entry.settled();
                log::warn!("{filename}: load failed, file stays {}: {e}", entry.state);
                return Err(e);
            }
        };
        let info = rec.info(filename);
        entry.state = FileState::Ready;
        entry.recording = Some(rec);
        entry.content_hash = hash;
        entry.options = *options;
        log::info!(
            "{filename}: ready ({} channels, {:.1} s @ {} Hz)",
            info.n_channels,
            info.duration_seconds,
            info.sampling_rate_hz
        );

        self.active = Some(filename.to_string());
        // First file seeds the selection; later files leave it alone.
        if self.window.is_none() {
            self.window = Some(TimeWindow::new(0.0, info.duration_seconds));
        }
        if self.channels.is_empty() {
            self.channels = info.channel_names.clone();
        }
        Ok(info)
    }

    /// Make a ready file active.  The selection is kept as it is.
    pub fn switch_active(&mut self, filename: &str) -> Result<()> {
        self.reap_abandoned();
        let entry = self.entry(filename).ok_or_else(|| Error::UnknownFile(filename.to_string()))?;
        if !matches!(entry.state, FileState::Ready | FileState::Analyzing) {
            return Err(Error::InvalidState { state: entry.state.to_string(), operation: "switch to".into() });
        }
        self.active = Some(filename.to_string());
        log::debug!("active file: {filename}");
        Ok(())
    }

    /// Drop a file's samples.  Its results stay in the result list.
    pub fn discard(&mut self, filename: &str) -> Result<()> {
        self.reap_abandoned();
        let entry = self
            .files
            .iter_mut()
            .find(|e| e.filename == filename)
            .ok_or_else(|| Error::UnknownFile(filename.to_string()))?;
        if matches!(entry.state, FileState::Loading | FileState::Analyzing) {
            return Err(Error::InvalidState { state: entry.state.to_string(), operation: "discard".into() });
        }
        entry.recording = None;
        entry.state = FileState::Discarded;
        if self.active.as_deref() == Some(filename) {
            self.active = None;
        }
        log::info!("{filename}: discarded");
        Ok(())
    }

    pub fn state(&self, filename: &str) -> Option<FileState> {
        self.entry(filename).map(FileEntry::current_state)
    }

    /// `(filename, state)` in load order.
    pub fn files(&self) -> Vec<(&str, FileState)> {
        self.files.iter().map(|e| (e.filename.as_str(), e.current_state())).collect()
    }

    pub fn active_filename(&self) -> Option<&str> {
        self.active.as_deref()
    }

    pub fn active_recording(&self) -> Result<&Recording> {
        let name = self.active.as_deref().ok_or_else(|| Error::InvalidState {
            state: "no active file".into(),
            operation: "access recording".into(),
        })?;
        self.entry(name)
            .and_then(|e| e.recording.as_ref())
            .ok_or_else(|| Error::UnknownFile(name.to_string()))
    }

    fn active_recording_mut(&mut self) -> Result<&mut Recording> {
        let name = self.active.clone().ok_or_else(|| Error::InvalidState {
            state: "no active file".into(),
            operation: "edit annotations".into(),
        })?;
        self.files
            .iter_mut()
            .find(|e| e.filename == name)
            .and_then(|e| e.recording.as_mut())
            .ok_or_else(|| Error::UnknownFile(name.clone()))
    }

    fn entry(&self, filename: &str) -> Option<&FileEntry> {
        self.files.iter().find(|e| e.filename == filename)
    }

    fn ensure_idle(&self, operation: &str) -> Result<()> {
        match self.files.iter().find(|e| matches!(e.current_state(), FileState::Loading | FileState::Analyzing)) {
            Some(busy) => Err(Error::InvalidState {
                state: format!("{} ({})", busy.state, busy.filename),
                operation: operation.to_string(),
            }),
            None => Ok(()),
        }
    }

    // ── Selection ─────────────────────────────────────────────────────────

    pub fn window(&self) -> Option<TimeWindow> {
        self.window
    }

    pub fn channels(&self) -> &[String] {
        &self.channels
    }

    /// Set the active window.  Rejected windows leave the old one in place.
    pub fn set_window(&mut self, start_seconds: f64, end_seconds: f64) -> Result<()> {
        let window = TimeWindow::new(start_seconds, end_seconds);
        match self.active_recording() {
            Ok(rec) => {
                window.sample_range(rec.sampling_frequency_hz(), rec.n_samples())?;
            }
            Err(_) => {
                if !(start_seconds.is_finite() && end_seconds.is_finite() && start_seconds < end_seconds) {
                    return Err(Error::invalid_window(start_seconds, end_seconds, "start must precede end"));
                }
            }
        }
        self.window = Some(window);
        Ok(())
    }

    /// Set the channel subset; order is kept.
    pub fn set_channels<S: AsRef<str>>(&mut self, channels: &[S]) -> Result<()> {
        if channels.is_empty() {
            return Err(Error::param("channel selection is empty"));
        }
        if let Ok(rec) = self.active_recording() {
            if let Some(missing) = channels.iter().find(|c| rec.channel_index(c.as_ref()).is_none()) {
                return Err(Error::UnknownChannel(missing.as_ref().to_string()));
            }
        }
        self.channels = channels.iter().map(|c| c.as_ref().to_string()).collect();
        Ok(())
    }

    /// Set the window to an annotation's interval.
    ///
    /// # Errors
    ///
    /// [`Error::InvalidWindow`] for zero-duration markers.
    pub fn set_window_from_annotation(&mut self, id: &str) -> Result<TimeWindow> {
        let ann = self
            .active_recording()?
            .annotation(id)
            .ok_or_else(|| Error::param(format!("no annotation with id '{id}'")))?;
        let (start, end) = (ann.onset_seconds, ann.end_seconds());
        if ann.duration_seconds <= 0.0 {
            return Err(Error::invalid_window(start, end, format!("annotation '{id}' is a point marker")));
        }
        self.set_window(start, end)?;
        Ok(TimeWindow::new(start, end))
    }

    // ── Annotations ───────────────────────────────────────────────────────

    /// Import `experiment,start_time,duration,label` rows into the active
    /// recording, shifting onsets by `sync_offset` seconds.
    pub fn import_csv_annotations(&mut self, text: &str, sync_offset: f64) -> Result<Vec<String>> {
        let drafts = parse_csv_annotations(text, sync_offset)?;
        let rec = self.active_recording_mut()?;
        let mut ids = Vec::with_capacity(drafts.len());
        for draft in drafts {
            match rec.push_annotation(AnnotationSource::Csv, draft) {
                Ok(id) => ids.push(id),
                Err(e) => log::warn!("skipping CSV annotation: {e}"),
            }
        }
        log::info!("imported {} CSV annotations", ids.len());
        Ok(ids)
    }

    pub fn add_custom_annotation(&mut self, onset: f64, duration: f64, description: &str) -> Result<String> {
        self.active_recording_mut()?.add_custom_annotation(onset, duration, description)
    }

    pub fn remove_annotation(&mut self, id: &str) -> Result<Annotation> {
        self.active_recording_mut()?
            .remove_annotation(id)
            .ok_or_else(|| Error::param(format!("no annotation with id '{id}'")))
    }

    // ── Analyses ──────────────────────────────────────────────────────────

    /// A request for `parameters` over the current selection.
    pub fn request(&self, parameters: AnalysisParams) -> Result<AnalysisRequest> {
        let rec = self.active_recording()?;
        let window = self.window.unwrap_or_else(|| TimeWindow::full(rec));
        let channels = if self.channels.is_empty() { rec.channel_names() } else { self.channels.clone() };
        Ok(AnalysisRequest::new(parameters, window, channels))
    }

    /// Run `parameters` over the current selection and append the result.
    pub fn analyze(&mut self, parameters: AnalysisParams) -> Result<&AnalysisResult> {
        let request = self.request(parameters)?;
        self.submit(request)
    }

    /// Run an explicit request against the active file.
    pub fn submit(&mut self, request: AnalysisRequest) -> Result<&AnalysisResult> {
        self.runtime()?;
        self.reap_abandoned();
        self.ensure_idle("analyze")?;
        let filename = self.active.clone().ok_or_else(|| Error::InvalidState {
            state: "no active file".into(),
            operation: "analyze".into(),
        })?;
        self.set_state(&filename, FileState::Analyzing);
        let outcome = self
            .sources(&filename, &request.parameters)
            .and_then(|sources| request::run_with(&sources, &request));
        self.set_state(&filename, FileState::Ready);
        self.push_result(filename, request, outcome?)
    }

    /// Start an analysis on a worker thread.  Dropping the handle unfinished
    /// discards the result and returns the file to `Ready`.
    pub fn analyze_in_background(&mut self, parameters: AnalysisParams) -> Result<PendingAnalysis> {
        self.runtime()?;
        self.reap_abandoned();
        self.ensure_idle("analyze")?;
        let request = self.request(parameters)?;
        let filename = self.active.clone().unwrap_or_default();
        // Recordings share their samples, so these clones are cheap.
        let owned: Vec<(String, Recording)> = self
            .sources(&filename, &request.parameters)?
            .into_iter()
            .map(|(name, rec)| (name.to_string(), rec.clone()))
            .collect();
        self.set_state(&filename, FileState::Analyzing);
        let ticket = Arc::new(());
        self.track(&filename, &ticket);

        let req = request.clone();
        let job = Job::spawn(format!("{} on {filename}", request.analysis_type()), move |p: &Progress| {
            p.report(format!("running {}", req.analysis_type()));
            let sources: Vec<(&str, &Recording)> = owned.iter().map(|(n, r)| (n.as_str(), r)).collect();
            let out = request::run_with(&sources, &req)?;
            p.report("rendered");
            Ok(out)
        });
        Ok(PendingAnalysis { filename, request, job, _ticket: ticket })
    }

    /// Wait for a background analysis and append its result.
    pub fn complete(&mut self, pending: PendingAnalysis) -> Result<&AnalysisResult> {
        let PendingAnalysis { filename, request, job, _ticket } = pending;
        let outcome = job.wait();
        self.set_state(&filename, FileState::Ready);
        self.push_result(filename, request, outcome?)
    }

    /// `active` first, then the other ready files if `parameters` reads
    /// across files.
    fn sources<'a>(&'a self, active: &'a str, parameters: &AnalysisParams) -> Result<Vec<(&'a str, &'a Recording)>> {
        let first = self
            .entry(active)
            .and_then(|e| e.recording.as_ref())
            .ok_or_else(|| Error::UnknownFile(active.to_string()))?;
        let mut out = vec![(active, first)];
        if parameters.spans_files() {
            out.extend(
                self.files
                    .iter()
                    .filter(|e| e.filename != active && e.current_state() == FileState::Ready)
                    .filter_map(|e| e.recording.as_ref().map(|r| (e.filename.as_str(), r))),
            );
        }
        Ok(out)
    }

    fn set_state(&mut self, filename: &str, state: FileState) {
        if let Some(e) = self.files.iter_mut().find(|e| e.filename == filename) {
            e.state = state;
            e.in_flight = None;
        }
    }

    fn push_result(&mut self, filename: String, request: AnalysisRequest, out: AnalysisOutput) -> Result<&AnalysisResult> {
        let id = format!("result_{}", self.next_result);
        self.next_result += 1;
        log::info!("{id}: {} on {filename}", request.analysis_type());
        self.results.push(AnalysisResult::from_output(id, filename, request, out));
        self.results.last().ok_or_else(|| Error::UnknownResult("latest".into()))
    }

    // ── Export ────────────────────────────────────────────────────────────

    /// Encode a decoded file as EDF+.  The session is not changed.
    ///
    /// # Errors
    ///
    /// * [`Error::UnknownFile`] when no such file was loaded.
    /// * [`Error::InvalidState`] when it holds no recording.
    /// * Writer errors, see [`crate::edf::writer::write_edf`].
    pub fn export_edf(&self, filename: &str, options: &ExportOptions) -> Result<Vec<u8>> {
        let entry = self.entry(filename).ok_or_else(|| Error::UnknownFile(filename.to_string()))?;
        let recording = entry.recording.as_ref().ok_or_else(|| Error::InvalidState {
            state: entry.current_state().to_string(),
            operation: "export".into(),
        })?;
        let bytes = crate::edf::writer::write_edf(recording, options)?;
        log::info!("{filename}: exported {} bytes of EDF+", bytes.len());
        Ok(bytes)
    }

    // ── Results ───────────────────────────────────────────────────────────

    pub fn results(&self) -> &[AnalysisResult] {
        &self.results
    }

    pub fn result(&self, id: &str) -> Option<&AnalysisResult> {
        self.results.iter().find(|r| r.id == id)
    }

    pub fn remove_result(&mut self, id: &str) -> Result<AnalysisResult> {
        let idx = self.position(id)?;
        Ok(self.results.remove(idx))
    }

    /// Move a result to `index` (clamped to the list).
    pub fn move_result(&mut self, id: &str, index: usize) -> Result<()> {
        let from = self.position(id)?;
        let r = self.results.remove(from);
        let to = index.min(self.results.len());
        self.results.insert(to, r);
        Ok(())
    }

    fn position(&self, id: &str) -> Result<usize> {
        self.results
            .iter()
            .position(|r| r.id == id)
            .ok_or_else(|| Error::UnknownResult(id.to_string()))
    }
}

fn decode_with(reader: &FormatReader, bytes: &[u8], filename: &str, opts: &ReaderOptions) -> Result<Recording> {
    reader.read(bytes, filename, opts)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::{BackendKind, PsdParams, RuntimeConfig};

    fn session() -> Session {
        let cfg = RuntimeConfig { backends: vec![BackendKind::Native], self_check: false };
        Session::from_bootstrap(Runtime::bootstrap(&cfg, &Progress::silent()))
    }

    #[test]
    fn failed_bootstrap_blocks_everything() {
        let cfg = RuntimeConfig { backends: Vec::new(), self_check: false };
        let mut s = Session::from_bootstrap(Runtime::bootstrap(&cfg, &Progress::silent()));
        let err = s.load("a.edf", b"0       ", &ReaderOptions::default()).unwrap_err();
        assert_eq!(err.code(), "RUNTIME_BOOTSTRAP_FAILURE");
        let err = s.analyze(AnalysisParams::Psd(PsdParams::default())).unwrap_err();
        assert_eq!(err.code(), "RUNTIME_BOOTSTRAP_FAILURE");
    }

    #[test]
    fn malformed_bytes_leave_file_unloaded() {
        let mut s = session();
        let err = s.load("bad.edf", b"0       truncated", &ReaderOptions::default()).unwrap_err();
        assert_eq!(err.code(), "FORMAT_ERROR");
        assert_eq!(s.state("bad.edf"), Some(FileState::Unloaded));
        assert!(s.active_filename().is_none());
    }

    #[test]
    fn selection_without_file_is_checked_loosely() {
        let mut s = session();
        assert!(s.set_window(5.0, 1.0).is_err());
        s.set_window(1.0, 5.0).unwrap();
        assert_eq!(s.window(), Some(TimeWindow::new(1.0, 5.0)));
        assert!(s.set_channels::<&str>(&[]).is_err());
    }

    #[test]
    fn result_bookkeeping_without_results() {
        let mut s = session();
        assert_eq!(s.remove_result("result_1").unwrap_err().code(), "UNKNOWN_RESULT");
        assert_eq!(s.move_result("result_1", 0).unwrap_err().code(), "UNKNOWN_RESULT");
        assert_eq!(s.switch_active("none.edf").unwrap_err().code(), "UNKNOWN_FILE");
    }
}
