//! In-memory recording model.
//!
//! A [`Recording`] is a single-rate multi-channel time series in physical
//! units, `[channel, sample]`, plus header metadata and annotations.  The
//! sample matrix sits behind an `Arc` so a recording can be shared with a
//! background job without copying; only annotations change after load.
use chrono::NaiveDateTime;
use ndarray::Array2;
use serde::{Deserialize, Serialize};
use std::sync::Arc;

use crate::config::BdfReferencing;
use crate::error::{Error, Result};

/// Container format the recording was decoded from.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum SourceFormat {
    #[serde(rename = "EDF")]
    Edf,
    #[serde(rename = "BDF")]
    Bdf,
}

impl SourceFormat {
    /// Bytes per stored sample.
    pub fn sample_bytes(&self) -> usize {
        match self {
            SourceFormat::Edf => 2,
            SourceFormat::Bdf => 3,
        }
    }
}

/// Per-channel header metadata.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Channel {
    pub label: String,
    /// Physical unit, e.g. `"uV"`.
    pub physical_dimension: String,
    pub transducer: String,
    pub prefilter: String,
}

impl Channel {
    pub fn new(label: &str) -> Self {
        Self {
            label: label.to_string(),
            physical_dimension: String::new(),
            transducer: String::new(),
            prefilter: String::new(),
        }
    }
}

/// Where an annotation came from.  Also the prefix of its id.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum AnnotationSource {
    /// Embedded in the file (EDF+/BDF+ annotation channel).
    File,
    /// Imported from an annotation CSV.
    Csv,
    /// Added by the user.
    Custom,
}

impl AnnotationSource {
    pub fn as_str(&self) -> &'static str {
        match self {
            AnnotationSource::File => "file",
            AnnotationSource::Csv => "csv",
            AnnotationSource::Custom => "custom",
        }
    }
}

/// A labelled marker or interval.  Never mutated once created.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Annotation {
    pub id: String,
    pub onset_seconds: f64,
    pub duration_seconds: f64,
    pub description: String,
    pub is_custom: bool,
    /// Experiment/condition column of an imported CSV.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub experiment: Option<String>,
}

impl Annotation {
    pub fn end_seconds(&self) -> f64 {
        self.onset_seconds + self.duration_seconds
    }

    /// `true` if any part of the annotation lies inside `[start, end)`.
    /// Zero-duration markers count when their onset is inside.
    pub fn intersects(&self, start: f64, end: f64) -> bool {
        if self.duration_seconds <= 0.0 {
            return self.onset_seconds >= start && self.onset_seconds < end;
        }
        self.onset_seconds < end && self.end_seconds() > start
    }
}

/// Annotation fields before an id is assigned.
#[derive(Debug, Clone, PartialEq)]
pub struct AnnotationDraft {
    pub onset_seconds: f64,
    pub duration_seconds: f64,
    pub description: String,
    pub experiment: Option<String>,
}

/// Header fields that do not belong to individual channels.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct HeaderInfo {
    pub patient_id: String,
    pub recording_id: String,
    pub data_records: usize,
    pub record_duration_seconds: f64,
}

/// A decoded multi-channel recording.
#[derive(Debug, Clone)]
pub struct Recording {
    channels: Vec<Channel>,
    sampling_frequency_hz: f64,
    samples: Arc<Array2<f64>>,
    start: Option<NaiveDateTime>,
    annotations: Vec<Annotation>,
    source_format: SourceFormat,
    header: HeaderInfo,
    referencing: Option<BdfReferencing>,
    next_annotation: [usize; 3],
}

impl Recording {
    /// Build a recording, checking the single-rate invariants.
    pub fn new(
        channels: Vec<Channel>,
        sampling_frequency_hz: f64,
        samples: Array2<f64>,
        source_format: SourceFormat,
    ) -> Result<Self> {
        if !(sampling_frequency_hz > 0.0 && sampling_frequency_hz.is_finite()) {
            return Err(Error::param(format!(
                "sampling frequency must be positive, got {sampling_frequency_hz}"
            )));
        }
        if channels.len() != samples.nrows() {
            return Err(Error::param(format!(
                "{} channel labels for {} data rows",
                channels.len(),
                samples.nrows()
            )));
        }
        for (i, ch) in channels.iter().enumerate() {
            if channels[..i].iter().any(|c| c.label == ch.label) {
                return Err(Error::param(format!("duplicate channel label '{}'", ch.label)));
            }
        }
        Ok(Self {
            channels,
            sampling_frequency_hz,
            samples: Arc::new(samples),
            start: None,
            annotations: Vec::new(),
            source_format,
            header: HeaderInfo::default(),
            referencing: None,
            next_annotation: [0; 3],
        })
    }

    pub fn with_start(mut self, start: Option<NaiveDateTime>) -> Self {
        self.start = start;
        self
    }

    pub fn with_header(mut self, header: HeaderInfo) -> Self {
        self.header = header;
        self
    }

    // ── Accessors ──────────────────────────────────────────────────────────

    pub fn channels(&self) -> &[Channel] {
        &self.channels
    }

    pub fn channel_names(&self) -> Vec<String> {
        self.channels.iter().map(|c| c.label.clone()).collect()
    }

    pub fn channel_index(&self, name: &str) -> Option<usize> {
        self.channels.iter().position(|c| c.label == name)
    }

    pub fn n_channels(&self) -> usize {
        self.channels.len()
    }

    pub fn n_samples(&self) -> usize {
        self.samples.ncols()
    }

    pub fn sampling_frequency_hz(&self) -> f64 {
        self.sampling_frequency_hz
    }

    pub fn duration_seconds(&self) -> f64 {
        self.n_samples() as f64 / self.sampling_frequency_hz
    }

    /// `[channel, sample]` in physical units.
    pub fn samples(&self) -> &Array2<f64> {
        &self.samples
    }

    pub fn start(&self) -> Option<NaiveDateTime> {
        self.start
    }

    pub fn source_format(&self) -> SourceFormat {
        self.source_format
    }

    pub fn header(&self) -> &HeaderInfo {
        &self.header
    }

    /// Offset handling applied at ingestion, if any.
    pub fn referencing(&self) -> Option<BdfReferencing> {
        self.referencing
    }

    pub fn annotations(&self) -> &[Annotation] {
        &self.annotations
    }

    /// Annotations overlapping `[start, end)`.
    pub fn annotations_in(&self, start: f64, end: f64) -> Vec<&Annotation> {
        self.annotations.iter().filter(|a| a.intersects(start, end)).collect()
    }

    pub fn annotation(&self, id: &str) -> Option<&Annotation> {
        self.annotations.iter().find(|a| a.id == id)
    }

    // ── Mutation ──────────────────────────────────────────────────────────

    /// Append an annotation and return its id.
    pub fn push_annotation(&mut self, source: AnnotationSource, draft: AnnotationDraft) -> Result<String> {
        if !(draft.onset_seconds >= 0.0 && draft.onset_seconds.is_finite()) {
            return Err(Error::param(format!(
                "annotation onset must be >= 0, got {}",
                draft.onset_seconds
            )));
        }
        if !(draft.duration_seconds >= 0.0 && draft.duration_seconds.is_finite()) {
            return Err(Error::param(format!(
                "annotation duration must be >= 0, got {}",
                draft.duration_seconds
            )));
        }
        let slot = source as usize;
        let id = format!("{}_ann_{}", source.as_str(), self.next_annotation[slot]);
        self.next_annotation[slot] += 1;
        self.annotations.push(Annotation {
            id: id.clone(),
            onset_seconds: draft.onset_seconds,
            duration_seconds: draft.duration_seconds,
            description: draft.description,
            is_custom: source != AnnotationSource::File,
            experiment: draft.experiment,
        });
        Ok(id)
    }

    /// User-added marker or interval.
    pub fn add_custom_annotation(&mut self, onset: f64, duration: f64, description: &str) -> Result<String> {
        self.push_annotation(
            AnnotationSource::Custom,
            AnnotationDraft {
                onset_seconds: onset,
                duration_seconds: duration,
                description: description.to_string(),
                experiment: None,
            },
        )
    }

    pub fn remove_annotation(&mut self, id: &str) -> Option<Annotation> {
        let idx = self.annotations.iter().position(|a| a.id == id)?;
        Some(self.annotations.remove(idx))
    }

    /// Apply the one-time BDF offset step.  A second call is rejected.
    pub(crate) fn apply_referencing(&mut self, mode: BdfReferencing) -> Result<()> {
        if let Some(done) = self.referencing {
            return Err(Error::InvalidState {
                state: format!("referenced ({done:?})"),
                operation: format!("apply {mode:?} referencing"),
            });
        }
        // Only the reader holds the Arc at this point, so this does not copy.
        let data = Arc::make_mut(&mut self.samples);
        match mode {
            BdfReferencing::Baseline => crate::reference::baseline_correct_inplace(data),
            BdfReferencing::Average => crate::reference::average_reference_inplace(data),
        }
        self.referencing = Some(mode);
        Ok(())
    }

    /// Serialisable header summary.
    pub fn info(&self, filename: &str) -> RecordingInfo {
        RecordingInfo {
            filename: filename.to_string(),
            source_format: self.source_format,
            sampling_rate_hz: self.sampling_frequency_hz,
            n_channels: self.n_channels(),
            n_samples: self.n_samples(),
            duration_seconds: self.duration_seconds(),
            channel_names: self.channel_names(),
            start: self.start,
            patient_id: self.header.patient_id.clone(),
            n_annotations: self.annotations.len(),
            referencing: self.referencing,
        }
    }
}

/// Summary printed by the CLI and sent to the UI after a load.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RecordingInfo {
    pub filename: String,
    pub source_format: SourceFormat,
    pub sampling_rate_hz: f64,
    pub n_channels: usize,
    pub n_samples: usize,
    pub duration_seconds: f64,
    pub channel_names: Vec<String>,
    pub start: Option<NaiveDateTime>,
    pub patient_id: String,
    pub n_annotations: usize,
    pub referencing: Option<BdfReferencing>,
}

#[cfg(test)]
mod tests {
    use super::*;

    fn two_channel() -> Recording {
        let data = Array2::from_shape_fn((2, 512), |(c, t)| (c * 10 + t) as f64);
        Recording::new(vec![Channel::new("Fz"), Channel::new("Cz")], 256.0, data, SourceFormat::Edf).unwrap()
    }

    #[test]
    fn duration_from_samples() {
        let rec = two_channel();
        assert_eq!(rec.duration_seconds(), 2.0);
        assert_eq!(rec.channel_index("Cz"), Some(1));
    }

    #[test]
    fn rejects_label_count_mismatch() {
        let data = Array2::zeros((3, 10));
        let err = Recording::new(vec![Channel::new("A")], 100.0, data, SourceFormat::Edf).unwrap_err();
        assert_eq!(err.code(), "INVALID_PARAMETER");
    }

    #[test]
    fn rejects_duplicate_labels() {
        let data = Array2::zeros((2, 10));
        let chans = vec![Channel::new("A"), Channel::new("A")];
        assert!(Recording::new(chans, 100.0, data, SourceFormat::Edf).is_err());
    }

    #[test]
    fn annotation_ids_stay_unique_after_removal() {
        let mut rec = two_channel();
        let a = rec.add_custom_annotation(0.5, 0.0, "blink").unwrap();
        let b = rec.add_custom_annotation(1.0, 0.2, "jaw").unwrap();
        assert_eq!(a, "custom_ann_0");
        rec.remove_annotation(&a).unwrap();
        let c = rec.add_custom_annotation(1.5, 0.0, "blink").unwrap();
        assert_ne!(b, c);
        assert_eq!(rec.annotations().len(), 2);
        assert!(rec.annotations().iter().all(|x| x.is_custom));
    }

    #[test]
    fn out_of_range_annotation_is_tolerated() {
        let mut rec = two_channel();
        rec.add_custom_annotation(100.0, 5.0, "late").unwrap();
        assert!(rec.annotations_in(0.0, rec.duration_seconds()).is_empty());
    }

    #[test]
    fn referencing_applies_once() {
        let mut rec = two_channel();
        rec.apply_referencing(BdfReferencing::Baseline).unwrap();
        let row_mean = rec.samples().row(0).mean().unwrap();
        approx::assert_abs_diff_eq!(row_mean, 0.0, epsilon = 1e-9);
        assert!(rec.apply_referencing(BdfReferencing::Baseline).is_err());
    }
}
