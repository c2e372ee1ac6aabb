//! Report hand-off.
//!
//! The document generator is an external collaborator; it receives an
//! ordered list of `(PNG, caption, analysis type)` items plus one metadata
//! record describing the recording and the selection.  [`ReportBundle`]
//! packs both into a single JSON document with images as base64.
use chrono::{DateTime, NaiveDate, NaiveDateTime, Utc};
use serde::{Deserialize, Serialize};
use std::path::Path;

use crate::error::{Error, Result};
use crate::recording::Annotation;
use crate::request::AnalysisResult;
use crate::selection::TimeWindow;
use crate::session::Session;

/// One figure of the report.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ReportItem {
    #[serde(with = "crate::render::base64_bytes")]
    pub image_bytes: Vec<u8>,
    pub caption: String,
    pub analysis_type: String,
}

impl From<&AnalysisResult> for ReportItem {
    fn from(r: &AnalysisResult) -> Self {
        Self {
            image_bytes: r.plot.png.clone(),
            caption: r.caption.clone(),
            analysis_type: r.analysis_type.to_string(),
        }
    }
}

/// Recording and selection facts printed on the report.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ReportMetadata {
    pub patient_id: String,
    pub exam_date: Option<NaiveDate>,
    pub file_name: String,
    pub recording_date: Option<NaiveDateTime>,
    pub duration_seconds: f64,
    pub sampling_rate_hz: f64,
    pub num_channels: usize,
    pub channel_names: Vec<String>,
    pub selected_channels: Vec<String>,
    pub time_frame: TimeWindow,
    /// Annotations overlapping `time_frame`.
    pub annotations: Vec<Annotation>,
}

/// Everything the document generator needs.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ReportBundle {
    pub metadata: ReportMetadata,
    pub items: Vec<ReportItem>,
    pub generated_at: DateTime<Utc>,
}

impl ReportMetadata {
    /// Metadata for the session's active file and selection.
    pub fn from_session(session: &Session, exam_date: Option<NaiveDate>) -> Result<Self> {
        let rec = session.active_recording()?;
        let file_name = session.active_filename().unwrap_or_default().to_string();
        let time_frame = session.window().unwrap_or_else(|| TimeWindow::full(rec));
        let selected_channels =
            if session.channels().is_empty() { rec.channel_names() } else { session.channels().to_vec() };
        Ok(Self {
            patient_id: rec.header().patient_id.clone(),
            exam_date,
            file_name,
            recording_date: rec.start(),
            duration_seconds: rec.duration_seconds(),
            sampling_rate_hz: rec.sampling_frequency_hz(),
            num_channels: rec.n_channels(),
            channel_names: rec.channel_names(),
            selected_channels,
            time_frame,
            annotations: rec
                .annotations_in(time_frame.start_seconds, time_frame.end_seconds)
                .into_iter()
                .cloned()
                .collect(),
        })
    }
}

impl ReportBundle {
    /// Bundle the results named in `result_ids`, in session order.
    ///
    /// # Errors
    ///
    /// [`Error::UnknownResult`] for the first id not in the session, and the
    /// errors of [`ReportMetadata::from_session`].
    pub fn from_session<S: AsRef<str>>(
        session: &Session,
        result_ids: &[S],
        exam_date: Option<NaiveDate>,
    ) -> Result<Self> {
        if let Some(missing) = result_ids.iter().find(|id| session.result(id.as_ref()).is_none()) {
            return Err(Error::UnknownResult(missing.as_ref().to_string()));
        }
        let items: Vec<ReportItem> = session
            .results()
            .iter()
            .filter(|r| result_ids.iter().any(|id| id.as_ref() == r.id))
            .map(ReportItem::from)
            .collect();
        log::info!("report: {} items", items.len());
        Ok(Self { metadata: ReportMetadata::from_session(session, exam_date)?, items, generated_at: Utc::now() })
    }

    pub fn to_json(&self) -> Result<String> {
        Ok(serde_json::to_string_pretty(self)?)
    }

    pub fn write_json<P: AsRef<Path>>(&self, path: P) -> Result<()> {
        std::fs::write(path, self.to_json()?)?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn item_json_uses_base64() {
        let item = ReportItem { image_bytes: vec![1, 2, 3], caption: "PSD".into(), analysis_type: "PSD".into() };
        let v = serde_json::to_value(&item).unwrap();
        assert_eq!(v["imageBytes"], "AQID");
        assert_eq!(v["analysisType"], "PSD");
        let back: ReportItem = serde_json::from_value(v).unwrap();
        assert_eq!(back, item);
    }
}
