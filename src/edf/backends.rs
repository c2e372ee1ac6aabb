//! Backend implementations of [`Reader`].
//!
//! The two third-party readers only open paths, so the in-memory bytes are
//! written to a named temporary file first.  Both are EDF-only; BDF goes
//! straight to the built-in parser.
use anyhow::{anyhow, bail, Context, Result};
use edf_reader::sync_reader::SyncEDFReader;
use local_edf_reader::LocalFileReader;
use ndarray::Array2;
use std::io::Write;
use tempfile::NamedTempFile;

use super::{native, single_rate, Decoded, Reader};
use crate::recording::{AnnotationDraft, Channel, SourceFormat};

/// Hundred-nanosecond ticks per second used by `edfplus`.
const EDFPLUS_TICKS: f64 = 10_000_000.0;

fn spill(bytes: &[u8], filename: &str) -> Result<NamedTempFile> {
    let suffix = std::path::Path::new(filename)
        .extension()
        .map(|e| format!(".{}", e.to_string_lossy()))
        .unwrap_or_else(|| ".edf".to_string());
    let mut tmp = tempfile::Builder::new()
        .prefix("eegkit-")
        .suffix(&suffix)
        .tempfile()
        .context("create temporary file")?;
    tmp.write_all(bytes).context("write temporary file")?;
    tmp.flush()?;
    Ok(tmp)
}

// ── edfplus ───────────────────────────────────────────────────────────────

/// Primary backend: the `edfplus` crate (EDF+ with annotations).
pub struct EdfPlusBackend;

impl Reader for EdfPlusBackend {
    fn name(&self) -> &'static str {
        "edfplus"
    }

    fn supports(&self, format: SourceFormat) -> bool {
        format == SourceFormat::Edf
    }

    fn decode(&self, bytes: &[u8], filename: &str) -> Result<Decoded> {
        let tmp = spill(bytes, filename)?;
        let path = tmp.path().to_string_lossy().into_owned();
        let mut reader = edfplus::EdfReader::open(&path).map_err(|e| anyhow!("{e:?}"))?;

        let (signals, start, record_ticks, n_records, patient) = {
            let h = reader.header();
            let signals: Vec<(Channel, i64, i32)> = h
                .signals
                .iter()
                .map(|s| {
                    let ch = Channel {
                        label: s.label.clone(),
                        physical_dimension: s.physical_dimension.clone(),
                        transducer: s.transducer.clone(),
                        prefilter: s.prefilter.clone(),
                    };
                    (ch, s.samples_in_file, s.samples_per_record)
                })
                .collect();
            (
                signals,
                h.start_date.and_time(h.start_time),
                h.datarecord_duration,
                h.datarecords_in_file,
                h.patient_code.clone(),
            )
        };
        if record_ticks <= 0 {
            bail!("record duration {record_ticks} ticks");
        }
        let record_seconds = record_ticks as f64 / EDFPLUS_TICKS;

        let annotations: Vec<AnnotationDraft> = reader
            .annotations()
            .iter()
            .map(|a| AnnotationDraft {
                onset_seconds: a.onset as f64 / EDFPLUS_TICKS,
                duration_seconds: if a.duration >= 0 { a.duration as f64 / EDFPLUS_TICKS } else { 0.0 },
                description: a.description.clone(),
                experiment: None,
            })
            .collect();

        let data_idx: Vec<usize> = (0..signals.len())
            .filter(|&i| !signals[i].0.label.contains("Annotations"))
            .collect();
        let labels: Vec<String> = data_idx.iter().map(|&i| signals[i].0.label.clone()).collect();
        let rates: Vec<f64> = data_idx
            .iter()
            .map(|&i| signals[i].2 as f64 / record_seconds)
            .collect();
        let keep: Vec<usize> = single_rate(&labels, &rates)?.into_iter().map(|k| data_idx[k]).collect();

        let n_t = signals[keep[0]].1.max(0) as usize;
        let mut samples = Array2::<f64>::zeros((keep.len(), n_t));
        for (row, &idx) in keep.iter().enumerate() {
            let values = reader.read_physical_samples(idx, n_t).map_err(|e| anyhow!("{e:?}"))?;
            if values.len() != n_t {
                bail!("channel '{}': read {} of {n_t} samples", signals[idx].0.label, values.len());
            }
            samples.row_mut(row).assign(&ndarray::ArrayView1::from(&values[..]));
        }

        let mut header = native::header_info_from_bytes(bytes).unwrap_or_default();
        header.patient_id = patient;
        header.data_records = n_records.max(0) as usize;
        header.record_duration_seconds = record_seconds;

        Ok(Decoded {
            format: SourceFormat::Edf,
            channels: keep.iter().map(|&i| signals[i].0.clone()).collect(),
            sampling_frequency_hz: rates[0],
            samples,
            start: Some(start),
            header,
            annotations,
        })
    }
}

// ── edf-reader ────────────────────────────────────────────────────────────

/// Secondary backend: the `edf-reader` crate (plain EDF).
pub struct EdfReaderBackend;

impl Reader for EdfReaderBackend {
    fn name(&self) -> &'static str {
        "edf-reader"
    }

    fn supports(&self, format: SourceFormat) -> bool {
        format == SourceFormat::Edf
    }

    fn decode(&self, bytes: &[u8], filename: &str) -> Result<Decoded> {
        let tmp = spill(bytes, filename)?;
        let path = tmp.path().to_string_lossy().into_owned();
        let reader: SyncEDFReader<LocalFileReader> =
            local_edf_reader::init_sync_reader(&path).context("open with edf-reader")?;

        let header = &reader.edf_header;
        let block_ms = header.block_duration;
        if block_ms == 0 {
            bail!("zero block duration");
        }
        let total_ms = header.number_of_blocks * block_ms;

        let data_idx: Vec<usize> = header
            .channels
            .iter()
            .enumerate()
            .filter(|(_, c)| !c.label.contains("Annotations"))
            .map(|(i, _)| i)
            .collect();
        let labels: Vec<String> = data_idx.iter().map(|&i| header.channels[i].label.clone()).collect();
        let rates: Vec<f64> = data_idx
            .iter()
            .map(|&i| header.channels[i].number_of_samples_in_data_record as f64 * 1000.0 / block_ms as f64)
            .collect();
        let keep = single_rate(&labels, &rates)?;

        let data = reader.read_data_window(0, total_ms).context("read data window")?;
        let n_t = data.get(data_idx[keep[0]]).map(|v| v.len()).unwrap_or(0);
        let mut samples = Array2::<f64>::zeros((keep.len(), n_t));
        for (row, &k) in keep.iter().enumerate() {
            let ch = data
                .get(data_idx[k])
                .ok_or_else(|| anyhow!("channel '{}' missing from data", labels[k]))?;
            if ch.len() != n_t {
                bail!("channel '{}' has {} samples, expected {n_t}", labels[k], ch.len());
            }
            for (dst, &v) in samples.row_mut(row).iter_mut().zip(ch) {
                *dst = v as f64;
            }
        }

        // The crate exposes decoded floats only; annotations and header text
        // come from the raw bytes.
        let annotations = native::read_annotations(bytes).unwrap_or_else(|e| {
            log::debug!("{filename}: no annotations recovered: {e:#}");
            Vec::new()
        });
        let parsed = super::EdfHeader::from_bytes(bytes).ok();

        Ok(Decoded {
            format: SourceFormat::Edf,
            channels: keep.iter().map(|&k| Channel::new(&labels[k])).collect(),
            sampling_frequency_hz: rates[0],
            samples,
            start: parsed.as_ref().and_then(|h| h.start),
            header: native::header_info_from_bytes(bytes).unwrap_or_default(),
            annotations,
        })
    }
}

// ── Built-in ──────────────────────────────────────────────────────────────

/// Last-resort backend: the built-in EDF/BDF parser.
pub struct NativeBackend;

impl Reader for NativeBackend {
    fn name(&self) -> &'static str {
        "native"
    }

    fn supports(&self, _format: SourceFormat) -> bool {
        true
    }

    fn decode(&self, bytes: &[u8], _filename: &str) -> Result<Decoded> {
        native::decode(bytes)
    }
}
