//! Built-in EDF/BDF decoder, the last backend in the chain.
//!
//! # Algorithm
//! 1. Parse the header record.
//! 2. Resolve the number of complete data records.
//! 3. Pick data channels: skip annotation and BDF `Status` signals, keep
//!    those sharing the first channel's sampling rate.
//! 4. Walk the records, converting each stored integer to physical units:
//!    ```text
//!    physical = digital × gain + offset
//!    gain     = (pmax − pmin) / (dmax − dmin)
//!    offset   = pmax − gain × dmax
//!    ```
//!    EDF stores 16-bit and BDF 24-bit little-endian two's complement.
//! 5. Decode TALs from the annotation signal, if any.
use anyhow::{bail, Result};
use ndarray::Array2;

use super::header::EdfHeader;
use super::{single_rate, tal, Decoded};
use crate::recording::{AnnotationDraft, Channel, HeaderInfo, SourceFormat};

/// Decode a whole file held in memory.
pub fn decode(bytes: &[u8]) -> Result<Decoded> {
    // 1. Header ------------------------------------------------------------
    let header = EdfHeader::from_bytes(bytes)?;

    // 2. Records -----------------------------------------------------------
    let n_records = header.resolve_records(bytes.len())?;
    if n_records == 0 {
        bail!("file holds no data records");
    }

    // 3. Data channels -----------------------------------------------------
    let candidates: Vec<usize> = header
        .signals
        .iter()
        .enumerate()
        .filter(|(_, s)| !s.is_annotation() && !s.is_status())
        .map(|(i, _)| i)
        .collect();
    let labels: Vec<String> = candidates.iter().map(|&i| header.signals[i].label.clone()).collect();
    let rates: Vec<f64> = candidates
        .iter()
        .map(|&i| header.signals[i].sampling_frequency(header.record_duration))
        .collect();
    let keep: Vec<usize> = single_rate(&labels, &rates)?
        .into_iter()
        .map(|k| candidates[k])
        .collect();

    // 4. Samples -----------------------------------------------------------
    let offsets = record_offsets(&header);
    let record_bytes = header.record_bytes();
    let width = header.format.sample_bytes();
    let spr = header.signals[keep[0]].samples_per_record;
    let mut samples = Array2::<f64>::zeros((keep.len(), n_records * spr));

    for (row, &si) in keep.iter().enumerate() {
        let sig = &header.signals[si];
        let (gain, offset) = (sig.gain(), sig.offset());
        let mut out = samples.row_mut(row);
        for r in 0..n_records {
            let start = header.header_bytes + r * record_bytes + offsets[si];
            let chunk = &bytes[start..start + spr * width];
            for (k, raw) in chunk.chunks_exact(width).enumerate() {
                out[r * spr + k] = digital(header.format, raw) as f64 * gain + offset;
            }
        }
    }

    // 5. Annotations -------------------------------------------------------
    let annotations = collect_annotations(&header, bytes, n_records, &offsets);

    let channels = keep
        .iter()
        .map(|&si| {
            let s = &header.signals[si];
            Channel {
                label: s.label.clone(),
                physical_dimension: s.physical_dimension.clone(),
                transducer: s.transducer.clone(),
                prefilter: s.prefilter.clone(),
            }
        })
        .collect();

    Ok(Decoded {
        format: header.format,
        channels,
        sampling_frequency_hz: rates[0],
        samples,
        start: header.start,
        header: header_info(&header, n_records),
        annotations,
    })
}

/// Decode only the annotation signal.  Used by backends that do not expose
/// the raw TAL bytes.
pub fn read_annotations(bytes: &[u8]) -> Result<Vec<AnnotationDraft>> {
    let header = EdfHeader::from_bytes(bytes)?;
    let n_records = header.resolve_records(bytes.len())?;
    let offsets = record_offsets(&header);
    Ok(collect_annotations(&header, bytes, n_records, &offsets))
}

/// Header text fields only, for backends that do not expose them.
pub(crate) fn header_info_from_bytes(bytes: &[u8]) -> Result<HeaderInfo> {
    let header = EdfHeader::from_bytes(bytes)?;
    let n_records = header.resolve_records(bytes.len())?;
    Ok(header_info(&header, n_records))
}

fn header_info(header: &EdfHeader, n_records: usize) -> HeaderInfo {
    HeaderInfo {
        patient_id: header.patient_id.clone(),
        recording_id: header.recording_id.clone(),
        data_records: n_records,
        record_duration_seconds: header.record_duration,
    }
}

/// Byte offset of each signal inside one data record.
fn record_offsets(header: &EdfHeader) -> Vec<usize> {
    let width = header.format.sample_bytes();
    let mut acc = 0;
    header
        .signals
        .iter()
        .map(|s| {
            let off = acc;
            acc += s.samples_per_record * width;
            off
        })
        .collect()
}

fn collect_annotations(
    header: &EdfHeader,
    bytes: &[u8],
    n_records: usize,
    offsets: &[usize],
) -> Vec<AnnotationDraft> {
    let width = header.format.sample_bytes();
    let record_bytes = header.record_bytes();
    let mut out = Vec::new();
    for (si, sig) in header.signals.iter().enumerate().filter(|(_, s)| s.is_annotation()) {
        let len = sig.samples_per_record * width;
        for r in 0..n_records {
            let start = header.header_bytes + r * record_bytes + offsets[si];
            out.extend(tal::parse_record(&bytes[start..start + len]));
        }
    }
    out
}

fn digital(format: SourceFormat, raw: &[u8]) -> i32 {
    match format {
        SourceFormat::Edf => i16::from_le_bytes([raw[0], raw[1]]) as i32,
        // Sign-extend 24 → 32 bits.
        SourceFormat::Bdf => i32::from_le_bytes([0, raw[0], raw[1], raw[2]]) >> 8,
    }
}
