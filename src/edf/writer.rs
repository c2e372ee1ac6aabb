//! EDF+ export.
//!
//! Writes a recording as 16-bit EDF+C with one-second data records and an
//! `EDF Annotations` signal:
//!
//! 1. Drop excluded channels (`Status`, `TimeStamp` by default).
//! 2. Optionally re-reference the kept channels to their common average,
//!    unless the recording was average-referenced on load.
//! 3. Per channel, the physical range is the data range (widened to hold
//!    zero, the padding value) rounded outwards to what fits an
//!    8-character header field; the digital range is the full `i16` range:
//!    ```text
//!    digital = round((physical − offset) / gain)
//!    gain    = (pmax − pmin) / 65535
//!    offset  = pmax − gain × 32767
//!    ```
//! 4. Every annotation record starts with a time-keeping TAL; each
//!    annotation goes into the record holding its onset.
//! 5. The last data record is padded with zeros.
//!
//! Imported experiment names have no slot in a TAL and are not written.
use chrono::NaiveDateTime;
use ndarray::Array2;

use super::header::{FIXED_HEADER_BYTES, SIGNAL_HEADER_BYTES};
use crate::config::{BdfReferencing, ExportOptions};
use crate::error::{Error, Result};
use crate::recording::{Annotation, Channel, Recording};

const DIGITAL_MIN: i64 = -32768;
const DIGITAL_MAX: i64 = 32767;
const ANNOTATION_LABEL: &str = "EDF Annotations";

/// One output signal's header values.
struct SignalSpec {
    label: String,
    transducer: String,
    dimension: String,
    prefilter: String,
    physical_min: String,
    physical_max: String,
    samples_per_record: usize,
}

/// Encode `recording` as EDF+ bytes.
///
/// # Errors
///
/// [`Error::InvalidParameter`] when every channel is excluded, there are
/// no samples, the sampling rate is not a whole number of Hz, or a
/// channel's range does not fit the header.
pub fn write_edf(recording: &Recording, options: &ExportOptions) -> Result<Vec<u8>> {
    // 1. Channels ----------------------------------------------------------
    let keep: Vec<usize> = recording
        .channels()
        .iter()
        .enumerate()
        .filter(|(_, c)| !options.drops(&c.label))
        .map(|(i, _)| i)
        .collect();
    if keep.is_empty() {
        return Err(Error::param("every channel is excluded from the export"));
    }
    let dropped = recording.n_channels() - keep.len();
    if dropped > 0 {
        log::info!("export: dropping {dropped} excluded channels");
    }

    let fs = recording.sampling_frequency_hz();
    if (fs - fs.round()).abs() > 1e-9 || fs < 1.0 {
        return Err(Error::param(format!("export needs a whole-Hz sampling rate, got {fs}")));
    }
    let spr = fs.round() as usize;
    if recording.n_samples() == 0 {
        return Err(Error::param("recording holds no samples"));
    }

    // 2. Referencing -------------------------------------------------------
    let mut data: Array2<f64> = recording.samples().select(ndarray::Axis(0), &keep);
    if options.average_reference {
        if recording.referencing() == Some(BdfReferencing::Average) {
            log::info!("export: already average-referenced, leaving samples as they are");
        } else {
            crate::reference::average_reference_inplace(&mut data);
        }
    }

    // 3. Signal headers ----------------------------------------------------
    let channels: Vec<&Channel> = keep.iter().map(|&i| &recording.channels()[i]).collect();
    let mut specs = Vec::with_capacity(keep.len() + 1);
    let mut scales = Vec::with_capacity(keep.len());
    for (ch, row) in channels.iter().zip(data.outer_iter()) {
        let lo = row.iter().copied().fold(f64::INFINITY, f64::min).min(0.0);
        let hi = row.iter().copied().fold(f64::NEG_INFINITY, f64::max).max(0.0);
        let (pmin, pmax, pmin_text, pmax_text) = physical_range(lo, hi)
            .ok_or_else(|| Error::param(format!("channel '{}': range [{lo}, {hi}] does not fit EDF", ch.label)))?;
        let gain = (pmax - pmin) / (DIGITAL_MAX - DIGITAL_MIN) as f64;
        scales.push((gain, pmax - gain * DIGITAL_MAX as f64));
        specs.push(SignalSpec {
            label: ch.label.clone(),
            transducer: ch.transducer.clone(),
            dimension: ch.physical_dimension.clone(),
            prefilter: ch.prefilter.clone(),
            physical_min: pmin_text,
            physical_max: pmax_text,
            samples_per_record: spr,
        });
    }

    // 4. Annotation records ----------------------------------------------
    let n_records = recording.n_samples().div_ceil(spr);
    let tals = annotation_records(recording.annotations(), n_records);
    let tal_bytes = tals.iter().map(Vec::len).max().unwrap_or(0).div_ceil(2) * 2;
    specs.push(SignalSpec {
        label: ANNOTATION_LABEL.into(),
        transducer: String::new(),
        dimension: String::new(),
        prefilter: String::new(),
        physical_min: "-1".into(),
        physical_max: "1".into(),
        samples_per_record: tal_bytes / 2,
    });

    let mut out = header(recording, &specs, n_records);
    let record_bytes: usize = specs.iter().map(|s| s.samples_per_record * 2).sum();
    out.reserve(n_records * record_bytes);

    // 5. Data records ------------------------------------------------------
    for (r, tal) in tals.iter().enumerate() {
        for (row, &(gain, offset)) in data.outer_iter().zip(&scales) {
            for k in 0..spr {
                let v = row.get(r * spr + k).copied().unwrap_or(0.0);
                let d = ((v - offset) / gain).round().clamp(DIGITAL_MIN as f64, DIGITAL_MAX as f64);
                out.extend_from_slice(&(d as i16).to_le_bytes());
            }
        }
        let start = out.len();
        out.extend_from_slice(tal);
        out.resize(start + tal_bytes, 0);
    }

    log::debug!(
        "export: {} signals, {n_records} records, {tal_bytes} annotation bytes per record",
        specs.len()
    );
    Ok(out)
}

/// `(pmin, pmax)` rounded outwards to the most decimals that fit 8
/// characters, with their header text.  A flat channel gets a unit range.
fn physical_range(lo: f64, hi: f64) -> Option<(f64, f64, String, String)> {
    if !(lo.is_finite() && hi.is_finite()) {
        return None;
    }
    let hi = if hi - lo < 1e-9 { lo + 1.0 } else { hi };
    for prec in (0..=6).rev() {
        let scale = 10f64.powi(prec);
        let (pmin, pmax) = ((lo * scale).floor() / scale, (hi * scale).ceil() / scale);
        let (a, b) = (decimal(pmin, prec as usize), decimal(pmax, prec as usize));
        if a.len() <= 8 && b.len() <= 8 && pmax > pmin {
            // The reader parses the text, so encode with the same values.
            return Some((a.parse().ok()?, b.parse().ok()?, a, b));
        }
    }
    None
}

/// Fixed-point text without trailing zeros or a negative zero.
fn decimal(v: f64, prec: usize) -> String {
    let s = format!("{v:.prec$}");
    let s = if s.contains('.') { s.trim_end_matches('0').trim_end_matches('.').to_string() } else { s };
    if s == "-0" {
        "0".into()
    } else {
        s
    }
}

/// TAL bytes of every data record.
fn annotation_records(annotations: &[Annotation], n_records: usize) -> Vec<Vec<u8>> {
    let mut records: Vec<Vec<u8>> = (0..n_records).map(|r| format!("+{r}\x14\x14\x00").into_bytes()).collect();
    let Some(last) = n_records.checked_sub(1) else { return records };
    for a in annotations {
        let r = (a.onset_seconds.max(0.0).floor() as usize).min(last);
        let text: String = a.description.chars().filter(|&c| c != '\x14' && c != '\x00').collect();
        let mut tal = format!("+{}", decimal(a.onset_seconds.max(0.0), 6));
        if a.duration_seconds > 0.0 {
            tal.push('\x15');
            tal.push_str(&decimal(a.duration_seconds, 6));
        }
        tal.push('\x14');
        tal.push_str(&text);
        tal.push_str("\x14\x00");
        records[r].extend_from_slice(tal.as_bytes());
    }
    records
}

fn header(recording: &Recording, specs: &[SignalSpec], n_records: usize) -> Vec<u8> {
    let ns = specs.len();
    let mut h = Vec::with_capacity(FIXED_HEADER_BYTES + ns * SIGNAL_HEADER_BYTES);
    let info = recording.header();
    let start = recording.start();

    field(&mut h, "0", 8);
    field(&mut h, non_empty(&info.patient_id, "X X X X"), 80);
    let recording_id = match (info.recording_id.is_empty(), start) {
        (false, _) => info.recording_id.clone(),
        (true, Some(t)) => format!("Startdate {} X X X", t.format("%d-%b-%Y").to_string().to_uppercase()),
        (true, None) => "Startdate X X X X".into(),
    };
    field(&mut h, &recording_id, 80);
    let (date, time) = start_fields(start);
    field(&mut h, &date, 8);
    field(&mut h, &time, 8);
    field(&mut h, &(FIXED_HEADER_BYTES + ns * SIGNAL_HEADER_BYTES).to_string(), 8);
    field(&mut h, "EDF+C", 44);
    field(&mut h, &n_records.to_string(), 8);
    field(&mut h, "1", 8);
    field(&mut h, &ns.to_string(), 4);

    // Per-signal fields are stored column-wise.
    let columns: [(usize, fn(&SignalSpec) -> String); 10] = [
        (16, |s| s.label.clone()),
        (80, |s| s.transducer.clone()),
        (8, |s| s.dimension.clone()),
        (8, |s| s.physical_min.clone()),
        (8, |s| s.physical_max.clone()),
        (8, |_| DIGITAL_MIN.to_string()),
        (8, |_| DIGITAL_MAX.to_string()),
        (80, |s| s.prefilter.clone()),
        (8, |s| s.samples_per_record.to_string()),
        (32, |_| String::new()),
    ];
    for (width, value) in columns {
        for s in specs {
            field(&mut h, &value(s), width);
        }
    }
    h
}

fn start_fields(start: Option<NaiveDateTime>) -> (String, String) {
    match start {
        Some(t) => (t.format("%d.%m.%y").to_string(), t.format("%H.%M.%S").to_string()),
        None => ("01.01.85".into(), "00.00.00".into()),
    }
}

fn non_empty<'a>(value: &'a str, fallback: &'a str) -> &'a str {
    if value.trim().is_empty() {
        fallback
    } else {
        value
    }
}

/// Left-aligned, space-padded printable-ASCII field.
fn field(out: &mut Vec<u8>, text: &str, width: usize) {
    let mut b: Vec<u8> = text
        .chars()
        .map(|c| if c.is_ascii_graphic() || c == ' ' { c as u8 } else { b'_' })
        .take(width)
        .collect();
    b.resize(width, b' ');
    out.extend(b);
}
