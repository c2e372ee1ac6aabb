//! EDF / BDF header record.
//!
//! Fixed part (256 bytes, ASCII, space-padded):
//! ```text
//!   8  version          "0" (EDF) or 0xFF "BIOSEMI" (BDF)
//!  80  patient id
//!  80  recording id
//!   8  start date       dd.mm.yy
//!   8  start time       hh.mm.ss
//!   8  header bytes     256 × (ns + 1)
//!  44  reserved         "EDF+C"/"EDF+D", "BDF+C", "24BIT", …
//!   8  data records     -1 if unknown
//!   8  record duration  seconds
//!   4  ns               number of signals
//! ```
//! followed by `ns` entries of each per-signal field, field by field
//! (all labels, then all transducers, …), 256 bytes per signal in total.
use anyhow::{bail, Context, Result};
use chrono::{NaiveDate, NaiveDateTime, NaiveTime};

use crate::recording::SourceFormat;

pub const FIXED_HEADER_BYTES: usize = 256;
pub const SIGNAL_HEADER_BYTES: usize = 256;

/// Labels of the EDF+/BDF+ annotation channel.
const ANNOTATION_LABELS: [&str; 2] = ["EDF Annotations", "BDF Annotations"];

/// Recognise the container from the version field.
pub fn sniff_format(bytes: &[u8]) -> Option<SourceFormat> {
    if bytes.len() < 8 {
        return None;
    }
    if bytes[0] == 0xFF && &bytes[1..8] == b"BIOSEMI" {
        return Some(SourceFormat::Bdf);
    }
    if bytes[0] == b'0' && bytes[1..8].iter().all(|&b| b == b' ') {
        return Some(SourceFormat::Edf);
    }
    None
}

/// One signal's header entry.
#[derive(Debug, Clone, PartialEq)]
pub struct SignalHeader {
    pub label: String,
    pub transducer: String,
    pub physical_dimension: String,
    pub physical_min: f64,
    pub physical_max: f64,
    pub digital_min: i64,
    pub digital_max: i64,
    pub prefilter: String,
    pub samples_per_record: usize,
}

impl SignalHeader {
    pub fn is_annotation(&self) -> bool {
        ANNOTATION_LABELS.contains(&self.label.as_str())
    }

    /// BioSemi trigger/status channel.  Not EEG.
    pub fn is_status(&self) -> bool {
        self.label.eq_ignore_ascii_case("Status")
    }

    pub fn gain(&self) -> f64 {
        (self.physical_max - self.physical_min) / (self.digital_max - self.digital_min) as f64
    }

    pub fn offset(&self) -> f64 {
        self.physical_max - self.gain() * self.digital_max as f64
    }

    pub fn sampling_frequency(&self, record_duration: f64) -> f64 {
        self.samples_per_record as f64 / record_duration
    }
}

/// Parsed header of an EDF, EDF+, BDF or BDF+ file.
#[derive(Debug, Clone, PartialEq)]
pub struct EdfHeader {
    pub format: SourceFormat,
    pub patient_id: String,
    pub recording_id: String,
    pub start: Option<NaiveDateTime>,
    pub header_bytes: usize,
    pub reserved: String,
    /// `-1` when the writer did not know the count.
    pub data_records: i64,
    pub record_duration: f64,
    pub signals: Vec<SignalHeader>,
}

impl EdfHeader {
    /// Parse the header at the start of `bytes`.
    pub fn from_bytes(bytes: &[u8]) -> Result<Self> {
        let format = sniff_format(bytes)
            .context("unrecognised version field (expected EDF \"0\" or BDF 0xFF \"BIOSEMI\")")?;
        if bytes.len() < FIXED_HEADER_BYTES {
            bail!("header truncated: {} bytes, need {FIXED_HEADER_BYTES}", bytes.len());
        }

        let patient_id = ascii(&bytes[8..88]);
        let recording_id = ascii(&bytes[88..168]);
        let start = parse_start(&ascii(&bytes[168..176]), &ascii(&bytes[176..184]));
        let header_bytes: usize = number(&bytes[184..192], "header bytes")?;
        let reserved = ascii(&bytes[192..236]);
        let data_records: i64 = number(&bytes[236..244], "number of data records")?;
        let record_duration: f64 = number(&bytes[244..252], "data record duration")?;
        let ns: usize = number(&bytes[252..256], "number of signals")?;

        if ns == 0 {
            bail!("header declares no signals");
        }
        let expected = FIXED_HEADER_BYTES + ns * SIGNAL_HEADER_BYTES;
        if header_bytes != expected {
            bail!("header size field is {header_bytes}, expected {expected} for {ns} signals");
        }
        if bytes.len() < expected {
            bail!("header truncated: {} bytes, need {expected}", bytes.len());
        }
        if !(record_duration > 0.0 && record_duration.is_finite()) {
            bail!("data record duration must be positive, got {record_duration}");
        }

        // Per-signal fields are stored column-wise.
        let mut cursor = FIXED_HEADER_BYTES;
        let labels = column(bytes, &mut cursor, ns, 16);
        let transducers = column(bytes, &mut cursor, ns, 80);
        let dims = column(bytes, &mut cursor, ns, 8);
        let pmins = column(bytes, &mut cursor, ns, 8);
        let pmaxs = column(bytes, &mut cursor, ns, 8);
        let dmins = column(bytes, &mut cursor, ns, 8);
        let dmaxs = column(bytes, &mut cursor, ns, 8);
        let prefilters = column(bytes, &mut cursor, ns, 80);
        let sprs = column(bytes, &mut cursor, ns, 8);

        let mut signals = Vec::with_capacity(ns);
        for i in 0..ns {
            let label = ascii(labels[i]);
            let sig = SignalHeader {
                physical_min: number(pmins[i], "physical minimum")?,
                physical_max: number(pmaxs[i], "physical maximum")?,
                digital_min: number(dmins[i], "digital minimum")?,
                digital_max: number(dmaxs[i], "digital maximum")?,
                samples_per_record: number(sprs[i], "samples per record")?,
                transducer: ascii(transducers[i]),
                physical_dimension: ascii(dims[i]),
                prefilter: ascii(prefilters[i]),
                label,
            };
            if sig.digital_max <= sig.digital_min {
                bail!("signal '{}': digital max {} <= min {}", sig.label, sig.digital_max, sig.digital_min);
            }
            if sig.samples_per_record == 0 {
                bail!("signal '{}': zero samples per record", sig.label);
            }
            signals.push(sig);
        }

        log::debug!(
            "{format:?} header: {ns} signals, {data_records} records of {record_duration} s"
        );

        Ok(Self {
            format,
            patient_id,
            recording_id,
            start,
            header_bytes,
            reserved,
            data_records,
            record_duration,
            signals,
        })
    }

    /// Bytes in one data record.
    pub fn record_bytes(&self) -> usize {
        let width = self.format.sample_bytes();
        self.signals.iter().map(|s| s.samples_per_record * width).sum()
    }

    /// `EDF+`/`BDF+` files may carry an annotation channel.
    pub fn is_plus(&self) -> bool {
        self.reserved.starts_with("EDF+") || self.reserved.starts_with("BDF+")
    }

    /// Number of complete records, resolving `-1` from the payload size.
    pub fn resolve_records(&self, total_len: usize) -> Result<usize> {
        let payload = total_len.saturating_sub(self.header_bytes);
        let record_bytes = self.record_bytes();
        let available = payload / record_bytes;
        if self.data_records < 0 {
            return Ok(available);
        }
        let declared = self.data_records as usize;
        if available < declared {
            bail!(
                "data truncated: header declares {declared} records of {record_bytes} bytes, file holds {available}"
            );
        }
        Ok(declared)
    }
}

fn column<'a>(bytes: &'a [u8], cursor: &mut usize, ns: usize, width: usize) -> Vec<&'a [u8]> {
    let start = *cursor;
    *cursor += ns * width;
    (0..ns).map(|i| &bytes[start + i * width..start + (i + 1) * width]).collect()
}

fn ascii(raw: &[u8]) -> String {
    String::from_utf8_lossy(raw).trim().to_string()
}

fn number<T: std::str::FromStr>(raw: &[u8], what: &str) -> Result<T> {
    let s = ascii(raw);
    s.parse::<T>()
        .map_err(|_| anyhow::anyhow!("invalid {what} field '{s}'"))
}

/// `dd.mm.yy` + `hh.mm.ss`; years 85–99 are 19xx, the rest 20xx.
fn parse_start(date: &str, time: &str) -> Option<NaiveDateTime> {
    let d: Vec<u32> = date.split('.').filter_map(|p| p.trim().parse().ok()).collect();
    let t: Vec<u32> = time.split('.').filter_map(|p| p.trim().parse().ok()).collect();
    if d.len() != 3 || t.len() != 3 {
        log::debug!("unparseable start date/time '{date}' '{time}'");
        return None;
    }
    let year = if d[2] >= 85 { 1900 + d[2] } else { 2000 + d[2] };
    let date = NaiveDate::from_ymd_opt(year as i32, d[1], d[0])?;
    let time = NaiveTime::from_hms_opt(t[0], t[1], t[2])?;
    Some(date.and_time(time))
}
