//! EDF+/BDF+ Time-stamped Annotation Lists (TALs).
//!
//! Each data record of the annotation signal holds one or more TALs:
//! ```text
//! +onset[\x15duration]\x14[text\x14]*\x00
//! ```
//! The first TAL of every record only keeps time (no texts) and yields no
//! annotation.  Unused bytes at the end of a record are `\x00`.
use crate::recording::AnnotationDraft;

const ONSET_END: u8 = 0x14;
const DURATION_MARK: u8 = 0x15;

/// Decode every TAL in one record of the annotation signal.
pub fn parse_record(raw: &[u8]) -> Vec<AnnotationDraft> {
    let mut out = Vec::new();
    for tal in raw.split(|&b| b == 0).filter(|t| !t.is_empty()) {
        let mut fields = tal.split(|&b| b == ONSET_END);
        let Some(timing) = fields.next() else { continue };
        let (onset_raw, duration_raw) = match timing.iter().position(|&b| b == DURATION_MARK) {
            Some(i) => (&timing[..i], Some(&timing[i + 1..])),
            None => (timing, None),
        };
        let Some(onset) = parse_seconds(onset_raw) else {
            log::debug!("skipping TAL with bad onset {:?}", String::from_utf8_lossy(onset_raw));
            continue;
        };
        let duration = duration_raw.and_then(parse_seconds).unwrap_or(0.0);
        if onset < 0.0 {
            log::warn!("dropping annotation with negative onset {onset} s");
            continue;
        }
        for text in fields.filter(|t| !t.is_empty()) {
            out.push(AnnotationDraft {
                onset_seconds: onset,
                duration_seconds: duration.max(0.0),
                description: String::from_utf8_lossy(text).trim().to_string(),
                experiment: None,
            });
        }
    }
    out
}

fn parse_seconds(raw: &[u8]) -> Option<f64> {
    let s = std::str::from_utf8(raw).ok()?.trim();
    if s.is_empty() {
        return None;
    }
    s.trim_start_matches('+').parse::<f64>().ok()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn timekeeping_tal_yields_nothing() {
        assert!(parse_record(b"+0\x14\x14\x00\x00\x00").is_empty());
    }

    #[test]
    fn onset_duration_and_multiple_texts() {
        let rec = b"+1\x14\x14\x00+1.5\x152.25\x14Eyes closed\x14Blink\x14\x00\x00";
        let anns = parse_record(rec);
        assert_eq!(anns.len(), 2);
        assert_eq!(anns[0].onset_seconds, 1.5);
        assert_eq!(anns[0].duration_seconds, 2.25);
        assert_eq!(anns[0].description, "Eyes closed");
        assert_eq!(anns[1].description, "Blink");
    }

    #[test]
    fn missing_duration_is_zero() {
        let anns = parse_record(b"+12.5\x14Stim on\x14\x00");
        assert_eq!(anns.len(), 1);
        assert_eq!(anns[0].duration_seconds, 0.0);
    }

    #[test]
    fn negative_onset_dropped() {
        assert!(parse_record(b"-3\x14pre\x14\x00").is_empty());
    }
}
