//! Annotation import from CSV.
//!
//! Expected layout, header row required:
//! ```text
//! experiment,start_time,duration,label
//! SSVEP_10Hz,12.0,30.0,block_1
//! ```
//! The delimiter is whichever of `,` `;` tab splits the header into the
//! most columns.  Header names are matched case-insensitively against a
//! few aliases (`onset` for `start_time`, `dur` for `duration`, …).  Times
//! are seconds from the start of the recording; `sync_offset` is added to
//! every start time.
//!
//! Fields may be wrapped in double quotes, which protects delimiters inside
//! them; `""` inside a quoted field is a literal quote.  A quoted field
//! cannot span lines.
use crate::error::{Error, Result};
use crate::recording::AnnotationDraft;

const DELIMITERS: [char; 3] = [',', ';', '\t'];

const EXPERIMENT: &[&str] = &["experiment", "exp", "condition"];
const START: &[&str] = &["start_time", "start", "onset", "begin", "time"];
const DURATION: &[&str] = &["duration", "length", "dur"];
const LABEL: &[&str] = &["label", "name", "description"];

/// Parse annotation rows.  Returns drafts in file order.
pub fn parse_csv_annotations(text: &str, sync_offset: f64) -> Result<Vec<AnnotationDraft>> {
    let mut lines = text
        .lines()
        .enumerate()
        .map(|(i, l)| (i + 1, l.trim()))
        .filter(|(_, l)| !l.is_empty());

    let (_, header_line) = lines.next().ok_or(Error::Csv { line: 1, message: "empty file".into() })?;
    let delimiter = DELIMITERS
        .iter()
        .copied()
        .max_by_key(|d| split(header_line, *d).len())
        .unwrap_or(',');
    let header: Vec<String> = split(header_line, delimiter).iter().map(|c| c.to_lowercase()).collect();

    let find = |aliases: &[&str]| header.iter().position(|h| aliases.contains(&h.as_str()));
    let missing = |name: &str| Error::Csv {
        line: 1,
        message: format!("no '{name}' column in header {header:?}"),
    };
    let exp_col = find(EXPERIMENT).ok_or_else(|| missing("experiment"))?;
    let start_col = find(START).ok_or_else(|| missing("start_time"))?;
    let dur_col = find(DURATION).ok_or_else(|| missing("duration"))?;
    let label_col = find(LABEL);

    let mut out: Vec<AnnotationDraft> = Vec::new();
    for (line, raw) in lines {
        let row = split(raw, delimiter);
        if row.len() != header.len() {
            log::warn!("annotation CSV line {line}: {} columns, expected {}; skipped", row.len(), header.len());
            continue;
        }
        let number = |col: usize, what: &str| -> Result<f64> {
            row[col].parse::<f64>().ok().filter(|v| v.is_finite()).ok_or_else(|| Error::Csv {
                line,
                message: format!("{what} '{}' is not a number", row[col]),
            })
        };
        let start = number(start_col, "start_time")?;
        let duration = number(dur_col, "duration")?;
        if start < 0.0 {
            return Err(Error::Csv { line, message: format!("negative start_time {start}") });
        }
        if duration <= 0.0 {
            return Err(Error::Csv { line, message: format!("non-positive duration {duration}") });
        }
        let label = label_col
            .map(|c| row[c].clone())
            .filter(|l| !l.is_empty())
            .unwrap_or_else(|| format!("Period_{}", out.len() + 1));
        let onset = start + sync_offset;
        if onset < 0.0 {
            return Err(Error::Csv {
                line,
                message: format!("sync offset {sync_offset} moves start {start} before the recording"),
            });
        }
        if out.iter().any(|d| (d.onset_seconds - onset).abs() < 1e-3 && (d.duration_seconds - duration).abs() < 1e-3) {
            log::warn!("annotation CSV line {line}: duplicate period at {onset} s");
        }
        out.push(AnnotationDraft {
            onset_seconds: onset,
            duration_seconds: duration,
            description: label,
            experiment: Some(row[exp_col].clone()).filter(|e| !e.is_empty()),
        });
    }

    if out.is_empty() {
        return Err(Error::Csv { line: 1, message: "no data rows".into() });
    }
    log::debug!("parsed {} annotation rows (delimiter {delimiter:?})", out.len());
    Ok(out)
}

/// Split one line into trimmed fields, honouring double quotes.
fn split(line: &str, delimiter: char) -> Vec<String> {
    let mut fields = Vec::new();
    let mut field = String::new();
    let mut quoted = false;
    let mut chars = line.chars().peekable();
    while let Some(c) = chars.next() {
        match c {
            '"' if quoted && chars.peek() == Some(&'"') => {
                field.push('"');
                chars.next();
            }
            '"' if quoted => quoted = false,
            '"' if field.trim().is_empty() => {
                field.clear();
                quoted = true;
            }
            c if c == delimiter && !quoted => fields.push(finish(&mut field)),
            c => field.push(c),
        }
    }
    fields.push(finish(&mut field));
    fields
}

fn finish(field: &mut String) -> String {
    let out = field.trim().trim_matches('\'').to_string();
    field.clear();
    out
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_standard_layout() {
        let csv = "experiment,start_time,duration,label\nA,10,5,first\nA,20.5,5,second\n";
        let rows = parse_csv_annotations(csv, 0.0).unwrap();
        assert_eq!(rows.len(), 2);
        assert_eq!(rows[1].onset_seconds, 20.5);
        assert_eq!(rows[0].description, "first");
        assert_eq!(rows[0].experiment.as_deref(), Some("A"));
    }

    #[test]
    fn semicolon_and_aliases() {
        let csv = "Condition;Onset;Dur\n\"40Hz\";1.0;2.0\n";
        let rows = parse_csv_annotations(csv, 0.5).unwrap();
        assert_eq!(rows[0].onset_seconds, 1.5);
        assert_eq!(rows[0].description, "Period_1");
    }

    #[test]
    fn rejects_bad_values_with_line() {
        let csv = "experiment,start_time,duration,label\nA,N/A,5,x\n";
        match parse_csv_annotations(csv, 0.0) {
            Err(Error::Csv { line, .. }) => assert_eq!(line, 2),
            other => panic!("unexpected {other:?}"),
        }
        let csv = "experiment,start_time,duration,label\nA,1,0,x\n";
        assert!(parse_csv_annotations(csv, 0.0).is_err());
        let csv = "experiment,start_time,duration,label\nA,-1,2,x\n";
        assert!(parse_csv_annotations(csv, 0.0).is_err());
    }

    #[test]
    fn missing_column_reported() {
        let err = parse_csv_annotations("experiment,duration\nA,3\n", 0.0).unwrap_err();
        assert!(err.to_string().contains("start_time"));
    }

    #[test]
    fn quoted_fields_keep_delimiters() {
        let csv = "experiment,start_time,duration,label\n\"SSVEP, 10 Hz\",4,2,\"eyes \"\"open\"\", left\"\n";
        let rows = parse_csv_annotations(csv, 0.0).unwrap();
        assert_eq!(rows.len(), 1);
        assert_eq!(rows[0].experiment.as_deref(), Some("SSVEP, 10 Hz"));
        assert_eq!(rows[0].description, "eyes \"open\", left");
        assert_eq!(rows[0].duration_seconds, 2.0);
    }

    #[test]
    fn short_rows_skipped() {
        let csv = "experiment,start_time,duration,label\nA,1\nA,2,3,ok\n";
        let rows = parse_csv_annotations(csv, 0.0).unwrap();
        assert_eq!(rows.len(), 1);
    }
}
