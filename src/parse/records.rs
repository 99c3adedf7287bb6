//! Marker-delimited multi-record parsing.
//!
//! Identity and signature listings share the line grammar of
//! [`lines`](super::lines) but pack several records into one text blob,
//! separated by marker lines:
//!
//! ```text
//! # name <label>
//! ```
//!
//! Identities are keyed by label and a duplicate label is fatal; signature
//! records are ordered, empty records are dropped at flush, and every
//! flushed record must expose both the opaque id and the name field.

use regex_lite::Regex;
use std::collections::BTreeMap;
use std::sync::OnceLock;

use super::lines::LineFeeder;
use crate::types::{AttrMap, SIGNATURE_ID_ATTR, SIGNATURE_NAME_ATTR};

/// Multi-record parse failure.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum RecordError {
    /// Two records carried the same label.
    #[error("duplicate record label: {0}")]
    DuplicateRecord(String),
    /// A signature record lacked a required field.
    #[error("record \"{label}\" is missing required field {field}")]
    MissingField {
        /// Label of the offending record.
        label: String,
        /// The absent field name.
        field: &'static str,
    },
}

fn marker_pattern() -> &'static Regex {
    static PATTERN: OnceLock<Regex> = OnceLock::new();
    PATTERN.get_or_init(|| Regex::new(r"^# name (.+)$").expect("marker pattern compiles"))
}

/// The record label, if this line is a marker line.
fn marker_label(line: &str) -> Option<&str> {
    marker_pattern()
        .captures(line)
        .and_then(|captures| captures.get(1))
        .map(|label| label.as_str())
}

/// Parse an identity listing into per-identity attribute maps.
///
/// A marker starts a record keyed by its label; lines before the first
/// marker are discarded. A duplicate label is a [`RecordError::DuplicateRecord`].
pub fn parse_identities(input: &str) -> Result<BTreeMap<String, AttrMap>, RecordError> {
    let mut records: BTreeMap<String, AttrMap> = BTreeMap::new();
    let mut current: Option<(String, LineFeeder)> = None;

    for line in input.lines() {
        if let Some(label) = marker_label(line) {
            if let Some((done_label, feeder)) = current.take() {
                records.insert(done_label, feeder.finish());
            }
            if records.contains_key(label) {
                return Err(RecordError::DuplicateRecord(label.to_string()));
            }
            current = Some((label.to_string(), LineFeeder::new()));
        } else if let Some((_, feeder)) = &mut current {
            feeder.feed(line);
        }
    }
    if let Some((label, feeder)) = current {
        records.insert(label, feeder.finish());
    }
    Ok(records)
}

/// Parse a signature listing into ordered signature records.
///
/// A marker flushes the previous record if it collected any attributes; the
/// final record is flushed at end of input. Each flushed record must carry
/// `signatureId` and `signatureName` (the id value itself may be empty).
pub fn parse_signatures(input: &str) -> Result<Vec<AttrMap>, RecordError> {
    let mut records: Vec<AttrMap> = Vec::new();
    let mut current: Option<(String, LineFeeder)> = None;

    for line in input.lines() {
        if let Some(label) = marker_label(line) {
            flush_signature(&mut records, current.take())?;
            current = Some((label.to_string(), LineFeeder::new()));
        } else if let Some((_, feeder)) = &mut current {
            feeder.feed(line);
        }
    }
    flush_signature(&mut records, current)?;
    Ok(records)
}

/// Flush a signature record, dropping it when empty and validating the
/// identifying fields otherwise.
fn flush_signature(
    records: &mut Vec<AttrMap>,
    current: Option<(String, LineFeeder)>,
) -> Result<(), RecordError> {
    let Some((label, feeder)) = current else {
        return Ok(());
    };
    if feeder.is_empty() {
        return Ok(());
    }
    let map = feeder.finish();
    for field in [SIGNATURE_ID_ATTR, SIGNATURE_NAME_ATTR] {
        if !map.contains(field) {
            return Err(RecordError::MissingField { label, field });
        }
    }
    records.push(map);
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    const IDENTITIES: &str = "\
# name DEFAULT
identityId: 11111111-aaaa
identityName: DEFAULT
replyToDisplay: Pat Example
# name work
identityId: 22222222-bbbb
identityName: work
defaultSignature: SIG1
";

    #[test]
    fn test_identities_keyed_by_label() {
        let records = parse_identities(IDENTITIES).unwrap();
        assert_eq!(records.len(), 2);
        assert_eq!(
            records["DEFAULT"].get_scalar("replyToDisplay"),
            Some("Pat Example")
        );
        assert_eq!(records["work"].get_scalar("defaultSignature"), Some("SIG1"));
    }

    #[test]
    fn test_duplicate_identity_label_is_fatal() {
        let input = "# name work\nidentityName: work\n# name work\nidentityName: work\n";
        assert_eq!(
            parse_identities(input),
            Err(RecordError::DuplicateRecord("work".to_string()))
        );
    }

    #[test]
    fn test_lines_before_first_marker_are_discarded() {
        let records = parse_identities("stray: attribute\n# name only\nfoo: bar\n").unwrap();
        assert_eq!(records.len(), 1);
        assert_eq!(records["only"].get_scalar("foo"), Some("bar"));
        assert!(!records["only"].contains("stray"));
    }

    #[test]
    fn test_identity_record_may_be_empty() {
        let records = parse_identities("# name bare\n").unwrap();
        assert!(records["bare"].is_empty());
    }

    #[test]
    fn test_trailing_signature_record_is_flushed() {
        let input = "\
# name Work
signatureId: SIG1
signatureName: Work
signatureText: Regards
";
        let records = parse_signatures(input).unwrap();
        assert_eq!(records.len(), 1);
        assert_eq!(records[0].get_scalar("signatureId"), Some("SIG1"));
    }

    #[test]
    fn test_empty_signature_record_is_dropped() {
        let input = "\
# name Ghost
# name Work
signatureId: SIG1
signatureName: Work
";
        let records = parse_signatures(input).unwrap();
        assert_eq!(records.len(), 1);
        assert_eq!(records[0].get_scalar("signatureName"), Some("Work"));
    }

    #[test]
    fn test_signature_missing_id_is_fatal() {
        let input = "# name Work\nsignatureName: Work\n";
        assert_eq!(
            parse_signatures(input),
            Err(RecordError::MissingField {
                label: "Work".to_string(),
                field: SIGNATURE_ID_ATTR,
            })
        );
    }

    #[test]
    fn test_signature_with_empty_id_parses() {
        let input = "# name Work\nsignatureId: \nsignatureName: Work\n";
        let records = parse_signatures(input).unwrap();
        assert_eq!(records[0].get_scalar("signatureId"), Some(""));
    }

    #[test]
    fn test_multiline_signature_text() {
        let input = "\
# name Work
signatureId: SIG1
signatureName: Work
signatureText: Regards,
Pat Example
Operations
";
        let records = parse_signatures(input).unwrap();
        assert_eq!(
            records[0].get_scalar("signatureText"),
            Some("Regards,\nPat Example\nOperations")
        );
    }

    #[test]
    fn test_signature_order_is_preserved() {
        let input = "\
# name B
signatureId: SB
signatureName: B
# name A
signatureId: SA
signatureName: A
";
        let records = parse_signatures(input).unwrap();
        let names: Vec<_> = records
            .iter()
            .map(|r| r.get_scalar("signatureName").unwrap())
            .collect();
        assert_eq!(names, vec!["B", "A"]);
    }
}
