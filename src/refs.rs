//! Signature-id reference tracking and replay-time resolution.
//!
//! Signature ids are opaque and non-transferable: recreating a signature on
//! the destination assigns a fresh id, so every property or identity
//! attribute that stored the old id must be rewritten on the way out. The
//! scan runs once over the extraction snapshot; resolution happens during
//! replay, after the replacement table has been filled in.
//!
//! Only scalar values are scanned — a signature-id reference is always a
//! single value on this platform, never a list element.

use crate::types::{AttrMap, AttrValue, ReferenceMarks, ReplacementTable, SIGNATURE_ID_ATTR, SIGNATURE_NAME_ATTR};
use std::collections::BTreeMap;

/// Outcome of the reference scan.
#[derive(Debug, Clone, Default)]
pub struct ReferenceScan {
    /// Every location whose scalar value equals some signature id.
    pub marks: ReferenceMarks,
    /// Names of signatures with an empty id, skipped for tracking.
    pub untracked: Vec<String>,
}

/// Find every scalar property and identity attribute equal to a signature
/// id.
///
/// Signatures with an empty id cannot be tracked (there is nothing to match
/// on); they are reported in [`ReferenceScan::untracked`] and still
/// migrated by the orchestrator.
pub fn scan(
    properties: &AttrMap,
    identities: &BTreeMap<String, AttrMap>,
    signatures: &[AttrMap],
) -> ReferenceScan {
    let mut outcome = ReferenceScan::default();

    for signature in signatures {
        let id = signature.get_scalar(SIGNATURE_ID_ATTR).unwrap_or("");
        if id.is_empty() {
            let name = signature
                .get_scalar(SIGNATURE_NAME_ATTR)
                .unwrap_or("(unnamed)")
                .to_string();
            outcome.untracked.push(name);
            continue;
        }

        for (attr, value) in properties {
            if let AttrValue::Scalar(v) = value {
                if v == id {
                    outcome.marks.mark_property(attr.clone());
                }
            }
        }
        for (identity, attrs) in identities {
            for (attr, value) in attrs {
                if let AttrValue::Scalar(v) = value {
                    if v == id {
                        outcome.marks.mark_identity(identity.clone(), attr.clone());
                    }
                }
            }
        }
    }

    outcome
}

/// A marked field whose old signature id has no recorded replacement.
///
/// Raised when the signature's recreation failed or was skipped; the
/// orchestrator reports it and skips that single field.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("no replacement recorded for signature id \"{old_id}\" referenced by {attribute}")]
pub struct MissingReplacement {
    /// The stale id found in the field.
    pub old_id: String,
    /// The referencing attribute.
    pub attribute: String,
}

/// Resolve a marked scalar through the replacement table.
///
/// The caller only invokes this for locations recorded by [`scan`], so the
/// value is the old signature id itself.
pub fn resolve_marked(
    attribute: &str,
    value: &str,
    table: &ReplacementTable,
) -> Result<String, MissingReplacement> {
    table
        .get(value)
        .map(str::to_string)
        .ok_or_else(|| MissingReplacement {
            old_id: value.to_string(),
            attribute: attribute.to_string(),
        })
}

#[cfg(test)]
mod tests {
    use super::*;

    fn signature(id: &str, name: &str) -> AttrMap {
        let mut map = AttrMap::new();
        map.insert(SIGNATURE_ID_ATTR, id);
        map.insert(SIGNATURE_NAME_ATTR, name);
        map
    }

    #[test]
    fn test_scan_marks_property_and_identity() {
        let mut properties = AttrMap::new();
        properties.insert("defaultSignature", "SIG1");
        properties.insert("displayName", "Pat");

        let mut work = AttrMap::new();
        work.insert("defaultSignature", "SIG1");
        work.insert("replyToAddress", "pat@example.com");
        let identities = BTreeMap::from([("work".to_string(), work)]);

        let outcome = scan(&properties, &identities, &[signature("SIG1", "Work")]);

        assert!(outcome.marks.property_is_marked("defaultSignature"));
        assert!(!outcome.marks.property_is_marked("displayName"));
        assert!(outcome.marks.identity_is_marked("work", "defaultSignature"));
        assert!(!outcome.marks.identity_is_marked("work", "replyToAddress"));
        assert!(outcome.untracked.is_empty());
    }

    #[test]
    fn test_scan_skips_list_values() {
        let mut properties = AttrMap::new();
        properties.insert(
            "someList",
            vec!["SIG1".to_string(), "other".to_string()],
        );

        let outcome = scan(&properties, &BTreeMap::new(), &[signature("SIG1", "Work")]);
        assert!(outcome.marks.is_empty());
    }

    #[test]
    fn test_scan_requires_exact_match() {
        let mut properties = AttrMap::new();
        properties.insert("a", "SIG1 ");
        properties.insert("b", "xSIG1");

        let outcome = scan(&properties, &BTreeMap::new(), &[signature("SIG1", "Work")]);
        assert!(outcome.marks.is_empty());
    }

    #[test]
    fn test_empty_id_signature_is_reported_not_tracked() {
        let mut properties = AttrMap::new();
        properties.insert("defaultSignature", "");

        let outcome = scan(&properties, &BTreeMap::new(), &[signature("", "Broken")]);
        assert!(outcome.marks.is_empty());
        assert_eq!(outcome.untracked, vec!["Broken".to_string()]);
    }

    #[test]
    fn test_resolve_marked_substitutes() {
        let mut table = ReplacementTable::new();
        table.insert("S1", "S2");
        assert_eq!(
            resolve_marked("defaultSignature", "S1", &table),
            Ok("S2".to_string())
        );
    }

    #[test]
    fn test_resolve_marked_reports_missing() {
        let table = ReplacementTable::new();
        let err = resolve_marked("defaultSignature", "S1", &table).unwrap_err();
        assert_eq!(err.old_id, "S1");
        assert_eq!(err.attribute, "defaultSignature");
    }
}
