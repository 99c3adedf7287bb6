//! The per-run account snapshot and signature-id replacement table.

use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, BTreeSet};

use super::attrs::AttrMap;
use super::attrset::{COS_ID_ATTR, SPECIAL_ATTRS, STATUS_ATTR, STATUS_CLOSED};

/// Locations whose scalar value equals some signature's opaque id.
///
/// Collected once during the reference scan; consulted at replay time so
/// that recreated signatures keep being referenced under their new ids.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ReferenceMarks {
    /// Property names holding a signature-id reference.
    pub properties: BTreeSet<String>,
    /// Per-identity attribute names holding a signature-id reference.
    pub identities: BTreeMap<String, BTreeSet<String>>,
}

impl ReferenceMarks {
    /// Create an empty mark set.
    pub fn new() -> Self {
        Self::default()
    }

    /// Whether no location was marked.
    pub fn is_empty(&self) -> bool {
        self.properties.is_empty() && self.identities.is_empty()
    }

    /// Record a property reference.
    pub fn mark_property(&mut self, attr: impl Into<String>) {
        self.properties.insert(attr.into());
    }

    /// Record an identity attribute reference.
    pub fn mark_identity(&mut self, identity: impl Into<String>, attr: impl Into<String>) {
        self.identities
            .entry(identity.into())
            .or_default()
            .insert(attr.into());
    }

    /// Whether a property is marked.
    pub fn property_is_marked(&self, attr: &str) -> bool {
        self.properties.contains(attr)
    }

    /// Whether an identity attribute is marked.
    pub fn identity_is_marked(&self, identity: &str, attr: &str) -> bool {
        self.identities
            .get(identity)
            .is_some_and(|attrs| attrs.contains(attr))
    }
}

/// Everything extracted from the source account, built once per run.
///
/// The orchestrator consumes this top to bottom; it is never mutated after
/// extraction. Replay works from the snapshot plus the
/// [`ReplacementTable`], substituting signature ids on the way out rather
/// than editing the snapshot in place.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AccountSnapshot {
    /// Source account name.
    pub account: String,
    /// Account properties that differ from the class-of-service baseline.
    pub properties: AttrMap,
    /// Identities by name.
    pub identities: BTreeMap<String, AttrMap>,
    /// Signature records in discovery order, each with an id and a name.
    pub signatures: Vec<AttrMap>,
    /// Alias addresses.
    pub aliases: Vec<String>,
    /// Distribution lists the account belongs to.
    pub distribution_lists: Vec<String>,
    /// Signature-id reference locations.
    pub reference_marks: ReferenceMarks,
}

impl AccountSnapshot {
    /// Whether the source account was already closed at extraction time.
    ///
    /// An inherited (pruned) status means the account carried the baseline
    /// status, which is never "closed".
    pub fn is_closed(&self) -> bool {
        self.properties.get_scalar(STATUS_ATTR) == Some(STATUS_CLOSED)
    }

    /// The explicit class-of-service id, if the account had one.
    pub fn cos_id(&self) -> Option<&str> {
        self.properties.get_scalar(COS_ID_ATTR)
    }

    /// Whether any privileged-side-channel attribute was captured.
    pub fn has_special_attrs(&self) -> bool {
        SPECIAL_ATTRS.iter().any(|attr| self.properties.contains(attr))
    }
}

/// Old signature id → newly assigned signature id.
///
/// Built incrementally while signatures are recreated on the destination;
/// read-only for the rest of the run.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ReplacementTable(BTreeMap<String, String>);

impl ReplacementTable {
    /// Create an empty table.
    pub fn new() -> Self {
        Self::default()
    }

    /// Record a replacement.
    pub fn insert(&mut self, old_id: impl Into<String>, new_id: impl Into<String>) {
        self.0.insert(old_id.into(), new_id.into());
    }

    /// Look up the replacement for an old id.
    pub fn get(&self, old_id: &str) -> Option<&str> {
        self.0.get(old_id).map(String::as_str)
    }

    /// Number of recorded replacements.
    pub fn len(&self) -> usize {
        self.0.len()
    }

    /// Whether no replacement was recorded.
    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    /// Iterate over `(old, new)` pairs in sorted order.
    pub fn iter(&self) -> impl Iterator<Item = (&String, &String)> {
        self.0.iter()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn snapshot_with_properties(properties: AttrMap) -> AccountSnapshot {
        AccountSnapshot {
            account: "user@example.com".to_string(),
            properties,
            identities: BTreeMap::new(),
            signatures: Vec::new(),
            aliases: Vec::new(),
            distribution_lists: Vec::new(),
            reference_marks: ReferenceMarks::new(),
        }
    }

    #[test]
    fn test_is_closed_reads_override_status() {
        let mut props = AttrMap::new();
        props.insert(STATUS_ATTR, STATUS_CLOSED);
        assert!(snapshot_with_properties(props).is_closed());

        let mut props = AttrMap::new();
        props.insert(STATUS_ATTR, "active");
        assert!(!snapshot_with_properties(props).is_closed());

        // Pruned status means the account inherited the baseline: not closed.
        assert!(!snapshot_with_properties(AttrMap::new()).is_closed());
    }

    #[test]
    fn test_has_special_attrs() {
        let mut props = AttrMap::new();
        props.insert("displayName", "User");
        assert!(!snapshot_with_properties(props.clone()).has_special_attrs());

        props.insert("createTimestamp", "20240101000000Z");
        assert!(snapshot_with_properties(props).has_special_attrs());
    }

    #[test]
    fn test_reference_marks_lookup() {
        let mut marks = ReferenceMarks::new();
        marks.mark_property("defaultSignature");
        marks.mark_identity("work", "defaultSignature");

        assert!(marks.property_is_marked("defaultSignature"));
        assert!(!marks.property_is_marked("displayName"));
        assert!(marks.identity_is_marked("work", "defaultSignature"));
        assert!(!marks.identity_is_marked("home", "defaultSignature"));
    }

    #[test]
    fn test_replacement_table_round_trip() {
        let mut table = ReplacementTable::new();
        table.insert("S1", "S2");
        assert_eq!(table.get("S1"), Some("S2"));
        assert_eq!(table.get("S9"), None);
        assert_eq!(table.len(), 1);

        let json = serde_json::to_string(&table).unwrap();
        assert_eq!(json, r#"{"S1":"S2"}"#);
    }
}
