//! Attribute maps keyed by attribute name.

use serde::{Deserialize, Serialize};
use std::collections::{btree_map, BTreeMap};

use super::value::AttrValue;

/// A normalized attribute map: unique names, scalar-or-list values.
///
/// Backed by a `BTreeMap` for deterministic iteration. Discovery order in
/// the source text only governs which value a continuation line attaches to
/// (parser-local state), never storage semantics, so sorted iteration is
/// safe everywhere downstream.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct AttrMap(BTreeMap<String, AttrValue>);

impl AttrMap {
    /// Create an empty map.
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of attributes.
    pub fn len(&self) -> usize {
        self.0.len()
    }

    /// Whether the map has no attributes.
    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    /// Fetch a value by name.
    pub fn get(&self, name: &str) -> Option<&AttrValue> {
        self.0.get(name)
    }

    /// Fetch a scalar value by name; `None` for absent or list-valued.
    pub fn get_scalar(&self, name: &str) -> Option<&str> {
        self.0.get(name).and_then(AttrValue::as_scalar)
    }

    /// Whether an attribute is present.
    pub fn contains(&self, name: &str) -> bool {
        self.0.contains_key(name)
    }

    /// Insert or overwrite an attribute.
    pub fn insert(&mut self, name: impl Into<String>, value: impl Into<AttrValue>) {
        self.0.insert(name.into(), value.into());
    }

    /// Record one parsed value line: a fresh name inserts a scalar, a
    /// repeated name promotes the existing value to a list and appends.
    pub fn push(&mut self, name: impl Into<String>, value: String) {
        match self.0.entry(name.into()) {
            btree_map::Entry::Vacant(slot) => {
                slot.insert(AttrValue::Scalar(value));
            }
            btree_map::Entry::Occupied(slot) => slot.into_mut().push_repeat(value),
        }
    }

    /// Join a continuation line onto an existing attribute's current value.
    ///
    /// A miss is ignored; the parser only passes names it has already
    /// inserted.
    pub fn append_line(&mut self, name: &str, line: &str) {
        if let Some(value) = self.0.get_mut(name) {
            value.append_line(line);
        }
    }

    /// Remove an attribute, returning its value.
    pub fn remove(&mut self, name: &str) -> Option<AttrValue> {
        self.0.remove(name)
    }

    /// Trim trailing whitespace from every scalar and list element.
    pub fn trim_trailing(&mut self) {
        for value in self.0.values_mut() {
            value.trim_trailing();
        }
    }

    /// Iterate over `(name, value)` pairs in sorted name order.
    pub fn iter(&self) -> impl Iterator<Item = (&String, &AttrValue)> {
        self.0.iter()
    }

    /// Iterate over attribute names in sorted order.
    pub fn names(&self) -> impl Iterator<Item = &String> {
        self.0.keys()
    }
}

impl FromIterator<(String, AttrValue)> for AttrMap {
    fn from_iter<I: IntoIterator<Item = (String, AttrValue)>>(iter: I) -> Self {
        Self(iter.into_iter().collect())
    }
}

impl<'a> IntoIterator for &'a AttrMap {
    type Item = (&'a String, &'a AttrValue);
    type IntoIter = btree_map::Iter<'a, String, AttrValue>;

    fn into_iter(self) -> Self::IntoIter {
        self.0.iter()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_push_fresh_then_repeated() {
        let mut map = AttrMap::new();
        map.push("foo", "a".to_string());
        assert_eq!(map.get_scalar("foo"), Some("a"));

        map.push("foo", "b".to_string());
        assert_eq!(
            map.get("foo"),
            Some(&AttrValue::List(vec!["a".to_string(), "b".to_string()]))
        );
    }

    #[test]
    fn test_append_line_targets_named_attribute() {
        let mut map = AttrMap::new();
        map.push("foo", "bar".to_string());
        map.push("other", "x".to_string());
        map.append_line("foo", "baz");
        assert_eq!(map.get_scalar("foo"), Some("bar\nbaz"));
        assert_eq!(map.get_scalar("other"), Some("x"));
    }

    #[test]
    fn test_get_scalar_rejects_list() {
        let mut map = AttrMap::new();
        map.push("foo", "a".to_string());
        map.push("foo", "b".to_string());
        assert_eq!(map.get_scalar("foo"), None);
        assert!(map.get("foo").is_some());
    }

    #[test]
    fn test_serde_shape() {
        let mut map = AttrMap::new();
        map.insert("one", "scalar");
        map.insert(
            "two",
            vec!["a".to_string(), "b".to_string()],
        );
        let json = serde_json::to_string(&map).unwrap();
        assert_eq!(json, r#"{"one":"scalar","two":["a","b"]}"#);

        let back: AttrMap = serde_json::from_str(&json).unwrap();
        assert_eq!(back, map);
    }
}
