//! Line-oriented attribute text parsing and rendering.
//!
//! ## Grammar
//!
//! Directory tools emit attributes as loosely structured text:
//!
//! ```text
//! <name>: <value>
//! ```
//!
//! - A line matching `^([A-Za-z0-9]+): (.*)$` starts a new attribute.
//! - Any other line, while an attribute is current, is a continuation and
//!   is newline-joined onto the current value.
//! - A repeated name promotes the prior value to a list and appends.
//! - After parsing, trailing whitespace is trimmed from every scalar and
//!   every list element.
//!
//! ## Known ambiguity
//!
//! A continuation line that happens to match the attribute-line pattern is
//! indistinguishable from a genuine new attribute and is parsed as one; the
//! wire format has no escaping. This is inherited source behavior and is
//! deliberately not fixed here.

use regex_lite::Regex;
use std::sync::OnceLock;

use crate::types::{AttrMap, AttrValue};

fn attr_line_pattern() -> &'static Regex {
    static PATTERN: OnceLock<Regex> = OnceLock::new();
    PATTERN.get_or_init(|| {
        Regex::new(r"^([A-Za-z0-9]+): (.*)$").expect("attribute line pattern compiles")
    })
}

/// Split an attribute line into `(name, value)`, or `None` for a
/// continuation line.
pub(crate) fn split_attr_line(line: &str) -> Option<(&str, &str)> {
    let captures = attr_line_pattern().captures(line)?;
    // Both groups always participate in a match.
    let name = captures.get(1)?.as_str();
    let value = captures.get(2)?.as_str();
    Some((name, value))
}

/// Incremental line feeder shared by the single-record and multi-record
/// parsers.
///
/// Tracks which attribute a continuation line attaches to; that is the only
/// place discovery order matters.
#[derive(Debug, Default)]
pub(crate) struct LineFeeder {
    map: AttrMap,
    current: Option<String>,
}

impl LineFeeder {
    pub(crate) fn new() -> Self {
        Self::default()
    }

    /// Consume one line of input.
    pub(crate) fn feed(&mut self, line: &str) {
        if let Some((name, value)) = split_attr_line(line) {
            self.map.push(name, value.to_string());
            self.current = Some(name.to_string());
        } else if let Some(name) = &self.current {
            self.map.append_line(name, line);
        }
        // A continuation line before any attribute line is discarded.
    }

    /// Whether any attribute has been collected.
    pub(crate) fn is_empty(&self) -> bool {
        self.map.is_empty()
    }

    /// Finish parsing: trim trailing whitespace and hand back the map.
    pub(crate) fn finish(mut self) -> AttrMap {
        self.map.trim_trailing();
        self.map
    }
}

/// Parse attribute text into a normalized [`AttrMap`].
///
/// Empty input yields an empty map.
///
/// # Example
///
/// ```rust
/// use mailbox_move::parse::lines::parse;
///
/// let map = parse("displayName: Pat Example\nmailAlias: a@x\nmailAlias: b@x\n");
/// assert_eq!(map.get_scalar("displayName"), Some("Pat Example"));
/// assert_eq!(map.get("mailAlias").unwrap().values().len(), 2);
/// ```
pub fn parse(input: &str) -> AttrMap {
    let mut feeder = LineFeeder::new();
    for line in input.lines() {
        feeder.feed(line);
    }
    feeder.finish()
}

/// Render an [`AttrMap`] back to the line grammar.
///
/// One line per scalar, one line per list element, names in map order.
/// Values without embedded newlines survive a render→parse round trip
/// unchanged; multi-line values render their continuation lines verbatim.
pub fn render(map: &AttrMap) -> String {
    let mut out = String::new();
    for (name, value) in map {
        match value {
            AttrValue::Scalar(v) => {
                out.push_str(name);
                out.push_str(": ");
                out.push_str(v);
                out.push('\n');
            }
            AttrValue::List(items) => {
                for item in items {
                    out.push_str(name);
                    out.push_str(": ");
                    out.push_str(item);
                    out.push('\n');
                }
            }
        }
    }
    out
}
