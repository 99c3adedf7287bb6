//! Scalar-or-list attribute values.

use serde::{Deserialize, Serialize};
use std::fmt;

/// A single directory attribute value.
///
/// Directory text output is loosely typed: an attribute that appears on one
/// line is a scalar, an attribute that appears on repeated lines is an
/// ordered list. The distinction matters downstream (list replay splits into
/// replace-then-append calls), so it is kept as an explicit tagged union and
/// matched exhaustively at every use site.
///
/// A `List` never has zero elements: it only comes into existence when a
/// repeated key promotes an existing `Scalar`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum AttrValue {
    /// Single-valued attribute.
    Scalar(String),
    /// Multi-valued attribute, elements in first-seen order.
    List(Vec<String>),
}

impl AttrValue {
    /// Append a value for a repeated key, promoting a `Scalar` to a `List`.
    pub fn push_repeat(&mut self, value: String) {
        match self {
            Self::Scalar(first) => {
                let first = std::mem::take(first);
                *self = Self::List(vec![first, value]);
            }
            Self::List(items) => items.push(value),
        }
    }

    /// Join a continuation line onto the value with a newline.
    ///
    /// For a `Scalar` the line extends the scalar; for a `List` it extends
    /// the most recently added element.
    pub fn append_line(&mut self, line: &str) {
        match self {
            Self::Scalar(current) => {
                current.push('\n');
                current.push_str(line);
            }
            Self::List(items) => {
                // Lists are never empty, but stay total anyway.
                if let Some(last) = items.last_mut() {
                    last.push('\n');
                    last.push_str(line);
                }
            }
        }
    }

    /// Trim trailing whitespace from the scalar or from every list element.
    pub fn trim_trailing(&mut self) {
        match self {
            Self::Scalar(s) => truncate_trailing(s),
            Self::List(items) => {
                for item in items {
                    truncate_trailing(item);
                }
            }
        }
    }

    /// The scalar value, or `None` for a list.
    pub fn as_scalar(&self) -> Option<&str> {
        match self {
            Self::Scalar(s) => Some(s),
            Self::List(_) => None,
        }
    }

    /// All values in order: one element for a scalar, each element for a list.
    pub fn values(&self) -> &[String] {
        match self {
            Self::Scalar(s) => std::slice::from_ref(s),
            Self::List(items) => items.as_slice(),
        }
    }

    /// Normalize to an owned list: a scalar becomes a one-element list.
    pub fn to_list(&self) -> Vec<String> {
        self.values().to_vec()
    }

    /// Whether this value is multi-valued.
    pub fn is_list(&self) -> bool {
        matches!(self, Self::List(_))
    }
}

impl fmt::Display for AttrValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Scalar(s) => write!(f, "{s}"),
            Self::List(items) => write!(f, "{}", items.join(", ")),
        }
    }
}

impl From<&str> for AttrValue {
    fn from(s: &str) -> Self {
        Self::Scalar(s.to_string())
    }
}

impl From<String> for AttrValue {
    fn from(s: String) -> Self {
        Self::Scalar(s)
    }
}

impl From<Vec<String>> for AttrValue {
    fn from(items: Vec<String>) -> Self {
        Self::List(items)
    }
}

/// Remove trailing whitespace in place without reallocating.
fn truncate_trailing(s: &mut String) {
    let trimmed = s.trim_end().len();
    s.truncate(trimmed);
}
