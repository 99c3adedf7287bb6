//! Parsers for the loosely structured text the directory tools emit.

pub mod lines;
pub mod records;

pub use lines::{parse, render};
pub use records::{parse_identities, parse_signatures, RecordError};
