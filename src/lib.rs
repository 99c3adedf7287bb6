//! # mailbox-move
//!
//! Sequential relocation of a mailbox account's configuration — and,
//! optionally, its content — from one mail server to another, on a
//! platform where accounts cannot be moved directly: the destination must
//! be a newly created account, and recreated signatures receive fresh
//! opaque ids.
//!
//! ## Core Contract
//!
//! 1. Normalize the directory tools' loosely structured text output into
//!    an attribute model ([`types::AttrValue`], [`types::AttrMap`])
//! 2. Compute which attributes are account-specific overrides versus
//!    values inherited from the class-of-service baseline ([`diff`])
//! 3. Track references to signature ids and rewrite them once the
//!    destination assigns new ids ([`refs`])
//! 4. Drive the cutover and restoration as a strictly sequential state
//!    machine with an explicit fatal/warning policy per step ([`migrate`])
//!
//! ## Architecture
//!
//! ```text
//! raw text → parse → AttrMap → diff → overrides → refs → AccountSnapshot
//!                                                             ↓
//!                               AccountMover ← DirectoryQuery/Mutate,
//!                                     ↓          ContentTransfer,
//!                             ReplacementTable   PrivilegedDirectoryWrite
//! ```
//!
//! ## Failure Policy
//!
//! Every failure before the source account is renamed is fatal, each site
//! with a distinct exit code. From the rename on, every failure is a
//! warning and the run is driven to completion: a partially restored
//! destination beats an unrecoverable abort with the source already
//! renamed. The one automatic retry in the whole design is the
//! primary→fallback content import.

#![warn(missing_docs)]
#![warn(clippy::all)]

pub mod diff;
pub mod directory;
pub mod migrate;
pub mod parse;
pub mod refs;
pub mod snapshot_io;
pub mod types;

// Re-exports
pub use diff::{prune_inherited, CosDiff};
pub use directory::{
    ContentTransfer, CosLookup, DirectoryError, DirectoryMutate, DirectoryQuery, FallbackEndpoint,
    InMemoryDirectory, ModifyMode, PrivilegedDirectoryWrite, SecretSource,
};
pub use migrate::{
    AccountMover, Collaborators, DelayPolicy, MoveError, MoveOptions, MoveOutcome, MoveReport,
    Phase, Warning,
};
pub use parse::{parse, parse_identities, parse_signatures, render, RecordError};
pub use refs::{resolve_marked, scan, MissingReplacement, ReferenceScan};
pub use snapshot_io::{read_snapshot, write_snapshot, SnapshotIoError};
pub use types::{
    AccountSnapshot, AttrMap, AttrValue, ReferenceMarks, ReplacementTable, SERVICE_ATTRS,
    SPECIAL_ATTRS, SYSTEM_ACCOUNTS,
};

/// Schema version written into snapshot dumps.
/// Increment on breaking changes to the snapshot shape.
pub const SNAPSHOT_SCHEMA_VERSION: &str = "1.0.0";

/// Prefix the source account is renamed under at cutover.
pub const OLD_ACCOUNT_PREFIX: &str = "old-";

/// Default propagation delay, in seconds, between a directory change and
/// the operations that depend on it.
pub const DEFAULT_PROPAGATION_DELAY_SECS: u64 = 60;
