//! Snapshot persistence.
//!
//! The full extraction snapshot is written as pretty-printed JSON so a
//! dry run can be inspected by eye and a failed run can be recovered by
//! hand. Files are named by account and run timestamp; nothing is ever
//! overwritten across runs.

use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

use crate::types::AccountSnapshot;
use crate::SNAPSHOT_SCHEMA_VERSION;

/// Snapshot dump failure.
#[derive(Debug, thiserror::Error)]
pub enum SnapshotIoError {
    /// Filesystem failure.
    #[error("snapshot io: {0}")]
    Io(#[from] std::io::Error),
    /// Serialization failure.
    #[error("snapshot encoding: {0}")]
    Encode(#[from] serde_json::Error),
}

/// File name for the snapshot dump of one run.
pub fn snapshot_file_name(account: &str, stamp: &str) -> String {
    format!("{account}-{stamp}.snapshot.json")
}

/// File name for the content-export artifact of one run.
pub fn artifact_file_name(account: &str, stamp: &str) -> String {
    format!("{account}-{stamp}.tgz")
}

/// Serialize-side dump envelope; borrows the snapshot.
#[derive(Serialize)]
struct DumpEnvelopeRef<'a> {
    schema_version: &'a str,
    snapshot: &'a AccountSnapshot,
}

/// Deserialize-side dump envelope.
#[derive(Deserialize)]
struct DumpEnvelope {
    #[allow(dead_code)]
    schema_version: String,
    snapshot: AccountSnapshot,
}

/// Write the snapshot dump, returning its path.
pub fn write_snapshot(
    dir: &Path,
    account: &str,
    stamp: &str,
    snapshot: &AccountSnapshot,
) -> Result<PathBuf, SnapshotIoError> {
    let path = dir.join(snapshot_file_name(account, stamp));
    let envelope = DumpEnvelopeRef {
        schema_version: SNAPSHOT_SCHEMA_VERSION,
        snapshot,
    };
    let json = serde_json::to_string_pretty(&envelope)?;
    std::fs::write(&path, json)?;
    Ok(path)
}

/// Read a snapshot dump back. Used by operator recovery tooling and tests.
pub fn read_snapshot(path: &Path) -> Result<AccountSnapshot, SnapshotIoError> {
    let json = std::fs::read_to_string(path)?;
    let envelope: DumpEnvelope = serde_json::from_str(&json)?;
    Ok(envelope.snapshot)
}
