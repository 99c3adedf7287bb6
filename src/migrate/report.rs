//! Run phases, warnings, and the final report.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::path::PathBuf;

use crate::types::ReplacementTable;

/// The orchestrator's steps, in execution order.
///
/// Transitions are strictly forward; there is no backward edge in the
/// machine. Everything from `Cutover` on runs to completion regardless of
/// warnings.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum Phase {
    /// Sanity checks against source and destination state.
    Preflight,
    /// Class-of-service fetch and baseline pruning.
    ClassResolve,
    /// Identities, memberships, signatures, aliases.
    Gather,
    /// Signature-id reference scan.
    ReferenceScan,
    /// Bulk content export to the temp directory.
    ContentExport,
    /// Snapshot dump for dry-run inspection and post-mortem recovery.
    SnapshotPersist,
    /// Source rename and close; the point of no return.
    Cutover,
    /// Destination account creation.
    Recreate,
    /// Bulk content import, with one fallback retry.
    ContentImport,
    /// Distribution-list membership restoration.
    RestoreMemberships,
    /// Alias moves from the old account to the new one.
    RestoreAliases,
    /// Signature recreation and field replay.
    RestoreSignatures,
    /// Identity creation and field replay.
    RestoreIdentities,
    /// Property override replay.
    RestoreProperties,
    /// Privileged side-channel writes.
    PrivilegedFixup,
}

impl fmt::Display for Phase {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Self::Preflight => "preflight",
            Self::ClassResolve => "class-resolve",
            Self::Gather => "gather",
            Self::ReferenceScan => "reference-scan",
            Self::ContentExport => "content-export",
            Self::SnapshotPersist => "snapshot-persist",
            Self::Cutover => "cutover",
            Self::Recreate => "recreate",
            Self::ContentImport => "content-import",
            Self::RestoreMemberships => "restore-memberships",
            Self::RestoreAliases => "restore-aliases",
            Self::RestoreSignatures => "restore-signatures",
            Self::RestoreIdentities => "restore-identities",
            Self::RestoreProperties => "restore-properties",
            Self::PrivilegedFixup => "privileged-fixup",
        };
        write!(f, "{name}")
    }
}

/// A non-fatal failure: logged, recorded, and the run continues.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Warning {
    /// Phase in which the failure occurred.
    pub phase: Phase,
    /// What failed.
    pub detail: String,
}

/// What one run produced.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MoveReport {
    /// Relocated account.
    pub account: String,
    /// Destination host.
    pub dest_host: String,
    /// Every warning raised, in order.
    pub warnings: Vec<Warning>,
    /// Inherited attributes pruned by the diff engine.
    pub dropped_inherited: usize,
    /// Old→new signature id mapping from signature recreation.
    pub replacements: ReplacementTable,
    /// Snapshot dump location, when one was written.
    pub snapshot_path: Option<PathBuf>,
    /// Content export artifact location, when content was exported.
    pub artifact_path: Option<PathBuf>,
    /// Wall-clock run time in milliseconds.
    pub elapsed_ms: u64,
}

impl MoveReport {
    /// Whether the run completed without a single warning.
    pub fn is_clean(&self) -> bool {
        self.warnings.is_empty()
    }
}

/// Successful run outcome.
#[derive(Debug, Clone)]
pub enum MoveOutcome {
    /// Full relocation finished.
    Completed(MoveReport),
    /// Dry run ended after persisting the snapshot; nothing was mutated.
    DryRun(MoveReport),
    /// The account already lives on the destination host; nothing to do.
    AlreadyOnHost,
}

impl MoveOutcome {
    /// The report, when the outcome carries one.
    pub fn report(&self) -> Option<&MoveReport> {
        match self {
            Self::Completed(report) | Self::DryRun(report) => Some(report),
            Self::AlreadyOnHost => None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_phase_order_matches_execution_order() {
        assert!(Phase::Preflight < Phase::Cutover);
        assert!(Phase::Cutover < Phase::RestoreSignatures);
        assert!(Phase::RestoreSignatures < Phase::RestoreIdentities);
        assert!(Phase::RestoreIdentities < Phase::PrivilegedFixup);
    }

    #[test]
    fn test_phase_display() {
        assert_eq!(Phase::ReferenceScan.to_string(), "reference-scan");
        assert_eq!(Phase::PrivilegedFixup.to_string(), "privileged-fixup");
    }
}
