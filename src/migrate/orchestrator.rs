//! The relocation state machine.
//!
//! ## Algorithm
//!
//! 1. Preflight: stale-account, readability, system-account, same-host
//! 2. ClassResolve: fetch profile, prune inherited attributes
//! 3. Gather: identities, memberships, signatures, aliases
//! 4. ReferenceScan: mark signature-id references
//! 5. ContentExport: bulk export to the temp directory (skippable)
//! 6. SnapshotPersist: dump the snapshot; dry runs end here
//! 7. Cutover: rename the source out of the way, close it
//! 8. Recreate: create the destination account
//! 9. ContentImport: primary import, one fallback retry (skippable)
//! 10–15. Restore memberships, aliases, signatures, identities,
//!        properties, privileged attributes
//!
//! Steps run strictly in order with no backward transitions. Every
//! failure before Cutover is fatal with its own exit code; from Cutover
//! on, every failure is a warning and the run is driven to completion —
//! a partially restored destination beats an aborted run with the source
//! already renamed.

use std::collections::BTreeSet;
use std::path::{Path, PathBuf};
use std::time::Instant;

use chrono::Utc;

use crate::diff::prune_inherited;
use crate::directory::{
    ContentTransfer, CosLookup, DirectoryMutate, DirectoryQuery, ModifyMode,
    PrivilegedDirectoryWrite, SecretSource,
};
use crate::parse::{lines, parse_identities, parse_signatures};
use crate::refs;
use crate::snapshot_io;
use crate::types::{
    is_service_attr, is_special_attr, is_system_account, AccountSnapshot, AttrValue,
    ReplacementTable, ALIAS_ATTR, MAIL_HOST_ATTR, SIGNATURE_ID_ATTR, SIGNATURE_NAME_ATTR,
    SPECIAL_ATTRS, STATUS_ATTR, STATUS_CLOSED,
};
use crate::OLD_ACCOUNT_PREFIX;

use super::error::MoveError;
use super::options::{DelayPolicy, MoveOptions};
use super::report::{MoveOutcome, MoveReport, Phase, Warning};

/// The collaborator seams one run talks to.
///
/// The same object may back several seams (the in-memory directory backs
/// all five); the orchestrator neither knows nor cares.
#[derive(Clone, Copy)]
pub struct Collaborators<'a> {
    /// Read-only directory access.
    pub query: &'a dyn DirectoryQuery,
    /// Directory mutation.
    pub mutate: &'a dyn DirectoryMutate,
    /// Bulk content transfer.
    pub transfer: &'a dyn ContentTransfer,
    /// Privileged side-channel writes.
    pub privileged: &'a dyn PrivilegedDirectoryWrite,
    /// Privileged credential supplier.
    pub secrets: &'a dyn SecretSource,
}

/// One account relocation, configured and ready to run.
pub struct AccountMover<'a> {
    dirs: Collaborators<'a>,
    options: MoveOptions,
    delays: DelayPolicy,
    warnings: Vec<Warning>,
}

impl<'a> AccountMover<'a> {
    /// Create a mover.
    pub fn new(dirs: Collaborators<'a>, options: MoveOptions, delays: DelayPolicy) -> Self {
        Self {
            dirs,
            options,
            warnings: Vec::new(),
            delays,
        }
    }

    /// Drive the relocation to its outcome.
    ///
    /// Consumes the mover: the machine has no backward transitions and a
    /// run cannot be restarted.
    pub fn run(mut self) -> Result<MoveOutcome, MoveError> {
        let started = Instant::now();
        let stamp = Utc::now().format("%Y%m%d-%H%M%S").to_string();
        let account = self.options.account.clone();
        let old_name = format!("{OLD_ACCOUNT_PREFIX}{account}");

        tracing::info!(
            account = %account,
            dest_host = %self.options.dest_host,
            dry_run = self.options.dry_run,
            "starting relocation"
        );

        // ── 1 Preflight ─────────────────────────────────────────────────
        match self.dirs.query.get_account(&old_name) {
            Ok(None) => {}
            Ok(Some(_)) => {
                if self.options.dry_run {
                    self.warn(
                        Phase::Preflight,
                        format!("stale account {old_name} exists; a live run would abort"),
                    );
                } else {
                    return Err(MoveError::StaleAccount(old_name));
                }
            }
            Err(err) => {
                return Err(MoveError::SourceUnreadable {
                    account: old_name,
                    detail: err.to_string(),
                })
            }
        }

        let source_text = self
            .dirs
            .query
            .get_account(&account)
            .map_err(|err| MoveError::SourceUnreadable {
                account: account.clone(),
                detail: err.to_string(),
            })?
            .ok_or_else(|| MoveError::SourceUnreadable {
                account: account.clone(),
                detail: "no such account".to_string(),
            })?;
        let source_attrs = lines::parse(&source_text);

        if is_system_account(&account) {
            return Err(MoveError::SystemAccount(account));
        }

        if source_attrs.get_scalar(MAIL_HOST_ATTR) == Some(self.options.dest_host.as_str()) {
            tracing::warn!(
                account = %account,
                host = %self.options.dest_host,
                "account already lives on the destination host"
            );
            if !self.options.dry_run {
                return Ok(MoveOutcome::AlreadyOnHost);
            }
            self.warn(
                Phase::Preflight,
                "account already on destination host; continuing for dry-run inspection"
                    .to_string(),
            );
        }

        // ── 2 ClassResolve ──────────────────────────────────────────────
        let cos_lookup = match source_attrs.get_scalar(crate::types::COS_ID_ATTR) {
            Some(id) => CosLookup::Id(id),
            None => CosLookup::Default,
        };
        let cos_text = self
            .dirs
            .query
            .get_cos(cos_lookup)
            .map_err(|err| MoveError::CosUnavailable(err.to_string()))?;
        let baseline = lines::parse(&cos_text);
        let diff = prune_inherited(&source_attrs, &baseline);
        let dropped_inherited = diff.dropped;
        tracing::info!(
            phase = %Phase::ClassResolve,
            dropped = diff.dropped,
            retained = diff.overrides.len(),
            "resolved class-of-service overrides"
        );

        // ── 3 Gather ────────────────────────────────────────────────────
        let identities_text = self
            .dirs
            .query
            .get_identities(&account)
            .map_err(|err| MoveError::gather("identities", err))?;
        let identities =
            parse_identities(&identities_text).map_err(|err| MoveError::gather("identities", err))?;

        let membership_text = self
            .dirs
            .query
            .get_membership(&account)
            .map_err(|err| MoveError::gather("memberships", err))?;
        let distribution_lists: Vec<String> = membership_text
            .lines()
            .filter(|line| !line.trim().is_empty())
            .map(str::to_string)
            .collect();

        let signatures_text = self
            .dirs
            .query
            .get_signatures(&account)
            .map_err(|err| MoveError::gather("signatures", err))?;
        let signatures =
            parse_signatures(&signatures_text).map_err(|err| MoveError::gather("signatures", err))?;

        let aliases: Vec<String> = source_attrs
            .get(ALIAS_ATTR)
            .map(AttrValue::to_list)
            .unwrap_or_default();

        tracing::info!(
            phase = %Phase::Gather,
            identities = identities.len(),
            signatures = signatures.len(),
            aliases = aliases.len(),
            distribution_lists = distribution_lists.len(),
            "gathered account resources"
        );

        // ── 4 ReferenceScan ─────────────────────────────────────────────
        let scan = refs::scan(&diff.overrides, &identities, &signatures);
        for name in &scan.untracked {
            self.warn(
                Phase::ReferenceScan,
                format!("signature \"{name}\" has no id; references to it cannot be tracked"),
            );
        }

        let snapshot = AccountSnapshot {
            account: account.clone(),
            properties: diff.overrides,
            identities,
            signatures,
            aliases,
            distribution_lists,
            reference_marks: scan.marks,
        };

        // The privileged credential is fetched before anything mutates:
        // a retrieval failure must abort while the source is still intact.
        let credential = if !self.options.dry_run && snapshot.has_special_attrs() {
            let secret = self
                .dirs
                .secrets
                .privileged_secret()
                .map_err(|err| MoveError::CredentialUnavailable(err.to_string()))?;
            Some(secret)
        } else {
            None
        };

        // ── 5 ContentExport ─────────────────────────────────────────────
        let artifact_path = if self.options.skip_content {
            tracing::info!(phase = %Phase::ContentExport, "content transfer skipped");
            None
        } else {
            let path = self
                .options
                .tmp_dir
                .join(snapshot_io::artifact_file_name(&account, &stamp));
            self.dirs
                .transfer
                .export(&account, &path)
                .map_err(|err| MoveError::ExportFailed(err.to_string()))?;
            tracing::info!(phase = %Phase::ContentExport, artifact = %path.display(), "content exported");
            Some(path)
        };

        // ── 6 SnapshotPersist ───────────────────────────────────────────
        let snapshot_path = if self.options.dry_run || self.options.diagnostic {
            let path =
                snapshot_io::write_snapshot(&self.options.tmp_dir, &account, &stamp, &snapshot)
                    .map_err(|err| MoveError::SnapshotWriteFailed(err.to_string()))?;
            tracing::info!(phase = %Phase::SnapshotPersist, path = %path.display(), "snapshot persisted");
            Some(path)
        } else {
            None
        };

        if self.options.dry_run {
            tracing::info!(account = %account, "dry run complete; nothing was mutated");
            return Ok(MoveOutcome::DryRun(self.finish_report(
                ReplacementTable::new(),
                dropped_inherited,
                snapshot_path,
                artifact_path,
                started,
            )));
        }

        // ── 7 Cutover ───────────────────────────────────────────────────
        tracing::info!(phase = %Phase::Cutover, old_name = %old_name, "renaming source account");
        self.dirs
            .mutate
            .rename_account(&account, &old_name)
            .map_err(|err| MoveError::RenameFailed(err.to_string()))?;
        self.delays.wait("rename propagation");

        if snapshot.is_closed() {
            tracing::debug!(phase = %Phase::Cutover, "source account was already closed");
        } else if let Err(err) =
            self.dirs
                .mutate
                .modify_account(&old_name, STATUS_ATTR, STATUS_CLOSED, ModifyMode::Replace)
        {
            self.warn(
                Phase::Cutover,
                format!("cannot close old account {old_name}: {err}"),
            );
        }

        // ── 8 Recreate ──────────────────────────────────────────────────
        let password = uuid::Uuid::new_v4().simple().to_string();
        tracing::info!(
            phase = %Phase::Recreate,
            host = %self.options.dest_host,
            cos = snapshot.cos_id().unwrap_or("(default)"),
            "creating destination account"
        );
        self.dirs
            .mutate
            .create_account(
                &account,
                &password,
                &self.options.dest_host,
                snapshot.cos_id(),
            )
            .map_err(|err| MoveError::CreateFailed(err.to_string()))?;
        self.delays.wait("create propagation");

        // ── 9 ContentImport ─────────────────────────────────────────────
        if let Some(path) = &artifact_path {
            self.import_content(&account, path);
        }

        // ── 10 RestoreMemberships ───────────────────────────────────────
        for list in &snapshot.distribution_lists {
            if let Err(err) = self.dirs.mutate.add_distribution_list_member(list, &account) {
                self.warn(
                    Phase::RestoreMemberships,
                    format!("cannot re-add to {list}: {err}"),
                );
            }
        }

        // ── 11 RestoreAliases ───────────────────────────────────────────
        for alias in &snapshot.aliases {
            if let Err(err) = self.dirs.mutate.remove_account_alias(&old_name, alias) {
                self.warn(
                    Phase::RestoreAliases,
                    format!("cannot remove {alias} from {old_name}: {err}"),
                );
            }
            self.delays.wait("alias propagation");
            if let Err(err) = self.dirs.mutate.add_account_alias(&account, alias) {
                self.warn(
                    Phase::RestoreAliases,
                    format!("cannot add {alias} to {account}: {err}"),
                );
            }
        }

        // ── 12 RestoreSignatures ────────────────────────────────────────
        let replacements = self.restore_signatures(&snapshot);

        // ── 13 RestoreIdentities ────────────────────────────────────────
        self.restore_identities(&snapshot, &replacements);

        // ── 14 RestoreProperties ────────────────────────────────────────
        self.restore_properties(&snapshot, &replacements);

        // ── 15 PrivilegedFixup ──────────────────────────────────────────
        if let Some(credential) = &credential {
            self.privileged_fixup(&snapshot, credential);
        }

        // ── 16 Done ─────────────────────────────────────────────────────
        let report = self.finish_report(
            replacements,
            dropped_inherited,
            snapshot_path,
            artifact_path,
            started,
        );
        tracing::info!(
            account = %report.account,
            elapsed_ms = report.elapsed_ms,
            warnings = report.warnings.len(),
            "relocation complete"
        );
        Ok(MoveOutcome::Completed(report))
    }

    /// Primary import with a single fallback retry.
    fn import_content(&mut self, account: &str, artifact: &Path) {
        let Err(primary) = self.dirs.transfer.import(account, artifact) else {
            tracing::info!(phase = %Phase::ContentImport, "content imported");
            return;
        };
        self.warn(
            Phase::ContentImport,
            format!("primary content import failed: {primary}"),
        );
        let Some(endpoint) = self.options.fallback.clone() else {
            return;
        };
        match self.dirs.transfer.upload(&endpoint, account, artifact) {
            Ok(()) => {
                tracing::info!(
                    phase = %Phase::ContentImport,
                    endpoint = %endpoint.url,
                    "content delivered via fallback upload"
                );
            }
            Err(err) => self.warn(
                Phase::ContentImport,
                format!("fallback upload to {} failed: {err}", endpoint.url),
            ),
        }
    }

    /// Recreate every signature on the destination, building the
    /// replacement table as new ids are assigned.
    fn restore_signatures(&mut self, snapshot: &AccountSnapshot) -> ReplacementTable {
        let account = self.options.account.clone();
        let mut table = ReplacementTable::new();

        for signature in &snapshot.signatures {
            let name = signature
                .get_scalar(SIGNATURE_NAME_ATTR)
                .unwrap_or("")
                .to_string();
            let old_id = signature
                .get_scalar(SIGNATURE_ID_ATTR)
                .unwrap_or("")
                .to_string();

            let new_id = match self.dirs.mutate.create_signature(&account, &name) {
                Ok(id) => id,
                Err(err) => {
                    self.warn(
                        Phase::RestoreSignatures,
                        format!("cannot create signature \"{name}\": {err}"),
                    );
                    continue;
                }
            };
            if !old_id.is_empty() {
                table.insert(old_id.clone(), new_id.clone());
            }
            tracing::debug!(
                phase = %Phase::RestoreSignatures,
                signature = %name,
                old_id = %old_id,
                new_id = %new_id,
                "signature recreated"
            );

            for (attr, value) in signature {
                if attr.as_str() == SIGNATURE_ID_ATTR || attr.as_str() == SIGNATURE_NAME_ATTR {
                    continue;
                }
                for (index, item) in value.values().iter().enumerate() {
                    let mode = replay_mode(index);
                    if let Err(err) =
                        self.dirs
                            .mutate
                            .modify_signature(&account, &new_id, attr, item, mode)
                    {
                        self.warn(
                            Phase::RestoreSignatures,
                            format!("signature \"{name}\" attribute {attr}: {err}"),
                        );
                    }
                }
            }
        }
        table
    }

    /// Create missing identities and replay their attributes, resolving
    /// signature references along the way.
    fn restore_identities(&mut self, snapshot: &AccountSnapshot, table: &ReplacementTable) {
        let account = self.options.account.clone();

        // Account creation may have auto-created a default identity.
        let existing: BTreeSet<String> = match self.dirs.query.get_identities(&account) {
            Ok(text) => match parse_identities(&text) {
                Ok(records) => records.into_keys().collect(),
                Err(err) => {
                    self.warn(
                        Phase::RestoreIdentities,
                        format!("cannot parse destination identities: {err}"),
                    );
                    BTreeSet::new()
                }
            },
            Err(err) => {
                self.warn(
                    Phase::RestoreIdentities,
                    format!("cannot list destination identities: {err}"),
                );
                BTreeSet::new()
            }
        };

        for (name, attrs) in &snapshot.identities {
            if !existing.contains(name) {
                if let Err(err) = self.dirs.mutate.create_identity(&account, name) {
                    self.warn(
                        Phase::RestoreIdentities,
                        format!("cannot create identity \"{name}\": {err}"),
                    );
                    continue;
                }
            }

            for (attr, value) in attrs {
                if is_service_attr(attr) {
                    continue;
                }
                let marked = snapshot.reference_marks.identity_is_marked(name, attr);
                let Some(values) = self.resolved_values(Phase::RestoreIdentities, attr, value, marked, table)
                else {
                    continue;
                };
                for (index, item) in values.iter().enumerate() {
                    let mode = replay_mode(index);
                    if let Err(err) =
                        self.dirs
                            .mutate
                            .modify_identity(&account, name, attr, item, mode)
                    {
                        self.warn(
                            Phase::RestoreIdentities,
                            format!("identity \"{name}\" attribute {attr}: {err}"),
                        );
                    }
                }
            }
        }
    }

    /// Replay the property override set, resolving signature references.
    fn restore_properties(&mut self, snapshot: &AccountSnapshot, table: &ReplacementTable) {
        let account = self.options.account.clone();

        for (attr, value) in &snapshot.properties {
            if is_service_attr(attr) || is_special_attr(attr) {
                continue;
            }
            let marked = snapshot.reference_marks.property_is_marked(attr);
            let Some(values) = self.resolved_values(Phase::RestoreProperties, attr, value, marked, table)
            else {
                continue;
            };
            for (index, item) in values.iter().enumerate() {
                let mode = replay_mode(index);
                if let Err(err) = self.dirs.mutate.modify_account(&account, attr, item, mode) {
                    self.warn(
                        Phase::RestoreProperties,
                        format!("property {attr}: {err}"),
                    );
                }
            }
        }
    }

    /// Write normally-immutable attributes through the privileged side
    /// channel.
    fn privileged_fixup(&mut self, snapshot: &AccountSnapshot, credential: &str) {
        let account = self.options.account.clone();
        for attr in SPECIAL_ATTRS {
            let Some(value) = snapshot.properties.get(attr) else {
                continue;
            };
            for item in value.values() {
                if let Err(err) = self
                    .dirs
                    .privileged
                    .replace_attr(&account, attr, item, credential)
                {
                    self.warn(
                        Phase::PrivilegedFixup,
                        format!("privileged write of {attr}: {err}"),
                    );
                }
            }
        }
    }

    /// The values to replay for one field, with signature references
    /// substituted. `None` means the field is skipped (unresolvable
    /// reference, already warned).
    fn resolved_values(
        &mut self,
        phase: Phase,
        attr: &str,
        value: &AttrValue,
        marked: bool,
        table: &ReplacementTable,
    ) -> Option<Vec<String>> {
        if marked {
            // Only scalars are ever marked.
            if let Some(scalar) = value.as_scalar() {
                return match refs::resolve_marked(attr, scalar, table) {
                    Ok(new_id) => Some(vec![new_id]),
                    Err(err) => {
                        self.warn(phase, err.to_string());
                        None
                    }
                };
            }
        }
        Some(value.to_list())
    }

    fn warn(&mut self, phase: Phase, detail: String) {
        tracing::warn!(phase = %phase, "{detail}");
        self.warnings.push(Warning { phase, detail });
    }

    fn finish_report(
        &mut self,
        replacements: ReplacementTable,
        dropped_inherited: usize,
        snapshot_path: Option<PathBuf>,
        artifact_path: Option<PathBuf>,
        started: Instant,
    ) -> MoveReport {
        MoveReport {
            account: self.options.account.clone(),
            dest_host: self.options.dest_host.clone(),
            warnings: std::mem::take(&mut self.warnings),
            dropped_inherited,
            replacements,
            snapshot_path,
            artifact_path,
            elapsed_ms: started.elapsed().as_millis() as u64,
        }
    }
}

/// First value replaces, the rest append.
fn replay_mode(index: usize) -> ModifyMode {
    if index == 0 {
        ModifyMode::Replace
    } else {
        ModifyMode::Append
    }
}
