//! End-to-end relocation tests against the in-memory directory.
//!
//! These drive the full state machine through the same trait seams the
//! CLI uses, with zero propagation delay.

use mailbox_move::{
    AccountMover, AttrMap, AttrValue, Collaborators, DelayPolicy, FallbackEndpoint,
    InMemoryDirectory, MoveError, MoveOptions, MoveOutcome, Phase, SERVICE_ATTRS,
};
use std::path::Path;

const ACCOUNT: &str = "user@example.com";
const OLD_ACCOUNT: &str = "old-user@example.com";
const SOURCE_HOST: &str = "mail1.example.com";
const DEST_HOST: &str = "mail2.example.com";

// ─────────────────────────────────────────────────────────────────────────
// Test Helpers
// ─────────────────────────────────────────────────────────────────────────

fn seed_directory() -> InMemoryDirectory {
    let dir = InMemoryDirectory::new();

    let mut cos = AttrMap::new();
    cos.insert("theme", "steel");
    cos.insert("quota", "1073741824");
    cos.insert("accountStatus", "active");
    dir.set_cos("cos-default", cos, true);

    let mut attrs = AttrMap::new();
    attrs.insert("mail", ACCOUNT);
    attrs.insert("uid", "user");
    attrs.insert("accountId", "acct-0001");
    attrs.insert("mailHost", SOURCE_HOST);
    attrs.insert("accountStatus", "active");
    attrs.insert("theme", "steel");
    attrs.insert("quota", "2147483648");
    attrs.insert("displayName", "Pat Example");
    attrs.insert("createTimestamp", "20240101000000Z");
    dir.add_account(ACCOUNT, attrs);
    dir.add_alias(ACCOUNT, "a@example.com");

    let mut default_identity = AttrMap::new();
    default_identity.insert("identityId", "ident-default");
    default_identity.insert("identityName", "DEFAULT");
    default_identity.insert("replyToDisplay", "Pat Example");
    dir.add_identity(ACCOUNT, "DEFAULT", default_identity);

    let mut work = AttrMap::new();
    work.insert("identityId", "ident-work");
    work.insert("identityName", "work");
    work.insert("defaultSignature", "SIG1");
    dir.add_identity(ACCOUNT, "work", work);

    let mut signature = AttrMap::new();
    signature.insert("signatureId", "SIG1");
    signature.insert("signatureName", "Work");
    signature.insert("signatureText", "Regards,\nPat");
    dir.add_signature(ACCOUNT, signature);

    dir.add_membership(ACCOUNT, "dl@example.com");
    dir.set_secret("dir-secret");
    dir
}

fn options_for(tmp: &Path) -> MoveOptions {
    let mut options = MoveOptions::new(ACCOUNT, DEST_HOST);
    options.tmp_dir = tmp.to_path_buf();
    options
}

fn run(dir: &InMemoryDirectory, options: MoveOptions) -> Result<MoveOutcome, MoveError> {
    let dirs = Collaborators {
        query: dir,
        mutate: dir,
        transfer: dir,
        privileged: dir,
        secrets: dir,
    };
    AccountMover::new(dirs, options, DelayPolicy::none()).run()
}

// ─────────────────────────────────────────────────────────────────────────
// FULL RUN
// ─────────────────────────────────────────────────────────────────────────

#[test]
fn test_full_relocation() {
    let dir = seed_directory();
    let tmp = tempfile::tempdir().unwrap();

    let outcome = run(&dir, options_for(tmp.path())).unwrap();
    let report = match outcome {
        MoveOutcome::Completed(report) => report,
        other => panic!("expected completed run, got {other:?}"),
    };
    assert!(report.is_clean(), "unexpected warnings: {:?}", report.warnings);

    // Source renamed out of the way and closed.
    assert!(dir.account_exists(OLD_ACCOUNT));
    assert_eq!(
        dir.account_attr(OLD_ACCOUNT, "accountStatus"),
        Some(AttrValue::from("closed"))
    );

    // Destination recreated on the target host with the default profile.
    assert_eq!(
        dir.account_attr(ACCOUNT, "mailHost"),
        Some(AttrValue::from(DEST_HOST))
    );

    // Signature recreated under a fresh id, non-identifying fields replayed.
    let signature = dir.signature_named(ACCOUNT, "Work").unwrap();
    let new_id = signature.get_scalar("signatureId").unwrap().to_string();
    assert_ne!(new_id, "SIG1");
    assert_eq!(signature.get_scalar("signatureText"), Some("Regards,\nPat"));
    assert_eq!(report.replacements.get("SIG1"), Some(new_id.as_str()));

    // The identity's reference points at the new id.
    assert_eq!(
        dir.identity_attr(ACCOUNT, "work", "defaultSignature"),
        Some(AttrValue::Scalar(new_id))
    );
    // The auto-created default identity was reused, not duplicated.
    assert_eq!(dir.identity_names(ACCOUNT), vec!["DEFAULT", "work"]);
    assert_eq!(
        dir.identity_attr(ACCOUNT, "DEFAULT", "replyToDisplay"),
        Some(AttrValue::from("Pat Example"))
    );

    // Membership and alias land on the new account.
    assert!(dir.is_member(ACCOUNT, "dl@example.com"));
    assert_eq!(dir.aliases(ACCOUNT), vec!["a@example.com".to_string()]);
    assert!(dir.aliases(OLD_ACCOUNT).is_empty());

    // Content was exported and imported.
    assert_eq!(dir.imports().len(), 1);
    let artifact = report.artifact_path.as_ref().unwrap();
    assert!(artifact.exists());

    // Overrides replayed, inherited values not.
    let modified = dir.modified_account_attrs(ACCOUNT);
    assert!(modified.contains(&"quota".to_string()));
    assert!(modified.contains(&"displayName".to_string()));
    assert!(!modified.contains(&"theme".to_string()));
    assert_eq!(report.dropped_inherited, 2);

    // Privileged fixup went through the side channel, not the mutate path.
    assert_eq!(
        dir.privileged_writes(),
        vec![(
            ACCOUNT.to_string(),
            "createTimestamp".to_string(),
            "20240101000000Z".to_string()
        )]
    );
}

#[test]
fn test_no_service_attribute_is_ever_replayed() {
    let dir = seed_directory();
    let tmp = tempfile::tempdir().unwrap();
    run(&dir, options_for(tmp.path())).unwrap();

    let account_writes = dir.modified_account_attrs(ACCOUNT);
    for attr in SERVICE_ATTRS {
        assert!(
            !account_writes.contains(&attr.to_string()),
            "service attribute {attr} was replayed onto the account"
        );
    }
    for (identity, attr) in dir.modified_identity_attrs(ACCOUNT) {
        assert!(
            !SERVICE_ATTRS.contains(&attr.as_str()),
            "service attribute {attr} was replayed onto identity {identity}"
        );
    }
}

// ─────────────────────────────────────────────────────────────────────────
// PREFLIGHT SHORT-CIRCUITS AND FATALS
// ─────────────────────────────────────────────────────────────────────────

#[test]
fn test_same_host_exits_before_cutover() {
    let dir = seed_directory();
    let tmp = tempfile::tempdir().unwrap();

    let mut options = options_for(tmp.path());
    options.dest_host = SOURCE_HOST.to_string();

    let outcome = run(&dir, options).unwrap();
    assert!(matches!(outcome, MoveOutcome::AlreadyOnHost));
    assert!(dir.account_exists(ACCOUNT));
    assert!(!dir.account_exists(OLD_ACCOUNT));
}

#[test]
fn test_stale_account_is_fatal() {
    let dir = seed_directory();
    let mut stale = AttrMap::new();
    stale.insert("mail", OLD_ACCOUNT);
    dir.add_account(OLD_ACCOUNT, stale);

    let tmp = tempfile::tempdir().unwrap();
    let err = run(&dir, options_for(tmp.path())).unwrap_err();
    assert_eq!(err, MoveError::StaleAccount(OLD_ACCOUNT.to_string()));
    assert_eq!(err.exit_code(), 2);
    assert!(dir.account_exists(ACCOUNT));
}

#[test]
fn test_stale_account_is_only_a_warning_in_dry_run() {
    let dir = seed_directory();
    let mut stale = AttrMap::new();
    stale.insert("mail", OLD_ACCOUNT);
    dir.add_account(OLD_ACCOUNT, stale);

    let tmp = tempfile::tempdir().unwrap();
    let mut options = options_for(tmp.path());
    options.dry_run = true;

    let outcome = run(&dir, options).unwrap();
    let report = outcome.report().unwrap().clone();
    assert!(report
        .warnings
        .iter()
        .any(|w| w.phase == Phase::Preflight && w.detail.contains("stale")));
}

#[test]
fn test_system_account_is_fatal() {
    let dir = InMemoryDirectory::new();
    let mut attrs = AttrMap::new();
    attrs.insert("mail", "admin@example.com");
    attrs.insert("mailHost", SOURCE_HOST);
    dir.add_account("admin@example.com", attrs);

    let tmp = tempfile::tempdir().unwrap();
    let mut options = options_for(tmp.path());
    options.account = "admin@example.com".to_string();

    let err = run(&dir, options).unwrap_err();
    assert_eq!(err, MoveError::SystemAccount("admin@example.com".to_string()));
    assert_eq!(err.exit_code(), 4);
}

#[test]
fn test_missing_source_account_is_fatal() {
    let dir = InMemoryDirectory::new();
    let tmp = tempfile::tempdir().unwrap();
    let err = run(&dir, options_for(tmp.path())).unwrap_err();
    assert!(matches!(err, MoveError::SourceUnreadable { .. }));
    assert_eq!(err.exit_code(), 3);
}

// ─────────────────────────────────────────────────────────────────────────
// DRY RUN
// ─────────────────────────────────────────────────────────────────────────

#[test]
fn test_dry_run_persists_snapshot_and_mutates_nothing() {
    let dir = seed_directory();
    let tmp = tempfile::tempdir().unwrap();

    let mut options = options_for(tmp.path());
    options.dry_run = true;

    let outcome = run(&dir, options).unwrap();
    let report = match outcome {
        MoveOutcome::DryRun(report) => report,
        other => panic!("expected dry run, got {other:?}"),
    };

    // Nothing moved.
    assert!(dir.account_exists(ACCOUNT));
    assert!(!dir.account_exists(OLD_ACCOUNT));
    assert!(dir.modified_account_attrs(ACCOUNT).is_empty());
    assert!(dir.imports().is_empty());

    // The snapshot is on disk and reflects the pruned override set.
    let path = report.snapshot_path.as_ref().unwrap();
    let snapshot = mailbox_move::read_snapshot(path).unwrap();
    assert_eq!(snapshot.account, ACCOUNT);
    assert_eq!(snapshot.properties.get_scalar("quota"), Some("2147483648"));
    assert!(!snapshot.properties.contains("theme"));
    assert_eq!(snapshot.aliases, vec!["a@example.com".to_string()]);
    assert_eq!(snapshot.distribution_lists, vec!["dl@example.com".to_string()]);
    assert!(snapshot
        .reference_marks
        .identity_is_marked("work", "defaultSignature"));

    // The export still ran; the artifact is part of what a dry run checks.
    assert!(report.artifact_path.as_ref().unwrap().exists());
}

// ─────────────────────────────────────────────────────────────────────────
// CONTENT IMPORT FALLBACK
// ─────────────────────────────────────────────────────────────────────────

#[test]
fn test_import_failure_falls_back_once() {
    let dir = seed_directory();
    dir.fail("import");
    let tmp = tempfile::tempdir().unwrap();

    let mut options = options_for(tmp.path());
    options.fallback = Some(FallbackEndpoint {
        url: "https://transfer.example.com/upload".to_string(),
        credential: "upload-token".to_string(),
    });

    let outcome = run(&dir, options).unwrap();
    let report = outcome.report().unwrap().clone();

    assert!(dir.imports().is_empty());
    assert_eq!(
        dir.uploads(),
        vec![(
            "https://transfer.example.com/upload".to_string(),
            ACCOUNT.to_string()
        )]
    );
    assert!(report
        .warnings
        .iter()
        .any(|w| w.phase == Phase::ContentImport));
    // The run still completed: the account is on the destination host.
    assert_eq!(
        dir.account_attr(ACCOUNT, "mailHost"),
        Some(AttrValue::from(DEST_HOST))
    );
}

#[test]
fn test_import_failure_without_fallback_is_a_warning() {
    let dir = seed_directory();
    dir.fail("import");
    let tmp = tempfile::tempdir().unwrap();

    let outcome = run(&dir, options_for(tmp.path())).unwrap();
    assert!(matches!(outcome, MoveOutcome::Completed(_)));
    let report = outcome.report().unwrap().clone();

    assert!(dir.uploads().is_empty());
    assert!(report
        .warnings
        .iter()
        .any(|w| w.phase == Phase::ContentImport));
}

// ─────────────────────────────────────────────────────────────────────────
// SIGNATURE FAILURE PATHS
// ─────────────────────────────────────────────────────────────────────────

#[test]
fn test_failed_signature_creation_skips_referencing_field() {
    let dir = seed_directory();
    dir.fail("create_signature:Work");
    let tmp = tempfile::tempdir().unwrap();

    let outcome = run(&dir, options_for(tmp.path())).unwrap();
    let report = outcome.report().unwrap().clone();

    // The signature never made it, so there is no replacement entry and
    // the referencing identity field is skipped, not written stale.
    assert!(report.replacements.is_empty());
    assert_eq!(dir.identity_attr(ACCOUNT, "work", "defaultSignature"), None);
    assert!(report
        .warnings
        .iter()
        .any(|w| w.phase == Phase::RestoreSignatures));
    assert!(report
        .warnings
        .iter()
        .any(|w| w.phase == Phase::RestoreIdentities && w.detail.contains("SIG1")));
}

#[test]
fn test_signature_with_empty_id_is_migrated_but_untracked() {
    let dir = seed_directory();
    let mut broken = AttrMap::new();
    broken.insert("signatureId", "");
    broken.insert("signatureName", "NoId");
    broken.insert("signatureText", "plain");
    dir.add_signature(ACCOUNT, broken);

    let tmp = tempfile::tempdir().unwrap();
    let outcome = run(&dir, options_for(tmp.path())).unwrap();
    let report = outcome.report().unwrap().clone();

    assert!(report
        .warnings
        .iter()
        .any(|w| w.phase == Phase::ReferenceScan && w.detail.contains("NoId")));

    // Still migrated: it exists on the destination with its text.
    let migrated = dir.signature_named(ACCOUNT, "NoId").unwrap();
    assert_eq!(migrated.get_scalar("signatureText"), Some("plain"));
    assert!(!migrated.get_scalar("signatureId").unwrap().is_empty());
}

// ─────────────────────────────────────────────────────────────────────────
// POST-CUTOVER RESILIENCE
// ─────────────────────────────────────────────────────────────────────────

#[test]
fn test_post_cutover_failures_never_abort() {
    let dir = seed_directory();
    dir.fail("add_distribution_list_member:dl@example.com");
    dir.fail("add_account_alias:a@example.com");
    dir.fail("import");
    dir.fail("replace_attr:createTimestamp");
    let tmp = tempfile::tempdir().unwrap();

    let outcome = run(&dir, options_for(tmp.path())).unwrap();
    let report = match outcome {
        MoveOutcome::Completed(report) => report,
        other => panic!("expected completed run, got {other:?}"),
    };

    let phases: Vec<Phase> = report.warnings.iter().map(|w| w.phase).collect();
    assert!(phases.contains(&Phase::ContentImport));
    assert!(phases.contains(&Phase::RestoreMemberships));
    assert!(phases.contains(&Phase::RestoreAliases));
    assert!(phases.contains(&Phase::PrivilegedFixup));

    // The restoration that could succeed did.
    assert_eq!(
        dir.account_attr(ACCOUNT, "mailHost"),
        Some(AttrValue::from(DEST_HOST))
    );
    assert!(dir.signature_named(ACCOUNT, "Work").is_some());
}

#[test]
fn test_close_failure_is_a_warning() {
    let dir = seed_directory();
    dir.fail("modify_account:accountStatus");
    let tmp = tempfile::tempdir().unwrap();

    let outcome = run(&dir, options_for(tmp.path())).unwrap();
    let report = outcome.report().unwrap().clone();
    assert!(report.warnings.iter().any(|w| w.phase == Phase::Cutover));
    assert!(dir.account_exists(OLD_ACCOUNT));
}

// ─────────────────────────────────────────────────────────────────────────
// CREDENTIALS
// ─────────────────────────────────────────────────────────────────────────

#[test]
fn test_missing_credential_aborts_before_cutover() {
    let dir = seed_directory();
    dir.fail("privileged_secret");
    let tmp = tempfile::tempdir().unwrap();

    let err = run(&dir, options_for(tmp.path())).unwrap_err();
    assert!(matches!(err, MoveError::CredentialUnavailable(_)));
    assert_eq!(err.exit_code(), 7);

    // The source account is untouched.
    assert!(dir.account_exists(ACCOUNT));
    assert!(!dir.account_exists(OLD_ACCOUNT));
}

#[test]
fn test_no_special_attrs_means_no_credential_needed() {
    let dir = InMemoryDirectory::new();
    let mut cos = AttrMap::new();
    cos.insert("theme", "steel");
    dir.set_cos("cos-default", cos, true);

    let mut attrs = AttrMap::new();
    attrs.insert("mail", ACCOUNT);
    attrs.insert("mailHost", SOURCE_HOST);
    attrs.insert("displayName", "Pat");
    dir.add_account(ACCOUNT, attrs);
    dir.fail("privileged_secret");

    let tmp = tempfile::tempdir().unwrap();
    let outcome = run(&dir, options_for(tmp.path())).unwrap();
    assert!(matches!(outcome, MoveOutcome::Completed(_)));
    assert!(dir.privileged_writes().is_empty());
}
