//! Fatal run failures.

/// A failure that aborts the whole run.
///
/// Every variant corresponds to one failure site and carries its own
/// process exit code, so operators can script against the outcome. All
/// fatal sites are pre-cutover by design: once the source account has been
/// renamed, the orchestrator only ever warns.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum MoveError {
    /// A previously renamed account still occupies the `old-` name.
    #[error("a previous relocation left {0} behind; clean it up first")]
    StaleAccount(String),
    /// The source account could not be fetched.
    #[error("cannot read account {account}: {detail}")]
    SourceUnreadable {
        /// The account that was being fetched.
        account: String,
        /// Collaborator-supplied detail.
        detail: String,
    },
    /// The account is a protected system account.
    #[error("{0} is a system account and cannot be relocated")]
    SystemAccount(String),
    /// The class-of-service profile could not be fetched.
    #[error("cannot resolve class of service: {0}")]
    CosUnavailable(String),
    /// Identities, memberships, signatures, or aliases could not be
    /// gathered.
    #[error("cannot gather {what}: {detail}")]
    GatherFailed {
        /// Which collection failed.
        what: &'static str,
        /// Collaborator-supplied or parse detail.
        detail: String,
    },
    /// The privileged credential could not be retrieved.
    #[error("cannot retrieve privileged credential: {0}")]
    CredentialUnavailable(String),
    /// The content export could not be produced.
    #[error("content export failed: {0}")]
    ExportFailed(String),
    /// The snapshot dump could not be written.
    #[error("cannot persist snapshot: {0}")]
    SnapshotWriteFailed(String),
    /// The source account could not be renamed out of the way.
    #[error("cannot rename source account: {0}")]
    RenameFailed(String),
    /// The destination account could not be created.
    #[error("cannot create destination account: {0}")]
    CreateFailed(String),
}

impl MoveError {
    /// The process exit code for this failure site.
    pub fn exit_code(&self) -> i32 {
        match self {
            Self::StaleAccount(_) => 2,
            Self::SourceUnreadable { .. } => 3,
            Self::SystemAccount(_) => 4,
            Self::CosUnavailable(_) => 5,
            Self::GatherFailed { .. } => 6,
            Self::CredentialUnavailable(_) => 7,
            Self::ExportFailed(_) => 8,
            Self::SnapshotWriteFailed(_) => 9,
            Self::RenameFailed(_) => 10,
            Self::CreateFailed(_) => 11,
        }
    }

    pub(crate) fn gather(what: &'static str, detail: impl ToString) -> Self {
        Self::GatherFailed {
            what,
            detail: detail.to_string(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::BTreeSet;

    #[test]
    fn test_exit_codes_are_distinct() {
        let errors = [
            MoveError::StaleAccount("old-a".into()),
            MoveError::SourceUnreadable {
                account: "a".into(),
                detail: "d".into(),
            },
            MoveError::SystemAccount("admin@x".into()),
            MoveError::CosUnavailable("d".into()),
            MoveError::gather("identities", "d"),
            MoveError::CredentialUnavailable("d".into()),
            MoveError::ExportFailed("d".into()),
            MoveError::SnapshotWriteFailed("d".into()),
            MoveError::RenameFailed("d".into()),
            MoveError::CreateFailed("d".into()),
        ];
        let codes: BTreeSet<i32> = errors.iter().map(MoveError::exit_code).collect();
        assert_eq!(codes.len(), errors.len());
        assert!(codes.iter().all(|code| (2..=11).contains(code)));
    }
}
