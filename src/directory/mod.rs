//! Directory, content-transfer, and secret collaborator seams.
//!
//! The orchestrator never shells out or speaks a wire protocol itself; it
//! talks to these capability traits and leaves tool syntax, credentials,
//! and transports to the implementations. Query methods hand back the raw
//! line-oriented text described in [`parse`](crate::parse); mutation
//! methods report success or failure only.
//!
//! All methods take `&self`: the run is a single sequential thread of
//! control, and implementations that need internal state use their own
//! interior mutability.

pub mod memory;

#[cfg(feature = "cli")]
pub mod command;

use std::path::Path;

/// Failure reported by a directory, transfer, or secret collaborator.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("{op} failed: {detail}")]
pub struct DirectoryError {
    /// The operation that failed.
    pub op: String,
    /// Collaborator-supplied detail.
    pub detail: String,
}

impl DirectoryError {
    /// Create a new error.
    pub fn new(op: impl Into<String>, detail: impl Into<String>) -> Self {
        Self {
            op: op.into(),
            detail: detail.into(),
        }
    }
}

/// Which class-of-service profile to fetch.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CosLookup<'a> {
    /// The profile with this id.
    Id(&'a str),
    /// The platform default profile.
    Default,
}

/// How a mutate call treats an existing value.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ModifyMode {
    /// Overwrite the attribute.
    Replace,
    /// Add a value to the attribute.
    Append,
}

/// Secondary content-upload target used when the primary import fails.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FallbackEndpoint {
    /// Upload URL.
    pub url: String,
    /// Opaque credential presented to the endpoint.
    pub credential: String,
}

/// Read-only directory access.
pub trait DirectoryQuery {
    /// Fetch an account's attributes as raw line-grammar text.
    ///
    /// `Ok(None)` means the account does not exist; `Err` means the lookup
    /// itself failed.
    fn get_account(&self, name: &str) -> Result<Option<String>, DirectoryError>;

    /// Fetch a class-of-service profile as raw line-grammar text.
    fn get_cos(&self, lookup: CosLookup<'_>) -> Result<String, DirectoryError>;

    /// Fetch an account's identities as marker-delimited record text.
    fn get_identities(&self, account: &str) -> Result<String, DirectoryError>;

    /// Fetch the distribution lists an account belongs to, one per line.
    fn get_membership(&self, account: &str) -> Result<String, DirectoryError>;

    /// Fetch an account's signatures as marker-delimited record text.
    fn get_signatures(&self, account: &str) -> Result<String, DirectoryError>;
}

/// Directory mutation.
pub trait DirectoryMutate {
    /// Rename an account.
    fn rename_account(&self, from: &str, to: &str) -> Result<(), DirectoryError>;

    /// Write one account property value.
    fn modify_account(
        &self,
        account: &str,
        attr: &str,
        value: &str,
        mode: ModifyMode,
    ) -> Result<(), DirectoryError>;

    /// Create an account on the given host, optionally pinned to a
    /// class-of-service id.
    fn create_account(
        &self,
        name: &str,
        password: &str,
        host: &str,
        cos_id: Option<&str>,
    ) -> Result<(), DirectoryError>;

    /// Create an identity on an account.
    fn create_identity(&self, account: &str, name: &str) -> Result<(), DirectoryError>;

    /// Write one identity attribute value.
    fn modify_identity(
        &self,
        account: &str,
        identity: &str,
        attr: &str,
        value: &str,
        mode: ModifyMode,
    ) -> Result<(), DirectoryError>;

    /// Create a signature on an account, returning its newly assigned
    /// opaque id.
    fn create_signature(&self, account: &str, name: &str) -> Result<String, DirectoryError>;

    /// Write one signature attribute value, addressing the signature by id.
    fn modify_signature(
        &self,
        account: &str,
        signature_id: &str,
        attr: &str,
        value: &str,
        mode: ModifyMode,
    ) -> Result<(), DirectoryError>;

    /// Add an account to a distribution list.
    fn add_distribution_list_member(&self, list: &str, account: &str)
        -> Result<(), DirectoryError>;

    /// Remove an alias from an account.
    fn remove_account_alias(&self, account: &str, alias: &str) -> Result<(), DirectoryError>;

    /// Add an alias to an account.
    fn add_account_alias(&self, account: &str, alias: &str) -> Result<(), DirectoryError>;
}

/// Bulk mailbox content transfer, delegated to an external implementation.
pub trait ContentTransfer {
    /// Export an account's content to an artifact file.
    fn export(&self, account: &str, artifact: &Path) -> Result<(), DirectoryError>;

    /// Import a previously exported artifact into an account.
    fn import(&self, account: &str, artifact: &Path) -> Result<(), DirectoryError>;

    /// Upload an artifact to a secondary authenticated endpoint.
    fn upload(
        &self,
        endpoint: &FallbackEndpoint,
        account: &str,
        artifact: &Path,
    ) -> Result<(), DirectoryError>;
}

/// Direct directory-entry writes that bypass [`DirectoryMutate`].
///
/// The standard mutate path refuses normally-immutable attributes; this
/// side channel writes them with an elevated credential.
pub trait PrivilegedDirectoryWrite {
    /// Replace one attribute on an account's directory entry.
    fn replace_attr(
        &self,
        account: &str,
        attr: &str,
        value: &str,
        credential: &str,
    ) -> Result<(), DirectoryError>;
}

/// Supplier of the elevated credential for [`PrivilegedDirectoryWrite`].
pub trait SecretSource {
    /// Retrieve the privileged credential.
    fn privileged_secret(&self) -> Result<String, DirectoryError>;
}

pub use memory::InMemoryDirectory;

#[cfg(feature = "cli")]
pub use command::CommandDirectory;
