//! Fixed platform attribute-name sets and well-known attribute names.
//!
//! The platform owns a handful of attributes outright: some are assigned at
//! account creation and must never be written back through the standard
//! mutate path, and a smaller set is normally immutable and only writable
//! through the privileged directory side channel. Both sets are fixed at
//! compile time; the platform does not let operators extend them.

/// Property/identity attributes the platform manages itself.
///
/// These are never replayed onto the destination account: the create call
/// assigns fresh values (`accountId`, `mailboxId`, `identityId`), the
/// relocation itself determines others (`mailHost`, `cosId`), and aliases
/// travel through the dedicated alias restore loop instead of a property
/// write.
pub const SERVICE_ATTRS: &[&str] = &[
    "objectClass",
    "mail",
    "uid",
    "accountId",
    "mailboxId",
    "mailHost",
    "mailDeliveryAddress",
    "mailAlias",
    "cosId",
    "createTimestamp",
    "identityId",
    "identityName",
];

/// Normally-immutable attributes that the standard mutate path refuses.
///
/// These are written through [`PrivilegedDirectoryWrite`] after all other
/// restoration has finished.
///
/// [`PrivilegedDirectoryWrite`]: crate::directory::PrivilegedDirectoryWrite
pub const SPECIAL_ATTRS: &[&str] = &["createTimestamp", "lastLogonTimestamp"];

/// Local parts of accounts that must never be relocated.
pub const SYSTEM_ACCOUNTS: &[&str] = &[
    "admin",
    "postmaster",
    "root",
    "spam",
    "ham",
    "galsync",
    "quarantine",
];

/// Signature record field holding the opaque signature id.
pub const SIGNATURE_ID_ATTR: &str = "signatureId";

/// Signature record field holding the signature name.
pub const SIGNATURE_NAME_ATTR: &str = "signatureName";

/// Account property holding alias addresses (scalar or list).
pub const ALIAS_ATTR: &str = "mailAlias";

/// Account property holding the explicit class-of-service id.
pub const COS_ID_ATTR: &str = "cosId";

/// Account property holding the account status.
pub const STATUS_ATTR: &str = "accountStatus";

/// `accountStatus` value for a closed account.
pub const STATUS_CLOSED: &str = "closed";

/// Account property holding the current mail server host.
pub const MAIL_HOST_ATTR: &str = "mailHost";

/// Whether an attribute is platform-managed and excluded from replay.
pub fn is_service_attr(name: &str) -> bool {
    SERVICE_ATTRS.contains(&name)
}

/// Whether an attribute requires the privileged side channel.
pub fn is_special_attr(name: &str) -> bool {
    SPECIAL_ATTRS.contains(&name)
}

/// Whether an account name belongs to a system account.
///
/// Matches the local part (before `@`) exactly; the reject list is
/// domain-independent.
pub fn is_system_account(account: &str) -> bool {
    let local = account.split('@').next().unwrap_or(account);
    SYSTEM_ACCOUNTS.contains(&local)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_service_and_special_membership() {
        assert!(is_service_attr("mailHost"));
        assert!(is_service_attr("identityId"));
        assert!(!is_service_attr("displayName"));

        assert!(is_special_attr("createTimestamp"));
        assert!(!is_special_attr("mailHost"));
    }

    #[test]
    fn test_system_account_matches_local_part_exactly() {
        assert!(is_system_account("admin@example.com"));
        assert!(is_system_account("postmaster@other.org"));
        assert!(!is_system_account("administrator@example.com"));
        assert!(!is_system_account("user@example.com"));
    }
}
