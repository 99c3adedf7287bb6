//! In-memory directory for tests.
//!
//! Implements every collaborator seam over plain maps, rendering query
//! results through the real line grammar so the parsers are exercised end
//! to end. Mutations are recorded for inspection, and individual
//! operations can be made to fail by name to drive the warning paths.

use parking_lot::Mutex;
use std::collections::{BTreeMap, BTreeSet};
use std::path::{Path, PathBuf};
use uuid::Uuid;

use super::{
    ContentTransfer, CosLookup, DirectoryError, DirectoryMutate, DirectoryQuery, FallbackEndpoint,
    ModifyMode, PrivilegedDirectoryWrite, SecretSource,
};
use crate::parse::lines;
use crate::types::{AttrMap, AttrValue, ALIAS_ATTR, SIGNATURE_ID_ATTR, SIGNATURE_NAME_ATTR, STATUS_ATTR};

#[derive(Debug, Clone, Default)]
struct AccountRecord {
    attrs: AttrMap,
    identities: BTreeMap<String, AttrMap>,
    signatures: Vec<AttrMap>,
    memberships: BTreeSet<String>,
    aliases: BTreeSet<String>,
}

#[derive(Debug, Default)]
struct Inner {
    accounts: BTreeMap<String, AccountRecord>,
    cos: BTreeMap<String, AttrMap>,
    default_cos: Option<String>,
    secret: Option<String>,
    fail_ops: BTreeSet<String>,
    modified_account_attrs: Vec<(String, String)>,
    modified_identity_attrs: Vec<(String, String, String)>,
    privileged_writes: Vec<(String, String, String)>,
    imports: Vec<(String, PathBuf)>,
    uploads: Vec<(String, String)>,
}

/// In-memory directory, content store, and secret source.
#[derive(Debug, Default)]
pub struct InMemoryDirectory {
    inner: Mutex<Inner>,
}

impl InMemoryDirectory {
    /// Create an empty directory.
    pub fn new() -> Self {
        Self::default()
    }

    // ── Seeding ─────────────────────────────────────────────────────────

    /// Add an account with the given properties.
    pub fn add_account(&self, name: impl Into<String>, attrs: AttrMap) {
        let mut inner = self.inner.lock();
        inner.accounts.insert(
            name.into(),
            AccountRecord {
                attrs,
                ..AccountRecord::default()
            },
        );
    }

    /// Add an alias to an existing account.
    pub fn add_alias(&self, account: &str, alias: impl Into<String>) {
        let mut inner = self.inner.lock();
        if let Some(record) = inner.accounts.get_mut(account) {
            record.aliases.insert(alias.into());
        }
    }

    /// Add an identity to an existing account.
    pub fn add_identity(&self, account: &str, name: impl Into<String>, attrs: AttrMap) {
        let mut inner = self.inner.lock();
        if let Some(record) = inner.accounts.get_mut(account) {
            record.identities.insert(name.into(), attrs);
        }
    }

    /// Add a signature record to an existing account.
    pub fn add_signature(&self, account: &str, attrs: AttrMap) {
        let mut inner = self.inner.lock();
        if let Some(record) = inner.accounts.get_mut(account) {
            record.signatures.push(attrs);
        }
    }

    /// Record an account's membership in a distribution list.
    pub fn add_membership(&self, account: &str, list: impl Into<String>) {
        let mut inner = self.inner.lock();
        if let Some(record) = inner.accounts.get_mut(account) {
            record.memberships.insert(list.into());
        }
    }

    /// Register a class-of-service profile, optionally as the default.
    pub fn set_cos(&self, id: impl Into<String>, attrs: AttrMap, default: bool) {
        let mut inner = self.inner.lock();
        let id = id.into();
        if default {
            inner.default_cos = Some(id.clone());
        }
        inner.cos.insert(id, attrs);
    }

    /// Set the privileged credential handed out by [`SecretSource`].
    pub fn set_secret(&self, secret: impl Into<String>) {
        self.inner.lock().secret = Some(secret.into());
    }

    /// Make an operation fail.
    ///
    /// `key` is either a bare operation name (`"import"`) or an operation
    /// with a target (`"create_signature:Work"`).
    pub fn fail(&self, key: impl Into<String>) {
        self.inner.lock().fail_ops.insert(key.into());
    }

    // ── Inspection ──────────────────────────────────────────────────────

    /// Whether an account exists.
    pub fn account_exists(&self, name: &str) -> bool {
        self.inner.lock().accounts.contains_key(name)
    }

    /// An account property value.
    pub fn account_attr(&self, account: &str, attr: &str) -> Option<AttrValue> {
        let inner = self.inner.lock();
        inner
            .accounts
            .get(account)
            .and_then(|record| record.attrs.get(attr).cloned())
    }

    /// An identity attribute value.
    pub fn identity_attr(&self, account: &str, identity: &str, attr: &str) -> Option<AttrValue> {
        let inner = self.inner.lock();
        inner
            .accounts
            .get(account)
            .and_then(|record| record.identities.get(identity))
            .and_then(|attrs| attrs.get(attr).cloned())
    }

    /// Identity names present on an account.
    pub fn identity_names(&self, account: &str) -> Vec<String> {
        let inner = self.inner.lock();
        inner
            .accounts
            .get(account)
            .map(|record| record.identities.keys().cloned().collect())
            .unwrap_or_default()
    }

    /// A signature record looked up by name.
    pub fn signature_named(&self, account: &str, name: &str) -> Option<AttrMap> {
        let inner = self.inner.lock();
        inner.accounts.get(account).and_then(|record| {
            record
                .signatures
                .iter()
                .find(|sig| sig.get_scalar(SIGNATURE_NAME_ATTR) == Some(name))
                .cloned()
        })
    }

    /// Aliases on an account.
    pub fn aliases(&self, account: &str) -> Vec<String> {
        let inner = self.inner.lock();
        inner
            .accounts
            .get(account)
            .map(|record| record.aliases.iter().cloned().collect())
            .unwrap_or_default()
    }

    /// Whether an account is a member of a distribution list.
    pub fn is_member(&self, account: &str, list: &str) -> bool {
        let inner = self.inner.lock();
        inner
            .accounts
            .get(account)
            .is_some_and(|record| record.memberships.contains(list))
    }

    /// Property names written through [`DirectoryMutate::modify_account`],
    /// in call order.
    pub fn modified_account_attrs(&self, account: &str) -> Vec<String> {
        let inner = self.inner.lock();
        inner
            .modified_account_attrs
            .iter()
            .filter(|(acct, _)| acct == account)
            .map(|(_, attr)| attr.clone())
            .collect()
    }

    /// Identity attribute names written through
    /// [`DirectoryMutate::modify_identity`], in call order.
    pub fn modified_identity_attrs(&self, account: &str) -> Vec<(String, String)> {
        let inner = self.inner.lock();
        inner
            .modified_identity_attrs
            .iter()
            .filter(|(acct, _, _)| acct == account)
            .map(|(_, identity, attr)| (identity.clone(), attr.clone()))
            .collect()
    }

    /// Writes that went through the privileged side channel.
    pub fn privileged_writes(&self) -> Vec<(String, String, String)> {
        self.inner.lock().privileged_writes.clone()
    }

    /// Completed primary imports as `(account, artifact)` pairs.
    pub fn imports(&self) -> Vec<(String, PathBuf)> {
        self.inner.lock().imports.clone()
    }

    /// Completed fallback uploads as `(url, account)` pairs.
    pub fn uploads(&self) -> Vec<(String, String)> {
        self.inner.lock().uploads.clone()
    }

    // ── Internals ───────────────────────────────────────────────────────

    fn check_fail(inner: &Inner, key: &str) -> Result<(), DirectoryError> {
        let op = key.split(':').next().unwrap_or(key);
        if inner.fail_ops.contains(key) || inner.fail_ops.contains(op) {
            return Err(DirectoryError::new(op, "injected failure"));
        }
        Ok(())
    }

    fn render_account(record: &AccountRecord) -> String {
        let mut text = lines::render(&record.attrs);
        for alias in &record.aliases {
            text.push_str(ALIAS_ATTR);
            text.push_str(": ");
            text.push_str(alias);
            text.push('\n');
        }
        text
    }
}

impl DirectoryQuery for InMemoryDirectory {
    fn get_account(&self, name: &str) -> Result<Option<String>, DirectoryError> {
        let inner = self.inner.lock();
        Self::check_fail(&inner, &format!("get_account:{name}"))?;
        Ok(inner.accounts.get(name).map(Self::render_account))
    }

    fn get_cos(&self, lookup: CosLookup<'_>) -> Result<String, DirectoryError> {
        let inner = self.inner.lock();
        Self::check_fail(&inner, "get_cos")?;
        let id = match lookup {
            CosLookup::Id(id) => id.to_string(),
            CosLookup::Default => inner
                .default_cos
                .clone()
                .ok_or_else(|| DirectoryError::new("get_cos", "no default profile"))?,
        };
        inner
            .cos
            .get(&id)
            .map(lines::render)
            .ok_or_else(|| DirectoryError::new("get_cos", format!("no such profile: {id}")))
    }

    fn get_identities(&self, account: &str) -> Result<String, DirectoryError> {
        let inner = self.inner.lock();
        Self::check_fail(&inner, &format!("get_identities:{account}"))?;
        let record = inner
            .accounts
            .get(account)
            .ok_or_else(|| DirectoryError::new("get_identities", format!("no such account: {account}")))?;
        let mut text = String::new();
        for (name, attrs) in &record.identities {
            text.push_str("# name ");
            text.push_str(name);
            text.push('\n');
            text.push_str(&lines::render(attrs));
        }
        Ok(text)
    }

    fn get_membership(&self, account: &str) -> Result<String, DirectoryError> {
        let inner = self.inner.lock();
        Self::check_fail(&inner, &format!("get_membership:{account}"))?;
        let record = inner
            .accounts
            .get(account)
            .ok_or_else(|| DirectoryError::new("get_membership", format!("no such account: {account}")))?;
        let mut text = record
            .memberships
            .iter()
            .cloned()
            .collect::<Vec<_>>()
            .join("\n");
        if !text.is_empty() {
            text.push('\n');
        }
        Ok(text)
    }

    fn get_signatures(&self, account: &str) -> Result<String, DirectoryError> {
        let inner = self.inner.lock();
        Self::check_fail(&inner, &format!("get_signatures:{account}"))?;
        let record = inner
            .accounts
            .get(account)
            .ok_or_else(|| DirectoryError::new("get_signatures", format!("no such account: {account}")))?;
        let mut text = String::new();
        for signature in &record.signatures {
            let name = signature.get_scalar(SIGNATURE_NAME_ATTR).unwrap_or("");
            text.push_str("# name ");
            text.push_str(name);
            text.push('\n');
            text.push_str(&lines::render(signature));
        }
        Ok(text)
    }
}

impl DirectoryMutate for InMemoryDirectory {
    fn rename_account(&self, from: &str, to: &str) -> Result<(), DirectoryError> {
        let mut inner = self.inner.lock();
        Self::check_fail(&inner, "rename_account")?;
        if inner.accounts.contains_key(to) {
            return Err(DirectoryError::new(
                "rename_account",
                format!("target exists: {to}"),
            ));
        }
        let record = inner
            .accounts
            .remove(from)
            .ok_or_else(|| DirectoryError::new("rename_account", format!("no such account: {from}")))?;
        inner.accounts.insert(to.to_string(), record);
        Ok(())
    }

    fn modify_account(
        &self,
        account: &str,
        attr: &str,
        value: &str,
        mode: ModifyMode,
    ) -> Result<(), DirectoryError> {
        let mut inner = self.inner.lock();
        Self::check_fail(&inner, &format!("modify_account:{attr}"))?;
        inner
            .modified_account_attrs
            .push((account.to_string(), attr.to_string()));
        let record = inner
            .accounts
            .get_mut(account)
            .ok_or_else(|| DirectoryError::new("modify_account", format!("no such account: {account}")))?;
        write_attr(&mut record.attrs, attr, value, mode);
        Ok(())
    }

    fn create_account(
        &self,
        name: &str,
        _password: &str,
        host: &str,
        cos_id: Option<&str>,
    ) -> Result<(), DirectoryError> {
        let mut inner = self.inner.lock();
        Self::check_fail(&inner, "create_account")?;
        if inner.accounts.contains_key(name) {
            return Err(DirectoryError::new(
                "create_account",
                format!("account exists: {name}"),
            ));
        }

        let mut attrs = AttrMap::new();
        attrs.insert("mail", name);
        attrs.insert("accountId", Uuid::new_v4().to_string());
        attrs.insert("mailHost", host);
        attrs.insert(STATUS_ATTR, "active");
        if let Some(cos_id) = cos_id {
            attrs.insert("cosId", cos_id);
        }

        // The platform auto-creates a default identity with the account.
        let mut default_identity = AttrMap::new();
        default_identity.insert("identityId", Uuid::new_v4().to_string());
        default_identity.insert("identityName", "DEFAULT");

        inner.accounts.insert(
            name.to_string(),
            AccountRecord {
                attrs,
                identities: BTreeMap::from([("DEFAULT".to_string(), default_identity)]),
                ..AccountRecord::default()
            },
        );
        Ok(())
    }

    fn create_identity(&self, account: &str, name: &str) -> Result<(), DirectoryError> {
        let mut inner = self.inner.lock();
        Self::check_fail(&inner, &format!("create_identity:{name}"))?;
        let record = inner
            .accounts
            .get_mut(account)
            .ok_or_else(|| DirectoryError::new("create_identity", format!("no such account: {account}")))?;
        let mut attrs = AttrMap::new();
        attrs.insert("identityId", Uuid::new_v4().to_string());
        attrs.insert("identityName", name);
        record.identities.insert(name.to_string(), attrs);
        Ok(())
    }

    fn modify_identity(
        &self,
        account: &str,
        identity: &str,
        attr: &str,
        value: &str,
        mode: ModifyMode,
    ) -> Result<(), DirectoryError> {
        let mut inner = self.inner.lock();
        Self::check_fail(&inner, &format!("modify_identity:{identity}"))?;
        inner.modified_identity_attrs.push((
            account.to_string(),
            identity.to_string(),
            attr.to_string(),
        ));
        let attrs = inner
            .accounts
            .get_mut(account)
            .and_then(|record| record.identities.get_mut(identity))
            .ok_or_else(|| {
                DirectoryError::new("modify_identity", format!("no such identity: {identity}"))
            })?;
        write_attr(attrs, attr, value, mode);
        Ok(())
    }

    fn create_signature(&self, account: &str, name: &str) -> Result<String, DirectoryError> {
        let mut inner = self.inner.lock();
        Self::check_fail(&inner, &format!("create_signature:{name}"))?;
        let record = inner
            .accounts
            .get_mut(account)
            .ok_or_else(|| DirectoryError::new("create_signature", format!("no such account: {account}")))?;
        let id = Uuid::new_v4().to_string();
        let mut attrs = AttrMap::new();
        attrs.insert(SIGNATURE_ID_ATTR, id.clone());
        attrs.insert(SIGNATURE_NAME_ATTR, name);
        record.signatures.push(attrs);
        Ok(id)
    }

    fn modify_signature(
        &self,
        account: &str,
        signature_id: &str,
        attr: &str,
        value: &str,
        mode: ModifyMode,
    ) -> Result<(), DirectoryError> {
        let mut inner = self.inner.lock();
        Self::check_fail(&inner, &format!("modify_signature:{attr}"))?;
        let signature = inner
            .accounts
            .get_mut(account)
            .and_then(|record| {
                record
                    .signatures
                    .iter_mut()
                    .find(|sig| sig.get_scalar(SIGNATURE_ID_ATTR) == Some(signature_id))
            })
            .ok_or_else(|| {
                DirectoryError::new(
                    "modify_signature",
                    format!("no such signature: {signature_id}"),
                )
            })?;
        write_attr(signature, attr, value, mode);
        Ok(())
    }

    fn add_distribution_list_member(
        &self,
        list: &str,
        account: &str,
    ) -> Result<(), DirectoryError> {
        let mut inner = self.inner.lock();
        Self::check_fail(&inner, &format!("add_distribution_list_member:{list}"))?;
        let record = inner.accounts.get_mut(account).ok_or_else(|| {
            DirectoryError::new(
                "add_distribution_list_member",
                format!("no such account: {account}"),
            )
        })?;
        record.memberships.insert(list.to_string());
        Ok(())
    }

    fn remove_account_alias(&self, account: &str, alias: &str) -> Result<(), DirectoryError> {
        let mut inner = self.inner.lock();
        Self::check_fail(&inner, &format!("remove_account_alias:{alias}"))?;
        let record = inner
            .accounts
            .get_mut(account)
            .ok_or_else(|| DirectoryError::new("remove_account_alias", format!("no such account: {account}")))?;
        if !record.aliases.remove(alias) {
            return Err(DirectoryError::new(
                "remove_account_alias",
                format!("no such alias: {alias}"),
            ));
        }
        Ok(())
    }

    fn add_account_alias(&self, account: &str, alias: &str) -> Result<(), DirectoryError> {
        let mut inner = self.inner.lock();
        Self::check_fail(&inner, &format!("add_account_alias:{alias}"))?;
        let record = inner
            .accounts
            .get_mut(account)
            .ok_or_else(|| DirectoryError::new("add_account_alias", format!("no such account: {account}")))?;
        record.aliases.insert(alias.to_string());
        Ok(())
    }
}

impl ContentTransfer for InMemoryDirectory {
    fn export(&self, account: &str, artifact: &Path) -> Result<(), DirectoryError> {
        {
            let inner = self.inner.lock();
            Self::check_fail(&inner, "export")?;
        }
        std::fs::write(artifact, format!("export of {account}\n"))
            .map_err(|e| DirectoryError::new("export", e.to_string()))
    }

    fn import(&self, account: &str, artifact: &Path) -> Result<(), DirectoryError> {
        let mut inner = self.inner.lock();
        Self::check_fail(&inner, "import")?;
        if !artifact.exists() {
            return Err(DirectoryError::new(
                "import",
                format!("missing artifact: {}", artifact.display()),
            ));
        }
        inner
            .imports
            .push((account.to_string(), artifact.to_path_buf()));
        Ok(())
    }

    fn upload(
        &self,
        endpoint: &FallbackEndpoint,
        account: &str,
        artifact: &Path,
    ) -> Result<(), DirectoryError> {
        let mut inner = self.inner.lock();
        Self::check_fail(&inner, "upload")?;
        if !artifact.exists() {
            return Err(DirectoryError::new(
                "upload",
                format!("missing artifact: {}", artifact.display()),
            ));
        }
        inner
            .uploads
            .push((endpoint.url.clone(), account.to_string()));
        Ok(())
    }
}

impl PrivilegedDirectoryWrite for InMemoryDirectory {
    fn replace_attr(
        &self,
        account: &str,
        attr: &str,
        value: &str,
        credential: &str,
    ) -> Result<(), DirectoryError> {
        let mut inner = self.inner.lock();
        Self::check_fail(&inner, &format!("replace_attr:{attr}"))?;
        if inner.secret.as_deref() != Some(credential) {
            return Err(DirectoryError::new("replace_attr", "bad credential"));
        }
        inner.privileged_writes.push((
            account.to_string(),
            attr.to_string(),
            value.to_string(),
        ));
        let record = inner
            .accounts
            .get_mut(account)
            .ok_or_else(|| DirectoryError::new("replace_attr", format!("no such account: {account}")))?;
        record.attrs.insert(attr, value);
        Ok(())
    }
}

impl SecretSource for InMemoryDirectory {
    fn privileged_secret(&self) -> Result<String, DirectoryError> {
        let inner = self.inner.lock();
        Self::check_fail(&inner, "privileged_secret")?;
        inner
            .secret
            .clone()
            .ok_or_else(|| DirectoryError::new("privileged_secret", "no secret configured"))
    }
}

fn write_attr(attrs: &mut AttrMap, attr: &str, value: &str, mode: ModifyMode) {
    match mode {
        ModifyMode::Replace => attrs.insert(attr, value),
        ModifyMode::Append => attrs.push(attr, value.to_string()),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn seeded() -> InMemoryDirectory {
        let dir = InMemoryDirectory::new();
        let mut attrs = AttrMap::new();
        attrs.insert("mail", "user@example.com");
        attrs.insert("mailHost", "mail1.example.com");
        dir.add_account("user@example.com", attrs);
        dir
    }

    #[test]
    fn test_get_account_renders_grammar_text() {
        let dir = seeded();
        dir.add_alias("user@example.com", "a@example.com");
        dir.add_alias("user@example.com", "b@example.com");

        let text = dir.get_account("user@example.com").unwrap().unwrap();
        let map = lines::parse(&text);
        assert_eq!(map.get_scalar("mailHost"), Some("mail1.example.com"));
        assert_eq!(map.get(ALIAS_ATTR).unwrap().values().len(), 2);

        assert_eq!(dir.get_account("nobody@example.com").unwrap(), None);
    }

    #[test]
    fn test_rename_moves_record() {
        let dir = seeded();
        dir.rename_account("user@example.com", "old-user@example.com")
            .unwrap();
        assert!(!dir.account_exists("user@example.com"));
        assert!(dir.account_exists("old-user@example.com"));
    }

    #[test]
    fn test_create_account_auto_creates_default_identity() {
        let dir = InMemoryDirectory::new();
        dir.create_account("new@example.com", "pw", "mail2.example.com", Some("cos-1"))
            .unwrap();
        assert_eq!(dir.identity_names("new@example.com"), vec!["DEFAULT"]);
        assert_eq!(
            dir.account_attr("new@example.com", "cosId"),
            Some(AttrValue::from("cos-1"))
        );
    }

    #[test]
    fn test_create_signature_mints_unique_ids() {
        let dir = seeded();
        let first = dir.create_signature("user@example.com", "Work").unwrap();
        let second = dir.create_signature("user@example.com", "Home").unwrap();
        assert_ne!(first, second);
        assert!(dir.signature_named("user@example.com", "Work").is_some());
    }

    #[test]
    fn test_modify_append_promotes_to_list() {
        let dir = seeded();
        dir.modify_account("user@example.com", "forwardTo", "x@y", ModifyMode::Replace)
            .unwrap();
        dir.modify_account("user@example.com", "forwardTo", "z@y", ModifyMode::Append)
            .unwrap();
        assert_eq!(
            dir.account_attr("user@example.com", "forwardTo"),
            Some(AttrValue::List(vec!["x@y".to_string(), "z@y".to_string()]))
        );
    }

    #[test]
    fn test_fail_injection_by_op_and_target() {
        let dir = seeded();
        dir.fail("create_signature:Work");
        assert!(dir.create_signature("user@example.com", "Work").is_err());
        assert!(dir.create_signature("user@example.com", "Home").is_ok());

        dir.fail("import");
        assert!(dir
            .import("user@example.com", Path::new("/nonexistent"))
            .is_err());
    }

    #[test]
    fn test_privileged_write_requires_secret() {
        let dir = seeded();
        dir.set_secret("s3cret");
        assert!(dir
            .replace_attr("user@example.com", "createTimestamp", "x", "wrong")
            .is_err());
        dir.replace_attr("user@example.com", "createTimestamp", "x", "s3cret")
            .unwrap();
        assert_eq!(dir.privileged_writes().len(), 1);
    }
}
