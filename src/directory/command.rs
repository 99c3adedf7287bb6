//! Admin-tool-backed directory adapter for the CLI binary.
//!
//! Shells out to the platform's administration tool for directory and
//! content operations and uses HTTP for the fallback content upload. The
//! tool's verbs live here and nowhere else; the core only ever sees the
//! collaborator traits and their raw-text results.
//!
//! ## Configuration
//!
//! Environment variables:
//! - `MAILADMIN_BIN`: administration tool binary (default: `mailadmin`)
//! - `MAILBOX_MOVE_SECRET`: privileged directory credential

use std::path::Path;
use std::process::Command;

use super::{
    ContentTransfer, CosLookup, DirectoryError, DirectoryMutate, DirectoryQuery, FallbackEndpoint,
    ModifyMode, PrivilegedDirectoryWrite, SecretSource,
};

/// Environment variable naming the administration tool binary.
pub const ADMIN_BIN_ENV: &str = "MAILADMIN_BIN";

/// Environment variable holding the privileged directory credential.
pub const SECRET_ENV: &str = "MAILBOX_MOVE_SECRET";

/// Directory collaborators backed by the platform administration tool.
#[derive(Debug, Clone)]
pub struct CommandDirectory {
    admin_bin: String,
}

impl CommandDirectory {
    /// Use the given administration tool binary.
    pub fn new(admin_bin: impl Into<String>) -> Self {
        Self {
            admin_bin: admin_bin.into(),
        }
    }

    /// Resolve the administration tool from `MAILADMIN_BIN`.
    pub fn from_env() -> Self {
        Self::new(std::env::var(ADMIN_BIN_ENV).unwrap_or_else(|_| "mailadmin".to_string()))
    }

    /// Run the administration tool, returning stdout on success.
    fn admin(&self, args: &[&str]) -> Result<String, DirectoryError> {
        self.admin_inner(args, None).map(|(_, stdout)| stdout)
    }

    /// Run the administration tool, distinguishing a not-found exit (code
    /// 1) from a hard failure.
    fn admin_lookup(&self, args: &[&str]) -> Result<Option<String>, DirectoryError> {
        match self.admin_inner(args, None) {
            Ok((_, stdout)) => Ok(Some(stdout)),
            Err(err) if err.detail.starts_with("exit code 1:") => Ok(None),
            Err(err) => Err(err),
        }
    }

    fn admin_inner(
        &self,
        args: &[&str],
        secret: Option<&str>,
    ) -> Result<(i32, String), DirectoryError> {
        let op = args.first().copied().unwrap_or("admin");
        let mut command = Command::new(&self.admin_bin);
        command.args(args);
        if let Some(secret) = secret {
            command.env(SECRET_ENV, secret);
        }
        let output = command
            .output()
            .map_err(|err| DirectoryError::new(op, format!("cannot run {}: {err}", self.admin_bin)))?;
        let code = output.status.code().unwrap_or(-1);
        if !output.status.success() {
            let stderr = String::from_utf8_lossy(&output.stderr);
            return Err(DirectoryError::new(
                op,
                format!("exit code {code}: {}", stderr.trim()),
            ));
        }
        Ok((code, String::from_utf8_lossy(&output.stdout).into_owned()))
    }
}

fn mode_args(mode: ModifyMode) -> &'static [&'static str] {
    match mode {
        ModifyMode::Replace => &[],
        ModifyMode::Append => &["--append"],
    }
}

impl DirectoryQuery for CommandDirectory {
    fn get_account(&self, name: &str) -> Result<Option<String>, DirectoryError> {
        self.admin_lookup(&["get-account", name])
    }

    fn get_cos(&self, lookup: CosLookup<'_>) -> Result<String, DirectoryError> {
        match lookup {
            CosLookup::Id(id) => self.admin(&["get-cos", id]),
            CosLookup::Default => self.admin(&["get-cos", "--default"]),
        }
    }

    fn get_identities(&self, account: &str) -> Result<String, DirectoryError> {
        self.admin(&["get-identities", account])
    }

    fn get_membership(&self, account: &str) -> Result<String, DirectoryError> {
        self.admin(&["get-membership", account])
    }

    fn get_signatures(&self, account: &str) -> Result<String, DirectoryError> {
        self.admin(&["get-signatures", account])
    }
}

impl DirectoryMutate for CommandDirectory {
    fn rename_account(&self, from: &str, to: &str) -> Result<(), DirectoryError> {
        self.admin(&["rename-account", from, to]).map(drop)
    }

    fn modify_account(
        &self,
        account: &str,
        attr: &str,
        value: &str,
        mode: ModifyMode,
    ) -> Result<(), DirectoryError> {
        let mut args = vec!["modify-account", account, attr, value];
        args.extend_from_slice(mode_args(mode));
        self.admin(&args).map(drop)
    }

    fn create_account(
        &self,
        name: &str,
        password: &str,
        host: &str,
        cos_id: Option<&str>,
    ) -> Result<(), DirectoryError> {
        let mut args = vec!["create-account", name, password, "--host", host];
        if let Some(cos_id) = cos_id {
            args.extend_from_slice(&["--cos", cos_id]);
        }
        self.admin(&args).map(drop)
    }

    fn create_identity(&self, account: &str, name: &str) -> Result<(), DirectoryError> {
        self.admin(&["create-identity", account, name]).map(drop)
    }

    fn modify_identity(
        &self,
        account: &str,
        identity: &str,
        attr: &str,
        value: &str,
        mode: ModifyMode,
    ) -> Result<(), DirectoryError> {
        let mut args = vec!["modify-identity", account, identity, attr, value];
        args.extend_from_slice(mode_args(mode));
        self.admin(&args).map(drop)
    }

    fn create_signature(&self, account: &str, name: &str) -> Result<String, DirectoryError> {
        self.admin(&["create-signature", account, name])
            .map(|stdout| stdout.trim().to_string())
    }

    fn modify_signature(
        &self,
        account: &str,
        signature_id: &str,
        attr: &str,
        value: &str,
        mode: ModifyMode,
    ) -> Result<(), DirectoryError> {
        let mut args = vec!["modify-signature", account, signature_id, attr, value];
        args.extend_from_slice(mode_args(mode));
        self.admin(&args).map(drop)
    }

    fn add_distribution_list_member(
        &self,
        list: &str,
        account: &str,
    ) -> Result<(), DirectoryError> {
        self.admin(&["add-list-member", list, account]).map(drop)
    }

    fn remove_account_alias(&self, account: &str, alias: &str) -> Result<(), DirectoryError> {
        self.admin(&["remove-alias", account, alias]).map(drop)
    }

    fn add_account_alias(&self, account: &str, alias: &str) -> Result<(), DirectoryError> {
        self.admin(&["add-alias", account, alias]).map(drop)
    }
}

impl ContentTransfer for CommandDirectory {
    fn export(&self, account: &str, artifact: &Path) -> Result<(), DirectoryError> {
        let path = artifact.to_string_lossy();
        self.admin(&["export-content", account, "--out", path.as_ref()])
            .map(drop)
    }

    fn import(&self, account: &str, artifact: &Path) -> Result<(), DirectoryError> {
        let path = artifact.to_string_lossy();
        self.admin(&["import-content", account, "--in", path.as_ref()])
            .map(drop)
    }

    fn upload(
        &self,
        endpoint: &FallbackEndpoint,
        account: &str,
        artifact: &Path,
    ) -> Result<(), DirectoryError> {
        let file = std::fs::File::open(artifact)
            .map_err(|err| DirectoryError::new("upload", err.to_string()))?;
        let url = format!("{}?account={account}", endpoint.url);
        ureq::post(&url)
            .set("Authorization", &endpoint.credential)
            .send(file)
            .map_err(|err| DirectoryError::new("upload", err.to_string()))?;
        Ok(())
    }
}

impl PrivilegedDirectoryWrite for CommandDirectory {
    fn replace_attr(
        &self,
        account: &str,
        attr: &str,
        value: &str,
        credential: &str,
    ) -> Result<(), DirectoryError> {
        // The credential travels by environment, never on the command line.
        self.admin_inner(
            &["privileged-modify", account, attr, value],
            Some(credential),
        )
        .map(drop)
    }
}

impl SecretSource for CommandDirectory {
    fn privileged_secret(&self) -> Result<String, DirectoryError> {
        std::env::var(SECRET_ENV).map_err(|_| {
            DirectoryError::new("privileged_secret", format!("{SECRET_ENV} is not set"))
        })
    }
}
