//! Run options and the injectable propagation-delay policy.

use std::path::PathBuf;
use std::time::Duration;

use crate::directory::FallbackEndpoint;
use crate::DEFAULT_PROPAGATION_DELAY_SECS;

/// Options for one relocation run.
#[derive(Debug, Clone)]
pub struct MoveOptions {
    /// Account to relocate.
    pub account: String,
    /// Destination mail server host.
    pub dest_host: String,
    /// Directory for the export artifact and the snapshot dump.
    pub tmp_dir: PathBuf,
    /// Skip the content export/import steps entirely.
    pub skip_content: bool,
    /// Stop after persisting the snapshot; mutate nothing.
    pub dry_run: bool,
    /// Persist the snapshot even on a live run (detailed diagnostics).
    pub diagnostic: bool,
    /// Secondary upload target tried once when the primary import fails.
    pub fallback: Option<FallbackEndpoint>,
}

impl MoveOptions {
    /// Create options with the given account and destination host; every
    /// flag off, temp directory `/tmp`.
    pub fn new(account: impl Into<String>, dest_host: impl Into<String>) -> Self {
        Self {
            account: account.into(),
            dest_host: dest_host.into(),
            tmp_dir: PathBuf::from("/tmp"),
            skip_content: false,
            dry_run: false,
            diagnostic: false,
            fallback: None,
        }
    }
}

/// Blocking waits for directory changes to propagate platform-wide.
///
/// The rename and create steps, and each alias move, must not race the
/// platform's replication: the waits are unconditional sleeps, not polled
/// readiness checks. The duration is injectable so tests run with zero
/// delay.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DelayPolicy {
    propagation: Duration,
}

impl DelayPolicy {
    /// Wait the given duration at each propagation point.
    pub fn fixed(propagation: Duration) -> Self {
        Self { propagation }
    }

    /// Never wait. For tests.
    pub fn none() -> Self {
        Self::fixed(Duration::ZERO)
    }

    /// The configured propagation duration.
    pub fn propagation(&self) -> Duration {
        self.propagation
    }

    /// Block until the platform has had time to propagate a change.
    pub fn wait(&self, reason: &str) {
        if self.propagation.is_zero() {
            return;
        }
        tracing::debug!(
            reason = reason,
            secs = self.propagation.as_secs(),
            "waiting for propagation"
        );
        std::thread::sleep(self.propagation);
    }
}

impl Default for DelayPolicy {
    fn default() -> Self {
        Self::fixed(Duration::from_secs(DEFAULT_PROPAGATION_DELAY_SECS))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_delay_is_nonzero() {
        assert_eq!(
            DelayPolicy::default().propagation(),
            Duration::from_secs(DEFAULT_PROPAGATION_DELAY_SECS)
        );
        assert!(!DelayPolicy::default().propagation().is_zero());
    }

    #[test]
    fn test_none_returns_immediately() {
        // Would hang the suite if it actually slept.
        DelayPolicy::none().wait("test");
    }
}
