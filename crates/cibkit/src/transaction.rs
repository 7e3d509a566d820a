//! The backup / mutate offline / push protocol.
//!
//! Each attempt exports its own snapshot, so concurrent writers never see
//! each other's offline copies. A push the live cluster rejects is retried
//! with a fresh snapshot; an offline command that fails against a fresh
//! export is a malformed request and is never retried.

use crate::Client;
use crate::error::{Error, Result};
use crate::retry::{self, LogCallback, try_text};
use crate::runner::{CommandLine, CommandResult};
use crate::snapshot::{BACKUP_PREFIX, Snapshot};
use crate::types::{PushOutcome, RetryConfig};
use std::thread;

fn join<S: AsRef<str>>(args: &[S]) -> String {
    args.iter().map(|a| a.as_ref()).collect::<Vec<&str>>().join(" ")
}

impl Client {
    /// Export the live CIB into a new snapshot and freeze its `.orig` twin.
    pub fn backup(&self) -> Result<Snapshot> {
        self.snapshots.ensure()?;
        let snapshot = self.snapshots.acquire(BACKUP_PREFIX);
        let cmd = self
            .pcs()
            .args(["cluster", "cib"])
            .arg(snapshot.path());
        let result = self.exec(&cmd)?;
        if !result.success() {
            return Err(Error::Backup {
                command: cmd.to_string(),
                code: result.status(),
                output: result.output(),
            });
        }
        snapshot.freeze()?;
        Ok(snapshot)
    }

    fn offline_command<S: AsRef<str>>(&self, snapshot: &Snapshot, args: &[S]) -> CommandLine {
        self.pcs()
            .arg("-f")
            .arg(snapshot.path())
            .args(args.iter().map(|a| a.as_ref()))
    }

    /// Run `pcs -f <snapshot> <args>`, returning the result as is.
    pub fn offline<S: AsRef<str>>(&self, snapshot: &Snapshot, args: &[S]) -> Result<CommandResult> {
        self.exec(&self.offline_command(snapshot, args))
    }

    /// Run an offline command that must succeed against a fresh snapshot.
    pub fn offline_checked<S: AsRef<str>>(
        &self,
        snapshot: &Snapshot,
        args: &[S],
        subject: &str,
    ) -> Result<String> {
        let cmd = self.offline_command(snapshot, args);
        let result = self.exec(&cmd)?;
        if !result.success() {
            return Err(Error::OfflineCommand {
                command: cmd.to_string(),
                resource: subject.to_string(),
                output: result.output(),
            });
        }
        Ok(result.output())
    }

    /// Whether `pcs cluster cib-push` understands `diff-against=`.
    ///
    /// Asked again on every push; pcs may be upgraded underneath us.
    pub fn supports_diff_against(&self) -> bool {
        let cmd = self.pcs().args(["cluster", "cib-push", "--help"]);
        match self.exec(&cmd) {
            Ok(result) => result.output().contains("diff-against"),
            Err(e) => {
                log::debug!("could not ask pcs for cib-push options: {e}");
                false
            }
        }
    }

    /// Push a snapshot back to the live cluster.
    ///
    /// Nothing is sent when the snapshot is byte-identical to its `.orig`
    /// twin. The snapshot itself is left for the caller to release.
    pub fn push(&self, snapshot: &Snapshot) -> Result<PushOutcome> {
        if snapshot.is_unchanged()? {
            log::debug!(
                "push_cib: {} and its original copy are identical, skipping",
                snapshot.path().display()
            );
            return Ok(PushOutcome::Unchanged);
        }

        let mut cmd = self
            .pcs()
            .args(["cluster", "cib-push"])
            .arg(snapshot.path());
        if self.supports_diff_against() {
            cmd = cmd.arg_joined("diff-against=", &snapshot.orig_path());
        }

        let result = self.exec(&cmd)?;
        if result.success() {
            log::info!("pushed {} to the live cluster", snapshot.path().display());
            Ok(PushOutcome::Pushed)
        } else {
            log::debug!("push_cib failed: {cmd} returned {}", result.status());
            Ok(PushOutcome::Rejected {
                command: cmd.to_string(),
                code: result.status(),
                output: result.output(),
            })
        }
    }

    /// Push one held snapshot, retrying rejected pushes.
    ///
    /// The snapshot stays in place between tries and is not released here.
    pub fn push_with_retry(&self, snapshot: &Snapshot, retry: &RetryConfig) -> Result<PushOutcome> {
        let label = format!("push of {}", snapshot.path().display());
        let outcome = retry::with_retry(&label, retry, Some(&LogCallback), |attempt| {
            log::debug!("{}pushing {}", try_text(attempt, retry.attempts()), snapshot.path().display());
            match self.push(snapshot)? {
                PushOutcome::Rejected {
                    command,
                    code,
                    output,
                } => Err(Error::PushRejected {
                    command,
                    code,
                    output,
                }),
                outcome => Ok(outcome),
            }
        })?;
        retry::settle(retry);
        Ok(outcome)
    }

    /// Read-only query against a snapshot of the live CIB.
    ///
    /// Returns the command output, or `None` when pcs reported failure. The
    /// snapshot is never pushed.
    pub fn show<S: AsRef<str>>(&self, args: &[S]) -> Result<Option<String>> {
        let snapshot = self.backup()?;
        let result = self.offline(&snapshot, args);
        snapshot.discard();
        let result = result?;
        Ok(result.success().then(|| result.output()))
    }

    /// Apply a pcs mutation through the full snapshot / push protocol.
    ///
    /// Returns the output of the offline command. Rejected pushes are retried
    /// up to `retry.max_tries` times, each with a fresh snapshot.
    pub fn apply<S: AsRef<str>>(&self, args: &[S], retry: &RetryConfig) -> Result<String> {
        let label = format!("pcs -f <cib> {}", join(args));
        let max_tries = retry.attempts();

        let output = retry::with_retry(&label, retry, Some(&LogCallback), |attempt| {
            let snapshot = self.backup()?;
            let cmd = self.offline_command(&snapshot, args);
            log::debug!("{}{cmd}", try_text(attempt, max_tries));

            let result = self.exec(&cmd)?;
            if !result.success() {
                return Err(Error::OfflineCommand {
                    command: cmd.to_string(),
                    resource: join(args),
                    output: result.output(),
                });
            }

            let outcome = self.push(&snapshot)?;
            snapshot.discard();
            match outcome {
                PushOutcome::Rejected {
                    command,
                    code,
                    output,
                } => Err(Error::PushRejected {
                    command,
                    code,
                    output,
                }),
                PushOutcome::Unchanged | PushOutcome::Pushed => Ok(result.output()),
            }
        })?;

        retry::settle(retry);
        Ok(output)
    }

    /// Create a resource directly on the live cluster, then check it exists.
    ///
    /// The existence check is advisory: a failed check is logged and the
    /// creation output is still returned. Failed creations are retried.
    pub fn create_verified<S: AsRef<str>>(
        &self,
        resource_name: &str,
        args: &[S],
        retry: &RetryConfig,
    ) -> Result<String> {
        let label = format!("pcs {}", join(args));
        let max_tries = retry.attempts();

        let output = retry::with_retry(&label, retry, Some(&LogCallback), |attempt| {
            let cmd = self.pcs().args(args.iter().map(|a| a.as_ref()));
            log::debug!("{}{cmd}", try_text(attempt, max_tries));

            let result = self.exec(&cmd)?;
            if !result.success() {
                return Err(Error::CommandFailed {
                    command: cmd.to_string(),
                    code: result.status(),
                    output: result.output(),
                });
            }

            if !retry.try_sleep.is_zero() {
                thread::sleep(retry.try_sleep);
            }
            let verify = self.pcs().args(["resource", "show", resource_name]);
            log::debug!("verifying with: {verify}");
            match self.exec(&verify) {
                Ok(check) if check.success() => {}
                Ok(_) => log::warn!("verification of pcs resource creation failed for {resource_name}"),
                Err(e) => log::warn!("could not verify creation of {resource_name}: {e}"),
            }
            Ok(result.output())
        })?;

        Ok(output)
    }
}
