//! # cibkit
//!
//! Optimistic transactions against the Pacemaker CIB.
//!
//! `pcs` offers no multi-writer transactions, so every change follows the
//! same protocol:
//!
//! 1. export the live CIB into a snapshot and freeze an `.orig` twin
//! 2. run the mutation offline with `pcs -f <snapshot>`
//! 3. skip the push entirely if the snapshot did not change
//! 4. push it back (scoped to the delta when `pcs` supports `diff-against`)
//! 5. retry with a fresh snapshot when the live cluster rejected the push
//!
//! Snapshots are always removed, whatever the outcome.
//!
//! ## Example
//!
//! ```no_run
//! use cibkit::{Client, RetryConfig, ResourceSpec, Settings};
//! use std::time::Duration;
//!
//! let client = Client::new(Settings::default()).expect("pacemaker tools not available");
//!
//! // Mutate the CIB, retrying on concurrent changes
//! let retry = RetryConfig::new(3, Duration::from_secs(5));
//! client.apply(&["property", "set", "maintenance-mode=false"], &retry).unwrap();
//!
//! // Recreate a resource only if the cluster would notice
//! let spec = ResourceSpec::new("vip")
//!     .with_agent("ocf:heartbeat:IPaddr2")
//!     .with_param("ip", "192.168.24.6");
//! let create = spec.create_args().unwrap();
//! if client.has_resource_changed(&spec, &create).unwrap().changed {
//!     client.update_resource(&spec, &create, Duration::from_secs(600)).unwrap();
//! }
//! ```

#![warn(missing_docs)]
#![warn(clippy::all)]

pub mod diff;
pub mod error;
pub mod resource;
pub mod retry;
pub mod runner;
pub mod snapshot;
pub mod transaction;
pub mod types;

#[cfg(test)]
pub(crate) mod testing;

pub use error::{Error, ErrorCategory, Result};
pub use runner::{CommandLine, CommandResult, Runner, SystemRunner};
pub use types::{
    ChangeDecision, LocationRule, PushOutcome, ResourceSpec, ResourceState, RetryConfig, Settings,
    Strategy, StrategyChoice, ToolPaths, UpdateReport, Wrapper,
};

use snapshot::SnapshotDir;

/// High-level client for CIB transactions.
///
/// The change-detection strategy is resolved once, when the client is built,
/// and reused for every decision made through it.
pub struct Client {
    runner: Box<dyn Runner>,
    settings: Settings,
    snapshots: SnapshotDir,
    strategy: Strategy,
}

impl Client {
    /// Create a client that runs the real pacemaker tools.
    pub fn new(settings: Settings) -> Result<Self> {
        Self::with_runner(Box::new(SystemRunner), settings)
    }

    /// Create a client with a custom runner, resolving the diff strategy from
    /// the settings (probing `crm_diff` when set to auto).
    pub fn with_runner(runner: Box<dyn Runner>, settings: Settings) -> Result<Self> {
        let strategy = diff::select_strategy(settings.diff_strategy, runner.as_ref(), &settings.tools)?;
        log::debug!("change detection strategy: {strategy}");
        Ok(Self::with_strategy(runner, settings, strategy))
    }

    /// Create a client with an already known strategy.
    pub fn with_strategy(runner: Box<dyn Runner>, settings: Settings, strategy: Strategy) -> Self {
        let snapshots = SnapshotDir::new(&settings.snapshot_dir);
        Self {
            runner,
            settings,
            snapshots,
            strategy,
        }
    }

    /// The change-detection strategy in use.
    pub fn strategy(&self) -> Strategy {
        self.strategy
    }

    /// The settings this client was built with.
    pub fn settings(&self) -> &Settings {
        &self.settings
    }

    /// The snapshot directory.
    pub fn snapshot_dir(&self) -> &SnapshotDir {
        &self.snapshots
    }

    fn pcs(&self) -> CommandLine {
        CommandLine::new(&self.settings.tools.pcs)
    }

    fn exec(&self, cmd: &CommandLine) -> Result<CommandResult> {
        log::debug!("running {cmd}");
        let result = self.runner.run(cmd)?;
        log::debug!("{} returned ({}): {}", cmd.program_name(), result.status(), result.output().trim_end());
        Ok(result)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::{FakeCib, FakeCluster, settings_in};
    use tempfile::TempDir;

    #[test]
    fn test_with_runner_probes_once() {
        let tmp = TempDir::new().unwrap();
        let fake = FakeCluster::new(FakeCib::default());
        let client = Client::with_runner(Box::new(fake.clone()), settings_in(tmp.path())).unwrap();

        assert_eq!(client.strategy(), Strategy::DirectDiff);
        assert_eq!(fake.calls_to("crm_diff").len(), 1);
        assert_eq!(client.snapshot_dir().path(), tmp.path());
    }

    #[test]
    fn test_forced_simulation() {
        let tmp = TempDir::new().unwrap();
        let fake = FakeCluster::new(FakeCib::default());
        let mut settings = settings_in(tmp.path());
        settings.diff_strategy = StrategyChoice::Simulation;
        let client = Client::with_runner(Box::new(fake.clone()), settings).unwrap();

        assert_eq!(client.strategy(), Strategy::Simulation);
        assert!(fake.calls_to("crm_diff").is_empty());
    }
}
