//! Change detection: would the cluster act on a candidate CIB?
//!
//! Two strategies answer the same question:
//!
//! - **Simulation** runs `crm_simulate` against the candidate and looks for
//!   the resource in the resulting transition graph. Always correct.
//! - **Direct diff** runs `crm_diff` between the original and candidate copy
//!   and looks for the resource in the change report. Cheaper, but some
//!   `crm_diff` builds report reordered attributes inside bundle storage
//!   mappings as a change.
//!
//! [`probe_crm_diff`] detects the broken builds. The simulation is treated as
//! the reference: with cross-checking enabled a disagreement is logged and the
//! simulation answer wins.

pub mod graph;
pub mod report;

use crate::Client;
use crate::error::{Error, Result};
use crate::runner::{CommandLine, Runner};
use crate::snapshot::SIMULATE_PREFIX;
use crate::types::{ChangeDecision, Strategy, StrategyChoice, ToolPaths};
use std::fs;
use std::path::Path;

/// Probe document: bundle storage mappings in one attribute order.
pub const PROBE_ORIGINAL: &str = r#"
<cib crm_feature_set="3.0.14" validate-with="pacemaker-2.10" epoch="86" num_updates="125" admin_epoch="0">
  <configuration>
    <resources>
      <bundle id="galera-bundle">
        <docker image="openstack-mariadb:pcmklatest"/>
        <storage>
          <storage-mapping target-dir="/foo" options="rw" id="mysql-foo" source-dir="/foo"/>
          <storage-mapping target-dir="/bar" options="rw" id="mysql-bar" source-dir="/bar"/>
        </storage>
      </bundle>
    </resources>
  </configuration>
</cib>
"#;

/// Probe document: the same mappings with attributes reordered.
pub const PROBE_REORDERED: &str = r#"
<cib crm_feature_set="3.0.14" validate-with="pacemaker-2.10" epoch="86" num_updates="125" admin_epoch="0">
  <configuration>
    <resources>
      <bundle id="galera-bundle">
        <docker image="openstack-mariadb:pcmklatest"/>
        <storage>
          <storage-mapping id="mysql-foo" options="rw" source-dir="/foo" target-dir="/foo"/>
          <storage-mapping id="mysql-bar" options="rw" source-dir="/bar" target-dir="/bar"/>
        </storage>
      </bundle>
    </resources>
  </configuration>
</cib>
"#;

/// Check whether this host's `crm_diff` reports attribute reordering as a
/// change. Returns `true` for a buggy build.
pub fn probe_crm_diff(runner: &dyn Runner, tools: &ToolPaths) -> Result<bool> {
    let cmd = CommandLine::new(&tools.crm_diff)
        .arg("--cib")
        .arg(format!("--original-string={PROBE_ORIGINAL}"))
        .arg(format!("--new-string={PROBE_REORDERED}"));
    let result = runner.run(&cmd)?;

    match result.code {
        Some(0) => Ok(false),
        Some(1) => {
            log::debug!("crm_diff reports reordered attributes as a change, falling back to crm_simulate");
            Ok(true)
        }
        _ => Err(Error::Tool {
            command: format!("{} --cib --original-string=... --new-string=...", tools.crm_diff.display()),
            code: result.status(),
            output: result.output(),
        }),
    }
}

/// Resolve the configured choice into the strategy used for this run.
pub fn select_strategy(
    choice: StrategyChoice,
    runner: &dyn Runner,
    tools: &ToolPaths,
) -> Result<Strategy> {
    match choice {
        StrategyChoice::Simulation => Ok(Strategy::Simulation),
        StrategyChoice::DirectDiff => Ok(Strategy::DirectDiff),
        StrategyChoice::Auto => {
            if probe_crm_diff(runner, tools)? {
                Ok(Strategy::Simulation)
            } else {
                Ok(Strategy::DirectDiff)
            }
        }
    }
}

impl Client {
    /// Decide whether the cluster would act on `resource_id` if `candidate`
    /// replaced `live`.
    pub fn would_cluster_act(
        &self,
        resource_id: &str,
        live: &Path,
        candidate: &Path,
        composite: bool,
    ) -> Result<ChangeDecision> {
        match self.strategy {
            Strategy::Simulation => self.simulate(resource_id, candidate, composite),
            Strategy::DirectDiff => {
                let decision = self.direct_diff(resource_id, live, candidate)?;
                if !self.settings.cross_check {
                    return Ok(decision);
                }
                let reference = self.simulate(resource_id, candidate, composite)?;
                if reference.changed != decision.changed {
                    log::warn!(
                        "crm_diff and crm_simulate disagree on {resource_id} (diff: {}, simulation: {}); using the simulation",
                        decision.changed,
                        reference.changed
                    );
                }
                Ok(reference)
            }
        }
    }

    fn simulate(&self, resource_id: &str, candidate: &Path, composite: bool) -> Result<ChangeDecision> {
        let graph_file = self.snapshots.acquire(SIMULATE_PREFIX);
        let cmd = CommandLine::new(&self.settings.tools.crm_simulate)
            .arg("-x")
            .arg(candidate)
            .arg("-s")
            .arg("-G")
            .arg(graph_file.path());
        let result = self.exec(&cmd)?;
        if !result.success() {
            return Err(Error::Tool {
                command: cmd.to_string(),
                code: result.status(),
                output: result.output(),
            });
        }

        let xml = fs::read_to_string(graph_file.path())
            .map_err(|e| crate::error::io_err(graph_file.path(), e))?;
        let ids = graph::scheduled_ids(&xml)?;
        let evidence = graph::matching_ids(&ids, resource_id, composite);
        graph_file.discard();

        Ok(ChangeDecision {
            resource_id: resource_id.to_string(),
            changed: !evidence.is_empty(),
            strategy: Strategy::Simulation,
            evidence,
        })
    }

    fn direct_diff(&self, resource_id: &str, live: &Path, candidate: &Path) -> Result<ChangeDecision> {
        let cmd = CommandLine::new(&self.settings.tools.crm_diff)
            .arg("--cib")
            .arg("-o")
            .arg(live)
            .arg("-n")
            .arg(candidate);
        let result = self.exec(&cmd)?;

        let evidence = match result.code {
            Some(0) => Vec::new(),
            Some(1) => {
                let changes = report::parse_changes(&result.stdout)?;
                report::touching(&changes, resource_id)
                    .into_iter()
                    .map(|c| c.path.clone())
                    .collect()
            }
            _ => {
                return Err(Error::Tool {
                    command: cmd.to_string(),
                    code: result.status(),
                    output: result.output(),
                });
            }
        };

        Ok(ChangeDecision {
            resource_id: resource_id.to_string(),
            changed: !evidence.is_empty(),
            strategy: Strategy::DirectDiff,
            evidence,
        })
    }
}
