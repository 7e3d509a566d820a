//! Resource updates that only happen when the cluster would notice.
//!
//! Both operations recreate the resource inside an offline snapshot (delete,
//! then create with the caller's command). [`Client::has_resource_changed`]
//! asks the diff engine about the result and throws it away;
//! [`Client::update_resource`] pushes it and waits for the cluster to settle.

use crate::Client;
use crate::error::Result;
use crate::runner::CommandLine;
use crate::snapshot::Snapshot;
use crate::types::{ChangeDecision, PushOutcome, ResourceSpec, ResourceState, UpdateReport};
use std::time::Duration;

impl Client {
    fn recreate_offline<S: AsRef<str>>(
        &self,
        snapshot: &Snapshot,
        spec: &ResourceSpec,
        create: &[S],
    ) -> Result<()> {
        self.offline_checked(snapshot, &["resource", "delete", spec.name.as_str()], &spec.name)?;
        self.offline_checked(snapshot, create, &spec.name)?;
        Ok(())
    }

    /// Would recreating `spec` with `create` make the cluster act?
    pub fn has_resource_changed<S: AsRef<str>>(
        &self,
        spec: &ResourceSpec,
        create: &[S],
    ) -> Result<ChangeDecision> {
        let snapshot = self.backup()?;
        self.recreate_offline(&snapshot, spec, create)?;

        let decision = self.would_cluster_act(
            &spec.name,
            &snapshot.orig_path(),
            snapshot.path(),
            spec.is_composite(),
        )?;
        log::debug!(
            "has_resource_changed ({}) returned {} for resource {}",
            decision.strategy,
            decision.changed,
            spec.name
        );
        snapshot.discard();
        Ok(decision)
    }

    /// Recreate `spec` on the live cluster and wait for it to settle.
    ///
    /// The placement rule is re-added with `--force`: some pcs versions keep
    /// a bundle's location rule across the delete. The convergence wait is
    /// bounded by `settle_timeout`; running out of time is logged, not
    /// returned as an error, because the push has already been committed.
    pub fn update_resource<S: AsRef<str>>(
        &self,
        spec: &ResourceSpec,
        create: &[S],
        settle_timeout: Duration,
    ) -> Result<UpdateReport> {
        let snapshot = self.backup()?;
        self.recreate_offline(&snapshot, spec, create)?;

        if let Some(location) = spec.location_rule_args(true) {
            let subject = format!("location rule of {}", spec.name);
            self.offline_checked(&snapshot, &location, &subject)?;
        }

        let outcome = self.push_with_retry(&snapshot, &spec.retry)?;
        let settled = self.wait_for_settle(settle_timeout);
        snapshot.discard();

        Ok(UpdateReport {
            resource_id: spec.name.clone(),
            pushed: outcome == PushOutcome::Pushed,
            settled,
        })
    }

    /// Block until the cluster has no pending actions, at most `timeout`.
    ///
    /// Returns whether the cluster reported convergence in time.
    pub fn wait_for_settle(&self, timeout: Duration) -> bool {
        let secs = timeout.as_secs().max(1);
        let cmd = CommandLine::new(&self.settings.tools.timeout)
            .arg(secs.to_string())
            .arg(&self.settings.tools.crm_resource)
            .arg("--wait");
        match self.exec(&cmd) {
            Ok(result) if result.success() => true,
            Ok(result) => {
                if result.code == Some(124) {
                    log::warn!("cluster did not settle within {secs}s");
                } else {
                    log::warn!("{cmd} returned ({}): {}", result.status(), result.output().trim_end());
                }
                false
            }
            Err(e) => {
                log::warn!("could not wait for the cluster to settle: {e}");
                false
            }
        }
    }

    /// Classify a declared resource against the live cluster.
    pub fn resource_state<S: AsRef<str>>(
        &self,
        spec: &ResourceSpec,
        create: &[S],
    ) -> Result<ResourceState> {
        if self.show(&["resource", "show", spec.name.as_str()])?.is_none() {
            return Ok(ResourceState::NotExists);
        }
        if self.has_resource_changed(spec, create)?.changed {
            Ok(ResourceState::ChangeNeeded)
        } else {
            Ok(ResourceState::NoChangeNeeded)
        }
    }
}
