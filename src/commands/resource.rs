use anyhow::{Context as _, Result};
use cibkit::{LocationRule, ResourceSpec, RetryConfig, UpdateReport, Wrapper};
use serde_json::json;

use crate::Context;
use crate::cli::{ResourceArgs, RetryArgs};
use crate::commands::client;
use crate::ui;

pub fn changed(ctx: &Context, args: &ResourceArgs, json: bool) -> Result<()> {
    let client = client(ctx)?;
    let spec = spec_from(args, RetryConfig::no_retry());
    let create = create_command(args, &spec)?;
    let decision = client
        .has_resource_changed(&spec, &create)
        .with_context(|| format!("Could not evaluate {}", spec.name))?;

    if json {
        return ui::json(&decision);
    }
    if decision.changed {
        ui::warn(&format!("{} would be changed ({})", spec.name, decision.strategy));
        for evidence in &decision.evidence {
            ui::kv("touches", evidence);
        }
    } else {
        ui::success(&format!("{} is unchanged ({})", spec.name, decision.strategy));
    }
    Ok(())
}

pub fn update(
    ctx: &Context,
    args: &ResourceArgs,
    retry: &RetryArgs,
    settle_timeout: Option<u64>,
    if_changed: bool,
    json: bool,
) -> Result<()> {
    let client = client(ctx)?;
    let spec = spec_from(args, ctx.config.retry_config(retry));
    let create = create_command(args, &spec)?;

    if if_changed {
        let decision = client
            .has_resource_changed(&spec, &create)
            .with_context(|| format!("Could not evaluate {}", spec.name))?;
        if !decision.changed {
            if json {
                return ui::json(&skipped_report(&spec));
            }
            if !ctx.quiet {
                ui::success(&format!("{} is unchanged, nothing to do", spec.name));
            }
            return Ok(());
        }
    }

    let report = client
        .update_resource(&spec, &create, ctx.config.settle_timeout(settle_timeout))
        .with_context(|| format!("Could not update {}", spec.name))?;

    if json {
        return ui::json(&report);
    }
    if ctx.quiet {
        return Ok(());
    }
    if report.pushed {
        ui::success(&format!("Updated {}", report.resource_id));
    } else {
        ui::info(&format!("{} already matched the live CIB", report.resource_id));
    }
    if !report.settled {
        ui::warn("The cluster had not settled when the wait ended");
    }
    Ok(())
}

pub fn state(ctx: &Context, args: &ResourceArgs, json: bool) -> Result<()> {
    let client = client(ctx)?;
    let spec = spec_from(args, RetryConfig::no_retry());
    let create = create_command(args, &spec)?;
    let state = client
        .resource_state(&spec, &create)
        .with_context(|| format!("Could not classify {}", spec.name))?;

    if json {
        return ui::json(&json!({ "resource_id": spec.name, "state": state }));
    }
    ui::kv(&spec.name, &state.to_string());
    Ok(())
}

/// Report for an update that was skipped; no convergence wait ran.
fn skipped_report(spec: &ResourceSpec) -> UpdateReport {
    UpdateReport {
        resource_id: spec.name.clone(),
        pushed: false,
        settled: false,
    }
}

fn spec_from(args: &ResourceArgs, retry: RetryConfig) -> ResourceSpec {
    let wrapper = match (&args.bundle, args.clone, args.master) {
        (Some(bundle), _, _) => Wrapper::Bundle(bundle.clone()),
        (None, _, true) => Wrapper::Master,
        (None, true, false) => Wrapper::Clone,
        (None, false, false) => Wrapper::None,
    };

    let mut spec = ResourceSpec::new(&args.name)
        .with_wrapper(wrapper)
        .with_retry(retry);
    if let Some(agent) = &args.agent {
        spec = spec.with_agent(agent);
    }
    for (key, value) in &args.params {
        spec = spec.with_param(key, value);
    }
    if let Some(expr) = &args.rule {
        spec = spec.with_location_rule(LocationRule {
            resource_discovery: args.resource_discovery.clone(),
            score: args.score.clone(),
            score_attribute: args.score_attribute.clone(),
            expression: expr.split_whitespace().map(str::to_string).collect(),
        });
    }
    spec
}

fn create_command(args: &ResourceArgs, spec: &ResourceSpec) -> Result<Vec<String>> {
    if !args.create.is_empty() {
        return Ok(args.create.clone());
    }
    spec.create_args()
        .context("--agent is required unless a creation command follows `--`")
}
