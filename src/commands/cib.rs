use anyhow::{Context as _, Result, bail};
use serde_json::json;

use crate::Context;
use crate::cli::RetryArgs;
use crate::commands::client;
use crate::ui;

pub fn run(ctx: &Context, args: &[String], retry: &RetryArgs) -> Result<()> {
    let client = client(ctx)?;
    let retry = ctx.config.retry_config(retry);
    let output = client
        .apply(args, &retry)
        .with_context(|| format!("pcs {} was not applied", args.join(" ")))?;

    if !ctx.quiet {
        ui::output(&output);
        ui::success("CIB updated");
    }
    Ok(())
}

pub fn show(ctx: &Context, args: &[String]) -> Result<()> {
    let client = client(ctx)?;
    match client.show(args)? {
        Some(output) => {
            print!("{output}");
            Ok(())
        }
        None => bail!("pcs {} reported failure", args.join(" ")),
    }
}

pub fn create(ctx: &Context, name: &str, args: &[String], retry: &RetryArgs) -> Result<()> {
    let client = client(ctx)?;
    let retry = ctx.config.retry_config(retry);
    let output = client
        .create_verified(name, args, &retry)
        .with_context(|| format!("Could not create {name}"))?;

    if !ctx.quiet {
        ui::output(&output);
        ui::success(&format!("Created {name}"));
    }
    Ok(())
}

pub fn probe(ctx: &Context, json: bool) -> Result<()> {
    let client = client(ctx)?;
    let strategy = client.strategy();
    let diff_against = client.supports_diff_against();
    let snapshot_dir = client.snapshot_dir().path().display().to_string();

    if json {
        return ui::json(&json!({
            "strategy": strategy,
            "diff_against": diff_against,
            "snapshot_dir": snapshot_dir,
            "cross_check": ctx.config.cluster.cross_check,
        }));
    }

    ui::kv("strategy", &strategy.to_string());
    ui::kv("diff-against", if diff_against { "supported" } else { "not supported" });
    ui::kv("snapshot dir", &snapshot_dir);
    if ctx.config.cluster.cross_check {
        ui::info("direct-diff answers are confirmed by simulation");
    }
    Ok(())
}
