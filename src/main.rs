mod cli;
mod commands;
mod config;
mod ui;

use anyhow::Result;
use clap::{CommandFactory, Parser};
use clap_complete::generate;
use cli::{Cli, Command};
use std::io;
use std::process::ExitCode;

/// Global context for the application
pub struct Context {
    pub quiet: bool,
    pub config: config::Config,
}

fn main() -> ExitCode {
    let cli = Cli::parse();

    // Initialize logging based on verbosity
    let log_level = match cli.verbose {
        0 => log::LevelFilter::Warn,
        1 => log::LevelFilter::Info,
        2 => log::LevelFilter::Debug,
        _ => log::LevelFilter::Trace,
    };

    env_logger::Builder::new()
        .filter_level(if cli.quiet {
            log::LevelFilter::Error
        } else {
            log_level
        })
        .format_timestamp(None)
        .init();

    match run(cli) {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            report(&e);
            ExitCode::FAILURE
        }
    }
}

fn run(cli: Cli) -> Result<()> {
    if let Command::Completions { shell } = cli.command {
        let mut cmd = Cli::command();
        generate(shell, &mut cmd, "cibtx", &mut io::stdout());
        return Ok(());
    }

    let ctx = Context {
        quiet: cli.quiet,
        config: config::Config::load(cli.config.as_deref())?,
    };

    match cli.command {
        Command::Run { retry, args } => commands::cib::run(&ctx, &args, &retry),
        Command::Show { args } => commands::cib::show(&ctx, &args),
        Command::Create { name, retry, args } => commands::cib::create(&ctx, &name, &args, &retry),
        Command::Probe { json } => commands::cib::probe(&ctx, json),
        Command::Changed { resource, json } => commands::resource::changed(&ctx, &resource, json),
        Command::Update {
            resource,
            retry,
            settle_timeout,
            if_changed,
            json,
        } => commands::resource::update(&ctx, &resource, &retry, settle_timeout, if_changed, json),
        Command::State { resource, json } => commands::resource::state(&ctx, &resource, json),
        Command::Completions { .. } => Ok(()),
    }
}

/// Print the error chain, plus advice when it came out of the cluster engine.
fn report(err: &anyhow::Error) {
    ui::error(&format!("{err:#}"));
    if let Some(cib_err) = err.chain().find_map(|e| e.downcast_ref::<cibkit::Error>()) {
        let category = cib_err.category();
        ui::hint(&format!("{}: {}", category.description(), category.advice()));
    }
}
