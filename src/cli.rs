use clap::{Args, Parser, Subcommand};
use clap_complete::Shell;
use std::path::PathBuf;

#[derive(Parser)]
#[command(name = "cibtx")]
#[command(version)]
#[command(about = "Optimistic, retrying transactions against the Pacemaker CIB", long_about = None)]
#[command(propagate_version = true)]
pub struct Cli {
    /// Verbosity level
    #[arg(short, long, action = clap::ArgAction::Count, global = true)]
    pub verbose: u8,

    /// Suppress non-essential output
    #[arg(short, long, global = true)]
    pub quiet: bool,

    /// Config file (defaults to $CIBTX_CONFIG, then /etc/cibtx/config.toml)
    #[arg(short, long, global = true, value_name = "PATH")]
    pub config: Option<PathBuf>,

    #[command(subcommand)]
    pub command: Command,
}

#[derive(Subcommand)]
pub enum Command {
    /// Apply a pcs mutation through a snapshot, retrying rejected pushes
    Run {
        #[command(flatten)]
        retry: RetryArgs,

        /// pcs arguments, e.g. `property set maintenance-mode=true`
        #[arg(required = true, trailing_var_arg = true, allow_hyphen_values = true)]
        args: Vec<String>,
    },

    /// Run a read-only pcs query against a snapshot of the live CIB
    Show {
        /// pcs arguments, e.g. `resource show vip`
        #[arg(required = true, trailing_var_arg = true, allow_hyphen_values = true)]
        args: Vec<String>,
    },

    /// Run an online create command, then check the resource shows up
    Create {
        /// Name of the resource being created
        name: String,

        #[command(flatten)]
        retry: RetryArgs,

        /// pcs arguments, e.g. `resource create vip IPaddr2 ip=10.0.0.5`
        #[arg(required = true, trailing_var_arg = true, allow_hyphen_values = true)]
        args: Vec<String>,
    },

    /// Tell whether recreating a resource would make the cluster act
    Changed {
        #[command(flatten)]
        resource: ResourceArgs,

        /// Print the decision as JSON
        #[arg(long)]
        json: bool,
    },

    /// Recreate a resource on the live cluster and wait for it to settle
    Update {
        #[command(flatten)]
        resource: ResourceArgs,

        #[command(flatten)]
        retry: RetryArgs,

        /// Seconds to wait for the cluster to settle after the push
        #[arg(long, value_name = "SECS")]
        settle_timeout: Option<u64>,

        /// Only update when the cluster would act on the change
        #[arg(long)]
        if_changed: bool,

        /// Print the report as JSON
        #[arg(long)]
        json: bool,
    },

    /// Classify a declared resource against the live cluster
    State {
        #[command(flatten)]
        resource: ResourceArgs,

        /// Print the state as JSON
        #[arg(long)]
        json: bool,
    },

    /// Report the change detection strategy and pcs capabilities
    Probe {
        /// Print the report as JSON
        #[arg(long)]
        json: bool,
    },

    /// Generate shell completions
    Completions {
        /// Shell to generate completions for
        #[arg(value_enum)]
        shell: Shell,
    },
}

/// Per-invocation overrides of the `[retry]` config section.
#[derive(Args, Clone, Default)]
pub struct RetryArgs {
    /// Maximum number of push attempts
    #[arg(long, value_name = "N")]
    pub tries: Option<u32>,

    /// Seconds to sleep between attempts
    #[arg(long, value_name = "SECS")]
    pub try_sleep: Option<u64>,

    /// Seconds to sleep after a successful push
    #[arg(long, value_name = "SECS")]
    pub post_success_sleep: Option<u64>,
}

/// A declared resource.
#[derive(Args, Clone)]
pub struct ResourceArgs {
    /// Resource id
    pub name: String,

    /// Resource agent, e.g. `ocf:heartbeat:IPaddr2`
    #[arg(long)]
    pub agent: Option<String>,

    /// Instance parameter, repeatable, order preserved
    #[arg(short = 'p', long = "param", value_name = "KEY=VALUE", value_parser = parse_param)]
    pub params: Vec<(String, String)>,

    /// Bundle the resource runs in
    #[arg(long, conflicts_with_all = ["clone", "master"])]
    pub bundle: Option<String>,

    /// The resource is cloned
    #[arg(long, conflicts_with = "master")]
    pub clone: bool,

    /// The resource is a promotable (master/slave) clone
    #[arg(long)]
    pub master: bool,

    /// Location rule expression, e.g. `--rule "galera-role eq true"`
    #[arg(long, value_name = "EXPR")]
    pub rule: Option<String>,

    /// `resource-discovery` option of the location rule
    #[arg(long, requires = "rule")]
    pub resource_discovery: Option<String>,

    /// `score` option of the location rule
    #[arg(long, requires = "rule")]
    pub score: Option<String>,

    /// `score-attribute` option of the location rule
    #[arg(long, requires = "rule")]
    pub score_attribute: Option<String>,

    /// Custom pcs creation command; built from --agent and --param when empty
    #[arg(last = true)]
    pub create: Vec<String>,
}

fn parse_param(s: &str) -> Result<(String, String), String> {
    match s.split_once('=') {
        Some((key, value)) if !key.is_empty() => Ok((key.to_string(), value.to_string())),
        _ => Err(format!("expected KEY=VALUE, got '{s}'")),
    }
}
