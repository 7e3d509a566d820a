//! Core types for CIB transactions.

use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use std::time::Duration;

/// Location of the pacemaker command-line tools.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ToolPaths {
    /// `pcs` executable
    pub pcs: PathBuf,
    /// `crm_diff` executable
    pub crm_diff: PathBuf,
    /// `crm_simulate` executable
    pub crm_simulate: PathBuf,
    /// `crm_resource` executable
    pub crm_resource: PathBuf,
    /// coreutils `timeout`, used to bound the convergence wait
    pub timeout: PathBuf,
}

impl Default for ToolPaths {
    fn default() -> Self {
        Self {
            pcs: PathBuf::from("/usr/sbin/pcs"),
            crm_diff: PathBuf::from("/usr/sbin/crm_diff"),
            crm_simulate: PathBuf::from("/usr/sbin/crm_simulate"),
            crm_resource: PathBuf::from("/usr/sbin/crm_resource"),
            timeout: PathBuf::from("/usr/bin/timeout"),
        }
    }
}

/// How change detection should pick its strategy.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum StrategyChoice {
    /// Probe `crm_diff` once and use it unless it is buggy
    #[default]
    Auto,
    /// Always drive `crm_simulate`
    Simulation,
    /// Always trust `crm_diff`
    DirectDiff,
}

/// Settings for talking to one cluster.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct Settings {
    /// Tool locations
    pub tools: ToolPaths,
    /// Directory holding snapshots; pacemaker's own CIB directory is used by
    /// default because only root and hacluster can read it
    pub snapshot_dir: PathBuf,
    /// Strategy selection for change detection
    pub diff_strategy: StrategyChoice,
    /// Confirm every direct-diff answer with a simulation
    pub cross_check: bool,
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            tools: ToolPaths::default(),
            snapshot_dir: PathBuf::from(crate::snapshot::DEFAULT_SNAPSHOT_DIR),
            diff_strategy: StrategyChoice::Auto,
            cross_check: false,
        }
    }
}

/// Retry tuning for one transaction.
#[derive(Debug, Clone, PartialEq)]
pub struct RetryConfig {
    /// Maximum number of attempts (at least one is always made)
    pub max_tries: u32,
    /// Delay before the second attempt
    pub try_sleep: Duration,
    /// Multiplier applied to the delay after every failed attempt
    pub backoff_factor: f64,
    /// Maximum delay between attempts
    pub max_delay: Duration,
    /// Sleep after a successful push so the cluster can converge
    pub post_success_sleep: Duration,
}

impl Default for RetryConfig {
    fn default() -> Self {
        Self {
            max_tries: 1,
            try_sleep: Duration::ZERO,
            backoff_factor: 1.0,
            max_delay: Duration::from_secs(300),
            post_success_sleep: Duration::ZERO,
        }
    }
}

impl RetryConfig {
    /// Create a retry config with a constant delay between tries.
    pub fn new(max_tries: u32, try_sleep: Duration) -> Self {
        Self {
            max_tries,
            try_sleep,
            ..Default::default()
        }
    }

    /// Create a config that never retries.
    pub fn no_retry() -> Self {
        Self::default()
    }

    /// Set the multiplier for exponential backoff.
    pub fn with_backoff(mut self, factor: f64) -> Self {
        self.backoff_factor = factor;
        self
    }

    /// Set the post-success settle sleep.
    pub fn with_post_success_sleep(mut self, sleep: Duration) -> Self {
        self.post_success_sleep = sleep;
        self
    }

    /// Number of attempts actually made.
    pub fn attempts(&self) -> u32 {
        self.max_tries.max(1)
    }

    /// Calculate the delay after a given failed attempt (0-indexed).
    ///
    /// `max_delay` only bounds backoff growth; the configured `try_sleep` is
    /// always honoured in full.
    pub fn delay_for_attempt(&self, attempt: u32) -> Duration {
        let delay = self.try_sleep.as_secs_f64() * self.backoff_factor.powi(attempt as i32);
        let ceiling = self.max_delay.max(self.try_sleep).as_secs_f64();
        Duration::from_secs_f64(delay.min(ceiling).max(0.0))
    }
}

/// How a resource is wrapped in the CIB.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase", tag = "kind", content = "name")]
pub enum Wrapper {
    /// Plain primitive
    #[default]
    None,
    /// Cloned primitive (`<name>-clone`)
    Clone,
    /// Promotable clone (`<name>-master`)
    Master,
    /// Member of the named bundle
    Bundle(String),
}

/// Placement rule attached to a resource.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct LocationRule {
    /// `resource-discovery=` option
    pub resource_discovery: Option<String>,
    /// `score=` option
    pub score: Option<String>,
    /// `score-attribute=` option
    pub score_attribute: Option<String>,
    /// Rule expression tokens, e.g. `["galera-role", "eq", "true"]`
    pub expression: Vec<String>,
}

/// Logical description of one managed resource.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ResourceSpec {
    /// Unique resource id
    pub name: String,
    /// Resource agent, e.g. `ocf:heartbeat:IPaddr2`
    pub agent: Option<String>,
    /// Ordered creation parameters
    pub params: Vec<(String, String)>,
    /// Clone/master/bundle wrapping
    pub wrapper: Wrapper,
    /// Optional placement rule
    pub location_rule: Option<LocationRule>,
    /// Retry tuning
    #[serde(skip)]
    pub retry: RetryConfig,
}

impl ResourceSpec {
    /// Create a plain resource spec.
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            agent: None,
            params: Vec::new(),
            wrapper: Wrapper::None,
            location_rule: None,
            retry: RetryConfig::default(),
        }
    }

    /// Set the resource agent.
    pub fn with_agent(mut self, agent: impl Into<String>) -> Self {
        self.agent = Some(agent.into());
        self
    }

    /// Append a creation parameter.
    pub fn with_param(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.params.push((key.into(), value.into()));
        self
    }

    /// Set the wrapper.
    pub fn with_wrapper(mut self, wrapper: Wrapper) -> Self {
        self.wrapper = wrapper;
        self
    }

    /// Set the placement rule.
    pub fn with_location_rule(mut self, rule: LocationRule) -> Self {
        self.location_rule = Some(rule);
        self
    }

    /// Set the retry tuning.
    pub fn with_retry(mut self, retry: RetryConfig) -> Self {
        self.retry = retry;
        self
    }

    /// Whether the resource expands into several scheduled instances that
    /// share its id as a prefix.
    pub fn is_composite(&self) -> bool {
        matches!(self.wrapper, Wrapper::Bundle(_))
    }

    /// The id pcs gives the object a location constraint must target.
    pub fn constraint_target(&self) -> String {
        match &self.wrapper {
            Wrapper::Bundle(bundle) => bundle.clone(),
            Wrapper::Clone => format!("{}-clone", self.name),
            Wrapper::Master => format!("{}-master", self.name),
            Wrapper::None => self.name.clone(),
        }
    }

    /// `resource create` arguments built from the agent and parameters.
    ///
    /// Returns `None` when no agent is set; callers then have to supply
    /// their own creation command.
    pub fn create_args(&self) -> Option<Vec<String>> {
        let agent = self.agent.as_ref()?;
        let mut args = vec![
            "resource".to_string(),
            "create".to_string(),
            self.name.clone(),
            agent.clone(),
        ];
        args.extend(self.params.iter().map(|(k, v)| format!("{k}={v}")));
        match &self.wrapper {
            Wrapper::Bundle(bundle) => {
                args.push("bundle".to_string());
                args.push(bundle.clone());
            }
            Wrapper::Clone => args.push("clone".to_string()),
            Wrapper::Master => args.push("master".to_string()),
            Wrapper::None => {}
        }
        Some(args)
    }

    /// `constraint location ... rule` arguments for the placement rule.
    pub fn location_rule_args(&self, force: bool) -> Option<Vec<String>> {
        let rule = self.location_rule.as_ref()?;
        let mut args = vec![
            "constraint".to_string(),
            "location".to_string(),
            self.constraint_target(),
            "rule".to_string(),
        ];
        if let Some(discovery) = &rule.resource_discovery {
            args.push(format!("resource-discovery={discovery}"));
        }
        if let Some(score) = &rule.score {
            args.push(format!("score={score}"));
        }
        if let Some(attribute) = &rule.score_attribute {
            args.push(format!("score-attribute={attribute}"));
        }
        args.extend(rule.expression.iter().cloned());
        if force {
            args.push("--force".to_string());
        }
        log::debug!("location rule command: {}", args.join(" "));
        Some(args)
    }
}

/// Whether a declared resource matches the live cluster.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ResourceState {
    /// Live definition matches; the cluster would not react
    NoChangeNeeded,
    /// Resource is not defined in the CIB
    NotExists,
    /// Recreating the resource would make the cluster act
    ChangeNeeded,
}

impl std::fmt::Display for ResourceState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            ResourceState::NoChangeNeeded => "no change needed",
            ResourceState::NotExists => "does not exist",
            ResourceState::ChangeNeeded => "change needed",
        };
        write!(f, "{s}")
    }
}

/// Change-detection strategy actually used for a decision.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum Strategy {
    /// Transition graph from `crm_simulate`
    Simulation,
    /// Change report from `crm_diff`
    DirectDiff,
}

impl std::fmt::Display for Strategy {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Strategy::Simulation => write!(f, "simulation"),
            Strategy::DirectDiff => write!(f, "direct-diff"),
        }
    }
}

/// Outcome of change detection, with the evidence behind it.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ChangeDecision {
    /// Resource id that was looked for
    pub resource_id: String,
    /// Whether the cluster would act on the delta
    pub changed: bool,
    /// Strategy that produced the answer
    pub strategy: Strategy,
    /// Scheduled primitive ids or change paths that matched
    pub evidence: Vec<String>,
}

/// Outcome of pushing a snapshot back to the live cluster.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PushOutcome {
    /// Snapshot was byte-identical to its original copy; nothing was sent
    Unchanged,
    /// The live cluster accepted the snapshot
    Pushed,
    /// The live cluster refused it
    Rejected {
        /// Push command line
        command: String,
        /// Exit code of the push
        code: i32,
        /// Combined output of the push
        output: String,
    },
}

impl PushOutcome {
    /// Exit code as reported by `pcs cluster cib-push` (0 for a no-op).
    pub fn code(&self) -> i32 {
        match self {
            PushOutcome::Unchanged | PushOutcome::Pushed => 0,
            PushOutcome::Rejected { code, .. } => *code,
        }
    }
}

/// Summary of a committed resource update.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct UpdateReport {
    /// Resource that was recreated
    pub resource_id: String,
    /// Whether anything was actually pushed
    pub pushed: bool,
    /// Whether the cluster reported convergence before the timeout
    pub settled: bool,
}
