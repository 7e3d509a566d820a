use anyhow::{Context, Result};
use cibkit::{RetryConfig, Settings};
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;

use crate::cli::RetryArgs;

/// Environment variable naming the config file
pub const CONFIG_ENV: &str = "CIBTX_CONFIG";

/// Config file read when neither `--config` nor `CIBTX_CONFIG` is given
pub const SYSTEM_CONFIG: &str = "/etc/cibtx/config.toml";

// ============================================================================
// File format
// ============================================================================

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    /// Tool paths, snapshot directory and change detection
    pub cluster: Settings,
    pub retry: RetrySection,
    /// Upper bound on the post-update convergence wait
    pub settle_timeout_secs: u64,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            cluster: Settings::default(),
            retry: RetrySection::default(),
            settle_timeout_secs: 600,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct RetrySection {
    pub tries: u32,
    pub try_sleep_secs: u64,
    pub post_success_sleep_secs: u64,
    pub backoff_factor: f64,
}

impl Default for RetrySection {
    fn default() -> Self {
        Self {
            tries: 1,
            try_sleep_secs: 0,
            post_success_sleep_secs: 0,
            backoff_factor: 1.0,
        }
    }
}

impl Config {
    /// Load the config from the first location that applies.
    pub fn load(explicit: Option<&Path>) -> Result<Self> {
        let env = std::env::var(CONFIG_ENV).ok();
        match config_path(explicit, env.as_deref(), Path::new(SYSTEM_CONFIG).exists()) {
            Some(path) => Self::load_from(&path),
            None => {
                log::debug!("no config file, using defaults");
                Ok(Self::default())
            }
        }
    }

    /// Parse a config file and expand the paths it contains.
    pub fn load_from(path: &Path) -> Result<Self> {
        let content = fs::read_to_string(path)
            .with_context(|| format!("Could not read {}", path.display()))?;
        let mut config: Self = toml::from_str(&content)
            .with_context(|| format!("Invalid config in {}", path.display()))?;
        config.expand_paths()?;
        log::debug!("loaded config from {}", path.display());
        Ok(config)
    }

    fn expand_paths(&mut self) -> Result<()> {
        let cluster = &mut self.cluster;
        cluster.snapshot_dir = expand(&cluster.snapshot_dir)?;
        cluster.tools.pcs = expand(&cluster.tools.pcs)?;
        cluster.tools.crm_diff = expand(&cluster.tools.crm_diff)?;
        cluster.tools.crm_simulate = expand(&cluster.tools.crm_simulate)?;
        cluster.tools.crm_resource = expand(&cluster.tools.crm_resource)?;
        cluster.tools.timeout = expand(&cluster.tools.timeout)?;
        Ok(())
    }

    /// Retry policy with command-line overrides applied.
    pub fn retry_config(&self, overrides: &RetryArgs) -> RetryConfig {
        let tries = overrides.tries.unwrap_or(self.retry.tries);
        let try_sleep = overrides.try_sleep.unwrap_or(self.retry.try_sleep_secs);
        let post_success_sleep = overrides
            .post_success_sleep
            .unwrap_or(self.retry.post_success_sleep_secs);
        RetryConfig::new(tries, Duration::from_secs(try_sleep))
            .with_backoff(self.retry.backoff_factor)
            .with_post_success_sleep(Duration::from_secs(post_success_sleep))
    }

    pub fn settle_timeout(&self, overridden: Option<u64>) -> Duration {
        Duration::from_secs(overridden.unwrap_or(self.settle_timeout_secs))
    }
}

/// `--config` wins over the environment, which wins over the system file.
fn config_path(explicit: Option<&Path>, env: Option<&str>, system_exists: bool) -> Option<PathBuf> {
    if let Some(path) = explicit {
        return Some(path.to_path_buf());
    }
    if let Some(path) = env.filter(|p| !p.is_empty()) {
        return Some(PathBuf::from(path));
    }
    system_exists.then(|| PathBuf::from(SYSTEM_CONFIG))
}

fn expand(path: &Path) -> Result<PathBuf> {
    let raw = path.to_string_lossy();
    let expanded = shellexpand::full(&raw)
        .with_context(|| format!("Could not expand path '{raw}'"))?;
    Ok(PathBuf::from(expanded.into_owned()))
}
