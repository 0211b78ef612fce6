//! acms configuration types and loading

use eyre::{Context, Result};
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;

use crate::resilience::RetryPolicy;
use crate::worktree::WorktreeConfig;

/// Main acms configuration
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    /// State store location
    pub store: StoreConfig,

    /// Path registry index
    pub paths: PathsConfig,

    /// Guardrail pattern registry
    pub patterns: PatternsConfig,

    /// Tool router rule table
    pub router: RouterSettings,

    /// Tool profile registry
    pub tools: ToolsConfig,

    /// Git worktree isolation
    pub worktree: WorktreeSettings,

    /// Circuit breaker and retry tuning for the tool adapter layer
    pub resilience: ResilienceConfig,

    /// Execution worker pool
    pub executor: ExecutorSettings,

    /// Background run-supervisor daemon
    pub daemon: DaemonConfig,
}

impl Config {
    /// Load configuration with fallback chain
    pub fn load(config_path: Option<&PathBuf>) -> Result<Self> {
        // If explicit config path provided, try to load it
        if let Some(path) = config_path {
            return Self::load_from_file(path).context(format!("Failed to load config from {}", path.display()));
        }

        // Try project-local config: .acms.yml
        let local_config = PathBuf::from(".acms.yml");
        if local_config.exists() {
            match Self::load_from_file(&local_config) {
                Ok(config) => return Ok(config),
                Err(e) => {
                    tracing::warn!("Failed to load config from {}: {}", local_config.display(), e);
                }
            }
        }

        // Try user config: ~/.config/acms/acms.yml
        if let Some(config_dir) = dirs::config_dir() {
            let user_config = config_dir.join("acms").join("acms.yml");
            if user_config.exists() {
                match Self::load_from_file(&user_config) {
                    Ok(config) => return Ok(config),
                    Err(e) => {
                        tracing::warn!("Failed to load config from {}: {}", user_config.display(), e);
                    }
                }
            }
        }

        // No config file found, use defaults
        tracing::info!("No config file found, using defaults");
        Ok(Self::default())
    }

    fn load_from_file<P: AsRef<Path>>(path: P) -> Result<Self> {
        let content = fs::read_to_string(&path).context("Failed to read config file")?;

        let config: Self = serde_yaml::from_str(&content).context("Failed to parse config file")?;

        tracing::info!("Loaded config from: {}", path.as_ref().display());
        Ok(config)
    }
}

/// Where the embedded state store keeps its database and recovery log
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct StoreConfig {
    /// Directory holding the sqlite database and JSONL recovery log
    #[serde(rename = "data-dir")]
    pub data_dir: PathBuf,
}

impl Default for StoreConfig {
    fn default() -> Self {
        Self { data_dir: PathBuf::from(".acms/store") }
    }
}

/// Path registry index location
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct PathsConfig {
    /// YAML file mapping dotted keys to path templates
    #[serde(rename = "index-file")]
    pub index_file: PathBuf,
}

impl Default for PathsConfig {
    fn default() -> Self {
        Self { index_file: PathBuf::from(".acms/paths.yml") }
    }
}

/// Guardrail pattern registry location
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct PatternsConfig {
    /// YAML file of named patterns plus the protected-paths list
    #[serde(rename = "index-file")]
    pub index_file: PathBuf,
}

impl Default for PatternsConfig {
    fn default() -> Self {
        Self { index_file: PathBuf::from(".acms/patterns.yml") }
    }
}

/// Tool router rule table location
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct RouterSettings {
    /// YAML file of operation-kind -> strategy routing rules
    #[serde(rename = "rules-file")]
    pub rules_file: PathBuf,
}

impl Default for RouterSettings {
    fn default() -> Self {
        Self { rules_file: PathBuf::from(".acms/router.yml") }
    }
}

/// Tool profile registry location
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ToolsConfig {
    /// YAML file mapping tool id -> command-line profile
    #[serde(rename = "profiles-file")]
    pub profiles_file: PathBuf,
}

impl Default for ToolsConfig {
    fn default() -> Self {
        Self { profiles_file: PathBuf::from(".acms/tool_profiles.yml") }
    }
}

/// Git worktree isolation settings
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct WorktreeSettings {
    /// Base directory for worktrees
    #[serde(rename = "base-dir")]
    pub base_dir: PathBuf,

    /// Minimum free disk space in GB before refusing to create worktrees
    #[serde(rename = "min-disk-space-gb")]
    pub min_disk_space_gb: u64,

    /// Branch name prefix for worktree branches
    #[serde(rename = "branch-prefix")]
    pub branch_prefix: String,
}

impl Default for WorktreeSettings {
    fn default() -> Self {
        Self {
            base_dir: PathBuf::from("/tmp/acms/worktrees"),
            min_disk_space_gb: 5,
            branch_prefix: "acms".to_string(),
        }
    }
}

impl WorktreeSettings {
    /// Build a runtime `WorktreeConfig` rooted at `repo_root`.
    pub fn to_worktree_config(&self, repo_root: impl Into<PathBuf>) -> WorktreeConfig {
        WorktreeConfig {
            base_dir: self.base_dir.clone(),
            repo_root: repo_root.into(),
            min_disk_space_gb: self.min_disk_space_gb,
            branch_prefix: self.branch_prefix.clone(),
        }
    }
}

/// Circuit breaker and retry tuning for the tool adapter layer
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ResilienceConfig {
    /// Consecutive failures before a tool's circuit opens
    #[serde(rename = "failure-threshold")]
    pub failure_threshold: u32,

    /// Seconds an open circuit stays open before probing half-open
    #[serde(rename = "recovery-timeout-secs")]
    pub recovery_timeout_secs: u64,

    /// Maximum retry attempts for a retryable tool failure
    #[serde(rename = "retry-max-attempts")]
    pub retry_max_attempts: u32,

    /// Base delay for exponential backoff, in milliseconds
    #[serde(rename = "retry-base-delay-ms")]
    pub retry_base_delay_ms: u64,

    /// Cap on backoff delay, in milliseconds
    #[serde(rename = "retry-max-delay-ms")]
    pub retry_max_delay_ms: u64,
}

impl Default for ResilienceConfig {
    fn default() -> Self {
        Self {
            failure_threshold: 5,
            recovery_timeout_secs: 30,
            retry_max_attempts: 3,
            retry_base_delay_ms: 250,
            retry_max_delay_ms: 30_000,
        }
    }
}

impl ResilienceConfig {
    pub fn retry_policy(&self) -> RetryPolicy {
        RetryPolicy {
            max_attempts: self.retry_max_attempts,
            base_delay: Duration::from_millis(self.retry_base_delay_ms),
            max_delay: Duration::from_millis(self.retry_max_delay_ms),
        }
    }

    pub fn recovery_timeout(&self) -> Duration {
        Duration::from_secs(self.recovery_timeout_secs)
    }
}

/// Execution worker pool settings
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ExecutorSettings {
    /// Maximum tasks dispatched concurrently within one scheduler batch
    #[serde(rename = "max-concurrent-tasks")]
    pub max_concurrent_tasks: usize,

    /// Whether a task with no matching pattern blocks instead of running unchecked
    #[serde(rename = "block-on-missing-pattern")]
    pub block_on_missing_pattern: bool,
}

impl Default for ExecutorSettings {
    fn default() -> Self {
        Self { max_concurrent_tasks: 4, block_on_missing_pattern: true }
    }
}

impl ExecutorSettings {
    pub fn to_executor_config(&self) -> crate::executor::ExecutorConfig {
        crate::executor::ExecutorConfig {
            max_concurrent_tasks: self.max_concurrent_tasks,
            block_on_missing_pattern: self.block_on_missing_pattern,
        }
    }
}

/// Background run-supervisor daemon settings
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct DaemonConfig {
    /// How often the supervisor polls the state store for non-terminal runs
    #[serde(rename = "poll-interval-ms")]
    pub poll_interval_ms: u64,

    /// Maximum runs the supervisor drives concurrently
    #[serde(rename = "max-concurrent-runs")]
    pub max_concurrent_runs: u32,
}

impl Default for DaemonConfig {
    fn default() -> Self {
        Self { poll_interval_ms: 2_000, max_concurrent_runs: 8 }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config() {
        let config = Config::default();

        assert_eq!(config.executor.max_concurrent_tasks, 4);
        assert_eq!(config.resilience.failure_threshold, 5);
        assert_eq!(config.daemon.max_concurrent_runs, 8);
    }

    #[test]
    fn test_resilience_config_builds_retry_policy() {
        let config = ResilienceConfig::default();
        let policy = config.retry_policy();

        assert_eq!(policy.max_attempts, 3);
        assert_eq!(policy.base_delay, Duration::from_millis(250));
    }

    #[test]
    fn test_worktree_settings_to_worktree_config() {
        let settings = WorktreeSettings::default();
        let config = settings.to_worktree_config("/repo");

        assert_eq!(config.repo_root, PathBuf::from("/repo"));
        assert_eq!(config.branch_prefix, "acms");
    }

    #[test]
    fn test_deserialize_config() {
        let yaml = r#"
store:
  data-dir: /var/lib/acms/store

executor:
  max-concurrent-tasks: 8
  block-on-missing-pattern: false

resilience:
  failure-threshold: 10
  retry-max-attempts: 5
"#;

        let config: Config = serde_yaml::from_str(yaml).unwrap();

        assert_eq!(config.store.data_dir, PathBuf::from("/var/lib/acms/store"));
        assert_eq!(config.executor.max_concurrent_tasks, 8);
        assert!(!config.executor.block_on_missing_pattern);
        assert_eq!(config.resilience.failure_threshold, 10);
        assert_eq!(config.resilience.retry_max_attempts, 5);
    }

    #[test]
    fn test_partial_config_uses_defaults() {
        let yaml = r#"
daemon:
  max-concurrent-runs: 2
"#;

        let config: Config = serde_yaml::from_str(yaml).unwrap();

        assert_eq!(config.daemon.max_concurrent_runs, 2);
        assert_eq!(config.daemon.poll_interval_ms, 2_000);
        assert_eq!(config.executor.max_concurrent_tasks, 4);
    }
}
