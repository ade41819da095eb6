//! On-disk configuration: read once at startup from `${CONFIG_PATH}` or
//! `./config/config.yaml`. The only field the running process ever
//! rewrites is `zones.orchestration.enabled`, via the same atomic
//! write-temp-then-rename helper used by the NAT/DHCP writers.

use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use zoneweaver_runtime::network::atomic_write;

fn default_listen() -> String {
    "0.0.0.0:8443".to_string()
}

fn default_data_dir() -> String {
    "./zoneweaver.redb".to_string()
}

fn default_true() -> bool {
    true
}

fn default_priority_delay_secs() -> u64 {
    5
}

fn default_reconcile_interval_secs() -> u64 {
    60
}

fn default_worker_pool_size() -> usize {
    4
}

fn default_tick_interval_ms() -> u64 {
    500
}

fn default_storage_slow_interval_secs() -> u64 {
    300
}

fn default_storage_frequent_interval_secs() -> u64 {
    10
}

fn default_vnc_cleanup_interval_secs() -> u64 {
    60
}

fn default_pty_idle_gc_interval_secs() -> u64 {
    30
}

fn default_recipe_timeout_secs() -> i64 {
    300
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    /// Address the HTTP/WS surface listens on.
    #[serde(default = "default_listen")]
    pub listen: String,

    /// Path to the redb database file.
    #[serde(default = "default_data_dir")]
    pub data_dir: String,

    #[serde(default)]
    pub tls: TlsConfig,

    #[serde(default)]
    pub artifact_storage: ArtifactStorageConfig,

    #[serde(default)]
    pub zones: ZonesConfig,

    #[serde(default)]
    pub task_engine: TaskEngineConfig,

    #[serde(default)]
    pub storage_pipeline: StoragePipelineConfig,

    #[serde(default)]
    pub vnc: VncConfig,

    #[serde(default)]
    pub pty: PtyConfig,

    #[serde(default)]
    pub recipes: RecipesConfig,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            listen: default_listen(),
            data_dir: default_data_dir(),
            tls: TlsConfig::default(),
            artifact_storage: ArtifactStorageConfig::default(),
            zones: ZonesConfig::default(),
            task_engine: TaskEngineConfig::default(),
            storage_pipeline: StoragePipelineConfig::default(),
            vnc: VncConfig::default(),
            pty: PtyConfig::default(),
            recipes: RecipesConfig::default(),
        }
    }
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct TlsConfig {
    #[serde(default)]
    pub enabled: bool,
    pub cert_path: Option<String>,
    pub key_path: Option<String>,
}

/// Filesystem paths searched, in order, for uploaded zone install
/// artifacts (ISOs, tarballs). No default paths are assumed; an empty
/// list simply means artifact uploads aren't resolvable on this host.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct ArtifactStorageConfig {
    #[serde(default)]
    pub paths: Vec<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ZonesConfig {
    #[serde(default)]
    pub orchestration: OrchestrationConfig,
}

impl Default for ZonesConfig {
    fn default() -> Self {
        Self { orchestration: OrchestrationConfig::default() }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct OrchestrationConfig {
    /// Whether Zoneweaver should take autoboot control away from
    /// `system/zones` on startup. Rewritten in place (atomically) by the
    /// `/zones/orchestration/enable` and `/disable` endpoints so restarts
    /// come back up in the last-requested mode.
    #[serde(default)]
    pub enabled: bool,

    #[serde(default = "default_priority_delay_secs")]
    pub priority_delay_secs: u64,

    #[serde(default = "default_reconcile_interval_secs")]
    pub reconcile_interval_secs: u64,
}

impl Default for OrchestrationConfig {
    fn default() -> Self {
        Self {
            enabled: false,
            priority_delay_secs: default_priority_delay_secs(),
            reconcile_interval_secs: default_reconcile_interval_secs(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct TaskEngineConfig {
    #[serde(default = "default_worker_pool_size")]
    pub worker_pool_size: usize,
    #[serde(default = "default_tick_interval_ms")]
    pub tick_interval_ms: u64,
}

impl Default for TaskEngineConfig {
    fn default() -> Self {
        Self { worker_pool_size: default_worker_pool_size(), tick_interval_ms: default_tick_interval_ms() }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct StoragePipelineConfig {
    #[serde(default = "default_storage_slow_interval_secs")]
    pub slow_interval_secs: u64,
    #[serde(default = "default_storage_frequent_interval_secs")]
    pub frequent_interval_secs: u64,
}

impl Default for StoragePipelineConfig {
    fn default() -> Self {
        Self {
            slow_interval_secs: default_storage_slow_interval_secs(),
            frequent_interval_secs: default_storage_frequent_interval_secs(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct VncConfig {
    #[serde(default = "default_vnc_cleanup_interval_secs")]
    pub cleanup_interval_secs: u64,
}

impl Default for VncConfig {
    fn default() -> Self {
        Self { cleanup_interval_secs: default_vnc_cleanup_interval_secs() }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct PtyConfig {
    #[serde(default = "default_pty_idle_gc_interval_secs")]
    pub idle_gc_interval_secs: u64,
}

impl Default for PtyConfig {
    fn default() -> Self {
        Self { idle_gc_interval_secs: default_pty_idle_gc_interval_secs() }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct RecipesConfig {
    #[serde(default = "default_recipe_timeout_secs")]
    pub default_timeout_secs: i64,
}

impl Default for RecipesConfig {
    fn default() -> Self {
        Self { default_timeout_secs: default_recipe_timeout_secs() }
    }
}

/// Resolves the config file path: `$CONFIG_PATH` if set, else
/// `./config/config.yaml`, else built-in defaults if neither exists.
pub fn config_path_from_env() -> PathBuf {
    std::env::var("CONFIG_PATH").map(PathBuf::from).unwrap_or_else(|_| PathBuf::from("./config/config.yaml"))
}

pub fn load(path: &Path) -> miette::Result<Config> {
    if !path.exists() {
        return Ok(Config::default());
    }
    let contents = std::fs::read_to_string(path).map_err(|e| miette::miette!("failed to read config file {}: {e}", path.display()))?;
    serde_yaml::from_str(&contents).map_err(|e| miette::miette!("failed to parse config file {}: {e}", path.display()))
}

/// Flips `zones.orchestration.enabled` on disk via an atomic write, so a
/// restart resumes whatever mode was last requested through the API.
pub async fn persist_orchestration_enabled(path: &Path, config: &Config, enabled: bool) -> miette::Result<()> {
    let mut updated = config.clone();
    updated.zones.orchestration.enabled = enabled;
    let rendered = serde_yaml::to_string(&updated).map_err(|e| miette::miette!("failed to render config: {e}"))?;
    if let Some(parent) = path.parent() {
        if !parent.as_os_str().is_empty() {
            tokio::fs::create_dir_all(parent).await.map_err(|e| miette::miette!("failed to create config dir: {e}"))?;
        }
    }
    atomic_write(&path.to_string_lossy(), &rendered).await.map_err(|e| miette::miette!("failed to persist config: {e}"))
}
