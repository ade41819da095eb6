use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::fmt;

// ---------------------------------------------------------------------
// Task (§3, §4.E)
// ---------------------------------------------------------------------

/// Declaration order is ascending priority so that `Ord` gives the
/// natural comparison; callers wanting "highest first" sort descending.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum TaskPriority {
    Low,
    Medium,
    High,
    Critical,
}

impl Default for TaskPriority {
    fn default() -> Self {
        TaskPriority::Medium
    }
}

impl fmt::Display for TaskPriority {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            TaskPriority::Low => "LOW",
            TaskPriority::Medium => "MEDIUM",
            TaskPriority::High => "HIGH",
            TaskPriority::Critical => "CRITICAL",
        };
        write!(f, "{}", s)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TaskStatus {
    Pending,
    Running,
    Completed,
    Failed,
    Cancelled,
}

impl fmt::Display for TaskStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            TaskStatus::Pending => "pending",
            TaskStatus::Running => "running",
            TaskStatus::Completed => "completed",
            TaskStatus::Failed => "failed",
            TaskStatus::Cancelled => "cancelled",
        };
        write!(f, "{}", s)
    }
}

/// The closed set of operation codes the Task Engine dispatches on
/// (§4.E "Operation surface"). Every mutating HTTP endpoint maps to
/// exactly one of these.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum OperationCode {
    // zone lifecycle
    Start,
    Stop,
    Restart,
    Delete,
    Discover,
    ZoneCreate,
    ZoneModify,
    ZoneProvision,
    // ZFS pool
    ZpoolCreate,
    ZpoolDestroy,
    ZpoolSetProperties,
    ZpoolAddVdev,
    ZpoolRemoveVdev,
    ZpoolReplaceDevice,
    ZpoolOnlineDevice,
    ZpoolOfflineDevice,
    ZpoolScrub,
    ZpoolStopScrub,
    ZpoolExport,
    ZpoolImport,
    ZpoolUpgrade,
    // ZFS dataset
    ZfsCreateDataset,
    ZfsDestroyDataset,
    ZfsSetProperties,
    ZfsCloneDataset,
    ZfsPromoteDataset,
    ZfsRenameDataset,
    ZfsCreateSnapshot,
    ZfsDestroySnapshot,
    ZfsRollbackSnapshot,
    ZfsHoldSnapshot,
    ZfsReleaseSnapshot,
    // network
    NatCreate,
    NatDelete,
    ForwardingConfigure,
    DhcpUpdateConfig,
    DhcpAddHost,
    DhcpRemoveHost,
    DhcpServiceControl,
    // artifacts
    ArtifactUploadProcess,
    // zone setup
    ZoneSetup,
}

impl OperationCode {
    /// Canonical snake_case name, matching the serde wire form.
    pub fn as_str(&self) -> &'static str {
        match self {
            OperationCode::Start => "start",
            OperationCode::Stop => "stop",
            OperationCode::Restart => "restart",
            OperationCode::Delete => "delete",
            OperationCode::Discover => "discover",
            OperationCode::ZoneCreate => "zone_create",
            OperationCode::ZoneModify => "zone_modify",
            OperationCode::ZoneProvision => "zone_provision",
            OperationCode::ZpoolCreate => "zpool_create",
            OperationCode::ZpoolDestroy => "zpool_destroy",
            OperationCode::ZpoolSetProperties => "zpool_set_properties",
            OperationCode::ZpoolAddVdev => "zpool_add_vdev",
            OperationCode::ZpoolRemoveVdev => "zpool_remove_vdev",
            OperationCode::ZpoolReplaceDevice => "zpool_replace_device",
            OperationCode::ZpoolOnlineDevice => "zpool_online_device",
            OperationCode::ZpoolOfflineDevice => "zpool_offline_device",
            OperationCode::ZpoolScrub => "zpool_scrub",
            OperationCode::ZpoolStopScrub => "zpool_stop_scrub",
            OperationCode::ZpoolExport => "zpool_export",
            OperationCode::ZpoolImport => "zpool_import",
            OperationCode::ZpoolUpgrade => "zpool_upgrade",
            OperationCode::ZfsCreateDataset => "zfs_create_dataset",
            OperationCode::ZfsDestroyDataset => "zfs_destroy_dataset",
            OperationCode::ZfsSetProperties => "zfs_set_properties",
            OperationCode::ZfsCloneDataset => "zfs_clone_dataset",
            OperationCode::ZfsPromoteDataset => "zfs_promote_dataset",
            OperationCode::ZfsRenameDataset => "zfs_rename_dataset",
            OperationCode::ZfsCreateSnapshot => "zfs_create_snapshot",
            OperationCode::ZfsDestroySnapshot => "zfs_destroy_snapshot",
            OperationCode::ZfsRollbackSnapshot => "zfs_rollback_snapshot",
            OperationCode::ZfsHoldSnapshot => "zfs_hold_snapshot",
            OperationCode::ZfsReleaseSnapshot => "zfs_release_snapshot",
            OperationCode::NatCreate => "nat_create",
            OperationCode::NatDelete => "nat_delete",
            OperationCode::ForwardingConfigure => "forwarding_configure",
            OperationCode::DhcpUpdateConfig => "dhcp_update_config",
            OperationCode::DhcpAddHost => "dhcp_add_host",
            OperationCode::DhcpRemoveHost => "dhcp_remove_host",
            OperationCode::DhcpServiceControl => "dhcp_service_control",
            OperationCode::ArtifactUploadProcess => "artifact_upload_process",
            OperationCode::ZoneSetup => "zone_setup",
        }
    }

    /// Resource class for `zone_name='system'` tasks, inferred from the
    /// operation prefix (§4.E exclusion rules). `None` for zone-scoped
    /// operations, which are already exclusive by `zone_name`.
    pub fn resource_class(&self) -> Option<&'static str> {
        let s = self.as_str();
        for prefix in ["zpool", "zfs", "dhcp", "nat", "artifact", "provision"] {
            if let Some(rest) = s.strip_prefix(prefix) {
                if rest.starts_with('_') {
                    return Some(prefix);
                }
            }
        }
        None
    }

    /// Whether this operation is known-idempotent and therefore eligible
    /// for a nonzero default retry budget (§9 open question resolution).
    pub fn is_idempotent(&self) -> bool {
        matches!(self, OperationCode::Discover)
    }
}

impl fmt::Display for OperationCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// A durable record of intent for a mutating command (§3 Task).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Task {
    pub id: String,
    /// Zone name, or the literal `"system"` for host-level operations.
    pub zone_name: String,
    pub operation: OperationCode,
    pub priority: TaskPriority,
    pub status: TaskStatus,
    pub depends_on: Option<String>,
    pub created_by: String,
    pub created_at: DateTime<Utc>,
    pub started_at: Option<DateTime<Utc>>,
    pub finished_at: Option<DateTime<Utc>>,
    /// Opaque JSON string; decoded by the owning operation handler.
    pub metadata: String,
    pub error: Option<String>,
    pub retries_left: u32,
}

impl Task {
    pub fn new(
        zone_name: impl Into<String>,
        operation: OperationCode,
        priority: TaskPriority,
        created_by: impl Into<String>,
        metadata: impl Into<String>,
    ) -> Self {
        let retries_left = if operation.is_idempotent() { 3 } else { 0 };
        Self {
            id: uuid::Uuid::new_v4().to_string(),
            zone_name: zone_name.into(),
            operation,
            priority,
            status: TaskStatus::Pending,
            depends_on: None,
            created_by: created_by.into(),
            created_at: Utc::now(),
            started_at: None,
            finished_at: None,
            metadata: metadata.into(),
            error: None,
            retries_left,
        }
    }

    pub fn with_depends_on(mut self, depends_on: impl Into<String>) -> Self {
        self.depends_on = Some(depends_on.into());
        self
    }

    pub fn is_system(&self) -> bool {
        self.zone_name == "system"
    }
}

// ---------------------------------------------------------------------
// Zone (§3)
// ---------------------------------------------------------------------

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ZoneStatus {
    Configured,
    Incomplete,
    Installed,
    Ready,
    Running,
    ShuttingDown,
    Down,
}

impl ZoneStatus {
    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "configured" => Some(ZoneStatus::Configured),
            "incomplete" => Some(ZoneStatus::Incomplete),
            "installed" => Some(ZoneStatus::Installed),
            "ready" => Some(ZoneStatus::Ready),
            "running" => Some(ZoneStatus::Running),
            "shutting_down" => Some(ZoneStatus::ShuttingDown),
            "down" => Some(ZoneStatus::Down),
            _ => None,
        }
    }
}

impl fmt::Display for ZoneStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            ZoneStatus::Configured => "configured",
            ZoneStatus::Incomplete => "incomplete",
            ZoneStatus::Installed => "installed",
            ZoneStatus::Ready => "ready",
            ZoneStatus::Running => "running",
            ZoneStatus::ShuttingDown => "shutting_down",
            ZoneStatus::Down => "down",
        };
        write!(f, "{}", s)
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Zone {
    pub name: String,
    pub status: ZoneStatus,
    pub is_orphaned: bool,
    pub last_seen: DateTime<Utc>,
    /// Opaque JSON string holding brand, ram, vcpus, autoboot, priority,
    /// net[], disks, vnc, etc.
    pub configuration: String,
    pub vm_type: String,
    pub partition_id: Option<String>,
}

/// Decoded view of the fields of `Zone::configuration` the core
/// components (Orchestrator, VNC Supervisor) need to read.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ZoneConfigSummary {
    pub brand: String,
    #[serde(default = "default_priority")]
    pub priority: u32,
    #[serde(default)]
    pub autoboot: bool,
    #[serde(default)]
    pub vnc_enabled: bool,
}

fn default_priority() -> u32 {
    50
}

// ---------------------------------------------------------------------
// Recipe (§3, §4.I)
// ---------------------------------------------------------------------

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum OsFamily {
    Linux,
    Solaris,
    Windows,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TemplateMethod {
    EchoRedirect,
    Heredoc,
}

fn default_true() -> bool {
    true
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum RecipeStep {
    Wait {
        pattern: String,
        timeout_ms: Option<u64>,
        #[serde(default)]
        regex: bool,
    },
    Send {
        value: String,
    },
    Command {
        value: String,
        expect_prompt: Option<String>,
        #[serde(default = "default_true")]
        check_exit_code: bool,
        timeout_ms: Option<u64>,
    },
    Template {
        dest: String,
        content: String,
        method: TemplateMethod,
        expect_prompt: Option<String>,
    },
    Delay {
        seconds: u64,
    },
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Recipe {
    pub id: String,
    pub name: String,
    pub description: String,
    pub os_family: OsFamily,
    pub brand: String,
    pub is_default: bool,
    pub boot_string: String,
    pub login_prompt: String,
    pub shell_prompt: String,
    pub timeout_seconds: u64,
    pub steps: Vec<RecipeStep>,
    pub variables: HashMap<String, String>,
    pub created_by: String,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

// ---------------------------------------------------------------------
// VncSession (§3, §4.J)
// ---------------------------------------------------------------------

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum VncStatus {
    Active,
    Stopped,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct VncSession {
    pub id: String,
    pub zone_name: String,
    pub web_port: u16,
    pub host_ip: String,
    pub process_id: u32,
    pub status: VncStatus,
    pub created_at: DateTime<Utc>,
    pub last_accessed: DateTime<Utc>,
}

// ---------------------------------------------------------------------
// ZloginSession (§3, §4.H)
// ---------------------------------------------------------------------

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ZloginStatus {
    Active,
    Closed,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ZloginSession {
    pub zone_name: String,
    pub pid: u32,
    pub status: ZloginStatus,
    pub automation_active: bool,
    pub created_at: DateTime<Utc>,
    pub last_activity: DateTime<Utc>,
}

// ---------------------------------------------------------------------
// NatRule (§3, §4.K)
// ---------------------------------------------------------------------

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum NatRuleType {
    Map,
    Bimap,
    Rdr,
}

impl fmt::Display for NatRuleType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            NatRuleType::Map => "map",
            NatRuleType::Bimap => "bimap",
            NatRuleType::Rdr => "rdr",
        };
        write!(f, "{}", s)
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NatRule {
    pub id: String,
    pub rule_type: NatRuleType,
    pub bridge: String,
    pub subnet: String,
    pub target: String,
    pub protocol: String,
    pub raw_rule: String,
    pub description: Option<String>,
    pub created_by: String,
}

// ---------------------------------------------------------------------
// DHCP (§4.K, §6): subnet block + static host reservations written to
// `/etc/dhcpd.conf`, reconciled the same way NatRule reconciles against
// `/etc/ipf/ipnat.conf`.
// ---------------------------------------------------------------------

/// A host's on-disk config is exactly one subnet block; keyed by a fixed
/// id since there's only ever one row.
pub const DHCP_SUBNET_ID: &str = "current";

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DhcpSubnetConfig {
    pub id: String,
    pub net: String,
    pub netmask: String,
    pub routers: String,
    pub range_start: String,
    pub range_end: String,
    pub dns: String,
    pub raw_block: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DhcpHost {
    pub id: String,
    pub hostname: String,
    pub mac_address: String,
    pub ip_address: String,
    pub raw_block: String,
    pub created_by: String,
}

// ---------------------------------------------------------------------
// Storage monitoring records (§3, §4.C, §4.G)
// ---------------------------------------------------------------------

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ZfsPoolRecord {
    pub host: String,
    pub timestamp: DateTime<Utc>,
    pub name: String,
    pub health: String,
    pub size_raw: String,
    pub size_bytes: Option<u64>,
    pub alloc_raw: String,
    pub alloc_bytes: Option<u64>,
    pub free_raw: String,
    pub free_bytes: Option<u64>,
    pub capacity_pct: f64,
    pub pool_type: Option<String>,
    pub fragmentation_pct: Option<f64>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ZfsDatasetRecord {
    pub host: String,
    pub timestamp: DateTime<Utc>,
    pub name: String,
    pub pool: String,
    pub used_raw: String,
    pub used_bytes: Option<u64>,
    pub available_raw: String,
    pub available_bytes: Option<u64>,
    pub referenced_raw: String,
    pub referenced_bytes: Option<u64>,
    pub mountpoint: Option<String>,
    pub quota_raw: Option<String>,
    pub quota_bytes: Option<u64>,
    pub compression: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DiskRecord {
    pub host: String,
    pub timestamp: DateTime<Utc>,
    pub device_name: String,
    pub vendor: Option<String>,
    pub model: Option<String>,
    pub firmware: Option<String>,
    pub capacity_raw: Option<String>,
    pub capacity_bytes: Option<u64>,
    pub disk_type: String,
    pub interface_type: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PoolIoStatRecord {
    pub host: String,
    pub timestamp: DateTime<Utc>,
    pub pool: String,
    pub pool_type: Option<String>,
    pub read_ops: Option<u64>,
    pub write_ops: Option<u64>,
    pub read_bandwidth_bytes: Option<u64>,
    pub write_bandwidth_bytes: Option<u64>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DiskIoStatRecord {
    pub host: String,
    pub timestamp: DateTime<Utc>,
    pub pool: String,
    pub device_name: String,
    pub read_ops: Option<u64>,
    pub write_ops: Option<u64>,
    pub read_bandwidth_bytes: Option<u64>,
    pub write_bandwidth_bytes: Option<u64>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ArcStatsRecord {
    pub host: String,
    pub timestamp: DateTime<Utc>,
    pub size_bytes: Option<u64>,
    pub target_size_bytes: Option<u64>,
    pub mru_size_bytes: Option<u64>,
    pub mfu_size_bytes: Option<u64>,
    pub hits: u64,
    pub misses: u64,
    /// Rounded to 2 decimal places, formatted as a string (e.g. "90.00")
    /// per §8's ARC hit ratio scenario.
    pub hit_ratio: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HostInfo {
    pub hostname: String,
    pub last_storage_scan: Option<DateTime<Utc>>,
    pub error_count: u32,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_priority_ordering() {
        assert!(TaskPriority::Critical > TaskPriority::High);
        assert!(TaskPriority::High > TaskPriority::Medium);
        assert!(TaskPriority::Medium > TaskPriority::Low);
    }

    #[test]
    fn test_operation_resource_class() {
        assert_eq!(OperationCode::ZpoolCreate.resource_class(), Some("zpool"));
        assert_eq!(OperationCode::ZfsCreateDataset.resource_class(), Some("zfs"));
        assert_eq!(OperationCode::DhcpAddHost.resource_class(), Some("dhcp"));
        assert_eq!(OperationCode::NatCreate.resource_class(), Some("nat"));
        assert_eq!(OperationCode::ArtifactUploadProcess.resource_class(), Some("artifact"));
        assert_eq!(OperationCode::Start.resource_class(), None);
        assert_eq!(OperationCode::ZoneCreate.resource_class(), None);
    }

    #[test]
    fn test_operation_as_str_roundtrip() {
        let op = OperationCode::ZfsRollbackSnapshot;
        assert_eq!(op.as_str(), "zfs_rollback_snapshot");
        let json = serde_json::to_string(&op).unwrap();
        assert_eq!(json, "\"zfs_rollback_snapshot\"");
        let back: OperationCode = serde_json::from_str(&json).unwrap();
        assert_eq!(back, op);
    }

    #[test]
    fn test_zone_status_parse() {
        assert_eq!(ZoneStatus::parse("running"), Some(ZoneStatus::Running));
        assert_eq!(ZoneStatus::parse("bogus"), None);
    }

    #[test]
    fn test_task_new_defaults() {
        let task = Task::new("z1", OperationCode::Start, TaskPriority::High, "api", "{}");
        assert_eq!(task.status, TaskStatus::Pending);
        assert_eq!(task.retries_left, 0);
        assert!(task.depends_on.is_none());
        assert!(!task.is_system());

        let discover = Task::new("system", OperationCode::Discover, TaskPriority::Low, "api", "{}");
        assert_eq!(discover.retries_left, 3);
        assert!(discover.is_system());
    }
}
