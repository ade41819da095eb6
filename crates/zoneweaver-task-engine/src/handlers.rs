//! One match arm per [`OperationCode`], wired up behind [`Handlers::dispatch`].
//! Each handler decodes its own metadata shape out of `task.metadata` (an
//! opaque JSON string per the Task record) and calls straight into
//! `zoneweaver_runtime`'s command wrappers.

use crate::types::HandlerOutcome;
use serde::Deserialize;
use std::collections::HashMap;
use std::sync::Arc;
use zoneweaver_core::{DhcpHost, DhcpSubnetConfig, NatRule, NatRuleType, OperationCode, Recipe, Task, DHCP_SUBNET_ID};
use zoneweaver_runtime::command::CommandRunner;
use zoneweaver_runtime::pty::PtyMultiplexer;
use zoneweaver_runtime::recipe::RecipeInterpreter;
use zoneweaver_runtime::{network, zfs_commands, zone_commands};
use zoneweaver_storage::Repository;

fn decode<T: for<'de> Deserialize<'de>>(task: &Task) -> Result<T, HandlerOutcome> {
    serde_json::from_str(&task.metadata)
        .map_err(|e| HandlerOutcome::failed(format!("bad metadata for {}: {e}", task.operation)))
}

fn as_pairs(props: &HashMap<String, String>) -> Vec<(String, String)> {
    props.iter().map(|(k, v)| (k.clone(), v.clone())).collect()
}

/// Shared dependencies every operation handler may need. Held behind an
/// `Arc` so the worker pool can clone it cheaply per task.
pub struct Handlers<R: CommandRunner + Send + Sync + 'static> {
    pub runner: Arc<R>,
    pub nat_rules: Repository<NatRule>,
    pub recipes: Repository<Recipe>,
    pub pty: Arc<PtyMultiplexer>,
    pub recipe_interpreter: Arc<RecipeInterpreter>,
    pub nat_conf_path: String,
    pub dhcp_subnet: Repository<DhcpSubnetConfig>,
    pub dhcp_hosts: Repository<DhcpHost>,
    pub dhcp_conf_path: String,
    /// Directories `artifact_upload_process` is allowed to serve files from.
    pub artifact_paths: Vec<String>,
}

#[derive(Deserialize)]
struct NetDef {
    physical: String,
    #[serde(default)]
    address: String,
}

#[derive(Deserialize)]
struct ZoneConfigureMeta {
    brand: String,
    zonepath: String,
    #[serde(default)]
    autoboot: bool,
    #[serde(default)]
    nets: Vec<NetDef>,
    vcpus: Option<u32>,
    ram_mb: Option<u64>,
}

#[derive(Deserialize)]
struct ZpoolCreateMeta {
    pool: String,
    vdev_args: Vec<String>,
}

#[derive(Deserialize)]
struct ZpoolDestroyMeta {
    pool: String,
    #[serde(default)]
    force: bool,
}

#[derive(Deserialize)]
struct ZpoolNameMeta {
    pool: String,
}

#[derive(Deserialize)]
struct ZpoolPropsMeta {
    pool: String,
    properties: HashMap<String, String>,
}

#[derive(Deserialize)]
struct ZpoolVdevMeta {
    pool: String,
    vdev_args: Vec<String>,
}

#[derive(Deserialize)]
struct ZpoolOneDeviceMeta {
    pool: String,
    device: String,
}

#[derive(Deserialize)]
struct ZpoolReplaceMeta {
    pool: String,
    old: String,
    new: String,
}

#[derive(Deserialize)]
struct DatasetCreateMeta {
    dataset: String,
    #[serde(default)]
    properties: HashMap<String, String>,
}

#[derive(Deserialize)]
struct DatasetDestroyMeta {
    dataset: String,
    #[serde(default)]
    recursive: bool,
}

#[derive(Deserialize)]
struct DatasetNameMeta {
    dataset: String,
}

#[derive(Deserialize)]
struct DatasetPropsMeta {
    dataset: String,
    properties: HashMap<String, String>,
}

#[derive(Deserialize)]
struct DatasetCloneMeta {
    snapshot: String,
    target: String,
}

#[derive(Deserialize)]
struct DatasetRenameMeta {
    dataset: String,
    new_name: String,
}

#[derive(Deserialize)]
struct SnapshotNameMeta {
    dataset: String,
    snapshot: String,
}

#[derive(Deserialize)]
struct SnapshotHoldMeta {
    dataset: String,
    snapshot: String,
    tag: String,
}

#[derive(Deserialize)]
struct NatCreateMeta {
    rule_type: NatRuleType,
    bridge: String,
    subnet: String,
    target: String,
    protocol: String,
    #[serde(default)]
    description: Option<String>,
}

#[derive(Deserialize)]
struct NatDeleteMeta {
    rule_id: String,
}

#[derive(Deserialize)]
struct ForwardingMeta {
    enable: bool,
    interfaces: Vec<String>,
}

#[derive(Deserialize)]
struct ZoneSetupMeta {
    recipe_id: String,
    #[serde(default)]
    variables: HashMap<String, String>,
}

fn default_snapshot_name() -> String {
    "pre-provision".to_string()
}

#[derive(Deserialize)]
struct ZoneProvisionMeta {
    brand: String,
    zonepath: String,
    #[serde(default)]
    autoboot: bool,
    #[serde(default)]
    nets: Vec<NetDef>,
    vcpus: Option<u32>,
    ram_mb: Option<u64>,
    dataset: String,
    #[serde(default = "default_snapshot_name")]
    snapshot_name: String,
    recipe_id: String,
    #[serde(default)]
    variables: HashMap<String, String>,
}

#[derive(Deserialize)]
struct DhcpConfigMeta {
    net: String,
    netmask: String,
    routers: String,
    range_start: String,
    range_end: String,
    dns: String,
}

#[derive(Deserialize)]
struct DhcpHostMeta {
    hostname: String,
    mac_address: String,
    ip_address: String,
}

#[derive(Deserialize)]
struct DhcpHostRemoveMeta {
    hostname: String,
}

#[derive(Deserialize, Clone, Copy)]
#[serde(rename_all = "snake_case")]
enum DhcpServiceAction {
    Enable,
    Disable,
    Restart,
}

#[derive(Deserialize)]
struct DhcpServiceMeta {
    action: DhcpServiceAction,
}

#[derive(Deserialize)]
struct ArtifactUploadMeta {
    filename: String,
}

impl<R: CommandRunner + Send + Sync + 'static> Handlers<R> {
    pub async fn dispatch(&self, task: &Task) -> HandlerOutcome {
        let runner: &dyn CommandRunner = self.runner.as_ref();
        match task.operation {
            OperationCode::Start => Self::unit(zone_commands::start(runner, &task.zone_name).await),
            OperationCode::Stop => Self::unit(zone_commands::stop(runner, &task.zone_name).await),
            OperationCode::Restart => Self::unit(zone_commands::restart(runner, &task.zone_name).await),
            OperationCode::Delete => Self::unit(zone_commands::delete(runner, &task.zone_name).await),
            OperationCode::Discover => match zone_commands::discover(runner).await {
                Ok(zones) => HandlerOutcome::ok_with_artifact(
                    format!("discovered {} zones", zones.len()),
                    serde_json::to_string(&zones).unwrap_or_default(),
                ),
                Err(e) => e.into(),
            },
            OperationCode::ZoneCreate | OperationCode::ZoneModify => self.handle_zone_configure(runner, task).await,
            OperationCode::ZoneProvision => self.handle_zone_provision(runner, task).await,

            OperationCode::ZpoolCreate => self.handle_zpool_create(runner, task).await,
            OperationCode::ZpoolDestroy => self.handle_zpool_destroy(runner, task).await,
            OperationCode::ZpoolSetProperties => self.handle_zpool_props(runner, task).await,
            OperationCode::ZpoolAddVdev => self.handle_zpool_vdev(runner, task).await,
            OperationCode::ZpoolRemoveVdev => self.handle_zpool_remove_vdev(runner, task).await,
            OperationCode::ZpoolReplaceDevice => self.handle_zpool_replace(runner, task).await,
            OperationCode::ZpoolOnlineDevice => self.handle_zpool_one_device(runner, task, true).await,
            OperationCode::ZpoolOfflineDevice => self.handle_zpool_one_device(runner, task, false).await,
            OperationCode::ZpoolScrub => self.handle_zpool_name(runner, task, zfs_commands::zpool_scrub).await,
            OperationCode::ZpoolStopScrub => self.handle_zpool_name(runner, task, zfs_commands::zpool_stop_scrub).await,
            OperationCode::ZpoolExport => self.handle_zpool_name(runner, task, zfs_commands::zpool_export).await,
            OperationCode::ZpoolImport => self.handle_zpool_name(runner, task, zfs_commands::zpool_import).await,
            OperationCode::ZpoolUpgrade => self.handle_zpool_name(runner, task, zfs_commands::zpool_upgrade).await,

            OperationCode::ZfsCreateDataset => self.handle_dataset_create(runner, task).await,
            OperationCode::ZfsDestroyDataset => self.handle_dataset_destroy(runner, task).await,
            OperationCode::ZfsSetProperties => self.handle_dataset_props(runner, task).await,
            OperationCode::ZfsCloneDataset => self.handle_dataset_clone(runner, task).await,
            OperationCode::ZfsPromoteDataset => self.handle_dataset_name(runner, task, zfs_commands::zfs_promote_dataset).await,
            OperationCode::ZfsRenameDataset => self.handle_dataset_rename(runner, task).await,
            OperationCode::ZfsCreateSnapshot => self.handle_snapshot(runner, task, zfs_commands::zfs_create_snapshot).await,
            OperationCode::ZfsDestroySnapshot => self.handle_snapshot(runner, task, zfs_commands::zfs_destroy_snapshot).await,
            OperationCode::ZfsRollbackSnapshot => self.handle_snapshot(runner, task, zfs_commands::zfs_rollback_snapshot).await,
            OperationCode::ZfsHoldSnapshot => self.handle_snapshot_hold(runner, task, true).await,
            OperationCode::ZfsReleaseSnapshot => self.handle_snapshot_hold(runner, task, false).await,

            OperationCode::NatCreate => self.handle_nat_create(runner, task).await,
            OperationCode::NatDelete => self.handle_nat_delete(runner, task).await,
            OperationCode::ForwardingConfigure => self.handle_forwarding(runner, task).await,
            OperationCode::DhcpUpdateConfig => self.handle_dhcp_update_config(runner, task).await,
            OperationCode::DhcpAddHost => self.handle_dhcp_add_host(runner, task).await,
            OperationCode::DhcpRemoveHost => self.handle_dhcp_remove_host(runner, task).await,
            OperationCode::DhcpServiceControl => self.handle_dhcp_service_control(runner, task).await,
            OperationCode::ArtifactUploadProcess => self.handle_artifact_upload(task).await,

            OperationCode::ZoneSetup => self.handle_zone_setup(task).await,
        }
    }

    fn unit(result: zoneweaver_runtime::Result<()>) -> HandlerOutcome {
        match result {
            Ok(()) => HandlerOutcome::ok("ok"),
            Err(e) => e.into(),
        }
    }

    async fn handle_zone_configure(&self, runner: &dyn CommandRunner, task: &Task) -> HandlerOutcome {
        let meta: ZoneConfigureMeta = match decode(task) {
            Ok(m) => m,
            Err(o) => return o,
        };
        let nets: Vec<(String, String)> = meta.nets.iter().map(|n| (n.physical.clone(), n.address.clone())).collect();
        let input = zone_commands::ZoneCfgInput {
            brand: &meta.brand,
            zonepath: &meta.zonepath,
            autoboot: meta.autoboot,
            nets: &nets,
            vcpus: meta.vcpus,
            ram_mb: meta.ram_mb,
        };
        let lines = zone_commands::generate_zonecfg(&input);
        let result = if task.operation == OperationCode::ZoneCreate {
            zone_commands::zone_create(runner, &task.zone_name, &lines).await
        } else {
            zone_commands::zone_modify(runner, &task.zone_name, &lines).await
        };
        Self::unit(result)
    }

    async fn handle_zpool_create(&self, runner: &dyn CommandRunner, task: &Task) -> HandlerOutcome {
        let meta: ZpoolCreateMeta = match decode(task) {
            Ok(m) => m,
            Err(o) => return o,
        };
        let args: Vec<&str> = meta.vdev_args.iter().map(String::as_str).collect();
        Self::unit(zfs_commands::zpool_create(runner, &meta.pool, &args).await)
    }

    async fn handle_zpool_destroy(&self, runner: &dyn CommandRunner, task: &Task) -> HandlerOutcome {
        let meta: ZpoolDestroyMeta = match decode(task) {
            Ok(m) => m,
            Err(o) => return o,
        };
        Self::unit(zfs_commands::zpool_destroy(runner, &meta.pool, meta.force).await)
    }

    async fn handle_zpool_vdev(&self, runner: &dyn CommandRunner, task: &Task) -> HandlerOutcome {
        let meta: ZpoolVdevMeta = match decode(task) {
            Ok(m) => m,
            Err(o) => return o,
        };
        let args: Vec<&str> = meta.vdev_args.iter().map(String::as_str).collect();
        Self::unit(zfs_commands::zpool_add_vdev(runner, &meta.pool, &args).await)
    }

    async fn handle_zpool_remove_vdev(&self, runner: &dyn CommandRunner, task: &Task) -> HandlerOutcome {
        let meta: ZpoolOneDeviceMeta = match decode(task) {
            Ok(m) => m,
            Err(o) => return o,
        };
        Self::unit(zfs_commands::zpool_remove_vdev(runner, &meta.pool, &meta.device).await)
    }

    async fn handle_zpool_replace(&self, runner: &dyn CommandRunner, task: &Task) -> HandlerOutcome {
        let meta: ZpoolReplaceMeta = match decode(task) {
            Ok(m) => m,
            Err(o) => return o,
        };
        Self::unit(zfs_commands::zpool_replace_device(runner, &meta.pool, &meta.old, &meta.new).await)
    }

    async fn handle_zpool_one_device(&self, runner: &dyn CommandRunner, task: &Task, online: bool) -> HandlerOutcome {
        let meta: ZpoolOneDeviceMeta = match decode(task) {
            Ok(m) => m,
            Err(o) => return o,
        };
        let result = if online {
            zfs_commands::zpool_online_device(runner, &meta.pool, &meta.device).await
        } else {
            zfs_commands::zpool_offline_device(runner, &meta.pool, &meta.device).await
        };
        Self::unit(result)
    }

    async fn handle_zpool_props(&self, runner: &dyn CommandRunner, task: &Task) -> HandlerOutcome {
        let meta: ZpoolPropsMeta = match decode(task) {
            Ok(m) => m,
            Err(o) => return o,
        };
        Self::unit(zfs_commands::zpool_set_properties(runner, &meta.pool, &as_pairs(&meta.properties)).await)
    }

    async fn handle_zpool_name<F, Fut>(&self, runner: &dyn CommandRunner, task: &Task, call: F) -> HandlerOutcome
    where
        F: FnOnce(&dyn CommandRunner, &str) -> Fut,
        Fut: std::future::Future<Output = zoneweaver_runtime::Result<()>>,
    {
        let meta: ZpoolNameMeta = match decode(task) {
            Ok(m) => m,
            Err(o) => return o,
        };
        Self::unit(call(runner, &meta.pool).await)
    }

    async fn handle_dataset_create(&self, runner: &dyn CommandRunner, task: &Task) -> HandlerOutcome {
        let meta: DatasetCreateMeta = match decode(task) {
            Ok(m) => m,
            Err(o) => return o,
        };
        Self::unit(zfs_commands::zfs_create_dataset(runner, &meta.dataset, &as_pairs(&meta.properties)).await)
    }

    async fn handle_dataset_destroy(&self, runner: &dyn CommandRunner, task: &Task) -> HandlerOutcome {
        let meta: DatasetDestroyMeta = match decode(task) {
            Ok(m) => m,
            Err(o) => return o,
        };
        Self::unit(zfs_commands::zfs_destroy_dataset(runner, &meta.dataset, meta.recursive).await)
    }

    async fn handle_dataset_name<F, Fut>(&self, runner: &dyn CommandRunner, task: &Task, call: F) -> HandlerOutcome
    where
        F: FnOnce(&dyn CommandRunner, &str) -> Fut,
        Fut: std::future::Future<Output = zoneweaver_runtime::Result<()>>,
    {
        let meta: DatasetNameMeta = match decode(task) {
            Ok(m) => m,
            Err(o) => return o,
        };
        Self::unit(call(runner, &meta.dataset).await)
    }

    async fn handle_dataset_props(&self, runner: &dyn CommandRunner, task: &Task) -> HandlerOutcome {
        let meta: DatasetPropsMeta = match decode(task) {
            Ok(m) => m,
            Err(o) => return o,
        };
        Self::unit(zfs_commands::zfs_set_properties(runner, &meta.dataset, &as_pairs(&meta.properties)).await)
    }

    async fn handle_dataset_clone(&self, runner: &dyn CommandRunner, task: &Task) -> HandlerOutcome {
        let meta: DatasetCloneMeta = match decode(task) {
            Ok(m) => m,
            Err(o) => return o,
        };
        Self::unit(zfs_commands::zfs_clone_dataset(runner, &meta.snapshot, &meta.target).await)
    }

    async fn handle_dataset_rename(&self, runner: &dyn CommandRunner, task: &Task) -> HandlerOutcome {
        let meta: DatasetRenameMeta = match decode(task) {
            Ok(m) => m,
            Err(o) => return o,
        };
        Self::unit(zfs_commands::zfs_rename_dataset(runner, &meta.dataset, &meta.new_name).await)
    }

    async fn handle_snapshot<F, Fut>(&self, runner: &dyn CommandRunner, task: &Task, call: F) -> HandlerOutcome
    where
        F: FnOnce(&dyn CommandRunner, &str, &str) -> Fut,
        Fut: std::future::Future<Output = zoneweaver_runtime::Result<()>>,
    {
        let meta: SnapshotNameMeta = match decode(task) {
            Ok(m) => m,
            Err(o) => return o,
        };
        Self::unit(call(runner, &meta.dataset, &meta.snapshot).await)
    }

    async fn handle_snapshot_hold(&self, runner: &dyn CommandRunner, task: &Task, hold: bool) -> HandlerOutcome {
        let meta: SnapshotHoldMeta = match decode(task) {
            Ok(m) => m,
            Err(o) => return o,
        };
        let result = if hold {
            zfs_commands::zfs_hold_snapshot(runner, &meta.dataset, &meta.snapshot, &meta.tag).await
        } else {
            zfs_commands::zfs_release_snapshot(runner, &meta.dataset, &meta.snapshot, &meta.tag).await
        };
        Self::unit(result)
    }

    async fn handle_nat_create(&self, runner: &dyn CommandRunner, task: &Task) -> HandlerOutcome {
        let meta: NatCreateMeta = match decode(task) {
            Ok(m) => m,
            Err(o) => return o,
        };

        if let Err(e) = self.reconcile_nat().await {
            return e.into();
        }

        let raw_rule = network::render_rule(meta.rule_type, &meta.bridge, &meta.subnet, &meta.target, &meta.protocol);
        let rule = NatRule {
            id: uuid::Uuid::new_v4().to_string(),
            rule_type: meta.rule_type,
            bridge: meta.bridge,
            subnet: meta.subnet,
            target: meta.target,
            protocol: meta.protocol,
            raw_rule,
            description: meta.description,
            created_by: task.created_by.clone(),
        };

        if let Err(e) = self.nat_rules.create(&rule.id, &rule) {
            return HandlerOutcome::failed(e.to_string());
        }

        self.sync_nat_file(runner).await
    }

    async fn handle_nat_delete(&self, runner: &dyn CommandRunner, task: &Task) -> HandlerOutcome {
        let meta: NatDeleteMeta = match decode(task) {
            Ok(m) => m,
            Err(o) => return o,
        };

        if let Err(e) = self.reconcile_nat().await {
            return e.into();
        }

        if let Err(e) = self.nat_rules.destroy_by_id(&meta.rule_id) {
            return HandlerOutcome::failed(e.to_string());
        }

        self.sync_nat_file(runner).await
    }

    /// Import file lines the DB doesn't know about and drop stale DB rows,
    /// before applying the mutation the caller is in the middle of.
    async fn reconcile_nat(&self) -> zoneweaver_runtime::Result<()> {
        let contents = tokio::fs::read_to_string(&self.nat_conf_path).await.unwrap_or_default();
        let db_rules = self
            .nat_rules
            .find_all()
            .map_err(|e| zoneweaver_runtime::RuntimeError::internal_error(e.to_string()))?;
        let recon = network::reconcile(&db_rules, &contents);

        for line in recon.to_import {
            let rule = NatRule {
                id: uuid::Uuid::new_v4().to_string(),
                rule_type: NatRuleType::Map,
                bridge: String::new(),
                subnet: String::new(),
                target: String::new(),
                protocol: String::new(),
                raw_rule: line,
                description: None,
                created_by: "system_import".to_string(),
            };
            self.nat_rules
                .create(&rule.id, &rule)
                .map_err(|e| zoneweaver_runtime::RuntimeError::internal_error(e.to_string()))?;
        }

        for stale_id in recon.stale_db_ids {
            self.nat_rules
                .destroy_by_id(&stale_id)
                .map_err(|e| zoneweaver_runtime::RuntimeError::internal_error(e.to_string()))?;
        }

        Ok(())
    }

    async fn sync_nat_file(&self, runner: &dyn CommandRunner) -> HandlerOutcome {
        let rules = match self.nat_rules.find_all() {
            Ok(r) => r,
            Err(e) => return HandlerOutcome::failed(e.to_string()),
        };
        let current = tokio::fs::read_to_string(&self.nat_conf_path).await.unwrap_or_default();
        match network::sync_nat_rules(runner, &self.nat_conf_path, &current, &rules).await {
            Ok(()) => HandlerOutcome::ok("nat rules synced"),
            Err(e) => e.into(),
        }
    }

    async fn handle_forwarding(&self, runner: &dyn CommandRunner, task: &Task) -> HandlerOutcome {
        let meta: ForwardingMeta = match decode(task) {
            Ok(m) => m,
            Err(o) => return o,
        };
        match network::configure_forwarding(runner, meta.enable, &meta.interfaces).await {
            Ok(failures) if failures.is_empty() => HandlerOutcome::ok("forwarding configured on all interfaces"),
            Ok(failures) => HandlerOutcome::ok(format!("forwarding configured with failures on: {failures:?}")),
            Err(e) => e.into(),
        }
    }

    async fn handle_zone_setup(&self, task: &Task) -> HandlerOutcome {
        let meta: ZoneSetupMeta = match decode(task) {
            Ok(m) => m,
            Err(o) => return o,
        };

        let recipe: Recipe = match self.recipes.find_by_id(&meta.recipe_id) {
            Ok(Some(r)) => r,
            Ok(None) => return HandlerOutcome::failed(format!("recipe {} not found", meta.recipe_id)),
            Err(e) => return HandlerOutcome::failed(e.to_string()),
        };

        let pty = match self.pty.get(&task.zone_name).await {
            Some(p) => p,
            None => return HandlerOutcome::failed(format!("no PTY session open for zone {}", task.zone_name)),
        };

        match self.recipe_interpreter.execute(&recipe, pty, meta.variables).await {
            Ok(report) if report.success => {
                HandlerOutcome::ok_with_artifact("recipe completed", serde_json::to_string(&report.output).unwrap_or_default())
            }
            Ok(report) => HandlerOutcome::failed(report.errors.join("; ")),
            Err(e) => e.into(),
        }
    }

    /// zone_create, then a pre-provision snapshot, then the recipe against a
    /// live PTY; any failure past the snapshot rolls the dataset back rather
    /// than leaving a half-provisioned zone around.
    async fn handle_zone_provision(&self, runner: &dyn CommandRunner, task: &Task) -> HandlerOutcome {
        let meta: ZoneProvisionMeta = match decode(task) {
            Ok(m) => m,
            Err(o) => return o,
        };

        let nets: Vec<(String, String)> = meta.nets.iter().map(|n| (n.physical.clone(), n.address.clone())).collect();
        let input = zone_commands::ZoneCfgInput {
            brand: &meta.brand,
            zonepath: &meta.zonepath,
            autoboot: meta.autoboot,
            nets: &nets,
            vcpus: meta.vcpus,
            ram_mb: meta.ram_mb,
        };
        let lines = zone_commands::generate_zonecfg(&input);
        if let Err(e) = zone_commands::zone_create(runner, &task.zone_name, &lines).await {
            return e.into();
        }

        if let Err(e) = zfs_commands::zfs_create_snapshot(runner, &meta.dataset, &meta.snapshot_name).await {
            return e.into();
        }

        let recipe: Recipe = match self.recipes.find_by_id(&meta.recipe_id) {
            Ok(Some(r)) => r,
            Ok(None) => return self.rollback_provision(runner, &meta, format!("recipe {} not found", meta.recipe_id)).await,
            Err(e) => return self.rollback_provision(runner, &meta, e.to_string()).await,
        };

        let pty = match self.pty.get(&task.zone_name).await {
            Some(p) => p,
            None => return self.rollback_provision(runner, &meta, format!("no PTY session open for zone {}", task.zone_name)).await,
        };

        match self.recipe_interpreter.execute(&recipe, pty, meta.variables.clone()).await {
            Ok(report) if report.success => {
                HandlerOutcome::ok_with_artifact("zone provisioned", serde_json::to_string(&report.output).unwrap_or_default())
            }
            Ok(report) => self.rollback_provision(runner, &meta, report.errors.join("; ")).await,
            Err(e) => self.rollback_provision(runner, &meta, e.to_string()).await,
        }
    }

    async fn rollback_provision(&self, runner: &dyn CommandRunner, meta: &ZoneProvisionMeta, original_error: String) -> HandlerOutcome {
        match zfs_commands::zfs_rollback_snapshot(runner, &meta.dataset, &meta.snapshot_name).await {
            Ok(()) => HandlerOutcome::failed(format!("provisioning failed, rolled back to snapshot {}: {original_error}", meta.snapshot_name)),
            Err(rollback_err) => HandlerOutcome::failed(format!(
                "provisioning failed: {original_error}; rollback to snapshot {} also failed: {rollback_err}",
                meta.snapshot_name
            )),
        }
    }

    /// Import file blocks the DB doesn't know about and drop stale DB rows,
    /// mirroring [`Self::reconcile_nat`].
    async fn reconcile_dhcp(&self) -> zoneweaver_runtime::Result<()> {
        let contents = tokio::fs::read_to_string(&self.dhcp_conf_path).await.unwrap_or_default();
        let db_subnet = self
            .dhcp_subnet
            .find_by_id(DHCP_SUBNET_ID)
            .map_err(|e| zoneweaver_runtime::RuntimeError::internal_error(e.to_string()))?;
        let db_hosts = self.dhcp_hosts.find_all().map_err(|e| zoneweaver_runtime::RuntimeError::internal_error(e.to_string()))?;
        let recon = network::reconcile_dhcp(db_subnet.as_ref(), &db_hosts, &contents);

        if let Some(subnet) = recon.subnet_to_import {
            self.dhcp_subnet
                .create(&subnet.id, &subnet)
                .map_err(|e| zoneweaver_runtime::RuntimeError::internal_error(e.to_string()))?;
        }
        if recon.stale_subnet {
            self.dhcp_subnet
                .destroy_by_id(DHCP_SUBNET_ID)
                .map_err(|e| zoneweaver_runtime::RuntimeError::internal_error(e.to_string()))?;
        }
        for host in recon.hosts_to_import {
            self.dhcp_hosts
                .create(&host.id, &host)
                .map_err(|e| zoneweaver_runtime::RuntimeError::internal_error(e.to_string()))?;
        }
        for stale_id in recon.stale_host_ids {
            self.dhcp_hosts
                .destroy_by_id(&stale_id)
                .map_err(|e| zoneweaver_runtime::RuntimeError::internal_error(e.to_string()))?;
        }

        Ok(())
    }

    async fn sync_dhcp_file(&self, runner: &dyn CommandRunner) -> HandlerOutcome {
        let subnet = match self.dhcp_subnet.find_by_id(DHCP_SUBNET_ID) {
            Ok(s) => s,
            Err(e) => return HandlerOutcome::failed(e.to_string()),
        };
        let hosts = match self.dhcp_hosts.find_all() {
            Ok(h) => h,
            Err(e) => return HandlerOutcome::failed(e.to_string()),
        };
        let current = tokio::fs::read_to_string(&self.dhcp_conf_path).await.unwrap_or_default();
        match network::sync_dhcp_config(runner, &self.dhcp_conf_path, &current, subnet.as_ref(), &hosts).await {
            Ok(()) => HandlerOutcome::ok("dhcp config synced"),
            Err(e) => e.into(),
        }
    }

    async fn handle_dhcp_update_config(&self, runner: &dyn CommandRunner, task: &Task) -> HandlerOutcome {
        let meta: DhcpConfigMeta = match decode(task) {
            Ok(m) => m,
            Err(o) => return o,
        };

        if let Err(e) = self.reconcile_dhcp().await {
            return e.into();
        }

        let raw_block = network::render_dhcp_subnet_block(&meta.net, &meta.netmask, &meta.routers, &meta.range_start, &meta.range_end, &meta.dns);
        let subnet = DhcpSubnetConfig {
            id: DHCP_SUBNET_ID.to_string(),
            net: meta.net,
            netmask: meta.netmask,
            routers: meta.routers,
            range_start: meta.range_start,
            range_end: meta.range_end,
            dns: meta.dns,
            raw_block,
        };
        if let Err(e) = self.dhcp_subnet.create(&subnet.id, &subnet) {
            return HandlerOutcome::failed(e.to_string());
        }

        self.sync_dhcp_file(runner).await
    }

    async fn handle_dhcp_add_host(&self, runner: &dyn CommandRunner, task: &Task) -> HandlerOutcome {
        let meta: DhcpHostMeta = match decode(task) {
            Ok(m) => m,
            Err(o) => return o,
        };

        if let Err(e) = self.reconcile_dhcp().await {
            return e.into();
        }

        let raw_block = network::render_dhcp_host_line(&meta.hostname, &meta.mac_address, &meta.ip_address);
        let host = DhcpHost {
            id: uuid::Uuid::new_v4().to_string(),
            hostname: meta.hostname,
            mac_address: meta.mac_address,
            ip_address: meta.ip_address,
            raw_block,
            created_by: task.created_by.clone(),
        };
        if let Err(e) = self.dhcp_hosts.create(&host.id, &host) {
            return HandlerOutcome::failed(e.to_string());
        }

        self.sync_dhcp_file(runner).await
    }

    async fn handle_dhcp_remove_host(&self, runner: &dyn CommandRunner, task: &Task) -> HandlerOutcome {
        let meta: DhcpHostRemoveMeta = match decode(task) {
            Ok(m) => m,
            Err(o) => return o,
        };

        if let Err(e) = self.reconcile_dhcp().await {
            return e.into();
        }

        let hosts = match self.dhcp_hosts.find_all() {
            Ok(h) => h,
            Err(e) => return HandlerOutcome::failed(e.to_string()),
        };
        let Some(existing) = hosts.into_iter().find(|h| h.hostname == meta.hostname) else {
            return HandlerOutcome::failed(format!("no dhcp host reservation for {}", meta.hostname));
        };
        if let Err(e) = self.dhcp_hosts.destroy_by_id(&existing.id) {
            return HandlerOutcome::failed(e.to_string());
        }

        self.sync_dhcp_file(runner).await
    }

    async fn handle_dhcp_service_control(&self, runner: &dyn CommandRunner, task: &Task) -> HandlerOutcome {
        let meta: DhcpServiceMeta = match decode(task) {
            Ok(m) => m,
            Err(o) => return o,
        };

        let fmri = match network::resolve_dhcp_fmri(runner).await {
            Ok(f) => f,
            Err(e) => return e.into(),
        };

        let result = match meta.action {
            DhcpServiceAction::Restart => network::refresh_smf_service(runner, &fmri).await,
            DhcpServiceAction::Enable => {
                let out = runner.run_default("svcadm", &["enable", &fmri]).await;
                if out.success {
                    Ok(())
                } else {
                    Err(zoneweaver_runtime::RuntimeError::network_error(format!("svcadm enable {fmri} failed: {}", out.stderr)))
                }
            }
            DhcpServiceAction::Disable => {
                let out = runner.run_default("svcadm", &["disable", &fmri]).await;
                if out.success {
                    Ok(())
                } else {
                    Err(zoneweaver_runtime::RuntimeError::network_error(format!("svcadm disable {fmri} failed: {}", out.stderr)))
                }
            }
        };

        match result {
            Ok(()) => HandlerOutcome::ok(format!("dhcp service {fmri} updated")),
            Err(e) => e.into(),
        }
    }

    /// Validates the requested filename against path traversal, then looks
    /// it up under each configured artifact directory in order.
    async fn handle_artifact_upload(&self, task: &Task) -> HandlerOutcome {
        let meta: ArtifactUploadMeta = match decode(task) {
            Ok(m) => m,
            Err(o) => return o,
        };

        if meta.filename.is_empty() || meta.filename.contains("..") || meta.filename.contains('/') || meta.filename.contains('\\') {
            return HandlerOutcome::failed(format!("refusing artifact filename outside artifact_storage paths: {}", meta.filename));
        }

        for base in &self.artifact_paths {
            let candidate = std::path::Path::new(base).join(&meta.filename);
            if let Ok(info) = tokio::fs::metadata(&candidate).await {
                if info.is_file() {
                    let artifact = serde_json::json!({ "path": candidate.to_string_lossy(), "size_bytes": info.len() });
                    return HandlerOutcome::ok_with_artifact(format!("artifact {} processed", meta.filename), artifact.to_string());
                }
            }
        }

        HandlerOutcome::failed(format!("artifact {} not found under any configured artifact_storage path", meta.filename))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;
    use zoneweaver_core::TaskPriority;
    use zoneweaver_runtime::mock::MockCommandRunner;
    use zoneweaver_storage::RedbBackend;

    fn test_handlers() -> (tempfile::TempDir, Handlers<MockCommandRunner>) {
        let dir = tempdir().unwrap();
        let backend: Arc<dyn zoneweaver_storage::KVStore> = Arc::new(RedbBackend::new(dir.path().join("handlers.redb")).unwrap());
        let handlers = Handlers {
            runner: Arc::new(MockCommandRunner::new()),
            nat_rules: Repository::new(Arc::clone(&backend), "nat_rules"),
            recipes: Repository::new(Arc::clone(&backend), "recipes"),
            pty: Arc::new(PtyMultiplexer::new()),
            recipe_interpreter: Arc::new(RecipeInterpreter::new(chrono::Duration::seconds(60))),
            nat_conf_path: dir.path().join("ipnat.conf").to_string_lossy().to_string(),
            dhcp_subnet: Repository::new(Arc::clone(&backend), "dhcp_subnet"),
            dhcp_hosts: Repository::new(Arc::clone(&backend), "dhcp_hosts"),
            dhcp_conf_path: dir.path().join("dhcpd.conf").to_string_lossy().to_string(),
            artifact_paths: vec![dir.path().to_string_lossy().to_string()],
        };
        (dir, handlers)
    }

    fn task(zone_name: &str, operation: OperationCode, metadata: serde_json::Value) -> Task {
        Task::new(zone_name, operation, TaskPriority::Low, "test", metadata.to_string())
    }

    #[tokio::test]
    async fn test_dhcp_add_host_then_remove_syncs_file() {
        let (dir, handlers) = test_handlers();

        let add = task(
            "system",
            OperationCode::DhcpAddHost,
            serde_json::json!({ "hostname": "web01", "mac_address": "00:11:22:33:44:55", "ip_address": "10.0.0.5" }),
        );
        let outcome = handlers.dispatch(&add).await;
        assert!(outcome.success, "{:?}", outcome.error);

        let contents = std::fs::read_to_string(dir.path().join("dhcpd.conf")).unwrap();
        assert!(contents.contains("host web01"));

        let remove = task("system", OperationCode::DhcpRemoveHost, serde_json::json!({ "hostname": "web01" }));
        let outcome = handlers.dispatch(&remove).await;
        assert!(outcome.success, "{:?}", outcome.error);

        let contents = std::fs::read_to_string(dir.path().join("dhcpd.conf")).unwrap();
        assert!(!contents.contains("host web01"));
    }

    #[tokio::test]
    async fn test_dhcp_update_config_writes_subnet_block() {
        let (dir, handlers) = test_handlers();
        let update = task(
            "system",
            OperationCode::DhcpUpdateConfig,
            serde_json::json!({
                "net": "10.0.0.0", "netmask": "255.255.255.0", "routers": "10.0.0.1",
                "range_start": "10.0.0.100", "range_end": "10.0.0.200", "dns": "10.0.0.1"
            }),
        );
        let outcome = handlers.dispatch(&update).await;
        assert!(outcome.success, "{:?}", outcome.error);

        let contents = std::fs::read_to_string(dir.path().join("dhcpd.conf")).unwrap();
        assert!(contents.contains("subnet 10.0.0.0 netmask 255.255.255.0"));
    }

    #[tokio::test]
    async fn test_dhcp_service_control_enable() {
        let (_dir, handlers) = test_handlers();
        handlers.runner.on_success("svcs", &["-H", "-o", "fmri", "dhcp/server:ipv4"], "svc:/network/dhcp/server:ipv4");
        handlers.runner.on_success("svcadm", &["enable", "dhcp/server:ipv4"], "");

        let control = task("system", OperationCode::DhcpServiceControl, serde_json::json!({ "action": "enable" }));
        let outcome = handlers.dispatch(&control).await;
        assert!(outcome.success, "{:?}", outcome.error);
    }

    #[tokio::test]
    async fn test_artifact_upload_process_finds_file() {
        let (dir, handlers) = test_handlers();
        std::fs::write(dir.path().join("image.tar.gz"), b"fake artifact bytes").unwrap();

        let upload = task("system", OperationCode::ArtifactUploadProcess, serde_json::json!({ "filename": "image.tar.gz" }));
        let outcome = handlers.dispatch(&upload).await;
        assert!(outcome.success, "{:?}", outcome.error);
        assert!(outcome.artifact.unwrap().contains("size_bytes"));
    }

    #[tokio::test]
    async fn test_artifact_upload_process_rejects_path_traversal() {
        let (_dir, handlers) = test_handlers();
        let upload = task("system", OperationCode::ArtifactUploadProcess, serde_json::json!({ "filename": "../../etc/passwd" }));
        let outcome = handlers.dispatch(&upload).await;
        assert!(!outcome.success);
    }

    #[tokio::test]
    async fn test_artifact_upload_process_missing_file_fails() {
        let (_dir, handlers) = test_handlers();
        let upload = task("system", OperationCode::ArtifactUploadProcess, serde_json::json!({ "filename": "nope.tar.gz" }));
        let outcome = handlers.dispatch(&upload).await;
        assert!(!outcome.success);
    }

    #[tokio::test]
    async fn test_zone_provision_rolls_back_on_missing_recipe() {
        let (_dir, handlers) = test_handlers();
        handlers.runner.on_success("zonecfg", &["-z", "web99", "-f", "/tmp/zonecfg-web99.cmd"], "");
        handlers.runner.on_success("zfs", &["snapshot", "rpool/zones/web99@pre-provision"], "");
        handlers.runner.on_success("zfs", &["rollback", "-r", "rpool/zones/web99@pre-provision"], "");

        let provision = task(
            "web99",
            OperationCode::ZoneProvision,
            serde_json::json!({
                "brand": "lx",
                "zonepath": "/zones/web99",
                "vcpus": null,
                "ram_mb": null,
                "dataset": "rpool/zones/web99",
                "recipe_id": "missing-recipe"
            }),
        );

        let outcome = handlers.dispatch(&provision).await;
        assert!(!outcome.success);
        let error = outcome.error.unwrap();
        assert!(error.contains("rolled back"), "{error}");
        assert!(handlers.runner.calls().iter().any(|c| c.starts_with("zfs rollback")));
    }
}
