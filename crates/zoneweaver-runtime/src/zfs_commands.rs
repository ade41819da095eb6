//! `zpool`/`zfs` command wrappers backing the Task Engine's ZFS pool and
//! dataset operation handlers. Each function shells one command and maps a
//! non-zero exit to [`RuntimeError::zfs_error`], tolerating the handful of
//! "already exists"/"does not exist" messages that make retried handlers
//! idempotent.

use crate::command::{CommandOutput, CommandRunner};
use crate::error::{Result, RuntimeError};

fn benign(out: &CommandOutput, markers: &[&str]) -> bool {
    markers.iter().any(|m| out.stderr.to_ascii_lowercase().contains(m))
}

fn require(out: CommandOutput, tolerate: &[&str]) -> Result<()> {
    if out.success || benign(&out, tolerate) {
        Ok(())
    } else {
        Err(RuntimeError::zfs_error(out.error.unwrap_or(out.stderr)))
    }
}

// ---- zpool ----

pub async fn zpool_create(runner: &dyn CommandRunner, pool: &str, vdev_args: &[&str]) -> Result<()> {
    let mut args = vec!["create", pool];
    args.extend_from_slice(vdev_args);
    let out = runner.run_default("zpool", &args).await;
    require(out, &["already exists"])
}

pub async fn zpool_destroy(runner: &dyn CommandRunner, pool: &str, force: bool) -> Result<()> {
    let mut args = vec!["destroy"];
    if force {
        args.push("-f");
    }
    args.push(pool);
    let out = runner.run_default("zpool", &args).await;
    require(out, &["no such pool"])
}

pub async fn zpool_set_properties(runner: &dyn CommandRunner, pool: &str, props: &[(String, String)]) -> Result<()> {
    for (key, value) in props {
        let kv = format!("{key}={value}");
        let out = runner.run_default("zpool", &["set", &kv, pool]).await;
        require(out, &[])?;
    }
    Ok(())
}

pub async fn zpool_add_vdev(runner: &dyn CommandRunner, pool: &str, vdev_args: &[&str]) -> Result<()> {
    let mut args = vec!["add", pool];
    args.extend_from_slice(vdev_args);
    require(runner.run_default("zpool", &args).await, &[])
}

pub async fn zpool_remove_vdev(runner: &dyn CommandRunner, pool: &str, device: &str) -> Result<()> {
    require(runner.run_default("zpool", &["remove", pool, device]).await, &[])
}

pub async fn zpool_replace_device(runner: &dyn CommandRunner, pool: &str, old: &str, new: &str) -> Result<()> {
    require(runner.run_default("zpool", &["replace", pool, old, new]).await, &[])
}

pub async fn zpool_online_device(runner: &dyn CommandRunner, pool: &str, device: &str) -> Result<()> {
    require(runner.run_default("zpool", &["online", pool, device]).await, &[])
}

pub async fn zpool_offline_device(runner: &dyn CommandRunner, pool: &str, device: &str) -> Result<()> {
    require(runner.run_default("zpool", &["offline", pool, device]).await, &[])
}

pub async fn zpool_scrub(runner: &dyn CommandRunner, pool: &str) -> Result<()> {
    require(runner.run_default("zpool", &["scrub", pool]).await, &[])
}

pub async fn zpool_stop_scrub(runner: &dyn CommandRunner, pool: &str) -> Result<()> {
    require(runner.run_default("zpool", &["scrub", "-s", pool]).await, &[])
}

pub async fn zpool_export(runner: &dyn CommandRunner, pool: &str) -> Result<()> {
    require(runner.run_default("zpool", &["export", pool]).await, &[])
}

pub async fn zpool_import(runner: &dyn CommandRunner, pool: &str) -> Result<()> {
    require(runner.run_default("zpool", &["import", pool]).await, &["already exists"])
}

pub async fn zpool_upgrade(runner: &dyn CommandRunner, pool: &str) -> Result<()> {
    require(runner.run_default("zpool", &["upgrade", pool]).await, &[])
}

// ---- zfs dataset ----

pub async fn zfs_create_dataset(runner: &dyn CommandRunner, dataset: &str, props: &[(String, String)]) -> Result<()> {
    let mut args = vec!["create".to_string()];
    for (k, v) in props {
        args.push("-o".to_string());
        args.push(format!("{k}={v}"));
    }
    args.push(dataset.to_string());
    let arg_refs: Vec<&str> = args.iter().map(String::as_str).collect();
    require(runner.run_default("zfs", &arg_refs).await, &["already exists"])
}

pub async fn zfs_destroy_dataset(runner: &dyn CommandRunner, dataset: &str, recursive: bool) -> Result<()> {
    let mut args = vec!["destroy"];
    if recursive {
        args.push("-r");
    }
    args.push(dataset);
    require(runner.run_default("zfs", &args).await, &["dataset does not exist"])
}

pub async fn zfs_set_properties(runner: &dyn CommandRunner, dataset: &str, props: &[(String, String)]) -> Result<()> {
    for (key, value) in props {
        let kv = format!("{key}={value}");
        require(runner.run_default("zfs", &["set", &kv, dataset]).await, &[])?;
    }
    Ok(())
}

pub async fn zfs_clone_dataset(runner: &dyn CommandRunner, snapshot: &str, target: &str) -> Result<()> {
    require(runner.run_default("zfs", &["clone", snapshot, target]).await, &[])
}

pub async fn zfs_promote_dataset(runner: &dyn CommandRunner, dataset: &str) -> Result<()> {
    require(runner.run_default("zfs", &["promote", dataset]).await, &[])
}

pub async fn zfs_rename_dataset(runner: &dyn CommandRunner, from: &str, to: &str) -> Result<()> {
    require(runner.run_default("zfs", &["rename", from, to]).await, &[])
}

pub async fn zfs_create_snapshot(runner: &dyn CommandRunner, dataset: &str, snapshot_name: &str) -> Result<()> {
    let full = format!("{dataset}@{snapshot_name}");
    require(runner.run_default("zfs", &["snapshot", &full]).await, &["dataset already exists"])
}

pub async fn zfs_destroy_snapshot(runner: &dyn CommandRunner, dataset: &str, snapshot_name: &str) -> Result<()> {
    let full = format!("{dataset}@{snapshot_name}");
    require(runner.run_default("zfs", &["destroy", &full]).await, &["dataset does not exist"])
}

pub async fn zfs_rollback_snapshot(runner: &dyn CommandRunner, dataset: &str, snapshot_name: &str) -> Result<()> {
    let full = format!("{dataset}@{snapshot_name}");
    require(runner.run_default("zfs", &["rollback", "-r", &full]).await, &[])
}

pub async fn zfs_hold_snapshot(runner: &dyn CommandRunner, dataset: &str, snapshot_name: &str, tag: &str) -> Result<()> {
    let full = format!("{dataset}@{snapshot_name}");
    require(runner.run_default("zfs", &["hold", tag, &full]).await, &["tag already exists"])
}

pub async fn zfs_release_snapshot(runner: &dyn CommandRunner, dataset: &str, snapshot_name: &str, tag: &str) -> Result<()> {
    let full = format!("{dataset}@{snapshot_name}");
    require(runner.run_default("zfs", &["release", tag, &full]).await, &["no such tag"])
}

/// `zfs get all -H -o property,value <dataset>`, for the Storage Pipeline's
/// detailed-scan phase.
pub async fn zfs_get_all(runner: &dyn CommandRunner, dataset: &str) -> Result<String> {
    let out = runner
        .run_default("zfs", &["get", "all", "-H", "-o", "property,value", dataset])
        .await;
    if !out.success {
        return Err(RuntimeError::zfs_error(out.error.unwrap_or(out.stderr)));
    }
    Ok(out.stdout)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::mock::MockCommandRunner;

    #[tokio::test]
    async fn test_zpool_create_tolerates_already_exists() {
        let runner = MockCommandRunner::new();
        runner.on_failure("zpool", &["create", "tank", "c1t0d0"], "pool 'tank' already exists", 1);
        zpool_create(&runner, "tank", &["c1t0d0"]).await.unwrap();
    }

    #[tokio::test]
    async fn test_zpool_create_real_failure_propagates() {
        let runner = MockCommandRunner::new();
        runner.on_failure("zpool", &["create", "tank", "c1t0d0"], "no such device", 1);
        let err = zpool_create(&runner, "tank", &["c1t0d0"]).await.unwrap_err();
        assert!(matches!(err, RuntimeError::ZfsError { .. }));
    }

    #[tokio::test]
    async fn test_zfs_create_snapshot_command_shape() {
        let runner = MockCommandRunner::new();
        runner.on_success("zfs", &["snapshot", "rpool/zones/web01@pre-provision"], "");
        zfs_create_snapshot(&runner, "rpool/zones/web01", "pre-provision").await.unwrap();
        assert_eq!(runner.calls(), vec!["zfs snapshot rpool/zones/web01@pre-provision"]);
    }

    #[tokio::test]
    async fn test_zfs_destroy_dataset_tolerates_missing() {
        let runner = MockCommandRunner::new();
        runner.on_failure("zfs", &["destroy", "-r", "rpool/zones/gone"], "cannot open 'rpool/zones/gone': dataset does not exist", 1);
        zfs_destroy_dataset(&runner, "rpool/zones/gone", true).await.unwrap();
    }
}
