//! Periodic ZFS/disk/ARC/IO collector. Two independent schedules (slow,
//! minutes-scale inventory; frequent, sub-minute IO) feed the same
//! bounded-concurrency batch writer.

use crate::command::CommandRunner;
use crate::parsers;
use crate::zone_commands;
use chrono::Utc;
use futures_util::stream::{self, StreamExt};
use std::sync::Arc;
use std::sync::atomic::{AtomicU32, Ordering};
use tracing::warn;
use zoneweaver_core::{ArcStatsRecord, DiskIoStatRecord, DiskRecord, PoolIoStatRecord, ZfsDatasetRecord, ZfsPoolRecord};

/// Maximum concurrent `zfs get all` calls (and the chunk size used for
/// bulk-upsert batches).
const BATCH_CONCURRENCY: usize = 8;

/// Wraps a single command invocation so a parse/exec failure never aborts
/// the rest of a collection cycle — `None` in, `None` out.
async fn safe_execute<T, F, Fut>(label: &str, f: F) -> Option<T>
where
    F: FnOnce() -> Fut,
    Fut: std::future::Future<Output = crate::error::Result<T>>,
{
    match f().await {
        Ok(v) => Some(v),
        Err(e) => {
            warn!(command = label, error = %e, "storage pipeline command failed, skipping this sample");
            None
        }
    }
}

/// Splits a list of rows into `BATCH_CONCURRENCY`-sized chunks and applies
/// `writer` to each chunk concurrently via `bulk_upsert`-shaped callbacks.
pub struct BatchProcessor {
    chunk_size: usize,
}

impl Default for BatchProcessor {
    fn default() -> Self {
        Self::new(BATCH_CONCURRENCY)
    }
}

impl BatchProcessor {
    pub fn new(chunk_size: usize) -> Self {
        Self { chunk_size: chunk_size.max(1) }
    }

    pub async fn process<T, F, Fut>(&self, mut rows: Vec<T>, writer: F)
    where
        T: Send + 'static,
        F: Fn(Vec<T>) -> Fut + Send + Sync + 'static,
        Fut: std::future::Future<Output = ()> + Send,
    {
        let writer = Arc::new(writer);
        let mut chunks = Vec::new();
        while !rows.is_empty() {
            let tail = rows.split_off(rows.len().saturating_sub(self.chunk_size));
            chunks.push(tail);
        }

        stream::iter(chunks)
            .for_each_concurrent(Some(BATCH_CONCURRENCY), |chunk| {
                let writer = Arc::clone(&writer);
                async move { writer(chunk).await }
            })
            .await;
    }
}

/// Runs `tasks` with bounded concurrency, discarding results (used for the
/// fire-and-forget bulk-upsert batches described in the pipeline design).
pub async fn run_bounded<I, F, Fut>(items: Vec<I>, concurrency: usize, f: F)
where
    I: Send + 'static,
    F: Fn(I) -> Fut + Send + Sync,
    Fut: std::future::Future<Output = ()> + Send,
{
    stream::iter(items)
        .for_each_concurrent(Some(concurrency.max(1)), |item| f(item))
        .await;
}

#[derive(Debug, Clone)]
pub struct SlowCycleResult {
    pub pools: Vec<ZfsPoolRecord>,
    pub disks: Vec<DiskRecord>,
    pub datasets: Vec<ZfsDatasetRecord>,
}

#[derive(Debug, Clone)]
pub struct FrequentCycleResult {
    pub pool_io: Vec<PoolIoStatRecord>,
    pub disk_io: Vec<DiskIoStatRecord>,
    pub arc: Option<ArcStatsRecord>,
}

/// Process-local collector singleton. Owns the error counter that backs
/// HostInfo's `error_count` and the slow-interval backoff.
pub struct StoragePipeline<R: CommandRunner> {
    runner: R,
    host: String,
    error_count: AtomicU32,
}

const ERROR_THRESHOLD: u32 = 5;

impl<R: CommandRunner> StoragePipeline<R> {
    pub fn new(runner: R, host: impl Into<String>) -> Self {
        Self {
            runner,
            host: host.into(),
            error_count: AtomicU32::new(0),
        }
    }

    pub fn error_count(&self) -> u32 {
        self.error_count.load(Ordering::Relaxed)
    }

    fn note_success(&self) {
        self.error_count.store(0, Ordering::Relaxed);
    }

    fn note_failure(&self) {
        self.error_count.fetch_add(1, Ordering::Relaxed);
    }

    /// Slow cycle: pool inventory, disk inventory, zone-filtered dataset
    /// inventory, in parallel. A failed sub-command degrades that part of
    /// the result to empty rather than aborting the whole cycle.
    pub async fn collect_slow(&self) -> SlowCycleResult {
        let now = Utc::now();

        let pools_fut = safe_execute("zpool list", || async {
            let out = self.runner.run_default("zpool", &["list", "-H", "-o", "name,size,alloc,free,capacity,fragmentation,health"]).await;
            if !out.success {
                return Err(crate::error::RuntimeError::zfs_error(out.error.unwrap_or(out.stderr)));
            }
            Ok(out.stdout.lines().filter_map(|l| parsers::parse_zpool_list_line(&self.host, now, l)).collect::<Vec<_>>())
        });

        let disks_fut = safe_execute("format", || async {
            let out = self.runner.run_default("format", &["</dev/null"]).await;
            if !out.success {
                return Err(crate::error::RuntimeError::internal_error(out.error.unwrap_or(out.stderr)));
            }
            Ok(out.stdout.lines().filter_map(|l| parsers::parse_format_disk_line(&self.host, now, l)).collect::<Vec<_>>())
        });

        let zones_fut = safe_execute("zoneadm list", || zone_commands::discover(&self.runner));

        let (pools, disks, zones) = tokio::join!(pools_fut, disks_fut, zones_fut);
        let pools = pools.unwrap_or_default();
        let disks = disks.unwrap_or_default();
        let zone_names: Vec<String> = zones.unwrap_or_default().into_iter().map(|z| z.name).collect();

        let datasets = self.collect_datasets(now, &zone_names).await;

        if pools.is_empty() && disks.is_empty() && datasets.is_empty() {
            self.note_failure();
        } else {
            self.note_success();
        }

        SlowCycleResult { pools, disks, datasets }
    }

    async fn collect_datasets(&self, now: chrono::DateTime<Utc>, zone_names: &[String]) -> Vec<ZfsDatasetRecord> {
        let list_out = self.runner.run_default("zfs", &["list", "-H", "-o", "name,used,avail,refer,mountpoint,quota,compression"]).await;
        if !list_out.success {
            return Vec::new();
        }

        let all: Vec<ZfsDatasetRecord> = list_out
            .stdout
            .lines()
            .filter_map(|l| parsers::parse_zfs_list_line(&self.host, now, l))
            .collect();

        // Keep only datasets whose top path segment matches a discovered zone.
        all.into_iter()
            .filter(|d| {
                d.name
                    .split('/')
                    .nth(1)
                    .map(|segment| zone_names.iter().any(|z| z == segment))
                    .unwrap_or(false)
            })
            .collect()
    }

    /// Frequent cycle: one `zpool iostat -l -H -v 1 2` plus one ARC kstat read.
    pub async fn collect_frequent(&self) -> FrequentCycleResult {
        let now = Utc::now();

        let io_out = self.runner.run_default("zpool", &["iostat", "-l", "-H", "-v", "1", "2"]).await;
        let (pool_io, disk_io) = if io_out.success {
            parsers::parse_zpool_iostat_verbose(&self.host, now, &io_out.stdout)
        } else {
            (Vec::new(), Vec::new())
        };

        let arc_out = self.runner.run_default("kstat", &["-p", "zfs:0:arcstats:*"]).await;
        let arc = arc_out.success.then(|| parsers::parse_arcstats(&self.host, now, &arc_out.stdout));

        if pool_io.is_empty() && disk_io.is_empty() && arc.is_none() {
            self.note_failure();
        } else {
            self.note_success();
        }

        FrequentCycleResult { pool_io, disk_io, arc }
    }

    /// Whether the pipeline should back off to a longer interval.
    pub fn should_back_off(&self) -> bool {
        self.error_count() >= ERROR_THRESHOLD
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::mock::MockCommandRunner;

    #[tokio::test]
    async fn test_collect_slow_degrades_gracefully_on_zpool_failure() {
        let runner = MockCommandRunner::new();
        runner.on_failure("zpool", &["list", "-H", "-o", "name,size,alloc,free,capacity,fragmentation,health"], "no pools", 1);
        runner.on_success("format", &["</dev/null"], "");
        runner.on_success("zoneadm", &["list", "-cp"], "");
        runner.on_success("zfs", &["list", "-H", "-o", "name,used,avail,refer,mountpoint,quota,compression"], "");

        let pipeline = StoragePipeline::new(runner, "host1");
        let result = pipeline.collect_slow().await;
        assert!(result.pools.is_empty());
    }

    #[tokio::test]
    async fn test_error_counter_resets_on_success() {
        let runner = MockCommandRunner::new();
        runner.on_success(
            "zpool",
            &["list", "-H", "-o", "name,size,alloc,free,capacity,fragmentation,health"],
            "rpool\t100G\t40G\t60G\t40%\t10%\tONLINE\n",
        );
        runner.on_success("format", &["</dev/null"], "");
        runner.on_success("zoneadm", &["list", "-cp"], "");
        runner.on_success("zfs", &["list", "-H", "-o", "name,used,avail,refer,mountpoint,quota,compression"], "");

        let pipeline = StoragePipeline::new(runner, "host1");
        pipeline.error_count.store(3, Ordering::Relaxed);
        pipeline.collect_slow().await;
        assert_eq!(pipeline.error_count(), 0);
    }

    #[tokio::test]
    async fn test_should_back_off_past_threshold() {
        let runner = MockCommandRunner::new();
        let pipeline = StoragePipeline::new(runner, "host1");
        pipeline.error_count.store(ERROR_THRESHOLD, Ordering::Relaxed);
        assert!(pipeline.should_back_off());
    }
}
