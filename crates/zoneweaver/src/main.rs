mod config;

use clap::Parser;
use config::Config;
use std::path::PathBuf;
use std::sync::Arc;
use tokio_util::sync::CancellationToken;
use tracing::{error, info, warn};
use zoneweaver_apiserver::{ApiServer, AppState, Config as ApiConfig};
use zoneweaver_core::{ArcStatsRecord, HostInfo};
use zoneweaver_orchestrator::{Orchestrator, OrchestratorSettings};
use zoneweaver_runtime::command::SystemCommandRunner;
use zoneweaver_runtime::pty::PtyMultiplexer;
use zoneweaver_runtime::recipe::RecipeInterpreter;
use zoneweaver_runtime::storage_pipeline::StoragePipeline;
use zoneweaver_runtime::vnc::VncSupervisor;
use zoneweaver_storage::{KVStore, RedbBackend, Repository};
use zoneweaver_task_engine::handlers::Handlers;
use zoneweaver_task_engine::{Engine, EngineConfig};

#[derive(Parser)]
#[command(name = "zoneweaver", about = "illumos zone and storage host control plane")]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(clap::Subcommand)]
enum Commands {
    /// Run the API server and all background components on this host
    Serve {
        /// Path to the YAML config file (defaults to $CONFIG_PATH or ./config/config.yaml)
        #[arg(long)]
        config: Option<String>,
        /// Override the listen address from the config file
        #[arg(long)]
        listen: Option<String>,
        /// Override the redb data directory from the config file
        #[arg(long)]
        data_dir: Option<String>,
    },
}

#[tokio::main]
async fn main() -> miette::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env().unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info")),
        )
        .init();

    let cli = Cli::parse();

    match cli.command {
        Commands::Serve { config, listen, data_dir } => run_serve(config, listen, data_dir).await,
    }
}

/// Wait for either SIGINT (ctrl-c) or SIGTERM, returning which one fired.
async fn shutdown_signal() -> &'static str {
    use tokio::signal::unix::{signal, SignalKind};

    let mut sigterm = signal(SignalKind::terminate()).expect("failed to install SIGTERM handler");

    tokio::select! {
        _ = tokio::signal::ctrl_c() => "SIGINT",
        _ = sigterm.recv() => "SIGTERM",
    }
}

async fn run_serve(config_arg: Option<String>, listen_arg: Option<String>, data_dir_arg: Option<String>) -> miette::Result<()> {
    let config_path = config_arg.map(PathBuf::from).unwrap_or_else(config::config_path_from_env);
    let mut cfg = config::load(&config_path)?;
    if let Some(listen) = listen_arg {
        cfg.listen = listen;
    }
    if let Some(data_dir) = data_dir_arg {
        cfg.data_dir = data_dir;
    }

    info!(data_dir = %cfg.data_dir, listen = %cfg.listen, "starting zoneweaver");

    let store: Arc<dyn KVStore> =
        Arc::new(RedbBackend::new(&cfg.data_dir).map_err(|e| miette::miette!("failed to open storage at '{}': {e}", cfg.data_dir))?);

    let runner = SystemCommandRunner::new();
    let host_name = sys_info::hostname().unwrap_or_else(|_| "localhost".to_string());

    let nat_conf_path = std::path::Path::new(&cfg.data_dir)
        .parent()
        .unwrap_or_else(|| std::path::Path::new("."))
        .join("ipnat.conf")
        .to_string_lossy()
        .to_string();

    let dhcp_conf_path = std::path::Path::new(&cfg.data_dir)
        .parent()
        .unwrap_or_else(|| std::path::Path::new("."))
        .join("dhcpd.conf")
        .to_string_lossy()
        .to_string();

    let pty = Arc::new(PtyMultiplexer::new());
    let recipe_interpreter = Arc::new(RecipeInterpreter::new(chrono::Duration::seconds(cfg.recipes.default_timeout_secs)));

    let handlers = Arc::new(Handlers {
        runner: Arc::new(runner.clone()),
        nat_rules: Repository::new(store.clone(), "nat_rules"),
        recipes: Repository::new(store.clone(), "recipes"),
        pty: Arc::clone(&pty),
        recipe_interpreter: Arc::clone(&recipe_interpreter),
        nat_conf_path,
        dhcp_subnet: Repository::new(store.clone(), "dhcp_subnet"),
        dhcp_hosts: Repository::new(store.clone(), "dhcp_hosts"),
        dhcp_conf_path,
        artifact_paths: cfg.artifact_storage.paths.clone(),
    });

    let (event_tx, _event_rx) = tokio::sync::broadcast::channel(1024);

    let engine_config = EngineConfig {
        tick_interval: std::time::Duration::from_millis(cfg.task_engine.tick_interval_ms),
        worker_pool_size: cfg.task_engine.worker_pool_size,
    };
    let engine = Arc::new(Engine::new(Repository::new(store.clone(), "tasks"), handlers, engine_config, event_tx.clone()));

    let orchestrator_settings = OrchestratorSettings {
        priority_delay: std::time::Duration::from_secs(cfg.zones.orchestration.priority_delay_secs),
        reconcile_interval: std::time::Duration::from_secs(cfg.zones.orchestration.reconcile_interval_secs),
        ..OrchestratorSettings::default()
    };
    let orchestrator = Arc::new(Orchestrator::new(
        Arc::new(runner.clone()),
        Repository::new(store.clone(), "zones"),
        Repository::new(store.clone(), "tasks"),
        Repository::new(store.clone(), "orchestrator_state"),
        Arc::clone(&engine),
        orchestrator_settings,
    ));

    let vnc_pid_dir = std::path::Path::new(&cfg.data_dir)
        .parent()
        .unwrap_or_else(|| std::path::Path::new("."))
        .join("vnc_sessions");
    let vnc = Arc::new(VncSupervisor::new(runner.clone(), vnc_pid_dir));

    let host_ip = listen_host_for_proxy(&cfg.listen);
    let state = Arc::new(AppState::new(
        store.clone(),
        event_tx.clone(),
        Arc::clone(&engine),
        Arc::clone(&orchestrator),
        Arc::clone(&pty),
        Arc::clone(&vnc),
        Arc::clone(&recipe_interpreter),
        host_ip,
    ));

    if cfg.zones.orchestration.enabled {
        match orchestrator.enable("startup").await {
            Ok(started) => info!(count = started.len(), "orchestration enabled at startup, zones queued for start"),
            Err(e) => warn!(error = %e, "failed to enable orchestration at startup"),
        }
    }

    let tls_mode = tls_mode_from_config(&cfg)?;
    let api_config = ApiConfig {
        listen_addr: cfg.listen.parse().map_err(|e| miette::miette!("invalid listen address '{}': {e}", cfg.listen))?,
        tls_mode,
    };
    let server = ApiServer::new(api_config, Arc::clone(&state));

    let token = CancellationToken::new();

    let server_token = token.clone();
    let server_handle = tokio::spawn(async move {
        if let Err(e) = server.run(server_token).await {
            error!("API server error: {e}");
        }
    });

    let engine_token = token.clone();
    let engine_for_loop = Arc::clone(&engine);
    let engine_handle = tokio::spawn(async move {
        engine_for_loop.run(engine_token).await;
    });

    let orchestrator_token = token.clone();
    let orchestrator_for_loop = Arc::clone(&orchestrator);
    let orchestrator_handle = tokio::spawn(async move {
        orchestrator_for_loop.run(orchestrator_token).await;
    });

    let pty_token = token.clone();
    let pty_for_loop = Arc::clone(&pty);
    let pty_idle_gc_handle = tokio::spawn(async move {
        let mut interval = tokio::time::interval(std::time::Duration::from_secs(cfg.pty.idle_gc_interval_secs));
        loop {
            tokio::select! {
                _ = pty_token.cancelled() => return,
                _ = interval.tick() => pty_for_loop.idle_gc().await,
            }
        }
    });

    let vnc_token = token.clone();
    let vnc_for_loop = Arc::clone(&vnc);
    let zones_for_vnc = Repository::<zoneweaver_core::Zone>::new(store.clone(), "zones");
    let vnc_cleanup_handle = tokio::spawn(async move {
        let mut interval = tokio::time::interval(std::time::Duration::from_secs(cfg.vnc.cleanup_interval_secs));
        loop {
            tokio::select! {
                _ = vnc_token.cancelled() => return,
                _ = interval.tick() => {
                    let names = match zones_for_vnc.find_all() {
                        Ok(zones) => zones.into_iter().map(|z| z.name).collect::<Vec<_>>(),
                        Err(e) => {
                            warn!(error = %e, "failed to list zones for VNC cleanup");
                            continue;
                        }
                    };
                    if let Err(e) = vnc_for_loop.periodic_cleanup(&names).await {
                        warn!(error = %e, "VNC periodic cleanup failed");
                    }
                }
            }
        }
    });

    let storage_token = token.clone();
    let storage_handle = tokio::spawn(storage_pipeline_loop(storage_token, store.clone(), runner.clone(), host_name, cfg.storage_pipeline.clone()));

    info!("all components started");

    let sig = shutdown_signal().await;
    info!("received {sig}, shutting down gracefully...");
    token.cancel();

    let _ = tokio::time::timeout(std::time::Duration::from_secs(5), async {
        let _ = tokio::join!(
            server_handle,
            engine_handle,
            orchestrator_handle,
            pty_idle_gc_handle,
            vnc_cleanup_handle,
            storage_handle,
        );
    })
    .await;

    info!("shutdown complete");
    Ok(())
}

/// The host a VNC console proxy link should point clients at. Strips the
/// "listen on every interface" wildcard down to loopback; a real
/// deployment is expected to override this via the configured listen
/// address when binding to a specific interface.
fn listen_host_for_proxy(listen: &str) -> String {
    let host = listen.rsplit_once(':').map(|(host, _)| host).unwrap_or(listen);
    if host.is_empty() || host == "0.0.0.0" || host == "::" {
        "127.0.0.1".to_string()
    } else {
        host.trim_start_matches('[').trim_end_matches(']').to_string()
    }
}

fn tls_mode_from_config(cfg: &Config) -> miette::Result<zoneweaver_apiserver::tls::TlsMode> {
    use zoneweaver_apiserver::tls::TlsMode;

    if !cfg.tls.enabled {
        return Ok(TlsMode::Disabled);
    }

    match (&cfg.tls.cert_path, &cfg.tls.key_path) {
        (Some(cert), Some(key)) => Ok(TlsMode::Provided { cert_path: PathBuf::from(cert), key_path: PathBuf::from(key) }),
        (None, None) => {
            let parent = std::path::Path::new(&cfg.data_dir).parent().unwrap_or_else(|| std::path::Path::new(".")).to_path_buf();
            Ok(TlsMode::AutoGenerate { data_dir: parent.join("tls"), san_entries: vec!["localhost".to_string(), "127.0.0.1".to_string()] })
        }
        _ => Err(miette::miette!(
            help = "set both tls.cert_path and tls.key_path, or neither to auto-generate",
            "tls.enabled requires both cert_path and key_path together, or neither"
        )),
    }
}

/// Drives the two independent storage-pipeline schedules (slow inventory,
/// frequent IO) on their own intervals, persisting each cycle's rows into
/// the latest-per-subject repositories and updating `HostInfo`.
async fn storage_pipeline_loop(
    token: CancellationToken,
    store: Arc<dyn KVStore>,
    runner: SystemCommandRunner,
    host_name: String,
    config: config::StoragePipelineConfig,
) {
    let pipeline = Arc::new(StoragePipeline::new(runner, host_name.clone()));

    let zpools = Repository::new(store.clone(), "zpools");
    let datasets = Repository::new(store.clone(), "zfs_datasets");
    let disks = Repository::new(store.clone(), "disks");
    let pool_io = Repository::new(store.clone(), "pool_io_stats");
    let disk_io = Repository::new(store.clone(), "disk_io_stats");
    let arc_stats: Repository<ArcStatsRecord> = Repository::new(store.clone(), "arc_stats");
    let host_info: Repository<HostInfo> = Repository::new(store.clone(), "host_info");

    let mut slow_interval = tokio::time::interval(std::time::Duration::from_secs(config.slow_interval_secs));
    let mut frequent_interval = tokio::time::interval(std::time::Duration::from_secs(config.frequent_interval_secs));

    loop {
        tokio::select! {
            _ = token.cancelled() => return,
            _ = slow_interval.tick() => {
                let result = pipeline.collect_slow().await;
                for pool in &result.pools {
                    if let Err(e) = zpools.create(&pool.name, pool) {
                        warn!(error = %e, pool = %pool.name, "failed to persist pool record");
                    }
                }
                for dataset in &result.datasets {
                    if let Err(e) = datasets.create(&dataset.name, dataset) {
                        warn!(error = %e, dataset = %dataset.name, "failed to persist dataset record");
                    }
                }
                for disk in &result.disks {
                    if let Err(e) = disks.create(&disk.device_name, disk) {
                        warn!(error = %e, device = %disk.device_name, "failed to persist disk record");
                    }
                }
                let record = HostInfo {
                    hostname: host_name.clone(),
                    last_storage_scan: Some(chrono::Utc::now()),
                    error_count: pipeline.error_count(),
                };
                if let Err(e) = host_info.create(&host_name, &record) {
                    warn!(error = %e, "failed to persist host info");
                }
            }
            _ = frequent_interval.tick() => {
                let result = pipeline.collect_frequent().await;
                for row in &result.pool_io {
                    if let Err(e) = pool_io.create(&row.pool, row) {
                        warn!(error = %e, pool = %row.pool, "failed to persist pool IO record");
                    }
                }
                for row in &result.disk_io {
                    let key = format!("{}/{}", row.pool, row.device_name);
                    if let Err(e) = disk_io.create(&key, row) {
                        warn!(error = %e, device = %row.device_name, "failed to persist disk IO record");
                    }
                }
                if let Some(arc) = &result.arc {
                    if let Err(e) = arc_stats.create(&host_name, arc) {
                        warn!(error = %e, "failed to persist ARC stats record");
                    }
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_listen_host_for_proxy_rewrites_wildcard() {
        assert_eq!(listen_host_for_proxy("0.0.0.0:8443"), "127.0.0.1");
        assert_eq!(listen_host_for_proxy("[::]:8443"), "127.0.0.1");
        assert_eq!(listen_host_for_proxy("192.168.1.10:8443"), "192.168.1.10");
    }

    #[test]
    fn test_tls_mode_from_config_disabled_by_default() {
        let cfg = Config::default();
        let mode = tls_mode_from_config(&cfg).unwrap();
        assert!(matches!(mode, zoneweaver_apiserver::tls::TlsMode::Disabled));
    }

    #[test]
    fn test_tls_mode_requires_both_cert_and_key() {
        let mut cfg = Config::default();
        cfg.tls.enabled = true;
        cfg.tls.cert_path = Some("cert.pem".to_string());
        assert!(tls_mode_from_config(&cfg).is_err());
    }
}
