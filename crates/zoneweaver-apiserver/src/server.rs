use crate::handlers::*;
use crate::state::AppState;
use crate::tls::{resolve_tls, TlsMode};
use crate::watch::{watch_task_stream, WatchParams};
use axum::extract::{Query, State};
use axum::routing::get;
use axum::Router;
use std::net::SocketAddr;
use std::sync::Arc;
use tokio::net::TcpListener;
use tower_http::trace::TraceLayer;
use tracing::info;
use zoneweaver_runtime::command::CommandRunner;

/// API server configuration.
#[derive(Clone)]
pub struct Config {
    pub listen_addr: SocketAddr,
    pub tls_mode: TlsMode,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            listen_addr: "127.0.0.1:8080".parse().unwrap(),
            tls_mode: TlsMode::Disabled,
        }
    }
}

pub struct ApiServer<R: CommandRunner + Clone + Send + Sync + 'static> {
    config: Config,
    state: Arc<AppState<R>>,
}

impl<R: CommandRunner + Clone + Send + Sync + 'static> ApiServer<R> {
    pub fn new(config: Config, state: Arc<AppState<R>>) -> Self {
        Self { config, state }
    }

    fn build_router(&self) -> Router {
        Router::new()
            .route("/healthz", get(healthz))
            .route("/livez", get(livez))
            .route("/readyz", get(readyz))
            // Zones
            .route("/zones", get(list_zones::<R>))
            .route("/zones/priorities", get(list_priorities::<R>))
            .route("/zones/orchestration/status", get(status::<R>).post(status::<R>))
            .route("/zones/orchestration/enable", get(enable::<R>).post(enable::<R>))
            .route("/zones/orchestration/disable", get(disable::<R>).post(disable::<R>))
            .route("/zones/orchestration/test", get(test::<R>).post(test::<R>))
            .route("/zones/{z}", get(get_zone::<R>).delete(delete_zone::<R>))
            .route("/zones/{z}/config", get(get_zone_config::<R>))
            .route("/zones/{z}/start", axum::routing::post(start_zone::<R>))
            .route("/zones/{z}/stop", axum::routing::post(stop_zone::<R>))
            .route("/zones/{z}/restart", axum::routing::post(restart_zone::<R>))
            // VNC
            .route("/vnc/sessions", get(list_sessions::<R>))
            .route("/zones/{z}/vnc/start", axum::routing::post(start_vnc::<R>))
            .route("/zones/{z}/vnc/info", get(vnc_info::<R>))
            .route("/zones/{z}/vnc/stop", axum::routing::delete(stop_vnc::<R>))
            .route("/zones/{z}/vnc/console", get(vnc_console::<R>))
            .route("/zones/{z}/vnc/{*path}", get(vnc_proxy::<R>))
            // Recipes
            .route("/provisioning/recipes", get(list_recipes::<R>).post(create_recipe::<R>))
            .route(
                "/provisioning/recipes/{id}",
                get(get_recipe::<R>).put(update_recipe::<R>).delete(delete_recipe::<R>),
            )
            .route("/provisioning/recipes/{id}/test", axum::routing::post(test_recipe::<R>))
            // ZFS pools
            .route("/storage/pools", get(list_pools::<R>).post(create_pool::<R>))
            .route("/storage/pools/{pool}", get(get_pool::<R>).delete(destroy_pool::<R>))
            .route("/storage/pools/{pool}/properties", axum::routing::post(set_pool_properties::<R>))
            .route("/storage/pools/{pool}/vdevs", axum::routing::post(add_vdev::<R>))
            .route("/storage/pools/{pool}/vdevs/remove", axum::routing::post(remove_vdev::<R>))
            .route("/storage/pools/{pool}/replace", axum::routing::post(replace_device::<R>))
            .route("/storage/pools/{pool}/devices/{device}/online", axum::routing::post(online_device::<R>))
            .route("/storage/pools/{pool}/devices/{device}/offline", axum::routing::post(offline_device::<R>))
            .route("/storage/pools/{pool}/scrub", axum::routing::post(scrub_pool::<R>))
            .route("/storage/pools/{pool}/scrub/stop", axum::routing::post(stop_scrub::<R>))
            .route("/storage/pools/{pool}/export", axum::routing::post(export_pool::<R>))
            .route("/storage/pools/{pool}/import", axum::routing::post(import_pool::<R>))
            .route("/storage/pools/{pool}/upgrade", axum::routing::post(upgrade_pool::<R>))
            // ZFS datasets (wildcard: dataset names contain '/')
            .route("/zfs/datasets", get(list_datasets::<R>).post(create_dataset::<R>))
            .route("/zfs/datasets/clone", axum::routing::post(clone_dataset::<R>))
            .route("/zfs/datasets/{*dataset}", get(get_dataset::<R>))
            .route("/zfs/datasets/{*dataset}/destroy", axum::routing::delete(destroy_dataset::<R>))
            .route("/zfs/datasets/{*dataset}/properties", axum::routing::post(set_dataset_properties::<R>))
            .route("/zfs/datasets/{*dataset}/promote", axum::routing::post(promote_dataset::<R>))
            .route("/zfs/datasets/{*dataset}/rename", axum::routing::post(rename_dataset::<R>))
            .route("/zfs/datasets/{*dataset}/snapshots", axum::routing::post(create_snapshot::<R>))
            .route("/zfs/datasets/{*dataset}/snapshots/{snapshot}", axum::routing::delete(destroy_snapshot::<R>))
            .route(
                "/zfs/datasets/{*dataset}/snapshots/{snapshot}/rollback",
                axum::routing::post(rollback_snapshot::<R>),
            )
            .route("/zfs/datasets/{*dataset}/snapshots/{snapshot}/hold", axum::routing::post(hold_snapshot::<R>))
            .route(
                "/zfs/datasets/{*dataset}/snapshots/{snapshot}/release",
                axum::routing::post(release_snapshot::<R>),
            )
            // Network
            .route("/network/nat/rules", get(list_nat_rules::<R>).post(create_nat_rule::<R>))
            .route("/network/nat/rules/{id}", get(get_nat_rule::<R>).delete(delete_nat_rule::<R>))
            .route("/network/forwarding", axum::routing::post(configure_forwarding::<R>))
            .route("/network/dhcp/config", axum::routing::post(update_dhcp_config::<R>))
            .route("/network/dhcp/hosts", axum::routing::post(add_dhcp_host::<R>))
            .route("/network/dhcp/hosts/{hostname}", axum::routing::delete(remove_dhcp_host::<R>))
            .route("/network/dhcp/status", get(dhcp_status::<R>).post(dhcp_service_control::<R>))
            // Tasks
            .route("/tasks", get(list_tasks::<R>))
            .route("/tasks/stats", get(task_stats::<R>))
            .route("/tasks/{id}", get(get_task::<R>).delete(cancel_task::<R>))
            .route("/tasks/watch", get(watch_tasks::<R>))
            .layer(TraceLayer::new_for_http())
            .with_state(self.state.clone())
    }

    /// Returns the resolved TLS material, if any, so a caller can hand the
    /// CA cert to components (e.g. the VNC proxy) that need to trust this
    /// server's own certificate.
    pub fn resolve_tls_material(&self) -> miette::Result<Option<crate::tls::TlsMaterial>> {
        resolve_tls(&self.config.tls_mode)
    }

    pub async fn run(self, shutdown: tokio_util::sync::CancellationToken) -> miette::Result<()> {
        let tls = self.resolve_tls_material()?;
        let addr = self.config.listen_addr;
        let app = self.build_router();

        match tls {
            None => {
                info!(%addr, "starting API server (plain HTTP)");
                let listener = TcpListener::bind(addr).await.map_err(|e| miette::miette!("failed to bind {addr}: {e}"))?;
                axum::serve(listener, app)
                    .with_graceful_shutdown(async move { shutdown.cancelled().await })
                    .await
                    .map_err(|e| miette::miette!("server error: {e}"))?;
            }
            Some(material) => {
                info!(%addr, "starting API server (TLS)");
                let tls_config = axum_server::tls_rustls::RustlsConfig::from_pem(material.cert_pem, material.key_pem)
                    .await
                    .map_err(|e| miette::miette!("failed to load TLS material: {e}"))?;
                let handle = axum_server::Handle::new();
                let shutdown_handle = handle.clone();
                tokio::spawn(async move {
                    shutdown.cancelled().await;
                    shutdown_handle.graceful_shutdown(Some(std::time::Duration::from_secs(5)));
                });
                axum_server::bind_rustls(addr, tls_config)
                    .handle(handle)
                    .serve(app.into_make_service())
                    .await
                    .map_err(|e| miette::miette!("server error: {e}"))?;
            }
        }
        Ok(())
    }
}

async fn healthz() -> &'static str {
    "ok"
}

async fn livez() -> &'static str {
    "ok"
}

async fn readyz() -> &'static str {
    "ok"
}

async fn watch_tasks<R: CommandRunner + Clone + Send + Sync + 'static>(
    State(state): State<Arc<AppState<R>>>,
    Query(params): Query<WatchParams>,
) -> impl axum::response::IntoResponse {
    watch_task_stream(&state, params.zone_name)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::state::test_support::ClonableMockRunner;
    use std::sync::Arc as StdArc;
    use tempfile::tempdir;
    use tokio::sync::broadcast;
    use zoneweaver_orchestrator::{Orchestrator, OrchestratorSettings};
    use zoneweaver_runtime::pty::PtyMultiplexer;
    use zoneweaver_runtime::recipe::RecipeInterpreter;
    use zoneweaver_runtime::vnc::VncSupervisor;
    use zoneweaver_storage::{RedbBackend, Repository};
    use zoneweaver_task_engine::handlers::Handlers;
    use zoneweaver_task_engine::{Engine, EngineConfig};

    #[test]
    fn test_default_config() {
        let config = Config::default();
        assert_eq!(config.listen_addr.to_string(), "127.0.0.1:8080");
    }

    #[tokio::test]
    async fn test_build_router() {
        let dir = tempdir().unwrap();
        let db_path = dir.path().join("test.redb");
        let store: StdArc<dyn zoneweaver_storage::KVStore> = StdArc::new(RedbBackend::new(&db_path).unwrap());
        let (event_tx, _rx) = broadcast::channel(16);

        let runner = ClonableMockRunner::new();
        let handlers = StdArc::new(Handlers {
            runner: StdArc::new(runner.clone()),
            nat_rules: Repository::new(store.clone(), "nat_rules"),
            recipes: Repository::new(store.clone(), "recipes"),
            pty: StdArc::new(PtyMultiplexer::new()),
            recipe_interpreter: StdArc::new(RecipeInterpreter::new(chrono::Duration::seconds(300))),
            nat_conf_path: dir.path().join("ipnat.conf").to_string_lossy().to_string(),
            dhcp_subnet: Repository::new(store.clone(), "dhcp_subnet"),
            dhcp_hosts: Repository::new(store.clone(), "dhcp_hosts"),
            dhcp_conf_path: dir.path().join("dhcpd.conf").to_string_lossy().to_string(),
            artifact_paths: vec![dir.path().to_string_lossy().to_string()],
        });
        let engine = StdArc::new(Engine::new(
            Repository::new(store.clone(), "tasks"),
            handlers,
            EngineConfig::default(),
            event_tx.clone(),
        ));
        let orchestrator = StdArc::new(Orchestrator::new(
            StdArc::new(runner.clone()),
            Repository::new(store.clone(), "zones"),
            Repository::new(store.clone(), "tasks"),
            Repository::new(store.clone(), "orchestrator_state"),
            StdArc::clone(&engine),
            OrchestratorSettings::default(),
        ));
        let pty = StdArc::new(PtyMultiplexer::new());
        let vnc = StdArc::new(VncSupervisor::new(runner.clone(), dir.path().join("vnc_sessions")));
        let recipe_interpreter = StdArc::new(RecipeInterpreter::new(chrono::Duration::seconds(300)));

        let state = StdArc::new(AppState::new(store, event_tx, engine, orchestrator, pty, vnc, recipe_interpreter, "127.0.0.1"));

        let server = ApiServer::new(Config::default(), state);
        let router = server.build_router();
        assert!(std::mem::size_of_val(&router) > 0);
    }
}
