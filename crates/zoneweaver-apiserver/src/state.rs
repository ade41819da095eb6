use crate::event_bus::EventBusConfig;
use std::sync::Arc;
use tokio::sync::broadcast;
use zoneweaver_core::{
    ArcStatsRecord, DhcpHost, DhcpSubnetConfig, DiskIoStatRecord, DiskRecord, HostInfo, NatRule, PoolIoStatRecord, Recipe, Task,
    TaskEvent, VncSession, Zone, ZfsDatasetRecord, ZfsPoolRecord, ZloginSession,
};
use zoneweaver_orchestrator::Orchestrator;
use zoneweaver_runtime::command::CommandRunner;
use zoneweaver_runtime::pty::PtyMultiplexer;
use zoneweaver_runtime::recipe::RecipeInterpreter;
use zoneweaver_runtime::vnc::VncSupervisor;
use zoneweaver_storage::{KVStore, Repository};
use zoneweaver_task_engine::Engine;

/// Shared application state handed to every handler. Generic over the
/// command runner so tests can wire a mock in place of `SystemCommandRunner`
/// without touching any handler code.
///
/// `VncSupervisor<R>` requires `R: Clone` (it spawns detached processes
/// through its own owned runner rather than a shared one); every other
/// component here only needs `Send + Sync + 'static`, so the bound is
/// carried at the struct level for all of them uniformly.
pub struct AppState<R: CommandRunner + Clone + Send + Sync + 'static> {
    pub zones: Repository<Zone>,
    pub tasks: Repository<Task>,
    pub nat_rules: Repository<NatRule>,
    pub dhcp_subnet: Repository<DhcpSubnetConfig>,
    pub dhcp_hosts: Repository<DhcpHost>,
    pub recipes: Repository<Recipe>,
    pub vnc_sessions: Repository<VncSession>,
    pub zlogin_sessions: Repository<ZloginSession>,

    /// Latest-per-subject storage monitoring snapshots; the collector
    /// upserts keyed by subject name rather than keeping full history.
    pub zpools: Repository<ZfsPoolRecord>,
    pub datasets: Repository<ZfsDatasetRecord>,
    pub disks: Repository<DiskRecord>,
    pub pool_io: Repository<PoolIoStatRecord>,
    pub disk_io: Repository<DiskIoStatRecord>,
    pub arc_stats: Repository<ArcStatsRecord>,
    pub host_info: Repository<HostInfo>,

    pub engine: Arc<Engine<R>>,
    pub orchestrator: Arc<Orchestrator<R>>,
    pub pty: Arc<PtyMultiplexer>,
    pub vnc: Arc<VncSupervisor<R>>,
    pub recipe_interpreter: Arc<RecipeInterpreter>,

    /// The address written into new `VncSession` records as `host_ip`.
    pub host_ip: String,

    event_tx: broadcast::Sender<TaskEvent>,
}

impl<R: CommandRunner + Clone + Send + Sync + 'static> AppState<R> {
    #[allow(clippy::too_many_arguments)]
    pub fn new(
        store: Arc<dyn KVStore>,
        event_tx: broadcast::Sender<TaskEvent>,
        engine: Arc<Engine<R>>,
        orchestrator: Arc<Orchestrator<R>>,
        pty: Arc<PtyMultiplexer>,
        vnc: Arc<VncSupervisor<R>>,
        recipe_interpreter: Arc<RecipeInterpreter>,
        host_ip: impl Into<String>,
    ) -> Self {
        Self {
            zones: Repository::new(Arc::clone(&store), "zones"),
            tasks: Repository::new(Arc::clone(&store), "tasks"),
            nat_rules: Repository::new(Arc::clone(&store), "nat_rules"),
            dhcp_subnet: Repository::new(Arc::clone(&store), "dhcp_subnet"),
            dhcp_hosts: Repository::new(Arc::clone(&store), "dhcp_hosts"),
            recipes: Repository::new(Arc::clone(&store), "recipes"),
            vnc_sessions: Repository::new(Arc::clone(&store), "vnc_sessions"),
            zlogin_sessions: Repository::new(Arc::clone(&store), "zlogin_sessions"),
            zpools: Repository::new(Arc::clone(&store), "zpools"),
            datasets: Repository::new(Arc::clone(&store), "zfs_datasets"),
            disks: Repository::new(Arc::clone(&store), "disks"),
            pool_io: Repository::new(Arc::clone(&store), "pool_io_stats"),
            disk_io: Repository::new(Arc::clone(&store), "disk_io_stats"),
            arc_stats: Repository::new(Arc::clone(&store), "arc_stats"),
            host_info: Repository::new(Arc::clone(&store), "host_info"),
            engine,
            orchestrator,
            pty,
            vnc,
            recipe_interpreter,
            host_ip: host_ip.into(),
            event_tx,
        }
    }

    pub fn subscribe(&self) -> broadcast::Receiver<TaskEvent> {
        self.event_tx.subscribe()
    }

    pub fn publish(&self, event: TaskEvent) {
        let _ = self.event_tx.send(event);
    }
}

/// Broadcast channel constructor sharing the capacity convention with the
/// rest of the event-publishing components.
pub fn new_event_channel(config: EventBusConfig) -> (broadcast::Sender<TaskEvent>, broadcast::Receiver<TaskEvent>) {
    broadcast::channel(config.capacity)
}

#[cfg(test)]
pub mod test_support {
    //! A `Clone`-deriving wrapper around `MockCommandRunner`, needed only
    //! because `VncSupervisor<R>` requires `R: Clone` and the mock runner
    //! itself holds `Mutex` fields and deliberately does not implement it.
    use async_trait::async_trait;
    use std::sync::Arc;
    use zoneweaver_runtime::command::{CommandOutput, CommandRunner, RunOptions};
    use zoneweaver_runtime::mock::MockCommandRunner;

    #[derive(Clone)]
    pub struct ClonableMockRunner(pub Arc<MockCommandRunner>);

    impl ClonableMockRunner {
        pub fn new() -> Self {
            Self(Arc::new(MockCommandRunner::new()))
        }
    }

    #[async_trait]
    impl CommandRunner for ClonableMockRunner {
        async fn run(&self, program: &str, args: &[&str], opts: RunOptions) -> CommandOutput {
            self.0.run(program, args, opts).await
        }
    }
}
