use crate::planner::group_by_priority;
use crate::smf;
use crate::types::{Controller, Direction, FailurePolicy, OrchestratorSettings, OrchestratorState, STATE_ID};
use crate::Result;
use std::cmp::Ordering;
use std::sync::Arc;
use tokio::time::sleep;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};
use zoneweaver_core::{OperationCode, Task, TaskPriority, TaskStatus, Zone, ZoneConfigSummary, ZoneStatus};
use zoneweaver_runtime::command::CommandRunner;
use zoneweaver_storage::Repository;
use zoneweaver_task_engine::Engine;

/// Takes over zone autoboot from `system/zones`: owns the enable/disable
/// toggle, the priority-grouped start/stop planner, and a background
/// reconcile loop that reasserts control if the platform service comes
/// back online behind its back.
pub struct Orchestrator<R: CommandRunner + Send + Sync + 'static> {
    runner: Arc<R>,
    zones: Repository<Zone>,
    tasks: Repository<Task>,
    state: Repository<OrchestratorState>,
    engine: Arc<Engine<R>>,
    settings: OrchestratorSettings,
}

impl<R: CommandRunner + Send + Sync + 'static> Orchestrator<R> {
    pub fn new(
        runner: Arc<R>,
        zones: Repository<Zone>,
        tasks: Repository<Task>,
        state: Repository<OrchestratorState>,
        engine: Arc<Engine<R>>,
        settings: OrchestratorSettings,
    ) -> Self {
        Self {
            runner,
            zones,
            tasks,
            state,
            engine,
            settings,
        }
    }

    fn runner(&self) -> &dyn CommandRunner {
        self.runner.as_ref()
    }

    fn is_enabled(&self) -> Result<bool> {
        Ok(self
            .state
            .find_by_id(STATE_ID)?
            .map(|s| s.enabled)
            .unwrap_or(false))
    }

    fn set_enabled(&self, enabled: bool) -> Result<()> {
        self.state.create(STATE_ID, &OrchestratorState { enabled })?;
        Ok(())
    }

    /// Current controller, derived from live SMF state rather than the
    /// persisted flag: if `system/zones` is online, it's in charge
    /// regardless of what this host last recorded.
    pub async fn query_controller(&self) -> Result<Controller> {
        if smf::zones_service_online(self.runner()).await? {
            Ok(Controller::System)
        } else {
            Ok(Controller::SelfManaged)
        }
    }

    /// Take over autoboot: persist the flag, snapshot the zones that are
    /// currently running, disable `system/zones`, then replay those zones
    /// back up through the task engine in priority order.
    pub async fn enable(&self, created_by: &str) -> Result<Vec<String>> {
        self.set_enabled(true)?;

        let running = self.zones.find_all_by(
            |z| z.status == ZoneStatus::Running,
            None::<fn(&Zone, &Zone) -> Ordering>,
            None,
        )?;

        smf::disable_zones_service(self.runner()).await?;

        let tagged = self.tag_with_priority(&running);
        info!(zones = tagged.len(), "orchestration enabled, taking over autoboot");
        self.run_plan(tagged, Direction::Startup, created_by).await
    }

    /// Hand autoboot back to the platform.
    pub async fn disable(&self) -> Result<()> {
        self.set_enabled(false)?;
        smf::enable_zones_service(self.runner()).await?;
        info!("orchestration disabled, system/zones resumed control");
        Ok(())
    }

    /// Enqueue `start` tasks for every zone currently in the given list,
    /// grouped and barriered by priority, descending.
    pub async fn start_zones(&self, zones: &[Zone], created_by: &str) -> Result<Vec<String>> {
        let tagged = self.tag_with_priority(zones);
        self.run_plan(tagged, Direction::Startup, created_by).await
    }

    /// Enqueue `stop` tasks for every zone currently in the given list,
    /// grouped and barriered by priority, ascending, honoring the
    /// configured shutdown failure policy between groups.
    pub async fn stop_zones(&self, zones: &[Zone], created_by: &str) -> Result<Vec<String>> {
        let tagged = self.tag_with_priority(zones);
        self.run_plan(tagged, Direction::Shutdown, created_by).await
    }

    fn tag_with_priority(&self, zones: &[Zone]) -> Vec<(String, u32)> {
        zones
            .iter()
            .map(|z| {
                let priority = serde_json::from_str::<ZoneConfigSummary>(&z.configuration)
                    .map(|s| s.priority)
                    .unwrap_or(50);
                (z.name.clone(), priority)
            })
            .collect()
    }

    async fn run_plan(&self, zones: Vec<(String, u32)>, direction: Direction, created_by: &str) -> Result<Vec<String>> {
        let groups = group_by_priority(&zones, direction);
        let operation = match direction {
            Direction::Startup => OperationCode::Start,
            Direction::Shutdown => OperationCode::Stop,
        };

        let mut enqueued = Vec::new();
        let group_count = groups.len();

        for (i, (priority, members)) in groups.into_iter().enumerate() {
            debug!(priority, zones = members.len(), "enqueueing priority group");
            let mut group_task_ids = Vec::with_capacity(members.len());
            for zone_name in &members {
                let task = Task::new(zone_name.clone(), operation, TaskPriority::High, created_by, "{}");
                self.engine.submit(&task)?;
                group_task_ids.push(task.id.clone());
                enqueued.push(task.id);
            }

            let is_last = i + 1 == group_count;
            if is_last {
                continue;
            }

            sleep(self.settings.priority_delay).await;

            if direction == Direction::Shutdown && self.settings.shutdown_failure_policy == FailurePolicy::Abort {
                if self.any_failed(&group_task_ids)? {
                    warn!(priority, "shutdown group had a failed task, aborting remaining groups per policy");
                    break;
                }
            }
        }

        Ok(enqueued)
    }

    fn any_failed(&self, task_ids: &[String]) -> Result<bool> {
        for id in task_ids {
            if let Some(task) = self.tasks.find_by_id(id)? {
                if task.status == TaskStatus::Failed {
                    return Ok(true);
                }
            }
        }
        Ok(false)
    }

    /// Background loop: periodically checks whether `system/zones` came
    /// back online while this host believes it owns autoboot, and
    /// reasserts control if so.
    pub async fn run(&self, token: CancellationToken) {
        loop {
            tokio::select! {
                _ = token.cancelled() => {
                    info!("orchestrator reconcile loop shutting down");
                    return;
                }
                _ = sleep(self.settings.reconcile_interval) => {
                    if let Err(e) = self.reconcile().await {
                        error!("orchestrator reconcile failed: {e}");
                    }
                }
            }
        }
    }

    async fn reconcile(&self) -> Result<()> {
        if !self.is_enabled()? {
            return Ok(());
        }
        if smf::zones_service_online(self.runner()).await? {
            warn!("system/zones came back online while orchestration is enabled; reasserting control");
            smf::disable_zones_service(self.runner()).await?;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;
    use tempfile::tempdir;
    use zoneweaver_runtime::mock::MockCommandRunner;
    use zoneweaver_storage::RedbBackend;

    fn test_orchestrator() -> (Orchestrator<MockCommandRunner>, tempfile::TempDir) {
        let dir = tempdir().unwrap();
        let db_path = dir.path().join("test.redb");
        let store: Arc<dyn zoneweaver_storage::KVStore> = Arc::new(RedbBackend::new(&db_path).unwrap());
        let zones = Repository::new(Arc::clone(&store), "zones");
        let tasks = Repository::new(Arc::clone(&store), "tasks");
        let state = Repository::new(Arc::clone(&store), "orchestrator_state");
        let nat_rules = Repository::new(Arc::clone(&store), "nat_rules");
        let recipes = Repository::new(Arc::clone(&store), "recipes");
        let runner = Arc::new(MockCommandRunner::new());

        let pty = Arc::new(zoneweaver_runtime::pty::PtyMultiplexer::new());
        let recipe_interpreter = Arc::new(zoneweaver_runtime::recipe::RecipeInterpreter::new(chrono::Duration::seconds(60)));
        let handlers = Arc::new(zoneweaver_task_engine::Handlers {
            runner: runner.clone(),
            nat_rules,
            recipes,
            pty,
            recipe_interpreter,
            nat_conf_path: "/etc/ipf/ipnat.conf".to_string(),
        });
        let (event_tx, _rx) = tokio::sync::broadcast::channel(64);
        let engine = Arc::new(Engine::new(
            tasks.clone(),
            handlers,
            zoneweaver_task_engine::EngineConfig::default(),
            event_tx,
        ));

        let settings = OrchestratorSettings {
            priority_delay: Duration::from_millis(5),
            shutdown_failure_policy: FailurePolicy::Continue,
            reconcile_interval: Duration::from_secs(60),
        };

        (
            Orchestrator::new(runner, zones, tasks, state, engine, settings),
            dir,
        )
    }

    fn make_zone(name: &str, priority: u32, status: ZoneStatus) -> Zone {
        Zone {
            name: name.to_string(),
            status,
            is_orphaned: false,
            last_seen: chrono::Utc::now(),
            configuration: serde_json::json!({ "brand": "bhyve", "priority": priority }).to_string(),
            vm_type: "bhyve".to_string(),
            partition_id: None,
        }
    }

    #[tokio::test]
    async fn test_query_controller_system_when_online() {
        let (orch, _dir) = test_orchestrator();
        orch.runner.on_success("svcs", &["-H", "-o", "state", smf::ZONES_SERVICE_FMRI], "online\n");
        assert_eq!(orch.query_controller().await.unwrap(), Controller::System);
    }

    #[tokio::test]
    async fn test_query_controller_self_when_disabled() {
        let (orch, _dir) = test_orchestrator();
        orch.runner.on_success("svcs", &["-H", "-o", "state", smf::ZONES_SERVICE_FMRI], "disabled\n");
        assert_eq!(orch.query_controller().await.unwrap(), Controller::SelfManaged);
    }

    #[tokio::test]
    async fn test_enable_persists_flag_and_disables_smf() {
        let (orch, _dir) = test_orchestrator();
        orch.runner.on_success("svcadm", &["disable", smf::ZONES_SERVICE_FMRI], "");
        let running = vec![make_zone("web01", 50, ZoneStatus::Running)];
        for z in &running {
            orch.zones.create(&z.name, z).unwrap();
        }
        let enqueued = orch.enable("test").await.unwrap();
        assert_eq!(enqueued.len(), 1);
        assert!(orch.is_enabled().unwrap());
        assert_eq!(orch.runner.call_count(), 1);
    }

    #[tokio::test]
    async fn test_disable_reenables_smf_and_clears_flag() {
        let (orch, _dir) = test_orchestrator();
        orch.runner.on_success("svcadm", &["enable", smf::ZONES_SERVICE_FMRI], "");
        orch.set_enabled(true).unwrap();
        orch.disable().await.unwrap();
        assert!(!orch.is_enabled().unwrap());
    }

    #[tokio::test]
    async fn test_start_zones_groups_by_priority_descending() {
        let (orch, _dir) = test_orchestrator();
        let zones = vec![
            make_zone("low", 10, ZoneStatus::Down),
            make_zone("high", 90, ZoneStatus::Down),
        ];
        let enqueued = orch.start_zones(&zones, "test").await.unwrap();
        assert_eq!(enqueued.len(), 2);
        let high_task = orch.tasks.find_by_id(&enqueued[0]).unwrap().unwrap();
        assert_eq!(high_task.zone_name, "high");
        assert_eq!(high_task.operation, OperationCode::Start);
    }

    #[tokio::test]
    async fn test_stop_zones_groups_by_priority_ascending() {
        let (orch, _dir) = test_orchestrator();
        let zones = vec![
            make_zone("low", 10, ZoneStatus::Running),
            make_zone("high", 90, ZoneStatus::Running),
        ];
        let enqueued = orch.stop_zones(&zones, "test").await.unwrap();
        let first_task = orch.tasks.find_by_id(&enqueued[0]).unwrap().unwrap();
        assert_eq!(first_task.zone_name, "low");
        assert_eq!(first_task.operation, OperationCode::Stop);
    }

    #[tokio::test]
    async fn test_reconcile_noop_when_disabled() {
        let (orch, _dir) = test_orchestrator();
        orch.reconcile().await.unwrap();
        assert_eq!(orch.runner.call_count(), 0);
    }

    #[tokio::test]
    async fn test_reconcile_reasserts_control_when_system_came_back_online() {
        let (orch, _dir) = test_orchestrator();
        orch.set_enabled(true).unwrap();
        orch.runner.on_success("svcs", &["-H", "-o", "state", smf::ZONES_SERVICE_FMRI], "online\n");
        orch.runner.on_success("svcadm", &["disable", smf::ZONES_SERVICE_FMRI], "");
        orch.reconcile().await.unwrap();
        assert_eq!(orch.runner.call_count(), 2);
    }
}
