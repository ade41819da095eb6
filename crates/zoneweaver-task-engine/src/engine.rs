//! Dispatch loop: eligibility scan → per-key exclusion → bounded worker
//! pool → handler dispatch → retry/cancel/dependency-cascade bookkeeping.

use crate::handlers::Handlers;
use crate::{Result, TaskEngineError};
use chrono::Utc;
use std::collections::HashSet;
use std::sync::Arc;
use tokio::sync::{broadcast, Mutex, Semaphore};
use tokio::time::sleep;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};
use zoneweaver_core::events::TaskEvent;
use zoneweaver_core::{Task, TaskStatus};
use zoneweaver_runtime::command::CommandRunner;
use zoneweaver_storage::Repository;

/// Configuration for the dispatch loop.
#[derive(Clone)]
pub struct EngineConfig {
    pub tick_interval: std::time::Duration,
    pub worker_pool_size: usize,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            tick_interval: std::time::Duration::from_millis(500),
            worker_pool_size: 4,
        }
    }
}

/// Tracks which zone_names and which system resource_classes currently have
/// a task running, so the dispatch loop can skip tasks that would conflict.
#[derive(Default)]
struct ExclusionRegistry {
    zones: HashSet<String>,
    resource_classes: HashSet<&'static str>,
}

impl ExclusionRegistry {
    fn is_excluded(&self, task: &Task) -> bool {
        if task.is_system() {
            if let Some(class) = task.operation.resource_class() {
                return self.resource_classes.contains(class);
            }
            false
        } else {
            self.zones.contains(&task.zone_name)
        }
    }

    fn acquire(&mut self, task: &Task) {
        if task.is_system() {
            if let Some(class) = task.operation.resource_class() {
                self.resource_classes.insert(class);
            }
        } else {
            self.zones.insert(task.zone_name.clone());
        }
    }

    fn release(&mut self, task: &Task) {
        if task.is_system() {
            if let Some(class) = task.operation.resource_class() {
                self.resource_classes.remove(class);
            }
        } else {
            self.zones.remove(&task.zone_name);
        }
    }
}

/// The Task Engine's dispatch loop, holding a handle to the persisted Task
/// table, the handler registry, and an in-memory exclusion registry.
pub struct Engine<R: CommandRunner + Send + Sync + 'static> {
    tasks: Repository<Task>,
    handlers: Arc<Handlers<R>>,
    config: EngineConfig,
    exclusions: Arc<Mutex<ExclusionRegistry>>,
    semaphore: Arc<Semaphore>,
    event_tx: broadcast::Sender<TaskEvent>,
}

impl<R: CommandRunner + Send + Sync + 'static> Engine<R> {
    pub fn new(tasks: Repository<Task>, handlers: Arc<Handlers<R>>, config: EngineConfig, event_tx: broadcast::Sender<TaskEvent>) -> Self {
        let semaphore = Arc::new(Semaphore::new(config.worker_pool_size));
        Self {
            tasks,
            handlers,
            config,
            exclusions: Arc::new(Mutex::new(ExclusionRegistry::default())),
            semaphore,
            event_tx,
        }
    }

    pub async fn run(&self, token: CancellationToken) {
        info!("starting task engine dispatch loop");
        loop {
            tokio::select! {
                _ = token.cancelled() => {
                    info!("task engine shutting down");
                    return;
                }
                _ = sleep(self.config.tick_interval) => {
                    if let Err(e) = self.tick().await {
                        error!("dispatch tick failed: {e}");
                    }
                }
            }
        }
    }

    /// One scan-claim-dispatch cycle. Cascades dependency failures first so
    /// a cancelled predecessor doesn't leave its dependents eligible.
    async fn tick(&self) -> Result<()> {
        self.cascade_dependency_failures().await?;

        let eligible = self.eligible_tasks().await?;
        if eligible.is_empty() {
            return Ok(());
        }

        for task in eligible {
            let Ok(permit) = Arc::clone(&self.semaphore).try_acquire_owned() else {
                break;
            };

            {
                let mut guard = self.exclusions.lock().await;
                if guard.is_excluded(&task) {
                    drop(permit);
                    continue;
                }
                guard.acquire(&task);
            }

            let Some(task) = self.claim(&task.id).await? else {
                let mut guard = self.exclusions.lock().await;
                guard.release(&task);
                drop(permit);
                continue;
            };

            let handlers = Arc::clone(&self.handlers);
            let tasks = self.tasks.clone();
            let exclusions = Arc::clone(&self.exclusions);
            let event_tx = self.event_tx.clone();

            tokio::spawn(async move {
                let _permit = permit;
                Self::run_one(tasks, handlers, exclusions, event_tx, task).await;
            });
        }

        Ok(())
    }

    async fn run_one(
        tasks: Repository<Task>,
        handlers: Arc<Handlers<R>>,
        exclusions: Arc<Mutex<ExclusionRegistry>>,
        event_tx: broadcast::Sender<TaskEvent>,
        mut task: Task,
    ) {
        debug!(task_id = %task.id, operation = %task.operation, "dispatching task");
        let outcome = handlers.dispatch(&task).await;

        if outcome.success {
            task.status = TaskStatus::Completed;
            task.error = None;
            task.finished_at = Some(Utc::now());
        } else if outcome.retryable && task.retries_left > 0 {
            task.retries_left -= 1;
            task.status = TaskStatus::Pending;
            task.started_at = None;
            task.error = outcome.error.clone();
        } else {
            task.status = TaskStatus::Failed;
            task.error = outcome.error.clone();
            task.finished_at = Some(Utc::now());
        }

        if let Err(e) = tasks.create(&task.id, &task) {
            error!(task_id = %task.id, "failed to persist task outcome: {e}");
        }

        let _ = event_tx.send(TaskEvent::status_changed(
            task.id.clone(),
            task.zone_name.clone(),
            task.operation.to_string(),
            task.status.to_string(),
        ));

        exclusions.lock().await.release(&task);
    }

    /// Claim one task atomically: re-read it, bail if it's no longer
    /// pending (another worker beat us to it), otherwise flip to running.
    async fn claim(&self, task_id: &str) -> Result<Option<Task>> {
        let Some(current) = self.tasks.find_by_id(task_id)? else {
            return Err(TaskEngineError::task_not_found(task_id));
        };
        if current.status != TaskStatus::Pending {
            return Ok(None);
        }
        let mut claimed = current;
        claimed.status = TaskStatus::Running;
        claimed.started_at = Some(Utc::now());
        self.tasks.create(&claimed.id, &claimed)?;
        Ok(Some(claimed))
    }

    /// Pending tasks whose `depends_on` is either absent or points at a
    /// completed task, ordered priority desc then created_at asc.
    async fn eligible_tasks(&self) -> Result<Vec<Task>> {
        let all = self.tasks.find_all()?;
        let mut eligible: Vec<Task> = all
            .iter()
            .filter(|t| t.status == TaskStatus::Pending)
            .filter(|t| match &t.depends_on {
                None => true,
                Some(dep_id) => all.iter().any(|d| &d.id == dep_id && d.status == TaskStatus::Completed),
            })
            .cloned()
            .collect();

        eligible.sort_by(|a, b| b.priority.cmp(&a.priority).then_with(|| a.created_at.cmp(&b.created_at)));
        Ok(eligible)
    }

    /// A pending task whose dependency has failed or been cancelled can
    /// never become eligible; flip it to cancelled with an explanatory
    /// error rather than leaving it stuck forever.
    async fn cascade_dependency_failures(&self) -> Result<()> {
        let all = self.tasks.find_all()?;
        for task in all.iter().filter(|t| t.status == TaskStatus::Pending) {
            let Some(dep_id) = &task.depends_on else { continue };
            let Some(dep) = all.iter().find(|d| &d.id == dep_id) else { continue };
            if matches!(dep.status, TaskStatus::Failed | TaskStatus::Cancelled) {
                let mut cancelled = task.clone();
                cancelled.status = TaskStatus::Cancelled;
                cancelled.error = Some("dependency failed".to_string());
                cancelled.finished_at = Some(Utc::now());
                self.tasks.create(&cancelled.id, &cancelled)?;
                warn!(task_id = %cancelled.id, dependency = %dep_id, "cancelled: dependency failed");
                let _ = self.event_tx.send(TaskEvent::status_changed(
                    cancelled.id.clone(),
                    cancelled.zone_name.clone(),
                    cancelled.operation.to_string(),
                    cancelled.status.to_string(),
                ));
            }
        }
        Ok(())
    }

    /// Direct pending→cancelled flip. No force-cancel mid-handler: a
    /// running task finishes on its own terms.
    pub async fn cancel(&self, task_id: &str) -> Result<()> {
        let Some(mut task) = self.tasks.find_by_id(task_id)? else {
            return Err(TaskEngineError::task_not_found(task_id));
        };
        if task.status != TaskStatus::Pending {
            return Err(TaskEngineError::claim_conflict(task_id, "only pending tasks can be cancelled directly"));
        }
        task.status = TaskStatus::Cancelled;
        task.finished_at = Some(Utc::now());
        self.tasks.create(&task.id, &task)?;
        let _ = self.event_tx.send(TaskEvent::status_changed(
            task.id.clone(),
            task.zone_name.clone(),
            task.operation.to_string(),
            task.status.to_string(),
        ));
        Ok(())
    }

    pub fn submit(&self, task: &Task) -> Result<()> {
        self.tasks.create(&task.id, task)?;
        let _ = self.event_tx.send(TaskEvent::created(task.id.clone(), task.zone_name.clone(), task.operation.to_string()));
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::handlers::Handlers;
    use std::sync::Arc;
    use tempfile::tempdir;
    use zoneweaver_core::{OperationCode, TaskPriority};
    use zoneweaver_runtime::mock::MockCommandRunner;
    use zoneweaver_runtime::pty::PtyMultiplexer;
    use zoneweaver_runtime::recipe::RecipeInterpreter;
    use zoneweaver_storage::RedbBackend;

    fn test_engine() -> (tempfile::TempDir, Engine<MockCommandRunner>) {
        let dir = tempdir().unwrap();
        let backend: Arc<dyn zoneweaver_storage::KVStore> = Arc::new(RedbBackend::new(dir.path().join("engine.redb")).unwrap());
        let tasks = Repository::new(Arc::clone(&backend), "tasks");
        let nat_rules = Repository::new(Arc::clone(&backend), "nat_rules");
        let recipes = Repository::new(Arc::clone(&backend), "recipes");

        let runner = Arc::new(MockCommandRunner::new());
        runner.on_success("zoneadm", &["-z", "web01", "boot"], "");

        let handlers = Arc::new(Handlers {
            runner,
            nat_rules,
            recipes,
            pty: Arc::new(PtyMultiplexer::new()),
            recipe_interpreter: Arc::new(RecipeInterpreter::new(chrono::Duration::seconds(60))),
            nat_conf_path: dir.path().join("ipnat.conf").to_string_lossy().to_string(),
            dhcp_subnet: Repository::new(Arc::clone(&backend), "dhcp_subnet"),
            dhcp_hosts: Repository::new(Arc::clone(&backend), "dhcp_hosts"),
            dhcp_conf_path: dir.path().join("dhcpd.conf").to_string_lossy().to_string(),
            artifact_paths: vec![dir.path().to_string_lossy().to_string()],
        });

        let (tx, _rx) = broadcast::channel(64);
        let engine = Engine::new(tasks, handlers, EngineConfig::default(), tx);
        (dir, engine)
    }

    #[tokio::test]
    async fn test_tick_dispatches_pending_task_to_completed() {
        let (_dir, engine) = test_engine();
        let task = Task::new("web01", OperationCode::Start, TaskPriority::High, "admin", "{}");
        engine.submit(&task).unwrap();

        engine.tick().await.unwrap();
        tokio::time::sleep(std::time::Duration::from_millis(50)).await;

        let stored = engine.tasks.find_by_id(&task.id).unwrap().unwrap();
        assert_eq!(stored.status, TaskStatus::Completed);
    }

    #[tokio::test]
    async fn test_dependency_cascade_cancels_dependent() {
        let (_dir, engine) = test_engine();
        let mut failed = Task::new("web01", OperationCode::Stop, TaskPriority::Medium, "admin", "{}");
        failed.status = TaskStatus::Failed;
        engine.tasks.create(&failed.id, &failed).unwrap();

        let dependent = Task::new("web01", OperationCode::Start, TaskPriority::Medium, "admin", "{}").with_depends_on(failed.id.clone());
        engine.submit(&dependent).unwrap();

        engine.cascade_dependency_failures().await.unwrap();

        let stored = engine.tasks.find_by_id(&dependent.id).unwrap().unwrap();
        assert_eq!(stored.status, TaskStatus::Cancelled);
        assert_eq!(stored.error.as_deref(), Some("dependency failed"));
    }

    #[tokio::test]
    async fn test_cancel_pending_task() {
        let (_dir, engine) = test_engine();
        let task = Task::new("web01", OperationCode::Start, TaskPriority::Low, "admin", "{}");
        engine.submit(&task).unwrap();

        engine.cancel(&task.id).await.unwrap();

        let stored = engine.tasks.find_by_id(&task.id).unwrap().unwrap();
        assert_eq!(stored.status, TaskStatus::Cancelled);
    }

    #[tokio::test]
    async fn test_cancel_running_task_rejected() {
        let (_dir, engine) = test_engine();
        let mut task = Task::new("web01", OperationCode::Start, TaskPriority::Low, "admin", "{}");
        task.status = TaskStatus::Running;
        engine.tasks.create(&task.id, &task).unwrap();

        let result = engine.cancel(&task.id).await;
        assert!(result.is_err());
    }

    #[tokio::test]
    async fn test_exclusion_registry_blocks_second_task_same_zone() {
        let mut reg = ExclusionRegistry::default();
        let t1 = Task::new("web01", OperationCode::Start, TaskPriority::Medium, "admin", "{}");
        let t2 = Task::new("web01", OperationCode::Stop, TaskPriority::Medium, "admin", "{}");
        reg.acquire(&t1);
        assert!(reg.is_excluded(&t2));
        reg.release(&t1);
        assert!(!reg.is_excluded(&t2));
    }

    #[tokio::test]
    async fn test_exclusion_registry_groups_system_tasks_by_resource_class() {
        let mut reg = ExclusionRegistry::default();
        let t1 = Task::new("system", OperationCode::ZpoolCreate, TaskPriority::Medium, "admin", "{}");
        let t2 = Task::new("system", OperationCode::ZpoolScrub, TaskPriority::Medium, "admin", "{}");
        reg.acquire(&t1);
        assert!(reg.is_excluded(&t2));
    }
}
