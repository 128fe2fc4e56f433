//! The execution container.
//!
//! Composes one isolated simulation environment: ECS store stack, token
//! service, module registry, command queue, session and match stores,
//! snapshot engine, resource area, and the tick worker. The lifecycle state
//! machine:
//!
//! ```text
//! CREATED ──start──▶ STARTING ──▶ RUNNING ⇄ PAUSED
//!                         │            │        │
//!                   (init failed)    stop     stop
//!                         ▼            ▼        ▼
//!                      STOPPED ◀── STOPPING ◀──┘
//! ```

use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicI64, Ordering};
use std::sync::Arc;
use std::time::Duration;

use parking_lot::{Mutex, RwLock};
use serde::Serialize;
use tokio::sync::oneshot;
use tracing::{error, info, warn};

use sim_ecs::{MatchId, SharedStore, SimError};
use sim_module::{CommandPayload, CommandSpec, EntityManagerFactory, ExportRegistry, ModuleRegistry};
use sim_snapshot::SnapshotEngine;
use sim_token::TokenService;

use crate::commands::{CommandQueue, CommandResolver, QueuedCommand};
use crate::config::ContainerConfig;
use crate::game_loop::GameLoop;
use crate::listener::{DocumentStoreListener, TickCompleteListener};
use crate::matches::{Match, MatchRegistry};
use crate::metrics::{
    nanos_to_ms, process_memory, ContainerMetrics, ContainerStats, MetricsState,
};
use crate::resources::ResourceArea;
use crate::session::SessionStore;
use crate::worker::{self, WorkerEvent, WorkerHandle};

/// How long `stop` waits for the tick worker before forcibly releasing it.
const SHUTDOWN_WAIT: Duration = Duration::from_secs(5);

/// Container lifecycle state.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ContainerStatus {
    Created,
    Starting,
    Running,
    Paused,
    Stopping,
    Stopped,
}

impl std::fmt::Display for ContainerStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            ContainerStatus::Created => "CREATED",
            ContainerStatus::Starting => "STARTING",
            ContainerStatus::Running => "RUNNING",
            ContainerStatus::Paused => "PAUSED",
            ContainerStatus::Stopping => "STOPPING",
            ContainerStatus::Stopped => "STOPPED",
        };
        f.write_str(s)
    }
}

/// Resources allocated on start and released on stop.
struct ContainerRuntime {
    store: SharedStore,
    registry: Arc<ModuleRegistry>,
    queue: CommandQueue,
    resolver: Arc<CommandResolver>,
    snapshots: Arc<SnapshotEngine>,
    sessions: SessionStore,
    matches: MatchRegistry,
    resources: ResourceArea,
    worker: WorkerHandle,
}

/// One isolated simulation execution environment.
pub struct SimContainer {
    id: i64,
    config: ContainerConfig,
    resource_base: PathBuf,
    status: RwLock<ContainerStatus>,
    current_tick: Arc<AtomicI64>,
    metrics: Arc<Mutex<MetricsState>>,
    runtime: RwLock<Option<ContainerRuntime>>,
}

impl std::fmt::Debug for SimContainer {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SimContainer")
            .field("id", &self.id)
            .field("name", &self.config.name)
            .field("status", &self.status())
            .field("current_tick", &self.current_tick())
            .finish_non_exhaustive()
    }
}

impl SimContainer {
    /// Create a container in `CREATED` state. No resources are allocated
    /// until [`start`](Self::start).
    pub fn new(
        id: i64,
        config: ContainerConfig,
        resource_base: impl Into<PathBuf>,
    ) -> Result<Self, SimError> {
        config.validate()?;
        Ok(Self {
            id,
            config,
            resource_base: resource_base.into(),
            status: RwLock::new(ContainerStatus::Created),
            current_tick: Arc::new(AtomicI64::new(0)),
            metrics: Arc::new(Mutex::new(MetricsState::default())),
            runtime: RwLock::new(None),
        })
    }

    /// Container id, unique within the fleet.
    #[must_use]
    pub fn id(&self) -> i64 {
        self.id
    }

    /// Container name from the config.
    #[must_use]
    pub fn name(&self) -> &str {
        &self.config.name
    }

    /// The container configuration.
    #[must_use]
    pub fn config(&self) -> &ContainerConfig {
        &self.config
    }

    /// Current lifecycle state.
    #[must_use]
    pub fn status(&self) -> ContainerStatus {
        *self.status.read()
    }

    /// Last completed tick; monotonically non-decreasing.
    #[must_use]
    pub fn current_tick(&self) -> i64 {
        self.current_tick.load(Ordering::SeqCst)
    }

    fn transition(
        &self,
        allowed_from: &[ContainerStatus],
        to: ContainerStatus,
    ) -> Result<(), SimError> {
        let mut status = self.status.write();
        if !allowed_from.contains(&status) {
            return Err(SimError::InvalidState(format!(
                "container '{}' cannot move from {} to {to}",
                self.config.name, *status
            )));
        }
        *status = to;
        Ok(())
    }

    fn set_status(&self, to: ContainerStatus) {
        *self.status.write() = to;
    }

    fn require_running(&self, action: &str) -> Result<(), SimError> {
        let status = self.status();
        if status != ContainerStatus::Running {
            return Err(SimError::InvalidState(format!(
                "cannot {action}: container '{}' is {status}",
                self.config.name
            )));
        }
        Ok(())
    }

    fn with_runtime<T>(&self, f: impl FnOnce(&ContainerRuntime) -> T) -> Result<T, SimError> {
        let guard = self.runtime.read();
        let runtime = guard.as_ref().ok_or_else(|| {
            SimError::InvalidState(format!("container '{}' is not started", self.config.name))
        })?;
        Ok(f(runtime))
    }

    /// Allocate the container's resource graph and begin ticking on demand.
    ///
    /// Rejected unless the container is `CREATED`. A failed start releases
    /// whatever was built and leaves the container `STOPPED`.
    pub fn start(&self) -> Result<(), SimError> {
        self.transition(&[ContainerStatus::Created], ContainerStatus::Starting)?;
        info!(container = self.id, name = self.config.name, "container starting");
        match self.build_runtime() {
            Ok(runtime) => {
                *self.runtime.write() = Some(runtime);
                self.set_status(ContainerStatus::Running);
                info!(container = self.id, "container running");
                Ok(())
            }
            Err(e) => {
                self.set_status(ContainerStatus::Stopped);
                error!(container = self.id, error = %e, "container start failed");
                Err(e)
            }
        }
    }

    fn build_runtime(&self) -> Result<ContainerRuntime, SimError> {
        let cfg = &self.config;
        let store = SharedStore::new(cfg.max_entities, cfg.max_components);
        let tokens = Arc::new(TokenService::new());
        let registry = Arc::new(ModuleRegistry::new(
            store.clone(),
            tokens,
            ExportRegistry::new(),
            cfg.module_scan_directory.clone(),
        ));
        registry.register_builtin(Arc::new(EntityManagerFactory))?;
        for path in &cfg.module_archive_paths {
            registry.stage_archive(path)?;
        }
        registry.scan()?;

        let resources = ResourceArea::create(&self.resource_base, self.id)?;
        let queue = CommandQueue::new();
        let resolver = Arc::new(CommandResolver::new(registry.clone()));
        let sessions = SessionStore::new();
        let matches = MatchRegistry::new(self.id);
        let snapshots = Arc::new(SnapshotEngine::new(store.clone(), registry.clone()));

        let persister: Arc<dyn TickCompleteListener> = Arc::new(DocumentStoreListener::new(
            self.id,
            1,
            snapshots.clone(),
            matches.clone(),
            resources.clone(),
        ));
        let game_loop = GameLoop::new(
            registry.clone(),
            queue.clone(),
            cfg.max_commands_per_tick,
            self.metrics.clone(),
            self.current_tick.clone(),
            vec![persister],
        );
        let worker = worker::spawn(game_loop);

        Ok(ContainerRuntime {
            store,
            registry,
            queue,
            resolver,
            snapshots,
            sessions,
            matches,
            resources,
            worker,
        })
    }

    /// Run exactly one tick on the tick worker and return the tick number.
    pub async fn advance_tick(&self) -> Result<i64, SimError> {
        self.require_running("advance tick")?;
        let inbox = self.with_runtime(|rt| rt.worker.inbox())?;
        let (tx, rx) = oneshot::channel();
        inbox
            .send(WorkerEvent::Advance { reply: tx })
            .map_err(|_| SimError::InvalidState("tick worker stopped".to_string()))?;
        rx.await
            .map_err(|_| SimError::InvalidState("tick worker stopped".to_string()))
    }

    /// Start fixed-rate auto-advance. Replaces any previous schedule.
    pub fn play(&self, interval_ms: i64) -> Result<(), SimError> {
        if interval_ms <= 0 {
            return Err(SimError::InvalidRequest(format!(
                "auto-advance interval must be positive, got {interval_ms}"
            )));
        }
        self.require_running("start auto-advance")?;
        let inbox = self.with_runtime(|rt| rt.worker.inbox())?;
        inbox
            .send(WorkerEvent::Play {
                interval: Duration::from_millis(interval_ms as u64),
            })
            .map_err(|_| SimError::InvalidState("tick worker stopped".to_string()))
    }

    /// Pause ticking. Cancels auto-advance.
    pub fn pause(&self) -> Result<(), SimError> {
        self.transition(&[ContainerStatus::Running], ContainerStatus::Paused)?;
        if let Ok(inbox) = self.with_runtime(|rt| rt.worker.inbox()) {
            let _ = inbox.send(WorkerEvent::StopTimer);
        }
        info!(container = self.id, "container paused");
        Ok(())
    }

    /// Resume from pause. Auto-advance is not rescheduled automatically.
    pub fn resume(&self) -> Result<(), SimError> {
        self.transition(&[ContainerStatus::Paused], ContainerStatus::Running)?;
        info!(container = self.id, "container resumed");
        Ok(())
    }

    /// Stop the container and release its resources.
    ///
    /// Idempotent from `STOPPED`/`STOPPING`. Shutdown failures are logged
    /// and swallowed; the container always ends `STOPPED`.
    pub async fn stop(&self) -> Result<(), SimError> {
        {
            let mut status = self.status.write();
            match *status {
                ContainerStatus::Stopped | ContainerStatus::Stopping => return Ok(()),
                _ => *status = ContainerStatus::Stopping,
            }
        }
        info!(container = self.id, "container stopping");

        let runtime = self.runtime.write().take();
        if let Some(runtime) = runtime {
            let inbox = runtime.worker.inbox();
            let _ = inbox.send(WorkerEvent::StopTimer);
            let (tx, rx) = oneshot::channel();
            let _ = inbox.send(WorkerEvent::Shutdown { reply: tx });
            let join = runtime.worker.join();
            match tokio::time::timeout(SHUTDOWN_WAIT, rx).await {
                Ok(_) => {
                    let _ = join.await;
                }
                Err(_) => {
                    warn!(container = self.id, "tick worker unresponsive, forcibly releasing");
                    join.abort();
                }
            }
            // Store, registry, and loaded archives drop here.
        }

        self.set_status(ContainerStatus::Stopped);
        info!(container = self.id, "container stopped");
        Ok(())
    }

    /// The command dispatch surface.
    #[must_use]
    pub fn commands(&self) -> CommandDispatch<'_> {
        CommandDispatch { container: self }
    }

    /// Create a match. Requires `RUNNING`.
    pub fn create_match(&self, m: Match) -> Result<Match, SimError> {
        self.require_running("create match")?;
        self.with_runtime(|rt| rt.matches.create(m))?
    }

    /// Look up a match by id.
    pub fn get_match(&self, id: MatchId) -> Result<Match, SimError> {
        self.with_runtime(|rt| rt.matches.get(id))?
    }

    /// All matches of this container.
    pub fn list_matches(&self) -> Result<Vec<Match>, SimError> {
        self.with_runtime(|rt| rt.matches.list())
    }

    /// Delete a match record.
    pub fn delete_match(&self, id: MatchId) -> Result<(), SimError> {
        self.with_runtime(|rt| rt.matches.delete(id))?
    }

    /// The container's session store.
    pub fn sessions(&self) -> Result<SessionStore, SimError> {
        self.with_runtime(|rt| rt.sessions.clone())
    }

    /// The container's snapshot engine.
    pub fn snapshots(&self) -> Result<Arc<SnapshotEngine>, SimError> {
        self.with_runtime(|rt| rt.snapshots.clone())
    }

    /// The shared ECS store handle.
    pub fn store(&self) -> Result<SharedStore, SimError> {
        self.with_runtime(|rt| rt.store.clone())
    }

    /// The module registry.
    pub fn registry(&self) -> Result<Arc<ModuleRegistry>, SimError> {
        self.with_runtime(|rt| rt.registry.clone())
    }

    /// The container's resource area.
    pub fn resources(&self) -> Result<ResourceArea, SimError> {
        self.with_runtime(|rt| rt.resources.clone())
    }

    /// Install a module archive at runtime.
    pub fn install_module(&self, path: &Path) -> Result<(), SimError> {
        self.with_runtime(|rt| rt.registry.install_archive(path))?
    }

    /// Remove a module from the registry (in-memory only).
    pub fn uninstall_module(&self, name: &str) -> Result<(), SimError> {
        self.with_runtime(|rt| rt.registry.uninstall(name))?
    }

    /// The container statistics surface.
    pub fn stats(&self) -> Result<ContainerStats, SimError> {
        self.with_runtime(|rt| {
            let entity_count = rt.store.entity_count();
            let (process_max_memory, process_used_memory) = process_memory();
            ContainerStats {
                entity_count,
                max_entities: self.config.max_entities,
                ecs_used_bytes: entity_count as u64 * self.config.max_components as u64 * 4,
                ecs_max_bytes: self.config.max_memory_mb * 1024 * 1024,
                process_max_memory,
                process_used_memory,
                match_count: rt.matches.count(),
                module_count: rt.registry.module_count(),
            }
        })
    }

    /// The container metrics surface.
    pub fn metrics(&self) -> Result<ContainerMetrics, SimError> {
        self.with_runtime(|rt| {
            let metrics = self.metrics.lock();
            ContainerMetrics {
                container_id: self.id,
                current_tick: self.current_tick(),
                last_tick_ms: nanos_to_ms(metrics.timings.last_nanos),
                avg_tick_ms: nanos_to_ms(metrics.timings.avg_nanos()),
                min_tick_ms: nanos_to_ms(metrics.timings.min_nanos),
                max_tick_ms: nanos_to_ms(metrics.timings.max_nanos),
                total_ticks: metrics.timings.total_ticks,
                last_tick_nanos: metrics.timings.last_nanos,
                avg_tick_nanos: metrics.timings.avg_nanos(),
                min_tick_nanos: metrics.timings.min_nanos,
                max_tick_nanos: metrics.timings.max_nanos,
                total_entities: rt.store.entity_count(),
                total_component_types: rt.store.component_count(),
                command_queue_size: rt.queue.len(),
                last_tick_systems: metrics.last_tick_systems.clone(),
                last_tick_commands: metrics.last_tick_commands.clone(),
                last_tick_benchmarks: metrics.last_tick_benchmarks.clone(),
            }
        })
    }
}

/// Entry point for submitting commands to a running container.
pub struct CommandDispatch<'c> {
    container: &'c SimContainer,
}

impl<'c> CommandDispatch<'c> {
    /// Resolve a command by name.
    ///
    /// # Errors
    ///
    /// `InvalidState` unless the container is `RUNNING`; `NotFound` for an
    /// unknown command name.
    pub fn named(&self, name: &str) -> Result<NamedCommand<'c>, SimError> {
        self.container.require_running("execute commands")?;
        let spec = self
            .container
            .with_runtime(|rt| rt.resolver.clone())?
            .resolve(name)?;
        Ok(NamedCommand {
            container: self.container,
            spec,
            match_id: None,
        })
    }
}

/// A resolved command ready to enqueue.
pub struct NamedCommand<'c> {
    container: &'c SimContainer,
    spec: Arc<CommandSpec>,
    match_id: Option<MatchId>,
}

impl NamedCommand<'_> {
    /// Scope the command to a match; the match id is injected into the
    /// payload under `match_id`.
    #[must_use]
    pub fn for_match(mut self, match_id: MatchId) -> Self {
        self.match_id = Some(match_id);
        self
    }

    /// Enqueue the command for the next tick's drain.
    pub fn execute(&self, mut payload: CommandPayload) -> Result<(), SimError> {
        self.container.require_running("execute commands")?;
        if let Some(match_id) = self.match_id {
            payload.insert("match_id".to_string(), serde_json::json!(match_id));
        }
        self.container.with_runtime(|rt| {
            rt.queue.enqueue(QueuedCommand {
                spec: self.spec.clone(),
                payload,
            });
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn container() -> (tempfile::TempDir, SimContainer) {
        let dir = tempfile::tempdir().unwrap();
        let mut config = ContainerConfig::new("c1");
        config.module_scan_directory = dir.path().join("modules");
        config.max_entities = 64;
        config.max_components = 16;
        let container = SimContainer::new(1, config, dir.path().join("resources")).unwrap();
        (dir, container)
    }

    #[tokio::test]
    async fn test_lifecycle_transitions() {
        let (_dir, c) = container();
        assert_eq!(c.status(), ContainerStatus::Created);
        c.start().unwrap();
        assert_eq!(c.status(), ContainerStatus::Running);
        c.pause().unwrap();
        assert_eq!(c.status(), ContainerStatus::Paused);
        c.resume().unwrap();
        assert_eq!(c.status(), ContainerStatus::Running);
        c.stop().await.unwrap();
        assert_eq!(c.status(), ContainerStatus::Stopped);
        // Idempotent second stop.
        c.stop().await.unwrap();
        assert_eq!(c.status(), ContainerStatus::Stopped);
    }

    #[tokio::test]
    async fn test_start_rejected_unless_created() {
        let (_dir, c) = container();
        c.start().unwrap();
        assert!(matches!(c.start(), Err(SimError::InvalidState(_))));
        c.stop().await.unwrap();
        assert!(matches!(c.start(), Err(SimError::InvalidState(_))));
    }

    #[tokio::test]
    async fn test_pause_resume_guards() {
        let (_dir, c) = container();
        assert!(matches!(c.pause(), Err(SimError::InvalidState(_))));
        c.start().unwrap();
        assert!(matches!(c.resume(), Err(SimError::InvalidState(_))));
        c.stop().await.unwrap();
    }

    #[tokio::test]
    async fn test_tick_advance_and_paused_rejection() {
        let (_dir, c) = container();
        c.start().unwrap();
        assert_eq!(c.advance_tick().await.unwrap(), 1);
        assert_eq!(c.advance_tick().await.unwrap(), 2);
        assert_eq!(c.advance_tick().await.unwrap(), 3);
        assert_eq!(c.current_tick(), 3);

        c.pause().unwrap();
        assert!(matches!(
            c.advance_tick().await,
            Err(SimError::InvalidState(_))
        ));
        c.stop().await.unwrap();
    }

    #[tokio::test]
    async fn test_play_validates_interval() {
        let (_dir, c) = container();
        c.start().unwrap();
        assert!(matches!(c.play(0), Err(SimError::InvalidRequest(_))));
        assert!(matches!(c.play(-5), Err(SimError::InvalidRequest(_))));
        c.play(10).unwrap();
        c.stop().await.unwrap();
    }

    #[tokio::test]
    async fn test_unknown_command_not_found() {
        let (_dir, c) = container();
        c.start().unwrap();
        assert!(matches!(
            c.commands().named("nope"),
            Err(SimError::NotFound(_))
        ));
        c.stop().await.unwrap();
    }

    #[tokio::test]
    async fn test_commands_require_running() {
        let (_dir, c) = container();
        assert!(matches!(
            c.commands().named("create_entity"),
            Err(SimError::InvalidState(_))
        ));
        c.start().unwrap();
        c.pause().unwrap();
        assert!(matches!(
            c.commands().named("create_entity"),
            Err(SimError::InvalidState(_))
        ));
        c.stop().await.unwrap();
    }

    #[tokio::test]
    async fn test_match_crud_requires_running() {
        let (_dir, c) = container();
        assert!(matches!(
            c.create_match(Match::new(100)),
            Err(SimError::InvalidState(_))
        ));
        c.start().unwrap();
        let created = c.create_match(Match::new(100)).unwrap();
        assert_eq!(created.container_id, 1);
        assert_eq!(c.list_matches().unwrap().len(), 1);
        c.delete_match(100).unwrap();
        c.stop().await.unwrap();
    }

    #[tokio::test]
    async fn test_stats_surface() {
        let (_dir, c) = container();
        c.start().unwrap();
        c.store().unwrap().create_entity_for_match(1).unwrap();
        let stats = c.stats().unwrap();
        assert_eq!(stats.entity_count, 1);
        assert_eq!(stats.max_entities, 64);
        assert_eq!(stats.ecs_used_bytes, 16 * 4);
        assert_eq!(stats.ecs_max_bytes, 0);
        assert_eq!(stats.module_count, 1); // entity_manager
        c.stop().await.unwrap();
    }

    #[tokio::test]
    async fn test_invalid_config_rejected_at_create() {
        let result = SimContainer::new(1, ContainerConfig::new(""), "resources");
        assert!(matches!(result, Err(SimError::InvalidRequest(_))));
    }
}
