//! Per-tick orchestration.
//!
//! `advance_tick` runs the fixed tick lifecycle:
//!
//! 1. Drain up to `max_commands_per_tick` queued commands and execute them.
//! 2. Run every cached system in module-declaration order.
//! 3. Drain benchmark scopes into the last-tick metrics snapshot.
//! 4. Notify tick-complete listeners.
//!
//! A failing executor, system, or listener is logged with context and never
//! aborts the tick. The system cache is rebuilt lazily whenever the module
//! registry's generation moves.

use std::collections::BTreeMap;
use std::sync::atomic::{AtomicI64, Ordering};
use std::sync::Arc;
use std::time::Instant;

use parking_lot::Mutex;
use tracing::{debug, warn};

use sim_module::{EngineSystem, ModuleBenchmarks, ModuleRegistry};

use crate::commands::CommandQueue;
use crate::listener::TickCompleteListener;
use crate::metrics::{BenchmarkReport, CommandMetrics, MetricsState, SystemMetrics};

struct CachedSystem {
    module_name: String,
    system: Arc<Mutex<Box<dyn EngineSystem>>>,
}

struct SystemCache {
    generation: u64,
    systems: Vec<CachedSystem>,
    benchmarks: Vec<(String, Arc<ModuleBenchmarks>)>,
}

/// The tick engine of one container. Owned and driven by the tick worker.
pub struct GameLoop {
    registry: Arc<ModuleRegistry>,
    queue: CommandQueue,
    max_commands_per_tick: usize,
    listeners: Vec<Arc<dyn TickCompleteListener>>,
    metrics: Arc<Mutex<MetricsState>>,
    current_tick: Arc<AtomicI64>,
    cache: Option<SystemCache>,
}

impl GameLoop {
    /// Assemble a loop over a container's registry and queue.
    #[must_use]
    pub fn new(
        registry: Arc<ModuleRegistry>,
        queue: CommandQueue,
        max_commands_per_tick: usize,
        metrics: Arc<Mutex<MetricsState>>,
        current_tick: Arc<AtomicI64>,
        listeners: Vec<Arc<dyn TickCompleteListener>>,
    ) -> Self {
        Self {
            registry,
            queue,
            max_commands_per_tick,
            listeners,
            metrics,
            current_tick,
            cache: None,
        }
    }

    /// The last completed tick number.
    #[must_use]
    pub fn current_tick(&self) -> i64 {
        self.current_tick.load(Ordering::SeqCst)
    }

    /// Rebuild the system cache if the registry changed since the last tick.
    fn ensure_cache(&mut self) {
        let generation = self.registry.generation();
        if matches!(&self.cache, Some(cache) if cache.generation == generation) {
            return;
        }
        let modules = self.registry.resolve_all();
        let mut systems = Vec::new();
        let mut benchmarks = Vec::new();
        for module in &modules {
            for system in &module.systems {
                systems.push(CachedSystem {
                    module_name: module.name.clone(),
                    system: system.clone(),
                });
            }
            benchmarks.push((module.name.clone(), module.context.benchmarks().clone()));
        }
        debug!(
            generation,
            systems = systems.len(),
            modules = modules.len(),
            "rebuilt system cache"
        );
        self.cache = Some(SystemCache {
            generation,
            systems,
            benchmarks,
        });
    }

    /// Run one tick. Returns the new tick number.
    pub fn advance_tick(&mut self) -> i64 {
        let tick_start = Instant::now();
        let tick = self.current_tick.load(Ordering::SeqCst) + 1;
        self.ensure_cache();

        // 1. Commands: bounded FIFO drain, executed synchronously.
        let batch = self.queue.drain(self.max_commands_per_tick);
        let mut command_metrics: BTreeMap<String, CommandMetrics> = BTreeMap::new();
        for queued in batch {
            let start = Instant::now();
            if let Err(e) = queued.spec.execute(&queued.payload) {
                warn!(
                    tick,
                    command = queued.spec.name,
                    module = queued.spec.module_name,
                    error = %e,
                    "command executor failed"
                );
            }
            let elapsed = start.elapsed();
            let entry = command_metrics
                .entry(queued.spec.name.clone())
                .or_insert_with(|| CommandMetrics {
                    name: queued.spec.name.clone(),
                    module_name: queued.spec.module_name.clone(),
                    count: 0,
                    execution_time_ms: 0.0,
                    execution_time_nanos: 0,
                });
            entry.count += 1;
            entry.execution_time_nanos += elapsed.as_nanos() as i64;
            entry.execution_time_ms += elapsed.as_secs_f64() * 1_000.0;
        }

        // 2. Systems, module by module in declaration order.
        let cache = self.cache.as_ref().expect("cache built above");
        let mut system_metrics = Vec::with_capacity(cache.systems.len());
        for entry in &cache.systems {
            let start = Instant::now();
            let mut system = entry.system.lock();
            let system_name = system.name().to_string();
            if let Err(e) = system.update() {
                warn!(
                    tick,
                    module = entry.module_name,
                    system = system_name,
                    error = %e,
                    "system update failed"
                );
            }
            drop(system);
            let elapsed = start.elapsed();
            system_metrics.push(SystemMetrics {
                module_name: entry.module_name.clone(),
                system_name,
                execution_time_ms: elapsed.as_secs_f64() * 1_000.0,
                execution_time_nanos: elapsed.as_nanos() as i64,
            });
        }

        // 3. Benchmark scopes, replacing the previous tick's snapshot.
        let mut benchmark_reports = Vec::new();
        for (module_name, sink) in &cache.benchmarks {
            for sample in sink.drain() {
                benchmark_reports.push(BenchmarkReport::new(
                    module_name,
                    &sample.scope,
                    sample.elapsed,
                ));
            }
        }

        {
            let mut metrics = self.metrics.lock();
            metrics.timings.record(tick_start.elapsed());
            metrics.last_tick_systems = system_metrics;
            metrics.last_tick_commands = command_metrics.into_values().collect();
            metrics.last_tick_benchmarks = benchmark_reports;
        }
        self.current_tick.store(tick, Ordering::SeqCst);

        // 4. Listeners.
        for listener in &self.listeners {
            if let Err(e) = listener.on_tick_complete(tick) {
                warn!(tick, error = %e, "tick-complete listener failed");
            }
        }

        debug!(tick, "tick complete");
        tick
    }
}

#[cfg(test)]
mod tests {
    use std::sync::atomic::AtomicUsize;

    use sim_ecs::{SharedStore, SimError};
    use sim_module::{
        CommandPayload, CommandSpec, EngineModule, ExportRegistry, ModuleContext, ModuleFactory,
    };
    use sim_token::TokenService;

    use crate::commands::QueuedCommand;

    use super::*;

    struct CountingSystem {
        name: &'static str,
        counter: Arc<AtomicUsize>,
        order: Arc<Mutex<Vec<&'static str>>>,
        fail: bool,
    }

    impl EngineSystem for CountingSystem {
        fn name(&self) -> &str {
            self.name
        }

        fn update(&mut self) -> Result<(), SimError> {
            self.counter.fetch_add(1, Ordering::SeqCst);
            self.order.lock().push(self.name);
            if self.fail {
                return Err(SimError::InvalidState("boom".to_string()));
            }
            Ok(())
        }
    }

    struct TestModule {
        name: &'static str,
        counter: Arc<AtomicUsize>,
        order: Arc<Mutex<Vec<&'static str>>>,
        fail: bool,
        ctx: Arc<ModuleContext>,
    }

    impl EngineModule for TestModule {
        fn name(&self) -> &str {
            self.name
        }
        fn version(&self) -> &str {
            "0.1.0"
        }
        fn systems(&self) -> Vec<Box<dyn EngineSystem>> {
            vec![Box::new(CountingSystem {
                name: self.name,
                counter: self.counter.clone(),
                order: self.order.clone(),
                fail: self.fail,
            })]
        }
        fn commands(&self) -> Vec<CommandSpec> {
            let bench = self.ctx.benchmarks().clone();
            vec![CommandSpec {
                name: format!("bench_{}", self.name),
                module_name: self.name.to_string(),
                schema: std::collections::BTreeMap::new(),
                parameters: Vec::new(),
                executor: Arc::new(move |_| {
                    let _scope = bench.scope("work");
                    Ok(())
                }),
            }]
        }
    }

    struct TestFactory {
        name: &'static str,
        counter: Arc<AtomicUsize>,
        order: Arc<Mutex<Vec<&'static str>>>,
        fail: bool,
    }

    impl ModuleFactory for TestFactory {
        fn create(&self, ctx: Arc<ModuleContext>) -> Box<dyn EngineModule> {
            Box::new(TestModule {
                name: self.name,
                counter: self.counter.clone(),
                order: self.order.clone(),
                fail: self.fail,
                ctx,
            })
        }
    }

    struct Harness {
        registry: Arc<ModuleRegistry>,
        queue: CommandQueue,
        game_loop: GameLoop,
        metrics: Arc<Mutex<MetricsState>>,
        counter: Arc<AtomicUsize>,
        order: Arc<Mutex<Vec<&'static str>>>,
    }

    fn harness(modules: &[(&'static str, bool)], max_commands: usize) -> Harness {
        let dir = tempfile::tempdir().unwrap();
        let registry = Arc::new(ModuleRegistry::new(
            SharedStore::new(64, 16),
            Arc::new(TokenService::new()),
            ExportRegistry::new(),
            dir.keep(),
        ));
        let counter = Arc::new(AtomicUsize::new(0));
        let order = Arc::new(Mutex::new(Vec::new()));
        for &(name, fail) in modules {
            registry
                .register_builtin(Arc::new(TestFactory {
                    name,
                    counter: counter.clone(),
                    order: order.clone(),
                    fail,
                }))
                .unwrap();
        }
        let queue = CommandQueue::new();
        let metrics = Arc::new(Mutex::new(MetricsState::default()));
        let game_loop = GameLoop::new(
            registry.clone(),
            queue.clone(),
            max_commands,
            metrics.clone(),
            Arc::new(AtomicI64::new(0)),
            Vec::new(),
        );
        Harness {
            registry,
            queue,
            game_loop,
            metrics,
            counter,
            order,
        }
    }

    fn enqueue(h: &Harness, name: &str) {
        let spec = h.registry.command(name).unwrap();
        h.queue.enqueue(QueuedCommand {
            spec,
            payload: CommandPayload::new(),
        });
    }

    #[test]
    fn test_tick_advances_and_runs_systems() {
        let mut h = harness(&[("alpha", false)], 100);
        assert_eq!(h.game_loop.advance_tick(), 1);
        assert_eq!(h.game_loop.advance_tick(), 2);
        assert_eq!(h.counter.load(Ordering::SeqCst), 2);
        assert_eq!(h.game_loop.current_tick(), 2);
    }

    #[test]
    fn test_systems_run_in_declaration_order() {
        let mut h = harness(&[("alpha", false), ("beta", false)], 100);
        h.game_loop.advance_tick();
        assert_eq!(*h.order.lock(), vec!["alpha", "beta"]);
    }

    #[test]
    fn test_failing_system_does_not_abort_tick() {
        let mut h = harness(&[("alpha", true), ("beta", false)], 100);
        h.game_loop.advance_tick();
        // Both systems ran despite alpha's error.
        assert_eq!(*h.order.lock(), vec!["alpha", "beta"]);
        assert_eq!(h.metrics.lock().last_tick_systems.len(), 2);
    }

    #[test]
    fn test_command_drain_is_bounded() {
        let mut h = harness(&[("alpha", false)], 2);
        for _ in 0..5 {
            enqueue(&h, "bench_alpha");
        }
        h.game_loop.advance_tick();
        assert_eq!(h.queue.len(), 3);
        h.game_loop.advance_tick();
        assert_eq!(h.queue.len(), 1);
    }

    #[test]
    fn test_command_metrics_aggregated() {
        let mut h = harness(&[("alpha", false)], 100);
        enqueue(&h, "bench_alpha");
        enqueue(&h, "bench_alpha");
        h.game_loop.advance_tick();
        let metrics = h.metrics.lock();
        assert_eq!(metrics.last_tick_commands.len(), 1);
        assert_eq!(metrics.last_tick_commands[0].count, 2);
        assert_eq!(metrics.timings.total_ticks, 1);
    }

    #[test]
    fn test_benchmarks_drained_per_tick() {
        let mut h = harness(&[("alpha", false)], 100);
        enqueue(&h, "bench_alpha");
        h.game_loop.advance_tick();
        {
            let metrics = h.metrics.lock();
            assert_eq!(metrics.last_tick_benchmarks.len(), 1);
            assert_eq!(metrics.last_tick_benchmarks[0].full_name, "alpha:work");
        }
        // No benchmark activity this tick: the snapshot is replaced.
        h.game_loop.advance_tick();
        assert!(h.metrics.lock().last_tick_benchmarks.is_empty());
    }

    #[test]
    fn test_system_cache_invalidated_by_registry_change() {
        let mut h = harness(&[("alpha", false)], 100);
        h.game_loop.advance_tick();
        assert_eq!(h.counter.load(Ordering::SeqCst), 1);
        h.registry.uninstall("alpha").unwrap();
        h.game_loop.advance_tick();
        // The uninstalled module's system no longer runs.
        assert_eq!(h.counter.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn test_listener_notified_after_tick() {
        struct Recorder {
            ticks: Mutex<Vec<i64>>,
        }
        impl TickCompleteListener for Recorder {
            fn on_tick_complete(&self, tick: i64) -> Result<(), SimError> {
                self.ticks.lock().push(tick);
                Ok(())
            }
        }

        let dir = tempfile::tempdir().unwrap();
        let registry = Arc::new(ModuleRegistry::new(
            SharedStore::new(16, 8),
            Arc::new(TokenService::new()),
            ExportRegistry::new(),
            dir.keep(),
        ));
        let recorder = Arc::new(Recorder {
            ticks: Mutex::new(Vec::new()),
        });
        let mut game_loop = GameLoop::new(
            registry,
            CommandQueue::new(),
            100,
            Arc::new(Mutex::new(MetricsState::default())),
            Arc::new(AtomicI64::new(0)),
            vec![recorder.clone()],
        );
        game_loop.advance_tick();
        game_loop.advance_tick();
        assert_eq!(*recorder.ticks.lock(), vec![1, 2]);
    }
}
